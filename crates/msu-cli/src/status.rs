use chrono::{DateTime, Utc};
use msu_core::paths;
use msu_core::status::StatusUi;
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Snapshot the companion status window polls.
#[derive(Debug, Clone, Default, Serialize)]
struct StatusSnapshot {
    running: bool,
    frontmost: bool,
    message: String,
    detail: String,
    percent: i32,
    stop_button_visible: bool,
    restart_alert: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    updates_changed_at: Option<DateTime<Utc>>,
}

/// File-backed status channel: state goes to `status.json`, and the user's
/// stop button shows up as `stop.requested` in the managed install dir.
pub struct FileStatus {
    path: PathBuf,
    stop_path: PathBuf,
    snapshot: StatusSnapshot,
}

impl FileStatus {
    pub fn new(managed_install_dir: &Path) -> Self {
        Self {
            path: paths::status_path(managed_install_dir),
            stop_path: paths::stop_request_path(managed_install_dir),
            snapshot: StatusSnapshot {
                stop_button_visible: true,
                ..StatusSnapshot::default()
            },
        }
    }

    fn publish(&self) {
        let data = match serde_json::to_vec_pretty(&self.snapshot) {
            Ok(d) => d,
            Err(e) => {
                tracing::debug!("could not encode status: {e}");
                return;
            }
        };
        if let Err(e) = msu_core::io::atomic_write(&self.path, &data) {
            tracing::debug!("could not write {}: {e}", self.path.display());
        }
    }
}

impl StatusUi for FileStatus {
    fn launch(&mut self) {
        // A stale stop request from an earlier session must not cancel this one.
        if let Err(e) = msu_core::io::remove_if_exists(&self.stop_path) {
            tracing::debug!("could not clear stop request: {e}");
        }
        self.snapshot.running = true;
        self.publish();
    }

    fn activate(&mut self) {
        self.snapshot.running = true;
        self.snapshot.frontmost = true;
        self.publish();
    }

    fn quit(&mut self) {
        self.snapshot.running = false;
        self.snapshot.frontmost = false;
        self.publish();
    }

    fn message(&mut self, text: &str) {
        self.snapshot.message = text.to_string();
        self.snapshot.detail.clear();
        self.publish();
    }

    fn detail(&mut self, text: &str) {
        self.snapshot.detail = text.to_string();
        self.publish();
    }

    fn percent(&mut self, percent: i32) {
        self.snapshot.percent = percent;
        self.publish();
    }

    fn hide_stop_button(&mut self) {
        self.snapshot.stop_button_visible = false;
        self.publish();
    }

    fn restart_alert(&mut self) {
        self.snapshot.restart_alert = true;
        self.publish();
    }

    fn updates_changed(&mut self) {
        self.snapshot.updates_changed_at = Some(Utc::now());
        self.publish();
    }

    fn stop_requested(&self) -> bool {
        self.stop_path.exists()
    }
}
