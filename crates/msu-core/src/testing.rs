//! Scripted stand-ins for the host, the update engine and the status UI.

use crate::engine::{ServerStatus, UpdateEngine, VendorQuery};
use crate::error::{MsuError, Result};
use crate::host::Host;
use crate::paths::Layout;
use crate::report::RunReport;
use crate::run::Orchestrator;
use crate::state::ClientState;
use crate::status::StatusUi;
use crate::types::ForceAction;
use std::cell::{Cell, RefCell};
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;

// ---------------------------------------------------------------------------
// FakeHost
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct FakeHost {
    pub gui_session: bool,
    pub console_user: Option<String>,
    /// Successive idle samples; the last one repeats. Empty means 0.
    pub idle: Vec<u64>,
    /// Network comes up after this many checks. `None` means never.
    pub network_up_after: Option<u32>,
    /// Another instance is seen for this many checks. `None` means never.
    pub other_instance_checks: Option<u32>,
    pub running: Vec<String>,
    /// Termination is reported from this many checks on. `None` means never.
    pub terminate_after: Option<u32>,
    pub disk_kb: Option<u64>,
    pub restart_fails: bool,
    pub(crate) slept: Cell<Duration>,
    pub(crate) idle_samples: Cell<usize>,
    pub(crate) network_checks: Cell<u32>,
    pub(crate) instance_checks: Cell<u32>,
    pub(crate) termination_checks: Cell<u32>,
    pub(crate) restarts: Cell<u32>,
    pub(crate) logout_helpers: Cell<u32>,
    /// Marker presence observed at each sleep.
    pub marker_watch: Option<PathBuf>,
    pub(crate) marker_seen: Cell<bool>,
}

impl FakeHost {
    pub fn total_slept(&self) -> Duration {
        self.slept.get()
    }

    pub fn idle_samples(&self) -> usize {
        self.idle_samples.get()
    }

    pub fn restarts(&self) -> u32 {
        self.restarts.get()
    }

    pub fn logout_helpers(&self) -> u32 {
        self.logout_helpers.get()
    }

    pub fn marker_seen(&self) -> bool {
        self.marker_seen.get()
    }
}

impl Host for FakeHost {
    fn gui_session_active(&self) -> bool {
        self.gui_session
    }

    fn console_user(&self) -> Option<String> {
        self.console_user.clone()
    }

    fn idle_seconds(&self) -> u64 {
        let i = self.idle_samples.get();
        self.idle_samples.set(i + 1);
        self.idle.get(i).or(self.idle.last()).copied().unwrap_or(0)
    }

    fn network_up(&self) -> bool {
        let n = self.network_checks.get();
        self.network_checks.set(n + 1);
        matches!(self.network_up_after, Some(after) if n >= after)
    }

    fn other_instance_running(&self) -> bool {
        let n = self.instance_checks.get();
        self.instance_checks.set(n + 1);
        matches!(self.other_instance_checks, Some(checks) if n < checks)
    }

    fn process_running(&self, name: &str) -> bool {
        self.running.iter().any(|p| p == name)
    }

    fn termination_requested(&self) -> bool {
        let n = self.termination_checks.get();
        self.termination_checks.set(n + 1);
        matches!(self.terminate_after, Some(after) if n >= after)
    }

    fn sleep(&self, duration: Duration) {
        self.slept.set(self.slept.get() + duration);
        if let Some(marker) = &self.marker_watch {
            if marker.exists() {
                self.marker_seen.set(true);
            }
        }
    }

    fn restart_now(&self) -> Result<()> {
        self.restarts.set(self.restarts.get() + 1);
        if self.restart_fails {
            return Err(MsuError::Io(std::io::Error::other("shutdown refused")));
        }
        Ok(())
    }

    fn start_logout_helper(&self) -> Result<()> {
        self.logout_helpers.set(self.logout_helpers.get() + 1);
        Ok(())
    }

    fn available_disk_space_kb(&self, _path: &Path) -> Option<u64> {
        self.disk_kb
    }
}

// ---------------------------------------------------------------------------
// FakeEngine
// ---------------------------------------------------------------------------

pub struct FakeEngine {
    pub server: ServerStatus,
    pub check_result: Option<i32>,
    pub check_fails: bool,
    pub check_interrupted: bool,
    pub vendor_available: usize,
    pub vendor_cached: usize,
    pub managed_restart: bool,
    pub vendor_restart: bool,
    /// Successive escalations; the last one repeats. Empty means none.
    pub escalations: Vec<ForceAction>,
    /// Install plan emptied by a full (attended) managed install.
    pub plan_cleared_by_install: Option<PathBuf>,
    /// Install plan emptied by any managed install, unattended included.
    pub plan_cleared_by_unattended: Option<PathBuf>,
    pub calls: Vec<String>,
    pub vendor_queries: Vec<VendorQuery>,
    pub(crate) escalation_calls: usize,
}

impl Default for FakeEngine {
    fn default() -> Self {
        Self {
            server: ServerStatus::ok(),
            check_result: Some(0),
            check_fails: false,
            check_interrupted: false,
            vendor_available: 0,
            vendor_cached: 0,
            managed_restart: false,
            vendor_restart: false,
            escalations: Vec::new(),
            plan_cleared_by_install: None,
            plan_cleared_by_unattended: None,
            calls: Vec::new(),
            vendor_queries: Vec::new(),
            escalation_calls: 0,
        }
    }
}

impl FakeEngine {
    pub fn called(&self, name: &str) -> bool {
        self.calls.iter().any(|c| c == name)
    }

    pub fn count(&self, name: &str) -> usize {
        self.calls.iter().filter(|c| *c == name).count()
    }
}

impl UpdateEngine for FakeEngine {
    fn probe_server(&mut self, _url: &str) -> ServerStatus {
        self.calls.push("probe_server".into());
        self.server.clone()
    }

    fn run_update_check(&mut self, _client_id: Option<&str>) -> Result<Option<i32>> {
        self.calls.push("update_check".into());
        if self.check_interrupted {
            return Err(MsuError::Interrupted);
        }
        if self.check_fails {
            return Err(MsuError::collaborator("update check", "catalog fetch exploded"));
        }
        Ok(self.check_result)
    }

    fn vendor_updates_available(&mut self, query: &VendorQuery) -> Result<usize> {
        self.calls.push("vendor_available".into());
        self.vendor_queries.push(query.clone());
        if query.suppress_check {
            Ok(self.vendor_cached)
        } else {
            // A real check downloads what it finds.
            self.vendor_cached = self.vendor_available;
            Ok(self.vendor_available)
        }
    }

    fn run_managed_installs(&mut self, only_unattended: bool) -> Result<bool> {
        self.calls.push(if only_unattended {
            "managed_unattended".into()
        } else {
            "managed_full".into()
        });
        let clear = if only_unattended {
            self.plan_cleared_by_unattended.as_ref()
        } else {
            self.plan_cleared_by_install
                .as_ref()
                .or(self.plan_cleared_by_unattended.as_ref())
        };
        if let Some(plan) = clear {
            std::fs::write(plan, "{}")?;
        }
        Ok(self.managed_restart)
    }

    fn run_vendor_installs(&mut self, only_unattended: bool) -> Result<bool> {
        self.calls.push(if only_unattended {
            "vendor_unattended".into()
        } else {
            "vendor_full".into()
        });
        if !only_unattended {
            self.vendor_cached = 0;
        }
        Ok(self.vendor_restart)
    }

    fn force_install_escalation(&mut self) -> Result<ForceAction> {
        self.calls.push("escalation".into());
        let i = self.escalation_calls;
        self.escalation_calls += 1;
        Ok(self
            .escalations
            .get(i)
            .or(self.escalations.last())
            .copied()
            .unwrap_or_default())
    }
}

// ---------------------------------------------------------------------------
// RecordingStatus
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct RecordingStatus {
    pub events: RefCell<Vec<String>>,
    pub stop: bool,
}

impl RecordingStatus {
    pub fn saw(&self, event: &str) -> bool {
        self.events.borrow().iter().any(|e| e == event)
    }

    fn push(&self, event: impl Into<String>) {
        self.events.borrow_mut().push(event.into());
    }
}

impl StatusUi for RecordingStatus {
    fn launch(&mut self) {
        self.push("launch");
    }
    fn activate(&mut self) {
        self.push("activate");
    }
    fn quit(&mut self) {
        self.push("quit");
    }
    fn message(&mut self, text: &str) {
        self.push(format!("message:{text}"));
    }
    fn detail(&mut self, text: &str) {
        self.push(format!("detail:{text}"));
    }
    fn percent(&mut self, percent: i32) {
        self.push(format!("percent:{percent}"));
    }
    fn hide_stop_button(&mut self) {
        self.push("hide_stop_button");
    }
    fn restart_alert(&mut self) {
        self.push("restart_alert");
    }
    fn updates_changed(&mut self) {
        self.push("updates_changed");
    }
    fn stop_requested(&self) -> bool {
        self.stop
    }
}

// ---------------------------------------------------------------------------
// TestEnv
// ---------------------------------------------------------------------------

/// A complete client layout rooted in a temp dir.
pub struct TestEnv {
    pub dir: TempDir,
    pub layout: Layout,
    pub prefs_path: PathBuf,
}

impl TestEnv {
    pub fn new() -> Self {
        Self::with_prefs("")
    }

    /// Start with `extra` appended to a minimal preferences file.
    pub fn with_prefs(extra: &str) -> Self {
        let dir = TempDir::new().unwrap();
        let layout = Layout::rooted_at(dir.path());
        let prefs_path = dir.path().join("ManagedInstalls.yaml");
        if let Some(run_dir) = layout.notify_marker.parent() {
            std::fs::create_dir_all(run_dir).unwrap();
        }
        let env = Self {
            dir,
            layout,
            prefs_path,
        };
        env.write_prefs(extra);
        env
    }

    pub fn write_prefs(&self, extra: &str) {
        let yaml = format!(
            "ManagedInstallDir: \"{}\"\nHookDir: \"{}\"\nSoftwareRepoURL: https://munki.example.com/repo\n{extra}",
            self.layout.managed_install_dir.display(),
            self.layout.hook_dir.display(),
        );
        std::fs::write(&self.prefs_path, yaml).unwrap();
    }

    pub fn write_plan(&self, json: &str) {
        std::fs::create_dir_all(&self.layout.managed_install_dir).unwrap();
        std::fs::write(self.layout.install_info(), json).unwrap();
    }

    pub fn write_hook(&self, name: &str, body: &str) {
        use std::os::unix::fs::PermissionsExt;
        std::fs::create_dir_all(&self.layout.hook_dir).unwrap();
        let path = self.layout.hook_dir.join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    }

    pub fn owner_uid(&self) -> u32 {
        std::fs::metadata(self.dir.path()).unwrap().uid()
    }

    pub fn orchestrator<'a>(
        &self,
        host: &'a FakeHost,
        engine: &'a mut FakeEngine,
        status: &'a mut RecordingStatus,
    ) -> Orchestrator<'a> {
        Orchestrator {
            host,
            engine,
            status,
            layout: self.layout.clone(),
            prefs_path: self.prefs_path.clone(),
            trusted_uid: self.owner_uid(),
            current_exe: None,
            tool_version: "0.1.0-test".to_string(),
        }
    }

    pub fn state(&self) -> ClientState {
        ClientState::load(&self.layout.client_state())
    }

    pub fn report(&self) -> Option<RunReport> {
        RunReport::load(&self.layout.report())
    }
}
