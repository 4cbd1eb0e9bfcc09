use crate::error::Result;
use crate::types::RunType;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use uuid::Uuid;

pub const MAX_ARCHIVED_REPORTS: usize = 100;
pub const NO_CONSOLE_USER: &str = "<None>";
const ARCHIVE_PREFIX: &str = "ManagedInstallReport-";

// ---------------------------------------------------------------------------
// RunReport
// ---------------------------------------------------------------------------

/// The durable record of one invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub start_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    pub run_type: RunType,
    #[serde(default)]
    pub errors: Vec<String>,
    #[serde(default)]
    pub warnings: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub console_user: Option<String>,
    /// Kilobytes free on the managed install volume.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub available_disk_space: Option<u64>,
    pub tool_version: String,
    #[serde(default)]
    pub pending_update_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub check_result: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server: Option<String>,
    #[serde(default)]
    pub restart_required: bool,
}

impl RunReport {
    pub fn new(run_type: RunType, tool_version: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            start_time: now,
            end_time: None,
            run_type,
            errors: Vec::new(),
            warnings: Vec::new(),
            console_user: None,
            available_disk_space: None,
            tool_version: tool_version.into(),
            pending_update_count: 0,
            check_result: None,
            server: None,
            restart_required: false,
        }
    }

    /// Log an error and record it in the report.
    pub fn error(&mut self, message: impl Into<String>) {
        let message = message.into();
        tracing::error!("{message}");
        self.errors.push(message);
    }

    /// Log a warning and record it in the report.
    pub fn warning(&mut self, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!("{message}");
        self.warnings.push(message);
    }

    /// Keep results an install-only run does not recompute.
    pub fn carry_forward(&mut self, previous: &RunReport) {
        if self.check_result.is_none() {
            self.check_result = previous.check_result;
        }
        if self.server.is_none() {
            self.server = previous.server.clone();
        }
    }

    pub fn finish(
        &mut self,
        now: DateTime<Utc>,
        console_user: Option<String>,
        available_disk_space: Option<u64>,
        pending_update_count: usize,
    ) {
        self.end_time = Some(now);
        self.console_user = Some(console_user.unwrap_or_else(|| NO_CONSOLE_USER.to_string()));
        self.available_disk_space = available_disk_space;
        self.pending_update_count = pending_update_count;
    }

    // ---------------------------------------------------------------------------
    // Persistence
    // ---------------------------------------------------------------------------

    pub fn load(path: &Path) -> Option<Self> {
        let data = std::fs::read(path).ok()?;
        match serde_json::from_slice(&data) {
            Ok(report) => Some(report),
            Err(e) => {
                tracing::warn!("ignoring unreadable report {}: {e}", path.display());
                None
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let data = serde_json::to_vec_pretty(self)?;
        crate::io::atomic_write(path, &data)
    }
}

// ---------------------------------------------------------------------------
// Archiving
// ---------------------------------------------------------------------------

/// Move the previous report into `archive_dir` under a timestamped name and
/// prune the archive to [`MAX_ARCHIVED_REPORTS`]. Returns the archive path,
/// or `None` when there was no previous report.
pub fn archive_previous(
    report_path: &Path,
    archive_dir: &Path,
    now: DateTime<Utc>,
) -> Result<Option<PathBuf>> {
    if !report_path.exists() {
        return Ok(None);
    }
    crate::io::ensure_dir(archive_dir)?;

    let stamp = now.format("%Y-%m-%d-%H%M%S").to_string();
    let mut target = archive_dir.join(format!("{ARCHIVE_PREFIX}{stamp}.json"));
    let mut n = 1;
    while target.exists() {
        target = archive_dir.join(format!("{ARCHIVE_PREFIX}{stamp}-{n}.json"));
        n += 1;
    }
    std::fs::rename(report_path, &target)?;
    prune_archives(archive_dir, MAX_ARCHIVED_REPORTS)?;
    Ok(Some(target))
}

fn prune_archives(archive_dir: &Path, keep: usize) -> Result<()> {
    let mut archived: Vec<PathBuf> = std::fs::read_dir(archive_dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with(ARCHIVE_PREFIX))
        })
        .collect();
    if archived.len() <= keep {
        return Ok(());
    }
    // Timestamped names sort chronologically.
    archived.sort();
    let excess = archived.len() - keep;
    for old in archived.into_iter().take(excess) {
        std::fs::remove_file(&old)?;
    }
    Ok(())
}
