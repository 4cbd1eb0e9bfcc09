use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// ClientState
// ---------------------------------------------------------------------------

/// Durable per-client bookkeeping that outlives a single run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClientState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_notified_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_check_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_check_result: Option<i32>,
    #[serde(default)]
    pub pending_update_count: usize,
    #[serde(skip)]
    path: PathBuf,
}

impl ClientState {
    // ---------------------------------------------------------------------------
    // Persistence
    // ---------------------------------------------------------------------------

    /// Load state from `path`. A missing or unreadable file starts fresh;
    /// the next save overwrites it.
    pub fn load(path: &Path) -> Self {
        let mut state = match std::fs::read_to_string(path) {
            Ok(data) => serde_yaml::from_str::<ClientState>(&data).unwrap_or_else(|e| {
                tracing::warn!("ignoring unreadable client state {}: {e}", path.display());
                ClientState::default()
            }),
            Err(_) => ClientState::default(),
        };
        state.path = path.to_path_buf();
        state
    }

    pub fn save(&self) -> Result<()> {
        let data = serde_yaml::to_string(self)?;
        crate::io::atomic_write(&self.path, data.as_bytes())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    // ---------------------------------------------------------------------------
    // Mutations
    // ---------------------------------------------------------------------------

    /// Record the outcome of an update check and persist it.
    pub fn record_check_result(&mut self, result: i32, now: DateTime<Utc>) -> Result<()> {
        self.last_check_result = Some(result);
        self.last_check_date = Some(now);
        self.save()
    }

    pub fn set_pending_update_count(&mut self, count: usize) -> Result<()> {
        self.pending_update_count = count;
        self.save()
    }
}
