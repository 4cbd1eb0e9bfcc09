use crate::error::Result;
use crate::paths;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_REPO_URL: &str = "http://munki/repo";
pub const DEFAULT_ENGINE_TOOL: &str = "/usr/local/munki/msu-engine";
pub const DEFAULT_SYNC_AGENT: &str = "FileSyncAgent";

// ---------------------------------------------------------------------------
// Preferences
// ---------------------------------------------------------------------------

/// Administrator-managed client preferences. Every key is optional; a
/// missing preferences file yields the defaults below.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Preferences {
    #[serde(default = "default_managed_install_dir")]
    pub managed_install_dir: PathBuf,
    #[serde(rename = "SoftwareRepoURL", default = "default_repo_url")]
    pub software_repo_url: String,
    #[serde(rename = "ManifestURL", default, skip_serializing_if = "Option::is_none")]
    pub manifest_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_identifier: Option<String>,
    /// Kept untyped so a malformed value degrades to the default interval
    /// instead of failing the whole load.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub days_between_notifications: Option<serde_yaml::Value>,
    #[serde(default)]
    pub install_apple_software_updates: bool,
    #[serde(default)]
    pub apple_software_updates_only: bool,
    #[serde(default)]
    pub suppress_auto_install: bool,
    #[serde(default)]
    pub suppress_loginwindow_install: bool,
    #[serde(default)]
    pub suppress_user_notification: bool,
    #[serde(default = "default_engine_tool")]
    pub engine_tool: PathBuf,
    #[serde(default = "default_sync_agent")]
    pub sync_agent_process: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hook_dir: Option<PathBuf>,
}

fn default_managed_install_dir() -> PathBuf {
    PathBuf::from(paths::DEFAULT_MANAGED_INSTALL_DIR)
}

fn default_repo_url() -> String {
    DEFAULT_REPO_URL.to_string()
}

fn default_engine_tool() -> PathBuf {
    PathBuf::from(DEFAULT_ENGINE_TOOL)
}

fn default_sync_agent() -> String {
    DEFAULT_SYNC_AGENT.to_string()
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            managed_install_dir: default_managed_install_dir(),
            software_repo_url: default_repo_url(),
            manifest_url: None,
            client_identifier: None,
            days_between_notifications: None,
            install_apple_software_updates: false,
            apple_software_updates_only: false,
            suppress_auto_install: false,
            suppress_loginwindow_install: false,
            suppress_user_notification: false,
            engine_tool: default_engine_tool(),
            sync_agent_process: default_sync_agent(),
            hook_dir: None,
        }
    }
}

impl Preferences {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = std::fs::read_to_string(path)?;
        if data.trim().is_empty() {
            return Ok(Self::default());
        }
        let prefs: Preferences = serde_yaml::from_str(&data)?;
        Ok(prefs)
    }

    /// Notification interval in days. Non-integer values log a warning and
    /// fall back to 1.
    pub fn notification_interval_days(&self) -> i64 {
        let Some(value) = &self.days_between_notifications else {
            return 1;
        };
        let parsed = match value {
            serde_yaml::Value::Number(n) => n.as_i64(),
            serde_yaml::Value::String(s) => s.trim().parse::<i64>().ok(),
            _ => None,
        };
        parsed.unwrap_or_else(|| {
            tracing::warn!(
                "DaysBetweenNotifications is not an integer: {:?}; using 1",
                value
            );
            1
        })
    }

    /// The endpoint probed for reachability: the manifest URL when set,
    /// otherwise the repo's manifests directory.
    pub fn server_url(&self) -> String {
        match &self.manifest_url {
            Some(url) if !url.is_empty() => url.clone(),
            _ => format!("{}/manifests/", self.software_repo_url.trim_end_matches('/')),
        }
    }

    /// True when the client is still pointed at the unconfigured bootstrap
    /// default repo.
    pub fn uses_default_repo(&self) -> bool {
        self.software_repo_url == DEFAULT_REPO_URL && self.manifest_url.is_none()
    }
}
