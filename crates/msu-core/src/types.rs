use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Check result sentinels
// ---------------------------------------------------------------------------

/// Recorded when a preflight script aborted the run.
pub const CHECK_RESULT_PREFLIGHT_ABORT: i32 = -2;
/// Recorded when a manual check could not reach the server.
pub const CHECK_RESULT_SERVER_UNAVAILABLE: i32 = -1;
pub const CHECK_RESULT_NO_UPDATES: i32 = 0;
pub const CHECK_RESULT_UPDATES_AVAILABLE: i32 = 1;

// ---------------------------------------------------------------------------
// RunType
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunType {
    Auto,
    LogoutInstall,
    CheckAndInstallAtStartup,
    InstallWithNoLogout,
    ManualCheck,
    Custom,
}

impl RunType {
    pub fn as_str(self) -> &'static str {
        match self {
            RunType::Auto => "auto",
            RunType::LogoutInstall => "logoutinstall",
            RunType::CheckAndInstallAtStartup => "checkandinstallatstartup",
            RunType::InstallWithNoLogout => "installwithnologout",
            RunType::ManualCheck => "manualcheck",
            RunType::Custom => "custom",
        }
    }
}

impl fmt::Display for RunType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// ForceAction
// ---------------------------------------------------------------------------

/// Escalation reported by the force-install deadline policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ForceAction {
    #[default]
    None,
    Logout,
    Restart,
    Now,
}

impl ForceAction {
    /// Any escalation requires the user to log out.
    pub fn requires_logout(self) -> bool {
        !matches!(self, ForceAction::None)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ForceAction::None => "none",
            ForceAction::Logout => "logout",
            ForceAction::Restart => "restart",
            ForceAction::Now => "now",
        }
    }
}

impl fmt::Display for ForceAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
