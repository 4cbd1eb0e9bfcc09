use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// Well-known trigger and marker paths
// ---------------------------------------------------------------------------

pub const CHECK_AND_INSTALL_AT_STARTUP_FLAG: &str =
    "/Users/Shared/.com.googlecode.munki.checkandinstallatstartup";
pub const INSTALL_AT_STARTUP_FLAG: &str = "/Users/Shared/.com.googlecode.munki.installatstartup";
pub const INSTALL_AT_LOGOUT_FLAG: &str = "/private/tmp/com.googlecode.munki.installatlogout";
pub const MANUAL_CHECK_FLAG: &str = "/private/tmp/.com.googlecode.munki.updatecheck.launchd";
pub const INSTALL_WITH_NO_LOGOUT_FLAG: &str =
    "/private/tmp/.com.googlecode.munki.managedinstall.launchd";
pub const NOTIFY_USER_MARKER: &str = "/var/run/com.googlecode.munki.ManagedSoftwareUpdate";

// ---------------------------------------------------------------------------
// Managed install directory layout
// ---------------------------------------------------------------------------

pub const DEFAULT_MANAGED_INSTALL_DIR: &str = "/Library/Managed Installs";
pub const DEFAULT_PREFERENCES_FILE: &str = "/Library/Preferences/ManagedInstalls.yaml";
/// Where preflight and postflight scripts live unless `HookDir` says otherwise.
pub const DEFAULT_HOOK_DIR: &str = "/usr/local/munki";

/// Subdirectories created under the managed install root on every run.
pub const MANAGED_SUBDIRS: &[&str] = &["manifests", "catalogs", "icons", "Cache", "Logs"];

pub const INSTALL_INFO_FILE: &str = "InstallInfo.json";
pub const VENDOR_UPDATES_FILE: &str = "AppleUpdates.json";
pub const REPORT_FILE: &str = "ManagedInstallReport.json";
pub const ARCHIVES_DIR: &str = "Archives";
pub const CLIENT_STATE_FILE: &str = "ClientState.yaml";
pub const LOGS_DIR: &str = "Logs";
pub const LOG_FILE: &str = "ManagedSoftwareUpdate.log";
pub const STATUS_FILE: &str = "status.json";
pub const STOP_REQUEST_FILE: &str = "stop.requested";

pub const PREFLIGHT_SCRIPT: &str = "preflight";
pub const POSTFLIGHT_SCRIPT: &str = "postflight";

pub fn install_info_path(managed_dir: &Path) -> PathBuf {
    managed_dir.join(INSTALL_INFO_FILE)
}

pub fn vendor_updates_path(managed_dir: &Path) -> PathBuf {
    managed_dir.join(VENDOR_UPDATES_FILE)
}

pub fn report_path(managed_dir: &Path) -> PathBuf {
    managed_dir.join(REPORT_FILE)
}

pub fn archives_dir(managed_dir: &Path) -> PathBuf {
    managed_dir.join(ARCHIVES_DIR)
}

pub fn client_state_path(managed_dir: &Path) -> PathBuf {
    managed_dir.join(CLIENT_STATE_FILE)
}

pub fn log_path(managed_dir: &Path) -> PathBuf {
    managed_dir.join(LOGS_DIR).join(LOG_FILE)
}

pub fn status_path(managed_dir: &Path) -> PathBuf {
    managed_dir.join(STATUS_FILE)
}

pub fn stop_request_path(managed_dir: &Path) -> PathBuf {
    managed_dir.join(STOP_REQUEST_FILE)
}

// ---------------------------------------------------------------------------
// Layout
// ---------------------------------------------------------------------------

/// Every filesystem location a run touches. Production code uses
/// [`Layout::system`]; tests root the whole thing in a temp dir.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    pub managed_install_dir: PathBuf,
    pub hook_dir: PathBuf,
    pub check_and_install_at_startup: PathBuf,
    pub install_at_startup: PathBuf,
    pub install_at_logout: PathBuf,
    pub manual_check: PathBuf,
    pub install_with_no_logout: PathBuf,
    pub notify_marker: PathBuf,
}

impl Layout {
    pub fn system(managed_install_dir: impl Into<PathBuf>, hook_dir: impl Into<PathBuf>) -> Self {
        Self {
            managed_install_dir: managed_install_dir.into(),
            hook_dir: hook_dir.into(),
            check_and_install_at_startup: PathBuf::from(CHECK_AND_INSTALL_AT_STARTUP_FLAG),
            install_at_startup: PathBuf::from(INSTALL_AT_STARTUP_FLAG),
            install_at_logout: PathBuf::from(INSTALL_AT_LOGOUT_FLAG),
            manual_check: PathBuf::from(MANUAL_CHECK_FLAG),
            install_with_no_logout: PathBuf::from(INSTALL_WITH_NO_LOGOUT_FLAG),
            notify_marker: PathBuf::from(NOTIFY_USER_MARKER),
        }
    }

    /// Place every path under `root`, keeping the well-known file names.
    pub fn rooted_at(root: &Path) -> Self {
        let reroot = |p: &str| root.join(p.trim_start_matches('/'));
        Self {
            managed_install_dir: reroot(DEFAULT_MANAGED_INSTALL_DIR),
            hook_dir: root.join("hooks"),
            check_and_install_at_startup: reroot(CHECK_AND_INSTALL_AT_STARTUP_FLAG),
            install_at_startup: reroot(INSTALL_AT_STARTUP_FLAG),
            install_at_logout: reroot(INSTALL_AT_LOGOUT_FLAG),
            manual_check: reroot(MANUAL_CHECK_FLAG),
            install_with_no_logout: reroot(INSTALL_WITH_NO_LOGOUT_FLAG),
            notify_marker: reroot(NOTIFY_USER_MARKER),
        }
    }

    pub fn preflight_script(&self) -> PathBuf {
        self.hook_dir.join(PREFLIGHT_SCRIPT)
    }

    pub fn postflight_script(&self) -> PathBuf {
        self.hook_dir.join(POSTFLIGHT_SCRIPT)
    }

    pub fn install_info(&self) -> PathBuf {
        install_info_path(&self.managed_install_dir)
    }

    pub fn vendor_updates(&self) -> PathBuf {
        vendor_updates_path(&self.managed_install_dir)
    }

    pub fn report(&self) -> PathBuf {
        report_path(&self.managed_install_dir)
    }

    pub fn archives(&self) -> PathBuf {
        archives_dir(&self.managed_install_dir)
    }

    pub fn client_state(&self) -> PathBuf {
        client_state_path(&self.managed_install_dir)
    }
}
