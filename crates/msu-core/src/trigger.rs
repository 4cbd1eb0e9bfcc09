//! Durable filesystem triggers.
//!
//! A trigger is a well-known path whose existence means "action pending".
//! They survive process restarts and reboots, which is how a logout or
//! startup launch learns why it was started.
//!
//! Only [`TriggerKind::CheckAndInstallAtStartup`] persists across runs: it is
//! left in place until no work remains. Every other kind is consumed as soon
//! as it is observed.

use crate::error::Result;
use crate::paths::Layout;
use serde::Deserialize;
use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// TriggerKind
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerKind {
    CheckAndInstallAtStartup,
    InstallAtStartup,
    InstallAtLogout,
    ManualCheck,
    InstallWithNoLogout,
}

impl TriggerKind {
    /// Startup triggers in the order a logout-window launch inspects them.
    pub const STARTUP_ORDER: [TriggerKind; 3] = [
        TriggerKind::CheckAndInstallAtStartup,
        TriggerKind::InstallAtStartup,
        TriggerKind::InstallAtLogout,
    ];

    /// True if the trigger stays on disk until no pending work remains.
    pub fn persists_until_idle(self) -> bool {
        matches!(self, TriggerKind::CheckAndInstallAtStartup)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TriggerKind::CheckAndInstallAtStartup => "checkandinstallatstartup",
            TriggerKind::InstallAtStartup => "installatstartup",
            TriggerKind::InstallAtLogout => "installatlogout",
            TriggerKind::ManualCheck => "manualcheck",
            TriggerKind::InstallWithNoLogout => "installwithnologout",
        }
    }
}

// ---------------------------------------------------------------------------
// ManualCheckPayload
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct ManualCheckPayload {
    #[serde(rename = "SuppressAppleUpdateCheck", default)]
    pub suppress_apple_update_check: bool,
}

// ---------------------------------------------------------------------------
// TriggerFileStore
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct TriggerFileStore {
    check_and_install_at_startup: PathBuf,
    install_at_startup: PathBuf,
    install_at_logout: PathBuf,
    manual_check: PathBuf,
    install_with_no_logout: PathBuf,
}

impl TriggerFileStore {
    pub fn new(layout: &Layout) -> Self {
        Self {
            check_and_install_at_startup: layout.check_and_install_at_startup.clone(),
            install_at_startup: layout.install_at_startup.clone(),
            install_at_logout: layout.install_at_logout.clone(),
            manual_check: layout.manual_check.clone(),
            install_with_no_logout: layout.install_with_no_logout.clone(),
        }
    }

    pub fn path(&self, kind: TriggerKind) -> &Path {
        match kind {
            TriggerKind::CheckAndInstallAtStartup => &self.check_and_install_at_startup,
            TriggerKind::InstallAtStartup => &self.install_at_startup,
            TriggerKind::InstallAtLogout => &self.install_at_logout,
            TriggerKind::ManualCheck => &self.manual_check,
            TriggerKind::InstallWithNoLogout => &self.install_with_no_logout,
        }
    }

    pub fn observe(&self, kind: TriggerKind) -> bool {
        self.path(kind).exists()
    }

    /// Delete the trigger. Returns true if it was present.
    pub fn consume(&self, kind: TriggerKind) -> Result<bool> {
        let removed = crate::io::remove_if_exists(self.path(kind))?;
        if removed {
            tracing::debug!("consumed {} trigger", kind.as_str());
        }
        Ok(removed)
    }

    pub fn create(&self, kind: TriggerKind) -> Result<()> {
        let path = self.path(kind);
        if let Some(parent) = path.parent() {
            crate::io::ensure_dir(parent)?;
        }
        crate::io::touch(path)
    }

    /// Decode the manual-check trigger's payload. Absent, empty or malformed
    /// content decodes to the default payload.
    pub fn manual_check_payload(&self) -> ManualCheckPayload {
        let path = self.path(TriggerKind::ManualCheck);
        let Ok(data) = std::fs::read(path) else {
            return ManualCheckPayload::default();
        };
        if data.iter().all(u8::is_ascii_whitespace) {
            return ManualCheckPayload::default();
        }
        serde_json::from_slice(&data).unwrap_or_else(|e| {
            tracing::debug!("ignoring malformed manual check payload: {e}");
            ManualCheckPayload::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store(dir: &TempDir) -> TriggerFileStore {
        TriggerFileStore::new(&Layout::rooted_at(dir.path()))
    }

    #[test]
    fn create_observe_consume() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        assert!(!store.observe(TriggerKind::InstallAtLogout));

        store.create(TriggerKind::InstallAtLogout).unwrap();
        assert!(store.observe(TriggerKind::InstallAtLogout));

        assert!(store.consume(TriggerKind::InstallAtLogout).unwrap());
        assert!(!store.observe(TriggerKind::InstallAtLogout));
        assert!(!store.consume(TriggerKind::InstallAtLogout).unwrap());
    }

    #[test]
    fn only_check_and_install_persists() {
        for kind in TriggerKind::STARTUP_ORDER {
            assert_eq!(
                kind.persists_until_idle(),
                kind == TriggerKind::CheckAndInstallAtStartup
            );
        }
        assert!(!TriggerKind::ManualCheck.persists_until_idle());
    }

    #[test]
    fn manual_payload_suppresses_vendor_check() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        store.create(TriggerKind::ManualCheck).unwrap();
        std::fs::write(
            store.path(TriggerKind::ManualCheck),
            r#"{"SuppressAppleUpdateCheck": true}"#,
        )
        .unwrap();
        assert!(store.manual_check_payload().suppress_apple_update_check);
    }

    #[test]
    fn malformed_manual_payload_is_ignored() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        store.create(TriggerKind::ManualCheck).unwrap();
        assert_eq!(store.manual_check_payload(), ManualCheckPayload::default());

        std::fs::write(
            store.path(TriggerKind::ManualCheck),
            r#"{"SuppressAppleUpdateCheck": "yes"}"#,
        )
        .unwrap();
        assert_eq!(store.manual_check_payload(), ManualCheckPayload::default());
    }
}
