//! Contracts for the catalog and installer machinery the orchestrator
//! drives but does not implement.
//!
//! Each call may fail; the run loop wraps every call in
//! [`crate::run::RunContext::guard`] so a failure is logged with full detail, the report
//! is flushed, and the error propagates as [`crate::MsuError::Collaborator`].

use crate::error::Result;
use crate::types::ForceAction;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// ServerStatus
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerStatus {
    pub code: i32,
    pub message: String,
}

impl ServerStatus {
    pub fn ok() -> Self {
        Self {
            code: 0,
            message: "OK".to_string(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.code == 0
    }
}

// ---------------------------------------------------------------------------
// VendorQuery
// ---------------------------------------------------------------------------

/// Parameters for a platform-vendor update query.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VendorQuery {
    /// Check even if a recent check is cached.
    pub force_check: bool,
    /// Also refresh the vendor catalog from scratch.
    pub force_catalog_refresh: bool,
    /// Count only already-downloaded updates, never contact the vendor.
    pub suppress_check: bool,
    pub client_id: Option<String>,
}

impl VendorQuery {
    pub fn cached_only(client_id: Option<String>) -> Self {
        Self {
            suppress_check: true,
            client_id,
            ..Self::default()
        }
    }
}

// ---------------------------------------------------------------------------
// UpdateEngine
// ---------------------------------------------------------------------------

pub trait UpdateEngine {
    /// Probe the catalog endpoint. Code 0 means reachable.
    fn probe_server(&mut self, url: &str) -> ServerStatus;

    /// Fetch manifests and catalogs and rebuild the install plan. Returns the
    /// check result to record, if any.
    fn run_update_check(&mut self, client_id: Option<&str>) -> Result<Option<i32>>;

    /// Number of platform-vendor updates available under `query`.
    fn vendor_updates_available(&mut self, query: &VendorQuery) -> Result<usize>;

    /// Perform pending managed installs and removals. Returns true if a
    /// restart is required.
    fn run_managed_installs(&mut self, only_unattended: bool) -> Result<bool>;

    /// Perform pending vendor installs. Returns true if a restart is required.
    fn run_vendor_installs(&mut self, only_unattended: bool) -> Result<bool>;

    /// Evaluate force-install deadlines. As a side effect, items past their
    /// deadline are promoted to unattended installs.
    fn force_install_escalation(&mut self) -> Result<ForceAction>;
}
