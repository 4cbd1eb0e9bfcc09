//! Adapter for the external engine executable.
//!
//! The engine owns catalogs, downloads and installers. Each operation is one
//! subprocess call that prints a single JSON object on stdout:
//!
//! ```text
//! <tool> <operation> [--client-id X] [--only-unattended] [--force-check]
//!                    [--force-catalog-refresh] [--suppress-check]
//! {"result": <value>}
//! ```
//!
//! stderr is passed through so engine progress shows up in the run output.

use msu_core::engine::{ServerStatus, UpdateEngine, VendorQuery};
use msu_core::types::ForceAction;
use msu_core::{MsuError, Result};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::os::unix::process::ExitStatusExt;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::time::Duration;

const PROBE_TIMEOUT: Duration = Duration::from_secs(10);
/// Unreachable server, in the style of a URL-loading error code.
const PROBE_FAILED: i32 = -1;

#[derive(Deserialize)]
struct ToolResponse<T> {
    result: T,
}

pub struct EngineTool {
    tool: PathBuf,
    agent: ureq::Agent,
}

impl EngineTool {
    pub fn new(tool: PathBuf) -> Self {
        Self {
            tool,
            agent: ureq::AgentBuilder::new().timeout(PROBE_TIMEOUT).build(),
        }
    }

    fn invoke<T: DeserializeOwned>(&self, operation: &str, args: &[String]) -> Result<T> {
        tracing::debug!("engine: {} {operation} {}", self.tool.display(), args.join(" "));
        let output = Command::new(&self.tool)
            .arg(operation)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .output()
            .map_err(|e| {
                MsuError::collaborator(
                    operation,
                    format!("could not run {}: {e}", self.tool.display()),
                )
            })?;

        if output.status.signal() == Some(libc::SIGINT) {
            return Err(MsuError::Interrupted);
        }
        let stdout = String::from_utf8_lossy(&output.stdout);
        if !output.status.success() {
            let hint: String = stdout.chars().take(500).collect();
            return Err(MsuError::collaborator(
                operation,
                format!("engine exited with {}: {hint}", output.status),
            ));
        }
        let response: ToolResponse<T> = serde_json::from_str(stdout.trim()).map_err(|e| {
            MsuError::collaborator(operation, format!("invalid engine response: {e}"))
        })?;
        Ok(response.result)
    }
}

fn client_id_args(client_id: Option<&str>) -> Vec<String> {
    match client_id {
        Some(id) => vec!["--client-id".to_string(), id.to_string()],
        None => Vec::new(),
    }
}

fn unattended_args(only_unattended: bool) -> Vec<String> {
    if only_unattended {
        vec!["--only-unattended".to_string()]
    } else {
        Vec::new()
    }
}

fn vendor_query_args(query: &VendorQuery) -> Vec<String> {
    let mut args = client_id_args(query.client_id.as_deref());
    for (set, flag) in [
        (query.force_check, "--force-check"),
        (query.force_catalog_refresh, "--force-catalog-refresh"),
        (query.suppress_check, "--suppress-check"),
    ] {
        if set {
            args.push(flag.to_string());
        }
    }
    args
}

impl UpdateEngine for EngineTool {
    /// Any HTTP response means the server is up; only transport failures
    /// count as unreachable.
    fn probe_server(&mut self, url: &str) -> ServerStatus {
        match self.agent.get(url).call() {
            Ok(_) => ServerStatus::ok(),
            Err(ureq::Error::Status(code, _)) => {
                tracing::debug!("server answered {url} with HTTP {code}");
                ServerStatus::ok()
            }
            Err(ureq::Error::Transport(t)) => ServerStatus {
                code: PROBE_FAILED,
                message: t.to_string(),
            },
        }
    }

    fn run_update_check(&mut self, client_id: Option<&str>) -> Result<Option<i32>> {
        self.invoke("check", &client_id_args(client_id))
    }

    fn vendor_updates_available(&mut self, query: &VendorQuery) -> Result<usize> {
        self.invoke("vendor-available", &vendor_query_args(query))
    }

    fn run_managed_installs(&mut self, only_unattended: bool) -> Result<bool> {
        self.invoke("install-managed", &unattended_args(only_unattended))
    }

    fn run_vendor_installs(&mut self, only_unattended: bool) -> Result<bool> {
        self.invoke("install-vendor", &unattended_args(only_unattended))
    }

    fn force_install_escalation(&mut self) -> Result<ForceAction> {
        self.invoke("force-install", &[])
    }
}
