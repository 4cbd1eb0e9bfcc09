//! Administrator-supplied preflight/postflight scripts.
//!
//! Scripts run as root, so a script anyone else can modify is a privilege
//! escalation. A script that fails the writability check is skipped unless
//! the running program itself is equally exposed, in which case skipping
//! would protect nothing.

use crate::types::RunType;
use std::os::unix::fs::{MetadataExt, PermissionsExt};
use std::os::unix::process::ExitStatusExt;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

/// Groups allowed to hold write access: wheel and admin.
pub const TRUSTED_GROUPS: [u32; 2] = [0, 80];

pub const VERBOSITY_ENV: &str = "MUNKI_VERBOSITY_LEVEL";

/// Reject `path` unless only root or `trusted_uid` (and trusted groups) can
/// write it. The error describes the first problem found.
pub fn verify_only_writable_by_trusted(path: &Path, trusted_uid: u32) -> Result<(), String> {
    let meta = std::fs::metadata(path).map_err(|e| format!("{}: {e}", path.display()))?;
    let mode = meta.permissions().mode();
    if meta.uid() != 0 && meta.uid() != trusted_uid {
        return Err(format!(
            "{} is owned by uid {}, not root",
            path.display(),
            meta.uid()
        ));
    }
    if mode & 0o002 != 0 {
        return Err(format!("{} is world writable", path.display()));
    }
    if mode & 0o020 != 0 && !TRUSTED_GROUPS.contains(&meta.gid()) {
        return Err(format!(
            "{} is writable by untrusted group {}",
            path.display(),
            meta.gid()
        ));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// PrivilegedScriptRunner
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct PrivilegedScriptRunner {
    trusted_uid: u32,
    verbosity: u8,
    current_exe: Option<PathBuf>,
}

impl PrivilegedScriptRunner {
    pub fn new(trusted_uid: u32, verbosity: u8, current_exe: Option<PathBuf>) -> Self {
        Self {
            trusted_uid,
            verbosity,
            current_exe,
        }
    }

    /// Run `script` with the run type as its only argument and return its
    /// exit code. A missing, skipped or unspawnable script yields 0.
    pub fn run_hook(&self, script: &Path, label: &str, run_type: RunType) -> i32 {
        if !script.exists() {
            tracing::debug!("no {label} script at {}", script.display());
            return 0;
        }

        if let Err(reason) = verify_only_writable_by_trusted(script, self.trusted_uid) {
            if self.running_program_is_insecure() {
                tracing::warn!(
                    "{reason}; running {label} anyway because this program has the same exposure"
                );
            } else {
                tracing::warn!("skipping {label} script: {reason}");
                return 0;
            }
        }

        tracing::info!("performing {label} tasks");
        let output = Command::new(script)
            .arg(run_type.as_str())
            .env(VERBOSITY_ENV, self.verbosity.to_string())
            .stdin(Stdio::null())
            .output();
        let output = match output {
            Ok(o) => o,
            Err(e) => {
                tracing::warn!("could not run {label} script {}: {e}", script.display());
                return 0;
            }
        };

        for line in String::from_utf8_lossy(&output.stdout).lines() {
            tracing::info!("{label} stdout: {line}");
        }
        for line in String::from_utf8_lossy(&output.stderr).lines() {
            tracing::info!("{label} stderr: {line}");
        }

        let code = output
            .status
            .code()
            .or_else(|| output.status.signal().map(|s| -s))
            .unwrap_or(1);
        tracing::info!("{label} script exited with status {code}");
        code
    }

    fn running_program_is_insecure(&self) -> bool {
        match &self.current_exe {
            Some(exe) => verify_only_writable_by_trusted(exe, self.trusted_uid).is_err(),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn owner_uid(path: &Path) -> u32 {
        std::fs::metadata(path).unwrap().uid()
    }

    fn write_script(dir: &Path, name: &str, body: &str, mode: u32) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(mode)).unwrap();
        path
    }

    #[test]
    fn missing_script_is_success() {
        let dir = TempDir::new().unwrap();
        let runner = PrivilegedScriptRunner::new(0, 1, None);
        assert_eq!(
            runner.run_hook(&dir.path().join("preflight"), "preflight", RunType::Auto),
            0
        );
    }

    #[test]
    fn world_writable_is_rejected() {
        let dir = TempDir::new().unwrap();
        let script = write_script(dir.path(), "preflight", "exit 0", 0o757);
        let uid = owner_uid(&script);
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o777)).unwrap();
        let err = verify_only_writable_by_trusted(&script, uid).unwrap_err();
        assert!(err.contains("world writable"));
    }

    #[test]
    fn foreign_owner_is_rejected() {
        let dir = TempDir::new().unwrap();
        let script = write_script(dir.path(), "preflight", "exit 0", 0o755);
        let uid = owner_uid(&script);
        if uid == 0 {
            // Root owns everything it creates; nothing foreign to test.
            return;
        }
        assert!(verify_only_writable_by_trusted(&script, uid + 1).is_err());
        assert!(verify_only_writable_by_trusted(&script, uid).is_ok());
    }

    #[test]
    fn hook_exit_code_and_argument_pass_through() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("args");
        let script = write_script(
            dir.path(),
            "preflight",
            &format!(
                "echo \"$1 $MUNKI_VERBOSITY_LEVEL\" > '{}'\nexit 3",
                out.display()
            ),
            0o755,
        );
        let runner = PrivilegedScriptRunner::new(owner_uid(&script), 2, None);
        assert_eq!(
            runner.run_hook(&script, "preflight", RunType::ManualCheck),
            3
        );
        assert_eq!(
            std::fs::read_to_string(&out).unwrap().trim(),
            "manualcheck 2"
        );
    }

    #[test]
    fn insecure_script_skipped_when_program_is_secure() {
        let dir = TempDir::new().unwrap();
        let script = write_script(dir.path(), "postflight", "exit 9", 0o755);
        let exe = write_script(dir.path(), "managedsoftwareupdate", "exit 0", 0o755);
        let uid = owner_uid(&script);
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o777)).unwrap();

        let runner = PrivilegedScriptRunner::new(uid, 1, Some(exe.clone()));
        assert_eq!(runner.run_hook(&script, "postflight", RunType::Auto), 0);

        // Same exposure on the program itself: the script runs.
        std::fs::set_permissions(&exe, std::fs::Permissions::from_mode(0o777)).unwrap();
        assert_eq!(runner.run_hook(&script, "postflight", RunType::Auto), 9);
    }
}
