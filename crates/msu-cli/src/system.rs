//! The live machine: sessions and processes via sysinfo, free space via
//! statvfs, power actions via the system tools.

use crate::signals;
use msu_core::host::Host;
use msu_core::{probe, MsuError, Result};
use std::ffi::CString;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::MetadataExt;
use std::path::Path;
use std::process::Command;
use std::time::Duration;
use sysinfo::{Pid, Process, System, Users};

const PROGRAM_NAME: &str = "managedsoftwareupdate";
const LOGIN_WINDOW: &str = "loginwindow";
const CONSOLE_DEVICE: &str = "/dev/console";
const SHUTDOWN: &str = "/sbin/shutdown";
const LAUNCHCTL: &str = "/bin/launchctl";
const LOGOUT_HELPER_LABEL: &str = "com.googlecode.munki.logouthelper";

pub struct SystemHost {
    pid: Option<Pid>,
}

impl SystemHost {
    pub fn new() -> Self {
        Self {
            pid: sysinfo::get_current_pid().ok(),
        }
    }

    fn process_table() -> System {
        let mut sys = System::new();
        sys.refresh_processes();
        sys
    }
}

/// True if the process is another copy of this program. The kernel may
/// truncate the short name, so the invoked path is checked as well.
fn is_program(process: &Process) -> bool {
    if process.name() == PROGRAM_NAME {
        return true;
    }
    process
        .cmd()
        .first()
        .and_then(|arg0| Path::new(arg0).file_name())
        .is_some_and(|name| name == PROGRAM_NAME)
}

fn run_system_command(program: &str, args: &[&str], phase: &str) -> Result<()> {
    let status = Command::new(program)
        .args(args)
        .status()
        .map_err(|e| MsuError::collaborator(phase, format!("could not run {program}: {e}")))?;
    if !status.success() {
        return Err(MsuError::collaborator(
            phase,
            format!("{program} exited with {status}"),
        ));
    }
    Ok(())
}

impl Host for SystemHost {
    fn gui_session_active(&self) -> bool {
        Self::process_table()
            .processes()
            .values()
            .any(|p| p.name() == LOGIN_WINDOW && p.user_id().is_some_and(|uid| **uid != 0))
    }

    fn console_user(&self) -> Option<String> {
        let uid = std::fs::metadata(CONSOLE_DEVICE).ok()?.uid();
        if uid == 0 {
            return Some(LOGIN_WINDOW.to_string());
        }
        let users = Users::new_with_refreshed_list();
        let name = users
            .list()
            .iter()
            .find(|u| **u.id() == uid)
            .map(|u| u.name().to_string());
        Some(name.unwrap_or_else(|| uid.to_string()))
    }

    fn idle_seconds(&self) -> u64 {
        probe::sample_idle_seconds()
    }

    fn network_up(&self) -> bool {
        probe::network_up()
    }

    fn other_instance_running(&self) -> bool {
        Self::process_table()
            .processes()
            .values()
            .any(|p| Some(p.pid()) != self.pid && is_program(p))
    }

    fn process_running(&self, name: &str) -> bool {
        Self::process_table()
            .processes()
            .values()
            .any(|p| p.name() == name)
    }

    fn termination_requested(&self) -> bool {
        signals::termination_requested()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }

    fn restart_now(&self) -> Result<()> {
        run_system_command(SHUTDOWN, &["-r", "now"], "restart")
    }

    fn start_logout_helper(&self) -> Result<()> {
        run_system_command(LAUNCHCTL, &["start", LOGOUT_HELPER_LABEL], "logout helper")
    }

    fn available_disk_space_kb(&self, path: &Path) -> Option<u64> {
        let c_path = CString::new(path.as_os_str().as_bytes()).ok()?;
        let mut stat: libc::statvfs = unsafe { std::mem::zeroed() };
        let rc = unsafe { libc::statvfs(c_path.as_ptr(), &mut stat) };
        if rc != 0 {
            tracing::debug!(
                "statvfs {} failed: {}",
                path.display(),
                std::io::Error::last_os_error()
            );
            return None;
        }
        #[allow(clippy::unnecessary_cast)]
        let free = stat.f_bavail as u64 * stat.f_frsize as u64;
        Some(free / 1024)
    }
}
