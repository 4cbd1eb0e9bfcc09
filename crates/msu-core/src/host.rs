use crate::error::Result;
use std::path::Path;
use std::time::Duration;

/// The machine the run executes on: sessions, idle time, processes,
/// power actions and the clock used for waiting.
///
/// Every blocking wait goes through [`Host::sleep`] so tests can run the
/// polling loops instantly.
pub trait Host {
    /// True if at least one user has an active graphical session.
    fn gui_session_active(&self) -> bool;

    /// Name of the user owning the console. `Some("loginwindow")` means the
    /// login screen is showing (possibly over a switched-out session).
    fn console_user(&self) -> Option<String>;

    /// Whole seconds since the last user input event.
    fn idle_seconds(&self) -> u64;

    /// True if a non-loopback interface holds an address.
    fn network_up(&self) -> bool;

    /// True if another orchestrator process is running.
    fn other_instance_running(&self) -> bool;

    /// True if a process with exactly this name is running.
    fn process_running(&self, name: &str) -> bool;

    /// True once SIGTERM has been received.
    fn termination_requested(&self) -> bool;

    fn sleep(&self, duration: Duration);

    /// Restart the machine immediately.
    fn restart_now(&self) -> Result<()>;

    /// Ask the system service manager to start the logout helper.
    fn start_logout_helper(&self) -> Result<()>;

    /// Free space, in kilobytes, on the volume holding `path`.
    fn available_disk_space_kb(&self, path: &Path) -> Option<u64>;
}
