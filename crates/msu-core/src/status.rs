/// Channel to the companion status window. All calls are fire-and-forget:
/// implementations log their own delivery failures.
pub trait StatusUi {
    /// Start the status window if it is not already running.
    fn launch(&mut self);
    /// Bring the status window to the front.
    fn activate(&mut self);
    fn quit(&mut self);
    fn message(&mut self, text: &str);
    fn detail(&mut self, text: &str);
    /// Progress in percent; -1 shows an indeterminate bar.
    fn percent(&mut self, percent: i32);
    fn hide_stop_button(&mut self);
    fn restart_alert(&mut self);
    /// Tell listeners the set of pending updates may have changed.
    fn updates_changed(&mut self);
    /// True if the user pressed the stop button.
    fn stop_requested(&self) -> bool;
}
