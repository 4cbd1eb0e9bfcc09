use std::sync::atomic::{AtomicBool, Ordering};

static TERMINATION_REQUESTED: AtomicBool = AtomicBool::new(false);

extern "C" fn on_sigterm(_signum: libc::c_int) {
    // Only async-signal-safe work here.
    TERMINATION_REQUESTED.store(true, Ordering::SeqCst);
}

/// Route SIGTERM to a flag the run loop polls. No other signal is touched.
pub fn install_sigterm_handler() {
    let handler: extern "C" fn(libc::c_int) = on_sigterm;
    unsafe {
        libc::signal(libc::SIGTERM, handler as libc::sighandler_t);
    }
}

pub fn termination_requested() -> bool {
    TERMINATION_REQUESTED.load(Ordering::SeqCst)
}
