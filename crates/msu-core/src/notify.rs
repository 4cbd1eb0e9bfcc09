use crate::error::Result;
use crate::host::Host;
use crate::state::ClientState;
use chrono::{DateTime, Duration, Utc};
use std::path::Path;

/// A positive interval is shortened by this much so a daily cadence does
/// not drift later each day.
pub const INTERVAL_GRACE_HOURS: i64 = 6;

/// How long the notify marker stays on disk.
pub const MARKER_PULSE: std::time::Duration = std::time::Duration::from_millis(500);

/// Earliest time the user may be notified again. `None` when no
/// notification has been recorded. An interval beyond the calendar range
/// saturates: never again when positive, always when negative.
pub fn next_notify_date(last_notified: Option<DateTime<Utc>>, days: i64) -> Option<DateTime<Utc>> {
    let last = last_notified?;
    let next = Duration::try_days(days)
        .and_then(|interval| {
            if days > 0 {
                interval.checked_sub(&Duration::hours(INTERVAL_GRACE_HOURS))
            } else {
                Some(interval)
            }
        })
        .and_then(|interval| last.checked_add_signed(interval));
    Some(next.unwrap_or(if days > 0 {
        DateTime::<Utc>::MAX_UTC
    } else {
        DateTime::<Utc>::MIN_UTC
    }))
}

/// Decide whether to notify now. A positive answer records `now` as the
/// last-notified date and persists it before returning.
pub fn should_notify(
    force: bool,
    now: DateTime<Utc>,
    state: &mut ClientState,
    days: i64,
) -> Result<bool> {
    let due = match next_notify_date(state.last_notified_date, days) {
        Some(next) => now >= next,
        None => true,
    };
    if !(force || due) {
        tracing::debug!("user was notified recently; not notifying again yet");
        return Ok(false);
    }
    state.last_notified_date = Some(now);
    state.save()?;
    Ok(true)
}

/// Forget the last notification so the next round notifies immediately.
pub fn clear_last_notified(state: &mut ClientState) -> Result<()> {
    if state.last_notified_date.take().is_some() {
        state.save()?;
    }
    Ok(())
}

/// Pulse the marker file the companion UI watches: create, wait, delete.
pub fn notify_user(marker: &Path, host: &dyn Host) -> Result<()> {
    crate::io::touch(marker)?;
    host.sleep(MARKER_PULSE);
    crate::io::remove_if_exists(marker)?;
    Ok(())
}
