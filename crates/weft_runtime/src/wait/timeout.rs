//! Conversion of guest timeouts to absolute deadlines.

use crate::error::fatal;

/// Deadline value meaning "block until woken".
pub const WAIT_FOREVER: u64 = u64::MAX;

/// Resolve a relative timeout in milliseconds against `start` (microseconds on
/// the monotonic clock).
///
/// NaN and infinite timeouts wait forever, non-positive timeouts poll. A
/// deadline whose addition overflows the clock aborts the process.
pub fn resolve_deadline(start: u64, timeout_ms: f64) -> u64 {
    match checked_deadline(start, timeout_ms) {
        Some(deadline) => deadline,
        None => fatal("wait deadline overflowed the monotonic clock"),
    }
}

/// [`resolve_deadline`] without the abort: `None` on overflow.
pub fn checked_deadline(start: u64, timeout_ms: f64) -> Option<u64> {
    let micros = timeout_ms * 1000.0;
    if !micros.is_finite() {
        return Some(WAIT_FOREVER);
    }
    if micros <= 0.0 {
        return Some(start);
    }
    // Not representable in the microsecond counter.
    if micros > (u64::MAX - 1) as f64 {
        return Some(WAIT_FOREVER);
    }
    start.checked_add(micros as u64)
}
