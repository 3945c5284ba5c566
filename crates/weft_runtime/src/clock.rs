//! Monotonic clock in microseconds.

use std::sync::LazyLock;
use std::time::{Duration, Instant};

/// Reference point for all microsecond timestamps in the process.
static EPOCH: LazyLock<Instant> = LazyLock::new(Instant::now);

/// Microseconds elapsed since the process epoch.
pub fn monotonic_micros() -> u64 {
    u64::try_from(EPOCH.elapsed().as_micros()).unwrap_or(u64::MAX)
}

/// Convert a microsecond timestamp back to an [`Instant`].
///
/// Returns `None` if the platform cannot represent the timestamp.
pub fn instant_at(micros: u64) -> Option<Instant> {
    EPOCH.checked_add(Duration::from_micros(micros))
}
