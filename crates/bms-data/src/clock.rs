//! Monotonic tick clock, the host-side analog of the RTOS tick counter.

use std::time::Instant;

use once_cell::sync::Lazy;

static PROCESS_START: Lazy<Instant> = Lazy::new(Instant::now);

/// Milliseconds elapsed since the first call in this process.
///
/// Monotonic and cheap; every sample timestamp and deadline check in the
/// pipeline is expressed in these ticks.
pub fn ticks_now() -> u64 {
    PROCESS_START.elapsed().as_millis() as u64
}
