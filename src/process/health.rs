//! Bounded-time condition polling
//!
//! A single-threaded retry loop used for every "wait until X" in the
//! supervisor: wallet-api answering its first RPC call, a node pid
//! appearing, a terminated process leaving the table. Timing out is a
//! value, not a panic, so callers pick their own fallback.

use std::time::{Duration, Instant};

/// Repeatedly evaluate `probe` until it returns true or `timeout` elapses.
/// Sleeps `interval` between attempts. Returns whether the probe succeeded.
pub fn wait_for<F>(mut probe: F, interval: Duration, timeout: Duration) -> bool
where
    F: FnMut() -> bool,
{
    let start = Instant::now();
    loop {
        if probe() {
            return true;
        }
        if start.elapsed() >= timeout {
            return false;
        }
        std::thread::sleep(interval);
    }
}
