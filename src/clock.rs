// src/clock.rs  —  Monotonic microsecond timestamps + deadline sleeps

use std::sync::OnceLock;
use std::time::{Duration, Instant};

fn epoch() -> Instant {
    static EPOCH: OnceLock<Instant> = OnceLock::new();
    *EPOCH.get_or_init(Instant::now)
}

/// Microseconds elapsed on the monotonic clock since the process first asked.
///
/// All durations in this crate are microseconds; receive-side timestamps fed
/// to [`crate::receiver::Receiver`] only need to share a monotonic origin,
/// which this provides.
pub fn now_usecs() -> u64 {
    epoch().elapsed().as_micros() as u64
}

/// Sleep until an absolute deadline on the monotonic clock.
///
/// Re-sleeps after early wakeups, so an interrupted sleep still lands on the
/// deadline instead of drifting.
pub fn sleep_until(deadline: Instant) {
    loop {
        let now = Instant::now();
        if now >= deadline {
            return;
        }
        std::thread::sleep(deadline - now);
    }
}

/// Sleep for a relative number of microseconds (absolute-deadline loop).
pub fn sleep_usecs(usecs: u64) {
    sleep_until(Instant::now() + Duration::from_micros(usecs));
}
