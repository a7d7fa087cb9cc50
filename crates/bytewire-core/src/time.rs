//! Monotonic clock and sleep utilities.

use std::{
    thread::{sleep, yield_now},
    time::{Duration, Instant},
};

use crate::constants::{SLEEP_THRESHOLD_NS, SPIN_THRESHOLD_NS};

/// Abstraction over a time source to improve testability.
pub trait Clock: Send + Sync + 'static {
    /// Returns the current time instant.
    fn now(&self) -> Instant;
}

/// System clock using `Instant::now()`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    #[inline]
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Nanoseconds elapsed from `earlier` to `later`, saturating at zero.
#[inline]
pub fn nanos_between(earlier: Instant, later: Instant) -> u64 {
    later.saturating_duration_since(earlier).as_nanos().min(u64::MAX as u128) as u64
}

/// Sleeps the current thread for roughly `millis` milliseconds.
pub fn sleep_ms(millis: u64) {
    sleep(Duration::from_millis(millis));
}

/// Waits until `deadline` using a tiered strategy.
///
/// OS sleeps are coarse on some platforms, so the wait sleeps for half of the remaining
/// time while more than 150µs remain, yields the timeslice below that and returns once
/// 80ns or less remain.
pub fn sleep_until<C: Clock + ?Sized>(clock: &C, deadline: Instant) {
    loop {
        let remaining = nanos_between(clock.now(), deadline);
        if remaining <= SPIN_THRESHOLD_NS {
            return;
        }
        if remaining < SLEEP_THRESHOLD_NS {
            yield_now();
        } else {
            sleep(Duration::from_nanos(remaining / 2));
        }
    }
}

/// Hybrid sleep for `nanos` nanoseconds on the system clock.
pub fn sleep_ns(nanos: u64) {
    let clock = SystemClock;
    let deadline = clock.now() + Duration::from_nanos(nanos);
    sleep_until(&clock, deadline);
}
