//! Outgoing byte-rate pacing.
//!
//! A [`LoadBalancer`] spaces sends so that, on average, no more than a configured
//! number of bytes per second leave the socket:
//! - after sending `n` bytes the next send is held back for `n * nanos_between_bytes`
//! - waiting uses the hybrid sleep from [`bytewire_core::time`], which stays accurate
//!   below a millisecond
//!
//! A rate of `0` makes the balancer inert: every send is allowed immediately.

use std::time::{Duration, Instant};

use bytewire_core::{
    config::Config,
    constants::NANOS_PER_SEC,
    time::{nanos_between, sleep_until, Clock, SystemClock},
};
use tracing::trace;

/// Paces outgoing bytes to a target rate.
#[derive(Debug, Clone)]
pub struct LoadBalancer<C: Clock = SystemClock> {
    clock: C,
    /// Target rate in bytes per second (0 = unlimited)
    max_bytes_per_sec: u32,
    /// Minimum spacing per sent byte
    nanos_between_bytes: u64,
    /// Time of the most recent send
    last_send: Option<Instant>,
    /// Delay owed by the most recent send
    next_send_timeout: u64,
}

impl LoadBalancer<SystemClock> {
    /// Creates a balancer for `max_bytes_per_sec` on the system clock.
    pub fn new(max_bytes_per_sec: u32) -> Self {
        Self::with_clock(max_bytes_per_sec, SystemClock)
    }

    /// Creates a balancer from `config.send_rate_limit`.
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.send_rate_limit)
    }
}

impl<C: Clock> LoadBalancer<C> {
    /// Creates a balancer driven by a custom clock.
    pub fn with_clock(max_bytes_per_sec: u32, clock: C) -> Self {
        let mut balancer = Self {
            clock,
            max_bytes_per_sec: 0,
            nanos_between_bytes: 0,
            last_send: None,
            next_send_timeout: 0,
        };
        balancer.set_rate(max_bytes_per_sec);
        balancer
    }

    /// Changes the target rate. `0` disables pacing.
    pub fn set_rate(&mut self, max_bytes_per_sec: u32) {
        self.max_bytes_per_sec = max_bytes_per_sec;
        self.nanos_between_bytes = if max_bytes_per_sec == 0 {
            0
        } else {
            (NANOS_PER_SEC / max_bytes_per_sec as u64).max(1)
        };
    }

    /// Target rate in bytes per second.
    pub fn rate(&self) -> u32 {
        self.max_bytes_per_sec
    }

    /// Spacing per byte in nanoseconds, 0 when inert.
    pub fn nanos_between_bytes(&self) -> u64 {
        self.nanos_between_bytes
    }

    /// True when pacing is disabled.
    pub fn is_inert(&self) -> bool {
        self.max_bytes_per_sec == 0
    }

    /// True if a send at `now` respects the rate.
    pub fn can_send(&self, now: Instant) -> bool {
        match self.last_send {
            None => true,
            Some(last) => nanos_between(last, now) >= self.next_send_timeout,
        }
    }

    /// [`can_send`](Self::can_send) at the clock's current time.
    pub fn can_send_now(&self) -> bool {
        self.can_send(self.clock.now())
    }

    /// Blocks until `bytes` may be sent, then records the send.
    pub fn wait_to_send(&mut self, bytes: usize) {
        if self.is_inert() {
            return;
        }
        if let Some(last) = self.last_send {
            let deadline = last + Duration::from_nanos(self.next_send_timeout);
            sleep_until(&self.clock, deadline);
        }
        let now = self.clock.now();
        self.notify_sent(now, bytes);
    }

    /// Records that `bytes` were sent at `now`.
    pub fn notify_sent(&mut self, now: Instant, bytes: usize) {
        self.last_send = Some(now);
        self.next_send_timeout = (bytes as u64).saturating_mul(self.nanos_between_bytes);
        trace!("Sent {} bytes, next send in {}ns", bytes, self.next_send_timeout);
    }
}
