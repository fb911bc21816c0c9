//! Leaky bucket rate limiter.

use parking_lot::Mutex;
use std::time::Instant;
use tracing::{debug, trace};

use super::clock::{Clock, SystemClock};
use super::limiter::{admissible, RateLimiter};

/// A backlog that drains continuously at a fixed rate.
///
/// Admitted work is added to the backlog; a request is admitted only if it
/// fits in the space left below `capacity`. The bucket starts full, so
/// nothing is admitted until some of the initial backlog has drained.
pub struct LeakyBucket<C: Clock = SystemClock> {
    capacity: u64,
    /// Units drained per second
    leak_rate: f64,
    clock: C,
    state: Mutex<LeakyBucketState>,
}

struct LeakyBucketState {
    /// Pending backlog, `0 ..= capacity`
    level: f64,
    last_leak: Instant,
    closed: bool,
}

impl LeakyBucket<SystemClock> {
    /// Create a full leaky bucket reading the system clock.
    pub fn new(capacity: u64, leak_rate: f64) -> Self {
        Self::with_clock(capacity, leak_rate, SystemClock)
    }
}

impl<C: Clock> LeakyBucket<C> {
    /// Create a full leaky bucket driven by `clock`.
    pub fn with_clock(capacity: u64, leak_rate: f64, clock: C) -> Self {
        let last_leak = clock.now();
        Self {
            capacity,
            leak_rate,
            clock,
            state: Mutex::new(LeakyBucketState {
                level: capacity as f64,
                last_leak,
                closed: false,
            }),
        }
    }

    /// Backlog as of the last call to `allow`, without applying the leak.
    pub fn level(&self) -> f64 {
        self.state.lock().level
    }
}

impl<C: Clock> RateLimiter for LeakyBucket<C> {
    fn allow(&self, n: i64) -> bool {
        let Some(requested) = admissible(n, self.capacity) else {
            trace!(requested = n, capacity = self.capacity, "Leaky bucket request can never be admitted");
            return false;
        };

        let mut state = self.state.lock();
        if state.closed {
            return false;
        }

        let now = self.clock.now();
        let elapsed = now.saturating_duration_since(state.last_leak);
        state.level = (state.level - elapsed.as_secs_f64() * self.leak_rate).max(0.0);
        state.last_leak = now;

        let allowed = state.level + requested as f64 <= self.capacity as f64;
        if allowed {
            state.level += requested as f64;
        }

        trace!(requested, level = state.level, allowed, "Leaky bucket decision");
        allowed
    }

    fn stop(&self) {
        let mut state = self.state.lock();
        if !state.closed {
            state.closed = true;
            debug!(capacity = self.capacity, "Leaky bucket stopped");
        }
    }

    fn is_stopped(&self) -> bool {
        self.state.lock().closed
    }
}
