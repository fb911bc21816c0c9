//! Token bucket rate limiter.

use parking_lot::Mutex;
use std::time::Instant;
use tracing::{debug, trace};

use super::clock::{Clock, SystemClock};
use super::limiter::{admissible, RateLimiter};

/// A bucket that refills continuously at a fixed rate up to its capacity.
///
/// Refill is computed lazily on every call from the time elapsed since the
/// previous call, so fractional accrual is carried forward rather than
/// rounded away. Requests consume whole units from the accrued pool.
pub struct TokenBucket<C: Clock = SystemClock> {
    /// Maximum number of tokens the bucket can hold
    capacity: u64,
    /// Tokens added per second of elapsed time
    refill_rate: f64,
    clock: C,
    state: Mutex<TokenBucketState>,
}

struct TokenBucketState {
    /// Tokens currently available, `0 ..= capacity`
    tokens: f64,
    last_refill: Instant,
    closed: bool,
}

impl TokenBucket<SystemClock> {
    /// Create a token bucket reading the system clock.
    ///
    /// `initial_tokens` is clamped to `capacity`.
    pub fn new(capacity: u64, tokens_per_second: f64, initial_tokens: u64) -> Self {
        Self::with_clock(capacity, tokens_per_second, initial_tokens, SystemClock)
    }
}

impl<C: Clock> TokenBucket<C> {
    /// Create a token bucket driven by `clock`.
    pub fn with_clock(capacity: u64, tokens_per_second: f64, initial_tokens: u64, clock: C) -> Self {
        let last_refill = clock.now();
        Self {
            capacity,
            refill_rate: tokens_per_second,
            clock,
            state: Mutex::new(TokenBucketState {
                tokens: initial_tokens.min(capacity) as f64,
                last_refill,
                closed: false,
            }),
        }
    }

    /// Tokens held as of the last call to `allow`, without applying refill.
    pub fn tokens(&self) -> f64 {
        self.state.lock().tokens
    }
}

impl<C: Clock> RateLimiter for TokenBucket<C> {
    fn allow(&self, n: i64) -> bool {
        let Some(requested) = admissible(n, self.capacity) else {
            trace!(requested = n, capacity = self.capacity, "Token bucket request can never be admitted");
            return false;
        };

        let mut state = self.state.lock();
        if state.closed {
            return false;
        }

        let now = self.clock.now();
        let elapsed = now.saturating_duration_since(state.last_refill);
        state.tokens = (state.tokens + elapsed.as_secs_f64() * self.refill_rate).min(self.capacity as f64);
        state.last_refill = now;

        let allowed = requested as f64 <= state.tokens;
        if allowed {
            state.tokens -= requested as f64;
        }

        trace!(requested, tokens = state.tokens, allowed, "Token bucket decision");
        allowed
    }

    fn stop(&self) {
        let mut state = self.state.lock();
        if !state.closed {
            state.closed = true;
            debug!(capacity = self.capacity, "Token bucket stopped");
        }
    }

    fn is_stopped(&self) -> bool {
        self.state.lock().closed
    }
}
