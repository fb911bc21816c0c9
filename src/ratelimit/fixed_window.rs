//! Fixed window counter rate limiter.

use parking_lot::Mutex;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

use super::clock::{Clock, SystemClock};
use super::limiter::{admissible, RateLimiter};

/// A counter that resets at fixed, back-to-back intervals.
///
/// Windows are aligned to the instant the limiter was created. The first
/// call observed in a new window resets the count to zero; excess from a
/// previous window is never carried over.
pub struct FixedWindow<C: Clock = SystemClock> {
    window_size: Duration,
    capacity: u64,
    clock: C,
    state: Mutex<FixedWindowState>,
}

struct FixedWindowState {
    /// Start of the current window
    window_start: Instant,
    /// Units admitted in the current window
    count: u64,
    closed: bool,
}

impl FixedWindowState {
    /// Advance `window_start` to the window containing `now`.
    ///
    /// Returns `true` if a new window began.
    fn roll(&mut self, now: Instant, window_size: Duration) -> bool {
        let elapsed = now.saturating_duration_since(self.window_start).as_nanos();
        let window = window_size.as_nanos().max(1);
        let periods = elapsed / window;
        if periods == 0 {
            return false;
        }

        let advance = periods.saturating_mul(window);
        self.window_start += Duration::from_nanos(u64::try_from(advance).unwrap_or(u64::MAX));
        self.count = 0;
        true
    }
}

impl FixedWindow<SystemClock> {
    /// Create a fixed window limiter reading the system clock.
    pub fn new(window_size: Duration, capacity: u64) -> Self {
        Self::with_clock(window_size, capacity, SystemClock)
    }
}

impl<C: Clock> FixedWindow<C> {
    /// Create a fixed window limiter driven by `clock`.
    pub fn with_clock(window_size: Duration, capacity: u64, clock: C) -> Self {
        let window_start = clock.now();
        Self {
            window_size,
            capacity,
            clock,
            state: Mutex::new(FixedWindowState {
                window_start,
                count: 0,
                closed: false,
            }),
        }
    }

    /// Units admitted in the window recorded by the last call to `allow`.
    pub fn count(&self) -> u64 {
        self.state.lock().count
    }
}

impl<C: Clock> RateLimiter for FixedWindow<C> {
    fn allow(&self, n: i64) -> bool {
        let Some(requested) = admissible(n, self.capacity) else {
            trace!(requested = n, capacity = self.capacity, "Fixed window request can never be admitted");
            return false;
        };

        let mut state = self.state.lock();
        if state.closed {
            return false;
        }

        if state.roll(self.clock.now(), self.window_size) {
            trace!(window_ms = self.window_size.as_millis() as u64, "Fixed window rolled over");
        }

        let allowed = state.count.saturating_add(requested) <= self.capacity;
        if allowed {
            state.count += requested;
        }

        trace!(requested, count = state.count, allowed, "Fixed window decision");
        allowed
    }

    fn stop(&self) {
        let mut state = self.state.lock();
        if !state.closed {
            state.closed = true;
            debug!(capacity = self.capacity, "Fixed window stopped");
        }
    }

    fn is_stopped(&self) -> bool {
        self.state.lock().closed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ratelimit::clock::ManualClock;

    fn window(size: Duration, capacity: u64) -> (FixedWindow<ManualClock>, ManualClock) {
        let clock = ManualClock::new();
        (FixedWindow::with_clock(size, capacity, clock.clone()), clock)
    }

    #[test]
    fn test_window_scenario() {
        let (limiter, clock) = window(Duration::from_secs(1), 15);

        assert!(limiter.allow(5));
        assert!(limiter.allow(10));
        assert!(!limiter.allow(1), "window is full");

        clock.advance(Duration::from_secs(1));
        assert!(limiter.allow(15), "new window");

        clock.advance(Duration::from_secs(1));
        assert!(!limiter.allow(16), "larger than the window");
        assert!(!limiter.allow(0));
        assert!(!limiter.allow(-1));
    }

    #[test]
    fn test_reset_happens_exactly_at_boundary() {
        let (limiter, clock) = window(Duration::from_millis(100), 1);

        assert!(limiter.allow(1));
        clock.advance(Duration::from_millis(99));
        assert!(!limiter.allow(1));
        clock.advance(Duration::from_millis(1));
        assert!(limiter.allow(1));
    }

    #[test]
    fn test_windows_stay_aligned_after_idle_gap() {
        let (limiter, clock) = window(Duration::from_millis(100), 2);

        // Idle for two and a half windows; the current window started at 200ms.
        clock.advance(Duration::from_millis(250));
        assert!(limiter.allow(2));

        clock.advance(Duration::from_millis(49));
        assert!(!limiter.allow(1));
        clock.advance(Duration::from_millis(1));
        assert!(limiter.allow(2));
    }

    #[test]
    fn test_excess_is_not_carried_over() {
        let (limiter, clock) = window(Duration::from_secs(1), 10);

        assert!(limiter.allow(10));
        assert!(!limiter.allow(5));

        clock.advance(Duration::from_secs(1));
        assert!(limiter.allow(10));
        assert_eq!(limiter.count(), 10);
    }

    #[test]
    fn test_rollover_resets_counter_on_first_call() {
        let (limiter, clock) = window(Duration::from_secs(1), 10);

        assert!(limiter.allow(7));
        clock.advance(Duration::from_secs(3));
        // Stale until a call observes the new window.
        assert_eq!(limiter.count(), 7);

        assert!(limiter.allow(1));
        assert_eq!(limiter.count(), 1);
    }

    #[test]
    fn test_invalid_requests_leave_state_alone() {
        let (limiter, _clock) = window(Duration::from_secs(1), 10);
        assert!(limiter.allow(4));

        assert!(!limiter.allow(0));
        assert!(!limiter.allow(-2));
        assert!(!limiter.allow(11));

        assert_eq!(limiter.count(), 4);
    }

    #[test]
    fn test_zero_window_resets_on_every_tick() {
        let (limiter, clock) = window(Duration::ZERO, 1);

        assert!(limiter.allow(1));
        clock.advance(Duration::from_nanos(1));
        assert!(limiter.allow(1));
    }

    #[test]
    fn test_stop_denies() {
        let (limiter, clock) = window(Duration::from_secs(1), 10);
        limiter.stop();

        assert!(!limiter.allow(1));
        clock.advance(Duration::from_secs(1));
        assert!(!limiter.allow(1));
        assert!(limiter.is_stopped());
    }

    #[test]
    fn test_concurrent_callers_never_exceed_capacity() {
        let (limiter, _clock) = window(Duration::from_secs(1), 10);

        let admitted: u64 = std::thread::scope(|s| {
            let handles: Vec<_> = (0..10)
                .map(|n| {
                    let limiter = &limiter;
                    s.spawn(move || if limiter.allow(n) { n as u64 } else { 0 })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).sum()
        });

        assert!(admitted <= 10);
        assert_eq!(limiter.count(), admitted);
    }

    #[test]
    fn test_system_clock_smoke() {
        let limiter = FixedWindow::new(Duration::from_millis(200), 3);
        assert!(limiter.allow(3));
        assert!(!limiter.allow(1));
        std::thread::sleep(Duration::from_millis(450));
        assert!(limiter.allow(3));
    }
}
