//! Sliding window log rate limiter.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

use super::clock::{Clock, SystemClock};
use super::limiter::{admissible, RateLimiter};

/// A time-ordered log of recent grants evaluated over a trailing window.
///
/// An entry granted at `t` counts against the limit while
/// `now - t < window_size`; an entry exactly `window_size` old has expired.
/// Expired entries are pruned on every call, so the log holds at most the
/// grants made within one window.
pub struct SlidingWindow<C: Clock = SystemClock> {
    limit: u64,
    window_size: Duration,
    clock: C,
    state: Mutex<SlidingWindowState>,
}

struct SlidingWindowState {
    /// Grants in arrival order
    log: VecDeque<Grant>,
    /// Sum of `units` over `log`
    total: u64,
    closed: bool,
}

#[derive(Debug, Clone, Copy)]
struct Grant {
    at: Instant,
    units: u64,
}

impl SlidingWindowState {
    fn prune(&mut self, now: Instant, window_size: Duration) {
        while let Some(&front) = self.log.front() {
            if now.saturating_duration_since(front.at) < window_size {
                break;
            }
            self.total -= front.units;
            self.log.pop_front();
        }
    }
}

impl SlidingWindow<SystemClock> {
    /// Create a sliding window limiter reading the system clock.
    pub fn new(limit: u64, window_size: Duration) -> Self {
        Self::with_clock(limit, window_size, SystemClock)
    }
}

impl<C: Clock> SlidingWindow<C> {
    /// Create a sliding window limiter driven by `clock`.
    pub fn with_clock(limit: u64, window_size: Duration, clock: C) -> Self {
        Self {
            limit,
            window_size,
            clock,
            state: Mutex::new(SlidingWindowState {
                log: VecDeque::new(),
                total: 0,
                closed: false,
            }),
        }
    }

    /// Units held in the log as of the last call, without pruning.
    pub fn total(&self) -> u64 {
        self.state.lock().total
    }

    /// Number of grants held in the log as of the last call.
    pub fn entries(&self) -> usize {
        self.state.lock().log.len()
    }
}

impl<C: Clock> RateLimiter for SlidingWindow<C> {
    fn allow(&self, n: i64) -> bool {
        let Some(requested) = admissible(n, self.limit) else {
            trace!(requested = n, limit = self.limit, "Sliding window request can never be admitted");
            return false;
        };

        let mut state = self.state.lock();
        if state.closed {
            return false;
        }

        let now = self.clock.now();
        state.prune(now, self.window_size);

        let allowed = state.total.saturating_add(requested) <= self.limit;
        if allowed {
            state.log.push_back(Grant { at: now, units: requested });
            state.total += requested;
        }

        trace!(
            requested,
            total = state.total,
            entries = state.log.len(),
            allowed,
            "Sliding window decision"
        );
        allowed
    }

    fn stop(&self) {
        let mut state = self.state.lock();
        if !state.closed {
            state.closed = true;
            state.log = VecDeque::new();
            state.total = 0;
            debug!(limit = self.limit, "Sliding window stopped");
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

    fn window(limit: u64, size: Duration) -> (SlidingWindow<ManualClock>, ManualClock) {
        let clock = ManualClock::new();
        (SlidingWindow::with_clock(limit, size, clock.clone()), clock)
    }

    #[test]
    fn test_sliding_scenario() {
        let (limiter, clock) = window(15, Duration::from_millis(500));

        assert!(limiter.allow(5));
        assert!(limiter.allow(10));
        assert!(!limiter.allow(1), "window is full");

        clock.advance(Duration::from_millis(500));
        assert!(limiter.allow(15), "earlier grants slid out");

        clock.advance(Duration::from_millis(100));
        assert!(!limiter.allow(1), "last grant still in window");

        clock.advance(Duration::from_millis(400));
        assert!(limiter.allow(10), "window has slid");

        clock.advance(Duration::from_millis(1000));
        assert!(!limiter.allow(16), "larger than the limit");
        assert!(!limiter.allow(0));
        assert!(!limiter.allow(-1));
    }

    #[test]
    fn test_entry_exactly_window_old_has_expired() {
        let (limiter, clock) = window(1, Duration::from_millis(100));

        assert!(limiter.allow(1));
        clock.advance(Duration::from_millis(99));
        assert!(!limiter.allow(1));
        clock.advance(Duration::from_millis(1));
        assert!(limiter.allow(1));
    }

    #[test]
    fn test_window_slides_grant_by_grant() {
        let (limiter, clock) = window(3, Duration::from_millis(300));

        assert!(limiter.allow(1)); // t=0
        clock.advance(Duration::from_millis(100));
        assert!(limiter.allow(1)); // t=100
        clock.advance(Duration::from_millis(100));
        assert!(limiter.allow(1)); // t=200
        assert!(!limiter.allow(1));

        clock.advance(Duration::from_millis(100)); // t=300, first grant expires
        assert!(limiter.allow(1));
        assert!(!limiter.allow(1));

        clock.advance(Duration::from_millis(100)); // t=400, second grant expires
        assert!(limiter.allow(1));
        assert_eq!(limiter.entries(), 3);
        assert_eq!(limiter.total(), 3);
    }

    #[test]
    fn test_pruning_bounds_the_log() {
        let (limiter, clock) = window(1000, Duration::from_millis(100));

        for _ in 0..1000 {
            assert!(limiter.allow(1));
            clock.advance(Duration::from_millis(10));
        }

        // One grant per 10ms over a 100ms window.
        assert!(limiter.entries() <= 10);
        assert!(limiter.total() <= 10);
    }

    #[test]
    fn test_denial_does_not_append() {
        let (limiter, _clock) = window(10, Duration::from_secs(1));

        assert!(limiter.allow(8));
        assert!(!limiter.allow(3));
        assert_eq!(limiter.entries(), 1);
        assert_eq!(limiter.total(), 8);
    }

    #[test]
    fn test_invalid_requests_leave_state_alone() {
        let (limiter, _clock) = window(10, Duration::from_secs(1));

        assert!(!limiter.allow(0));
        assert!(!limiter.allow(-1));
        assert!(!limiter.allow(11));
        assert_eq!(limiter.entries(), 0);
    }

    #[test]
    fn test_stop_releases_log() {
        let (limiter, clock) = window(10, Duration::from_secs(1));
        assert!(limiter.allow(4));

        limiter.stop();
        assert_eq!(limiter.entries(), 0);
        assert!(!limiter.allow(1));

        clock.advance(Duration::from_secs(5));
        assert!(!limiter.allow(1));
        assert!(limiter.is_stopped());
    }

    #[test]
    fn test_concurrent_callers_admit_exactly_limit() {
        let (limiter, _clock) = window(10, Duration::from_millis(500));

        let admitted = std::thread::scope(|s| {
            let handles: Vec<_> = (0..20)
                .map(|_| {
                    let limiter = &limiter;
                    s.spawn(move || limiter.allow(1))
                })
                .collect();
            handles
                .into_iter()
                .map(|h| h.join().unwrap())
                .filter(|&allowed| allowed)
                .count()
        });

        assert_eq!(admitted, 10);
    }

    #[test]
    fn test_system_clock_smoke() {
        let limiter = SlidingWindow::new(2, Duration::from_millis(200));
        assert!(limiter.allow(2));
        assert!(!limiter.allow(1));
        std::thread::sleep(Duration::from_millis(450));
        assert!(limiter.allow(2));
    }
}
