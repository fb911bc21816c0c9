//! Monotonic time sources for the limiters.

use std::time::Instant;

/// A monotonic time source.
///
/// Limiters never read the system clock directly; they ask their `Clock`
/// so that tests can drive time explicitly.
pub trait Clock: Send + Sync {
    /// The current instant.
    fn now(&self) -> Instant;
}

/// Clock backed by [`Instant::now`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    #[inline]
    fn now(&self) -> Instant {
        Instant::now()
    }
}

impl<C: Clock + ?Sized> Clock for std::sync::Arc<C> {
    #[inline]
    fn now(&self) -> Instant {
        (**self).now()
    }
}

#[cfg(any(test, feature = "testing"))]
pub use manual::ManualClock;

#[cfg(any(test, feature = "testing"))]
mod manual {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;
    use std::time::Duration;

    /// A clock that only moves when told to.
    ///
    /// Clones share the same underlying time, so a test can keep one handle
    /// and hand another to the limiter under test.
    #[derive(Debug, Clone)]
    pub struct ManualClock {
        origin: Instant,
        offset: Arc<Mutex<Duration>>,
    }

    impl ManualClock {
        /// Create a clock frozen at the current instant.
        pub fn new() -> Self {
            Self {
                origin: Instant::now(),
                offset: Arc::new(Mutex::new(Duration::ZERO)),
            }
        }

        /// Move time forward by `by`.
        pub fn advance(&self, by: Duration) {
            *self.offset.lock() += by;
        }

        /// Total time advanced since the clock was created.
        pub fn elapsed(&self) -> Duration {
            *self.offset.lock()
        }
    }

    impl Default for ManualClock {
        fn default() -> Self {
            Self::new()
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> Instant {
            self.origin + *self.offset.lock()
        }
    }
}
