//! The admission-control capability shared by every algorithm.

use std::sync::Arc;

/// A non-blocking admission decision unit.
///
/// Callers ask `allow(n)` before performing `n` units of rate-limited work
/// and get an immediate answer. A denial covers every reason the request
/// cannot proceed right now: not enough capacity, a request that could
/// never fit, a non-positive request, or a stopped limiter.
///
/// Implementations are thread-safe and may be shared behind an `Arc`.
pub trait RateLimiter: Send + Sync {
    /// Decide whether `n` units may be consumed now.
    fn allow(&self, n: i64) -> bool;

    /// Close the limiter. Every later `allow` call denies.
    ///
    /// Safe to call more than once and concurrently with `allow`.
    fn stop(&self);

    /// Whether `stop` has been called.
    fn is_stopped(&self) -> bool;
}

impl<T: RateLimiter + ?Sized> RateLimiter for Box<T> {
    #[inline]
    fn allow(&self, n: i64) -> bool {
        (**self).allow(n)
    }

    #[inline]
    fn stop(&self) {
        (**self).stop()
    }

    #[inline]
    fn is_stopped(&self) -> bool {
        (**self).is_stopped()
    }
}

impl<T: RateLimiter + ?Sized> RateLimiter for Arc<T> {
    #[inline]
    fn allow(&self, n: i64) -> bool {
        (**self).allow(n)
    }

    #[inline]
    fn stop(&self) {
        (**self).stop()
    }

    #[inline]
    fn is_stopped(&self) -> bool {
        (**self).is_stopped()
    }
}

/// Validate a request size against a fixed capacity.
///
/// Returns the request as an unsigned amount when it is positive and no
/// larger than `capacity`, and `None` for requests that can never be
/// admitted.
#[inline]
pub(crate) fn admissible(n: i64, capacity: u64) -> Option<u64> {
    if n <= 0 {
        return None;
    }
    let n = n as u64;
    (n <= capacity).then_some(n)
}
