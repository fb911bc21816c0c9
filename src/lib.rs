//! Turnstile - In-process rate limiting primitives
//!
//! This crate provides self-contained admission-control decision units:
//! token bucket, leaky bucket, fixed window and sliding window limiters.
//! Each answers `allow(n)` immediately, is safe to share across threads,
//! and holds no state in common with any other instance.
//!
//! ```
//! use std::time::Duration;
//! use turnstile::ratelimit::{RateLimiter, SlidingWindow};
//!
//! let limiter = SlidingWindow::new(15, Duration::from_millis(500));
//! assert!(limiter.allow(5));
//! assert!(limiter.allow(10));
//! assert!(!limiter.allow(1));
//! limiter.stop();
//! ```

pub mod config;
pub mod error;
pub mod ratelimit;
pub mod simulate;

pub use ratelimit::RateLimiter;
