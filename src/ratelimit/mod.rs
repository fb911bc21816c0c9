//! Rate limiting algorithms and the capability they share.

mod clock;
mod fixed_window;
mod leaky_bucket;
mod limiter;
mod sliding_window;
mod token_bucket;

pub use clock::{Clock, SystemClock};
#[cfg(any(test, feature = "testing"))]
pub use clock::ManualClock;
pub use fixed_window::FixedWindow;
pub use leaky_bucket::LeakyBucket;
pub use limiter::RateLimiter;
pub use sliding_window::SlidingWindow;
pub use token_bucket::TokenBucket;
