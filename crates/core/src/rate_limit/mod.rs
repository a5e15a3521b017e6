//! Per-credential admission control.

mod config;
mod limiter;

pub use config::RateLimitConfig;
pub use limiter::{
    FixedWindowRateLimiter, RateLimitError, RateLimitStatus, RateLimiter, RateWindow, WINDOW_SECS,
};
