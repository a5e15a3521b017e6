//! Fixed-window rate limiter.
//!
//! Each key gets a counter for the current 60-second window. Windows are
//! aligned to wall-clock minutes and replaced lazily the first time a key is
//! seen in a new window, so no background sweep is needed.
//!
//! Being a fixed window, a client can burst up to twice its limit across a
//! window boundary.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use chrono::Utc;
use serde::Serialize;
use thiserror::Error;

use crate::metrics::RATE_LIMIT_REJECTIONS;

/// Window length in seconds.
pub const WINDOW_SECS: i64 = 60;

/// Counter state for one key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateWindow {
    /// Unix timestamp of the window start.
    pub window_start: i64,
    pub count: u32,
}

/// Outcome of an admitted request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RateLimitStatus {
    pub limit: u32,
    pub remaining: u32,
    /// Unix timestamp at which the window resets.
    pub reset_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RateLimitError {
    #[error("rate limit of {limit} requests per minute exceeded, retry in {retry_after_secs}s")]
    Exceeded {
        retry_after_secs: u64,
        limit: u32,
        remaining: u32,
        reset_at: i64,
    },
}

/// Admission control keyed by credential identity.
pub trait RateLimiter: Send + Sync {
    /// Count one request against `key` and fail once `limit` is exceeded.
    fn check(&self, key: &str, limit: u32) -> Result<RateLimitStatus, RateLimitError>;
}

/// Process-local fixed-window limiter.
#[derive(Debug, Default)]
pub struct FixedWindowRateLimiter {
    windows: Mutex<HashMap<String, RateWindow>>,
}

impl FixedWindowRateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// [`RateLimiter::check`] against an explicit clock.
    pub fn check_at(
        &self,
        key: &str,
        limit: u32,
        now: i64,
    ) -> Result<RateLimitStatus, RateLimitError> {
        let window_start = now.div_euclid(WINDOW_SECS) * WINDOW_SECS;
        let reset_at = window_start + WINDOW_SECS;

        // A poisoned map still holds valid counters.
        let mut windows = self.windows.lock().unwrap_or_else(PoisonError::into_inner);
        let window = windows.entry(key.to_string()).or_insert(RateWindow {
            window_start,
            count: 0,
        });

        if window.window_start != window_start {
            *window = RateWindow {
                window_start,
                count: 0,
            };
        }

        if window.count >= limit {
            RATE_LIMIT_REJECTIONS.inc();
            return Err(RateLimitError::Exceeded {
                retry_after_secs: (reset_at - now).max(0) as u64,
                limit,
                remaining: 0,
                reset_at,
            });
        }

        window.count += 1;
        Ok(RateLimitStatus {
            limit,
            remaining: limit - window.count,
            reset_at,
        })
    }

    /// Current window for `key`, if one has been opened.
    pub fn window(&self, key: &str) -> Option<RateWindow> {
        self.windows
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .copied()
    }
}

impl RateLimiter for FixedWindowRateLimiter {
    fn check(&self, key: &str, limit: u32) -> Result<RateLimitStatus, RateLimitError> {
        self.check_at(key, limit, Utc::now().timestamp())
    }
}
