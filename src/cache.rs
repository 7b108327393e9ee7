//! Freshness tracking for the last successful status query.
//!
//! A cache time of `-1` is infinite: the status is queried once and never
//! again. A cache time of `0` means every read goes to the network.

use parking_lot::Mutex;
use std::time::Duration;
use tokio::time::Instant;

/// Marker for a cache that never expires.
pub const INFINITE: i64 = -1;

pub struct Cache {
    cache_time: i64,
    last_queried: Mutex<Option<Instant>>,
}

impl Cache {
    /// Create a cache from the configured time in milliseconds.
    ///
    /// `None` falls back to `default_time`.
    pub fn new(cache_time: Option<i64>, default_time: i64) -> Self {
        Self {
            cache_time: cache_time.unwrap_or(default_time),
            last_queried: Mutex::new(None),
        }
    }

    pub fn is_infinite(&self) -> bool {
        self.cache_time == INFINITE
    }

    /// Whether the cached value is stale and the source must be queried.
    pub fn should_query(&self) -> bool {
        let Some(last) = *self.last_queried.lock() else {
            return true;
        };

        if self.is_infinite() {
            return false;
        }

        // Negative values other than INFINITE behave like 0
        let ttl = Duration::from_millis(self.cache_time.max(0) as u64);
        last.elapsed() >= ttl
    }

    /// Record a successful query at the current instant.
    pub fn queried(&self) {
        *self.last_queried.lock() = Some(Instant::now());
    }
}
