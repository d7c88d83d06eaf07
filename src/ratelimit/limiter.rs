//! Core rate limiter implementation.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace};

use super::clock::{Clock, SystemClock};
use super::entry::RateLimitEntry;
use super::policy::RateLimitConfig;
use super::store::RateLimitStore;
use crate::config::LimiterConfig;

/// Store size above which `check` sweeps expired entries inline.
pub const DEFAULT_EVICTION_THRESHOLD: usize = 10_000;

/// The outcome of a single admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitDecision {
    /// Whether the request was admitted (and already counted)
    pub allowed: bool,
    /// Admissions left in the current window
    pub remaining: u32,
    /// Epoch milliseconds at which the current window resets
    pub reset_time: u64,
}

impl RateLimitDecision {
    /// Time left until the window resets, measured from `now`.
    pub fn retry_after(&self, now: u64) -> Duration {
        Duration::from_millis(self.reset_time.saturating_sub(now))
    }

    /// The reset time as a UTC timestamp.
    pub fn reset_at(&self) -> DateTime<Utc> {
        i64::try_from(self.reset_time)
            .ok()
            .and_then(DateTime::<Utc>::from_timestamp_millis)
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    /// The reset time as ISO-8601 with millisecond precision, e.g. `2024-01-01T00:15:00.000Z`.
    pub fn reset_time_iso(&self) -> String {
        self.reset_at().to_rfc3339_opts(SecondsFormat::Millis, true)
    }
}

/// Fixed-window rate limiter.
///
/// Every identifier gets its own window, opened by its first admitted
/// request. `check` counts and decides in one step under the identifier's
/// store lock, so the limiter can be shared across threads behind an `Arc`.
///
/// Counters live in process memory only: each running instance enforces its
/// limits independently.
pub struct RateLimiter {
    /// Window state indexed by identifier
    store: RateLimitStore,
    /// Time source
    clock: Arc<dyn Clock>,
    /// Inline sweep trigger; `None` disables size-triggered eviction
    eviction_threshold: Option<usize>,
}

impl RateLimiter {
    /// Create a rate limiter on the system clock with default settings.
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Create a rate limiter on the given clock with default settings.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self::builder().clock(clock).build()
    }

    /// Create a rate limiter from the `limiter` configuration section.
    pub fn from_config(config: &LimiterConfig) -> Self {
        Self::builder()
            .eviction_threshold(config.eviction_threshold)
            .build()
    }

    pub fn builder() -> RateLimiterBuilder {
        RateLimiterBuilder::default()
    }

    /// Check and consume one admission for `identifier` under `config`.
    ///
    /// An allowed result has already been counted; callers must not check
    /// again for the same logical request. A denied result changes nothing.
    pub fn check(&self, identifier: &str, config: &RateLimitConfig) -> RateLimitDecision {
        let now = self.clock.now_millis();

        if let Some(threshold) = self.eviction_threshold {
            if self.store.len() > threshold {
                let removed = self.evict_stale(now);
                debug!(
                    removed = removed,
                    threshold = threshold,
                    "Store over eviction threshold, swept expired entries"
                );
            }
        }

        trace!(identifier = %identifier, now = now, "Checking rate limit");

        let decision = self.store.update(identifier, |current| match current {
            Some(entry) if !entry.is_expired(now) => {
                if entry.is_exhausted(config) {
                    let decision = RateLimitDecision {
                        allowed: false,
                        remaining: 0,
                        reset_time: entry.window_end,
                    };
                    (None, decision)
                } else {
                    let next = RateLimitEntry {
                        count: entry.count + 1,
                        window_end: entry.window_end,
                    };
                    let decision = RateLimitDecision {
                        allowed: true,
                        remaining: next.remaining(config),
                        reset_time: next.window_end,
                    };
                    (Some(next), decision)
                }
            }
            _ => {
                let fresh = RateLimitEntry::opened(now, config);
                debug!(
                    identifier = %identifier,
                    window_end = fresh.window_end,
                    "Opening rate limit window"
                );
                let decision = RateLimitDecision {
                    allowed: true,
                    remaining: fresh.remaining(config),
                    reset_time: fresh.window_end,
                };
                (Some(fresh), decision)
            }
        });

        if !decision.allowed {
            debug!(
                identifier = %identifier,
                reset_time = decision.reset_time,
                "Rate limit exceeded"
            );
        }

        decision
    }

    /// Forget all history for `identifier`. Idempotent.
    pub fn reset(&self, identifier: &str) {
        if self.store.delete(identifier).is_some() {
            debug!(identifier = %identifier, "Rate limit reset");
        }
    }

    /// Remove every entry whose window has ended.
    ///
    /// Returns the number of entries removed.
    pub fn cleanup(&self) -> usize {
        let now = self.clock.now_millis();
        self.evict_stale(now)
    }

    fn evict_stale(&self, now: u64) -> usize {
        self.store.retain(|_, entry| !entry.is_stale(now))
    }

    /// Current window state for `identifier`, if any is stored.
    pub fn entry(&self, identifier: &str) -> Option<RateLimitEntry> {
        self.store.get(identifier)
    }

    /// The underlying store.
    pub fn store(&self) -> &RateLimitStore {
        &self.store
    }

    /// Current time according to the limiter's clock.
    pub fn now_millis(&self) -> u64 {
        self.clock.now_millis()
    }

    /// Get the number of stored entries.
    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    /// Clear all entries.
    ///
    /// This is primarily useful for testing.
    pub fn clear(&self) {
        self.store.clear();
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("entries", &self.store.len())
            .field("eviction_threshold", &self.eviction_threshold)
            .finish()
    }
}

/// Builder for [`RateLimiter`].
pub struct RateLimiterBuilder {
    clock: Arc<dyn Clock>,
    eviction_threshold: Option<usize>,
}

impl Default for RateLimiterBuilder {
    fn default() -> Self {
        Self {
            clock: Arc::new(SystemClock),
            eviction_threshold: Some(DEFAULT_EVICTION_THRESHOLD),
        }
    }
}

impl RateLimiterBuilder {
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Store size above which `check` sweeps inline; `None` disables it.
    pub fn eviction_threshold(mut self, threshold: Option<usize>) -> Self {
        self.eviction_threshold = threshold;
        self
    }

    pub fn build(self) -> RateLimiter {
        RateLimiter {
            store: RateLimitStore::new(),
            clock: self.clock,
            eviction_threshold: self.eviction_threshold,
        }
    }
}
