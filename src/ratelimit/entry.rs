//! Per-identifier window state.

use super::policy::RateLimitConfig;

/// Window state for a single identifier.
///
/// `count` is the number of admissions in the current window and is always at
/// least 1: an entry only exists once a request has been admitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitEntry {
    /// Admissions counted in the current window
    pub count: u32,
    /// Epoch milliseconds at which the window resets
    pub window_end: u64,
}

impl RateLimitEntry {
    /// Open a new window at `now`, charging the request that opened it.
    pub fn opened(now: u64, config: &RateLimitConfig) -> Self {
        Self {
            count: 1,
            window_end: now.saturating_add(config.window_ms()),
        }
    }

    /// Whether `check` should treat this entry as no history.
    ///
    /// The window is still active at exactly `window_end`.
    pub fn is_expired(&self, now: u64) -> bool {
        now > self.window_end
    }

    /// Whether the cleanup sweep may remove this entry.
    pub fn is_stale(&self, now: u64) -> bool {
        self.window_end < now
    }

    /// Whether the window has no admissions left under `config`.
    pub fn is_exhausted(&self, config: &RateLimitConfig) -> bool {
        self.count >= config.max_requests()
    }

    /// Admissions left in this window under `config`.
    pub fn remaining(&self, config: &RateLimitConfig) -> u32 {
        config.max_requests().saturating_sub(self.count)
    }
}
