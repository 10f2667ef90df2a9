// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-tab screenshot rate limiter (spec.md §4.D).

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use crate::util::lock;

const TRAILING_WINDOW: Duration = Duration::from_secs(60);

pub struct RateLimiterOptions {
    pub min_interval: Duration,
    pub max_per_window: usize,
}

impl Default for RateLimiterOptions {
    fn default() -> Self {
        Self { min_interval: Duration::from_secs(5), max_per_window: 10 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    SessionLimit,
    RateLimit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub reason: Option<DenyReason>,
    pub next_allowed_in_ms: u64,
}

/// Tracks screenshot timestamps per tab to enforce spec.md §4.D /
/// §8: deny within `MIN_INTERVAL`, cap at `max_per_window` events per
/// trailing minute.
pub struct ScreenshotRateLimiter {
    options: RateLimiterOptions,
    timestamps_by_tab: Mutex<HashMap<u64, Vec<u64>>>,
}

impl ScreenshotRateLimiter {
    pub fn new(options: RateLimiterOptions) -> Self {
        Self { options, timestamps_by_tab: Mutex::new(HashMap::new()) }
    }

    pub fn check(&self, tab_id: u64, now_ms: u64) -> RateLimitDecision {
        let mut by_tab = lock(&self.timestamps_by_tab);
        let timestamps = by_tab.entry(tab_id).or_default();

        let window_start = now_ms.saturating_sub(TRAILING_WINDOW.as_millis() as u64);
        timestamps.retain(|&t| t >= window_start);

        if let Some(&last) = timestamps.last() {
            let since_last = now_ms.saturating_sub(last);
            if since_last < self.options.min_interval.as_millis() as u64 {
                return RateLimitDecision {
                    allowed: false,
                    reason: Some(DenyReason::SessionLimit),
                    next_allowed_in_ms: self.options.min_interval.as_millis() as u64 - since_last,
                };
            }
        }

        if timestamps.len() >= self.options.max_per_window {
            let oldest = timestamps[0];
            let next_allowed_in_ms = (oldest + TRAILING_WINDOW.as_millis() as u64).saturating_sub(now_ms);
            return RateLimitDecision { allowed: false, reason: Some(DenyReason::RateLimit), next_allowed_in_ms };
        }

        timestamps.push(now_ms);
        RateLimitDecision { allowed: true, reason: None, next_allowed_in_ms: 0 }
    }

    /// Clear a tab's recorded timestamps, e.g. on tab removal (spec.md §4.L).
    pub fn clear_tab(&self, tab_id: u64) {
        lock(&self.timestamps_by_tab).remove(&tab_id);
    }
}

#[cfg(test)]
#[path = "rate_limit_tests.rs"]
mod tests;
