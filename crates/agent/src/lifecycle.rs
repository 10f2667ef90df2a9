// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Periodic tick sources, tab lifecycle hooks, and startup recovery
//! (spec.md §4.L).

use std::time::Duration;

use tracing::{info, warn};

use crate::auth::TrackingAuthority;
use crate::collaborators::{KeyValueStore, TabsApi};
use crate::rate_limit::ScreenshotRateLimiter;

/// Alarm-API tick intervals (spec.md §4.L).
#[derive(Debug, Clone, Copy)]
pub struct LifecycleIntervals {
    pub reconnect_probe: Duration,
    pub error_group_flush: Duration,
    pub memory_check: Duration,
    pub error_group_cleanup: Duration,
}

impl Default for LifecycleIntervals {
    fn default() -> Self {
        Self {
            reconnect_probe: Duration::from_secs(5),
            error_group_flush: Duration::from_secs(30),
            memory_check: Duration::from_secs(30),
            error_group_cleanup: Duration::from_secs(600),
        }
    }
}

const STATE_VERSION_KEY: &str = "__gasoline_state_version";

/// Glues the connection/tracking/rate-limit components to tab and startup
/// events (spec.md §4.L). Holds no state of its own beyond what it is
/// constructed with a reference to.
pub struct LifecycleGlue<'a> {
    pub tracking: &'a TrackingAuthority,
    pub screenshots: &'a ScreenshotRateLimiter,
}

impl<'a> LifecycleGlue<'a> {
    pub fn new(tracking: &'a TrackingAuthority, screenshots: &'a ScreenshotRateLimiter) -> Self {
        Self { tracking, screenshots }
    }

    /// On tab remove: clear screenshot timestamps for that tab and, if it
    /// was the tracked tab, clear tracking (spec.md §4.L).
    pub fn on_tab_removed(&self, tab_id: u64) {
        self.screenshots.clear_tab(tab_id);
        self.tracking.on_tab_removed(tab_id);
    }

    /// On tab URL change of the tracked tab, update BOTH `trackedTabUrl`
    /// and `trackedTabTitle` (spec.md §4.L, §8 scenario 5).
    pub async fn on_tab_navigated(&self, tab_id: u64, new_url: String, tabs: &dyn TabsApi) {
        if !self.tracking.is_tracking(tab_id) {
            return;
        }
        let title = tabs.tab_title(tab_id).await.unwrap_or_default();
        self.tracking.on_navigated(tab_id, new_url, title);
    }

    /// On browser startup, if the tracked tab still exists keep tracking;
    /// else clear it (spec.md §4.L).
    pub async fn on_startup(&self, tabs: &dyn TabsApi) {
        if let Some(target) = self.tracking.current() {
            if !tabs.tab_exists(target.tab_id).await {
                self.tracking.clear();
            }
        }
    }
}

/// Startup-recovery probe (spec.md §4.L): compares a stored state-version
/// marker to the current one; a mismatch means the service worker
/// restarted and every in-memory module-global was lost. Returns whether
/// a restart was detected.
pub async fn detect_restart(kv: &dyn KeyValueStore, current_version: &str) -> bool {
    let stored = kv.get(STATE_VERSION_KEY).await.and_then(|v| v.as_str().map(str::to_string));
    kv.set(STATE_VERSION_KEY, serde_json::json!(current_version)).await;

    match stored {
        None => {
            info!("no prior state-version marker found; treating as first boot");
            false
        }
        Some(previous) if previous == current_version => false,
        Some(previous) => {
            warn!(previous, current = current_version, "service worker restarted; ephemeral state was lost");
            true
        }
    }
}

#[cfg(test)]
#[path = "lifecycle_tests.rs"]
mod tests;
