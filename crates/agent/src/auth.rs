// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pilot opt-in gate and tracked-tab resolution (spec.md §4.J).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use serde_json::Value;
use tokio::sync::watch;

use crate::collaborators::TabsApi;
use crate::error::{AppError, ErrorCode};
use crate::util::lock;

/// Process-wide `aiWebPilotEnabled` cache (spec.md §4.J, §9 Open Question
/// (i)): initialized from persistent storage at startup, invalidated on
/// storage change, gated by an init-ready signal so commands arriving
/// before hydration completes wait rather than observe a stale default.
///
/// Decision (spec.md §9.i): default to `false` when the key is absent,
/// requiring explicit user opt-in.
pub struct PilotAuthority {
    enabled: AtomicBool,
    ready_tx: watch::Sender<bool>,
    ready_rx: watch::Receiver<bool>,
}

impl PilotAuthority {
    pub fn new() -> Self {
        let (ready_tx, ready_rx) = watch::channel(false);
        Self { enabled: AtomicBool::new(false), ready_tx, ready_rx }
    }

    /// Hydrate from persistent storage. `stored` is the raw
    /// `aiWebPilotEnabled` value read from the key-value store, or `None`
    /// if absent.
    pub fn hydrate(&self, stored: Option<bool>) {
        self.enabled.store(stored.unwrap_or(false), Ordering::Release);
        let _ = self.ready_tx.send(true);
    }

    /// Invoked on a storage-change event for `aiWebPilotEnabled`.
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Release);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    /// Commands arriving before hydration completes wait here rather than
    /// observing a stale default (spec.md §4.J).
    pub async fn wait_ready(&self) {
        let mut rx = self.ready_rx.clone();
        if *rx.borrow() {
            return;
        }
        let _ = rx.changed().await;
    }

    /// Gate a mutating command: waits for readiness, then errors
    /// `ai_web_pilot_disabled` unless pilot is enabled.
    pub async fn require_pilot(&self) -> Result<(), AppError> {
        self.wait_ready().await;
        if self.is_enabled() {
            Ok(())
        } else {
            Err(AppError::new(ErrorCode::AiWebPilotDisabled, "AI web pilot is disabled"))
        }
    }
}

impl Default for PilotAuthority {
    fn default() -> Self {
        Self::new()
    }
}

/// Persisted triple `(trackedTabId, trackedTabUrl, trackedTabTitle)`
/// (spec.md §3 "Tracked Target").
#[derive(Debug, Clone, PartialEq)]
pub struct TrackedTarget {
    pub tab_id: u64,
    pub url: String,
    pub title: String,
}

/// Tracks at most one tab at a time. Origin changes of the tracked tab do
/// NOT clear tracking; only explicit `clear` or tab removal does
/// (spec.md §4.J, §4.L).
pub struct TrackingAuthority {
    current: Mutex<Option<TrackedTarget>>,
}

impl TrackingAuthority {
    pub fn new() -> Self {
        Self { current: Mutex::new(None) }
    }

    pub fn track(&self, tab_id: u64, url: String, title: String) {
        *lock(&self.current) = Some(TrackedTarget { tab_id, url, title });
    }

    pub fn current(&self) -> Option<TrackedTarget> {
        lock(&self.current).clone()
    }

    pub fn is_tracking(&self, tab_id: u64) -> bool {
        lock(&self.current).as_ref().is_some_and(|t| t.tab_id == tab_id)
    }

    pub fn clear(&self) {
        *lock(&self.current) = None;
    }

    /// Navigation hook (spec.md §4.L): on URL change of the tracked tab,
    /// update BOTH `trackedTabUrl` and `trackedTabTitle`.
    pub fn on_navigated(&self, tab_id: u64, url: String, title: String) {
        let mut current = lock(&self.current);
        if let Some(target) = current.as_mut() {
            if target.tab_id == tab_id {
                target.url = url;
                target.title = title;
            }
        }
    }

    /// Tab-removal hook (spec.md §4.L): clears tracking if the removed tab
    /// was the tracked one.
    pub fn on_tab_removed(&self, tab_id: u64) {
        let mut current = lock(&self.current);
        if current.as_ref().is_some_and(|t| t.tab_id == tab_id) {
            *current = None;
        }
    }
}

impl Default for TrackingAuthority {
    fn default() -> Self {
        Self::new()
    }
}

/// `(1) explicit tab_id → (2) tracked tab if it still exists (else clear
/// tracking) → (3) active tab of current window` (spec.md §4.H).
pub async fn resolve_target_tab(
    explicit_tab_id: Option<u64>,
    tracking: &TrackingAuthority,
    tabs: &dyn TabsApi,
) -> Option<u64> {
    if let Some(id) = explicit_tab_id {
        return Some(id);
    }
    if let Some(tracked) = tracking.current() {
        if tabs.tab_exists(tracked.tab_id).await {
            return Some(tracked.tab_id);
        }
        tracking.clear();
    }
    tabs.active_tab_id().await
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PierceShadow {
    True,
    False,
    Auto,
}

/// Parses the `pierce_shadow` param (spec.md §4.H): `true|false|"auto"`;
/// any other string is a hard error.
pub fn parse_pierce_shadow(value: &Value) -> Result<PierceShadow, AppError> {
    match value {
        Value::Null => Ok(PierceShadow::False),
        Value::Bool(true) => Ok(PierceShadow::True),
        Value::Bool(false) => Ok(PierceShadow::False),
        Value::String(s) if s == "auto" => Ok(PierceShadow::Auto),
        other => Err(AppError::new(
            ErrorCode::InvalidParams,
            format!("invalid pierce_shadow value: {other}"),
        )),
    }
}

/// `auto` resolves to `true` iff pilot is enabled AND the resolved tab
/// equals the tracked tab AND the URL origins of the tracked URL and the
/// target URL are equal (spec.md §4.H, §8 scenario 3).
pub fn resolve_pierce_shadow(
    mode: PierceShadow,
    pilot_enabled: bool,
    tracking: Option<&TrackedTarget>,
    target_tab_id: u64,
    target_url: &str,
) -> bool {
    match mode {
        PierceShadow::True => true,
        PierceShadow::False => false,
        PierceShadow::Auto => {
            pilot_enabled
                && tracking.is_some_and(|t| t.tab_id == target_tab_id && same_origin(&t.url, target_url))
        }
    }
}

fn same_origin(a: &str, b: &str) -> bool {
    match (reqwest::Url::parse(a), reqwest::Url::parse(b)) {
        (Ok(a), Ok(b)) => {
            a.scheme() == b.scheme() && a.host_str() == b.host_str() && a.port_or_known_default() == b.port_or_known_default()
        }
        _ => false,
    }
}

#[cfg(test)]
#[path = "auth_tests.rs"]
mod tests;
