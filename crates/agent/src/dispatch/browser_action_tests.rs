// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::collaborators::fakes::{FakeContentScriptChannel, FakeTabsApi};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[test]
fn parses_known_actions_and_rejects_unknown() {
    assert_eq!(BrowserAction::parse("navigate").unwrap(), BrowserAction::Navigate);
    assert_eq!(BrowserAction::parse("close_tab").unwrap(), BrowserAction::CloseTab);
    assert!(BrowserAction::parse("teleport").is_err());
}

#[test]
fn every_browser_action_requires_pilot() {
    assert!(BrowserAction::Navigate.requires_pilot());
    assert!(BrowserAction::CloseTab.requires_pilot());
}

fn no_reload() -> impl FnOnce(u64) -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send>> {
    |_tab_id| Box::pin(async {})
}

#[tokio::test]
async fn chrome_scheme_targets_are_restricted() {
    let tabs = FakeTabsApi::default();
    tabs.tabs.lock().expect("lock").insert(1, ("https://x".to_string(), "X".to_string()));
    let content = FakeContentScriptChannel::default();
    let err = navigate(1, "chrome://settings", &tabs, &content, no_reload()).await.unwrap_err();
    assert_eq!(err.kind, ErrorCode::RestrictedUrl);
}

#[tokio::test]
async fn file_scheme_targets_report_unavailable_without_probing() {
    let tabs = FakeTabsApi::default();
    tabs.tabs.lock().expect("lock").insert(1, ("https://x".to_string(), "X".to_string()));
    let content = FakeContentScriptChannel::default();
    let result = navigate(1, "file:///tmp/index.html", &tabs, &content, no_reload()).await.unwrap();
    assert_eq!(result.content_script_status, "unavailable");
}

#[tokio::test]
async fn ready_content_script_short_circuits_without_reload() {
    let tabs = FakeTabsApi::default();
    tabs.tabs.lock().expect("lock").insert(1, ("https://x".to_string(), "X".to_string()));
    let content = FakeContentScriptChannel::default();
    content.loaded.lock().expect("lock").insert(1);

    let reload_calls = Arc::new(AtomicUsize::new(0));
    let counted = reload_calls.clone();
    let result = navigate(1, "https://x/page", &tabs, &content, move |_| {
        counted.fetch_add(1, Ordering::SeqCst);
        Box::pin(async {})
    })
    .await
    .unwrap();

    assert_eq!(result.content_script_status, "ready");
    assert_eq!(reload_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn unresponsive_content_script_triggers_exactly_one_reload_and_reprobe() {
    let tabs = FakeTabsApi::default();
    tabs.tabs.lock().expect("lock").insert(1, ("https://x".to_string(), "X".to_string()));
    let content = FakeContentScriptChannel::default();

    let reload_calls = Arc::new(AtomicUsize::new(0));
    let counted = reload_calls.clone();
    let result = navigate(1, "https://x/page", &tabs, &content, move |_| {
        counted.fetch_add(1, Ordering::SeqCst);
        Box::pin(async {})
    })
    .await
    .unwrap();

    assert_eq!(result.content_script_status, "unavailable");
    assert_eq!(reload_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn navigating_a_nonexistent_tab_fails() {
    let tabs = FakeTabsApi::default();
    let content = FakeContentScriptChannel::default();
    let err = navigate(1, "https://x", &tabs, &content, no_reload()).await.unwrap_err();
    assert_eq!(err.kind, ErrorCode::BrowserActionFailed);
}
