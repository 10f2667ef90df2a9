// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::collaborators::fakes::{FakeKeyValueStore, FakeTabsApi};
use crate::rate_limit::RateLimiterOptions;

#[test]
fn default_intervals_match_spec_literals() {
    let intervals = LifecycleIntervals::default();
    assert_eq!(intervals.reconnect_probe, Duration::from_secs(5));
    assert_eq!(intervals.error_group_flush, Duration::from_secs(30));
    assert_eq!(intervals.memory_check, Duration::from_secs(30));
    assert_eq!(intervals.error_group_cleanup, Duration::from_secs(600));
}

#[test]
fn tab_removed_clears_screenshots_and_tracking_for_that_tab() {
    let tracking = TrackingAuthority::new();
    tracking.track(1, "https://a".to_string(), "A".to_string());
    let screenshots = ScreenshotRateLimiter::new(RateLimiterOptions::default());
    screenshots.check(1, 0);

    let glue = LifecycleGlue::new(&tracking, &screenshots);
    glue.on_tab_removed(1);

    assert!(tracking.current().is_none());
    // screenshot history for tab 1 was cleared, so an immediate re-check is allowed.
    assert!(screenshots.check(1, 1).allowed);
}

/// spec.md §8 scenario 5.
#[tokio::test]
async fn tab_navigated_updates_tracked_url_and_title() {
    let tracking = TrackingAuthority::new();
    tracking.track(42, "https://old".to_string(), "Old".to_string());
    let screenshots = ScreenshotRateLimiter::new(RateLimiterOptions::default());
    let glue = LifecycleGlue::new(&tracking, &screenshots);

    let tabs = FakeTabsApi::default();
    tabs.tabs.lock().expect("lock").insert(42, ("https://example.com".to_string(), "Example Domain".to_string()));

    glue.on_tab_navigated(42, "https://example.com".to_string(), &tabs).await;
    let target = tracking.current().unwrap();
    assert_eq!(target.url, "https://example.com");
    assert_eq!(target.title, "Example Domain");
}

#[tokio::test]
async fn navigation_of_an_untracked_tab_is_ignored() {
    let tracking = TrackingAuthority::new();
    let screenshots = ScreenshotRateLimiter::new(RateLimiterOptions::default());
    let glue = LifecycleGlue::new(&tracking, &screenshots);
    let tabs = FakeTabsApi::default();

    glue.on_tab_navigated(99, "https://other".to_string(), &tabs).await;
    assert!(tracking.current().is_none());
}

#[tokio::test]
async fn startup_clears_tracking_if_the_tab_no_longer_exists() {
    let tracking = TrackingAuthority::new();
    tracking.track(42, "https://a".to_string(), "A".to_string());
    let screenshots = ScreenshotRateLimiter::new(RateLimiterOptions::default());
    let glue = LifecycleGlue::new(&tracking, &screenshots);
    let tabs = FakeTabsApi::default();

    glue.on_startup(&tabs).await;
    assert!(tracking.current().is_none());
}

#[tokio::test]
async fn startup_keeps_tracking_if_the_tab_still_exists() {
    let tracking = TrackingAuthority::new();
    tracking.track(42, "https://a".to_string(), "A".to_string());
    let screenshots = ScreenshotRateLimiter::new(RateLimiterOptions::default());
    let glue = LifecycleGlue::new(&tracking, &screenshots);
    let tabs = FakeTabsApi::default();
    tabs.tabs.lock().expect("lock").insert(42, ("https://a".to_string(), "A".to_string()));

    glue.on_startup(&tabs).await;
    assert!(tracking.current().is_some());
}

#[tokio::test]
async fn first_boot_records_a_marker_without_reporting_a_restart() {
    let kv = FakeKeyValueStore::default();
    assert!(!detect_restart(&kv, "v1").await);
}

#[tokio::test]
async fn differing_marker_reports_a_restart() {
    let kv = FakeKeyValueStore::default();
    assert!(!detect_restart(&kv, "v1").await);
    assert!(detect_restart(&kv, "v2").await);
}

#[tokio::test]
async fn matching_marker_reports_no_restart() {
    let kv = FakeKeyValueStore::default();
    assert!(!detect_restart(&kv, "v1").await);
    assert!(!detect_restart(&kv, "v1").await);
}
