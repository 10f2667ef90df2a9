// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use clap::Parser;

fn parse(args: &[&str]) -> Config {
    let mut full = vec!["gasoline-agent"];
    full.extend_from_slice(args);
    Config::parse_from(full)
}

#[test]
fn defaults_match_spec_literals() {
    let cfg = parse(&[]);
    assert_eq!(cfg.cb_max_failures, 5);
    assert_eq!(cfg.cb_reset_timeout_ms, 30_000);
    assert_eq!(cfg.batch_debounce_ms, 100);
    assert_eq!(cfg.batch_max_size, 50);
    assert_eq!(cfg.batch_max_pending, 1_000);
    assert_eq!(cfg.dedup_window_ms, 5_000);
    assert_eq!(cfg.max_tracked_errors, 100);
    assert_eq!(cfg.source_map_cache_size, 50);
    assert_eq!(cfg.screenshot_min_interval_ms, 5_000);
    assert_eq!(cfg.screenshot_window_max, 10);
    assert_eq!(cfg.sync_timeout_ms, 8_000);
    assert_eq!(cfg.processed_command_lru, 1_000);
    assert_eq!(cfg.command_result_buffer, 200);
    assert!(!cfg.pilot_enabled);
}

#[test]
fn pilot_enabled_can_be_flipped_via_flag() {
    let cfg = parse(&["--pilot-enabled"]);
    assert!(cfg.pilot_enabled);
}

#[test]
fn validate_rejects_zero_max_failures() {
    let mut cfg = parse(&[]);
    cfg.cb_max_failures = 0;
    assert!(cfg.validate().is_err());
}

#[test]
fn validate_accepts_defaults() {
    let cfg = parse(&[]);
    assert!(cfg.validate().is_ok());
}

#[test]
fn duration_helpers_convert_millis() {
    let cfg = parse(&[]);
    assert_eq!(cfg.cb_reset_timeout().as_millis(), 30_000);
    assert_eq!(cfg.dedup_window().as_millis(), 5_000);
    assert_eq!(cfg.sync_timeout().as_millis(), 8_000);
}
