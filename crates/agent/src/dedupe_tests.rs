// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::telemetry::{Level, Origin, TelemetryKind};

fn exception(message: &str, timestamp_ms: u64) -> Telemetry {
    Telemetry {
        timestamp_ms,
        level: Level::Error,
        origin: Origin { tab_id: 1, url: "https://example.com".into() },
        stack: None,
        kind: TelemetryKind::Exception { message: message.into(), stack: None },
        aggregated_count: None,
        first_seen: None,
        last_seen: None,
        previous_occurrences: None,
        source_map_resolved: None,
        error_id: None,
    }
}

/// spec.md §8 scenario 1: five identical entries at t=0..4s, flush at t=10s.
#[test]
fn dedup_flow_scenario() {
    let dedupe = Dedupe::new(DeduperOptions::default());

    let first = dedupe.process(exception("TypeError: x is undefined", 0), 0);
    assert!(matches!(first, DedupeOutcome::Send(_)), "first occurrence must be sent");

    for t in [1_000, 2_000, 3_000, 4_000] {
        let outcome = dedupe.process(exception("TypeError: x is undefined", t), t);
        assert!(matches!(outcome, DedupeOutcome::Suppress), "repeats within the window must suppress");
    }

    let emitted = dedupe.flush(10_000);
    assert_eq!(emitted.len(), 1);
    assert_eq!(emitted[0].aggregated_count, Some(4));
    assert_eq!(emitted[0].first_seen, Some(0));
    assert_eq!(emitted[0].last_seen, Some(4_000));
}

#[test]
fn entries_outside_window_report_previous_occurrences() {
    let dedupe = Dedupe::new(DeduperOptions::default());
    dedupe.process(exception("boom", 0), 0);
    dedupe.process(exception("boom", 1_000), 1_000);
    dedupe.process(exception("boom", 2_000), 2_000);

    // Well past the 5s window.
    let outcome = dedupe.process(exception("boom", 20_000), 20_000);
    match outcome {
        DedupeOutcome::Send(entry) => assert_eq!(entry.previous_occurrences, Some(2)),
        DedupeOutcome::Suppress => panic!("expected a new occurrence to be sent"),
    }
}

#[test]
fn info_level_entries_bypass_dedup_entirely() {
    let dedupe = Dedupe::new(DeduperOptions::default());
    let mut entry = exception("just logging", 0);
    entry.level = Level::Info;
    let a = dedupe.process(entry.clone(), 0);
    let b = dedupe.process(entry, 1);
    assert!(matches!(a, DedupeOutcome::Send(_)));
    assert!(matches!(b, DedupeOutcome::Send(_)));
    assert_eq!(dedupe.tracked_count(), 0);
}

#[test]
fn table_full_evicts_oldest_group_by_last_seen() {
    let options = DeduperOptions { max_tracked_errors: 2, ..DeduperOptions::default() };
    let dedupe = Dedupe::new(options);

    dedupe.process(exception("error-a", 0), 0);
    dedupe.process(exception("error-b", 100), 100);
    assert_eq!(dedupe.tracked_count(), 2);

    dedupe.process(exception("error-c", 200), 200);
    assert_eq!(dedupe.tracked_count(), 2, "table stays at the cap");

    // error-a (oldest lastSeen) should have been evicted, so it is treated
    // as brand new rather than suppressed.
    let outcome = dedupe.process(exception("error-a", 300), 300);
    assert!(matches!(outcome, DedupeOutcome::Send(_)));
}

#[test]
fn gc_stale_drops_groups_past_max_age() {
    let options = DeduperOptions { error_group_max_age: Duration::from_secs(60), ..DeduperOptions::default() };
    let dedupe = Dedupe::new(options);
    dedupe.process(exception("old", 0), 0);
    assert_eq!(dedupe.tracked_count(), 1);
    dedupe.gc_stale(120_000);
    assert_eq!(dedupe.tracked_count(), 0);
}

#[test]
fn flush_deletes_groups_stale_beyond_twice_flush_interval() {
    let options = DeduperOptions { error_group_flush_interval: Duration::from_secs(30), ..DeduperOptions::default() };
    let dedupe = Dedupe::new(options);
    dedupe.process(exception("stale", 0), 0);
    dedupe.process(exception("stale", 1_000), 1_000);
    // last_seen = 1_000ms; stale threshold = 60_000ms.
    let emitted = dedupe.flush(70_000);
    assert!(emitted.is_empty(), "count>1 would emit, but the group was pruned as stale first");
    assert_eq!(dedupe.tracked_count(), 0);
}
