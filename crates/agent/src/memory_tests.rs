// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn counts_for_bytes(target: u64) -> BufferCounts {
    BufferCounts { log_entries: target / BufferCounts::AVG_LOG_ENTRY_BYTES, ..Default::default() }
}

/// spec.md §8 scenario 6.
#[test]
fn memory_pressure_scenario() {
    let governor = MemoryGovernor::new(MemoryGovernorOptions::default());

    let state = governor.check(counts_for_bytes(22 * 1024 * 1024), 0);
    assert_eq!(state.level, PressureLevel::Soft);
    assert!(state.reduced_capacities);
    assert!(!state.network_body_disabled);

    let state = governor.check(counts_for_bytes(55 * 1024 * 1024), 1_000);
    assert_eq!(state.level, PressureLevel::Hard);
    assert!(state.network_body_disabled);

    let state = governor.check(counts_for_bytes(10 * 1024 * 1024), 2_000);
    assert_eq!(state.level, PressureLevel::Normal);
    assert!(!state.reduced_capacities);
    assert!(!state.network_body_disabled);
}

#[test]
fn current_reflects_the_last_check() {
    let governor = MemoryGovernor::new(MemoryGovernorOptions::default());
    assert_eq!(governor.current().level, PressureLevel::Normal);
    governor.check(counts_for_bytes(60 * 1024 * 1024), 5);
    assert_eq!(governor.current().level, PressureLevel::Hard);
}
