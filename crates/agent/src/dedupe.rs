// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Signature-based error-group deduplication window (spec.md §4.C).

use std::sync::Mutex;
use std::time::Duration;

use indexmap::IndexMap;
use tracing::debug;

use crate::telemetry::Telemetry;
use crate::util::lock;

#[derive(Debug, Clone)]
struct ErrorGroup {
    representative: Telemetry,
    count: u32,
    first_seen_ms: u64,
    last_seen_ms: u64,
}

pub struct DeduperOptions {
    pub dedup_window: Duration,
    pub max_tracked_errors: usize,
    pub error_group_max_age: Duration,
    pub error_group_flush_interval: Duration,
}

impl Default for DeduperOptions {
    fn default() -> Self {
        Self {
            dedup_window: Duration::from_secs(5),
            max_tracked_errors: 100,
            error_group_max_age: Duration::from_secs(3600),
            error_group_flush_interval: Duration::from_secs(30),
        }
    }
}

pub struct Dedupe {
    options: DeduperOptions,
    groups: Mutex<IndexMap<String, ErrorGroup>>,
}

pub enum DedupeOutcome {
    Send(Telemetry),
    Suppress,
}

impl Dedupe {
    pub fn new(options: DeduperOptions) -> Self {
        Self { options, groups: Mutex::new(IndexMap::new()) }
    }

    /// `processErrorGroup` (spec.md §4.C): only error/warn entries
    /// participate; everything else passes through unmodified.
    pub fn process(&self, entry: Telemetry, now_ms: u64) -> DedupeOutcome {
        if !entry.participates_in_dedup() {
            return DedupeOutcome::Send(entry);
        }

        let signature = entry.signature();
        let mut groups = lock(&self.groups);

        if let Some(group) = groups.get_mut(&signature) {
            let fresh = now_ms.saturating_sub(group.last_seen_ms) < self.options.dedup_window.as_millis() as u64;
            if fresh {
                group.count += 1;
                group.last_seen_ms = now_ms;
                return DedupeOutcome::Suppress;
            }

            // Outside the window: a new occurrence of a previously-seen
            // signature. Report how many prior occurrences were collapsed.
            let previous_count = group.count;
            group.count = 1;
            group.first_seen_ms = now_ms;
            group.last_seen_ms = now_ms;
            group.representative = entry.clone();

            let mut out = entry;
            if previous_count > 1 {
                out.previous_occurrences = Some(previous_count - 1);
            }
            return DedupeOutcome::Send(out);
        }

        if groups.len() >= self.options.max_tracked_errors {
            self.evict_oldest(&mut groups);
        }

        groups.insert(
            signature,
            ErrorGroup { representative: entry.clone(), count: 1, first_seen_ms: now_ms, last_seen_ms: now_ms },
        );
        DedupeOutcome::Send(entry)
    }

    fn evict_oldest(&self, groups: &mut IndexMap<String, ErrorGroup>) {
        if let Some((oldest_key, _)) = groups.iter().min_by_key(|(_, g)| g.last_seen_ms).map(|(k, g)| (k.clone(), g.last_seen_ms)) {
            debug!(signature = %oldest_key, "evicting oldest error group, table full");
            groups.shift_remove(&oldest_key);
        }
    }

    /// `flushErrorGroups()` (spec.md §4.C): emit a synthetic aggregate for
    /// every group with `count > 1`, reset its counter, and GC stale groups.
    pub fn flush(&self, now_ms: u64) -> Vec<Telemetry> {
        let mut groups = lock(&self.groups);
        let stale_threshold = self.options.error_group_flush_interval.as_millis() as u64 * 2;

        let mut emitted = Vec::new();
        groups.retain(|_, group| {
            if now_ms.saturating_sub(group.last_seen_ms) > stale_threshold {
                return false;
            }
            if group.count > 1 {
                let mut synthetic = group.representative.clone();
                synthetic.timestamp_ms = now_ms;
                synthetic.aggregated_count = Some(group.count - 1);
                synthetic.first_seen = Some(group.first_seen_ms);
                synthetic.last_seen = Some(group.last_seen_ms);
                emitted.push(synthetic);
                group.count = 0;
            }
            true
        });
        emitted
    }

    /// Periodic GC beyond `flush`: drop groups older than
    /// `ERROR_GROUP_MAX_AGE_MS` outright (spec.md §3).
    pub fn gc_stale(&self, now_ms: u64) {
        let mut groups = lock(&self.groups);
        groups.retain(|_, group| {
            now_ms.saturating_sub(group.last_seen_ms) <= self.options.error_group_max_age.as_millis() as u64
        });
    }

    pub fn tracked_count(&self) -> usize {
        lock(&self.groups).len()
    }
}

#[cfg(test)]
#[path = "dedupe_tests.rs"]
mod tests;
