// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bounded LRU cache over parsed source maps (spec.md §3, §4.D).
//!
//! Hand-rolled on `indexmap::IndexMap` rather than pulling in a dedicated
//! LRU crate: touch-on-get reinserts the key at the back, eviction pops the
//! front. `None` entries are cached too (negative caching, spec.md §4.E).

use std::sync::Mutex;

use indexmap::IndexMap;
use tracing::debug;

use crate::sourcemap::SourceMap;
use crate::util::lock;

pub struct SourceMapCache {
    capacity: usize,
    entries: Mutex<IndexMap<String, Option<SourceMap>>>,
}

impl SourceMapCache {
    pub fn new(capacity: usize) -> Self {
        Self { capacity: capacity.max(1), entries: Mutex::new(IndexMap::new()) }
    }

    /// Insert (or overwrite) an entry, evicting the LRU entry if the cache
    /// is at capacity.
    pub fn set(&self, script_url: String, value: Option<SourceMap>) {
        let mut entries = lock(&self.entries);
        entries.shift_remove(&script_url);
        if entries.len() >= self.capacity {
            if let Some((evicted, _)) = entries.shift_remove_index(0) {
                debug!(script_url = %evicted, "evicting least-recently-used source map");
            }
        }
        entries.insert(script_url, value);
    }

    /// Fetch an entry, touching it to the most-recently-used position.
    /// Returns `None` if absent; `Some(None)` for a cached negative result.
    pub fn get(&self, script_url: &str) -> Option<Option<SourceMap>> {
        let mut entries = lock(&self.entries);
        let value = entries.shift_remove(script_url)?;
        entries.insert(script_url.to_string(), value.clone());
        Some(value)
    }

    pub fn size(&self) -> usize {
        lock(&self.entries).len()
    }

    pub fn clear(&self) {
        lock(&self.entries).clear();
    }
}

#[cfg(test)]
#[path = "cache_tests.rs"]
mod tests;
