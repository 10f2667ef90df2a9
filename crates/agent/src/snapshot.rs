// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Named browser-state CRUD over persistent key-value storage
//! (spec.md §3 "State Snapshot", §4.K).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::collaborators::KeyValueStore;

const STORAGE_KEY: &str = "gasoline_state_snapshots";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub name: String,
    pub url: String,
    pub timestamp_ms: u64,
    /// Serialized page-side state blob; capture/restore themselves are
    /// delegated to the content script (spec.md §4.K) — the store only
    /// persists the opaque payload.
    pub blob: Value,
    pub size_bytes: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SnapshotMetadata {
    pub name: String,
    pub url: String,
    pub timestamp_ms: u64,
    pub size_bytes: u64,
}

impl From<&StateSnapshot> for SnapshotMetadata {
    fn from(snapshot: &StateSnapshot) -> Self {
        Self {
            name: snapshot.name.clone(),
            url: snapshot.url.clone(),
            timestamp_ms: snapshot.timestamp_ms,
            size_bytes: snapshot.size_bytes,
        }
    }
}

/// `name -> {...snapshot, size_bytes}` over the key-value store
/// (spec.md §4.K). Every operation round-trips the whole map through
/// storage; the store has no in-memory cache since the background can be
/// evicted at any time (spec.md §9 service-worker ephemerality).
pub struct StateSnapshotStore<'a> {
    kv: &'a dyn KeyValueStore,
}

impl<'a> StateSnapshotStore<'a> {
    pub fn new(kv: &'a dyn KeyValueStore) -> Self {
        Self { kv }
    }

    async fn load_all(&self) -> HashMap<String, StateSnapshot> {
        match self.kv.get(STORAGE_KEY).await {
            Some(value) => serde_json::from_value(value).unwrap_or_default(),
            None => HashMap::new(),
        }
    }

    async fn save_all(&self, snapshots: &HashMap<String, StateSnapshot>) {
        if let Ok(value) = serde_json::to_value(snapshots) {
            self.kv.set(STORAGE_KEY, value).await;
        }
    }

    /// `save(name, blob)` (overwrite allowed).
    pub async fn save(&self, name: &str, url: String, timestamp_ms: u64, blob: Value) -> StateSnapshot {
        let size_bytes = serde_json::to_vec(&blob).map(|bytes| bytes.len() as u64).unwrap_or(0);
        let snapshot = StateSnapshot { name: name.to_string(), url, timestamp_ms, blob, size_bytes };
        let mut snapshots = self.load_all().await;
        snapshots.insert(name.to_string(), snapshot.clone());
        self.save_all(&snapshots).await;
        snapshot
    }

    /// `load(name)`: miss returns `None`.
    pub async fn load(&self, name: &str) -> Option<StateSnapshot> {
        self.load_all().await.remove(name)
    }

    /// `list()`: metadata only.
    pub async fn list(&self) -> Vec<SnapshotMetadata> {
        self.load_all().await.values().map(SnapshotMetadata::from).collect()
    }

    pub async fn delete(&self, name: &str) -> bool {
        let mut snapshots = self.load_all().await;
        let existed = snapshots.remove(name).is_some();
        if existed {
            self.save_all(&snapshots).await;
        }
        existed
    }
}

#[cfg(test)]
#[path = "snapshot_tests.rs"]
mod tests;
