// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pending command model and the processed-id LRU that enforces
//! at-most-once execution over an at-least-once transport (spec.md §3,
//! §4.G, §5, §9).

use std::sync::Mutex;

use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ErrorCode;
use crate::util::lock;

/// A command as received from the sync response (spec.md §3 "Pending
/// Command"): id, type, opaque params, optional correlation id.
#[derive(Debug, Clone, Deserialize)]
pub struct PendingCommand {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub params: Value,
    #[serde(default)]
    pub correlation_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandStatus {
    Pending,
    Complete,
    Error,
    Timeout,
}

/// Effective context captured AFTER execution, so callers can detect
/// navigation drift between dispatch and execution (spec.md §4.H).
#[derive(Debug, Clone, Serialize)]
pub struct EffectiveContext {
    pub effective_tab_id: Option<u64>,
    pub effective_url: Option<String>,
    pub effective_title: Option<String>,
}

/// A terminal (or, legacy, synchronous) command result queued back to the
/// sync client via `queueCommandResult` (spec.md §4.G, §4.H).
#[derive(Debug, Clone, Serialize)]
pub struct CommandResult {
    pub id: String,
    pub correlation_id: Option<String>,
    pub status: CommandStatus,
    pub result: Option<Value>,
    pub error: Option<ErrorCode>,
    pub message: Option<String>,
    pub effective_context: Option<EffectiveContext>,
}

impl CommandResult {
    pub fn error(id: impl Into<String>, correlation_id: Option<String>, kind: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            correlation_id,
            status: CommandStatus::Error,
            result: None,
            error: Some(kind),
            message: Some(message.into()),
            effective_context: None,
        }
    }

    pub fn complete(id: impl Into<String>, correlation_id: Option<String>, result: Value) -> Self {
        Self {
            id: id.into(),
            correlation_id,
            status: CommandStatus::Complete,
            result: Some(result),
            error: None,
            message: None,
            effective_context: None,
        }
    }

    pub fn with_effective_context(mut self, ctx: EffectiveContext) -> Self {
        self.effective_context = Some(ctx);
        self
    }
}

/// `processedCommandIDs` (spec.md §3, §9): an insertion-ordered set capped
/// at `capacity`, evicting the oldest id on overflow. Documented window
/// (spec.md §9.iii): a duplicate retry spaced by more than `capacity`
/// distinct commands can re-execute, since eviction is by insertion order
/// rather than by last-seen time.
pub struct ProcessedCommandLru {
    capacity: usize,
    ids: Mutex<IndexSet<String>>,
}

impl ProcessedCommandLru {
    pub fn new(capacity: usize) -> Self {
        Self { capacity, ids: Mutex::new(IndexSet::new()) }
    }

    /// Returns `true` if `id` had already been recorded (i.e. this is a
    /// duplicate that must be skipped), else records it and returns `false`.
    pub fn check_and_record(&self, id: &str) -> bool {
        let mut ids = lock(&self.ids);
        if ids.contains(id) {
            return true;
        }
        if ids.len() >= self.capacity {
            ids.shift_remove_index(0);
        }
        ids.insert(id.to_string());
        false
    }

    pub fn len(&self) -> usize {
        lock(&self.ids).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
#[path = "command_tests.rs"]
mod tests;
