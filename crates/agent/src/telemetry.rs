// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use serde::{Deserialize, Serialize};

/// Severity of a captured entry (spec.md §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Debug,
    Log,
    Info,
    Warn,
    Error,
}

/// Where an entry originated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Origin {
    pub tab_id: u64,
    pub url: String,
}

/// Type-specific payload of a telemetry entry. The outer `Telemetry`
/// struct carries the fields common to every kind; this enum carries the
/// fields specific to one kind (spec.md §3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TelemetryKind {
    Exception {
        message: String,
        stack: Option<String>,
    },
    Network {
        method: String,
        url: String,
        status: Option<u16>,
        timing_ms: Option<f64>,
        body_ref: Option<String>,
    },
    Console {
        args: Vec<String>,
    },
    Ws {
        direction: WsDirection,
        payload_ref: String,
    },
    Action {
        selector: String,
        kind: String,
        target: Option<String>,
    },
    Perf {
        snapshot_ref: String,
    },
    Screenshot {
        image_ref: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WsDirection {
    Sent,
    Received,
}

/// A single captured telemetry entry, owned exclusively by the batcher
/// until dispatch; dropped after a successful send (spec.md §3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Telemetry {
    pub timestamp_ms: u64,
    pub level: Level,
    pub origin: Origin,
    pub stack: Option<String>,
    #[serde(flatten)]
    pub kind: TelemetryKind,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub aggregated_count: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_seen: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_seen: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_occurrences: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_map_resolved: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_id: Option<String>,
}

impl Telemetry {
    /// Whether this entry participates in error-group deduplication:
    /// only `error`/`warn` level entries do (spec.md §4.C).
    pub fn participates_in_dedup(&self) -> bool {
        matches!(self.level, Level::Error | Level::Warn)
    }

    /// Signature used to key an error group: `type|level|subfields`
    /// (spec.md §3). Subfields vary by kind.
    pub fn signature(&self) -> String {
        let type_tag = match &self.kind {
            TelemetryKind::Exception { .. } => "exception",
            TelemetryKind::Network { .. } => "network",
            TelemetryKind::Console { .. } => "console",
            TelemetryKind::Ws { .. } => "ws",
            TelemetryKind::Action { .. } => "action",
            TelemetryKind::Perf { .. } => "perf",
            TelemetryKind::Screenshot { .. } => "screenshot",
        };
        let level_tag = match self.level {
            Level::Debug => "debug",
            Level::Log => "log",
            Level::Info => "info",
            Level::Warn => "warn",
            Level::Error => "error",
        };
        let subfields = match &self.kind {
            TelemetryKind::Exception { message, stack } => {
                let first_frame = stack
                    .as_deref()
                    .and_then(|s| s.lines().nth(1))
                    .unwrap_or("");
                format!("{message}|{first_frame}")
            }
            TelemetryKind::Network { method, url, status, .. } => {
                let path = url.split('?').next().unwrap_or(url);
                format!("{method}|{path}|{}", status.unwrap_or(0))
            }
            TelemetryKind::Console { args } => args.first().cloned().unwrap_or_default(),
            _ => String::new(),
        };
        format!("{type_tag}|{level_tag}|{subfields}")
    }
}

/// An estimated-size accounting bucket for the memory governor
/// (spec.md §4.D: fixed average sizes 500/300/1000/400 B).
#[derive(Debug, Clone, Copy, Default)]
pub struct BufferCounts {
    pub log_entries: u64,
    pub ws_events: u64,
    pub network_bodies: u64,
    pub actions: u64,
}

impl BufferCounts {
    pub const AVG_LOG_ENTRY_BYTES: u64 = 500;
    pub const AVG_WS_EVENT_BYTES: u64 = 300;
    pub const AVG_NETWORK_BODY_BYTES: u64 = 1000;
    pub const AVG_ACTION_BYTES: u64 = 400;

    pub fn estimated_bytes(&self) -> u64 {
        self.log_entries * Self::AVG_LOG_ENTRY_BYTES
            + self.ws_events * Self::AVG_WS_EVENT_BYTES
            + self.network_bodies * Self::AVG_NETWORK_BODY_BYTES
            + self.actions * Self::AVG_ACTION_BYTES
    }
}

#[cfg(test)]
#[path = "telemetry_tests.rs"]
mod tests;
