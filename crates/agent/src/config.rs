// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::time::Duration;

use clap::Parser;

/// Background coordinator for the Gasoline browser-extension agent.
///
/// Every tunable named by a literal constant in the specification is exposed
/// as a flag/env-var pair defaulting to that literal (spec.md §4, §8).
#[derive(Debug, Parser)]
#[command(name = "gasoline-agent", version, about)]
pub struct Config {
    /// Control server base URL.
    #[arg(long, env = "GASOLINE_SERVER_URL", default_value = "http://localhost:7890")]
    pub server_url: String,

    /// Extension version string sent on every sync request.
    #[arg(long, env = "GASOLINE_EXTENSION_VERSION", default_value = "0.1.0")]
    pub extension_version: String,

    /// Whether the user has opted in to remote control of their tab.
    /// Default `false`: resolves spec.md §9 open question (i) in favor of
    /// explicit opt-in over the repo's divergent `true`-default loader.
    #[arg(long, env = "GASOLINE_PILOT_ENABLED", default_value_t = false)]
    pub pilot_enabled: bool,

    /// Log format: `json` or `text`.
    #[arg(long, env = "GASOLINE_LOG_FORMAT", default_value = "json")]
    pub log_format: String,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, env = "GASOLINE_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    // --- Circuit breaker (4.A) ---
    #[arg(long, env = "GASOLINE_CB_MAX_FAILURES", default_value_t = 5)]
    pub cb_max_failures: u32,
    #[arg(long, env = "GASOLINE_CB_RESET_TIMEOUT_MS", default_value_t = 30_000)]
    pub cb_reset_timeout_ms: u64,
    #[arg(long, env = "GASOLINE_CB_INITIAL_BACKOFF_MS", default_value_t = 1_000)]
    pub cb_initial_backoff_ms: u64,
    #[arg(long, env = "GASOLINE_CB_MAX_BACKOFF_MS", default_value_t = 30_000)]
    pub cb_max_backoff_ms: u64,

    // --- Batcher (4.B) ---
    #[arg(long, env = "GASOLINE_BATCH_DEBOUNCE_MS", default_value_t = 100)]
    pub batch_debounce_ms: u64,
    #[arg(long, env = "GASOLINE_BATCH_MAX_SIZE", default_value_t = 50)]
    pub batch_max_size: usize,
    #[arg(long, env = "GASOLINE_BATCH_RETRY_BUDGET", default_value_t = 3)]
    pub batch_retry_budget: u32,
    #[arg(long, env = "GASOLINE_BATCH_MAX_PENDING", default_value_t = 1_000)]
    pub batch_max_pending: usize,

    // --- Error-group deduper (4.C) ---
    #[arg(long, env = "GASOLINE_DEDUP_WINDOW_MS", default_value_t = 5_000)]
    pub dedup_window_ms: u64,
    #[arg(long, env = "GASOLINE_MAX_TRACKED_ERRORS", default_value_t = 100)]
    pub max_tracked_errors: usize,
    #[arg(long, env = "GASOLINE_ERROR_GROUP_MAX_AGE_MS", default_value_t = 3_600_000)]
    pub error_group_max_age_ms: u64,
    #[arg(long, env = "GASOLINE_ERROR_GROUP_FLUSH_MS", default_value_t = 30_000)]
    pub error_group_flush_ms: u64,

    // --- Cache & memory governor (4.D) ---
    #[arg(long, env = "GASOLINE_SOURCE_MAP_CACHE_SIZE", default_value_t = 50)]
    pub source_map_cache_size: usize,
    #[arg(long, env = "GASOLINE_SCREENSHOT_MIN_INTERVAL_MS", default_value_t = 5_000)]
    pub screenshot_min_interval_ms: u64,
    #[arg(long, env = "GASOLINE_SCREENSHOT_WINDOW_MAX", default_value_t = 10)]
    pub screenshot_window_max: usize,
    #[arg(long, env = "GASOLINE_MEMORY_SOFT_BYTES", default_value_t = 20 * 1024 * 1024)]
    pub memory_soft_bytes: u64,
    #[arg(long, env = "GASOLINE_MEMORY_HARD_BYTES", default_value_t = 50 * 1024 * 1024)]
    pub memory_hard_bytes: u64,
    #[arg(long, env = "GASOLINE_MEMORY_CHECK_INTERVAL_MS", default_value_t = 30_000)]
    pub memory_check_interval_ms: u64,

    // --- Source-map resolver (4.E) ---
    #[arg(long, env = "GASOLINE_SOURCE_MAP_FETCH_TIMEOUT_MS", default_value_t = 5_000)]
    pub source_map_fetch_timeout_ms: u64,
    /// Defaults to enabled; set `--source-map-enabled=false` to disable.
    #[arg(long, env = "GASOLINE_SOURCE_MAP_ENABLED")]
    pub source_map_enabled: Option<bool>,

    // --- Sync client (4.G) ---
    #[arg(long, env = "GASOLINE_NEXT_POLL_MS", default_value_t = 1_000)]
    pub default_next_poll_ms: u64,
    #[arg(long, env = "GASOLINE_SYNC_RETRY_MS", default_value_t = 1_000)]
    pub sync_retry_ms: u64,
    #[arg(long, env = "GASOLINE_COMMAND_RESULT_BUFFER", default_value_t = 200)]
    pub command_result_buffer: usize,
    #[arg(long, env = "GASOLINE_PROCESSED_COMMAND_LRU", default_value_t = 1_000)]
    pub processed_command_lru: usize,
    #[arg(long, env = "GASOLINE_SYNC_TIMEOUT_MS", default_value_t = 8_000)]
    pub sync_timeout_ms: u64,

    // --- DOM action engine (4.I) ---
    #[arg(long, env = "GASOLINE_WAIT_FOR_POLL_MS", default_value_t = 80)]
    pub wait_for_poll_ms: u64,
    #[arg(long, env = "GASOLINE_WAIT_FOR_TIMEOUT_MS", default_value_t = 5_000)]
    pub wait_for_timeout_ms: u64,
    #[arg(long, env = "GASOLINE_TOAST_MIN_VISIBLE_MS", default_value_t = 500)]
    pub toast_min_visible_ms: u64,
    #[arg(long, env = "GASOLINE_EXECUTE_JS_TIMEOUT_MS", default_value_t = 5_000)]
    pub execute_js_timeout_ms: u64,
    #[arg(long, env = "GASOLINE_LIST_INTERACTIVE_CAP", default_value_t = 100)]
    pub list_interactive_cap: usize,

    // --- Lifecycle glue (4.L) ---
    #[arg(long, env = "GASOLINE_RECONNECT_PROBE_MS", default_value_t = 5_000)]
    pub reconnect_probe_ms: u64,
    #[arg(long, env = "GASOLINE_ERROR_GROUP_CLEANUP_MS", default_value_t = 600_000)]
    pub error_group_cleanup_ms: u64,
}

impl Config {
    /// Validate flag combinations that clap's declarative attributes cannot
    /// express (mirrors `Config::validate` in the teacher's CLI).
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.cb_max_failures == 0 {
            anyhow::bail!("--cb-max-failures must be at least 1");
        }
        if self.batch_max_size == 0 {
            anyhow::bail!("--batch-max-size must be at least 1");
        }
        if self.source_map_cache_size == 0 {
            anyhow::bail!("--source-map-cache-size must be at least 1");
        }
        Ok(())
    }

    pub fn cb_reset_timeout(&self) -> Duration {
        Duration::from_millis(self.cb_reset_timeout_ms)
    }

    pub fn batch_debounce(&self) -> Duration {
        Duration::from_millis(self.batch_debounce_ms)
    }

    pub fn dedup_window(&self) -> Duration {
        Duration::from_millis(self.dedup_window_ms)
    }

    pub fn error_group_max_age(&self) -> Duration {
        Duration::from_millis(self.error_group_max_age_ms)
    }

    pub fn error_group_flush_interval(&self) -> Duration {
        Duration::from_millis(self.error_group_flush_ms)
    }

    pub fn memory_check_interval(&self) -> Duration {
        Duration::from_millis(self.memory_check_interval_ms)
    }

    pub fn source_map_fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.source_map_fetch_timeout_ms)
    }

    /// Resolve the effective enabled/disabled state (defaults to enabled).
    pub fn source_map_resolution_enabled(&self) -> bool {
        self.source_map_enabled.unwrap_or(true)
    }

    pub fn sync_timeout(&self) -> Duration {
        Duration::from_millis(self.sync_timeout_ms)
    }

    pub fn wait_for_poll_interval(&self) -> Duration {
        Duration::from_millis(self.wait_for_poll_ms)
    }

    pub fn toast_min_visible(&self) -> Duration {
        Duration::from_millis(self.toast_min_visible_ms)
    }

    pub fn reconnect_probe_interval(&self) -> Duration {
        Duration::from_millis(self.reconnect_probe_ms)
    }

    pub fn error_group_cleanup_interval(&self) -> Duration {
        Duration::from_millis(self.error_group_cleanup_ms)
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
