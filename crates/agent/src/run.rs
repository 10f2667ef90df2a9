// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Top-level wiring: constructs every component from `Config`, hydrates
//! persisted state, and drives the sync loop and lifecycle ticks until
//! cancelled (spec.md §4, §5, §9).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde_json::Value;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use crate::auth::{PilotAuthority, TrackingAuthority};
use crate::batch::{Batcher, BatcherOptions, EnqueueOutcome};
use crate::breaker::CircuitBreaker;
use crate::cache::SourceMapCache;
use crate::collaborators::{ContentScriptChannel, KeyValueStore, ScriptInjector, TabsApi};
use crate::config::Config;
use crate::context::{ConnectionStatusSink, CoreContext};
use crate::dedupe::{Dedupe, DeduperOptions};
use crate::dispatch::{self, DispatchContext};
use crate::lifecycle::{self, LifecycleGlue};
use crate::memory::{MemoryGovernor, MemoryGovernorOptions};
use crate::rate_limit::{RateLimiterOptions, ScreenshotRateLimiter};
use crate::sourcemap::stack::resolve_stack_trace;
use crate::sourcemap::fetch_source_map;
use crate::sync::{HttpSyncTransport, SyncAttempt, SyncClient, SyncOptions, SyncSettings};
use crate::telemetry::{BufferCounts, Telemetry, TelemetryKind};

/// Initialize tracing from config. Uses `try_init` so it is safe to call
/// more than once, e.g. across integration tests that each build their own
/// engine.
pub fn init_tracing(config: &Config) {
    use tracing_subscriber::fmt;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    let result = match config.log_format.as_str() {
        "json" => fmt::fmt().with_env_filter(filter).json().try_init(),
        _ => fmt::fmt().with_env_filter(filter).try_init(),
    };
    drop(result);
}

/// External collaborator handles `run` needs but does not construct itself
/// (spec.md §1, §6): content scripts, script injection, tab metadata, and
/// persistent storage all live outside this engine's scope.
pub struct Collaborators {
    pub kv: Arc<dyn KeyValueStore>,
    pub tabs: Arc<dyn TabsApi>,
    pub content: Arc<dyn ContentScriptChannel>,
    pub injector: Arc<dyn ScriptInjector>,
}

/// Every long-lived, shared component the engine owns (spec.md §4, §9
/// Core Context). Held behind a single `Arc` so the sync loop and every
/// spawned tick task or command dispatch can reach it without its own
/// copy of the state.
pub struct GasolineEngine {
    pub core: CoreContext,
    pub pilot: Arc<PilotAuthority>,
    pub tracking: Arc<TrackingAuthority>,
    pub breaker: CircuitBreaker,
    pub batcher: Batcher,
    pub dedupe: Dedupe,
    pub cache: SourceMapCache,
    pub memory: MemoryGovernor,
    pub screenshots: ScreenshotRateLimiter,
    source_map_enabled: bool,
}

impl GasolineEngine {
    fn new(config: &Config) -> Self {
        Self {
            core: CoreContext::new(config.server_url.clone()),
            pilot: Arc::new(PilotAuthority::new()),
            tracking: Arc::new(TrackingAuthority::new()),
            breaker: CircuitBreaker::new(
                config.cb_max_failures,
                config.cb_reset_timeout(),
                Duration::from_millis(config.cb_initial_backoff_ms),
                Duration::from_millis(config.cb_max_backoff_ms),
            ),
            batcher: Batcher::new(BatcherOptions {
                debounce_ms: config.batch_debounce_ms,
                max_batch_size: config.batch_max_size,
                retry_budget: config.batch_retry_budget,
                max_pending: config.batch_max_pending,
            }),
            dedupe: Dedupe::new(DeduperOptions {
                dedup_window: config.dedup_window(),
                max_tracked_errors: config.max_tracked_errors,
                error_group_max_age: config.error_group_max_age(),
                error_group_flush_interval: config.error_group_flush_interval(),
            }),
            cache: SourceMapCache::new(config.source_map_cache_size),
            memory: MemoryGovernor::new(MemoryGovernorOptions {
                soft_threshold_bytes: config.memory_soft_bytes,
                hard_threshold_bytes: config.memory_hard_bytes,
            }),
            screenshots: ScreenshotRateLimiter::new(RateLimiterOptions {
                min_interval: Duration::from_millis(config.screenshot_min_interval_ms),
                max_per_window: config.screenshot_window_max,
            }),
            source_map_enabled: config.source_map_resolution_enabled(),
        }
    }
}

impl GasolineEngine {
    /// The full per-entry capture pipeline (spec.md §4.D, §4.E, §4.C, §4.B):
    /// resolve any http(s) stack frames against cached or freshly-fetched
    /// source maps, pass the entry through the error-group deduper, and
    /// enqueue whatever survives onto the batcher. This is the integration
    /// point an inbound content-script capture handler calls into; that
    /// transport itself is out of scope (spec.md §1).
    pub async fn ingest(&self, client: &reqwest::Client, fetch_timeout: Duration, mut entry: Telemetry, now_ms: u64) {
        let original_stack = if self.source_map_enabled {
            match &entry.kind {
                TelemetryKind::Exception { stack: Some(stack), .. } => Some(stack.clone()),
                _ => None,
            }
        } else {
            None
        };

        if let Some(stack) = original_stack {
            let files: Vec<String> = stack
                .lines()
                .filter_map(crate::sourcemap::stack::parse_frame)
                .map(|frame| frame.file_name)
                .filter(|f| f.starts_with("http://") || f.starts_with("https://"))
                .collect();

            let mut maps = HashMap::new();
            for file in files {
                if maps.contains_key(&file) {
                    continue;
                }
                let resolved = match self.cache.get(&file) {
                    Some(cached) => cached,
                    None => {
                        let fetched = fetch_source_map(client, &file, fetch_timeout).await.ok();
                        self.cache.set(file.clone(), fetched.clone());
                        fetched
                    }
                };
                if let Some(map) = resolved {
                    maps.insert(file, map);
                }
            }

            if !maps.is_empty() {
                let resolved_stack = resolve_stack_trace(&stack, |file| maps.get(file).cloned());
                if let TelemetryKind::Exception { stack, .. } = &mut entry.kind {
                    *stack = Some(resolved_stack);
                }
                entry.source_map_resolved = Some(true);
            }
        }

        match self.dedupe.process(entry, now_ms) {
            crate::dedupe::DedupeOutcome::Send(entry) => {
                if matches!(self.batcher.enqueue(entry), EnqueueOutcome::Dropped) {
                    warn!("captured entry dropped, batcher pending buffer full");
                }
            }
            crate::dedupe::DedupeOutcome::Suppress => {}
        }
    }
}

fn now_ms() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis() as u64).unwrap_or(0)
}

const PILOT_ENABLED_KEY: &str = "aiWebPilotEnabled";
const TRACKED_TAB_ID_KEY: &str = "trackedTabId";
const TRACKED_TAB_URL_KEY: &str = "trackedTabUrl";
const TRACKED_TAB_TITLE_KEY: &str = "trackedTabTitle";

/// Hydrate `PilotAuthority` from storage, persisting `default` as the
/// initial value on first boot so later reads are stable (spec.md §4.J,
/// §9 Open Question (i): absent key resolves to `false`, not the repo's
/// divergent `true` default).
async fn hydrate_pilot(pilot: &PilotAuthority, kv: &dyn KeyValueStore, default: bool) {
    let stored = kv.get(PILOT_ENABLED_KEY).await.and_then(|v| v.as_bool());
    let resolved = match stored {
        Some(value) => value,
        None => {
            kv.set(PILOT_ENABLED_KEY, Value::Bool(default)).await;
            default
        }
    };
    pilot.hydrate(Some(resolved));
}

/// Hydrate `TrackingAuthority` from the persisted triple, then reconcile
/// against the live tab set (spec.md §3 "Tracked Target", §4.L startup
/// recovery).
async fn hydrate_tracking(tracking: &TrackingAuthority, screenshots: &ScreenshotRateLimiter, kv: &dyn KeyValueStore, tabs: &dyn TabsApi) {
    if let Some(tab_id) = kv.get(TRACKED_TAB_ID_KEY).await.and_then(|v| v.as_u64()) {
        let url = kv.get(TRACKED_TAB_URL_KEY).await.and_then(|v| v.as_str().map(str::to_string)).unwrap_or_default();
        let title = kv.get(TRACKED_TAB_TITLE_KEY).await.and_then(|v| v.as_str().map(str::to_string)).unwrap_or_default();
        tracking.track(tab_id, url, title);
    }
    LifecycleGlue::new(tracking, screenshots).on_startup(tabs).await;
}

/// Run the agent until `shutdown` is cancelled.
pub async fn run(config: Config, collaborators: Collaborators, shutdown: CancellationToken) -> anyhow::Result<()> {
    config.validate()?;

    let engine = GasolineEngine::new(&config);
    hydrate_pilot(&engine.pilot, collaborators.kv.as_ref(), config.pilot_enabled).await;
    hydrate_tracking(&engine.tracking, &engine.screenshots, collaborators.kv.as_ref(), collaborators.tabs.as_ref()).await;

    if lifecycle::detect_restart(collaborators.kv.as_ref(), &config.extension_version).await {
        warn!("service worker restarted since last boot; in-memory buffers and error groups were reset");
    }

    let engine = Arc::new(engine);

    let http_client = reqwest::Client::new();
    let transport = HttpSyncTransport::new(http_client.clone(), config.server_url.clone(), config.extension_version.clone());
    let sync_client = Arc::new(SyncClient::new(
        transport,
        SyncOptions {
            default_next_poll: Duration::from_millis(config.default_next_poll_ms),
            retry_interval: Duration::from_millis(config.sync_retry_ms),
            timeout: config.sync_timeout(),
            processed_lru_capacity: config.processed_command_lru,
            result_buffer_cap: config.command_result_buffer,
        },
        config.extension_version.clone(),
    ));

    let dispatch_ctx = DispatchContext {
        pilot: Arc::clone(&engine.pilot),
        tracking: Arc::clone(&engine.tracking),
        tabs: Arc::clone(&collaborators.tabs),
        content: Arc::clone(&collaborators.content),
        injector: Arc::clone(&collaborators.injector),
        kv: Arc::clone(&collaborators.kv),
        list_interactive_cap: config.list_interactive_cap,
    };

    let mut handles: Vec<JoinHandle<()>> = Vec::new();
    handles.push(spawn_telemetry_flush_loop(
        Arc::clone(&engine),
        http_client.clone(),
        config.server_url.clone(),
        config.batch_debounce(),
        shutdown.clone(),
    ));
    handles.push(spawn_error_group_flush_loop(Arc::clone(&engine), config.error_group_flush_interval(), shutdown.clone()));
    handles.push(spawn_error_group_cleanup_loop(Arc::clone(&engine), config.error_group_cleanup_interval(), shutdown.clone()));
    handles.push(spawn_memory_check_loop(Arc::clone(&engine), config.memory_check_interval(), shutdown.clone()));
    handles.push(spawn_reconnect_probe_loop(
        Arc::clone(&engine),
        http_client.clone(),
        config.server_url.clone(),
        config.reconnect_probe_interval(),
        shutdown.clone(),
    ));

    let ext_session_id = Uuid::new_v4().to_string();
    info!(server_url = %config.server_url, %ext_session_id, "gasoline agent starting sync loop");

    while !shutdown.is_cancelled() {
        let settings = SyncSettings {
            pilot_enabled: engine.pilot.is_enabled(),
            tracked_tab_id: engine.tracking.current().map(|t| t.tab_id),
            capture_overrides: None,
        };
        let extension_logs = {
            let logs = engine.core.debug_logs();
            if logs.is_empty() {
                None
            } else {
                Some(logs.into_iter().map(Value::String).collect())
            }
        };

        let next_poll = match sync_client.perform_sync(&ext_session_id, settings, extension_logs).await {
            SyncAttempt::Completed(outcome) => {
                engine.core.set_connected(outcome.connected, now_ms());
                if let Some((server_version, extension_version)) = outcome.version_mismatch {
                    debug!(server_version, extension_version, "sync server/extension version differ (informational)");
                }
                for command in outcome.new_commands {
                    let ctx = dispatch_ctx.clone();
                    let sync_for_result = Arc::clone(&sync_client);
                    tokio::spawn(async move {
                        let result = dispatch::dispatch(command, ctx).await;
                        sync_for_result.queue_command_result(result);
                    });
                }
                outcome.next_poll
            }
            SyncAttempt::AlreadyInFlight => Duration::from_millis(config.sync_retry_ms),
        };

        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = tokio::time::sleep(next_poll) => {}
        }
    }

    info!("gasoline agent shutting down");
    for handle in handles {
        handle.abort();
    }
    Ok(())
}

/// Drains and POSTs the telemetry batch through the circuit breaker on a
/// fixed debounce cadence (spec.md §4.B). A single generic endpoint is
/// used rather than routing each `TelemetryKind` to its own capture
/// endpoint; see DESIGN.md for the scoping rationale.
fn spawn_telemetry_flush_loop(
    engine: Arc<GasolineEngine>,
    client: reqwest::Client,
    server_url: String,
    debounce: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    let url = format!("{}/logs", server_url.trim_end_matches('/'));
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(debounce) => {}
            }

            let send = |batch: Vec<Telemetry>| {
                let client = client.clone();
                let url = url.clone();
                async move { client.post(&url).json(&batch).send().await.map(|_| ()).map_err(|_| ()) }
            };
            engine.batcher.flush_with_breaker(&engine.breaker, now_ms(), send, |delay| async move { tokio::time::sleep(delay).await }).await;
        }
    })
}

/// Periodic `flushErrorGroups()` (spec.md §4.C): emitted aggregates are
/// re-enqueued into the batcher like any other telemetry entry.
fn spawn_error_group_flush_loop(engine: Arc<GasolineEngine>, interval: Duration, shutdown: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }
            for synthetic in engine.dedupe.flush(now_ms()) {
                if matches!(engine.batcher.enqueue(synthetic), EnqueueOutcome::Dropped) {
                    warn!("error-group aggregate dropped, batcher pending buffer full");
                }
            }
        }
    })
}

/// Periodic stale-group GC beyond the flush interval (spec.md §4.C).
fn spawn_error_group_cleanup_loop(engine: Arc<GasolineEngine>, interval: Duration, shutdown: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }
            engine.dedupe.gc_stale(now_ms());
        }
    })
}

/// Periodic memory-pressure re-check (spec.md §4.D, §4.L). The batcher
/// does not track entries by kind, so the pending queue length stands in
/// for `BufferCounts::log_entries`; see DESIGN.md.
fn spawn_memory_check_loop(engine: Arc<GasolineEngine>, interval: Duration, shutdown: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }
            let counts = BufferCounts { log_entries: engine.batcher.pending_len() as u64, ..BufferCounts::default() };
            let state = engine.memory.check(counts, now_ms());
            engine.batcher.set_reduced_capacities(state.reduced_capacities);
        }
    })
}

/// Periodic `/health` probe (spec.md §4.F, §4.L, §6 `/health`): feeds
/// `HealthOk`/`HealthFail` into the connection state machine so
/// `isHealthStale` reflects reality even while the sync loop is otherwise
/// idle or the breaker is open.
fn spawn_reconnect_probe_loop(engine: Arc<GasolineEngine>, client: reqwest::Client, server_url: String, interval: Duration, shutdown: CancellationToken) -> JoinHandle<()> {
    let url = format!("{}/health", server_url.trim_end_matches('/'));
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }
            let healthy = client.get(&url).send().await.map(|r| r.status().is_success()).unwrap_or(false);
            let event = if healthy { crate::connection::Event::HealthOk } else { crate::connection::Event::HealthFail };
            engine.core.connection().transition(event, now_ms());
        }
    })
}

#[cfg(test)]
#[path = "run_tests.rs"]
mod tests;
