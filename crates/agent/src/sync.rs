// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Long-poll sync client: posts telemetry/results, pulls commands
//! (spec.md §4.G).

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::command::{CommandResult, PendingCommand, ProcessedCommandLru};
use crate::error::AppError;
use crate::util::lock;

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

const DEFAULT_RESULT_BUFFER_CAP: usize = 200;

#[derive(Debug, Clone, Serialize)]
pub struct SyncSettings {
    pub pilot_enabled: bool,
    pub tracked_tab_id: Option<u64>,
    pub capture_overrides: Option<Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncRequestBody {
    pub ext_session_id: String,
    pub extension_version: String,
    pub settings: SyncSettings,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extension_logs: Option<Vec<Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command_results: Option<Vec<CommandResult>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_command_ack: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct SyncResponseBody {
    pub server_version: Option<String>,
    #[serde(default)]
    pub commands: Vec<PendingCommand>,
    pub capture_overrides: Option<Value>,
    pub next_poll_ms: Option<u64>,
}

/// Sync transport seam (spec.md §6 `/sync`): a real implementation POSTs
/// JSON over HTTP; tests substitute a scripted fake.
pub trait SyncTransport: Send + Sync {
    fn sync<'a>(&'a self, body: &'a SyncRequestBody, timeout: Duration) -> BoxFuture<'a, Result<SyncResponseBody, AppError>>;
}

/// `reqwest`-backed transport, grounded on the teacher's broker
/// registration client idiom (build once, POST JSON, bounded timeout).
pub struct HttpSyncTransport {
    client: reqwest::Client,
    server_url: String,
    extension_version: String,
}

impl HttpSyncTransport {
    pub fn new(client: reqwest::Client, server_url: String, extension_version: String) -> Self {
        Self { client, server_url, extension_version }
    }
}

impl SyncTransport for HttpSyncTransport {
    fn sync<'a>(&'a self, body: &'a SyncRequestBody, timeout: Duration) -> BoxFuture<'a, Result<SyncResponseBody, AppError>> {
        Box::pin(async move {
            let url = format!("{}/sync", self.server_url.trim_end_matches('/'));
            let request = self
                .client
                .post(&url)
                .header("X-Gasoline-Client", "agent")
                .header("X-Gasoline-Extension-Version", &self.extension_version)
                .json(body);

            let response = tokio::time::timeout(timeout, request.send())
                .await
                .map_err(|_| AppError::new(crate::error::ErrorCode::Timeout, "sync request timed out"))?
                .map_err(|e| AppError::new(crate::error::ErrorCode::Internal, e.to_string()))?;

            if !response.status().is_success() {
                return Err(AppError::new(
                    crate::error::ErrorCode::Internal,
                    format!("sync responded with HTTP {}", response.status()),
                ));
            }

            response
                .json::<SyncResponseBody>()
                .await
                .map_err(|e| AppError::new(crate::error::ErrorCode::Internal, e.to_string()))
        })
    }
}

#[derive(Debug, Clone)]
pub struct SyncOptions {
    pub default_next_poll: Duration,
    pub retry_interval: Duration,
    pub timeout: Duration,
    pub processed_lru_capacity: usize,
    pub result_buffer_cap: usize,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            default_next_poll: Duration::from_millis(1_000),
            retry_interval: Duration::from_millis(1_000),
            timeout: Duration::from_millis(8_000),
            processed_lru_capacity: 1_000,
            result_buffer_cap: DEFAULT_RESULT_BUFFER_CAP,
        }
    }
}

#[derive(Debug, Clone)]
struct SyncState {
    connected: bool,
    consecutive_failures: u32,
    last_command_ack: Option<String>,
}

/// Outcome of one completed sync attempt, returned to the run loop so it
/// can dispatch new commands and schedule the next attempt.
#[derive(Debug, Clone)]
pub struct SyncOutcome {
    pub connected: bool,
    pub new_commands: Vec<PendingCommand>,
    pub next_poll: Duration,
    /// `(server_version, extension_version)` when `major.minor` differ
    /// (spec.md §4.G; not fatal).
    pub version_mismatch: Option<(String, String)>,
}

/// Whether a sync attempt actually ran this call, or was absorbed by
/// re-entrancy (spec.md §4.G `flush()` is re-entrant).
pub enum SyncAttempt {
    Completed(SyncOutcome),
    AlreadyInFlight,
}

pub struct SyncClient<T> {
    transport: T,
    options: SyncOptions,
    extension_version: String,
    state: Mutex<SyncState>,
    results: Mutex<VecDeque<CommandResult>>,
    processed: ProcessedCommandLru,
    flush_in_flight: AtomicBool,
    flush_requested: AtomicBool,
    consecutive_failures_atomic: AtomicU32,
    next_poll_ms: AtomicU64,
}

impl<T: SyncTransport> SyncClient<T> {
    pub fn new(transport: T, options: SyncOptions, extension_version: String) -> Self {
        let default_next_poll = options.default_next_poll.as_millis() as u64;
        Self {
            processed: ProcessedCommandLru::new(options.processed_lru_capacity),
            transport,
            extension_version,
            state: Mutex::new(SyncState { connected: false, consecutive_failures: 0, last_command_ack: None }),
            results: Mutex::new(VecDeque::new()),
            flush_in_flight: AtomicBool::new(false),
            flush_requested: AtomicBool::new(false),
            consecutive_failures_atomic: AtomicU32::new(0),
            next_poll_ms: AtomicU64::new(default_next_poll),
        }
    }

    pub fn is_connected(&self) -> bool {
        lock(&self.state).connected
    }

    pub fn next_poll(&self) -> Duration {
        Duration::from_millis(self.next_poll_ms.load(Ordering::Acquire))
    }

    /// `queueCommandResult(r)` (spec.md §4.G): caps the buffer at 200,
    /// dropping the oldest, and requests an immediate flush.
    pub fn queue_command_result(&self, result: CommandResult) {
        let mut results = lock(&self.results);
        if results.len() >= self.options.result_buffer_cap {
            results.pop_front();
        }
        results.push_back(result);
        drop(results);
        self.flush_requested.store(true, Ordering::Release);
    }

    pub fn take_flush_requested(&self) -> bool {
        self.flush_requested.swap(false, Ordering::AcqRel)
    }

    /// Attempt one sync round. Re-entrant: if a sync is already in flight,
    /// sets `flushRequested` and returns `AlreadyInFlight` instead of
    /// racing a second HTTP request.
    pub async fn perform_sync(&self, ext_session_id: &str, settings: SyncSettings, extension_logs: Option<Vec<Value>>) -> SyncAttempt {
        if self.flush_in_flight.swap(true, Ordering::AcqRel) {
            self.flush_requested.store(true, Ordering::Release);
            return SyncAttempt::AlreadyInFlight;
        }

        let command_results = {
            let mut results = lock(&self.results);
            if results.is_empty() {
                None
            } else {
                Some(results.drain(..).collect::<Vec<_>>())
            }
        };
        let last_command_ack = lock(&self.state).last_command_ack.clone();

        let body = SyncRequestBody {
            ext_session_id: ext_session_id.to_string(),
            extension_version: self.extension_version.clone(),
            settings,
            extension_logs,
            command_results,
            last_command_ack,
        };

        let result = self.transport.sync(&body, self.options.timeout).await;
        self.flush_in_flight.store(false, Ordering::Release);

        let outcome = match result {
            Ok(response) => self.handle_success(response),
            Err(err) => {
                warn!(error = %err, "sync request failed");
                self.handle_failure()
            }
        };

        SyncAttempt::Completed(outcome)
    }

    fn handle_success(&self, response: SyncResponseBody) -> SyncOutcome {
        {
            let mut state = lock(&self.state);
            state.consecutive_failures = 0;
            state.connected = true;
        }
        self.consecutive_failures_atomic.store(0, Ordering::Release);

        let next_poll_ms = response.next_poll_ms.unwrap_or(self.options.default_next_poll.as_millis() as u64);
        self.next_poll_ms.store(next_poll_ms, Ordering::Release);

        let received_ack = response.commands.last().map(|cmd| cmd.id.clone());

        let new_commands: Vec<PendingCommand> = response
            .commands
            .into_iter()
            .filter(|cmd| !self.processed.check_and_record(&cmd.id))
            .collect();

        if let Some(last) = received_ack {
            lock(&self.state).last_command_ack = Some(last);
        }

        let version_mismatch = response.server_version.as_deref().and_then(|server_version| {
            if major_minor(server_version) != major_minor(&self.extension_version) {
                Some((server_version.to_string(), self.extension_version.clone()))
            } else {
                None
            }
        });

        SyncOutcome {
            connected: true,
            new_commands,
            next_poll: Duration::from_millis(next_poll_ms),
            version_mismatch,
        }
    }

    /// A transient single failure does NOT flip `connected`; only the 2nd
    /// consecutive failure does (spec.md §4.G: prevents badge flapping).
    fn handle_failure(&self) -> SyncOutcome {
        let connected = {
            let mut state = lock(&self.state);
            state.consecutive_failures += 1;
            if state.consecutive_failures >= 2 {
                state.connected = false;
            }
            state.connected
        };
        self.next_poll_ms.store(self.options.retry_interval.as_millis() as u64, Ordering::Release);

        debug!(connected, "sync failure recorded");
        SyncOutcome { connected, new_commands: Vec::new(), next_poll: self.options.retry_interval, version_mismatch: None }
    }
}

/// Compares only `major.minor`, ignoring patch (spec.md §4.G).
fn major_minor(version: &str) -> (&str, &str) {
    let mut parts = version.splitn(3, '.');
    (parts.next().unwrap_or(""), parts.next().unwrap_or(""))
}

#[cfg(test)]
#[path = "sync_tests.rs"]
mod tests;
