// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Core Context (spec.md §9): replaces the original's shared
//! mutable-state module with setters injected into consumers. Components
//! take a `&CoreContext` at construction and use only the capability
//! traits they need instead of reaching into module-global state.

use std::collections::VecDeque;
use std::sync::Mutex;

use tracing::debug;

use crate::connection::{ConnectionStateMachine, Event};
use crate::util::lock;

const MAX_DEBUG_LOGS: usize = 200;

/// Where components read the currently configured control-server URL
/// (spec.md §6 `/settings`: the server URL can change at runtime).
pub trait ServerUrlSource: Send + Sync {
    fn server_url(&self) -> String;
}

/// Where components report connectivity outcomes into the connection FSM
/// (spec.md §4.F) without depending on the FSM's full API.
pub trait ConnectionStatusSink: Send + Sync {
    fn set_connected(&self, connected: bool, now_ms: u64);
}

/// Background-level debug logs (spec.md §6 `/extension-logs`), kept as a
/// bounded ring so components can append without owning a buffer.
pub trait DebugLogSink: Send + Sync {
    fn debug_log(&self, message: &str, now_ms: u64);
}

pub struct CoreContext {
    server_url: Mutex<String>,
    connection: ConnectionStateMachine,
    debug_logs: Mutex<VecDeque<String>>,
}

impl CoreContext {
    pub fn new(server_url: String) -> Self {
        Self { server_url: Mutex::new(server_url), connection: ConnectionStateMachine::new(), debug_logs: Mutex::new(VecDeque::new()) }
    }

    pub fn set_server_url(&self, url: String) {
        *lock(&self.server_url) = url;
    }

    pub fn connection(&self) -> &ConnectionStateMachine {
        &self.connection
    }

    pub fn debug_logs(&self) -> Vec<String> {
        lock(&self.debug_logs).iter().cloned().collect()
    }
}

impl ServerUrlSource for CoreContext {
    fn server_url(&self) -> String {
        lock(&self.server_url).clone()
    }
}

impl ConnectionStatusSink for CoreContext {
    fn set_connected(&self, connected: bool, now_ms: u64) {
        let event = if connected { Event::PollSuccess } else { Event::PollFail };
        self.connection.transition(event, now_ms);
    }
}

impl DebugLogSink for CoreContext {
    fn debug_log(&self, message: &str, now_ms: u64) {
        debug!(now_ms, "{message}");
        let mut logs = lock(&self.debug_logs);
        if logs.len() >= MAX_DEBUG_LOGS {
            logs.pop_front();
        }
        logs.push_back(message.to_string());
    }
}

#[cfg(test)]
#[path = "context_tests.rs"]
mod tests;
