// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Event-driven connection state machine with invariant repair
//! (spec.md §3, §4.F).

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use tokio::sync::broadcast;
use tracing::warn;

use crate::util::lock;

const MAX_VIOLATION_HISTORY: usize = 20;
const MAX_REPAIR_ITERATIONS: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    Down,
    Booting,
    Up,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtensionState {
    Disconnected,
    Connected,
    Active,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    HalfOpen,
    Open,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollingState {
    Stopped,
    Running,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PilotState {
    Disabled,
    Enabled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackingState {
    None,
    TabTracked,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandsState {
    None,
    Queued,
    Processing,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConnectionTuple {
    pub server: ServerState,
    pub extension: ExtensionState,
    pub circuit: CircuitState,
    pub polling: PollingState,
    pub pilot: PilotState,
    pub tracking: TrackingState,
    pub commands: CommandsState,
    pub last_health_check_ms: u64,
    pub last_successful_poll_ms: u64,
    pub last_state_change_ms: u64,
}

impl ConnectionTuple {
    fn initial() -> Self {
        Self {
            server: ServerState::Down,
            extension: ExtensionState::Disconnected,
            circuit: CircuitState::Closed,
            polling: PollingState::Stopped,
            pilot: PilotState::Disabled,
            tracking: TrackingState::None,
            commands: CommandsState::None,
            last_health_check_ms: 0,
            last_successful_poll_ms: 0,
            last_state_change_ms: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    ServerUp,
    ServerDown,
    ServerBooting,
    HealthOk,
    HealthFail,
    PollingStarted,
    PollingStopped,
    PollSuccess,
    PollFail,
    PollStale,
    CbOpened,
    CbHalfOpen,
    CbClosed,
    CbProbeSuccess,
    CbProbeFail,
    UserReset,
    PilotEnabled,
    PilotDisabled,
    TrackingEnabled,
    TrackingDisabled,
    CommandQueued,
    CommandProcessing,
    CommandCompleted,
    CommandTimeout,
}

#[derive(Debug, Clone)]
pub struct Violation {
    pub invariant: &'static str,
    pub expected: String,
    pub actual: String,
    pub at_ms: u64,
}

pub struct ConnectionStateMachine {
    state: Mutex<ConnectionTuple>,
    violations: Mutex<VecDeque<Violation>>,
    listeners: broadcast::Sender<(ConnectionTuple, ConnectionTuple, Event)>,
}

impl ConnectionStateMachine {
    pub fn new() -> Self {
        let (listeners, _) = broadcast::channel(MAX_VIOLATION_HISTORY);
        Self { state: Mutex::new(ConnectionTuple::initial()), violations: Mutex::new(VecDeque::new()), listeners }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<(ConnectionTuple, ConnectionTuple, Event)> {
        self.listeners.subscribe()
    }

    pub fn current(&self) -> ConnectionTuple {
        *lock(&self.state)
    }

    pub fn violations(&self) -> Vec<Violation> {
        lock(&self.violations).iter().cloned().collect()
    }

    /// `isPollingStale(t)` (spec.md §4.F): time-based predicate used by the
    /// sync client to issue `PollStale`.
    pub fn is_polling_stale(&self, now_ms: u64, stale_after: Duration) -> bool {
        let state = self.current();
        now_ms.saturating_sub(state.last_successful_poll_ms) > stale_after.as_millis() as u64
    }

    /// `isHealthStale(t)` (spec.md §4.F).
    pub fn is_health_stale(&self, now_ms: u64, stale_after: Duration) -> bool {
        let state = self.current();
        now_ms.saturating_sub(state.last_health_check_ms) > stale_after.as_millis() as u64
    }

    /// Apply an event: compute the raw next tuple, repair invariants to a
    /// fixed point, record any violations observed along the way, and
    /// notify listeners with `(old, new, event)`.
    pub fn transition(&self, event: Event, now_ms: u64) -> ConnectionTuple {
        let old = self.current();
        let mut next = apply_event(old, event, now_ms);

        for _ in 0..MAX_REPAIR_ITERATIONS {
            let violated = repair_invariants(&mut next, now_ms, &mut |violation| {
                warn!(invariant = violation.invariant, expected = %violation.expected, actual = %violation.actual, "connection state invariant repaired");
                let mut ring = lock(&self.violations);
                if ring.len() >= MAX_VIOLATION_HISTORY {
                    ring.pop_front();
                }
                ring.push_back(violation);
            });
            if !violated {
                break;
            }
        }

        next.last_state_change_ms = now_ms;
        *lock(&self.state) = next;

        // No subscribers is the common case; never treat send failure as
        // a transition failure.
        let _ = self.listeners.send((old, next, event));
        next
    }

    /// `reset()` (spec.md §4.F): re-initialize and notify with `UserReset`.
    pub fn reset(&self, now_ms: u64) -> ConnectionTuple {
        let old = self.current();
        let mut next = ConnectionTuple::initial();
        next.last_state_change_ms = now_ms;
        *lock(&self.state) = next;
        let _ = self.listeners.send((old, next, Event::UserReset));
        next
    }
}

impl Default for ConnectionStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

fn apply_event(mut tuple: ConnectionTuple, event: Event, now_ms: u64) -> ConnectionTuple {
    match event {
        Event::ServerUp => tuple.server = ServerState::Up,
        Event::ServerDown => tuple.server = ServerState::Down,
        Event::ServerBooting => tuple.server = ServerState::Booting,
        Event::HealthOk => tuple.last_health_check_ms = now_ms,
        Event::HealthFail => tuple.last_health_check_ms = now_ms,
        Event::PollingStarted => tuple.polling = PollingState::Running,
        Event::PollingStopped => tuple.polling = PollingState::Stopped,
        Event::PollSuccess => {
            tuple.last_successful_poll_ms = now_ms;
            tuple.extension = ExtensionState::Active;
        }
        Event::PollFail | Event::PollStale => {
            if tuple.extension == ExtensionState::Active {
                tuple.extension = ExtensionState::Connected;
            }
        }
        Event::CbOpened | Event::CbProbeFail => tuple.circuit = CircuitState::Open,
        Event::CbHalfOpen => tuple.circuit = CircuitState::HalfOpen,
        Event::CbClosed | Event::CbProbeSuccess => tuple.circuit = CircuitState::Closed,
        Event::UserReset => return ConnectionTuple { last_state_change_ms: now_ms, ..ConnectionTuple::initial() },
        Event::PilotEnabled => tuple.pilot = PilotState::Enabled,
        Event::PilotDisabled => tuple.pilot = PilotState::Disabled,
        Event::TrackingEnabled => tuple.tracking = TrackingState::TabTracked,
        Event::TrackingDisabled => tuple.tracking = TrackingState::None,
        Event::CommandQueued => {
            if tuple.commands == CommandsState::None {
                tuple.commands = CommandsState::Queued;
            }
        }
        Event::CommandProcessing => tuple.commands = CommandsState::Processing,
        Event::CommandCompleted | Event::CommandTimeout => tuple.commands = CommandsState::None,
    }
    tuple
}

/// Repair the invariant table from spec.md §4.F. Returns whether any
/// invariant was violated (and thus repaired) this pass.
fn repair_invariants(tuple: &mut ConnectionTuple, now_ms: u64, on_violation: &mut dyn FnMut(Violation)) -> bool {
    let mut violated = false;

    // I1: server=down ⇒ extension=disconnected
    if tuple.server == ServerState::Down && tuple.extension != ExtensionState::Disconnected {
        on_violation(Violation {
            invariant: "I1",
            expected: "extension=disconnected".into(),
            actual: format!("{:?}", tuple.extension),
            at_ms: now_ms,
        });
        tuple.extension = ExtensionState::Disconnected;
        tuple.polling = PollingState::Stopped;
        violated = true;
    }

    // I2: extension=disconnected ⇒ polling=stopped
    if tuple.extension == ExtensionState::Disconnected && tuple.polling != PollingState::Stopped {
        on_violation(Violation {
            invariant: "I2",
            expected: "polling=stopped".into(),
            actual: format!("{:?}", tuple.polling),
            at_ms: now_ms,
        });
        tuple.polling = PollingState::Stopped;
        violated = true;
    }

    // I3: extension=active ⇒ polling=running
    if tuple.extension == ExtensionState::Active && tuple.polling != PollingState::Running {
        on_violation(Violation {
            invariant: "I3",
            expected: "polling=running".into(),
            actual: format!("{:?}", tuple.polling),
            at_ms: now_ms,
        });
        tuple.extension = ExtensionState::Connected;
        violated = true;
    }

    // I5: commands=processing ⇒ extension=active
    if tuple.commands == CommandsState::Processing && tuple.extension != ExtensionState::Active {
        on_violation(Violation {
            invariant: "I5",
            expected: "extension=active".into(),
            actual: format!("{:?}", tuple.extension),
            at_ms: now_ms,
        });
        tuple.commands = CommandsState::None;
        violated = true;
    }

    // I6: server=booting ⇒ extension=disconnected
    if tuple.server == ServerState::Booting && tuple.extension != ExtensionState::Disconnected {
        on_violation(Violation {
            invariant: "I6",
            expected: "extension=disconnected".into(),
            actual: format!("{:?}", tuple.extension),
            at_ms: now_ms,
        });
        tuple.extension = ExtensionState::Disconnected;
        tuple.polling = PollingState::Stopped;
        violated = true;
    }

    violated
}

#[cfg(test)]
#[path = "connection_tests.rs"]
mod tests;
