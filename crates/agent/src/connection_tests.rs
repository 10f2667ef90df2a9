// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn starts_fully_down_and_disconnected() {
    let fsm = ConnectionStateMachine::new();
    let state = fsm.current();
    assert_eq!(state.server, ServerState::Down);
    assert_eq!(state.extension, ExtensionState::Disconnected);
    assert_eq!(state.polling, PollingState::Stopped);
}

/// I1: server down forces extension back to disconnected and polling to
/// stopped, even if a stray event had advanced them.
#[test]
fn server_down_forces_disconnect_and_stops_polling() {
    let fsm = ConnectionStateMachine::new();
    fsm.transition(Event::ServerUp, 0);
    fsm.transition(Event::PollingStarted, 0);
    fsm.transition(Event::PollSuccess, 0);
    assert_eq!(fsm.current().extension, ExtensionState::Active);

    let next = fsm.transition(Event::ServerDown, 1_000);
    assert_eq!(next.extension, ExtensionState::Disconnected);
    assert_eq!(next.polling, PollingState::Stopped);

    let violations = fsm.violations();
    assert!(violations.iter().any(|v| v.invariant == "I1"));
}

/// I6: server booting has the same repair shape as I1.
#[test]
fn server_booting_forces_disconnect() {
    let fsm = ConnectionStateMachine::new();
    fsm.transition(Event::ServerUp, 0);
    fsm.transition(Event::PollingStarted, 0);
    fsm.transition(Event::PollSuccess, 0);

    let next = fsm.transition(Event::ServerBooting, 1_000);
    assert_eq!(next.extension, ExtensionState::Disconnected);
    assert_eq!(next.polling, PollingState::Stopped);
    assert!(fsm.violations().iter().any(|v| v.invariant == "I6"));
}

/// I3: a successful poll claims extension=active, but if polling was never
/// marked running the repair must downgrade extension instead of lying
/// about polling.
#[test]
fn poll_success_without_running_polling_downgrades_extension() {
    let fsm = ConnectionStateMachine::new();
    fsm.transition(Event::ServerUp, 0);
    let next = fsm.transition(Event::PollSuccess, 100);
    assert_eq!(next.extension, ExtensionState::Connected);
    assert!(fsm.violations().iter().any(|v| v.invariant == "I3"));
}

/// I5: commands=processing requires extension=active; otherwise the
/// command state is repaired back to none rather than faking activity.
#[test]
fn command_processing_without_active_extension_is_repaired() {
    let fsm = ConnectionStateMachine::new();
    fsm.transition(Event::ServerUp, 0);
    fsm.transition(Event::PollingStarted, 0);
    let next = fsm.transition(Event::CommandProcessing, 50);
    assert_eq!(next.commands, CommandsState::None);
    assert!(fsm.violations().iter().any(|v| v.invariant == "I5"));
}

#[test]
fn full_happy_path_reaches_active_with_commands_processing() {
    let fsm = ConnectionStateMachine::new();
    fsm.transition(Event::ServerUp, 0);
    fsm.transition(Event::PollingStarted, 0);
    fsm.transition(Event::PollSuccess, 10);
    fsm.transition(Event::CbClosed, 10);
    let next = fsm.transition(Event::CommandProcessing, 20);
    assert_eq!(next.extension, ExtensionState::Active);
    assert_eq!(next.commands, CommandsState::Processing);
    assert_eq!(next.circuit, CircuitState::Closed);
}

#[test]
fn reset_reinitializes_every_field_and_emits_user_reset() {
    let fsm = ConnectionStateMachine::new();
    fsm.transition(Event::ServerUp, 0);
    fsm.transition(Event::PollingStarted, 0);
    fsm.transition(Event::PollSuccess, 10);
    fsm.transition(Event::PilotEnabled, 10);

    let mut rx = fsm.subscribe();
    let next = fsm.reset(999);
    assert_eq!(next.server, ServerState::Down);
    assert_eq!(next.extension, ExtensionState::Disconnected);
    assert_eq!(next.pilot, PilotState::Disabled);
    assert_eq!(next.last_state_change_ms, 999);

    let (_, _, event) = rx.try_recv().expect("reset should notify subscribers");
    assert_eq!(event, Event::UserReset);
}

#[test]
fn polling_and_health_staleness_predicates_use_last_observed_timestamps() {
    let fsm = ConnectionStateMachine::new();
    fsm.transition(Event::ServerUp, 0);
    fsm.transition(Event::PollingStarted, 0);
    fsm.transition(Event::PollSuccess, 1_000);
    fsm.transition(Event::HealthOk, 1_000);

    assert!(!fsm.is_polling_stale(5_000, Duration::from_millis(10_000)));
    assert!(fsm.is_polling_stale(20_000, Duration::from_millis(10_000)));
    assert!(!fsm.is_health_stale(5_000, Duration::from_millis(10_000)));
    assert!(fsm.is_health_stale(20_000, Duration::from_millis(10_000)));
}

#[test]
fn subscribers_observe_every_transition() {
    let fsm = ConnectionStateMachine::new();
    let mut rx = fsm.subscribe();
    fsm.transition(Event::ServerUp, 0);
    let (old, new, event) = rx.try_recv().expect("transition should notify");
    assert_eq!(old.server, ServerState::Down);
    assert_eq!(new.server, ServerState::Up);
    assert_eq!(event, Event::ServerUp);
}

#[test]
fn violation_history_is_bounded() {
    let fsm = ConnectionStateMachine::new();
    fsm.transition(Event::ServerUp, 0);
    for i in 0..30u64 {
        fsm.transition(Event::PollSuccess, i);
        fsm.transition(Event::ServerDown, i);
        fsm.transition(Event::ServerUp, i);
    }
    assert!(fsm.violations().len() <= MAX_VIOLATION_HISTORY);
}
