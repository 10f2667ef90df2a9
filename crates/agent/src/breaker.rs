// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-endpoint circuit breaker with exponential backoff (spec.md §4.A).

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::util::lock;

const MAX_HISTORY: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    HalfOpen,
    Open,
}

impl BreakerState {
    fn as_str(self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::HalfOpen => "half-open",
            Self::Open => "open",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Transition {
    pub from: BreakerState,
    pub to: BreakerState,
    pub reason: &'static str,
    pub at_ms: u64,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BreakerStats {
    pub consecutive_failures: u32,
    pub total_failures: u64,
    pub total_successes: u64,
}

/// Guard around a fallible call site that opens after `max_failures`
/// consecutive failures and half-opens after `reset_timeout` (spec.md §4.A).
///
/// `now_ms` is threaded through instead of read from the clock directly so
/// the state machine is deterministically testable.
pub struct CircuitBreaker {
    max_failures: u32,
    reset_timeout: Duration,
    initial_backoff: Duration,
    max_backoff: Duration,

    state: Mutex<BreakerState>,
    consecutive_failures: AtomicU32,
    total_failures: AtomicU64,
    total_successes: AtomicU64,
    last_failure_at_ms: AtomicU64,
    probe_in_flight: AtomicBool,
    history: Mutex<VecDeque<Transition>>,
    transitions_tx: broadcast::Sender<Transition>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallOutcome {
    Success,
    Failure,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BreakerError {
    Open,
    ProbeInFlight,
}

impl CircuitBreaker {
    pub fn new(max_failures: u32, reset_timeout: Duration, initial_backoff: Duration, max_backoff: Duration) -> Self {
        let (transitions_tx, _) = broadcast::channel(MAX_HISTORY);
        Self {
            max_failures,
            reset_timeout,
            initial_backoff,
            max_backoff,
            state: Mutex::new(BreakerState::Closed),
            consecutive_failures: AtomicU32::new(0),
            total_failures: AtomicU64::new(0),
            total_successes: AtomicU64::new(0),
            last_failure_at_ms: AtomicU64::new(0),
            probe_in_flight: AtomicBool::new(false),
            history: Mutex::new(VecDeque::with_capacity(MAX_HISTORY)),
            transitions_tx,
        }
    }

    /// Subscribe to state transitions. Mirrors `onStateChange(cb)`; a lagging
    /// or dropped subscriber never affects the breaker itself (spec.md §4.A:
    /// "subscriber exceptions are caught and ignored").
    pub fn subscribe(&self) -> broadcast::Receiver<Transition> {
        self.transitions_tx.subscribe()
    }

    /// Resolve half-open → half-open decay (time-based) before deciding
    /// whether a call is allowed. Must be called before every `execute`.
    pub fn current_state(&self, now_ms: u64) -> BreakerState {
        let state = *lock(&self.state);
        if state == BreakerState::Open {
            let last_failure = self.last_failure_at_ms.load(Ordering::Acquire);
            if now_ms.saturating_sub(last_failure) >= self.reset_timeout.as_millis() as u64 {
                return BreakerState::HalfOpen;
            }
        }
        state
    }

    /// Reserve permission to make a call. Returns an error if the breaker
    /// is open, or if a half-open probe is already in flight.
    pub fn try_acquire(&self, now_ms: u64) -> Result<(), BreakerError> {
        let observed = self.current_state(now_ms);
        match observed {
            BreakerState::Closed => Ok(()),
            BreakerState::Open => Err(BreakerError::Open),
            BreakerState::HalfOpen => {
                if self.probe_in_flight.swap(true, Ordering::AcqRel) {
                    Err(BreakerError::ProbeInFlight)
                } else {
                    self.transition(BreakerState::HalfOpen, "reset timeout elapsed", now_ms);
                    Ok(())
                }
            }
        }
    }

    /// Record the outcome of a call previously admitted by `try_acquire`.
    pub fn record(&self, outcome: CallOutcome, now_ms: u64) {
        let was_half_open = *lock(&self.state) == BreakerState::HalfOpen;
        if was_half_open {
            self.probe_in_flight.store(false, Ordering::Release);
        }

        match outcome {
            CallOutcome::Success => {
                self.total_successes.fetch_add(1, Ordering::Relaxed);
                self.consecutive_failures.store(0, Ordering::Release);
                if was_half_open || *lock(&self.state) != BreakerState::Closed {
                    self.transition(BreakerState::Closed, "probe succeeded", now_ms);
                }
            }
            CallOutcome::Failure => {
                self.total_failures.fetch_add(1, Ordering::Relaxed);
                self.last_failure_at_ms.store(now_ms, Ordering::Release);
                let count = self.consecutive_failures.fetch_add(1, Ordering::AcqRel) + 1;

                if was_half_open {
                    self.transition(BreakerState::Open, "probe failed", now_ms);
                } else if count >= self.max_failures {
                    self.transition(BreakerState::Open, "max consecutive failures reached", now_ms);
                } else {
                    debug!(consecutive_failures = count, "circuit breaker recorded failure");
                }
            }
        }
    }

    /// Backoff delay for the nth consecutive failure (n ≥ 2); spec.md §4.A:
    /// `min(initialBackoff * 2^(n-2), maxBackoff)`.
    pub fn backoff_for(&self, n: u32) -> Duration {
        if n < 2 {
            return Duration::ZERO;
        }
        let shift = (n - 2).min(32);
        let scaled = self.initial_backoff.as_millis().saturating_mul(1u128 << shift);
        Duration::from_millis(scaled.min(self.max_backoff.as_millis()) as u64)
    }

    pub fn reset(&self, reason: &'static str, now_ms: u64) {
        self.consecutive_failures.store(0, Ordering::Release);
        self.probe_in_flight.store(false, Ordering::Release);
        self.transition(BreakerState::Closed, reason, now_ms);
    }

    pub fn stats(&self) -> BreakerStats {
        BreakerStats {
            consecutive_failures: self.consecutive_failures.load(Ordering::Acquire),
            total_failures: self.total_failures.load(Ordering::Relaxed),
            total_successes: self.total_successes.load(Ordering::Relaxed),
        }
    }

    pub fn history(&self) -> Vec<Transition> {
        lock(&self.history).iter().cloned().collect()
    }

    fn transition(&self, to: BreakerState, reason: &'static str, now_ms: u64) {
        let mut state = lock(&self.state);
        let from = *state;
        if from == to {
            return;
        }
        *state = to;
        drop(state);

        warn!(from = from.as_str(), to = to.as_str(), reason, "circuit breaker transition");

        let transition = Transition { from, to, reason, at_ms: now_ms };
        let mut history = lock(&self.history);
        if history.len() >= MAX_HISTORY {
            history.pop_front();
        }
        history.push_back(transition.clone());
        drop(history);

        // No subscribers is the common case; a send error just means
        // nobody is listening, never a failure of the breaker itself.
        let _ = self.transitions_tx.send(transition);
    }
}

#[cfg(test)]
#[path = "breaker_tests.rs"]
mod tests;
