// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Debounced, size-capped telemetry queue dispatched through a circuit
//! breaker (spec.md §4.B).

use std::collections::VecDeque;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use tracing::{debug, warn};

use crate::breaker::{BreakerError, CallOutcome, CircuitBreaker};
use crate::telemetry::Telemetry;
use crate::util::lock;

pub const DEFAULT_MAX_PENDING_BUFFER: usize = 1000;

pub struct BatcherOptions {
    pub debounce_ms: u64,
    pub max_batch_size: usize,
    pub retry_budget: u32,
    pub max_pending: usize,
}

impl Default for BatcherOptions {
    fn default() -> Self {
        Self { debounce_ms: 100, max_batch_size: 50, retry_budget: 3, max_pending: DEFAULT_MAX_PENDING_BUFFER }
    }
}

/// Size-capped, debounce-flushed queue of telemetry entries.
///
/// `flush_after_enqueue` tells the caller whether the debounce timer should
/// be preempted because the queue just crossed `max_batch_size`.
pub struct Batcher {
    pending: Mutex<VecDeque<Telemetry>>,
    options: BatcherOptions,
    connected: AtomicBool,
    reduced_capacities: AtomicBool,
}

pub enum EnqueueOutcome {
    Queued { flush_now: bool },
    Dropped,
}

impl Batcher {
    pub fn new(options: BatcherOptions) -> Self {
        Self {
            pending: Mutex::new(VecDeque::new()),
            options,
            connected: AtomicBool::new(false),
            reduced_capacities: AtomicBool::new(false),
        }
    }

    /// Effective batch size cap: halved under memory pressure (spec.md §4.B,
    /// §4.D).
    pub fn effective_max_batch_size(&self) -> usize {
        let base = self.options.max_batch_size;
        if self.reduced_capacities.load(Ordering::Acquire) {
            (base / 2).max(1)
        } else {
            base
        }
    }

    pub fn set_reduced_capacities(&self, reduced: bool) {
        self.reduced_capacities.store(reduced, Ordering::Release);
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    pub fn pending_len(&self) -> usize {
        lock(&self.pending).len()
    }

    /// Enqueue an entry. Drops silently once the configured pending cap is
    /// reached (spec.md §4.B).
    pub fn enqueue(&self, entry: Telemetry) -> EnqueueOutcome {
        let mut pending = lock(&self.pending);
        if pending.len() >= self.options.max_pending {
            warn!(pending = pending.len(), "batcher pending buffer full, dropping entry");
            return EnqueueOutcome::Dropped;
        }
        pending.push_back(entry);
        let flush_now = pending.len() >= self.effective_max_batch_size();
        EnqueueOutcome::Queued { flush_now }
    }

    /// Drain up to the effective cap for a flush attempt, leaving the rest
    /// queued.
    fn drain_batch(&self) -> Vec<Telemetry> {
        let mut pending = lock(&self.pending);
        let take = pending.len().min(self.effective_max_batch_size());
        pending.drain(..take).collect()
    }

    /// Put entries back at the front of the queue (a requeue after a failed
    /// or abandoned flush), respecting the configured pending cap.
    fn requeue_front(&self, mut entries: Vec<Telemetry>) {
        let mut pending = lock(&self.pending);
        while pending.len() < self.options.max_pending {
            match entries.pop() {
                Some(entry) => pending.push_front(entry),
                None => break,
            }
        }
        if !entries.is_empty() {
            warn!(dropped = entries.len(), "batcher requeue exceeded pending buffer cap");
        }
    }

    /// Flush the current batch through a breaker-wrapped send function
    /// (spec.md §4.B flush path). `send` performs the actual network call;
    /// `now_ms` drives the breaker's backoff scheduling and `sleep` is the
    /// caller-supplied delay primitive so this stays unit-testable without
    /// real wall-clock waits.
    pub async fn flush_with_breaker<S, Fut, Sleep, SleepFut>(
        &self,
        breaker: &CircuitBreaker,
        now_ms: u64,
        mut send: S,
        mut sleep: Sleep,
    ) where
        S: FnMut(Vec<Telemetry>) -> Fut,
        Fut: Future<Output = Result<(), ()>>,
        Sleep: FnMut(std::time::Duration) -> SleepFut,
        SleepFut: Future<Output = ()>,
    {
        if breaker.current_state(now_ms) == crate::breaker::BreakerState::Open {
            // Abandon the flush; nothing was drained, nothing to requeue.
            return;
        }

        let batch = self.drain_batch();
        if batch.is_empty() {
            return;
        }

        let mut remaining_retries = self.options.retry_budget;
        let mut attempt = batch;
        loop {
            if breaker.try_acquire(now_ms).is_err() {
                self.requeue_front(attempt);
                return;
            }

            match send(attempt.clone()).await {
                Ok(()) => {
                    breaker.record(CallOutcome::Success, now_ms);
                    self.connected.store(true, Ordering::Release);
                    return;
                }
                Err(()) => {
                    breaker.record(CallOutcome::Failure, now_ms);
                    if breaker.current_state(now_ms) == crate::breaker::BreakerState::Open {
                        self.requeue_front(attempt);
                        return;
                    }
                    if remaining_retries == 0 {
                        self.requeue_front(attempt);
                        return;
                    }
                    remaining_retries -= 1;
                    let backoff = breaker.backoff_for(self.options.retry_budget - remaining_retries + 1);
                    debug!(remaining_retries, ?backoff, "batcher retrying flush");
                    sleep(backoff).await;
                }
            }
        }
    }

    /// Flush without a breaker: the "simple" flavor named in spec.md §4.B.
    pub async fn flush_simple<S, Fut>(&self, mut send: S)
    where
        S: FnMut(Vec<Telemetry>) -> Fut,
        Fut: Future<Output = Result<(), ()>>,
    {
        let batch = self.drain_batch();
        if batch.is_empty() {
            return;
        }
        if send(batch.clone()).await.is_ok() {
            self.connected.store(true, Ordering::Release);
        } else {
            self.requeue_front(batch);
        }
    }
}

/// A send-site error distinguishing a breaker rejection from a transport
/// failure, used by callers composing `Batcher` with `CircuitBreaker`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendRejected {
    BreakerOpen,
    ProbeInFlight,
}

impl From<BreakerError> for SendRejected {
    fn from(value: BreakerError) -> Self {
        match value {
            BreakerError::Open => Self::BreakerOpen,
            BreakerError::ProbeInFlight => Self::ProbeInFlight,
        }
    }
}

#[cfg(test)]
#[path = "batch_tests.rs"]
mod tests;
