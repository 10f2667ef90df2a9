// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Buffer-memory estimator with soft/hard pressure thresholds (spec.md
//! §3, §4.D).

use std::sync::Mutex;

use tracing::warn;

use crate::telemetry::BufferCounts;
use crate::util::lock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PressureLevel {
    Normal,
    Soft,
    Hard,
}

#[derive(Debug, Clone, Copy)]
pub struct MemoryPressureState {
    pub level: PressureLevel,
    pub reduced_capacities: bool,
    pub network_body_disabled: bool,
    pub estimated_bytes: u64,
    pub last_check_ms: u64,
}

pub struct MemoryGovernorOptions {
    pub soft_threshold_bytes: u64,
    pub hard_threshold_bytes: u64,
}

impl Default for MemoryGovernorOptions {
    fn default() -> Self {
        Self { soft_threshold_bytes: 20 * 1024 * 1024, hard_threshold_bytes: 50 * 1024 * 1024 }
    }
}

/// Tracks buffer memory pressure and derives the normal/soft/hard level
/// (spec.md §4.D). Hysteresis is implicit in using strict thresholds for
/// escalation and the same thresholds for de-escalation, since the level
/// only changes on an explicit re-check rather than continuously.
pub struct MemoryGovernor {
    options: MemoryGovernorOptions,
    state: Mutex<MemoryPressureState>,
}

impl MemoryGovernor {
    pub fn new(options: MemoryGovernorOptions) -> Self {
        Self {
            options,
            state: Mutex::new(MemoryPressureState {
                level: PressureLevel::Normal,
                reduced_capacities: false,
                network_body_disabled: false,
                estimated_bytes: 0,
                last_check_ms: 0,
            }),
        }
    }

    /// Re-derive the pressure level from current buffer counts
    /// (spec.md §4.D, §8 scenario 6: 22MB -> soft, 55MB -> hard, 10MB -> normal).
    pub fn check(&self, counts: BufferCounts, now_ms: u64) -> MemoryPressureState {
        let estimated_bytes = counts.estimated_bytes();
        let level = if estimated_bytes >= self.options.hard_threshold_bytes {
            PressureLevel::Hard
        } else if estimated_bytes >= self.options.soft_threshold_bytes {
            PressureLevel::Soft
        } else {
            PressureLevel::Normal
        };

        let mut state = lock(&self.state);
        if state.level != level {
            warn!(?level, estimated_bytes, "memory pressure level changed");
        }
        state.level = level;
        state.reduced_capacities = level != PressureLevel::Normal;
        state.network_body_disabled = level == PressureLevel::Hard;
        state.estimated_bytes = estimated_bytes;
        state.last_check_ms = now_ms;
        *state
    }

    pub fn current(&self) -> MemoryPressureState {
        *lock(&self.state)
    }
}

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;
