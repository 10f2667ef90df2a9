// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Small cross-cutting helpers shared by the component modules.

use std::sync::{Mutex, MutexGuard};

/// Lock a `std::sync::Mutex`, recovering the guard on poison instead of
/// panicking. A panic inside one component's critical section must not
/// take down every other component sharing the process.
pub fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
