// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::{Mutex, MutexGuard};

/// Serializes tests that spawn children or sweep orphans, since an orphan
/// sweep in one test would otherwise kill another test's children
pub(crate) fn process_guard() -> MutexGuard<'static, ()> {
    static LOCK: Mutex<()> = Mutex::new(());
    LOCK.lock().unwrap_or_else(|e| e.into_inner())
}
