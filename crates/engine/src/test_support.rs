// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Serializes tests that spawn child processes against tests whose
//! isolation exit kills every unexpected descendant

use tokio::sync::{Mutex, MutexGuard};

static PROCESSES: Mutex<()> = Mutex::const_new(());

pub(crate) async fn process_guard() -> MutexGuard<'static, ()> {
    PROCESSES.lock().await
}
