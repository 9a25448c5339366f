// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error types for workers, test cases and the orchestrator

use ct_catalog::CatalogError;
use ct_core::coordination::{BarrierError, LockError, StoreError};
use ct_core::isolation::IsolationError;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Errors raised while executing or supervising a worker
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("lock error: {0}")]
    Lock(#[from] LockError),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("barrier error: {0}")]
    Barrier(#[from] BarrierError),
    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to encode worker command: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("failed to spawn worker: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("failed to wait for worker: {0}")]
    Wait(#[source] std::io::Error),
    #[error("worker {label} timed out after {timeout:?}")]
    TimedOut { label: String, timeout: Duration },
    #[error("worker thread failed: {0}")]
    Join(String),
    #[error("worker stopped")]
    Stopped,
}

/// Why a test failed
#[derive(Debug, Error)]
pub enum TestError {
    #[error("setup failed: {0}")]
    Setup(String),
    #[error("{0}")]
    Assertion(String),
    #[error("partial commit detected: {present} of {total} destinations present")]
    PartialCommit { present: usize, total: usize },
    #[error("worker error: {0}")]
    Worker(#[from] WorkerError),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("lock error: {0}")]
    Lock(#[from] LockError),
    #[error("barrier error: {0}")]
    Barrier(#[from] BarrierError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("isolation error: {0}")]
    Isolation(#[from] IsolationError),
    #[error("timeout after {0:?}")]
    Timeout(Duration),
    #[error("test panicked: {0}")]
    Panicked(String),
}

/// Fatal harness errors; these abort the run
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("configuration error: {0}")]
    Catalog(#[from] CatalogError),
    #[error("unknown category: {0}")]
    UnknownCategory(String),
    #[error("unknown test: {0}")]
    UnknownTest(String),
    #[error("failed to prepare work root {path}: {source}")]
    WorkRoot {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Shorthand for a failed check inside a test
pub(crate) fn ensure(condition: bool, message: impl FnOnce() -> String) -> Result<(), TestError> {
    if condition {
        Ok(())
    } else {
        Err(TestError::Assertion(message()))
    }
}
