// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! ct-core: filesystem-mediated primitives for multi-process contention tests
//!
//! This crate provides:
//! - Advisory file locks, a lock-protected shared store and process barriers
//! - The atomic multi-destination copy protocol
//! - Resource snapshots, leak detection and trend analysis
//! - Per-test isolation with guaranteed cleanup

pub mod clock;
pub mod id;

pub mod coordination;
pub mod copy;
pub mod isolation;
pub mod monitor;
pub mod platform;
pub mod process;

#[cfg(test)]
mod test_support;

// Re-exports
pub use clock::{Clock, FakeClock, SystemClock};
pub use coordination::{
    FileBackedStore, FileLock, InMemoryStore, LockConfig, LockError, LockHandle, ProcessBarrier,
    SharedStateStore, StoreError,
};
pub use copy::{AtomicCopier, CopyOperationResult, DestinationResult};
pub use id::{IdGen, SequentialIdGen, UuidIdGen};
pub use isolation::{
    CleanupManager, EmergencyCleanupManager, IsolationConfig, TestIsolationContext,
};
pub use monitor::{LeakReport, LeakThresholds, ResourceMonitor, ResourceSnapshot, Severity};
pub use platform::{DeleteOutcome, Platform};
