// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Filesystem-mediated coordination for independent processes
//!
//! This module provides:
//! - **FileLock** - Advisory exclusion via exclusive file creation with backoff
//! - **SharedStateStore** - Lock-protected key/value map persisted as JSON
//! - **ProcessBarrier** - N-party rendezvous over a shared status file
//! - **Sweep** - Removal of lock files orphaned by dead holders

pub mod barrier;
pub mod lock;
pub mod store;
pub mod sweep;

pub use barrier::{BarrierError, BarrierStatus, ProcessBarrier, BARRIER_POLL_INTERVAL};
pub use lock::{lock_path_for, FileLock, LockConfig, LockError, LockHandle, LockRecord};
pub use store::{
    display_form, FileBackedStore, InMemoryStore, SharedState, SharedStateStore, StoreError,
};
pub use sweep::{sweep_stale_locks, SweepConfig, SweepReport};
