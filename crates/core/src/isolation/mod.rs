// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Test isolation and guaranteed teardown
//!
//! - **CleanupManager** - registry of files, directories and typed resources
//! - **TestIsolationContext** - per-test work dir, env backup and orphan sweep
//! - **EmergencyCleanupManager** - run-wide last-resort cleanup

pub mod cleanup;
pub mod context;
pub mod emergency;

pub use cleanup::{BackgroundJob, CleanupManager, CleanupOutcome, CleanupResource, RELEASE_GRACE};
pub use context::{
    orphan_candidates, ExitReport, IsolationConfig, IsolationError, OrphanScope,
    TestIsolationContext,
};
pub use emergency::{EmergencyCleanupManager, EmergencyReport};
