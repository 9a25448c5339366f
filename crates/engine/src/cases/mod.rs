// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Concrete contention tests
//!
//! Every test implements [`TestCase`] and composes the fixture it needs
//! rather than inheriting shared behavior.

mod file_locking;
mod race;
mod recovery;

pub use file_locking::{BarrierRendezvous, CasRace, LockExclusion, LockFairness};
pub use race::{CleanCopy, CompetingCopies, DeleteDuringWrite, ObservedCopy, PreoccupiedTemp};
pub use recovery::{CommitRollback, OrphanedLockHolder};

use crate::error::TestError;
use crate::launcher::WorkerLauncher;
use crate::worker::WorkerOutput;
use async_trait::async_trait;
use ct_core::isolation::EmergencyCleanupManager;
use ct_core::platform::Platform;
use serde_json::Value;
use std::path::PathBuf;

/// Everything a test may touch while it runs
#[derive(Clone)]
pub struct TestContext {
    pub test_id: String,
    /// Private directory created by the test's isolation context
    pub work_dir: PathBuf,
    pub launcher: WorkerLauncher,
    pub platform: Platform,
    pub emergency: EmergencyCleanupManager,
}

/// What a passing test has to say
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TestOutcome {
    pub message: String,
    pub details: Value,
}

impl TestOutcome {
    pub fn new(message: impl Into<String>, details: Value) -> Self {
        Self {
            message: message.into(),
            details,
        }
    }
}

#[async_trait]
pub trait TestCase: Send {
    /// Lay out fixtures; a failure here skips `run`
    async fn initialize(&mut self, ctx: &TestContext) -> Result<(), TestError>;

    /// Drive the workers and check the invariant under test
    async fn run(&mut self, ctx: &TestContext) -> Result<TestOutcome, TestError>;

    /// Release anything the test holds outside its work dir
    async fn cleanup(&mut self, _ctx: &TestContext) -> Result<(), TestError> {
        Ok(())
    }
}

/// Fail unless every worker finished successfully
pub(crate) fn all_succeeded(outputs: &[WorkerOutput]) -> Result<(), TestError> {
    match outputs.iter().position(|o| !o.succeeded()) {
        None => Ok(()),
        Some(i) => Err(TestError::Assertion(format!(
            "worker {} failed (exit {:?}): {}",
            i,
            outputs[i].exit_code,
            outputs[i].message()
        ))),
    }
}

/// The fixture laid out by `initialize`
pub(crate) fn initialized<T>(fixture: &Option<T>) -> Result<&T, TestError> {
    fixture
        .as_ref()
        .ok_or_else(|| TestError::Setup("run called before initialize".to_string()))
}

/// Fixture setup errors are setup failures
pub(crate) fn setup<T>(result: std::io::Result<T>) -> Result<T, TestError> {
    result.map_err(|e| TestError::Setup(e.to_string()))
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    pub fn context(work_dir: &std::path::Path) -> TestContext {
        TestContext {
            test_id: "TEST-001".to_string(),
            work_dir: work_dir.to_path_buf(),
            launcher: WorkerLauncher::thread(),
            platform: Platform::current(),
            emergency: EmergencyCleanupManager::new(),
        }
    }

    /// Run a case through its whole lifecycle
    pub async fn drive(
        case: &mut dyn TestCase,
        ctx: &TestContext,
    ) -> Result<TestOutcome, TestError> {
        case.initialize(ctx).await?;
        let outcome = case.run(ctx).await;
        case.cleanup(ctx).await?;
        outcome
    }
}
