// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Recovery from crashed holders and failed commits

use super::{initialized, setup, TestCase, TestContext, TestOutcome};
use crate::error::{ensure, TestError};
use crate::fixtures::{write_random, RaceFixture, RecoveryFixture};
use crate::worker::WorkerCommand;
use async_trait::async_trait;
use ct_core::clock::{Clock, FakeClock, SystemClock};
use ct_core::coordination::{sweep_stale_locks, FileLock, SweepConfig};
use ct_core::copy::{AtomicCopier, CopyPhase};
use ct_core::isolation::{IsolationConfig, TestIsolationContext};
use serde_json::json;
use std::path::PathBuf;
use std::time::Duration;

const HOLD_MS: u64 = 30_000;
const LOCK_APPEAR_TIMEOUT: Duration = Duration::from_secs(10);

/// A lock whose holder died is reclaimed by the stale sweep, and only by it
pub struct OrphanedLockHolder {
    stale_after: Duration,
    fixture: Option<RecoveryFixture>,
}

impl OrphanedLockHolder {
    pub fn new(stale_after: Duration) -> Self {
        Self {
            stale_after,
            fixture: None,
        }
    }

    /// Abandon a process holder inside its own isolation scope and let the
    /// scope's exit kill it; returns the pid that was killed
    async fn crash_process_holder(
        &self,
        ctx: &TestContext,
        fixture: &RecoveryFixture,
    ) -> Result<u32, TestError> {
        let config = IsolationConfig::new(&ctx.work_dir);
        let mut scope = TestIsolationContext::new(format!("{}-holder", ctx.test_id), config);
        scope.enter_isolation()?;

        let launcher = ctx.launcher.clone().with_kill_on_drop(false);
        let holder = launcher.spawn(&WorkerCommand::HoldLock {
            lock_path: fixture.lock_path.clone(),
            hold_ms: HOLD_MS,
        })?;
        if !RecoveryFixture::wait_for(&fixture.lock_path, LOCK_APPEAR_TIMEOUT).await {
            let _ = holder.kill().await;
            return Err(TestError::Setup("holder never took the lock".to_string()));
        }
        let pid = holder
            .abandon()
            .ok_or_else(|| TestError::Setup("process holder has no pid".to_string()))?;

        let report = scope.exit_isolation()?;
        ctx.emergency.untrack_pid(pid);
        ensure(report.orphans_killed.iter().any(|p| p.pid == pid), || {
            format!(
                "isolation exit did not kill holder {} (killed {:?}, failures {:?})",
                pid, report.orphans_killed, report.orphan_failures
            )
        })?;
        Ok(pid)
    }

    /// Thread holders cannot be killed; ask them to drop the lock on the floor
    async fn crash_thread_holder(
        &self,
        ctx: &TestContext,
        fixture: &RecoveryFixture,
    ) -> Result<(), TestError> {
        let holder = ctx.launcher.spawn(&WorkerCommand::HoldLock {
            lock_path: fixture.lock_path.clone(),
            hold_ms: HOLD_MS,
        })?;
        if !RecoveryFixture::wait_for(&fixture.lock_path, LOCK_APPEAR_TIMEOUT).await {
            let _ = holder.kill().await;
            return Err(TestError::Setup("holder never took the lock".to_string()));
        }
        holder.kill().await?;
        Ok(())
    }
}

impl Default for OrphanedLockHolder {
    fn default() -> Self {
        Self::new(Duration::from_secs(60 * 60))
    }
}

#[async_trait]
impl TestCase for OrphanedLockHolder {
    async fn initialize(&mut self, ctx: &TestContext) -> Result<(), TestError> {
        self.fixture = Some(setup(RecoveryFixture::new(&ctx.work_dir))?);
        Ok(())
    }

    async fn run(&mut self, ctx: &TestContext) -> Result<TestOutcome, TestError> {
        let fixture = initialized(&self.fixture)?;
        let killed = if ctx.launcher.is_process() {
            Some(self.crash_process_holder(ctx, fixture).await?)
        } else {
            self.crash_thread_holder(ctx, fixture).await?;
            None
        };

        ensure(fixture.lock_path.exists(), || {
            "crashed holder's lock file disappeared".to_string()
        })?;
        ensure(FileLock::try_acquire(&fixture.lock_path)?.is_none(), || {
            "orphaned lock was acquirable before the sweep".to_string()
        })?;

        let sweep = SweepConfig::default().with_max_age(self.stale_after);
        let early = sweep_stale_locks(&fixture.root, &sweep, &SystemClock);
        ensure(early.removed.is_empty(), || {
            format!("fresh lock swept early: {:?}", early.removed)
        })?;

        let later = FakeClock::new();
        later.advance(self.stale_after * 2);
        let swept = sweep_stale_locks(&fixture.root, &sweep, &later);
        ensure(swept.removed.contains(&fixture.lock_path), || {
            format!(
                "stale lock not swept at {} (removed {:?}, failed {:?})",
                later.wall(),
                swept.removed,
                swept.failed
            )
        })?;

        let reacquired = FileLock::try_acquire(&fixture.lock_path)?
            .ok_or_else(|| TestError::Assertion("swept lock could not be re-acquired".to_string()))?;
        reacquired.release();

        Ok(TestOutcome::new(
            "orphaned lock reclaimed by the stale sweep",
            json!({
                "killedPid": killed,
                "staleAfterSecs": self.stale_after.as_secs(),
                "swept": swept.removed.len(),
            }),
        ))
    }
}

/// A rename failure partway through commit leaves nothing behind
pub struct CommitRollback {
    destinations: usize,
    obstructed: usize,
    fixture: Option<RecoveryFixture>,
    source: PathBuf,
    targets: Vec<PathBuf>,
}

impl CommitRollback {
    /// `obstructed` is the zero-based destination replaced by a directory
    pub fn new(destinations: usize, obstructed: usize) -> Self {
        Self {
            destinations,
            obstructed,
            fixture: None,
            source: PathBuf::new(),
            targets: Vec::new(),
        }
    }
}

impl Default for CommitRollback {
    fn default() -> Self {
        Self::new(5, 2)
    }
}

#[async_trait]
impl TestCase for CommitRollback {
    async fn initialize(&mut self, ctx: &TestContext) -> Result<(), TestError> {
        ensure(self.obstructed < self.destinations, || {
            format!("obstructed index {} out of {}", self.obstructed, self.destinations)
        })?;
        let fixture = setup(RecoveryFixture::new(&ctx.work_dir))?;
        self.source = fixture.root.join("source.bin");
        setup(write_random(&self.source, 128 * 1024, 7))?;

        self.targets = (0..self.destinations)
            .map(|i| {
                let dir = fixture.root.join("commit").join(format!("dest-{}", i + 1));
                std::fs::create_dir_all(&dir).map(|_| dir.join("payload.bin"))
            })
            .collect::<std::io::Result<_>>()
            .map_err(|e| TestError::Setup(e.to_string()))?;

        // A non-empty directory where a file should land cannot be renamed over
        let obstacle = &self.targets[self.obstructed];
        setup(std::fs::create_dir_all(obstacle))?;
        setup(std::fs::write(obstacle.join("keep"), b"obstacle"))?;

        self.fixture = Some(fixture);
        Ok(())
    }

    async fn run(&mut self, _ctx: &TestContext) -> Result<TestOutcome, TestError> {
        initialized(&self.fixture)?;
        let source = self.source.clone();
        let targets = self.targets.clone();
        let result = tokio::task::spawn_blocking(move || AtomicCopier::new().copy(&source, &targets))
            .await
            .map_err(|e| TestError::Panicked(e.to_string()))?;

        ensure(!result.success, || "copy committed over an obstacle".to_string())?;
        ensure(result.rolled_back, || "failed commit did not roll back".to_string())?;
        let failed = &result.destination_results[self.obstructed];
        ensure(failed.failed_phase == Some(CopyPhase::Commit), || {
            format!("obstructed destination failed in {:?}", failed.failed_phase)
        })?;

        let renamed = result
            .destination_results
            .iter()
            .filter(|d| d.committed)
            .count();
        ensure(renamed == self.obstructed, || {
            format!("{} destinations renamed before the failure, expected {}", renamed, self.obstructed)
        })?;

        let present = RaceFixture::census(&self.targets);
        ensure(present == 0 && result.is_atomic, || {
            format!("{} destinations survived rollback", present)
        })?;
        let temps = RaceFixture::temp_files(&self.targets);
        ensure(temps.is_empty(), || format!("temp files left behind: {:?}", temps))?;

        let obstacle = &self.targets[self.obstructed];
        ensure(obstacle.join("keep").is_file(), || {
            "rollback removed the obstacle's contents".to_string()
        })?;

        Ok(TestOutcome::new(
            format!("rolled back {} renamed destinations", renamed),
            json!({
                "destinations": self.destinations,
                "renamedBeforeFailure": renamed,
                "error": result.error,
            }),
        ))
    }
}

#[cfg(test)]
#[path = "recovery_tests.rs"]
mod tests;
