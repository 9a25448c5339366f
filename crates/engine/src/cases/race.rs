// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Atomic multi-destination copy under interference

use super::{all_succeeded, initialized, setup, TestCase, TestContext, TestOutcome};
use crate::error::{ensure, TestError};
use crate::fixtures::{write_random, RaceFixture};
use crate::worker::{WorkerCommand, WorkerOutput};
use async_trait::async_trait;
use ct_core::copy::{census_is_atomic, file_checksum, temp_path_for, CopyOperationResult, CopyPhase};
use ct_core::platform::DeleteOutcome;
use fs2::FileExt;
use serde_json::json;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

const MIB: usize = 1024 * 1024;

/// The copy result a copy worker reported
fn copy_result(output: &WorkerOutput) -> Result<CopyOperationResult, TestError> {
    serde_json::from_value(output.data().clone()).map_err(|e| {
        TestError::Assertion(format!(
            "copy worker sent no result ({}): {}",
            e,
            output.message()
        ))
    })
}

/// Fail with a partial commit unless none or all destinations are on disk
fn check_census(destinations: &[PathBuf]) -> Result<usize, TestError> {
    let present = RaceFixture::census(destinations);
    if census_is_atomic(present, destinations.len()) {
        Ok(present)
    } else {
        Err(TestError::PartialCommit {
            present,
            total: destinations.len(),
        })
    }
}

fn check_no_temps(destinations: &[PathBuf]) -> Result<(), TestError> {
    let temps = RaceFixture::temp_files(destinations);
    ensure(temps.is_empty(), || format!("temp files left behind: {:?}", temps))
}

/// A copy with nothing in its way lands everywhere, byte for byte
pub struct CleanCopy {
    size: usize,
    destinations: usize,
    fixture: Option<RaceFixture>,
    checksum: u32,
}

impl CleanCopy {
    pub fn new(size: usize, destinations: usize) -> Self {
        Self {
            size,
            destinations,
            fixture: None,
            checksum: 0,
        }
    }
}

impl Default for CleanCopy {
    fn default() -> Self {
        Self::new(2 * MIB, 5)
    }
}

#[async_trait]
impl TestCase for CleanCopy {
    async fn initialize(&mut self, ctx: &TestContext) -> Result<(), TestError> {
        let fixture = setup(RaceFixture::new(&ctx.work_dir))?;
        self.checksum = setup(fixture.write_source(self.size, 1))?;
        self.fixture = Some(fixture);
        Ok(())
    }

    async fn run(&mut self, ctx: &TestContext) -> Result<TestOutcome, TestError> {
        let fixture = initialized(&self.fixture)?;
        let destinations = setup(fixture.destinations("clean", self.destinations))?;
        let output = ctx
            .launcher
            .run(&WorkerCommand::Copy {
                source: fixture.source.clone(),
                destinations: destinations.clone(),
            })
            .await?;
        let result = copy_result(&output)?;
        ensure(result.success, || {
            format!("clean copy failed: {:?}", result.error)
        })?;

        let present = check_census(&destinations)?;
        ensure(present == destinations.len(), || {
            format!("{} of {} destinations present", present, destinations.len())
        })?;
        let mismatched = RaceFixture::mismatched(&destinations, self.checksum);
        ensure(mismatched.is_empty(), || {
            format!("destinations differ from source: {:?}", mismatched)
        })?;
        check_no_temps(&destinations)?;

        Ok(TestOutcome::new(
            format!("{} bytes committed to {} destinations", self.size, present),
            json!({
                "bytes": self.size,
                "destinations": present,
                "checksum": self.checksum,
                "durationMs": result.duration_ms,
            }),
        ))
    }
}

/// A foreign temp file at one destination aborts the whole copy
pub struct PreoccupiedTemp {
    destinations: usize,
    blocked: usize,
    fixture: Option<RaceFixture>,
    targets: Vec<PathBuf>,
    held: Option<(File, PathBuf)>,
}

impl PreoccupiedTemp {
    /// `blocked` is the zero-based destination whose temp is taken
    pub fn new(destinations: usize, blocked: usize) -> Self {
        Self {
            destinations,
            blocked,
            fixture: None,
            targets: Vec::new(),
            held: None,
        }
    }

    fn release_held(&mut self) -> Result<(), TestError> {
        if let Some((file, path)) = self.held.take() {
            let _ = FileExt::unlock(&file);
            drop(file);
            match std::fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }
}

impl Default for PreoccupiedTemp {
    fn default() -> Self {
        Self::new(5, 2)
    }
}

#[async_trait]
impl TestCase for PreoccupiedTemp {
    async fn initialize(&mut self, ctx: &TestContext) -> Result<(), TestError> {
        ensure(self.blocked < self.destinations, || {
            format!("blocked index {} out of {}", self.blocked, self.destinations)
        })?;
        let fixture = setup(RaceFixture::new(&ctx.work_dir))?;
        setup(fixture.write_source(256 * 1024, 2))?;
        self.targets = setup(fixture.destinations("preoccupied", self.destinations))?;

        let temp = temp_path_for(&self.targets[self.blocked]);
        let file = setup(File::create(&temp))?;
        setup(file.lock_exclusive())?;
        tracing::debug!(path = %temp.display(), "holding foreign temp file");
        self.held = Some((file, temp));
        self.fixture = Some(fixture);
        Ok(())
    }

    async fn run(&mut self, ctx: &TestContext) -> Result<TestOutcome, TestError> {
        let fixture = initialized(&self.fixture)?;
        let output = ctx
            .launcher
            .run(&WorkerCommand::Copy {
                source: fixture.source.clone(),
                destinations: self.targets.clone(),
            })
            .await?;
        let result = copy_result(&output)?;
        ensure(!result.success, || "copy succeeded past a held temp file".to_string())?;
        ensure(result.rolled_back, || "copy did not roll back".to_string())?;

        let blocked = &result.destination_results[self.blocked];
        ensure(blocked.failed_phase == Some(CopyPhase::Prepare), || {
            format!("blocked destination failed in {:?}", blocked.failed_phase)
        })?;

        let present = check_census(&self.targets)?;
        ensure(present == 0, || format!("{} destinations present after abort", present))?;

        // Abort clears every temp path, the held one included
        check_no_temps(&self.targets)?;
        self.release_held()?;

        Ok(TestOutcome::new(
            "copy aborted without touching any destination",
            json!({
                "destinations": self.destinations,
                "blocked": self.blocked,
                "rolledBack": result.rolled_back,
                "error": result.error,
            }),
        ))
    }

    async fn cleanup(&mut self, _ctx: &TestContext) -> Result<(), TestError> {
        self.release_held()
    }
}

/// An observer process never sees a complete set regress to a partial one
pub struct ObservedCopy {
    rounds: usize,
    destinations: usize,
    size: usize,
    fixture: Option<RaceFixture>,
}

impl ObservedCopy {
    pub fn new(rounds: usize, destinations: usize, size: usize) -> Self {
        Self {
            rounds,
            destinations,
            size,
            fixture: None,
        }
    }
}

impl Default for ObservedCopy {
    fn default() -> Self {
        Self::new(3, 5, MIB)
    }
}

/// Distinct counts must rise monotonically and end complete
fn check_observed(counts: &[usize], total: usize) -> Result<(), TestError> {
    if let Some(pair) = counts.windows(2).find(|w| w[1] < w[0]) {
        return Err(TestError::Assertion(format!(
            "observed census regressed from {} to {}",
            pair[0], pair[1]
        )));
    }
    ensure(counts.last() == Some(&total), || {
        format!("observer finished at {:?}, expected {}", counts.last(), total)
    })
}

#[async_trait]
impl TestCase for ObservedCopy {
    async fn initialize(&mut self, ctx: &TestContext) -> Result<(), TestError> {
        let fixture = setup(RaceFixture::new(&ctx.work_dir))?;
        setup(fixture.write_source(self.size, 3))?;
        self.fixture = Some(fixture);
        Ok(())
    }

    async fn run(&mut self, ctx: &TestContext) -> Result<TestOutcome, TestError> {
        let fixture = initialized(&self.fixture)?;
        let mut observed = Vec::with_capacity(self.rounds);
        let mut intermediate = 0usize;

        for round in 0..self.rounds {
            let destinations =
                setup(fixture.destinations(&format!("round-{}", round + 1), self.destinations))?;
            let observer = ctx.launcher.spawn(&WorkerCommand::Observe {
                destinations: destinations.clone(),
                duration_ms: 20_000,
                poll_ms: 1,
                stop_when_complete: true,
            })?;
            tokio::time::sleep(Duration::from_millis(50)).await;

            let copy = ctx
                .launcher
                .run(&WorkerCommand::Copy {
                    source: fixture.source.clone(),
                    destinations: destinations.clone(),
                })
                .await?;
            let observation = observer.wait().await?;
            all_succeeded(&[copy.clone(), observation.clone()])?;

            let result = copy_result(&copy)?;
            ensure(result.success, || {
                format!("round {} copy failed: {:?}", round + 1, result.error)
            })?;
            check_census(&destinations)?;

            let counts: Vec<usize> = serde_json::from_value(observation.data()["counts"].clone())
                .map_err(|e| TestError::Assertion(format!("observer sent no counts: {}", e)))?;
            check_observed(&counts, destinations.len())?;
            intermediate += counts
                .iter()
                .filter(|&&c| c != 0 && c != destinations.len())
                .count();
            observed.push(json!({
                "round": round + 1,
                "counts": counts,
                "samples": observation.data()["samples"],
            }));
        }

        Ok(TestOutcome::new(
            format!("{} observed copies stayed monotone", self.rounds),
            json!({
                "rounds": observed,
                "intermediateCounts": intermediate,
            }),
        ))
    }
}

/// Two copies racing for the same destinations leave one coherent set or none
pub struct CompetingCopies {
    destinations: usize,
    size: usize,
    fixture: Option<RaceFixture>,
    sources: Vec<(PathBuf, u32)>,
}

impl CompetingCopies {
    pub fn new(destinations: usize, size: usize) -> Self {
        Self {
            destinations,
            size,
            fixture: None,
            sources: Vec::new(),
        }
    }
}

impl Default for CompetingCopies {
    fn default() -> Self {
        Self::new(4, MIB)
    }
}

#[async_trait]
impl TestCase for CompetingCopies {
    async fn initialize(&mut self, ctx: &TestContext) -> Result<(), TestError> {
        let fixture = setup(RaceFixture::new(&ctx.work_dir))?;
        self.sources = (0..2u64)
            .map(|i| {
                let path = fixture.root.join(format!("source-{}.bin", i + 1));
                write_random(&path, self.size, 40 + i).map(|crc| (path, crc))
            })
            .collect::<std::io::Result<_>>()
            .map_err(|e| TestError::Setup(e.to_string()))?;
        self.fixture = Some(fixture);
        Ok(())
    }

    async fn run(&mut self, ctx: &TestContext) -> Result<TestOutcome, TestError> {
        let fixture = initialized(&self.fixture)?;
        let destinations = setup(fixture.destinations("shared", self.destinations))?;
        let commands: Vec<_> = self
            .sources
            .iter()
            .map(|(source, _)| WorkerCommand::Copy {
                source: source.clone(),
                destinations: destinations.clone(),
            })
            .collect();
        let outputs = ctx.launcher.run_all(&commands).await?;
        let results = outputs
            .iter()
            .map(copy_result)
            .collect::<Result<Vec<_>, _>>()?;
        let committed = results.iter().filter(|r| r.success).count();

        let present = check_census(&destinations)?;
        check_no_temps(&destinations)?;

        let mut winner = None;
        if present == destinations.len() {
            let sums = destinations
                .iter()
                .map(|d| file_checksum(d))
                .collect::<std::io::Result<Vec<_>>>()?;
            ensure(sums.windows(2).all(|w| w[0] == w[1]), || {
                format!("destinations hold mixed content: {:?}", sums)
            })?;
            winner = self.sources.iter().position(|(_, crc)| Some(crc) == sums.first());
            ensure(winner.is_some(), || {
                "destinations match neither source".to_string()
            })?;
        }

        Ok(TestOutcome::new(
            format!("{} of 2 copies committed, {} destinations present", committed, present),
            json!({
                "committed": committed,
                "present": present,
                "winner": winner.map(|i| i + 1),
            }),
        ))
    }
}

/// Delete a file another worker is still writing
pub struct DeleteDuringWrite {
    chunks: u32,
    chunk_size: usize,
    chunk_delay_ms: u64,
    fixture: Option<RaceFixture>,
}

impl DeleteDuringWrite {
    pub fn new(chunks: u32, chunk_size: usize, chunk_delay_ms: u64) -> Self {
        Self {
            chunks,
            chunk_size,
            chunk_delay_ms,
            fixture: None,
        }
    }
}

impl Default for DeleteDuringWrite {
    fn default() -> Self {
        Self::new(80, 64 * 1024, 25)
    }
}

/// Windows reports ERROR_SHARING_VIOLATION as raw os error 32
fn is_sharing_violation(e: &std::io::Error) -> bool {
    e.kind() == std::io::ErrorKind::PermissionDenied || e.raw_os_error() == Some(32)
}

async fn wait_until_written(path: &Path, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if std::fs::metadata(path).map(|m| m.len() > 0).unwrap_or(false) {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    false
}

#[async_trait]
impl TestCase for DeleteDuringWrite {
    async fn initialize(&mut self, ctx: &TestContext) -> Result<(), TestError> {
        self.fixture = Some(setup(RaceFixture::new(&ctx.work_dir))?);
        Ok(())
    }

    async fn run(&mut self, ctx: &TestContext) -> Result<TestOutcome, TestError> {
        let fixture = initialized(&self.fixture)?;
        let path = fixture.root.join("in-flight.bin");
        let mut writer = ctx.launcher.spawn(&WorkerCommand::SlowWrite {
            path: path.clone(),
            chunks: self.chunks,
            chunk_size: self.chunk_size,
            chunk_delay_ms: self.chunk_delay_ms,
        })?;

        if !wait_until_written(&path, Duration::from_secs(10)).await {
            return Err(TestError::Setup(format!(
                "writer never started writing {}",
                path.display()
            )));
        }
        ensure(!writer.is_finished(), || {
            "writer finished before the delete".to_string()
        })?;

        let mut observed = Vec::new();
        let output = match std::fs::remove_file(&path) {
            Ok(()) if !path.exists() => {
                observed.push(DeleteOutcome::DeletedWhileOpen);
                writer.wait().await?
            }
            Ok(()) => {
                // Delete is pending until the writer closes
                let output = writer.wait().await?;
                observed.push(DeleteOutcome::DeletedAfterClose);
                output
            }
            Err(e) if is_sharing_violation(&e) => {
                observed.push(DeleteOutcome::SharingViolation);
                let output = writer.wait().await?;
                std::fs::remove_file(&path)?;
                observed.push(DeleteOutcome::DeletedAfterClose);
                output
            }
            Err(e) => return Err(e.into()),
        };
        all_succeeded(std::slice::from_ref(&output))?;

        let expected = ctx.platform.delete_while_open_outcomes();
        let unexpected: Vec<_> = observed.iter().filter(|o| !expected.contains(o)).collect();
        ensure(unexpected.is_empty(), || {
            format!(
                "{:?} is not an expected outcome on {} (expected {:?})",
                unexpected, ctx.platform, expected
            )
        })?;
        ensure(!path.exists(), || format!("{} survived the delete", path.display()))?;

        Ok(TestOutcome::new(
            format!("delete during write on {}: {:?}", ctx.platform, observed),
            json!({
                "platform": ctx.platform.to_string(),
                "observed": observed,
                "bytesWritten": output.data()["bytesWritten"],
                "existsAfterClose": output.data()["existsAfterClose"],
            }),
        ))
    }
}

#[cfg(test)]
#[path = "race_tests.rs"]
mod tests;
