// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Lock, store and barrier contention

use super::{all_succeeded, initialized, setup, TestCase, TestContext, TestOutcome};
use crate::error::{ensure, TestError};
use crate::fixtures::FileLockingFixture;
use crate::worker::WorkerCommand;
use async_trait::async_trait;
use ct_core::coordination::{ProcessBarrier, SharedStateStore, BARRIER_POLL_INTERVAL};
use serde_json::json;
use std::time::{Duration, Instant};

const COUNTER: &str = "counter";
const BARRIER_TIMEOUT: Duration = Duration::from_secs(30);

/// Concurrent read-modify-write through the store never loses an update
pub struct LockExclusion {
    workers: usize,
    increments: u32,
    fixture: Option<FileLockingFixture>,
}

impl LockExclusion {
    pub fn new(workers: usize, increments: u32) -> Self {
        Self {
            workers,
            increments,
            fixture: None,
        }
    }
}

impl Default for LockExclusion {
    fn default() -> Self {
        Self::new(4, 25)
    }
}

#[async_trait]
impl TestCase for LockExclusion {
    async fn initialize(&mut self, ctx: &TestContext) -> Result<(), TestError> {
        let fixture = setup(FileLockingFixture::new(&ctx.work_dir))?;
        fixture.store()?.set(COUNTER, json!(0))?;
        self.fixture = Some(fixture);
        Ok(())
    }

    async fn run(&mut self, ctx: &TestContext) -> Result<TestOutcome, TestError> {
        let fixture = initialized(&self.fixture)?;
        let commands: Vec<_> = (0..self.workers)
            .map(|_| WorkerCommand::Increment {
                store_path: fixture.store_path.clone(),
                key: COUNTER.to_string(),
                times: self.increments,
            })
            .collect();
        let outputs = ctx.launcher.run_all(&commands).await?;
        all_succeeded(&outputs)?;

        let expected = self.workers as i64 * i64::from(self.increments);
        let actual = fixture.store()?.get(COUNTER)?.and_then(|v| v.as_i64());
        ensure(actual == Some(expected), || {
            format!("lost updates: counter is {:?}, expected {}", actual, expected)
        })?;

        Ok(TestOutcome::new(
            format!("{} workers x {} increments = {}", self.workers, self.increments, expected),
            json!({ "workers": self.workers, "increments": self.increments, "final": expected }),
        ))
    }
}

/// Simultaneous compare-and-swap on one key has exactly one winner
pub struct CasRace {
    contenders: usize,
    fixture: Option<FileLockingFixture>,
}

impl CasRace {
    pub fn new(contenders: usize) -> Self {
        Self {
            contenders,
            fixture: None,
        }
    }
}

impl Default for CasRace {
    fn default() -> Self {
        Self::new(3)
    }
}

#[async_trait]
impl TestCase for CasRace {
    async fn initialize(&mut self, ctx: &TestContext) -> Result<(), TestError> {
        let fixture = setup(FileLockingFixture::new(&ctx.work_dir))?;
        fixture.store()?.set(COUNTER, json!(0))?;
        self.fixture = Some(fixture);
        Ok(())
    }

    async fn run(&mut self, ctx: &TestContext) -> Result<TestOutcome, TestError> {
        let fixture = initialized(&self.fixture)?;
        let commands: Vec<_> = (0..self.contenders)
            .map(|i| WorkerCommand::CompareAndSwap {
                store_path: fixture.store_path.clone(),
                key: COUNTER.to_string(),
                expected: json!(0),
                new: json!(1),
                barrier: Some(fixture.barrier(
                    "cas-start",
                    self.contenders,
                    BARRIER_TIMEOUT,
                    format!("contender-{}", i),
                )),
            })
            .collect();
        let outputs = ctx.launcher.run_all(&commands).await?;
        all_succeeded(&outputs)?;

        let winners = outputs
            .iter()
            .filter(|o| o.data()["swapped"] == json!(true))
            .count();
        ensure(winners == 1, || format!("{} contenders won the swap", winners))?;

        let store = fixture.store()?;
        let value = store.get(COUNTER)?;
        ensure(value == Some(json!(1)), || format!("counter is {:?} after race", value))?;

        // Comparison is by string form, so "1" matches the number 1
        let string_form_matches = store.compare_and_swap(COUNTER, &json!("1"), json!(1))?;

        Ok(TestOutcome::new(
            format!("1 of {} contenders swapped", self.contenders),
            json!({
                "contenders": self.contenders,
                "winners": winners,
                "stringFormMatches": string_form_matches,
            }),
        ))
    }
}

/// All parties are released together; a latecomer times out
pub struct BarrierRendezvous {
    parties: usize,
    late_timeout: Duration,
    fixture: Option<FileLockingFixture>,
}

impl BarrierRendezvous {
    pub fn new(parties: usize) -> Self {
        Self {
            parties,
            late_timeout: Duration::from_millis(500),
            fixture: None,
        }
    }
}

impl Default for BarrierRendezvous {
    fn default() -> Self {
        Self::new(3)
    }
}

/// Lock and scheduling slack on top of one barrier poll interval
const RELEASE_ALLOWANCE: Duration = Duration::from_millis(100);

/// Largest tolerated gap between the first and last release: every waiter
/// must notice the release on its next poll
fn release_spread_limit() -> Duration {
    BARRIER_POLL_INTERVAL + RELEASE_ALLOWANCE
}

#[async_trait]
impl TestCase for BarrierRendezvous {
    async fn initialize(&mut self, ctx: &TestContext) -> Result<(), TestError> {
        self.fixture = Some(setup(FileLockingFixture::new(&ctx.work_dir))?);
        Ok(())
    }

    async fn run(&mut self, ctx: &TestContext) -> Result<TestOutcome, TestError> {
        let fixture = initialized(&self.fixture)?;
        let barrier_id = "rendezvous";
        let barrier = ProcessBarrier::new(
            &fixture.barrier_dir,
            barrier_id,
            self.parties,
            BARRIER_TIMEOUT,
        );
        let command = |i: usize| {
            WorkerCommand::Barrier(fixture.barrier(
                barrier_id,
                self.parties,
                BARRIER_TIMEOUT,
                format!("party-{}", i),
            ))
        };

        // Everyone but the last party registers and blocks
        let early = self.parties.saturating_sub(1);
        let mut handles = Vec::with_capacity(self.parties);
        for i in 0..early {
            handles.push(ctx.launcher.spawn(&command(i))?);
        }
        let deadline = Instant::now() + Duration::from_secs(15);
        loop {
            let status = barrier.status()?;
            ensure(!status.is_released, || {
                "barrier released before quorum".to_string()
            })?;
            if status.waiting_processes.len() >= early {
                break;
            }
            ensure(Instant::now() < deadline, || {
                format!(
                    "only {} of {} early parties registered",
                    status.waiting_processes.len(),
                    early
                )
            })?;
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        handles.push(ctx.launcher.spawn(&command(early))?);
        let mut outputs = Vec::with_capacity(handles.len());
        for handle in handles {
            outputs.push(handle.wait().await?);
        }
        all_succeeded(&outputs)?;

        let released_at: Vec<chrono::DateTime<chrono::Utc>> = outputs
            .iter()
            .filter_map(|o| serde_json::from_value(o.data()["at"].clone()).ok())
            .collect();
        let spread_ms = match (released_at.iter().min(), released_at.iter().max()) {
            (Some(first), Some(last)) => (*last - *first).num_milliseconds(),
            _ => 0,
        };
        let limit_ms = release_spread_limit().as_millis() as i64;
        ensure(spread_ms <= limit_ms, || {
            format!("parties released {}ms apart, limit {}ms", spread_ms, limit_ms)
        })?;

        let late = ctx
            .launcher
            .run(&WorkerCommand::Barrier(fixture.barrier(
                barrier_id,
                self.parties,
                self.late_timeout,
                "late",
            )))
            .await?;
        ensure(late.barrier_timed_out(), || {
            format!("late registrant was not timed out: exit {:?}", late.exit_code)
        })?;

        let status = barrier.status()?;
        ensure(status.released_processes.len() == self.parties, || {
            format!("{} processes released", status.released_processes.len())
        })?;
        ensure(status.late_registrants() == vec!["late"], || {
            format!("late registrants: {:?}", status.late_registrants())
        })?;

        Ok(TestOutcome::new(
            format!("{} parties released within {}ms", self.parties, spread_ms),
            json!({ "parties": self.parties, "releaseSpreadMs": spread_ms }),
        ))
    }
}

/// Heavy lock contention completes with exclusion intact; starvation is measured
pub struct LockFairness {
    workers: usize,
    acquisitions: u32,
    hold_ms: u64,
    fixture: Option<FileLockingFixture>,
}

impl LockFairness {
    pub fn new(workers: usize, acquisitions: u32, hold_ms: u64) -> Self {
        Self {
            workers,
            acquisitions,
            hold_ms,
            fixture: None,
        }
    }
}

impl Default for LockFairness {
    fn default() -> Self {
        Self::new(4, 10, 2)
    }
}

#[async_trait]
impl TestCase for LockFairness {
    async fn initialize(&mut self, ctx: &TestContext) -> Result<(), TestError> {
        self.fixture = Some(setup(FileLockingFixture::new(&ctx.work_dir))?);
        Ok(())
    }

    async fn run(&mut self, ctx: &TestContext) -> Result<TestOutcome, TestError> {
        let fixture = initialized(&self.fixture)?;
        let commands: Vec<_> = (0..self.workers)
            .map(|_| WorkerCommand::LockContend {
                lock_path: fixture.lock_path.clone(),
                acquisitions: self.acquisitions,
                hold_ms: self.hold_ms,
            })
            .collect();
        let outputs = ctx.launcher.run_all(&commands).await?;
        all_succeeded(&outputs)?;

        let waits: Vec<u64> = outputs
            .iter()
            .map(|o| o.data()["maxWaitMs"].as_u64().unwrap_or(0))
            .collect();
        let worst = waits.iter().copied().max().unwrap_or(0);
        let best = waits.iter().copied().min().unwrap_or(0);
        ensure(!fixture.lock_path.exists(), || {
            "lock file left behind after contention".to_string()
        })?;
        if worst > 0 && best.saturating_mul(10) < worst {
            tracing::info!(test_id = %ctx.test_id, best, worst, "uneven lock wait times");
        }

        Ok(TestOutcome::new(
            format!(
                "{} workers x {} acquisitions, worst wait {}ms",
                self.workers, self.acquisitions, worst
            ),
            json!({
                "workers": self.workers,
                "acquisitions": self.acquisitions,
                "maxWaitMs": waits,
                "totalWaitMs": outputs.iter().map(|o| o.data()["totalWaitMs"].clone()).collect::<Vec<_>>(),
            }),
        ))
    }
}

#[cfg(test)]
#[path = "file_locking_tests.rs"]
mod tests;
