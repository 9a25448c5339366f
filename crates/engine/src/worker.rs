// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker commands and their execution
//!
//! A worker performs one contention step against shared files and reports
//! back with a single [`WorkerReport`]. The same code runs inside a child
//! process (`ct worker '<json>'`) or on a harness thread.

use crate::error::WorkerError;
use ct_core::coordination::{
    FileBackedStore, FileLock, LockConfig, ProcessBarrier, SharedStateStore,
};
use ct_core::copy::{destination_census, AtomicCopier};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

pub const EXIT_OK: i32 = 0;
pub const EXIT_FAILED: i32 = 1;
pub const EXIT_BARRIER_TIMEOUT: i32 = 3;

/// Lock budget for workers, which contend much harder than ordinary callers
pub fn worker_lock_config() -> LockConfig {
    LockConfig::new(2_000, Duration::from_millis(2))
        .with_max_backoff(Duration::from_millis(50))
        .with_timeout(Duration::from_secs(60))
}

/// Where and how to rendezvous before acting
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BarrierSpec {
    pub barrier_dir: PathBuf,
    pub barrier_id: String,
    pub process_count: usize,
    pub timeout_seconds: f64,
    pub process_id: String,
}

impl BarrierSpec {
    fn barrier(&self) -> ProcessBarrier {
        ProcessBarrier::new(
            &self.barrier_dir,
            &self.barrier_id,
            self.process_count,
            Duration::from_secs_f64(self.timeout_seconds.max(0.0)),
        )
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum WorkerCommand {
    /// Wait at a barrier and report whether it released in time
    Barrier(BarrierSpec),
    /// Increment an integer key `times` times via read-modify-write
    Increment {
        store_path: PathBuf,
        key: String,
        times: u32,
    },
    /// Optionally rendezvous, then compare-and-swap once
    CompareAndSwap {
        store_path: PathBuf,
        key: String,
        expected: Value,
        new: Value,
        #[serde(default)]
        barrier: Option<BarrierSpec>,
    },
    /// Repeatedly take a lock, checking nobody else is inside
    LockContend {
        lock_path: PathBuf,
        acquisitions: u32,
        hold_ms: u64,
    },
    /// Take a lock and sit on it; a stop request abandons it like a crash would
    HoldLock { lock_path: PathBuf, hold_ms: u64 },
    /// Run the atomic multi-destination copy
    Copy {
        source: PathBuf,
        destinations: Vec<PathBuf>,
    },
    /// Poll the destination census and report every distinct count seen
    Observe {
        destinations: Vec<PathBuf>,
        duration_ms: u64,
        poll_ms: u64,
        #[serde(default)]
        stop_when_complete: bool,
    },
    /// Keep a file open while writing it slowly
    SlowWrite {
        path: PathBuf,
        chunks: u32,
        chunk_size: usize,
        chunk_delay_ms: u64,
    },
}

impl WorkerCommand {
    pub fn kind(&self) -> &'static str {
        match self {
            WorkerCommand::Barrier(_) => "barrier",
            WorkerCommand::Increment { .. } => "increment",
            WorkerCommand::CompareAndSwap { .. } => "compareAndSwap",
            WorkerCommand::LockContend { .. } => "lockContend",
            WorkerCommand::HoldLock { .. } => "holdLock",
            WorkerCommand::Copy { .. } => "copy",
            WorkerCommand::Observe { .. } => "observe",
            WorkerCommand::SlowWrite { .. } => "slowWrite",
        }
    }
}

/// The one line a worker prints on stdout
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WorkerReport {
    pub ok: bool,
    pub message: String,
    #[serde(default)]
    pub data: Value,
}

impl WorkerReport {
    pub fn ok(message: impl Into<String>, data: Value) -> Self {
        Self {
            ok: true,
            message: message.into(),
            data,
        }
    }

    pub fn failed(message: impl Into<String>, data: Value) -> Self {
        Self {
            ok: false,
            message: message.into(),
            data,
        }
    }

    fn exit_code(&self) -> i32 {
        if self.ok {
            EXIT_OK
        } else {
            EXIT_FAILED
        }
    }
}

/// What the supervisor learned from a finished worker
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerOutput {
    /// None when the worker was killed by a signal
    pub exit_code: Option<i32>,
    pub report: Option<WorkerReport>,
}

impl WorkerOutput {
    pub fn succeeded(&self) -> bool {
        self.exit_code == Some(EXIT_OK) && self.report.as_ref().is_some_and(|r| r.ok)
    }

    pub fn barrier_timed_out(&self) -> bool {
        self.exit_code == Some(EXIT_BARRIER_TIMEOUT)
    }

    pub fn data(&self) -> &Value {
        self.report.as_ref().map(|r| &r.data).unwrap_or(&Value::Null)
    }

    pub fn message(&self) -> &str {
        self.report.as_ref().map(|r| r.message.as_str()).unwrap_or("")
    }
}

/// Raised by a supervisor to ask a worker to stop early
#[derive(Clone, Debug, Default)]
pub struct StopFlag(Arc<AtomicBool>);

impl StopFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raise(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Sleep up to `duration`, waking early if raised; returns true if raised
    fn sleep(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        loop {
            if self.is_raised() {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            std::thread::sleep((deadline - now).min(Duration::from_millis(10)));
        }
    }
}

/// Run `command` to completion; errors become a failed report
pub fn execute(command: &WorkerCommand, stop: &StopFlag) -> WorkerOutput {
    let outcome = match command {
        WorkerCommand::Barrier(spec) => run_barrier(spec),
        WorkerCommand::Increment {
            store_path,
            key,
            times,
        } => run_increment(store_path, key, *times, stop),
        WorkerCommand::CompareAndSwap {
            store_path,
            key,
            expected,
            new,
            barrier,
        } => run_compare_and_swap(store_path, key, expected, new, barrier.as_ref()),
        WorkerCommand::LockContend {
            lock_path,
            acquisitions,
            hold_ms,
        } => run_lock_contend(lock_path, *acquisitions, *hold_ms, stop),
        WorkerCommand::HoldLock { lock_path, hold_ms } => run_hold_lock(lock_path, *hold_ms, stop),
        WorkerCommand::Copy {
            source,
            destinations,
        } => run_copy(source, destinations),
        WorkerCommand::Observe {
            destinations,
            duration_ms,
            poll_ms,
            stop_when_complete,
        } => run_observe(destinations, *duration_ms, *poll_ms, *stop_when_complete, stop),
        WorkerCommand::SlowWrite {
            path,
            chunks,
            chunk_size,
            chunk_delay_ms,
        } => run_slow_write(path, *chunks, *chunk_size, *chunk_delay_ms, stop),
    };

    match outcome {
        Ok((exit_code, report)) => {
            tracing::debug!(kind = command.kind(), exit_code, ok = report.ok, "worker finished");
            WorkerOutput {
                exit_code: Some(exit_code),
                report: Some(report),
            }
        }
        Err(e) => {
            tracing::warn!(kind = command.kind(), error = %e, "worker failed");
            WorkerOutput {
                exit_code: Some(EXIT_FAILED),
                report: Some(WorkerReport::failed(e.to_string(), Value::Null)),
            }
        }
    }
}

type Outcome = Result<(i32, WorkerReport), WorkerError>;

fn finished(report: WorkerReport) -> Outcome {
    Ok((report.exit_code(), report))
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> WorkerError + '_ {
    move |source| WorkerError::Io {
        path: path.to_path_buf(),
        source,
    }
}

fn run_barrier(spec: &BarrierSpec) -> Outcome {
    let started = Instant::now();
    let released = spec.barrier().wait(&spec.process_id)?;
    let data = json!({
        "processId": spec.process_id,
        "released": released,
        "waitedMs": started.elapsed().as_millis() as u64,
        "at": chrono::Utc::now(),
    });
    if released {
        finished(WorkerReport::ok("released", data))
    } else {
        Ok((
            EXIT_BARRIER_TIMEOUT,
            WorkerReport::failed("barrier timed out", data),
        ))
    }
}

fn run_increment(store_path: &Path, key: &str, times: u32, stop: &StopFlag) -> Outcome {
    let store = FileBackedStore::open_with(store_path, worker_lock_config())?;
    let mut done = 0u32;
    let mut last = Value::Null;
    for _ in 0..times {
        if stop.is_raised() {
            return Err(WorkerError::Stopped);
        }
        last = store.update(key, &mut |old| {
            json!(old.and_then(|v| v.as_i64()).unwrap_or(0) + 1)
        })?;
        done += 1;
    }
    finished(WorkerReport::ok(
        format!("{} increments", done),
        json!({ "increments": done, "last": last }),
    ))
}

fn run_compare_and_swap(
    store_path: &Path,
    key: &str,
    expected: &Value,
    new: &Value,
    barrier: Option<&BarrierSpec>,
) -> Outcome {
    let store = FileBackedStore::open_with(store_path, worker_lock_config())?;
    if let Some(spec) = barrier {
        if !spec.barrier().wait(&spec.process_id)? {
            return Ok((
                EXIT_BARRIER_TIMEOUT,
                WorkerReport::failed("barrier timed out before swap", Value::Null),
            ));
        }
    }
    let swapped = store.compare_and_swap(key, expected, new.clone())?;
    finished(WorkerReport::ok(
        if swapped { "swapped" } else { "lost race" },
        json!({ "swapped": swapped }),
    ))
}

fn run_lock_contend(lock_path: &Path, acquisitions: u32, hold_ms: u64, stop: &StopFlag) -> Outcome {
    // Presence of the marker means someone is inside the critical section
    let mut marker = lock_path.as_os_str().to_os_string();
    marker.push(".inside");
    let marker = PathBuf::from(marker);

    let config = worker_lock_config();
    let mut acquired = 0u32;
    let mut violations = 0u32;
    let mut waits_ms = Vec::with_capacity(acquisitions as usize);

    for _ in 0..acquisitions {
        if stop.is_raised() {
            return Err(WorkerError::Stopped);
        }
        let asked = Instant::now();
        let handle = FileLock::acquire(lock_path, &config)?;
        waits_ms.push(asked.elapsed().as_millis() as u64);

        match OpenOptions::new().write(true).create_new(true).open(&marker) {
            Ok(_) => {
                stop.sleep(Duration::from_millis(hold_ms));
                let _ = std::fs::remove_file(&marker);
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => violations += 1,
            Err(source) => {
                return Err(WorkerError::Io {
                    path: marker,
                    source,
                })
            }
        }
        handle.release();
        acquired += 1;
    }

    let max_wait = waits_ms.iter().copied().max().unwrap_or(0);
    let total_wait: u64 = waits_ms.iter().sum();
    let data = json!({
        "acquired": acquired,
        "violations": violations,
        "maxWaitMs": max_wait,
        "totalWaitMs": total_wait,
    });
    if violations > 0 {
        finished(WorkerReport::failed(
            format!("{} exclusion violations", violations),
            data,
        ))
    } else {
        finished(WorkerReport::ok(format!("{} acquisitions", acquired), data))
    }
}

fn run_hold_lock(lock_path: &Path, hold_ms: u64, stop: &StopFlag) -> Outcome {
    let handle = FileLock::acquire(lock_path, &worker_lock_config())?;
    tracing::info!(path = %lock_path.display(), hold_ms, "holding lock");
    if stop.sleep(Duration::from_millis(hold_ms)) {
        handle.abandon();
        return finished(WorkerReport::failed(
            "stopped while holding lock",
            json!({ "abandoned": true }),
        ));
    }
    handle.release();
    finished(WorkerReport::ok("held and released", json!({ "abandoned": false })))
}

fn run_copy(source: &Path, destinations: &[PathBuf]) -> Outcome {
    let result = AtomicCopier::new().copy(source, destinations);
    let message = match &result.error {
        Some(e) => e.clone(),
        None => "committed".to_string(),
    };
    let ok = result.success;
    let data = serde_json::to_value(&result)?;
    finished(if ok {
        WorkerReport::ok(message, data)
    } else {
        WorkerReport::failed(message, data)
    })
}

fn run_observe(
    destinations: &[PathBuf],
    duration_ms: u64,
    poll_ms: u64,
    stop_when_complete: bool,
    stop: &StopFlag,
) -> Outcome {
    let deadline = Instant::now() + Duration::from_millis(duration_ms);
    let poll = Duration::from_millis(poll_ms.max(1));
    let total = destinations.len();
    let mut counts: Vec<usize> = Vec::new();
    let mut samples = 0u64;

    loop {
        let present = destination_census(destinations);
        samples += 1;
        if counts.last() != Some(&present) {
            counts.push(present);
        }
        if stop_when_complete && present == total && total > 0 {
            break;
        }
        if Instant::now() >= deadline || stop.sleep(poll) {
            break;
        }
    }

    finished(WorkerReport::ok(
        format!("{} samples", samples),
        json!({ "counts": counts, "samples": samples, "total": total }),
    ))
}

fn run_slow_write(
    path: &Path,
    chunks: u32,
    chunk_size: usize,
    chunk_delay_ms: u64,
    stop: &StopFlag,
) -> Outcome {
    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)
        .map_err(io_err(path))?;
    let chunk = vec![0x5au8; chunk_size];
    let mut written = 0u64;

    for _ in 0..chunks {
        file.write_all(&chunk).map_err(io_err(path))?;
        file.flush().map_err(io_err(path))?;
        written += chunk_size as u64;
        if stop.sleep(Duration::from_millis(chunk_delay_ms)) {
            break;
        }
    }
    drop(file);

    finished(WorkerReport::ok(
        format!("wrote {} bytes", written),
        json!({ "bytesWritten": written, "existsAfterClose": path.exists() }),
    ))
}

#[cfg(test)]
#[path = "worker_tests.rs"]
mod tests;
