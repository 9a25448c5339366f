// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Last-resort cleanup for a run that is going down
//!
//! The orchestrator owns one manager and hands clones to whatever needs to
//! report live resources (isolation roots, worker pids). `run` may be called
//! from a signal handler thread as well as from the orchestrator itself.

use super::cleanup::RELEASE_GRACE;
use crate::clock::{Clock, SystemClock};
use crate::coordination::{sweep_stale_locks, SweepConfig, SweepReport};
use crate::process;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// What an emergency pass did
#[derive(Debug, Default)]
pub struct EmergencyReport {
    pub reason: String,
    pub processes_killed: Vec<u32>,
    pub directories_removed: Vec<PathBuf>,
    pub sweep: Option<SweepReport>,
    pub failures: Vec<String>,
}

#[derive(Default)]
struct Tracked {
    directories: BTreeSet<PathBuf>,
    pids: BTreeSet<u32>,
    runs: usize,
}

#[derive(Clone)]
pub struct EmergencyCleanupManager<C: Clock = SystemClock> {
    tracked: Arc<Mutex<Tracked>>,
    sweep_root: Option<PathBuf>,
    sweep_config: SweepConfig,
    clock: C,
}

impl EmergencyCleanupManager<SystemClock> {
    pub fn new() -> Self {
        Self::with_clock(SystemClock)
    }
}

impl Default for EmergencyCleanupManager<SystemClock> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Clock> EmergencyCleanupManager<C> {
    pub fn with_clock(clock: C) -> Self {
        Self {
            tracked: Arc::new(Mutex::new(Tracked::default())),
            sweep_root: None,
            sweep_config: SweepConfig::default(),
            clock,
        }
    }

    /// Sweep stale lock files under `root` on every run
    pub fn with_sweep_root(mut self, root: impl Into<PathBuf>, config: SweepConfig) -> Self {
        self.sweep_root = Some(root.into());
        self.sweep_config = config;
        self
    }

    fn tracked(&self) -> std::sync::MutexGuard<'_, Tracked> {
        self.tracked.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn track_directory(&self, dir: impl Into<PathBuf>) {
        self.tracked().directories.insert(dir.into());
    }

    pub fn untrack_directory(&self, dir: &Path) {
        self.tracked().directories.remove(dir);
    }

    pub fn track_pid(&self, pid: u32) {
        self.tracked().pids.insert(pid);
    }

    pub fn untrack_pid(&self, pid: u32) {
        self.tracked().pids.remove(&pid);
    }

    pub fn tracked_pids(&self) -> Vec<u32> {
        self.tracked().pids.iter().copied().collect()
    }

    pub fn tracked_directories(&self) -> Vec<PathBuf> {
        self.tracked().directories.iter().cloned().collect()
    }

    /// Number of completed emergency passes
    pub fn runs(&self) -> usize {
        self.tracked().runs
    }

    /// Kill tracked processes, remove tracked directories and sweep stale locks
    pub fn run(&self, reason: &str) -> EmergencyReport {
        let (pids, directories) = {
            let mut tracked = self.tracked();
            (
                std::mem::take(&mut tracked.pids),
                std::mem::take(&mut tracked.directories),
            )
        };
        tracing::warn!(
            reason,
            processes = pids.len(),
            directories = directories.len(),
            "emergency cleanup"
        );

        let mut report = EmergencyReport {
            reason: reason.to_string(),
            ..Default::default()
        };

        for pid in pids {
            match process::terminate(pid, RELEASE_GRACE) {
                Ok(true) => report.processes_killed.push(pid),
                Ok(false) => {}
                Err(e) => report.failures.push(format!("pid {}: {}", pid, e)),
            }
        }

        for dir in directories {
            match std::fs::remove_dir_all(&dir) {
                Ok(()) => report.directories_removed.push(dir),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => report.failures.push(format!("{}: {}", dir.display(), e)),
            }
        }

        if let Some(root) = &self.sweep_root {
            let sweep = sweep_stale_locks(root, &self.sweep_config, &self.clock);
            report
                .failures
                .extend(sweep.failed.iter().map(|(p, e)| format!("{}: {}", p.display(), e)));
            report.sweep = Some(sweep);
        }

        for failure in &report.failures {
            tracing::warn!(reason, failure = %failure, "emergency cleanup step failed");
        }
        self.tracked().runs += 1;
        report
    }
}

#[cfg(test)]
#[path = "emergency_tests.rs"]
mod tests;
