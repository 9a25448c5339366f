// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! N-party rendezvous for independent processes
//!
//! Participants register in a JSON status file under a [`FileLock`]. The
//! registration that brings the count to the threshold flips the barrier to
//! released and freezes the released set; everybody else polls until they
//! see themselves in that set or their timeout elapses.

use super::lock::{lock_path_for, FileLock, LockConfig, LockError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use thiserror::Error;

/// Interval between registration polls
pub const BARRIER_POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, Error)]
pub enum BarrierError {
    #[error("io error on barrier {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("corrupt barrier status {path}: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Persisted barrier state shared by all participants
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BarrierStatus {
    pub barrier_id: String,
    pub process_count: usize,
    pub waiting_processes: BTreeSet<String>,
    pub released_processes: BTreeSet<String>,
    pub is_released: bool,
}

impl BarrierStatus {
    pub fn new(barrier_id: impl Into<String>, process_count: usize) -> Self {
        Self {
            barrier_id: barrier_id.into(),
            process_count,
            waiting_processes: BTreeSet::new(),
            released_processes: BTreeSet::new(),
            is_released: false,
        }
    }

    /// Record `process_id` as arrived; returns true if this call released the barrier
    pub fn register(&mut self, process_id: &str) -> bool {
        self.waiting_processes.insert(process_id.to_string());
        if !self.is_released && self.waiting_processes.len() >= self.process_count {
            self.is_released = true;
            self.released_processes = self.waiting_processes.clone();
            return true;
        }
        false
    }

    /// Whether `process_id` was part of the release
    pub fn releases(&self, process_id: &str) -> bool {
        self.is_released && self.released_processes.contains(process_id)
    }

    /// Registrants that arrived after the release
    pub fn late_registrants(&self) -> Vec<&str> {
        if !self.is_released {
            return Vec::new();
        }
        self.waiting_processes
            .difference(&self.released_processes)
            .map(String::as_str)
            .collect()
    }
}

/// A barrier backed by a status file under `dir`
#[derive(Clone, Debug)]
pub struct ProcessBarrier {
    barrier_id: String,
    process_count: usize,
    timeout: Duration,
    status_path: PathBuf,
    lock_path: PathBuf,
    lock_config: LockConfig,
    poll_interval: Duration,
}

impl ProcessBarrier {
    pub fn new(
        dir: &Path,
        barrier_id: impl Into<String>,
        process_count: usize,
        timeout: Duration,
    ) -> Self {
        let barrier_id = barrier_id.into();
        let status_path = dir.join(format!("{}.barrier.json", barrier_id));
        Self {
            lock_path: lock_path_for(&status_path),
            status_path,
            barrier_id,
            process_count,
            timeout,
            lock_config: LockConfig::default(),
            poll_interval: BARRIER_POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_lock_config(mut self, config: LockConfig) -> Self {
        self.lock_config = config;
        self
    }

    pub fn id(&self) -> &str {
        &self.barrier_id
    }

    pub fn status_path(&self) -> &Path {
        &self.status_path
    }

    /// Block until released (true) or timed out (false)
    pub fn wait(&self, process_id: &str) -> Result<bool, BarrierError> {
        let deadline = Instant::now() + self.timeout;
        tracing::debug!(barrier = %self.barrier_id, process_id, "waiting at barrier");

        loop {
            match self.register(process_id, deadline) {
                Ok(Some(status)) if status.releases(process_id) => {
                    tracing::debug!(barrier = %self.barrier_id, process_id, "released");
                    return Ok(true);
                }
                Ok(_) => {}
                Err(e) => return Err(e),
            }

            let now = Instant::now();
            if now >= deadline {
                tracing::warn!(
                    barrier = %self.barrier_id,
                    process_id,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "barrier timed out"
                );
                return Ok(false);
            }
            std::thread::sleep(self.poll_interval.min(deadline - now));
        }
    }

    /// One locked registration round. `Ok(None)` means the lock was busy.
    fn register(
        &self,
        process_id: &str,
        deadline: Instant,
    ) -> Result<Option<BarrierStatus>, BarrierError> {
        let remaining = deadline.saturating_duration_since(Instant::now());
        let config = self.lock_config.clone().with_timeout(remaining);
        let handle = match FileLock::acquire(&self.lock_path, &config) {
            Ok(handle) => handle,
            Err(LockError::Unavailable { .. }) => return Ok(None),
            Err(LockError::Io { path, source }) => return Err(BarrierError::Io { path, source }),
        };

        let mut status = self.load()?;
        let before = status.clone();
        if status.register(process_id) {
            tracing::info!(
                barrier = %self.barrier_id,
                process_id,
                count = status.process_count,
                "barrier released"
            );
        }
        if status != before || !self.status_path.exists() {
            self.persist(&status)?;
        }
        handle.release();
        Ok(Some(status))
    }

    /// Current persisted status (unlocked read)
    pub fn status(&self) -> Result<BarrierStatus, BarrierError> {
        self.load()
    }

    fn load(&self) -> Result<BarrierStatus, BarrierError> {
        match fs::read(&self.status_path) {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|source| BarrierError::Corrupt {
                path: self.status_path.clone(),
                source,
            }),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Ok(BarrierStatus::new(&self.barrier_id, self.process_count))
            }
            Err(source) => Err(BarrierError::Io {
                path: self.status_path.clone(),
                source,
            }),
        }
    }

    fn persist(&self, status: &BarrierStatus) -> Result<(), BarrierError> {
        let json = serde_json::to_vec_pretty(status).map_err(|source| BarrierError::Corrupt {
            path: self.status_path.clone(),
            source,
        })?;
        let mut staging = self.status_path.as_os_str().to_os_string();
        staging.push(format!(".{}.staging", std::process::id()));
        let staging = PathBuf::from(staging);
        let io_err = |source: io::Error| BarrierError::Io {
            path: self.status_path.clone(),
            source,
        };
        fs::write(&staging, json).map_err(io_err)?;
        fs::rename(&staging, &self.status_path).map_err(io_err)
    }
}

#[cfg(test)]
#[path = "barrier_tests.rs"]
mod tests;
