// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Advisory file lock built on exclusive file creation
//!
//! A lock is held while its lock file exists. Acquisition retries with
//! exponential backoff plus jitter and is bounded by an attempt budget and an
//! optional deadline, so a caller never waits indefinitely.

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use thiserror::Error;

/// Suffix appended to a guarded file to name its lock file
pub const LOCK_SUFFIX: &str = ".lock";

#[derive(Debug, Error)]
pub enum LockError {
    #[error("lock unavailable after {attempts} attempts: {path}")]
    Unavailable { path: PathBuf, attempts: u32 },
    #[error("io error on lock {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Retry budget for lock acquisition
#[derive(Clone, Debug)]
pub struct LockConfig {
    pub max_attempts: u32,
    pub base_backoff: Duration,
    pub max_backoff: Duration,
    /// Hard deadline across all attempts, honored mid-backoff
    pub timeout: Option<Duration>,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            max_attempts: 20,
            base_backoff: Duration::from_millis(10),
            max_backoff: Duration::from_millis(200),
            timeout: None,
        }
    }
}

impl LockConfig {
    pub fn new(max_attempts: u32, base_backoff: Duration) -> Self {
        Self {
            max_attempts,
            base_backoff,
            ..Self::default()
        }
    }

    pub fn with_max_backoff(mut self, cap: Duration) -> Self {
        self.max_backoff = cap;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Deterministic part of the delay after a failed attempt
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.min(16));
        self.base_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }

    /// Full delay after a failed attempt: backoff plus up to half of it as jitter
    pub fn delay(&self, attempt: u32, rng: &mut impl Rng) -> Duration {
        let backoff = self.backoff(attempt);
        let jitter_ceiling = backoff.as_micros() as u64 / 2;
        let jitter = if jitter_ceiling == 0 {
            0
        } else {
            rng.gen_range(0..=jitter_ceiling)
        };
        backoff + Duration::from_micros(jitter)
    }
}

/// Contents written into a lock file so sweeps and humans can identify the owner
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockRecord {
    pub owner_process_id: u32,
    pub acquired_at: DateTime<Utc>,
}

/// Proof of lock ownership; releasing deletes the lock file
#[derive(Debug)]
pub struct LockHandle {
    path: PathBuf,
    owner_process_id: u32,
    acquired_at: DateTime<Utc>,
    released: bool,
}

impl LockHandle {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn owner_process_id(&self) -> u32 {
        self.owner_process_id
    }

    pub fn acquired_at(&self) -> DateTime<Utc> {
        self.acquired_at
    }

    /// Release the lock. A lock file that is already gone is not an error.
    pub fn release(mut self) {
        self.release_inner();
    }

    /// Give up ownership without deleting the lock file, as a crashed holder would
    pub fn abandon(mut self) {
        self.released = true;
    }

    fn release_inner(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        if let Err(e) = fs::remove_file(&self.path) {
            if e.kind() != io::ErrorKind::NotFound {
                tracing::debug!(path = %self.path.display(), error = %e, "lock release failed");
            }
        }
    }
}

impl Drop for LockHandle {
    fn drop(&mut self) {
        self.release_inner();
    }
}

/// Path of the lock file guarding `target`
pub fn lock_path_for(target: &Path) -> PathBuf {
    let mut name = target.as_os_str().to_os_string();
    name.push(LOCK_SUFFIX);
    PathBuf::from(name)
}

/// Advisory lock over a single lock file path
pub struct FileLock;

impl FileLock {
    /// Acquire the lock at `path`, retrying per `config`
    pub fn acquire(path: &Path, config: &LockConfig) -> Result<LockHandle, LockError> {
        let started = Instant::now();
        let deadline = config.timeout.map(|t| started + t);
        let mut rng = rand::thread_rng();
        let attempts = config.max_attempts.max(1);

        for attempt in 0..attempts {
            if let Some(handle) = Self::try_acquire(path)? {
                if attempt > 0 {
                    tracing::trace!(path = %path.display(), attempt, "lock acquired after retry");
                }
                return Ok(handle);
            }

            if attempt + 1 == attempts {
                break;
            }

            let mut delay = config.delay(attempt, &mut rng);
            if let Some(deadline) = deadline {
                let now = Instant::now();
                if now >= deadline {
                    break;
                }
                delay = delay.min(deadline - now);
            }
            std::thread::sleep(delay);
        }

        Err(LockError::Unavailable {
            path: path.to_path_buf(),
            attempts,
        })
    }

    /// Single acquisition attempt; `Ok(None)` means the lock is held elsewhere
    pub fn try_acquire(path: &Path) -> Result<Option<LockHandle>, LockError> {
        let opened = OpenOptions::new().write(true).create_new(true).open(path);
        let mut file = match opened {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => return Ok(None),
            // Windows reports a pending delete as a permission error; elsewhere
            // it means the directory is unwritable
            Err(e) if cfg!(windows) && e.kind() == io::ErrorKind::PermissionDenied => {
                return Ok(None);
            }
            Err(source) => {
                return Err(LockError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        let record = LockRecord {
            owner_process_id: std::process::id(),
            acquired_at: Utc::now(),
        };
        let handle = LockHandle {
            path: path.to_path_buf(),
            owner_process_id: record.owner_process_id,
            acquired_at: record.acquired_at,
            released: false,
        };
        // The file's existence is the lock; its contents are informational
        let written = serde_json::to_vec(&record)
            .map_err(io::Error::from)
            .and_then(|json| file.write_all(&json));
        if let Err(e) = written {
            tracing::debug!(path = %path.display(), error = %e, "could not record lock owner");
        }
        Ok(Some(handle))
    }

    /// Read the owner record of a lock file, if present and well-formed
    pub fn read_record(path: &Path) -> Option<LockRecord> {
        let bytes = fs::read(path).ok()?;
        serde_json::from_slice(&bytes).ok()
    }
}

#[cfg(test)]
#[path = "lock_tests.rs"]
mod tests;
