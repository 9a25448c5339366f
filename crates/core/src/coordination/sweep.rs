// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Stale lock sweep
//!
//! Lock files outlive their holder when a process dies mid-hold. The sweep
//! walks a directory tree and deletes lock files older than a configured age.

use super::lock::{FileLock, LOCK_SUFFIX};
use crate::clock::Clock;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Sweep configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SweepConfig {
    /// Lock files older than this are considered orphaned
    #[serde(with = "humantime_serde")]
    pub max_age: Duration,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            max_age: Duration::from_secs(60 * 60),
        }
    }
}

impl SweepConfig {
    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = max_age;
        self
    }
}

/// Outcome of one sweep
#[derive(Clone, Debug, Default)]
pub struct SweepReport {
    pub scanned: usize,
    pub removed: Vec<PathBuf>,
    pub failed: Vec<(PathBuf, String)>,
}

/// Age of a lock file, preferring the owner record over file metadata
pub fn lock_age(path: &Path, now: DateTime<Utc>) -> Option<Duration> {
    let acquired_at = match FileLock::read_record(path) {
        Some(record) => record.acquired_at,
        None => {
            let modified = fs::metadata(path).ok()?.modified().ok()?;
            DateTime::<Utc>::from(modified)
        }
    };
    (now - acquired_at).to_std().ok()
}

/// Delete lock files under `root` older than `config.max_age`
pub fn sweep_stale_locks(root: &Path, config: &SweepConfig, clock: &impl Clock) -> SweepReport {
    let mut report = SweepReport::default();
    let now = clock.wall();
    let mut pending = vec![root.to_path_buf()];

    while let Some(dir) = pending.pop() {
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::debug!(dir = %dir.display(), error = %e, "skipping unreadable directory");
                continue;
            }
        };
        for entry in entries.flatten() {
            let path = entry.path();
            let Ok(file_type) = entry.file_type() else {
                continue;
            };
            if file_type.is_dir() {
                pending.push(path);
                continue;
            }
            if !path.to_string_lossy().ends_with(LOCK_SUFFIX) {
                continue;
            }
            report.scanned += 1;

            let Some(age) = lock_age(&path, now) else {
                continue;
            };
            if age <= config.max_age {
                continue;
            }
            match fs::remove_file(&path) {
                Ok(()) => {
                    tracing::info!(
                        path = %path.display(),
                        age_secs = age.as_secs(),
                        "removed stale lock"
                    );
                    report.removed.push(path);
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "failed to remove stale lock");
                    report.failed.push((path, e.to_string()));
                }
            }
        }
    }

    report
}

#[cfg(test)]
#[path = "sweep_tests.rs"]
mod tests;
