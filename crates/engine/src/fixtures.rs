// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared setup for the contention tests
//!
//! Each concrete test holds one fixture as a field. Fixtures only lay out
//! paths inside the test's work dir and answer questions about what is on
//! disk; the workers do the contending.

use crate::worker::BarrierSpec;
use ct_core::coordination::{FileBackedStore, StoreError};
use ct_core::copy::{destination_census, file_checksum, TEMP_SUFFIX};
use rand::{Rng, SeedableRng};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// Store, lock and barrier paths for the file-locking tests
#[derive(Clone, Debug)]
pub struct FileLockingFixture {
    pub store_path: PathBuf,
    pub lock_path: PathBuf,
    pub barrier_dir: PathBuf,
}

impl FileLockingFixture {
    pub fn new(work_dir: &Path) -> std::io::Result<Self> {
        let barrier_dir = work_dir.join("barriers");
        std::fs::create_dir_all(&barrier_dir)?;
        Ok(Self {
            store_path: work_dir.join("shared-state.json"),
            lock_path: work_dir.join("contended.lock"),
            barrier_dir,
        })
    }

    pub fn store(&self) -> Result<FileBackedStore, StoreError> {
        FileBackedStore::open_with(&self.store_path, crate::worker::worker_lock_config())
    }

    pub fn barrier(
        &self,
        barrier_id: &str,
        process_count: usize,
        timeout: Duration,
        process_id: impl Into<String>,
    ) -> BarrierSpec {
        BarrierSpec {
            barrier_dir: self.barrier_dir.clone(),
            barrier_id: barrier_id.to_string(),
            process_count,
            timeout_seconds: timeout.as_secs_f64(),
            process_id: process_id.into(),
        }
    }
}

/// Source and destination layout for the copy race tests
#[derive(Clone, Debug)]
pub struct RaceFixture {
    pub root: PathBuf,
    pub source: PathBuf,
}

impl RaceFixture {
    pub fn new(work_dir: &Path) -> std::io::Result<Self> {
        let root = work_dir.join("race");
        std::fs::create_dir_all(&root)?;
        Ok(Self {
            source: root.join("source.bin"),
            root,
        })
    }

    /// Fill the source with `len` reproducible pseudo-random bytes; returns its checksum
    pub fn write_source(&self, len: usize, seed: u64) -> std::io::Result<u32> {
        write_random(&self.source, len, seed)
    }

    /// `count` destinations, each in its own directory under `set`
    pub fn destinations(&self, set: &str, count: usize) -> std::io::Result<Vec<PathBuf>> {
        (0..count)
            .map(|i| {
                let dir = self.root.join(set).join(format!("dest-{}", i + 1));
                std::fs::create_dir_all(&dir)?;
                Ok(dir.join("payload.bin"))
            })
            .collect()
    }

    pub fn census(destinations: &[PathBuf]) -> usize {
        destination_census(destinations)
    }

    /// Temp files left in the destinations' directories
    pub fn temp_files(destinations: &[PathBuf]) -> Vec<PathBuf> {
        let mut dirs: Vec<&Path> = destinations.iter().filter_map(|d| d.parent()).collect();
        dirs.sort();
        dirs.dedup();
        dirs.into_iter()
            .filter_map(|dir| std::fs::read_dir(dir).ok())
            .flat_map(|entries| entries.flatten())
            .map(|entry| entry.path())
            .filter(|path| path.to_string_lossy().ends_with(TEMP_SUFFIX))
            .collect()
    }

    /// Destinations whose checksum differs from `expected`
    pub fn mismatched(destinations: &[PathBuf], expected: u32) -> Vec<PathBuf> {
        destinations
            .iter()
            .filter(|d| file_checksum(d).ok() != Some(expected))
            .cloned()
            .collect()
    }
}

/// Write `len` bytes seeded by `seed` to `path` and return their checksum
pub fn write_random(path: &Path, len: usize, seed: u64) -> std::io::Result<u32> {
    let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
    let mut bytes = vec![0u8; len];
    rng.fill(bytes.as_mut_slice());
    std::fs::write(path, &bytes)?;
    file_checksum(path)
}

/// Paths for the crash-recovery tests
#[derive(Clone, Debug)]
pub struct RecoveryFixture {
    pub root: PathBuf,
    pub lock_path: PathBuf,
}

impl RecoveryFixture {
    pub fn new(work_dir: &Path) -> std::io::Result<Self> {
        let root = work_dir.join("recovery");
        std::fs::create_dir_all(&root)?;
        Ok(Self {
            lock_path: root.join("resource.lock"),
            root,
        })
    }

    /// Poll until `path` exists or `timeout` elapses
    pub async fn wait_for(path: &Path, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if path.exists() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        path.exists()
    }
}

#[cfg(test)]
#[path = "fixtures_tests.rs"]
mod tests;
