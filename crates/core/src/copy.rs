// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Atomic multi-destination copy
//!
//! Two-phase commit over temp files:
//! 1. Prepare: write the source to `<destination>.tmp` for every destination
//!    concurrently, refusing to reuse an existing temp file.
//! 2. Commit or abort: if every temp was written, rename them into place one
//!    at a time; otherwise abort. Abort, including after a rename failure,
//!    removes every destination's temp path and every final file present,
//!    whoever created them.
//!
//! Failures are terminal for the operation. Retrying is the caller's job.

use crate::id::{IdGen, UuidIdGen};
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

/// Suffix appended to a destination to name its temp file
pub const TEMP_SUFFIX: &str = ".tmp";

/// Path of the temp file staged for `destination`
pub fn temp_path_for(destination: &Path) -> PathBuf {
    let mut name = destination.as_os_str().to_os_string();
    name.push(TEMP_SUFFIX);
    PathBuf::from(name)
}

/// Phase in which a destination failed
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CopyPhase {
    Prepare,
    Commit,
}

/// Per-destination outcome
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DestinationResult {
    pub destination: PathBuf,
    pub temp_path: PathBuf,
    pub prepared: bool,
    pub committed: bool,
    pub bytes_written: u64,
    pub failed_phase: Option<CopyPhase>,
    pub error: Option<String>,
}

impl DestinationResult {
    fn new(destination: &Path) -> Self {
        Self {
            destination: destination.to_path_buf(),
            temp_path: temp_path_for(destination),
            prepared: false,
            committed: false,
            bytes_written: 0,
            failed_phase: None,
            error: None,
        }
    }

    fn fail(&mut self, phase: CopyPhase, error: impl ToString) {
        self.failed_phase = Some(phase);
        self.error = Some(error.to_string());
    }
}

/// Result of one copy operation; immutable once returned
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CopyOperationResult {
    pub operation_id: String,
    pub source: PathBuf,
    pub success: bool,
    pub destination_results: Vec<DestinationResult>,
    /// Destinations on disk afterwards are either none or all of them
    pub is_atomic: bool,
    pub rolled_back: bool,
    /// Destinations present on disk when the operation returned
    pub destinations_present: usize,
    pub error: Option<String>,
    pub duration_ms: u64,
}

impl CopyOperationResult {
    /// The protocol left a partial destination set behind
    pub fn partial_commit_detected(&self) -> bool {
        !self.is_atomic
    }

    pub fn failed_destinations(&self) -> impl Iterator<Item = &DestinationResult> {
        self.destination_results.iter().filter(|d| d.error.is_some())
    }
}

/// Number of `destinations` currently present on disk as files
pub fn destination_census(destinations: &[PathBuf]) -> usize {
    destinations.iter().filter(|d| d.is_file()).count()
}

/// Whether a census value satisfies all-or-nothing for `total` destinations
pub fn census_is_atomic(present: usize, total: usize) -> bool {
    present == 0 || present == total
}

/// CRC32 of a file's contents
pub fn file_checksum(path: &Path) -> io::Result<u32> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut hasher = crc32fast::Hasher::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hasher.finalize())
}

/// Executes the two-phase copy protocol
#[derive(Clone, Debug, Default)]
pub struct AtomicCopier<I: IdGen = UuidIdGen> {
    id_gen: I,
}

impl AtomicCopier<UuidIdGen> {
    pub fn new() -> Self {
        Self { id_gen: UuidIdGen }
    }
}

impl<I: IdGen> AtomicCopier<I> {
    pub fn with_id_gen(id_gen: I) -> Self {
        Self { id_gen }
    }

    /// Copy `source` to every path in `destinations`, all or nothing
    pub fn copy(&self, source: &Path, destinations: &[PathBuf]) -> CopyOperationResult {
        let started = Instant::now();
        let operation_id = self.id_gen.next();
        tracing::debug!(
            operation_id,
            source = %source.display(),
            destinations = destinations.len(),
            "starting atomic copy"
        );

        let mut results = prepare_all(source, destinations);
        let all_prepared = results.iter().all(|r| r.prepared);

        let (success, rolled_back, mut error) = if all_prepared {
            match commit_all(&mut results) {
                Ok(()) => (true, false, None),
                Err(message) => {
                    rollback(&results);
                    (false, true, Some(message))
                }
            }
        } else {
            let failed = results.iter().filter(|r| !r.prepared).count();
            rollback(&results);
            (
                false,
                true,
                Some(format!("prepare failed for {} of {} destinations", failed, results.len())),
            )
        };

        let present = destination_census(destinations);
        let is_atomic = census_is_atomic(present, destinations.len());
        if !is_atomic {
            tracing::error!(
                operation_id,
                present,
                total = destinations.len(),
                "partial commit detected after copy"
            );
            error = Some(format!(
                "partial commit: {} of {} destinations present",
                present,
                destinations.len()
            ));
        }

        if success {
            tracing::debug!(operation_id, "atomic copy committed");
        } else {
            tracing::info!(operation_id, error = ?error, "atomic copy rolled back");
        }

        CopyOperationResult {
            operation_id,
            source: source.to_path_buf(),
            success: success && is_atomic,
            destination_results: results,
            is_atomic,
            rolled_back,
            destinations_present: present,
            error,
            duration_ms: started.elapsed().as_millis() as u64,
        }
    }
}

fn prepare_all(source: &Path, destinations: &[PathBuf]) -> Vec<DestinationResult> {
    std::thread::scope(|scope| {
        let workers: Vec<_> = destinations
            .iter()
            .map(|destination| scope.spawn(move || prepare_one(source, destination)))
            .collect();
        workers
            .into_iter()
            .zip(destinations)
            .map(|(worker, destination)| {
                worker.join().unwrap_or_else(|_| {
                    let mut result = DestinationResult::new(destination);
                    result.fail(CopyPhase::Prepare, "prepare worker panicked");
                    result
                })
            })
            .collect()
    })
}

fn prepare_one(source: &Path, destination: &Path) -> DestinationResult {
    let mut result = DestinationResult::new(destination);

    let mut temp = match OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&result.temp_path)
    {
        Ok(file) => file,
        Err(e) => {
            result.fail(CopyPhase::Prepare, format!("create temp: {}", e));
            return result;
        }
    };

    let written = File::open(source).and_then(|src| {
        let bytes = io::copy(&mut BufReader::new(src), &mut temp)?;
        temp.flush()?;
        temp.sync_all()?;
        Ok(bytes)
    });
    match written {
        Ok(bytes) => {
            result.prepared = true;
            result.bytes_written = bytes;
        }
        Err(e) => result.fail(CopyPhase::Prepare, format!("write temp: {}", e)),
    }
    result
}

fn commit_all(results: &mut [DestinationResult]) -> Result<(), String> {
    for result in results.iter_mut() {
        if let Err(e) = fs::rename(&result.temp_path, &result.destination) {
            result.fail(CopyPhase::Commit, format!("rename: {}", e));
            return Err(format!(
                "commit failed at {}: {}",
                result.destination.display(),
                e
            ));
        }
        result.committed = true;
    }
    Ok(())
}

/// Restore the empty destination set: no temps and no finals. Never fails;
/// a removal the OS refuses is logged and the rest still run.
fn rollback(results: &[DestinationResult]) {
    for result in results {
        remove_if_file(&result.temp_path);
        remove_if_file(&result.destination);
    }
}

fn remove_if_file(path: &Path) {
    if !path.is_file() {
        return;
    }
    match fs::remove_file(path) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "rollback could not remove file");
        }
    }
}

#[cfg(test)]
#[path = "copy_tests.rs"]
mod tests;
