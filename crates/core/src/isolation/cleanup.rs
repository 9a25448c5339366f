// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! CleanupManager - guaranteed release of everything a test acquired
//!
//! Resources are registered as they are acquired and released in reverse
//! order, followed by files and then directories. A failing step is logged and
//! reported but never stops the remaining steps, and nothing here panics or
//! returns an error.

use crate::coordination::LockHandle;
use std::io::Write;
use std::path::PathBuf;
use std::process::Child;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// How long a release action may wait for a process or job to finish
pub const RELEASE_GRACE: Duration = Duration::from_secs(5);

/// A background thread that stops when its flag is raised
pub struct BackgroundJob {
    name: String,
    stop: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

impl BackgroundJob {
    /// Spawn `body`, which should return promptly once the flag it receives is set
    pub fn spawn(
        name: impl Into<String>,
        body: impl FnOnce(Arc<AtomicBool>) + Send + 'static,
    ) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&stop);
        Self {
            name: name.into(),
            stop,
            handle: std::thread::spawn(move || body(flag)),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

/// A typed resource with a defined release action
pub enum CleanupResource {
    /// Owned child process: kill, then wait for exit
    Process { name: String, child: Child },
    /// Process known only by pid: force-terminate, then wait for exit
    Pid { name: String, pid: u32 },
    /// Output stream: flush, then drop
    Stream {
        name: String,
        stream: Box<dyn Write + Send>,
    },
    /// Background job: signal stop, then join
    Job(BackgroundJob),
    /// Held lock: release
    Lock(LockHandle),
}

impl CleanupResource {
    pub fn name(&self) -> String {
        match self {
            CleanupResource::Process { name, .. }
            | CleanupResource::Pid { name, .. }
            | CleanupResource::Stream { name, .. } => name.clone(),
            CleanupResource::Job(job) => job.name.clone(),
            CleanupResource::Lock(handle) => handle.path().display().to_string(),
        }
    }
}

/// Result of one cleanup step
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CleanupOutcome {
    pub resource_id: String,
    pub action: &'static str,
    pub success: bool,
    pub message: Option<String>,
}

impl CleanupOutcome {
    fn ok(resource_id: impl Into<String>, action: &'static str) -> Self {
        Self {
            resource_id: resource_id.into(),
            action,
            success: true,
            message: None,
        }
    }

    fn failed(resource_id: impl Into<String>, action: &'static str, message: impl ToString) -> Self {
        let result = Self {
            resource_id: resource_id.into(),
            action,
            success: false,
            message: Some(message.to_string()),
        };
        tracing::warn!(
            resource = %result.resource_id,
            action,
            message = ?result.message,
            "cleanup step failed"
        );
        result
    }
}

/// Registry of files, directories and typed resources to release
#[derive(Default)]
pub struct CleanupManager {
    resources: Vec<CleanupResource>,
    files: Vec<PathBuf>,
    directories: Vec<PathBuf>,
}

impl CleanupManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, resource: CleanupResource) {
        self.resources.push(resource);
    }

    pub fn register_file(&mut self, path: impl Into<PathBuf>) {
        self.files.push(path.into());
    }

    pub fn register_directory(&mut self, path: impl Into<PathBuf>) {
        self.directories.push(path.into());
    }

    pub fn pending(&self) -> usize {
        self.resources.len() + self.files.len() + self.directories.len()
    }

    /// Release everything registered so far
    pub fn cleanup_all(&mut self) -> Vec<CleanupOutcome> {
        let mut results = Vec::new();

        while let Some(resource) = self.resources.pop() {
            results.push(release(resource));
        }

        for path in self.files.drain(..).rev() {
            let id = path.display().to_string();
            results.push(match std::fs::remove_file(&path) {
                Ok(()) => CleanupOutcome::ok(id, "remove_file"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    CleanupOutcome::ok(id, "remove_file")
                }
                Err(e) => CleanupOutcome::failed(id, "remove_file", e),
            });
        }

        for path in self.directories.drain(..).rev() {
            let id = path.display().to_string();
            results.push(match std::fs::remove_dir_all(&path) {
                Ok(()) => CleanupOutcome::ok(id, "remove_dir"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    CleanupOutcome::ok(id, "remove_dir")
                }
                Err(e) => CleanupOutcome::failed(id, "remove_dir", e),
            });
        }

        results
    }
}

impl Drop for CleanupManager {
    fn drop(&mut self) {
        if self.pending() > 0 {
            self.cleanup_all();
        }
    }
}

fn release(resource: CleanupResource) -> CleanupOutcome {
    let id = resource.name();
    match resource {
        CleanupResource::Process { mut child, .. } => {
            if let Err(e) = child.kill() {
                // InvalidInput means it already exited
                if e.kind() != std::io::ErrorKind::InvalidInput {
                    return CleanupOutcome::failed(id, "kill", e);
                }
            }
            let deadline = Instant::now() + RELEASE_GRACE;
            loop {
                match child.try_wait() {
                    Ok(Some(_)) => return CleanupOutcome::ok(id, "kill"),
                    Ok(None) if Instant::now() < deadline => {
                        std::thread::sleep(Duration::from_millis(10))
                    }
                    Ok(None) => return CleanupOutcome::failed(id, "kill", "did not exit"),
                    Err(e) => return CleanupOutcome::failed(id, "kill", e),
                }
            }
        }
        CleanupResource::Pid { pid, .. } => match crate::process::terminate(pid, RELEASE_GRACE) {
            Ok(_) => CleanupOutcome::ok(id, "terminate"),
            Err(e) => CleanupOutcome::failed(id, "terminate", e),
        },
        CleanupResource::Stream { mut stream, .. } => match stream.flush() {
            Ok(()) => CleanupOutcome::ok(id, "close"),
            Err(e) => CleanupOutcome::failed(id, "close", e),
        },
        CleanupResource::Job(job) => {
            job.stop.store(true, Ordering::SeqCst);
            let deadline = Instant::now() + RELEASE_GRACE;
            while !job.handle.is_finished() && Instant::now() < deadline {
                std::thread::sleep(Duration::from_millis(10));
            }
            if !job.handle.is_finished() {
                // Detach rather than block the rest of the cleanup
                return CleanupOutcome::failed(id, "stop", "job ignored stop request");
            }
            match job.handle.join() {
                Ok(()) => CleanupOutcome::ok(id, "stop"),
                Err(_) => CleanupOutcome::failed(id, "stop", "job panicked"),
            }
        }
        CleanupResource::Lock(handle) => {
            handle.release();
            CleanupOutcome::ok(id, "release")
        }
    }
}

#[cfg(test)]
#[path = "cleanup_tests.rs"]
mod tests;
