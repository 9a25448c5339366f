// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker launching and supervision
//!
//! Process mode re-invokes the harness binary as `<program> worker '<json>'`
//! and reads the report from the last line of its stdout. Thread mode runs the
//! same command on a blocking thread. Either way the caller waits with a hard
//! timeout and the worker is stopped when the timeout expires.

use crate::error::WorkerError;
use crate::worker::{self, StopFlag, WorkerCommand, WorkerOutput, WorkerReport};
use ct_catalog::IsolationLevel;
use ct_core::isolation::EmergencyCleanupManager;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncReadExt;

/// Default hard limit on a single worker
pub const DEFAULT_WORKER_TIMEOUT: Duration = Duration::from_secs(60);

/// Grace given to a stopped thread worker before it is left behind
const THREAD_STOP_GRACE: Duration = Duration::from_secs(5);

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LaunchMode {
    /// Child process running `<program> worker '<json>'`
    Process { program: PathBuf },
    /// Blocking thread inside the harness
    Thread,
}

#[derive(Clone)]
pub struct WorkerLauncher {
    mode: LaunchMode,
    timeout: Duration,
    kill_on_drop: bool,
    emergency: Option<EmergencyCleanupManager>,
}

impl WorkerLauncher {
    pub fn process(program: impl Into<PathBuf>) -> Self {
        Self::new(LaunchMode::Process {
            program: program.into(),
        })
    }

    pub fn thread() -> Self {
        Self::new(LaunchMode::Thread)
    }

    /// Launcher for a category's isolation level; process mode needs a worker program
    pub fn for_isolation(level: IsolationLevel, program: Option<PathBuf>) -> Self {
        match (level, program) {
            (IsolationLevel::Process, Some(program)) => Self::process(program),
            (IsolationLevel::Process, None) => {
                tracing::warn!("no worker program available, running process workers as threads");
                Self::thread()
            }
            (IsolationLevel::Thread, _) => Self::thread(),
        }
    }

    fn new(mode: LaunchMode) -> Self {
        Self {
            mode,
            timeout: DEFAULT_WORKER_TIMEOUT,
            kill_on_drop: true,
            emergency: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Whether dropping an unfinished handle kills its worker
    pub fn with_kill_on_drop(mut self, kill_on_drop: bool) -> Self {
        self.kill_on_drop = kill_on_drop;
        self
    }

    /// Report spawned pids to `emergency` while they run
    pub fn with_emergency(mut self, emergency: EmergencyCleanupManager) -> Self {
        self.emergency = Some(emergency);
        self
    }

    pub fn mode(&self) -> &LaunchMode {
        &self.mode
    }

    pub fn is_process(&self) -> bool {
        matches!(self.mode, LaunchMode::Process { .. })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Start a worker without waiting for it
    pub fn spawn(&self, command: &WorkerCommand) -> Result<WorkerHandle, WorkerError> {
        let label = command.kind().to_string();
        let inner = match &self.mode {
            LaunchMode::Process { program } => {
                let json = serde_json::to_string(command)?;
                let child = tokio::process::Command::new(program)
                    .arg("worker")
                    .arg(json)
                    .stdin(Stdio::null())
                    .stdout(Stdio::piped())
                    .stderr(Stdio::inherit())
                    .kill_on_drop(self.kill_on_drop)
                    .spawn()
                    .map_err(WorkerError::Spawn)?;
                let pid = child.id();
                if let (Some(pid), Some(emergency)) = (pid, &self.emergency) {
                    emergency.track_pid(pid);
                }
                tracing::debug!(kind = %label, pid, "spawned worker process");
                Inner::Process { child, pid }
            }
            LaunchMode::Thread => {
                let stop = StopFlag::new();
                let flag = stop.clone();
                let command = command.clone();
                let join = tokio::task::spawn_blocking(move || worker::execute(&command, &flag));
                tracing::debug!(kind = %label, "spawned worker thread");
                Inner::Thread { stop, join }
            }
        };
        Ok(WorkerHandle {
            label,
            timeout: self.timeout,
            kill_on_drop: self.kill_on_drop,
            emergency: self.emergency.clone(),
            inner: Some(inner),
        })
    }

    /// Spawn and wait
    pub async fn run(&self, command: &WorkerCommand) -> Result<WorkerOutput, WorkerError> {
        self.spawn(command)?.wait().await
    }

    /// Spawn every command, then wait for all of them in order
    pub async fn run_all(
        &self,
        commands: &[WorkerCommand],
    ) -> Result<Vec<WorkerOutput>, WorkerError> {
        let handles = commands
            .iter()
            .map(|c| self.spawn(c))
            .collect::<Result<Vec<_>, _>>()?;
        let mut outputs = Vec::with_capacity(handles.len());
        for handle in handles {
            outputs.push(handle.wait().await?);
        }
        Ok(outputs)
    }
}

enum Inner {
    Process {
        child: tokio::process::Child,
        pid: Option<u32>,
    },
    Thread {
        stop: StopFlag,
        join: tokio::task::JoinHandle<WorkerOutput>,
    },
}

/// A running worker
pub struct WorkerHandle {
    label: String,
    timeout: Duration,
    kill_on_drop: bool,
    emergency: Option<EmergencyCleanupManager>,
    inner: Option<Inner>,
}

impl WorkerHandle {
    /// OS pid for process workers
    pub fn pid(&self) -> Option<u32> {
        match &self.inner {
            Some(Inner::Process { pid, .. }) => *pid,
            _ => None,
        }
    }

    /// Whether the worker has already exited
    pub fn is_finished(&mut self) -> bool {
        match &mut self.inner {
            Some(Inner::Process { child, .. }) => matches!(child.try_wait(), Ok(Some(_))),
            Some(Inner::Thread { join, .. }) => join.is_finished(),
            None => true,
        }
    }

    /// Wait for the report, killing the worker if the timeout expires first
    pub async fn wait(mut self) -> Result<WorkerOutput, WorkerError> {
        match self.inner.take() {
            Some(Inner::Process { mut child, pid }) => {
                let result = self.wait_process(&mut child).await;
                self.untrack(pid);
                result
            }
            Some(Inner::Thread { stop, join }) => self.wait_thread(stop, join).await,
            None => Err(WorkerError::Stopped),
        }
    }

    /// Stop the worker now: SIGKILL for processes, a stop request for threads
    pub async fn kill(mut self) -> Result<(), WorkerError> {
        match self.inner.take() {
            Some(Inner::Process { mut child, pid }) => {
                let killed = child.kill().await.map_err(WorkerError::Wait);
                self.untrack(pid);
                killed
            }
            Some(Inner::Thread { stop, join }) => {
                stop.raise();
                match tokio::time::timeout(THREAD_STOP_GRACE, join).await {
                    Ok(Ok(_)) => Ok(()),
                    Ok(Err(e)) => Err(WorkerError::Join(e.to_string())),
                    Err(_) => Err(WorkerError::TimedOut {
                        label: self.label.clone(),
                        timeout: THREAD_STOP_GRACE,
                    }),
                }
            }
            None => Ok(()),
        }
    }

    /// Let the worker run on unsupervised, as if its parent had crashed.
    /// A thread worker is asked to stop and will abandon whatever it holds;
    /// the pid of a process worker is returned so the caller can find the
    /// orphan. The pid stays tracked for emergency cleanup.
    pub fn abandon(mut self) -> Option<u32> {
        match self.inner.take() {
            Some(Inner::Process { child, pid }) => {
                if self.kill_on_drop {
                    tracing::warn!(pid, "abandoning a kill-on-drop worker kills it");
                }
                drop(child);
                pid
            }
            Some(Inner::Thread { stop, .. }) => {
                stop.raise();
                None
            }
            None => None,
        }
    }

    async fn wait_process(
        &self,
        child: &mut tokio::process::Child,
    ) -> Result<WorkerOutput, WorkerError> {
        let stdout = child.stdout.take();
        let reader = tokio::spawn(async move {
            let mut buf = String::new();
            if let Some(mut stdout) = stdout {
                let _ = stdout.read_to_string(&mut buf).await;
            }
            buf
        });

        let status = match tokio::time::timeout(self.timeout, child.wait()).await {
            Ok(status) => status.map_err(WorkerError::Wait)?,
            Err(_) => {
                tracing::warn!(kind = %self.label, timeout = ?self.timeout, "worker timed out, killing");
                let _ = child.kill().await;
                reader.abort();
                return Err(WorkerError::TimedOut {
                    label: self.label.clone(),
                    timeout: self.timeout,
                });
            }
        };

        let stdout = reader
            .await
            .map_err(|e| WorkerError::Join(e.to_string()))?;
        Ok(WorkerOutput {
            exit_code: status.code(),
            report: parse_report(&stdout),
        })
    }

    async fn wait_thread(
        &self,
        stop: StopFlag,
        mut join: tokio::task::JoinHandle<WorkerOutput>,
    ) -> Result<WorkerOutput, WorkerError> {
        match tokio::time::timeout(self.timeout, &mut join).await {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(e)) => Err(WorkerError::Join(e.to_string())),
            Err(_) => {
                tracing::warn!(kind = %self.label, timeout = ?self.timeout, "worker timed out, stopping");
                stop.raise();
                let _ = tokio::time::timeout(THREAD_STOP_GRACE, join).await;
                Err(WorkerError::TimedOut {
                    label: self.label.clone(),
                    timeout: self.timeout,
                })
            }
        }
    }

    fn untrack(&self, pid: Option<u32>) {
        if let (Some(pid), Some(emergency)) = (pid, &self.emergency) {
            emergency.untrack_pid(pid);
        }
    }
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        match self.inner.take() {
            // The child's own kill_on_drop takes care of processes
            Some(Inner::Process { pid, .. }) if self.kill_on_drop => self.untrack(pid),
            Some(Inner::Thread { stop, .. }) if self.kill_on_drop => stop.raise(),
            _ => {}
        }
    }
}

/// The report is the last non-empty stdout line that parses as one
pub fn parse_report(stdout: &str) -> Option<WorkerReport> {
    stdout
        .lines()
        .rev()
        .filter(|line| !line.trim().is_empty())
        .find_map(|line| serde_json::from_str(line.trim()).ok())
}

#[cfg(test)]
#[path = "launcher_tests.rs"]
mod tests;
