// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-test sandbox
//!
//! Entering isolation creates a private working directory, backs up the
//! environment and records which processes already exist. Exiting kills any
//! process spawned since then, restores the environment, runs registered
//! cleanup and removes the working directory. Exit runs on drop if the owner
//! never called it.

use super::cleanup::{CleanupManager, CleanupOutcome, RELEASE_GRACE};
use crate::process::{self, ProcessError, ProcessInfo};
use std::collections::{HashMap, HashSet};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IsolationError {
    #[error("isolation for {0} already entered")]
    AlreadyEntered(String),
    #[error("isolation for {0} was never entered")]
    NotEntered(String),
    #[error("failed to create work dir {path}: {source}")]
    WorkDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("process baseline unavailable: {0}")]
    Process(#[from] ProcessError),
}

/// Which processes count as candidates for the orphan sweep
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OrphanScope {
    /// Only descendants of this process
    #[default]
    Descendants,
    /// Descendants plus any process sharing this process's name, which catches
    /// workers re-parented after their spawner died
    DescendantsAndSameName,
}

#[derive(Clone, Debug)]
pub struct IsolationConfig {
    pub base_dir: PathBuf,
    pub orphan_scope: OrphanScope,
    pub orphan_grace: Duration,
}

impl IsolationConfig {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            orphan_scope: OrphanScope::default(),
            orphan_grace: RELEASE_GRACE,
        }
    }

    pub fn with_orphan_scope(mut self, scope: OrphanScope) -> Self {
        self.orphan_scope = scope;
        self
    }

    pub fn with_orphan_grace(mut self, grace: Duration) -> Self {
        self.orphan_grace = grace;
        self
    }
}

/// What exiting isolation had to do
#[derive(Debug, Default)]
pub struct ExitReport {
    pub orphans_killed: Vec<ProcessInfo>,
    pub orphan_failures: Vec<(u32, String)>,
    pub env_vars_restored: usize,
    pub cleanup: Vec<CleanupOutcome>,
    pub work_dir_removed: bool,
}

impl ExitReport {
    /// No orphan was found
    pub fn is_clean(&self) -> bool {
        self.orphans_killed.is_empty() && self.orphan_failures.is_empty()
    }
}

struct Entered {
    work_dir: PathBuf,
    env: HashMap<OsString, OsString>,
    baseline_pids: HashSet<u32>,
}

pub struct TestIsolationContext {
    test_id: String,
    config: IsolationConfig,
    cleanup: CleanupManager,
    entered: Option<Entered>,
}

impl TestIsolationContext {
    pub fn new(test_id: impl Into<String>, config: IsolationConfig) -> Self {
        Self {
            test_id: test_id.into(),
            config,
            cleanup: CleanupManager::new(),
            entered: None,
        }
    }

    pub fn test_id(&self) -> &str {
        &self.test_id
    }

    pub fn is_entered(&self) -> bool {
        self.entered.is_some()
    }

    pub fn work_dir(&self) -> Option<&Path> {
        self.entered.as_ref().map(|e| e.work_dir.as_path())
    }

    /// Registry released during exit, before the work dir is removed
    pub fn cleanup(&mut self) -> &mut CleanupManager {
        &mut self.cleanup
    }

    pub fn enter_isolation(&mut self) -> Result<&Path, IsolationError> {
        if self.entered.is_some() {
            return Err(IsolationError::AlreadyEntered(self.test_id.clone()));
        }

        let baseline_pids = match process::list_processes() {
            Ok(table) => table.into_iter().map(|p| p.pid).collect(),
            // Without a process table there is nothing to sweep on exit either
            Err(ProcessError::Unsupported) => HashSet::new(),
            Err(e) => return Err(e.into()),
        };

        let work_dir = self
            .config
            .base_dir
            .join(format!("{}-{}", self.test_id, uuid::Uuid::new_v4().simple()));
        std::fs::create_dir_all(&work_dir).map_err(|source| IsolationError::WorkDir {
            path: work_dir.clone(),
            source,
        })?;

        tracing::debug!(test_id = %self.test_id, work_dir = %work_dir.display(), "entered isolation");
        let entered = self.entered.insert(Entered {
            work_dir,
            env: std::env::vars_os().collect(),
            baseline_pids,
        });
        Ok(&entered.work_dir)
    }

    pub fn exit_isolation(&mut self) -> Result<ExitReport, IsolationError> {
        let entered = self
            .entered
            .take()
            .ok_or_else(|| IsolationError::NotEntered(self.test_id.clone()))?;
        let mut report = ExitReport::default();

        self.kill_orphans(&entered.baseline_pids, &mut report);
        report.env_vars_restored = restore_env(&entered.env);
        report.cleanup = self.cleanup.cleanup_all();

        match std::fs::remove_dir_all(&entered.work_dir) {
            Ok(()) => report.work_dir_removed = true,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => report.work_dir_removed = true,
            Err(e) => tracing::warn!(
                test_id = %self.test_id,
                work_dir = %entered.work_dir.display(),
                error = %e,
                "failed to remove work dir"
            ),
        }

        tracing::debug!(
            test_id = %self.test_id,
            orphans = report.orphans_killed.len(),
            env_restored = report.env_vars_restored,
            "exited isolation"
        );
        Ok(report)
    }

    fn kill_orphans(&self, baseline: &HashSet<u32>, report: &mut ExitReport) {
        let table = match process::list_processes() {
            Ok(table) => table,
            Err(e) => {
                tracing::warn!(test_id = %self.test_id, error = %e, "orphan scan skipped");
                return;
            }
        };
        for orphan in orphan_candidates(&table, baseline, self.config.orphan_scope) {
            match process::terminate(orphan.pid, self.config.orphan_grace) {
                Ok(true) => {
                    tracing::warn!(
                        test_id = %self.test_id,
                        pid = orphan.pid,
                        name = %orphan.name,
                        "killed orphaned process"
                    );
                    report.orphans_killed.push(orphan);
                }
                // Exited on its own between scan and kill
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!(test_id = %self.test_id, pid = orphan.pid, error = %e, "orphan kill failed");
                    report.orphan_failures.push((orphan.pid, e.to_string()));
                }
            }
        }
    }
}

impl Drop for TestIsolationContext {
    fn drop(&mut self) {
        if self.entered.is_some() {
            let _ = self.exit_isolation();
        }
    }
}

/// Processes absent from `baseline` that fall inside `scope`, never including self
pub fn orphan_candidates(
    table: &[ProcessInfo],
    baseline: &HashSet<u32>,
    scope: OrphanScope,
) -> Vec<ProcessInfo> {
    let me = std::process::id();
    let mut in_scope = process::descendants(table, me);
    if scope == OrphanScope::DescendantsAndSameName {
        if let Some(name) = table.iter().find(|p| p.pid == me).map(|p| p.name.clone()) {
            in_scope.extend(table.iter().filter(|p| p.name == name).map(|p| p.pid));
        }
    }
    table
        .iter()
        .filter(|p| p.pid != me && in_scope.contains(&p.pid) && !baseline.contains(&p.pid))
        .cloned()
        .collect()
}

fn restore_env(saved: &HashMap<OsString, OsString>) -> usize {
    let mut restored = 0;
    let current: HashMap<OsString, OsString> = std::env::vars_os().collect();
    for key in current.keys() {
        if !saved.contains_key(key) {
            std::env::remove_var(key);
            restored += 1;
        }
    }
    for (key, value) in saved {
        if current.get(key) != Some(value) {
            std::env::set_var(key, value);
            restored += 1;
        }
    }
    restored
}

#[cfg(test)]
#[path = "context_tests.rs"]
mod tests;
