// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Harness-wide settings carried in the catalog's `[settings]` table

use ct_core::coordination::SweepConfig;
use ct_core::monitor::{LeakThresholds, MonitorConfig, Severity, DEFAULT_HISTORY_CAPACITY};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct HarnessSettings {
    /// Parent of per-test work dirs; the system temp dir when unset
    pub work_root: Option<PathBuf>,
    /// Lock files older than this are swept as orphaned
    #[serde(with = "humantime_serde")]
    pub stale_lock_age: Duration,
    /// Leaks at or above this severity fail the test; unset means warn only
    pub leak_fail_severity: Option<Severity>,
    pub memory_threshold_mb: f64,
    pub file_handle_threshold: i64,
    pub process_threshold: i64,
    pub history_capacity: usize,
}

impl Default for HarnessSettings {
    fn default() -> Self {
        let thresholds = LeakThresholds::default();
        Self {
            work_root: None,
            stale_lock_age: SweepConfig::default().max_age,
            leak_fail_severity: None,
            memory_threshold_mb: thresholds.memory_mb,
            file_handle_threshold: thresholds.file_handles,
            process_threshold: thresholds.processes,
            history_capacity: DEFAULT_HISTORY_CAPACITY,
        }
    }
}

impl HarnessSettings {
    pub fn work_root(&self) -> PathBuf {
        self.work_root
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("ct-work"))
    }

    pub fn with_work_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.work_root = Some(root.into());
        self
    }

    pub fn with_leak_fail_severity(mut self, severity: Option<Severity>) -> Self {
        self.leak_fail_severity = severity;
        self
    }

    pub fn leak_thresholds(&self) -> LeakThresholds {
        LeakThresholds {
            memory_mb: self.memory_threshold_mb,
            file_handles: self.file_handle_threshold,
            processes: self.process_threshold,
        }
    }

    pub fn monitor_config(&self) -> MonitorConfig {
        MonitorConfig {
            thresholds: self.leak_thresholds(),
            history_capacity: self.history_capacity,
        }
    }

    pub fn sweep_config(&self) -> SweepConfig {
        SweepConfig::default().with_max_age(self.stale_lock_age)
    }
}
