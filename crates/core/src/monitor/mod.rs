// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Resource monitoring and leak detection
//!
//! A [`ResourceMonitor`] captures labelled snapshots through a
//! [`ResourceProbe`], keeps a bounded history, compares the latest sample
//! against the baseline taken by [`ResourceMonitor::start_monitoring`] and
//! classifies recent trends.

mod leak;
mod probe;
mod snapshot;
mod trend;

pub use leak::{
    detect_leaks, LeakReport, LeakThresholds, LeakType, LeakViolation, Severity,
    HIGH_SEVERITY_RATIO,
};
pub use probe::{parse_vm_rss_mb, ProbeError, ResourceProbe, ScriptedProbe, SystemProbe};
pub use snapshot::{ResourceDelta, ResourceSample, ResourceSnapshot};
pub use trend::{analyze_trends, classify, Trend, TrendReport, TREND_WINDOW};

use crate::clock::Clock;
use crate::platform::Platform;
use std::collections::VecDeque;
use thiserror::Error;

/// Default number of snapshots retained
pub const DEFAULT_HISTORY_CAPACITY: usize = 100;

#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("probe error: {0}")]
    Probe(#[from] ProbeError),
    #[error("monitoring not started: no baseline snapshot")]
    NoBaseline,
}

#[derive(Clone, Debug)]
pub struct MonitorConfig {
    pub thresholds: LeakThresholds,
    pub history_capacity: usize,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            thresholds: LeakThresholds::default(),
            history_capacity: DEFAULT_HISTORY_CAPACITY,
        }
    }
}

pub struct ResourceMonitor<P: ResourceProbe, C: Clock> {
    probe: P,
    clock: C,
    config: MonitorConfig,
    platform: Platform,
    baseline: Option<ResourceSnapshot>,
    history: VecDeque<ResourceSnapshot>,
    monitoring: bool,
}

impl<P: ResourceProbe, C: Clock> ResourceMonitor<P, C> {
    pub fn new(probe: P, clock: C, config: MonitorConfig) -> Self {
        Self {
            probe,
            clock,
            config,
            platform: Platform::current(),
            baseline: None,
            history: VecDeque::new(),
            monitoring: false,
        }
    }

    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = platform;
        self
    }

    pub fn is_monitoring(&self) -> bool {
        self.monitoring
    }

    pub fn baseline(&self) -> Option<&ResourceSnapshot> {
        self.baseline.as_ref()
    }

    pub fn history(&self) -> &VecDeque<ResourceSnapshot> {
        &self.history
    }

    pub fn thresholds(&self) -> &LeakThresholds {
        &self.config.thresholds
    }

    /// Capture the baseline every later leak check is measured against
    pub fn start_monitoring(&mut self) -> Result<ResourceSnapshot, MonitorError> {
        let baseline = self.take_snapshot("baseline")?;
        tracing::debug!(
            memory_mb = baseline.memory_mb,
            file_handles = baseline.file_handles,
            processes = baseline.process_count,
            "resource baseline captured"
        );
        self.baseline = Some(baseline.clone());
        self.monitoring = true;
        Ok(baseline)
    }

    /// Capture a final snapshot and stop; a no-op if monitoring never started
    pub fn stop_monitoring(&mut self) -> Result<Option<ResourceSnapshot>, MonitorError> {
        if !self.monitoring {
            return Ok(None);
        }
        let last = self.take_snapshot("final")?;
        self.monitoring = false;
        Ok(Some(last))
    }

    /// Capture a snapshot and append it to the bounded history
    pub fn take_snapshot(&mut self, label: &str) -> Result<ResourceSnapshot, MonitorError> {
        let sample = self.probe.sample()?;
        let snapshot =
            ResourceSnapshot::from_sample(label, self.clock.wall(), self.platform, sample);
        if self.config.history_capacity > 0 {
            while self.history.len() >= self.config.history_capacity {
                self.history.pop_front();
            }
            self.history.push_back(snapshot.clone());
        }
        Ok(snapshot)
    }

    /// Take a fresh snapshot and compare it with the baseline
    pub fn detect_leaks(&mut self) -> Result<LeakReport, MonitorError> {
        let baseline = self.baseline.clone().ok_or(MonitorError::NoBaseline)?;
        let current = self.take_snapshot("leak-check")?;
        let report = detect_leaks(&baseline.sample(), &current.sample(), &self.config.thresholds);
        if report.has_leaks {
            tracing::warn!(summary = %report.summary, "resource leak detected");
        }
        Ok(report)
    }

    pub fn analyze_trends(&self) -> TrendReport {
        analyze_trends(self.history.iter())
    }
}

#[cfg(test)]
#[path = "monitor_tests.rs"]
mod tests;
