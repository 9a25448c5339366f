// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Leak detection over a pair of snapshots
//!
//! Detection is a pure function of the baseline, the current sample and the
//! thresholds; capturing the samples is the probe's business.

use super::snapshot::{ResourceDelta, ResourceSample};
use serde::{Deserialize, Serialize};

/// Ratio of delta to threshold at which a violation is graded High
pub const HIGH_SEVERITY_RATIO: f64 = 1.5;

/// Largest tolerated growth per metric
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeakThresholds {
    pub memory_mb: f64,
    pub file_handles: i64,
    pub processes: i64,
}

impl Default for LeakThresholds {
    fn default() -> Self {
        Self {
            memory_mb: 100.0,
            file_handles: 50,
            processes: 5,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LeakType {
    Memory,
    FileHandles,
    Processes,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Severity {
    Medium,
    High,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeakViolation {
    #[serde(rename = "type")]
    pub leak_type: LeakType,
    /// Growth since baseline
    pub current: f64,
    pub threshold: f64,
    pub severity: Severity,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeakReport {
    pub has_leaks: bool,
    pub leak_types: Vec<LeakType>,
    pub violations: Vec<LeakViolation>,
    pub summary: String,
    pub delta: ResourceDelta,
}

impl LeakReport {
    pub fn max_severity(&self) -> Option<Severity> {
        self.violations.iter().map(|v| v.severity).max()
    }

    /// Whether any violation reaches `severity`
    pub fn reaches(&self, severity: Severity) -> bool {
        self.max_severity().is_some_and(|s| s >= severity)
    }

    pub fn has(&self, leak_type: LeakType) -> bool {
        self.leak_types.contains(&leak_type)
    }
}

fn grade(delta: f64, threshold: f64) -> Severity {
    if delta >= threshold * HIGH_SEVERITY_RATIO {
        Severity::High
    } else {
        Severity::Medium
    }
}

/// Compare `current` against `baseline` and flag metrics whose growth exceeds its threshold
pub fn detect_leaks(
    baseline: &ResourceSample,
    current: &ResourceSample,
    thresholds: &LeakThresholds,
) -> LeakReport {
    let delta = ResourceDelta::between(baseline, current);
    let mut violations = Vec::new();

    if delta.memory_mb > thresholds.memory_mb {
        violations.push(LeakViolation {
            leak_type: LeakType::Memory,
            current: delta.memory_mb,
            threshold: thresholds.memory_mb,
            severity: grade(delta.memory_mb, thresholds.memory_mb),
        });
    }

    if delta.file_handles > thresholds.file_handles {
        violations.push(LeakViolation {
            leak_type: LeakType::FileHandles,
            current: delta.file_handles as f64,
            threshold: thresholds.file_handles as f64,
            severity: grade(delta.file_handles as f64, thresholds.file_handles as f64),
        });
    }

    // Leftover processes are always serious, whatever the margin
    if delta.process_count > thresholds.processes {
        violations.push(LeakViolation {
            leak_type: LeakType::Processes,
            current: delta.process_count as f64,
            threshold: thresholds.processes as f64,
            severity: Severity::High,
        });
    }

    let leak_types: Vec<LeakType> = violations.iter().map(|v| v.leak_type).collect();
    let summary = if violations.is_empty() {
        format!(
            "no leaks (memory {:+.1} MB, handles {:+}, processes {:+})",
            delta.memory_mb, delta.file_handles, delta.process_count
        )
    } else {
        let parts: Vec<String> = violations
            .iter()
            .map(|v| {
                format!(
                    "{:?} +{} over threshold {} ({:?})",
                    v.leak_type, v.current, v.threshold, v.severity
                )
            })
            .collect();
        format!("{} leak(s): {}", violations.len(), parts.join("; "))
    };

    LeakReport {
        has_leaks: !violations.is_empty(),
        leak_types,
        violations,
        summary,
        delta,
    }
}
