// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Point-in-time resource usage

use crate::platform::Platform;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Raw measurements produced by a probe
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceSample {
    pub memory_mb: f64,
    pub file_handles: u64,
    pub process_count: u64,
    pub disk_space_mb: f64,
}

/// A labelled, timestamped sample
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceSnapshot {
    pub label: String,
    pub timestamp: DateTime<Utc>,
    pub memory_mb: f64,
    pub file_handles: u64,
    pub process_count: u64,
    pub disk_space_mb: f64,
    pub platform: Platform,
}

impl ResourceSnapshot {
    pub fn from_sample(
        label: impl Into<String>,
        timestamp: DateTime<Utc>,
        platform: Platform,
        sample: ResourceSample,
    ) -> Self {
        Self {
            label: label.into(),
            timestamp,
            memory_mb: sample.memory_mb,
            file_handles: sample.file_handles,
            process_count: sample.process_count,
            disk_space_mb: sample.disk_space_mb,
            platform,
        }
    }

    pub fn sample(&self) -> ResourceSample {
        ResourceSample {
            memory_mb: self.memory_mb,
            file_handles: self.file_handles,
            process_count: self.process_count,
            disk_space_mb: self.disk_space_mb,
        }
    }
}

/// `current - baseline` for every metric
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceDelta {
    pub memory_mb: f64,
    pub file_handles: i64,
    pub process_count: i64,
    pub disk_space_mb: f64,
}

impl ResourceDelta {
    pub fn between(baseline: &ResourceSample, current: &ResourceSample) -> Self {
        Self {
            memory_mb: current.memory_mb - baseline.memory_mb,
            file_handles: current.file_handles as i64 - baseline.file_handles as i64,
            process_count: current.process_count as i64 - baseline.process_count as i64,
            disk_space_mb: current.disk_space_mb - baseline.disk_space_mb,
        }
    }
}
