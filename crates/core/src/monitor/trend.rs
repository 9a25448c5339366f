// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Trend classification over recent snapshots

use super::snapshot::ResourceSnapshot;
use serde::{Deserialize, Serialize};

/// Number of most recent snapshots considered
pub const TREND_WINDOW: usize = 5;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Trend {
    Stable,
    Increasing,
    Decreasing,
    RapidlyIncreasing,
    RapidlyDecreasing,
    InsufficientData,
}

/// Classify the relative change `(last - first) / first`
pub fn classify(first: f64, last: f64) -> Trend {
    if first == 0.0 {
        return if last == 0.0 {
            Trend::Stable
        } else if last > 0.0 {
            Trend::RapidlyIncreasing
        } else {
            Trend::RapidlyDecreasing
        };
    }
    let change = (last - first) / first.abs();
    let magnitude = change.abs();
    if magnitude < 0.05 {
        Trend::Stable
    } else if magnitude <= 0.20 {
        if change > 0.0 {
            Trend::Increasing
        } else {
            Trend::Decreasing
        }
    } else if change > 0.0 {
        Trend::RapidlyIncreasing
    } else {
        Trend::RapidlyDecreasing
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrendReport {
    pub samples: usize,
    pub memory: Trend,
    pub file_handles: Trend,
    pub processes: Trend,
    pub disk_space: Trend,
}

impl TrendReport {
    /// Any metric growing quickly
    pub fn is_concerning(&self) -> bool {
        [self.memory, self.file_handles, self.processes]
            .contains(&Trend::RapidlyIncreasing)
    }
}

/// Classify each metric across the last [`TREND_WINDOW`] snapshots of `history`
pub fn analyze_trends<'a>(
    history: impl DoubleEndedIterator<Item = &'a ResourceSnapshot>,
) -> TrendReport {
    let mut window: Vec<&ResourceSnapshot> = history.rev().take(TREND_WINDOW).collect();
    window.reverse();

    let (Some(first), Some(last)) = (window.first(), window.last()) else {
        return insufficient(window.len());
    };
    if window.len() < 2 {
        return insufficient(window.len());
    }

    TrendReport {
        samples: window.len(),
        memory: classify(first.memory_mb, last.memory_mb),
        file_handles: classify(first.file_handles as f64, last.file_handles as f64),
        processes: classify(first.process_count as f64, last.process_count as f64),
        disk_space: classify(first.disk_space_mb, last.disk_space_mb),
    }
}

fn insufficient(samples: usize) -> TrendReport {
    TrendReport {
        samples,
        memory: Trend::InsufficientData,
        file_handles: Trend::InsufficientData,
        processes: Trend::InsufficientData,
        disk_space: Trend::InsufficientData,
    }
}
