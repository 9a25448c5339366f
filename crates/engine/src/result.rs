// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Test, suite and harness results
//!
//! Only [`TestResult`] carries a verdict. Suite and harness counts and
//! success are computed from the tests they contain, including when
//! serialized, so they can never disagree with them.

use chrono::{DateTime, Utc};
use ct_core::monitor::{LeakReport, ResourceSnapshot, TrendReport};
use ct_core::platform::Platform;
use serde::{Serialize, Serializer};
use serde_json::Value;

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TestResult {
    pub test_id: String,
    pub description: String,
    pub success: bool,
    pub message: String,
    /// Test-specific measurements
    pub details: Value,
    pub attempts: u32,
    pub duration_ms: u64,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub leak_report: Option<LeakReport>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub orphans_killed: Vec<u32>,
}

impl TestResult {
    pub fn failed(&self) -> bool {
        !self.success
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct TestSuiteResult {
    pub category: String,
    pub tests: Vec<TestResult>,
    pub duration_ms: u64,
}

impl TestSuiteResult {
    pub fn new(category: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            tests: Vec::new(),
            duration_ms: 0,
        }
    }

    pub fn total(&self) -> usize {
        self.tests.len()
    }

    pub fn passed(&self) -> usize {
        self.tests.iter().filter(|t| t.success).count()
    }

    pub fn failed(&self) -> usize {
        self.total() - self.passed()
    }

    pub fn success(&self) -> bool {
        self.tests.iter().all(|t| t.success)
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SuiteView<'a> {
    category: &'a str,
    success: bool,
    total_tests: usize,
    passed_tests: usize,
    failed_tests: usize,
    duration_ms: u64,
    test_results: &'a [TestResult],
}

impl Serialize for TestSuiteResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        SuiteView {
            category: &self.category,
            success: self.success(),
            total_tests: self.total(),
            passed_tests: self.passed(),
            failed_tests: self.failed(),
            duration_ms: self.duration_ms,
            test_results: &self.tests,
        }
        .serialize(serializer)
    }
}

/// Harness-wide resource picture
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemMetrics {
    pub platform: Platform,
    pub baseline: Option<ResourceSnapshot>,
    #[serde(rename = "final")]
    pub final_snapshot: Option<ResourceSnapshot>,
    pub leak_report: Option<LeakReport>,
    pub trends: Option<TrendReport>,
    pub emergency_cleanups: usize,
    pub stale_locks_removed: usize,
}

impl SystemMetrics {
    pub fn new(platform: Platform) -> Self {
        Self {
            platform,
            baseline: None,
            final_snapshot: None,
            leak_report: None,
            trends: None,
            emergency_cleanups: 0,
            stale_locks_removed: 0,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct HarnessResult {
    pub execution_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub suites: Vec<TestSuiteResult>,
    pub system_metrics: SystemMetrics,
}

impl HarnessResult {
    pub fn total_tests(&self) -> usize {
        self.suites.iter().map(TestSuiteResult::total).sum()
    }

    pub fn passed_tests(&self) -> usize {
        self.suites.iter().map(TestSuiteResult::passed).sum()
    }

    pub fn failed_tests(&self) -> usize {
        self.suites.iter().map(TestSuiteResult::failed).sum()
    }

    pub fn success(&self) -> bool {
        self.suites.iter().all(TestSuiteResult::success)
    }

    /// Every test result across suites
    pub fn tests(&self) -> impl Iterator<Item = &TestResult> {
        self.suites.iter().flat_map(|s| s.tests.iter())
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HarnessView<'a> {
    execution_id: &'a str,
    success: bool,
    started_at: DateTime<Utc>,
    finished_at: DateTime<Utc>,
    total_suites: usize,
    total_tests: usize,
    passed_tests: usize,
    failed_tests: usize,
    suite_results: &'a [TestSuiteResult],
    system_metrics: &'a SystemMetrics,
}

impl Serialize for HarnessResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        HarnessView {
            execution_id: &self.execution_id,
            success: self.success(),
            started_at: self.started_at,
            finished_at: self.finished_at,
            total_suites: self.suites.len(),
            total_tests: self.total_tests(),
            passed_tests: self.passed_tests(),
            failed_tests: self.failed_tests(),
            suite_results: &self.suites,
            system_metrics: &self.system_metrics,
        }
        .serialize(serializer)
    }
}

#[cfg(test)]
#[path = "result_tests.rs"]
mod tests;
