// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use serde_json::json;

fn test_result(id: &str, success: bool) -> TestResult {
    TestResult {
        test_id: id.to_string(),
        description: String::new(),
        success,
        message: if success { "ok" } else { "boom" }.to_string(),
        details: Value::Null,
        attempts: 1,
        duration_ms: 5,
        started_at: Utc::now(),
        leak_report: None,
        orphans_killed: Vec::new(),
    }
}

fn suite(category: &str, verdicts: &[bool]) -> TestSuiteResult {
    let mut suite = TestSuiteResult::new(category);
    suite.tests = verdicts
        .iter()
        .enumerate()
        .map(|(i, ok)| test_result(&format!("FL-{:03}", i + 1), *ok))
        .collect();
    suite
}

fn harness(suites: Vec<TestSuiteResult>) -> HarnessResult {
    HarnessResult {
        execution_id: "exec-1".to_string(),
        started_at: Utc::now(),
        finished_at: Utc::now(),
        suites,
        system_metrics: SystemMetrics::new(Platform::Linux),
    }
}

#[test]
fn suite_counts_follow_tests() {
    let suite = suite("locking", &[true, false, true]);
    assert_eq!(suite.total(), 3);
    assert_eq!(suite.passed(), 2);
    assert_eq!(suite.failed(), 1);
    assert!(!suite.success());
}

#[test]
fn empty_suite_succeeds() {
    assert!(TestSuiteResult::new("empty").success());
}

#[test]
fn harness_fails_if_any_suite_fails() {
    let result = harness(vec![suite("a", &[true, true]), suite("b", &[false])]);
    assert_eq!(result.total_tests(), 3);
    assert_eq!(result.passed_tests(), 2);
    assert_eq!(result.failed_tests(), 1);
    assert!(!result.success());
    assert_eq!(result.tests().filter(|t| t.failed()).count(), 1);
}

#[test]
fn harness_document_shape() {
    let result = harness(vec![suite("locking", &[true, false])]);
    let doc = serde_json::to_value(&result).unwrap();

    assert_eq!(doc["executionId"], json!("exec-1"));
    assert_eq!(doc["success"], json!(false));
    assert_eq!(doc["totalSuites"], json!(1));
    assert_eq!(doc["totalTests"], json!(2));
    assert_eq!(doc["passedTests"], json!(1));
    assert_eq!(doc["failedTests"], json!(1));

    let suite = &doc["suiteResults"][0];
    assert_eq!(suite["category"], json!("locking"));
    assert_eq!(suite["success"], json!(false));
    assert_eq!(suite["testResults"][1]["testId"], json!("FL-002"));
    assert!(suite["testResults"][0].get("leakReport").is_none());

    let metrics = &doc["systemMetrics"];
    assert_eq!(metrics["platform"], json!("Linux"));
    assert!(metrics.get("final").is_some());
    assert_eq!(metrics["emergencyCleanups"], json!(0));
}

#[test]
fn orphans_are_serialized_when_present() {
    let mut result = test_result("RV-001", false);
    result.orphans_killed = vec![4242];
    let doc = serde_json::to_value(&result).unwrap();
    assert_eq!(doc["orphansKilled"], json!([4242]));
}
