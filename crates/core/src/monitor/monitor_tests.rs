// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::clock::FakeClock;
use proptest::prelude::*;

fn sample(memory_mb: f64, file_handles: u64, process_count: u64) -> ResourceSample {
    ResourceSample {
        memory_mb,
        file_handles,
        process_count,
        disk_space_mb: 10_000.0,
    }
}

fn monitor(samples: Vec<ResourceSample>) -> ResourceMonitor<ScriptedProbe, FakeClock> {
    ResourceMonitor::new(
        ScriptedProbe::new(samples),
        FakeClock::new(),
        MonitorConfig::default(),
    )
}

#[test]
fn memory_growth_past_threshold_is_high_severity_leak() {
    let mut m = monitor(vec![sample(50.0, 20, 1), sample(200.0, 20, 1)]);
    m.start_monitoring().unwrap();

    let report = m.detect_leaks().unwrap();

    assert!(report.has_leaks);
    assert_eq!(report.leak_types, vec![LeakType::Memory]);
    assert_eq!(
        report.violations,
        vec![LeakViolation {
            leak_type: LeakType::Memory,
            current: 150.0,
            threshold: 100.0,
            severity: Severity::High,
        }]
    );
}

#[test]
fn modest_handle_growth_is_medium_severity() {
    let report = detect_leaks(
        &sample(10.0, 10, 1),
        &sample(10.0, 70, 1),
        &LeakThresholds::default(),
    );
    assert_eq!(report.violations.len(), 1);
    assert_eq!(report.violations[0].leak_type, LeakType::FileHandles);
    assert_eq!(report.violations[0].severity, Severity::Medium);
    assert!(report.reaches(Severity::Medium));
    assert!(!report.reaches(Severity::High));
}

#[test]
fn process_growth_is_always_high_severity() {
    let report = detect_leaks(
        &sample(10.0, 10, 1),
        &sample(10.0, 10, 7),
        &LeakThresholds::default(),
    );
    assert!(report.has(LeakType::Processes));
    assert_eq!(report.max_severity(), Some(Severity::High));
}

#[test]
fn growth_equal_to_threshold_is_not_a_leak() {
    let report = detect_leaks(
        &sample(0.0, 0, 0),
        &sample(100.0, 50, 5),
        &LeakThresholds::default(),
    );
    assert!(!report.has_leaks);
    assert!(report.summary.starts_with("no leaks"));
}

#[test]
fn shrinking_usage_is_not_a_leak() {
    let report = detect_leaks(
        &sample(500.0, 200, 9),
        &sample(100.0, 10, 1),
        &LeakThresholds::default(),
    );
    assert!(!report.has_leaks);
    assert_eq!(report.delta.process_count, -8);
}

#[test]
fn report_serializes_violation_type_field() {
    let report = detect_leaks(
        &sample(0.0, 0, 0),
        &sample(0.0, 0, 9),
        &LeakThresholds::default(),
    );
    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["hasLeaks"], true);
    assert_eq!(json["violations"][0]["type"], "Processes");
    assert_eq!(json["violations"][0]["severity"], "High");
}

#[test]
fn detect_leaks_without_baseline_fails() {
    let mut m = monitor(vec![sample(1.0, 1, 1)]);
    assert!(matches!(m.detect_leaks(), Err(MonitorError::NoBaseline)));
}

#[test]
fn start_and_stop_record_labelled_snapshots() {
    let mut m = monitor(vec![sample(1.0, 1, 1), sample(2.0, 2, 1)]);
    assert_eq!(m.stop_monitoring().unwrap(), None);

    let baseline = m.start_monitoring().unwrap();
    assert!(m.is_monitoring());
    let last = m.stop_monitoring().unwrap().unwrap();

    assert_eq!(baseline.label, "baseline");
    assert_eq!(last.label, "final");
    assert_eq!(last.memory_mb, 2.0);
    assert!(!m.is_monitoring());
    assert_eq!(m.history().len(), 2);
}

#[test]
fn history_evicts_oldest_beyond_capacity() {
    let mut m = ResourceMonitor::new(
        ScriptedProbe::new((0..10).map(|i| sample(i as f64, 0, 0))),
        FakeClock::new(),
        MonitorConfig {
            history_capacity: 3,
            ..MonitorConfig::default()
        },
    );
    for i in 0..10 {
        m.take_snapshot(&format!("s{}", i)).unwrap();
    }
    let labels: Vec<_> = m.history().iter().map(|s| s.label.as_str()).collect();
    assert_eq!(labels, vec!["s7", "s8", "s9"]);
}

#[yare::parameterized(
    flat = { 100.0, 102.0, Trend::Stable },
    slight_rise = { 100.0, 110.0, Trend::Increasing },
    boundary_rise = { 100.0, 120.0, Trend::Increasing },
    steep_rise = { 100.0, 150.0, Trend::RapidlyIncreasing },
    slight_fall = { 100.0, 90.0, Trend::Decreasing },
    steep_fall = { 100.0, 40.0, Trend::RapidlyDecreasing },
    zero_stays_zero = { 0.0, 0.0, Trend::Stable },
    growth_from_zero = { 0.0, 3.0, Trend::RapidlyIncreasing },
)]
fn classify_relative_change(first: f64, last: f64, expected: Trend) {
    assert_eq!(classify(first, last), expected);
}

#[test]
fn trends_use_last_five_snapshots_only() {
    // An early spike outside the window must not influence the result
    let mut samples = vec![sample(1.0, 10, 1)];
    samples.extend((0..5).map(|i| sample(100.0 + i as f64 * 10.0, 10, 1)));
    let mut m = monitor(samples);
    for i in 0..6 {
        m.take_snapshot(&format!("s{}", i)).unwrap();
    }

    let trends = m.analyze_trends();
    assert_eq!(trends.samples, TREND_WINDOW);
    assert_eq!(trends.memory, Trend::RapidlyIncreasing);
    assert_eq!(trends.file_handles, Trend::Stable);
    assert!(trends.is_concerning());
}

#[test]
fn single_snapshot_has_insufficient_data() {
    let mut m = monitor(vec![sample(1.0, 1, 1)]);
    m.take_snapshot("only").unwrap();
    assert_eq!(m.analyze_trends().memory, Trend::InsufficientData);
    assert_eq!(analyze_trends(std::iter::empty()).samples, 0);
}

#[test]
fn parses_vm_rss_line() {
    let status = "Name:\tct\nVmPeak:\t  9000 kB\nVmRSS:\t   2048 kB\nThreads:\t4\n";
    assert_eq!(parse_vm_rss_mb(status), Some(2.0));
    assert_eq!(parse_vm_rss_mb("Name:\tct\n"), None);
}

#[cfg(unix)]
#[test]
fn system_probe_samples_current_process() {
    let dir = tempfile::tempdir().unwrap();
    let probe = SystemProbe::current(dir.path());
    let s = probe.sample().unwrap();
    assert!(s.memory_mb > 0.0);
    assert!(s.file_handles > 0);
    assert!(s.process_count >= 1);
    assert!(s.disk_space_mb > 0.0);
}

fn arb_sample() -> impl Strategy<Value = ResourceSample> {
    (0.0..10_000.0f64, 0..10_000u64, 0..500u64, 0.0..1e6f64).prop_map(
        |(memory_mb, file_handles, process_count, disk_space_mb)| ResourceSample {
            memory_mb,
            file_handles,
            process_count,
            disk_space_mb,
        },
    )
}

proptest! {
    #[test]
    fn detection_is_a_pure_function(baseline in arb_sample(), current in arb_sample()) {
        let thresholds = LeakThresholds::default();
        let first = detect_leaks(&baseline, &current, &thresholds);
        let second = detect_leaks(&baseline, &current, &thresholds);
        prop_assert_eq!(first, second);
    }

    #[test]
    fn no_growth_never_leaks(s in arb_sample()) {
        let report = detect_leaks(&s, &s, &LeakThresholds::default());
        prop_assert!(!report.has_leaks);
    }

    #[test]
    fn classification_direction_follows_sign(first in 1.0..1e6f64, last in 0.0..1e6f64) {
        match classify(first, last) {
            Trend::Increasing | Trend::RapidlyIncreasing => prop_assert!(last > first),
            Trend::Decreasing | Trend::RapidlyDecreasing => prop_assert!(last < first),
            Trend::Stable => prop_assert!(((last - first) / first).abs() < 0.05),
            Trend::InsufficientData => prop_assert!(false),
        }
    }
}
