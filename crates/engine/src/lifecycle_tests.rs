// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use ct_core::clock::FakeClock;
use yare::parameterized;

fn at(phase: TestPhase) -> TestLifecycle {
    let mut lifecycle = TestLifecycle::new("FL-001");
    lifecycle.phase = phase;
    lifecycle
}

#[test]
fn happy_path_records_duration() {
    let clock = FakeClock::new();
    let mut lifecycle = TestLifecycle::new("FL-001");
    lifecycle.advance(TestPhase::Initializing, &clock).unwrap();
    lifecycle.advance(TestPhase::Running, &clock).unwrap();
    clock.advance(Duration::from_millis(250));
    lifecycle
        .advance(TestPhase::Completed { passed: true }, &clock)
        .unwrap();
    lifecycle.advance(TestPhase::CleanedUp, &clock).unwrap();

    assert_eq!(lifecycle.phase(), TestPhase::CleanedUp);
    assert_eq!(lifecycle.duration(), Some(Duration::from_millis(250)));
}

#[test]
fn duration_is_unknown_before_completion() {
    let clock = FakeClock::new();
    let mut lifecycle = TestLifecycle::new("FL-001");
    lifecycle.advance(TestPhase::Initializing, &clock).unwrap();
    assert_eq!(lifecycle.duration(), None);
}

#[parameterized(
    created_to_init = { TestPhase::Created, TestPhase::Initializing },
    init_to_running = { TestPhase::Initializing, TestPhase::Running },
    init_failed = { TestPhase::Initializing, TestPhase::Completed { passed: false } },
    running_passed = { TestPhase::Running, TestPhase::Completed { passed: true } },
    running_failed = { TestPhase::Running, TestPhase::Completed { passed: false } },
    cleanup_after_init = { TestPhase::Initializing, TestPhase::CleanedUp },
    cleanup_after_run = { TestPhase::Running, TestPhase::CleanedUp },
    cleanup_after_done = { TestPhase::Completed { passed: true }, TestPhase::CleanedUp },
)]
fn allowed(from: TestPhase, to: TestPhase) {
    assert!(at(from).advance(to, &FakeClock::new()).is_ok());
}

#[parameterized(
    skip_init = { TestPhase::Created, TestPhase::Running },
    cleanup_unstarted = { TestPhase::Created, TestPhase::CleanedUp },
    init_passed = { TestPhase::Initializing, TestPhase::Completed { passed: true } },
    rerun = { TestPhase::Completed { passed: false }, TestPhase::Running },
    after_cleanup = { TestPhase::CleanedUp, TestPhase::Initializing },
    double_cleanup = { TestPhase::CleanedUp, TestPhase::CleanedUp },
)]
fn rejected(from: TestPhase, to: TestPhase) {
    let mut lifecycle = at(from);
    let err = lifecycle.advance(to, &FakeClock::new()).unwrap_err();
    assert_eq!(
        err,
        LifecycleError::InvalidTransition {
            test_id: "FL-001".to_string(),
            from,
            to,
        }
    );
    assert_eq!(lifecycle.phase(), from);
}

#[test]
fn phase_names() {
    assert_eq!(TestPhase::Completed { passed: false }.to_string(), "failed");
    assert_eq!(TestPhase::CleanedUp.to_string(), "cleaned up");
}
