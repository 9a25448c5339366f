// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn system_clock_returns_increasing_time() {
    let clock = SystemClock;
    let t1 = clock.now();
    std::thread::sleep(Duration::from_millis(1));
    let t2 = clock.now();
    assert!(t2 > t1);
}

#[test]
fn fake_clock_advances_monotonic_and_wall_together() {
    let clock = FakeClock::new();
    let (t1, w1) = (clock.now(), clock.wall());
    clock.advance(Duration::from_secs(60));
    assert!(clock.now().duration_since(t1) >= Duration::from_secs(60));
    assert_eq!((clock.wall() - w1).num_seconds(), 60);
}

#[test]
fn fake_clock_is_cloneable_and_shared() {
    let clock1 = FakeClock::new();
    let clock2 = clock1.clone();
    let w1 = clock1.wall();
    clock2.advance(Duration::from_secs(30));
    assert_eq!((clock1.wall() - w1).num_seconds(), 30);
}

#[test]
fn fake_clock_wall_can_be_pinned() {
    let clock = FakeClock::new();
    let pinned = Utc::now() - chrono::Duration::hours(3);
    clock.set_wall(pinned);
    assert_eq!(clock.wall(), pinned);
}
