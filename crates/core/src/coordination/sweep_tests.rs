// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::clock::FakeClock;
use crate::coordination::lock::LockConfig;

#[test]
fn fresh_locks_survive_sweep() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.json.lock");
    FileLock::acquire(&path, &LockConfig::default())
        .unwrap()
        .abandon();

    let report = sweep_stale_locks(dir.path(), &SweepConfig::default(), &FakeClock::new());

    assert_eq!(report.scanned, 1);
    assert!(report.removed.is_empty());
    assert!(path.exists());
}

#[test]
fn locks_older_than_max_age_are_removed() {
    let dir = tempfile::tempdir().unwrap();
    let nested = dir.path().join("session").join("barriers");
    fs::create_dir_all(&nested).unwrap();
    let old = nested.join("b.barrier.json.lock");
    FileLock::acquire(&old, &LockConfig::default())
        .unwrap()
        .abandon();

    let clock = FakeClock::new();
    clock.advance(Duration::from_secs(60 * 60 + 5));
    let report = sweep_stale_locks(dir.path(), &SweepConfig::default(), &clock);

    assert_eq!(report.removed, vec![old.clone()]);
    assert!(!old.exists());
}

#[test]
fn non_lock_files_are_ignored() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("state.json"), "{}").unwrap();
    fs::write(dir.path().join("data.tmp"), "x").unwrap();

    let clock = FakeClock::new();
    clock.advance(Duration::from_secs(10 * 60 * 60));
    let report = sweep_stale_locks(dir.path(), &SweepConfig::default(), &clock);

    assert_eq!(report.scanned, 0);
    assert!(dir.path().join("state.json").exists());
}

#[test]
fn lock_without_record_falls_back_to_mtime() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("foreign.lock");
    fs::write(&path, b"").unwrap();

    let clock = FakeClock::new();
    assert!(lock_age(&path, clock.wall()).is_some());

    let config = SweepConfig::default().with_max_age(Duration::from_secs(30));
    clock.advance(Duration::from_secs(120));
    let report = sweep_stale_locks(dir.path(), &config, &clock);
    assert_eq!(report.removed.len(), 1);
}

#[test]
fn config_parses_humantime_age() {
    let config: SweepConfig = serde_json::from_str(r#"{"max_age": "90m"}"#).unwrap();
    assert_eq!(config.max_age, Duration::from_secs(90 * 60));
}
