// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use ct_core::copy::temp_path_for;

#[test]
fn source_is_reproducible_per_seed() {
    let dir = tempfile::tempdir().unwrap();
    let fixture = RaceFixture::new(dir.path()).unwrap();
    let a = fixture.write_source(4096, 7).unwrap();
    let b = fixture.write_source(4096, 7).unwrap();
    let c = fixture.write_source(4096, 8).unwrap();
    assert_eq!(a, b);
    assert_ne!(a, c);
    assert_eq!(std::fs::metadata(&fixture.source).unwrap().len(), 4096);
}

#[test]
fn destinations_live_in_separate_dirs() {
    let dir = tempfile::tempdir().unwrap();
    let fixture = RaceFixture::new(dir.path()).unwrap();
    let dests = fixture.destinations("set", 3).unwrap();
    assert_eq!(dests.len(), 3);
    assert!(dests.iter().all(|d| d.parent().unwrap().is_dir()));
    assert_eq!(RaceFixture::census(&dests), 0);
}

#[test]
fn temp_files_and_mismatches_are_found() {
    let dir = tempfile::tempdir().unwrap();
    let fixture = RaceFixture::new(dir.path()).unwrap();
    let checksum = fixture.write_source(100, 1).unwrap();
    let dests = fixture.destinations("set", 2).unwrap();
    std::fs::copy(&fixture.source, &dests[0]).unwrap();
    std::fs::write(&dests[1], b"different").unwrap();
    std::fs::write(temp_path_for(&dests[1]), b"").unwrap();

    assert_eq!(RaceFixture::temp_files(&dests), vec![temp_path_for(&dests[1])]);
    assert_eq!(RaceFixture::mismatched(&dests, checksum), vec![dests[1].clone()]);
}

#[test]
fn barrier_spec_uses_fixture_dir() {
    let dir = tempfile::tempdir().unwrap();
    let fixture = FileLockingFixture::new(dir.path()).unwrap();
    let spec = fixture.barrier("b", 3, Duration::from_millis(1500), "w1");
    assert_eq!(spec.barrier_dir, fixture.barrier_dir);
    assert_eq!(spec.timeout_seconds, 1.5);
    assert!(fixture.store().is_ok());
}

#[tokio::test]
async fn wait_for_sees_late_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("late");
    let writer = {
        let path = path.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            std::fs::write(path, b"x").unwrap();
        })
    };
    assert!(RecoveryFixture::wait_for(&path, Duration::from_secs(5)).await);
    writer.await.unwrap();
    assert!(!RecoveryFixture::wait_for(&dir.path().join("never"), Duration::from_millis(30)).await);
}
