// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use rand::rngs::mock::StepRng;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn fast_config() -> LockConfig {
    LockConfig::new(5, Duration::from_millis(1)).with_max_backoff(Duration::from_millis(4))
}

#[test]
fn acquire_creates_lock_file_with_owner_record() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.json.lock");

    let handle = FileLock::acquire(&path, &fast_config()).unwrap();

    assert!(path.exists());
    assert_eq!(handle.owner_process_id(), std::process::id());
    let record = FileLock::read_record(&path).unwrap();
    assert_eq!(record.owner_process_id, std::process::id());
    assert_eq!(record.acquired_at, handle.acquired_at());
}

#[test]
fn held_lock_is_unavailable_to_second_acquirer() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("a.lock");
    let _held = FileLock::acquire(&path, &fast_config()).unwrap();

    let err = FileLock::acquire(&path, &fast_config()).unwrap_err();
    assert!(matches!(err, LockError::Unavailable { attempts: 5, .. }));
}

#[test]
fn release_deletes_lock_file_and_allows_reacquire() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("a.lock");

    FileLock::acquire(&path, &fast_config()).unwrap().release();
    assert!(!path.exists());

    let again = FileLock::acquire(&path, &fast_config());
    assert!(again.is_ok());
}

#[test]
fn dropping_handle_releases_lock() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("a.lock");
    {
        let _handle = FileLock::acquire(&path, &fast_config()).unwrap();
        assert!(path.exists());
    }
    assert!(!path.exists());
}

#[test]
fn release_tolerates_already_removed_lock_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("a.lock");
    let handle = FileLock::acquire(&path, &fast_config()).unwrap();
    fs::remove_file(&path).unwrap();

    handle.release();
    assert!(!path.exists());
}

#[test]
fn abandoned_handle_leaves_lock_file_behind() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("a.lock");
    FileLock::acquire(&path, &fast_config()).unwrap().abandon();

    assert!(path.exists());
    assert!(FileLock::try_acquire(&path).unwrap().is_none());
}

#[test]
fn missing_parent_directory_is_io_error_not_contention() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("missing").join("a.lock");

    let err = FileLock::acquire(&path, &fast_config()).unwrap_err();
    assert!(matches!(err, LockError::Io { .. }));
}

#[cfg(unix)]
#[test]
fn unwritable_directory_is_io_error_not_contention() {
    use std::os::unix::fs::PermissionsExt;

    let dir = tempfile::tempdir().unwrap();
    let locked_dir = dir.path().join("readonly");
    fs::create_dir(&locked_dir).unwrap();
    fs::set_permissions(&locked_dir, fs::Permissions::from_mode(0o555)).unwrap();

    // Root ignores directory modes; nothing to observe then
    let writable = fs::write(locked_dir.join("canary"), b"x").is_ok();
    let result = FileLock::try_acquire(&locked_dir.join("a.lock"));

    fs::set_permissions(&locked_dir, fs::Permissions::from_mode(0o755)).unwrap();
    if writable {
        return;
    }
    assert!(matches!(result, Err(LockError::Io { .. })));
}

#[test]
fn lock_path_appends_suffix() {
    let path = lock_path_for(Path::new("/tmp/session/state.json"));
    assert_eq!(path, PathBuf::from("/tmp/session/state.json.lock"));
}

#[yare::parameterized(
    first_retry = { 0, 10 },
    second_retry = { 1, 20 },
    fourth_retry = { 3, 80 },
    capped = { 5, 200 },
    far_past_cap = { 40, 200 },
)]
fn backoff_doubles_until_cap(attempt: u32, expected_ms: u64) {
    let config = LockConfig::default();
    assert_eq!(config.backoff(attempt), Duration::from_millis(expected_ms));
}

#[test]
fn delay_jitter_stays_within_half_backoff() {
    let config = LockConfig::default();
    let mut rng = rand::thread_rng();
    for attempt in 0..8 {
        let backoff = config.backoff(attempt);
        for _ in 0..50 {
            let delay = config.delay(attempt, &mut rng);
            assert!(delay >= backoff);
            assert!(delay <= backoff + backoff / 2);
        }
    }
}

#[test]
fn delay_without_jitter_equals_backoff() {
    let config = LockConfig::default();
    let mut rng = StepRng::new(0, 0);
    assert_eq!(config.delay(2, &mut rng), config.backoff(2));
}

#[test]
fn timeout_cuts_retry_budget_short() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("a.lock");
    let _held = FileLock::acquire(&path, &fast_config()).unwrap();

    let config = LockConfig::new(1_000, Duration::from_millis(50))
        .with_max_backoff(Duration::from_millis(200))
        .with_timeout(Duration::from_millis(120));
    let started = Instant::now();
    let result = FileLock::acquire(&path, &config);

    assert!(result.is_err());
    assert!(started.elapsed() < Duration::from_secs(2));
}

#[test]
fn contending_threads_never_overlap_inside_lock() {
    let dir = tempfile::tempdir().unwrap();
    let path = Arc::new(dir.path().join("a.lock"));
    let inside = Arc::new(AtomicUsize::new(0));
    let overlaps = Arc::new(AtomicUsize::new(0));
    let config = LockConfig::new(500, Duration::from_millis(1))
        .with_max_backoff(Duration::from_millis(5));

    let threads: Vec<_> = (0..4)
        .map(|_| {
            let path = Arc::clone(&path);
            let inside = Arc::clone(&inside);
            let overlaps = Arc::clone(&overlaps);
            let config = config.clone();
            std::thread::spawn(move || {
                for _ in 0..10 {
                    let handle = FileLock::acquire(&path, &config).unwrap();
                    if inside.fetch_add(1, Ordering::SeqCst) != 0 {
                        overlaps.fetch_add(1, Ordering::SeqCst);
                    }
                    std::thread::sleep(Duration::from_micros(200));
                    inside.fetch_sub(1, Ordering::SeqCst);
                    handle.release();
                }
            })
        })
        .collect();
    for t in threads {
        t.join().unwrap();
    }

    assert_eq!(overlaps.load(Ordering::SeqCst), 0);
}
