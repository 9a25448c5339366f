// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::worker::EXIT_OK;
use serde_json::json;
use std::path::Path;
use std::time::Instant;

fn slow_write(path: &Path) -> WorkerCommand {
    WorkerCommand::SlowWrite {
        path: path.to_path_buf(),
        chunks: 10_000,
        chunk_size: 16,
        chunk_delay_ms: 50,
    }
}

#[cfg(unix)]
fn script(dir: &Path, name: &str, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;
    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

#[test]
fn parse_report_takes_last_json_line() {
    let stdout = "starting\n{\"ok\":false,\"message\":\"old\"}\n{\"ok\":true,\"message\":\"new\",\"data\":1}\n\n";
    let report = parse_report(stdout).unwrap();
    assert!(report.ok);
    assert_eq!(report.message, "new");
    assert_eq!(report.data, json!(1));
}

#[test]
fn parse_report_ignores_garbage() {
    assert!(parse_report("").is_none());
    assert!(parse_report("not json\n{broken").is_none());
    let report = parse_report("{\"ok\":true,\"message\":\"m\"}\ntrailing noise").unwrap();
    assert_eq!(report.data, serde_json::Value::Null);
}

#[test]
fn isolation_level_selects_mode() {
    let process = WorkerLauncher::for_isolation(IsolationLevel::Process, Some("/bin/ct".into()));
    assert!(process.is_process());
    let thread = WorkerLauncher::for_isolation(IsolationLevel::Thread, Some("/bin/ct".into()));
    assert_eq!(thread.mode(), &LaunchMode::Thread);
    let fallback = WorkerLauncher::for_isolation(IsolationLevel::Process, None);
    assert!(!fallback.is_process());
}

#[tokio::test]
async fn thread_worker_reports_back() {
    let dir = tempfile::tempdir().unwrap();
    let output = WorkerLauncher::thread()
        .run(&WorkerCommand::Increment {
            store_path: dir.path().join("s.json"),
            key: "n".into(),
            times: 2,
        })
        .await
        .unwrap();
    assert!(output.succeeded());
    assert_eq!(output.exit_code, Some(EXIT_OK));
    assert_eq!(output.data()["last"], json!(2));
}

#[tokio::test]
async fn thread_worker_is_stopped_on_timeout() {
    let dir = tempfile::tempdir().unwrap();
    let launcher = WorkerLauncher::thread().with_timeout(Duration::from_millis(100));
    let started = Instant::now();

    let err = launcher.run(&slow_write(&dir.path().join("f"))).await.unwrap_err();

    assert!(matches!(err, WorkerError::TimedOut { ref label, .. } if label == "slowWrite"));
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn run_all_keeps_command_order() {
    let dir = tempfile::tempdir().unwrap();
    let commands: Vec<_> = (0..3)
        .map(|i| WorkerCommand::SlowWrite {
            path: dir.path().join(format!("f{}", i)),
            chunks: i + 1,
            chunk_size: 10,
            chunk_delay_ms: 0,
        })
        .collect();
    let outputs = WorkerLauncher::thread().run_all(&commands).await.unwrap();
    let written: Vec<_> = outputs.iter().map(|o| o.data()["bytesWritten"].clone()).collect();
    assert_eq!(written, vec![json!(10), json!(20), json!(30)]);
}

#[tokio::test]
async fn kill_stops_thread_worker() {
    let dir = tempfile::tempdir().unwrap();
    let handle = WorkerLauncher::thread()
        .spawn(&slow_write(&dir.path().join("f")))
        .unwrap();
    assert!(handle.pid().is_none());
    handle.kill().await.unwrap();
}

#[tokio::test]
async fn abandoning_thread_holder_leaves_lock_behind() {
    let dir = tempfile::tempdir().unwrap();
    let lock_path = dir.path().join("held.lock");
    let handle = WorkerLauncher::thread()
        .spawn(&WorkerCommand::HoldLock {
            lock_path: lock_path.clone(),
            hold_ms: 30_000,
        })
        .unwrap();
    while !lock_path.exists() {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(handle.abandon(), None);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(lock_path.exists());
}

#[cfg(unix)]
#[tokio::test]
async fn process_worker_report_is_read_from_stdout() {
    let _guard = crate::test_support::process_guard().await;
    let dir = tempfile::tempdir().unwrap();
    let program = script(
        dir.path(),
        "fake-ct",
        r#"echo "log line"; echo '{"ok":true,"message":"done","data":{"n":7}}'"#,
    );
    let output = WorkerLauncher::process(program)
        .run(&WorkerCommand::HoldLock {
            lock_path: dir.path().join("unused.lock"),
            hold_ms: 0,
        })
        .await
        .unwrap();
    assert!(output.succeeded());
    assert_eq!(output.data()["n"], json!(7));
}

#[cfg(unix)]
#[tokio::test]
async fn process_worker_exit_code_is_kept() {
    let _guard = crate::test_support::process_guard().await;
    let dir = tempfile::tempdir().unwrap();
    let program = script(dir.path(), "fake-ct", "exit 3");
    let output = WorkerLauncher::process(program)
        .run(&WorkerCommand::HoldLock {
            lock_path: dir.path().join("unused.lock"),
            hold_ms: 0,
        })
        .await
        .unwrap();
    assert!(output.barrier_timed_out());
    assert!(output.report.is_none());
}

#[cfg(unix)]
#[tokio::test]
async fn process_worker_is_killed_on_timeout_and_untracked() {
    let _guard = crate::test_support::process_guard().await;
    let dir = tempfile::tempdir().unwrap();
    let program = script(dir.path(), "fake-ct", "exec sleep 30");
    let emergency = EmergencyCleanupManager::new();
    let launcher = WorkerLauncher::process(program)
        .with_timeout(Duration::from_millis(200))
        .with_emergency(emergency.clone());

    let handle = launcher
        .spawn(&WorkerCommand::HoldLock {
            lock_path: dir.path().join("unused.lock"),
            hold_ms: 0,
        })
        .unwrap();
    let pid = handle.pid().unwrap();
    assert_eq!(emergency.tracked_pids(), vec![pid]);

    let err = handle.wait().await.unwrap_err();
    assert!(matches!(err, WorkerError::TimedOut { .. }));
    assert!(emergency.tracked_pids().is_empty());
    assert!(!ct_core::process::is_alive(pid));
}

#[tokio::test]
async fn missing_program_is_a_spawn_error() {
    let dir = tempfile::tempdir().unwrap();
    let launcher = WorkerLauncher::process(dir.path().join("does-not-exist"));
    let err = launcher
        .run(&WorkerCommand::HoldLock {
            lock_path: dir.path().join("unused.lock"),
            hold_ms: 0,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, WorkerError::Spawn(_)));
}
