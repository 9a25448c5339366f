// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `ct worker` protocol: one JSON report on stdout, exit code by outcome

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(deprecated)]

mod common;

use common::{ct, ct_path, worker_report};
use serde_json::json;
use std::process::Stdio;

#[test]
fn increment_worker_reports_on_stdout() {
    let dir = tempfile::tempdir().unwrap();
    let store = dir.path().join("state.json");
    let command = json!({
        "kind": "increment",
        "storePath": store,
        "key": "counter",
        "times": 5,
    });

    let output = ct()
        .args(["worker", &command.to_string()])
        .assert()
        .success()
        .get_output()
        .clone();

    let report = worker_report(&output.stdout);
    assert_eq!(report["ok"], json!(true));
    assert_eq!(report["data"]["increments"], json!(5));
    assert_eq!(report["data"]["last"], json!(5));
}

#[test]
fn concurrent_worker_processes_lose_no_updates() {
    let dir = tempfile::tempdir().unwrap();
    let store = dir.path().join("state.json");
    let command = json!({
        "kind": "increment",
        "storePath": store,
        "key": "counter",
        "times": 10,
    })
    .to_string();

    let children: Vec<_> = (0..4)
        .map(|_| {
            std::process::Command::new(ct_path())
                .args(["worker", &command])
                .env("RUST_LOG", "warn")
                .stdout(Stdio::piped())
                .spawn()
                .unwrap()
        })
        .collect();
    for child in children {
        let output = child.wait_with_output().unwrap();
        assert!(output.status.success());
        assert_eq!(worker_report(&output.stdout)["ok"], json!(true));
    }

    let state: serde_json::Value =
        serde_json::from_slice(&std::fs::read(&store).unwrap()).unwrap();
    assert_eq!(state["data"]["counter"], json!(40));
}

#[test]
fn lone_barrier_party_exits_with_timeout_code() {
    let dir = tempfile::tempdir().unwrap();
    let command = json!({
        "kind": "barrier",
        "barrierDir": dir.path(),
        "barrierId": "lonely",
        "processCount": 2,
        "timeoutSeconds": 0.3,
        "processId": "p1",
    });

    let output = ct()
        .args(["worker", &command.to_string()])
        .assert()
        .code(3)
        .get_output()
        .clone();
    assert_eq!(worker_report(&output.stdout)["ok"], json!(false));
}

#[test]
fn malformed_worker_command_is_fatal() {
    ct().args(["worker", "{\"kind\":\"nope\"}"])
        .assert()
        .code(2)
        .stderr(predicates::str::contains("invalid worker command"));
}

#[test]
fn failing_worker_exits_one() {
    let dir = tempfile::tempdir().unwrap();
    let command = json!({
        "kind": "copy",
        "source": dir.path().join("missing.bin"),
        "destinations": [dir.path().join("a.bin")],
    });

    let output = ct()
        .args(["worker", &command.to_string()])
        .assert()
        .code(1)
        .get_output()
        .clone();
    assert_eq!(worker_report(&output.stdout)["ok"], json!(false));
}
