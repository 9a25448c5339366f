// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared helpers for `ct` integration tests

#![allow(dead_code)]

use assert_cmd::Command;
use serde_json::Value;
use std::path::{Path, PathBuf};

/// A `ct` invocation with logging kept quiet
pub fn ct() -> Command {
    let mut cmd = Command::cargo_bin("ct").expect("ct binary is built");
    cmd.env("RUST_LOG", "warn");
    cmd
}

/// Path to the `ct` binary for spawning several at once
pub fn ct_path() -> PathBuf {
    assert_cmd::cargo::cargo_bin("ct")
}

/// Write `content` as `catalog.toml` under `dir`
pub fn write_catalog(dir: &Path, content: &str) -> PathBuf {
    let path = dir.join("catalog.toml");
    std::fs::write(&path, content).expect("write catalog");
    path
}

/// A single-category catalog
pub fn catalog_with(name: &str, tests: &[&str], isolation: &str, timeout_seconds: u64) -> String {
    let tests: Vec<String> = tests.iter().map(|t| format!("\"{}\"", t)).collect();
    format!(
        "[[category]]\nname = \"{}\"\ntests = [{}]\nisolationLevel = \"{}\"\ntimeoutSeconds = {}\n",
        name,
        tests.join(", "),
        isolation,
        timeout_seconds
    )
}

/// Parse a JSON document written by `ct run --report`
pub fn read_report(path: &Path) -> Value {
    let text = std::fs::read_to_string(path).expect("read report");
    serde_json::from_str(&text).expect("report is JSON")
}

/// Parse the single report line a worker prints
pub fn worker_report(stdout: &[u8]) -> Value {
    let text = String::from_utf8_lossy(stdout);
    let line = text
        .lines()
        .rev()
        .find(|l| !l.trim().is_empty())
        .expect("worker printed a report");
    serde_json::from_str(line).expect("report is JSON")
}
