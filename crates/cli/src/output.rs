// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Output formatting for CLI commands

use anyhow::{Context, Result};
use clap::ValueEnum;
use ct_engine::{HarnessResult, TestResult};
use serde::Serialize;
use std::fmt;
use std::path::Path;

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

/// Print a list of items
pub fn print_list<T: Serialize + fmt::Display>(items: &[T], format: OutputFormat) {
    match format {
        OutputFormat::Text => {
            for item in items {
                println!("{}", item);
            }
        }
        OutputFormat::Json => {
            if let Ok(json) = serde_json::to_string_pretty(items) {
                println!("{}", json);
            }
        }
    }
}

/// Print harness results in the specified format
pub fn print_harness(result: &HarnessResult, format: OutputFormat) {
    match format {
        OutputFormat::Text => print!("{}", Summary(result)),
        OutputFormat::Json => {
            if let Ok(json) = serde_json::to_string_pretty(result) {
                println!("{}", json);
            }
        }
    }
}

/// Write harness results as pretty JSON
pub fn write_json(result: &HarnessResult, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let json = serde_json::to_string_pretty(result)?;
    std::fs::write(path, json).with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}

struct Summary<'a>(&'a HarnessResult);

impl fmt::Display for Summary<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let result = self.0;
        for suite in &result.suites {
            writeln!(
                f,
                "{}: {}/{} passed ({} ms)",
                suite.category,
                suite.passed(),
                suite.total(),
                suite.duration_ms
            )?;
            for test in &suite.tests {
                writeln!(f, "  {}", Line(test))?;
            }
        }
        let metrics = &result.system_metrics;
        if let Some(leaks) = metrics.leak_report.as_ref().filter(|r| r.has_leaks) {
            writeln!(f, "harness leaks: {}", leaks.summary)?;
        }
        if metrics.emergency_cleanups > 0 {
            writeln!(f, "emergency cleanups: {}", metrics.emergency_cleanups)?;
        }
        writeln!(
            f,
            "{}: {} tests, {} passed, {} failed",
            if result.success() { "PASSED" } else { "FAILED" },
            result.total_tests(),
            result.passed_tests(),
            result.failed_tests()
        )
    }
}

struct Line<'a>(&'a TestResult);

impl fmt::Display for Line<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let test = self.0;
        write!(
            f,
            "{} {:<8} {} ({} ms",
            if test.success { "PASS" } else { "FAIL" },
            test.test_id,
            test.message,
            test.duration_ms
        )?;
        if test.attempts > 1 {
            write!(f, ", {} attempts", test.attempts)?;
        }
        write!(f, ")")
    }
}
