// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `ct run` - Run the whole catalog, one category or one test

use super::DEFAULT_CATALOG;
use crate::output::{self, OutputFormat};
use crate::{logging, EXIT_FAILED, EXIT_FATAL};
use anyhow::{Context, Result};
use clap::Args;
use ct_catalog::load_catalog;
use ct_engine::{ContentionTestOrchestrator, TestRegistry};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Args)]
pub struct RunArgs {
    /// Catalog file (TOML, or JSON with a .json extension)
    #[arg(long, short = 'c', default_value = DEFAULT_CATALOG)]
    pub catalog: PathBuf,

    /// Run only this category, even if it is disabled
    #[arg(long, conflicts_with = "test")]
    pub category: Option<String>,

    /// Run only this test id
    #[arg(long)]
    pub test: Option<String>,

    /// Output format for the results
    #[arg(long, short = 'o', value_enum, default_value_t = OutputFormat::Text)]
    pub output: OutputFormat,

    /// Also write the JSON results to this file
    #[arg(long)]
    pub report: Option<PathBuf>,

    /// Write logs to this file instead of stderr
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// Parent of per-test work dirs, overriding the catalog's workRoot
    #[arg(long)]
    pub work_root: Option<PathBuf>,
}

pub async fn run(args: RunArgs) -> Result<ExitCode> {
    let _guard = logging::init("info", args.log_file.as_deref())?;

    let mut catalog = load_catalog(&args.catalog)?;
    if let Some(root) = args.work_root {
        catalog.settings = catalog.settings.with_work_root(root);
    }
    let program = std::env::current_exe().context("failed to locate the ct executable")?;
    let orchestrator = ContentionTestOrchestrator::new(catalog, TestRegistry::builtin())?
        .with_worker_program(program);

    let emergency = orchestrator.emergency();
    ctrlc::set_handler(move || {
        eprintln!("\nInterrupted, cleaning up...");
        let report = emergency.run("interrupted");
        tracing::warn!(
            processes = report.processes_killed.len(),
            directories = report.directories_removed.len(),
            failures = report.failures.len(),
            "interrupted run cleaned up"
        );
        std::process::exit(i32::from(EXIT_FATAL));
    })?;

    let result = match (args.category, args.test) {
        (Some(name), _) => orchestrator.run_category(&name).await?,
        (None, Some(id)) => orchestrator.run_test(&id).await?,
        (None, None) => orchestrator.run_all().await,
    };

    if let Some(path) = &args.report {
        output::write_json(&result, path)?;
    }
    output::print_harness(&result, args.output);

    tracing::info!(
        execution_id = %result.execution_id,
        total = result.total_tests(),
        failed = result.failed_tests(),
        "run finished"
    );
    Ok(if result.success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(EXIT_FAILED)
    })
}
