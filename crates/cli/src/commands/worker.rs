// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `ct worker '<json>'` - Execute one worker command and report on stdout

use crate::{logging, EXIT_FATAL};
use anyhow::{Context, Result};
use clap::Args;
use ct_engine::{execute, StopFlag, WorkerCommand};
use std::process::ExitCode;

#[derive(Args)]
pub struct WorkerArgs {
    /// Serialized worker command
    pub command: String,
}

pub async fn worker(args: WorkerArgs) -> Result<ExitCode> {
    let _guard = logging::init("warn", None)?;

    let command: WorkerCommand =
        serde_json::from_str(&args.command).context("invalid worker command")?;

    // Interrupt asks the worker to wind down and still report
    let stop = StopFlag::new();
    let flag = stop.clone();
    ctrlc::set_handler(move || flag.raise())?;

    let output = tokio::task::spawn_blocking(move || execute(&command, &stop)).await?;
    if let Some(report) = &output.report {
        println!("{}", serde_json::to_string(report)?);
    }

    let code = output
        .exit_code
        .and_then(|code| u8::try_from(code).ok())
        .unwrap_or(EXIT_FATAL);
    Ok(ExitCode::from(code))
}
