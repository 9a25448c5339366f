// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! ct - multi-process contention test harness

mod commands;
mod logging;
mod output;

use clap::{Parser, Subcommand};
use commands::{list, run, worker};
use std::process::ExitCode;

/// Exit code when at least one test failed
pub const EXIT_FAILED: u8 = 1;

/// Exit code for configuration errors and anything fatal before results exist
pub const EXIT_FATAL: u8 = 2;

#[derive(Parser)]
#[command(
    name = "ct",
    version,
    about = "Contention tests for file locks, shared state and atomic copies"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run catalog tests
    Run(run::RunArgs),
    /// List catalog categories and tests
    List(list::ListArgs),
    /// Execute one worker command (used by the harness itself)
    #[command(hide = true)]
    Worker(worker::WorkerArgs),
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run(args) => run::run(args).await,
        Commands::List(args) => list::list(args),
        Commands::Worker(args) => worker::worker(args).await,
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(error = %e, "fatal");
            eprintln!("Error: {:#}", e);
            ExitCode::from(EXIT_FATAL)
        }
    }
}
