// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `ct list` - Show what a catalog would run

use super::DEFAULT_CATALOG;
use crate::logging;
use crate::output::{self, OutputFormat};
use anyhow::Result;
use clap::Args;
use ct_catalog::{load_catalog, Category, IsolationLevel};
use ct_engine::TestRegistry;
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Args)]
pub struct ListArgs {
    /// Catalog file (TOML, or JSON with a .json extension)
    #[arg(long, short = 'c', default_value = DEFAULT_CATALOG)]
    pub catalog: PathBuf,

    /// Output format
    #[arg(long, short = 'o', value_enum, default_value_t = OutputFormat::Text)]
    pub output: OutputFormat,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryListing {
    name: String,
    enabled: bool,
    isolation_level: IsolationLevel,
    timeout_seconds: u64,
    default_retries: u32,
    tests: Vec<TestListing>,
}

#[derive(Serialize)]
pub struct TestListing {
    id: String,
    description: String,
}

impl CategoryListing {
    fn new(category: &Category, registry: &TestRegistry) -> Self {
        Self {
            name: category.name.clone(),
            enabled: category.enabled,
            isolation_level: category.isolation_level,
            timeout_seconds: category.timeout_seconds,
            default_retries: category.default_retries,
            tests: category
                .tests
                .iter()
                .map(|id| TestListing {
                    id: id.clone(),
                    description: registry
                        .get(id)
                        .map(|kind| kind.description().to_string())
                        .unwrap_or_default(),
                })
                .collect(),
        }
    }
}

impl fmt::Display for CategoryListing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({:?}, timeout {}s, retries {}){}",
            self.name,
            self.isolation_level,
            self.timeout_seconds,
            self.default_retries,
            if self.enabled { "" } else { " [disabled]" }
        )?;
        for test in &self.tests {
            write!(f, "\n  {:<8} {}", test.id, test.description)?;
        }
        Ok(())
    }
}

pub fn list(args: ListArgs) -> Result<ExitCode> {
    let _guard = logging::init("warn", None)?;

    let catalog = load_catalog(&args.catalog)?;
    let registry = TestRegistry::builtin();
    catalog.validate_known(|id| registry.contains(id))?;

    let listings: Vec<_> = catalog
        .categories
        .iter()
        .map(|category| CategoryListing::new(category, &registry))
        .collect();
    output::print_list(&listings, args.output);
    Ok(ExitCode::SUCCESS)
}
