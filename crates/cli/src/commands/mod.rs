// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! CLI command implementations

pub mod list;
pub mod run;
pub mod worker;

/// Catalog read when `--catalog` is not given
pub const DEFAULT_CATALOG: &str = "ct-catalog.toml";
