// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Catalog definitions

use crate::settings::HarnessSettings;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How a category's workers are run
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum IsolationLevel {
    /// Each worker is a separate OS process
    #[default]
    Process,
    /// Workers run on threads inside the harness
    Thread,
}

/// A named group of tests sharing execution settings
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Category {
    pub name: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    pub tests: Vec<String>,
    #[serde(default)]
    pub isolation_level: IsolationLevel,
    pub timeout_seconds: u64,
    #[serde(default)]
    pub default_retries: u32,
}

fn default_enabled() -> bool {
    true
}

impl Category {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    pub fn contains(&self, test_id: &str) -> bool {
        self.tests.iter().any(|t| t == test_id)
    }
}

/// A validated test catalog; categories keep document order
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Catalog {
    #[serde(rename = "category", alias = "categories", default)]
    pub categories: Vec<Category>,
    #[serde(default)]
    pub settings: HarnessSettings,
}

impl Catalog {
    pub fn category(&self, name: &str) -> Option<&Category> {
        self.categories.iter().find(|c| c.name == name)
    }

    pub fn enabled_categories(&self) -> impl Iterator<Item = &Category> {
        self.categories.iter().filter(|c| c.enabled)
    }

    /// The first enabled category listing `test_id`, else the first listing it at all
    pub fn find_test(&self, test_id: &str) -> Option<&Category> {
        self.enabled_categories()
            .find(|c| c.contains(test_id))
            .or_else(|| self.categories.iter().find(|c| c.contains(test_id)))
    }

    /// Every test id in document order, duplicates removed
    pub fn test_ids(&self) -> Vec<&str> {
        let mut seen = std::collections::HashSet::new();
        self.categories
            .iter()
            .flat_map(|c| c.tests.iter())
            .filter(|t| seen.insert(t.as_str()))
            .map(String::as_str)
            .collect()
    }
}

#[cfg(test)]
#[path = "catalog_tests.rs"]
mod tests;
