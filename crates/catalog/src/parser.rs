// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Catalog parsing and validation
//!
//! Any problem found here aborts the run before a single test executes.

use crate::catalog::Catalog;
use regex::Regex;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use thiserror::Error;

/// Shape every test id must have, e.g. `FL-001`
pub const TEST_ID_PATTERN: &str = r"^[A-Z]{2,4}-\d{3}$";

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("catalog not found: {0}")]
    Missing(PathBuf),
    #[error("failed to read catalog {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("catalog defines no categories")]
    Empty,
    #[error("duplicate category: {0}")]
    DuplicateCategory(String),
    #[error("category {category}: {message}")]
    InvalidCategory { category: String, message: String },
    #[error("category {category}: malformed test id {test_id:?}")]
    MalformedTestId { category: String, test_id: String },
    #[error("category {category}: unknown test {test_id}")]
    UnknownTest { category: String, test_id: String },
    #[error("invalid settings: {0}")]
    InvalidSettings(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CatalogFormat {
    Toml,
    Json,
}

impl CatalogFormat {
    /// JSON for a `.json` extension, TOML otherwise
    pub fn for_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => CatalogFormat::Json,
            _ => CatalogFormat::Toml,
        }
    }
}

#[allow(clippy::expect_used)]
static TEST_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(TEST_ID_PATTERN).expect("constant regex pattern is valid"));

/// Read, parse and structurally validate a catalog file
pub fn load_catalog(path: &Path) -> Result<Catalog, CatalogError> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(CatalogError::Missing(path.to_path_buf()))
        }
        Err(source) => {
            return Err(CatalogError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    };
    let catalog = parse_catalog(&content, CatalogFormat::for_path(path))?;
    tracing::info!(
        path = %path.display(),
        categories = catalog.categories.len(),
        tests = catalog.test_ids().len(),
        "loaded test catalog"
    );
    Ok(catalog)
}

/// Parse and structurally validate catalog content
pub fn parse_catalog(content: &str, format: CatalogFormat) -> Result<Catalog, CatalogError> {
    let catalog: Catalog = match format {
        CatalogFormat::Toml => toml::from_str(content)?,
        CatalogFormat::Json => serde_json::from_str(content)?,
    };
    validate_structure(&catalog)?;
    Ok(catalog)
}

fn validate_structure(catalog: &Catalog) -> Result<(), CatalogError> {
    if catalog.categories.is_empty() {
        return Err(CatalogError::Empty);
    }

    let mut names = HashSet::new();
    for category in &catalog.categories {
        if category.name.trim().is_empty() {
            return Err(CatalogError::InvalidCategory {
                category: category.name.clone(),
                message: "name is empty".to_string(),
            });
        }
        if !names.insert(category.name.as_str()) {
            return Err(CatalogError::DuplicateCategory(category.name.clone()));
        }
        let invalid = |message: &str| CatalogError::InvalidCategory {
            category: category.name.clone(),
            message: message.to_string(),
        };
        if category.timeout_seconds == 0 {
            return Err(invalid("timeoutSeconds must be positive"));
        }
        if category.enabled && category.tests.is_empty() {
            return Err(invalid("enabled category lists no tests"));
        }
        let mut seen = HashSet::new();
        for test_id in &category.tests {
            if !TEST_ID.is_match(test_id) {
                return Err(CatalogError::MalformedTestId {
                    category: category.name.clone(),
                    test_id: test_id.clone(),
                });
            }
            if !seen.insert(test_id.as_str()) {
                return Err(invalid(&format!("test {} listed twice", test_id)));
            }
        }
    }

    let settings = &catalog.settings;
    if settings.history_capacity == 0 {
        return Err(CatalogError::InvalidSettings(
            "historyCapacity must be positive".to_string(),
        ));
    }
    if settings.memory_threshold_mb < 0.0
        || settings.file_handle_threshold < 0
        || settings.process_threshold < 0
    {
        return Err(CatalogError::InvalidSettings(
            "leak thresholds must not be negative".to_string(),
        ));
    }
    Ok(())
}

impl Catalog {
    /// Reject any test id the harness cannot run
    pub fn validate_known(&self, is_known: impl Fn(&str) -> bool) -> Result<(), CatalogError> {
        for category in &self.categories {
            if let Some(test_id) = category.tests.iter().find(|t| !is_known(t)) {
                return Err(CatalogError::UnknownTest {
                    category: category.name.clone(),
                    test_id: test_id.clone(),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "parser_tests.rs"]
mod tests;
