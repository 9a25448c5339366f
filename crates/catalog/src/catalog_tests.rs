// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn category(name: &str, enabled: bool, tests: &[&str]) -> Category {
    Category {
        name: name.to_string(),
        enabled,
        tests: tests.iter().map(|t| t.to_string()).collect(),
        isolation_level: IsolationLevel::Process,
        timeout_seconds: 30,
        default_retries: 0,
    }
}

fn sample() -> Catalog {
    Catalog {
        categories: vec![
            category("FileLocking", true, &["FL-001", "FL-002"]),
            category("Disabled", false, &["RC-001", "FL-002"]),
            category("Race", true, &["RC-001"]),
        ],
        settings: HarnessSettings::default(),
    }
}

#[test]
fn enabled_categories_skip_disabled() {
    let catalog = sample();
    let names: Vec<_> = catalog.enabled_categories().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["FileLocking", "Race"]);
}

#[test]
fn find_test_prefers_enabled_category() {
    let catalog = sample();
    assert_eq!(catalog.find_test("RC-001").unwrap().name, "Race");
    assert_eq!(catalog.find_test("FL-002").unwrap().name, "FileLocking");
    assert!(catalog.find_test("RV-001").is_none());
}

#[test]
fn find_test_falls_back_to_disabled_category() {
    let mut catalog = sample();
    catalog.categories[1].tests.push("RV-002".to_string());
    assert_eq!(catalog.find_test("RV-002").unwrap().name, "Disabled");
}

#[test]
fn test_ids_are_deduplicated_in_order() {
    assert_eq!(sample().test_ids(), vec!["FL-001", "FL-002", "RC-001"]);
}

#[test]
fn category_timeout_is_in_seconds() {
    let c = category("x", true, &["FL-001"]);
    assert_eq!(c.timeout(), std::time::Duration::from_secs(30));
    assert!(c.contains("FL-001"));
    assert!(!c.contains("FL-002"));
}
