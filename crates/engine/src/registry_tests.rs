// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use ct_catalog::TEST_ID_PATTERN;
use regex::Regex;

#[test]
fn builtin_registers_every_kind() {
    let registry = TestRegistry::builtin();
    assert_eq!(registry.ids().count(), 11);
    assert_eq!(registry.get("RC-002"), Some(TestKind::PreoccupiedTemp));
    assert_eq!(registry.get("RV-001"), Some(TestKind::OrphanedLockHolder));
    assert!(registry.create("FL-001").is_some());
}

#[test]
fn builtin_ids_match_catalog_pattern() {
    let pattern = Regex::new(TEST_ID_PATTERN).unwrap();
    for id in TestRegistry::builtin().ids() {
        assert!(pattern.is_match(id), "{id}");
    }
}

#[test]
fn unknown_id_builds_nothing() {
    let registry = TestRegistry::builtin();
    assert!(!registry.contains("XX-999"));
    assert!(registry.create("XX-999").is_none());
}

#[test]
fn register_replaces_mapping() {
    let mut registry = TestRegistry::new();
    assert_eq!(registry.register("FL-100", TestKind::CasRace), None);
    assert_eq!(
        registry.register("FL-100", TestKind::LockExclusion),
        Some(TestKind::CasRace)
    );
    assert_eq!(registry.get("FL-100"), Some(TestKind::LockExclusion));
}

#[test]
fn ids_are_sorted() {
    let registry = TestRegistry::builtin();
    let ids: Vec<_> = registry.ids().collect();
    let mut sorted = ids.clone();
    sorted.sort();
    assert_eq!(ids, sorted);
}

#[test]
fn every_kind_describes_itself() {
    let registry = TestRegistry::builtin();
    for id in registry.ids() {
        let kind = registry.get(id).unwrap();
        assert!(!kind.description().is_empty());
    }
}

#[test]
fn custom_kind_builds_through_its_factory() {
    let custom = CustomKind {
        name: "noop",
        description: "does nothing",
        build: || Box::new(CommitRollback::default()),
    };
    let mut registry = TestRegistry::builtin();
    registry.register("XX-001", TestKind::Custom(custom));

    assert_eq!(registry.get("XX-001"), Some(TestKind::Custom(custom)));
    assert_eq!(TestKind::Custom(custom).description(), "does nothing");
    assert!(registry.create("XX-001").is_some());
}
