// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Test id → test kind mapping
//!
//! Catalogs name tests by id; the registry resolves each id to a
//! [`TestKind`], which knows how to build a fresh [`TestCase`].

use crate::cases::{
    BarrierRendezvous, CasRace, CleanCopy, CommitRollback, CompetingCopies, DeleteDuringWrite,
    LockExclusion, LockFairness, ObservedCopy, OrphanedLockHolder, PreoccupiedTemp, TestCase,
};
use std::collections::BTreeMap;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TestKind {
    LockExclusion,
    CasRace,
    BarrierRendezvous,
    LockFairness,
    CleanCopy,
    PreoccupiedTemp,
    ObservedCopy,
    CompetingCopies,
    DeleteDuringWrite,
    OrphanedLockHolder,
    CommitRollback,
    /// A test supplied by the embedding program
    Custom(CustomKind),
}

/// Factory for a test that is not built in; identity is the name
#[derive(Clone, Copy)]
pub struct CustomKind {
    pub name: &'static str,
    pub description: &'static str,
    pub build: fn() -> Box<dyn TestCase>,
}

impl PartialEq for CustomKind {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for CustomKind {}

impl std::hash::Hash for CustomKind {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

impl std::fmt::Debug for CustomKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CustomKind").field("name", &self.name).finish()
    }
}

impl TestKind {
    /// A fresh instance with default parameters
    pub fn build(self) -> Box<dyn TestCase> {
        match self {
            TestKind::LockExclusion => Box::new(LockExclusion::default()),
            TestKind::CasRace => Box::new(CasRace::default()),
            TestKind::BarrierRendezvous => Box::new(BarrierRendezvous::default()),
            TestKind::LockFairness => Box::new(LockFairness::default()),
            TestKind::CleanCopy => Box::new(CleanCopy::default()),
            TestKind::PreoccupiedTemp => Box::new(PreoccupiedTemp::default()),
            TestKind::ObservedCopy => Box::new(ObservedCopy::default()),
            TestKind::CompetingCopies => Box::new(CompetingCopies::default()),
            TestKind::DeleteDuringWrite => Box::new(DeleteDuringWrite::default()),
            TestKind::OrphanedLockHolder => Box::new(OrphanedLockHolder::default()),
            TestKind::CommitRollback => Box::new(CommitRollback::default()),
            TestKind::Custom(custom) => (custom.build)(),
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            TestKind::LockExclusion => "concurrent store updates lose nothing",
            TestKind::CasRace => "simultaneous compare-and-swap has one winner",
            TestKind::BarrierRendezvous => "barrier releases all parties and times out a latecomer",
            TestKind::LockFairness => "lock contention finishes for every worker",
            TestKind::CleanCopy => "unobstructed copy lands on every destination",
            TestKind::PreoccupiedTemp => "a held temp file aborts the whole copy",
            TestKind::ObservedCopy => "an observer never sees a copy regress",
            TestKind::CompetingCopies => "racing copies leave one coherent set",
            TestKind::DeleteDuringWrite => "delete while open behaves as the platform allows",
            TestKind::OrphanedLockHolder => "a crashed holder's lock is swept and reusable",
            TestKind::CommitRollback => "a failed rename rolls back the commit",
            TestKind::Custom(custom) => custom.description,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct TestRegistry {
    kinds: BTreeMap<String, TestKind>,
}

impl TestRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every test this harness ships
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        for (id, kind) in [
            ("FL-001", TestKind::LockExclusion),
            ("FL-002", TestKind::CasRace),
            ("FL-003", TestKind::BarrierRendezvous),
            ("FST-001", TestKind::LockFairness),
            ("RC-001", TestKind::CleanCopy),
            ("RC-002", TestKind::PreoccupiedTemp),
            ("RC-003", TestKind::ObservedCopy),
            ("RC-004", TestKind::CompetingCopies),
            ("RDW-001", TestKind::DeleteDuringWrite),
            ("RV-001", TestKind::OrphanedLockHolder),
            ("RV-002", TestKind::CommitRollback),
        ] {
            registry.register(id, kind);
        }
        registry
    }

    /// Map `id` to `kind`, replacing any previous mapping
    pub fn register(&mut self, id: impl Into<String>, kind: TestKind) -> Option<TestKind> {
        self.kinds.insert(id.into(), kind)
    }

    pub fn get(&self, id: &str) -> Option<TestKind> {
        self.kinds.get(id).copied()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.kinds.contains_key(id)
    }

    pub fn create(&self, id: &str) -> Option<Box<dyn TestCase>> {
        self.get(id).map(TestKind::build)
    }

    /// Registered ids in sorted order
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.kinds.keys().map(String::as_str)
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
