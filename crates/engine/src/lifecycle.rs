// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-test lifecycle state machine
//!
//! `Created → Initializing → Running → Completed → CleanedUp`. A failed
//! initialization goes straight to `Completed { passed: false }`, and
//! cleanup is reachable from every started state so a test that blew up
//! halfway is still cleaned up.

use ct_core::clock::Clock;
use serde::Serialize;
use std::time::{Duration, Instant};
use thiserror::Error;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "phase", rename_all = "camelCase")]
pub enum TestPhase {
    Created,
    Initializing,
    Running,
    Completed { passed: bool },
    CleanedUp,
}

impl std::fmt::Display for TestPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TestPhase::Created => write!(f, "created"),
            TestPhase::Initializing => write!(f, "initializing"),
            TestPhase::Running => write!(f, "running"),
            TestPhase::Completed { passed: true } => write!(f, "passed"),
            TestPhase::Completed { passed: false } => write!(f, "failed"),
            TestPhase::CleanedUp => write!(f, "cleaned up"),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LifecycleError {
    #[error("test {test_id}: invalid transition {from} -> {to}")]
    InvalidTransition {
        test_id: String,
        from: TestPhase,
        to: TestPhase,
    },
}

/// Tracks one attempt of one test
#[derive(Clone, Debug)]
pub struct TestLifecycle {
    test_id: String,
    phase: TestPhase,
    started_at: Option<Instant>,
    completed_at: Option<Instant>,
}

impl TestLifecycle {
    pub fn new(test_id: impl Into<String>) -> Self {
        Self {
            test_id: test_id.into(),
            phase: TestPhase::Created,
            started_at: None,
            completed_at: None,
        }
    }

    pub fn phase(&self) -> TestPhase {
        self.phase
    }

    pub fn test_id(&self) -> &str {
        &self.test_id
    }

    /// Time from initialization to completion, once both happened
    pub fn duration(&self) -> Option<Duration> {
        Some(self.completed_at?.saturating_duration_since(self.started_at?))
    }

    pub fn advance(&mut self, to: TestPhase, clock: &impl Clock) -> Result<(), LifecycleError> {
        let allowed = matches!(
            (self.phase, to),
            (TestPhase::Created, TestPhase::Initializing)
                | (TestPhase::Initializing, TestPhase::Running)
                | (TestPhase::Initializing, TestPhase::Completed { passed: false })
                | (TestPhase::Running, TestPhase::Completed { .. })
                | (
                    TestPhase::Initializing | TestPhase::Running | TestPhase::Completed { .. },
                    TestPhase::CleanedUp
                )
        );
        if !allowed {
            return Err(LifecycleError::InvalidTransition {
                test_id: self.test_id.clone(),
                from: self.phase,
                to,
            });
        }

        match to {
            TestPhase::Initializing => self.started_at = Some(clock.now()),
            TestPhase::Completed { .. } => self.completed_at = Some(clock.now()),
            TestPhase::CleanedUp if self.completed_at.is_none() => {
                self.completed_at = Some(clock.now())
            }
            _ => {}
        }
        tracing::debug!(test_id = %self.test_id, from = %self.phase, to = %to, "test phase");
        self.phase = to;
        Ok(())
    }
}

#[cfg(test)]
#[path = "lifecycle_tests.rs"]
mod tests;
