// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Contention test engine: workers, concrete tests and the orchestrator

pub mod cases;
mod error;
pub mod fixtures;
pub mod launcher;
pub mod lifecycle;
pub mod orchestrator;
pub mod registry;
pub mod result;
pub mod worker;

#[cfg(test)]
mod test_support;

pub use cases::{TestCase, TestContext, TestOutcome};
pub use error::{OrchestratorError, TestError, WorkerError};
pub use launcher::{LaunchMode, WorkerHandle, WorkerLauncher};
pub use lifecycle::{LifecycleError, TestLifecycle, TestPhase};
pub use orchestrator::ContentionTestOrchestrator;
pub use registry::{CustomKind, TestKind, TestRegistry};
pub use result::{HarnessResult, SystemMetrics, TestResult, TestSuiteResult};
pub use worker::{execute, StopFlag, WorkerCommand, WorkerOutput, WorkerReport};
