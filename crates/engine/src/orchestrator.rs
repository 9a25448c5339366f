// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Runs catalog tests one at a time, each inside its own isolation context
//!
//! A test attempt is: enter isolation, initialize, run, cleanup, exit
//! isolation, check for leaks. Initialize and run execute in a spawned task
//! so a panic or an expired timeout is contained to the attempt; dropping the
//! task drops its worker handles, which stops their workers, and the
//! isolation exit kills anything that still slipped through.

use crate::cases::{TestCase, TestContext, TestOutcome};
use crate::error::{OrchestratorError, TestError};
use crate::launcher::WorkerLauncher;
use crate::lifecycle::{TestLifecycle, TestPhase};
use crate::registry::TestRegistry;
use crate::result::{HarnessResult, SystemMetrics, TestResult, TestSuiteResult};
use ct_catalog::{Catalog, Category};
use ct_core::clock::{Clock, SystemClock};
use ct_core::id::{IdGen, UuidIdGen};
use ct_core::isolation::{EmergencyCleanupManager, ExitReport, IsolationConfig, TestIsolationContext};
use ct_core::monitor::{LeakReport, ResourceMonitor, ResourceProbe, SystemProbe};
use ct_core::platform::Platform;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Budget for a test's own cleanup hook
pub const CLEANUP_TIMEOUT: Duration = Duration::from_secs(30);

type SharedLifecycle = Arc<Mutex<TestLifecycle>>;

enum Attempt {
    /// `initialize` failed; `run` never started
    InitFailed(TestError),
    Ran(Result<TestOutcome, TestError>),
}

pub struct ContentionTestOrchestrator<C: Clock = SystemClock, I: IdGen = UuidIdGen> {
    catalog: Catalog,
    registry: TestRegistry,
    work_root: PathBuf,
    worker_program: Option<PathBuf>,
    probe: Arc<dyn ResourceProbe>,
    emergency: EmergencyCleanupManager,
    platform: Platform,
    clock: C,
    id_gen: I,
}

impl ContentionTestOrchestrator {
    pub fn new(catalog: Catalog, registry: TestRegistry) -> Result<Self, OrchestratorError> {
        Self::with_deps(catalog, registry, SystemClock, UuidIdGen)
    }
}

impl<C, I> ContentionTestOrchestrator<C, I>
where
    C: Clock + 'static,
    I: IdGen,
{
    /// Validate the catalog against `registry` and prepare the work root
    pub fn with_deps(
        catalog: Catalog,
        registry: TestRegistry,
        clock: C,
        id_gen: I,
    ) -> Result<Self, OrchestratorError> {
        catalog.validate_known(|id| registry.contains(id))?;

        let work_root = catalog.settings.work_root();
        std::fs::create_dir_all(&work_root).map_err(|source| OrchestratorError::WorkRoot {
            path: work_root.clone(),
            source,
        })?;
        let emergency = EmergencyCleanupManager::new()
            .with_sweep_root(&work_root, catalog.settings.sweep_config());

        Ok(Self {
            probe: Arc::new(SystemProbe::current(&work_root)),
            catalog,
            registry,
            work_root,
            worker_program: None,
            emergency,
            platform: Platform::current(),
            clock,
            id_gen,
        })
    }

    /// Binary re-invoked as `<program> worker '<json>'` for process isolation
    pub fn with_worker_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.worker_program = Some(program.into());
        self
    }

    pub fn with_probe(mut self, probe: Arc<dyn ResourceProbe>) -> Self {
        self.probe = probe;
        self
    }

    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = platform;
        self
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn work_root(&self) -> &Path {
        &self.work_root
    }

    /// Handle for out-of-band cleanup, e.g. from a signal handler
    pub fn emergency(&self) -> EmergencyCleanupManager {
        self.emergency.clone()
    }

    /// Every enabled category in catalog order
    pub async fn run_all(&self) -> HarnessResult {
        let plan = self
            .catalog
            .enabled_categories()
            .map(|c| (c.clone(), c.tests.clone()))
            .collect();
        self.run_plan(plan).await
    }

    /// One category, even if the catalog disables it
    pub async fn run_category(&self, name: &str) -> Result<HarnessResult, OrchestratorError> {
        let category = self
            .catalog
            .category(name)
            .ok_or_else(|| OrchestratorError::UnknownCategory(name.to_string()))?;
        if !category.enabled {
            tracing::info!(category = name, "running disabled category on request");
        }
        let plan = vec![(category.clone(), category.tests.clone())];
        Ok(self.run_plan(plan).await)
    }

    /// One test, with the settings of the category that lists it
    pub async fn run_test(&self, test_id: &str) -> Result<HarnessResult, OrchestratorError> {
        let category = self
            .catalog
            .find_test(test_id)
            .filter(|_| self.registry.contains(test_id))
            .ok_or_else(|| OrchestratorError::UnknownTest(test_id.to_string()))?;
        let plan = vec![(category.clone(), vec![test_id.to_string()])];
        Ok(self.run_plan(plan).await)
    }

    async fn run_plan(&self, plan: Vec<(Category, Vec<String>)>) -> HarnessResult {
        let execution_id = self.id_gen.next();
        let started_at = self.clock.wall();
        tracing::info!(execution_id, suites = plan.len(), "harness starting");

        let mut metrics = SystemMetrics::new(self.platform);
        let mut monitor = ResourceMonitor::new(
            self.probe.clone(),
            self.clock.clone(),
            self.catalog.settings.monitor_config(),
        )
        .with_platform(self.platform);
        match monitor.start_monitoring() {
            Ok(baseline) => metrics.baseline = Some(baseline),
            Err(e) => tracing::warn!(error = %e, "harness resource baseline unavailable"),
        }

        let mut suites = Vec::with_capacity(plan.len());
        let mut fatal_cleanups = 0;
        for (category, tests) in plan {
            let suite_started = self.clock.now();
            let mut suite = TestSuiteResult::new(&category.name);
            tracing::info!(category = %category.name, tests = tests.len(), "suite starting");
            for test_id in &tests {
                let (result, fatal) = self.run_with_retries(&category, test_id).await;
                fatal_cleanups += fatal;
                if monitor.is_monitoring() {
                    if let Err(e) = monitor.take_snapshot(&format!("post-{}", test_id)) {
                        tracing::debug!(error = %e, "post-test snapshot failed");
                    }
                }
                suite.tests.push(result);
            }
            suite.duration_ms = elapsed_ms(suite_started, self.clock.now());
            tracing::info!(
                category = %suite.category,
                passed = suite.passed(),
                failed = suite.failed(),
                "suite finished"
            );
            suites.push(suite);
        }

        if monitor.is_monitoring() {
            match monitor.detect_leaks() {
                Ok(report) => metrics.leak_report = Some(report),
                Err(e) => tracing::warn!(error = %e, "harness leak check failed"),
            }
            metrics.trends = Some(monitor.analyze_trends());
            match monitor.stop_monitoring() {
                Ok(last) => metrics.final_snapshot = last,
                Err(e) => tracing::warn!(error = %e, "final resource snapshot failed"),
            }
        }

        let sweep = self.emergency.run("harness finished");
        metrics.stale_locks_removed = sweep.sweep.map(|s| s.removed.len()).unwrap_or(0);
        metrics.emergency_cleanups = fatal_cleanups;

        let result = HarnessResult {
            execution_id,
            started_at,
            finished_at: self.clock.wall(),
            suites,
            system_metrics: metrics,
        };
        tracing::info!(
            execution_id = %result.execution_id,
            passed = result.passed_tests(),
            failed = result.failed_tests(),
            success = result.success(),
            "harness finished"
        );
        result
    }

    /// Run up to `1 + defaultRetries` attempts, keeping the last; also
    /// returns how many attempts needed an emergency cleanup
    async fn run_with_retries(&self, category: &Category, test_id: &str) -> (TestResult, usize) {
        let max_attempts = category.default_retries.saturating_add(1);
        let mut fatal = 0;
        let mut attempt = 1;
        loop {
            let (mut result, was_fatal) = self.run_attempt(category, test_id).await;
            fatal += usize::from(was_fatal);
            result.attempts = attempt;
            if result.success || attempt >= max_attempts {
                return (result, fatal);
            }
            tracing::warn!(test_id, attempt, message = %result.message, "test failed, retrying");
            attempt += 1;
        }
    }

    async fn run_attempt(&self, category: &Category, test_id: &str) -> (TestResult, bool) {
        let started_at = self.clock.wall();
        let started = self.clock.now();
        let lifecycle: SharedLifecycle = Arc::new(Mutex::new(TestLifecycle::new(test_id)));
        let mut result = TestResult {
            test_id: test_id.to_string(),
            description: self
                .registry
                .get(test_id)
                .map(|k| k.description().to_string())
                .unwrap_or_default(),
            success: false,
            message: String::new(),
            details: Value::Null,
            attempts: 1,
            duration_ms: 0,
            started_at,
            leak_report: None,
            orphans_killed: Vec::new(),
        };

        let Some(case) = self.registry.create(test_id) else {
            result.message = format!("no test registered as {}", test_id);
            return (result, false);
        };

        let mut isolation =
            TestIsolationContext::new(test_id, IsolationConfig::new(&self.work_root));
        let work_dir = match isolation.enter_isolation() {
            Ok(dir) => dir.to_path_buf(),
            Err(e) => {
                tracing::error!(test_id, error = %e, "could not enter isolation");
                result.message = format!("isolation failed: {}", e);
                return (result, false);
            }
        };
        self.emergency.track_directory(&work_dir);

        let mut monitor = ResourceMonitor::new(
            self.probe.clone(),
            self.clock.clone(),
            self.catalog.settings.monitor_config(),
        )
        .with_platform(self.platform);
        if let Err(e) = monitor.start_monitoring() {
            tracing::debug!(test_id, error = %e, "per-test monitoring unavailable");
        }

        let launcher =
            WorkerLauncher::for_isolation(category.isolation_level, self.worker_program.clone())
                .with_timeout(category.timeout())
                .with_emergency(self.emergency.clone());
        let ctx = TestContext {
            test_id: test_id.to_string(),
            work_dir: work_dir.clone(),
            launcher,
            platform: self.platform,
            emergency: self.emergency.clone(),
        };

        advance(&lifecycle, TestPhase::Initializing, &self.clock);
        tracing::info!(test_id, category = %category.name, "test starting");
        let (case, attempt) =
            execute(case, ctx.clone(), lifecycle.clone(), self.clock.clone(), category.timeout())
                .await;

        let verdict = match attempt {
            Attempt::InitFailed(e) => Err(format!("initialization failed: {}", e)),
            Attempt::Ran(Ok(outcome)) => {
                result.details = outcome.details;
                Ok(outcome.message)
            }
            Attempt::Ran(Err(e)) => Err(e.to_string()),
        };
        advance(&lifecycle, TestPhase::Completed { passed: verdict.is_ok() }, &self.clock);

        // A lost case means a panic or a timeout took it with its task
        let fatal = case.is_none();
        if let Some(case) = case {
            cleanup(case, ctx).await;
        }
        let exit = exit_isolation(isolation).await;
        self.emergency.untrack_directory(&work_dir);
        if fatal {
            self.emergency.run(&format!("{} did not finish", test_id));
        }
        advance(&lifecycle, TestPhase::CleanedUp, &self.clock);

        let mut failures = Vec::new();
        match verdict {
            Ok(message) => result.message = message,
            Err(message) => failures.push(message),
        }
        if let Some(exit) = exit {
            result.orphans_killed = exit.orphans_killed.iter().map(|p| p.pid).collect();
            if !result.orphans_killed.is_empty() {
                failures.push(format!("orphaned processes killed: {:?}", result.orphans_killed));
            }
        }
        if monitor.is_monitoring() {
            match monitor.detect_leaks() {
                Ok(report) => {
                    if let Some(message) = self.leak_failure(&report) {
                        failures.push(message);
                    }
                    result.leak_report = Some(report);
                }
                Err(e) => tracing::debug!(test_id, error = %e, "per-test leak check failed"),
            }
        }

        result.success = failures.is_empty();
        if !result.success {
            result.message = failures.join("; ");
        }
        result.duration_ms = elapsed_ms(started, self.clock.now());
        if result.success {
            tracing::info!(test_id, duration_ms = result.duration_ms, "test passed");
        } else {
            tracing::warn!(test_id, message = %result.message, "test failed");
        }
        (result, fatal)
    }

    /// The message a leak report fails the test with, under the configured policy
    fn leak_failure(&self, report: &LeakReport) -> Option<String> {
        if !report.has_leaks {
            return None;
        }
        match self.catalog.settings.leak_fail_severity {
            Some(severity) if report.reaches(severity) => {
                Some(format!("resource leak: {}", report.summary))
            }
            _ => {
                tracing::warn!(summary = %report.summary, "resource leak below failure severity");
                None
            }
        }
    }
}

fn advance(lifecycle: &SharedLifecycle, to: TestPhase, clock: &impl Clock) {
    let mut lifecycle = lifecycle.lock().unwrap_or_else(|e| e.into_inner());
    if let Err(e) = lifecycle.advance(to, clock) {
        tracing::error!(error = %e, "lifecycle violation");
    }
}

fn elapsed_ms(from: std::time::Instant, to: std::time::Instant) -> u64 {
    to.saturating_duration_since(from).as_millis() as u64
}

/// Initialize and run `case` in its own task under `limit`. The case comes
/// back unless the task panicked or was abandoned at the deadline.
async fn execute<C: Clock + 'static>(
    mut case: Box<dyn TestCase>,
    ctx: TestContext,
    lifecycle: SharedLifecycle,
    clock: C,
    limit: Duration,
) -> (Option<Box<dyn TestCase>>, Attempt) {
    let test_id = ctx.test_id.clone();
    let mut task = tokio::spawn(async move {
        if let Err(e) = case.initialize(&ctx).await {
            return (case, Attempt::InitFailed(e));
        }
        advance(&lifecycle, TestPhase::Running, &clock);
        let outcome = case.run(&ctx).await;
        (case, Attempt::Ran(outcome))
    });

    match tokio::time::timeout(limit, &mut task).await {
        Ok(Ok((case, attempt))) => (Some(case), attempt),
        Ok(Err(e)) => {
            tracing::error!(test_id, error = %e, "test task panicked");
            (None, Attempt::Ran(Err(TestError::Panicked(e.to_string()))))
        }
        Err(_) => {
            tracing::warn!(test_id, timeout = ?limit, "test timed out, abandoning");
            task.abort();
            // Wait for the drop so worker handles have stopped their workers
            let _ = task.await;
            (None, Attempt::Ran(Err(TestError::Timeout(limit))))
        }
    }
}

/// Run the case's cleanup hook; failures are logged, never raised
async fn cleanup(mut case: Box<dyn TestCase>, ctx: TestContext) {
    let test_id = ctx.test_id.clone();
    let task = tokio::spawn(async move { case.cleanup(&ctx).await });
    match tokio::time::timeout(CLEANUP_TIMEOUT, task).await {
        Ok(Ok(Ok(()))) => {}
        Ok(Ok(Err(e))) => tracing::warn!(test_id, error = %e, "test cleanup failed"),
        Ok(Err(e)) => tracing::warn!(test_id, error = %e, "test cleanup panicked"),
        Err(_) => tracing::warn!(test_id, "test cleanup timed out"),
    }
}

/// Orphan kills may wait out a grace period, so exit off the async workers
async fn exit_isolation(mut isolation: TestIsolationContext) -> Option<ExitReport> {
    let test_id = isolation.test_id().to_string();
    match tokio::task::spawn_blocking(move || isolation.exit_isolation()).await {
        Ok(Ok(report)) => Some(report),
        Ok(Err(e)) => {
            tracing::warn!(test_id, error = %e, "isolation exit failed");
            None
        }
        Err(e) => {
            tracing::warn!(test_id, error = %e, "isolation exit panicked");
            None
        }
    }
}

#[cfg(test)]
#[path = "orchestrator_tests.rs"]
mod tests;
