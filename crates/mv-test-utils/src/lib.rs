//! Testing utilities for the migration validator workspace
//!
//! In-memory check sources, report builders and runner fixtures.

#![allow(missing_docs)]

use mv_core::{StageId, StageKind, StageRegistry, ValidationReport, ValidationResult};
use mv_pipeline::{
    CheckError, CheckOutcome, CheckSources, CheckTarget, ExecutorConfig, PipelineRunner,
    RunnerConfig, StageChecks, StageExecutionError, StageExecutor, TableSpec, TargetDetail,
};
use mv_store::ReportStore;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// What a fake item does when checked
#[derive(Debug, Clone)]
pub enum Behaviour {
    Pass,
    Fail(String),
    Error(String),
    Panic,
    Hang,
}

/// In-memory check source with scripted per-item behaviour
#[derive(Debug)]
pub struct StaticChecks {
    kind: StageKind,
    items: Vec<(String, Behaviour)>,
    delay: Option<Duration>,
    target_calls: AtomicUsize,
    check_calls: AtomicUsize,
}

impl StaticChecks {
    pub fn new(kind: StageKind) -> Self {
        Self {
            kind,
            items: Vec::new(),
            delay: None,
            target_calls: AtomicUsize::new(0),
            check_calls: AtomicUsize::new(0),
        }
    }

    /// `passed` passing items followed by `failed` failing ones
    pub fn with_counts(kind: StageKind, passed: usize, failed: usize) -> Self {
        let mut checks = Self::new(kind);
        for i in 0..passed {
            checks = checks.item(format!("{kind}_ok_{i}"), Behaviour::Pass);
        }
        for i in 0..failed {
            checks = checks.item(format!("{kind}_bad_{i}"), Behaviour::Fail("mismatch".into()));
        }
        checks
    }

    pub fn passing(kind: StageKind, n: usize) -> Self {
        Self::with_counts(kind, n, 0)
    }

    pub fn item(mut self, name: impl Into<String>, behaviour: Behaviour) -> Self {
        self.items.push((name.into(), behaviour));
        self
    }

    /// Sleep this long in every check
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Times the executor asked for targets
    pub fn target_calls(&self) -> usize {
        self.target_calls.load(Ordering::SeqCst)
    }

    pub fn check_calls(&self) -> usize {
        self.check_calls.load(Ordering::SeqCst)
    }

    fn behaviour(&self, name: &str) -> Option<&Behaviour> {
        self.items.iter().find(|(n, _)| n == name).map(|(_, b)| b)
    }
}

#[async_trait::async_trait]
impl StageChecks for StaticChecks {
    async fn targets(&self) -> Result<Vec<CheckTarget>, StageExecutionError> {
        self.target_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .items
            .iter()
            .map(|(name, _)| CheckTarget {
                name: name.clone(),
                kind: self.kind.item_kind(),
                detail: TargetDetail::Table(TableSpec::new(name.clone())),
            })
            .collect())
    }

    async fn check(&self, target: &CheckTarget) -> Result<CheckOutcome, CheckError> {
        self.check_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        match self.behaviour(&target.name) {
            Some(Behaviour::Pass) => Ok(CheckOutcome::pass()),
            Some(Behaviour::Fail(reason)) => Ok(CheckOutcome::fail(reason.clone())),
            Some(Behaviour::Error(msg)) => Err(CheckError::Request(msg.clone())),
            Some(Behaviour::Panic) => panic!("check for {} panicked", target.name),
            Some(Behaviour::Hang) => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(CheckOutcome::pass())
            }
            None => Err(CheckError::Unexpected(format!("unknown item {}", target.name))),
        }
    }
}

/// Source whose target listing always fails, like an unreachable V2
#[derive(Debug, Default)]
pub struct UnreachableChecks;

#[async_trait::async_trait]
impl StageChecks for UnreachableChecks {
    async fn targets(&self) -> Result<Vec<CheckTarget>, StageExecutionError> {
        Err(StageExecutionError::Unreachable("connection refused".into()))
    }

    async fn check(&self, _target: &CheckTarget) -> Result<CheckOutcome, CheckError> {
        Err(CheckError::Request("connection refused".into()))
    }
}

/// Report with `passed` passing and `failed` failing items
pub fn report(kind: StageKind, passed: usize, failed: usize) -> ValidationReport {
    let item = kind.item_kind();
    let mut results: Vec<ValidationResult> = (0..passed)
        .map(|i| ValidationResult::passed(format!("ok_{i}"), item))
        .collect();
    results.extend((0..failed).map(|i| ValidationResult::failed(format!("bad_{i}"), item, "mismatch")));
    ValidationReport::new(StageId::from(kind), kind, results, Duration::from_millis(5))
}

/// Store in a fresh temporary directory; keep the guard alive
pub fn temp_store() -> (TempDir, Arc<ReportStore>) {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(ReportStore::new(dir.path()));
    (dir, store)
}

/// Sources with `n` passing items for every kind
pub fn passing_sources(n: usize) -> CheckSources {
    StageKind::ALL
        .into_iter()
        .fold(CheckSources::new(), |sources, kind| {
            sources.with(kind, Arc::new(StaticChecks::passing(kind, n)))
        })
}

/// Runner over the default registry with short timeouts
pub fn setup_runner(sources: CheckSources) -> (TempDir, Arc<PipelineRunner>) {
    setup_runner_with(StageRegistry::default(), sources, RunnerConfig::default())
}

pub fn setup_runner_with(
    registry: StageRegistry,
    sources: CheckSources,
    config: RunnerConfig,
) -> (TempDir, Arc<PipelineRunner>) {
    let (dir, store) = temp_store();
    let executor = StageExecutor::with_config(
        sources,
        ExecutorConfig::default().with_check_timeout(Duration::from_millis(200)),
    );
    let runner = PipelineRunner::new(Arc::new(registry), Arc::new(executor), store)
        .with_config(config);
    (dir, Arc::new(runner))
}
