//! Stage executor
//!
//! Runs every check of one stage and aggregates a [`ValidationReport`].
//! Item failures never abort the stage: errors, timeouts and panics of a
//! single check all become failed results for that item.
//! Persistence is the caller's business.

use crate::checks::{CheckSources, CheckTarget, StageChecks};
use crate::error::{CheckError, StageExecutionError};
use futures::{FutureExt, StreamExt};
use mv_core::{Stage, ValidationReport, ValidationResult};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Default per-check timeout
pub const DEFAULT_CHECK_TIMEOUT: Duration = Duration::from_secs(30);

/// Default number of checks in flight per stage
pub const DEFAULT_MAX_CONCURRENT_CHECKS: usize = 8;

/// Executor limits
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Bound on a single item check
    pub check_timeout: Duration,
    /// Checks in flight at once
    pub max_concurrent_checks: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            check_timeout: DEFAULT_CHECK_TIMEOUT,
            max_concurrent_checks: DEFAULT_MAX_CONCURRENT_CHECKS,
        }
    }
}

impl ExecutorConfig {
    /// Set check timeout
    #[must_use]
    pub fn with_check_timeout(mut self, timeout: Duration) -> Self {
        self.check_timeout = timeout;
        self
    }

    /// Set concurrency window (at least 1)
    #[must_use]
    pub fn with_max_concurrent_checks(mut self, n: usize) -> Self {
        self.max_concurrent_checks = n.max(1);
        self
    }
}

/// Executes the checks of a stage
#[derive(Debug, Clone)]
pub struct StageExecutor {
    sources: CheckSources,
    config: ExecutorConfig,
}

impl StageExecutor {
    /// Create an executor with default limits
    #[must_use]
    pub fn new(sources: CheckSources) -> Self {
        Self::with_config(sources, ExecutorConfig::default())
    }

    /// Create an executor with explicit limits
    #[must_use]
    pub fn with_config(sources: CheckSources, config: ExecutorConfig) -> Self {
        Self { sources, config }
    }

    /// Executor limits
    #[must_use]
    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Run all checks of `stage`
    ///
    /// Results keep the order of the targets.
    ///
    /// # Errors
    /// Returns `StageExecutionError` if no source is registered for the stage
    /// kind or the source cannot produce its targets
    pub async fn execute(&self, stage: &Stage) -> Result<ValidationReport, StageExecutionError> {
        let started = Instant::now();
        let source = self
            .sources
            .get(stage.kind)
            .ok_or(StageExecutionError::NoCheckSource(stage.kind))?;

        let targets = source.targets().await?;
        tracing::debug!(stage = %stage.id, targets = targets.len(), "running checks");

        let timeout = self.config.check_timeout;
        let results: Vec<ValidationResult> = futures::stream::iter(targets)
            .map(|target| {
                let source = Arc::clone(&source);
                async move { run_check(source.as_ref(), &target, timeout).await }
            })
            .buffered(self.config.max_concurrent_checks.max(1))
            .collect()
            .await;

        let report = ValidationReport::new(stage.id.clone(), stage.kind, results, started.elapsed());
        tracing::debug!(
            stage = %stage.id,
            passed = report.summary.passed,
            failed = report.summary.failed,
            "checks finished"
        );
        Ok(report)
    }
}

async fn run_check(
    source: &dyn StageChecks,
    target: &CheckTarget,
    timeout: Duration,
) -> ValidationResult {
    let guarded = AssertUnwindSafe(source.check(target)).catch_unwind();
    let outcome = match tokio::time::timeout(timeout, guarded).await {
        Err(_) => Err(CheckError::Timeout(timeout)),
        Ok(Err(panic)) => Err(CheckError::Panicked(panic_message(panic.as_ref()))),
        Ok(Ok(result)) => result,
    };

    match outcome {
        Ok(outcome) => {
            if !outcome.success {
                tracing::debug!(item = %target.name, error = ?outcome.error, "check failed");
            }
            outcome.into_result(target)
        }
        Err(err) => {
            tracing::warn!(item = %target.name, error = %err, "check errored");
            ValidationResult::failed(&target.name, target.kind, err.to_string())
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn panic_message_extracts_strings() {
        let payload: Box<dyn std::any::Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload.as_ref()), "boom");
        let payload: Box<dyn std::any::Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(payload.as_ref()), "bang");
        let payload: Box<dyn std::any::Any + Send> = Box::new(42_u8);
        assert_eq!(panic_message(payload.as_ref()), "unknown panic");
    }

    #[test]
    fn concurrency_window_is_at_least_one() {
        let config = ExecutorConfig::default().with_max_concurrent_checks(0);
        assert_eq!(config.max_concurrent_checks, 1);
    }

    #[tokio::test]
    async fn missing_source_is_stage_error() {
        let executor = StageExecutor::new(CheckSources::new());
        let stage = Stage::new("tables", "Tables", mv_core::StageKind::Tables);
        let err = executor.execute(&stage).await.unwrap_err();
        assert!(matches!(err, StageExecutionError::NoCheckSource(_)));
    }
}
