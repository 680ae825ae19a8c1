//! Pipeline runner
//!
//! Owns the [`PipelineState`] and admits at most one stage or pipeline run at
//! a time. Admission is synchronous (`start_*`), execution is async
//! (`run_*`), and the returned lease clears the running flag when dropped,
//! whichever way the run ends.
//!
//! Pipeline policy: stages run sequentially in registry order. A stage whose
//! dependencies are not satisfied is recorded `skipped` and not executed, so
//! its own dependents are skipped in turn. Independent stages still run.

use crate::error::{PipelineError, StageExecutionError};
use crate::executor::StageExecutor;
use mv_core::state_machine::validate_transition;
use mv_core::{
    PipelineState, Stage, StageId, StageRecord, StageRegistry, StageStatus, StateMachineError,
};
use mv_store::ReportStore;
use parking_lot::Mutex;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use uuid::Uuid;

/// Default bound on a single stage run
pub const DEFAULT_STAGE_TIMEOUT: Duration = Duration::from_secs(600);

/// Runner limits
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Bound on one stage execution
    pub stage_timeout: Duration,
    /// Optional bound on a whole pipeline run
    pub pipeline_timeout: Option<Duration>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            stage_timeout: DEFAULT_STAGE_TIMEOUT,
            pipeline_timeout: None,
        }
    }
}

impl RunnerConfig {
    /// Set stage timeout
    #[must_use]
    pub fn with_stage_timeout(mut self, timeout: Duration) -> Self {
        self.stage_timeout = timeout;
        self
    }

    /// Set pipeline timeout
    #[must_use]
    pub fn with_pipeline_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.pipeline_timeout = timeout;
        self
    }
}

/// Holds the running flag; clears it on drop
#[derive(Debug)]
pub struct RunLease {
    state: Arc<Mutex<PipelineState>>,
}

impl Drop for RunLease {
    fn drop(&mut self) {
        let mut state = self.state.lock();
        state.running = false;
        state.current_stage = None;
    }
}

/// Admission for a single stage run
#[derive(Debug)]
pub struct StageLease {
    lease: RunLease,
    stage: Stage,
}

impl StageLease {
    /// Admitted stage
    #[must_use]
    pub fn stage(&self) -> &Stage {
        &self.stage
    }
}

/// Admission for a full pipeline run
#[derive(Debug)]
pub struct PipelineLease {
    _lease: RunLease,
}

/// Outcome of one stage within a run
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StageOutcome {
    /// Stage id
    pub stage: StageId,
    /// Recorded result
    pub record: StageRecord,
    /// Persisted report, when the stage completed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report_path: Option<PathBuf>,
}

impl StageOutcome {
    /// Terminal status
    #[inline]
    #[must_use]
    pub fn status(&self) -> StageStatus {
        self.record.status
    }
}

/// Outcome of a pipeline run
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineOutcome {
    /// Run identifier, for log correlation
    pub run_id: Uuid,
    /// Per-stage outcomes in registry order
    pub stages: Vec<StageOutcome>,
    /// Wall time in milliseconds
    pub duration_ms: u64,
    /// Pipeline deadline was hit
    pub timed_out: bool,
}

impl PipelineOutcome {
    /// Outcome for a stage
    #[must_use]
    pub fn stage(&self, id: &str) -> Option<&StageOutcome> {
        self.stages.iter().find(|s| s.stage.as_str() == id)
    }

    /// Stages with the given status
    #[must_use]
    pub fn with_status(&self, status: StageStatus) -> Vec<&StageId> {
        self.stages
            .iter()
            .filter(|s| s.status() == status)
            .map(|s| &s.stage)
            .collect()
    }
}

/// Dependency-gated stage orchestrator
#[derive(Debug)]
pub struct PipelineRunner {
    registry: Arc<StageRegistry>,
    executor: Arc<StageExecutor>,
    store: Arc<ReportStore>,
    state: Arc<Mutex<PipelineState>>,
    config: RunnerConfig,
}

impl PipelineRunner {
    /// Create a runner with fresh state and default limits
    #[must_use]
    pub fn new(
        registry: Arc<StageRegistry>,
        executor: Arc<StageExecutor>,
        store: Arc<ReportStore>,
    ) -> Self {
        Self {
            registry,
            executor,
            store,
            state: Arc::new(Mutex::new(PipelineState::default())),
            config: RunnerConfig::default(),
        }
    }

    /// Replace limits
    #[must_use]
    pub fn with_config(mut self, config: RunnerConfig) -> Self {
        self.config = config;
        self
    }

    /// Use an externally owned state
    #[must_use]
    pub fn with_state(mut self, state: Arc<Mutex<PipelineState>>) -> Self {
        self.state = state;
        self
    }

    /// Stage registry
    #[must_use]
    pub fn registry(&self) -> &StageRegistry {
        &self.registry
    }

    /// Report store
    #[must_use]
    pub fn store(&self) -> &ReportStore {
        &self.store
    }

    /// Runner limits
    #[must_use]
    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Stages that directly depend on `id` and stay blocked until it
    /// completes within its success criteria
    #[must_use]
    pub fn blocked_stages(&self, id: &str) -> Vec<StageId> {
        self.registry
            .dependents(id)
            .into_iter()
            .map(|s| s.id.clone())
            .collect()
    }

    /// Snapshot of the current state
    #[must_use]
    pub fn pipeline_status(&self) -> PipelineState {
        self.state.lock().clone()
    }

    /// Stages executing right now
    #[must_use]
    pub fn active_stages(&self) -> Vec<StageId> {
        self.state.lock().current_stage.iter().cloned().collect()
    }

    /// Whether every dependency of `id` has a satisfied result
    ///
    /// False for unknown stages.
    #[must_use]
    pub fn are_dependencies_met(&self, id: &str) -> bool {
        let Some(stage) = self.registry.get_stage(id) else {
            return false;
        };
        unmet_in(&self.state.lock(), stage).is_empty()
    }

    /// Dependencies of `id` lacking a satisfied result
    #[must_use]
    pub fn unmet_dependencies(&self, id: &str) -> Vec<StageId> {
        self.registry
            .get_stage(id)
            .map(|stage| unmet_in(&self.state.lock(), stage))
            .unwrap_or_default()
    }

    /// Admit a single stage run
    ///
    /// # Errors
    /// `StageNotFound`, then `Conflict` if a run is in progress, then
    /// `UnmetDependencies`
    pub fn start_stage(&self, id: &str) -> Result<StageLease, PipelineError> {
        let stage = self
            .registry
            .get_stage(id)
            .ok_or_else(|| PipelineError::StageNotFound(id.to_string()))?
            .clone();

        let mut state = self.state.lock();
        if state.running {
            return Err(PipelineError::Conflict {
                current_stage: state.current_stage.clone(),
            });
        }
        let unmet = unmet_in(&state, &stage);
        if !unmet.is_empty() {
            return Err(PipelineError::UnmetDependencies {
                stage: stage.id.clone(),
                unmet,
            });
        }
        validate_transition(state.status_of(id), StageStatus::Running)?;
        state.running = true;
        state.current_stage = Some(stage.id.clone());
        drop(state);

        Ok(StageLease {
            lease: self.lease(),
            stage,
        })
    }

    /// Execute an admitted stage
    ///
    /// # Errors
    /// `PipelineError::Stage` if the stage could not run to completion; the
    /// failure is recorded before returning
    pub async fn run_stage(&self, lease: StageLease) -> Result<StageOutcome, PipelineError> {
        let StageLease { lease, stage } = lease;
        let outcome = self.run_admitted(&stage, self.config.stage_timeout).await;
        drop(lease);
        outcome
    }

    /// Admit and execute a single stage
    ///
    /// # Errors
    /// See [`start_stage`](Self::start_stage) and [`run_stage`](Self::run_stage)
    #[tracing::instrument(skip(self))]
    pub async fn execute_stage(&self, id: &str) -> Result<StageOutcome, PipelineError> {
        let lease = self.start_stage(id)?;
        self.run_stage(lease).await
    }

    /// Admit and execute a stage on a background task
    ///
    /// # Errors
    /// Admission errors are returned synchronously
    pub fn spawn_stage(
        self: &Arc<Self>,
        id: &str,
    ) -> Result<JoinHandle<Result<StageOutcome, PipelineError>>, PipelineError> {
        let lease = self.start_stage(id)?;
        let runner = Arc::clone(self);
        Ok(tokio::spawn(async move {
            let result = runner.run_stage(lease).await;
            if let Err(err) = &result {
                tracing::error!(error = %err, "background stage run failed");
            }
            result
        }))
    }

    /// Admit a pipeline run
    ///
    /// # Errors
    /// `Conflict` if a run is in progress
    pub fn start_pipeline(&self) -> Result<PipelineLease, PipelineError> {
        let mut state = self.state.lock();
        if state.running {
            return Err(PipelineError::Conflict {
                current_stage: state.current_stage.clone(),
            });
        }
        state.running = true;
        state.current_stage = None;
        drop(state);
        Ok(PipelineLease {
            _lease: self.lease(),
        })
    }

    /// Execute an admitted pipeline
    pub async fn run_pipeline(&self, lease: PipelineLease) -> PipelineOutcome {
        let run_id = Uuid::new_v4();
        let started = Instant::now();
        let deadline = self.config.pipeline_timeout.map(|t| started + t);
        tracing::info!(%run_id, stages = self.registry.len(), "pipeline started");

        let mut stages = Vec::with_capacity(self.registry.len());
        let mut timed_out = false;

        for stage in self.registry.list_stages() {
            if timed_out {
                stages.push(self.skip(&stage.id, "pipeline timeout".to_string()));
                continue;
            }

            let unmet = self.unmet_dependencies(stage.id.as_str());
            if !unmet.is_empty() {
                let reason = format!("unmet dependencies: {}", join_ids(&unmet));
                tracing::warn!(%run_id, stage = %stage.id, %reason, "stage skipped");
                stages.push(self.skip(&stage.id, reason));
                continue;
            }

            let budget = match deadline {
                Some(deadline) => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    if remaining.is_zero() {
                        timed_out = true;
                        stages.push(self.skip(&stage.id, "pipeline timeout".to_string()));
                        continue;
                    }
                    self.config.stage_timeout.min(remaining)
                }
                None => self.config.stage_timeout,
            };

            if let Err(err) = self.enter(&stage.id) {
                tracing::error!(%run_id, stage = %stage.id, error = %err, "illegal stage transition");
                stages.push(self.skip(&stage.id, err.to_string()));
                continue;
            }

            match self.run_admitted(stage, budget).await {
                Ok(outcome) => stages.push(outcome),
                Err(err) => {
                    let record = self
                        .state
                        .lock()
                        .results
                        .get(stage.id.as_str())
                        .cloned()
                        .unwrap_or_else(|| StageRecord::failed(err.to_string()));
                    stages.push(StageOutcome {
                        stage: stage.id.clone(),
                        record,
                        report_path: None,
                    });
                    if deadline.is_some_and(|d| Instant::now() >= d) {
                        timed_out = true;
                    }
                }
            }
        }

        drop(lease);
        let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        tracing::info!(%run_id, duration_ms, timed_out, "pipeline finished");
        PipelineOutcome {
            run_id,
            stages,
            duration_ms,
            timed_out,
        }
    }

    /// Admit and execute a pipeline
    ///
    /// # Errors
    /// `Conflict` if a run is in progress
    #[tracing::instrument(skip(self))]
    pub async fn execute_pipeline(&self) -> Result<PipelineOutcome, PipelineError> {
        let lease = self.start_pipeline()?;
        Ok(self.run_pipeline(lease).await)
    }

    /// Admit and execute a pipeline on a background task
    ///
    /// # Errors
    /// `Conflict` if a run is in progress
    pub fn spawn_pipeline(self: &Arc<Self>) -> Result<JoinHandle<PipelineOutcome>, PipelineError> {
        let lease = self.start_pipeline()?;
        let runner = Arc::clone(self);
        Ok(tokio::spawn(async move { runner.run_pipeline(lease).await }))
    }

    fn lease(&self) -> RunLease {
        RunLease {
            state: Arc::clone(&self.state),
        }
    }

    fn enter(&self, id: &StageId) -> Result<(), StateMachineError> {
        let mut state = self.state.lock();
        validate_transition(state.status_of(id.as_str()), StageStatus::Running)?;
        state.current_stage = Some(id.clone());
        Ok(())
    }

    fn record(&self, id: &StageId, record: StageRecord) -> Result<(), StateMachineError> {
        let mut state = self.state.lock();
        validate_transition(state.status_of(id.as_str()), record.status)?;
        if state.current_stage.as_ref() == Some(id) {
            state.current_stage = None;
        }
        state.results.insert(id.clone(), record);
        Ok(())
    }

    fn skip(&self, id: &StageId, reason: String) -> StageOutcome {
        let record = StageRecord::skipped(reason);
        if let Err(err) = self.record(id, record.clone()) {
            tracing::error!(stage = %id, error = %err, "could not record skip");
        }
        StageOutcome {
            stage: id.clone(),
            record,
            report_path: None,
        }
    }

    fn fail(&self, stage: &Stage, err: StageExecutionError) -> PipelineError {
        let blocks = join_ids(&self.blocked_stages(stage.id.as_str()));
        tracing::error!(stage = %stage.id, error = %err, %blocks, "stage failed");
        if let Err(state_err) = self.record(&stage.id, StageRecord::failed(err.to_string())) {
            return state_err.into();
        }
        err.into()
    }

    async fn run_admitted(
        &self,
        stage: &Stage,
        budget: Duration,
    ) -> Result<StageOutcome, PipelineError> {
        tracing::info!(stage = %stage.id, kind = %stage.kind, "stage started");

        let report = match tokio::time::timeout(budget, self.executor.execute(stage)).await {
            Ok(Ok(report)) => report,
            Ok(Err(err)) => return Err(self.fail(stage, err)),
            Err(_) => return Err(self.fail(stage, StageExecutionError::Timeout(budget))),
        };

        let path = match self.store.save(stage.kind, &report).await {
            Ok(path) => path,
            Err(err) => return Err(self.fail(stage, err.into())),
        };

        let meets = stage.success_criteria.evaluate(&report.metrics());
        let record = StageRecord::completed(report.summary, meets);
        self.record(&stage.id, record.clone())?;

        if meets {
            tracing::info!(
                stage = %stage.id,
                passed = report.summary.passed,
                total = report.summary.total,
                "stage completed"
            );
        } else {
            tracing::warn!(
                stage = %stage.id,
                pass_rate = report.summary.pass_rate,
                criteria = %stage.success_criteria,
                blocks = %join_ids(&self.blocked_stages(stage.id.as_str())),
                "stage completed below success criteria"
            );
        }

        Ok(StageOutcome {
            stage: stage.id.clone(),
            record,
            report_path: Some(path),
        })
    }
}

fn unmet_in(state: &PipelineState, stage: &Stage) -> Vec<StageId> {
    stage
        .dependencies
        .iter()
        .filter(|dep| {
            !state
                .results
                .get(dep.as_str())
                .is_some_and(StageRecord::is_satisfied)
        })
        .cloned()
        .collect()
}

fn join_ids(ids: &[StageId]) -> String {
    ids.iter().map(StageId::as_str).collect::<Vec<_>>().join(", ")
}
