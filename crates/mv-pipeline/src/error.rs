//! Error types for stage execution and pipeline orchestration
//!
//! Three levels, matching how far an error is allowed to travel:
//! - [`CheckError`]: one item failed to check; converted into a failed result
//! - [`StageExecutionError`]: the stage as a whole could not run
//! - [`PipelineError`]: what callers of the runner see (conflicts, unknown
//!   stages, unmet dependencies, stage failures)

use mv_core::{ConfigError, StageId, StageKind, StateMachineError};
use mv_store::StoreError;
use std::time::Duration;

/// Item-level check failure
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CheckError {
    /// Transport or protocol failure talking to the target
    #[error("request failed: {0}")]
    Request(String),

    /// Check exceeded its time bound
    #[error("check timed out after {0:?}")]
    Timeout(Duration),

    /// Check panicked
    #[error("check panicked: {0}")]
    Panicked(String),

    /// Response could not be interpreted
    #[error("unexpected response: {0}")]
    Unexpected(String),
}

impl From<reqwest::Error> for CheckError {
    fn from(value: reqwest::Error) -> Self {
        if value.is_timeout() {
            Self::Request(format!("timed out: {value}"))
        } else if value.is_decode() {
            Self::Unexpected(value.to_string())
        } else {
            Self::Request(value.to_string())
        }
    }
}

/// Stage-level failure
#[derive(Debug, thiserror::Error)]
pub enum StageExecutionError {
    /// Target system cannot be reached at all
    #[error("target unreachable: {0}")]
    Unreachable(String),

    /// Nothing registered to check this kind
    #[error("no check source registered for {0}")]
    NoCheckSource(StageKind),

    /// Target list could not be produced
    #[error("failed to load check targets: {0}")]
    Targets(String),

    /// Stage exceeded its time bound
    #[error("stage timed out after {0:?}")]
    Timeout(Duration),

    /// Report could not be persisted
    #[error("failed to persist report: {0}")]
    Store(#[from] StoreError),
}

/// Errors surfaced by the pipeline runner
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Another stage or pipeline is already running
    #[error("a validation run is already in progress")]
    Conflict {
        /// Stage executing at the time of the request
        current_stage: Option<StageId>,
    },

    /// Stage id not in the registry
    #[error("stage not found: {0}")]
    StageNotFound(String),

    /// Dependencies have not succeeded
    #[error("dependencies not met for stage {stage}")]
    UnmetDependencies {
        /// Requested stage
        stage: StageId,
        /// Dependencies lacking a satisfied result
        unmet: Vec<StageId>,
    },

    /// The stage ran and failed
    #[error("stage execution failed: {0}")]
    Stage(#[from] StageExecutionError),

    /// Bad configuration or request parameter
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Stage lifecycle violated
    #[error("stage state error: {0}")]
    State(#[from] StateMachineError),
}

impl PipelineError {
    /// HTTP status code for this error
    #[must_use]
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Conflict { .. } => 409,
            Self::StageNotFound(_) => 404,
            Self::UnmetDependencies { .. } | Self::Config(_) => 400,
            Self::Stage(_) | Self::State(_) => 500,
        }
    }

    /// Whether the caller caused this error
    #[inline]
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status_code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes() {
        assert_eq!(PipelineError::Conflict { current_stage: None }.status_code(), 409);
        assert_eq!(PipelineError::StageNotFound("x".into()).status_code(), 404);
        let unmet = PipelineError::UnmetDependencies {
            stage: StageId::new("functions"),
            unmet: vec![StageId::new("tables")],
        };
        assert_eq!(unmet.status_code(), 400);
        assert!(unmet.is_client_error());

        let stage = PipelineError::from(StageExecutionError::Unreachable("down".into()));
        assert_eq!(stage.status_code(), 500);
        assert!(!stage.is_client_error());
    }

    #[test]
    fn config_error_is_client_error() {
        let err = PipelineError::from(ConfigError::UnknownStageType("nope".into()));
        assert!(err.is_client_error());
        assert_eq!(err.to_string(), "configuration error: unknown stage type: nope");
    }
}
