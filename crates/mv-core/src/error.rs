//! Error types for the validation domain
//!
//! Covers:
//! - Malformed stage configuration (unknown ids, cycles, bad ordering)
//! - Unknown stage types coming from callers
//! - Illegal stage lifecycle transitions

use crate::types::StageStatus;

/// Configuration errors
///
/// Raised while authoring or loading the stage registry, and when a caller
/// names a stage type that does not exist. Always a client/config problem.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    /// Stage type string not recognised
    #[error("unknown stage type: {0}")]
    UnknownStageType(String),

    /// Two stages share an id
    #[error("duplicate stage id: {0}")]
    DuplicateStage(String),

    /// A dependency names a stage that is not registered
    #[error("stage {stage} depends on unknown stage {dependency}")]
    UnknownDependency {
        /// Declaring stage
        stage: String,
        /// Missing dependency id
        dependency: String,
    },

    /// Dependencies form a cycle
    #[error("dependency cycle detected at stage {0}")]
    CycleDetected(String),

    /// A dependency is declared after its dependent
    #[error("stage {stage} is declared before its dependency {dependency}")]
    OutOfOrder {
        /// Declaring stage
        stage: String,
        /// Dependency declared later
        dependency: String,
    },

    /// Success criteria cannot be satisfied or is malformed
    #[error("invalid success criteria for stage {stage}: {reason}")]
    InvalidCriteria {
        /// Stage owning the criteria
        stage: String,
        /// What is wrong
        reason: String,
    },

    /// Registry contains no stages
    #[error("stage registry is empty")]
    EmptyRegistry,

    /// Anything else wrong with loaded configuration
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Stage lifecycle errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum StateMachineError {
    /// The transition is not in the allowed table
    #[error("illegal stage transition: {from:?} -> {to:?}")]
    IllegalTransition {
        /// Current status
        from: StageStatus,
        /// Requested status
        to: StageStatus,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_display() {
        let err = ConfigError::UnknownDependency {
            stage: "functions".to_string(),
            dependency: "schemas".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "stage functions depends on unknown stage schemas"
        );
    }

    #[test]
    fn state_machine_error_display() {
        let err = StateMachineError::IllegalTransition {
            from: StageStatus::Idle,
            to: StageStatus::Completed,
        };
        assert!(err.to_string().contains("Idle -> Completed"));
    }
}
