//! Validation pipeline (mv-pipeline)
//!
//! Executes validation stages against the migrated workspace and gates
//! dependent stages on the success criteria of their dependencies.
//!
//! # Architecture
//!
//! ```text
//! PipelineRunner ──admits──▶ StageExecutor ──targets/check──▶ StageChecks
//!       │                                                      (HttpChecks)
//!       └──persists──▶ ReportStore
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use mv_pipeline::prelude::*;
//!
//! let sources = HttpChecks::sources(&base_url, None, manifest, timeout)?;
//! let runner = PipelineRunner::new(registry, Arc::new(StageExecutor::new(sources)), store);
//! let outcome = runner.execute_stage("tables").await?;
//! ```

pub mod checks;
pub mod error;
pub mod executor;
pub mod http_checks;
pub mod manifest;
pub mod runner;

pub use checks::{CheckOutcome, CheckSources, CheckTarget, StageChecks, TargetDetail};
pub use error::{CheckError, PipelineError, StageExecutionError};
pub use executor::{ExecutorConfig, StageExecutor};
pub use http_checks::HttpChecks;
pub use manifest::{EndpointSpec, FunctionSpec, MigrationManifest, ReferenceSpec, TableSpec};
pub use runner::{
    PipelineLease, PipelineOutcome, PipelineRunner, RunLease, RunnerConfig, StageLease,
    StageOutcome,
};

/// Prelude module for common imports
pub mod prelude {
    pub use crate::{
        CheckOutcome, CheckSources, CheckTarget, ExecutorConfig, HttpChecks, MigrationManifest,
        PipelineError, PipelineOutcome, PipelineRunner, RunnerConfig, StageChecks,
        StageExecutor, StageOutcome,
    };
}
