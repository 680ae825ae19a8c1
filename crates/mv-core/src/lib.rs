//! Migration validation core (mv-core)
//!
//! Domain model shared by the store, the pipeline and the HTTP surface:
//! - Stage descriptors and the validated [`StageRegistry`]
//! - Per-item [`ValidationResult`]s and per-stage [`ValidationReport`]s
//! - Data-driven [`SuccessCriteria`]
//! - The weighted [`MigrationScore`]
//!
//! # Example
//!
//! ```rust
//! use mv_core::prelude::*;
//! use std::collections::BTreeMap;
//!
//! let registry = StageRegistry::default();
//! assert!(registry.get_stage("tables").is_some());
//!
//! let mut metrics = BTreeMap::new();
//! for kind in StageKind::ALL {
//!     metrics.insert(kind, Metrics::new(10, 10, 10));
//! }
//! assert_eq!(calculate_score(&metrics).status, ScoreStatus::Ready);
//! ```

pub mod criteria;
pub mod error;
pub mod registry;
pub mod score;
pub mod state_machine;
pub mod types;

pub use criteria::SuccessCriteria;
pub use error::{ConfigError, StateMachineError};
pub use registry::StageRegistry;
pub use score::{calculate_score, MigrationScore, ScoreStatus};
pub use types::*;

/// Prelude module for common imports
pub mod prelude {
    pub use crate::{
        calculate_score, ConfigError, ItemKind, Metrics, MigrationScore, PipelineState,
        ReportSummary, ScoreStatus, Stage, StageId, StageKind, StageRecord, StageRegistry,
        StageStatus, SuccessCriteria, ValidationReport, ValidationResult,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
