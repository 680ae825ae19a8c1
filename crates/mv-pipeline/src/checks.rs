//! Check sources
//!
//! A [`StageChecks`] implementation knows, for one stage kind, which items
//! exist and how to check one of them against the target system. The
//! executor owns the orchestration; sources only talk to the outside world.

use crate::error::{CheckError, StageExecutionError};
use crate::manifest::{EndpointSpec, FunctionSpec, ReferenceSpec, TableSpec};
use mv_core::{ItemKind, StageKind, ValidationResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// One item to check
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckTarget {
    /// Display name, copied into the result
    pub name: String,
    /// Item kind
    pub kind: ItemKind,
    /// What exactly to check
    pub detail: TargetDetail,
}

/// Kind-specific check parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum TargetDetail {
    /// Table must exist with these columns
    Table(TableSpec),
    /// Function must be invocable
    Function(FunctionSpec),
    /// Endpoint must answer with the expected status
    Endpoint(EndpointSpec),
    /// Field must reference the target table
    Reference(ReferenceSpec),
}

impl CheckTarget {
    /// Table target
    #[must_use]
    pub fn table(spec: TableSpec) -> Self {
        Self {
            name: spec.name.clone(),
            kind: ItemKind::Table,
            detail: TargetDetail::Table(spec),
        }
    }

    /// Function target
    #[must_use]
    pub fn function(spec: FunctionSpec) -> Self {
        Self {
            name: spec.name.clone(),
            kind: ItemKind::Function,
            detail: TargetDetail::Function(spec),
        }
    }

    /// Endpoint target, named `METHOD path` unless it has an explicit name
    #[must_use]
    pub fn endpoint(spec: EndpointSpec) -> Self {
        Self {
            name: spec.display_name(),
            kind: ItemKind::Endpoint,
            detail: TargetDetail::Endpoint(spec),
        }
    }

    /// Reference target, named `table.field -> target`
    #[must_use]
    pub fn reference(spec: ReferenceSpec) -> Self {
        Self {
            name: format!("{}.{} -> {}", spec.table, spec.field, spec.target_table),
            kind: ItemKind::Reference,
            detail: TargetDetail::Reference(spec),
        }
    }
}

/// Result of a check that ran to completion
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CheckOutcome {
    /// Item passed
    pub success: bool,
    /// Why it did not
    pub error: Option<String>,
    /// Extra detail to record
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl CheckOutcome {
    /// Passing outcome
    #[inline]
    #[must_use]
    pub fn pass() -> Self {
        Self {
            success: true,
            ..Self::default()
        }
    }

    /// Failing outcome
    #[inline]
    #[must_use]
    pub fn fail(reason: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(reason.into()),
            ..Self::default()
        }
    }

    /// Attach a metadata entry
    #[must_use]
    pub fn with_meta(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    /// Convert into the stored result for `target`
    #[must_use]
    pub fn into_result(self, target: &CheckTarget) -> ValidationResult {
        let result = if self.success {
            ValidationResult::passed(&target.name, target.kind)
        } else {
            ValidationResult::failed(
                &target.name,
                target.kind,
                self.error.unwrap_or_else(|| "check failed".to_string()),
            )
        };
        result.with_metadata(self.metadata)
    }
}

/// Source of targets and checks for one stage kind
#[async_trait::async_trait]
pub trait StageChecks: Send + Sync {
    /// Items to check
    ///
    /// An error here fails the whole stage (e.g. the target is unreachable).
    async fn targets(&self) -> Result<Vec<CheckTarget>, StageExecutionError>;

    /// Check a single item
    ///
    /// An error here fails only this item.
    async fn check(&self, target: &CheckTarget) -> Result<CheckOutcome, CheckError>;
}

/// Check sources keyed by stage kind
#[derive(Clone, Default)]
pub struct CheckSources {
    sources: HashMap<StageKind, Arc<dyn StageChecks>>,
}

impl CheckSources {
    /// Empty set of sources
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the source for a kind
    #[must_use]
    pub fn with(mut self, kind: StageKind, source: Arc<dyn StageChecks>) -> Self {
        self.sources.insert(kind, source);
        self
    }

    /// Register (or replace) the source for a kind
    pub fn register(&mut self, kind: StageKind, source: Arc<dyn StageChecks>) {
        self.sources.insert(kind, source);
    }

    /// Source for a kind
    #[must_use]
    pub fn get(&self, kind: StageKind) -> Option<Arc<dyn StageChecks>> {
        self.sources.get(&kind).cloned()
    }

    /// Registered kinds
    #[must_use]
    pub fn kinds(&self) -> Vec<StageKind> {
        let mut kinds: Vec<StageKind> = self.sources.keys().copied().collect();
        kinds.sort();
        kinds
    }
}

impl fmt::Debug for CheckSources {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CheckSources")
            .field("kinds", &self.kinds())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_into_result() {
        let target = CheckTarget::table(TableSpec::new("users"));
        let result = CheckOutcome::pass()
            .with_meta("columnCount", 4)
            .into_result(&target);
        assert!(result.success);
        assert_eq!(result.name, "users");
        assert_eq!(result.kind, ItemKind::Table);
        assert_eq!(result.metadata["columnCount"], 4);

        let result = CheckOutcome::fail("missing").into_result(&target);
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("missing"));
    }

    #[test]
    fn failed_outcome_without_reason_still_has_error() {
        let target = CheckTarget::table(TableSpec::new("users"));
        let outcome = CheckOutcome {
            success: false,
            ..CheckOutcome::default()
        };
        assert_eq!(
            outcome.into_result(&target).error.as_deref(),
            Some("check failed")
        );
    }

    #[test]
    fn target_names() {
        let reference = CheckTarget::reference(ReferenceSpec {
            table: "orders".into(),
            field: "user_id".into(),
            target_table: "users".into(),
        });
        assert_eq!(reference.name, "orders.user_id -> users");

        let endpoint = CheckTarget::endpoint(EndpointSpec::get("/api/users"));
        assert_eq!(endpoint.name, "GET /api/users");
    }
}
