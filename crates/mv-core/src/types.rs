//! Core types for the validation pipeline
//!
//! Stages, per-item results, stage reports and the pipeline status snapshot.
//! JSON field names are camelCase since these types are served over HTTP and
//! written to the report store as-is.

use crate::criteria::SuccessCriteria;
use crate::error::ConfigError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Validation category covered by a stage
///
/// Also the report store key and the score category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageKind {
    /// Table presence and shape
    Tables,
    /// Function invocations
    Functions,
    /// API endpoint responses
    Endpoints,
    /// Table-to-table references
    References,
}

impl StageKind {
    /// All kinds in score order
    pub const ALL: [StageKind; 4] = [
        StageKind::Tables,
        StageKind::Functions,
        StageKind::Endpoints,
        StageKind::References,
    ];

    /// Wire name (`tables`, `functions`, ...)
    #[inline]
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            StageKind::Tables => "tables",
            StageKind::Functions => "functions",
            StageKind::Endpoints => "endpoints",
            StageKind::References => "references",
        }
    }

    /// Kind of the individual items this stage checks
    #[inline]
    #[must_use]
    pub const fn item_kind(self) -> ItemKind {
        match self {
            StageKind::Tables => ItemKind::Table,
            StageKind::Functions => ItemKind::Function,
            StageKind::Endpoints => ItemKind::Endpoint,
            StageKind::References => ItemKind::Reference,
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StageKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        StageKind::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| ConfigError::UnknownStageType(s.to_string()))
    }
}

/// Kind of a single checked item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    /// A table
    Table,
    /// A function
    Function,
    /// An endpoint
    Endpoint,
    /// A reference between tables
    Reference,
}

/// Stage identifier
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StageId(String);

impl StageId {
    /// Create a new stage id
    #[inline]
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow as string slice
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for StageId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for StageId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<StageKind> for StageId {
    fn from(value: StageKind) -> Self {
        Self::new(value.as_str())
    }
}

/// A validation stage descriptor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stage {
    /// Unique id
    pub id: StageId,
    /// Display name
    pub name: String,
    /// Category checked by this stage
    pub kind: StageKind,
    /// Stages that must have succeeded first
    #[serde(default)]
    pub dependencies: BTreeSet<StageId>,
    /// Predicate gating dependents
    pub success_criteria: SuccessCriteria,
    /// Rough expected run time
    #[serde(rename = "estimatedDurationSecs", with = "duration_secs")]
    pub estimated_duration: Duration,
}

impl Stage {
    /// Create a stage with no dependencies and a 95% pass-rate criteria
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>, kind: StageKind) -> Self {
        Self {
            id: StageId::new(id),
            name: name.into(),
            kind,
            dependencies: BTreeSet::new(),
            success_criteria: SuccessCriteria::min_pass_rate(95.0),
            estimated_duration: Duration::from_secs(60),
        }
    }

    /// Add a dependency
    #[must_use]
    pub fn depends_on(mut self, id: impl Into<String>) -> Self {
        self.dependencies.insert(StageId::new(id));
        self
    }

    /// Replace success criteria
    #[must_use]
    pub fn with_criteria(mut self, criteria: SuccessCriteria) -> Self {
        self.success_criteria = criteria;
        self
    }

    /// Set estimated duration
    #[must_use]
    pub fn with_estimated_duration(mut self, duration: Duration) -> Self {
        self.estimated_duration = duration;
        self
    }
}

/// Counts for one stage category
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metrics {
    /// Items expected
    pub total: u64,
    /// Items actually checked
    pub validated: u64,
    /// Checked items that passed
    pub passed: u64,
    /// Checked items that failed
    pub failed: u64,
}

impl Metrics {
    /// Build metrics, clamping so that `passed <= validated <= total`
    #[must_use]
    pub fn new(total: u64, validated: u64, passed: u64) -> Self {
        let validated = validated.min(total);
        let passed = passed.min(validated);
        Self {
            total,
            validated,
            passed,
            failed: validated - passed,
        }
    }

    /// Derive metrics from a report summary
    #[must_use]
    pub fn from_summary(summary: &ReportSummary) -> Self {
        Self::new(
            summary.total,
            summary.passed + summary.failed,
            summary.passed,
        )
    }

    /// `passed / validated * 100`, or 0 when nothing was validated
    #[must_use]
    pub fn pass_rate(&self) -> f64 {
        if self.validated == 0 {
            0.0
        } else {
            self.passed as f64 / self.validated as f64 * 100.0
        }
    }
}

/// Outcome of checking a single item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    /// Whether the item passed
    pub success: bool,
    /// Item name
    pub name: String,
    /// Item kind
    pub kind: ItemKind,
    /// Failure reason
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Extra detail recorded by the check
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: serde_json::Map<String, serde_json::Value>,
    /// When the check finished
    pub timestamp: DateTime<Utc>,
}

impl ValidationResult {
    /// A passing result
    #[must_use]
    pub fn passed(name: impl Into<String>, kind: ItemKind) -> Self {
        Self {
            success: true,
            name: name.into(),
            kind,
            error: None,
            metadata: serde_json::Map::new(),
            timestamp: Utc::now(),
        }
    }

    /// A failing result carrying its reason
    #[must_use]
    pub fn failed(name: impl Into<String>, kind: ItemKind, error: impl Into<String>) -> Self {
        Self {
            success: false,
            name: name.into(),
            kind,
            error: Some(error.into()),
            metadata: serde_json::Map::new(),
            timestamp: Utc::now(),
        }
    }

    /// Attach metadata
    #[must_use]
    pub fn with_metadata(mut self, metadata: serde_json::Map<String, serde_json::Value>) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Aggregate counts of a report
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportSummary {
    /// Items checked
    pub total: u64,
    /// Items passed
    pub passed: u64,
    /// Items failed
    pub failed: u64,
    /// `passed / total * 100`, 0 for an empty report
    pub pass_rate: f64,
}

impl ReportSummary {
    /// Summarise a result list
    #[must_use]
    pub fn from_results(results: &[ValidationResult]) -> Self {
        let total = results.len() as u64;
        let passed = results.iter().filter(|r| r.success).count() as u64;
        let pass_rate = if total == 0 {
            0.0
        } else {
            passed as f64 / total as f64 * 100.0
        };
        Self {
            total,
            passed,
            failed: total - passed,
            pass_rate,
        }
    }
}

/// Persisted outcome of one stage run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    /// Stage that produced the report
    pub stage: StageId,
    /// Category of the stage
    pub kind: StageKind,
    /// Aggregate counts
    pub summary: ReportSummary,
    /// Per-item results in check order
    pub results: Vec<ValidationResult>,
    /// Wall time of the stage in milliseconds
    pub duration_ms: u64,
    /// When the report was produced
    pub timestamp: DateTime<Utc>,
}

impl ValidationReport {
    /// Build a report, computing the summary from `results`
    #[must_use]
    pub fn new(
        stage: StageId,
        kind: StageKind,
        results: Vec<ValidationResult>,
        duration: Duration,
    ) -> Self {
        Self {
            stage,
            kind,
            summary: ReportSummary::from_results(&results),
            results,
            duration_ms: u64::try_from(duration.as_millis()).unwrap_or(u64::MAX),
            timestamp: Utc::now(),
        }
    }

    /// Override the report timestamp
    #[must_use]
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Score inputs for this report
    #[inline]
    #[must_use]
    pub fn metrics(&self) -> Metrics {
        Metrics::from_summary(&self.summary)
    }
}

/// Lifecycle status of a stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageStatus {
    /// Never run
    Idle,
    /// Executing now
    Running,
    /// Ran to completion (may still have failing items)
    Completed,
    /// Could not run to completion
    Failed,
    /// Not executed because dependencies were unmet
    Skipped,
}

/// Last recorded outcome of a stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageRecord {
    /// Terminal status of the last run
    pub status: StageStatus,
    /// Stage ran to completion
    pub success: bool,
    /// Stage metrics satisfied its success criteria
    pub meets_success_criteria: bool,
    /// Failure or skip reason
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Report summary when completed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<ReportSummary>,
    /// When the outcome was recorded
    pub finished_at: DateTime<Utc>,
}

impl StageRecord {
    /// Completed run
    #[must_use]
    pub fn completed(summary: ReportSummary, meets_success_criteria: bool) -> Self {
        Self {
            status: StageStatus::Completed,
            success: true,
            meets_success_criteria,
            error: None,
            summary: Some(summary),
            finished_at: Utc::now(),
        }
    }

    /// Failed run
    #[must_use]
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            status: StageStatus::Failed,
            success: false,
            meets_success_criteria: false,
            error: Some(error.into()),
            summary: None,
            finished_at: Utc::now(),
        }
    }

    /// Not executed (unmet dependencies, pipeline deadline)
    #[must_use]
    pub fn skipped(reason: impl Into<String>) -> Self {
        Self {
            status: StageStatus::Skipped,
            success: false,
            meets_success_criteria: false,
            error: Some(reason.into()),
            summary: None,
            finished_at: Utc::now(),
        }
    }

    /// Whether dependents may run after this stage
    #[inline]
    #[must_use]
    pub fn is_satisfied(&self) -> bool {
        self.success && self.meets_success_criteria
    }
}

/// Snapshot of the pipeline status
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineState {
    /// A stage or pipeline is executing
    pub running: bool,
    /// Stage currently executing
    pub current_stage: Option<StageId>,
    /// Last outcome per stage
    pub results: BTreeMap<StageId, StageRecord>,
}

impl PipelineState {
    /// Last recorded status of a stage
    #[must_use]
    pub fn status_of(&self, id: &str) -> StageStatus {
        if self.current_stage.as_ref().is_some_and(|c| c.as_str() == id) {
            return StageStatus::Running;
        }
        self.results
            .get(id)
            .map_or(StageStatus::Idle, |r| r.status)
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub(super) fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_kind_round_trips_through_str() {
        for kind in StageKind::ALL {
            assert_eq!(kind.as_str().parse::<StageKind>().unwrap(), kind);
        }
        assert!(matches!(
            "schemas".parse::<StageKind>(),
            Err(ConfigError::UnknownStageType(_))
        ));
    }

    #[test]
    fn metrics_pass_rate_zero_when_empty() {
        let m = Metrics::new(0, 0, 0);
        assert_eq!(m.pass_rate(), 0.0);
        assert!(!m.pass_rate().is_nan());
    }

    #[test]
    fn metrics_clamps_counts() {
        let m = Metrics::new(10, 12, 15);
        assert_eq!(m.validated, 10);
        assert_eq!(m.passed, 10);
        assert_eq!(m.failed, 0);

        let m = Metrics::new(10, 8, 6);
        assert_eq!(m.failed, 2);
        assert_eq!(m.pass_rate(), 75.0);
    }

    #[test]
    fn summary_from_results() {
        let results = vec![
            ValidationResult::passed("users", ItemKind::Table),
            ValidationResult::passed("orders", ItemKind::Table),
            ValidationResult::failed("audit", ItemKind::Table, "missing"),
            ValidationResult::passed("items", ItemKind::Table),
        ];
        let summary = ReportSummary::from_results(&results);
        assert_eq!(summary.total, 4);
        assert_eq!(summary.passed, 3);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.pass_rate, 75.0);
    }

    #[test]
    fn empty_summary_has_zero_pass_rate() {
        let summary = ReportSummary::from_results(&[]);
        assert_eq!(summary.pass_rate, 0.0);
    }

    #[test]
    fn report_serializes_camel_case() {
        let report = ValidationReport::new(
            StageId::from(StageKind::Tables),
            StageKind::Tables,
            vec![ValidationResult::failed("users", ItemKind::Table, "absent")],
            Duration::from_millis(1500),
        );
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["kind"], "tables");
        assert_eq!(json["durationMs"], 1500);
        assert_eq!(json["summary"]["passRate"], 0.0);
        assert_eq!(json["results"][0]["kind"], "table");
        assert_eq!(json["results"][0]["error"], "absent");
        assert!(json["results"][0].get("metadata").is_none());
    }

    #[test]
    fn stage_deserializes_with_tagged_criteria() {
        let stage: Stage = serde_json::from_value(serde_json::json!({
            "id": "functions",
            "name": "Function validation",
            "kind": "functions",
            "dependencies": ["tables"],
            "successCriteria": { "kind": "minPassRate", "value": 90.0 },
            "estimatedDurationSecs": 120
        }))
        .unwrap();
        assert!(stage.dependencies.contains("tables"));
        assert_eq!(stage.success_criteria, SuccessCriteria::min_pass_rate(90.0));
        assert_eq!(stage.estimated_duration, Duration::from_secs(120));
    }

    #[test]
    fn record_satisfaction() {
        let summary = ReportSummary::default();
        assert!(StageRecord::completed(summary, true).is_satisfied());
        assert!(!StageRecord::completed(summary, false).is_satisfied());
        assert!(!StageRecord::failed("boom").is_satisfied());
        let skipped = StageRecord::skipped("unmet dependencies: tables");
        assert_eq!(skipped.status, StageStatus::Skipped);
        assert!(!skipped.is_satisfied());
    }

    #[test]
    fn status_of_reports_running_stage() {
        let mut state = PipelineState::default();
        assert_eq!(state.status_of("tables"), StageStatus::Idle);
        state.running = true;
        state.current_stage = Some(StageId::new("tables"));
        assert_eq!(state.status_of("tables"), StageStatus::Running);
    }
}
