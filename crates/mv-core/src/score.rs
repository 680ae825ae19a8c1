//! Migration score
//!
//! Weighted aggregate of per-category pass rates. Pure and deterministic:
//! the score is recomputed from the latest reports on every read and never
//! stored.

use crate::types::{Metrics, StageKind};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Weight of the tables category
pub const TABLES_WEIGHT: f64 = 0.20;
/// Weight of the functions category
pub const FUNCTIONS_WEIGHT: f64 = 0.30;
/// Weight of the endpoints category
pub const ENDPOINTS_WEIGHT: f64 = 0.30;
/// Weight of the references category
pub const REFERENCES_WEIGHT: f64 = 0.20;

/// Overall score at or above which the migration is ready
pub const READY_THRESHOLD: u8 = 95;
/// Overall score at or above which the migration is nearly ready
pub const NEAR_READY_THRESHOLD: u8 = 80;

/// Weight applied to a category. Weights sum to 1.0.
#[inline]
#[must_use]
pub const fn weight(kind: StageKind) -> f64 {
    match kind {
        StageKind::Tables => TABLES_WEIGHT,
        StageKind::Functions => FUNCTIONS_WEIGHT,
        StageKind::Endpoints => ENDPOINTS_WEIGHT,
        StageKind::References => REFERENCES_WEIGHT,
    }
}

/// Readiness label derived from the overall score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScoreStatus {
    /// overall >= 95
    Ready,
    /// overall >= 80
    NearReady,
    /// overall > 0
    InProgress,
    /// overall == 0
    NotStarted,
}

impl ScoreStatus {
    /// Classify an overall score
    #[must_use]
    pub const fn from_overall(overall: u8) -> Self {
        if overall >= READY_THRESHOLD {
            Self::Ready
        } else if overall >= NEAR_READY_THRESHOLD {
            Self::NearReady
        } else if overall > 0 {
            Self::InProgress
        } else {
            Self::NotStarted
        }
    }
}

/// Weighted migration score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationScore {
    /// Tables pass rate, rounded
    pub tables: u8,
    /// Functions pass rate, rounded
    pub functions: u8,
    /// Endpoints pass rate, rounded
    pub endpoints: u8,
    /// References pass rate, rounded
    pub references: u8,
    /// Weighted overall score
    pub overall: u8,
    /// Readiness label
    pub status: ScoreStatus,
}

fn to_percent(value: f64) -> u8 {
    let v = value.round();
    if v.is_nan() || v <= 0.0 {
        0
    } else if v >= 100.0 {
        100
    } else {
        v as u8
    }
}

/// Compute the migration score; missing categories count as 0
#[must_use]
pub fn calculate_score(metrics: &BTreeMap<StageKind, Metrics>) -> MigrationScore {
    let rate = |kind: StageKind| metrics.get(&kind).map_or(0.0, Metrics::pass_rate);

    let weighted: f64 = StageKind::ALL
        .into_iter()
        .map(|kind| weight(kind) * rate(kind))
        .sum();
    let overall = to_percent(weighted);

    MigrationScore {
        tables: to_percent(rate(StageKind::Tables)),
        functions: to_percent(rate(StageKind::Functions)),
        endpoints: to_percent(rate(StageKind::Endpoints)),
        references: to_percent(rate(StageKind::References)),
        overall,
        status: ScoreStatus::from_overall(overall),
    }
}
