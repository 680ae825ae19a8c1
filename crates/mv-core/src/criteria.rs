//! Stage success criteria
//!
//! Criteria are plain data (`{ "kind": "minPassRate", "value": 95 }`) and are
//! interpreted here against a stage's [`Metrics`].

use crate::error::ConfigError;
use crate::types::Metrics;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Predicate over stage metrics deciding whether dependents may run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum SuccessCriteria {
    /// Pass rate must be at least `value` percent
    MinPassRate {
        /// Threshold in percent
        value: f64,
    },
    /// At least `value` items must have been validated
    MinCount {
        /// Minimum validated items
        value: u64,
    },
    /// At most `value` items may fail
    MaxFailed {
        /// Maximum failed items
        value: u64,
    },
    /// Every nested criteria must hold
    All {
        /// Nested criteria
        criteria: Vec<SuccessCriteria>,
    },
}

impl SuccessCriteria {
    /// Pass-rate threshold
    #[inline]
    #[must_use]
    pub fn min_pass_rate(value: f64) -> Self {
        Self::MinPassRate { value }
    }

    /// Minimum validated count
    #[inline]
    #[must_use]
    pub fn min_count(value: u64) -> Self {
        Self::MinCount { value }
    }

    /// Maximum failed count
    #[inline]
    #[must_use]
    pub fn max_failed(value: u64) -> Self {
        Self::MaxFailed { value }
    }

    /// Conjunction
    #[inline]
    #[must_use]
    pub fn all(criteria: Vec<SuccessCriteria>) -> Self {
        Self::All { criteria }
    }

    /// Evaluate against metrics
    #[must_use]
    pub fn evaluate(&self, metrics: &Metrics) -> bool {
        match self {
            Self::MinPassRate { value } => metrics.pass_rate() >= *value,
            Self::MinCount { value } => metrics.validated >= *value,
            Self::MaxFailed { value } => metrics.failed <= *value,
            Self::All { criteria } => criteria.iter().all(|c| c.evaluate(metrics)),
        }
    }

    /// Reject thresholds that can never be met
    pub fn validate(&self, stage: &str) -> Result<(), ConfigError> {
        match self {
            Self::MinPassRate { value } if !(0.0..=100.0).contains(value) => {
                Err(ConfigError::InvalidCriteria {
                    stage: stage.to_string(),
                    reason: format!("pass rate {value} outside 0..=100"),
                })
            }
            Self::All { criteria } => criteria.iter().try_for_each(|c| c.validate(stage)),
            _ => Ok(()),
        }
    }
}

impl fmt::Display for SuccessCriteria {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MinPassRate { value } => write!(f, "pass rate >= {value}%"),
            Self::MinCount { value } => write!(f, "validated >= {value}"),
            Self::MaxFailed { value } => write!(f, "failed <= {value}"),
            Self::All { criteria } => {
                let parts: Vec<String> = criteria.iter().map(ToString::to_string).collect();
                write!(f, "({})", parts.join(" and "))
            }
        }
    }
}
