//! Analysis error and notice types.
//!
//! `AnalysisError` aborts a run: the input is malformed and no result is
//! produced. `DegenerateInput` never aborts; it records a place where a
//! documented fallback constant was substituted so callers can tell an
//! estimate from a placeholder.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that abort an analysis run.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AnalysisError {
    /// A response row does not have one answer per answer-key item.
    #[error("student '{student}' has {found} answers, answer key has {expected} items")]
    ShapeMismatch {
        student: String,
        expected: usize,
        found: usize,
    },

    /// There are no students or no items to analyze.
    #[error("cannot analyze an empty cohort ({students} students, {items} items)")]
    EmptyCohort { students: usize, items: usize },

    /// The answer key is not a contiguous `Q1..Qn` mapping to single letters.
    #[error("invalid answer key: {0}")]
    InvalidAnswerKey(String),

    /// A custom item estimator returned the wrong number of items.
    #[error("item estimator '{estimator}' returned {found} items, expected {expected}")]
    EstimatorOutput {
        estimator: String,
        expected: usize,
        found: usize,
    },
}

impl AnalysisError {
    /// Returns `true` if the error comes from the shape of the input rather
    /// than from the answer key itself.
    pub fn is_input_shape(&self) -> bool {
        matches!(
            self,
            AnalysisError::ShapeMismatch { .. } | AnalysisError::EmptyCohort { .. }
        )
    }
}

/// A statistic that could not be computed and was replaced by its fallback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Error)]
#[serde(tag = "tipo", rename_all = "snake_case")]
pub enum DegenerateInput {
    /// Item correctness (or the total score) has zero variance, so the
    /// item-total correlation is undefined.
    #[error("{item}: item-total correlation undefined, discrimination set to 0.5")]
    ZeroVarianceItem { item: String },

    /// The correlation between the item and the ability vector is undefined.
    #[error("{item}: point-biserial correlation undefined, set to 0")]
    UndefinedPointBiserial { item: String },

    /// Reliability could not be computed.
    #[error("reliability could not be computed ({reason}), set to 0.7")]
    Reliability { reason: String },

    /// Every student has the same ability, so z-scores are undefined.
    #[error("abilities have zero spread, z-scores set to 0")]
    UniformAbility,

    /// Nobody passed the tutor thresholds; the top students by ability are used.
    #[error("no student passed the tutor thresholds, using the top {count} by ability")]
    NoEligibleTutors { count: usize },
}
