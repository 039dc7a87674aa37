//! Core trait definitions for item parameter estimation.
//!
//! The analysis pipeline only depends on `ItemEstimator`, so a calibrated
//! fitting procedure can replace the closed-form heuristic without touching
//! ability estimation, reliability or reporting.

use serde::{Deserialize, Serialize};

use crate::matrix::ResponseMatrix;
use crate::statistics::Estimate;

/// Strategy that turns a response matrix into per-item parameters.
pub trait ItemEstimator: Send + Sync {
    /// Short identifier recorded in the report (e.g. "heuristic").
    fn name(&self) -> &str;

    /// Estimate difficulty and discrimination for every column, in column
    /// order. Must return exactly one entry per item.
    fn estimate(&self, matrix: &ResponseMatrix) -> Vec<ItemEstimate>;
}

/// Parameters produced by an `ItemEstimator` for one item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemEstimate {
    /// Item id (`Q1..Qn`).
    pub item: String,
    /// Difficulty `b`; higher is harder.
    pub difficulty: f64,
    /// Discrimination `a`, flagged when it is the fallback constant.
    pub discrimination: Estimate<f64>,
}
