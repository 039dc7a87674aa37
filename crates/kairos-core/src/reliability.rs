//! Point-biserial correlations and the reliability proxy.

use thiserror::Error;

use crate::statistics::{clip, mean, pearson, Estimate};

/// Point-biserial used when the item/ability correlation is undefined.
pub const POINT_BISERIAL_FALLBACK: f64 = 0.0;
/// Reliability reported when it cannot be computed.
pub const RELIABILITY_FALLBACK: f64 = 0.7;

/// Why the reliability proxy could not be computed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReliabilityError {
    #[error("needs at least 2 items, got {0}")]
    TooFewItems(usize),

    #[error("no item has a defined point-biserial correlation")]
    NoDefinedCorrelation,

    #[error("denominator is zero")]
    ZeroDenominator,

    #[error("result is not finite")]
    NonFinite,
}

/// Correlation between an item's 0/1 column and the ability vector.
pub fn point_biserial(column: &[f64], abilities: &[f64]) -> Estimate<f64> {
    Estimate::or_fallback(pearson(column, abilities), POINT_BISERIAL_FALLBACK)
}

/// `(n * r) / (1 + (n - 1) * r)` over the mean point-biserial `r`, clamped
/// to `[0, 1]`.
pub fn reliability(correlations: &[Estimate<f64>]) -> Result<f64, ReliabilityError> {
    let n = correlations.len();
    if n < 2 {
        return Err(ReliabilityError::TooFewItems(n));
    }
    if correlations.iter().all(|c| c.used_fallback) {
        return Err(ReliabilityError::NoDefinedCorrelation);
    }

    let values: Vec<f64> = correlations.iter().map(|c| c.value).collect();
    let r = mean(&values).ok_or(ReliabilityError::TooFewItems(n))?;
    let n = n as f64;
    let denominator = 1.0 + (n - 1.0) * r;
    if denominator == 0.0 {
        return Err(ReliabilityError::ZeroDenominator);
    }

    let alpha = (n * r) / denominator;
    if !alpha.is_finite() {
        return Err(ReliabilityError::NonFinite);
    }
    Ok(clip(alpha, 0.0, 1.0))
}

/// Reliability, or the fallback constant when it cannot be computed.
pub fn reliability_or_default(correlations: &[Estimate<f64>]) -> Estimate<f64> {
    Estimate::or_fallback(reliability(correlations).ok(), RELIABILITY_FALLBACK)
}
