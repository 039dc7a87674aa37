//! Item parameter estimation and item characteristic curves.
//!
//! The default estimator uses closed-form approximations instead of an
//! iterative 2PL calibration: difficulty is the negative logit of the
//! proportion correct, discrimination is a scaled item-total correlation.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::matrix::ResponseMatrix;
use crate::statistics::{clip, linspace, mean, pearson, sigmoid, Estimate};
use crate::traits::{ItemEstimate, ItemEstimator};

/// Proportions are clipped to this range before the logit.
pub const PROPORTION_BOUNDS: (f64, f64) = (0.001, 0.999);
/// Multiplier applied to the item-total correlation.
pub const DISCRIMINATION_SCALE: f64 = 2.5;
/// Discrimination used when the item-total correlation is undefined.
pub const DISCRIMINATION_FALLBACK: f64 = 0.5;

/// Difficulty from a proportion correct: `-ln(p / (1 - p))` after clipping.
pub fn difficulty_from_proportion(p: f64) -> f64 {
    let p = clip(p, PROPORTION_BOUNDS.0, PROPORTION_BOUNDS.1);
    -(p / (1.0 - p)).ln()
}

/// Two-parameter logistic probability of a correct answer.
#[inline]
pub fn probability_2pl(theta: f64, discrimination: f64, difficulty: f64) -> f64 {
    sigmoid(discrimination * (theta - difficulty))
}

/// Proportion/correlation heuristic estimator.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicItemEstimator;

impl ItemEstimator for HeuristicItemEstimator {
    fn name(&self) -> &str {
        "heuristic"
    }

    fn estimate(&self, matrix: &ResponseMatrix) -> Vec<ItemEstimate> {
        let totals: Vec<f64> = matrix.raw_scores().into_iter().map(f64::from).collect();
        let proportions = matrix.proportions_correct();

        matrix
            .item_ids()
            .iter()
            .enumerate()
            .map(|(j, item)| {
                let column = matrix.column_f64(j);
                let r = pearson(&column, &totals);
                if r.is_none() {
                    warn!(item = %item, "item-total correlation undefined, using fallback discrimination");
                }
                ItemEstimate {
                    item: item.clone(),
                    difficulty: difficulty_from_proportion(proportions[j]),
                    discrimination: Estimate::or_fallback(
                        r.map(|r| DISCRIMINATION_SCALE * r),
                        DISCRIMINATION_FALLBACK,
                    ),
                }
            })
            .collect()
    }
}

/// Upper/lower group discrimination index for item `j`.
///
/// Mean correctness of students whose ability is above the cohort median
/// minus that of students at or below it. An empty group counts as 0.
pub fn discrimination_index(matrix: &ResponseMatrix, j: usize, abilities: &[f64], median: f64) -> f64 {
    let mut upper = Vec::new();
    let mut lower = Vec::new();
    for (&v, &theta) in matrix.column(j).iter().zip(abilities) {
        if theta > median {
            upper.push(f64::from(v));
        } else {
            lower.push(f64::from(v));
        }
    }
    mean(&upper).unwrap_or(0.0) - mean(&lower).unwrap_or(0.0)
}

/// Full per-item statistics as reported to consumers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemParameters {
    /// Item id (`Q1..Qn`).
    pub item: String,
    /// Difficulty `b`.
    pub difficulty: f64,
    /// Discrimination `a`.
    pub discrimination: Estimate<f64>,
    /// Unclipped proportion of correct answers.
    pub proportion_correct: f64,
    /// `proportion_correct * 100`.
    pub percent_correct: f64,
    /// Correlation between the item and the ability vector.
    pub point_biserial: Estimate<f64>,
    /// Upper/lower group difference in proportion correct.
    pub discrimination_index: f64,
}

impl ItemParameters {
    pub fn probability(&self, theta: f64) -> f64 {
        probability_2pl(theta, self.discrimination.value, self.difficulty)
    }

    /// Qualitative reading of the discrimination value.
    pub fn discrimination_band(&self) -> DiscriminationBand {
        DiscriminationBand::from_value(self.discrimination.value)
    }

    /// Reasons this item deserves review; empty when it looks healthy.
    pub fn issues(&self) -> Vec<ItemIssue> {
        let mut issues = Vec::new();
        if self.discrimination.value < 0.3 {
            issues.push(ItemIssue::LowDiscrimination);
        }
        if self.point_biserial.value < 0.1 {
            issues.push(ItemIssue::LowCorrelation);
        }
        if self.percent_correct < 20.0 {
            issues.push(ItemIssue::TooHard);
        }
        if self.percent_correct > 90.0 {
            issues.push(ItemIssue::TooEasy);
        }
        issues
    }
}

/// Discrimination quality buckets (thresholds 0.3 and 0.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscriminationBand {
    Negative,
    Low,
    Moderate,
    High,
}

impl DiscriminationBand {
    pub fn from_value(a: f64) -> Self {
        if a < 0.0 {
            Self::Negative
        } else if a < 0.3 {
            Self::Low
        } else if a <= 0.6 {
            Self::Moderate
        } else {
            Self::High
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Negative => "negativa",
            Self::Low => "baixa",
            Self::Moderate => "moderada",
            Self::High => "alta",
        }
    }
}

/// A reason for flagging an item as problematic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemIssue {
    LowDiscrimination,
    LowCorrelation,
    TooHard,
    TooEasy,
}

impl ItemIssue {
    pub fn label(&self) -> &'static str {
        match self {
            Self::LowDiscrimination => "baixa discriminacao",
            Self::LowCorrelation => "baixa correlacao",
            Self::TooHard => "muito dificil",
            Self::TooEasy => "muito facil",
        }
    }
}

/// Ability grid over which item characteristic curves are evaluated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AbilityGrid {
    #[serde(default = "default_grid_min")]
    pub min: f64,
    #[serde(default = "default_grid_max")]
    pub max: f64,
    #[serde(default = "default_grid_points")]
    pub points: usize,
}

fn default_grid_min() -> f64 {
    -4.0
}
fn default_grid_max() -> f64 {
    4.0
}
fn default_grid_points() -> usize {
    100
}

impl Default for AbilityGrid {
    fn default() -> Self {
        Self {
            min: default_grid_min(),
            max: default_grid_max(),
            points: default_grid_points(),
        }
    }
}

impl AbilityGrid {
    pub fn values(&self) -> Vec<f64> {
        linspace(self.min, self.max, self.points)
    }
}

/// One point of an item characteristic curve.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct IccPoint<'a> {
    #[serde(rename = "Questao")]
    pub item: &'a str,
    #[serde(rename = "Theta")]
    pub theta: f64,
    #[serde(rename = "Probabilidade")]
    pub probability: f64,
    #[serde(rename = "Dificuldade")]
    pub difficulty: f64,
    #[serde(rename = "Discriminacao")]
    pub discrimination: f64,
}

/// Item characteristic curves for a set of items, evaluated on demand.
#[derive(Debug, Clone)]
pub struct IccTable<'a> {
    items: &'a [ItemParameters],
    grid: Vec<f64>,
}

impl<'a> IccTable<'a> {
    pub fn new(items: &'a [ItemParameters], grid: &AbilityGrid) -> Self {
        Self {
            items,
            grid: grid.values(),
        }
    }

    /// Total number of `(item, theta)` points.
    pub fn len(&self) -> usize {
        self.items.len() * self.grid.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn grid(&self) -> &[f64] {
        &self.grid
    }

    /// All points, item by item, each item over the whole grid.
    pub fn iter(&self) -> impl Iterator<Item = IccPoint<'a>> + '_ {
        self.items.iter().flat_map(move |item| {
            self.grid.iter().map(move |&theta| IccPoint {
                item: item.item.as_str(),
                theta,
                probability: item.probability(theta),
                difficulty: item.difficulty,
                discrimination: item.discrimination.value,
            })
        })
    }

    /// `(theta, probability)` pairs for a single item.
    pub fn curve(&self, item: &str) -> Option<Vec<(f64, f64)>> {
        let params = self.items.iter().find(|p| p.item == item)?;
        Some(
            self.grid
                .iter()
                .map(|&theta| (theta, params.probability(theta)))
                .collect(),
        )
    }
}
