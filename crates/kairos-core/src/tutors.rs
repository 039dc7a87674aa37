//! Peer tutor selection and ranking.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::ability::StudentResult;

/// Weight of normalized ability in the composite score.
pub const ABILITY_WEIGHT: f64 = 0.6;
/// Weight of normalized percent correct in the composite score.
pub const PERCENT_WEIGHT: f64 = 0.4;
/// Score given to every candidate when either range is zero.
pub const FLAT_SCORE: f64 = 0.5;

/// Eligibility thresholds and list length.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TutorPolicy {
    /// Maximum number of tutors returned.
    #[serde(default = "default_count")]
    pub count: usize,
    /// Ability must be strictly above this.
    #[serde(default = "default_min_ability")]
    pub min_ability: f64,
    /// Percent correct must be strictly above this.
    #[serde(default = "default_min_percent")]
    pub min_percent: f64,
}

fn default_count() -> usize {
    10
}
fn default_min_ability() -> f64 {
    1.0
}
fn default_min_percent() -> f64 {
    70.0
}

impl Default for TutorPolicy {
    fn default() -> Self {
        Self {
            count: default_count(),
            min_ability: default_min_ability(),
            min_percent: default_min_percent(),
        }
    }
}

impl TutorPolicy {
    pub fn is_eligible(&self, student: &StudentResult) -> bool {
        student.ability > self.min_ability && student.percent_correct > self.min_percent
    }
}

/// A student selected as a potential tutor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TutorCandidate {
    pub student: StudentResult,
    /// Composite score in `[0, 1]`.
    pub score: f64,
    /// 1-based position by score.
    pub rank: usize,
}

/// Outcome of tutor selection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TutorRanking {
    pub candidates: Vec<TutorCandidate>,
    /// Nobody passed the thresholds, so the top students by ability were used.
    pub used_fallback: bool,
}

impl TutorRanking {
    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    pub fn find(&self, name: &str) -> Option<&TutorCandidate> {
        self.candidates.iter().find(|c| c.student.name == name)
    }
}

fn range(values: impl Iterator<Item = f64>) -> (f64, f64) {
    values.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
        (lo.min(v), hi.max(v))
    })
}

/// Select, score and rank tutors.
///
/// Scores are normalized over the whole eligible pool before the list is
/// truncated to `policy.count`.
pub fn rank_tutors(students: &[StudentResult], policy: &TutorPolicy) -> TutorRanking {
    let mut pool: Vec<&StudentResult> = students.iter().filter(|s| policy.is_eligible(s)).collect();
    let used_fallback = pool.is_empty() && !students.is_empty();

    if used_fallback {
        warn!(
            min_ability = policy.min_ability,
            min_percent = policy.min_percent,
            "no student passed the tutor thresholds, falling back to top by ability"
        );
        pool = students.iter().collect();
        pool.sort_by(|a, b| b.ability.total_cmp(&a.ability));
        pool.truncate(policy.count);
    }

    let (theta_lo, theta_hi) = range(pool.iter().map(|s| s.ability));
    let (pct_lo, pct_hi) = range(pool.iter().map(|s| s.percent_correct));
    let theta_range = theta_hi - theta_lo;
    let pct_range = pct_hi - pct_lo;
    let flat = !(theta_range > 0.0 && pct_range > 0.0);

    let mut scored: Vec<(f64, &StudentResult)> = pool
        .into_iter()
        .map(|s| {
            let score = if flat {
                FLAT_SCORE
            } else {
                ABILITY_WEIGHT * (s.ability - theta_lo) / theta_range
                    + PERCENT_WEIGHT * (s.percent_correct - pct_lo) / pct_range
            };
            (score, s)
        })
        .collect();
    scored.sort_by(|a, b| b.0.total_cmp(&a.0));

    let candidates: Vec<TutorCandidate> = scored
        .into_iter()
        .take(policy.count)
        .enumerate()
        .map(|(i, (score, s))| TutorCandidate {
            student: s.clone(),
            score,
            rank: i + 1,
        })
        .collect();

    debug!(
        tutors = candidates.len(),
        flat_scores = flat,
        "ranked tutor candidates"
    );

    TutorRanking {
        candidates,
        used_fallback,
    }
}
