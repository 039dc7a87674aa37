//! Per-student ability estimation.
//!
//! Ability is the probit of a smoothed proportion correct:
//! `theta = probit(clip((raw + 0.5) / (n + 1)))`. The smoothing keeps
//! perfect and zero scores finite.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::matrix::ResponseMatrix;
use crate::statistics::{clip, mean, population_std, probit};

/// Smoothed proportions are clipped to this range before the probit.
pub const SMOOTHED_BOUNDS: (f64, f64) = (0.001, 0.999);

/// Ability for `raw` correct answers out of `n_items`.
pub fn ability_from_score(raw: u32, n_items: usize) -> f64 {
    let p = (f64::from(raw) + 0.5) / (n_items as f64 + 1.0);
    probit(clip(p, SMOOTHED_BOUNDS.0, SMOOTHED_BOUNDS.1))
}

/// One student's estimate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudentResult {
    pub name: String,
    /// Ability `theta`.
    pub ability: f64,
    /// Number of correct answers.
    pub raw_score: u32,
    /// `raw_score / n_items * 100`.
    pub percent_correct: f64,
    /// Ability standardized against this cohort.
    pub z_score: f64,
}

impl StudentResult {
    pub fn proficiency_band(&self) -> ProficiencyBand {
        ProficiencyBand::from_ability(self.ability)
    }
}

/// Abilities for a whole cohort.
#[derive(Debug, Clone, PartialEq)]
pub struct AbilityEstimates {
    pub students: Vec<StudentResult>,
    /// Set when every ability is equal and z-scores were set to 0.
    pub uniform: bool,
}

impl AbilityEstimates {
    pub fn abilities(&self) -> Vec<f64> {
        self.students.iter().map(|s| s.ability).collect()
    }
}

/// Estimate ability, percent correct and z-score for every row.
///
/// z-scores use the population standard deviation of the cohort.
pub fn estimate_abilities(matrix: &ResponseMatrix) -> AbilityEstimates {
    let n_items = matrix.n_items();
    let raw = matrix.raw_scores();
    let abilities: Vec<f64> = raw.iter().map(|&r| ability_from_score(r, n_items)).collect();

    let centre = mean(&abilities).unwrap_or(0.0);
    let spread = population_std(&abilities).unwrap_or(0.0);
    let uniform = !(spread > 0.0 && spread.is_finite());
    if uniform {
        warn!(
            students = abilities.len(),
            "abilities have zero spread, z-scores set to 0"
        );
    }

    let students = matrix
        .student_names()
        .iter()
        .zip(raw.iter().zip(&abilities))
        .map(|(name, (&raw_score, &ability))| StudentResult {
            name: name.clone(),
            ability,
            raw_score,
            percent_correct: f64::from(raw_score) / n_items as f64 * 100.0,
            z_score: if uniform {
                0.0
            } else {
                (ability - centre) / spread
            },
        })
        .collect();

    AbilityEstimates { students, uniform }
}

/// Qualitative reading of an ability value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProficiencyBand {
    VeryLow,
    Low,
    Medium,
    High,
    VeryHigh,
}

impl ProficiencyBand {
    pub fn from_ability(theta: f64) -> Self {
        if theta < -1.5 {
            Self::VeryLow
        } else if theta < -0.5 {
            Self::Low
        } else if theta < 0.5 {
            Self::Medium
        } else if theta < 1.5 {
            Self::High
        } else {
            Self::VeryHigh
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::VeryLow => "MUITO BAIXA",
            Self::Low => "BAIXA",
            Self::Medium => "MEDIA",
            Self::High => "ALTA",
            Self::VeryHigh => "MUITO ALTA",
        }
    }

    /// Pedagogical recommendation for students in this band.
    pub fn recommendation(&self) -> &'static str {
        match self {
            Self::VeryLow => "Intervencao pedagogica imediata",
            Self::Low => "Reforco escolar",
            Self::Medium => "Manter ritmo atual",
            Self::High => "Atuar como tutor",
            Self::VeryHigh => "Tutor principal",
        }
    }

    pub fn suggestion(&self) -> &'static str {
        match self {
            Self::VeryLow => "Acompanhamento individual com tutor",
            Self::Low => "Participar de grupos de estudo",
            Self::Medium => "Praticar questoes dificeis",
            Self::High => "Desafios adicionais",
            Self::VeryHigh => "Atividades avancadas",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matrix(rows: &[Vec<u8>]) -> ResponseMatrix {
        let students = (0..rows.len()).map(|i| format!("S{}", i + 1)).collect();
        let items = (0..rows[0].len()).map(crate::model::item_id).collect();
        ResponseMatrix::from_rows(students, items, rows).unwrap()
    }

    #[test]
    fn perfect_score_matches_probit_of_smoothed_proportion() {
        // (4 + 0.5) / 5 = 0.9
        let theta = ability_from_score(4, 4);
        assert!((theta - 1.281_551_565_544_600_8).abs() < 1e-12);
    }

    #[test]
    fn ability_increases_with_score() {
        for n in [1usize, 4, 10, 45] {
            let thetas: Vec<f64> = (0..=n as u32).map(|r| ability_from_score(r, n)).collect();
            assert!(thetas.windows(2).all(|w| w[0] < w[1]), "n = {n}");
            assert!(thetas.iter().all(|t| t.is_finite()));
        }
    }

    #[test]
    fn cohort_example() {
        let m = matrix(&[vec![1, 1, 1, 1], vec![1, 0, 0, 0], vec![0, 1, 1, 0]]);
        let est = estimate_abilities(&m);
        let s = &est.students;
        assert!(!est.uniform);
        assert!(s[0].ability > s[2].ability && s[2].ability > s[1].ability);
        assert_eq!(
            s.iter().map(|r| r.percent_correct).collect::<Vec<_>>(),
            vec![100.0, 25.0, 50.0]
        );
        let z_mean: f64 = s.iter().map(|r| r.z_score).sum::<f64>() / 3.0;
        assert!(z_mean.abs() < 1e-12);
        let z_var: f64 = s.iter().map(|r| r.z_score.powi(2)).sum::<f64>() / 3.0;
        assert!((z_var - 1.0).abs() < 1e-12);
    }

    #[test]
    fn identical_scores_give_zero_z() {
        let m = matrix(&[vec![1, 0], vec![0, 1]]);
        let est = estimate_abilities(&m);
        assert!(est.uniform);
        assert!(est.students.iter().all(|s| s.z_score == 0.0));
    }

    #[test]
    fn identical_nonzero_scores_are_uniform() {
        // every student gets exactly one of four right
        let rows: Vec<Vec<u8>> = (0..6)
            .map(|i| (0..4).map(|j| u8::from(j == i % 4)).collect())
            .collect();
        let est = estimate_abilities(&matrix(&rows));
        assert!(est.uniform);
        assert!(est.students.iter().all(|s| s.ability < 0.0));
        assert!(est.students.iter().all(|s| s.z_score == 0.0));
    }

    #[test]
    fn bands_follow_thresholds() {
        assert_eq!(ProficiencyBand::from_ability(-2.0), ProficiencyBand::VeryLow);
        assert_eq!(ProficiencyBand::from_ability(-1.0), ProficiencyBand::Low);
        assert_eq!(ProficiencyBand::from_ability(0.0), ProficiencyBand::Medium);
        assert_eq!(ProficiencyBand::from_ability(1.0), ProficiencyBand::High);
        assert_eq!(ProficiencyBand::from_ability(1.5), ProficiencyBand::VeryHigh);
    }
}
