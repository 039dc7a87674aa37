//! Analysis pipeline.
//!
//! Runs the estimators in order over one response matrix:
//! abilities -> item parameters -> point-biserials -> reliability -> tutors.
//! The pipeline is synchronous and keeps no state between runs.

use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::ability::{estimate_abilities, StudentResult};
use crate::config::AnalysisConfig;
use crate::error::{AnalysisError, DegenerateInput};
use crate::items::{discrimination_index, HeuristicItemEstimator, ItemParameters};
use crate::matrix::{build_response_matrix, ResponseMatrix};
use crate::model::{AnswerKey, Roster};
use crate::reliability::{point_biserial, reliability, RELIABILITY_FALLBACK};
use crate::report::{AnalysisReport, DetailRow};
use crate::statistics::{median, Estimate};
use crate::traits::ItemEstimator;
use crate::tutors::{rank_tutors, TutorRanking};

/// Everything estimated from a response matrix alone.
#[derive(Debug, Clone, PartialEq)]
pub struct Estimation {
    pub students: Vec<StudentResult>,
    pub items: Vec<ItemParameters>,
    pub reliability: Estimate<f64>,
    pub tutors: TutorRanking,
    /// Every fallback substitution made during the run, in pipeline order.
    pub notices: Vec<DegenerateInput>,
}

/// The analysis engine.
pub struct Analyzer {
    estimator: Box<dyn ItemEstimator>,
    config: AnalysisConfig,
}

impl Default for Analyzer {
    fn default() -> Self {
        Self::new(AnalysisConfig::default())
    }
}

impl Analyzer {
    pub fn new(config: AnalysisConfig) -> Self {
        Self {
            estimator: Box::new(HeuristicItemEstimator),
            config,
        }
    }

    /// Replace the item parameter strategy.
    pub fn with_estimator<E: ItemEstimator + 'static>(mut self, estimator: E) -> Self {
        self.estimator = Box::new(estimator);
        self
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    pub fn estimator_name(&self) -> &str {
        self.estimator.name()
    }

    /// Estimate abilities, item parameters, reliability and tutors.
    pub fn estimate(&self, matrix: &ResponseMatrix) -> Result<Estimation, AnalysisError> {
        let (n_students, n_items) = matrix.shape();
        if n_students == 0 || n_items == 0 {
            return Err(AnalysisError::EmptyCohort {
                students: n_students,
                items: n_items,
            });
        }

        let mut notices = Vec::new();

        let abilities = estimate_abilities(matrix);
        if abilities.uniform {
            notices.push(DegenerateInput::UniformAbility);
        }
        let thetas = abilities.abilities();
        let theta_median = median(&thetas).unwrap_or(0.0);

        let estimates = self.estimator.estimate(matrix);
        if estimates.len() != n_items {
            return Err(AnalysisError::EstimatorOutput {
                estimator: self.estimator.name().to_string(),
                expected: n_items,
                found: estimates.len(),
            });
        }

        let proportions = matrix.proportions_correct();
        let items: Vec<ItemParameters> = estimates
            .into_iter()
            .enumerate()
            .map(|(j, est)| {
                let item = matrix.item_ids()[j].clone();
                if est.discrimination.used_fallback {
                    notices.push(DegenerateInput::ZeroVarianceItem { item: item.clone() });
                }
                let pb = point_biserial(&matrix.column_f64(j), &thetas);
                if pb.used_fallback {
                    warn!(item = %item, "point-biserial correlation undefined, using 0");
                    notices.push(DegenerateInput::UndefinedPointBiserial { item: item.clone() });
                }
                ItemParameters {
                    difficulty: est.difficulty,
                    discrimination: est.discrimination,
                    proportion_correct: proportions[j],
                    percent_correct: proportions[j] * 100.0,
                    point_biserial: pb,
                    discrimination_index: discrimination_index(matrix, j, &thetas, theta_median),
                    item,
                }
            })
            .collect();

        let correlations: Vec<Estimate<f64>> = items.iter().map(|i| i.point_biserial).collect();
        let reliability = match reliability(&correlations) {
            Ok(value) => Estimate::genuine(value),
            Err(e) => {
                warn!(reason = %e, "reliability fallback to {RELIABILITY_FALLBACK}");
                notices.push(DegenerateInput::Reliability {
                    reason: e.to_string(),
                });
                Estimate::fallback(RELIABILITY_FALLBACK)
            }
        };

        let tutors = rank_tutors(&abilities.students, &self.config.tutors);
        if tutors.used_fallback {
            notices.push(DegenerateInput::NoEligibleTutors {
                count: tutors.candidates.len(),
            });
        }

        info!(
            students = n_students,
            items = n_items,
            estimator = self.estimator.name(),
            reliability = reliability.value,
            tutors = tutors.candidates.len(),
            fallbacks = notices.len(),
            "analysis complete"
        );

        Ok(Estimation {
            students: abilities.students,
            items,
            reliability,
            tutors,
            notices,
        })
    }

    /// Score the roster against the key and run the full analysis.
    pub fn analyze(&self, key: &AnswerKey, roster: &Roster) -> Result<AnalysisReport, AnalysisError> {
        let matrix = build_response_matrix(key, roster)?;
        let estimation = self.estimate(&matrix)?;
        let details = detail_rows(key, roster, &matrix, &estimation);

        Ok(AnalysisReport {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            estimator: self.estimator.name().to_string(),
            answer_key: key.clone(),
            students: estimation.students,
            items: estimation.items,
            reliability: estimation.reliability,
            tutors: estimation.tutors,
            details,
            responses: matrix.to_rows(),
            notices: estimation.notices,
            icc_grid: self.config.icc_grid.clone(),
        })
    }
}

/// Analyze with the default configuration and estimator.
pub fn analyze(key: &AnswerKey, roster: &Roster) -> Result<AnalysisReport, AnalysisError> {
    Analyzer::default().analyze(key, roster)
}

fn detail_rows(
    key: &AnswerKey,
    roster: &Roster,
    matrix: &ResponseMatrix,
    estimation: &Estimation,
) -> Vec<DetailRow> {
    let mut rows = Vec::with_capacity(matrix.n_students() * matrix.n_items());
    for (i, student) in estimation.students.iter().enumerate() {
        for (j, item) in estimation.items.iter().enumerate() {
            rows.push(DetailRow {
                student: student.name.clone(),
                item: item.item.clone(),
                chosen: roster.answer(i, j).to_string(),
                correct: key.letter(j).map(String::from).unwrap_or_default(),
                is_correct: matrix.get(i, j) == Some(1),
                ability: student.ability,
                difficulty: item.difficulty,
                discrimination: item.discrimination.value,
            });
        }
    }
    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::StudentAnswers;
    use crate::traits::ItemEstimate;

    fn sample() -> (AnswerKey, Roster) {
        let key = AnswerKey::from_letters("ABCC").unwrap();
        let roster = Roster::new(vec![
            StudentAnswers::new("S1", ["A", "B", "C", "C"]),
            StudentAnswers::new("S2", ["A", "A", "A", "A"]),
            StudentAnswers::new("S3", ["D", "B", "C", "A"]),
        ]);
        (key, roster)
    }

    #[test]
    fn analyze_sample_cohort() {
        let (key, roster) = sample();
        let report = analyze(&key, &roster).unwrap();

        assert_eq!(report.responses, vec![vec![1, 1, 1, 1], vec![1, 0, 0, 0], vec![0, 1, 1, 0]]);
        let raw: Vec<u32> = report.students.iter().map(|s| s.raw_score).collect();
        assert_eq!(raw, vec![4, 1, 2]);
        assert_eq!(report.details.len(), 12);
        assert_eq!(report.estimator, "heuristic");
        assert!((0.0..=1.0).contains(&report.reliability.value));
    }

    #[test]
    fn notices_record_fallbacks() {
        let key = AnswerKey::from_letters("AB").unwrap();
        let roster = Roster::new(vec![
            StudentAnswers::new("S1", ["A", "B"]),
            StudentAnswers::new("S2", ["A", "C"]),
            StudentAnswers::new("S3", ["A", "-"]),
        ]);
        let report = analyze(&key, &roster).unwrap();

        // Q1 answered correctly by everyone
        assert!(report.items[0].discrimination.used_fallback);
        assert!(report.items[0].point_biserial.used_fallback);
        assert!(report
            .notices
            .contains(&DegenerateInput::ZeroVarianceItem { item: "Q1".into() }));
        assert!(report
            .notices
            .contains(&DegenerateInput::UndefinedPointBiserial { item: "Q1".into() }));
        assert!(!report.items[1].discrimination.used_fallback);
    }

    #[test]
    fn single_item_reliability_falls_back() {
        let key = AnswerKey::from_letters("A").unwrap();
        let roster = Roster::new(vec![
            StudentAnswers::new("S1", ["A"]),
            StudentAnswers::new("S2", ["B"]),
        ]);
        let report = analyze(&key, &roster).unwrap();
        assert_eq!(report.reliability, Estimate::fallback(0.7));
        assert!(report
            .notices
            .iter()
            .any(|n| matches!(n, DegenerateInput::Reliability { .. })));
    }

    #[test]
    fn equal_raw_scores_flag_every_fallback() {
        // each student gets exactly one item right
        let key = AnswerKey::from_letters("ABCD").unwrap();
        let roster = Roster::new(vec![
            StudentAnswers::new("S1", ["A", "A", "A", "A"]),
            StudentAnswers::new("S2", ["B", "B", "B", "B"]),
            StudentAnswers::new("S3", ["C", "C", "C", "C"]),
            StudentAnswers::new("S4", ["D", "D", "D", "D"]),
            StudentAnswers::new("S5", ["A", "C", "A", "A"]),
            StudentAnswers::new("S6", ["B", "B", "A", "A"]),
        ]);
        let report = analyze(&key, &roster).unwrap();

        assert!(report.students.iter().all(|s| s.raw_score == 1));
        assert!(report.students.iter().all(|s| s.z_score == 0.0));
        assert!(report.notices.contains(&DegenerateInput::UniformAbility));
        assert!(report
            .items
            .iter()
            .all(|i| i.point_biserial == Estimate::fallback(0.0)));
        assert_eq!(report.reliability, Estimate::fallback(0.7));
    }

    struct FixedEstimator;

    impl ItemEstimator for FixedEstimator {
        fn name(&self) -> &str {
            "fixed"
        }

        fn estimate(&self, matrix: &ResponseMatrix) -> Vec<ItemEstimate> {
            matrix
                .item_ids()
                .iter()
                .map(|id| ItemEstimate {
                    item: id.clone(),
                    difficulty: 0.25,
                    discrimination: Estimate::genuine(1.0),
                })
                .collect()
        }
    }

    struct BrokenEstimator;

    impl ItemEstimator for BrokenEstimator {
        fn name(&self) -> &str {
            "broken"
        }

        fn estimate(&self, _: &ResponseMatrix) -> Vec<ItemEstimate> {
            Vec::new()
        }
    }

    #[test]
    fn estimator_is_swappable() {
        let (key, roster) = sample();
        let analyzer = Analyzer::default().with_estimator(FixedEstimator);
        let report = analyzer.analyze(&key, &roster).unwrap();
        assert_eq!(report.estimator, "fixed");
        assert!(report.items.iter().all(|i| i.difficulty == 0.25));
        // abilities do not depend on the item strategy
        let default_report = analyze(&key, &roster).unwrap();
        assert_eq!(report.students, default_report.students);
    }

    #[test]
    fn wrong_estimator_output_is_an_error() {
        let (key, roster) = sample();
        let err = Analyzer::default()
            .with_estimator(BrokenEstimator)
            .analyze(&key, &roster)
            .unwrap_err();
        assert!(matches!(
            err,
            AnalysisError::EstimatorOutput { expected: 4, found: 0, .. }
        ));
    }

    #[test]
    fn shape_mismatch_aborts() {
        let key = AnswerKey::from_letters("ABC").unwrap();
        let roster = Roster::new(vec![StudentAnswers::new("S1", ["A", "B", "C", "D"])]);
        assert!(matches!(
            analyze(&key, &roster),
            Err(AnalysisError::ShapeMismatch { found: 4, .. })
        ));
    }
}
