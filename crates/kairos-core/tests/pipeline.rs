//! End-to-end tests of the analysis pipeline.
//!
//! These run the full path (TOML assessment -> analysis -> export bundle ->
//! aggregation) on small hand-checked cohorts.

use std::path::PathBuf;

use kairos_core::ability::ability_from_score;
use kairos_core::aggregate::{compare, consolidate, load_bundle_directory};
use kairos_core::config::AnalysisConfig;
use kairos_core::model::{AnswerKey, Roster, StudentAnswers};
use kairos_core::parser::parse_assessment_str;
use kairos_core::tutors::TutorPolicy;
use kairos_core::{analyze, AnalysisError, Analyzer, DegenerateInput, ExportBundle};

fn sample() -> (AnswerKey, Roster) {
    let key = AnswerKey::from_pairs([("Q1", "A"), ("Q2", "B"), ("Q3", "C"), ("Q4", "C")]).unwrap();
    let roster = Roster::new(vec![
        StudentAnswers::new("S1", ["A", "B", "C", "C"]),
        StudentAnswers::new("S2", ["A", "A", "A", "A"]),
        StudentAnswers::new("S3", ["D", "B", "C", "A"]),
    ]);
    (key, roster)
}

/// Answers for a student who gets the first `correct` items of `key` right.
fn answers_with(key: &str, correct: usize) -> Vec<String> {
    key.chars()
        .enumerate()
        .map(|(j, c)| if j < correct { c.to_string() } else { "-".to_string() })
        .collect()
}

// --- Worked scenarios ---

#[test]
fn three_student_scenario() {
    let (key, roster) = sample();
    let report = analyze(&key, &roster).unwrap();

    assert_eq!(
        report.responses,
        vec![vec![1, 1, 1, 1], vec![1, 0, 0, 0], vec![0, 1, 1, 0]]
    );
    let raw: Vec<u32> = report.students.iter().map(|s| s.raw_score).collect();
    assert_eq!(raw, vec![4, 1, 2]);
    let pct: Vec<f64> = report.students.iter().map(|s| s.percent_correct).collect();
    assert_eq!(pct, vec![100.0, 25.0, 50.0]);

    let theta = |name: &str| report.student(name).unwrap().ability;
    assert!(theta("S1") > theta("S3"));
    assert!(theta("S3") > theta("S2"));
}

#[test]
fn item_nobody_answers_is_very_hard() {
    let key = AnswerKey::from_letters("AB").unwrap();
    let roster: Roster = (0..5)
        .map(|i| StudentAnswers::new(format!("S{i}"), ["C", if i % 2 == 0 { "B" } else { "D" }]))
        .collect();
    let report = analyze(&key, &roster).unwrap();

    let q1 = report.item("Q1").unwrap();
    assert!((q1.difficulty - 999f64.ln()).abs() < 1e-9);
    assert!(q1.difficulty.is_finite());
}

#[test]
fn identical_item_falls_back_with_flag() {
    let key = AnswerKey::from_letters("ABC").unwrap();
    let roster = Roster::new(vec![
        StudentAnswers::new("S1", ["A", "B", "C"]),
        StudentAnswers::new("S2", ["A", "C", "C"]),
        StudentAnswers::new("S3", ["A", "D", "E"]),
    ]);
    let report = analyze(&key, &roster).unwrap();

    let q1 = report.item("Q1").unwrap();
    assert_eq!(q1.discrimination.value, 0.5);
    assert!(q1.discrimination.used_fallback);
    assert!(report.used_fallbacks());
    assert!(report
        .notices
        .contains(&DegenerateInput::ZeroVarianceItem { item: "Q1".into() }));
}

// --- Properties ---

#[test]
fn matrix_matches_roster_and_key() {
    let (key, roster) = sample();
    let report = analyze(&key, &roster).unwrap();
    assert_eq!(report.responses.len(), roster.len());
    assert!(report.responses.iter().all(|r| r.len() == key.len()));
    assert!(report.responses.iter().flatten().all(|&v| v == 0 || v == 1));
}

#[test]
fn item_parameters_are_bit_identical_across_runs() {
    let (key, roster) = sample();
    let a = analyze(&key, &roster).unwrap();
    let b = analyze(&key, &roster).unwrap();
    for (x, y) in a.items.iter().zip(&b.items) {
        assert_eq!(x.difficulty.to_bits(), y.difficulty.to_bits());
        assert_eq!(
            x.discrimination.value.to_bits(),
            y.discrimination.value.to_bits()
        );
        assert_eq!(
            x.point_biserial.value.to_bits(),
            y.point_biserial.value.to_bits()
        );
    }
}

#[test]
fn ability_is_monotone_in_raw_score() {
    for n in 1..=40usize {
        let thetas: Vec<f64> = (0..=n as u32).map(|r| ability_from_score(r, n)).collect();
        assert!(
            thetas.windows(2).all(|w| w[0] <= w[1]),
            "non-monotone for n = {n}"
        );
        assert!(thetas.iter().all(|t| t.is_finite()));
    }
}

#[test]
fn reliability_stays_in_unit_interval() {
    let key = "ABCDEABCDE";
    let cohorts: Vec<Vec<usize>> = vec![
        vec![0, 0, 0],
        vec![10, 10],
        vec![0, 3, 5, 7, 10],
        vec![5],
        vec![2, 2, 9, 1, 4, 6, 8],
    ];
    for scores in cohorts {
        let roster: Roster = scores
            .iter()
            .enumerate()
            .map(|(i, &c)| StudentAnswers::new(format!("S{i}"), answers_with(key, c)))
            .collect();
        let report = analyze(&AnswerKey::from_letters(key).unwrap(), &roster).unwrap();
        assert!(
            (0.0..=1.0).contains(&report.reliability.value),
            "{scores:?} -> {}",
            report.reliability.value
        );
    }
}

#[test]
fn tutors_are_exactly_the_eligible_subset() {
    let key = "ABCDEABCDEABCDEABCDE";
    let scores = [20, 19, 18, 12, 8, 5, 3, 10];
    let roster: Roster = scores
        .iter()
        .enumerate()
        .map(|(i, &c)| StudentAnswers::new(format!("S{i}"), answers_with(key, c)))
        .collect();
    let report = analyze(&AnswerKey::from_letters(key).unwrap(), &roster).unwrap();
    let policy = TutorPolicy::default();

    let mut expected: Vec<&str> = report
        .students
        .iter()
        .filter(|s| policy.is_eligible(s))
        .map(|s| s.name.as_str())
        .collect();
    assert!(!expected.is_empty() && expected.len() < report.students.len());

    let mut got: Vec<&str> = report
        .tutors
        .candidates
        .iter()
        .map(|c| c.student.name.as_str())
        .collect();
    expected.sort_unstable();
    got.sort_unstable();
    assert_eq!(got, expected);
    assert!(!report.tutors.used_fallback);
    assert!(report
        .tutors
        .candidates
        .windows(2)
        .all(|w| w[0].score >= w[1].score));
}

#[test]
fn tutor_count_comes_from_config() {
    let (key, roster) = sample();
    let config = AnalysisConfig::from_toml_str("[tutors]\ncount = 1\nmin_ability = 5.0\n").unwrap();
    let report = Analyzer::new(config).analyze(&key, &roster).unwrap();
    assert_eq!(report.tutors.candidates.len(), 1);
    assert!(report.tutors.used_fallback);
    assert_eq!(report.tutors.candidates[0].student.name, "S1");
}

#[test]
fn detail_table_reproduces_raw_scores() {
    let (key, roster) = sample();
    let report = analyze(&key, &roster).unwrap();
    for student in &report.students {
        let ones = report
            .details_for(&student.name)
            .filter(|d| d.is_correct)
            .count() as u32;
        assert_eq!(ones, student.raw_score, "{}", student.name);
    }
}

// --- Errors ---

#[test]
fn shape_mismatch_is_fatal() {
    let (key, mut roster) = sample();
    roster.push(StudentAnswers::new("S4", ["A", "B"]));
    let err = analyze(&key, &roster).unwrap_err();
    assert_eq!(
        err,
        AnalysisError::ShapeMismatch {
            student: "S4".into(),
            expected: 4,
            found: 2
        }
    );
}

#[test]
fn empty_cohort_is_fatal() {
    let key = AnswerKey::from_letters("AB").unwrap();
    assert!(matches!(
        analyze(&key, &Roster::default()),
        Err(AnalysisError::EmptyCohort { .. })
    ));
}

// --- Persistence and aggregation ---

const FIRST: &str = r#"
[assessment]
name = "Prova 1"
answer_key = "ABCDE"

[[students]]
name = "Ana"
answers = ["A", "B", "C", "-", "-"]

[[students]]
name = "Bia"
answers = ["A", "-", "-", "-", "-"]

[[students]]
name = "Caio"
answers = ["A", "B", "C", "D", "E"]
"#;

const SECOND: &str = r#"
[assessment]
name = "Prova 2"
answer_key = { Q1 = "E", Q2 = "D", Q3 = "C", Q4 = "B", Q5 = "A" }

[[students]]
name = "Ana"
answers = ["E", "D", "C", "B", "A"]

[[students]]
name = "Bia"
answers = ["E", "-", "-", "-", "-"]

[[students]]
name = "Davi"
answers = ["E", "D", "-", "-", "-"]
"#;

#[test]
fn bundles_round_trip_and_aggregate() {
    let dir = tempfile::tempdir().unwrap();

    for (file, content) in [("prova_1", FIRST), ("prova_2", SECOND)] {
        let assessment = parse_assessment_str(content, &PathBuf::from(file)).unwrap();
        let report = analyze(&assessment.answer_key, &assessment.roster).unwrap();
        report
            .to_bundle()
            .save_json(&dir.path().join(format!("{file}.json")))
            .unwrap();
    }

    let first = ExportBundle::load_json(&dir.path().join("prova_1.json")).unwrap();
    assert_eq!(first.metadata.total_students, 3);
    assert_eq!(first.metadata.total_items, 5);
    assert_eq!(first.student("Caio").unwrap().raw_score, 5);

    let bundles = load_bundle_directory(dir.path()).unwrap();
    assert_eq!(bundles.len(), 2);

    let consolidated = consolidate(&bundles);
    assert_eq!(consolidated.total_assessments, 2);
    assert_eq!(consolidated.unique_students, 4);
    assert_eq!(consolidated.top_students[0].0, "Caio");

    let cmp = compare(&bundles[0].bundle, &bundles[1].bundle, 0.1);
    assert_eq!(cmp.gains.len(), 1);
    assert_eq!(cmp.gains[0].student, "Ana");
    assert_eq!(cmp.new_students, vec!["Davi"]);
    assert_eq!(cmp.missing_students, vec!["Caio"]);
}
