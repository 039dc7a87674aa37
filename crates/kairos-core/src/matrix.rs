//! Binary response matrix and its builder.

use ndarray::{Array2, ArrayView1};
use tracing::debug;

use crate::error::AnalysisError;
use crate::model::{AnswerKey, Roster};

/// Students x items matrix of 0/1 correctness flags.
///
/// Rows keep roster order, columns keep answer-key order.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseMatrix {
    students: Vec<String>,
    items: Vec<String>,
    data: Array2<u8>,
}

impl ResponseMatrix {
    /// Build a matrix directly from 0/1 rows.
    ///
    /// Any non-zero entry is stored as 1. Fails on ragged rows or an empty
    /// cohort.
    pub fn from_rows(
        students: Vec<String>,
        items: Vec<String>,
        rows: &[Vec<u8>],
    ) -> Result<Self, AnalysisError> {
        if students.is_empty() || items.is_empty() {
            return Err(AnalysisError::EmptyCohort {
                students: students.len(),
                items: items.len(),
            });
        }
        if rows.len() != students.len() {
            return Err(AnalysisError::ShapeMismatch {
                student: format!("<{} rows>", rows.len()),
                expected: students.len(),
                found: rows.len(),
            });
        }

        let mut data = Array2::<u8>::zeros((students.len(), items.len()));
        for (i, row) in rows.iter().enumerate() {
            if row.len() != items.len() {
                return Err(AnalysisError::ShapeMismatch {
                    student: students[i].clone(),
                    expected: items.len(),
                    found: row.len(),
                });
            }
            for (j, &v) in row.iter().enumerate() {
                data[[i, j]] = u8::from(v != 0);
            }
        }

        Ok(Self {
            students,
            items,
            data,
        })
    }

    pub fn n_students(&self) -> usize {
        self.data.nrows()
    }

    pub fn n_items(&self) -> usize {
        self.data.ncols()
    }

    /// `(students, items)`.
    pub fn shape(&self) -> (usize, usize) {
        self.data.dim()
    }

    pub fn student_names(&self) -> &[String] {
        &self.students
    }

    pub fn item_ids(&self) -> &[String] {
        &self.items
    }

    /// Correctness of student `i` on item `j`.
    pub fn get(&self, i: usize, j: usize) -> Option<u8> {
        self.data.get([i, j]).copied()
    }

    pub fn row(&self, i: usize) -> ArrayView1<'_, u8> {
        self.data.row(i)
    }

    pub fn column(&self, j: usize) -> ArrayView1<'_, u8> {
        self.data.column(j)
    }

    /// Column `j` as floats, for correlation.
    pub fn column_f64(&self, j: usize) -> Vec<f64> {
        self.data.column(j).iter().map(|&v| f64::from(v)).collect()
    }

    /// Number of correct answers per student.
    pub fn raw_scores(&self) -> Vec<u32> {
        self.data
            .rows()
            .into_iter()
            .map(|row| row.iter().map(|&v| u32::from(v)).sum())
            .collect()
    }

    /// Proportion of students answering each item correctly (unclipped).
    pub fn proportions_correct(&self) -> Vec<f64> {
        let n = self.n_students() as f64;
        self.data
            .columns()
            .into_iter()
            .map(|col| col.iter().map(|&v| f64::from(v)).sum::<f64>() / n)
            .collect()
    }

    /// Rows as plain vectors, for export.
    pub fn to_rows(&self) -> Vec<Vec<u8>> {
        self.data.rows().into_iter().map(|r| r.to_vec()).collect()
    }
}

/// Score every student's answers against the key.
///
/// Row lengths are checked for every student before anything is scored, so
/// a malformed roster never yields a partial matrix.
pub fn build_response_matrix(
    key: &AnswerKey,
    roster: &Roster,
) -> Result<ResponseMatrix, AnalysisError> {
    if roster.is_empty() || key.is_empty() {
        return Err(AnalysisError::EmptyCohort {
            students: roster.len(),
            items: key.len(),
        });
    }

    if let Some(bad) = roster.iter().find(|s| s.answers.len() != key.len()) {
        return Err(AnalysisError::ShapeMismatch {
            student: bad.name.clone(),
            expected: key.len(),
            found: bad.answers.len(),
        });
    }

    let mut data = Array2::<u8>::zeros((roster.len(), key.len()));
    for (i, student) in roster.iter().enumerate() {
        for (j, answer) in student.answers.iter().enumerate() {
            data[[i, j]] = u8::from(key.is_correct(j, answer));
        }
    }

    debug!(
        students = roster.len(),
        items = key.len(),
        "built response matrix"
    );

    Ok(ResponseMatrix {
        students: roster.iter().map(|s| s.name.clone()).collect(),
        items: key.item_ids(),
        data,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::StudentAnswers;

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
    fn builds_expected_matrix() {
        let (key, roster) = sample();
        let m = build_response_matrix(&key, &roster).unwrap();
        assert_eq!(m.shape(), (3, 4));
        assert_eq!(
            m.to_rows(),
            vec![vec![1, 1, 1, 1], vec![1, 0, 0, 0], vec![0, 1, 1, 0]]
        );
        assert_eq!(m.raw_scores(), vec![4, 1, 2]);
        assert_eq!(m.student_names(), &["S1", "S2", "S3"]);
        assert_eq!(m.item_ids(), &["Q1", "Q2", "Q3", "Q4"]);
    }

    #[test]
    fn blanks_and_junk_are_wrong() {
        let key = AnswerKey::from_letters("AB").unwrap();
        let roster = Roster::new(vec![
            StudentAnswers::new("S1", ["-", ""]),
            StudentAnswers::new("S2", [" a", "1"]),
        ]);
        let m = build_response_matrix(&key, &roster).unwrap();
        assert_eq!(m.to_rows(), vec![vec![0, 0], vec![1, 0]]);
    }

    #[test]
    fn short_row_is_rejected() {
        let key = AnswerKey::from_letters("ABC").unwrap();
        let roster = Roster::new(vec![
            StudentAnswers::new("S1", ["A", "B", "C"]),
            StudentAnswers::new("S2", ["A", "B"]),
        ]);
        let err = build_response_matrix(&key, &roster).unwrap_err();
        assert_eq!(
            err,
            AnalysisError::ShapeMismatch {
                student: "S2".into(),
                expected: 3,
                found: 2
            }
        );
    }

    #[test]
    fn empty_inputs_are_rejected() {
        let key = AnswerKey::from_letters("AB").unwrap();
        let err = build_response_matrix(&key, &Roster::default()).unwrap_err();
        assert!(matches!(err, AnalysisError::EmptyCohort { students: 0, items: 2 }));

        let empty_key = AnswerKey::from_letters("").unwrap();
        let roster = Roster::new(vec![StudentAnswers::new("S1", Vec::<String>::new())]);
        let err = build_response_matrix(&empty_key, &roster).unwrap_err();
        assert!(matches!(err, AnalysisError::EmptyCohort { students: 1, items: 0 }));
    }

    #[test]
    fn from_rows_normalizes_and_checks_shape() {
        let m = ResponseMatrix::from_rows(
            vec!["a".into(), "b".into()],
            vec!["Q1".into(), "Q2".into()],
            &[vec![2, 0], vec![0, 1]],
        )
        .unwrap();
        assert_eq!(m.get(0, 0), Some(1));
        assert_eq!(m.get(5, 0), None);
        assert_eq!(m.proportions_correct(), vec![0.5, 0.5]);

        let ragged = ResponseMatrix::from_rows(
            vec!["a".into()],
            vec!["Q1".into(), "Q2".into()],
            &[vec![1]],
        );
        assert!(ragged.is_err());
    }
}
