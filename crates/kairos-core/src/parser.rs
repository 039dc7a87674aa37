//! TOML assessment parser.
//!
//! Loads an answer key and roster from TOML files and directories, and
//! validates them.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::model::{normalize_answer, AnswerKey, Roster, StudentAnswers};

/// An answer key plus the answers of every student who sat the assessment.
#[derive(Debug, Clone, PartialEq)]
pub struct Assessment {
    pub name: String,
    pub answer_key: AnswerKey,
    pub roster: Roster,
}

#[derive(Debug, Deserialize)]
struct TomlAssessmentFile {
    assessment: TomlAssessmentHeader,
    #[serde(default)]
    students: Vec<TomlStudent>,
}

#[derive(Debug, Deserialize)]
struct TomlAssessmentHeader {
    name: String,
    answer_key: TomlAnswerKey,
}

/// Either `"ABCC"` or `{ Q1 = "A", Q2 = "B", ... }`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TomlAnswerKey {
    Letters(String),
    Table(BTreeMap<String, String>),
}

#[derive(Debug, Deserialize)]
struct TomlStudent {
    name: String,
    #[serde(default)]
    answers: Vec<String>,
}

/// Parse a single TOML file into an `Assessment`.
pub fn parse_assessment(path: &Path) -> Result<Assessment> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read assessment file: {}", path.display()))?;

    parse_assessment_str(&content, path)
}

/// Parse a TOML string into an `Assessment`.
pub fn parse_assessment_str(content: &str, source_path: &Path) -> Result<Assessment> {
    let parsed: TomlAssessmentFile = toml::from_str(content)
        .with_context(|| format!("failed to parse TOML: {}", source_path.display()))?;

    let answer_key = match parsed.assessment.answer_key {
        TomlAnswerKey::Letters(letters) => AnswerKey::from_letters(&letters),
        TomlAnswerKey::Table(table) => AnswerKey::from_pairs(table),
    }
    .with_context(|| format!("bad answer key in {}", source_path.display()))?;

    let roster = parsed
        .students
        .into_iter()
        .map(|s| StudentAnswers::new(s.name, s.answers))
        .collect();

    Ok(Assessment {
        name: parsed.assessment.name,
        answer_key,
        roster,
    })
}

/// Recursively load all `.toml` assessment files from a directory.
///
/// Files that fail to parse are skipped with a warning. The result is sorted
/// by path so runs are reproducible.
pub fn load_assessment_directory(dir: &Path) -> Result<Vec<Assessment>> {
    if !dir.is_dir() {
        anyhow::bail!("not a directory: {}", dir.display());
    }

    let mut paths = Vec::new();
    collect_toml_files(dir, &mut paths)?;
    paths.sort();

    let mut assessments = Vec::new();
    for path in paths {
        match parse_assessment(&path) {
            Ok(a) => assessments.push(a),
            Err(e) => {
                tracing::warn!("skipping {}: {:#}", path.display(), e);
            }
        }
    }
    Ok(assessments)
}

fn collect_toml_files(dir: &Path, out: &mut Vec<std::path::PathBuf>) -> Result<()> {
    for entry in std::fs::read_dir(dir)
        .with_context(|| format!("failed to read directory: {}", dir.display()))?
    {
        let path = entry?.path();
        if path.is_dir() {
            collect_toml_files(&path, out)?;
        } else if path.extension().is_some_and(|ext| ext == "toml") {
            out.push(path);
        }
    }
    Ok(())
}

/// A warning from assessment validation.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationWarning {
    /// The student concerned, if any.
    pub student: Option<String>,
    pub message: String,
}

/// Check an assessment for problems that would make the analysis fail or
/// quietly score answers as wrong.
pub fn validate_assessment(assessment: &Assessment) -> Vec<ValidationWarning> {
    let mut warnings = Vec::new();
    let n_items = assessment.answer_key.len();

    if assessment.roster.is_empty() {
        warnings.push(ValidationWarning {
            student: None,
            message: "roster is empty".into(),
        });
    }

    let mut seen = HashSet::new();
    for student in assessment.roster.iter() {
        if !seen.insert(student.name.as_str()) {
            warnings.push(ValidationWarning {
                student: Some(student.name.clone()),
                message: format!("duplicate student name: {}", student.name),
            });
        }
    }

    for student in assessment.roster.iter() {
        if student.answers.len() != n_items {
            warnings.push(ValidationWarning {
                student: Some(student.name.clone()),
                message: format!(
                    "{} answers for {} items",
                    student.answers.len(),
                    n_items
                ),
            });
        }
    }

    // Anything other than a letter, "-" or blank is scored as wrong.
    for student in assessment.roster.iter() {
        let unreadable: Vec<&str> = student
            .answers
            .iter()
            .map(String::as_str)
            .filter(|a| {
                let t = a.trim();
                !t.is_empty() && t != "-" && normalize_answer(t).is_none()
            })
            .collect();
        if !unreadable.is_empty() {
            warnings.push(ValidationWarning {
                student: Some(student.name.clone()),
                message: format!("unreadable answers: {}", unreadable.join(", ")),
            });
        }
    }

    warnings
}
