//! Analysis report types and the JSON export bundle.
//!
//! `AnalysisReport` is the in-memory result of one run. `ExportBundle` is its
//! persisted form; its field labels are read back by the aggregator and by
//! existing consumers, so they must not change.

use std::borrow::Cow;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

use crate::ability::StudentResult;
use crate::error::DegenerateInput;
use crate::items::{AbilityGrid, IccTable, ItemIssue, ItemParameters};
use crate::model::AnswerKey;
use crate::statistics::{mean, sample_std, Estimate};
use crate::tutors::{TutorCandidate, TutorRanking};

/// A complete analysis of one assessment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    /// Unique report identifier.
    pub id: Uuid,
    /// When the analysis ran.
    pub created_at: DateTime<Utc>,
    /// Name of the item estimator that produced the item parameters.
    pub estimator: String,
    pub answer_key: AnswerKey,
    /// One row per student, roster order.
    pub students: Vec<StudentResult>,
    /// One row per item, answer-key order.
    pub items: Vec<ItemParameters>,
    pub reliability: Estimate<f64>,
    pub tutors: TutorRanking,
    /// One row per (student, item).
    pub details: Vec<DetailRow>,
    /// The binary response matrix, row per student.
    pub responses: Vec<Vec<u8>>,
    /// Fallback substitutions made during the run.
    pub notices: Vec<DegenerateInput>,
    /// Grid used by [`AnalysisReport::icc`].
    pub icc_grid: AbilityGrid,
}

/// A student's answer to one item, joined with both sides' statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetailRow {
    pub student: String,
    pub item: String,
    /// The answer as given, untrimmed.
    pub chosen: String,
    pub correct: String,
    pub is_correct: bool,
    pub ability: f64,
    pub difficulty: f64,
    pub discrimination: f64,
}

/// Cohort-level figures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CohortSummary {
    pub students: usize,
    pub items: usize,
    pub mean_ability: f64,
    /// Sample standard deviation of ability; 0 for a single student.
    pub ability_std: f64,
    pub mean_percent_correct: f64,
    pub mean_difficulty: f64,
    pub reliability: f64,
}

impl AnalysisReport {
    pub fn summary(&self) -> CohortSummary {
        let abilities: Vec<f64> = self.students.iter().map(|s| s.ability).collect();
        let percents: Vec<f64> = self.students.iter().map(|s| s.percent_correct).collect();
        let difficulties: Vec<f64> = self.items.iter().map(|i| i.difficulty).collect();

        CohortSummary {
            students: self.students.len(),
            items: self.items.len(),
            mean_ability: mean(&abilities).unwrap_or(0.0),
            ability_std: sample_std(&abilities).unwrap_or(0.0),
            mean_percent_correct: mean(&percents).unwrap_or(0.0),
            mean_difficulty: mean(&difficulties).unwrap_or(0.0),
            reliability: self.reliability.value,
        }
    }

    pub fn student(&self, name: &str) -> Option<&StudentResult> {
        self.students.iter().find(|s| s.name == name)
    }

    pub fn item(&self, id: &str) -> Option<&ItemParameters> {
        self.items.iter().find(|i| i.item == id)
    }

    /// Students sorted by ability, highest first. Ties keep roster order.
    pub fn ability_ranking(&self) -> Vec<&StudentResult> {
        let mut ranked: Vec<&StudentResult> = self.students.iter().collect();
        ranked.sort_by(|a, b| b.ability.total_cmp(&a.ability));
        ranked
    }

    /// 1-based position of a student in [`AnalysisReport::ability_ranking`].
    pub fn ranking_position(&self, name: &str) -> Option<usize> {
        self.ability_ranking()
            .iter()
            .position(|s| s.name == name)
            .map(|p| p + 1)
    }

    pub fn details_for<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a DetailRow> + 'a {
        self.details.iter().filter(move |d| d.student == name)
    }

    /// Items with at least one issue, in answer-key order.
    pub fn problematic_items(&self) -> Vec<(&ItemParameters, Vec<ItemIssue>)> {
        self.items
            .iter()
            .filter_map(|item| {
                let issues = item.issues();
                (!issues.is_empty()).then_some((item, issues))
            })
            .collect()
    }

    /// Item characteristic curves over the configured grid.
    pub fn icc(&self) -> IccTable<'_> {
        IccTable::new(&self.items, &self.icc_grid)
    }

    /// Returns true if any statistic was replaced by a fallback constant.
    pub fn used_fallbacks(&self) -> bool {
        !self.notices.is_empty()
    }

    pub fn to_bundle(&self) -> ExportBundle {
        ExportBundle::from(self)
    }
}

/// How bundle timestamps are written by the earlier application.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

/// Reads a float written as `null` (or as a non-finite token rewritten by
/// [`null_non_finite`]) back as NaN.
pub(crate) fn nan_if_null<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(f64::NAN))
}

/// Rewrite bare `NaN`, `Infinity` and `-Infinity` tokens outside strings to
/// `null`. Bundles written by the earlier application contain them, for
/// example the standard deviation of a one-student run.
pub(crate) fn null_non_finite(content: &str) -> Cow<'_, str> {
    const TOKENS: [&str; 3] = ["-Infinity", "Infinity", "NaN"];
    if !TOKENS.iter().any(|t| content.contains(t)) {
        return Cow::Borrowed(content);
    }

    let mut out = String::with_capacity(content.len());
    let mut in_string = false;
    let mut escaped = false;
    let mut rest = content;
    while let Some(c) = rest.chars().next() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
        } else if c == '"' {
            in_string = true;
        } else if let Some(token) = TOKENS.iter().find(|t| rest.starts_with(**t)) {
            out.push_str("null");
            rest = &rest[token.len()..];
            continue;
        }
        out.push(c);
        rest = &rest[c.len_utf8()..];
    }
    Cow::Owned(out)
}

/// Persisted form of an analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportBundle {
    pub metadata: BundleMetadata,
    #[serde(rename = "gabarito")]
    pub answer_key: AnswerKey,
    #[serde(rename = "resumo_alunos")]
    pub students: Vec<StudentRow>,
    #[serde(rename = "resumo_questoes")]
    pub items: Vec<ItemRow>,
    #[serde(rename = "top_tutores", default, skip_serializing_if = "Vec::is_empty")]
    pub tutors: Vec<TutorRow>,
    #[serde(rename = "avisos", default, skip_serializing_if = "Vec::is_empty")]
    pub notices: Vec<DegenerateInput>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BundleMetadata {
    /// Local timestamp without offset, e.g. `2025-12-26T22:32:13.514421`.
    #[serde(rename = "data_analise")]
    pub analyzed_at: NaiveDateTime,
    #[serde(rename = "total_alunos")]
    pub total_students: usize,
    #[serde(rename = "total_questoes")]
    pub total_items: usize,
    #[serde(rename = "proficiencia_media", deserialize_with = "nan_if_null")]
    pub mean_ability: f64,
    #[serde(rename = "desvio_padrao_proficiencia", deserialize_with = "nan_if_null")]
    pub ability_std: f64,
    #[serde(rename = "taxa_acerto_media", deserialize_with = "nan_if_null")]
    pub mean_percent_correct: f64,
    #[serde(rename = "confiabilidade", deserialize_with = "nan_if_null")]
    pub reliability: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudentRow {
    #[serde(rename = "Aluno")]
    pub name: String,
    #[serde(rename = "Proficiencia (θ)", deserialize_with = "nan_if_null")]
    pub ability: f64,
    #[serde(rename = "Pontuacao Total")]
    pub raw_score: u32,
    #[serde(rename = "Percentual de Acerto", deserialize_with = "nan_if_null")]
    pub percent_correct: f64,
    #[serde(rename = "Z-Score", deserialize_with = "nan_if_null")]
    pub z_score: f64,
}

impl From<&StudentResult> for StudentRow {
    fn from(s: &StudentResult) -> Self {
        Self {
            name: s.name.clone(),
            ability: s.ability,
            raw_score: s.raw_score,
            percent_correct: round2(s.percent_correct),
            z_score: s.z_score,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemRow {
    #[serde(rename = "Questao")]
    pub item: String,
    #[serde(rename = "Dificuldade (b)", deserialize_with = "nan_if_null")]
    pub difficulty: f64,
    #[serde(rename = "Discriminacao (a)", deserialize_with = "nan_if_null")]
    pub discrimination: f64,
    #[serde(rename = "% Acerto", deserialize_with = "nan_if_null")]
    pub percent_correct: f64,
    // Older bundles may lack these two columns.
    #[serde(
        rename = "Indice de Discriminacao",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub discrimination_index: Option<f64>,
    #[serde(
        rename = "Correlacao Bisserial",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub point_biserial: Option<f64>,
}

impl From<&ItemParameters> for ItemRow {
    fn from(i: &ItemParameters) -> Self {
        Self {
            item: i.item.clone(),
            difficulty: i.difficulty,
            discrimination: i.discrimination.value,
            percent_correct: round2(i.percent_correct),
            discrimination_index: Some(i.discrimination_index),
            point_biserial: Some(i.point_biserial.value),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TutorRow {
    #[serde(flatten)]
    pub student: StudentRow,
    #[serde(rename = "Score_Tutor", deserialize_with = "nan_if_null")]
    pub score: f64,
    #[serde(rename = "Posicao")]
    pub rank: usize,
}

impl From<&TutorCandidate> for TutorRow {
    fn from(c: &TutorCandidate) -> Self {
        Self {
            student: StudentRow::from(&c.student),
            score: c.score,
            rank: c.rank,
        }
    }
}

impl From<&AnalysisReport> for ExportBundle {
    fn from(report: &AnalysisReport) -> Self {
        let summary = report.summary();
        Self {
            metadata: BundleMetadata {
                analyzed_at: report.created_at.naive_utc(),
                total_students: summary.students,
                total_items: summary.items,
                mean_ability: summary.mean_ability,
                ability_std: summary.ability_std,
                mean_percent_correct: summary.mean_percent_correct,
                reliability: summary.reliability,
            },
            answer_key: report.answer_key.clone(),
            students: report.students.iter().map(StudentRow::from).collect(),
            items: report.items.iter().map(ItemRow::from).collect(),
            tutors: report.tutors.candidates.iter().map(TutorRow::from).collect(),
            notices: report.notices.clone(),
        }
    }
}

impl ExportBundle {
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("failed to serialize export bundle")
    }

    /// Parse a bundle. Non-finite numbers (`NaN`, `Infinity`) are accepted
    /// and read as NaN.
    pub fn from_json_str(content: &str) -> Result<Self> {
        serde_json::from_str(&null_non_finite(content)).context("failed to parse export bundle JSON")
    }

    /// Save the bundle as pretty JSON, creating parent directories.
    pub fn save_json(&self, path: &Path) -> Result<()> {
        let json = self.to_json()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, json)
            .with_context(|| format!("failed to write bundle to {}", path.display()))?;
        Ok(())
    }

    pub fn load_json(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read bundle from {}", path.display()))?;
        Self::from_json_str(&content)
            .with_context(|| format!("invalid bundle: {}", path.display()))
    }

    pub fn student(&self, name: &str) -> Option<&StudentRow> {
        self.students.iter().find(|s| s.name == name)
    }
}
