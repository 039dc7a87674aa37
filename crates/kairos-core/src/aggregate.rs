//! Multi-assessment aggregation over saved export bundles.
//!
//! Reads several bundles, summarizes each one, consolidates them into a
//! single report and compares two bundles to find students whose ability
//! moved.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::report::{nan_if_null, ExportBundle, ItemRow};
use crate::statistics::mean;

/// Number of students listed in `melhores_alunos`.
pub const TOP_STUDENTS: usize = 5;

/// A bundle together with the assessment name it was loaded under.
#[derive(Debug, Clone, PartialEq)]
pub struct NamedBundle {
    /// File stem of the bundle, e.g. `prova_1` for `prova_1.json`.
    pub name: String,
    pub bundle: ExportBundle,
}

impl NamedBundle {
    pub fn new(name: impl Into<String>, bundle: ExportBundle) -> Self {
        Self {
            name: name.into(),
            bundle,
        }
    }
}

/// Load bundles from explicit paths, in the given order.
pub fn load_bundles(paths: &[PathBuf]) -> Result<Vec<NamedBundle>> {
    paths
        .iter()
        .map(|path| {
            let name = path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .with_context(|| format!("bundle path has no file name: {}", path.display()))?;
            Ok(NamedBundle::new(name, ExportBundle::load_json(path)?))
        })
        .collect()
}

/// Load every `.json` bundle in a directory, sorted by file name.
///
/// Files that are not valid bundles are skipped with a warning.
pub fn load_bundle_directory(dir: &Path) -> Result<Vec<NamedBundle>> {
    if !dir.is_dir() {
        anyhow::bail!("not a directory: {}", dir.display());
    }

    let mut paths = Vec::new();
    for entry in std::fs::read_dir(dir)
        .with_context(|| format!("failed to read directory: {}", dir.display()))?
    {
        let path = entry?.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == "json") {
            paths.push(path);
        }
    }
    paths.sort();

    let mut bundles = Vec::new();
    for path in paths {
        match load_bundles(std::slice::from_ref(&path)) {
            Ok(mut loaded) => bundles.append(&mut loaded),
            Err(e) => warn!("skipping {}: {:#}", path.display(), e),
        }
    }
    debug!(dir = %dir.display(), bundles = bundles.len(), "loaded bundles");
    Ok(bundles)
}

/// One row of `avaliacoes_detalhadas`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssessmentSummary {
    #[serde(rename = "Avaliação")]
    pub name: String,
    #[serde(rename = "Data Análise")]
    pub analyzed_at: NaiveDateTime,
    #[serde(rename = "Total Alunos")]
    pub total_students: usize,
    #[serde(rename = "Total Questões")]
    pub total_items: usize,
    #[serde(rename = "Proficiência Média", deserialize_with = "nan_if_null")]
    pub mean_ability: f64,
    #[serde(rename = "Desvio Padrão", deserialize_with = "nan_if_null")]
    pub ability_std: f64,
    #[serde(rename = "Taxa Acerto Média", deserialize_with = "nan_if_null")]
    pub mean_percent_correct: f64,
    #[serde(rename = "Confiabilidade", deserialize_with = "nan_if_null")]
    pub reliability: f64,
}

impl From<&NamedBundle> for AssessmentSummary {
    fn from(b: &NamedBundle) -> Self {
        let m = &b.bundle.metadata;
        Self {
            name: b.name.clone(),
            analyzed_at: m.analyzed_at,
            total_students: m.total_students,
            total_items: m.total_items,
            mean_ability: m.mean_ability,
            ability_std: m.ability_std,
            mean_percent_correct: m.mean_percent_correct,
            reliability: m.reliability,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneralMetrics {
    #[serde(rename = "proficiencia_media_geral")]
    pub mean_ability: f64,
    #[serde(rename = "taxa_acerto_media_geral")]
    pub mean_percent_correct: f64,
    #[serde(rename = "confiabilidade_media")]
    pub mean_reliability: f64,
}

/// Consolidated view over several assessments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsolidatedReport {
    #[serde(rename = "data_geracao")]
    pub generated_at: NaiveDateTime,
    #[serde(rename = "total_avaliacoes")]
    pub total_assessments: usize,
    #[serde(rename = "total_alunos_unicos")]
    pub unique_students: usize,
    #[serde(rename = "metricas_gerais")]
    pub metrics: GeneralMetrics,
    /// Best students by mean ability across assessments, best first.
    #[serde(rename = "melhores_alunos", with = "ordered_map")]
    pub top_students: Vec<(String, f64)>,
    #[serde(rename = "avaliacoes_detalhadas")]
    pub assessments: Vec<AssessmentSummary>,
    /// Not part of the JSON export; rendered in the text report.
    #[serde(skip)]
    pub question_stats: Option<QuestionStatistics>,
    #[serde(skip)]
    pub tutor_stats: Option<TutorStatistics>,
}

impl ConsolidatedReport {
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("failed to serialize consolidated report")
    }

    pub fn save_json(&self, path: &Path) -> Result<()> {
        let json = self.to_json()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, json)
            .with_context(|| format!("failed to write report to {}", path.display()))?;
        Ok(())
    }
}

/// Serializes `Vec<(String, f64)>` as a JSON object, keeping order.
mod ordered_map {
    use std::fmt;

    use serde::de::{MapAccess, Visitor};
    use serde::ser::SerializeMap;
    use serde::{Deserializer, Serializer};

    pub fn serialize<S: Serializer>(entries: &[(String, f64)], serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(entries.len()))?;
        for (k, v) in entries {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<(String, f64)>, D::Error> {
        struct EntriesVisitor;

        impl<'de> Visitor<'de> for EntriesVisitor {
            type Value = Vec<(String, f64)>;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of student name to ability")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut entries = Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some(entry) = access.next_entry::<String, f64>()? {
                    entries.push(entry);
                }
                Ok(entries)
            }
        }

        deserializer.deserialize_map(EntriesVisitor)
    }
}

/// An item located by assessment and item id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemLocation {
    pub assessment: String,
    pub item: String,
    pub percent_correct: f64,
}

/// Item statistics pooled over every item row of every bundle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionStatistics {
    /// Highest `% Acerto`; the first one wins ties.
    pub easiest: ItemLocation,
    /// Lowest `% Acerto`; the first one wins ties.
    pub hardest: ItemLocation,
    pub mean_discrimination: f64,
    pub mean_difficulty: f64,
}

/// `None` when no bundle has item rows.
pub fn question_statistics(bundles: &[NamedBundle]) -> Option<QuestionStatistics> {
    let rows: Vec<(&str, &ItemRow)> = bundles
        .iter()
        .flat_map(|b| b.bundle.items.iter().map(move |i| (b.name.as_str(), i)))
        .collect();
    let locate = |(assessment, item): (&str, &ItemRow)| ItemLocation {
        assessment: assessment.to_string(),
        item: item.item.clone(),
        percent_correct: item.percent_correct,
    };

    let mut easiest = *rows.first()?;
    let mut hardest = easiest;
    for &row in &rows[1..] {
        if row.1.percent_correct > easiest.1.percent_correct {
            easiest = row;
        }
        if row.1.percent_correct < hardest.1.percent_correct {
            hardest = row;
        }
    }

    let finite_mean = |f: fn(&ItemRow) -> f64| {
        let values: Vec<f64> = rows.iter().map(|(_, i)| f(i)).filter(|v| v.is_finite()).collect();
        mean(&values).unwrap_or(f64::NAN)
    };

    Some(QuestionStatistics {
        easiest: locate(easiest),
        hardest: locate(hardest),
        mean_discrimination: finite_mean(|i| i.discrimination),
        mean_difficulty: finite_mean(|i| i.difficulty),
    })
}

/// Tutor figures pooled over every `top_tutores` list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TutorStatistics {
    /// Distinct students named as tutor in at least one assessment.
    pub unique_tutors: usize,
    pub mean_score: f64,
}

/// `None` when no bundle lists tutors.
pub fn tutor_statistics(bundles: &[NamedBundle]) -> Option<TutorStatistics> {
    let tutors: Vec<_> = bundles.iter().flat_map(|b| &b.bundle.tutors).collect();
    if tutors.is_empty() {
        return None;
    }
    let names: BTreeSet<&str> = tutors.iter().map(|t| t.student.name.as_str()).collect();
    let scores: Vec<f64> = tutors.iter().map(|t| t.score).filter(|s| s.is_finite()).collect();
    Some(TutorStatistics {
        unique_tutors: names.len(),
        mean_score: mean(&scores).unwrap_or(f64::NAN),
    })
}

/// Mean ability per student across every bundle they appear in.
fn mean_abilities(bundles: &[NamedBundle]) -> BTreeMap<&str, f64> {
    let mut per_student: BTreeMap<&str, Vec<f64>> = BTreeMap::new();
    for b in bundles {
        for s in &b.bundle.students {
            if s.ability.is_finite() {
                per_student.entry(s.name.as_str()).or_default().push(s.ability);
            }
        }
    }
    per_student
        .into_iter()
        .filter_map(|(name, values)| mean(&values).map(|m| (name, m)))
        .collect()
}

/// Consolidate several bundles into one report.
///
/// Non-finite values from older bundles are left out of the means.
pub fn consolidate(bundles: &[NamedBundle]) -> ConsolidatedReport {
    let assessments: Vec<AssessmentSummary> = bundles.iter().map(AssessmentSummary::from).collect();
    let metric = |f: fn(&AssessmentSummary) -> f64| {
        let values: Vec<f64> = assessments.iter().map(f).filter(|v| v.is_finite()).collect();
        mean(&values).unwrap_or(0.0)
    };

    let abilities = mean_abilities(bundles);
    let mut top_students: Vec<(String, f64)> = abilities
        .iter()
        .map(|(name, m)| (name.to_string(), *m))
        .collect();
    top_students.sort_by(|a, b| b.1.total_cmp(&a.1));
    top_students.truncate(TOP_STUDENTS);

    let unique_students: BTreeSet<&str> = bundles
        .iter()
        .flat_map(|b| &b.bundle.students)
        .map(|s| s.name.as_str())
        .collect();

    ConsolidatedReport {
        generated_at: Utc::now().naive_utc(),
        total_assessments: bundles.len(),
        unique_students: unique_students.len(),
        metrics: GeneralMetrics {
            mean_ability: metric(|a| a.mean_ability),
            mean_percent_correct: metric(|a| a.mean_percent_correct),
            mean_reliability: metric(|a| a.reliability),
        },
        top_students,
        assessments,
        question_stats: question_statistics(bundles),
        tutor_stats: tutor_statistics(bundles),
    }
}

/// One student's result in one assessment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvolutionPoint {
    pub assessment: String,
    pub ability: f64,
    pub percent_correct: f64,
}

/// A student's results across assessments, in bundle order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudentEvolution {
    pub student: String,
    pub points: Vec<EvolutionPoint>,
}

impl StudentEvolution {
    /// Ability change from the first to the last assessment.
    pub fn ability_change(&self) -> Option<f64> {
        match (self.points.first(), self.points.last()) {
            (Some(first), Some(last)) if self.points.len() > 1 => Some(last.ability - first.ability),
            _ => None,
        }
    }
}

/// Trajectories for every student, sorted by name.
pub fn student_evolution(bundles: &[NamedBundle]) -> Vec<StudentEvolution> {
    let mut by_student: BTreeMap<&str, Vec<EvolutionPoint>> = BTreeMap::new();
    for b in bundles {
        for s in &b.bundle.students {
            by_student.entry(s.name.as_str()).or_default().push(EvolutionPoint {
                assessment: b.name.clone(),
                ability: s.ability,
                percent_correct: s.percent_correct,
            });
        }
    }
    by_student
        .into_iter()
        .map(|(student, points)| StudentEvolution {
            student: student.to_string(),
            points,
        })
        .collect()
}

/// A student whose ability moved by more than the threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AbilityChange {
    pub student: String,
    pub baseline: f64,
    pub current: f64,
    pub delta: f64,
}

/// Result of comparing two bundles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BundleComparison {
    /// Students whose ability went down, largest drop first.
    pub declines: Vec<AbilityChange>,
    /// Students whose ability went up, largest gain first.
    pub gains: Vec<AbilityChange>,
    /// Students with no significant change.
    pub unchanged: usize,
    /// Students in current but not baseline.
    pub new_students: Vec<String>,
    /// Students in baseline but not current.
    pub missing_students: Vec<String>,
    /// Change in reliability, current minus baseline.
    pub reliability_delta: f64,
}

/// Compare a bundle against a baseline, flagging ability changes larger
/// than `threshold`.
pub fn compare(baseline: &ExportBundle, current: &ExportBundle, threshold: f64) -> BundleComparison {
    let baseline_scores: HashMap<&str, f64> = baseline
        .students
        .iter()
        .map(|s| (s.name.as_str(), s.ability))
        .collect();

    let mut declines = Vec::new();
    let mut gains = Vec::new();
    let mut unchanged = 0usize;
    let mut new_students = Vec::new();

    for s in &current.students {
        let Some(&before) = baseline_scores.get(s.name.as_str()) else {
            new_students.push(s.name.clone());
            continue;
        };
        let delta = s.ability - before;
        let change = AbilityChange {
            student: s.name.clone(),
            baseline: before,
            current: s.ability,
            delta,
        };
        if delta < -threshold {
            declines.push(change);
        } else if delta > threshold {
            gains.push(change);
        } else {
            unchanged += 1;
        }
    }

    declines.sort_by(|a, b| a.delta.total_cmp(&b.delta));
    gains.sort_by(|a, b| b.delta.total_cmp(&a.delta));

    let missing_students = baseline
        .students
        .iter()
        .filter(|s| current.student(&s.name).is_none())
        .map(|s| s.name.clone())
        .collect();

    BundleComparison {
        declines,
        gains,
        unchanged,
        new_students,
        missing_students,
        reliability_delta: current.metadata.reliability - baseline.metadata.reliability,
    }
}

impl BundleComparison {
    /// Format the comparison as markdown.
    pub fn to_markdown(&self) -> String {
        let mut md = String::new();

        md.push_str(&format!(
            "**Summary:** {} declines, {} gains, {} unchanged, {} new, {} missing\n\n",
            self.declines.len(),
            self.gains.len(),
            self.unchanged,
            self.new_students.len(),
            self.missing_students.len()
        ));

        let mut table = |title: &str, rows: &[AbilityChange]| {
            if rows.is_empty() {
                return;
            }
            md.push_str(&format!("### {title}\n\n"));
            md.push_str("| Student | Baseline θ | Current θ | Delta |\n");
            md.push_str("|---------|------------|-----------|-------|\n");
            for c in rows {
                md.push_str(&format!(
                    "| {} | {:.3} | {:.3} | {:+.3} |\n",
                    c.student, c.baseline, c.current, c.delta
                ));
            }
            md.push('\n');
        };
        table("Declines", &self.declines);
        table("Gains", &self.gains);

        if !self.new_students.is_empty() {
            md.push_str(&format!("**New:** {}\n\n", self.new_students.join(", ")));
        }
        if !self.missing_students.is_empty() {
            md.push_str(&format!("**Missing:** {}\n", self.missing_students.join(", ")));
        }

        md
    }

    pub fn has_declines(&self) -> bool {
        !self.declines.is_empty()
    }
}
