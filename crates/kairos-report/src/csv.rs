//! CSV output.
//!
//! Two shapes: a single sectioned report (`=== TITLE ===` blocks separated by
//! blank lines) and one plain CSV file per table. Consolidated tables over
//! several bundles use the second shape.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use kairos_core::ability::ProficiencyBand;
use kairos_core::aggregate::{ConsolidatedReport, NamedBundle};
use kairos_core::report::{AnalysisReport, TIMESTAMP_FORMAT};

/// Quote a field if it contains a separator, quote or line break.
fn escape(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

fn row<I, S>(fields: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut line = fields
        .into_iter()
        .map(|f| escape(f.as_ref()))
        .collect::<Vec<_>>()
        .join(",");
    line.push('\n');
    line
}

/// Non-finite values are written as empty fields.
fn number(x: f64) -> String {
    if x.is_finite() {
        x.to_string()
    } else {
        String::new()
    }
}

fn header(out: &mut String, title: &str) {
    out.push_str(&format!("=== {title} ===\n"));
}

/// Render the sectioned CSV report, optionally with an individual analysis
/// for `student`.
pub fn generate_csv_report(report: &AnalysisReport, student: Option<&str>) -> Result<String> {
    let summary = report.summary();
    let mut out = String::new();

    header(&mut out, "METADADOS");
    out.push_str("Metrica,Valor\n");
    let metadata = [
        (
            "Data de geracao",
            report.created_at.format("%d/%m/%Y %H:%M:%S").to_string(),
        ),
        ("Total de alunos", summary.students.to_string()),
        ("Total de questoes", summary.items.to_string()),
        ("Proficiencia media", format!("{:.3}", summary.mean_ability)),
        (
            "Desvio padrao da proficiencia",
            format!("{:.3}", summary.ability_std),
        ),
        (
            "Dificuldade media das questoes",
            format!("{:.3}", summary.mean_difficulty),
        ),
        (
            "Taxa media de acerto",
            format!("{:.1}%", summary.mean_percent_correct),
        ),
        ("Confiabilidade", format!("{:.3}", summary.reliability)),
    ];
    for (name, value) in &metadata {
        out.push_str(&row([*name, value.as_str()]));
    }
    out.push('\n');

    header(&mut out, "EXPLICACAO DOS PARAMETROS TRI");
    out.push_str("Parametro,Descricao,Interpretacao\n");
    out.push_str(&row([
        "Dificuldade (b)",
        "Mede o nivel de dificuldade da questao",
        "Negativo: facil; Proximo a 0: media; Positivo: dificil",
    ]));
    out.push_str(&row([
        "Discriminacao (a)",
        "Capacidade de diferenciar alunos",
        "<0.3: baixa; 0.3-0.6: moderada; >0.6: alta; Negativo: problema grave",
    ]));
    out.push_str(&row([
        "Proficiencia (θ)",
        "Habilidade do aluno na escala TRI",
        "<-1.5: muito baixa; -1.5 a -0.5: baixa; -0.5 a 0.5: media; 0.5 a 1.5: alta; >1.5: muito alta",
    ]));
    out.push('\n');

    if !report.tutors.is_empty() {
        header(
            &mut out,
            &format!("TOP {} TUTORES DE COLEGAS", report.tutors.candidates.len()),
        );
        out.push_str("Posicao,Aluno,Proficiencia (θ),% Acerto,Score Tutor,Sugestao\n");
        let mentees = (report.students.len() / 10).min(3);
        for c in &report.tutors.candidates {
            out.push_str(&row([
                c.rank.to_string(),
                c.student.name.clone(),
                format!("{:.3}", c.student.ability),
                format!("{:.1}%", c.student.percent_correct),
                format!("{:.3}", c.score),
                format!("Tutor para {mentees} alunos"),
            ]));
        }
        out.push('\n');
    }

    header(&mut out, "RANKING DE ALUNOS");
    out.push_str("Posicao,Aluno,Proficiencia (θ),Percentual de Acerto,Pontuacao Total\n");
    for (i, s) in report.ability_ranking().iter().enumerate() {
        out.push_str(&row([
            (i + 1).to_string(),
            s.name.clone(),
            s.ability.to_string(),
            format!("{:.2}", s.percent_correct),
            s.raw_score.to_string(),
        ]));
    }
    out.push('\n');

    header(&mut out, "ANALISE DE QUESTOES");
    out.push_str("Questao,Dificuldade (b),Discriminacao (a),% Acerto,Correlacao Bisserial\n");
    for item in &report.items {
        out.push_str(&row([
            item.item.clone(),
            item.difficulty.to_string(),
            item.discrimination.value.to_string(),
            format!("{:.2}", item.percent_correct),
            item.point_biserial.value.to_string(),
        ]));
    }
    out.push('\n');

    let problematic = report.problematic_items();
    if !problematic.is_empty() {
        header(&mut out, "QUESTOES PROBLEMATICAS");
        out.push_str("Questao,Problemas,Dificuldade,Discriminacao,% Acerto,Acao Recomendada\n");
        for (item, issues) in &problematic {
            let labels: Vec<&str> = issues.iter().map(|i| i.label()).collect();
            out.push_str(&row([
                item.item.clone(),
                labels.join(";"),
                format!("{:.3}", item.difficulty),
                format!("{:.3}", item.discrimination.value),
                format!("{:.1}%", item.percent_correct),
                "Revisar questao".to_string(),
            ]));
        }
        out.push('\n');
    }

    if let Some(name) = student {
        individual_sections(&mut out, report, name)?;
    }

    Ok(out)
}

fn individual_sections(out: &mut String, report: &AnalysisReport, name: &str) -> Result<()> {
    let Some(result) = report.student(name) else {
        anyhow::bail!("student not found in report: {name}");
    };
    let rank = report.ranking_position(name).unwrap_or(report.students.len());

    header(out, &format!("ANALISE INDIVIDUAL: {name}"));
    out.push_str("Metrica,Valor\n");
    out.push_str(&row(["Proficiencia (θ)".to_string(), format!("{:.3}", result.ability)]));
    out.push_str(&row([
        "Pontuacao".to_string(),
        format!("{}/{}", result.raw_score, report.items.len()),
    ]));
    out.push_str(&row([
        "Percentual de acerto".to_string(),
        format!("{:.1}%", result.percent_correct),
    ]));
    out.push_str(&row([
        "Posicao no ranking".to_string(),
        format!("{rank}º de {}", report.students.len()),
    ]));
    match report.tutors.find(name) {
        Some(tutor) => {
            out.push_str("E tutor potencial?,Sim\n");
            out.push_str(&row(["Score como tutor".to_string(), format!("{:.3}", tutor.score)]));
            out.push_str(&row(["Posicao entre tutores".to_string(), format!("{}º", tutor.rank)]));
        }
        None => out.push_str("E tutor potencial?,Nao\n"),
    }
    out.push('\n');

    let band = ProficiencyBand::from_ability(result.ability);
    header(out, "INTERPRETACAO DA PROFICIENCIA");
    out.push_str(&row(["Classificacao", band.label()]));
    out.push_str(&row(["Recomendacao", band.recommendation()]));
    out.push_str(&row(["Sugestao", band.suggestion()]));
    out.push('\n');

    header(out, "DETALHAMENTO POR QUESTAO");
    out.push_str("Questao,Resposta_Aluno,Resposta_Correta,Acerto,Dificuldade_Questao\n");
    for d in report.details_for(name) {
        out.push_str(&row([
            d.item.clone(),
            d.chosen.clone(),
            d.correct.clone(),
            u8::from(d.is_correct).to_string(),
            d.difficulty.to_string(),
        ]));
    }
    Ok(())
}

/// Binary response matrix with a leading name column.
pub fn responses_csv(report: &AnalysisReport) -> String {
    let mut out = row(std::iter::once("Aluno".to_string()).chain(report.answer_key.item_ids()));
    for (student, responses) in report.students.iter().zip(&report.responses) {
        out.push_str(&row(
            std::iter::once(student.name.clone()).chain(responses.iter().map(u8::to_string)),
        ));
    }
    out
}

pub fn students_csv(report: &AnalysisReport) -> String {
    let mut out = String::from("Aluno,Proficiencia (θ),Pontuacao Total,Percentual de Acerto,Z-Score\n");
    for s in &report.students {
        out.push_str(&row([
            s.name.clone(),
            s.ability.to_string(),
            s.raw_score.to_string(),
            format!("{:.2}", s.percent_correct),
            s.z_score.to_string(),
        ]));
    }
    out
}

pub fn items_csv(report: &AnalysisReport) -> String {
    let mut out = String::from(
        "Questao,Dificuldade (b),Discriminacao (a),% Acerto,Indice de Discriminacao,Correlacao Bisserial\n",
    );
    for item in &report.items {
        out.push_str(&row([
            item.item.clone(),
            item.difficulty.to_string(),
            item.discrimination.value.to_string(),
            format!("{:.2}", item.percent_correct),
            item.discrimination_index.to_string(),
            item.point_biserial.value.to_string(),
        ]));
    }
    out
}

pub fn details_csv(report: &AnalysisReport) -> String {
    let mut out = String::from(
        "Aluno,Questao,Resposta_Aluno,Resposta_Correta,Acerto,Proficiencia_Aluno,Dificuldade_Questao,Discriminacao_Questao\n",
    );
    for d in &report.details {
        out.push_str(&row([
            d.student.clone(),
            d.item.clone(),
            d.chosen.clone(),
            d.correct.clone(),
            u8::from(d.is_correct).to_string(),
            d.ability.to_string(),
            d.difficulty.to_string(),
            d.discrimination.to_string(),
        ]));
    }
    out
}

pub fn tutors_csv(report: &AnalysisReport) -> String {
    let mut out = String::from("Posicao,Aluno,Proficiencia (θ),Percentual de Acerto,Score_Tutor\n");
    for c in &report.tutors.candidates {
        out.push_str(&row([
            c.rank.to_string(),
            c.student.name.clone(),
            c.student.ability.to_string(),
            format!("{:.2}", c.student.percent_correct),
            c.score.to_string(),
        ]));
    }
    out
}

/// Write one CSV file per table into `dir` and return their paths.
///
/// `top_tutores.csv` is only written when there are tutors.
pub fn write_csv_tables(report: &AnalysisReport, dir: &Path) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("failed to create directory: {}", dir.display()))?;

    let mut tables = vec![
        ("respostas_binarias.csv", responses_csv(report)),
        ("resultados_alunos.csv", students_csv(report)),
        ("analise_questoes.csv", items_csv(report)),
        ("detalhado.csv", details_csv(report)),
    ];
    if !report.tutors.is_empty() {
        tables.push(("top_tutores.csv", tutors_csv(report)));
    }

    let mut written = Vec::with_capacity(tables.len());
    for (name, content) in tables {
        let path = dir.join(name);
        std::fs::write(&path, content)
            .with_context(|| format!("failed to write {}", path.display()))?;
        written.push(path);
    }
    Ok(written)
}

/// One row per assessment.
pub fn assessments_csv(report: &ConsolidatedReport) -> String {
    let mut out = String::from(
        "Avaliação,Data Análise,Total Alunos,Total Questões,Proficiência Média,Desvio Padrão,Taxa Acerto Média,Confiabilidade\n",
    );
    for a in &report.assessments {
        out.push_str(&row([
            a.name.clone(),
            a.analyzed_at.format(TIMESTAMP_FORMAT).to_string(),
            a.total_students.to_string(),
            a.total_items.to_string(),
            number(a.mean_ability),
            number(a.ability_std),
            number(a.mean_percent_correct),
            number(a.reliability),
        ]));
    }
    out
}

/// One row per student per assessment.
pub fn consolidated_students_csv(bundles: &[NamedBundle]) -> String {
    let mut out = String::from("Avaliação,Aluno,Proficiência,Pontuação Total,% Acerto,Z-Score\n");
    for b in bundles {
        for s in &b.bundle.students {
            out.push_str(&row([
                b.name.clone(),
                s.name.clone(),
                number(s.ability),
                s.raw_score.to_string(),
                number(s.percent_correct),
                number(s.z_score),
            ]));
        }
    }
    out
}

/// One row per item per assessment. A missing point-biserial is left empty.
pub fn consolidated_items_csv(bundles: &[NamedBundle]) -> String {
    let mut out =
        String::from("Avaliação,Questão,Dificuldade,Discriminação,% Acerto,Correlação Bisserial\n");
    for b in bundles {
        for i in &b.bundle.items {
            out.push_str(&row([
                b.name.clone(),
                i.item.clone(),
                number(i.difficulty),
                number(i.discrimination),
                number(i.percent_correct),
                i.point_biserial.map(number).unwrap_or_default(),
            ]));
        }
    }
    out
}

pub fn consolidated_tutors_csv(bundles: &[NamedBundle]) -> String {
    let mut out = String::from(
        "Avaliação,Aluno,Proficiência,Pontuação Total,% Acerto,Score_Tutor,Posição\n",
    );
    for b in bundles {
        for t in &b.bundle.tutors {
            out.push_str(&row([
                b.name.clone(),
                t.student.name.clone(),
                number(t.student.ability),
                t.student.raw_score.to_string(),
                number(t.student.percent_correct),
                number(t.score),
                t.rank.to_string(),
            ]));
        }
    }
    out
}

/// Write `avaliacoes.csv`, `alunos.csv`, `questoes.csv` and, when any
/// bundle lists tutors, `tutores.csv` into `dir`.
pub fn write_consolidated_csv_tables(
    report: &ConsolidatedReport,
    bundles: &[NamedBundle],
    dir: &Path,
) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("failed to create directory: {}", dir.display()))?;

    let mut tables = vec![
        ("avaliacoes.csv", assessments_csv(report)),
        ("alunos.csv", consolidated_students_csv(bundles)),
        ("questoes.csv", consolidated_items_csv(bundles)),
    ];
    if bundles.iter().any(|b| !b.bundle.tutors.is_empty()) {
        tables.push(("tutores.csv", consolidated_tutors_csv(bundles)));
    }

    let mut written = Vec::with_capacity(tables.len());
    for (name, content) in tables {
        let path = dir.join(name);
        std::fs::write(&path, content)
            .with_context(|| format!("failed to write {}", path.display()))?;
        written.push(path);
    }
    Ok(written)
}

/// Write the sectioned CSV report to a file.
pub fn write_csv_report(report: &AnalysisReport, student: Option<&str>, path: &Path) -> Result<()> {
    let csv = generate_csv_report(report, student)?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, csv)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use kairos_core::model::{AnswerKey, Roster, StudentAnswers};

    fn make_test_report() -> AnalysisReport {
        let key = AnswerKey::from_letters("ABCC").unwrap();
        let roster = Roster::new(vec![
            StudentAnswers::new("S1", ["A", "B", "C", "C"]),
            StudentAnswers::new("Silva, Ana", ["A", "A", "A", "A"]),
            StudentAnswers::new("S3", ["D", "B", "C", "A"]),
        ]);
        kairos_core::analyze(&key, &roster).unwrap()
    }

    #[test]
    fn escaping() {
        assert_eq!(escape("plain"), "plain");
        assert_eq!(escape("a,b"), "\"a,b\"");
        assert_eq!(escape("say \"hi\""), "\"say \"\"hi\"\"\"");
    }

    #[test]
    fn sectioned_report() {
        let csv = generate_csv_report(&make_test_report(), None).unwrap();
        for title in [
            "=== METADADOS ===",
            "=== EXPLICACAO DOS PARAMETROS TRI ===",
            "=== RANKING DE ALUNOS ===",
            "=== ANALISE DE QUESTOES ===",
        ] {
            assert!(csv.contains(title), "missing {title}");
        }
        assert!(csv.contains("Total de alunos,3"));
        assert!(csv.contains("\"Silva, Ana\""));
        assert!(!csv.contains("ANALISE INDIVIDUAL"));
    }

    #[test]
    fn individual_sections_included() {
        let csv = generate_csv_report(&make_test_report(), Some("S3")).unwrap();
        assert!(csv.contains("=== ANALISE INDIVIDUAL: S3 ==="));
        assert!(csv.contains("Pontuacao,2/4"));
        assert!(csv.contains("=== DETALHAMENTO POR QUESTAO ==="));
        assert!(csv.contains("Q1,D,A,0,"));
        assert!(generate_csv_report(&make_test_report(), Some("Zeca")).is_err());
    }

    #[test]
    fn binary_responses_table() {
        let csv = responses_csv(&make_test_report());
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], "Aluno,Q1,Q2,Q3,Q4");
        assert_eq!(lines[1], "S1,1,1,1,1");
        assert_eq!(lines[2], "\"Silva, Ana\",1,0,0,0");
        assert_eq!(lines[3], "S3,0,1,1,0");
    }

    fn two_bundles() -> Vec<NamedBundle> {
        let bundle = make_test_report().to_bundle();
        vec![
            NamedBundle::new("prova_1", bundle.clone()),
            NamedBundle::new("prova_2", bundle),
        ]
    }

    #[test]
    fn consolidated_tables() {
        let bundles = two_bundles();
        let report = kairos_core::aggregate::consolidate(&bundles);

        let assessments = assessments_csv(&report);
        let lines: Vec<&str> = assessments.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("Avaliação,Data Análise,"));
        assert!(lines[1].starts_with("prova_1,"));
        assert!(lines[1].contains('T'));

        let students = consolidated_students_csv(&bundles);
        assert_eq!(students.lines().count(), 1 + 6);
        assert!(students.contains("prova_2,\"Silva, Ana\","));

        let items = consolidated_items_csv(&bundles);
        assert_eq!(items.lines().count(), 1 + 8);
        assert!(items.lines().nth(1).unwrap().starts_with("prova_1,Q1,"));
    }

    #[test]
    fn consolidated_csv_writes_empty_fields_for_missing_values() {
        let mut bundles = two_bundles();
        bundles[0].bundle.items[0].point_biserial = None;
        bundles[0].bundle.students[0].z_score = f64::NAN;

        let items = consolidated_items_csv(&bundles);
        assert!(items.lines().nth(1).unwrap().ends_with(','));
        let students = consolidated_students_csv(&bundles);
        assert!(students.lines().nth(1).unwrap().ends_with(','));
    }

    #[test]
    fn writes_consolidated_files() {
        let dir = tempfile::tempdir().unwrap();
        let mut bundles = two_bundles();
        let report = kairos_core::aggregate::consolidate(&bundles);
        let paths = write_consolidated_csv_tables(&report, &bundles, dir.path()).unwrap();
        assert_eq!(paths.len(), 4);
        let tutors = std::fs::read_to_string(dir.path().join("tutores.csv")).unwrap();
        assert_eq!(tutors.lines().count(), 1 + 2);

        for b in &mut bundles {
            b.bundle.tutors.clear();
        }
        let other = tempfile::tempdir().unwrap();
        let paths = write_consolidated_csv_tables(&report, &bundles, other.path()).unwrap();
        assert_eq!(paths.len(), 3);
        assert!(!other.path().join("tutores.csv").exists());
    }

    #[test]
    fn writes_table_files() {
        let dir = tempfile::tempdir().unwrap();
        let report = make_test_report();
        let paths = write_csv_tables(&report, dir.path()).unwrap();
        assert_eq!(paths.len(), 5);
        let details = std::fs::read_to_string(dir.path().join("detalhado.csv")).unwrap();
        assert_eq!(details.lines().count(), 1 + 12);
    }
}
