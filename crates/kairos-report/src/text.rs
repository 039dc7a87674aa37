//! Plain-text reports.
//!
//! Single analysis sections: header, parameter guide, cohort panorama,
//! tutors, optional individual analysis, item analysis, fallback notices,
//! recommendations. The consolidated report covers several assessments.

use std::path::Path;

use anyhow::Result;
use comfy_table::{Cell, CellAlignment, Table};

use kairos_core::ability::ProficiencyBand;
use kairos_core::aggregate::ConsolidatedReport;
use kairos_core::report::{AnalysisReport, TIMESTAMP_FORMAT};

const RULE: usize = 70;
const CONSOLIDATED_RULE: usize = 60;
const SUBRULE: usize = 40;

const PARAMETER_GUIDE: &[&str] = &[
    "1. DIFICULDADE (b):",
    "   - Valores negativos: Questao facil",
    "   - Valores proximos a 0: Dificuldade media",
    "   - Valores positivos: Questao dificil",
    "   - Faixa tipica: -3 a +3",
    "",
    "2. DISCRIMINACAO (a):",
    "   - Valores abaixo de 0.3: Discriminacao baixa (questao problematica)",
    "   - Valores 0.3-0.6: Discriminacao moderada",
    "   - Valores acima de 0.6: Discriminacao alta (questao excelente)",
    "   - Valores negativos: Questao funciona inversamente (erro grave)",
    "",
    "3. PROFICIENCIA (θ):",
    "   - Valores abaixo de -1: Proficiencia baixa",
    "   - Valores entre -1 e +1: Proficiencia media",
    "   - Valores acima de +1: Proficiencia alta",
    "   - Escala tipica: -4 a +4 (media 0, desvio padrao 1)",
];

const TUTORING_SUGGESTIONS: &[&str] = &[
    "1. Formar grupos de 3-4 alunos com 1 tutor",
    "2. Atribuir tutores para temas especificos de dificuldade",
    "3. Realizar sessoes semanais de reforco",
];

const RECOMMENDATIONS: &[&str] = &[
    "1. Revise questoes com discriminacao abaixo de 0.3",
    "2. Considere reformular questoes muito faceis (>90%) ou dificeis (<20%)",
    "3. Use questoes com alta discriminacao (>0.6) em futuras avaliacoes",
    "4. Organize grupos de tutoria com os melhores alunos identificados",
    "5. Planeje atividades de reforco para alunos com θ < -0.5",
    "6. Proponha desafios adicionais para alunos com θ > 1.0",
    "7. Implemente monitoramento continuo com relatorios mensais",
    "8. Use os dados para personalizacao do ensino",
];

fn section(out: &mut String, title: &str) {
    out.push_str(title);
    out.push('\n');
    out.push_str(&"-".repeat(SUBRULE));
    out.push('\n');
}

fn truncate(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

/// Render the text report, optionally with an individual analysis for
/// `student`. Fails if `student` is not in the report.
pub fn generate_text(report: &AnalysisReport, student: Option<&str>) -> Result<String> {
    let summary = report.summary();
    let mut out = String::new();

    out.push_str(&"=".repeat(RULE));
    out.push_str("\nRELATORIO DE ANALISE - KAIROS\n");
    out.push_str(&"=".repeat(RULE));
    out.push('\n');
    out.push_str(&format!(
        "Data de geracao: {}\n",
        report.created_at.format("%d/%m/%Y %H:%M:%S")
    ));
    out.push_str(&format!("Total de alunos: {}\n", summary.students));
    out.push_str(&format!("Total de questoes: {}\n\n", summary.items));

    section(&mut out, "EXPLICACAO DOS PARAMETROS TRI");
    for line in PARAMETER_GUIDE {
        out.push_str(line);
        out.push('\n');
    }
    out.push('\n');

    section(&mut out, "PANORAMA GERAL DA TURMA");
    out.push_str(&format!("Proficiencia media (θ): {:.3}\n", summary.mean_ability));
    out.push_str(&format!(
        "Desvio padrao da proficiencia: {:.3}\n",
        summary.ability_std
    ));
    out.push_str(&format!(
        "Taxa media de acerto: {:.1}%\n",
        summary.mean_percent_correct
    ));
    out.push_str(&format!(
        "Dificuldade media das questoes (b): {:.3}\n",
        summary.mean_difficulty
    ));
    out.push_str(&format!("Confiabilidade do teste: {:.3}\n\n", summary.reliability));

    if !report.tutors.is_empty() {
        section(
            &mut out,
            &format!("TOP {} TUTORES DE COLEGAS", report.tutors.candidates.len()),
        );
        let mut table = Table::new();
        table.set_header(vec!["Pos", "Aluno", "Proficiencia (θ)", "% Acerto", "Score Tutor"]);
        for c in &report.tutors.candidates {
            table.add_row(vec![
                Cell::new(c.rank).set_alignment(CellAlignment::Right),
                Cell::new(truncate(&c.student.name, 20)),
                Cell::new(format!("{:.2}", c.student.ability)).set_alignment(CellAlignment::Right),
                Cell::new(format!("{:.1}%", c.student.percent_correct))
                    .set_alignment(CellAlignment::Right),
                Cell::new(format!("{:.2}", c.score)).set_alignment(CellAlignment::Right),
            ]);
        }
        out.push_str(&format!("{table}\n\n"));
        out.push_str("SUGESTOES PARA GRUPOS DE TUTORIA:\n");
        for line in TUTORING_SUGGESTIONS {
            out.push_str(line);
            out.push('\n');
        }
        out.push('\n');
    }

    if let Some(name) = student {
        individual_section(&mut out, report, name)?;
    }

    section(&mut out, "ANALISE DAS QUESTOES");
    let problematic = report.problematic_items();
    if problematic.is_empty() {
        out.push_str("Todas as questoes apresentam caracteristicas adequadas.\n");
    } else {
        out.push_str(&format!(
            "Questoes que requerem atencao ({}):\n",
            problematic.len()
        ));
        for (item, issues) in &problematic {
            let labels: Vec<&str> = issues.iter().map(|i| i.label()).collect();
            out.push_str(&format!(
                "   * {}: {} (Dificuldade: {:.2}, Acerto: {:.1}%)\n",
                item.item,
                labels.join(", "),
                item.difficulty,
                item.percent_correct
            ));
        }
    }
    out.push('\n');

    if report.used_fallbacks() {
        section(&mut out, "AVISOS");
        for notice in &report.notices {
            out.push_str(&format!("   * {notice}\n"));
        }
        out.push('\n');
    }

    section(&mut out, "RECOMENDACOES PEDAGOGICAS");
    for line in RECOMMENDATIONS {
        out.push_str(line);
        out.push('\n');
    }

    out.push('\n');
    out.push_str(&"=".repeat(RULE));
    out.push_str("\nFim do relatorio\n");
    out.push_str(&"=".repeat(RULE));
    out.push('\n');

    Ok(out)
}

fn individual_section(out: &mut String, report: &AnalysisReport, name: &str) -> Result<()> {
    let Some(result) = report.student(name) else {
        anyhow::bail!("student not found in report: {name}");
    };
    let rank = report.ranking_position(name).unwrap_or(report.students.len());

    section(out, &format!("ANALISE INDIVIDUAL - {name}"));
    out.push_str(&format!("Proficiencia (θ): {:.3}\n", result.ability));
    out.push_str(&format!(
        "Pontuacao: {}/{}\n",
        result.raw_score,
        report.items.len()
    ));
    out.push_str(&format!(
        "Percentual de acerto: {:.1}%\n",
        result.percent_correct
    ));
    out.push_str(&format!(
        "Posicao no ranking: {rank}º de {}\n\n",
        report.students.len()
    ));

    if let Some(tutor) = report.tutors.find(name) {
        out.push_str("ESTE ALUNO PODE SER TUTOR DE COLEGAS\n");
        out.push_str(&format!("   - Score como tutor: {:.2}\n", tutor.score));
        out.push_str(&format!("   - Posicao entre tutores: {}º\n", tutor.rank));
        out.push_str("   - Sugestao: Atribuir para auxiliar 2-3 colegas com dificuldades\n\n");
    }

    let band = ProficiencyBand::from_ability(result.ability);
    out.push_str(&format!("INTERPRETACAO: Proficiencia {}\n", band.label()));
    out.push_str(&format!("   * Recomendacao: {}\n", band.recommendation()));
    out.push_str(&format!("   * Sugestao: {}\n\n", band.suggestion()));
    Ok(())
}

/// Write the text report to a file.
pub fn write_text_report(report: &AnalysisReport, student: Option<&str>, path: &Path) -> Result<()> {
    let text = generate_text(report, student)?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, text)?;
    Ok(())
}

fn underlined(out: &mut String, title: &str) {
    out.push_str(&format!("{title}\n{}\n", "-".repeat(title.chars().count())));
}

/// Render the consolidated report over several assessments.
pub fn generate_consolidated_text(report: &ConsolidatedReport) -> String {
    let mut out = String::new();
    let rule = "=".repeat(CONSOLIDATED_RULE);

    out.push_str(&format!("{rule}\nRELATORIO DE ANALISE DE AVALIACOES\n"));
    out.push_str(&format!(
        "Data de geracao: {}\n{rule}\n\n",
        report.generated_at.format("%Y-%m-%d %H:%M:%S")
    ));

    let m = &report.metrics;
    underlined(&mut out, "RESUMO GERAL:");
    out.push_str(&format!("• Total de Avaliacoes: {}\n", report.total_assessments));
    out.push_str(&format!("• Total de Alunos Unicos: {}\n", report.unique_students));
    out.push_str(&format!("• Proficiencia Media Geral: {:.3}\n", m.mean_ability));
    out.push_str(&format!("• Taxa de Acerto Media: {:.1}%\n", m.mean_percent_correct));
    out.push_str(&format!("• Confiabilidade Media: {:.3}\n\n", m.mean_reliability));

    underlined(&mut out, "DETALHES DAS AVALIACOES:");
    for (i, a) in report.assessments.iter().enumerate() {
        out.push_str(&format!("\n{}. {}:\n", i + 1, a.name));
        out.push_str(&format!(
            "    • Data da Analise: {}\n",
            a.analyzed_at.format(TIMESTAMP_FORMAT)
        ));
        out.push_str(&format!("    • Total de Alunos: {}\n", a.total_students));
        out.push_str(&format!("    • Total de Questoes: {}\n", a.total_items));
        out.push_str(&format!("    • Proficiencia Media: {:.3}\n", a.mean_ability));
        out.push_str(&format!("    • Taxa de Acerto Media: {:.1}%\n", a.mean_percent_correct));
        out.push_str(&format!("    • Desvio Padrao: {:.3}\n", a.ability_std));
        out.push_str(&format!("    • Confiabilidade: {:.3}\n", a.reliability));
    }
    out.push('\n');

    underlined(
        &mut out,
        &format!("TOP {} ALUNOS (PROFICIENCIA MEDIA):", report.top_students.len()),
    );
    let mut table = Table::new();
    table.set_header(vec!["Pos", "Aluno", "Proficiencia (θ)"]);
    for (i, (name, ability)) in report.top_students.iter().enumerate() {
        table.add_row(vec![
            Cell::new(i + 1).set_alignment(CellAlignment::Right),
            Cell::new(truncate(name, 30)),
            Cell::new(format!("{ability:.3}")).set_alignment(CellAlignment::Right),
        ]);
    }
    out.push_str(&format!("{table}\n\n"));

    if let Some(q) = &report.question_stats {
        underlined(&mut out, "ESTATISTICAS DAS QUESTOES:");
        out.push_str(&format!(
            "• Questao mais facil: {} / {} ({:.1}%)\n",
            q.easiest.assessment, q.easiest.item, q.easiest.percent_correct
        ));
        out.push_str(&format!(
            "• Questao mais dificil: {} / {} ({:.1}%)\n",
            q.hardest.assessment, q.hardest.item, q.hardest.percent_correct
        ));
        out.push_str(&format!("• Media de discriminacao: {:.3}\n", q.mean_discrimination));
        out.push_str(&format!("• Media de dificuldade: {:.3}\n\n", q.mean_difficulty));
    }

    if let Some(t) = &report.tutor_stats {
        underlined(&mut out, "ANALISE DE TUTORES:");
        out.push_str(&format!("• Total de tutores identificados: {}\n", t.unique_tutors));
        out.push_str(&format!("• Score medio dos tutores: {:.3}\n\n", t.mean_score));
    }

    out.push_str(&format!("{rule}\nFim do relatorio consolidado\n{rule}\n"));
    out
}

/// Write the consolidated text report to a file.
pub fn write_consolidated_text(report: &ConsolidatedReport, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, generate_consolidated_text(report))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use kairos_core::aggregate::{consolidate, NamedBundle};
    use kairos_core::model::{AnswerKey, Roster, StudentAnswers};

    fn make_test_report() -> AnalysisReport {
        let key = AnswerKey::from_letters("ABCC").unwrap();
        let roster = Roster::new(vec![
            StudentAnswers::new("S1", ["A", "B", "C", "C"]),
            StudentAnswers::new("S2", ["A", "A", "A", "A"]),
            StudentAnswers::new("S3", ["D", "B", "C", "A"]),
        ]);
        kairos_core::analyze(&key, &roster).unwrap()
    }

    #[test]
    fn text_has_all_sections() {
        let text = generate_text(&make_test_report(), None).unwrap();
        assert!(text.contains("RELATORIO DE ANALISE - KAIROS"));
        assert!(text.contains("EXPLICACAO DOS PARAMETROS TRI"));
        assert!(text.contains("PANORAMA GERAL DA TURMA"));
        assert!(text.contains("TUTORES DE COLEGAS"));
        assert!(text.contains("ANALISE DAS QUESTOES"));
        assert!(text.contains("RECOMENDACOES PEDAGOGICAS"));
        assert!(text.contains("Fim do relatorio"));
        assert!(!text.contains("ANALISE INDIVIDUAL"));
    }

    #[test]
    fn individual_analysis() {
        let text = generate_text(&make_test_report(), Some("S1")).unwrap();
        assert!(text.contains("ANALISE INDIVIDUAL - S1"));
        assert!(text.contains("Pontuacao: 4/4"));
        assert!(text.contains("Posicao no ranking: 1º de 3"));
        assert!(text.contains("ESTE ALUNO PODE SER TUTOR"));
    }

    #[test]
    fn unknown_student_is_an_error() {
        assert!(generate_text(&make_test_report(), Some("Zeca")).is_err());
    }

    fn consolidated() -> ConsolidatedReport {
        let report = make_test_report();
        let bundles = vec![
            NamedBundle::new("prova_1", report.to_bundle()),
            NamedBundle::new("prova_2", report.to_bundle()),
        ];
        consolidate(&bundles)
    }

    #[test]
    fn consolidated_text_sections() {
        let text = generate_consolidated_text(&consolidated());
        assert!(text.contains("RELATORIO DE ANALISE DE AVALIACOES"));
        assert!(text.contains("• Total de Avaliacoes: 2"));
        assert!(text.contains("• Total de Alunos Unicos: 3"));
        assert!(text.contains("1. prova_1:"));
        assert!(text.contains("2. prova_2:"));
        assert!(text.contains("TOP 3 ALUNOS (PROFICIENCIA MEDIA):"));
        // Q1 to Q3 tie at two of three correct; the first one is reported
        assert!(text.contains("• Questao mais facil: prova_1 / Q1 (66.7%)"));
        assert!(text.contains("ANALISE DE TUTORES:"));
        assert!(text.contains("• Total de tutores identificados: 1"));
    }

    #[test]
    fn consolidated_text_skips_empty_statistics() {
        let mut report = consolidated();
        report.question_stats = None;
        report.tutor_stats = None;
        let text = generate_consolidated_text(&report);
        assert!(!text.contains("ESTATISTICAS DAS QUESTOES"));
        assert!(!text.contains("ANALISE DE TUTORES"));
        assert!(text.contains("DETALHES DAS AVALIACOES:"));
    }

    #[test]
    fn write_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("relatorio.txt");
        write_text_report(&make_test_report(), None, &path).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("===="));
    }
}
