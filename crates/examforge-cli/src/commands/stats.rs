//! The `examforge stats` command.

use std::path::PathBuf;

use anyhow::Result;
use comfy_table::{Cell, Table};
use serde::Serialize;

use examforge_core::review;
use examforge_core::statistics::{question_correct_rates, summarize_students, StudentSummary};
use examforge_core::traits::AttemptRepository;
use examforge_grader::config::load_config_from;

#[derive(Serialize)]
struct StatsReport {
    assessment_id: String,
    attempts: usize,
    students: Vec<StudentSummary>,
    /// Fraction of completed attempts that got each question right.
    question_correct_rates: Vec<f64>,
}

pub async fn execute(
    assessment_path: PathBuf,
    attempts_dir: Option<PathBuf>,
    format: String,
    config_path: Option<PathBuf>,
) -> Result<()> {
    let config = load_config_from(config_path.as_deref())?;
    let definition = super::load_definition(&assessment_path)?;
    let repository = super::attempts_repository(attempts_dir, &config);

    let attempts = repository.list_for_assessment(&definition.id).await?;
    let completed: Vec<_> = attempts.iter().filter(|a| a.completed).collect();

    let mut reviews = Vec::with_capacity(completed.len());
    for attempt in &completed {
        match review::reconstruct(&definition, attempt) {
            Ok(r) => reviews.push(r),
            Err(e) => tracing::warn!(attempt = %attempt.id, "skipping attempt: {e}"),
        }
    }

    let report = StatsReport {
        assessment_id: definition.id.clone(),
        attempts: completed.len(),
        students: summarize_students(
            &attempts,
            definition.score_method(),
            definition.attempt_limit(),
        ),
        question_correct_rates: question_correct_rates(&reviews),
    };

    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    if report.attempts == 0 {
        println!(
            "No attempts recorded for '{}' in {}.",
            definition.id,
            repository.dir().display()
        );
        return Ok(());
    }

    println!(
        "Assessment: {} ({} attempts, score method: {})",
        definition.name,
        report.attempts,
        definition.score_method()
    );

    let mut students = Table::new();
    students.set_header(vec!["Student", "Attempts", "Final score", "Can retry"]);
    for s in &report.students {
        students.add_row(vec![
            Cell::new(&s.student_id),
            Cell::new(s.completed_attempts),
            Cell::new(
                s.final_score
                    .map(|v| format!("{v:.1}"))
                    .unwrap_or_else(|| "-".into()),
            ),
            Cell::new(if s.can_retry { "yes" } else { "no" }),
        ]);
    }
    println!("{students}");

    let mut questions = Table::new();
    questions.set_header(vec!["#", "Question", "Correct rate"]);
    for (i, (question, rate)) in definition
        .questions
        .iter()
        .zip(&report.question_correct_rates)
        .enumerate()
    {
        questions.add_row(vec![
            Cell::new(i + 1),
            Cell::new(question.prompt()),
            Cell::new(format!("{:.1}%", rate * 100.0)),
        ]);
    }
    println!("{questions}");

    Ok(())
}
