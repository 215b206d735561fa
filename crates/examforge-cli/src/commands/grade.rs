//! The `examforge grade` command.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};

use examforge_core::clock::SystemClock;
use examforge_core::model::{Answer, AssessType};
use examforge_core::review;
use examforge_core::session::{AttemptSession, SubmitOutcome};
use examforge_grader::config::load_config_from;

#[allow(clippy::too_many_arguments)]
pub async fn execute(
    assessment_path: PathBuf,
    answers_path: PathBuf,
    student: String,
    grader_name: Option<String>,
    attempts_dir: Option<PathBuf>,
    confirmed: bool,
    format: String,
    config_path: Option<PathBuf>,
) -> Result<()> {
    anyhow::ensure!(!student.trim().is_empty(), "student id must not be empty");

    let config = load_config_from(config_path.as_deref())?;
    let definition = Arc::new(super::load_definition(&assessment_path)?);

    let content = std::fs::read_to_string(&answers_path)
        .with_context(|| format!("failed to read answers: {}", answers_path.display()))?;
    let answers: Vec<Answer> = serde_json::from_str(&content)
        .with_context(|| format!("failed to parse answers JSON: {}", answers_path.display()))?;
    anyhow::ensure!(
        answers.len() <= definition.question_count(),
        "answer sheet has {} entries but the assessment has {} questions",
        answers.len(),
        definition.question_count()
    );

    let repository = super::attempts_repository(attempts_dir, &config);
    let mut session = AttemptSession::new(
        Arc::clone(&definition),
        &student,
        Arc::new(SystemClock),
        Arc::new(repository.clone()),
    )?
    .with_config(config.session_config());
    if definition.assess_type == AssessType::FreeText {
        session = session.with_grader(config.grader(grader_name.as_deref())?);
    }

    session.start()?;
    for (index, answer) in answers.into_iter().enumerate() {
        if answer.is_answered() {
            session.answer(index, answer)?;
        }
    }

    let attempt = match session.submit(confirmed).await? {
        SubmitOutcome::Submitted(attempt) => attempt,
        SubmitOutcome::NeedsConfirmation(summary) => {
            anyhow::bail!("{}\nRe-run with --yes to submit anyway.", summary.message)
        }
        SubmitOutcome::Ignored => anyhow::bail!("attempt was already submitted"),
    };

    let review = review::reconstruct(&definition, &attempt)?;
    match format.as_str() {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&attempt)?);
        }
        _ => {
            println!("Assessment: {} ({})", definition.name, definition.assess_type);
            println!("Attempt: {}", attempt.id);
            super::print_review(&review);
            eprintln!(
                "Attempt saved to: {}",
                repository.dir().join(format!("{}.json", attempt.id)).display()
            );
        }
    }

    Ok(())
}
