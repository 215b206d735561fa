//! The `examforge review` command.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use uuid::Uuid;

use examforge_core::attempt::StudentAttempt;
use examforge_core::review;
use examforge_core::traits::AttemptRepository;
use examforge_grader::config::load_config_from;

pub async fn execute(
    assessment_path: PathBuf,
    attempt_ref: String,
    attempts_dir: Option<PathBuf>,
    format: String,
    config_path: Option<PathBuf>,
) -> Result<()> {
    let config = load_config_from(config_path.as_deref())?;
    let definition = super::load_definition(&assessment_path)?;

    let as_path = Path::new(&attempt_ref);
    let attempt = if as_path.extension().is_some_and(|ext| ext == "json") {
        StudentAttempt::load_json(as_path)?
    } else {
        let id = Uuid::parse_str(&attempt_ref)
            .with_context(|| format!("'{attempt_ref}' is neither an attempt id nor a .json file"))?;
        let repository = super::attempts_repository(attempts_dir, &config);
        repository
            .load(id)
            .await?
            .with_context(|| format!("attempt {id} not found in {}", repository.dir().display()))?
    };

    anyhow::ensure!(
        attempt.parent_assess_id == definition.id,
        "attempt {} belongs to assessment '{}', not '{}'",
        attempt.id,
        attempt.parent_assess_id,
        definition.id
    );

    let review = review::reconstruct(&definition, &attempt)?;
    match format.as_str() {
        "json" => println!("{}", serde_json::to_string_pretty(&review)?),
        _ => {
            println!("Assessment: {} ({})", definition.name, definition.assess_type);
            println!(
                "Attempt: {} by {} at {}",
                attempt.id,
                attempt.student_id,
                attempt.updated_at.format("%Y-%m-%d %H:%M:%S UTC")
            );
            if !attempt.completed {
                println!("(attempt was never submitted)");
            }
            super::print_review(&review);
        }
    }

    Ok(())
}
