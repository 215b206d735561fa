pub mod grade;
pub mod init;
pub mod review;
pub mod stats;
pub mod take;
pub mod validate;

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use comfy_table::{Cell, Table};

use examforge_core::model::{Answer, AssessmentDefinition, Question};
use examforge_core::parser;
use examforge_core::repository::FileAttemptRepository;
use examforge_core::review::AttemptReview;
use examforge_grader::ExamforgeConfig;

/// Load one definition file, rejecting mixed question kinds up front.
pub(crate) fn load_definition(path: &Path) -> Result<AssessmentDefinition> {
    let definition = parser::parse_definition(path)?;
    definition
        .check_question_kinds()
        .with_context(|| format!("invalid definition: {}", path.display()))?;
    Ok(definition)
}

pub(crate) fn attempts_repository(
    override_dir: Option<PathBuf>,
    config: &ExamforgeConfig,
) -> FileAttemptRepository {
    FileAttemptRepository::new(override_dir.unwrap_or_else(|| config.attempts_dir.clone()))
}

/// Parse one line of user input into an answer for `question`.
///
/// Choice indices are 1-based. Multi-choice takes a comma-separated list;
/// true/false also accepts the choice text. A blank line or `-` clears.
pub(crate) fn parse_answer(question: &Question, input: &str) -> Result<Answer> {
    let input = input.trim();
    if input.is_empty() || input == "-" {
        return Ok(Answer::Unanswered);
    }

    let index = |s: &str| -> Result<u32> {
        s.trim()
            .parse::<u32>()
            .map_err(|_| anyhow::anyhow!("'{}' is not a choice number", s.trim()))
    };

    match question {
        Question::MultiChoice { .. } => {
            let indices = input
                .split(',')
                .map(index)
                .collect::<Result<BTreeSet<u32>>>()?;
            Ok(Answer::Choices(indices))
        }
        Question::SingleChoice { .. } => Ok(Answer::Choice(index(input)?)),
        Question::TrueFalse { choices, .. } => {
            if let Some(pos) = choices.iter().position(|c| c.eq_ignore_ascii_case(input)) {
                return Ok(Answer::Choice(pos as u32 + 1));
            }
            Ok(Answer::Choice(index(input)?))
        }
        Question::FreeText { .. } => Ok(Answer::Text(input.to_string())),
    }
}

/// Print a question with its numbered choices.
pub(crate) fn print_question(number: usize, question: &Question) {
    println!("\n{number}. {}", question.prompt());
    for (i, choice) in question.choices().iter().enumerate() {
        println!("   {}) {choice}", i + 1);
    }
    if let Question::MultiChoice { .. } = question {
        println!("   (select all that apply, e.g. 1,3)");
    }
}

pub(crate) fn review_table(review: &AttemptReview) -> Table {
    let mut table = Table::new();
    table.set_header(vec!["#", "Question", "Your answer", "Expected", "Result"]);
    for item in &review.items {
        let result = match item.rate {
            Some(rate) => format!("{} ({:.0}%)", verdict(item.correct), rate * 100.0),
            None => verdict(item.correct).to_string(),
        };
        table.add_row(vec![
            Cell::new(item.number),
            Cell::new(&item.question),
            Cell::new(item.submitted.as_deref().unwrap_or("-")),
            Cell::new(&item.correct_answer),
            Cell::new(result),
        ]);
    }
    table
}

fn verdict(correct: bool) -> &'static str {
    if correct {
        "correct"
    } else {
        "incorrect"
    }
}

pub(crate) fn print_review(review: &AttemptReview) {
    println!("{}", review_table(review));
    println!(
        "Score: {:.0} ({}/{} correct)",
        review.score, review.correct_count, review.total
    );
    for item in review.items.iter().filter(|i| i.explanation.is_some()) {
        if let Some(explanation) = &item.explanation {
            println!("  Q{}: {explanation}", item.number);
        }
    }
}
