//! Assessment definition loader.
//!
//! Loads definitions from TOML (or JSON) files and directories, converts the
//! loosely typed question records into typed [`Question`]s, and validates them.

use std::collections::{BTreeSet, HashSet};
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::error::ExamError;
use crate::model::{AssessType, AssessmentDefinition, Question, RubricItem, SessionPolicy};

/// Intermediate structure for parsing definition files.
#[derive(Debug, Deserialize)]
struct RawDefinitionFile {
    assessment: RawAssessmentHeader,
    #[serde(default)]
    questions: Vec<RawQuestion>,
}

#[derive(Debug, Deserialize)]
struct RawAssessmentHeader {
    id: String,
    name: String,
    #[serde(default)]
    description: String,
    assess_type: String,
    #[serde(default)]
    policy: Option<SessionPolicy>,
}

#[derive(Debug, Deserialize)]
struct RawQuestion {
    question: String,
    #[serde(default)]
    choices: Vec<String>,
    #[serde(default)]
    correct_answer: Option<RawCorrectAnswer>,
    #[serde(default)]
    rubric: Vec<RubricItem>,
}

/// `correct_answer` as written: an index, an index list, or text.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawCorrectAnswer {
    Index(i64),
    Indices(Vec<i64>),
    Text(String),
}

/// Parse a single definition file. `.json` files are read as JSON, anything
/// else as TOML.
pub fn parse_definition(path: &Path) -> Result<AssessmentDefinition> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read definition file: {}", path.display()))?;

    if path.extension().is_some_and(|ext| ext == "json") {
        let raw: RawDefinitionFile = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse JSON: {}", path.display()))?;
        return convert(raw);
    }
    parse_definition_str(&content, path)
}

/// Parse a TOML string into an `AssessmentDefinition` (useful for testing).
pub fn parse_definition_str(content: &str, source_path: &Path) -> Result<AssessmentDefinition> {
    let raw: RawDefinitionFile = toml::from_str(content)
        .with_context(|| format!("failed to parse TOML: {}", source_path.display()))?;
    convert(raw).with_context(|| format!("invalid definition: {}", source_path.display()))
}

fn convert(raw: RawDefinitionFile) -> Result<AssessmentDefinition> {
    let assess_type: AssessType = raw.assessment.assess_type.parse()?;

    let questions = raw
        .questions
        .into_iter()
        .enumerate()
        .map(|(i, q)| convert_question(assess_type, i + 1, q))
        .collect::<Result<Vec<_>, ExamError>>()?;

    Ok(AssessmentDefinition {
        id: raw.assessment.id,
        name: raw.assessment.name,
        description: raw.assessment.description,
        assess_type,
        questions,
        policy: raw.assessment.policy,
    })
}

fn convert_question(
    assess_type: AssessType,
    number: usize,
    raw: RawQuestion,
) -> Result<Question, ExamError> {
    let invalid = |msg: &str| ExamError::InvalidDefinition(format!("question {number}: {msg}"));

    match assess_type {
        AssessType::MultiChoice => {
            let correct_answer: BTreeSet<u32> = match raw.correct_answer {
                Some(RawCorrectAnswer::Index(i)) => BTreeSet::from([to_index(i).ok_or_else(
                    || invalid("correct_answer must be a 1-based index"),
                )?]),
                Some(RawCorrectAnswer::Indices(list)) if !list.is_empty() => list
                    .into_iter()
                    .map(|i| to_index(i).ok_or_else(|| invalid("correct_answer must be 1-based indices")))
                    .collect::<Result<_, _>>()?,
                _ => return Err(invalid("multi-choice needs a correct index or index list")),
            };
            Ok(Question::MultiChoice {
                question: raw.question,
                choices: raw.choices,
                correct_answer,
            })
        }
        AssessType::SingleChoice => {
            let correct_answer = match raw.correct_answer {
                Some(RawCorrectAnswer::Index(i)) => to_index(i),
                Some(RawCorrectAnswer::Indices(list)) if list.len() == 1 => to_index(list[0]),
                Some(RawCorrectAnswer::Text(text)) => text.trim().parse().ok().filter(|&i| i >= 1),
                _ => None,
            }
            .ok_or_else(|| invalid("single-choice needs one 1-based correct index"))?;
            Ok(Question::SingleChoice {
                question: raw.question,
                choices: raw.choices,
                correct_answer,
            })
        }
        AssessType::TrueFalse => {
            if raw.choices.len() != 2 {
                return Err(invalid("true/false needs exactly two choices"));
            }
            // An index is accepted and resolved to the choice text.
            let correct_answer = match raw.correct_answer {
                Some(RawCorrectAnswer::Text(text)) => text,
                Some(RawCorrectAnswer::Index(i)) => to_index(i)
                    .and_then(|i| raw.choices.get(i as usize - 1).cloned())
                    .ok_or_else(|| invalid("correct_answer index is out of range"))?,
                _ => return Err(invalid("true/false needs the correct choice text")),
            };
            Ok(Question::TrueFalse {
                question: raw.question,
                choices: raw.choices,
                correct_answer,
            })
        }
        AssessType::FreeText => Ok(Question::FreeText {
            question: raw.question,
            rubric: raw.rubric,
        }),
    }
}

fn to_index(i: i64) -> Option<u32> {
    u32::try_from(i).ok().filter(|&i| i >= 1)
}

/// Recursively load all `.toml` definition files from a directory.
pub fn load_definition_directory(dir: &Path) -> Result<Vec<AssessmentDefinition>> {
    let mut definitions = Vec::new();

    if !dir.is_dir() {
        anyhow::bail!("not a directory: {}", dir.display());
    }

    for entry in std::fs::read_dir(dir)
        .with_context(|| format!("failed to read directory: {}", dir.display()))?
    {
        let entry = entry?;
        let path = entry.path();

        if path.is_dir() {
            definitions.extend(load_definition_directory(&path)?);
        } else if path.extension().is_some_and(|ext| ext == "toml") {
            match parse_definition(&path) {
                Ok(def) => definitions.push(def),
                Err(e) => {
                    tracing::warn!("skipping {}: {:#}", path.display(), e);
                }
            }
        }
    }

    Ok(definitions)
}

/// A warning from definition validation.
#[derive(Debug, Clone)]
pub struct ValidationWarning {
    /// 1-based question number (if applicable).
    pub question: Option<usize>,
    /// Warning message.
    pub message: String,
}

/// Validate a definition for common issues.
pub fn validate_definition(def: &AssessmentDefinition) -> Vec<ValidationWarning> {
    let mut warnings = Vec::new();
    let mut warn = |question: Option<usize>, message: String| {
        warnings.push(ValidationWarning { question, message });
    };

    if def.questions.is_empty() {
        warn(None, "assessment has no questions".into());
    }

    if let Some(policy) = &def.policy {
        if policy.time_limited && policy.time_limit == 0 {
            warn(None, "time_limited is true but time_limit is 0".into());
        }
        if policy.attempt_limit == 0 || policy.attempt_limit < -1 {
            warn(
                None,
                format!(
                    "attempt_limit {} is invalid (use -1 for unlimited)",
                    policy.attempt_limit
                ),
            );
        }
    }

    for (i, question) in def.questions.iter().enumerate() {
        let number = Some(i + 1);

        if question.prompt().trim().is_empty() {
            warn(number, "question text is empty".into());
        }

        let choices = question.choices();
        let mut seen = HashSet::new();
        if choices.iter().any(|c| !seen.insert(c.trim())) {
            warn(number, "duplicate choices".into());
        }

        match question {
            Question::MultiChoice { correct_answer, .. } => {
                for &index in correct_answer {
                    if question.choice_text(index).is_none() {
                        warn(number, format!("correct index {index} has no matching choice"));
                    }
                }
            }
            Question::SingleChoice { correct_answer, .. } => {
                if question.choice_text(*correct_answer).is_none() {
                    warn(
                        number,
                        format!("correct index {correct_answer} has no matching choice"),
                    );
                }
            }
            Question::TrueFalse {
                choices,
                correct_answer,
                ..
            } => {
                if !choices.iter().any(|c| c.trim() == correct_answer.trim()) {
                    warn(
                        number,
                        format!("correct answer '{correct_answer}' is not one of the choices"),
                    );
                }
            }
            Question::FreeText { rubric, .. } => {
                if rubric.is_empty() {
                    warn(number, "free-text question has no rubric".into());
                }
                if rubric.iter().any(|r| r.weight <= 0.0) {
                    warn(number, "rubric weights must be positive".into());
                }
            }
        }
    }

    warnings
}
