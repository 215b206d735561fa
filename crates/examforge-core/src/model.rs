//! Core data model types for examforge.
//!
//! Assessment definitions, typed questions, and the answers a student can
//! give to them. Questions and answers are closed enums so that every grading
//! rule is matched exhaustively.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ExamError;

/// The grading and rendering mode of an assessment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssessType {
    MultiChoice,
    SingleChoice,
    TrueFalse,
    FreeText,
}

impl AssessType {
    /// Whether correctness can be computed locally, without the rubric grader.
    pub fn is_auto_gradable(self) -> bool {
        !matches!(self, AssessType::FreeText)
    }
}

impl fmt::Display for AssessType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssessType::MultiChoice => write!(f, "multi_choice"),
            AssessType::SingleChoice => write!(f, "single_choice"),
            AssessType::TrueFalse => write!(f, "true_false"),
            AssessType::FreeText => write!(f, "free_text"),
        }
    }
}

impl FromStr for AssessType {
    type Err = ExamError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .trim()
            .chars()
            .filter(|c| !matches!(c, '_' | '-' | ' '))
            .collect::<String>()
            .to_lowercase();
        match normalized.as_str() {
            "multichoice" | "multiplechoice" => Ok(AssessType::MultiChoice),
            "singlechoice" => Ok(AssessType::SingleChoice),
            "truefalse" => Ok(AssessType::TrueFalse),
            "freetext" => Ok(AssessType::FreeText),
            _ => Err(ExamError::UnsupportedAssessmentType(s.to_string())),
        }
    }
}

/// How scores from several attempts at one assessment are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScoreMethod {
    #[default]
    Highest,
    Average,
    Lowest,
}

impl fmt::Display for ScoreMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScoreMethod::Highest => write!(f, "highest"),
            ScoreMethod::Average => write!(f, "average"),
            ScoreMethod::Lowest => write!(f, "lowest"),
        }
    }
}

impl FromStr for ScoreMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "highest" | "max" => Ok(ScoreMethod::Highest),
            "average" | "mean" => Ok(ScoreMethod::Average),
            "lowest" | "min" => Ok(ScoreMethod::Lowest),
            other => Err(format!("unknown score method: {other}")),
        }
    }
}

/// One weighted criterion of a free-text rubric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RubricItem {
    /// Relative weight of this criterion.
    pub weight: f64,
    /// What the answer must contain to earn the weight.
    pub point: String,
}

/// A single question, keyed by its kind.
///
/// Choice indices are 1-based throughout, matching what students see.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Question {
    MultiChoice {
        question: String,
        choices: Vec<String>,
        correct_answer: BTreeSet<u32>,
    },
    SingleChoice {
        question: String,
        choices: Vec<String>,
        correct_answer: u32,
    },
    TrueFalse {
        question: String,
        choices: Vec<String>,
        /// The text of the correct choice, not its index.
        correct_answer: String,
    },
    FreeText {
        question: String,
        rubric: Vec<RubricItem>,
    },
}

impl Question {
    pub fn kind(&self) -> AssessType {
        match self {
            Question::MultiChoice { .. } => AssessType::MultiChoice,
            Question::SingleChoice { .. } => AssessType::SingleChoice,
            Question::TrueFalse { .. } => AssessType::TrueFalse,
            Question::FreeText { .. } => AssessType::FreeText,
        }
    }

    /// The prompt shown to the student.
    pub fn prompt(&self) -> &str {
        match self {
            Question::MultiChoice { question, .. }
            | Question::SingleChoice { question, .. }
            | Question::TrueFalse { question, .. }
            | Question::FreeText { question, .. } => question,
        }
    }

    /// Ordered choices; empty for free-text questions.
    pub fn choices(&self) -> &[String] {
        match self {
            Question::MultiChoice { choices, .. }
            | Question::SingleChoice { choices, .. }
            | Question::TrueFalse { choices, .. } => choices,
            Question::FreeText { .. } => &[],
        }
    }

    /// Resolve a 1-based choice index to its text.
    pub fn choice_text(&self, index: u32) -> Option<&str> {
        let zero_based = usize::try_from(index).ok()?.checked_sub(1)?;
        self.choices().get(zero_based).map(String::as_str)
    }
}

/// Session policy attached to an assessment definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionPolicy {
    /// Whether the time limit is enforced.
    #[serde(default)]
    pub time_limited: bool,
    /// Time limit in minutes.
    #[serde(default)]
    pub time_limit: u32,
    /// Whether an answered slot may be overwritten before submission.
    #[serde(default = "default_true")]
    pub allow_answer_change: bool,
    /// Maximum number of attempts; -1 means unlimited.
    #[serde(default = "default_attempt_limit")]
    pub attempt_limit: i32,
    /// How scores across attempts are combined.
    #[serde(default)]
    pub score_method: ScoreMethod,
}

impl Default for SessionPolicy {
    fn default() -> Self {
        Self {
            time_limited: false,
            time_limit: 0,
            allow_answer_change: true,
            attempt_limit: default_attempt_limit(),
            score_method: ScoreMethod::default(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_attempt_limit() -> i32 {
    1
}

/// A complete assessment as fetched from the assessment repository.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssessmentDefinition {
    /// Unique identifier.
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// Description shown before the attempt starts.
    #[serde(default)]
    pub description: String,
    /// Grading mode for every question in the assessment.
    pub assess_type: AssessType,
    /// Ordered questions.
    #[serde(default)]
    pub questions: Vec<Question>,
    /// Optional session policy; `None` means untimed, single attempt.
    #[serde(default)]
    pub policy: Option<SessionPolicy>,
}

impl AssessmentDefinition {
    pub fn question_count(&self) -> usize {
        self.questions.len()
    }

    /// The enforced time limit in minutes, if the session is timed.
    pub fn time_limit_minutes(&self) -> Option<u32> {
        self.policy
            .as_ref()
            .filter(|p| p.time_limited && p.time_limit > 0)
            .map(|p| p.time_limit)
    }

    pub fn allows_answer_change(&self) -> bool {
        self.policy
            .as_ref()
            .map(|p| p.allow_answer_change)
            .unwrap_or(true)
    }

    pub fn score_method(&self) -> ScoreMethod {
        self.policy
            .as_ref()
            .map(|p| p.score_method)
            .unwrap_or_default()
    }

    pub fn attempt_limit(&self) -> i32 {
        self.policy
            .as_ref()
            .map(|p| p.attempt_limit)
            .unwrap_or_else(default_attempt_limit)
    }

    /// Ensure every question matches the assessment type.
    pub fn check_question_kinds(&self) -> Result<(), ExamError> {
        for (index, question) in self.questions.iter().enumerate() {
            if question.kind() != self.assess_type {
                return Err(ExamError::QuestionKindMismatch {
                    index,
                    expected: self.assess_type,
                    found: question.kind(),
                });
            }
        }
        Ok(())
    }
}

/// What a student put in one answer slot.
///
/// Serialized untagged: `null`, an index, an index array, or text.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Answer {
    #[default]
    Unanswered,
    /// A single 1-based choice index.
    Choice(u32),
    /// A set of 1-based choice indices (multi-choice).
    Choices(BTreeSet<u32>),
    /// Raw free text.
    Text(String),
}

impl Answer {
    pub fn is_answered(&self) -> bool {
        match self {
            Answer::Unanswered => false,
            Answer::Choice(_) => true,
            Answer::Choices(set) => !set.is_empty(),
            Answer::Text(text) => !text.trim().is_empty(),
        }
    }

    /// The submitted choice indices, with a single index as a one-element set.
    pub fn selected_indices(&self) -> Option<BTreeSet<u32>> {
        match self {
            Answer::Choice(index) => Some(BTreeSet::from([*index])),
            Answer::Choices(set) if !set.is_empty() => Some(set.clone()),
            _ => None,
        }
    }

    /// The single selected index, if exactly one choice was submitted.
    pub fn single_index(&self) -> Option<u32> {
        match self {
            Answer::Choice(index) => Some(*index),
            Answer::Choices(set) if set.len() == 1 => set.iter().next().copied(),
            _ => None,
        }
    }

    pub fn text(&self) -> Option<&str> {
        match self {
            Answer::Text(text) if !text.trim().is_empty() => Some(text),
            _ => None,
        }
    }
}
