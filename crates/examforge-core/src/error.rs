//! Engine error types.
//!
//! Configuration errors (unknown assessment type, mismatched question kinds)
//! are fatal for grading. Session errors are returned to the caller and leave
//! the session untouched.

use thiserror::Error;

use crate::model::AssessType;

/// Errors raised by the attempt session and scoring engine.
#[derive(Debug, Error)]
pub enum ExamError {
    /// The assessment type string is not one of the four supported kinds.
    #[error("unsupported assessment type: {0}")]
    UnsupportedAssessmentType(String),

    /// A question's kind does not match the assessment type.
    #[error("question {index} is {found}, but the assessment is {expected}")]
    QuestionKindMismatch {
        index: usize,
        expected: AssessType,
        found: AssessType,
    },

    /// The definition record could not be turned into typed questions.
    #[error("invalid definition: {0}")]
    InvalidDefinition(String),

    /// An answer was written to a slot past the end of the store.
    #[error("answer slot {index} out of range (assessment has {len} questions)")]
    SlotOutOfRange { index: usize, len: usize },

    /// The session already reached a terminal state.
    #[error("session is closed")]
    SessionClosed,

    /// The session has not been started yet.
    #[error("session has not been started")]
    NotStarted,

    /// The policy forbids overwriting an answered slot.
    #[error("answer for question {} cannot be changed", .0 + 1)]
    AnswerChangeNotAllowed(usize),

    /// The external rubric grader failed.
    #[error("grading failed: {0}")]
    Grading(String),

    /// The attempt repository failed to persist the attempt.
    #[error("failed to persist attempt: {0}")]
    Persistence(String),
}

impl ExamError {
    /// Returns `true` if grading cannot proceed for this definition at all.
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            ExamError::UnsupportedAssessmentType(_)
                | ExamError::QuestionKindMismatch { .. }
                | ExamError::InvalidDefinition(_)
        )
    }
}

pub type ExamResult<T> = Result<T, ExamError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configuration_errors_are_classified() {
        assert!(ExamError::UnsupportedAssessmentType("essay".into()).is_configuration_error());
        assert!(ExamError::QuestionKindMismatch {
            index: 0,
            expected: AssessType::SingleChoice,
            found: AssessType::FreeText,
        }
        .is_configuration_error());
        assert!(!ExamError::SessionClosed.is_configuration_error());
        assert!(!ExamError::Persistence("down".into()).is_configuration_error());
    }

    #[test]
    fn messages_name_the_offender() {
        let err = ExamError::SlotOutOfRange { index: 7, len: 5 };
        assert_eq!(
            err.to_string(),
            "answer slot 7 out of range (assessment has 5 questions)"
        );
        let err = ExamError::UnsupportedAssessmentType("essay".into());
        assert!(err.to_string().contains("essay"));
    }
}
