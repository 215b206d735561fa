//! Post-hoc review of a persisted attempt.
//!
//! Correctness flags come from [`scoring::score`], the same function used at
//! submission time. Free-text answers are judged from the stored report and
//! never re-graded.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::answers::AnswerStore;
use crate::attempt::StudentAttempt;
use crate::error::ExamResult;
use crate::model::{Answer, AssessmentDefinition, Question};
use crate::scoring;

/// One reviewed question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewItem {
    /// 1-based question number.
    pub number: usize,
    pub question: String,
    /// What the student submitted, as readable text. `None` if unanswered.
    pub submitted: Option<String>,
    /// The expected answer, as readable text.
    pub correct_answer: String,
    pub correct: bool,
    /// Stored rubric rate, free-text only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate: Option<f64>,
    /// Stored grader explanation, free-text only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
}

/// A fully reconstructed attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptReview {
    pub assessment_id: String,
    pub attempt_id: Uuid,
    pub items: Vec<ReviewItem>,
    pub correct_count: usize,
    pub total: usize,
    /// The score recorded at submission.
    pub score: f64,
}

/// Rebuild the review for a persisted attempt. Never mutates the attempt.
pub fn reconstruct(
    definition: &AssessmentDefinition,
    attempt: &StudentAttempt,
) -> ExamResult<AttemptReview> {
    let card = scoring::score(
        definition.assess_type,
        &definition.questions,
        &attempt.answers,
        &attempt.report,
    )?;

    let answers = AnswerStore::from_answers(attempt.answers.clone(), definition.question_count());
    let items = definition
        .questions
        .iter()
        .enumerate()
        .map(|(index, question)| {
            let answer = answers.get(index);
            let stored = attempt.report.get(index);
            ReviewItem {
                number: index + 1,
                question: question.prompt().to_string(),
                submitted: submitted_text(question, answer),
                correct_answer: correct_answer_text(question),
                correct: card.per_question[index],
                rate: stored.and_then(|r| r.rate),
                explanation: stored.and_then(|r| r.explanation.clone()),
            }
        })
        .collect();

    Ok(AttemptReview {
        assessment_id: definition.id.clone(),
        attempt_id: attempt.id,
        items,
        correct_count: card.correct_count,
        total: definition.question_count(),
        score: attempt.score,
    })
}

fn choice_label(question: &Question, index: u32) -> String {
    question
        .choice_text(index)
        .map(str::to_string)
        .unwrap_or_else(|| format!("#{index}"))
}

fn submitted_text(question: &Question, answer: &Answer) -> Option<String> {
    if !answer.is_answered() {
        return None;
    }
    match question {
        Question::FreeText { .. } => answer.text().map(str::to_string),
        _ => answer.selected_indices().map(|indices| {
            indices
                .iter()
                .map(|&i| choice_label(question, i))
                .collect::<Vec<_>>()
                .join(", ")
        }),
    }
}

fn correct_answer_text(question: &Question) -> String {
    match question {
        Question::MultiChoice { correct_answer, .. } => correct_answer
            .iter()
            .map(|&i| choice_label(question, i))
            .collect::<Vec<_>>()
            .join(", "),
        Question::SingleChoice { correct_answer, .. } => choice_label(question, *correct_answer),
        Question::TrueFalse { correct_answer, .. } => correct_answer.clone(),
        Question::FreeText { rubric, .. } => rubric
            .iter()
            .map(|r| format!("{} ({})", r.point, r.weight))
            .collect::<Vec<_>>()
            .join("; "),
    }
}
