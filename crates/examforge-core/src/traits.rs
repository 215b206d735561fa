//! Collaborator traits: the rubric grader and the two repositories.
//!
//! The rubric grader is implemented by the `examforge-grader` crate; the
//! repositories have file and in-memory implementations in
//! [`crate::repository`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::attempt::StudentAttempt;
use crate::model::{AssessmentDefinition, RubricItem};

// ---------------------------------------------------------------------------
// Rubric grader trait
// ---------------------------------------------------------------------------

/// External service that grades free-text answers against a rubric.
#[async_trait]
pub trait RubricGrader: Send + Sync {
    /// Human-readable grader name (e.g. "openai").
    fn name(&self) -> &str;

    /// Grade one answer.
    async fn grade(&self, request: &GradeRequest) -> anyhow::Result<RubricGrade>;

    /// Combine per-question grades into the attempt score in [0, 100].
    fn overall_score(&self, grades: &[RubricGrade]) -> f64 {
        if grades.is_empty() {
            return 0.0;
        }
        let mean = grades.iter().map(|g| g.rate).sum::<f64>() / grades.len() as f64;
        mean * 100.0
    }
}

/// One free-text answer to be graded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradeRequest {
    /// The question prompt.
    pub question: String,
    /// Weighted grading criteria.
    pub rubric: Vec<RubricItem>,
    /// The student's answer text.
    pub answer: String,
}

impl GradeRequest {
    /// Render the request as a user prompt for an LLM grader.
    pub fn to_prompt(&self) -> String {
        let mut prompt = format!("Question:\n{}\n\nRubric:\n", self.question);
        for (i, item) in self.rubric.iter().enumerate() {
            prompt.push_str(&format!("{}. ({}) {}\n", i + 1, item.weight, item.point));
        }
        prompt.push_str(&format!("\nStudent answer:\n{}\n", self.answer));
        prompt
    }
}

/// Grader verdict for one answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RubricGrade {
    /// Fraction of the rubric satisfied, in [0, 1].
    pub rate: f64,
    /// Why the grader assigned this rate.
    #[serde(default)]
    pub explanation: String,
}

impl RubricGrade {
    /// Clamp the rate into [0, 1]; NaN becomes 0.
    pub fn normalized(mut self) -> Self {
        self.rate = if self.rate.is_nan() {
            0.0
        } else {
            self.rate.clamp(0.0, 1.0)
        };
        self
    }
}

/// System prompt for LLM-backed rubric graders.
pub const DEFAULT_GRADER_SYSTEM_PROMPT: &str = "You are a strict exam grader. Grade the student answer against the weighted rubric. Respond ONLY with a JSON object of the form {\"rate\": <number between 0 and 1>, \"explanation\": \"<one or two sentences>\"}.";

/// Extract a [`RubricGrade`] from an LLM response.
///
/// Accepts a bare JSON object, a fenced ```json block, or a JSON object
/// embedded in surrounding prose.
pub fn extract_grade_json(response: &str) -> Option<RubricGrade> {
    let trimmed = response.trim();
    if let Ok(grade) = serde_json::from_str::<RubricGrade>(trimmed) {
        return Some(grade.normalized());
    }

    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    if end <= start {
        return None;
    }
    serde_json::from_str::<RubricGrade>(&trimmed[start..=end])
        .ok()
        .map(RubricGrade::normalized)
}

// ---------------------------------------------------------------------------
// Repository traits
// ---------------------------------------------------------------------------

/// Where finished attempts are written.
#[async_trait]
pub trait AttemptRepository: Send + Sync {
    /// Insert or replace an attempt, keyed by its id.
    async fn upsert(&self, attempt: &StudentAttempt) -> anyhow::Result<()>;

    /// Load an attempt by id.
    async fn load(&self, id: Uuid) -> anyhow::Result<Option<StudentAttempt>>;

    /// All attempts for one assessment, oldest first.
    async fn list_for_assessment(&self, assess_id: &str) -> anyhow::Result<Vec<StudentAttempt>>;
}

/// Where assessment definitions come from.
#[async_trait]
pub trait AssessmentRepository: Send + Sync {
    async fn fetch(&self, id: &str) -> anyhow::Result<AssessmentDefinition>;
}
