//! Grader error types.

use thiserror::Error;

/// Errors that can occur when calling a rubric grading service.
#[derive(Debug, Error)]
pub enum GraderError {
    /// The API returned a 429 rate limit response.
    #[error("rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    /// Authentication failed (invalid API key).
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("API error (HTTP {status}): {message}")]
    ApiError { status: u16, message: String },

    #[error("request timed out after {0}s")]
    Timeout(u64),

    #[error("network error: {0}")]
    NetworkError(String),

    /// The grader answered, but not with a `{rate, explanation}` object.
    #[error("grader returned no usable grade: {0}")]
    MalformedGrade(String),
}
