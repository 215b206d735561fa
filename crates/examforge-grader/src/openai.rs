//! OpenAI-compatible rubric grader.

use std::time::{Duration, Instant};

use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use examforge_core::traits::{
    extract_grade_json, GradeRequest, RubricGrade, RubricGrader, DEFAULT_GRADER_SYSTEM_PROMPT,
};

use crate::error::GraderError;

const DEFAULT_BASE_URL: &str = "https://api.openai.com";
pub const DEFAULT_MODEL: &str = "gpt-4.1-mini";
const DEFAULT_TIMEOUT_SECS: u64 = 60;
const MAX_TOKENS: u32 = 512;

/// Grades free-text answers through a `/v1/chat/completions` endpoint.
pub struct OpenAiGrader {
    api_key: String,
    base_url: String,
    model: String,
    org_id: Option<String>,
    client: reqwest::Client,
}

impl OpenAiGrader {
    pub fn new(
        api_key: &str,
        base_url: Option<String>,
        model: Option<String>,
        org_id: Option<String>,
    ) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self {
            api_key: api_key.to_string(),
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            model: model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            org_id,
            client,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f64,
    messages: Vec<ChatMessage>,
}

#[derive(Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: String,
}

#[async_trait]
impl RubricGrader for OpenAiGrader {
    fn name(&self) -> &str {
        "openai"
    }

    #[instrument(skip(self, request), fields(model = %self.model))]
    async fn grade(&self, request: &GradeRequest) -> anyhow::Result<RubricGrade> {
        let start = Instant::now();

        let body = ChatRequest {
            model: &self.model,
            max_tokens: MAX_TOKENS,
            temperature: 0.0,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: DEFAULT_GRADER_SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user",
                    content: request.to_prompt(),
                },
            ],
        };

        let mut req = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("content-type", "application/json");

        if let Some(org) = &self.org_id {
            req = req.header("OpenAI-Organization", org);
        }

        let response = req.json(&body).send().await.map_err(|e| {
            if e.is_timeout() {
                GraderError::Timeout(DEFAULT_TIMEOUT_SECS)
            } else {
                GraderError::NetworkError(e.to_string())
            }
        })?;

        let status = response.status().as_u16();
        if status == 429 {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(5)
                * 1000;
            return Err(GraderError::RateLimited {
                retry_after_ms: retry_after,
            }
            .into());
        }
        if status == 401 {
            let body = response.text().await.unwrap_or_default();
            return Err(GraderError::AuthenticationFailed(body).into());
        }
        if status >= 400 {
            let body = response.text().await.unwrap_or_default();
            return Err(GraderError::ApiError {
                status,
                message: body,
            }
            .into());
        }

        let api_response: ChatResponse =
            response.json().await.map_err(|e| GraderError::ApiError {
                status: 0,
                message: format!("failed to parse response: {e}"),
            })?;

        let content = api_response
            .choices
            .first()
            .map(|c| c.message.content.clone())
            .unwrap_or_default();

        let grade = extract_grade_json(&content).ok_or(GraderError::MalformedGrade(content))?;
        tracing::debug!(
            rate = grade.rate,
            latency_ms = start.elapsed().as_millis() as u64,
            "answer graded"
        );
        Ok(grade)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use examforge_core::model::RubricItem;
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn request() -> GradeRequest {
        GradeRequest {
            question: "Explain ownership.".into(),
            rubric: vec![RubricItem {
                weight: 1.0,
                point: "each value has a single owner".into(),
            }],
            answer: "Every value has exactly one owner.".into(),
        }
    }

    fn chat_body(content: &str) -> serde_json::Value {
        serde_json::json!({
            "choices": [{"message": {"content": content, "role": "assistant"}, "index": 0}],
            "model": "gpt-4.1-mini",
            "usage": {"prompt_tokens": 40, "completion_tokens": 15, "total_tokens": 55}
        })
    }

    #[tokio::test]
    async fn successful_grade() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("Authorization", "Bearer test-key"))
            .and(body_string_contains("single owner"))
            .respond_with(ResponseTemplate::new(200).set_body_json(chat_body(
                r#"{"rate": 0.85, "explanation": "Covers the single-owner rule."}"#,
            )))
            .expect(1)
            .mount(&server)
            .await;

        let grader = OpenAiGrader::new("test-key", Some(server.uri()), None, None).unwrap();
        let grade = grader.grade(&request()).await.unwrap();
        assert_eq!(grade.rate, 0.85);
        assert!(grade.explanation.contains("single-owner"));
    }

    #[tokio::test]
    async fn grade_wrapped_in_prose() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(chat_body(
                "Sure.\n```json\n{\"rate\": 0.5, \"explanation\": \"partial\"}\n```",
            )))
            .mount(&server)
            .await;

        let grader = OpenAiGrader::new("key", Some(server.uri()), Some("local".into()), None)
            .unwrap();
        assert_eq!(grader.model(), "local");
        let grade = grader.grade(&request()).await.unwrap();
        assert_eq!(grade.rate, 0.5);
    }

    #[tokio::test]
    async fn malformed_grade() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(chat_body("Looks good!")))
            .mount(&server)
            .await;

        let grader = OpenAiGrader::new("key", Some(server.uri()), None, None).unwrap();
        let err = grader.grade(&request()).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<GraderError>(),
            Some(GraderError::MalformedGrade(_))
        ));
    }

    #[tokio::test]
    async fn rate_limited() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "2"))
            .mount(&server)
            .await;

        let grader = OpenAiGrader::new("key", Some(server.uri()), None, None).unwrap();
        let err = grader.grade(&request()).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<GraderError>(),
            Some(GraderError::RateLimited {
                retry_after_ms: 2000
            })
        ));
    }

    #[tokio::test]
    async fn error_response() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(500).set_body_string("internal error"))
            .mount(&server)
            .await;

        let grader = OpenAiGrader::new("key", Some(server.uri()), None, None).unwrap();
        let err = grader.grade(&request()).await.unwrap_err();
        assert!(err.to_string().contains("500"));
    }
}
