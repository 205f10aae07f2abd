use async_trait::async_trait;
use devbot_common::DevbotError;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

/// Failure of a single generation call.
///
/// The `Display` form doubles as the answer shown to the user when the
/// model cannot be reached.
#[derive(Debug, Error)]
pub enum LlmError {
    /// The server answered with a non-success status
    #[error("[LLM Error {status}] {body}")]
    Status { status: u16, body: String },

    /// The request never completed
    #[error("[Connection Error] {0}")]
    Connection(String),

    /// The server answered but the body was unusable
    #[error("[Connection Error] invalid response: {0}")]
    InvalidResponse(String),
}

impl From<LlmError> for DevbotError {
    fn from(err: LlmError) -> Self {
        DevbotError::Llm(err.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmResponse {
    pub content: String,
    pub model: String,
    pub usage: Option<TokenUsage>,
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    /// One completion for a fully rendered prompt. A single attempt.
    async fn generate(&self, prompt: &str) -> Result<LlmResponse, LlmError>;

    fn model_name(&self) -> &str;

    /// Like [`LlmClient::generate`], but a failure becomes the answer text.
    async fn answer(&self, prompt: &str) -> String {
        match self.generate(prompt).await {
            Ok(response) => response.content,
            Err(e) => {
                warn!(model = %self.model_name(), error = %e, "Generation failed");
                e.to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(Result<&'static str, u16>);

    #[async_trait]
    impl LlmClient for Fixed {
        async fn generate(&self, _prompt: &str) -> Result<LlmResponse, LlmError> {
            match self.0 {
                Ok(text) => Ok(LlmResponse {
                    content: text.to_string(),
                    model: "fixed".into(),
                    usage: None,
                }),
                Err(status) => Err(LlmError::Status {
                    status,
                    body: "model not found".into(),
                }),
            }
        }

        fn model_name(&self) -> &str {
            "fixed"
        }
    }

    #[test]
    fn error_strings_are_user_facing() {
        let status = LlmError::Status {
            status: 500,
            body: "boom".into(),
        };
        assert_eq!(status.to_string(), "[LLM Error 500] boom");

        let conn = LlmError::Connection("connection refused".into());
        assert_eq!(conn.to_string(), "[Connection Error] connection refused");
        assert!(LlmError::InvalidResponse("missing field".into())
            .to_string()
            .starts_with("[Connection Error]"));
    }

    #[test]
    fn converts_into_common_error() {
        let err: DevbotError = LlmError::Connection("timed out".into()).into();
        assert!(matches!(err, DevbotError::Llm(ref m) if m == "[Connection Error] timed out"));
    }

    #[tokio::test]
    async fn answer_passes_content_through() {
        assert_eq!(Fixed(Ok("Use open().")).answer("p").await, "Use open().");
    }

    #[tokio::test]
    async fn answer_inlines_failures() {
        assert_eq!(
            Fixed(Err(404)).answer("p").await,
            "[LLM Error 404] model not found"
        );
    }

    #[test]
    fn response_serializes() {
        let response = LlmResponse {
            content: "hi".into(),
            model: "deepseek-coder:6.7b".into(),
            usage: Some(TokenUsage {
                prompt_tokens: 12,
                completion_tokens: 3,
            }),
        };
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["usage"]["completion_tokens"], 3);
    }
}
