use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

/// Errors from a generative model call or from reading its answer.
#[derive(Debug, Error)]
pub enum AiError {
    #[error("AI content generation is disabled")]
    Disabled,

    #[error("Model request failed: {0}")]
    Request(String),

    #[error("Model returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Model returned an empty response")]
    EmptyResponse,

    #[error("No JSON object found in model response")]
    NoJson,

    #[error("Failed to parse model JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Model request timed out after {}s", .0.as_secs())]
    Timeout(Duration),
}

/// A text-in, text-out generative model.
#[async_trait]
pub trait GenerativeModel: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, AiError>;

    /// Model identifier, used in logs.
    fn name(&self) -> &str;
}
