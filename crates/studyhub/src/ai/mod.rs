//! Generative AI content for study material.
//!
//! [`GenerativeModel`] is the vendor seam; [`GeminiClient`] is the
//! production implementation. [`AiContentService`] builds prompts, parses
//! JSON answers and supplies fallbacks.

pub mod content;
pub mod gemini;
pub mod json;
pub mod model;

use std::sync::Arc;

pub use content::{
    AiContentService, Answer, ConceptAnalysis, ContextExcerpt, DocumentSummary,
    LearningInsights, QuestionAnalysis, StudyDay, StudyPlan,
};
pub use gemini::GeminiClient;
pub use model::{AiError, GenerativeModel};

use crate::config::AiConfig;

/// Builds the content service when AI is enabled and a key is available.
pub fn service_from_config(config: &AiConfig) -> Option<AiContentService> {
    GeminiClient::from_config(config)
        .map(|client| AiContentService::new(Arc::new(client) as Arc<dyn GenerativeModel>))
}
