use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Text extraction failed: {0}")]
    Extraction(#[from] crate::error::ExtractionError),

    #[error("Database error: {0}")]
    Database(#[from] crate::db::DatabaseError),

    #[error("Resource '{0}' has no file path or URL")]
    NoSource(String),

    #[error("Failed to encode pipeline results: {0}")]
    Encode(#[from] serde_json::Error),
}
