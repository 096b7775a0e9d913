//! Document analysis job pipeline for StudyHub.
//!
//! A submitted resource is turned into text, segmented into questions,
//! tagged with concepts and stored as a search excerpt, all inside one
//! persisted job that callers poll by id.

pub mod ai;
pub mod config;
pub mod db;
pub mod error;
pub mod jobs;
pub mod pipeline;
pub mod processor;
pub mod rag;
pub mod sanitize;
pub mod secrets;
pub mod segmenter;
pub mod tagger;
pub mod telemetry;

pub use ai::{AiContentService, GeminiClient, GenerativeModel};
pub use config::{load_config, Config};
pub use db::Database;
pub use error::{ConfigError, ExtractionError, Result, StudyHubError};
pub use jobs::{
    Job, JobReaper, JobStatus, JobStore, JobView, Orchestrator, SubmitOutcome, SubmitRequest,
};
pub use pipeline::{Pipeline, PipelineResult};
pub use processor::{ExtractionService, TextExtractor};
pub use rag::RagIndexer;
pub use secrets::{resolve_secret, resolve_secret_optional, SecretError};
pub use tagger::ConceptTagger;
