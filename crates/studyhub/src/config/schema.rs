use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::secrets::SecretSource;

/// Root configuration. Every section is optional in the file and falls
/// back to its defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub version: String,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub extraction: ExtractionConfig,
    #[serde(default)]
    pub document_ai: DocumentAiConfig,
    #[serde(default)]
    pub ai: AiConfig,
    #[serde(default)]
    pub pipeline: PipelineSettings,
    #[serde(default)]
    pub jobs: JobsConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            database: DatabaseConfig::default(),
            extraction: ExtractionConfig::default(),
            document_ai: DocumentAiConfig::default(),
            ai: AiConfig::default(),
            pipeline: PipelineSettings::default(),
            jobs: JobsConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Defaults to `~/.studyhub/data/studyhub.db`. A leading `~` is expanded.
    #[serde(default)]
    pub path: Option<String>,
}

impl DatabaseConfig {
    pub fn resolved_path(&self) -> Option<PathBuf> {
        match &self.path {
            Some(p) => Some(PathBuf::from(crate::secrets::expand_home(p))),
            None => crate::db::default_database_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionConfig {
    #[serde(default = "default_download_timeout")]
    pub download_timeout_secs: u64,
    #[serde(default = "default_pdf_load_timeout")]
    pub pdf_load_timeout_secs: u64,
    #[serde(default = "default_ocr_timeout")]
    pub ocr_timeout_secs: u64,
    #[serde(default = "default_true")]
    pub ocr_enabled: bool,
    #[serde(default = "default_languages")]
    pub ocr_languages: Vec<String>,
    #[serde(default = "default_dpi")]
    pub ocr_dpi: u32,
}

fn default_download_timeout() -> u64 {
    30
}

fn default_pdf_load_timeout() -> u64 {
    60
}

fn default_ocr_timeout() -> u64 {
    300
}

fn default_true() -> bool {
    true
}

fn default_languages() -> Vec<String> {
    vec!["eng".to_string()]
}

fn default_dpi() -> u32 {
    300
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            download_timeout_secs: default_download_timeout(),
            pdf_load_timeout_secs: default_pdf_load_timeout(),
            ocr_timeout_secs: default_ocr_timeout(),
            ocr_enabled: true,
            ocr_languages: default_languages(),
            ocr_dpi: default_dpi(),
        }
    }
}

impl ExtractionConfig {
    pub fn download_timeout(&self) -> Duration {
        Duration::from_secs(self.download_timeout_secs)
    }

    pub fn pdf_load_timeout(&self) -> Duration {
        Duration::from_secs(self.pdf_load_timeout_secs)
    }

    pub fn ocr_timeout(&self) -> Duration {
        Duration::from_secs(self.ocr_timeout_secs)
    }
}

/// Google Document AI. Enabled when an access token and at least one
/// processor resource name are present.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentAiConfig {
    /// Form parser processor, e.g. `projects/p/locations/us/processors/abc`.
    #[serde(default)]
    pub form_processor: Option<String>,
    #[serde(default)]
    pub ocr_processor: Option<String>,
    #[serde(default = "default_access_token")]
    pub access_token: SecretSource,
    #[serde(default = "default_document_ai_timeout")]
    pub request_timeout_secs: u64,
}

fn default_access_token() -> SecretSource {
    SecretSource::env("GOOGLE_ACCESS_TOKEN")
}

fn default_document_ai_timeout() -> u64 {
    120
}

impl Default for DocumentAiConfig {
    fn default() -> Self {
        Self {
            form_processor: None,
            ocr_processor: None,
            access_token: default_access_token(),
            request_timeout_secs: default_document_ai_timeout(),
        }
    }
}

impl DocumentAiConfig {
    pub fn has_processor(&self) -> bool {
        self.form_processor.as_deref().is_some_and(|p| !p.is_empty())
            || self.ocr_processor.as_deref().is_some_and(|p| !p.is_empty())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_api_key")]
    pub api_key: SecretSource,
    #[serde(default = "default_ai_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,
}

fn default_model() -> String {
    "gemini-2.5-flash".to_string()
}

fn default_base_url() -> String {
    "https://generativelanguage.googleapis.com/v1beta".to_string()
}

fn default_api_key() -> SecretSource {
    SecretSource::env("GEMINI_API_KEY")
}

fn default_ai_timeout() -> u64 {
    60
}

fn default_temperature() -> f32 {
    0.3
}

fn default_max_output_tokens() -> u32 {
    2048
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            model: default_model(),
            base_url: default_base_url(),
            api_key: default_api_key(),
            request_timeout_secs: default_ai_timeout(),
            temperature: default_temperature(),
            max_output_tokens: default_max_output_tokens(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSettings {
    #[serde(default = "default_rag_excerpt_chars")]
    pub rag_excerpt_chars: usize,
    /// Tag concepts through the AI service instead of keyword heuristics.
    #[serde(default)]
    pub ai_tagging: bool,
}

fn default_rag_excerpt_chars() -> usize {
    2000
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            rag_excerpt_chars: default_rag_excerpt_chars(),
            ai_tagging: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobsConfig {
    /// Return the running job instead of starting a second one for the same resource.
    #[serde(default = "default_true")]
    pub dedupe_active: bool,
    #[serde(default = "default_stale_after")]
    pub stale_after_secs: u64,
    /// Terminal jobs older than this are purged by the reaper. `None` keeps them forever.
    #[serde(default)]
    pub retention_days: Option<u32>,
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

fn default_stale_after() -> u64 {
    30 * 60
}

fn default_event_capacity() -> usize {
    256
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            dedupe_active: true,
            stale_after_secs: default_stale_after(),
            retention_days: None,
            event_capacity: default_event_capacity(),
        }
    }
}

impl JobsConfig {
    pub fn stale_after(&self) -> Duration {
        Duration::from_secs(self.stale_after_secs)
    }
}
