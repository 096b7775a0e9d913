use std::path::Path;

use crate::config::schema::Config;
use crate::error::ConfigError;

const SCHEMA_JSON: &str = include_str!("../../../../schema/config-v1.json");

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_config_from_str(&content)
}

pub fn load_config_from_str(content: &str) -> Result<Config, ConfigError> {
    let json_value: serde_json::Value = serde_json::from_str(content)?;

    validate_schema(&json_value)?;

    let config: Config = serde_json::from_value(json_value)?;

    validate_config(&config)?;

    Ok(config)
}

fn validate_schema(json_value: &serde_json::Value) -> Result<(), ConfigError> {
    let schema: serde_json::Value =
        serde_json::from_str(SCHEMA_JSON).map_err(|e| ConfigError::Validation {
            message: format!("Invalid embedded schema JSON: {}", e),
        })?;

    let validator = jsonschema::validator_for(&schema).map_err(|e| ConfigError::Validation {
        message: format!("Failed to compile JSON schema: {}", e),
    })?;

    let error_messages: Vec<String> = validator
        .iter_errors(json_value)
        .map(|e| e.to_string())
        .collect();
    if !error_messages.is_empty() {
        return Err(ConfigError::SchemaValidation {
            errors: error_messages.join("; "),
        });
    }

    Ok(())
}

/// Checks that cannot be expressed in the schema.
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.version != "1.0" {
        return Err(ConfigError::Validation {
            message: format!("Unsupported config version: {}", config.version),
        });
    }

    for processor in [
        &config.document_ai.form_processor,
        &config.document_ai.ocr_processor,
    ]
    .into_iter()
    .flatten()
    {
        if !processor.is_empty() && !is_processor_name(processor) {
            return Err(ConfigError::Validation {
                message: format!(
                    "Document AI processor must look like projects/<p>/locations/<l>/processors/<id>, got '{}'",
                    processor
                ),
            });
        }
    }

    if config.pipeline.ai_tagging && !config.ai.enabled {
        return Err(ConfigError::Validation {
            message: "pipeline.ai_tagging requires ai.enabled".to_string(),
        });
    }

    if config.jobs.event_capacity == 0 {
        return Err(ConfigError::Validation {
            message: "jobs.event_capacity must be at least 1".to_string(),
        });
    }

    Ok(())
}

fn is_processor_name(name: &str) -> bool {
    let parts: Vec<&str> = name.split('/').collect();
    parts.len() == 6
        && parts[0] == "projects"
        && parts[2] == "locations"
        && parts[4] == "processors"
        && parts.iter().all(|p| !p.is_empty())
}
