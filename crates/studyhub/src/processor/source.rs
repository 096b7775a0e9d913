//! Fetches document bytes from a local path or an HTTP(S) URL.

use std::time::Duration;

use crate::error::ExtractionError;
use crate::sanitize;

pub fn is_remote(location: &str) -> bool {
    let lower = location.to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

/// The path part of a location, without query string or fragment. Used for
/// extension based type detection.
pub fn path_component(location: &str) -> &str {
    if is_remote(location) {
        location.split(['?', '#']).next().unwrap_or(location)
    } else {
        location
    }
}

#[derive(Clone)]
pub struct SourceFetcher {
    client: reqwest::Client,
    download_timeout: Duration,
}

impl SourceFetcher {
    pub fn new(download_timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            download_timeout,
        }
    }

    pub async fn fetch(&self, location: &str) -> Result<Vec<u8>, ExtractionError> {
        if is_remote(location) {
            self.download(location).await
        } else {
            read_local(location).await
        }
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>, ExtractionError> {
        let redacted = sanitize::redact_url(url);
        tracing::debug!(url = %redacted, "Downloading document");

        let download_error = |reason: String| ExtractionError::Download {
            url: redacted.clone(),
            reason,
        };

        let response = self
            .client
            .get(url)
            .timeout(self.download_timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    download_error(format!(
                        "timed out after {}s",
                        self.download_timeout.as_secs()
                    ))
                } else {
                    download_error(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(download_error(format!("HTTP {}", status)));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| download_error(e.to_string()))?;
        Ok(bytes.to_vec())
    }
}

async fn read_local(path: &str) -> Result<Vec<u8>, ExtractionError> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(bytes),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(ExtractionError::FileNotFound(sanitize::redact_location(path)))
        }
        Err(e) => Err(ExtractionError::ReadDocument {
            path: path.into(),
            source: e,
        }),
    }
}
