//! Google Document AI client.
//!
//! Two processors may be configured: a form parser, which also returns
//! tables and key/value fields, and a plain OCR processor. Either one is
//! addressed by its full resource name
//! (`projects/<p>/locations/<l>/processors/<id>`).

use std::time::Duration;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::DocumentAiConfig;
use crate::error::ExtractionError;
use crate::processor::{ExtractedContent, ExtractedTable, ExtractionMethod, FormField};

pub struct DocumentAiClient {
    http: reqwest::Client,
    token: SecretString,
    processor_name: String,
    timeout: Duration,
}

impl DocumentAiClient {
    pub fn new(token: SecretString, processor_name: String, timeout: Duration) -> Self {
        Self {
            http: reqwest::Client::new(),
            token,
            processor_name,
            timeout,
        }
    }

    pub fn processor_name(&self) -> &str {
        &self.processor_name
    }

    fn endpoint(&self) -> String {
        endpoint_for(&self.processor_name)
    }

    pub async fn process(
        &self,
        data: &[u8],
        mime_type: &str,
        method: ExtractionMethod,
    ) -> Result<ExtractedContent, ExtractionError> {
        let request = ProcessRequest {
            raw_document: RawDocument {
                content: BASE64.encode(data),
                mime_type: mime_type.to_string(),
            },
            skip_human_review: true,
        };

        debug!(processor = %self.processor_name, mime_type, "Sending document to Document AI");

        let response = self
            .http
            .post(self.endpoint())
            .bearer_auth(self.token.expose_secret())
            .timeout(self.timeout)
            .json(&request)
            .send()
            .await
            .map_err(|e| ExtractionError::DocumentAi(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ExtractionError::DocumentAi(format!(
                "processing failed ({}): {}",
                status,
                crate::sanitize::truncate_for_log(&body, 300)
            )));
        }

        let parsed: ProcessResponse = response
            .json()
            .await
            .map_err(|e| ExtractionError::DocumentAi(format!("invalid response: {}", e)))?;

        let content = document_to_content(parsed.document, method);
        if content.text.trim().is_empty() {
            return Err(ExtractionError::DocumentAi(
                "returned empty text".to_string(),
            ));
        }

        info!(
            processor = %self.processor_name,
            pages = content.page_count,
            tables = content.tables.len(),
            fields = content.form_fields.len(),
            "Document AI extraction succeeded"
        );
        Ok(content)
    }
}

/// `https://{location}-documentai.googleapis.com/v1/{processor}:process`
fn endpoint_for(processor_name: &str) -> String {
    let location = processor_name.split('/').nth(3).unwrap_or("us");
    format!(
        "https://{}-documentai.googleapis.com/v1/{}:process",
        location, processor_name
    )
}

/// Tries the form parser, then the OCR processor. Every failure is logged
/// and turned into `None` so the caller can fall back to local extraction.
pub struct DocumentAiExtractor {
    form: Option<DocumentAiClient>,
    ocr: Option<DocumentAiClient>,
}

impl DocumentAiExtractor {
    /// Returns `None` when no processor is configured or the token cannot be
    /// resolved.
    pub fn from_config(config: &DocumentAiConfig) -> Option<Self> {
        if !config.has_processor() {
            return None;
        }

        let token = match config.access_token.resolve() {
            Ok(Some(token)) => token,
            Ok(None) => {
                debug!("Document AI processor configured without an access token source");
                return None;
            }
            Err(e) => {
                warn!("Document AI disabled: {}", e);
                return None;
            }
        };

        let timeout = Duration::from_secs(config.request_timeout_secs);
        let client = |name: &Option<String>| {
            name.as_ref()
                .filter(|n| !n.is_empty())
                .map(|n| DocumentAiClient::new(token.clone(), n.clone(), timeout))
        };

        Some(Self {
            form: client(&config.form_processor),
            ocr: client(&config.ocr_processor),
        })
    }

    pub async fn extract(&self, data: &[u8], mime_type: &str) -> Option<ExtractedContent> {
        let attempts = [
            (&self.form, ExtractionMethod::DocumentAiForm),
            (&self.ocr, ExtractionMethod::DocumentAiOcr),
        ];

        for (client, method) in attempts {
            let Some(client) = client else { continue };
            match client.process(data, mime_type, method).await {
                Ok(content) => return Some(content),
                Err(e) => warn!(
                    processor = client.processor_name(),
                    "Document AI attempt failed: {}", e
                ),
            }
        }
        None
    }
}

fn document_to_content(document: Document, method: ExtractionMethod) -> ExtractedContent {
    let full_text = document.text.unwrap_or_default();
    let pages = document.pages.unwrap_or_default();

    let mut tables = Vec::new();
    let mut form_fields = Vec::new();

    for page in &pages {
        for table in page.tables.iter().flatten() {
            let cells: Vec<Vec<String>> = table
                .header_rows
                .iter()
                .flatten()
                .chain(table.body_rows.iter().flatten())
                .map(|row| {
                    row.cells
                        .iter()
                        .flatten()
                        .map(|cell| layout_text(cell.layout.as_ref(), &full_text))
                        .collect()
                })
                .collect();
            let cols = cells.iter().map(Vec::len).max().unwrap_or(0);
            tables.push(ExtractedTable {
                rows: cells.len(),
                cols,
                cells,
            });
        }

        for field in page.form_fields.iter().flatten() {
            let name = layout_text(field.field_name.as_ref(), &full_text);
            let value = layout_text(field.field_value.as_ref(), &full_text);
            if !name.is_empty() {
                form_fields.push(FormField { name, value });
            }
        }
    }

    ExtractedContent {
        page_count: pages.len().max(usize::from(!full_text.is_empty())),
        text: full_text,
        tables,
        form_fields,
        method,
    }
}

/// Concatenates the text segments a layout points at. Offsets count
/// characters, not bytes. Out of range segments are skipped.
fn layout_text(layout: Option<&Layout>, full_text: &str) -> String {
    let Some(segments) = layout
        .and_then(|l| l.text_anchor.as_ref())
        .and_then(|a| a.text_segments.as_ref())
    else {
        return String::new();
    };

    let mut text = String::new();
    for segment in segments {
        let start = segment.start_index.as_ref().map_or(0, |i| i.0);
        let end = segment.end_index.as_ref().map_or(usize::MAX, |i| i.0);
        if let Some(part) = char_slice(full_text, start, end) {
            text.push_str(part);
        }
    }
    text.trim().to_string()
}

/// `text[start..end]` in characters. `end` past the last character is
/// clamped; `start` past the end or after `end` yields `None`.
fn char_slice(text: &str, start: usize, end: usize) -> Option<&str> {
    if start > end {
        return None;
    }
    let byte_at = |n: usize| {
        text.char_indices()
            .map(|(i, _)| i)
            .chain(std::iter::once(text.len()))
            .nth(n)
    };
    let from = byte_at(start)?;
    let to = byte_at(end).unwrap_or(text.len());
    text.get(from..to)
}

// Wire types. Document AI serializes int64 as JSON strings.

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ProcessRequest {
    raw_document: RawDocument,
    skip_human_review: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RawDocument {
    content: String,
    mime_type: String,
}

#[derive(Deserialize)]
struct ProcessResponse {
    document: Document,
}

#[derive(Deserialize)]
struct Document {
    text: Option<String>,
    pages: Option<Vec<Page>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Page {
    tables: Option<Vec<Table>>,
    form_fields: Option<Vec<PageFormField>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Table {
    header_rows: Option<Vec<TableRow>>,
    body_rows: Option<Vec<TableRow>>,
}

#[derive(Deserialize)]
struct TableRow {
    cells: Option<Vec<TableCell>>,
}

#[derive(Deserialize)]
struct TableCell {
    layout: Option<Layout>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PageFormField {
    field_name: Option<Layout>,
    field_value: Option<Layout>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Layout {
    text_anchor: Option<TextAnchor>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TextAnchor {
    text_segments: Option<Vec<TextSegment>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TextSegment {
    start_index: Option<Index>,
    end_index: Option<Index>,
}

/// Accepts both `"12"` and `12`.
struct Index(usize);

impl<'de> Deserialize<'de> for Index {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        use serde::de::Error;

        match serde_json::Value::deserialize(deserializer)? {
            serde_json::Value::Number(n) => n
                .as_u64()
                .map(|v| Index(v as usize))
                .ok_or_else(|| D::Error::custom("negative text index")),
            serde_json::Value::String(s) => s
                .parse::<usize>()
                .map(Index)
                .map_err(D::Error::custom),
            other => Err(D::Error::custom(format!("unexpected text index {}", other))),
        }
    }
}
