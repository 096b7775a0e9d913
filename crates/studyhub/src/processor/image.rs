use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use crate::error::ExtractionError;
use crate::processor::ocr::OcrEngine;
use crate::processor::{run_blocking, ExtractedContent, ExtractionMethod, OCR_TIMEOUT_PLACEHOLDER};

pub struct ImageExtractor {
    ocr: Option<Arc<dyn OcrEngine>>,
    timeout: Duration,
}

impl ImageExtractor {
    pub fn new(ocr: Option<Arc<dyn OcrEngine>>, timeout: Duration) -> Self {
        Self { ocr, timeout }
    }

    /// OCRs the image. A timeout is not an error: the text becomes
    /// [`OCR_TIMEOUT_PLACEHOLDER`] and the job carries on.
    pub async fn extract(&self, image_data: Arc<Vec<u8>>) -> Result<ExtractedContent, ExtractionError> {
        let ocr = self
            .ocr
            .clone()
            .ok_or_else(|| ExtractionError::OcrFailed("OCR is disabled".to_string()))?;

        let result = run_blocking("Image OCR", self.timeout, move || {
            let _span = tracing::info_span!("processor.image").entered();
            ocr.recognize(&image_data)
        })
        .await;

        match result {
            Ok(text) => Ok(ExtractedContent {
                text: text.trim().to_string(),
                tables: Vec::new(),
                form_fields: Vec::new(),
                method: ExtractionMethod::ImageOcr,
                page_count: 1,
            }),
            Err(ExtractionError::Timeout { after, .. }) => {
                warn!(
                    timeout_secs = after.as_secs(),
                    "Image OCR timed out, continuing with placeholder text"
                );
                Ok(ExtractedContent {
                    text: OCR_TIMEOUT_PLACEHOLDER.to_string(),
                    tables: Vec::new(),
                    form_fields: Vec::new(),
                    method: ExtractionMethod::OcrTimeout,
                    page_count: 1,
                })
            }
            Err(e) => Err(e),
        }
    }
}
