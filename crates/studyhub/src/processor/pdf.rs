use std::path::Path;
use std::process::Command;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::ExtractionError;
use crate::processor::ocr::OcrEngine;
use crate::processor::{run_blocking, ExtractedContent, ExtractionMethod};

/// Embedded-text extraction with lopdf. Pages that yield no text are
/// rasterized with `pdftoppm` and OCR'd when an engine is available.
pub struct PdfExtractor {
    ocr: Option<Arc<dyn OcrEngine>>,
    load_timeout: Duration,
    ocr_timeout: Duration,
}

impl PdfExtractor {
    pub fn new(ocr: Option<Arc<dyn OcrEngine>>, load_timeout: Duration, ocr_timeout: Duration) -> Self {
        Self {
            ocr,
            load_timeout,
            ocr_timeout,
        }
    }

    pub async fn extract(&self, pdf_bytes: Arc<Vec<u8>>) -> Result<ExtractedContent, ExtractionError> {
        let bytes = pdf_bytes.clone();
        let mut pages = run_blocking("PDF load", self.load_timeout, move || {
            let _span = tracing::info_span!("processor.pdf").entered();
            extract_pages(&bytes)
        })
        .await?;

        let mut ocr_pages = 0usize;
        if let Some(ocr) = &self.ocr {
            for (index, page_text) in pages.iter_mut().enumerate() {
                if !page_text.trim().is_empty() {
                    continue;
                }
                let page_num = (index + 1) as u32;
                match self.ocr_page(ocr.clone(), pdf_bytes.clone(), page_num).await {
                    Ok(text) => {
                        *page_text = text;
                        ocr_pages += 1;
                    }
                    // A page that cannot be rendered or read contributes nothing.
                    Err(e) => warn!(page = page_num, "OCR fallback failed: {}", e),
                }
            }
        }

        let page_count = pages.len();
        let text = pages
            .iter()
            .map(|p| p.trim_end())
            .filter(|p| !p.trim().is_empty())
            .collect::<Vec<_>>()
            .join("\n");

        debug!(page_count, ocr_pages, chars = text.chars().count(), "PDF extracted");

        Ok(ExtractedContent {
            text,
            tables: Vec::new(),
            form_fields: Vec::new(),
            method: if ocr_pages > 0 {
                ExtractionMethod::PdfTextWithOcr
            } else {
                ExtractionMethod::PdfText
            },
            page_count,
        })
    }

    async fn ocr_page(
        &self,
        ocr: Arc<dyn OcrEngine>,
        pdf_bytes: Arc<Vec<u8>>,
        page_num: u32,
    ) -> Result<String, ExtractionError> {
        run_blocking("PDF page OCR", self.ocr_timeout, move || {
            let _span = tracing::info_span!("processor.ocr_fallback", page = page_num).entered();
            let image = render_page_png(&pdf_bytes, page_num, ocr.dpi())?;
            ocr.recognize(&image)
        })
        .await
    }
}

/// Returns the embedded text of every page, in page order. Pages whose
/// content cannot be decoded yield an empty string.
fn extract_pages(pdf_bytes: &[u8]) -> Result<Vec<String>, ExtractionError> {
    let doc = lopdf::Document::load_mem(pdf_bytes)
        .map_err(|e| ExtractionError::PdfProcessing(format!("Failed to load PDF: {}", e)))?;

    // get_pages is a BTreeMap keyed by 1-based page number.
    Ok(doc
        .get_pages()
        .keys()
        .map(|page_num| doc.extract_text(&[*page_num]).unwrap_or_default())
        .map(|text| clean_page_text(&text))
        .collect())
}

/// Marker lopdf emits for CID fonts it cannot decode.
const IDENTITY_H_PATTERN: &str = "?Identity-H Unimplemented?";

fn clean_page_text(text: &str) -> String {
    text.replace(IDENTITY_H_PATTERN, "")
}

fn render_page_png(pdf_bytes: &[u8], page_num: u32, dpi: u32) -> Result<Vec<u8>, ExtractionError> {
    let temp_dir = std::env::temp_dir();
    let run_id = uuid::Uuid::new_v4();
    let pdf_path = temp_dir.join(format!("studyhub_render_{}.pdf", run_id));
    let output_prefix = temp_dir.join(format!("studyhub_page_{}", run_id));

    std::fs::write(&pdf_path, pdf_bytes)
        .map_err(|e| ExtractionError::PdfProcessing(format!("Failed to write temp PDF: {}", e)))?;

    let output = Command::new("pdftoppm")
        .args(["-png", "-r", &dpi.to_string()])
        .args(["-f", &page_num.to_string(), "-l", &page_num.to_string()])
        .arg(&pdf_path)
        .arg(&output_prefix)
        .output();

    let _ = std::fs::remove_file(&pdf_path);

    let output = output.map_err(|e| {
        ExtractionError::PdfProcessing(format!(
            "Failed to run pdftoppm: {}. Make sure poppler-utils is installed.",
            e
        ))
    })?;

    if !output.status.success() {
        return Err(ExtractionError::PdfProcessing(format!(
            "pdftoppm failed: {}",
            String::from_utf8_lossy(&output.stderr)
        )));
    }

    // pdftoppm zero-pads the page suffix depending on the document's page count.
    let prefix = output_prefix.display().to_string();
    let candidates = [
        format!("{}-{}.png", prefix, page_num),
        format!("{}-{:02}.png", prefix, page_num),
        format!("{}-{:03}.png", prefix, page_num),
    ];
    let image_path = candidates
        .iter()
        .find(|p| Path::new(p).exists())
        .ok_or_else(|| ExtractionError::PdfProcessing("Rendered page image not found".to_string()))?;

    let image_data = std::fs::read(image_path)
        .map_err(|e| ExtractionError::PdfProcessing(format!("Failed to read rendered page: {}", e)));
    let _ = std::fs::remove_file(image_path);
    image_data
}
