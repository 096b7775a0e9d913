pub mod document_ai;
pub mod image;
pub mod ocr;
pub mod pdf;
pub mod source;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::{DocumentAiConfig, ExtractionConfig};
use crate::error::ExtractionError;
use crate::sanitize;

use self::document_ai::DocumentAiExtractor;
use self::image::ImageExtractor;
use self::ocr::{OcrEngine, OcrProcessor};
use self::pdf::PdfExtractor;
use self::source::SourceFetcher;

/// Text used for an image whose OCR did not finish in time.
pub const OCR_TIMEOUT_PLACEHOLDER: &str =
    "[OCR timed out: text could not be extracted from this image]";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionMethod {
    PdfText,
    PdfTextWithOcr,
    ImageOcr,
    OcrTimeout,
    DocumentAiForm,
    DocumentAiOcr,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedTable {
    pub rows: usize,
    pub cols: usize,
    pub cells: Vec<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormField {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedContent {
    pub text: String,
    pub tables: Vec<ExtractedTable>,
    pub form_fields: Vec<FormField>,
    pub method: ExtractionMethod,
    pub page_count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Pdf,
    Image,
}

/// A supported document type and the MIME type sent to cloud processors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileType {
    pub kind: FileKind,
    pub mime: &'static str,
}

const PDF_MIME: &str = "application/pdf";

const IMAGE_TYPES: &[(&str, &str)] = &[
    ("png", "image/png"),
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("gif", "image/gif"),
    ("bmp", "image/bmp"),
    ("tif", "image/tiff"),
    ("tiff", "image/tiff"),
    ("webp", "image/webp"),
];

impl FileType {
    /// Resolves the type from the declared hint (`pdf`, `application/pdf`,
    /// `jpg`, `image/png`, ...), falling back to the location's extension.
    pub fn detect(type_hint: Option<&str>, location: &str) -> Result<Self, ExtractionError> {
        if let Some(hint) = type_hint.map(str::trim).filter(|h| !h.is_empty()) {
            return Self::from_declared(hint)
                .ok_or_else(|| ExtractionError::UnsupportedFileType(hint.to_string()));
        }

        let path = source::path_component(location);
        match mime_guess::from_path(path).first_raw() {
            Some(mime) => Self::from_declared(mime)
                .ok_or_else(|| ExtractionError::UnsupportedFileType(mime.to_string())),
            None => {
                let ext = std::path::Path::new(path)
                    .extension()
                    .and_then(|e| e.to_str())
                    .unwrap_or("unknown");
                Err(ExtractionError::UnsupportedFileType(ext.to_string()))
            }
        }
    }

    fn from_declared(declared: &str) -> Option<Self> {
        let declared = declared.to_ascii_lowercase();
        let declared = declared.trim_start_matches('.');

        if declared == "pdf" || declared == PDF_MIME {
            return Some(Self {
                kind: FileKind::Pdf,
                mime: PDF_MIME,
            });
        }

        IMAGE_TYPES
            .iter()
            .find(|(ext, mime)| declared == *ext || declared == *mime)
            .map(|(_, mime)| Self {
                kind: FileKind::Image,
                mime: *mime,
            })
    }
}

/// Turns a stored document into text.
#[async_trait]
pub trait TextExtractor: Send + Sync {
    async fn extract(
        &self,
        location: &str,
        type_hint: Option<&str>,
    ) -> Result<ExtractedContent, ExtractionError>;
}

/// Production extractor: fetch, then Document AI when configured, then
/// local lopdf / Tesseract.
pub struct ExtractionService {
    fetcher: SourceFetcher,
    document_ai: Option<DocumentAiExtractor>,
    pdf: PdfExtractor,
    image: ImageExtractor,
}

impl ExtractionService {
    pub fn from_config(extraction: &ExtractionConfig, document_ai: &DocumentAiConfig) -> Self {
        let ocr: Option<Arc<dyn OcrEngine>> = if extraction.ocr_enabled {
            Some(Arc::new(OcrProcessor::new(
                &extraction.ocr_languages,
                extraction.ocr_dpi,
            )))
        } else {
            None
        };

        Self::new(
            SourceFetcher::new(extraction.download_timeout()),
            DocumentAiExtractor::from_config(document_ai),
            ocr,
            extraction.pdf_load_timeout(),
            extraction.ocr_timeout(),
        )
    }

    pub fn new(
        fetcher: SourceFetcher,
        document_ai: Option<DocumentAiExtractor>,
        ocr: Option<Arc<dyn OcrEngine>>,
        pdf_load_timeout: Duration,
        ocr_timeout: Duration,
    ) -> Self {
        Self {
            fetcher,
            document_ai,
            pdf: PdfExtractor::new(ocr.clone(), pdf_load_timeout, ocr_timeout),
            image: ImageExtractor::new(ocr, ocr_timeout),
        }
    }
}

#[async_trait]
impl TextExtractor for ExtractionService {
    async fn extract(
        &self,
        location: &str,
        type_hint: Option<&str>,
    ) -> Result<ExtractedContent, ExtractionError> {
        let file_type = FileType::detect(type_hint, location)?;
        let bytes = Arc::new(self.fetcher.fetch(location).await?);

        tracing::debug!(
            location = %sanitize::redact_location(location),
            mime = file_type.mime,
            size = bytes.len(),
            "Fetched document"
        );

        if let Some(cloud) = &self.document_ai {
            if let Some(content) = cloud.extract(&bytes, file_type.mime).await {
                return Ok(content);
            }
            tracing::info!("Falling back to local extraction");
        }

        match file_type.kind {
            FileKind::Pdf => self.pdf.extract(bytes).await,
            FileKind::Image => self.image.extract(bytes).await,
        }
    }
}

/// Runs blocking work on the blocking pool, bounded by `after`. The
/// blocking thread is not interrupted on timeout; its result is dropped.
pub(crate) async fn run_blocking<T, F>(
    stage: &'static str,
    after: Duration,
    f: F,
) -> Result<T, ExtractionError>
where
    F: FnOnce() -> Result<T, ExtractionError> + Send + 'static,
    T: Send + 'static,
{
    match tokio::time::timeout(after, tokio::task::spawn_blocking(f)).await {
        Ok(Ok(result)) => result,
        Ok(Err(join_error)) => Err(ExtractionError::TaskJoin(join_error.to_string())),
        Err(_) => Err(ExtractionError::Timeout { stage, after }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_from_hint() {
        let t = FileType::detect(Some("pdf"), "whatever.bin").unwrap();
        assert_eq!(t.kind, FileKind::Pdf);
        let t = FileType::detect(Some("Application/PDF"), "x").unwrap();
        assert_eq!(t.mime, "application/pdf");
        let t = FileType::detect(Some("image/jpeg"), "x").unwrap();
        assert_eq!(t.kind, FileKind::Image);
        let t = FileType::detect(Some(".JPG"), "x").unwrap();
        assert_eq!(t.mime, "image/jpeg");
    }

    #[test]
    fn test_detect_hint_wins_over_extension() {
        let t = FileType::detect(Some("png"), "/uploads/file.pdf").unwrap();
        assert_eq!(t.kind, FileKind::Image);
    }

    #[test]
    fn test_detect_from_extension() {
        let t = FileType::detect(None, "/uploads/exam.PDF").unwrap();
        assert_eq!(t.kind, FileKind::Pdf);
        let t = FileType::detect(Some(""), "https://cdn/x/scan.tiff?sig=1").unwrap();
        assert_eq!(t.mime, "image/tiff");
    }

    #[test]
    fn test_detect_unsupported() {
        match FileType::detect(Some("docx"), "a.docx") {
            Err(ExtractionError::UnsupportedFileType(t)) => assert_eq!(t, "docx"),
            other => panic!("unexpected {:?}", other),
        }
        assert!(matches!(
            FileType::detect(None, "/uploads/notes.txt"),
            Err(ExtractionError::UnsupportedFileType(_))
        ));
        match FileType::detect(None, "/uploads/noext") {
            Err(ExtractionError::UnsupportedFileType(t)) => assert_eq!(t, "unknown"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_run_blocking_timeout() {
        let result = run_blocking("sleepy", Duration::from_millis(10), || {
            std::thread::sleep(Duration::from_millis(200));
            Ok(())
        })
        .await;
        assert!(matches!(
            result,
            Err(ExtractionError::Timeout { stage: "sleepy", .. })
        ));
    }

    #[tokio::test]
    async fn test_service_extracts_local_pdf() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("paper.pdf");
        std::fs::write(&path, pdf::fixtures::pdf_with_pages(&[Some("1. Define entropy")]))
            .unwrap();

        let service = ExtractionService::new(
            SourceFetcher::new(Duration::from_secs(5)),
            None,
            None,
            Duration::from_secs(60),
            Duration::from_secs(60),
        );
        let content = service
            .extract(path.to_str().unwrap(), None)
            .await
            .unwrap();
        assert!(content.text.contains("Define entropy"));
        assert_eq!(content.method, ExtractionMethod::PdfText);
    }

    #[tokio::test]
    async fn test_service_unsupported_before_fetch() {
        let service = ExtractionService::new(
            SourceFetcher::new(Duration::from_secs(5)),
            None,
            None,
            Duration::from_secs(60),
            Duration::from_secs(60),
        );
        let err = service.extract("/missing/file.docx", None).await.unwrap_err();
        assert!(matches!(err, ExtractionError::UnsupportedFileType(_)));

        let err = service.extract("/missing/file.pdf", None).await.unwrap_err();
        assert!(matches!(err, ExtractionError::FileNotFound(_)));
    }
}
