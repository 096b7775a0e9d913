use std::io::Cursor;
use std::sync::Arc;

use crate::error::ExtractionError;

/// Recognizes text in a single raster image. Implementations block and are
/// always called from `spawn_blocking`.
pub trait OcrEngine: Send + Sync {
    fn recognize(&self, image_data: &[u8]) -> Result<String, ExtractionError>;

    /// Resolution used when rasterizing PDF pages for this engine.
    fn dpi(&self) -> u32 {
        300
    }
}

/// Tesseract OCR via leptess.
#[derive(Clone)]
pub struct OcrProcessor {
    inner: Arc<OcrProcessorInner>,
}

struct OcrProcessorInner {
    languages: String,
    dpi: u32,
}

impl OcrProcessor {
    pub fn new(languages: &[String], dpi: u32) -> Self {
        let lang_str = if languages.is_empty() {
            "eng".to_string()
        } else {
            languages.join("+")
        };

        Self {
            inner: Arc::new(OcrProcessorInner {
                languages: lang_str,
                dpi,
            }),
        }
    }

    pub fn languages(&self) -> &str {
        &self.inner.languages
    }
}

impl OcrEngine for OcrProcessor {
    fn recognize(&self, image_data: &[u8]) -> Result<String, ExtractionError> {
        let _span = tracing::info_span!("processor.ocr", languages = %self.inner.languages).entered();

        let img = image::load_from_memory(image_data)
            .map_err(|e| ExtractionError::ImageProcessing(format!("Failed to load image: {}", e)))?;

        // leptess only reads formats leptonica was built with; PNG is always there.
        let mut png_data = Vec::new();
        img.write_to(&mut Cursor::new(&mut png_data), image::ImageFormat::Png)
            .map_err(|e| ExtractionError::ImageProcessing(format!("Failed to convert image: {}", e)))?;

        let mut lt = leptess::LepTess::new(None, &self.inner.languages).map_err(|e| {
            ExtractionError::OcrFailed(format!("Failed to initialize Tesseract: {}", e))
        })?;

        lt.set_image_from_mem(&png_data)
            .map_err(|e| ExtractionError::OcrFailed(format!("Failed to set image for OCR: {}", e)))?;

        lt.get_utf8_text()
            .map_err(|e| ExtractionError::OcrFailed(e.to_string()))
    }

    fn dpi(&self) -> u32 {
        self.inner.dpi
    }
}
