//! Document fixtures and fake OCR engines.

#![allow(dead_code)]

use std::time::Duration;

use lopdf::{dictionary, Document, Object, Stream};

use studyhub::processor::ocr::OcrEngine;
use studyhub::ExtractionError;

/// Builds a PDF with one page per entry, each page holding one line of
/// text in a standard font.
pub fn pdf_with_pages(pages: &[&str]) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });

    let mut kids = Vec::new();
    for text in pages {
        let escaped = text.replace('(', "\\(").replace(')', "\\)");
        let content = format!("BT /F1 12 Tf 50 700 Td ({}) Tj ET\n", escaped);
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.into_bytes()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
            "Resources" => resources_id,
            "Contents" => content_id,
        });
        kids.push(Object::from(page_id));
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).expect("Failed to serialize PDF fixture");
    bytes
}

/// OCR engine that always reads the same text.
pub struct FixedOcr(pub &'static str);

impl OcrEngine for FixedOcr {
    fn recognize(&self, _image_data: &[u8]) -> Result<String, ExtractionError> {
        Ok(self.0.to_string())
    }
}

/// OCR engine that blocks for longer than any sensible timeout.
pub struct SlowOcr(pub Duration);

impl OcrEngine for SlowOcr {
    fn recognize(&self, _image_data: &[u8]) -> Result<String, ExtractionError> {
        std::thread::sleep(self.0);
        Ok("recognized too late".to_string())
    }
}

/// Any bytes will do: the fake engines never decode the image.
pub const FAKE_PNG: &[u8] = b"\x89PNG\r\n\x1a\nnot really an image";
