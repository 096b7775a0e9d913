use serde::{Deserialize, Serialize};

use crate::processor::{ExtractedContent, ExtractedTable, ExtractionMethod, FormField};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionResult {
    pub method: ExtractionMethod,
    pub page_count: usize,
    pub text_chars: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tables: Vec<ExtractedTable>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub form_fields: Vec<FormField>,
}

impl ExtractionResult {
    pub fn from_content(content: &ExtractedContent) -> Self {
        Self {
            method: content.method,
            page_count: content.page_count,
            text_chars: content.text.chars().count(),
            tables: content.tables.clone(),
            form_fields: content.form_fields.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SegmentationResult {
    pub questions_extracted: usize,
    pub question_numbers: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaggingResult {
    pub concepts: Vec<String>,
    /// Concepts that did not exist before this run.
    pub created: usize,
    pub ai_assisted: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexResult {
    pub indexed: bool,
    pub excerpt_chars: usize,
    pub truncated: bool,
}

/// The `results` payload of a completed job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineResult {
    pub questions_extracted: usize,
    pub concepts_identified: usize,
    pub rag_indexed: bool,
    pub extraction: ExtractionResult,
    pub segmentation: SegmentationResult,
    pub tagging: TaggingResult,
    pub index: IndexResult,
}

impl PipelineResult {
    pub fn compose(
        extraction: ExtractionResult,
        segmentation: SegmentationResult,
        tagging: TaggingResult,
        index: IndexResult,
    ) -> Self {
        Self {
            questions_extracted: segmentation.questions_extracted,
            concepts_identified: tagging.concepts.len(),
            rag_indexed: index.indexed,
            extraction,
            segmentation,
            tagging,
            index,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_keys_are_camel_case() {
        let result = PipelineResult::compose(
            ExtractionResult {
                method: ExtractionMethod::PdfText,
                page_count: 2,
                text_chars: 120,
                tables: Vec::new(),
                form_fields: Vec::new(),
            },
            SegmentationResult {
                questions_extracted: 3,
                question_numbers: vec!["1".into(), "2".into(), "3".into()],
            },
            TaggingResult {
                concepts: vec!["Computer Science".into()],
                created: 1,
                ai_assisted: false,
            },
            IndexResult {
                indexed: true,
                excerpt_chars: 120,
                truncated: false,
            },
        );

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["questionsExtracted"], 3);
        assert_eq!(json["conceptsIdentified"], 1);
        assert_eq!(json["ragIndexed"], true);
        assert_eq!(json["extraction"]["method"], "pdf_text");
        assert!(json["extraction"].get("tables").is_none());

        let back: PipelineResult = serde_json::from_value(json).unwrap();
        assert_eq!(back, result);
    }
}
