use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info_span, warn, Instrument};

use crate::ai::AiContentService;
use crate::config::Config;
use crate::db::question_repo::{self, NewQuestion};
use crate::db::{format_timestamp, Database};
use crate::jobs::JobStage;
use crate::processor::{ExtractionMethod, ExtractionService, TextExtractor};
use crate::rag::RagIndexer;
use crate::sanitize;
use crate::segmenter;
use crate::tagger::ConceptTagger;

use super::context::PipelineContext;
use super::error::PipelineError;
use super::progress::{ProgressEvent, ProgressReporter};
use super::result::{ExtractionResult, PipelineResult, SegmentationResult, TaggingResult};

/// Extraction → segmentation → tagging → RAG excerpt for one resource.
/// Stages run strictly in order and the first error stops the run.
pub struct Pipeline {
    db: Database,
    extractor: Arc<dyn TextExtractor>,
    tagger: ConceptTagger,
    rag: RagIndexer,
}

impl Pipeline {
    /// Production constructor. `ai` is only used for tagging when
    /// `pipeline.ai_tagging` is set.
    pub fn from_config(db: Database, config: &Config, ai: Option<Arc<AiContentService>>) -> Self {
        let extractor = Arc::new(ExtractionService::from_config(
            &config.extraction,
            &config.document_ai,
        ));

        let mut tagger = ConceptTagger::new(db.clone());
        if config.pipeline.ai_tagging {
            match ai {
                Some(ai) => tagger = tagger.with_ai(ai),
                None => warn!("AI tagging requested but the AI service is unavailable, using keyword tagging"),
            }
        }

        let rag = RagIndexer::new(db.clone(), config.pipeline.rag_excerpt_chars);
        Self::new(db, extractor, tagger, rag)
    }

    pub fn new(
        db: Database,
        extractor: Arc<dyn TextExtractor>,
        tagger: ConceptTagger,
        rag: RagIndexer,
    ) -> Self {
        Self {
            db,
            extractor,
            tagger,
            rag,
        }
    }

    pub async fn run(
        &self,
        ctx: PipelineContext,
        progress: &dyn ProgressReporter,
    ) -> Result<PipelineResult, PipelineError> {
        let span = info_span!("pipeline",
            job_id = %ctx.input.job_id,
            resource_id = %ctx.input.resource_id,
            source = %sanitize::redact_location(&ctx.input.location),
        );
        self.run_steps(ctx, progress).instrument(span).await
    }

    async fn run_steps(
        &self,
        mut ctx: PipelineContext,
        progress: &dyn ProgressReporter,
    ) -> Result<PipelineResult, PipelineError> {
        // Step 1: Extract text
        let extraction = self
            .step_extract(&mut ctx, progress)
            .instrument(info_span!("extract"))
            .await?;
        progress.report(ProgressEvent::Stage {
            stage: JobStage::Segmenting,
            message: "Segmenting questions...".to_string(),
        });

        // Step 2: Segment and store questions
        let segmentation = {
            let _step = info_span!("segment").entered();
            self.step_segment(&mut ctx)?
        };
        progress.report(ProgressEvent::Stage {
            stage: JobStage::Tagging,
            message: "Identifying concepts...".to_string(),
        });

        // Step 3: Tag concepts
        let tagging = self.step_tag(&ctx).instrument(info_span!("tag")).await?;
        progress.report(ProgressEvent::Stage {
            stage: JobStage::Indexing,
            message: "Updating search excerpt...".to_string(),
        });

        // Step 4: RAG excerpt
        let index = {
            let _step = info_span!("index").entered();
            self.rag.update(&ctx.input.resource_id, &ctx.text)?
        };

        Ok(PipelineResult::compose(extraction, segmentation, tagging, index))
    }

    async fn step_extract(
        &self,
        ctx: &mut PipelineContext,
        progress: &dyn ProgressReporter,
    ) -> Result<ExtractionResult, PipelineError> {
        let content = self
            .extractor
            .extract(&ctx.input.location, ctx.input.file_type.as_deref())
            .await?;

        if content.method == ExtractionMethod::OcrTimeout {
            progress.report(ProgressEvent::Warning {
                message: "OCR timed out, continuing with placeholder text".to_string(),
            });
        }

        debug!(
            method = ?content.method,
            pages = content.page_count,
            chars = content.text.chars().count(),
            "Extracted text"
        );
        let result = ExtractionResult::from_content(&content);
        ctx.text = content.text;
        Ok(result)
    }

    fn step_segment(&self, ctx: &mut PipelineContext) -> Result<SegmentationResult, PipelineError> {
        let questions = segmenter::segment(&ctx.text);

        let rows: Vec<NewQuestion> = questions
            .iter()
            .enumerate()
            .map(|(i, q)| NewQuestion {
                question_text: q.text.clone(),
                question_number: Some(q.number.clone()),
                marks: Some(q.marks),
                difficulty: q.difficulty.as_str().to_string(),
                ai_analysis: None,
                position: i as i64,
            })
            .collect();

        let stored = question_repo::insert_batch(
            &self.db,
            &ctx.input.resource_id,
            &ctx.input.job_id,
            &format_timestamp(Utc::now()),
            &rows,
        )?;
        debug!(questions = stored, "Stored extracted questions");

        let result = SegmentationResult {
            questions_extracted: stored,
            question_numbers: questions.iter().map(|q| q.number.clone()).collect(),
        };
        ctx.questions = questions;
        Ok(result)
    }

    async fn step_tag(&self, ctx: &PipelineContext) -> Result<TaggingResult, PipelineError> {
        // Without questions the whole text stands in as a single input.
        let texts: Vec<String> = if ctx.questions.is_empty() {
            vec![ctx.text.clone()]
        } else {
            ctx.questions.iter().map(|q| q.text.clone()).collect()
        };
        Ok(self.tagger.tag(&texts).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::resource_repo::{self, ResourceRow};
    use crate::error::ExtractionError;
    use crate::pipeline::progress::testing::RecordingProgress;
    use crate::pipeline::progress::NoopProgress;
    use crate::pipeline::PipelineInput;
    use crate::processor::ExtractedContent;
    use crate::tagger::FALLBACK_CONCEPT;
    use async_trait::async_trait;

    struct FixedText(Result<ExtractedContent, String>);

    impl FixedText {
        fn text(text: &str, method: ExtractionMethod) -> Self {
            Self(Ok(ExtractedContent {
                text: text.to_string(),
                tables: Vec::new(),
                form_fields: Vec::new(),
                method,
                page_count: 1,
            }))
        }

        fn missing() -> Self {
            Self(Err("/nope.pdf".to_string()))
        }
    }

    #[async_trait]
    impl TextExtractor for FixedText {
        async fn extract(
            &self,
            _location: &str,
            _type_hint: Option<&str>,
        ) -> Result<ExtractedContent, ExtractionError> {
            self.0.clone().map_err(ExtractionError::FileNotFound)
        }
    }

    fn setup(extractor: FixedText) -> (Database, Pipeline) {
        let db = Database::open_in_memory().unwrap();
        resource_repo::insert(&db, &ResourceRow::new("res-1", "Calculus past paper")).unwrap();
        let pipeline = Pipeline::new(
            db.clone(),
            Arc::new(extractor),
            ConceptTagger::new(db.clone()),
            RagIndexer::new(db.clone(), 2000),
        );
        (db, pipeline)
    }

    fn ctx() -> PipelineContext {
        PipelineContext::new(PipelineInput {
            job_id: "job-1".to_string(),
            resource_id: "res-1".to_string(),
            location: "/tmp/paper.pdf".to_string(),
            file_type: Some("pdf".to_string()),
        })
    }

    #[tokio::test]
    async fn test_full_run_stores_questions_and_excerpt() {
        let text = "1. Differentiate x^2 with respect to x\n2. Integrate the derivative of sin x\n";
        let (db, pipeline) = setup(FixedText::text(text, ExtractionMethod::PdfText));
        let progress = RecordingProgress::default();

        let result = pipeline.run(ctx(), &progress).await.unwrap();

        assert_eq!(result.questions_extracted, 2);
        assert!(result.rag_indexed);
        assert!(result.tagging.concepts.contains(&"Mathematics".to_string()));
        assert_eq!(
            progress.stages(),
            vec![JobStage::Segmenting, JobStage::Tagging, JobStage::Indexing]
        );

        let stored = question_repo::list_for_resource(&db, "res-1").unwrap();
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[0].question_number.as_deref(), Some("1"));
        assert_eq!(stored[0].difficulty, "MEDIUM");

        let resource = resource_repo::find_by_id(&db, "res-1").unwrap().unwrap();
        assert_eq!(resource.rag_content.as_deref(), Some(text));
    }

    #[tokio::test]
    async fn test_empty_text_yields_no_questions_and_fallback_concept() {
        let (db, pipeline) = setup(FixedText::text("", ExtractionMethod::PdfText));

        let result = pipeline.run(ctx(), &NoopProgress).await.unwrap();

        assert_eq!(result.questions_extracted, 0);
        assert_eq!(result.tagging.concepts, vec![FALLBACK_CONCEPT.to_string()]);
        assert_eq!(question_repo::count_for_job(&db, "job-1").unwrap(), 0);
    }

    #[tokio::test]
    async fn test_ocr_timeout_is_a_warning() {
        let (_db, pipeline) = setup(FixedText::text(
            crate::processor::OCR_TIMEOUT_PLACEHOLDER,
            ExtractionMethod::OcrTimeout,
        ));
        let progress = RecordingProgress::default();

        let result = pipeline.run(ctx(), &progress).await.unwrap();

        assert_eq!(progress.warnings(), 1);
        assert_eq!(result.extraction.method, ExtractionMethod::OcrTimeout);
        assert!(result.rag_indexed);
    }

    #[tokio::test]
    async fn test_extraction_error_stops_before_segmentation() {
        let (db, pipeline) = setup(FixedText::missing());
        let progress = RecordingProgress::default();

        let err = pipeline.run(ctx(), &progress).await.unwrap_err();

        assert!(matches!(err, PipelineError::Extraction(ExtractionError::FileNotFound(_))));
        assert!(progress.stages().is_empty());
        assert_eq!(question_repo::count_for_job(&db, "job-1").unwrap(), 0);
        let resource = resource_repo::find_by_id(&db, "res-1").unwrap().unwrap();
        assert!(resource.rag_content.is_none());
    }
}
