//! End-to-end job scenarios: submit a resource, let the spawned pipeline
//! run, then check the persisted job, questions, concepts and excerpt.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{pdf_with_pages, FixedOcr, SlowOcr, TestHarness, FAKE_PNG, RAG_EXCERPT_CHARS};
use studyhub::db::{concept_repo, question_repo};
use studyhub::jobs::{JobStage, JobStatus, SubmitOutcome, SubmitRequest};
use studyhub::processor::{ExtractionMethod, OCR_TIMEOUT_PLACEHOLDER};
use studyhub::tagger::ConceptTagger;

#[tokio::test]
async fn numbered_questions_in_a_pdf_become_question_rows() {
    let harness = TestHarness::new();
    let pdf = harness.write_input("paper.pdf", &pdf_with_pages(&["1) What is a stack?", "2) Define a queue."]));
    harness.add_resource("res-1", pdf.to_str().unwrap(), None);

    let job_id = harness.submit("res-1");
    let job = harness.wait(&job_id).await;

    assert_eq!(job.status, JobStatus::Completed, "error: {:?}", job.error);
    assert_eq!(job.progress, 100);
    let result = job.result.expect("completed job has results");
    assert_eq!(result.questions_extracted, 2);
    assert!(result.rag_indexed);

    let questions = question_repo::list_for_resource(&harness.db, "res-1").unwrap();
    let pairs: Vec<(Option<&str>, &str)> = questions
        .iter()
        .map(|q| (q.question_number.as_deref(), q.question_text.as_str()))
        .collect();
    assert_eq!(
        pairs,
        vec![(Some("1"), "What is a stack?"), (Some("2"), "Define a queue.")]
    );
    assert!(questions.iter().all(|q| q.difficulty == "MEDIUM"));

    let resource = harness.resource("res-1");
    assert_eq!(resource.ai_processing_status.as_deref(), Some("COMPLETED"));
    assert!(resource.rag_content.unwrap().contains("What is a stack?"));
}

#[tokio::test]
async fn unnumbered_text_keeps_only_long_lines() {
    let harness = TestHarness::new();
    let pdf = harness.write_input(
        "notes.pdf",
        &pdf_with_pages(&["Explain recursion and give an example with at least one base case.", "ok"]),
    );
    harness.add_resource("res-1", pdf.to_str().unwrap(), Some("application/pdf"));

    let job = harness.wait(&harness.submit("res-1")).await;

    assert_eq!(job.status, JobStatus::Completed, "error: {:?}", job.error);
    let questions = question_repo::list_for_resource(&harness.db, "res-1").unwrap();
    assert_eq!(questions.len(), 1);
    assert_eq!(
        questions[0].question_text,
        "Explain recursion and give an example with at least one base case."
    );
}

#[tokio::test]
async fn unreachable_url_fails_the_job() {
    let harness = TestHarness::new();
    harness.add_resource("res-1", "http://127.0.0.1:9/x.pdf", None);

    let job = harness.wait(&harness.submit("res-1")).await;

    assert_eq!(job.status, JobStatus::Failed);
    assert_ne!(job.progress, 100);
    assert!(job.result.is_none());
    let error = job.error.expect("failed job has an error");
    assert!(error.contains("Failed to download"), "unexpected error: {}", error);

    assert_eq!(question_repo::count_for_job(&harness.db, &job.id).unwrap(), 0);
    assert_eq!(
        harness.resource("res-1").ai_processing_status.as_deref(),
        Some("FAILED")
    );
}

#[tokio::test]
async fn missing_local_file_fails_the_job() {
    let harness = TestHarness::new();
    harness.add_resource("res-1", "/definitely/not/here.pdf", None);

    let job = harness.wait(&harness.submit("res-1")).await;

    assert_eq!(job.status, JobStatus::Failed);
    assert!(job.error.unwrap().contains("File not found"));
}

#[tokio::test]
async fn ocr_timeout_completes_with_placeholder_text() {
    let harness = TestHarness::with_ocr(
        Some(Arc::new(SlowOcr(Duration::from_secs(3)))),
        Duration::from_millis(100),
    );
    let image = harness.write_input("scan.png", FAKE_PNG);
    harness.add_resource("res-1", image.to_str().unwrap(), None);

    let job = harness.wait(&harness.submit("res-1")).await;

    assert_eq!(job.status, JobStatus::Completed, "error: {:?}", job.error);
    assert_eq!(job.progress, 100);
    let result = job.result.unwrap();
    assert_eq!(result.extraction.method, ExtractionMethod::OcrTimeout);
    assert_eq!(
        harness.resource("res-1").rag_content.as_deref(),
        Some(OCR_TIMEOUT_PLACEHOLDER)
    );
}

#[tokio::test]
async fn image_ocr_text_is_segmented() {
    let harness = TestHarness::with_ocr(
        Some(Arc::new(FixedOcr("Q1. Name the enzyme that unwinds DNA"))),
        Duration::from_secs(10),
    );
    let image = harness.write_input("scan.jpg", FAKE_PNG);
    harness.add_resource("res-1", image.to_str().unwrap(), Some("image/jpeg"));

    let job = harness.wait(&harness.submit("res-1")).await;

    assert_eq!(job.status, JobStatus::Completed, "error: {:?}", job.error);
    let result = job.result.unwrap();
    assert_eq!(result.extraction.method, ExtractionMethod::ImageOcr);
    assert_eq!(result.questions_extracted, 1);
    assert!(result.tagging.concepts.contains(&"Biology".to_string()));
}

#[tokio::test]
async fn image_without_ocr_fails() {
    let harness = TestHarness::new();
    let image = harness.write_input("scan.png", FAKE_PNG);
    harness.add_resource("res-1", image.to_str().unwrap(), None);

    let job = harness.wait(&harness.submit("res-1")).await;

    assert_eq!(job.status, JobStatus::Failed);
    assert!(job.error.unwrap().contains("OCR is disabled"));
}

#[tokio::test]
async fn unsupported_type_fails() {
    let harness = TestHarness::new();
    let doc = harness.write_input("essay.docx", b"PK");
    harness.add_resource("res-1", doc.to_str().unwrap(), None);

    let job = harness.wait(&harness.submit("res-1")).await;

    assert_eq!(job.status, JobStatus::Failed);
    assert!(job.error.unwrap().contains("Unsupported file type"));
}

#[tokio::test]
async fn concept_lookup_or_create_is_idempotent() {
    let harness = TestHarness::new();
    let tagger = ConceptTagger::new(harness.db.clone());

    let (first, created_first) = tagger.find_or_create("Graph Theory").unwrap();
    let (second, created_second) = tagger.find_or_create("Graph Theory").unwrap();

    assert!(created_first);
    assert!(!created_second);
    assert_eq!(first.id, second.id);
    assert_eq!(concept_repo::count(&harness.db).unwrap(), 1);
}

#[tokio::test]
async fn repeated_jobs_reuse_concepts() {
    let harness = TestHarness::new();
    let pdf = harness.write_input("paper.pdf", &pdf_with_pages(&["1. Solve the quadratic equation"]));
    harness.add_resource("res-1", pdf.to_str().unwrap(), None);

    let first = harness.wait(&harness.submit("res-1")).await;
    let second = harness.wait(&harness.submit("res-1")).await;

    assert_eq!(first.result.unwrap().tagging.created, 1);
    assert_eq!(second.result.unwrap().tagging.created, 0);
    assert_eq!(concept_repo::count(&harness.db).unwrap(), 1);
}

#[tokio::test]
async fn rag_excerpt_is_capped() {
    let harness = TestHarness::new();
    let long_line = "Describe the algorithm in detail ".repeat(20);
    let pages: Vec<&str> = std::iter::repeat(long_line.as_str()).take(10).collect();
    let pdf = harness.write_input("long.pdf", &pdf_with_pages(&pages));
    harness.add_resource("res-1", pdf.to_str().unwrap(), None);

    let job = harness.wait(&harness.submit("res-1")).await;

    assert_eq!(job.status, JobStatus::Completed, "error: {:?}", job.error);
    let result = job.result.unwrap();
    assert!(result.extraction.text_chars > RAG_EXCERPT_CHARS);
    assert!(result.index.truncated);
    let excerpt = harness.resource("res-1").rag_content.unwrap();
    assert_eq!(excerpt.chars().count(), RAG_EXCERPT_CHARS);
}

#[tokio::test]
async fn progress_is_monotonic_and_terminal_is_final() {
    let harness = TestHarness::new();
    let pdf = harness.write_input("paper.pdf", &pdf_with_pages(&["Q1. State Newton's second law"]));
    harness.add_resource("res-1", pdf.to_str().unwrap(), None);
    let mut events = harness.orchestrator.subscribe();

    let job_id = harness.submit("res-1");
    let job = harness.wait(&job_id).await;

    let mut observed = Vec::new();
    while let Ok(event) = events.try_recv() {
        if event.job_id == job_id {
            observed.push(event);
        }
    }

    assert!(observed.windows(2).all(|w| w[0].progress <= w[1].progress));
    let last = observed.last().expect("events were published");
    assert_eq!(last.status, JobStatus::Completed);
    assert_eq!(last.progress, 100);
    assert_eq!(last.stage, JobStage::Finished);
    assert!(observed[..observed.len() - 1]
        .iter()
        .all(|e| e.progress < 100 && !e.status.is_terminal()));

    // A terminal job cannot be changed.
    let store = harness.orchestrator.store();
    assert!(store.fail(&job_id, "late failure").is_err());
    assert!(store.set_progress(&job_id, 50).is_err());
    assert_eq!(store.get(&job_id).unwrap().unwrap(), job);
}

#[tokio::test]
async fn disabled_analysis_and_dedupe() {
    let harness = TestHarness::with_ocr(
        Some(Arc::new(SlowOcr(Duration::from_millis(300)))),
        Duration::from_secs(10),
    );
    let image = harness.write_input("scan.png", FAKE_PNG);
    harness.add_resource("res-1", image.to_str().unwrap(), None);

    let mut disabled = SubmitRequest::for_resource("res-1");
    disabled.enable_analysis = false;
    assert_eq!(
        harness.orchestrator.submit(disabled).unwrap(),
        SubmitOutcome::AnalysisDisabled
    );

    let job_id = harness.submit("res-1");
    let again = harness
        .orchestrator
        .submit(SubmitRequest::for_resource("res-1"))
        .unwrap();
    assert_eq!(again.job_id(), Some(job_id.as_str()));
    assert!(matches!(again, SubmitOutcome::AlreadyRunning { .. }));

    harness.wait(&job_id).await;
    assert_eq!(harness.orchestrator.list_jobs_for_resource("res-1").unwrap().len(), 1);
}

#[tokio::test]
async fn status_view_includes_resource() {
    let harness = TestHarness::new();
    let pdf = harness.write_input("paper.pdf", &pdf_with_pages(&["1. Define inflation"]));
    harness.add_resource("res-1", pdf.to_str().unwrap(), None);

    let job_id = harness.submit("res-1");
    harness.wait(&job_id).await;

    let view = harness.orchestrator.get_status(&job_id).unwrap().unwrap();
    let json = serde_json::to_value(&view).unwrap();
    assert_eq!(json["status"], "COMPLETED");
    assert_eq!(json["progress"], 100);
    assert_eq!(json["resource"]["title"], "Resource res-1");
    assert_eq!(json["result"]["questionsExtracted"], 1);
    assert!(json.get("error").is_none());
}
