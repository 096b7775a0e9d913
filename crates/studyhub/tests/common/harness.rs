//! Test harness for isolated end-to-end job execution.
//!
//! The `TestHarness` owns a temp directory for input documents, an
//! in-memory database and an `Orchestrator` whose pipeline uses the real
//! extraction service with an injectable OCR engine.

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use studyhub::db::resource_repo::{self, ResourceRow};
use studyhub::db::Database;
use studyhub::jobs::{Job, JobStore, Orchestrator, SubmitOutcome, SubmitRequest};
use studyhub::processor::ocr::OcrEngine;
use studyhub::processor::source::SourceFetcher;
use studyhub::{ConceptTagger, ExtractionService, Pipeline, RagIndexer};

pub const RAG_EXCERPT_CHARS: usize = 2000;

pub struct TestHarness {
    temp_dir: TempDir,
    pub db: Database,
    pub orchestrator: Orchestrator,
}

impl TestHarness {
    /// Harness without OCR.
    pub fn new() -> Self {
        Self::with_ocr(None, Duration::from_secs(30))
    }

    pub fn with_ocr(ocr: Option<Arc<dyn OcrEngine>>, ocr_timeout: Duration) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let db = Database::open_in_memory().expect("Failed to open database");

        let extractor = ExtractionService::new(
            SourceFetcher::new(Duration::from_secs(2)),
            None,
            ocr,
            Duration::from_secs(10),
            ocr_timeout,
        );
        let pipeline = Pipeline::new(
            db.clone(),
            Arc::new(extractor),
            ConceptTagger::new(db.clone()),
            RagIndexer::new(db.clone(), RAG_EXCERPT_CHARS),
        );
        let store = Arc::new(JobStore::new(db.clone(), 256));
        let orchestrator = Orchestrator::new(store, Arc::new(pipeline), true);

        Self {
            temp_dir,
            db,
            orchestrator,
        }
    }

    /// Writes an input document into the temp directory.
    pub fn write_input(&self, filename: &str, content: &[u8]) -> PathBuf {
        let path = self.temp_dir.path().join(filename);
        std::fs::write(&path, content).expect("Failed to write input file");
        path
    }

    /// Registers a resource pointing at `location`.
    pub fn add_resource(&self, id: &str, location: &str, file_type: Option<&str>) {
        let mut row = ResourceRow::new(id, format!("Resource {}", id));
        if location.starts_with("http://") || location.starts_with("https://") {
            row.file_url = Some(location.to_string());
        } else {
            row.file_path = Some(location.to_string());
        }
        row.file_type = file_type.map(str::to_string);
        resource_repo::insert(&self.db, &row).expect("Failed to insert resource");
    }

    /// Submits a job and returns its id.
    pub fn submit(&self, resource_id: &str) -> String {
        match self
            .orchestrator
            .submit(SubmitRequest::for_resource(resource_id))
            .expect("Submit failed")
        {
            SubmitOutcome::Accepted { job_id, .. } => job_id,
            other => panic!("Expected Accepted, got {:?}", other),
        }
    }

    /// Waits for the job to reach COMPLETED or FAILED.
    pub async fn wait(&self, job_id: &str) -> Job {
        self.orchestrator
            .wait_for_terminal(job_id, Duration::from_millis(20), Duration::from_secs(30))
            .await
            .expect("Job did not finish")
    }

    pub fn resource(&self, id: &str) -> ResourceRow {
        resource_repo::find_by_id(&self.db, id)
            .expect("Failed to read resource")
            .expect("Resource missing")
    }
}
