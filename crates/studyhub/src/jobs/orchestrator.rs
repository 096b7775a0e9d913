//! Accepts analysis requests and runs each one as a spawned tokio task.
//!
//! Submitting never waits for the pipeline. Failures are recorded on the job
//! row and never returned to the submitter.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::db::resource_repo;
use crate::db::{Database, DatabaseError};
use crate::pipeline::{Pipeline, PipelineContext, PipelineError, PipelineInput, StoreProgress};

use super::model::{Job, JobStatus, JobView, ResourceSummary};
use super::progress::JobProgressEvent;
use super::store::{CreateOutcome, JobStore, JobStoreError};

/// Resource `ai_processing_status` after a successful run.
pub const RESOURCE_STATUS_COMPLETED: &str = "COMPLETED";
/// Resource `ai_processing_status` after a failed run.
pub const RESOURCE_STATUS_FAILED: &str = "FAILED";

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("Resource '{0}' not found")]
    ResourceNotFound(String),

    #[error(transparent)]
    Store(#[from] JobStoreError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Job '{job_id}' did not finish within {after:?}")]
    WaitTimeout { job_id: String, after: Duration },
}

#[derive(Debug, Clone, PartialEq)]
pub struct SubmitRequest {
    pub resource_id: String,
    /// Overrides the resource's stored path or URL.
    pub file_path: Option<String>,
    pub file_type: Option<String>,
    pub enable_analysis: bool,
}

impl SubmitRequest {
    pub fn for_resource(resource_id: &str) -> Self {
        Self {
            resource_id: resource_id.to_string(),
            file_path: None,
            file_type: None,
            enable_analysis: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome {
    /// Analysis was switched off for this upload. Nothing was created.
    AnalysisDisabled,
    Accepted {
        job_id: String,
        status: JobStatus,
        progress: u8,
    },
    /// The resource already has a job in flight.
    AlreadyRunning {
        job_id: String,
        status: JobStatus,
        progress: u8,
    },
}

impl SubmitOutcome {
    pub fn job_id(&self) -> Option<&str> {
        match self {
            Self::AnalysisDisabled => None,
            Self::Accepted { job_id, .. } | Self::AlreadyRunning { job_id, .. } => Some(job_id),
        }
    }
}

pub struct Orchestrator {
    store: Arc<JobStore>,
    pipeline: Arc<Pipeline>,
    dedupe_active: bool,
}

impl Orchestrator {
    pub fn new(store: Arc<JobStore>, pipeline: Arc<Pipeline>, dedupe_active: bool) -> Self {
        Self {
            store,
            pipeline,
            dedupe_active,
        }
    }

    pub fn from_config(db: Database, config: &Config) -> Self {
        let ai = crate::ai::service_from_config(&config.ai).map(Arc::new);
        let pipeline = Pipeline::from_config(db.clone(), config, ai);
        let store = JobStore::new(db, config.jobs.event_capacity);
        Self::new(Arc::new(store), Arc::new(pipeline), config.jobs.dedupe_active)
    }

    pub fn store(&self) -> &Arc<JobStore> {
        &self.store
    }

    /// Creates a PENDING job and spawns its pipeline. Must be called from
    /// within a tokio runtime.
    pub fn submit(&self, request: SubmitRequest) -> Result<SubmitOutcome, OrchestratorError> {
        if !request.enable_analysis {
            debug!(resource_id = %request.resource_id, "Analysis disabled, no job created");
            return Ok(SubmitOutcome::AnalysisDisabled);
        }

        let resource = resource_repo::find_by_id(self.store.database(), &request.resource_id)?
            .ok_or_else(|| OrchestratorError::ResourceNotFound(request.resource_id.clone()))?;

        let location = non_empty(request.file_path)
            .or_else(|| resource.source_location().map(str::to_string));
        let file_type = non_empty(request.file_type).or_else(|| resource.file_type.clone());

        let job = if self.dedupe_active {
            match self.store.create_unless_active(&resource.id)? {
                CreateOutcome::Created(job) => job,
                CreateOutcome::Active(active) => {
                    info!(job_id = %active.id, resource_id = %resource.id, "Resource already has an active job");
                    return Ok(SubmitOutcome::AlreadyRunning {
                        job_id: active.id,
                        status: active.status,
                        progress: active.progress,
                    });
                }
            }
        } else {
            self.store.create(&resource.id)?
        };
        let outcome = SubmitOutcome::Accepted {
            job_id: job.id.clone(),
            status: job.status,
            progress: job.progress,
        };

        let store = Arc::clone(&self.store);
        let pipeline = Arc::clone(&self.pipeline);
        tokio::spawn(run_job(store, pipeline, job, location, file_type));

        Ok(outcome)
    }

    /// The persisted job with its resource, or `None` for an unknown id.
    pub fn get_status(&self, job_id: &str) -> Result<Option<JobView>, OrchestratorError> {
        let Some(job) = self.store.get(job_id)? else {
            return Ok(None);
        };
        let resource = match resource_repo::find_by_id(self.store.database(), &job.resource_id) {
            Ok(row) => row.as_ref().map(ResourceSummary::from),
            Err(e) => {
                warn!(job_id, "Failed to load resource for job view: {}", e);
                None
            }
        };
        Ok(Some(JobView::new(job, resource)))
    }

    pub fn list_jobs_for_resource(&self, resource_id: &str) -> Result<Vec<JobView>, OrchestratorError> {
        let resource = resource_repo::find_by_id(self.store.database(), resource_id)?
            .as_ref()
            .map(ResourceSummary::from);
        Ok(self
            .store
            .list_for_resource(resource_id)?
            .into_iter()
            .map(|job| JobView::new(job, resource.clone()))
            .collect())
    }

    /// Polls until the job is COMPLETED or FAILED.
    pub async fn wait_for_terminal(
        &self,
        job_id: &str,
        poll: Duration,
        timeout: Duration,
    ) -> Result<Job, OrchestratorError> {
        match tokio::time::timeout(timeout, self.poll_until_terminal(job_id, poll)).await {
            Ok(result) => result,
            Err(_) => Err(OrchestratorError::WaitTimeout {
                job_id: job_id.to_string(),
                after: timeout,
            }),
        }
    }

    async fn poll_until_terminal(&self, job_id: &str, poll: Duration) -> Result<Job, OrchestratorError> {
        loop {
            match self.store.get(job_id)? {
                Some(job) if job.is_terminal() => return Ok(job),
                Some(_) => tokio::time::sleep(poll).await,
                None => return Err(JobStoreError::NotFound(job_id.to_string()).into()),
            }
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobProgressEvent> {
        self.store.subscribe()
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

async fn run_job(
    store: Arc<JobStore>,
    pipeline: Arc<Pipeline>,
    job: Job,
    location: Option<String>,
    file_type: Option<String>,
) {
    let job_id = job.id;
    let resource_id = job.resource_id;

    if let Err(e) = store.start(&job_id) {
        warn!(job_id = %job_id, "Job could not be started: {}", e);
        return;
    }

    let outcome = match location {
        Some(location) => {
            let input = PipelineInput {
                job_id: job_id.clone(),
                resource_id: resource_id.clone(),
                location,
                file_type,
            };
            run_pipeline(Arc::clone(&store), pipeline, input).await
        }
        None => Err(PipelineError::NoSource(resource_id.clone()).to_string()),
    };

    let (recorded, resource_status) = match outcome {
        Ok(result) => {
            info!(
                job_id = %job_id,
                questions = result.questions_extracted,
                concepts = result.concepts_identified,
                "Analysis completed"
            );
            (store.complete(&job_id, result), RESOURCE_STATUS_COMPLETED)
        }
        Err(message) => {
            error!(job_id = %job_id, "Analysis failed: {}", message);
            (store.fail(&job_id, &message), RESOURCE_STATUS_FAILED)
        }
    };

    if let Err(e) = recorded {
        error!(job_id = %job_id, "Failed to record job outcome: {}", e);
        return;
    }

    match resource_repo::set_ai_processing_status(store.database(), &resource_id, resource_status) {
        Ok(true) => {}
        Ok(false) => warn!(resource_id = %resource_id, "Resource vanished before its status was updated"),
        Err(e) => warn!(resource_id = %resource_id, "Failed to update resource status: {}", e),
    }
}

/// Runs the pipeline in its own task so a panic fails the job instead of
/// leaving it PROCESSING.
async fn run_pipeline(
    store: Arc<JobStore>,
    pipeline: Arc<Pipeline>,
    input: PipelineInput,
) -> Result<crate::pipeline::PipelineResult, String> {
    let progress = StoreProgress::new(store, &input.job_id);
    let handle = tokio::spawn(async move {
        pipeline
            .run(PipelineContext::new(input), &progress)
            .await
            .map_err(|e| e.to_string())
    });
    match handle.await {
        Ok(result) => result,
        Err(join_error) => Err(format!("Pipeline task aborted: {}", join_error)),
    }
}
