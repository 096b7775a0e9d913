use std::sync::Arc;

use tracing::{info, warn};

use crate::jobs::{JobStage, JobStore};

/// Events emitted by the pipeline while it runs. Completion and failure
/// are recorded by whoever drives the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    Stage { stage: JobStage, message: String },
    /// The job carries on with degraded output.
    Warning { message: String },
}

pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: ProgressEvent);
}

/// No-op reporter for unit tests.
pub struct NoopProgress;

impl ProgressReporter for NoopProgress {
    fn report(&self, _event: ProgressEvent) {}
}

/// Persists stage checkpoints through the [`JobStore`], which also
/// broadcasts them to subscribers.
pub struct StoreProgress {
    store: Arc<JobStore>,
    job_id: String,
}

impl StoreProgress {
    pub fn new(store: Arc<JobStore>, job_id: &str) -> Self {
        Self {
            store,
            job_id: job_id.to_string(),
        }
    }
}

impl ProgressReporter for StoreProgress {
    fn report(&self, event: ProgressEvent) {
        match event {
            ProgressEvent::Stage { stage, message } => {
                info!(job_id = %self.job_id, stage = %stage, "{}", message);
                if let Err(e) = self.store.advance(&self.job_id, stage) {
                    warn!(job_id = %self.job_id, stage = %stage, "Failed to record progress: {}", e);
                }
            }
            ProgressEvent::Warning { message } => {
                warn!(job_id = %self.job_id, "{}", message);
            }
        }
    }
}
