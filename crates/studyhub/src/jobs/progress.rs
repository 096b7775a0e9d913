//! Live job updates over a `tokio::sync::broadcast` channel.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use super::model::{Job, JobStage, JobStatus};

/// Snapshot of a job right after a persisted change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobProgressEvent {
    pub job_id: String,
    pub resource_id: String,
    pub status: JobStatus,
    pub stage: JobStage,
    pub progress: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl JobProgressEvent {
    pub fn from_job(job: &Job) -> Self {
        Self {
            job_id: job.id.clone(),
            resource_id: job.resource_id.clone(),
            status: job.status,
            stage: job.stage,
            progress: job.progress,
            error: job.error.clone(),
            timestamp: job.updated_at,
        }
    }
}

#[derive(Clone)]
pub struct JobProgressBroadcaster {
    sender: Arc<broadcast::Sender<JobProgressEvent>>,
}

impl JobProgressBroadcaster {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn send(&self, event: JobProgressEvent) {
        // No receivers is fine.
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobProgressEvent> {
        self.sender.subscribe()
    }
}

impl Default for JobProgressBroadcaster {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_receive() {
        let broadcaster = JobProgressBroadcaster::new(10);
        let mut rx = broadcaster.subscribe();

        let job = Job::new_pending("res-1");
        broadcaster.send(JobProgressEvent::from_job(&job));

        let received = rx.try_recv().unwrap();
        assert_eq!(received.job_id, job.id);
        assert_eq!(received.status, JobStatus::Pending);
        assert_eq!(received.stage, JobStage::Queued);
        assert_eq!(received.progress, 0);
    }

    #[test]
    fn test_send_without_receivers() {
        let broadcaster = JobProgressBroadcaster::default();
        broadcaster.send(JobProgressEvent::from_job(&Job::new_pending("res-1")));
    }

    #[test]
    fn test_event_json_shape() {
        let mut job = Job::new_pending("res-1");
        job.status = JobStatus::Failed;
        job.error = Some("download failed".to_string());
        let json = serde_json::to_value(JobProgressEvent::from_job(&job)).unwrap();
        assert_eq!(json["status"], "FAILED");
        assert_eq!(json["stage"], "queued");
        assert_eq!(json["error"], "download failed");
        assert!(json.get("jobId").is_some());
    }
}
