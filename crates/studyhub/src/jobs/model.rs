use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::db::job_repo::JobRow;
use crate::db::resource_repo::ResourceRow;
use crate::db::{format_timestamp, parse_timestamp, timestamp_now};
use crate::pipeline::PipelineResult;

use super::store::JobStoreError;

/// Job lifecycle. Serialized and stored upper case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub const ACTIVE: [JobStatus; 2] = [JobStatus::Pending, JobStatus::Processing];
    pub const TERMINAL: [JobStatus; 2] = [JobStatus::Completed, JobStatus::Failed];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Processing => "PROCESSING",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// PENDING → PROCESSING → {COMPLETED | FAILED}.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Processing)
                | (Self::Processing, Self::Completed)
                | (Self::Processing, Self::Failed)
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    /// Accepts any casing: `pending`, `Processing`, `COMPLETED`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "PENDING" => Ok(Self::Pending),
            "PROCESSING" => Ok(Self::Processing),
            "COMPLETED" => Ok(Self::Completed),
            "FAILED" => Ok(Self::Failed),
            other => Err(format!("unknown job status '{}'", other)),
        }
    }
}

/// Pipeline stage a job is in, with the progress checkpoint reached on
/// entering it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStage {
    Queued,
    Extracting,
    Segmenting,
    Tagging,
    Indexing,
    Finished,
}

impl JobStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Extracting => "extracting",
            Self::Segmenting => "segmenting",
            Self::Tagging => "tagging",
            Self::Indexing => "indexing",
            Self::Finished => "finished",
        }
    }

    pub fn checkpoint(&self) -> u8 {
        match self {
            Self::Queued => 0,
            Self::Extracting => 10,
            Self::Segmenting => 40,
            Self::Tagging => 60,
            Self::Indexing => 80,
            Self::Finished => 100,
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "queued" => Some(Self::Queued),
            "extracting" => Some(Self::Extracting),
            "segmenting" => Some(Self::Segmenting),
            "tagging" => Some(Self::Tagging),
            "indexing" => Some(Self::Indexing),
            "finished" => Some(Self::Finished),
            _ => None,
        }
    }
}

impl fmt::Display for JobStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A decoded `analysis_jobs` row.
#[derive(Debug, Clone, PartialEq)]
pub struct Job {
    pub id: String,
    pub resource_id: String,
    pub status: JobStatus,
    pub progress: u8,
    pub stage: JobStage,
    pub result: Option<PipelineResult>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    pub fn new_pending(resource_id: &str) -> Self {
        let now = timestamp_now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            resource_id: resource_id.to_string(),
            status: JobStatus::Pending,
            progress: 0,
            stage: JobStage::Queued,
            result: None,
            error: None,
            created_at: now,
            started_at: None,
            completed_at: None,
            updated_at: now,
        }
    }

    pub fn from_row(row: &JobRow) -> Result<Self, JobStoreError> {
        let status = row
            .status
            .parse::<JobStatus>()
            .map_err(|reason| JobStoreError::Corrupt {
                job_id: row.id.clone(),
                reason,
            })?;
        let stage = match row.current_stage.as_deref() {
            None => JobStage::Queued,
            Some(s) => JobStage::parse(s).unwrap_or_else(|| {
                log::warn!("Unknown stage '{}' for job {}, treating as queued", s, row.id);
                JobStage::Queued
            }),
        };
        let result = match row.results.as_deref() {
            Some(json) => Some(serde_json::from_str(json).map_err(|e| JobStoreError::Corrupt {
                job_id: row.id.clone(),
                reason: format!("results: {}", e),
            })?),
            None => None,
        };
        let created_at = parse_timestamp(&row.created_at).unwrap_or_else(Utc::now);

        Ok(Self {
            id: row.id.clone(),
            resource_id: row.resource_id.clone(),
            status,
            progress: row.progress.min(100),
            stage,
            result,
            error: row.error_message.clone(),
            created_at,
            started_at: row.started_at.as_deref().and_then(parse_timestamp),
            completed_at: row.completed_at.as_deref().and_then(parse_timestamp),
            updated_at: parse_timestamp(&row.updated_at).unwrap_or(created_at),
        })
    }

    pub fn to_row(&self) -> Result<JobRow, JobStoreError> {
        let results = self
            .result
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| JobStoreError::Corrupt {
                job_id: self.id.clone(),
                reason: format!("results: {}", e),
            })?;

        Ok(JobRow {
            id: self.id.clone(),
            resource_id: self.resource_id.clone(),
            status: self.status.as_str().to_string(),
            progress: self.progress,
            current_stage: Some(self.stage.as_str().to_string()),
            results,
            error_message: self.error.clone(),
            created_at: format_timestamp(self.created_at),
            started_at: self.started_at.map(format_timestamp),
            completed_at: self.completed_at.map(format_timestamp),
            updated_at: format_timestamp(self.updated_at),
        })
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceSummary {
    pub id: String,
    pub title: String,
    pub course_title: Option<String>,
    pub uploader: Option<String>,
}

impl From<&ResourceRow> for ResourceSummary {
    fn from(row: &ResourceRow) -> Self {
        Self {
            id: row.id.clone(),
            title: row.title.clone(),
            course_title: row.course_title.clone(),
            uploader: row.uploader.clone(),
        }
    }
}

/// What a status poll returns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobView {
    pub id: String,
    pub resource_id: String,
    pub status: JobStatus,
    pub progress: u8,
    pub stage: JobStage,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<PipelineResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource: Option<ResourceSummary>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl JobView {
    pub fn new(job: Job, resource: Option<ResourceSummary>) -> Self {
        Self {
            id: job.id,
            resource_id: job.resource_id,
            status: job.status,
            progress: job.progress,
            stage: job.stage,
            result: job.result,
            error: job.error,
            resource,
            created_at: job.created_at,
            started_at: job.started_at,
            completed_at: job.completed_at,
        }
    }
}
