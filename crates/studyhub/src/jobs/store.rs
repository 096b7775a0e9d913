//! Persistent job store.
//!
//! The `analysis_jobs` row is the source of truth. Every mutation reloads
//! the row, checks the lifecycle rules, writes it back and then refreshes the
//! in-memory cache and broadcasts the new state. The cache is only read when
//! the database cannot be.
//!
//! Rules enforced here:
//! - status moves PENDING → PROCESSING → {COMPLETED | FAILED}
//! - progress never decreases, and only a completed job reaches 100
//! - `error` is set exactly when the job is FAILED
//! - terminal jobs are never changed again

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, RwLock};

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::broadcast;

use crate::db::job_repo;
use crate::db::{format_timestamp, timestamp_now, Database, DatabaseError};
use crate::pipeline::PipelineResult;

use super::model::{Job, JobStage, JobStatus};
use super::progress::{JobProgressBroadcaster, JobProgressEvent};

/// Highest progress a job can report before it completes.
const MAX_IN_FLIGHT_PROGRESS: u8 = 99;

#[derive(Debug, Error)]
pub enum JobStoreError {
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Job '{0}' not found")]
    NotFound(String),

    #[error("Job '{job_id}' cannot move from {from} to {to}")]
    InvalidTransition {
        job_id: String,
        from: JobStatus,
        to: JobStatus,
    },

    #[error("Job '{job_id}' is already {status} and cannot be changed")]
    Terminal { job_id: String, status: JobStatus },

    #[error("Job '{job_id}' has an unreadable row: {reason}")]
    Corrupt { job_id: String, reason: String },
}

/// Result of [`JobStore::create_unless_active`].
#[derive(Debug, Clone)]
pub enum CreateOutcome {
    Created(Job),
    /// The resource already had this PENDING or PROCESSING job.
    Active(Job),
}

pub struct JobStore {
    db: Database,
    /// PENDING and PROCESSING jobs only. Terminal jobs are evicted.
    cache: RwLock<HashMap<String, Job>>,
    /// Serializes read-modify-write cycles on job rows.
    write_lock: Mutex<()>,
    events: JobProgressBroadcaster,
}

impl JobStore {
    pub fn new(db: Database, event_capacity: usize) -> Self {
        Self {
            db,
            cache: RwLock::new(HashMap::new()),
            write_lock: Mutex::new(()),
            events: JobProgressBroadcaster::new(event_capacity),
        }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobProgressEvent> {
        self.events.subscribe()
    }

    /// Persists a new PENDING job at progress 0.
    pub fn create(&self, resource_id: &str) -> Result<Job, JobStoreError> {
        let job = Job::new_pending(resource_id);
        job_repo::insert(&self.db, &job.to_row()?)?;
        log::info!("Created job {} for resource {}", job.id, resource_id);
        self.publish(&job);
        Ok(job)
    }

    /// Persists a new PENDING job unless the resource already has an active
    /// one. The lookup and the insert are a single step, so concurrent
    /// callers for one resource get exactly one new job between them.
    pub fn create_unless_active(&self, resource_id: &str) -> Result<CreateOutcome, JobStoreError> {
        let _guard = self.lock_writes();
        let job = Job::new_pending(resource_id);
        let statuses = status_strs(&JobStatus::ACTIVE);
        match job_repo::insert_unless_active(&self.db, &job.to_row()?, &statuses)? {
            Some(row) => Ok(CreateOutcome::Active(Job::from_row(&row)?)),
            None => {
                log::info!("Created job {} for resource {}", job.id, resource_id);
                self.publish(&job);
                Ok(CreateOutcome::Created(job))
            }
        }
    }

    /// Reads the persisted job. The cached copy of an active job is returned
    /// only when the database read itself fails.
    pub fn get(&self, job_id: &str) -> Result<Option<Job>, JobStoreError> {
        match job_repo::find_by_id(&self.db, job_id) {
            Ok(Some(row)) => {
                let job = Job::from_row(&row)?;
                self.cache_put(&job);
                Ok(Some(job))
            }
            Ok(None) => {
                self.cache_remove(job_id);
                Ok(None)
            }
            Err(e) => match self.cache_get(job_id) {
                Some(job) => {
                    log::warn!("Job {} read from cache after database error: {}", job_id, e);
                    Ok(Some(job))
                }
                None => Err(e.into()),
            },
        }
    }

    /// PENDING → PROCESSING, entering the extraction stage.
    pub fn start(&self, job_id: &str) -> Result<Job, JobStoreError> {
        self.mutate(job_id, |job, now| {
            transition(job, JobStatus::Processing)?;
            job.started_at = Some(now);
            job.stage = JobStage::Extracting;
            job.progress = job.progress.max(JobStage::Extracting.checkpoint());
            Ok(true)
        })
    }

    /// Records that a running job entered `stage`. Progress moves to the
    /// stage checkpoint unless it is already past it.
    pub fn advance(&self, job_id: &str, stage: JobStage) -> Result<Job, JobStoreError> {
        self.mutate(job_id, |job, _| {
            require_processing(job)?;
            let progress = clamp_in_flight(job.progress.max(stage.checkpoint()));
            if job.stage == stage && job.progress == progress {
                return Ok(false);
            }
            job.stage = stage;
            job.progress = progress;
            Ok(true)
        })
    }

    /// Raises progress. Lower values are ignored.
    pub fn set_progress(&self, job_id: &str, progress: u8) -> Result<Job, JobStoreError> {
        self.mutate(job_id, |job, _| {
            require_processing(job)?;
            let progress = clamp_in_flight(progress);
            if progress <= job.progress {
                return Ok(false);
            }
            job.progress = progress;
            Ok(true)
        })
    }

    /// PROCESSING → COMPLETED at 100 with the pipeline results.
    pub fn complete(&self, job_id: &str, result: PipelineResult) -> Result<Job, JobStoreError> {
        self.mutate(job_id, move |job, now| {
            transition(job, JobStatus::Completed)?;
            job.progress = 100;
            job.stage = JobStage::Finished;
            job.result = Some(result);
            job.error = None;
            job.completed_at = Some(now);
            Ok(true)
        })
    }

    /// PROCESSING → FAILED. Progress stays where it stopped.
    pub fn fail(&self, job_id: &str, message: &str) -> Result<Job, JobStoreError> {
        let message = if message.trim().is_empty() {
            "unknown error".to_string()
        } else {
            message.to_string()
        };
        self.mutate(job_id, move |job, now| {
            transition(job, JobStatus::Failed)?;
            job.error = Some(message);
            job.completed_at = Some(now);
            Ok(true)
        })
    }

    pub fn list_for_resource(&self, resource_id: &str) -> Result<Vec<Job>, JobStoreError> {
        job_repo::list_for_resource(&self.db, resource_id)?
            .iter()
            .map(Job::from_row)
            .collect()
    }

    /// Newest PENDING or PROCESSING job of a resource.
    pub fn find_active_for_resource(&self, resource_id: &str) -> Result<Option<Job>, JobStoreError> {
        let statuses = status_strs(&JobStatus::ACTIVE);
        job_repo::find_latest_for_resource_with_status(&self.db, resource_id, &statuses)?
            .as_ref()
            .map(Job::from_row)
            .transpose()
    }

    /// Active jobs whose row has not changed since `cutoff`.
    pub fn list_stale(&self, cutoff: DateTime<Utc>) -> Result<Vec<Job>, JobStoreError> {
        let statuses = status_strs(&JobStatus::ACTIVE);
        let cutoff = format_timestamp(cutoff);
        job_repo::list_with_status(&self.db, None, &statuses, Some(&cutoff))?
            .iter()
            .map(Job::from_row)
            .collect()
    }

    /// Deletes terminal jobs completed before `cutoff`.
    pub fn purge_terminal_before(&self, cutoff: DateTime<Utc>) -> Result<usize, JobStoreError> {
        let _guard = self.lock_writes();
        let statuses = status_strs(&JobStatus::TERMINAL);
        let deleted = job_repo::delete_completed_before(&self.db, &statuses, &format_timestamp(cutoff))?;
        if deleted > 0 {
            log::info!("Purged {} finished jobs", deleted);
        }
        Ok(deleted)
    }

    pub fn count_by_status(&self, status: JobStatus) -> Result<u64, JobStoreError> {
        Ok(job_repo::count_by_status(&self.db, status.as_str())?)
    }

    #[cfg(test)]
    pub(crate) fn cached(&self, job_id: &str) -> Option<Job> {
        self.cache_get(job_id)
    }

    /// Loads the row, applies `f` and persists when `f` reports a change.
    fn mutate<F>(&self, job_id: &str, f: F) -> Result<Job, JobStoreError>
    where
        F: FnOnce(&mut Job, DateTime<Utc>) -> Result<bool, JobStoreError>,
    {
        let _guard = self.lock_writes();

        let row = job_repo::find_by_id(&self.db, job_id)?
            .ok_or_else(|| JobStoreError::NotFound(job_id.to_string()))?;
        let mut job = Job::from_row(&row)?;

        let now = timestamp_now();
        if !f(&mut job, now)? {
            return Ok(job);
        }
        job.updated_at = now;

        job_repo::update(&self.db, &job.to_row()?)?;
        log::debug!(
            "Job {} -> {} {}% ({})",
            job.id,
            job.status,
            job.progress,
            job.stage
        );
        self.publish(&job);
        Ok(job)
    }

    fn publish(&self, job: &Job) {
        self.cache_put(job);
        self.events.send(JobProgressEvent::from_job(job));
    }

    fn lock_writes(&self) -> MutexGuard<'_, ()> {
        match self.write_lock.lock() {
            Ok(g) => g,
            Err(poisoned) => {
                log::warn!("Job store write lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    fn write_cache(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, Job>> {
        match self.cache.write() {
            Ok(g) => g,
            Err(poisoned) => {
                log::warn!("Job store cache lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    fn cache_put(&self, job: &Job) {
        let mut cache = self.write_cache();
        if job.is_terminal() {
            cache.remove(&job.id);
        } else {
            cache.insert(job.id.clone(), job.clone());
        }
    }

    fn cache_remove(&self, job_id: &str) {
        self.write_cache().remove(job_id);
    }

    fn cache_get(&self, job_id: &str) -> Option<Job> {
        let cache = match self.cache.read() {
            Ok(g) => g,
            Err(poisoned) => {
                log::warn!("Job store cache lock was poisoned, recovering");
                poisoned.into_inner()
            }
        };
        cache.get(job_id).cloned()
    }
}

fn status_strs(statuses: &[JobStatus]) -> Vec<&'static str> {
    statuses.iter().map(JobStatus::as_str).collect()
}

fn clamp_in_flight(progress: u8) -> u8 {
    progress.min(MAX_IN_FLIGHT_PROGRESS)
}

fn require_processing(job: &Job) -> Result<(), JobStoreError> {
    match job.status {
        JobStatus::Processing => Ok(()),
        status if status.is_terminal() => Err(JobStoreError::Terminal {
            job_id: job.id.clone(),
            status,
        }),
        status => Err(JobStoreError::InvalidTransition {
            job_id: job.id.clone(),
            from: status,
            to: JobStatus::Processing,
        }),
    }
}

fn transition(job: &mut Job, next: JobStatus) -> Result<(), JobStoreError> {
    if job.status.is_terminal() {
        return Err(JobStoreError::Terminal {
            job_id: job.id.clone(),
            status: job.status,
        });
    }
    if !job.status.can_transition_to(next) {
        return Err(JobStoreError::InvalidTransition {
            job_id: job.id.clone(),
            from: job.status,
            to: next,
        });
    }
    job.status = next;
    Ok(())
}
