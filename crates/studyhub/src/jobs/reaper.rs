//! Fails jobs that stopped making progress and purges old finished jobs.
//!
//! Jobs run in-process with no cancellation, so a crash or restart leaves
//! PENDING and PROCESSING rows behind. The reaper walks a stale PENDING job
//! through PROCESSING before failing it to keep the lifecycle strict.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{debug, info, warn};

use crate::config::JobsConfig;

use super::model::JobStatus;
use super::store::{JobStore, JobStoreError};

const SECS_PER_DAY: u64 = 24 * 60 * 60;

/// Outcome of one sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Stale jobs moved to FAILED.
    pub failed: Vec<String>,
    /// Stale jobs that finished on their own before the reaper got to them.
    pub skipped: usize,
    /// Finished jobs deleted by the retention purge.
    pub purged: usize,
}

pub struct JobReaper {
    store: Arc<JobStore>,
    stale_after: Duration,
    retention: Option<Duration>,
}

impl JobReaper {
    pub fn new(store: Arc<JobStore>, stale_after: Duration, retention: Option<Duration>) -> Self {
        Self {
            store,
            stale_after,
            retention,
        }
    }

    pub fn from_config(store: Arc<JobStore>, config: &JobsConfig) -> Self {
        let retention = config
            .retention_days
            .map(|days| Duration::from_secs(u64::from(days) * SECS_PER_DAY));
        Self::new(store, config.stale_after(), retention)
    }

    pub fn sweep(&self) -> Result<SweepReport, JobStoreError> {
        self.sweep_at(Utc::now())
    }

    /// Sweeps as if the current time were `now`.
    pub fn sweep_at(&self, now: DateTime<Utc>) -> Result<SweepReport, JobStoreError> {
        let mut report = SweepReport::default();

        let cutoff = before(now, self.stale_after);
        for job in self.store.list_stale(cutoff)? {
            let idle = now.signed_duration_since(job.updated_at);
            let message = format!(
                "stale: no progress for {}s while {} at {}%",
                idle.num_seconds().max(0),
                job.status,
                job.progress
            );
            if self.fail_stale(&job.id, job.status, &message)? {
                warn!("Reaped job {}: {}", job.id, message);
                report.failed.push(job.id);
            } else {
                report.skipped += 1;
            }
        }

        if let Some(retention) = self.retention {
            report.purged = self.store.purge_terminal_before(before(now, retention))?;
        }

        if report.failed.is_empty() && report.purged == 0 {
            debug!("Reaper found nothing to do");
        } else {
            info!(
                "Reaper failed {} stale jobs and purged {} finished jobs",
                report.failed.len(),
                report.purged
            );
        }
        Ok(report)
    }

    /// Returns `false` when the job reached a terminal state concurrently.
    fn fail_stale(&self, job_id: &str, status: JobStatus, message: &str) -> Result<bool, JobStoreError> {
        if status == JobStatus::Pending {
            match self.store.start(job_id) {
                Ok(_) | Err(JobStoreError::InvalidTransition { .. }) => {}
                Err(JobStoreError::Terminal { .. }) => return Ok(false),
                Err(e) => return Err(e),
            }
        }
        match self.store.fail(job_id, message) {
            Ok(_) => Ok(true),
            Err(JobStoreError::Terminal { .. }) | Err(JobStoreError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }
}

/// `now - duration`, saturating at the earliest representable time.
fn before(now: DateTime<Utc>, duration: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(duration)
        .ok()
        .and_then(|d| now.checked_sub_signed(d))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}
