//! Analysis jobs: persisted lifecycle, live progress, orchestration and
//! the stale-job reaper.

pub mod model;
pub mod orchestrator;
pub mod progress;
pub mod reaper;
pub mod store;

pub use model::{Job, JobStage, JobStatus, JobView, ResourceSummary};
pub use orchestrator::{Orchestrator, OrchestratorError, SubmitOutcome, SubmitRequest};
pub use progress::{JobProgressBroadcaster, JobProgressEvent};
pub use reaper::{JobReaper, SweepReport};
pub use store::{CreateOutcome, JobStore, JobStoreError};
