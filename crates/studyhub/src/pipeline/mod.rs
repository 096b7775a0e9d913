pub mod context;
pub mod error;
pub mod progress;
pub mod result;
pub mod runner;

pub use context::{PipelineContext, PipelineInput};
pub use error::PipelineError;
pub use progress::{NoopProgress, ProgressEvent, ProgressReporter, StoreProgress};
pub use result::{ExtractionResult, IndexResult, PipelineResult, SegmentationResult, TaggingResult};
pub use runner::Pipeline;
