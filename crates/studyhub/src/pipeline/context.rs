use crate::segmenter::SegmentedQuestion;

/// What a job runs on.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineInput {
    pub job_id: String,
    pub resource_id: String,
    /// Local path or `http(s)` URL.
    pub location: String,
    pub file_type: Option<String>,
}

/// State carried between pipeline steps.
pub struct PipelineContext {
    pub input: PipelineInput,
    pub text: String,
    pub questions: Vec<SegmentedQuestion>,
}

impl PipelineContext {
    pub fn new(input: PipelineInput) -> Self {
        Self {
            input,
            text: String::new(),
            questions: Vec::new(),
        }
    }
}
