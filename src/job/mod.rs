//! Generation pipeline: executor, retry policy, progress and the batching
//! orchestrator that ties them together.
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::catalog::Category;

pub mod executor;
pub mod orchestrator;
pub mod progress;
pub mod retry;

pub use executor::RequestExecutor;
pub use orchestrator::TransformationJob;
pub use progress::{ChannelSink, JobProgress, ProgressEvent, ProgressSink, TracingSink};
pub use retry::{AbortFlag, RetryPolicy};

/// One successful generation. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedImage {
    /// Base64 payload as returned by the backend.
    pub data: String,
    pub mime_type: String,
    pub prompt: String,
    pub category: Category,
}

impl GeneratedImage {
    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.data)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Complete,
    Partial,
    /// Nothing produced. A soft failure, not an error.
    Empty,
}

/// Result of one finished job run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobReport {
    pub job_id: Uuid,
    pub total_prompts: usize,
    pub images: Vec<GeneratedImage>,
}

impl JobReport {
    pub fn outcome(&self) -> Outcome {
        match self.images.len() {
            0 => Outcome::Empty,
            n if n >= self.total_prompts => Outcome::Complete,
            _ => Outcome::Partial,
        }
    }
}
