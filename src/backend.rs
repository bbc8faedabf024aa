//! Boundary to the generative image backend.
//!
//! Adapters classify failures structurally into `BackendError` so callers
//! never need to inspect message text.
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// User-supplied input image, shared read-only by every call of a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceImage {
    pub data: Vec<u8>,
    pub mime_type: String,
}

impl ReferenceImage {
    pub fn new(data: Vec<u8>, mime_type: impl Into<String>) -> Self {
        ReferenceImage { data, mime_type: mime_type.into() }
    }
}

/// Raw image returned by a backend: base64 payload plus its mime type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendImage {
    pub data: String,
    pub mime_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    /// Missing, malformed or rejected credential. Fatal for the job.
    #[error("credential rejected by backend: {0}")]
    Credential(String),
    /// Anything else: transport failures, server errors, unreadable bodies.
    #[error("backend request failed: {0}")]
    Request(String),
}

/// Generate one image from the reference images and a prompt.
///
/// `Ok(None)` means the backend answered without image data.
#[async_trait]
pub trait ImageBackend: Send + Sync {
    async fn generate(
        &self,
        references: &[ReferenceImage],
        prompt: &str,
    ) -> Result<Option<BackendImage>, BackendError>;
}
