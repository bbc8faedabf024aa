//! Single backend call for one prompt, with outcome classification.
use std::sync::Arc;

use crate::backend::{BackendError, ImageBackend, ReferenceImage};
use crate::catalog::PromptSpec;
use crate::error::CredentialError;
use crate::job::GeneratedImage;

#[derive(Clone)]
pub struct RequestExecutor {
    backend: Arc<dyn ImageBackend>,
}

impl RequestExecutor {
    pub fn new(backend: Arc<dyn ImageBackend>) -> Self {
        RequestExecutor { backend }
    }

    /// One attempt. `Ok(None)` covers both an empty response and a transient
    /// failure; only a credential failure is an error.
    pub async fn attempt(
        &self,
        references: &[ReferenceImage],
        prompt: &PromptSpec,
    ) -> Result<Option<GeneratedImage>, CredentialError> {
        match self.backend.generate(references, &prompt.text).await {
            Ok(Some(image)) => Ok(Some(GeneratedImage {
                data: image.data,
                mime_type: image.mime_type,
                prompt: prompt.text.clone(),
                category: prompt.category,
            })),
            Ok(None) => {
                tracing::debug!(category = %prompt.category, "Backend returned no image data");
                Ok(None)
            }
            Err(BackendError::Credential(reason)) => Err(CredentialError::new(reason)),
            Err(BackendError::Request(reason)) => {
                tracing::warn!(
                    category = %prompt.category,
                    prompt = %prompt.text,
                    "Generation failed: {}",
                    reason
                );
                Ok(None)
            }
        }
    }
}
