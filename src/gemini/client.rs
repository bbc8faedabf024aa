//! Thin HTTP client for the Gemini image model.
//!
//! - `generate` posts the reference images plus prompt text to
//!   `/v1beta/models/<model>:generateContent` and returns the first inline
//!   image of the first candidate.
//! - Failures are classified by status code and the structured error body,
//!   never by message text.
use async_trait::async_trait;
use base64::{engine::general_purpose, Engine};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use std::fmt;
use std::time::Duration;

use crate::backend::{BackendError, BackendImage, ImageBackend, ReferenceImage};
use crate::config::Config;
use crate::error::AppResult;

const API_KEY_HEADER: &str = "x-goog-api-key";
const API_KEY_INVALID_REASON: &str = "API_KEY_INVALID";
const CREDENTIAL_STATUSES: [&str; 2] = ["UNAUTHENTICATED", "PERMISSION_DENIED"];

#[derive(Clone)]
pub struct GeminiClient {
    client: Client,
    base_url: String,
    model: String,
    api_key: String,
}

impl GeminiClient {
    pub fn new(client: Client, base_url: &str, model: &str, api_key: String) -> Self {
        let base = base_url.trim_end_matches('/').to_string();
        GeminiClient { client, base_url: base, model: model.to_string(), api_key }
    }

    /// Shared transport honouring the configured request timeout.
    pub fn http_client(config: &Config) -> AppResult<Client> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;
        Ok(client)
    }

    pub fn from_config(client: Client, config: &Config, api_key: String) -> Self {
        Self::new(client, &config.gemini_api_url, &config.gemini_model, api_key)
    }

    fn endpoint(&self) -> String {
        format!("{}/v1beta/models/{}:generateContent", self.base_url, self.model)
    }
}

impl fmt::Debug for GeminiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeminiClient")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

/// Request body: every reference image as an inline part, then the prompt.
pub fn build_request_body(references: &[ReferenceImage], prompt: &str) -> Value {
    let mut parts: Vec<Value> = references
        .iter()
        .map(|r| {
            json!({
                "inline_data": {
                    "mime_type": r.mime_type,
                    "data": general_purpose::STANDARD.encode(&r.data),
                }
            })
        })
        .collect();
    parts.push(json!({ "text": prompt }));
    json!({
        "contents": [{ "parts": parts }],
        "generationConfig": { "responseModalities": ["IMAGE", "TEXT"] },
    })
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Part {
    inline_data: Option<InlineData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
    status: Option<String>,
    #[serde(default)]
    details: Vec<ErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    reason: Option<String>,
}

/// Pull the first inline image out of a successful response body.
pub fn extract_image(body: &str) -> Result<Option<BackendImage>, BackendError> {
    let parsed: GenerateContentResponse = serde_json::from_str(body)
        .map_err(|e| BackendError::Request(format!("Unreadable response body: {}", e)))?;
    let image = parsed
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .and_then(|content| content.parts.into_iter().find_map(|p| p.inline_data))
        .map(|inline| BackendImage { data: inline.data, mime_type: inline.mime_type });
    Ok(image)
}

/// Map a non-success response onto the tagged error.
pub fn classify_failure(status: StatusCode, body: &str) -> BackendError {
    let envelope = serde_json::from_str::<ErrorEnvelope>(body).ok();
    let credential_status = matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN);
    let (message, credential_body) = match &envelope {
        Some(ErrorEnvelope { error }) => {
            let by_status = error
                .status
                .as_deref()
                .map(|s| CREDENTIAL_STATUSES.contains(&s))
                .unwrap_or(false);
            let by_reason = error
                .details
                .iter()
                .any(|d| d.reason.as_deref() == Some(API_KEY_INVALID_REASON));
            (error.message.clone(), by_status || by_reason)
        }
        None => (body.chars().take(200).collect::<String>(), false),
    };
    let summary = format!("status {}: {}", status, message);
    if credential_status || credential_body {
        BackendError::Credential(summary)
    } else {
        BackendError::Request(summary)
    }
}

#[async_trait]
impl ImageBackend for GeminiClient {
    async fn generate(
        &self,
        references: &[ReferenceImage],
        prompt: &str,
    ) -> Result<Option<BackendImage>, BackendError> {
        if self.api_key.trim().is_empty() {
            return Err(BackendError::Credential("no API key supplied".to_string()));
        }
        let url = self.endpoint();
        let body = build_request_body(references, prompt);
        tracing::debug!(
            "Sending generateContent to {} with {} reference image(s)",
            url,
            references.len()
        );

        let response = self.client.post(&url)
            .header(API_KEY_HEADER, &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| BackendError::Request(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| BackendError::Request(format!("Unable to read response body: {}", e)))?;

        if status.is_success() {
            extract_image(&text)
        } else {
            Err(classify_failure(status, &text))
        }
    }
}
