//! Common error types and the `AppResult` alias.
//!
//! `CredentialError` is the only failure that crosses batch and job
//! boundaries. `OutputError` belongs to archive packaging. Everything else is
//! folded into `AppError` for the binaries and the HTTP layer.
use thiserror::Error;

/// The backend rejected (or never received) a usable credential.
///
/// Fatal for the whole job: retrying with the same key fails identically.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("credential rejected: {reason}")]
pub struct CredentialError {
    pub reason: String,
}

impl CredentialError {
    pub fn new(reason: impl Into<String>) -> Self {
        CredentialError { reason: reason.into() }
    }
}

/// Failure while turning results into an archive. Never partial.
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("payload for '{path}' is not valid base64: {source}")]
    Decode {
        path: String,
        #[source]
        source: base64::DecodeError,
    },
    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("I/O error while writing archive: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),
    #[error(transparent)]
    Credential(#[from] CredentialError),
    #[error(transparent)]
    Output(#[from] OutputError),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Catalog error: {0}")]
    Catalog(String),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type AppResult<T> = Result<T, AppError>;
