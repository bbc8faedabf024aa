//! Transformation pack generator library
//!
//! Modules:
//! - `api`: Axum HTTP handlers and router setup used by the server binary.
//! - `archive`: Deterministic zip packaging of job results.
//! - `backend`: The image backend trait and its tagged error.
//! - `catalog`: Prompt catalog (builtin pack or JSON file).
//! - `gemini`: Thin client for the Gemini image model.
//! - `job`: Executor, retry policy, progress and the batching orchestrator.
//! - `utils`: Reference image loading and decoding.
//! - `config`: Env-driven configuration loader.
//! - `error`: Common error types and alias.
//! - `logging`: Subscriber set-up for the binaries.
//!
//! Re-exports are provided for common types: `Config`, `GeminiClient`,
//! `PromptCatalog`, `TransformationJob` and `ArchiveBuilder`.
pub mod api;
pub mod archive;
pub mod backend;
pub mod catalog;
pub mod config;
pub mod error;
pub mod gemini;
pub mod job;
pub mod logging;
pub mod utils;

pub use archive::ArchiveBuilder;
pub use backend::{BackendError, BackendImage, ImageBackend, ReferenceImage};
pub use catalog::{Category, PromptCatalog, PromptSpec};
pub use config::Config;
pub use error::{AppError, AppResult, CredentialError, OutputError};
pub use gemini::GeminiClient;
pub use job::{GeneratedImage, JobReport, Outcome, TransformationJob};
