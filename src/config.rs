//! Env-driven configuration for the service, the CLI and the library.
//!
//! Values are read from the process environment; `dotenv` is loaded on demand
//! by the binaries. Defaults are provided for convenience during development.
use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{AppError, AppResult};

#[derive(Debug, Clone)]
pub struct Config {
    pub gemini_api_url: String,
    pub gemini_model: String,
    pub gemini_api_key: Option<String>,
    pub catalog_path: Option<String>,
    pub batch_size: usize,
    pub max_attempts: u32,
    pub retry_delay_ms: u64,
    pub request_timeout_secs: u64,
    pub max_stored_packs: usize,
    /// Largest accepted `POST /packs` body, base64 overhead included.
    pub max_upload_bytes: usize,
    pub api_host: String,
    pub api_port: String,
}

pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 32 * 1024 * 1024;

const VARS: [&str; 12] = [
    "GEMINI_API_URL",
    "GEMINI_MODEL",
    "GEMINI_API_KEY",
    "CATALOG_PATH",
    "BATCH_SIZE",
    "MAX_ATTEMPTS",
    "RETRY_DELAY_MS",
    "REQUEST_TIMEOUT_SECS",
    "MAX_STORED_PACKS",
    "MAX_UPLOAD_BYTES",
    "API_HOST",
    "API_PORT",
];

impl Config {
    pub fn dotenv_load() {
        dotenv::dotenv().ok();
    }

    pub fn new() -> AppResult<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> AppResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let text = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());
        let optional = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let config = Config {
            gemini_api_url: text("GEMINI_API_URL", "https://generativelanguage.googleapis.com"),
            gemini_model: text("GEMINI_MODEL", "gemini-2.5-flash-image-preview"),
            gemini_api_key: optional("GEMINI_API_KEY"),
            catalog_path: optional("CATALOG_PATH"),
            batch_size: parse_number(&lookup, "BATCH_SIZE", 5)?,
            max_attempts: parse_number(&lookup, "MAX_ATTEMPTS", 3)?,
            retry_delay_ms: parse_number(&lookup, "RETRY_DELAY_MS", 2000)?,
            request_timeout_secs: parse_number(&lookup, "REQUEST_TIMEOUT_SECS", 120)?,
            max_stored_packs: parse_number(&lookup, "MAX_STORED_PACKS", 16)?,
            max_upload_bytes: parse_number(&lookup, "MAX_UPLOAD_BYTES", DEFAULT_MAX_UPLOAD_BYTES)?,
            api_host: text("API_HOST", "127.0.0.1"),
            api_port: text("API_PORT", "8189"),
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> AppResult<()> {
        if self.batch_size == 0 {
            return Err(AppError::Config("BATCH_SIZE must be at least 1".to_string()));
        }
        if self.max_attempts == 0 {
            return Err(AppError::Config("MAX_ATTEMPTS must be at least 1".to_string()));
        }
        if self.max_upload_bytes == 0 {
            return Err(AppError::Config("MAX_UPLOAD_BYTES must be at least 1".to_string()));
        }
        Ok(())
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    /// Log the effective configuration. The API key is only reported as set/unset.
    pub fn log_summary(&self) {
        let key_state = if self.gemini_api_key.is_some() { "<set>" } else { "<unset>" };
        tracing::info!(
            gemini_api_url = %self.gemini_api_url,
            gemini_model = %self.gemini_model,
            gemini_api_key = key_state,
            catalog_path = self.catalog_path.as_deref().unwrap_or("<builtin>"),
            batch_size = self.batch_size,
            max_attempts = self.max_attempts,
            retry_delay_ms = self.retry_delay_ms,
            max_upload_bytes = self.max_upload_bytes,
            "Loaded configuration"
        );
        for key in VARS {
            if key != "GEMINI_API_KEY" {
                let value = env::var(key).unwrap_or_else(|_| "<unset>".to_string());
                tracing::debug!("{}: {}", key, value);
            }
        }
    }
}

fn parse_number<F, T>(lookup: &F, key: &str, default: T) -> AppResult<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|_| {
            AppError::Config(format!("{} must be a non-negative integer, got '{}'", key, raw))
        }),
    }
}
