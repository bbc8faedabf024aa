//! Turning uploads into `ReferenceImage`s: files on disk, base64 payloads and
//! `data:` URLs.
use base64::{engine::general_purpose, Engine};
use std::path::Path;

use crate::backend::ReferenceImage;
use crate::error::{AppError, AppResult};

const FALLBACK_MIME: &str = "application/octet-stream";

/// Guess a mime type from the file extension.
pub fn mime_from_path(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "webp" => "image/webp",
        "gif" => "image/gif",
        "heic" => "image/heic",
        "heif" => "image/heif",
        _ => FALLBACK_MIME,
    }
}

pub async fn read_reference_image(path: impl AsRef<Path>) -> AppResult<ReferenceImage> {
    let path = path.as_ref();
    let data = tokio::fs::read(path).await.map_err(|e| {
        AppError::InvalidInput(format!("Failed to read image {}: {}", path.display(), e))
    })?;
    if data.is_empty() {
        return Err(AppError::InvalidInput(format!("Image {} is empty", path.display())));
    }
    Ok(ReferenceImage::new(data, mime_from_path(path)))
}

/// Split `data:<mime>;base64,<payload>` into mime type and payload.
pub fn split_data_url(value: &str) -> Option<(&str, &str)> {
    let rest = value.strip_prefix("data:")?;
    let (header, payload) = rest.split_once(',')?;
    let mime = header.strip_suffix(";base64")?;
    Some((if mime.is_empty() { FALLBACK_MIME } else { mime }, payload))
}

/// Decode an uploaded image given either as a data URL or a bare base64
/// payload. The data URL's mime type wins over `mime_type`.
pub fn decode_upload(data: &str, mime_type: Option<&str>) -> AppResult<ReferenceImage> {
    let (mime, payload) = match split_data_url(data.trim()) {
        Some((mime, payload)) => (mime, payload),
        None => (mime_type.unwrap_or(FALLBACK_MIME), data.trim()),
    };
    let bytes = general_purpose::STANDARD
        .decode(payload)
        .map_err(|e| AppError::InvalidInput(format!("Image payload is not valid base64: {}", e)))?;
    if bytes.is_empty() {
        return Err(AppError::InvalidInput("Image payload is empty".to_string()));
    }
    Ok(ReferenceImage::new(bytes, mime))
}
