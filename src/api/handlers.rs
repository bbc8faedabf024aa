//! Axum request handlers for the HTTP API.
use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::api::routes::AppState;
use crate::archive::{ArchiveBuilder, ARCHIVE_FILE_NAME};
use crate::error::AppError;
use crate::job::{TracingSink, TransformationJob};
use crate::utils::image_io::decode_upload;

pub const API_KEY_HEADER: &str = "x-api-key";

/// JSON error body with a machine-readable `code`.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        ApiError { status, code, message: message.into() }
    }
}

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        let (status, code) = match &err {
            AppError::Credential(_) => (StatusCode::UNAUTHORIZED, "credential_invalid"),
            AppError::Output(_) => (StatusCode::INTERNAL_SERVER_ERROR, "archive_failed"),
            AppError::InvalidInput(_) | AppError::Json(_) => {
                (StatusCode::BAD_REQUEST, "invalid_input")
            }
            AppError::HttpClient(_) => (StatusCode::BAD_GATEWAY, "backend_unavailable"),
            AppError::Config(_) | AppError::Catalog(_) | AppError::Io(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "internal")
            }
        };
        ApiError::new(status, code, err.to_string())
    }
}

// Extractor rejections keep their status but get the JSON body
impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        let status = rejection.status();
        let code = match status {
            StatusCode::PAYLOAD_TOO_LARGE => "payload_too_large",
            _ => "invalid_input",
        };
        ApiError::new(status, code, rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError::new(rejection.status(), "invalid_input", rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(json!({ "error": self.message, "code": self.code }));
        (self.status, body).into_response()
    }
}

#[derive(Debug, Deserialize)]
pub struct UploadedImage {
    /// Base64 payload or a full `data:` URL.
    pub data: String,
    pub mime_type: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreatePackRequest {
    #[serde(default)]
    pub images: Vec<UploadedImage>,
}

pub async fn root() -> &'static str {
    "Transformation Pack API"
}

// Catalog: human-readable lines by default; add ?json=true for raw JSON
pub async fn catalog(
    State(state): State<Arc<AppState>>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let json_flag = params.get("json").map(|v| v == "true" || v == "1").unwrap_or(false);
    if json_flag {
        let counts: Value = state
            .catalog
            .count_by_category()
            .into_iter()
            .map(|(c, n)| (c.slug().to_string(), Value::from(n)))
            .collect::<serde_json::Map<_, _>>()
            .into();
        return Json(json!({
            "total": state.catalog.len(),
            "batch_size": state.config.batch_size,
            "categories": counts,
            "prompts": state.catalog.prompts(),
        }))
        .into_response();
    }
    let mut lines = String::new();
    for prompt in state.catalog.prompts() {
        lines.push_str(&format!("[{}] {}\n", prompt.category, prompt.text));
    }
    lines.into_response()
}

pub async fn create_pack(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    payload: Result<Json<CreatePackRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let api_key = headers
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .or_else(|| state.config.gemini_api_key.clone())
        .ok_or_else(|| {
            ApiError::new(StatusCode::UNAUTHORIZED, "credential_invalid", "No API key supplied")
        })?;

    let Json(payload) = payload.map_err(|rejection| {
        tracing::warn!("Rejected pack request: {}", rejection.body_text());
        ApiError::from(rejection)
    })?;
    if payload.images.is_empty() {
        let message = "Upload at least one image";
        return Err(ApiError::new(StatusCode::BAD_REQUEST, "invalid_input", message));
    }
    let references = payload
        .images
        .iter()
        .map(|img| decode_upload(&img.data, img.mime_type.as_deref()))
        .collect::<Result<Vec<_>, _>>()?;

    let backend = (state.backend_factory)(api_key);
    let job = TransformationJob::from_config(state.catalog.clone(), backend, &state.config)?;
    let report = job
        .run_report(&references, &TracingSink)
        .await
        .map_err(AppError::from)?;

    let outcome = report.outcome();
    if report.images.is_empty() {
        tracing::warn!("Job {} produced no images", report.job_id);
    }
    let body = json!({
        "job_id": report.job_id,
        "outcome": outcome,
        "total_prompts": report.total_prompts,
        "produced": report.images.len(),
        "images": report.images,
    });
    if !report.images.is_empty() {
        state.packs.write().await.insert(report);
    }
    Ok(Json(body))
}

pub async fn get_pack(
    State(state): State<Arc<AppState>>,
    id: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<Value>, ApiError> {
    let Path(id) = id?;
    let packs = state.packs.read().await;
    let report = packs.get(&id).ok_or_else(|| not_found(&id))?;
    Ok(Json(json!({
        "job_id": report.job_id,
        "outcome": report.outcome(),
        "total_prompts": report.total_prompts,
        "produced": report.images.len(),
        "images": report.images,
    })))
}

pub async fn pack_archive(
    State(state): State<Arc<AppState>>,
    id: Result<Path<Uuid>, PathRejection>,
) -> Result<Response, ApiError> {
    let Path(id) = id?;
    let bytes = {
        let packs = state.packs.read().await;
        let report = packs.get(&id).ok_or_else(|| not_found(&id))?;
        ArchiveBuilder::new().build(&report.images).map_err(|e| {
            tracing::error!("Failed to build archive for {}: {}", id, e);
            AppError::from(e)
        })?
    };
    let headers = [
        (header::CONTENT_TYPE, "application/zip".to_string()),
        (header::CONTENT_DISPOSITION, format!("attachment; filename=\"{}\"", ARCHIVE_FILE_NAME)),
    ];
    Ok((headers, bytes).into_response())
}

fn not_found(id: &Uuid) -> ApiError {
    ApiError::new(StatusCode::NOT_FOUND, "not_found", format!("No stored pack with id {}", id))
}
