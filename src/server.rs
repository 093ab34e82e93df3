//! HTTP surface: upload, process, language catalog and health.

use crate::config::ServiceConfig;
use crate::document::Document;
use crate::error::{AppError, Result};
use crate::extractor::{ExtractionResult, Extractor, Method};
use crate::languages::{self, Language, SUPPORTED};
use crate::uploads::{StoredUpload, UploadStore};
use axum::{
    extract::{
        multipart::MultipartRejection, rejection::JsonRejection, DefaultBodyLimit, Multipart,
        Path, State,
    },
    http::{header::CONTENT_TYPE, HeaderValue, Method as HttpMethod, StatusCode},
    response::Json,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

/// Headroom on top of the file limit for multipart framing.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    uploads: UploadStore,
    extractor: Extractor,
    max_upload_bytes: usize,
}

impl AppState {
    pub async fn new(config: &ServiceConfig, extractor: Extractor) -> Result<Self> {
        Ok(Self {
            uploads: UploadStore::open(config.upload_dir.clone()).await?,
            extractor,
            max_upload_bytes: config.max_upload_bytes,
        })
    }

    pub fn uploads(&self) -> &UploadStore {
        &self.uploads
    }
}

pub fn router(state: AppState, cors_origins: &[String]) -> Router {
    let body_limit = state.max_upload_bytes.saturating_add(MULTIPART_OVERHEAD);

    Router::new()
        .route("/health", get(health))
        .route("/api/upload", post(upload_file))
        .route("/api/process", post(process_file))
        .route("/api/download/:file_id", get(download_file))
        .route("/api/languages", get(list_languages))
        .fallback(not_found)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(cors_origins))
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin: {:?}", origin);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([HttpMethod::GET, HttpMethod::POST])
        .allow_headers([CONTENT_TYPE])
}

// ============================================================================
// Handlers
// ============================================================================

async fn health() -> Json<Value> {
    Json(json!({ "status": "healthy", "service": "llm-ocr-api" }))
}

#[derive(Debug, Serialize)]
struct UploadResponse {
    #[serde(flatten)]
    upload: StoredUpload,
    status: &'static str,
}

/// Accept a single multipart `file` field and store it for processing.
async fn upload_file(
    State(state): State<AppState>,
    multipart: std::result::Result<Multipart, MultipartRejection>,
) -> Result<Json<UploadResponse>> {
    let mut multipart = multipart.map_err(|e| {
        debug!("Rejected upload body: {}", e);
        AppError::Validation("No file provided".to_string())
    })?;
    let limit = state.max_upload_bytes;

    let mut file = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(e, limit))?
    {
        if field.name() == Some("file") {
            let filename = field.file_name().unwrap_or_default().to_string();
            let data = field.bytes().await.map_err(|e| multipart_error(e, limit))?;
            file = Some((filename, data));
            break;
        }
    }

    let (filename, data) = file.ok_or_else(|| AppError::Validation("No file provided".to_string()))?;
    if filename.trim().is_empty() {
        return Err(AppError::Validation("No file selected".to_string()));
    }
    if data.len() > limit {
        return Err(AppError::PayloadTooLarge { limit });
    }

    info!("Received file: {} ({} bytes)", filename, data.len());
    let upload = state.uploads.save(&filename, &data).await?;

    Ok(Json(UploadResponse {
        upload,
        status: "uploaded",
    }))
}

fn multipart_error(e: axum::extract::multipart::MultipartError, limit: usize) -> AppError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::PayloadTooLarge { limit }
    } else {
        AppError::Validation(format!("Invalid upload: {}", e.body_text()))
    }
}

#[derive(Debug, Deserialize)]
struct ProcessRequest {
    file_id: Option<String>,
    method: Option<String>,
    language: Option<String>,
}

#[derive(Debug, Serialize)]
struct ProcessResponse {
    status: &'static str,
    data: ProcessedDocument,
}

#[derive(Debug, Serialize)]
struct ProcessedDocument {
    raw_text: String,
    lines: Vec<String>,
    method_used: Method,
    language: String,
    file_id: String,
}

/// Convert a stored upload to Markdown. The upload is claimed before anything
/// else is checked, so it is deleted however the request ends.
async fn process_file(
    State(state): State<AppState>,
    payload: std::result::Result<Json<ProcessRequest>, JsonRejection>,
) -> Result<Json<ProcessResponse>> {
    let Json(request) = payload.map_err(|e| {
        debug!("Rejected process body: {}", e);
        if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
            AppError::PayloadTooLarge {
                limit: state.max_upload_bytes,
            }
        } else {
            AppError::Validation("No data provided".to_string())
        }
    })?;

    let file_id = request
        .file_id
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .ok_or_else(|| AppError::Validation("No file_id provided".to_string()))?;

    let upload = state.uploads.claim(file_id).await?;
    let method: Method = request.method.as_deref().unwrap_or_default().parse()?;
    let language = languages::resolve(request.language.as_deref())?;

    debug!(
        "Processing {} (method={}, lang={})",
        upload.file_id(),
        method,
        language
    );

    let extracted = extract_upload(&state.extractor, upload.path(), method, &language)
        .await
        .map_err(|e| {
            error!("Processing {} failed: {}", file_id, e);
            AppError::Processing(e.to_string())
        })?;

    let lines = extracted
        .markdown
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect();

    info!(
        "Processed {} with {} ({})",
        file_id, extracted.method_used, extracted.language
    );

    Ok(Json(ProcessResponse {
        status: "success",
        data: ProcessedDocument {
            raw_text: extracted.markdown,
            lines,
            method_used: extracted.method_used,
            language: extracted.language,
            file_id: file_id.to_string(),
        },
    }))
}

async fn extract_upload(
    extractor: &Extractor,
    path: &std::path::Path,
    method: Method,
    language: &str,
) -> Result<ExtractionResult> {
    let document = Document::open(path).await?;
    extractor.extract(&document, method, language).await
}

/// Results are returned inline by `/api/process` and never persisted.
async fn download_file(Path(file_id): Path<String>) -> AppError {
    debug!("Download requested for {}", file_id);
    AppError::NotFound(
        "Results are not stored; use the markdown returned by /api/process".to_string(),
    )
}

async fn list_languages() -> Json<LanguageList> {
    Json(LanguageList {
        languages: &SUPPORTED,
    })
}

#[derive(Debug, Serialize)]
struct LanguageList {
    languages: &'static [Language],
}

async fn not_found() -> AppError {
    AppError::NotFound("Endpoint not found".to_string())
}
