//! Axum routes for the augmentation playground service.

use axum::{
    body::Bytes,
    extract::{rejection::JsonRejection, DefaultBodyLimit, Json, Multipart, Path, Query, State},
    http::{header, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;

use crate::bids::{BidsListing, BrowseError};
use crate::compiler::{compile_with_report, Adjustment};
use crate::decode::{is_nifti_name, DecodeError, VolumeDecoder};
use crate::exporter::{export_report, EngineConfig};
use crate::renderer::RenderError;
use crate::schema::{describe, SchemaDocument, SCHEMA_VERSION};
use crate::store::{InMemoryVolumeStore, StoreError, StoreStats, VolumeStore};
use crate::types::{ExportRequest, PreviewRequest, RequestError, Volume};

use super::middleware::{record_preview_metrics, record_upload_metrics};
use super::state::ServiceState;

/// Type alias for the service state with the in-memory store.
pub type AppState = ServiceState<InMemoryVolumeStore>;

/// Error half of every handler result.
pub type ApiError = (StatusCode, Json<ErrorResponse>);

/// Response header carrying the seed a preview was rendered with.
pub const PREVIEW_SEED_HEADER: &str = "x-preview-seed";
/// Response header carrying the clamped slice index.
pub const SLICE_INDEX_HEADER: &str = "x-slice-index";
/// Response header carrying the pipeline fingerprint.
pub const FINGERPRINT_HEADER: &str = "x-pipeline-fingerprint";

// ============================================================================
// Request/Response Types
// ============================================================================

/// A stored volume.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VolumeResponse {
    /// Volume id.
    pub volume_id: String,
    /// Array shape.
    pub shape: [usize; 3],
    /// Original file name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
}

impl VolumeResponse {
    fn from_volume(volume: &Volume) -> Self {
        Self {
            volume_id: volume.id().to_string(),
            shape: volume.shape().0,
            filename: volume.meta().filename.clone(),
        }
    }
}

/// Details of a stored volume.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VolumeInfoResponse {
    /// Volume id.
    pub volume_id: String,
    /// Array shape.
    pub shape: [usize; 3],
    /// Voxel spacing in millimetres.
    pub spacing: Option<[f32; 3]>,
    /// Original file name.
    pub filename: Option<String>,
    /// On-disk datatype.
    pub datatype: Option<String>,
    /// Upload time (RFC 3339).
    pub created_at: String,
}

/// Export response.
#[derive(Debug, Clone, Serialize)]
pub struct ExportResponse {
    /// Declarative config in the shape the compiler accepts.
    pub config: Value,
    /// Library class and argument names.
    pub engine_config: EngineConfig,
    /// Library code constructing the pipeline.
    pub python: String,
    /// Repairs the compiler made to the submitted config.
    pub adjustments: Vec<Adjustment>,
}

/// Dataset listing with the configured mount paths.
#[derive(Debug, Clone, Serialize)]
pub struct BidsTreeResponse {
    /// Directory listing.
    #[serde(flatten)]
    pub listing: BidsListing,
    /// Dataset root inside the service.
    pub bids_root: String,
    /// Dataset location on the host, for display.
    pub bids_host_path: String,
}

/// Query for the dataset endpoints.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BidsQuery {
    /// Path relative to the dataset root.
    pub path: Option<String>,
}

/// Service health response (detailed).
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub schema_version: String,
    pub volumes: StoreStats,
    pub bids_available: bool,
    pub render_slots_available: usize,
    pub uptime_secs: u64,
}

/// Simple liveness response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LivenessResponse {
    pub status: String,
}

/// Readiness response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    pub details: Option<String>,
}

/// Structured error response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Human-readable error message.
    pub error: String,
    /// Machine-readable error code.
    pub code: String,
    /// Correlation ID for request tracing.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    /// Additional error details (optional).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorResponse {
    /// Create a new error response with code and message.
    pub fn new(code: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            code: code.into(),
            correlation_id: None,
            details: None,
        }
    }

    /// Add details to the error.
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Pair with a status and log it.
    pub fn with_status(self, status: StatusCode) -> ApiError {
        tracing::warn!(
            status = status.as_u16(),
            code = %self.code,
            error = %self.error,
            details = ?self.details,
            "Request error"
        );
        (status, Json(self))
    }
}

// ============================================================================
// Error Mapping
// ============================================================================

fn request_error(err: RequestError) -> ApiError {
    ErrorResponse::new("VALIDATION_ERROR", err.to_string()).with_status(StatusCode::BAD_REQUEST)
}

fn store_error(err: StoreError) -> ApiError {
    match err {
        StoreError::NotFound(id) => ErrorResponse::new("VOLUME_NOT_FOUND", "Volume not found.")
            .with_details(id)
            .with_status(StatusCode::NOT_FOUND),
    }
}

fn render_error(err: RenderError) -> ApiError {
    match err {
        RenderError::NotFound(id) => store_error(StoreError::NotFound(id)),
        RenderError::Transform { kind, reason } => ErrorResponse::new(
            "TRANSFORM_FAILED",
            format!("Transform {kind} failed: {reason}"),
        )
        .with_details(kind.to_string())
        .with_status(StatusCode::UNPROCESSABLE_ENTITY),
        RenderError::Encode(reason) => ErrorResponse::new("ENCODE_FAILED", "Failed to encode preview.")
            .with_details(reason)
            .with_status(StatusCode::INTERNAL_SERVER_ERROR),
    }
}

fn decode_error(err: DecodeError) -> ApiError {
    let code = match err {
        DecodeError::UnsupportedExtension(_) => "UNSUPPORTED_FILE_TYPE",
        _ => "DECODE_FAILED",
    };
    ErrorResponse::new(code, err.to_string()).with_status(StatusCode::BAD_REQUEST)
}

fn browse_error(err: BrowseError) -> ApiError {
    let (status, code) = match &err {
        BrowseError::RootMissing(_) => (StatusCode::NOT_FOUND, "BIDS_ROOT_MISSING"),
        BrowseError::InvalidPath(_) => (StatusCode::BAD_REQUEST, "INVALID_PATH"),
        BrowseError::NotFound(_) => (StatusCode::NOT_FOUND, "PATH_NOT_FOUND"),
        BrowseError::NotADirectory(_) => (StatusCode::BAD_REQUEST, "NOT_A_DIRECTORY"),
        BrowseError::NotNifti(_) => (StatusCode::BAD_REQUEST, "UNSUPPORTED_FILE_TYPE"),
        BrowseError::Io(_) => (StatusCode::INTERNAL_SERVER_ERROR, "IO_ERROR"),
    };
    ErrorResponse::new(code, err.to_string()).with_status(status)
}

/// Unwrap a JSON body, answering malformed bodies with the structured error.
fn json_body<T>(body: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    body.map(|Json(value)| value).map_err(|rejection| {
        ErrorResponse::new("VALIDATION_ERROR", "Request body must be valid JSON.")
            .with_details(rejection.body_text())
            .with_status(StatusCode::BAD_REQUEST)
    })
}

fn internal_error(err: impl std::fmt::Display) -> ApiError {
    ErrorResponse::new("INTERNAL_ERROR", "Internal error.")
        .with_details(err.to_string())
        .with_status(StatusCode::INTERNAL_SERVER_ERROR)
}

// ============================================================================
// Route Handlers
// ============================================================================

/// Decode bytes and store the volume, off the async runtime.
async fn decode_and_store(
    state: &AppState,
    source: &'static str,
    name: String,
    bytes: Bytes,
) -> Result<Arc<Volume>, ApiError> {
    let started = Instant::now();
    let decoder = Arc::clone(&state.decoder);
    let size = bytes.len();
    let data = tokio::task::spawn_blocking(move || decoder.decode(&name, &bytes))
        .await
        .map_err(internal_error)?
        .map_err(decode_error)?;

    let volume = state.store.put(data);
    record_upload_metrics(
        source,
        size,
        volume.shape().voxels(),
        started.elapsed().as_millis() as u64,
    );
    Ok(volume)
}

/// Upload a NIfTI volume as multipart field `file`.
async fn upload_handler(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<VolumeResponse>, ApiError> {
    let bad_multipart = |e: axum::extract::multipart::MultipartError| {
        ErrorResponse::new("INVALID_UPLOAD", "Malformed multipart body.")
            .with_details(e.to_string())
            .with_status(StatusCode::BAD_REQUEST)
    };

    while let Some(field) = multipart.next_field().await.map_err(bad_multipart)? {
        if field.name() != Some("file") {
            continue;
        }
        let filename = field
            .file_name()
            .map(str::to_string)
            .filter(|n| !n.trim().is_empty())
            .ok_or_else(|| {
                ErrorResponse::new("MISSING_FILENAME", "Missing filename.")
                    .with_status(StatusCode::BAD_REQUEST)
            })?;
        if !is_nifti_name(&filename) {
            return Err(decode_error(DecodeError::UnsupportedExtension(filename)));
        }
        let bytes = field.bytes().await.map_err(bad_multipart)?;
        let volume = decode_and_store(&state, "upload", filename, bytes).await?;
        return Ok(Json(VolumeResponse::from_volume(&volume)));
    }

    Err(ErrorResponse::new("MISSING_FILE", "Missing multipart field `file`.")
        .with_status(StatusCode::BAD_REQUEST))
}

/// Describe a stored volume.
async fn volume_info_handler(
    State(state): State<Arc<AppState>>,
    Path(volume_id): Path<String>,
) -> Result<Json<VolumeInfoResponse>, ApiError> {
    let volume = state.store.get_str(&volume_id).map_err(store_error)?;
    let meta = volume.meta();
    Ok(Json(VolumeInfoResponse {
        volume_id: volume.id().to_string(),
        shape: volume.shape().0,
        spacing: meta.spacing,
        filename: meta.filename.clone(),
        datatype: meta.datatype.clone(),
        created_at: volume.created_at().to_rfc3339(),
    }))
}

/// Render a preview slice as PNG.
async fn preview_handler(
    State(state): State<Arc<AppState>>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Response, ApiError> {
    let started = Instant::now();
    let payload = json_body(body)?;
    let request = PreviewRequest::from_json(&payload).map_err(request_error)?;
    let seeded = request.seed.is_some();

    let _permit = Arc::clone(&state.render_slots)
        .acquire_owned()
        .await
        .map_err(internal_error)?;

    let renderer = Arc::clone(&state.renderer);
    let result = tokio::task::spawn_blocking(move || renderer.render(&request))
        .await
        .map_err(internal_error)?
        .map_err(render_error)?;

    record_preview_metrics(
        result.transforms,
        started.elapsed().as_millis() as u64,
        seeded,
    );

    let headers = [
        (header::CONTENT_TYPE, HeaderValue::from_static("image/png")),
        (header::CACHE_CONTROL, HeaderValue::from_static("no-store")),
        (
            HeaderName::from_static(PREVIEW_SEED_HEADER),
            HeaderValue::from(result.seed),
        ),
        (
            HeaderName::from_static(SLICE_INDEX_HEADER),
            HeaderValue::from(result.plane.display_index),
        ),
        (
            HeaderName::from_static(FINGERPRINT_HEADER),
            HeaderValue::from_str(&result.fingerprint).map_err(internal_error)?,
        ),
    ];
    Ok((headers, result.png).into_response())
}

/// Export a transform configuration.
async fn export_handler(
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Json<ExportResponse>, ApiError> {
    let payload = json_body(body)?;
    let request = ExportRequest::from_json(&payload).map_err(request_error)?;
    let report = compile_with_report(&request.transforms, 0);
    let bundle = export_report(&report);
    Ok(Json(ExportResponse {
        config: bundle.declarative_config,
        engine_config: bundle.engine_config,
        python: bundle.code,
        adjustments: report.adjustments,
    }))
}

/// Transform schema for UI construction.
async fn schema_handler() -> Json<SchemaDocument> {
    Json(describe())
}

/// List a dataset directory.
async fn bids_tree_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<BidsQuery>,
) -> Result<Json<BidsTreeResponse>, ApiError> {
    let browser = Arc::clone(&state.browser);
    let listing = tokio::task::spawn_blocking(move || browser.list(query.path.as_deref()))
        .await
        .map_err(internal_error)?
        .map_err(browse_error)?;

    Ok(Json(BidsTreeResponse {
        listing,
        bids_root: state.config.bids_root.display().to_string(),
        bids_host_path: state.config.bids_host_path.clone(),
    }))
}

fn required_path(path: Option<String>) -> Result<String, ApiError> {
    path.filter(|p| !p.trim().is_empty())
        .ok_or_else(|| request_error(RequestError::MissingField("path")))
}

/// Download a dataset file.
async fn bids_file_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<BidsQuery>,
) -> Result<Response, ApiError> {
    let path = required_path(query.path)?;
    let browser = Arc::clone(&state.browser);
    let file = tokio::task::spawn_blocking(move || browser.read_file(&path))
        .await
        .map_err(internal_error)?
        .map_err(browse_error)?;

    Ok((
        [(header::CONTENT_TYPE, "application/octet-stream")],
        file.bytes,
    )
        .into_response())
}

/// Load a dataset file into the store.
async fn bids_select_handler(
    State(state): State<Arc<AppState>>,
    body: Result<Json<BidsQuery>, JsonRejection>,
) -> Result<Json<VolumeResponse>, ApiError> {
    let payload = json_body(body)?;
    let path = required_path(payload.path)?;
    let browser = Arc::clone(&state.browser);
    let file = tokio::task::spawn_blocking(move || browser.read_file(&path))
        .await
        .map_err(internal_error)?
        .map_err(browse_error)?;

    let volume = decode_and_store(&state, "bids", file.name, Bytes::from(file.bytes)).await?;
    Ok(Json(VolumeResponse::from_volume(&volume)))
}

/// Health check endpoint (detailed).
async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        schema_version: SCHEMA_VERSION.to_string(),
        volumes: state.store.stats(),
        bids_available: state.browser.is_available(),
        render_slots_available: state.render_slots.available_permits(),
        uptime_secs: state.uptime_secs(),
    })
}

/// Liveness probe endpoint.
async fn liveness_handler() -> Json<LivenessResponse> {
    Json(LivenessResponse {
        status: "alive".to_string(),
    })
}

/// Readiness probe endpoint.
///
/// Ready while render admission is open.
async fn readiness_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ReadinessResponse>, (StatusCode, Json<ReadinessResponse>)> {
    if state.render_slots.is_closed() {
        return Err((
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ReadinessResponse {
                ready: false,
                details: Some("Render admission closed".to_string()),
            }),
        ));
    }
    Ok(Json(ReadinessResponse {
        ready: true,
        details: None,
    }))
}

// ============================================================================
// Router Construction
// ============================================================================

/// Create the Axum router for the service.
pub fn create_router(state: AppState) -> Router {
    let upload_limit = state.config.max_upload_bytes;
    let state = Arc::new(state);

    Router::new()
        // Volumes
        .route(
            "/api/volume",
            post(upload_handler).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route("/api/volume/:volume_id", get(volume_info_handler))
        // Preview and export
        .route("/api/preview", post(preview_handler))
        .route("/api/export-config", post(export_handler))
        .route("/api/schema", get(schema_handler))
        // Dataset browser
        .route("/api/bids/tree", get(bids_tree_handler))
        .route("/api/bids/file", get(bids_file_handler))
        .route("/api/bids/select", post(bids_select_handler))
        // Health checks
        .route("/health", get(health_handler))
        .route("/health/live", get(liveness_handler))
        .route("/health/ready", get(readiness_handler))
        .with_state(state)
}
