//! Augmentation Playground Service Binary
//!
//! Runs the preview renderer and config exporter as a REST API service:
//! - Structured JSON logging for Cloud Logging
//! - Request tracing with correlation IDs
//! - Graceful shutdown handling
//! - Background purge of expired volumes
//!
//! ## Configuration
//!
//! Environment variables:
//! - `PORT`: Service port (default: 8000)
//! - `HOST`: Service host (default: 0.0.0.0)
//! - `BIDS_ROOT`: Browsable dataset directory (default: /data/bids)
//! - `BIDS_HOST_PATH`: Host path of the dataset mount, echoed to clients
//! - `STORE_MAX_VOLUMES`, `STORE_TTL_SECS`: Volume store bounds
//! - `MAX_UPLOAD_BYTES`, `MAX_CONCURRENT_RENDERS`: Admission limits
//! - `RUST_LOG`: Log level filter (default: info)
//! - `LOG_FORMAT`: "json" for structured logs, "pretty" for development (default: json)
//!
//! ## Usage
//!
//! ```bash
//! BIDS_ROOT=/data/bids cargo run --bin augmentation_playground_service --features service
//! ```

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::Request,
    http::{header, HeaderMap, Method},
    middleware::{self, Next},
    response::Response,
};
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, info_span, warn, Instrument};
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

use augmentation_playground::service::routes::{
    FINGERPRINT_HEADER, PREVIEW_SEED_HEADER, SLICE_INDEX_HEADER,
};
use augmentation_playground::service::{create_router, metrics_middleware, AppState};
use augmentation_playground::SCHEMA_VERSION;

/// Log output selected by `LOG_FORMAT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LogFormat {
    /// One JSON object per event, Cloud Logging compatible.
    Json,
    /// Human-readable lines for local development.
    Pretty,
}

impl LogFormat {
    fn from_setting(value: Option<&str>) -> Self {
        match value.map(|v| v.trim().to_ascii_lowercase()) {
            Some(v) if v == "pretty" => Self::Pretty,
            _ => Self::Json,
        }
    }
}

fn init_tracing() {
    let format = LogFormat::from_setting(std::env::var("LOG_FORMAT").ok().as_deref());
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        "augmentation_playground_service=info,augmentation_playground=info,tower_http=info".into()
    });

    let json = (format == LogFormat::Json).then(|| {
        fmt::layer()
            .json()
            .with_target(true)
            .with_current_span(true)
            .with_span_events(FmtSpan::CLOSE)
            .flatten_event(true)
    });
    let pretty = (format == LogFormat::Pretty).then(|| {
        fmt::layer()
            .with_target(true)
            .with_span_events(FmtSpan::CLOSE)
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(json)
        .with(pretty)
        .init();
}

/// Trace id from `X-Cloud-Trace-Context` (`TRACE_ID/SPAN_ID;o=1`), or a fresh one.
fn trace_id_from(value: Option<&str>) -> String {
    value
        .and_then(|h| h.split('/').next())
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| uuid::Uuid::new_v4().simple().to_string())
}

/// Coarse endpoint name for access logs.
fn endpoint_of(method: &Method, path: &str) -> &'static str {
    match path {
        "/api/preview" => "preview",
        "/api/export-config" => "export",
        "/api/schema" => "schema",
        "/api/volume" if *method == Method::POST => "upload",
        "/api/bids/select" => "bids_select",
        p if p.starts_with("/api/volume/") => "volume_info",
        p if p.starts_with("/api/bids/") => "bids_browse",
        p if p.starts_with("/health") => "health",
        _ => "other",
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// Access logging: one span and one event per request, carrying the
/// preview seed and pipeline fingerprint when the handler produced them.
async fn request_logging_middleware(request: Request, next: Next) -> Response {
    let start = Instant::now();
    let trace_id = trace_id_from(header_str(request.headers(), "X-Cloud-Trace-Context"));
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let endpoint = endpoint_of(&method, &path);
    let request_bytes = header_str(request.headers(), header::CONTENT_LENGTH.as_str())
        .and_then(|v| v.parse::<u64>().ok());

    let span = info_span!(
        "request",
        trace_id = %trace_id,
        endpoint = endpoint,
        method = %method,
        status = tracing::field::Empty,
        seed = tracing::field::Empty,
    );

    let response = next.run(request).instrument(span.clone()).await;

    let status = response.status().as_u16();
    let latency_ms = start.elapsed().as_millis() as u64;
    let seed = header_str(response.headers(), PREVIEW_SEED_HEADER);
    let fingerprint = header_str(response.headers(), FINGERPRINT_HEADER);
    let slice = header_str(response.headers(), SLICE_INDEX_HEADER);

    span.record("status", status);
    if let Some(seed) = seed {
        span.record("seed", seed);
    }

    info!(
        target: "augmentation_playground_service::access",
        trace_id = %trace_id,
        endpoint = endpoint,
        path = %path,
        status = status,
        latency_ms = latency_ms,
        request_bytes = ?request_bytes,
        seed = ?seed,
        slice = ?slice,
        fingerprint = ?fingerprint,
        "request completed"
    );

    response
}

/// Resolve on Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, initiating graceful shutdown"),
        _ = terminate => info!("Received SIGTERM, initiating graceful shutdown"),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let version = env!("CARGO_PKG_VERSION");
    let build_sha = option_env!("BUILD_SHA").unwrap_or("dev");

    info!(
        version = version,
        build_sha = build_sha,
        schema_version = SCHEMA_VERSION,
        "Starting Augmentation Playground Service"
    );

    let state = AppState::from_env();
    let config = Arc::clone(&state.config);

    info!(
        bids_root = %config.bids_root.display(),
        bids_available = state.browser.is_available(),
        store_max_volumes = config.store_max_volumes,
        store_ttl_secs = ?config.store_ttl_secs,
        max_concurrent_renders = config.max_concurrent_renders,
        "Service state initialized"
    );
    if !state.browser.is_available() {
        warn!(
            bids_root = %config.bids_root.display(),
            "BIDS root not found; dataset browsing disabled"
        );
    }

    if let Some(ttl) = config.store_ttl_secs {
        let store = Arc::clone(&state.store);
        let period = std::time::Duration::from_secs(ttl.clamp(1, 60));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                let purged = store.purge_expired();
                if purged > 0 {
                    info!(purged = purged, "Expired volumes purged");
                }
            }
        });
    }

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = create_router(state)
        .layer(middleware::from_fn(metrics_middleware))
        .layer(middleware::from_fn(request_logging_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!(
        address = %addr,
        version = version,
        "Augmentation Playground Service listening"
    );

    let listener = TcpListener::bind(addr).await?;

    info!("Ready to accept connections");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Augmentation Playground Service shutdown complete");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_format_defaults_to_json() {
        assert_eq!(LogFormat::from_setting(None), LogFormat::Json);
        assert_eq!(LogFormat::from_setting(Some("json")), LogFormat::Json);
        assert_eq!(LogFormat::from_setting(Some("bogus")), LogFormat::Json);
        assert_eq!(LogFormat::from_setting(Some(" Pretty ")), LogFormat::Pretty);
    }

    #[test]
    fn test_trace_id_from_cloud_header() {
        assert_eq!(
            trace_id_from(Some("105445aa7843bc8bf206b1200/1;o=1")),
            "105445aa7843bc8bf206b1200"
        );
        let generated = trace_id_from(None);
        assert_eq!(generated.len(), 32);
        assert_ne!(trace_id_from(Some("/1;o=1")), "");
    }

    #[test]
    fn test_endpoint_names() {
        assert_eq!(endpoint_of(&Method::POST, "/api/volume"), "upload");
        assert_eq!(endpoint_of(&Method::GET, "/api/volume/abc"), "volume_info");
        assert_eq!(endpoint_of(&Method::POST, "/api/preview"), "preview");
        assert_eq!(endpoint_of(&Method::GET, "/api/bids/tree"), "bids_browse");
        assert_eq!(endpoint_of(&Method::POST, "/api/bids/select"), "bids_select");
        assert_eq!(endpoint_of(&Method::GET, "/health/live"), "health");
        assert_eq!(endpoint_of(&Method::GET, "/favicon.ico"), "other");
    }
}
