//! Service middleware and metric events.
//!
//! Metrics are emitted as structured `tracing` events under the
//! `augmentation_playground::metrics` target, ready for log-based
//! aggregation:
//!
//! - `request_metric`: every request, by normalized path, method and status
//! - `preview_metric`: every rendered preview
//! - `upload_metric`: every stored volume

use axum::{extract::Request, middleware::Next, response::Response};
use regex_lite::Regex;
use std::sync::OnceLock;
use std::time::Instant;
use tracing::info;

/// Middleware that records request counts and latency.
pub async fn metrics_middleware(request: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().clone();
    let path = normalize_path(request.uri().path());

    let response = next.run(request).await;

    info!(
        target: "augmentation_playground::metrics",
        metric_type = "request",
        path = %path,
        method = %method,
        status = response.status().as_u16(),
        latency_ms = start.elapsed().as_millis() as u64,
        "request_metric"
    );

    response
}

fn id_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| {
            Regex::new(r"\b([0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}|[0-9a-f]{32})\b").ok()
        })
        .as_ref()
}

/// Replace volume ids in a path with `:id` to bound metric cardinality.
pub(crate) fn normalize_path(path: &str) -> String {
    match id_pattern() {
        Some(pattern) => pattern.replace_all(path, ":id").into_owned(),
        None => path.to_string(),
    }
}

/// Record a rendered preview.
pub fn record_preview_metrics(transforms: usize, latency_ms: u64, seeded: bool) {
    info!(
        target: "augmentation_playground::metrics",
        metric_type = "preview",
        transforms = transforms,
        seeded = seeded,
        latency_ms = latency_ms,
        "preview_metric"
    );
}

/// Record a stored volume.
pub fn record_upload_metrics(source: &str, bytes: usize, voxels: usize, latency_ms: u64) {
    info!(
        target: "augmentation_playground::metrics",
        metric_type = "upload",
        source = source,
        bytes = bytes,
        voxels = voxels,
        latency_ms = latency_ms,
        "upload_metric"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path_replaces_simple_id() {
        let path = "/api/volume/3f2b8c1d9e4a4b6c8d0e1f2a3b4c5d6e";
        assert_eq!(normalize_path(path), "/api/volume/:id");
    }

    #[test]
    fn test_normalize_path_replaces_hyphenated_id() {
        let path = "/api/volume/550e8400-e29b-41d4-a716-446655440000";
        assert_eq!(normalize_path(path), "/api/volume/:id");
    }

    #[test]
    fn test_normalize_path_preserves_regular_path() {
        assert_eq!(normalize_path("/health/ready"), "/health/ready");
        assert_eq!(normalize_path("/api/preview"), "/api/preview");
    }
}
