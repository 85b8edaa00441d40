//! Augmentation Playground REST Service
//!
//! Exposes volume upload, preview rendering, config export and dataset
//! browsing over HTTP.
//!
//! ## Endpoints
//!
//! - `POST /api/volume` - Upload a NIfTI volume (multipart field `file`)
//! - `GET /api/volume/:volume_id` - Describe a stored volume
//! - `POST /api/preview` - Render an augmented slice as PNG
//! - `POST /api/export-config` - Export a transform config as engine code
//! - `GET /api/schema` - Transform parameter schema
//! - `GET /api/bids/tree` - List a dataset directory
//! - `GET /api/bids/file` - Download a dataset file
//! - `POST /api/bids/select` - Load a dataset file into the store
//! - `GET /health` - Detailed service health check
//! - `GET /health/live` - Liveness probe
//! - `GET /health/ready` - Readiness probe

pub mod middleware;
pub mod routes;
pub mod state;

pub use middleware::{metrics_middleware, record_preview_metrics, record_upload_metrics};
pub use routes::{create_router, AppState, ErrorResponse};
pub use state::{ServiceConfig, ServiceState};
