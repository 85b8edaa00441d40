//! # augmentation-playground
//!
//! Deterministic augmentation pipelines and slice previews for 3D volumes.
//!
//! The playground answers one question:
//!
//! > Given a volume, a loose transform config and a seed, what does one
//! > slice of the augmented volume look like?
//!
//! ## Core Contract
//!
//! 1. Compile an untrusted JSON config into a canonical [`Pipeline`]
//!    (fixed transform order, clamped parameters)
//! 2. Apply the pipeline to a stored volume with an RNG seeded from the
//!    request, and render one oriented slice as an 8-bit PNG
//! 3. Export the same pipeline as declarative config, engine config and
//!    engine code that reconstruct it exactly
//!
//! ## Architecture
//!
//! ```text
//! JSON config → compile → Pipeline → AugmentationEngine → extract_plane → PNG
//!                             ↓
//!                          export → config / engine config / code
//!
//! NIfTI bytes → decode → VolumeStore (LRU)
//! ```
//!
//! ## Determinism Guarantees
//!
//! - Same volume + same config + same seed → byte-identical PNG
//! - Transforms always run in canonical order, whatever the config order
//! - An identity pipeline renders the stored voxels untouched

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod bids;
pub mod canonical;
pub mod compiler;
pub mod decode;
pub mod engine;
pub mod exporter;
pub mod orientation;
pub mod renderer;
pub mod schema;
pub mod store;
pub mod types;

#[cfg(feature = "service")]
pub mod service;

// Re-exports
pub use types::{
    Axis, Domain, ExportRequest, ParamSet, ParamValue, Pipeline, PreviewRequest, RequestError,
    Shape, TransformKind, TransformSpec, Volume, VolumeData, VolumeError, VolumeId, VolumeMeta,
};
pub use compiler::{compile, compile_with_report, Adjustment, AdjustmentReason, CompileReport};
pub use schema::{describe, schema_for, SchemaDocument, SCHEMA_VERSION};
pub use exporter::{export, export_report, EngineConfig, ExportBundle};
pub use engine::{AugmentationEngine, EngineError, ReferenceEngine};
pub use orientation::{extract_plane, resolve_slice, SlicePlane};
pub use renderer::{PreviewRenderer, PreviewResult, RenderError};
pub use store::{InMemoryVolumeStore, StoreConfig, StoreError, StoreStats, VolumeStore};
pub use decode::{decode, DecodeError, NiftiDecoder, VolumeDecoder};
pub use bids::{BidsListing, BrowseError, DatasetBrowser};
pub use canonical::{canonical_hash, canonical_hash_hex, to_canonical_bytes};
