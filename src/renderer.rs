//! Preview renderer.
//!
//! Resolves a volume, compiles the request's transform configuration,
//! applies it through an [`AugmentationEngine`] and returns one 8-bit PNG
//! slice.
//!
//! ## Determinism
//!
//! The renderer creates a fresh ChaCha20 generator from the pipeline seed
//! for every request, right before calling the engine, and hands it over by
//! `&mut`. Nothing else draws from it, so `(volume, config, seed, axis,
//! index)` fully determines the output bytes.

use image::{GrayImage, ImageFormat};
use ndarray::{Array2, ArrayView3};
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
use std::io::Cursor;
use std::sync::Arc;
use std::time::Instant;

use crate::compiler::compile;
use crate::engine::{AugmentationEngine, EngineError, ReferenceEngine};
use crate::orientation::{extract_plane, resolve_slice, SlicePlane};
use crate::store::{StoreError, VolumeStore};
use crate::types::{PreviewRequest, TransformKind, VolumeId};

/// Error type for preview rendering.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RenderError {
    /// The requested volume is not in the store.
    #[error("Volume not found: {0}")]
    NotFound(String),

    /// A transform failed.
    #[error("Transform {kind} failed: {reason}")]
    Transform {
        /// The failing transform.
        kind: TransformKind,
        /// What went wrong.
        reason: String,
    },

    /// PNG encoding failed.
    #[error("Image encoding failed: {0}")]
    Encode(String),
}

impl From<StoreError> for RenderError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => RenderError::NotFound(id),
        }
    }
}

impl From<EngineError> for RenderError {
    fn from(err: EngineError) -> Self {
        RenderError::Transform {
            kind: err.kind,
            reason: err.reason,
        }
    }
}

/// A rendered preview slice.
#[derive(Debug, Clone)]
pub struct PreviewResult {
    /// PNG bytes, 8-bit grayscale.
    pub png: Vec<u8>,
    /// Image width in pixels.
    pub width: u32,
    /// Image height in pixels.
    pub height: u32,
    /// Seed actually used; reproduces this preview when sent back.
    pub seed: u64,
    /// Resolved slice coordinates.
    pub plane: SlicePlane,
    /// Fingerprint of the applied pipeline.
    pub fingerprint: String,
    /// Number of enabled transforms applied.
    pub transforms: usize,
    /// Volume the slice was taken from.
    pub volume_id: VolumeId,
}

/// Renders preview slices from stored volumes.
pub struct PreviewRenderer<S: VolumeStore> {
    store: Arc<S>,
    engine: Arc<dyn AugmentationEngine>,
}

impl<S: VolumeStore> PreviewRenderer<S> {
    /// Create a renderer backed by the reference engine.
    pub fn new(store: Arc<S>) -> Self {
        Self::with_engine(store, Arc::new(ReferenceEngine::new()))
    }

    /// Create a renderer with a custom engine.
    pub fn with_engine(store: Arc<S>, engine: Arc<dyn AugmentationEngine>) -> Self {
        Self { store, engine }
    }

    /// The backing store.
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// The engine transforms are delegated to.
    pub fn engine(&self) -> &Arc<dyn AugmentationEngine> {
        &self.engine
    }

    /// Render one preview slice.
    pub fn render(&self, request: &PreviewRequest) -> Result<PreviewResult, RenderError> {
        let started = Instant::now();

        let volume = self.store.get_str(&request.volume_id)?;
        let seed = request.seed.unwrap_or_else(rand::random::<u64>);
        let pipeline = compile(&request.transforms, seed);
        let plane = resolve_slice(request.axis, request.index, volume.shape());

        let slice = if pipeline.is_identity() {
            extract_plane(volume.data().view(), &plane)
        } else {
            let mut rng = ChaCha20Rng::seed_from_u64(pipeline.seed());
            let augmented = self
                .engine
                .apply(volume.data().view(), &pipeline, &mut rng)
                .map_err(|err| {
                    tracing::warn!(
                        volume_id = %volume.id(),
                        kind = %err.kind,
                        reason = %err.reason,
                        seed = seed,
                        "transform failed"
                    );
                    err
                })?;
            extract_plane(augmented.view(), &plane)
        };

        let gray = normalize_to_u8(&slice);
        let (height, width) = gray.dim();
        let png = encode_png(&gray)?;
        let fingerprint = pipeline.fingerprint();

        tracing::info!(
            volume_id = %volume.id(),
            axis = %plane.axis,
            index = plane.display_index,
            seed = seed,
            transforms = pipeline.len(),
            engine = self.engine.name(),
            fingerprint = %fingerprint,
            latency_ms = started.elapsed().as_millis() as u64,
            "preview rendered"
        );

        Ok(PreviewResult {
            png,
            width: width as u32,
            height: height as u32,
            seed,
            plane,
            fingerprint,
            transforms: pipeline.len(),
            volume_id: volume.id(),
        })
    }
}

/// Min-max scale a plane to `0..=255` over its finite values.
///
/// Non-finite pixels map to 0; a flat or all non-finite plane maps to zeros.
pub fn normalize_to_u8(plane: &Array2<f32>) -> Array2<u8> {
    let range = plane
        .iter()
        .copied()
        .filter(|v| v.is_finite())
        .fold(None, |acc: Option<(f32, f32)>, v| match acc {
            None => Some((v, v)),
            Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
        });

    match range {
        Some((lo, hi)) if hi > lo => {
            let (lo, span) = (lo as f64, (hi - lo) as f64);
            plane.mapv(|v| {
                if v.is_finite() {
                    (((v as f64 - lo) / span).clamp(0.0, 1.0) * 255.0) as u8
                } else {
                    0
                }
            })
        }
        _ => Array2::zeros(plane.dim()),
    }
}

/// Encode a grayscale plane (rows, columns) as PNG.
pub fn encode_png(gray: &Array2<u8>) -> Result<Vec<u8>, RenderError> {
    let (height, width) = gray.dim();
    let pixels: Vec<u8> = gray.iter().copied().collect();
    let image = GrayImage::from_raw(width as u32, height as u32, pixels)
        .ok_or_else(|| RenderError::Encode("pixel buffer does not match dimensions".to_string()))?;

    let mut buffer = Cursor::new(Vec::new());
    image
        .write_to(&mut buffer, ImageFormat::Png)
        .map_err(|e| RenderError::Encode(e.to_string()))?;
    Ok(buffer.into_inner())
}

/// Extract and normalize a slice without any transform.
pub fn raw_slice(volume: ArrayView3<'_, f32>, plane: &SlicePlane) -> Array2<u8> {
    normalize_to_u8(&extract_plane(volume, plane))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryVolumeStore;
    use crate::types::{Axis, VolumeData, VolumeMeta};
    use ndarray::{array, Array3};
    use serde_json::json;

    fn setup() -> (PreviewRenderer<InMemoryVolumeStore>, String) {
        let store = Arc::new(InMemoryVolumeStore::new());
        let data = Array3::from_shape_fn((8, 10, 6), |(i, j, k)| (i * 60 + j * 6 + k) as f32);
        let volume = store.put(VolumeData::new(data, VolumeMeta::default()).unwrap());
        (PreviewRenderer::new(store), volume.id().to_string())
    }

    #[test]
    fn test_normalize_spans_full_range() {
        let plane = array![[0.0f32, 5.0], [10.0, f32::NAN]];
        let out = normalize_to_u8(&plane);
        assert_eq!(out, array![[0u8, 127], [255, 0]]);
    }

    #[test]
    fn test_normalize_flat_plane_is_zero() {
        let plane = Array2::from_elem((3, 4), 7.5f32);
        assert!(normalize_to_u8(&plane).iter().all(|v| *v == 0));
        let empty = Array2::from_elem((2, 2), f32::INFINITY);
        assert!(normalize_to_u8(&empty).iter().all(|v| *v == 0));
    }

    #[test]
    fn test_encode_png_signature() {
        let png = encode_png(&Array2::from_elem((3, 5), 128u8)).unwrap();
        assert_eq!(&png[..8], b"\x89PNG\r\n\x1a\n");
        let decoded = image::load_from_memory(&png).unwrap().to_luma8();
        assert_eq!(decoded.dimensions(), (5, 3));
    }

    #[test]
    fn test_render_reports_seed_and_plane() {
        let (renderer, id) = setup();
        let request = PreviewRequest::new(id, Axis::Coronal, 99).with_seed(3);
        let result = renderer.render(&request).unwrap();
        assert_eq!(result.seed, 3);
        assert_eq!(result.plane.display_index, 9);
        assert_eq!(result.plane.array_index, 0);
        // Coronal planes show (z, x) after rotation: 6 rows, 8 columns.
        assert_eq!((result.height, result.width), (6, 8));
    }

    #[test]
    fn test_render_draws_seed_when_absent() {
        let (renderer, id) = setup();
        let request = PreviewRequest::new(id, Axis::Axial, 0)
            .with_transforms(json!({ "intensity": { "noise": { "enabled": true } } }));
        let first = renderer.render(&request).unwrap();
        let replay = renderer.render(&request.clone().with_seed(first.seed)).unwrap();
        assert_eq!(first.png, replay.png);
        assert_eq!(first.fingerprint, replay.fingerprint);
    }

    #[test]
    fn test_render_unknown_volume() {
        let (renderer, _) = setup();
        let err = renderer
            .render(&PreviewRequest::new("0123", Axis::Axial, 0))
            .unwrap_err();
        assert!(matches!(err, RenderError::NotFound(_)));
    }

    #[test]
    fn test_render_transform_error_names_kind() {
        let (renderer, id) = setup();
        let request = PreviewRequest::new(id, Axis::Axial, 0)
            .with_seed(1)
            .with_transforms(json!({ "swap": { "enabled": true, "patchSize": 12 } }));
        match renderer.render(&request).unwrap_err() {
            RenderError::Transform { kind, .. } => assert_eq!(kind, TransformKind::Swap),
            other => panic!("unexpected error: {other}"),
        }
    }
}
