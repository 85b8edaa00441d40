//! Built-in CPU engine implementing every transform kind.

use ndarray::{Array3, ArrayView3};
use rand_chacha::ChaCha20Rng;
use std::time::Instant;

use super::{intensity, spatial, Args, AugmentationEngine, EngineError};
use crate::types::{Pipeline, TransformKind};

/// Reference engine: plain `ndarray` loops, single-threaded per request.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReferenceEngine;

impl ReferenceEngine {
    /// Create the engine.
    pub fn new() -> Self {
        Self
    }
}

impl AugmentationEngine for ReferenceEngine {
    fn name(&self) -> &'static str {
        "reference"
    }

    fn apply(
        &self,
        volume: ArrayView3<'_, f32>,
        pipeline: &Pipeline,
        rng: &mut ChaCha20Rng,
    ) -> Result<Array3<f32>, EngineError> {
        // Only flag non-finite output when the input was clean.
        let check_finite = volume.iter().all(|v| v.is_finite());
        let mut current = volume.to_owned();

        for spec in pipeline.iter() {
            let started = Instant::now();
            let args = Args::new(&spec.params);
            let outcome = match spec.kind {
                TransformKind::Flip => spatial::flip(current, args, rng),
                TransformKind::Affine => spatial::affine(current, args, rng),
                TransformKind::Elastic => spatial::elastic(current, args, rng),
                TransformKind::Anisotropy => spatial::anisotropy(current, args, rng),
                TransformKind::Motion => spatial::motion(current, args, rng),
                TransformKind::Ghosting => spatial::ghosting(current, args, rng),
                TransformKind::Spike => spatial::spike(current, args, rng),
                TransformKind::Swap => spatial::swap(current, args, rng),
                TransformKind::Noise => intensity::noise(current, args, rng),
                TransformKind::Gamma => intensity::gamma(current, args, rng),
                TransformKind::Bias => intensity::bias(current, args, rng),
                TransformKind::Blur => intensity::blur(current, args, rng),
            };
            current = outcome.map_err(|reason| EngineError::new(spec.kind, reason))?;

            if check_finite && current.iter().any(|v| !v.is_finite()) {
                return Err(EngineError::new(spec.kind, "produced non-finite values"));
            }

            tracing::trace!(
                kind = %spec.kind,
                elapsed_us = started.elapsed().as_micros() as u64,
                "transform applied"
            );
        }

        Ok(current)
    }
}
