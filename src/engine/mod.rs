//! Augmentation engines.
//!
//! An engine applies a compiled [`Pipeline`] to a volume. It receives the
//! randomness source from the caller and never creates its own, so one
//! `(volume, pipeline, rng state)` triple always yields the same output.

pub mod intensity;
pub mod reference;
pub mod sampling;
pub mod spatial;

use ndarray::{Array3, ArrayView3};
use rand_chacha::ChaCha20Rng;

use crate::types::{ParamSet, Pipeline, TransformKind};

pub use reference::ReferenceEngine;

/// A transform failed to apply.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Transform {kind} failed: {reason}")]
pub struct EngineError {
    /// The failing transform.
    pub kind: TransformKind,
    /// What went wrong.
    pub reason: String,
}

impl EngineError {
    /// Create an engine error for a transform kind.
    pub fn new(kind: TransformKind, reason: impl Into<String>) -> Self {
        Self {
            kind,
            reason: reason.into(),
        }
    }
}

/// Applies an ordered pipeline of transforms to a volume.
pub trait AugmentationEngine: Send + Sync {
    /// Engine name, for logs.
    fn name(&self) -> &'static str;

    /// Apply every transform of `pipeline` in order.
    ///
    /// Implementations must draw all randomness from `rng`.
    fn apply(
        &self,
        volume: ArrayView3<'_, f32>,
        pipeline: &Pipeline,
        rng: &mut ChaCha20Rng,
    ) -> Result<Array3<f32>, EngineError>;
}

/// Typed access to a transform's resolved parameters.
///
/// Errors are plain reasons; the caller attaches the transform kind.
#[derive(Clone, Copy)]
pub(crate) struct Args<'a>(&'a ParamSet);

impl<'a> Args<'a> {
    pub(crate) fn new(params: &'a ParamSet) -> Self {
        Self(params)
    }

    pub(crate) fn scalar(&self, name: &str) -> Result<f64, String> {
        self.0
            .scalar(name)
            .ok_or_else(|| format!("missing scalar parameter `{name}`"))
    }

    pub(crate) fn count(&self, name: &str) -> Result<usize, String> {
        let value = self.scalar(name)?;
        if value < 0.0 {
            return Err(format!("parameter `{name}` must not be negative"));
        }
        Ok(value.round() as usize)
    }

    pub(crate) fn pair(&self, name: &str) -> Result<(f64, f64), String> {
        self.0
            .pair(name)
            .ok_or_else(|| format!("missing range parameter `{name}`"))
    }

    pub(crate) fn choice(&self, name: &str) -> Result<&'a str, String> {
        self.0
            .choice(name)
            .ok_or_else(|| format!("missing choice parameter `{name}`"))
    }
}
