//! The compiled, canonically ordered transform pipeline.

use serde::Serialize;

use super::transform::{ParamValue, TransformKind, TransformSpec};
use crate::canonical::{canonical_hash_hex, quantize_float};

/// Ordered stack of enabled transforms plus the seed that drives them.
///
/// Only the compiler constructs non-empty pipelines, so the transforms are
/// always enabled, schema-complete and in canonical order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Pipeline {
    transforms: Vec<TransformSpec>,
    seed: u64,
}

impl Pipeline {
    /// A pipeline that applies nothing.
    pub fn identity(seed: u64) -> Self {
        Self {
            transforms: Vec::new(),
            seed,
        }
    }

    /// Build from transforms already in canonical order.
    pub(crate) fn from_ordered(transforms: Vec<TransformSpec>, seed: u64) -> Self {
        debug_assert!(transforms.windows(2).all(|w| w[0].kind < w[1].kind));
        Self { transforms, seed }
    }

    /// Seed for stochastic transforms.
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Same transforms, different seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Transforms in application order.
    pub fn transforms(&self) -> &[TransformSpec] {
        &self.transforms
    }

    /// Iterate transforms in application order.
    pub fn iter(&self) -> impl Iterator<Item = &TransformSpec> {
        self.transforms.iter()
    }

    /// Kinds in application order.
    pub fn kinds(&self) -> Vec<TransformKind> {
        self.transforms.iter().map(|t| t.kind).collect()
    }

    /// The spec for a kind, if enabled.
    pub fn get(&self, kind: TransformKind) -> Option<&TransformSpec> {
        self.transforms.iter().find(|t| t.kind == kind)
    }

    /// Whether no transform is enabled.
    pub fn is_identity(&self) -> bool {
        self.transforms.is_empty()
    }

    /// Number of enabled transforms.
    pub fn len(&self) -> usize {
        self.transforms.len()
    }

    /// Whether the pipeline is empty.
    pub fn is_empty(&self) -> bool {
        self.transforms.is_empty()
    }

    /// Hash of the transform stack, excluding the seed.
    ///
    /// Floats are quantized before hashing, so two pipelines that differ only
    /// by float formatting noise share a hash.
    pub fn params_hash(&self) -> String {
        canonical_hash_hex(&self.to_quantized())
    }

    /// Hash of the transform stack and the seed.
    ///
    /// Equal fingerprints on the same volume imply byte-identical previews.
    pub fn fingerprint(&self) -> String {
        canonical_hash_hex(&(self.seed, self.to_quantized()))
    }

    fn to_quantized(&self) -> Vec<QuantizedTransform> {
        self.transforms
            .iter()
            .map(|t| QuantizedTransform {
                kind: t.kind,
                params: t
                    .params
                    .iter()
                    .map(|(name, value)| (name, QuantizedValue::from(value)))
                    .collect(),
            })
            .collect()
    }
}

#[derive(Serialize)]
struct QuantizedTransform {
    kind: TransformKind,
    params: Vec<(&'static str, QuantizedValue)>,
}

#[derive(Serialize)]
enum QuantizedValue {
    Scalar(i64),
    Pair(i64, i64),
    Choice(String),
}

impl From<&ParamValue> for QuantizedValue {
    fn from(value: &ParamValue) -> Self {
        match value {
            ParamValue::Scalar(v) => Self::Scalar(quantize_float(*v)),
            ParamValue::Pair(lo, hi) => Self::Pair(quantize_float(*lo), quantize_float(*hi)),
            ParamValue::Choice(key) => Self::Choice(key.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::transform::ParamSet;

    fn noise(std: f64) -> TransformSpec {
        let mut params = ParamSet::new();
        params.insert("mean", ParamValue::Scalar(0.0));
        params.insert("std", ParamValue::Scalar(std));
        TransformSpec::new(TransformKind::Noise, true, params)
    }

    #[test]
    fn test_identity() {
        let pipeline = Pipeline::identity(7);
        assert!(pipeline.is_identity());
        assert_eq!(pipeline.seed(), 7);
        assert!(pipeline.kinds().is_empty());
    }

    #[test]
    fn test_params_hash_ignores_seed() {
        let a = Pipeline::from_ordered(vec![noise(0.1)], 7);
        let b = a.clone().with_seed(8);
        assert_eq!(a.params_hash(), b.params_hash());
        assert_ne!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn test_params_hash_changes_with_params() {
        let a = Pipeline::from_ordered(vec![noise(0.1)], 7);
        let b = Pipeline::from_ordered(vec![noise(0.2)], 7);
        assert_ne!(a.params_hash(), b.params_hash());
    }
}
