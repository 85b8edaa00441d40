//! Transform kinds and resolved parameter values.

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

/// Domain a transform operates in.
///
/// All spatial transforms run before all intensity transforms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Domain {
    /// Geometry and acquisition-artifact transforms.
    Spatial,
    /// Transforms that only remap voxel intensities.
    Intensity,
}

impl Domain {
    /// Name of the nested configuration section holding this domain's kinds.
    ///
    /// Spatial kinds live at the top level of the configuration object.
    pub fn config_section(&self) -> Option<&'static str> {
        match self {
            Self::Spatial => None,
            Self::Intensity => Some("intensity"),
        }
    }
}

/// Every transform kind the playground knows about.
///
/// Declaration order is the canonical pipeline order: the derived `Ord`
/// is what the compiler relies on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransformKind {
    /// Random flip along an anatomical axis.
    Flip,
    /// Random scaling, rotation and translation.
    Affine,
    /// Random smooth displacement field.
    Elastic,
    /// Downsample then upsample along one axis.
    Anisotropy,
    /// Simulated patient motion.
    Motion,
    /// Ghosting along a phase-encoding axis.
    Ghosting,
    /// Spike (herringbone) artifact.
    Spike,
    /// Random patch swapping.
    Swap,
    /// Additive Gaussian noise.
    Noise,
    /// Random gamma contrast change.
    Gamma,
    /// Smooth multiplicative bias field.
    Bias,
    /// Gaussian blur.
    Blur,
}

impl TransformKind {
    /// All kinds in canonical order.
    pub const ALL: [TransformKind; 12] = [
        Self::Flip,
        Self::Affine,
        Self::Elastic,
        Self::Anisotropy,
        Self::Motion,
        Self::Ghosting,
        Self::Spike,
        Self::Swap,
        Self::Noise,
        Self::Gamma,
        Self::Bias,
        Self::Blur,
    ];

    /// Position in the canonical order.
    pub fn priority(&self) -> usize {
        *self as usize
    }

    /// Domain the kind belongs to.
    pub fn domain(&self) -> Domain {
        match self {
            Self::Noise | Self::Gamma | Self::Bias | Self::Blur => Domain::Intensity,
            _ => Domain::Spatial,
        }
    }

    /// Key of the kind's section in a transform configuration.
    pub fn config_key(&self) -> &'static str {
        match self {
            Self::Flip => "flip",
            Self::Affine => "affine",
            Self::Elastic => "elastic",
            Self::Anisotropy => "anisotropy",
            Self::Motion => "motion",
            Self::Ghosting => "ghosting",
            Self::Spike => "spike",
            Self::Swap => "swap",
            Self::Noise => "noise",
            Self::Gamma => "gamma",
            Self::Bias => "bias",
            Self::Blur => "blur",
        }
    }

    /// Class name of the transform in the augmentation library.
    pub fn engine_name(&self) -> &'static str {
        match self {
            Self::Flip => "RandomFlip",
            Self::Affine => "RandomAffine",
            Self::Elastic => "RandomElasticDeformation",
            Self::Anisotropy => "RandomAnisotropy",
            Self::Motion => "RandomMotion",
            Self::Ghosting => "RandomGhosting",
            Self::Spike => "RandomSpike",
            Self::Swap => "RandomSwap",
            Self::Noise => "RandomNoise",
            Self::Gamma => "RandomGamma",
            Self::Bias => "RandomBiasField",
            Self::Blur => "RandomBlur",
        }
    }

    /// Parse a kind from its configuration key.
    pub fn from_config_key(s: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|k| k.config_key() == s)
    }
}

impl fmt::Display for TransformKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.config_key())
    }
}

/// A resolved, schema-valid parameter value.
///
/// Serializes to the same JSON shape the compiler accepts: a number,
/// a two-element array, or a string.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ParamValue {
    /// Single number.
    Scalar(f64),
    /// Ordered interval, `lo <= hi`.
    Pair(f64, f64),
    /// Key of an enumerated option.
    Choice(String),
}

impl ParamValue {
    /// The scalar value, if this is a scalar.
    pub fn as_scalar(&self) -> Option<f64> {
        match self {
            Self::Scalar(v) => Some(*v),
            _ => None,
        }
    }

    /// The interval, if this is a pair.
    pub fn as_pair(&self) -> Option<(f64, f64)> {
        match self {
            Self::Pair(lo, hi) => Some((*lo, *hi)),
            _ => None,
        }
    }

    /// The option key, if this is a choice.
    pub fn as_choice(&self) -> Option<&str> {
        match self {
            Self::Choice(key) => Some(key),
            _ => None,
        }
    }
}

/// Resolved parameters of one transform, in schema declaration order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParamSet {
    entries: Vec<(&'static str, ParamValue)>,
}

impl ParamSet {
    /// Create an empty parameter set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a parameter. Later inserts with the same name replace earlier ones.
    pub fn insert(&mut self, name: &'static str, value: ParamValue) {
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((name, value)),
        }
    }

    /// Look up a parameter by config key.
    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.entries.iter().find(|(n, _)| *n == name).map(|(_, v)| v)
    }

    /// Scalar parameter by name.
    pub fn scalar(&self, name: &str) -> Option<f64> {
        self.get(name).and_then(ParamValue::as_scalar)
    }

    /// Pair parameter by name.
    pub fn pair(&self, name: &str) -> Option<(f64, f64)> {
        self.get(name).and_then(ParamValue::as_pair)
    }

    /// Choice parameter by name.
    pub fn choice(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(ParamValue::as_choice)
    }

    /// Iterate parameters in schema order.
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &ParamValue)> {
        self.entries.iter().map(|(n, v)| (*n, v))
    }

    /// Number of parameters.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Serialize for ParamSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (name, value) in &self.entries {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

/// One transform with its enabled flag and resolved parameters.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransformSpec {
    /// Which transform.
    pub kind: TransformKind,
    /// Whether the transform takes part in the pipeline.
    pub enabled: bool,
    /// Resolved parameters, complete per the schema.
    pub params: ParamSet,
}

impl TransformSpec {
    /// Create a transform spec.
    pub fn new(kind: TransformKind, enabled: bool, params: ParamSet) -> Self {
        Self { kind, enabled, params }
    }
}
