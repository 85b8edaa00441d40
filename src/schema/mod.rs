//! Transform schema: the single declaration of every transform's parameters.
//!
//! The compiler validates and defaults against this table and the exporter
//! serializes through it, so the two cannot drift apart.

mod table;

use serde::Serialize;

use crate::types::{Domain, ParamValue, TransformKind};

pub use table::SCHEMA;

/// Schema version. Increment when a parameter is added, removed or re-bounded.
pub const SCHEMA_VERSION: &str = "1.0.0";

/// One option of an enumerated parameter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ChoiceOption {
    /// Key accepted in configuration and emitted on export.
    pub key: &'static str,
    /// Human-readable label for UI controls.
    pub label: &'static str,
    /// Literal passed to the augmentation library for this option.
    pub engine_literal: &'static str,
}

/// Type, bounds and default of a parameter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ParamKind {
    /// A single number.
    Scalar {
        /// Lower bound.
        min: f64,
        /// Upper bound.
        max: f64,
        /// UI step.
        step: f64,
        /// Whether the value is rounded to an integer.
        integer: bool,
        /// Default value.
        default: f64,
    },
    /// An ordered interval `[lo, hi]`.
    Pair {
        /// Lower bound for both ends.
        min: f64,
        /// Upper bound for both ends.
        max: f64,
        /// UI step.
        step: f64,
        /// Default interval.
        default: (f64, f64),
    },
    /// One of a fixed set of options.
    Choice {
        /// Allowed options.
        options: &'static [ChoiceOption],
        /// Key of the default option.
        default: &'static str,
    },
}

impl ParamKind {
    /// The declared default as a resolved value.
    pub fn default_value(&self) -> ParamValue {
        match self {
            Self::Scalar { default, .. } => ParamValue::Scalar(*default),
            Self::Pair { default, .. } => ParamValue::Pair(default.0, default.1),
            Self::Choice { default, .. } => ParamValue::Choice((*default).to_string()),
        }
    }

    /// Whether scalar values are integers.
    pub fn is_integer(&self) -> bool {
        matches!(self, Self::Scalar { integer: true, .. })
    }
}

/// Declaration of one parameter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ParamSpec {
    /// Key in the transform configuration (camelCase).
    pub key: &'static str,
    /// Keyword argument name in the augmentation library.
    pub engine_arg: &'static str,
    /// Type, bounds and default.
    #[serde(flatten)]
    pub kind: ParamKind,
}

impl ParamSpec {
    /// Look up a choice option by key.
    pub fn option(&self, key: &str) -> Option<&'static ChoiceOption> {
        match self.kind {
            ParamKind::Choice { options, .. } => options.iter().find(|o| o.key == key),
            _ => None,
        }
    }
}

/// Declaration of one transform kind.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct KindSchema {
    /// The kind.
    pub kind: TransformKind,
    /// Parameters in declaration order.
    pub params: &'static [ParamSpec],
}

impl KindSchema {
    /// Look up a parameter by config key.
    pub fn param(&self, key: &str) -> Option<&'static ParamSpec> {
        self.params.iter().find(|p| p.key == key)
    }
}

/// Schema entry for a kind.
pub fn schema_for(kind: TransformKind) -> &'static KindSchema {
    &SCHEMA[kind.priority()]
}

/// Serializable description of one kind, for UI construction.
#[derive(Debug, Clone, Serialize)]
pub struct KindDescriptor {
    /// The kind.
    pub kind: TransformKind,
    /// Position in the canonical order.
    pub priority: usize,
    /// Domain the kind belongs to.
    pub domain: Domain,
    /// Nested config section, if any.
    pub section: Option<&'static str>,
    /// Library class name.
    pub engine_name: &'static str,
    /// Parameters.
    pub params: &'static [ParamSpec],
}

/// Serializable schema document.
#[derive(Debug, Clone, Serialize)]
pub struct SchemaDocument {
    /// Schema version.
    pub schema_version: &'static str,
    /// Kinds in canonical order.
    pub transforms: Vec<KindDescriptor>,
}

/// Describe the whole schema.
pub fn describe() -> SchemaDocument {
    SchemaDocument {
        schema_version: SCHEMA_VERSION,
        transforms: SCHEMA
            .iter()
            .map(|entry| KindDescriptor {
                kind: entry.kind,
                priority: entry.kind.priority(),
                domain: entry.kind.domain(),
                section: entry.kind.domain().config_section(),
                engine_name: entry.kind.engine_name(),
                params: entry.params,
            })
            .collect(),
    }
}
