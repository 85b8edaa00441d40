//! Pipeline compiler.
//!
//! Turns a loosely-structured transform configuration into a validated,
//! canonically ordered, seeded [`Pipeline`].
//!
//! ## Rules
//!
//! - Every kind in the schema is read from its section of the config
//!   (spatial kinds at the top level, intensity kinds under `intensity`).
//!   A missing section means disabled with default parameters.
//! - Values are repaired, never rejected: wrong types fall back to the
//!   default, numbers are clamped to bounds, integers are rounded and
//!   reversed intervals are swapped.
//! - Enabled kinds are emitted in canonical order, whatever order the
//!   config listed them in.
//!
//! Compilation is a pure function of the config and the seed.

use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt;

use crate::schema::{ParamKind, ParamSpec, SCHEMA};
use crate::types::{ParamSet, ParamValue, Pipeline, TransformKind, TransformSpec};

/// Why a submitted value was replaced or modified.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum AdjustmentReason {
    /// The kind's section was present but not an object.
    SectionNotObject,
    /// The value had the wrong JSON type; the default was used.
    WrongType,
    /// The value was NaN or infinite; the default was used.
    NonFinite,
    /// The value was outside the declared bounds.
    Clamped {
        /// Submitted value.
        from: f64,
        /// Value after clamping.
        to: f64,
    },
    /// An integer parameter had a fractional part.
    Rounded {
        /// Submitted value.
        from: f64,
        /// Value after rounding.
        to: f64,
    },
    /// A pair's first bound exceeded its second; the bounds were swapped.
    Swapped,
    /// A choice did not match any option; the default was used.
    UnknownOption {
        /// Submitted option.
        value: String,
    },
}

/// One repair the compiler made to the submitted config.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Adjustment {
    /// Transform the repair applies to.
    pub kind: TransformKind,
    /// Parameter key, or `None` for the whole section.
    pub param: Option<&'static str>,
    /// What happened.
    #[serde(flatten)]
    pub reason: AdjustmentReason,
}

impl fmt::Display for Adjustment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.param {
            Some(param) => write!(f, "{}.{}: {:?}", self.kind, param, self.reason),
            None => write!(f, "{}: {:?}", self.kind, self.reason),
        }
    }
}

/// Full compiler output.
#[derive(Debug, Clone)]
pub struct CompileReport {
    /// The compiled pipeline (enabled kinds only).
    pub pipeline: Pipeline,
    /// Resolved spec for every schema kind, enabled or not, in canonical order.
    pub specs: Vec<TransformSpec>,
    /// Repairs applied to the submitted values.
    pub adjustments: Vec<Adjustment>,
}

/// Compile a transform configuration with an explicit seed.
pub fn compile(config: &Value, seed: u64) -> Pipeline {
    compile_with_report(config, seed).pipeline
}

/// Compile and also return every resolved spec and every repair made.
pub fn compile_with_report(config: &Value, seed: u64) -> CompileReport {
    let mut specs = Vec::with_capacity(SCHEMA.len());
    let mut adjustments = Vec::new();

    for entry in SCHEMA.iter() {
        let kind = entry.kind;
        let section = match lookup_section(config, kind) {
            Section::Missing => None,
            Section::Invalid => {
                adjustments.push(Adjustment {
                    kind,
                    param: None,
                    reason: AdjustmentReason::SectionNotObject,
                });
                None
            }
            Section::Present(map) => Some(map),
        };

        let enabled = section
            .and_then(|s| s.get("enabled"))
            .map(parse_enabled)
            .unwrap_or(false);

        let mut params = ParamSet::new();
        for param in entry.params {
            let raw = section.and_then(|s| s.get(param.key));
            let (value, reasons) = resolve_param(param, raw);
            adjustments.extend(reasons.into_iter().map(|reason| Adjustment {
                kind,
                param: Some(param.key),
                reason,
            }));
            params.insert(param.key, value);
        }

        specs.push(TransformSpec::new(kind, enabled, params));
    }

    // SCHEMA is laid out in canonical order, so filtering preserves it.
    let enabled: Vec<TransformSpec> = specs.iter().filter(|s| s.enabled).cloned().collect();
    let pipeline = Pipeline::from_ordered(enabled, seed);

    for adjustment in &adjustments {
        tracing::debug!(adjustment = %adjustment, "config value repaired");
    }
    tracing::debug!(
        kinds = ?pipeline.kinds(),
        seed = seed,
        params_hash = %pipeline.params_hash(),
        adjustments = adjustments.len(),
        "pipeline compiled"
    );

    CompileReport {
        pipeline,
        specs,
        adjustments,
    }
}

enum Section<'a> {
    Missing,
    Invalid,
    Present(&'a Map<String, Value>),
}

fn lookup_section(config: &Value, kind: TransformKind) -> Section<'_> {
    let container = match kind.domain().config_section() {
        None => Some(config),
        Some(name) => config.get(name),
    };
    match container.and_then(|c| c.get(kind.config_key())) {
        None | Some(Value::Null) => Section::Missing,
        Some(Value::Object(map)) => Section::Present(map),
        Some(_) => Section::Invalid,
    }
}

fn parse_enabled(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        _ => false,
    }
}

/// A JSON number, or a string holding one.
fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

fn resolve_param(spec: &ParamSpec, raw: Option<&Value>) -> (ParamValue, Vec<AdjustmentReason>) {
    let mut reasons = Vec::new();
    let raw = match raw {
        None | Some(Value::Null) => return (spec.kind.default_value(), reasons),
        Some(raw) => raw,
    };

    let value = match spec.kind {
        ParamKind::Scalar { min, max, integer, default, .. } => match as_number(raw) {
            Some(n) if n.is_finite() => {
                ParamValue::Scalar(fit_scalar(n, min, max, integer, &mut reasons))
            }
            Some(_) => {
                reasons.push(AdjustmentReason::NonFinite);
                ParamValue::Scalar(default)
            }
            None => {
                reasons.push(AdjustmentReason::WrongType);
                ParamValue::Scalar(default)
            }
        },
        ParamKind::Pair { min, max, default, .. } => match as_pair(raw) {
            Some((lo, hi)) if lo.is_finite() && hi.is_finite() => {
                let (lo, hi) = if lo > hi {
                    reasons.push(AdjustmentReason::Swapped);
                    (hi, lo)
                } else {
                    (lo, hi)
                };
                ParamValue::Pair(
                    fit_scalar(lo, min, max, false, &mut reasons),
                    fit_scalar(hi, min, max, false, &mut reasons),
                )
            }
            Some(_) => {
                reasons.push(AdjustmentReason::NonFinite);
                ParamValue::Pair(default.0, default.1)
            }
            None => {
                reasons.push(AdjustmentReason::WrongType);
                ParamValue::Pair(default.0, default.1)
            }
        },
        ParamKind::Choice { default, .. } => match as_choice_key(raw) {
            Some(key) => match spec.option(&key) {
                Some(option) => ParamValue::Choice(option.key.to_string()),
                None => {
                    reasons.push(AdjustmentReason::UnknownOption { value: key });
                    ParamValue::Choice(default.to_string())
                }
            },
            None => {
                reasons.push(AdjustmentReason::WrongType);
                ParamValue::Choice(default.to_string())
            }
        },
    };

    (value, reasons)
}

fn fit_scalar(n: f64, min: f64, max: f64, integer: bool, reasons: &mut Vec<AdjustmentReason>) -> f64 {
    let mut v = n;
    if integer && v.fract() != 0.0 {
        let rounded = v.round();
        reasons.push(AdjustmentReason::Rounded { from: v, to: rounded });
        v = rounded;
    }
    let clamped = v.clamp(min, max);
    if clamped != v {
        reasons.push(AdjustmentReason::Clamped { from: v, to: clamped });
    }
    // Normalise -0.0 so canonical serialization does not depend on sign.
    if clamped == 0.0 {
        0.0
    } else {
        clamped
    }
}

fn as_pair(value: &Value) -> Option<(f64, f64)> {
    match value.as_array()?.as_slice() {
        [lo, hi] => Some((as_number(lo)?, as_number(hi)?)),
        _ => None,
    }
}

fn as_choice_key(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.trim().to_lowercase()),
        Value::Number(n) => n.as_i64().map(|i| i.to_string()),
        Value::Array(items) if items.len() == 1 => as_choice_key(&items[0]),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_empty_config_is_identity() {
        let pipeline = compile(&json!({}), 3);
        assert!(pipeline.is_identity());
        assert_eq!(pipeline.seed(), 3);
    }

    #[test]
    fn test_non_object_config_is_identity() {
        assert!(compile(&json!([1, 2, 3]), 0).is_identity());
        assert!(compile(&Value::Null, 0).is_identity());
    }

    #[test]
    fn test_missing_params_take_defaults() {
        let pipeline = compile(&json!({"affine": {"enabled": true}}), 0);
        let affine = pipeline.get(TransformKind::Affine).unwrap();
        assert_eq!(affine.params.pair("scales"), Some((0.9, 1.1)));
        assert_eq!(affine.params.scalar("degrees"), Some(10.0));
        assert_eq!(affine.params.scalar("translation"), Some(5.0));
    }

    #[test]
    fn test_intensity_kinds_are_nested() {
        let config = json!({
            "noise": {"enabled": true},
            "intensity": {"blur": {"enabled": true}},
        });
        let pipeline = compile(&config, 0);
        assert_eq!(pipeline.kinds(), vec![TransformKind::Blur]);
    }

    #[test]
    fn test_canonical_order_ignores_config_order() {
        let a: Value = serde_json::from_str(
            r#"{"intensity": {"blur": {"enabled": true}, "noise": {"enabled": true}},
                "swap": {"enabled": true}, "flip": {"enabled": true}}"#,
        )
        .unwrap();
        let b: Value = serde_json::from_str(
            r#"{"flip": {"enabled": true}, "swap": {"enabled": true},
                "intensity": {"noise": {"enabled": true}, "blur": {"enabled": true}}}"#,
        )
        .unwrap();

        let pa = compile(&a, 1);
        let pb = compile(&b, 1);
        assert_eq!(
            pa.kinds(),
            vec![TransformKind::Flip, TransformKind::Swap, TransformKind::Noise, TransformKind::Blur]
        );
        assert_eq!(pa, pb);
    }

    #[test]
    fn test_disabled_kinds_are_dropped() {
        let pipeline = compile(&json!({"flip": {"enabled": false, "p": 1.0}}), 0);
        assert!(pipeline.is_identity());
    }

    #[test]
    fn test_string_enabled_flags_stay_disabled() {
        for flag in ["on", "true", "yes", "1"] {
            let pipeline = compile(&json!({"flip": {"enabled": flag}}), 0);
            assert!(pipeline.is_identity(), "flag {flag:?} enabled flip");
        }
    }

    #[test]
    fn test_enabled_flag_parsing() {
        assert!(parse_enabled(&json!(true)));
        assert!(parse_enabled(&json!(1)));
        assert!(!parse_enabled(&json!(0)));
        assert!(!parse_enabled(&json!("on")));
        assert!(!parse_enabled(&json!("off")));
        assert!(!parse_enabled(&json!({})));
    }

    #[test]
    fn test_reversed_pair_is_swapped() {
        let report = compile_with_report(
            &json!({"intensity": {"blur": {"enabled": true, "std": [2, 0]}}}),
            0,
        );
        let blur = report.pipeline.get(TransformKind::Blur).unwrap();
        assert_eq!(blur.params.pair("std"), Some((0.0, 2.0)));
        assert!(report
            .adjustments
            .iter()
            .any(|a| a.kind == TransformKind::Blur && a.reason == AdjustmentReason::Swapped));
    }

    #[test]
    fn test_out_of_range_values_are_clamped() {
        let report = compile_with_report(
            &json!({"flip": {"enabled": true, "p": 3.5}, "affine": {"enabled": true, "scales": [0.1, 9]}}),
            0,
        );
        let flip = report.pipeline.get(TransformKind::Flip).unwrap();
        assert_eq!(flip.params.scalar("p"), Some(1.0));
        let affine = report.pipeline.get(TransformKind::Affine).unwrap();
        assert_eq!(affine.params.pair("scales"), Some((0.5, 1.5)));
        assert!(report.adjustments.iter().any(|a| matches!(
            a.reason,
            AdjustmentReason::Clamped { from, to } if from == 3.5 && to == 1.0
        )));
    }

    #[test]
    fn test_integer_params_are_rounded() {
        let pipeline = compile(&json!({"swap": {"enabled": true, "patchSize": 7.6}}), 0);
        let swap = pipeline.get(TransformKind::Swap).unwrap();
        assert_eq!(swap.params.scalar("patchSize"), Some(8.0));
    }

    #[test]
    fn test_wrong_types_fall_back_to_default() {
        let report = compile_with_report(
            &json!({
                "elastic": {"enabled": true, "numControlPoints": "many", "maxDisplacement": [1, 2]},
                "intensity": {"gamma": {"enabled": true, "logGamma": 0.5}},
            }),
            0,
        );
        let elastic = report.pipeline.get(TransformKind::Elastic).unwrap();
        assert_eq!(elastic.params.scalar("numControlPoints"), Some(7.0));
        assert_eq!(elastic.params.scalar("maxDisplacement"), Some(7.0));
        let gamma = report.pipeline.get(TransformKind::Gamma).unwrap();
        assert_eq!(gamma.params.pair("logGamma"), Some((-0.3, 0.3)));
        assert_eq!(
            report
                .adjustments
                .iter()
                .filter(|a| a.reason == AdjustmentReason::WrongType)
                .count(),
            3
        );
    }

    #[test]
    fn test_numeric_strings_are_accepted() {
        let pipeline = compile(&json!({"intensity": {"noise": {"enabled": true, "std": "0.25"}}}), 0);
        let noise = pipeline.get(TransformKind::Noise).unwrap();
        assert_eq!(noise.params.scalar("std"), Some(0.25));
    }

    #[test]
    fn test_non_finite_strings_fall_back() {
        let report = compile_with_report(
            &json!({"intensity": {"noise": {"enabled": true, "mean": "NaN"}}}),
            0,
        );
        let noise = report.pipeline.get(TransformKind::Noise).unwrap();
        assert_eq!(noise.params.scalar("mean"), Some(0.0));
        assert!(report.adjustments.iter().any(|a| a.reason == AdjustmentReason::NonFinite));
    }

    #[test]
    fn test_choice_forms() {
        let flip = |axes: Value| {
            compile(&json!({"flip": {"enabled": true, "axes": axes}}), 0)
                .get(TransformKind::Flip)
                .and_then(|t| t.params.choice("axes").map(str::to_string))
        };
        assert_eq!(flip(json!("AP")).as_deref(), Some("ap"));
        assert_eq!(flip(json!(["is"])).as_deref(), Some("is"));
        assert_eq!(flip(json!("diagonal")).as_deref(), Some("lr"));

        let axes = compile(&json!({"anisotropy": {"enabled": true, "axes": [0]}}), 0);
        let anisotropy = axes.get(TransformKind::Anisotropy).unwrap();
        assert_eq!(anisotropy.params.choice("axes"), Some("0"));
    }

    #[test]
    fn test_invalid_section_is_reported() {
        let report = compile_with_report(&json!({"motion": true}), 0);
        assert!(report.pipeline.is_identity());
        assert_eq!(report.adjustments.len(), 1);
        assert_eq!(report.adjustments[0].reason, AdjustmentReason::SectionNotObject);
    }

    #[test]
    fn test_report_covers_every_kind() {
        let report = compile_with_report(&json!({}), 0);
        let kinds: Vec<_> = report.specs.iter().map(|s| s.kind).collect();
        assert_eq!(kinds, TransformKind::ALL.to_vec());
        assert!(report.specs.iter().all(|s| !s.enabled));
    }
}
