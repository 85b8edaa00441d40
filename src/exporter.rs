//! Config exporter.
//!
//! Serializes a compiled pipeline three ways:
//!
//! - a declarative config the compiler accepts back unchanged;
//! - an engine config listing the library's class and argument names;
//! - a code snippet constructing the same pipeline with the library.
//!
//! All three are produced through the schema table, so parameter names and
//! integer-ness always match what the compiler validated.

use serde::Serialize;
use serde_json::{Map, Number, Value};

use crate::compiler::CompileReport;
use crate::schema::{schema_for, ParamSpec};
use crate::types::{ParamValue, Pipeline, TransformKind, TransformSpec};

/// Name of the augmentation library targeted by the engine config and code.
pub const ENGINE_LIBRARY: &str = "torchio";

/// Module alias used in the generated code.
const CODE_ALIAS: &str = "tio";

/// One transform in library terms.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EngineTransform {
    /// Library class name.
    pub name: &'static str,
    /// Keyword arguments by library argument name.
    pub params: Map<String, Value>,
}

/// Enabled transforms in library terms, in application order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EngineConfig {
    /// Target library.
    pub library: &'static str,
    /// Transforms in application order.
    pub transforms: Vec<EngineTransform>,
}

/// Everything the exporter produces for one pipeline.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExportBundle {
    /// Config in the shape the compiler accepts.
    pub declarative_config: Value,
    /// Enabled transforms with library names.
    pub engine_config: EngineConfig,
    /// Library code constructing the pipeline.
    pub code: String,
}

/// Export a pipeline. Kinds it does not enable are exported disabled with
/// default parameters.
pub fn export(pipeline: &Pipeline) -> ExportBundle {
    let specs: Vec<TransformSpec> = TransformKind::ALL
        .iter()
        .map(|&kind| match pipeline.get(kind) {
            Some(spec) => spec.clone(),
            None => default_spec(kind),
        })
        .collect();
    build(&specs, pipeline)
}

/// Export a compile report, keeping the resolved parameters of disabled
/// kinds as well.
pub fn export_report(report: &CompileReport) -> ExportBundle {
    build(&report.specs, &report.pipeline)
}

fn default_spec(kind: TransformKind) -> TransformSpec {
    let mut params = crate::types::ParamSet::new();
    for param in schema_for(kind).params {
        params.insert(param.key, param.kind.default_value());
    }
    TransformSpec::new(kind, false, params)
}

fn build(specs: &[TransformSpec], pipeline: &Pipeline) -> ExportBundle {
    let bundle = ExportBundle {
        declarative_config: declarative_config(specs),
        engine_config: engine_config(pipeline),
        code: code_snippet(pipeline),
    };
    tracing::debug!(
        transforms = pipeline.len(),
        params_hash = %pipeline.params_hash(),
        "pipeline exported"
    );
    bundle
}

/// Declarative config with every kind in its section.
pub fn declarative_config(specs: &[TransformSpec]) -> Value {
    let mut root = Map::new();
    let mut sections: Map<String, Value> = Map::new();

    for spec in specs {
        let mut entry = Map::new();
        entry.insert("enabled".to_string(), Value::Bool(spec.enabled));
        for (key, value) in spec.params.iter() {
            if let Some(param) = schema_for(spec.kind).param(key) {
                entry.insert(key.to_string(), config_value(param, value));
            }
        }

        match spec.kind.domain().config_section() {
            None => {
                root.insert(spec.kind.config_key().to_string(), Value::Object(entry));
            }
            Some(section) => {
                let nested = sections
                    .entry(section.to_string())
                    .or_insert_with(|| Value::Object(Map::new()));
                if let Value::Object(nested) = nested {
                    nested.insert(spec.kind.config_key().to_string(), Value::Object(entry));
                }
            }
        }
    }

    root.extend(sections);
    Value::Object(root)
}

/// Enabled transforms with library argument names.
pub fn engine_config(pipeline: &Pipeline) -> EngineConfig {
    let transforms = pipeline
        .iter()
        .map(|spec| {
            let schema = schema_for(spec.kind);
            let params = schema
                .params
                .iter()
                .filter_map(|param| {
                    let value = spec.params.get(param.key)?;
                    Some((param.engine_arg.to_string(), engine_value(param, value)))
                })
                .collect();
            EngineTransform {
                name: spec.kind.engine_name(),
                params,
            }
        })
        .collect();

    EngineConfig {
        library: ENGINE_LIBRARY,
        transforms,
    }
}

/// Library code constructing the pipeline. Never executed.
pub fn code_snippet(pipeline: &Pipeline) -> String {
    let mut lines = vec![
        format!("import {ENGINE_LIBRARY} as {CODE_ALIAS}"),
        String::new(),
        format!("transform = {CODE_ALIAS}.Compose(["),
    ];
    for spec in pipeline.iter() {
        let args: Vec<String> = schema_for(spec.kind)
            .params
            .iter()
            .filter_map(|param| {
                let value = spec.params.get(param.key)?;
                Some(format!("{}={}", param.engine_arg, code_literal(param, value)))
            })
            .collect();
        lines.push(format!(
            "    {CODE_ALIAS}.{}({}),",
            spec.kind.engine_name(),
            args.join(", ")
        ));
    }
    lines.push("])".to_string());
    lines.join("\n")
}

fn number(param: &ParamSpec, v: f64) -> Value {
    if param.kind.is_integer() {
        Value::Number(Number::from(v.round() as i64))
    } else {
        Number::from_f64(v).map(Value::Number).unwrap_or(Value::Null)
    }
}

fn pair_number(v: f64) -> Value {
    Number::from_f64(v).map(Value::Number).unwrap_or(Value::Null)
}

fn config_value(param: &ParamSpec, value: &ParamValue) -> Value {
    match value {
        ParamValue::Scalar(v) => number(param, *v),
        ParamValue::Pair(lo, hi) => Value::Array(vec![pair_number(*lo), pair_number(*hi)]),
        ParamValue::Choice(key) => Value::String(key.clone()),
    }
}

fn engine_value(param: &ParamSpec, value: &ParamValue) -> Value {
    match value {
        // Library axis arguments are one-element tuples of names or indices.
        ParamValue::Choice(key) => {
            let axis = match key.parse::<u64>() {
                Ok(index) => Value::Number(Number::from(index)),
                Err(_) => Value::String(key.to_uppercase()),
            };
            Value::Array(vec![axis])
        }
        other => config_value(param, other),
    }
}

fn code_literal(param: &ParamSpec, value: &ParamValue) -> String {
    match value {
        ParamValue::Scalar(v) if param.kind.is_integer() => format!("{}", v.round() as i64),
        ParamValue::Scalar(v) => float_literal(*v),
        ParamValue::Pair(lo, hi) => format!("({}, {})", float_literal(*lo), float_literal(*hi)),
        ParamValue::Choice(key) => param
            .option(key)
            .map(|o| o.engine_literal.to_string())
            .unwrap_or_else(|| format!("{key:?}")),
    }
}

/// Float literal that always reads as a float (`10.0`, not `10`).
fn float_literal(v: f64) -> String {
    if v.fract() == 0.0 && v.abs() < 1e15 {
        format!("{v:.1}")
    } else {
        format!("{v}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::{compile, compile_with_report};
    use serde_json::json;

    #[test]
    fn test_identity_export() {
        let bundle = export(&Pipeline::identity(0));
        assert!(bundle.engine_config.transforms.is_empty());
        assert_eq!(bundle.engine_config.library, "torchio");
        assert_eq!(
            bundle.code,
            "import torchio as tio\n\ntransform = tio.Compose([\n])"
        );
        assert_eq!(bundle.declarative_config["flip"]["enabled"], json!(false));
        assert_eq!(bundle.declarative_config["intensity"]["blur"]["enabled"], json!(false));
    }

    #[test]
    fn test_declarative_config_covers_every_kind() {
        let config = export(&Pipeline::identity(0)).declarative_config;
        for kind in TransformKind::ALL {
            let entry = match kind.domain().config_section() {
                None => &config[kind.config_key()],
                Some(section) => &config[section][kind.config_key()],
            };
            assert!(entry.is_object(), "{kind} missing");
        }
    }

    #[test]
    fn test_integers_exported_as_integers() {
        let pipeline = compile(&json!({ "swap": { "enabled": true, "patchSize": 9.6 } }), 0);
        let bundle = export(&pipeline);
        assert_eq!(bundle.declarative_config["swap"]["patchSize"], json!(10));
        assert_eq!(bundle.engine_config.transforms[0].params["patch_size"], json!(10));
        assert!(bundle.code.contains("tio.RandomSwap(patch_size=10, num_iterations=100),"));
    }

    #[test]
    fn test_engine_config_order_and_names() {
        let pipeline = compile(
            &json!({
                "intensity": { "blur": { "enabled": true, "std": [2, 0] } },
                "flip": { "enabled": true, "axes": "AP" }
            }),
            0,
        );
        let bundle = export(&pipeline);
        let names: Vec<&str> = bundle.engine_config.transforms.iter().map(|t| t.name).collect();
        assert_eq!(names, vec!["RandomFlip", "RandomBlur"]);
        assert_eq!(bundle.engine_config.transforms[0].params["axes"], json!(["AP"]));
        assert_eq!(bundle.engine_config.transforms[1].params["std"], json!([0.0, 2.0]));
        assert!(bundle.code.contains("tio.RandomFlip(axes=('AP',), p=0.5),"));
        assert!(bundle.code.contains("tio.RandomBlur(std=(0.0, 2.0)),"));
    }

    #[test]
    fn test_anisotropy_axis_index() {
        let pipeline = compile(&json!({ "anisotropy": { "enabled": true, "axes": 1 } }), 0);
        let bundle = export(&pipeline);
        assert_eq!(bundle.engine_config.transforms[0].params["axes"], json!([1]));
        assert!(bundle.code.contains("axes=(1,)"));
    }

    #[test]
    fn test_round_trip_preserves_fingerprint() {
        let config = json!({
            "affine": { "enabled": true, "scales": [1.2, 0.8], "degrees": 400 },
            "elastic": { "enabled": 1, "numControlPoints": 6.4 },
            "intensity": {
                "gamma": { "enabled": true, "logGamma": [-0.2, 0.25] },
                "bias": { "enabled": true, "order": "4" }
            }
        });
        let first = compile(&config, 9);
        let again = compile(&export(&first).declarative_config, 9);
        assert_eq!(first.fingerprint(), again.fingerprint());
        assert_eq!(first, again);
    }

    #[test]
    fn test_export_report_keeps_disabled_params() {
        let report = compile_with_report(&json!({ "motion": { "enabled": false, "degrees": 30 } }), 0);
        let bundle = export_report(&report);
        assert_eq!(bundle.declarative_config["motion"]["degrees"], json!(30.0));
        assert_eq!(bundle.declarative_config["motion"]["enabled"], json!(false));
        assert!(bundle.engine_config.transforms.is_empty());
    }

    #[test]
    fn test_float_literal() {
        assert_eq!(float_literal(10.0), "10.0");
        assert_eq!(float_literal(0.05), "0.05");
        assert_eq!(float_literal(-0.3), "-0.3");
    }
}
