//! Request payloads for the preview and export surfaces.
//!
//! Payloads arrive as loosely-typed JSON. Everything that would make the
//! request meaningless is rejected here, before the volume store or the
//! engine is touched. Transform parameters are not validated here; the
//! compiler repairs those instead of rejecting them.

use serde_json::{Map, Value};

use super::axis::Axis;

/// Malformed request.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RequestError {
    /// Payload is not a JSON object.
    #[error("Request body must be a JSON object")]
    NotAnObject,
    /// Required field is absent or empty.
    #[error("Missing field: {0}")]
    MissingField(&'static str),
    /// Field has the wrong JSON type.
    #[error("Invalid field {field}: {reason}")]
    InvalidField {
        /// Field name.
        field: &'static str,
        /// What was wrong with it.
        reason: String,
    },
    /// Axis name not recognised.
    #[error("Unknown axis: {0}")]
    UnknownAxis(String),
    /// Slice index is not a number.
    #[error("Slice index must be numeric, got {0}")]
    NonNumericIndex(String),
    /// Seed is not an integer.
    #[error("Seed must be an integer, got {0}")]
    InvalidSeed(String),
}

/// A request to render one preview slice.
#[derive(Debug, Clone, PartialEq)]
pub struct PreviewRequest {
    /// Id of the stored volume, as sent by the client.
    pub volume_id: String,
    /// Viewing axis.
    pub axis: Axis,
    /// Requested slice index, before clamping.
    pub index: i64,
    /// Seed for stochastic transforms; `None` lets the renderer pick one.
    pub seed: Option<u64>,
    /// Raw transform configuration.
    pub transforms: Value,
}

impl PreviewRequest {
    /// Build a request with an empty (identity) transform configuration.
    pub fn new(volume_id: impl Into<String>, axis: Axis, index: i64) -> Self {
        Self {
            volume_id: volume_id.into(),
            axis,
            index,
            seed: None,
            transforms: Value::Object(Map::new()),
        }
    }

    /// Set the seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Set the transform configuration.
    pub fn with_transforms(mut self, transforms: Value) -> Self {
        self.transforms = transforms;
        self
    }

    /// Parse a preview payload.
    ///
    /// `axis` defaults to axial and `index` to 0 when absent.
    pub fn from_json(payload: &Value) -> Result<Self, RequestError> {
        let obj = payload.as_object().ok_or(RequestError::NotAnObject)?;

        let volume_id = match obj.get("volume_id") {
            None | Some(Value::Null) => return Err(RequestError::MissingField("volume_id")),
            Some(Value::String(s)) if s.trim().is_empty() => {
                return Err(RequestError::MissingField("volume_id"))
            }
            Some(Value::String(s)) => s.trim().to_string(),
            Some(other) => {
                return Err(RequestError::InvalidField {
                    field: "volume_id",
                    reason: format!("expected a string, got {}", json_type(other)),
                })
            }
        };

        let axis = match obj.get("axis") {
            None | Some(Value::Null) => Axis::default(),
            Some(Value::String(s)) => {
                Axis::from_str(s).ok_or_else(|| RequestError::UnknownAxis(s.clone()))?
            }
            Some(other) => return Err(RequestError::UnknownAxis(other.to_string())),
        };

        let index = match obj.get("index") {
            None | Some(Value::Null) => 0,
            Some(value) => parse_index(value)?,
        };

        let seed = match obj.get("seed") {
            None | Some(Value::Null) => None,
            Some(value) => Some(parse_seed(value)?),
        };

        let transforms = parse_transforms(obj)?;

        Ok(Self {
            volume_id,
            axis,
            index,
            seed,
            transforms,
        })
    }
}

/// A request to export a transform configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportRequest {
    /// Raw transform configuration.
    pub transforms: Value,
}

impl ExportRequest {
    /// Parse an export payload. A missing `transforms` field means "all disabled".
    pub fn from_json(payload: &Value) -> Result<Self, RequestError> {
        let obj = payload.as_object().ok_or(RequestError::NotAnObject)?;
        Ok(Self {
            transforms: parse_transforms(obj)?,
        })
    }
}

fn parse_transforms(obj: &Map<String, Value>) -> Result<Value, RequestError> {
    match obj.get("transforms") {
        None | Some(Value::Null) => Ok(Value::Object(Map::new())),
        Some(value) if value.is_object() => Ok(value.clone()),
        Some(other) => Err(RequestError::InvalidField {
            field: "transforms",
            reason: format!("expected an object, got {}", json_type(other)),
        }),
    }
}

/// Slice indices are truncated toward zero, like an integer cast.
fn parse_index(value: &Value) -> Result<i64, RequestError> {
    match value {
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(i)
            } else if let Some(f) = n.as_f64().filter(|f| f.is_finite()) {
                Ok(f.trunc().clamp(i64::MIN as f64, i64::MAX as f64) as i64)
            } else {
                Err(RequestError::NonNumericIndex(n.to_string()))
            }
        }
        Value::String(s) => s
            .trim()
            .parse::<i64>()
            .map_err(|_| RequestError::NonNumericIndex(s.clone())),
        other => Err(RequestError::NonNumericIndex(other.to_string())),
    }
}

/// Negative seeds wrap into the unsigned range so every integer is accepted.
fn parse_seed(value: &Value) -> Result<u64, RequestError> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_i64().map(|i| i as u64))
            .ok_or_else(|| RequestError::InvalidSeed(n.to_string())),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<u64>()
                .or_else(|_| s.parse::<i64>().map(|i| i as u64))
                .map_err(|_| RequestError::InvalidSeed(s.to_string()))
        }
        other => Err(RequestError::InvalidSeed(other.to_string())),
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults() {
        let request = PreviewRequest::from_json(&json!({"volume_id": "abc"})).unwrap();
        assert_eq!(request.axis, Axis::Axial);
        assert_eq!(request.index, 0);
        assert_eq!(request.seed, None);
        assert_eq!(request.transforms, json!({}));
    }

    #[test]
    fn test_full_payload() {
        let request = PreviewRequest::from_json(&json!({
            "volume_id": "abc",
            "axis": "Coronal",
            "index": 12,
            "seed": 7,
            "transforms": {"flip": {"enabled": true}},
        }))
        .unwrap();
        assert_eq!(request.axis, Axis::Coronal);
        assert_eq!(request.index, 12);
        assert_eq!(request.seed, Some(7));
        assert_eq!(request.transforms["flip"]["enabled"], json!(true));
    }

    #[test]
    fn test_missing_volume_id() {
        assert_eq!(
            PreviewRequest::from_json(&json!({"axis": "axial"})),
            Err(RequestError::MissingField("volume_id"))
        );
        assert_eq!(
            PreviewRequest::from_json(&json!({"volume_id": "  "})),
            Err(RequestError::MissingField("volume_id"))
        );
    }

    #[test]
    fn test_unknown_axis() {
        let err = PreviewRequest::from_json(&json!({"volume_id": "abc", "axis": "oblique"}))
            .unwrap_err();
        assert_eq!(err, RequestError::UnknownAxis("oblique".to_string()));
    }

    #[test]
    fn test_index_parsing() {
        let parse = |v: Value| PreviewRequest::from_json(&json!({"volume_id": "a", "index": v}));
        assert_eq!(parse(json!(5)).unwrap().index, 5);
        assert_eq!(parse(json!(-3)).unwrap().index, -3);
        assert_eq!(parse(json!(2.7)).unwrap().index, 2);
        assert_eq!(parse(json!("9")).unwrap().index, 9);
        assert!(matches!(parse(json!("nine")), Err(RequestError::NonNumericIndex(_))));
        assert!(matches!(parse(json!([1])), Err(RequestError::NonNumericIndex(_))));
    }

    #[test]
    fn test_seed_parsing() {
        let parse = |v: Value| PreviewRequest::from_json(&json!({"volume_id": "a", "seed": v}));
        assert_eq!(parse(json!(8)).unwrap().seed, Some(8));
        assert_eq!(parse(json!("8")).unwrap().seed, Some(8));
        assert_eq!(parse(json!(-1)).unwrap().seed, Some(u64::MAX));
        assert_eq!(parse(Value::Null).unwrap().seed, None);
        assert!(matches!(parse(json!(1.5)), Err(RequestError::InvalidSeed(_))));
        assert!(matches!(parse(json!("lucky")), Err(RequestError::InvalidSeed(_))));
    }

    #[test]
    fn test_transforms_must_be_object() {
        let err = PreviewRequest::from_json(&json!({"volume_id": "a", "transforms": [1, 2]}))
            .unwrap_err();
        assert!(matches!(err, RequestError::InvalidField { field: "transforms", .. }));
    }

    #[test]
    fn test_export_request() {
        let request = ExportRequest::from_json(&json!({})).unwrap();
        assert_eq!(request.transforms, json!({}));
        assert_eq!(ExportRequest::from_json(&json!(3)), Err(RequestError::NotAnObject));
    }
}
