//! Canonical serialization for deterministic hashing.
//!
//! Pipelines are fingerprinted so that two requests which resolve to the same
//! transform stack can be recognised in logs and compared in tests, no matter
//! how their configuration was spelled.
//!
//! Hashed values must serialize identically for identical content: structs
//! in declaration order, transforms and parameters as ordered `Vec`s (never
//! a `HashMap`), and every float quantized to an `i64` first.

use serde::Serialize;
use xxhash_rust::xxh64::xxh64;

/// Quantization factor for float normalization.
/// Floats are multiplied by this value and rounded to i64.
pub const FLOAT_QUANTIZATION_FACTOR: f64 = 1_000_000.0;

/// Serialize a value to canonical JSON bytes for hashing.
///
/// Values that cannot be represented as JSON serialize to an empty buffer.
pub fn to_canonical_bytes<T: Serialize>(value: &T) -> Vec<u8> {
    serde_json::to_vec(value).unwrap_or_default()
}

/// xxh64 of the canonical bytes, seed 0.
pub fn canonical_hash<T: Serialize>(value: &T) -> u64 {
    xxh64(&to_canonical_bytes(value), 0)
}

/// [`canonical_hash`] as 16 lowercase hex digits, the fingerprint format.
pub fn canonical_hash_hex<T: Serialize>(value: &T) -> String {
    format!("{:016x}", canonical_hash(value))
}

/// Quantize a float to an i64 for deterministic hashing.
pub fn quantize_float(value: f64) -> i64 {
    (value * FLOAT_QUANTIZATION_FACTOR).round() as i64
}
