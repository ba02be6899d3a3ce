//! Canonical parameter strings and SHA-256 digests.
//!
//! A value is first converted to a [`serde_json::Value`], then written
//! compactly with object keys in sorted order. Equal logical parameters
//! therefore produce the same string (and hash) whatever order their
//! fields or map entries were built in.

use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use stitchplan_pipeline::RasterImage;

use crate::error::RunError;

/// Canonical JSON text for `value`.
///
/// # Errors
///
/// Returns [`RunError::Json`] if `value` cannot be represented as JSON
/// (for example a map with non-string keys).
pub fn canonical_json<T: Serialize + ?Sized>(value: &T) -> Result<String, RunError> {
    let value = serde_json::to_value(value)?;
    let mut out = String::new();
    write_value(&value, &mut out);
    Ok(out)
}

fn write_value(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            out.push('{');
            for (i, (key, item)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::from(key.as_str()).to_string());
                out.push(':');
                write_value(item, out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_value(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

/// Lowercase hex SHA-256 of `bytes`.
#[must_use]
pub fn sha256_hex(bytes: impl AsRef<[u8]>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes.as_ref());
    hex::encode(hasher.finalize())
}

/// Canonical string and its hash for `value`.
///
/// # Errors
///
/// See [`canonical_json`].
pub fn canonical_hash<T: Serialize + ?Sized>(value: &T) -> Result<(String, String), RunError> {
    let canonical = canonical_json(value)?;
    let hash = sha256_hex(&canonical);
    Ok((canonical, hash))
}

/// Content digest of a raster: dimensions then pixels, little-endian.
#[must_use]
pub fn raster_digest(raster: &RasterImage) -> String {
    let mut hasher = Sha256::new();
    hasher.update(raster.width().to_le_bytes());
    hasher.update(raster.height().to_le_bytes());
    for p in raster.pixels() {
        hasher.update(p.to_le_bytes());
    }
    hex::encode(hasher.finalize())
}
