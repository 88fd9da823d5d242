//! Content fingerprints for desired objects.
//!
//! Two modes are provided:
//! - [`object_hash`] digests every field of the serialized value.
//! - [`object_hash_ignore_empty_keys`] digests only the top-level fields that
//!   are not effectively zero, so adding a new optional field to a tracked
//!   projection leaves previously stored fingerprints valid.
//!
//! Both render the serde projection of the value as JSON with object keys
//! sorted, which makes the digest independent of field declaration order.
//! Embedded structs participate through `#[serde(flatten)]`, which places
//! their fields in the same pool as the containing struct.

use const_fnv1a_hash::fnv1a_hash_32;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

/// Alphabet used by Kubernetes for name-safe encodings (no vowels, no
/// look-alike characters).
const SAFE_ALPHANUMS: &[u8] = b"bcdfghjklmnpqrstvwxz2456789";

/// Values that have no fingerprint.
#[derive(Debug, Error)]
pub enum HashError {
    /// The value cannot be represented as JSON (for example a map with
    /// non-string keys)
    #[error("object is not hashable: {0}")]
    Unhashable(#[from] serde_json::Error),

    /// Sparse hashing was given something other than a struct-like value
    #[error("sparse hashing requires a struct-like value, got: {0}")]
    NotStructLike(Value),
}

/// Returns the FNV-32a digest of the full object (all fields), as a decimal string.
pub fn object_hash<T: Serialize + ?Sized>(obj: &T) -> Result<String, HashError> {
    let value = serde_json::to_value(obj)?;
    let mut canonical = String::new();
    write_canonical(&mut canonical, &value);
    Ok(fnv1a_hash_32(canonical.as_bytes(), None).to_string())
}

/// Returns the FNV-32a digest of only the non-zero top-level fields of a
/// struct-like value, as a decimal string.
///
/// Fields are visited in name order. A field left at its zero value and a
/// field missing from an older version of the type hash the same.
pub fn object_hash_ignore_empty_keys<T: Serialize + ?Sized>(obj: &T) -> Result<String, HashError> {
    let fields = match serde_json::to_value(obj)? {
        Value::Object(fields) => fields,
        other => return Err(HashError::NotStructLike(other)),
    };

    let mut names: Vec<&String> = fields.keys().collect();
    names.sort();

    let mut rendered = String::new();
    for name in names {
        let field = &fields[name.as_str()];
        if is_effectively_zero(field) {
            continue;
        }
        rendered.push_str(name);
        rendered.push(':');
        write_canonical(&mut rendered, field);
    }
    Ok(fnv1a_hash_32(rendered.as_bytes(), None).to_string())
}

/// Returns a short, label-safe digest of `s`.
///
/// Used for bounded-length suffixes of generated object names. Deterministic,
/// not cryptographically secure.
pub fn string_hash(s: &str) -> String {
    safe_encode(&fnv1a_hash_32(s.as_bytes(), None).to_string())
}

/// Maps every byte onto the name-safe alphabet.
fn safe_encode(s: &str) -> String {
    s.bytes()
        .map(|b| char::from(SAFE_ALPHANUMS[usize::from(b) % SAFE_ALPHANUMS.len()]))
        .collect()
}

/// True for a value equal to its type's zero value, or an empty collection.
///
/// Null, `false`, `0`, `""`, `[]` and `{}` are zero. A map with at least one
/// entry is never zero, whatever its values.
pub fn is_effectively_zero(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(members) => members.is_empty(),
    }
}

/// Compact JSON with object keys in sorted order.
fn write_canonical(out: &mut String, value: &Value) {
    match value {
        Value::Object(members) => {
            let mut keys: Vec<&String> = members.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::from(key.as_str()).to_string());
                out.push(':');
                write_canonical(out, &members[key.as_str()]);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(out, item);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}
