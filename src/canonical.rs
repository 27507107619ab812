//! Canonical JSON serialization for deterministic hashing.
//!
//! ## Canonical Form Specification
//!
//! The canonical form of any JSON value is computed as:
//!
//! ```text
//! canonical(value) = compact JSON with object keys sorted recursively
//! ```
//!
//! Where:
//! - Object keys are emitted in byte-lexicographic order at every nesting
//!   level, so the key order of the input has no effect on the output.
//! - Arrays keep their element order.
//! - No whitespace is emitted, before, between, or after tokens.
//!
//! Hashing is SHA-256 over the UTF-8 encoding of the canonical form,
//! rendered as a 64-character lowercase hex string.
//!
//! ## Determinism Guarantees
//!
//! - Same value → same bytes → same hash, regardless of how the value was
//!   constructed or which map backing `serde_json` was built with.
//! - The key sort is performed explicitly here; it does not depend on
//!   `serde_json::Map` iteration order.

use serde_json::Value;
use sha2::{Digest, Sha256};

/// Version of the canonical form specification.
///
/// Increment when the canonicalization algorithm changes. Changes to this
/// version invalidate all previously computed hashes.
pub const CANONICAL_JSON_VERSION: &str = "1.0.0";

/// SHA-256 of the canonical empty object (`"{}"`).
pub const EMPTY_OBJECT_HASH: &str =
    "44136fa355b3678a1146ad16f7e8649e94fb4fc21fe77e8310c060f61caaff8a";

/// SHA-256 of the empty string; identity of a view with no blocks.
pub const EMPTY_PREFIX_HASH: &str =
    "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

/// Serialize a JSON value to its canonical string form.
///
/// Object keys are sorted recursively; arrays keep element order; output
/// is compact with no trailing whitespace.
pub fn canonical_json_string(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

/// Serialize a JSON value to canonical UTF-8 bytes for hashing.
pub fn canonical_json_bytes(value: &Value) -> Vec<u8> {
    canonical_json_string(value).into_bytes()
}

/// Compute the SHA-256 hex digest of arbitrary bytes.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Compute the SHA-256 hex digest of a JSON value's canonical form.
pub fn canonical_hash_hex(value: &Value) -> String {
    sha256_hex(&canonical_json_bytes(value))
}

/// Normalize text to canonical form: CRLF/CR → LF, then trim.
///
/// Codecs that document whitespace trimming route through this helper so
/// equivalent inputs canonicalize equally.
pub fn normalize_text(text: &str) -> String {
    text.replace("\r\n", "\n").replace('\r', "\n").trim().to_string()
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        // serde_json's own formatting is stable for numbers and handles
        // string escaping; reuse it for the scalar leaves.
        Value::Number(n) => out.push_str(&n.to_string()),
        Value::String(s) => {
            out.push_str(&serde_json::to_string(s).expect("string serialization is infallible"));
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(
                    &serde_json::to_string(key).expect("string serialization is infallible"),
                );
                out.push(':');
                write_canonical(&map[key.as_str()], out);
            }
            out.push('}');
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_key_order_has_no_effect() {
        let a: Value = serde_json::from_str(r#"{"b": 1, "a": {"z": true, "y": false}}"#).unwrap();
        let b: Value = serde_json::from_str(r#"{"a": {"y": false, "z": true}, "b": 1}"#).unwrap();
        assert_eq!(canonical_json_string(&a), canonical_json_string(&b));
    }

    #[test]
    fn test_canonical_is_compact() {
        let v = json!({"a": [1, 2], "b": "x"});
        assert_eq!(canonical_json_string(&v), r#"{"a":[1,2],"b":"x"}"#);
    }

    #[test]
    fn test_array_order_preserved() {
        let v = json!([3, 1, 2]);
        assert_eq!(canonical_json_string(&v), "[3,1,2]");
    }

    #[test]
    fn test_empty_object_known_hash() {
        assert_eq!(canonical_hash_hex(&json!({})), EMPTY_OBJECT_HASH);
    }

    #[test]
    fn test_empty_string_known_hash() {
        assert_eq!(sha256_hex(b""), EMPTY_PREFIX_HASH);
    }

    #[test]
    fn test_hash_determinism() {
        let v = json!({"name": "test", "value": 42});
        let h1 = canonical_hash_hex(&v);
        let h2 = canonical_hash_hex(&v);
        assert_eq!(h1, h2);
        assert_eq!(h1.len(), 64);
        assert!(h1.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_canonicalize_idempotent() {
        let v = json!({"b": {"d": 2, "c": 1}, "a": [true, null]});
        let once = canonical_json_string(&v);
        let reparsed: Value = serde_json::from_str(&once).unwrap();
        assert_eq!(canonical_json_string(&reparsed), once);
    }

    #[test]
    fn test_normalize_text() {
        assert_eq!(normalize_text("  Hello\r\nWorld  "), "Hello\nWorld");
        assert_eq!(normalize_text("Hello\rWorld"), "Hello\nWorld");
        assert_eq!(normalize_text("   "), "");
    }

    #[test]
    fn test_string_escaping() {
        let v = json!({"text": "line\n\"quoted\""});
        let s = canonical_json_string(&v);
        let reparsed: Value = serde_json::from_str(&s).unwrap();
        assert_eq!(reparsed["text"], "line\n\"quoted\"");
    }

    #[test]
    fn test_unicode_content() {
        let v = json!({"text": "Hello 世界 🌍"});
        let h = canonical_hash_hex(&v);
        assert_eq!(h.len(), 64);
    }
}
