//! Codec contract and registry.
//!
//! A codec owns one payload shape: it validates untyped input,
//! canonicalizes it for hashing, and renders it into provider-native
//! structures. Codecs are identified by `(id, version)`; the registry is
//! an explicit value threaded through graph-adjacent operations, never a
//! process-wide global.
//!
//! ## Contract
//!
//! | Operation      | Guarantee                                            |
//! |----------------|------------------------------------------------------|
//! | `validate`     | Rejects malformed input; never coerces missing required fields. |
//! | `canonicalize` | Pure, deterministic; documented trimming and default substitution only. |
//! | `payload_hash` | SHA-256 of the canonical form; equal canonical forms hash equal. |
//! | `render_*`     | Provider-shaped structures; an empty render means the block contributes nothing for that provider. |

mod history;
mod reference;
mod render;
mod stub;
mod text;
mod tool_output;

pub use history::ConversationHistoryCodec;
pub use reference::{StructuredReferenceCodec, ToolSchemaCodec};
pub use render::{AnthropicRender, ChatRole, GeminiRender, GeminiRole, OpenAiRender};
pub use stub::RedactedStubCodec;
pub use text::{SystemRulesCodec, UnsafeTextCodec, UserTurnCodec};
pub use tool_output::ToolOutputCodec;

use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::canonical::canonical_hash_hex;
use crate::error::KernelError;
use crate::types::block::{Block, BlockMeta};

/// One payload shape's operations.
pub trait Codec: Send + Sync {
    /// Stable codec identifier (e.g. `"system-rules"`).
    fn id(&self) -> &'static str;

    /// Codec version; bumped on canonicalization changes.
    fn version(&self) -> u32;

    /// Reject malformed payloads.
    fn validate(&self, payload: &Value) -> Result<(), KernelError>;

    /// Normalize a valid payload to its canonical JSON form.
    ///
    /// Pure and idempotent: `canonicalize(canonicalize(p)) == canonicalize(p)`.
    fn canonicalize(&self, payload: &Value) -> Value;

    /// Hash the canonical form of a payload.
    fn payload_hash(&self, payload: &Value) -> String {
        canonical_hash_hex(&self.canonicalize(payload))
    }

    /// Render for the Anthropic Messages API.
    fn render_anthropic(&self, block: &Block) -> Vec<AnthropicRender>;

    /// Render for OpenAI chat completions.
    fn render_openai(&self, block: &Block) -> Vec<OpenAiRender>;

    /// Render for Gemini GenerateContent.
    fn render_gemini(&self, block: &Block) -> Vec<GeminiRender>;
}

/// Explicit codec registry: `codec id → codec`.
#[derive(Clone, Default)]
pub struct CodecRegistry {
    codecs: BTreeMap<String, Arc<dyn Codec>>,
}

impl std::fmt::Debug for CodecRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CodecRegistry")
            .field("ids", &self.ids())
            .finish()
    }
}

impl CodecRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-loaded with the eight built-in codecs.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        for codec in [
            Arc::new(SystemRulesCodec) as Arc<dyn Codec>,
            Arc::new(ToolSchemaCodec),
            Arc::new(StructuredReferenceCodec),
            Arc::new(ConversationHistoryCodec),
            Arc::new(ToolOutputCodec),
            Arc::new(RedactedStubCodec),
            Arc::new(UnsafeTextCodec),
            Arc::new(UserTurnCodec),
        ] {
            registry
                .register(codec)
                .expect("built-in codec ids are distinct");
        }
        registry
    }

    /// Register a codec. Double registration of an id is an error.
    pub fn register(&mut self, codec: Arc<dyn Codec>) -> Result<(), KernelError> {
        let id = codec.id().to_string();
        if self.codecs.contains_key(&id) {
            return Err(KernelError::DuplicateCodec(id));
        }
        self.codecs.insert(id, codec);
        Ok(())
    }

    /// Look up a codec by id.
    pub fn get(&self, id: &str) -> Result<&Arc<dyn Codec>, KernelError> {
        self.codecs
            .get(id)
            .ok_or_else(|| KernelError::UnknownCodec(id.to_string()))
    }

    /// Whether an id is registered.
    pub fn contains(&self, id: &str) -> bool {
        self.codecs.contains_key(id)
    }

    /// Registered ids, sorted.
    pub fn ids(&self) -> Vec<&str> {
        self.codecs.keys().map(String::as_str).collect()
    }

    /// Validate, canonicalize, and seal a block.
    ///
    /// This is the validating construction path; the resulting block's
    /// payload is the canonical form and its hash is content-derived.
    pub fn create_block(&self, meta: BlockMeta, payload: Value) -> Result<Block, KernelError> {
        let codec = self.get(&meta.codec_id)?;
        codec.validate(&payload)?;
        let canonical = codec.canonicalize(&payload);
        Ok(Block::from_canonical(meta, canonical))
    }
}

// ── Shared field helpers for codec validation ────────────────────────────

pub(crate) fn require_str<'a>(
    codec: &str,
    payload: &'a Value,
    field: &str,
) -> Result<&'a str, KernelError> {
    payload
        .get(field)
        .and_then(Value::as_str)
        .ok_or_else(|| KernelError::validation(codec, field, "required string field"))
}

pub(crate) fn optional_str<'a>(
    codec: &str,
    payload: &'a Value,
    field: &str,
) -> Result<Option<&'a str>, KernelError> {
    match payload.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(_) => Err(KernelError::validation(codec, field, "must be a string")),
    }
}

pub(crate) fn optional_bool(
    codec: &str,
    payload: &Value,
    field: &str,
) -> Result<Option<bool>, KernelError> {
    match payload.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Bool(b)) => Ok(Some(*b)),
        Some(_) => Err(KernelError::validation(codec, field, "must be a boolean")),
    }
}

pub(crate) fn require_object<'a>(
    codec: &str,
    payload: &'a Value,
    field: &str,
) -> Result<&'a serde_json::Map<String, Value>, KernelError> {
    payload
        .get(field)
        .and_then(Value::as_object)
        .ok_or_else(|| KernelError::validation(codec, field, "required object field"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BlockKind, Sensitivity};
    use serde_json::json;

    #[test]
    fn test_builtin_registry_has_all_codecs() {
        let registry = CodecRegistry::builtin();
        for id in [
            "system-rules",
            "tool-schema",
            "structured-reference",
            "conversation-history",
            "tool-output",
            "redacted-stub",
            "unsafe-text",
            "user-turn",
        ] {
            assert!(registry.contains(id), "missing built-in codec {id}");
        }
    }

    #[test]
    fn test_double_registration_is_error() {
        let mut registry = CodecRegistry::builtin();
        let err = registry.register(Arc::new(SystemRulesCodec)).unwrap_err();
        match err {
            KernelError::DuplicateCodec(id) => assert_eq!(id, "system-rules"),
            _ => panic!("expected DuplicateCodec"),
        }
    }

    #[test]
    fn test_unknown_codec_lookup() {
        let registry = CodecRegistry::builtin();
        assert!(matches!(
            registry.get("mystery"),
            Err(KernelError::UnknownCodec(_))
        ));
    }

    #[test]
    fn test_create_block_canonicalizes() {
        let registry = CodecRegistry::builtin();
        let meta = BlockMeta::new(BlockKind::Pinned, Sensitivity::Public, "system-rules", 1);
        let block = registry
            .create_block(meta, json!({"text": "  Be concise  "}))
            .unwrap();
        assert_eq!(block.payload["text"], "Be concise");
        assert_eq!(block.payload["priority"], 0);
        assert_eq!(block.payload["cacheable"], false);
        assert!(block.verify_hash());
    }

    #[test]
    fn test_create_block_rejects_invalid() {
        let registry = CodecRegistry::builtin();
        let meta = BlockMeta::new(BlockKind::Pinned, Sensitivity::Public, "system-rules", 1);
        assert!(registry.create_block(meta, json!({"priority": 3})).is_err());
    }
}
