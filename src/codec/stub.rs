//! Redacted stub codec.

use serde_json::{json, Value};

use super::render::{AnthropicRender, ChatRole, GeminiRender, GeminiRole, OpenAiRender};
use super::{optional_str, require_str, Codec};
use crate::error::KernelError;
use crate::types::block::Block;
use crate::types::kind::BlockKind;

/// Default placeholder text substituted for redacted content.
pub const DEFAULT_PLACEHOLDER: &str = "[REDACTED]";

/// Stand-in for a block withheld on sensitivity grounds.
///
/// Payload: `{original_block_hash, reason, placeholder?}`. Keeps the
/// original block's kind so positional ordering survives redaction; the
/// stub itself is always public.
pub struct RedactedStubCodec;

impl Codec for RedactedStubCodec {
    fn id(&self) -> &'static str {
        "redacted-stub"
    }

    fn version(&self) -> u32 {
        1
    }

    fn validate(&self, payload: &Value) -> Result<(), KernelError> {
        require_str(self.id(), payload, "original_block_hash")?;
        require_str(self.id(), payload, "reason")?;
        optional_str(self.id(), payload, "placeholder")?;
        Ok(())
    }

    fn canonicalize(&self, payload: &Value) -> Value {
        json!({
            "original_block_hash": payload["original_block_hash"].as_str().unwrap_or_default(),
            "placeholder": payload
                .get("placeholder")
                .and_then(Value::as_str)
                .unwrap_or(DEFAULT_PLACEHOLDER),
            "reason": payload["reason"].as_str().unwrap_or_default(),
        })
    }

    fn render_anthropic(&self, block: &Block) -> Vec<AnthropicRender> {
        let text = placeholder_of(block);
        if block.meta.kind == BlockKind::Pinned {
            vec![AnthropicRender::System { text }]
        } else {
            vec![AnthropicRender::Message {
                role: ChatRole::User,
                content: vec![json!({"type": "text", "text": text})],
            }]
        }
    }

    fn render_openai(&self, block: &Block) -> Vec<OpenAiRender> {
        let role = if block.meta.kind == BlockKind::Pinned {
            "system"
        } else {
            "user"
        };
        vec![OpenAiRender {
            role,
            content: placeholder_of(block),
            tool_call_id: None,
        }]
    }

    fn render_gemini(&self, block: &Block) -> Vec<GeminiRender> {
        let text = placeholder_of(block);
        if block.meta.kind == BlockKind::Pinned {
            vec![GeminiRender::System { text }]
        } else {
            vec![GeminiRender::Content {
                role: GeminiRole::User,
                parts: vec![json!({"text": text})],
            }]
        }
    }
}

fn placeholder_of(block: &Block) -> String {
    block
        .payload
        .get("placeholder")
        .and_then(Value::as_str)
        .unwrap_or(DEFAULT_PLACEHOLDER)
        .to_string()
}
