//! Text-bearing codecs: pinned system rules, unsafe free text, user turns.

use serde_json::{json, Value};

use super::render::{AnthropicRender, ChatRole, GeminiRender, GeminiRole, OpenAiRender};
use super::{optional_bool, optional_str, require_str, Codec};
use crate::canonical::normalize_text;
use crate::error::KernelError;
use crate::types::block::Block;

/// Pinned system rules.
///
/// Payload: `{text, priority?, cacheable?}`. Canonicalization trims the
/// text and substitutes `priority = 0`, `cacheable = false` when absent.
pub struct SystemRulesCodec;

impl Codec for SystemRulesCodec {
    fn id(&self) -> &'static str {
        "system-rules"
    }

    fn version(&self) -> u32 {
        1
    }

    fn validate(&self, payload: &Value) -> Result<(), KernelError> {
        require_str(self.id(), payload, "text")?;
        if let Some(priority) = payload.get("priority") {
            if !priority.is_null() && !priority.is_i64() {
                return Err(KernelError::validation(self.id(), "priority", "must be an integer"));
            }
        }
        optional_bool(self.id(), payload, "cacheable")?;
        Ok(())
    }

    fn canonicalize(&self, payload: &Value) -> Value {
        json!({
            "cacheable": payload.get("cacheable").and_then(Value::as_bool).unwrap_or(false),
            "priority": payload.get("priority").and_then(Value::as_i64).unwrap_or(0),
            "text": normalize_text(payload["text"].as_str().unwrap_or_default()),
        })
    }

    fn render_anthropic(&self, block: &Block) -> Vec<AnthropicRender> {
        vec![AnthropicRender::System {
            text: text_of(block),
        }]
    }

    fn render_openai(&self, block: &Block) -> Vec<OpenAiRender> {
        vec![OpenAiRender {
            role: "system",
            content: text_of(block),
            tool_call_id: None,
        }]
    }

    fn render_gemini(&self, block: &Block) -> Vec<GeminiRender> {
        vec![GeminiRender::System {
            text: text_of(block),
        }]
    }
}

/// Unclassified free text, any kind.
///
/// Payload: `{text, role?}`; text trimmed, role defaults to `user`.
pub struct UnsafeTextCodec;

impl Codec for UnsafeTextCodec {
    fn id(&self) -> &'static str {
        "unsafe-text"
    }

    fn version(&self) -> u32 {
        1
    }

    fn validate(&self, payload: &Value) -> Result<(), KernelError> {
        require_str(self.id(), payload, "text")?;
        if let Some(role) = optional_str(self.id(), payload, "role")? {
            if role != "user" && role != "assistant" {
                return Err(KernelError::validation(
                    self.id(),
                    "role",
                    "must be 'user' or 'assistant'",
                ));
            }
        }
        Ok(())
    }

    fn canonicalize(&self, payload: &Value) -> Value {
        json!({
            "role": payload.get("role").and_then(Value::as_str).unwrap_or("user"),
            "text": normalize_text(payload["text"].as_str().unwrap_or_default()),
        })
    }

    fn render_anthropic(&self, block: &Block) -> Vec<AnthropicRender> {
        vec![AnthropicRender::Message {
            role: role_of(block),
            content: vec![json!({"type": "text", "text": text_of(block)})],
        }]
    }

    fn render_openai(&self, block: &Block) -> Vec<OpenAiRender> {
        let role = match role_of(block) {
            ChatRole::User => "user",
            ChatRole::Assistant => "assistant",
        };
        vec![OpenAiRender {
            role,
            content: text_of(block),
            tool_call_id: None,
        }]
    }

    fn render_gemini(&self, block: &Block) -> Vec<GeminiRender> {
        let role = match role_of(block) {
            ChatRole::User => GeminiRole::User,
            ChatRole::Assistant => GeminiRole::Model,
        };
        vec![GeminiRender::Content {
            role,
            parts: vec![json!({"text": text_of(block)})],
        }]
    }
}

/// The current user turn.
///
/// Payload: `{text}`, stored verbatim.
pub struct UserTurnCodec;

impl Codec for UserTurnCodec {
    fn id(&self) -> &'static str {
        "user-turn"
    }

    fn version(&self) -> u32 {
        1
    }

    fn validate(&self, payload: &Value) -> Result<(), KernelError> {
        require_str(self.id(), payload, "text")?;
        Ok(())
    }

    fn canonicalize(&self, payload: &Value) -> Value {
        json!({"text": payload["text"].as_str().unwrap_or_default()})
    }

    fn render_anthropic(&self, block: &Block) -> Vec<AnthropicRender> {
        vec![AnthropicRender::Message {
            role: ChatRole::User,
            content: vec![json!({"type": "text", "text": text_of(block)})],
        }]
    }

    fn render_openai(&self, block: &Block) -> Vec<OpenAiRender> {
        vec![OpenAiRender {
            role: "user",
            content: text_of(block),
            tool_call_id: None,
        }]
    }

    fn render_gemini(&self, block: &Block) -> Vec<GeminiRender> {
        vec![GeminiRender::Content {
            role: GeminiRole::User,
            parts: vec![json!({"text": text_of(block)})],
        }]
    }
}

fn text_of(block: &Block) -> String {
    block.payload["text"].as_str().unwrap_or_default().to_string()
}

fn role_of(block: &Block) -> ChatRole {
    match block.payload.get("role").and_then(Value::as_str) {
        Some("assistant") => ChatRole::Assistant,
        _ => ChatRole::User,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::block::BlockMeta;
    use crate::types::{BlockKind, Sensitivity};

    fn sealed(codec: &dyn Codec, kind: BlockKind, payload: Value) -> Block {
        codec.validate(&payload).unwrap();
        let meta = BlockMeta::new(kind, Sensitivity::Public, codec.id(), codec.version());
        Block::from_canonical(meta, codec.canonicalize(&payload))
    }

    #[test]
    fn test_system_rules_defaults() {
        let canonical = SystemRulesCodec.canonicalize(&json!({"text": " Be concise \r\n"}));
        assert_eq!(canonical, json!({"cacheable": false, "priority": 0, "text": "Be concise"}));
    }

    #[test]
    fn test_system_rules_trim_equivalence() {
        let h1 = SystemRulesCodec.payload_hash(&json!({"text": "Be concise"}));
        let h2 = SystemRulesCodec.payload_hash(&json!({"text": "  Be concise  "}));
        assert_eq!(h1, h2);
    }

    #[test]
    fn test_system_rules_renders_to_system_everywhere() {
        let block = sealed(&SystemRulesCodec, BlockKind::Pinned, json!({"text": "rules"}));
        assert!(matches!(
            SystemRulesCodec.render_anthropic(&block)[0],
            AnthropicRender::System { .. }
        ));
        assert_eq!(SystemRulesCodec.render_openai(&block)[0].role, "system");
        assert!(matches!(
            SystemRulesCodec.render_gemini(&block)[0],
            GeminiRender::System { .. }
        ));
    }

    #[test]
    fn test_unsafe_text_role_default() {
        let canonical = UnsafeTextCodec.canonicalize(&json!({"text": "hi"}));
        assert_eq!(canonical["role"], "user");
    }

    #[test]
    fn test_unsafe_text_rejects_bad_role() {
        assert!(UnsafeTextCodec
            .validate(&json!({"text": "hi", "role": "system"}))
            .is_err());
    }

    #[test]
    fn test_unsafe_text_assistant_maps_to_model() {
        let block = sealed(
            &UnsafeTextCodec,
            BlockKind::Memory,
            json!({"text": "noted", "role": "assistant"}),
        );
        match &UnsafeTextCodec.render_gemini(&block)[0] {
            GeminiRender::Content { role, .. } => assert_eq!(*role, GeminiRole::Model),
            other => panic!("unexpected render: {other:?}"),
        }
    }

    #[test]
    fn test_user_turn_verbatim() {
        let canonical = UserTurnCodec.canonicalize(&json!({"text": "  spaced  "}));
        assert_eq!(canonical["text"], "  spaced  ");
    }

    #[test]
    fn test_missing_text_rejected() {
        assert!(SystemRulesCodec.validate(&json!({})).is_err());
        assert!(UnsafeTextCodec.validate(&json!({"role": "user"})).is_err());
        assert!(UserTurnCodec.validate(&json!({})).is_err());
    }
}
