//! Conversation history codec.

use serde_json::{json, Map, Value};

use super::render::{AnthropicRender, ChatRole, GeminiRender, GeminiRole, OpenAiRender};
use super::{optional_str, Codec};
use crate::canonical::canonical_json_string;
use crate::error::KernelError;
use crate::types::block::Block;

/// A span of conversation history.
///
/// Payload: `{messages: [{role, content, ...}], summary?}` where `role` is
/// `user` or `assistant` and `content` is a string or a structured value.
/// Canonicalization drops per-message `timestamp` and `message_id`; every
/// other message field (notably `error`) passes through.
pub struct ConversationHistoryCodec;

impl Codec for ConversationHistoryCodec {
    fn id(&self) -> &'static str {
        "conversation-history"
    }

    fn version(&self) -> u32 {
        1
    }

    fn validate(&self, payload: &Value) -> Result<(), KernelError> {
        let messages = payload
            .get("messages")
            .and_then(Value::as_array)
            .ok_or_else(|| {
                KernelError::validation(self.id(), "messages", "required array field")
            })?;
        for (i, message) in messages.iter().enumerate() {
            let obj = message.as_object().ok_or_else(|| {
                KernelError::validation(self.id(), "messages", format!("entry {i} must be an object"))
            })?;
            match obj.get("role").and_then(Value::as_str) {
                Some("user") | Some("assistant") => {}
                _ => {
                    return Err(KernelError::validation(
                        self.id(),
                        "messages",
                        format!("entry {i} role must be 'user' or 'assistant'"),
                    ))
                }
            }
            if obj.get("content").is_none() {
                return Err(KernelError::validation(
                    self.id(),
                    "messages",
                    format!("entry {i} is missing content"),
                ));
            }
        }
        optional_str(self.id(), payload, "summary")?;
        Ok(())
    }

    fn canonicalize(&self, payload: &Value) -> Value {
        let messages: Vec<Value> = payload["messages"]
            .as_array()
            .map(|messages| {
                messages
                    .iter()
                    .map(|message| {
                        let mut obj: Map<String, Value> =
                            message.as_object().cloned().unwrap_or_default();
                        obj.remove("timestamp");
                        obj.remove("message_id");
                        Value::Object(obj)
                    })
                    .collect()
            })
            .unwrap_or_default();
        let mut canonical = json!({"messages": messages});
        if let Some(summary) = payload.get("summary").and_then(Value::as_str) {
            canonical["summary"] = json!(summary);
        }
        canonical
    }

    fn render_anthropic(&self, block: &Block) -> Vec<AnthropicRender> {
        let mut out = Vec::new();
        if let Some(summary) = summary_of(block) {
            out.push(AnthropicRender::Message {
                role: ChatRole::User,
                content: vec![json!({
                    "type": "text",
                    "text": format!("[Conversation summary] {summary}"),
                })],
            });
        }
        for (role, text) in message_texts(block) {
            out.push(AnthropicRender::Message {
                role,
                content: vec![json!({"type": "text", "text": text})],
            });
        }
        out
    }

    fn render_openai(&self, block: &Block) -> Vec<OpenAiRender> {
        let mut out = Vec::new();
        if let Some(summary) = summary_of(block) {
            out.push(OpenAiRender {
                role: "user",
                content: format!("[Conversation summary] {summary}"),
                tool_call_id: None,
            });
        }
        for (role, text) in message_texts(block) {
            out.push(OpenAiRender {
                role: match role {
                    ChatRole::User => "user",
                    ChatRole::Assistant => "assistant",
                },
                content: text,
                tool_call_id: None,
            });
        }
        out
    }

    fn render_gemini(&self, block: &Block) -> Vec<GeminiRender> {
        let mut out = Vec::new();
        if let Some(summary) = summary_of(block) {
            out.push(GeminiRender::Content {
                role: GeminiRole::User,
                parts: vec![json!({"text": format!("[Conversation summary] {summary}")})],
            });
        }
        for (role, text) in message_texts(block) {
            out.push(GeminiRender::Content {
                role: match role {
                    ChatRole::User => GeminiRole::User,
                    ChatRole::Assistant => GeminiRole::Model,
                },
                parts: vec![json!({"text": text})],
            });
        }
        out
    }
}

fn summary_of(block: &Block) -> Option<String> {
    block
        .payload
        .get("summary")
        .and_then(Value::as_str)
        .map(String::from)
}

fn message_texts(block: &Block) -> Vec<(ChatRole, String)> {
    block.payload["messages"]
        .as_array()
        .map(|messages| {
            messages
                .iter()
                .map(|message| {
                    let role = match message.get("role").and_then(Value::as_str) {
                        Some("assistant") => ChatRole::Assistant,
                        _ => ChatRole::User,
                    };
                    let text = match message.get("content") {
                        Some(Value::String(s)) => s.clone(),
                        Some(other) => canonical_json_string(other),
                        None => String::new(),
                    };
                    (role, text)
                })
                .collect()
        })
        .unwrap_or_default()
}
