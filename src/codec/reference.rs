//! Reference-kind codecs: tool schemas and structured documents.

use serde_json::{json, Value};

use super::render::{AnthropicRender, ChatRole, GeminiRender, GeminiRole, OpenAiRender};
use super::{optional_bool, optional_str, require_object, require_str, Codec};
use crate::canonical::canonical_json_string;
use crate::error::KernelError;
use crate::types::block::Block;

/// Tool definition made available to the model.
///
/// Payload: `{name, description, input_schema, cacheable?}`. The schema
/// participates in hashing in canonical (key-sorted) form, so two
/// definitions that differ only in key order collide.
pub struct ToolSchemaCodec;

impl Codec for ToolSchemaCodec {
    fn id(&self) -> &'static str {
        "tool-schema"
    }

    fn version(&self) -> u32 {
        1
    }

    fn validate(&self, payload: &Value) -> Result<(), KernelError> {
        require_str(self.id(), payload, "name")?;
        require_str(self.id(), payload, "description")?;
        require_object(self.id(), payload, "input_schema")?;
        optional_bool(self.id(), payload, "cacheable")?;
        Ok(())
    }

    fn canonicalize(&self, payload: &Value) -> Value {
        json!({
            "cacheable": payload.get("cacheable").and_then(Value::as_bool).unwrap_or(false),
            "description": payload["description"].as_str().unwrap_or_default(),
            "input_schema": payload["input_schema"].clone(),
            "name": payload["name"].as_str().unwrap_or_default(),
        })
    }

    fn render_anthropic(&self, block: &Block) -> Vec<AnthropicRender> {
        vec![AnthropicRender::Message {
            role: ChatRole::User,
            content: vec![json!({"type": "text", "text": tool_text(block)})],
        }]
    }

    fn render_openai(&self, block: &Block) -> Vec<OpenAiRender> {
        vec![OpenAiRender {
            role: "user",
            content: tool_text(block),
            tool_call_id: None,
        }]
    }

    fn render_gemini(&self, block: &Block) -> Vec<GeminiRender> {
        vec![GeminiRender::Content {
            role: GeminiRole::User,
            parts: vec![json!({"text": tool_text(block)})],
        }]
    }
}

fn tool_text(block: &Block) -> String {
    let name = block.payload["name"].as_str().unwrap_or_default();
    let description = block.payload["description"].as_str().unwrap_or_default();
    let schema = canonical_json_string(&block.payload["input_schema"]);
    format!("Tool: {name}\n{description}\nInput schema: {schema}")
}

/// Cited reference document.
///
/// Payload: `{title, content, source_url?, mime_type?, cacheable?}`.
/// Title is trimmed; content is kept verbatim; absent optionals are
/// omitted from the canonical form rather than substituted.
pub struct StructuredReferenceCodec;

impl Codec for StructuredReferenceCodec {
    fn id(&self) -> &'static str {
        "structured-reference"
    }

    fn version(&self) -> u32 {
        1
    }

    fn validate(&self, payload: &Value) -> Result<(), KernelError> {
        require_str(self.id(), payload, "title")?;
        require_str(self.id(), payload, "content")?;
        optional_str(self.id(), payload, "source_url")?;
        optional_str(self.id(), payload, "mime_type")?;
        optional_bool(self.id(), payload, "cacheable")?;
        Ok(())
    }

    fn canonicalize(&self, payload: &Value) -> Value {
        let mut canonical = json!({
            "cacheable": payload.get("cacheable").and_then(Value::as_bool).unwrap_or(false),
            "content": payload["content"].as_str().unwrap_or_default(),
            "title": payload["title"].as_str().unwrap_or_default().trim(),
        });
        if let Some(url) = payload.get("source_url").and_then(Value::as_str) {
            canonical["source_url"] = json!(url);
        }
        if let Some(mime) = payload.get("mime_type").and_then(Value::as_str) {
            canonical["mime_type"] = json!(mime);
        }
        canonical
    }

    fn render_anthropic(&self, block: &Block) -> Vec<AnthropicRender> {
        vec![AnthropicRender::Message {
            role: ChatRole::User,
            content: vec![json!({"type": "text", "text": reference_text(block)})],
        }]
    }

    fn render_openai(&self, block: &Block) -> Vec<OpenAiRender> {
        vec![OpenAiRender {
            role: "user",
            content: reference_text(block),
            tool_call_id: None,
        }]
    }

    fn render_gemini(&self, block: &Block) -> Vec<GeminiRender> {
        vec![GeminiRender::Content {
            role: GeminiRole::User,
            parts: vec![json!({"text": reference_text(block)})],
        }]
    }
}

fn reference_text(block: &Block) -> String {
    let title = block.payload["title"].as_str().unwrap_or_default();
    let content = block.payload["content"].as_str().unwrap_or_default();
    match block.payload.get("source_url").and_then(Value::as_str) {
        Some(url) => format!("# {title}\n{content}\nSource: {url}"),
        None => format!("# {title}\n{content}"),
    }
}
