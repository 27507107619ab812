//! Tool output codec.

use serde_json::{json, Map, Value};

use super::render::{AnthropicRender, ChatRole, GeminiRender, GeminiRole, OpenAiRender};
use super::{require_str, Codec};
use crate::canonical::canonical_json_string;
use crate::error::KernelError;
use crate::types::block::Block;

/// Output of a tool invocation.
///
/// Payload: `{tool_name, tool_call_id, output, duration_ms?}` where
/// `output` is `{success: true, result}` or `{success: false, error}`, or
/// a plain string after compaction truncation. `duration_ms` is strictly
/// excluded from the canonical form and never appears in renderings.
pub struct ToolOutputCodec;

impl ToolOutputCodec {
    /// Whether a tool-output payload records a failed invocation.
    ///
    /// True when `output.success == false`, or the payload carries a
    /// truthy top-level `error`, or `status == "error"`. Truthy means
    /// present and neither `null` nor `false`.
    pub fn is_error(payload: &Value) -> bool {
        if payload
            .get("output")
            .and_then(|o| o.get("success"))
            .and_then(Value::as_bool)
            == Some(false)
        {
            return true;
        }
        match payload.get("error") {
            Some(Value::Null) | Some(Value::Bool(false)) | None => {}
            Some(_) => return true,
        }
        payload.get("status").and_then(Value::as_str) == Some("error")
    }

    /// Plain-text rendering of the output value.
    pub fn output_text(payload: &Value) -> String {
        match payload.get("output") {
            Some(Value::String(s)) => s.clone(),
            Some(output) => {
                if output.get("success").and_then(Value::as_bool) == Some(false) {
                    let error = output.get("error").cloned().unwrap_or(Value::Null);
                    match error {
                        Value::String(s) => format!("Error: {s}"),
                        other => format!("Error: {}", canonical_json_string(&other)),
                    }
                } else {
                    match output.get("result") {
                        Some(Value::String(s)) => s.clone(),
                        Some(other) => canonical_json_string(other),
                        None => String::new(),
                    }
                }
            }
            None => String::new(),
        }
    }
}

impl Codec for ToolOutputCodec {
    fn id(&self) -> &'static str {
        "tool-output"
    }

    fn version(&self) -> u32 {
        1
    }

    fn validate(&self, payload: &Value) -> Result<(), KernelError> {
        require_str(self.id(), payload, "tool_name")?;
        require_str(self.id(), payload, "tool_call_id")?;
        match payload.get("output") {
            Some(Value::String(_)) => Ok(()),
            Some(Value::Object(output)) => match output.get("success") {
                Some(Value::Bool(true)) => {
                    if output.contains_key("result") {
                        Ok(())
                    } else {
                        Err(KernelError::validation(
                            self.id(),
                            "output",
                            "successful output requires 'result'",
                        ))
                    }
                }
                Some(Value::Bool(false)) => {
                    if output.contains_key("error") {
                        Ok(())
                    } else {
                        Err(KernelError::validation(
                            self.id(),
                            "output",
                            "failed output requires 'error'",
                        ))
                    }
                }
                _ => Err(KernelError::validation(
                    self.id(),
                    "output",
                    "output object requires boolean 'success'",
                )),
            },
            _ => Err(KernelError::validation(
                self.id(),
                "output",
                "required field: object or string",
            )),
        }
    }

    fn canonicalize(&self, payload: &Value) -> Value {
        let mut obj: Map<String, Value> = payload.as_object().cloned().unwrap_or_default();
        obj.remove("duration_ms");
        Value::Object(obj)
    }

    fn render_anthropic(&self, block: &Block) -> Vec<AnthropicRender> {
        let tool_call_id = block.payload["tool_call_id"].as_str().unwrap_or_default();
        vec![AnthropicRender::Message {
            role: ChatRole::User,
            content: vec![json!({
                "type": "tool_result",
                "tool_use_id": tool_call_id,
                "content": Self::output_text(&block.payload),
                "is_error": Self::is_error(&block.payload),
            })],
        }]
    }

    fn render_openai(&self, block: &Block) -> Vec<OpenAiRender> {
        vec![OpenAiRender {
            role: "tool",
            content: Self::output_text(&block.payload),
            tool_call_id: block.payload["tool_call_id"].as_str().map(String::from),
        }]
    }

    fn render_gemini(&self, block: &Block) -> Vec<GeminiRender> {
        let tool_name = block.payload["tool_name"].as_str().unwrap_or_default();
        vec![GeminiRender::Content {
            role: GeminiRole::User,
            parts: vec![json!({
                "functionResponse": {
                    "name": tool_name,
                    "response": {"content": Self::output_text(&block.payload)},
                }
            })],
        }]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ok_payload(result: &str) -> Value {
        json!({
            "tool_name": "bash",
            "tool_call_id": "call_1",
            "output": {"success": true, "result": result},
            "duration_ms": 420
        })
    }

    #[test]
    fn test_duration_excluded_from_hash() {
        let mut with_other_duration = ok_payload("done");
        with_other_duration["duration_ms"] = json!(9999);
        assert_eq!(
            ToolOutputCodec.payload_hash(&ok_payload("done")),
            ToolOutputCodec.payload_hash(&with_other_duration)
        );
    }

    #[test]
    fn test_duration_absent_from_canonical() {
        let canonical = ToolOutputCodec.canonicalize(&ok_payload("done"));
        assert!(canonical.get("duration_ms").is_none());
    }

    #[test]
    fn test_validate_success_requires_result() {
        let payload = json!({
            "tool_name": "bash",
            "tool_call_id": "call_1",
            "output": {"success": true}
        });
        assert!(ToolOutputCodec.validate(&payload).is_err());
    }

    #[test]
    fn test_validate_failure_requires_error() {
        let payload = json!({
            "tool_name": "bash",
            "tool_call_id": "call_1",
            "output": {"success": false}
        });
        assert!(ToolOutputCodec.validate(&payload).is_err());
    }

    #[test]
    fn test_string_output_accepted() {
        let payload = json!({
            "tool_name": "bash",
            "tool_call_id": "call_1",
            "output": "... [truncated 900 chars] ...\ntail"
        });
        assert!(ToolOutputCodec.validate(&payload).is_ok());
        assert_eq!(
            ToolOutputCodec::output_text(&payload),
            "... [truncated 900 chars] ...\ntail"
        );
    }

    #[test]
    fn test_is_error_detection() {
        assert!(!ToolOutputCodec::is_error(&ok_payload("x")));

        let failed = json!({
            "tool_name": "bash", "tool_call_id": "c",
            "output": {"success": false, "error": "exit 1"}
        });
        assert!(ToolOutputCodec::is_error(&failed));

        let flagged = json!({
            "tool_name": "bash", "tool_call_id": "c",
            "output": "text", "error": "timeout"
        });
        assert!(ToolOutputCodec::is_error(&flagged));

        let status = json!({
            "tool_name": "bash", "tool_call_id": "c",
            "output": "text", "status": "error"
        });
        assert!(ToolOutputCodec::is_error(&status));

        let false_flag = json!({
            "tool_name": "bash", "tool_call_id": "c",
            "output": "text", "error": false
        });
        assert!(!ToolOutputCodec::is_error(&false_flag));
    }

    #[test]
    fn test_anthropic_tool_result_shape() {
        let meta = crate::types::block::BlockMeta::new(
            crate::types::BlockKind::ToolOutput,
            crate::types::Sensitivity::Public,
            "tool-output",
            1,
        );
        let block = crate::types::block::Block::from_canonical(
            meta,
            ToolOutputCodec.canonicalize(&ok_payload("done")),
        );
        match &ToolOutputCodec.render_anthropic(&block)[0] {
            AnthropicRender::Message { role, content } => {
                assert_eq!(*role, ChatRole::User);
                assert_eq!(content[0]["type"], "tool_result");
                assert_eq!(content[0]["tool_use_id"], "call_1");
                assert_eq!(content[0]["is_error"], false);
            }
            other => panic!("unexpected render: {other:?}"),
        }
    }
}
