//! Gemini GenerateContent assembly.
//!
//! System contributions are joined into a single system-instruction
//! string. Gemini requires strict user/model alternation, so adjacent
//! same-role contents are merged by concatenating their `parts` before
//! emission. A content with no parts is malformed: it earns an error
//! diagnostic and is dropped.

use serde_json::{json, Value};

use super::Assembly;
use crate::codec::{CodecRegistry, GeminiRender, GeminiRole};
use crate::error::KernelError;
use crate::types::block::Block;
use crate::types::diagnostics::Diagnostic;

pub(crate) fn assemble(blocks: &[Block], registry: &CodecRegistry) -> Result<Assembly, KernelError> {
    let mut system_parts: Vec<String> = Vec::new();
    let mut messages: Vec<Value> = Vec::new();
    let mut unrendered = Vec::new();
    let mut diagnostics = Vec::new();

    // Accumulate parts while the role is unchanged; emit on switch.
    let mut pending_role: Option<GeminiRole> = None;
    let mut pending_parts: Vec<Value> = Vec::new();

    let flush =
        |role: &mut Option<GeminiRole>, parts: &mut Vec<Value>, messages: &mut Vec<Value>, diagnostics: &mut Vec<Diagnostic>| {
            if let Some(role) = role.take() {
                if parts.is_empty() {
                    diagnostics.push(Diagnostic::error(
                        format!("empty-parts '{role}' content dropped"),
                        messages.len() as i64,
                    ));
                } else {
                    messages.push(json!({
                        "role": role.to_string(),
                        "parts": std::mem::take(parts),
                    }));
                }
            }
            parts.clear();
        };

    for block in blocks {
        let codec = registry.get(&block.meta.codec_id)?;
        let renders = codec.render_gemini(block);
        if renders.is_empty() {
            unrendered.push(block.block_hash.clone());
            continue;
        }
        for render in renders {
            match render {
                GeminiRender::System { text } => system_parts.push(text),
                GeminiRender::Content { role, parts } => {
                    if pending_role != Some(role) {
                        flush(&mut pending_role, &mut pending_parts, &mut messages, &mut diagnostics);
                        pending_role = Some(role);
                    }
                    pending_parts.extend(parts);
                }
            }
        }
    }
    flush(&mut pending_role, &mut pending_parts, &mut messages, &mut diagnostics);

    let system = if system_parts.is_empty() {
        None
    } else {
        Some(Value::String(system_parts.join("\n\n")))
    };
    Ok(Assembly {
        system,
        messages,
        unrendered,
        diagnostics,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::block::BlockMeta;
    use crate::types::{BlockKind, Sensitivity};

    fn registry() -> CodecRegistry {
        CodecRegistry::builtin()
    }

    fn text(registry: &CodecRegistry, role: &str, text: &str) -> Block {
        let meta = BlockMeta::new(BlockKind::Memory, Sensitivity::Public, "unsafe-text", 1);
        registry
            .create_block(meta, json!({"role": role, "text": text}))
            .unwrap()
    }

    #[test]
    fn test_five_user_blocks_merge_into_one() {
        let registry = registry();
        let blocks: Vec<Block> = (0..5)
            .map(|i| text(&registry, "user", &format!("part {i}")))
            .collect();
        let assembly = assemble(&blocks, &registry).unwrap();
        assert_eq!(assembly.messages.len(), 1);
        assert_eq!(assembly.messages[0]["role"], "user");
        assert_eq!(assembly.messages[0]["parts"].as_array().unwrap().len(), 5);
    }

    #[test]
    fn test_alternation_enforced() {
        let registry = registry();
        let blocks = vec![
            text(&registry, "user", "q1"),
            text(&registry, "assistant", "a1"),
            text(&registry, "assistant", "a2"),
            text(&registry, "user", "q2"),
        ];
        let assembly = assemble(&blocks, &registry).unwrap();
        let roles: Vec<&str> = assembly
            .messages
            .iter()
            .map(|m| m["role"].as_str().unwrap())
            .collect();
        assert_eq!(roles, vec!["user", "model", "user"]);
        for pair in roles.windows(2) {
            assert_ne!(pair[0], pair[1]);
        }
    }

    #[test]
    fn test_system_is_single_string() {
        let registry = registry();
        let make_pinned = |text: &str| {
            let meta = BlockMeta::new(BlockKind::Pinned, Sensitivity::Public, "system-rules", 1);
            registry.create_block(meta, json!({"text": text})).unwrap()
        };
        let blocks = vec![make_pinned("rule one"), make_pinned("rule two")];
        let assembly = assemble(&blocks, &registry).unwrap();
        assert_eq!(
            assembly.system,
            Some(Value::String("rule one\n\nrule two".to_string()))
        );
        assert!(assembly.messages.is_empty());
    }

    #[test]
    fn test_function_response_part() {
        let registry = registry();
        let meta = BlockMeta::new(BlockKind::ToolOutput, Sensitivity::Public, "tool-output", 1);
        let block = registry
            .create_block(
                meta,
                json!({
                    "tool_name": "search",
                    "tool_call_id": "c",
                    "output": {"success": true, "result": "hit"}
                }),
            )
            .unwrap();
        let assembly = assemble(&[block], &registry).unwrap();
        let part = &assembly.messages[0]["parts"][0];
        assert_eq!(part["functionResponse"]["name"], "search");
    }
}
