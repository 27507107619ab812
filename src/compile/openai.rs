//! OpenAI chat-completions assembly.
//!
//! System content is inlined as `system` messages; roles are
//! `system`/`user`/`assistant`/`tool`. No cache marker exists. Order is
//! preserved; consecutive same-role messages are legal but suspicious, so
//! each run earns a warning diagnostic.

use serde_json::{json, Value};

use super::Assembly;
use crate::codec::CodecRegistry;
use crate::error::KernelError;
use crate::types::block::Block;
use crate::types::diagnostics::Diagnostic;

pub(crate) fn assemble(blocks: &[Block], registry: &CodecRegistry) -> Result<Assembly, KernelError> {
    let mut messages: Vec<Value> = Vec::new();
    let mut roles: Vec<&'static str> = Vec::new();
    let mut unrendered = Vec::new();

    for block in blocks {
        let codec = registry.get(&block.meta.codec_id)?;
        let renders = codec.render_openai(block);
        if renders.is_empty() {
            unrendered.push(block.block_hash.clone());
            continue;
        }
        for render in renders {
            let mut message = json!({"role": render.role, "content": render.content});
            if let Some(tool_call_id) = render.tool_call_id {
                message["tool_call_id"] = json!(tool_call_id);
            }
            messages.push(message);
            roles.push(render.role);
        }
    }

    let mut diagnostics = Vec::new();
    for i in 1..roles.len() {
        if roles[i] == roles[i - 1] {
            diagnostics.push(Diagnostic::warning(
                format!("consecutive '{}' messages at {} and {}", roles[i], i - 1, i),
                i as i64,
            ));
        }
    }

    Ok(Assembly {
        system: None,
        messages,
        unrendered,
        diagnostics,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::block::BlockMeta;
    use crate::types::{BlockKind, Sensitivity, Severity};

    fn registry() -> CodecRegistry {
        CodecRegistry::builtin()
    }

    fn text(registry: &CodecRegistry, kind: BlockKind, role: &str, text: &str) -> Block {
        let meta = BlockMeta::new(kind, Sensitivity::Public, "unsafe-text", 1);
        registry
            .create_block(meta, json!({"role": role, "text": text}))
            .unwrap()
    }

    #[test]
    fn test_system_inlined() {
        let registry = registry();
        let meta = BlockMeta::new(BlockKind::Pinned, Sensitivity::Public, "system-rules", 1);
        let pinned = registry.create_block(meta, json!({"text": "rules"})).unwrap();
        let assembly = assemble(&[pinned], &registry).unwrap();
        assert!(assembly.system.is_none());
        assert_eq!(assembly.messages[0]["role"], "system");
    }

    #[test]
    fn test_consecutive_same_role_warns() {
        let registry = registry();
        let blocks = vec![
            text(&registry, BlockKind::Memory, "user", "one"),
            text(&registry, BlockKind::Memory, "user", "two"),
            text(&registry, BlockKind::Memory, "assistant", "three"),
        ];
        let assembly = assemble(&blocks, &registry).unwrap();
        assert_eq!(assembly.messages.len(), 3);
        let warnings: Vec<_> = assembly
            .diagnostics
            .iter()
            .filter(|d| d.severity == Severity::Warning)
            .collect();
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].position, 1);
    }

    #[test]
    fn test_tool_message_carries_call_id() {
        let registry = registry();
        let meta = BlockMeta::new(BlockKind::ToolOutput, Sensitivity::Public, "tool-output", 1);
        let block = registry
            .create_block(
                meta,
                json!({
                    "tool_name": "bash",
                    "tool_call_id": "call_9",
                    "output": {"success": true, "result": "ok"}
                }),
            )
            .unwrap();
        let assembly = assemble(&[block], &registry).unwrap();
        assert_eq!(assembly.messages[0]["role"], "tool");
        assert_eq!(assembly.messages[0]["tool_call_id"], "call_9");
    }
}
