//! Anthropic Messages API assembly.
//!
//! System content goes to a separate `system` array; conversation blocks
//! become `user`/`assistant` messages with content-block bodies
//! (including `tool_result` parts). Block order is preserved exactly; the
//! compiler never re-orders.

use serde_json::{json, Value};

use super::{Assembly, CacheSelector};
use crate::codec::{AnthropicRender, CodecRegistry};
use crate::error::KernelError;
use crate::types::block::Block;
use crate::types::diagnostics::Diagnostic;
use crate::types::kind::BlockKind;

/// Resolve the cache-breakpoint selector over the pinned blocks.
///
/// Returns the index (into `blocks`) of the *last* matching pinned block,
/// plus diagnostics: an info on resolution, a warning (position −1) when
/// nothing matches, and a warning when more than ten blocks match.
pub fn resolve_cache_breakpoint(
    blocks: &[Block],
    selector: &CacheSelector,
) -> (Option<usize>, Vec<Diagnostic>) {
    let matches: Vec<usize> = blocks
        .iter()
        .enumerate()
        .filter(|(_, b)| b.meta.kind == BlockKind::Pinned && selector.matches(b))
        .map(|(i, _)| i)
        .collect();

    let mut diagnostics = Vec::new();
    let Some(&last) = matches.last() else {
        diagnostics.push(Diagnostic::warning(
            "cache breakpoint selector matched no pinned block",
            -1,
        ));
        return (None, diagnostics);
    };
    if matches.len() > 10 {
        diagnostics.push(Diagnostic::warning(
            format!("cache breakpoint selector matched {} blocks", matches.len()),
            last as i64,
        ));
    }
    diagnostics.push(Diagnostic::info(
        format!(
            "cache breakpoint resolved to block {last} ({} matches)",
            matches.len()
        ),
        last as i64,
    ));
    (Some(last), diagnostics)
}

pub(crate) fn assemble(
    blocks: &[Block],
    registry: &CodecRegistry,
    cache: Option<&CacheSelector>,
) -> Result<Assembly, KernelError> {
    let mut system_entries: Vec<Value> = Vec::new();
    // Source block index of each system entry, for cache placement.
    let mut system_sources: Vec<usize> = Vec::new();
    let mut messages = Vec::new();
    let mut unrendered = Vec::new();

    for (i, block) in blocks.iter().enumerate() {
        let codec = registry.get(&block.meta.codec_id)?;
        let renders = codec.render_anthropic(block);
        if renders.is_empty() {
            unrendered.push(block.block_hash.clone());
            continue;
        }
        for render in renders {
            match render {
                AnthropicRender::System { text } => {
                    system_entries.push(json!({"type": "text", "text": text}));
                    system_sources.push(i);
                }
                AnthropicRender::Message { role, content } => {
                    messages.push(json!({"role": role.to_string(), "content": content}));
                }
            }
        }
    }

    let mut diagnostics = Vec::new();
    if let Some(selector) = cache {
        let (resolved, mut cache_diagnostics) = resolve_cache_breakpoint(blocks, selector);
        diagnostics.append(&mut cache_diagnostics);
        if let Some(block_index) = resolved {
            // Attach to the last system entry sourced from the resolved
            // block; at most one entry carries the marker.
            if let Some(entry_index) = system_sources.iter().rposition(|&s| s == block_index) {
                system_entries[entry_index]["cache_control"] = json!({"type": "ephemeral"});
            }
        }
    }

    let system = if system_entries.is_empty() {
        None
    } else {
        Some(Value::Array(system_entries))
    };
    Ok(Assembly {
        system,
        messages,
        unrendered,
        diagnostics,
    })
}
