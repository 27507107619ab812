//! Provider compilers: view → provider-native message structures.
//!
//! Compilers are pure: the same `(view, policy, options)` inputs produce
//! byte-identical messages (only `meta.compiled_at` tracks the wall
//! clock). Token counts in the compiled result are advisory; the view's
//! estimate is authoritative for budget decisions.
//!
//! | Provider  | System placement       | Ordering rule                         |
//! |-----------|------------------------|----------------------------------------|
//! | Anthropic | Separate `system` array | No implicit re-ordering.              |
//! | OpenAI    | Inline `system` messages | Warn on consecutive same-role.       |
//! | Gemini    | Single system string   | Merge adjacent same-role into one entry. |

mod anthropic;
mod gemini;
mod openai;

pub use anthropic::resolve_cache_breakpoint;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::codec::CodecRegistry;
use crate::error::KernelError;
use crate::estimator::TokenEstimator;
use crate::types::block::{Block, BlockHash};
use crate::types::diagnostics::Diagnostic;
use crate::types::kind::BlockKind;
use crate::types::policy::{OverflowStrategy, Policy, Provider};
use crate::view::ContextView;

/// Selector for the Anthropic cache breakpoint.
///
/// A pinned block matches iff every set field equals the corresponding
/// block field; for `tag`, equality means the block's tag set contains
/// the value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheSelector {
    /// Match on block kind.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<BlockKind>,
    /// Match on codec id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub codec_id: Option<String>,
    /// Match on tag membership.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    /// Match on source label.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

impl CacheSelector {
    pub(crate) fn matches(&self, block: &Block) -> bool {
        if let Some(kind) = self.kind {
            if block.meta.kind != kind {
                return false;
            }
        }
        if let Some(codec_id) = &self.codec_id {
            if &block.meta.codec_id != codec_id {
                return false;
            }
        }
        if let Some(tag) = &self.tag {
            if !block.meta.tags.contains(tag) {
                return false;
            }
        }
        if let Some(source) = &self.source {
            if block.meta.source.as_deref() != Some(source.as_str()) {
                return false;
            }
        }
        true
    }
}

/// Compilation options.
#[derive(Debug, Clone, Default)]
pub struct CompileOptions {
    /// Anthropic cache-breakpoint selector; ignored by other providers.
    pub cache_breakpoint: Option<CacheSelector>,
}

/// Compilation metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompileMeta {
    /// Unix seconds at compilation.
    pub compiled_at: i64,
    /// Policy context window.
    pub context_window: u64,
    /// Policy completion reserve.
    pub completion_reserve: u64,
    /// `context_window - completion_reserve`.
    pub available_tokens: u64,
    /// Estimate exceeded the available budget (Compact strategy).
    pub overflowed: bool,
    /// Any compiled block carries compaction provenance.
    pub compacted: bool,
    /// Blocks were dropped to fit the budget (Truncate strategy).
    pub truncated: bool,
    /// Estimated tokens per kind over the compiled blocks.
    pub tokens_by_kind: BTreeMap<BlockKind, u64>,
}

/// Provider-native compilation of a view.
#[derive(Debug, Clone)]
pub struct CompiledContext {
    /// Target provider.
    pub provider: Provider,
    /// Target model.
    pub model_id: String,
    /// Provider-shaped system content: an array for Anthropic, a string
    /// for Gemini, absent for OpenAI (inline).
    pub system: Option<Value>,
    /// Provider-shaped messages, in order.
    pub messages: Vec<Value>,
    /// Advisory token estimate over the compiled blocks.
    pub estimated_tokens: u64,
    /// Source blocks that contributed to the output, in view order.
    pub blocks: Vec<Block>,
    /// Hashes of source blocks that produced no output: codec rendered
    /// nothing for this provider, or the block was dropped to fit the
    /// budget. Always populated, possibly empty.
    pub excluded_blocks: Vec<BlockHash>,
    /// Compiler diagnostics.
    pub diagnostics: Vec<Diagnostic>,
    /// Compilation metadata.
    pub meta: CompileMeta,
}

/// Per-provider assembly output.
pub(crate) struct Assembly {
    pub system: Option<Value>,
    pub messages: Vec<Value>,
    /// Blocks whose codec rendered nothing for the provider.
    pub unrendered: Vec<BlockHash>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Compile a view for the policy's provider.
pub async fn compile(
    view: &ContextView,
    policy: &Policy,
    options: &CompileOptions,
    registry: &CodecRegistry,
    estimator: &dyn TokenEstimator,
) -> Result<CompiledContext, KernelError> {
    policy.validate()?;

    let mut blocks: Vec<Block> = view.blocks().to_vec();
    let mut estimates = Vec::with_capacity(blocks.len());
    for block in &blocks {
        estimates.push(estimator.estimate_block(block).await?.tokens);
    }
    let mut total: u64 = estimates.iter().sum();

    let available = policy.available_tokens();
    let mut overflowed = false;
    let mut truncated = false;
    let mut excluded_blocks: Vec<BlockHash> = Vec::new();

    if total > available {
        match policy.overflow_strategy {
            OverflowStrategy::Error => {
                return Err(KernelError::Overflow {
                    estimated: total,
                    budget: available,
                });
            }
            OverflowStrategy::Truncate => {
                while total > available {
                    let Some(block) = blocks.pop() else { break };
                    let estimate = estimates.pop().unwrap_or(0);
                    total -= estimate;
                    excluded_blocks.push(block.block_hash);
                    truncated = true;
                }
                tracing::warn!(
                    dropped = excluded_blocks.len(),
                    available,
                    "compiled context truncated to fit budget"
                );
            }
            OverflowStrategy::Compact => {
                overflowed = true;
                tracing::info!(estimated = total, available, "context overflow, compaction expected");
            }
        }
    }

    let assembly = match policy.provider {
        Provider::Anthropic => {
            anthropic::assemble(&blocks, registry, options.cache_breakpoint.as_ref())?
        }
        Provider::OpenAi => openai::assemble(&blocks, registry)?,
        Provider::Gemini => gemini::assemble(&blocks, registry)?,
    };

    let mut tokens_by_kind: BTreeMap<BlockKind, u64> = BTreeMap::new();
    for (block, estimate) in blocks.iter().zip(&estimates) {
        *tokens_by_kind.entry(block.meta.kind).or_default() += estimate;
    }
    let compacted = blocks
        .iter()
        .any(|b| b.meta.tags.iter().any(|t| t.starts_with("compacted:")));

    excluded_blocks.extend(assembly.unrendered);

    Ok(CompiledContext {
        provider: policy.provider,
        model_id: policy.model_id.clone(),
        system: assembly.system,
        messages: assembly.messages,
        estimated_tokens: total,
        blocks,
        excluded_blocks,
        diagnostics: assembly.diagnostics,
        meta: CompileMeta {
            compiled_at: chrono::Utc::now().timestamp(),
            context_window: policy.context_window,
            completion_reserve: policy.completion_reserve,
            available_tokens: available,
            overflowed,
            compacted,
            truncated,
            tokens_by_kind,
        },
    })
}
