//! The four compaction steps.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::{json, Value};

use super::{successor_meta, CompactionStep, PipelineCompactionConfig, StepOutcome};
use crate::codec::{CodecRegistry, ToolOutputCodec};
use crate::error::KernelError;
use crate::estimator::TokenEstimator;
use crate::summarize::HistorySummarizer;
use crate::types::block::Block;
use crate::types::kind::BlockKind;

/// History blocks retained verbatim by the summarize step.
const RETAIN_VERBATIM: usize = 10;

/// Fraction of the prefix estimate handed to the summarizer as target.
const SUMMARY_TARGET_RATIO: f64 = 0.3;

/// Keep the first occurrence of each block hash. Lossless.
pub(crate) fn dedupe(blocks: Vec<Block>) -> StepOutcome {
    let mut seen = BTreeSet::new();
    let mut kept = Vec::with_capacity(blocks.len());
    let mut removed = Vec::new();
    for block in blocks {
        if seen.insert(block.block_hash.clone()) {
            kept.push(block);
        } else {
            removed.push(block);
        }
    }
    let description = format!("removed {} duplicate blocks", removed.len());
    StepOutcome {
        blocks: kept,
        removed,
        replaced: 0,
        lossy: false,
        description,
        derivations: Vec::new(),
    }
}

/// Bound tool outputs per tool identity and truncate long raw output.
///
/// Tool identity is the codec id. Within each identity, blocks are ordered
/// by `created_at` (hash tiebreak) and only the most recent
/// `max_outputs_per_tool` survive. A kept block whose `output` is a plain
/// string longer than `max_raw_tail_chars` is replaced with a truncated
/// successor, unless it records an error and `preserve_error_tail` holds.
pub(crate) fn tool_output_prune(
    blocks: Vec<Block>,
    config: &PipelineCompactionConfig,
    registry: &CodecRegistry,
) -> Result<StepOutcome, KernelError> {
    // Partition tool outputs by codec id.
    let mut partitions: BTreeMap<String, Vec<usize>> = BTreeMap::new();
    for (i, block) in blocks.iter().enumerate() {
        if block.meta.kind == BlockKind::ToolOutput {
            partitions
                .entry(block.meta.codec_id.clone())
                .or_default()
                .push(i);
        }
    }

    let mut dropped: BTreeSet<usize> = BTreeSet::new();
    for indices in partitions.values() {
        if indices.len() <= config.max_outputs_per_tool {
            continue;
        }
        let mut by_age: Vec<usize> = indices.clone();
        by_age.sort_by(|&a, &b| {
            blocks[a]
                .meta
                .created_at
                .cmp(&blocks[b].meta.created_at)
                .then_with(|| blocks[a].block_hash.cmp(&blocks[b].block_hash))
        });
        let cut = by_age.len() - config.max_outputs_per_tool;
        dropped.extend(&by_age[..cut]);
    }

    let mut kept = Vec::with_capacity(blocks.len());
    let mut removed = Vec::new();
    let mut replaced = 0;
    let mut derivations = Vec::new();

    for (i, block) in blocks.into_iter().enumerate() {
        if dropped.contains(&i) {
            removed.push(block);
            continue;
        }
        if block.meta.kind != BlockKind::ToolOutput {
            kept.push(block);
            continue;
        }
        let raw = block.payload.get("output").and_then(Value::as_str);
        let Some(raw) = raw else {
            kept.push(block);
            continue;
        };
        let chars: Vec<char> = raw.chars().collect();
        if chars.len() <= config.max_raw_tail_chars {
            kept.push(block);
            continue;
        }
        if ToolOutputCodec::is_error(&block.payload) && config.preserve_error_tail {
            kept.push(block);
            continue;
        }

        let cut = chars.len() - config.max_raw_tail_chars;
        let tail: String = chars[cut..].iter().collect();
        let mut payload = block.payload.clone();
        payload["output"] = json!(format!("... [truncated {cut} chars] ...\n{tail}"));
        payload["_truncated"] = json!(true);

        let meta = successor_meta(&block.meta, CompactionStep::ToolOutputPrune);
        let successor = registry.create_block(meta, payload)?;
        derivations.push((successor.block_hash.clone(), vec![block.block_hash.clone()]));
        replaced += 1;
        kept.push(successor);
    }

    let lossy = !removed.is_empty() || replaced > 0;
    let description = format!(
        "kept last {} outputs per tool; removed {}, truncated {}",
        config.max_outputs_per_tool,
        removed.len(),
        replaced
    );
    Ok(StepOutcome {
        blocks: kept,
        removed,
        replaced,
        lossy,
        description,
        derivations,
    })
}

/// Keep the most recent history blocks; optionally retain older blocks
/// that record an error.
///
/// A message's `error` field counts as an error iff it is present and
/// neither `null` nor `false`.
pub(crate) fn history_trim(blocks: Vec<Block>, config: &PipelineCompactionConfig) -> StepOutcome {
    let history: Vec<usize> = chronological_history(&blocks);

    let mut keep: BTreeSet<usize> = history
        .iter()
        .rev()
        .take(config.keep_recent_messages)
        .copied()
        .collect();
    if config.keep_error_messages {
        for &i in &history {
            if !keep.contains(&i) && history_block_has_error(&blocks[i]) {
                keep.insert(i);
            }
        }
    }

    let mut kept = Vec::with_capacity(blocks.len());
    let mut removed = Vec::new();
    for (i, block) in blocks.into_iter().enumerate() {
        if block.meta.kind == BlockKind::History && !keep.contains(&i) {
            removed.push(block);
        } else {
            kept.push(block);
        }
    }

    let lossy = !removed.is_empty();
    let description = format!(
        "kept {} most recent history blocks, removed {}",
        config.keep_recent_messages,
        removed.len()
    );
    StepOutcome {
        blocks: kept,
        removed,
        replaced: 0,
        lossy,
        description,
        derivations: Vec::new(),
    }
}

/// Replace the older history prefix with a single summarizer-produced
/// block carrying provenance.
pub(crate) async fn summarize_history(
    blocks: Vec<Block>,
    config: &PipelineCompactionConfig,
    registry: &CodecRegistry,
    estimator: &dyn TokenEstimator,
    summarizer: Option<&dyn HistorySummarizer>,
) -> Result<StepOutcome, KernelError> {
    let noop = |blocks: Vec<Block>, description: String| StepOutcome {
        blocks,
        removed: Vec::new(),
        replaced: 0,
        lossy: false,
        description,
        derivations: Vec::new(),
    };

    let Some(summarizer) = summarizer else {
        return Ok(noop(blocks, "no summarizer configured".to_string()));
    };

    let history = chronological_history(&blocks);
    if history.len() < config.min_messages || history.len() <= RETAIN_VERBATIM {
        return Ok(noop(
            blocks,
            format!("history below threshold ({} blocks)", history.len()),
        ));
    }

    let prefix_indices: BTreeSet<usize> = history[..history.len() - RETAIN_VERBATIM]
        .iter()
        .copied()
        .collect();
    let prefix: Vec<Block> = history[..history.len() - RETAIN_VERBATIM]
        .iter()
        .map(|&i| blocks[i].clone())
        .collect();

    let prefix_tokens = estimator.estimate(&prefix).await?.tokens;
    let target_tokens = ((prefix_tokens as f64) * SUMMARY_TARGET_RATIO).ceil() as u64;
    let summary = summarizer.summarize(&prefix, target_tokens).await?;

    if summary.meta.kind != BlockKind::History {
        return Err(KernelError::validation(
            &summary.meta.codec_id,
            "kind",
            "summarizer must return a history block",
        ));
    }

    let mut meta = successor_meta(&summary.meta, CompactionStep::SummarizeHistory);
    meta.tags.insert("method:summarize".to_string());
    meta.tags.insert("summarizer:v1".to_string());
    let successor = registry.create_block(meta, summary.payload)?;

    let parent_hashes: Vec<_> = prefix.iter().map(|b| b.block_hash.clone()).collect();
    let derivations = vec![(successor.block_hash.clone(), parent_hashes)];

    let first_prefix = *prefix_indices.iter().next().expect("prefix is non-empty");
    let mut kept = Vec::with_capacity(blocks.len());
    let mut removed = Vec::new();
    for (i, block) in blocks.into_iter().enumerate() {
        if i == first_prefix {
            kept.push(successor.clone());
            removed.push(block);
        } else if prefix_indices.contains(&i) {
            removed.push(block);
        } else {
            kept.push(block);
        }
    }

    let description = format!(
        "summarized {} history blocks to ~{} tokens, retained last {} verbatim",
        removed.len(),
        target_tokens,
        RETAIN_VERBATIM
    );
    Ok(StepOutcome {
        blocks: kept,
        removed,
        replaced: 1,
        lossy: true,
        description,
        derivations,
    })
}

/// Indices of history blocks, oldest first (`created_at`, hash tiebreak).
fn chronological_history(blocks: &[Block]) -> Vec<usize> {
    let mut history: Vec<usize> = blocks
        .iter()
        .enumerate()
        .filter(|(_, b)| b.meta.kind == BlockKind::History)
        .map(|(i, _)| i)
        .collect();
    history.sort_by(|&a, &b| {
        blocks[a]
            .meta
            .created_at
            .cmp(&blocks[b].meta.created_at)
            .then_with(|| blocks[a].block_hash.cmp(&blocks[b].block_hash))
    });
    history
}

/// Whether any message in a history payload records an error.
///
/// Truthiness rule: the `error` field is present and neither `null` nor
/// `false`.
fn history_block_has_error(block: &Block) -> bool {
    block.payload["messages"]
        .as_array()
        .map(|messages| {
            messages.iter().any(|m| match m.get("error") {
                None | Some(Value::Null) | Some(Value::Bool(false)) => false,
                Some(_) => true,
            })
        })
        .unwrap_or(false)
}
