//! Lossy-but-traced context compaction.
//!
//! The compactor runs an ordered sequence of steps over a view's block
//! list and returns a fresh list, the removed blocks, and a per-step
//! report. It never mutates the input graph or view; a failing step aborts
//! the whole compaction, leaving the caller's blocks untouched.
//!
//! ## Provenance
//!
//! Every successor block produced by a step:
//! - carries `source = "<original source>:compacted"`,
//! - carries the tag `compacted:<step>`,
//! - has its hash recomputed from the new payload (hashes are
//!   content-addressed, never preserved),
//! - is listed in `derivations` with its parents so callers can record
//!   edges when re-inserting into a graph.

mod steps;

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::codec::CodecRegistry;
use crate::error::KernelError;
use crate::estimator::TokenEstimator;
use crate::summarize::HistorySummarizer;
use crate::types::block::{Block, BlockHash, BlockMeta};
use crate::view::ContextView;

/// A compaction step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompactionStep {
    /// Drop duplicate block hashes (first occurrence wins). Lossless.
    Dedupe,
    /// Bound tool outputs per tool and truncate long raw output.
    ToolOutputPrune,
    /// Keep only the most recent history blocks.
    HistoryTrim,
    /// Replace the older history prefix with a summarizer-produced block.
    SummarizeHistory,
}

impl fmt::Display for CompactionStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Dedupe => write!(f, "dedupe"),
            Self::ToolOutputPrune => write!(f, "tool_output_prune"),
            Self::HistoryTrim => write!(f, "history_trim"),
            Self::SummarizeHistory => write!(f, "summarize_history"),
        }
    }
}

/// Configuration for one compaction run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineCompactionConfig {
    /// Steps, applied in order.
    pub steps: Vec<CompactionStep>,
    /// Retained outputs per tool identity (codec id).
    pub max_outputs_per_tool: usize,
    /// Raw-output tail kept when truncating, in characters.
    pub max_raw_tail_chars: usize,
    /// Leave error outputs untruncated.
    pub preserve_error_tail: bool,
    /// Recent history blocks kept by the trim step.
    pub keep_recent_messages: usize,
    /// Also keep older history blocks that record an error.
    pub keep_error_messages: bool,
    /// Minimum history blocks before summarization applies.
    pub min_messages: usize,
}

impl Default for PipelineCompactionConfig {
    fn default() -> Self {
        Self {
            steps: vec![CompactionStep::Dedupe, CompactionStep::ToolOutputPrune],
            max_outputs_per_tool: 3,
            max_raw_tail_chars: 500,
            preserve_error_tail: true,
            keep_recent_messages: 20,
            keep_error_messages: true,
            min_messages: 20,
        }
    }
}

/// Per-step accounting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepReport {
    /// The step that ran.
    pub step: CompactionStep,
    /// Blocks removed outright.
    pub blocks_removed: usize,
    /// Blocks replaced with successors.
    pub blocks_replaced: usize,
    /// Estimated tokens saved by this step.
    pub tokens_saved: u64,
    /// Whether information was lost.
    pub lossy: bool,
    /// Human-readable summary of what happened.
    pub description: String,
}

/// Whole-run accounting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompactionReport {
    /// Estimated tokens before compaction.
    pub before_tokens: u64,
    /// Estimated tokens after compaction.
    pub after_tokens: u64,
    /// `before - after`, saturating.
    pub saved_tokens: u64,
    /// Steps that ran, in order.
    pub steps_applied: Vec<CompactionStep>,
    /// Per-step accounting.
    pub step_reports: Vec<StepReport>,
}

/// Result of a compaction run.
#[derive(Debug, Clone)]
pub struct CompactionOutcome {
    /// Surviving blocks, in view order (successors in place).
    pub blocks: Vec<Block>,
    /// Blocks removed by any step.
    pub removed_blocks: Vec<Block>,
    /// Accounting.
    pub report: CompactionReport,
    /// Successor provenance: `(successor hash, parent hashes)`. Callers
    /// re-inserting successors into a graph record these as derivation
    /// edges.
    pub derivations: Vec<(BlockHash, Vec<BlockHash>)>,
}

/// Outcome of a single step, before token accounting.
pub(crate) struct StepOutcome {
    pub blocks: Vec<Block>,
    pub removed: Vec<Block>,
    pub replaced: usize,
    pub lossy: bool,
    pub description: String,
    pub derivations: Vec<(BlockHash, Vec<BlockHash>)>,
}

/// Compaction pipeline bound to its collaborators.
pub struct Compactor<'a> {
    registry: &'a CodecRegistry,
    estimator: &'a dyn TokenEstimator,
    summarizer: Option<&'a dyn HistorySummarizer>,
}

impl<'a> Compactor<'a> {
    /// Create a compactor.
    pub fn new(
        registry: &'a CodecRegistry,
        estimator: &'a dyn TokenEstimator,
        summarizer: Option<&'a dyn HistorySummarizer>,
    ) -> Self {
        Self {
            registry,
            estimator,
            summarizer,
        }
    }

    /// Run the configured steps over a view.
    ///
    /// All-or-nothing: any step error aborts the run and the caller keeps
    /// the original view.
    pub async fn compact_view(
        &self,
        view: &ContextView,
        config: &PipelineCompactionConfig,
    ) -> Result<CompactionOutcome, KernelError> {
        let original = view.blocks().to_vec();
        let before_tokens = self.estimator.estimate(&original).await?.tokens;

        let mut working = original;
        let mut removed_blocks = Vec::new();
        let mut derivations = Vec::new();
        let mut step_reports = Vec::new();
        let mut steps_applied = Vec::new();

        for step in &config.steps {
            let step_before = self.estimator.estimate(&working).await?.tokens;
            let outcome = match step {
                CompactionStep::Dedupe => steps::dedupe(working),
                CompactionStep::ToolOutputPrune => {
                    steps::tool_output_prune(working, config, self.registry)?
                }
                CompactionStep::HistoryTrim => steps::history_trim(working, config),
                CompactionStep::SummarizeHistory => {
                    steps::summarize_history(
                        working,
                        config,
                        self.registry,
                        self.estimator,
                        self.summarizer,
                    )
                    .await?
                }
            };
            let step_after = self.estimator.estimate(&outcome.blocks).await?.tokens;

            tracing::debug!(
                step = %step,
                removed = outcome.removed.len(),
                replaced = outcome.replaced,
                "compaction step applied"
            );

            step_reports.push(StepReport {
                step: *step,
                blocks_removed: outcome.removed.len(),
                blocks_replaced: outcome.replaced,
                tokens_saved: step_before.saturating_sub(step_after),
                lossy: outcome.lossy,
                description: outcome.description,
            });
            steps_applied.push(*step);
            removed_blocks.extend(outcome.removed);
            derivations.extend(outcome.derivations);
            working = outcome.blocks;
        }

        let after_tokens = self.estimator.estimate(&working).await?.tokens;
        Ok(CompactionOutcome {
            blocks: working,
            removed_blocks,
            report: CompactionReport {
                before_tokens,
                after_tokens,
                saved_tokens: before_tokens.saturating_sub(after_tokens),
                steps_applied,
                step_reports,
            },
            derivations,
        })
    }
}

/// Metadata for a compactor-produced successor of `original`.
pub(crate) fn successor_meta(original: &BlockMeta, step: CompactionStep) -> BlockMeta {
    let mut meta = original.clone();
    meta.source = Some(format!(
        "{}:compacted",
        original.source.as_deref().unwrap_or("block")
    ));
    meta.tags.insert(format!("compacted:{step}"));
    meta
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_display_names() {
        assert_eq!(CompactionStep::Dedupe.to_string(), "dedupe");
        assert_eq!(CompactionStep::ToolOutputPrune.to_string(), "tool_output_prune");
        assert_eq!(CompactionStep::HistoryTrim.to_string(), "history_trim");
        assert_eq!(CompactionStep::SummarizeHistory.to_string(), "summarize_history");
    }

    #[test]
    fn test_successor_meta_provenance() {
        use crate::types::block::BlockMeta;
        use crate::types::{BlockKind, Sensitivity};

        let original = BlockMeta::new(BlockKind::ToolOutput, Sensitivity::Public, "tool-output", 1)
            .with_source("tool:bash");
        let meta = successor_meta(&original, CompactionStep::ToolOutputPrune);
        assert_eq!(meta.source.as_deref(), Some("tool:bash:compacted"));
        assert!(meta.tags.contains("compacted:tool_output_prune"));
    }

    #[test]
    fn test_successor_meta_without_source() {
        use crate::types::block::BlockMeta;
        use crate::types::{BlockKind, Sensitivity};

        let original = BlockMeta::new(BlockKind::History, Sensitivity::Public, "conversation-history", 1);
        let meta = successor_meta(&original, CompactionStep::SummarizeHistory);
        assert!(meta.source.unwrap().ends_with(":compacted"));
    }

    #[test]
    fn test_default_config() {
        let config = PipelineCompactionConfig::default();
        assert_eq!(config.max_outputs_per_tool, 3);
        assert_eq!(config.max_raw_tail_chars, 500);
        assert!(config.preserve_error_tail);
        assert_eq!(config.keep_recent_messages, 20);
    }
}
