//! Deterministic ordered snapshots of selected blocks.
//!
//! ## Construction
//!
//! 1. Select blocks from the graph.
//! 2. Stable-sort by `(kind order, block hash)`.
//! 3. If a token estimator and a budget are supplied, accumulate per-block
//!    estimates in order and stop at the first block whose inclusion would
//!    exceed the budget.
//! 4. Compute the stable prefix hash and freeze.
//!
//! ## Identity
//!
//! Two views are equivalent iff their `stable_prefix_hash` match. The
//! prefix hash is SHA-256 over the `'|'`-joined ordered block hashes, so
//! it is independent of insertion order, wall clock, and estimator.

use serde::{Deserialize, Serialize};

use crate::error::KernelError;
use crate::estimator::{Confidence, TokenEstimate, TokenEstimator};
use crate::types::block::{stable_prefix_hash, Block, BlockHash};
use crate::types::kind::{sort_stable, validate_ordered};
use crate::types::query::BlockQuery;

/// Options for materializing a view from a graph.
#[derive(Default)]
pub struct ViewOptions<'a> {
    /// Block filter; unconstrained by default.
    pub query: BlockQuery,
    /// Token budget; `None` disables truncation.
    pub max_tokens: Option<u64>,
    /// Estimator used for budget application and the aggregate estimate.
    pub estimator: Option<&'a dyn TokenEstimator>,
}

/// Immutable, deterministically ordered snapshot of blocks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextView {
    blocks: Vec<Block>,
    /// Aggregate token estimate, when an estimator was supplied.
    pub token_estimate: Option<TokenEstimate>,
    /// SHA-256 over the `'|'`-joined ordered block hashes.
    pub stable_prefix_hash: String,
    /// Whether the budget excluded at least one selected block.
    pub truncated: bool,
    /// Unix seconds at materialization.
    pub created_at: i64,
}

impl ContextView {
    /// Materialize from selected blocks: sort, apply budget, hash, freeze.
    pub(crate) async fn materialize(
        mut blocks: Vec<Block>,
        max_tokens: Option<u64>,
        estimator: Option<&dyn TokenEstimator>,
    ) -> Result<Self, KernelError> {
        sort_stable(&mut blocks);

        let mut truncated = false;
        let mut token_estimate = None;

        match (estimator, max_tokens) {
            (Some(estimator), Some(budget)) => {
                let mut included = Vec::with_capacity(blocks.len());
                let mut total: u64 = 0;
                let mut confidence = Confidence::Exact;
                for block in blocks {
                    let estimate = estimator.estimate_block(&block).await?;
                    if total + estimate.tokens > budget {
                        truncated = true;
                        break;
                    }
                    total += estimate.tokens;
                    confidence = confidence.worst(estimate.confidence);
                    included.push(block);
                }
                blocks = included;
                token_estimate = Some(TokenEstimate {
                    tokens: total,
                    confidence,
                });
            }
            (Some(estimator), None) => {
                token_estimate = Some(estimator.estimate(&blocks).await?);
            }
            (None, _) => {}
        }

        Ok(Self::freeze(blocks, token_estimate, truncated))
    }

    /// Freeze an already-ordered block sequence without re-sorting.
    ///
    /// Used by the fork, whose index-preserving stub substitution must not
    /// disturb the parent's order.
    pub fn from_ordered(blocks: Vec<Block>) -> Self {
        Self::freeze(blocks, None, false)
    }

    fn freeze(blocks: Vec<Block>, token_estimate: Option<TokenEstimate>, truncated: bool) -> Self {
        let hash = stable_prefix_hash(blocks.iter().map(|b| &b.block_hash));
        Self {
            blocks,
            token_estimate,
            stable_prefix_hash: hash,
            truncated,
            created_at: chrono::Utc::now().timestamp(),
        }
    }

    /// The frozen block sequence.
    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    /// Ordered block hashes.
    pub fn block_hashes(&self) -> Vec<&BlockHash> {
        self.blocks.iter().map(|b| &b.block_hash).collect()
    }

    /// Number of blocks.
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// Whether the view holds no blocks.
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Whether the sequence respects the canonical kind order.
    pub fn is_ordered(&self) -> bool {
        validate_ordered(&self.blocks)
    }
}

impl PartialEq for ContextView {
    fn eq(&self, other: &Self) -> bool {
        self.stable_prefix_hash == other.stable_prefix_hash
    }
}

/// Merge views: concatenate, deduplicate by hash (first occurrence wins),
/// re-sort, re-hash. The merged view carries no token estimate.
pub fn merge_views(views: &[&ContextView]) -> ContextView {
    let mut seen = std::collections::BTreeSet::new();
    let mut blocks = Vec::new();
    for view in views {
        for block in view.blocks() {
            if seen.insert(block.block_hash.clone()) {
                blocks.push(block.clone());
            }
        }
    }
    sort_stable(&mut blocks);
    ContextView::from_ordered(blocks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canonical::EMPTY_PREFIX_HASH;
    use crate::estimator::HeuristicTokenEstimator;
    use crate::types::block::BlockMeta;
    use crate::types::{BlockKind, Sensitivity};
    use serde_json::json;

    fn block(kind: BlockKind, text: &str) -> Block {
        let meta = BlockMeta::new(kind, Sensitivity::Public, "unsafe-text", 1);
        Block::from_canonical(meta, json!({"role": "user", "text": text}))
    }

    #[tokio::test]
    async fn test_empty_view_has_constant_hash() {
        let view = ContextView::materialize(vec![], None, None).await.unwrap();
        assert!(view.is_empty());
        assert_eq!(view.stable_prefix_hash, EMPTY_PREFIX_HASH);
        assert!(!view.truncated);
    }

    #[tokio::test]
    async fn test_materialize_sorts_by_kind_then_hash() {
        let blocks = vec![
            block(BlockKind::History, "h"),
            block(BlockKind::Pinned, "p"),
            block(BlockKind::Memory, "m"),
        ];
        let view = ContextView::materialize(blocks, None, None).await.unwrap();
        assert!(view.is_ordered());
        assert_eq!(view.blocks()[0].meta.kind, BlockKind::Pinned);
        assert_eq!(view.blocks()[1].meta.kind, BlockKind::Memory);
        assert_eq!(view.blocks()[2].meta.kind, BlockKind::History);
    }

    #[tokio::test]
    async fn test_hash_tiebreak_within_kind() {
        let blocks = vec![
            block(BlockKind::Memory, "zzz"),
            block(BlockKind::Memory, "aaa"),
            block(BlockKind::Memory, "mmm"),
        ];
        let view = ContextView::materialize(blocks, None, None).await.unwrap();
        let hashes = view.block_hashes();
        assert!(hashes[0] < hashes[1]);
        assert!(hashes[1] < hashes[2]);
    }

    #[tokio::test]
    async fn test_zero_budget_truncates_everything() {
        let estimator = HeuristicTokenEstimator::default();
        let blocks = vec![block(BlockKind::Memory, "some content")];
        let view = ContextView::materialize(blocks, Some(0), Some(&estimator))
            .await
            .unwrap();
        assert!(view.is_empty());
        assert!(view.truncated);
    }

    #[tokio::test]
    async fn test_budget_respected() {
        let estimator = HeuristicTokenEstimator::default();
        let blocks: Vec<Block> = (0..10)
            .map(|i| block(BlockKind::Memory, &format!("content number {i} with padding")))
            .collect();

        let full = ContextView::materialize(blocks.clone(), None, Some(&estimator))
            .await
            .unwrap();
        let total = full.token_estimate.unwrap().tokens;

        let budget = total / 2;
        let view = ContextView::materialize(blocks, Some(budget), Some(&estimator))
            .await
            .unwrap();
        assert!(view.truncated);
        assert!(view.token_estimate.unwrap().tokens <= budget);
        assert!(view.len() < full.len());
    }

    #[tokio::test]
    async fn test_sort_is_idempotent() {
        let blocks = vec![
            block(BlockKind::Turn, "t"),
            block(BlockKind::Pinned, "p"),
        ];
        let once = ContextView::materialize(blocks, None, None).await.unwrap();
        let twice = ContextView::materialize(once.blocks().to_vec(), None, None)
            .await
            .unwrap();
        assert_eq!(once.stable_prefix_hash, twice.stable_prefix_hash);
    }

    #[tokio::test]
    async fn test_merge_views_identity_and_dedup() {
        let blocks = vec![block(BlockKind::Pinned, "p"), block(BlockKind::Memory, "m")];
        let view = ContextView::materialize(blocks, None, None).await.unwrap();

        let merged_single = merge_views(&[&view]);
        assert_eq!(merged_single.stable_prefix_hash, view.stable_prefix_hash);

        let merged_double = merge_views(&[&view, &view]);
        assert_eq!(merged_double.stable_prefix_hash, view.stable_prefix_hash);
        assert_eq!(merged_double.len(), view.len());
    }

    #[tokio::test]
    async fn test_views_equal_by_prefix_hash() {
        let b = block(BlockKind::Pinned, "same");
        let v1 = ContextView::materialize(vec![b.clone()], None, None).await.unwrap();
        let v2 = ContextView::materialize(vec![b], None, None).await.unwrap();
        assert_eq!(v1, v2);
    }
}
