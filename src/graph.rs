//! Content-addressed block graph.
//!
//! The graph is a single-owner mutable structure: a block map keyed by
//! hash plus two edge maps. Callers sharing it across tasks must serialize
//! writes externally; reads are safe while no write is in flight.
//!
//! ## Invariants
//!
//! - Blocks are value objects: hash collision implies identical canonical
//!   content, so re-adding an existing hash is a no-op and edges recorded
//!   on the first add win.
//! - Removing a block deletes its outgoing edges only. Inbound references
//!   held by other blocks are not rewritten; queries tolerate dangling
//!   hashes.
//! - Edge payloads are hashes, never blocks.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::canonical::sha256_hex;
use crate::error::KernelError;
use crate::types::block::{Block, BlockHash};
use crate::types::query::BlockQuery;
use crate::view::{ContextView, ViewOptions};

/// Counts reported by [`ContextGraph::stats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphStats {
    /// Number of stored blocks.
    pub block_count: usize,
    /// Number of recorded derivation parents across all blocks.
    pub derivation_edge_count: usize,
    /// Number of recorded citations across all blocks.
    pub reference_edge_count: usize,
}

/// Block store keyed by hash, with derivation and reference edges.
#[derive(Debug, Clone, Default)]
pub struct ContextGraph {
    blocks: BTreeMap<BlockHash, Block>,
    derived_from: BTreeMap<BlockHash, Vec<BlockHash>>,
    references: BTreeMap<BlockHash, BTreeSet<BlockHash>>,
}

impl ContextGraph {
    /// Create an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a block with optional provenance and citation edges.
    ///
    /// Idempotent on `block_hash`: re-adding an existing hash is a no-op
    /// and preserves the originally recorded edges. Returns whether the
    /// block was newly inserted.
    pub fn add_block(
        &mut self,
        block: Block,
        derived_from: Vec<BlockHash>,
        references: Vec<BlockHash>,
    ) -> bool {
        let hash = block.block_hash.clone();
        if self.blocks.contains_key(&hash) {
            tracing::debug!(block_hash = %hash, "block already present, add is a no-op");
            return false;
        }
        if !derived_from.is_empty() {
            self.derived_from.insert(hash.clone(), derived_from);
        }
        if !references.is_empty() {
            self.references
                .insert(hash.clone(), references.into_iter().collect());
        }
        tracing::debug!(block_hash = %hash, kind = %block.meta.kind, "block added");
        self.blocks.insert(hash, block);
        true
    }

    /// Remove a block and its outgoing edges.
    ///
    /// Inbound references recorded by other blocks are left in place.
    pub fn remove_block(&mut self, hash: &BlockHash) -> bool {
        let removed = self.blocks.remove(hash).is_some();
        if removed {
            self.derived_from.remove(hash);
            self.references.remove(hash);
            tracing::debug!(block_hash = %hash, "block removed");
        }
        removed
    }

    /// Fetch a block by hash.
    pub fn get_block(&self, hash: &BlockHash) -> Option<&Block> {
        self.blocks.get(hash)
    }

    /// Derivation parents of a block (empty if none recorded).
    pub fn get_derived_from(&self, hash: &BlockHash) -> &[BlockHash] {
        self.derived_from.get(hash).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Outbound citations of a block (empty if none recorded).
    pub fn get_references(&self, hash: &BlockHash) -> Vec<BlockHash> {
        self.references
            .get(hash)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Filter blocks by query. Ordering is NOT guaranteed; callers that
    /// need order use [`ContextGraph::create_view`].
    pub fn select(&self, query: &BlockQuery) -> Vec<&Block> {
        static NO_PARENTS: &[BlockHash] = &[];
        let empty_refs = BTreeSet::new();
        self.blocks
            .values()
            .filter(|block| {
                if !query.matches_meta(block) {
                    return false;
                }
                let parents = self
                    .derived_from
                    .get(&block.block_hash)
                    .map(Vec::as_slice)
                    .unwrap_or(NO_PARENTS);
                let references = self.references.get(&block.block_hash).unwrap_or(&empty_refs);
                query.matches_edges(parents, references)
            })
            .collect()
    }

    /// Materialize a deterministic view: filter, sort, budget, hash.
    pub async fn create_view(&self, options: ViewOptions<'_>) -> Result<ContextView, KernelError> {
        let selected: Vec<Block> = self
            .select(&options.query)
            .into_iter()
            .cloned()
            .collect();
        tracing::debug!(selected = selected.len(), total = self.blocks.len(), "materializing view");
        ContextView::materialize(selected, options.max_tokens, options.estimator).await
    }

    /// Graph-wide counts.
    pub fn stats(&self) -> GraphStats {
        GraphStats {
            block_count: self.blocks.len(),
            derivation_edge_count: self.derived_from.values().map(Vec::len).sum(),
            reference_edge_count: self.references.values().map(BTreeSet::len).sum(),
        }
    }

    /// Number of stored blocks.
    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Deterministic fingerprint of the whole graph state.
    ///
    /// SHA-256 fold over the sorted block hashes and the sorted edge
    /// pairs; usable as a dataset version in downstream provenance.
    pub fn snapshot_fingerprint(&self) -> String {
        let mut input = String::new();
        for hash in self.blocks.keys() {
            input.push_str(hash.as_str());
            input.push('\n');
        }
        for (child, parents) in &self.derived_from {
            for parent in parents {
                input.push_str("d:");
                input.push_str(child.as_str());
                input.push('>');
                input.push_str(parent.as_str());
                input.push('\n');
            }
        }
        for (from, cited) in &self.references {
            for to in cited {
                input.push_str("r:");
                input.push_str(from.as_str());
                input.push('>');
                input.push_str(to.as_str());
                input.push('\n');
            }
        }
        sha256_hex(input.as_bytes())
    }
}
