//! Declarative block filters.
//!
//! Every criterion left unset is unconstrained; all set criteria
//! AND-combine. An *empty* `kinds` or `tags` set also means unconstrained,
//! so callers can build queries incrementally without tripping over empty
//! collections. The impossible query (produced by merging filters with
//! conflicting `source` values) is an explicit flag, and matches nothing.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::types::block::{Block, BlockHash};
use crate::types::kind::BlockKind;
use crate::types::sensitivity::Sensitivity;

/// Declarative AND-filter over blocks.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BlockQuery {
    /// Kind membership. Empty ⇒ unconstrained.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub kinds: BTreeSet<BlockKind>,
    /// Tags a block must *all* carry.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub tags: BTreeSet<String>,
    /// Minimum sensitivity (inclusive).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_sensitivity: Option<Sensitivity>,
    /// Maximum sensitivity (inclusive).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_sensitivity: Option<Sensitivity>,
    /// Exact source match.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    /// Inclusive lower bound on `created_at`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_created_at: Option<i64>,
    /// Inclusive upper bound on `created_at`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_created_at: Option<i64>,
    /// At least one derivation parent must be in this set.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub derived_from_any: BTreeSet<BlockHash>,
    /// No derivation parent may be in this set.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub not_derived_from_any: BTreeSet<BlockHash>,
    /// At least one outbound citation must be in this set.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub references_any: BTreeSet<BlockHash>,
    /// Block hashes excluded outright.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub exclude_hashes: BTreeSet<BlockHash>,
    /// Set when a merge collapsed to the unsatisfiable query.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub impossible: bool,
}

impl BlockQuery {
    /// The unconstrained query: matches every block.
    pub fn any() -> Self {
        Self::default()
    }

    /// The unsatisfiable query: matches no block.
    pub fn impossible() -> Self {
        Self {
            impossible: true,
            ..Self::default()
        }
    }

    /// Restrict to a set of kinds.
    pub fn with_kinds(mut self, kinds: impl IntoIterator<Item = BlockKind>) -> Self {
        self.kinds.extend(kinds);
        self
    }

    /// Require a tag.
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    /// Bound sensitivity from above.
    pub fn with_max_sensitivity(mut self, max: Sensitivity) -> Self {
        self.max_sensitivity = Some(max);
        self
    }

    /// Evaluate every criterion that does not involve graph edges.
    ///
    /// Stores without edge knowledge (see [`crate::store::ContextStore`])
    /// filter with this; the graph additionally applies
    /// [`BlockQuery::matches_edges`].
    pub fn matches_meta(&self, block: &Block) -> bool {
        if self.impossible {
            return false;
        }
        if !self.kinds.is_empty() && !self.kinds.contains(&block.meta.kind) {
            return false;
        }
        if !self.tags.iter().all(|t| block.meta.tags.contains(t)) {
            return false;
        }
        if let Some(min) = self.min_sensitivity {
            if block.meta.sensitivity < min {
                return false;
            }
        }
        if let Some(max) = self.max_sensitivity {
            if block.meta.sensitivity > max {
                return false;
            }
        }
        if let Some(source) = &self.source {
            if block.meta.source.as_deref() != Some(source.as_str()) {
                return false;
            }
        }
        if let Some(min) = self.min_created_at {
            if block.meta.created_at < min {
                return false;
            }
        }
        if let Some(max) = self.max_created_at {
            if block.meta.created_at > max {
                return false;
            }
        }
        if self.exclude_hashes.contains(&block.block_hash) {
            return false;
        }
        true
    }

    /// Evaluate the edge-dependent criteria against a block's recorded
    /// derivation parents and outbound citations.
    pub fn matches_edges(
        &self,
        derived_from: &[BlockHash],
        references: &BTreeSet<BlockHash>,
    ) -> bool {
        if self.impossible {
            return false;
        }
        if !self.derived_from_any.is_empty()
            && !derived_from.iter().any(|h| self.derived_from_any.contains(h))
        {
            return false;
        }
        if derived_from
            .iter()
            .any(|h| self.not_derived_from_any.contains(h))
        {
            return false;
        }
        if !self.references_any.is_empty()
            && !references.iter().any(|h| self.references_any.contains(h))
        {
            return false;
        }
        true
    }
}

/// AND-combine queries into one.
///
/// Kinds intersect, tag sets union (stricter), sensitivity bounds pick the
/// tighter, hash sets union, timestamp bounds pick the narrower range.
/// Conflicting `source` values collapse the result to the impossible
/// query, which matches nothing (not an error).
pub fn merge_queries(queries: &[BlockQuery]) -> BlockQuery {
    let mut merged = BlockQuery::any();
    for q in queries {
        if q.impossible {
            return BlockQuery::impossible();
        }
        if !q.kinds.is_empty() {
            merged.kinds = if merged.kinds.is_empty() {
                q.kinds.clone()
            } else {
                merged.kinds.intersection(&q.kinds).copied().collect()
            };
        }
        merged.tags.extend(q.tags.iter().cloned());
        merged.min_sensitivity = opt_max(merged.min_sensitivity, q.min_sensitivity);
        merged.max_sensitivity = opt_min(merged.max_sensitivity, q.max_sensitivity);
        match (&merged.source, &q.source) {
            (Some(a), Some(b)) if a != b => return BlockQuery::impossible(),
            (None, Some(b)) => merged.source = Some(b.clone()),
            _ => {}
        }
        merged.min_created_at = opt_max(merged.min_created_at, q.min_created_at);
        merged.max_created_at = opt_min(merged.max_created_at, q.max_created_at);
        merged.derived_from_any.extend(q.derived_from_any.iter().cloned());
        merged
            .not_derived_from_any
            .extend(q.not_derived_from_any.iter().cloned());
        merged.references_any.extend(q.references_any.iter().cloned());
        merged.exclude_hashes.extend(q.exclude_hashes.iter().cloned());
    }
    merged
}

fn opt_max<T: Ord>(a: Option<T>, b: Option<T>) -> Option<T> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.max(b)),
        (a, None) => a,
        (None, b) => b,
    }
}

fn opt_min<T: Ord>(a: Option<T>, b: Option<T>) -> Option<T> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, None) => a,
        (None, b) => b,
    }
}
