//! Block kinds and their canonical total order.
//!
//! The kind order is the single source of truth for compiled-context
//! ordering: `Pinned < Reference < Memory < State < ToolOutput < History
//! < Turn`. Violations of this order in a materialized view are a
//! programmer error, not a property of user documents.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::KernelError;
use crate::types::block::Block;

/// Kind of a context block. Closed enumeration with a canonical total order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockKind {
    /// Pinned system rules; always first in compiled context.
    Pinned,
    /// Reference material: tool schemas, documents.
    Reference,
    /// Long-lived memory distilled from earlier work.
    Memory,
    /// Current task or session state.
    State,
    /// Output of a tool invocation.
    ToolOutput,
    /// Conversation history.
    History,
    /// The current user turn; always last.
    Turn,
}

impl BlockKind {
    /// Canonical position of this kind, `0..=6`.
    pub fn order(&self) -> u8 {
        match self {
            Self::Pinned => 0,
            Self::Reference => 1,
            Self::Memory => 2,
            Self::State => 3,
            Self::ToolOutput => 4,
            Self::History => 5,
            Self::Turn => 6,
        }
    }

    /// Parse a kind from its canonical string form.
    ///
    /// An unrecognized name is a caller bug surfaced as
    /// [`KernelError::UnknownKind`], never a document validation failure.
    pub fn parse(s: &str) -> Result<Self, KernelError> {
        match s {
            "pinned" => Ok(Self::Pinned),
            "reference" => Ok(Self::Reference),
            "memory" => Ok(Self::Memory),
            "state" => Ok(Self::State),
            "tool_output" => Ok(Self::ToolOutput),
            "history" => Ok(Self::History),
            "turn" => Ok(Self::Turn),
            other => Err(KernelError::UnknownKind(other.to_string())),
        }
    }

    /// All kinds in canonical order.
    pub fn all() -> [Self; 7] {
        [
            Self::Pinned,
            Self::Reference,
            Self::Memory,
            Self::State,
            Self::ToolOutput,
            Self::History,
            Self::Turn,
        ]
    }
}

impl PartialOrd for BlockKind {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for BlockKind {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.order().cmp(&other.order())
    }
}

impl fmt::Display for BlockKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pinned => write!(f, "pinned"),
            Self::Reference => write!(f, "reference"),
            Self::Memory => write!(f, "memory"),
            Self::State => write!(f, "state"),
            Self::ToolOutput => write!(f, "tool_output"),
            Self::History => write!(f, "history"),
            Self::Turn => write!(f, "turn"),
        }
    }
}

/// Compare two blocks by `(kind order, block hash)`.
///
/// The lexicographic hash tiebreak makes the order total and independent
/// of insertion order.
pub fn compare_blocks(a: &Block, b: &Block) -> std::cmp::Ordering {
    a.meta
        .kind
        .cmp(&b.meta.kind)
        .then_with(|| a.block_hash.cmp(&b.block_hash))
}

/// Stable-sort blocks into canonical order.
pub fn sort_stable(blocks: &mut [Block]) {
    blocks.sort_by(compare_blocks);
}

/// Check that a block sequence respects the canonical kind order.
pub fn validate_ordered(blocks: &[Block]) -> bool {
    blocks
        .windows(2)
        .all(|w| w[0].meta.kind.order() <= w[1].meta.kind.order())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_order() {
        let all = BlockKind::all();
        for (i, kind) in all.iter().enumerate() {
            assert_eq!(kind.order() as usize, i);
        }
        assert!(BlockKind::Pinned < BlockKind::Reference);
        assert!(BlockKind::Reference < BlockKind::Memory);
        assert!(BlockKind::Memory < BlockKind::State);
        assert!(BlockKind::State < BlockKind::ToolOutput);
        assert!(BlockKind::ToolOutput < BlockKind::History);
        assert!(BlockKind::History < BlockKind::Turn);
    }

    #[test]
    fn test_parse_roundtrip() {
        for kind in BlockKind::all() {
            assert_eq!(BlockKind::parse(&kind.to_string()).unwrap(), kind);
        }
    }

    #[test]
    fn test_parse_unknown_is_error() {
        let err = BlockKind::parse("attachment").unwrap_err();
        match err {
            KernelError::UnknownKind(name) => assert_eq!(name, "attachment"),
            _ => panic!("expected UnknownKind"),
        }
    }

    #[test]
    fn test_serde_names_match_display() {
        for kind in BlockKind::all() {
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{kind}\""));
        }
    }
}
