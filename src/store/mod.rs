//! Block persistence back-ends.

pub mod memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::types::block::{Block, BlockHash};
use crate::types::query::BlockQuery;

/// Counts reported by [`ContextStore::stats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreStats {
    /// Live (unexpired) blocks.
    pub block_count: usize,
    /// Blocks dropped by TTL bookkeeping since creation.
    pub expired_total: u64,
}

/// Trait for block persistence back-ends.
///
/// Stores hold blocks only, not graph edges, so queries evaluate the
/// metadata criteria of a [`BlockQuery`]; edge criteria
/// (`derived_from_any`, `not_derived_from_any`, `references_any`) are
/// unconstrained here. TTL bookkeeping runs on each operation, not on a
/// background clock.
#[async_trait]
pub trait ContextStore: Send + Sync {
    /// Error type for store operations.
    type Error: std::error::Error + Send + Sync;

    /// Persist a block, optionally with a time-to-live in seconds.
    async fn save(&self, block: &Block, ttl_seconds: Option<u64>) -> Result<(), Self::Error>;

    /// Fetch a block by hash.
    async fn load(&self, hash: &BlockHash) -> Result<Option<Block>, Self::Error>;

    /// Fetch all blocks matching the metadata criteria of a query.
    async fn query(&self, query: &BlockQuery) -> Result<Vec<Block>, Self::Error>;

    /// Delete a block. Returns whether it was present.
    async fn delete(&self, hash: &BlockHash) -> Result<bool, Self::Error>;

    /// Delete several blocks. Returns how many were present.
    async fn delete_many(&self, hashes: &[BlockHash]) -> Result<usize, Self::Error>;

    /// Whether a block is present (and unexpired).
    async fn exists(&self, hash: &BlockHash) -> Result<bool, Self::Error>;

    /// Store-wide counts.
    async fn stats(&self) -> Result<StoreStats, Self::Error>;

    /// Drop everything.
    async fn clear(&self) -> Result<(), Self::Error>;
}

pub use memory::InMemoryStore;
