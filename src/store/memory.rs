//! In-memory reference store.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::BTreeMap;

use super::{ContextStore, StoreStats};
use crate::types::block::{Block, BlockHash};
use crate::types::query::BlockQuery;

/// Error type for the in-memory store. The store itself cannot fail;
/// the type exists to satisfy the trait contract.
#[derive(Debug, Clone, thiserror::Error)]
pub enum InMemoryStoreError {}

#[derive(Debug, Clone)]
struct StoredEntry {
    block: Block,
    expires_at: Option<i64>,
}

#[derive(Debug, Default)]
struct Inner {
    entries: BTreeMap<BlockHash, StoredEntry>,
    expired_total: u64,
}

/// In-memory block store with per-entry TTL.
///
/// Expiry is checked on every operation through the shared lock; there is
/// no background sweeper. Uses a `BTreeMap` for deterministic iteration.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    inner: RwLock<Inner>,
}

impl InMemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn purge_expired(inner: &mut Inner, now: i64) {
        let expired: Vec<BlockHash> = inner
            .entries
            .iter()
            .filter(|(_, e)| matches!(e.expires_at, Some(at) if at <= now))
            .map(|(h, _)| h.clone())
            .collect();
        inner.expired_total += expired.len() as u64;
        for hash in expired {
            inner.entries.remove(&hash);
        }
    }

    fn now() -> i64 {
        chrono::Utc::now().timestamp()
    }
}

#[async_trait]
impl ContextStore for InMemoryStore {
    type Error = InMemoryStoreError;

    async fn save(&self, block: &Block, ttl_seconds: Option<u64>) -> Result<(), Self::Error> {
        let mut inner = self.inner.write();
        let now = Self::now();
        Self::purge_expired(&mut inner, now);
        inner.entries.insert(
            block.block_hash.clone(),
            StoredEntry {
                block: block.clone(),
                expires_at: ttl_seconds.map(|ttl| now + ttl as i64),
            },
        );
        Ok(())
    }

    async fn load(&self, hash: &BlockHash) -> Result<Option<Block>, Self::Error> {
        let mut inner = self.inner.write();
        Self::purge_expired(&mut inner, Self::now());
        Ok(inner.entries.get(hash).map(|e| e.block.clone()))
    }

    async fn query(&self, query: &BlockQuery) -> Result<Vec<Block>, Self::Error> {
        let mut inner = self.inner.write();
        Self::purge_expired(&mut inner, Self::now());
        Ok(inner
            .entries
            .values()
            .filter(|e| query.matches_meta(&e.block))
            .map(|e| e.block.clone())
            .collect())
    }

    async fn delete(&self, hash: &BlockHash) -> Result<bool, Self::Error> {
        let mut inner = self.inner.write();
        Self::purge_expired(&mut inner, Self::now());
        Ok(inner.entries.remove(hash).is_some())
    }

    async fn delete_many(&self, hashes: &[BlockHash]) -> Result<usize, Self::Error> {
        let mut inner = self.inner.write();
        Self::purge_expired(&mut inner, Self::now());
        Ok(hashes
            .iter()
            .filter(|h| inner.entries.remove(h).is_some())
            .count())
    }

    async fn exists(&self, hash: &BlockHash) -> Result<bool, Self::Error> {
        let mut inner = self.inner.write();
        Self::purge_expired(&mut inner, Self::now());
        Ok(inner.entries.contains_key(hash))
    }

    async fn stats(&self) -> Result<StoreStats, Self::Error> {
        let mut inner = self.inner.write();
        Self::purge_expired(&mut inner, Self::now());
        Ok(StoreStats {
            block_count: inner.entries.len(),
            expired_total: inner.expired_total,
        })
    }

    async fn clear(&self) -> Result<(), Self::Error> {
        let mut inner = self.inner.write();
        inner.entries.clear();
        Ok(())
    }
}
