//! Token estimation capability.
//!
//! Estimation is advisory, never authoritative. Implementations may call
//! provider APIs or local BPE tables; the built-in reference is a
//! character heuristic with a safety multiplier and `Confidence::Low`.
//! Heavy resources (BPE vocabularies) belong to the implementation and
//! must be released by it at the end of each call.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::canonical::canonical_json_string;
use crate::error::KernelError;
use crate::types::block::Block;

/// How much to trust an estimate. `Exact` is best, `Low` is worst.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    /// Provider-reported exact count.
    Exact,
    /// Local tokenizer matching the target model family.
    High,
    /// Heuristic approximation.
    Low,
}

impl Confidence {
    /// The worse of two confidences.
    pub fn worst(self, other: Self) -> Self {
        self.max(other)
    }
}

/// A token estimate with its confidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenEstimate {
    /// Estimated token count.
    pub tokens: u64,
    /// Confidence of the estimate.
    pub confidence: Confidence,
}

impl TokenEstimate {
    /// Zero-token estimate with exact confidence (the empty aggregate).
    pub fn zero() -> Self {
        Self {
            tokens: 0,
            confidence: Confidence::Exact,
        }
    }
}

/// Async token estimation capability.
#[async_trait]
pub trait TokenEstimator: Send + Sync {
    /// Estimate an ordered block list as a whole.
    async fn estimate(&self, blocks: &[Block]) -> Result<TokenEstimate, KernelError>;

    /// Estimate a single block.
    async fn estimate_block(&self, block: &Block) -> Result<TokenEstimate, KernelError>;
}

/// Character-count heuristic: `chars / 4`, scaled by a safety multiplier.
///
/// Always reports `Confidence::Low`.
#[derive(Debug, Clone, Copy)]
pub struct HeuristicTokenEstimator {
    /// Scale applied on top of the chars/4 base (default 1.2).
    pub safety_multiplier: f64,
}

impl Default for HeuristicTokenEstimator {
    fn default() -> Self {
        Self {
            safety_multiplier: 1.2,
        }
    }
}

impl HeuristicTokenEstimator {
    fn estimate_sync(&self, block: &Block) -> u64 {
        let chars = canonical_json_string(&block.payload).chars().count() as f64;
        ((chars / 4.0) * self.safety_multiplier).ceil() as u64
    }
}

#[async_trait]
impl TokenEstimator for HeuristicTokenEstimator {
    async fn estimate(&self, blocks: &[Block]) -> Result<TokenEstimate, KernelError> {
        if blocks.is_empty() {
            return Ok(TokenEstimate::zero());
        }
        let tokens = blocks.iter().map(|b| self.estimate_sync(b)).sum();
        Ok(TokenEstimate {
            tokens,
            confidence: Confidence::Low,
        })
    }

    async fn estimate_block(&self, block: &Block) -> Result<TokenEstimate, KernelError> {
        Ok(TokenEstimate {
            tokens: self.estimate_sync(block),
            confidence: Confidence::Low,
        })
    }
}

/// Wrapper that degrades to the heuristic when the primary estimator
/// fails, logging a warning instead of propagating the error.
///
/// This is the intended treatment of estimator unavailability: a
/// recovered local failure, not a surfaced one.
pub struct FallbackTokenEstimator {
    primary: Arc<dyn TokenEstimator>,
    heuristic: HeuristicTokenEstimator,
}

impl FallbackTokenEstimator {
    /// Wrap a primary estimator.
    pub fn new(primary: Arc<dyn TokenEstimator>) -> Self {
        Self {
            primary,
            heuristic: HeuristicTokenEstimator::default(),
        }
    }
}

#[async_trait]
impl TokenEstimator for FallbackTokenEstimator {
    async fn estimate(&self, blocks: &[Block]) -> Result<TokenEstimate, KernelError> {
        match self.primary.estimate(blocks).await {
            Ok(estimate) => Ok(estimate),
            Err(err) => {
                tracing::warn!("token estimator unavailable, degrading to heuristic: {err}");
                self.heuristic.estimate(blocks).await
            }
        }
    }

    async fn estimate_block(&self, block: &Block) -> Result<TokenEstimate, KernelError> {
        match self.primary.estimate_block(block).await {
            Ok(estimate) => Ok(estimate),
            Err(err) => {
                tracing::warn!("token estimator unavailable, degrading to heuristic: {err}");
                self.heuristic.estimate_block(block).await
            }
        }
    }
}
