//! Summarization capabilities.
//!
//! Two distinct capabilities, deliberately not unified:
//!
//! - [`HistorySummarizer`] serves the compactor: collapse a span of
//!   history blocks into one smaller history block near a token target.
//! - [`Summarizer`] serves the fork path: produce a schema-validated
//!   summary of blocks for a sub-agent result, and reject non-public
//!   input outright.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::KernelError;
use crate::types::block::Block;
use crate::types::sensitivity::Sensitivity;

/// Token accounting for one model call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageStats {
    /// Prompt-side tokens.
    pub input_tokens: u64,
    /// Completion-side tokens.
    pub output_tokens: u64,
}

/// Options for a fork-facing summarization call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SummarizeOptions {
    /// Soft output size target.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_tokens: Option<u64>,
}

/// Result of a fork-facing summarization call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryResult {
    /// The summary text.
    pub summary: String,
    /// Free-form provenance recorded by the implementation.
    pub provenance: Value,
    /// Token accounting.
    pub usage: UsageStats,
}

/// Compactor-facing summarizer: many history blocks in, one block out.
#[async_trait]
pub trait HistorySummarizer: Send + Sync {
    /// Summarize `blocks` to roughly `target_tokens`, returning a single
    /// history-kind block.
    async fn summarize(&self, blocks: &[Block], target_tokens: u64)
        -> Result<Block, KernelError>;
}

/// Fork-facing, schema-validated summarizer.
#[async_trait]
pub trait Summarizer: Send + Sync {
    /// Summarize `blocks` against an output schema.
    ///
    /// Implementations must call [`ensure_public`] (or an equivalent
    /// check) before looking at block content.
    async fn summarize(
        &self,
        blocks: &[Block],
        schema: &Value,
        options: &SummarizeOptions,
    ) -> Result<SummaryResult, KernelError>;
}

/// Reject any block above `Public`.
///
/// The fork-facing summarizer only ever sees already-redacted views;
/// anything else reaching it is a caller bug surfaced as
/// [`KernelError::SensitivityViolation`].
pub fn ensure_public(blocks: &[Block]) -> Result<(), KernelError> {
    for block in blocks {
        if block.meta.sensitivity > Sensitivity::Public {
            return Err(KernelError::SensitivityViolation {
                level: block.meta.sensitivity.to_string(),
                max: Sensitivity::Public.to_string(),
                block_hash: block.block_hash.to_string(),
            });
        }
    }
    Ok(())
}
