//! Caller-facing policy: budgets and strategies.
//!
//! The policy is declarative configuration consumed by the provider
//! compilers and by higher-level schedulers. The view itself enforces only
//! the single `max_tokens` budget; `kind_priorities` is advisory.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::KernelError;
use crate::types::kind::BlockKind;
use crate::types::sensitivity::Sensitivity;

/// Target LLM provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    /// Anthropic Messages API.
    Anthropic,
    /// OpenAI chat completions.
    OpenAi,
    /// Google Gemini GenerateContent.
    Gemini,
}

impl Provider {
    /// Default context window (tokens) for the provider's current models.
    pub fn default_context_window(&self) -> u64 {
        match self {
            Self::Anthropic => 200_000,
            Self::OpenAi => 128_000,
            Self::Gemini => 1_048_576,
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Anthropic => write!(f, "anthropic"),
            Self::OpenAi => write!(f, "openai"),
            Self::Gemini => write!(f, "gemini"),
        }
    }
}

/// What to do when the estimate exceeds the available budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OverflowStrategy {
    /// Surface [`KernelError::Overflow`].
    Error,
    /// Drop trailing blocks until the estimate fits.
    #[default]
    Truncate,
    /// Compile everything and flag `overflowed`; the caller is expected to
    /// run a compaction pass.
    Compact,
}

/// Advisory per-kind budget for higher-level schedulers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KindPriority {
    /// Kind this entry applies to.
    pub kind: BlockKind,
    /// Floor the scheduler should try to preserve.
    pub min_tokens: u64,
    /// Ceiling the scheduler should not exceed.
    pub max_tokens: u64,
    /// Whether blocks of this kind may be truncated.
    pub truncatable: bool,
}

/// Compaction knobs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompactionPolicy {
    /// Enable tool-output pruning.
    pub prune_tool_outputs: bool,
    /// Maximum age (seconds) before a tool output is prunable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tool_output_age: Option<u64>,
    /// Retained outputs per tool identity.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tool_outputs_per_kind: Option<usize>,
    /// Enable history summarization.
    pub summarize_history: bool,
    /// Retained recent history blocks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_history_messages: Option<usize>,
}

impl Default for CompactionPolicy {
    fn default() -> Self {
        Self {
            prune_tool_outputs: true,
            max_tool_output_age: None,
            max_tool_outputs_per_kind: Some(3),
            summarize_history: false,
            max_history_messages: Some(20),
        }
    }
}

/// Sensitivity handling knobs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensitivityPolicy {
    /// Maximum level allowed through unredacted.
    pub max_sensitivity: Sensitivity,
    /// Replace restricted blocks with stubs rather than dropping them.
    pub redact_restricted: bool,
}

impl Default for SensitivityPolicy {
    fn default() -> Self {
        Self {
            max_sensitivity: Sensitivity::Internal,
            redact_restricted: true,
        }
    }
}

/// Ranking criterion for attachment selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RankCriterion {
    /// Rank by declared purpose.
    Purpose,
    /// Rank by explicit user mention.
    UserMention,
    /// Rank by recency.
    Recency,
}

/// Declared purpose of an attachment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttachmentPurpose {
    /// Supporting evidence.
    Evidence,
    /// Direct task input.
    Input,
    /// Background context.
    Context,
    /// Produced artifact.
    Artifact,
}

/// Attachment budget and selection strategy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentPolicy {
    /// Total token budget across attachments.
    pub max_tokens_total: u64,
    /// Ranking order applied when the budget forces a choice.
    pub rank_by: Vec<RankCriterion>,
    /// Relative priority per purpose (higher wins).
    pub purpose_priority: BTreeMap<AttachmentPurpose, i32>,
}

impl Default for AttachmentPolicy {
    fn default() -> Self {
        Self {
            max_tokens_total: 20_000,
            rank_by: vec![
                RankCriterion::Purpose,
                RankCriterion::UserMention,
                RankCriterion::Recency,
            ],
            purpose_priority: BTreeMap::from([
                (AttachmentPurpose::Evidence, 3),
                (AttachmentPurpose::Input, 2),
                (AttachmentPurpose::Context, 1),
                (AttachmentPurpose::Artifact, 0),
            ]),
        }
    }
}

/// Caller-facing configuration for compilation and compaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Policy {
    /// Target provider.
    pub provider: Provider,
    /// Target model identifier.
    pub model_id: String,
    /// Context window in tokens.
    pub context_window: u64,
    /// Tokens reserved for the completion.
    pub completion_reserve: u64,
    /// Overflow behavior at compile time.
    pub overflow_strategy: OverflowStrategy,
    /// Advisory per-kind budgets.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub kind_priorities: Vec<KindPriority>,
    /// Compaction knobs.
    pub compaction: CompactionPolicy,
    /// Sensitivity knobs.
    pub sensitivity: SensitivityPolicy,
    /// Attachment knobs.
    pub attachments: AttachmentPolicy,
}

impl Policy {
    /// Default reserve subtracted from the context window.
    pub const DEFAULT_COMPLETION_RESERVE: u64 = 4_096;

    /// Build a policy with provider defaults.
    pub fn for_provider(provider: Provider, model_id: impl Into<String>) -> Self {
        Self {
            provider,
            model_id: model_id.into(),
            context_window: provider.default_context_window(),
            completion_reserve: Self::DEFAULT_COMPLETION_RESERVE,
            overflow_strategy: OverflowStrategy::default(),
            kind_priorities: Vec::new(),
            compaction: CompactionPolicy::default(),
            sensitivity: SensitivityPolicy::default(),
            attachments: AttachmentPolicy::default(),
        }
    }

    /// Tokens available for context after the completion reserve.
    pub fn available_tokens(&self) -> u64 {
        self.context_window.saturating_sub(self.completion_reserve)
    }

    /// Sanity-check the configuration.
    pub fn validate(&self) -> Result<(), KernelError> {
        if self.completion_reserve >= self.context_window {
            return Err(KernelError::validation(
                "policy",
                "completion_reserve",
                format!(
                    "completion reserve {} leaves no room in context window {}",
                    self.completion_reserve, self.context_window
                ),
            ));
        }
        if self.model_id.is_empty() {
            return Err(KernelError::validation("policy", "model_id", "must not be empty"));
        }
        Ok(())
    }

    /// Model reference in `provider:model` form, used in execution hashes.
    pub fn model_ref(&self) -> String {
        format!("{}:{}", self.provider, self.model_id)
    }
}
