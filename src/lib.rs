//! # ctx-block-kernel
//!
//! Deterministic block-graph engine for LLM context management.
//!
//! Instead of free-form string concatenation, callers compose a
//! content-addressed graph of typed *blocks*. The kernel guarantees:
//!
//! 1. Deterministic ordering: views sort by `(kind order, block hash)`
//! 2. Stable hashing: SHA-256 over canonical key-sorted JSON
//! 3. Token-budget enforcement at view materialization
//! 4. Sensitivity filtering with redacted, traceable stubs
//! 5. Lossy-but-traced compaction with per-step reports
//! 6. Provider-native rendering for Anthropic, OpenAI, and Gemini
//!
//! ## Architecture
//!
//! ```text
//! Blocks → ContextGraph → ContextView ─┬→ Compactor  (new block list + report)
//!               ↑                      ├→ Fork       (redacted view + execution hash)
//!        CodecRegistry                 └→ Compilers  (provider-native messages)
//! ```
//!
//! ## Determinism Guarantees
//!
//! - Same graph + same query + same estimator → identical
//!   `stable_prefix_hash`, independent of insertion order
//! - Volatile metadata (`created_at`, `source`, `tags`) never reaches a
//!   hash; identical content added at different times collides to one block
//! - Compilers are pure: same inputs → byte-identical messages

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod canonical;
pub mod codec;
pub mod compactor;
pub mod compile;
pub mod error;
pub mod estimator;
pub mod fork;
pub mod graph;
pub mod resolve;
pub mod store;
pub mod summarize;
pub mod types;
pub mod view;

// Re-exports
pub use canonical::{
    canonical_hash_hex, canonical_json_bytes, canonical_json_string, normalize_text, sha256_hex,
    CANONICAL_JSON_VERSION, EMPTY_OBJECT_HASH, EMPTY_PREFIX_HASH,
};
pub use codec::{
    AnthropicRender, ChatRole, Codec, CodecRegistry, ConversationHistoryCodec, GeminiRender,
    GeminiRole, OpenAiRender, RedactedStubCodec, StructuredReferenceCodec, SystemRulesCodec,
    ToolOutputCodec, ToolSchemaCodec, UnsafeTextCodec, UserTurnCodec,
};
pub use compactor::{
    CompactionOutcome, CompactionReport, CompactionStep, Compactor, PipelineCompactionConfig,
    StepReport,
};
pub use compile::{
    compile, resolve_cache_breakpoint, CacheSelector, CompileMeta, CompileOptions, CompiledContext,
};
pub use error::KernelError;
pub use estimator::{
    Confidence, FallbackTokenEstimator, HeuristicTokenEstimator, TokenEstimate, TokenEstimator,
};
pub use fork::{
    create_fork, execute_fork, execution_hash, ingest_fork_result, schema_hash, ExecutorOutput,
    ForkExecutor, ForkOptions, ForkProvenance, ForkResult, ForkTask,
};
pub use graph::{ContextGraph, GraphStats};
pub use resolve::{AttachmentRef, AttachmentResolver, ResolutionLevel, ResolvedAttachment};
pub use store::{ContextStore, InMemoryStore, StoreStats};
pub use summarize::{
    ensure_public, HistorySummarizer, SummarizeOptions, Summarizer, SummaryResult, UsageStats,
};
pub use types::block::{compute_block_hash, stable_prefix_hash, Block, BlockHash, BlockMeta};
pub use types::kind::{compare_blocks, sort_stable, validate_ordered};
pub use types::query::merge_queries;
pub use types::{
    BlockKind, BlockQuery, Diagnostic, OverflowStrategy, Policy, Provider, Sensitivity, Severity,
};
pub use view::{merge_views, ContextView, ViewOptions};

/// Schema version for all kernel types.
/// Increment on breaking changes to any hashed shape.
pub const BLOCK_KERNEL_SCHEMA_VERSION: &str = "1.0.0";
