//! Sub-agent forks: sensitivity filtering, execution fingerprints, and
//! result ingestion.
//!
//! A fork is a sensitivity-filtered copy of a parent view handed to a
//! sub-agent. Blocks above the permitted level are replaced *in place* by
//! redacted stubs (same index, same kind), so positional structure
//! survives redaction; the fork never re-sorts the parent's order. The
//! parent view and graph are never mutated.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::canonical::{canonical_hash_hex, canonical_json_string};
use crate::codec::CodecRegistry;
use crate::error::KernelError;
use crate::graph::ContextGraph;
use crate::summarize::UsageStats;
use crate::types::block::{Block, BlockHash, BlockMeta};
use crate::types::kind::BlockKind;
use crate::types::sensitivity::Sensitivity;
use crate::view::ContextView;

/// Options for building a fork from a parent view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForkOptions {
    /// Maximum sensitivity allowed through unredacted.
    pub max_sensitivity: Sensitivity,
    /// Keep history blocks.
    pub include_history: bool,
    /// Keep state blocks.
    pub include_state: bool,
    /// Placeholder text for redacted stubs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<String>,
}

impl Default for ForkOptions {
    fn default() -> Self {
        Self {
            max_sensitivity: Sensitivity::Public,
            include_history: true,
            include_state: true,
            placeholder: None,
        }
    }
}

/// Build a sensitivity-filtered fork of a parent view.
///
/// Blocks above `max_sensitivity` become redacted stubs at the same
/// index; history and state blocks are then dropped per the flags; the
/// prefix hash is recomputed. Parent order is preserved throughout.
pub fn create_fork(
    parent: &ContextView,
    options: &ForkOptions,
    registry: &CodecRegistry,
) -> Result<ContextView, KernelError> {
    let mut blocks = Vec::with_capacity(parent.len());
    for block in parent.blocks() {
        let block = if block.meta.sensitivity > options.max_sensitivity {
            redacted_stub(block, options, registry)?
        } else {
            block.clone()
        };
        let dropped = (!options.include_history && block.meta.kind == BlockKind::History)
            || (!options.include_state && block.meta.kind == BlockKind::State);
        if !dropped {
            blocks.push(block);
        }
    }
    Ok(ContextView::from_ordered(blocks))
}

fn redacted_stub(
    original: &Block,
    options: &ForkOptions,
    registry: &CodecRegistry,
) -> Result<Block, KernelError> {
    let mut payload = json!({
        "original_block_hash": original.block_hash.as_str(),
        "reason": format!(
            "Sensitivity level '{}' exceeds maximum '{}'",
            original.meta.sensitivity, options.max_sensitivity
        ),
    });
    if let Some(placeholder) = &options.placeholder {
        payload["placeholder"] = json!(placeholder);
    }
    let mut meta = BlockMeta::new(original.meta.kind, Sensitivity::Public, "redacted-stub", 1)
        .with_tag("redacted");
    meta.source = original.meta.source.clone();
    registry.create_block(meta, payload)
}

/// SHA-256 digest of an output schema's canonical (key-sorted) form.
pub fn schema_hash(schema: &Value) -> String {
    canonical_hash_hex(schema)
}

/// Deterministic fingerprint of a sub-agent invocation.
///
/// SHA-256 over the canonical JSON of the invocation tuple; key order is
/// fixed by the canonical sort. A missing toolset version hashes as
/// `"none"`.
pub fn execution_hash(
    model: &str,
    view_hash: &str,
    instruction: &str,
    schema_digest: &str,
    toolset_version: Option<&str>,
) -> String {
    canonical_hash_hex(&json!({
        "instruction": instruction,
        "model": model,
        "schema_hash": schema_digest,
        "toolset_version": toolset_version.unwrap_or("none"),
        "view_hash": view_hash,
    }))
}

/// A sub-agent task definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForkTask {
    /// Instruction handed to the sub-agent.
    pub instruction: String,
    /// Expected output shape (JSON-schema-like structure).
    pub output_schema: Value,
    /// Field names that must not appear in the serialized output.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub forbidden_fields: Vec<String>,
    /// Model reference in `provider:model` form.
    pub model: String,
    /// Toolset version pinned for the invocation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub toolset_version: Option<String>,
}

/// What an executor returns from one sub-agent run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorOutput {
    /// Structured output, checked against the task schema.
    pub output: Value,
    /// Short natural-language summary.
    pub summary: String,
    /// Produced artifacts.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub artifacts: Vec<Value>,
    /// Parent-view blocks the output drew on.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub citations: Vec<BlockHash>,
    /// Token accounting.
    pub usage: UsageStats,
}

/// The callback that actually runs a prompt.
#[async_trait]
pub trait ForkExecutor: Send + Sync {
    /// Execute `instruction` against the forked view.
    async fn execute(
        &self,
        instruction: &str,
        view: &ContextView,
    ) -> Result<ExecutorOutput, KernelError>;
}

/// Provenance recorded on a completed fork.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForkProvenance {
    /// Prefix hash of the parent view the fork was cut from.
    pub source_view_hash: String,
    /// Deterministic invocation fingerprint.
    pub execution_hash: String,
    /// Unix seconds when the fork was built.
    pub forked_at: i64,
    /// Unix seconds when execution finished.
    pub completed_at: i64,
}

/// A completed sub-agent invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForkResult {
    /// Fresh identifier for this invocation.
    pub agent_id: Uuid,
    /// Model reference the task named.
    pub model: String,
    /// Sub-agent summary.
    pub summary: String,
    /// Schema-checked structured output.
    pub output: Value,
    /// Produced artifacts.
    pub artifacts: Vec<Value>,
    /// Cited parent blocks.
    pub citations: Vec<BlockHash>,
    /// Token accounting.
    pub usage: UsageStats,
    /// Provenance.
    pub provenance: ForkProvenance,
}

/// Build the fork, run the executor, and post-validate the result.
///
/// The instruction is extended with a forbidden-fields directive when the
/// task names any; after execution the serialized output is re-scanned
/// for those names and the call fails closed on a hit.
pub async fn execute_fork(
    parent: &ContextView,
    task: &ForkTask,
    options: &ForkOptions,
    executor: &dyn ForkExecutor,
    registry: &CodecRegistry,
) -> Result<ForkResult, KernelError> {
    let fork = create_fork(parent, options, registry)?;
    let forked_at = chrono::Utc::now().timestamp();

    let instruction = if task.forbidden_fields.is_empty() {
        task.instruction.clone()
    } else {
        format!(
            "{}\n\nDo not include these fields in your output: {}.",
            task.instruction,
            task.forbidden_fields.join(", ")
        )
    };

    let executed = executor.execute(&instruction, &fork).await?;
    validate_against_schema(&executed.output, &task.output_schema)?;

    let serialized = canonical_json_string(&executed.output);
    for field in &task.forbidden_fields {
        if serialized.contains(field.as_str()) {
            return Err(KernelError::ForbiddenFieldLeak {
                field: field.clone(),
            });
        }
    }

    let digest = schema_hash(&task.output_schema);
    let execution = execution_hash(
        &task.model,
        &fork.stable_prefix_hash,
        &task.instruction,
        &digest,
        task.toolset_version.as_deref(),
    );

    Ok(ForkResult {
        agent_id: Uuid::new_v4(),
        model: task.model.clone(),
        summary: executed.summary,
        output: executed.output,
        artifacts: executed.artifacts,
        citations: executed.citations,
        usage: executed.usage,
        provenance: ForkProvenance {
            source_view_hash: parent.stable_prefix_hash.clone(),
            execution_hash: execution,
            forked_at,
            completed_at: chrono::Utc::now().timestamp(),
        },
    })
}

/// Wrap a fork result as a memory block and insert it into the graph,
/// recording the citations as derivation parents.
pub fn ingest_fork_result(
    graph: &mut ContextGraph,
    result: &ForkResult,
    registry: &CodecRegistry,
) -> Result<BlockHash, KernelError> {
    let text = format!(
        "{}\n\n{}",
        result.summary,
        canonical_json_string(&result.output)
    );
    let meta = BlockMeta::new(BlockKind::Memory, Sensitivity::Public, "unsafe-text", 1)
        .with_source(format!("fork:{}", result.agent_id))
        .with_tag("fork-result");
    let block = registry.create_block(meta, json!({"role": "assistant", "text": text}))?;
    let hash = block.block_hash.clone();
    graph.add_block(block, result.citations.clone(), Vec::new());
    Ok(hash)
}

/// Structural check of an output value against a schema.
///
/// Covers the declared top-level `type`, the `required` property list,
/// and the declared types of present top-level properties. Full draft
/// JSON-Schema semantics belong to the executor side.
pub fn validate_against_schema(output: &Value, schema: &Value) -> Result<(), KernelError> {
    if let Some(expected) = schema.get("type").and_then(Value::as_str) {
        if !type_matches(output, expected) {
            return Err(KernelError::validation(
                "fork-output",
                "type",
                format!("expected {expected}"),
            ));
        }
    }
    if let Some(required) = schema.get("required").and_then(Value::as_array) {
        for field in required.iter().filter_map(Value::as_str) {
            if output.get(field).is_none() {
                return Err(KernelError::validation(
                    "fork-output",
                    field,
                    "required field missing from fork output",
                ));
            }
        }
    }
    if let Some(properties) = schema.get("properties").and_then(Value::as_object) {
        for (field, property) in properties {
            let (Some(value), Some(expected)) =
                (output.get(field), property.get("type").and_then(Value::as_str))
            else {
                continue;
            };
            if !type_matches(value, expected) {
                return Err(KernelError::validation(
                    "fork-output",
                    field,
                    format!("expected {expected}"),
                ));
            }
        }
    }
    Ok(())
}

fn type_matches(value: &Value, expected: &str) -> bool {
    match expected {
        "object" => value.is_object(),
        "array" => value.is_array(),
        "string" => value.is_string(),
        "number" => value.is_number(),
        "integer" => value.is_i64() || value.is_u64(),
        "boolean" => value.is_boolean(),
        "null" => value.is_null(),
        _ => true,
    }
}
