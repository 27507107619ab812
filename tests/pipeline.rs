//! Integration tests for the compaction pipeline and the fork lifecycle.

use async_trait::async_trait;
use ctx_block_kernel::{
    execute_fork, ingest_fork_result, Block, BlockKind, BlockMeta, CodecRegistry,
    CompactionStep, Compactor, ContextGraph, ContextView, ExecutorOutput, ForkExecutor,
    ForkOptions, ForkTask, HeuristicTokenEstimator, HistorySummarizer, KernelError,
    PipelineCompactionConfig, Sensitivity, UsageStats, ViewOptions,
};
use serde_json::json;

// ─────────────────────────────────────────────────────────────────────────────
// Test Helpers
// ─────────────────────────────────────────────────────────────────────────────

fn registry() -> CodecRegistry {
    CodecRegistry::builtin()
}

fn tool_block(registry: &CodecRegistry, created_at: i64, output: &str) -> Block {
    let meta = BlockMeta::new(BlockKind::ToolOutput, Sensitivity::Public, "tool-output", 1)
        .with_created_at(created_at)
        .with_source("tool:bash");
    registry
        .create_block(
            meta,
            json!({
                "tool_name": "bash",
                "tool_call_id": format!("call_{created_at}"),
                "output": output,
            }),
        )
        .unwrap()
}

fn history_block(registry: &CodecRegistry, created_at: i64, text: &str) -> Block {
    let meta = BlockMeta::new(
        BlockKind::History,
        Sensitivity::Public,
        "conversation-history",
        1,
    )
    .with_created_at(created_at);
    registry
        .create_block(meta, json!({"messages": [{"role": "user", "content": text}]}))
        .unwrap()
}

struct StubSummarizer;

#[async_trait]
impl HistorySummarizer for StubSummarizer {
    async fn summarize(&self, blocks: &[Block], _target_tokens: u64) -> Result<Block, KernelError> {
        let meta = BlockMeta::new(
            BlockKind::History,
            Sensitivity::Public,
            "conversation-history",
            1,
        )
        .with_source("summarizer");
        Ok(Block::from_canonical(
            meta,
            json!({
                "messages": [],
                "summary": format!("condensed {} blocks", blocks.len()),
            }),
        ))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// COMPACTION
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_dedupe_scenario_three_copies() {
    let registry = registry();
    let estimator = HeuristicTokenEstimator::default();
    let block = tool_block(&registry, 1, "result");
    let view = ContextView::from_ordered(vec![block.clone(), block.clone(), block]);

    let compactor = Compactor::new(&registry, &estimator, None);
    let config = PipelineCompactionConfig {
        steps: vec![CompactionStep::Dedupe],
        ..PipelineCompactionConfig::default()
    };
    let outcome = compactor.compact_view(&view, &config).await.unwrap();

    assert_eq!(outcome.blocks.len(), 1);
    assert_eq!(outcome.removed_blocks.len(), 2);
    assert!(!outcome.report.step_reports[0].lossy);
}

#[tokio::test]
async fn test_tool_output_prune_scenario_ten_outputs() {
    let registry = registry();
    let estimator = HeuristicTokenEstimator::default();
    let mut blocks: Vec<Block> = (1..=10).map(|i| tool_block(&registry, i, "ok")).collect();
    // One long non-error output among the survivors.
    blocks.push(tool_block(&registry, 11, &"y".repeat(400)));
    let view = ContextView::from_ordered(blocks);

    let compactor = Compactor::new(&registry, &estimator, None);
    let config = PipelineCompactionConfig {
        steps: vec![CompactionStep::ToolOutputPrune],
        max_outputs_per_tool: 3,
        max_raw_tail_chars: 100,
        ..PipelineCompactionConfig::default()
    };
    let outcome = compactor.compact_view(&view, &config).await.unwrap();

    assert_eq!(outcome.blocks.len(), 3);
    assert_eq!(outcome.removed_blocks.len(), 8);
    let survivors: Vec<i64> = outcome.blocks.iter().map(|b| b.meta.created_at).collect();
    assert_eq!(survivors, vec![9, 10, 11]);

    let truncated = outcome
        .blocks
        .iter()
        .find(|b| b.payload.get("_truncated") == Some(&json!(true)))
        .expect("long output should be truncated");
    let text = truncated.payload["output"].as_str().unwrap();
    assert!(text.starts_with("... [truncated"));
    assert!(text.ends_with(&"y".repeat(100)));
    assert!(truncated.meta.tags.contains("compacted:tool_output_prune"));

    let report = &outcome.report.step_reports[0];
    assert!(report.lossy);
    assert_eq!(report.blocks_removed, 8);
    assert_eq!(report.blocks_replaced, 1);
}

#[tokio::test]
async fn test_history_trim_noop_when_under_budget() {
    let registry = registry();
    let estimator = HeuristicTokenEstimator::default();
    let blocks: Vec<Block> = (1..=5)
        .map(|i| history_block(&registry, i, &format!("m{i}")))
        .collect();
    let view = ContextView::from_ordered(blocks);

    let compactor = Compactor::new(&registry, &estimator, None);
    let config = PipelineCompactionConfig {
        steps: vec![CompactionStep::HistoryTrim],
        keep_recent_messages: 20,
        ..PipelineCompactionConfig::default()
    };
    let outcome = compactor.compact_view(&view, &config).await.unwrap();
    assert_eq!(outcome.blocks.len(), 5);
    assert!(outcome.removed_blocks.is_empty());
    assert!(!outcome.report.step_reports[0].lossy);
}

#[tokio::test]
async fn test_full_pipeline_with_summary() {
    let registry = registry();
    let estimator = HeuristicTokenEstimator::default();
    let mut blocks: Vec<Block> = (1..=15)
        .map(|i| history_block(&registry, i, &format!("history message number {i}")))
        .collect();
    blocks.extend((1..=6).map(|i| tool_block(&registry, i, "tool result")));
    let view = ContextView::from_ordered(blocks);

    let summarizer = StubSummarizer;
    let compactor = Compactor::new(&registry, &estimator, Some(&summarizer));
    let config = PipelineCompactionConfig {
        steps: vec![
            CompactionStep::Dedupe,
            CompactionStep::ToolOutputPrune,
            CompactionStep::SummarizeHistory,
        ],
        min_messages: 12,
        ..PipelineCompactionConfig::default()
    };
    let outcome = compactor.compact_view(&view, &config).await.unwrap();

    assert_eq!(outcome.report.steps_applied.len(), 3);
    // 3 tool outputs survive, 10 history retained plus one summary block.
    assert_eq!(outcome.blocks.len(), 3 + 10 + 1);
    assert!(outcome.report.saved_tokens > 0);
    assert!(outcome.report.after_tokens < outcome.report.before_tokens);

    let summary = outcome
        .blocks
        .iter()
        .find(|b| b.meta.tags.contains("compacted:summarize_history"))
        .expect("summary successor present");
    assert!(summary.meta.source.as_deref().unwrap().ends_with(":compacted"));
    assert_eq!(outcome.derivations.len(), 1);
    assert_eq!(outcome.derivations[0].1.len(), 5);
}

#[tokio::test]
async fn test_compaction_never_mutates_graph() {
    let registry = registry();
    let estimator = HeuristicTokenEstimator::default();
    let mut graph = ContextGraph::new();
    for i in 1..=10 {
        graph.add_block(tool_block(&registry, i, "x"), vec![], vec![]);
    }
    let stats_before = graph.stats();
    let view = graph.create_view(ViewOptions::default()).await.unwrap();

    let compactor = Compactor::new(&registry, &estimator, None);
    let config = PipelineCompactionConfig {
        steps: vec![CompactionStep::Dedupe, CompactionStep::ToolOutputPrune],
        ..PipelineCompactionConfig::default()
    };
    let outcome = compactor.compact_view(&view, &config).await.unwrap();

    assert_eq!(graph.stats(), stats_before);
    assert_eq!(view.len(), 10);
    assert!(outcome.blocks.len() < view.len());
}

#[tokio::test]
async fn test_successor_reinsertion_records_derivation_edges() {
    let registry = registry();
    let estimator = HeuristicTokenEstimator::default();
    let mut graph = ContextGraph::new();
    let long = tool_block(&registry, 1, &"z".repeat(900));
    graph.add_block(long.clone(), vec![], vec![]);
    let view = graph.create_view(ViewOptions::default()).await.unwrap();

    let compactor = Compactor::new(&registry, &estimator, None);
    let config = PipelineCompactionConfig {
        steps: vec![CompactionStep::ToolOutputPrune],
        max_raw_tail_chars: 100,
        ..PipelineCompactionConfig::default()
    };
    let outcome = compactor.compact_view(&view, &config).await.unwrap();

    for block in &outcome.blocks {
        let parents = outcome
            .derivations
            .iter()
            .find(|(h, _)| *h == block.block_hash)
            .map(|(_, p)| p.clone())
            .unwrap_or_default();
        graph.add_block(block.clone(), parents, vec![]);
    }
    let successor = &outcome.blocks[0];
    assert_eq!(graph.get_derived_from(&successor.block_hash), &[long.block_hash]);
}

// ─────────────────────────────────────────────────────────────────────────────
// FORK LIFECYCLE
// ─────────────────────────────────────────────────────────────────────────────

struct AnswerExecutor;

#[async_trait]
impl ForkExecutor for AnswerExecutor {
    async fn execute(
        &self,
        instruction: &str,
        view: &ContextView,
    ) -> Result<ExecutorOutput, KernelError> {
        // The directive appended for forbidden fields must reach us.
        assert!(instruction.contains("Do not include these fields"));
        Ok(ExecutorOutput {
            output: json!({"answer": format!("saw {} blocks", view.len())}),
            summary: "analyzed the view".to_string(),
            artifacts: vec![],
            citations: view.blocks().iter().map(|b| b.block_hash.clone()).collect(),
            usage: UsageStats {
                input_tokens: 100,
                output_tokens: 20,
            },
        })
    }
}

#[tokio::test]
async fn test_fork_execute_and_ingest_roundtrip() {
    let registry = registry();
    let mut graph = ContextGraph::new();
    let meta = BlockMeta::new(BlockKind::Pinned, Sensitivity::Public, "system-rules", 1);
    let pinned = registry.create_block(meta, json!({"text": "rules"})).unwrap();
    graph.add_block(pinned, vec![], vec![]);
    graph.add_block(
        {
            let meta = BlockMeta::new(BlockKind::Memory, Sensitivity::Internal, "unsafe-text", 1);
            registry
                .create_block(meta, json!({"role": "user", "text": "internal"}))
                .unwrap()
        },
        vec![],
        vec![],
    );
    let parent = graph.create_view(ViewOptions::default()).await.unwrap();

    let task = ForkTask {
        instruction: "answer from context".to_string(),
        output_schema: json!({"type": "object", "required": ["answer"]}),
        forbidden_fields: vec!["api_key".to_string()],
        model: "anthropic:claude-sonnet-4-5".to_string(),
        toolset_version: Some("tools-v3".to_string()),
    };
    let result = execute_fork(
        &parent,
        &task,
        &ForkOptions::default(),
        &AnswerExecutor,
        &registry,
    )
    .await
    .unwrap();

    assert_eq!(result.provenance.source_view_hash, parent.stable_prefix_hash);
    assert_eq!(result.citations.len(), 2);

    let before = graph.stats().block_count;
    let hash = ingest_fork_result(&mut graph, &result, &registry).unwrap();
    assert_eq!(graph.stats().block_count, before + 1);
    let ingested = graph.get_block(&hash).unwrap();
    assert_eq!(ingested.meta.kind, BlockKind::Memory);
    assert_eq!(graph.get_derived_from(&hash).len(), 2);
}
