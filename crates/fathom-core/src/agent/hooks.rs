//! Lifecycle hook pipeline.
//!
//! The reasoning-acting driver is generic; the research behaviors are
//! injected around it as named hooks keyed by lifecycle stage. Registration
//! order is the execution order contract. Re-registering a name replaces
//! the hook in place (last write wins, order preserved) - an accepted
//! footgun, so it is logged.
//!
//! Hooks receive the mutable session context plus the stage payload and run
//! strictly sequentially; a hook may mutate the subtask stack and memory
//! but must not assume concurrent execution. The pipeline never swallows
//! cancellation: interruption cleanup records its markers into memory and
//! the signal then propagates to the caller.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context as _, Result};
use async_trait::async_trait;

use crate::ai::types::{AiToolCall, Content, ModelResponse, Role};
use crate::memory::{MemoryLog, MemoryMsg};
use crate::tools::{ToolContext, ToolRegistry, ToolResult};

use super::condenser::ReportCondenser;
use super::engine::ResearchEngine;
use super::stack::SubtaskStack;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookStage {
    PreReply,
    PreReasoning,
    PostReasoning,
    PostActing,
    PostReply,
}

impl HookStage {
    pub fn as_str(self) -> &'static str {
        match self {
            HookStage::PreReply => "pre_reply",
            HookStage::PreReasoning => "pre_reasoning",
            HookStage::PostReasoning => "post_reasoning",
            HookStage::PostActing => "post_acting",
            HookStage::PostReply => "post_reply",
        }
    }
}

/// Stage-specific payload handed to each hook. `Incoming` is mutable on
/// purpose: the pre-reply stage may augment the user message before it is
/// recorded.
#[derive(Debug)]
pub enum HookPayload {
    Incoming { text: String },
    Reasoning { response: ModelResponse },
    Action { call: AiToolCall, result: ToolResult },
    None,
}

/// Mutable session state shared with hooks. Collaborator handles ride along
/// so built-in hooks can drive the engine and condenser.
pub struct HookCtx<'a> {
    pub stack: &'a mut SubtaskStack,
    pub memory: &'a mut dyn MemoryLog,
    pub search_buffer: &'a mut Vec<AiToolCall>,
    pub user_query: &'a mut String,
    pub engine: &'a ResearchEngine,
    pub condenser: &'a mut ReportCondenser,
    pub registry: &'a ToolRegistry,
    pub tool_ctx: &'a ToolContext,
    pub search_tool: &'a str,
    pub extract_tool: &'a str,
}

#[async_trait]
pub trait LifecycleHook: Send + Sync {
    async fn run(&self, ctx: &mut HookCtx<'_>, payload: &mut HookPayload) -> Result<()>;
}

/// Ordered, name-keyed hook registry per stage.
#[derive(Default)]
pub struct HookPipeline {
    stages: HashMap<HookStage, Vec<(String, Arc<dyn LifecycleHook>)>>,
}

impl HookPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a hook under `name` at `stage`. A duplicate name replaces
    /// the existing hook in place, keeping its position in the order.
    pub fn register(
        &mut self,
        stage: HookStage,
        name: impl Into<String>,
        hook: Arc<dyn LifecycleHook>,
    ) {
        let name = name.into();
        let entries = self.stages.entry(stage).or_default();
        if let Some(existing) = entries.iter_mut().find(|(n, _)| *n == name) {
            tracing::warn!(stage = stage.as_str(), hook = %name, "Replacing hook with duplicate name");
            existing.1 = hook;
        } else {
            entries.push((name, hook));
        }
    }

    /// Hook names at a stage, in execution order.
    pub fn names(&self, stage: HookStage) -> Vec<String> {
        self.stages
            .get(&stage)
            .map(|entries| entries.iter().map(|(n, _)| n.clone()).collect())
            .unwrap_or_default()
    }

    /// Run every hook registered at `stage` sequentially, in registration
    /// order. The first failing hook aborts the stage.
    pub async fn run(
        &self,
        stage: HookStage,
        ctx: &mut HookCtx<'_>,
        payload: &mut HookPayload,
    ) -> Result<()> {
        let Some(entries) = self.stages.get(&stage) else {
            return Ok(());
        };
        for (name, hook) in entries {
            tracing::trace!(stage = stage.as_str(), hook = %name, "Running hook");
            hook.run(ctx, payload)
                .await
                .with_context(|| format!("hook '{name}' failed at stage {}", stage.as_str()))?;
        }
        Ok(())
    }
}

/// Flush synthetic "interrupted" results for still-pending tool calls into
/// memory. Called during cancellation cleanup so the log stays consistent
/// (every tool_use gets a result) before the signal propagates.
pub async fn record_interruption(memory: &mut dyn MemoryLog, pending: &[AiToolCall]) {
    if pending.is_empty() {
        return;
    }
    tracing::info!(pending = pending.len(), "Recording interrupted tool results");
    let blocks = pending
        .iter()
        .map(|call| Content::ToolResult {
            tool_use_id: call.id.clone(),
            output: serde_json::json!("Tool execution was interrupted by the user."),
            is_error: Some(true),
        })
        .collect();
    let mut msg = MemoryMsg::new(Role::User, blocks);
    msg.interrupted = true;
    memory.add(msg).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::types::{AiTool, ModelMessage};
    use crate::ai::ModelClient;
    use crate::memory::InMemoryLog;
    use serde_json::json;

    struct NullModel;

    #[async_trait]
    impl ModelClient for NullModel {
        async fn invoke(
            &self,
            _messages: &[ModelMessage],
            _tools: &[AiTool],
        ) -> Result<ModelResponse> {
            Ok(ModelResponse::text("unused"))
        }
    }

    struct AppendHook(&'static str);

    #[async_trait]
    impl LifecycleHook for AppendHook {
        async fn run(&self, ctx: &mut HookCtx<'_>, _payload: &mut HookPayload) -> Result<()> {
            ctx.user_query.push_str(self.0);
            Ok(())
        }
    }

    struct Fixture {
        stack: SubtaskStack,
        memory: InMemoryLog,
        search_buffer: Vec<AiToolCall>,
        user_query: String,
        engine: ResearchEngine,
        condenser: ReportCondenser,
        registry: ToolRegistry,
        tool_ctx: ToolContext,
    }

    impl Fixture {
        fn new() -> Self {
            let model = Arc::new(NullModel);
            Self {
                stack: SubtaskStack::new(3),
                memory: InMemoryLog::new(),
                search_buffer: Vec::new(),
                user_query: String::new(),
                engine: ResearchEngine::new(model.clone()),
                condenser: ReportCondenser::new(model, std::env::temp_dir(), "hooks-test"),
                registry: ToolRegistry::new(),
                tool_ctx: ToolContext::default(),
            }
        }

        fn ctx(&mut self) -> HookCtx<'_> {
            HookCtx {
                stack: &mut self.stack,
                memory: &mut self.memory,
                search_buffer: &mut self.search_buffer,
                user_query: &mut self.user_query,
                engine: &self.engine,
                condenser: &mut self.condenser,
                registry: &self.registry,
                tool_ctx: &self.tool_ctx,
                search_tool: "search",
                extract_tool: "extract",
            }
        }
    }

    #[tokio::test]
    async fn hooks_run_in_registration_order() {
        let mut pipeline = HookPipeline::new();
        pipeline.register(HookStage::PreReply, "first", Arc::new(AppendHook("a")));
        pipeline.register(HookStage::PreReply, "second", Arc::new(AppendHook("b")));

        let mut fixture = Fixture::new();
        let mut ctx = fixture.ctx();
        pipeline
            .run(HookStage::PreReply, &mut ctx, &mut HookPayload::None)
            .await
            .unwrap();
        drop(ctx);
        assert_eq!(fixture.user_query, "ab");
    }

    #[tokio::test]
    async fn duplicate_name_replaces_in_place() {
        let mut pipeline = HookPipeline::new();
        pipeline.register(HookStage::PreReply, "first", Arc::new(AppendHook("a")));
        pipeline.register(HookStage::PreReply, "second", Arc::new(AppendHook("b")));
        pipeline.register(HookStage::PreReply, "first", Arc::new(AppendHook("A")));

        assert_eq!(pipeline.names(HookStage::PreReply), vec!["first", "second"]);

        let mut fixture = Fixture::new();
        let mut ctx = fixture.ctx();
        pipeline
            .run(HookStage::PreReply, &mut ctx, &mut HookPayload::None)
            .await
            .unwrap();
        drop(ctx);
        assert_eq!(fixture.user_query, "Ab");
    }

    #[tokio::test]
    async fn unregistered_stage_is_a_no_op() {
        let pipeline = HookPipeline::new();
        let mut fixture = Fixture::new();
        let mut ctx = fixture.ctx();
        pipeline
            .run(HookStage::PostReply, &mut ctx, &mut HookPayload::None)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn record_interruption_flags_every_pending_call() {
        let mut memory = InMemoryLog::new();
        let pending = vec![
            AiToolCall {
                id: "c1".into(),
                name: "search".into(),
                arguments: json!({}),
            },
            AiToolCall {
                id: "c2".into(),
                name: "extract".into(),
                arguments: json!({}),
            },
        ];
        record_interruption(&mut memory, &pending).await;

        let all = memory.get_all().await;
        assert_eq!(all.len(), 1);
        assert!(all[0].interrupted);
        assert_eq!(
            all[0]
                .content
                .iter()
                .filter(|c| matches!(c, Content::ToolResult { .. }))
                .count(),
            2
        );
    }
}
