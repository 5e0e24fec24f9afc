//! The research agent - a generic reasoning-acting loop with the research
//! behaviors injected as lifecycle hooks.
//!
//! `ResearchAgent::reply` drives one task end to end:
//!
//! ```text
//! pre_reply ─► ┌ iterate ──────────────────────────────────┐ ─► post_reply
//!              │ pre_reasoning → model call → post_reasoning │
//!              │   → tool fan-out → post_acting per call     │
//!              └────────────────────────────────────────────┘
//! ```
//!
//! Independent tool calls from one reasoning step are awaited concurrently;
//! their results are folded back into memory in call order, and the first
//! terminal response in call order ends the turn (later results are still
//! recorded). Intrinsic operations - reflection, condensation, subtask
//! completion, final response, worker management - are dispatched as agent
//! tools alongside the registry's external tools.

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::Notify;

use crate::ai::types::{AiTool, AiToolCall, Content, ModelMessage, ModelResponse, Role};
use crate::ai::ModelClient;
use crate::memory::{MemoryLog, MemoryMsg};
use crate::prompts;
use crate::tools::{ToolContext, ToolRegistry, ToolResult};

use super::condenser::{self, ReportCondenser, SummarizeOutcome, SUMMARIZE_TOOL};
use super::engine::{DecomposeOutcome, FollowUpOutcome, ReflectionOutcome, ResearchEngine};
use super::hooks::{record_interruption, HookCtx, HookPayload, HookPipeline, HookStage, LifecycleHook};
use super::snapshot::{AgentSnapshot, SessionStore};
use super::stack::SubtaskStack;
use super::worker::{WorkerManager, WorkerRunner, WorkerType};

pub const REFLECT_TOOL: &str = "reflect_failure";
pub const FINISH_SUBTASK_TOOL: &str = "finish_current_subtask";
pub const GENERATE_RESPONSE_TOOL: &str = "generate_response";
pub const CREATE_WORKER_TOOL: &str = "create_worker";
pub const EXECUTE_WORKER_TOOL: &str = "execute_worker";
pub const SHOW_WORKER_POOL_TOOL: &str = "show_current_worker_pool";

const INTRINSIC_TOOLS: &[&str] = &[
    REFLECT_TOOL,
    SUMMARIZE_TOOL,
    FINISH_SUBTASK_TOOL,
    GENERATE_RESPONSE_TOOL,
    CREATE_WORKER_TOOL,
    EXECUTE_WORKER_TOOL,
    SHOW_WORKER_POOL_TOOL,
];

const DEFAULT_SYS_PROMPT: &str = "You are a deep research agent. Work through the current \
    subtask step by step: search when information is missing, reflect when actions stop \
    converging, summarize milestones as you reach them, and finish subtasks once their \
    checklist is complete.";

/// Cooperative cancellation handle for a running reply.
#[derive(Clone, Default)]
pub struct CancelHandle {
    inner: Arc<CancelInner>,
}

#[derive(Default)]
struct CancelInner {
    flag: AtomicBool,
    notify: Notify,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.inner.flag.store(true, Ordering::SeqCst);
        self.inner.notify.notify_one();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.flag.load(Ordering::SeqCst)
    }

    pub async fn cancelled(&self) {
        while !self.is_cancelled() {
            self.inner.notify.notified().await;
        }
    }
}

pub struct ResearchAgentConfig {
    pub max_depth: usize,
    pub max_iters: usize,
    pub working_dir: PathBuf,
    pub report_base: String,
    pub sys_prompt: String,
    /// Registry name of the web-search tool whose calls are buffered for
    /// follow-up judgment.
    pub search_tool: String,
    /// Registry name of the single-page extraction tool.
    pub extract_tool: String,
}

impl Default for ResearchAgentConfig {
    fn default() -> Self {
        Self {
            max_depth: 3,
            max_iters: 30,
            working_dir: PathBuf::from("."),
            report_base: "research".to_string(),
            sys_prompt: DEFAULT_SYS_PROMPT.to_string(),
            search_tool: "web_search".to_string(),
            extract_tool: "web_extract".to_string(),
        }
    }
}

/// Final outcome of one `reply` turn.
#[derive(Debug, Clone)]
pub struct ResearchReply {
    pub task_done: bool,
    pub summary: String,
    pub report_path: Option<PathBuf>,
}

pub struct ResearchAgent {
    config: ResearchAgentConfig,
    model: Arc<dyn ModelClient>,
    engine: ResearchEngine,
    condenser: ReportCondenser,
    registry: Arc<ToolRegistry>,
    workers: WorkerManager,
    memory: Box<dyn MemoryLog>,
    stack: SubtaskStack,
    hooks: HookPipeline,
    search_buffer: Vec<AiToolCall>,
    user_query: String,
    tool_ctx: ToolContext,
    cancel: CancelHandle,
}

impl ResearchAgent {
    pub fn new(
        model: Arc<dyn ModelClient>,
        registry: Arc<ToolRegistry>,
        worker_runner: Arc<dyn WorkerRunner>,
        memory: Box<dyn MemoryLog>,
        config: ResearchAgentConfig,
    ) -> Self {
        let engine = ResearchEngine::new(Arc::clone(&model));
        let condenser = ReportCondenser::new(
            Arc::clone(&model),
            config.working_dir.clone(),
            config.report_base.clone(),
        );
        let tool_ctx = ToolContext {
            working_dir: config.working_dir.clone(),
        };
        let stack = SubtaskStack::new(config.max_depth);

        let mut hooks = HookPipeline::new();
        hooks.register(HookStage::PreReply, "seed_root_subtask", Arc::new(SeedRootSubtask));
        hooks.register(
            HookStage::PreReasoning,
            "compose_reasoning_msg",
            Arc::new(ComposeReasoningMsg),
        );
        hooks.register(
            HookStage::PostReasoning,
            "remove_reasoning_msg",
            Arc::new(RemoveReasoningMsg),
        );
        hooks.register(
            HookStage::PostActing,
            "buffer_search_calls",
            Arc::new(BufferSearchCalls),
        );
        hooks.register(HookStage::PostReply, "clear_stack", Arc::new(ClearStack));

        Self {
            config,
            model,
            engine,
            condenser,
            registry,
            workers: WorkerManager::new(worker_runner),
            memory,
            stack,
            hooks,
            search_buffer: Vec::new(),
            user_query: String::new(),
            tool_ctx,
            cancel: CancelHandle::default(),
        }
    }

    /// Handle for interrupting a running `reply` from another task.
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Additional hook registration for hosts extending the pipeline.
    pub fn register_hook(
        &mut self,
        stage: HookStage,
        name: impl Into<String>,
        hook: Arc<dyn LifecycleHook>,
    ) {
        self.hooks.register(stage, name, hook);
    }

    pub fn subtask_depth(&self) -> usize {
        self.stack.len()
    }

    pub async fn memory_snapshot(&self) -> Vec<MemoryMsg> {
        self.memory.get_all().await
    }

    /// Drive one research task to completion.
    pub async fn reply(&mut self, message: &str) -> Result<ResearchReply> {
        let mut payload = HookPayload::Incoming {
            text: message.to_string(),
        };
        self.run_stage(HookStage::PreReply, &mut payload).await?;
        if let HookPayload::Incoming { text } = payload {
            self.memory.add(MemoryMsg::user(text)).await;
        }

        for iteration in 0..self.config.max_iters {
            tracing::debug!(iteration, depth = self.stack.len(), "Reasoning cycle");
            self.run_stage(HookStage::PreReasoning, &mut HookPayload::None)
                .await?;

            let messages = self.conversation().await;
            let tools = self.tool_schemas();
            let response = self.invoke_model(&messages, &tools).await?;

            self.memory
                .add(MemoryMsg::new(Role::Assistant, response.content.clone()))
                .await;
            let mut payload = HookPayload::Reasoning {
                response: response.clone(),
            };
            self.run_stage(HookStage::PostReasoning, &mut payload).await?;

            let calls = response.tool_calls();
            if calls.is_empty() {
                continue;
            }
            if let Some(reply) = self.act(calls).await? {
                self.run_stage(HookStage::PostReply, &mut HookPayload::None)
                    .await?;
                return Ok(reply);
            }
        }

        // Out of iterations: report what was found instead of failing dry.
        tracing::warn!(max_iters = self.config.max_iters, "Iteration budget exhausted, summarizing");
        let (summary, path) = self.condenser.final_report(self.memory.as_mut()).await?;
        self.run_stage(HookStage::PostReply, &mut HookPayload::None)
            .await?;
        Ok(ResearchReply {
            task_done: false,
            summary,
            report_path: Some(path),
        })
    }

    pub fn snapshot(&self) -> AgentSnapshot {
        AgentSnapshot {
            user_query: self.user_query.clone(),
            subtasks: self.stack.records().to_vec(),
            next_report_ordinal: self.condenser.next_ordinal(),
            report_base: self.config.report_base.clone(),
            workers: self.workers.records(),
            saved_at: chrono::Utc::now(),
        }
    }

    pub fn restore(&mut self, snapshot: AgentSnapshot) -> Result<()> {
        self.user_query = snapshot.user_query;
        self.stack.restore(snapshot.subtasks)?;
        self.condenser.set_next_ordinal(snapshot.next_report_ordinal);
        self.workers.restore(snapshot.workers);
        Ok(())
    }

    pub async fn checkpoint(&self, store: &dyn SessionStore) -> Result<()> {
        store.create_state(&self.snapshot().to_blob()?).await
    }

    /// Restore from the store if it holds a prior state. Returns whether a
    /// state was found.
    pub async fn resume(&mut self, store: &dyn SessionStore) -> Result<bool> {
        match store.get_state().await? {
            Some(blob) => {
                self.restore(AgentSnapshot::from_blob(&blob)?)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn run_stage(&mut self, stage: HookStage, payload: &mut HookPayload) -> Result<()> {
        let mut ctx = HookCtx {
            stack: &mut self.stack,
            memory: self.memory.as_mut(),
            search_buffer: &mut self.search_buffer,
            user_query: &mut self.user_query,
            engine: &self.engine,
            condenser: &mut self.condenser,
            registry: &self.registry,
            tool_ctx: &self.tool_ctx,
            search_tool: &self.config.search_tool,
            extract_tool: &self.config.extract_tool,
        };
        self.hooks.run(stage, &mut ctx, payload).await
    }

    async fn conversation(&self) -> Vec<ModelMessage> {
        let mut messages = vec![ModelMessage::system(&self.config.sys_prompt)];
        for msg in self.memory.get_all().await {
            messages.push(ModelMessage {
                role: msg.role,
                content: msg.content,
            });
        }
        messages
    }

    fn tool_schemas(&self) -> Vec<AiTool> {
        let mut schemas = self.registry.schemas();
        schemas.extend(intrinsic_schemas());
        schemas
    }

    async fn invoke_model(
        &mut self,
        messages: &[ModelMessage],
        tools: &[AiTool],
    ) -> Result<ModelResponse> {
        let cancel = self.cancel.clone();
        tokio::select! {
            biased;
            () = cancel.cancelled() => bail!("research run interrupted by the user"),
            response = self.model.invoke(messages, tools) => response,
        }
    }

    /// Execute one reasoning step's tool calls. External calls fan out
    /// concurrently; results fold back in call order. Returns the terminal
    /// reply when one of the intrinsic calls ended the turn.
    async fn act(&mut self, calls: Vec<AiToolCall>) -> Result<Option<ResearchReply>> {
        let external: Vec<AiToolCall> = calls
            .iter()
            .filter(|c| !INTRINSIC_TOOLS.contains(&c.name.as_str()))
            .cloned()
            .collect();

        let registry = Arc::clone(&self.registry);
        let tool_ctx = self.tool_ctx.clone();
        let cancel = self.cancel.clone();
        let joined = futures::future::join_all(external.iter().map(|call| {
            let registry = Arc::clone(&registry);
            let tool_ctx = tool_ctx.clone();
            let name = call.name.clone();
            let arguments = call.arguments.clone();
            async move { registry.execute(&name, arguments, &tool_ctx).await }
        }));
        tokio::pin!(joined);

        let results = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                // Flush synthetic results so every tool_use has a matching
                // entry, then let the cancellation propagate.
                record_interruption(self.memory.as_mut(), &calls).await;
                bail!("research run interrupted by the user");
            }
            results = &mut joined => results,
        };
        let mut external_results: HashMap<String, ToolResult> = external
            .iter()
            .map(|c| c.id.clone())
            .zip(results)
            .collect();

        let mut terminal: Option<ResearchReply> = None;
        for call in &calls {
            let (result, mark_report, term) =
                if INTRINSIC_TOOLS.contains(&call.name.as_str()) {
                    self.handle_intrinsic(call).await?
                } else {
                    let result = external_results
                        .remove(&call.id)
                        .unwrap_or_else(|| ToolResult::error("tool produced no result"));
                    (result, false, None)
                };

            let mut msg = MemoryMsg::new(
                Role::User,
                vec![Content::ToolResult {
                    tool_use_id: call.id.clone(),
                    output: json!(result.output),
                    is_error: result.is_error.then_some(true),
                }],
            );
            msg.is_report = mark_report;
            msg.interrupted = result.is_interrupted;
            self.memory.add(msg).await;

            let mut payload = HookPayload::Action {
                call: call.clone(),
                result: result.clone(),
            };
            self.run_stage(HookStage::PostActing, &mut payload).await?;

            // First terminal in call order wins; later results are still
            // recorded above.
            if terminal.is_none() {
                terminal = term;
            }
        }
        Ok(terminal)
    }

    /// Dispatch one intrinsic (agent-level) tool call. Returns the tool
    /// result, whether the recorded result marks a report boundary, and a
    /// terminal reply if this call finished the task.
    async fn handle_intrinsic(
        &mut self,
        call: &AiToolCall,
    ) -> Result<(ToolResult, bool, Option<ResearchReply>)> {
        match call.name.as_str() {
            REFLECT_TOOL => {
                let history = condenser::intermediate_tail(self.memory.as_ref(), true).await;
                let outcome = self.engine.reflect(&mut self.stack, &history).await?;
                let result = match outcome {
                    ReflectionOutcome::Rephrased { detail }
                    | ReflectionOutcome::NoChange { detail } => ToolResult::success(detail),
                    ReflectionOutcome::Decomposed { objective, detail } => {
                        self.persist_and_push(objective).await?;
                        ToolResult::success(detail)
                    }
                    ReflectionOutcome::DepthExhausted { hint }
                    | ReflectionOutcome::Retry { hint } => ToolResult::success(hint),
                };
                Ok((result, false, None))
            }
            SUMMARIZE_TOOL => {
                let outcome = self
                    .condenser
                    .summarize(&mut self.stack, self.memory.as_mut(), true)
                    .await?;
                match outcome {
                    SummarizeOutcome::NoResult { hint } => {
                        Ok((ToolResult::success(hint), false, None))
                    }
                    SummarizeOutcome::Report { hint, mark_boundary, path, .. } => Ok((
                        ToolResult::success(hint)
                            .with_metadata(json!({ "report_path": path })),
                        mark_boundary,
                        None,
                    )),
                }
            }
            FINISH_SUBTASK_TOOL => {
                if self.stack.len() > 1 {
                    let completed = self.stack.pop()?;
                    let hint = prompts::fill(
                        prompts::SUBTASK_COMPLETE_HINT,
                        &[
                            ("cur_obj", &completed.objective),
                            ("next_obj", &self.stack.peek()?.objective),
                        ],
                    );
                    Ok((ToolResult::success(hint), false, None))
                } else {
                    Ok((
                        ToolResult::success(
                            "All subtasks are done. Consider using generate_response to \
                             generate the final report.",
                        ),
                        false,
                        None,
                    ))
                }
            }
            GENERATE_RESPONSE_TOOL => {
                let completed = match self.stack.pop() {
                    Ok(record) => record,
                    Err(err) => return Ok((ToolResult::error(err), false, None)),
                };
                if self.stack.is_empty() {
                    let (summary, path) =
                        self.condenser.final_report(self.memory.as_mut()).await?;
                    let reply = ResearchReply {
                        task_done: true,
                        summary,
                        report_path: Some(path),
                    };
                    Ok((
                        ToolResult::success("Successfully generated detailed report."),
                        false,
                        Some(reply),
                    ))
                } else {
                    let hint = prompts::fill(
                        prompts::SUBTASK_COMPLETE_HINT,
                        &[
                            ("cur_obj", &completed.objective),
                            ("next_obj", &self.stack.peek()?.objective),
                        ],
                    );
                    Ok((ToolResult::success(hint), false, None))
                }
            }
            CREATE_WORKER_TOOL => {
                let args: CreateWorkerArgs = match serde_json::from_value(call.arguments.clone())
                {
                    Ok(args) => args,
                    Err(err) => return Ok((ToolResult::error(err), false, None)),
                };
                let result = match self.workers.create_worker(
                    &args.worker_name,
                    &args.agent_description,
                    WorkerType::Dynamic,
                    args.tool_names.clone(),
                    &self.registry,
                ) {
                    Ok(record) => ToolResult::success(format!(
                        "Successfully created a worker agent:\nWorker name: {}\nWorker tools: {:?}",
                        record.name, record.toolset
                    )),
                    Err(err) => ToolResult::error(err),
                };
                Ok((result, false, None))
            }
            EXECUTE_WORKER_TOOL => {
                let args: ExecuteWorkerArgs = match serde_json::from_value(call.arguments.clone())
                {
                    Ok(args) => args,
                    Err(err) => return Ok((ToolResult::error(err), false, None)),
                };
                let result = match self
                    .workers
                    .execute_worker(&args.selected_worker_name, &args.detailed_instruction)
                    .await
                {
                    Ok(response) => {
                        let summary = serde_json::to_string_pretty(&response)
                            .unwrap_or_else(|_| response.subtask_progress_summary.clone());
                        ToolResult::success(summary)
                            .with_metadata(serde_json::to_value(&response)?)
                    }
                    Err(err) => ToolResult::error(err),
                };
                Ok((result, false, None))
            }
            SHOW_WORKER_POOL_TOOL => {
                let pool: BTreeMap<String, String> = self
                    .workers
                    .show_current_worker_pool()
                    .into_iter()
                    .map(|r| (r.name.clone(), r.description.clone()))
                    .collect();
                let listing = serde_json::to_string_pretty(&pool)
                    .unwrap_or_else(|_| "{}".to_string());
                Ok((ToolResult::success(listing), false, None))
            }
            other => Ok((
                ToolResult::error(format!("Unknown intrinsic tool: {other}")),
                false,
                None,
            )),
        }
    }

    /// Persist an intermediate report of the current subtask, then switch
    /// focus to the new child objective.
    async fn persist_and_push(&mut self, objective: String) -> Result<()> {
        let outcome = self
            .condenser
            .summarize(&mut self.stack, self.memory.as_mut(), false)
            .await?;
        if let SummarizeOutcome::NoResult { .. } = outcome {
            tracing::debug!("No intermediate results to persist before focus switch");
        }
        if let Err(err) = self.stack.push(objective) {
            // The engine checks the budget before proposing; a race here
            // means the stack changed under us, so surface the hint only.
            tracing::warn!(error = %err, "Could not push proposed subtask");
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct CreateWorkerArgs {
    worker_name: String,
    #[serde(default)]
    agent_description: String,
    #[serde(default)]
    tool_names: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ExecuteWorkerArgs {
    selected_worker_name: String,
    #[serde(default)]
    detailed_instruction: String,
}

fn intrinsic_schemas() -> Vec<AiTool> {
    vec![
        AiTool {
            name: REFLECT_TOOL.to_string(),
            description: "Reflect on the failure of recent actions and decide to rephrase \
                the working plan or decompose the current step."
                .to_string(),
            input_schema: json!({"type": "object", "properties": {}}),
        },
        AiTool {
            name: SUMMARIZE_TOOL.to_string(),
            description: "Summarize the intermediate results into a report when a step in \
                the working plan is completed."
                .to_string(),
            input_schema: json!({"type": "object", "properties": {}}),
        },
        AiTool {
            name: FINISH_SUBTASK_TOOL.to_string(),
            description: "When all items of the current subtask are marked as done, remove \
                it and proceed to the next one."
                .to_string(),
            input_schema: json!({"type": "object", "properties": {}}),
        },
        AiTool {
            name: GENERATE_RESPONSE_TOOL.to_string(),
            description: "Use when no subtask remains. Generates the final detailed \
                research report."
                .to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "response": {
                        "type": "string",
                        "description": "A brief summary of the current situation."
                    }
                }
            }),
        },
        AiTool {
            name: CREATE_WORKER_TOOL.to_string(),
            description: "Create a delegate worker with a scoped toolset for a specialized \
                capability."
                .to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "worker_name": {"type": "string"},
                    "agent_description": {"type": "string"},
                    "tool_names": {"type": "array", "items": {"type": "string"}}
                },
                "required": ["worker_name"]
            }),
        },
        AiTool {
            name: EXECUTE_WORKER_TOOL.to_string(),
            description: "Delegate an instruction to a named worker from the pool and \
                collect its structured result."
                .to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "selected_worker_name": {"type": "string"},
                    "detailed_instruction": {"type": "string"}
                },
                "required": ["selected_worker_name"]
            }),
        },
        AiTool {
            name: SHOW_WORKER_POOL_TOOL.to_string(),
            description: "List all currently available workers with their descriptions."
                .to_string(),
            input_schema: json!({"type": "object", "properties": {}}),
        },
    ]
}

// ---------------------------------------------------------------------------
// Built-in research hooks
// ---------------------------------------------------------------------------

/// pre_reply: seed the root subtask from the user goal, decompose it, and
/// append the expected-output checklist to the incoming message.
struct SeedRootSubtask;

#[async_trait]
impl LifecycleHook for SeedRootSubtask {
    async fn run(&self, ctx: &mut HookCtx<'_>, payload: &mut HookPayload) -> Result<()> {
        let HookPayload::Incoming { text } = payload else {
            return Ok(());
        };
        *ctx.user_query = text.clone();
        if let Err(err) = ctx.stack.push(text.clone()) {
            bail!("could not seed root subtask: {err}");
        }
        match ctx.engine.decompose(ctx.stack).await? {
            DecomposeOutcome::Decomposed { .. } => {
                if let Some(gaps) = &ctx.stack.root()?.knowledge_gaps {
                    text.push_str(&format!("\nExpected Output:\n{gaps}"));
                }
            }
            DecomposeOutcome::Retry { hint } | DecomposeOutcome::DepthExhausted { hint } => {
                ctx.memory.add(MemoryMsg::assistant(hint)).await;
            }
        }
        Ok(())
    }
}

/// pre_reasoning: judge buffered search results, lazily decompose a planless
/// subtask, and inject the per-turn instruction message.
struct ComposeReasoningMsg;

#[async_trait]
impl LifecycleHook for ComposeReasoningMsg {
    async fn run(&self, ctx: &mut HookCtx<'_>, _payload: &mut HookPayload) -> Result<()> {
        if !ctx.search_buffer.is_empty() {
            let queries: Vec<String> = ctx
                .search_buffer
                .iter()
                .filter_map(|call| {
                    call.arguments
                        .get("query")
                        .and_then(|q| q.as_str())
                        .map(ToString::to_string)
                })
                .collect();
            let mut results = Vec::new();
            let all = ctx.memory.get_all().await;
            for call in ctx.search_buffer.iter() {
                for msg in all.iter().rev() {
                    let mut found = false;
                    for block in &msg.content {
                        if let Content::ToolResult { tool_use_id, output, .. } = block {
                            if *tool_use_id == call.id {
                                results.push(output.to_string());
                                found = true;
                            }
                        }
                    }
                    if found {
                        break;
                    }
                }
            }
            let buffered: Vec<AiToolCall> = std::mem::take(ctx.search_buffer);
            tracing::debug!(searches = buffered.len(), "Judging buffered search results");

            let outcome = ctx
                .engine
                .follow_up(
                    ctx.stack,
                    ctx.memory,
                    ctx.registry,
                    ctx.tool_ctx,
                    ctx.extract_tool,
                    &queries.join("\n"),
                    &results.join("\n"),
                )
                .await?;
            match outcome {
                FollowUpOutcome::Explore { objective, reasoning } => {
                    tracing::info!(objective = %objective, "Diving deeper on follow-up");
                    ctx.memory.add(MemoryMsg::assistant(reasoning)).await;
                    let summarized = ctx.condenser.summarize(ctx.stack, ctx.memory, false).await?;
                    if let SummarizeOutcome::NoResult { .. } = summarized {
                        tracing::debug!("Nothing to persist before exploring deeper");
                    }
                    if let Err(err) = ctx.stack.push(objective) {
                        tracing::warn!(error = %err, "Follow-up push refused");
                    }
                }
                // The judgment note already sits in memory.
                FollowUpOutcome::GapsClosed { .. } => {}
                FollowUpOutcome::Retry { hint } | FollowUpOutcome::DepthExhausted { hint } => {
                    ctx.memory.add(MemoryMsg::assistant(hint)).await;
                }
            }
        }

        if ctx.stack.peek().map(|t| t.working_plan.is_none()).unwrap_or(false) {
            if let DecomposeOutcome::Retry { hint } | DecomposeOutcome::DepthExhausted { hint } =
                ctx.engine.decompose(ctx.stack).await?
            {
                ctx.memory.add(MemoryMsg::assistant(hint)).await;
            }
        }

        let active = ctx.stack.peek()?;
        let gap_section = active
            .knowledge_gaps
            .as_deref()
            .map(|gaps| format!("## Knowledge Gaps:\n{gaps}"))
            .unwrap_or_default();
        let instruction = prompts::fill(
            prompts::REASONING_PROMPT,
            &[
                ("objective", &active.objective),
                (
                    "plan",
                    active
                        .working_plan
                        .as_deref()
                        .unwrap_or("There is no working plan now."),
                ),
                ("knowledge_gap", &gap_section),
                ("depth", &ctx.stack.len().to_string()),
            ],
        );
        ctx.memory.add(MemoryMsg::user(instruction)).await;
        Ok(())
    }
}

/// post_reasoning: drop the injected instruction message now that the
/// reasoning output is recorded after it.
struct RemoveReasoningMsg;

#[async_trait]
impl LifecycleHook for RemoveReasoningMsg {
    async fn run(&self, ctx: &mut HookCtx<'_>, _payload: &mut HookPayload) -> Result<()> {
        let size = ctx.memory.size().await;
        if size > 1 {
            ctx.memory.delete(&[size - 2]).await;
        }
        Ok(())
    }
}

/// post_acting: remember search calls so the next pre_reasoning pass can
/// judge their results.
struct BufferSearchCalls;

#[async_trait]
impl LifecycleHook for BufferSearchCalls {
    async fn run(&self, ctx: &mut HookCtx<'_>, payload: &mut HookPayload) -> Result<()> {
        if let HookPayload::Action { call, .. } = payload {
            if call.name == ctx.search_tool {
                ctx.search_buffer.push(call.clone());
            }
        }
        Ok(())
    }
}

/// post_reply: the turn is over, no subtask survives it.
struct ClearStack;

#[async_trait]
impl LifecycleHook for ClearStack {
    async fn run(&self, ctx: &mut HookCtx<'_>, _payload: &mut HookPayload) -> Result<()> {
        ctx.stack.clear();
        Ok(())
    }
}
