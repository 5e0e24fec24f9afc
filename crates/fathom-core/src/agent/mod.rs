//! Recursive deep-research agent
//!
//! ## Orchestrator (the canonical reasoning-acting loop)
//! - `ResearchAgent` - Unified loop: reasoning, tools, hooks, cancellation
//! - `ResearchAgentConfig` / `ResearchReply` - Configuration and turn result
//! - `CancelHandle` - Cooperative cancellation of a running turn
//!
//! ## Core Components
//! - `SubtaskStack` - Depth-bounded focus of the recursive decomposition
//! - `ResearchEngine` - Decompose / follow-up / reflect decision passes
//! - `ReportCondenser` - Intermediate reports and the final merge
//!
//! ## Hooks
//! - `HookPipeline` - Ordered, name-keyed hooks per lifecycle stage
//! - `LifecycleHook` / `HookCtx` / `HookPayload` - The hook contract
//!
//! ## Workers
//! - `WorkerManager` - Named pool of delegate workers with scoped toolsets
//! - `WorkerRunner` - The delegate's own loop, behind a trait
//!
//! ## Checkpointing
//! - `AgentSnapshot` / `SessionStore` - Restorable session state

pub mod condenser;
pub mod engine;
pub mod hooks;
pub mod orchestrator;
pub mod snapshot;
pub mod stack;
pub mod worker;

pub use condenser::{ReportCondenser, SummarizeOutcome, SUMMARIZE_TOOL};
pub use engine::{
    DecomposeOutcome, FollowUpOutcome, ReflectionOutcome, ResearchEngine,
};
pub use hooks::{HookCtx, HookPayload, HookPipeline, HookStage, LifecycleHook};
pub use orchestrator::{CancelHandle, ResearchAgent, ResearchAgentConfig, ResearchReply};
pub use snapshot::{AgentSnapshot, InMemorySessionStore, SessionStore};
pub use stack::{StackError, SubtaskRecord, SubtaskStack};
pub use worker::{
    WorkerError, WorkerManager, WorkerRecord, WorkerResponse, WorkerRunner, WorkerType,
};
