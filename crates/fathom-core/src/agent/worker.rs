//! Worker lifecycle: creation, tool scoping, delegation, result collection.
//!
//! A worker is a delegate execution unit with a scoped subset of the full
//! toolset. The pool is keyed by name and insertion-ordered; creation is
//! idempotent - repeating a name reuses the existing record unchanged. The
//! actual reasoning-acting loop of a worker is an external collaborator
//! behind `WorkerRunner`.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::tools::ToolRegistry;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WorkerType {
    BuiltIn,
    Dynamic,
}

/// Pool entry describing one delegate worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerRecord {
    pub name: String,
    pub description: String,
    pub worker_type: WorkerType,
    pub toolset: Vec<String>,
}

/// Structured result a worker reports back to the planner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerResponse {
    pub task_done: bool,
    pub subtask_progress_summary: String,
    /// Generated file path -> description. Entries whose file does not
    /// exist on disk are dropped before the response is recorded.
    #[serde(default)]
    pub generated_files: BTreeMap<String, String>,
}

#[derive(Debug, Error)]
pub enum WorkerError {
    /// Retryable tool-level error; the message lists the current pool so
    /// the planner can correct its arguments.
    #[error("there is no '{name}' in the current worker pool.\nCurrent worker pool:\n{pool}")]
    NotFound { name: String, pool: String },
    #[error("requested tools are not registered: {0:?}")]
    UnknownTools(Vec<String>),
}

/// Executes a worker's own reasoning-acting loop against an instruction.
#[async_trait]
pub trait WorkerRunner: Send + Sync {
    async fn run(&self, record: &WorkerRecord, instruction: &str) -> Result<WorkerResponse>;
}

/// Insertion-ordered pool of named workers plus the runner collaborator.
pub struct WorkerManager {
    order: Vec<String>,
    records: HashMap<String, WorkerRecord>,
    runner: Arc<dyn WorkerRunner>,
}

impl WorkerManager {
    pub fn new(runner: Arc<dyn WorkerRunner>) -> Self {
        Self {
            order: Vec::new(),
            records: HashMap::new(),
            runner,
        }
    }

    /// Create a worker with a scoped toolset. Idempotent by name: a repeat
    /// call returns the existing record unchanged, even with a different
    /// description.
    pub fn create_worker(
        &mut self,
        name: impl Into<String>,
        description: impl Into<String>,
        worker_type: WorkerType,
        toolset: Vec<String>,
        registry: &ToolRegistry,
    ) -> Result<&WorkerRecord, WorkerError> {
        let name = name.into();
        if self.records.contains_key(&name) {
            tracing::debug!(worker = %name, "Reusing existing worker");
            return Ok(&self.records[&name]);
        }

        let missing = registry.missing_from(&toolset);
        if !missing.is_empty() {
            return Err(WorkerError::UnknownTools(missing));
        }

        tracing::info!(worker = %name, tools = ?toolset, "Registering worker");
        self.order.push(name.clone());
        self.records.insert(
            name.clone(),
            WorkerRecord {
                name: name.clone(),
                description: description.into(),
                worker_type,
                toolset,
            },
        );
        Ok(&self.records[&name])
    }

    /// Delegate an objective to a named worker and collect its structured
    /// result. Generated-file claims are double-checked against the
    /// filesystem.
    pub async fn execute_worker(&self, name: &str, instruction: &str) -> Result<WorkerResponse> {
        let Some(record) = self.records.get(name) else {
            return Err(WorkerError::NotFound {
                name: name.to_string(),
                pool: self.describe_pool(),
            }
            .into());
        };

        tracing::info!(worker = %name, "Delegating subtask to worker");
        let mut response = self.runner.run(record, instruction).await?;

        let mut verified = BTreeMap::new();
        for (path, desc) in response.generated_files {
            if tokio::fs::try_exists(&path).await.unwrap_or(false) {
                verified.insert(path, desc);
            } else {
                tracing::warn!(file = %path, worker = %name, "Dropping missing generated file");
            }
        }
        response.generated_files = verified;
        Ok(response)
    }

    /// Read-only pool introspection for the planning agent.
    pub fn show_current_worker_pool(&self) -> Vec<&WorkerRecord> {
        self.order
            .iter()
            .filter_map(|name| self.records.get(name))
            .collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.records.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Snapshot of the pool records in insertion order.
    pub fn records(&self) -> Vec<WorkerRecord> {
        self.show_current_worker_pool().into_iter().cloned().collect()
    }

    /// Restore pool metadata from a snapshot.
    pub fn restore(&mut self, records: Vec<WorkerRecord>) {
        self.order = records.iter().map(|r| r.name.clone()).collect();
        self.records = records.into_iter().map(|r| (r.name.clone(), r)).collect();
    }

    fn describe_pool(&self) -> String {
        serde_json::to_string_pretty(
            &self
                .show_current_worker_pool()
                .iter()
                .map(|r| (r.name.clone(), r.description.clone()))
                .collect::<BTreeMap<_, _>>(),
        )
        .unwrap_or_else(|_| "{}".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::{Tool, ToolContext, ToolResult};
    use serde_json::{json, Value};

    struct NoopTool;

    #[async_trait]
    impl Tool for NoopTool {
        fn description(&self) -> &str {
            "noop"
        }
        fn input_schema(&self) -> Value {
            json!({"type": "object"})
        }
        async fn execute(&self, _params: Value, _ctx: &ToolContext) -> ToolResult {
            ToolResult::success("ok")
        }
    }

    struct EchoRunner;

    #[async_trait]
    impl WorkerRunner for EchoRunner {
        async fn run(&self, record: &WorkerRecord, instruction: &str) -> Result<WorkerResponse> {
            Ok(WorkerResponse {
                task_done: true,
                subtask_progress_summary: format!("{} did: {instruction}", record.name),
                generated_files: BTreeMap::new(),
            })
        }
    }

    fn registry() -> ToolRegistry {
        let mut reg = ToolRegistry::new();
        reg.register("search", Arc::new(NoopTool), None);
        reg.register("extract", Arc::new(NoopTool), None);
        reg
    }

    #[test]
    fn worker_creation_is_idempotent_by_name() {
        let reg = registry();
        let mut manager = WorkerManager::new(Arc::new(EchoRunner));
        manager
            .create_worker("scout", "searches", WorkerType::Dynamic, vec!["search".into()], &reg)
            .unwrap();
        let reused = manager
            .create_worker("scout", "something else", WorkerType::Dynamic, vec![], &reg)
            .unwrap();

        // The existing record wins; the second call neither duplicates nor resets.
        assert_eq!(reused.description, "searches");
        assert_eq!(manager.len(), 1);
        assert_eq!(manager.show_current_worker_pool()[0].toolset, vec!["search"]);
    }

    #[test]
    fn unknown_tools_are_rejected_at_creation() {
        let reg = registry();
        let mut manager = WorkerManager::new(Arc::new(EchoRunner));
        let err = manager
            .create_worker(
                "scout",
                "searches",
                WorkerType::Dynamic,
                vec!["search".into(), "teleport".into()],
                &reg,
            )
            .unwrap_err();
        assert!(matches!(err, WorkerError::UnknownTools(ref t) if t == &vec!["teleport".to_string()]));
        assert!(manager.is_empty());
    }

    #[tokio::test]
    async fn executing_an_unknown_worker_lists_the_pool() {
        let reg = registry();
        let mut manager = WorkerManager::new(Arc::new(EchoRunner));
        manager
            .create_worker("scout", "searches", WorkerType::Dynamic, vec![], &reg)
            .unwrap();

        let err = manager.execute_worker("missing", "do X").await.unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("missing"));
        assert!(msg.contains("scout"));
    }

    #[tokio::test]
    async fn missing_generated_files_are_dropped() {
        struct ClaimingRunner;

        #[async_trait]
        impl WorkerRunner for ClaimingRunner {
            async fn run(&self, _r: &WorkerRecord, _i: &str) -> Result<WorkerResponse> {
                let mut files = BTreeMap::new();
                files.insert("/nonexistent/report.md".to_string(), "ghost".to_string());
                Ok(WorkerResponse {
                    task_done: true,
                    subtask_progress_summary: "done".to_string(),
                    generated_files: files,
                })
            }
        }

        let reg = registry();
        let mut manager = WorkerManager::new(Arc::new(ClaimingRunner));
        manager
            .create_worker("writer", "writes", WorkerType::BuiltIn, vec![], &reg)
            .unwrap();

        let response = manager.execute_worker("writer", "write it").await.unwrap();
        assert!(response.generated_files.is_empty());
    }
}
