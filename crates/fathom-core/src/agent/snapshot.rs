//! Session checkpointing.
//!
//! The agent's restorable state is small: the subtask stack, the report
//! counter, the user query, and worker-pool metadata. The host persists the
//! serialized blob through whatever `SessionStore` it wires in.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::stack::SubtaskRecord;
use super::worker::WorkerRecord;

/// Serializable snapshot of one research session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSnapshot {
    pub user_query: String,
    pub subtasks: Vec<SubtaskRecord>,
    /// Ordinal of the next intermediate report.
    pub next_report_ordinal: usize,
    pub report_base: String,
    #[serde(default)]
    pub workers: Vec<WorkerRecord>,
    #[serde(default = "Utc::now")]
    pub saved_at: DateTime<Utc>,
}

impl AgentSnapshot {
    pub fn to_blob(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_blob(blob: &str) -> Result<Self> {
        Ok(serde_json::from_str(blob)?)
    }
}

/// Persistent session store collaborator.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn get_state(&self) -> Result<Option<String>>;
    async fn create_state(&self, blob: &str) -> Result<()>;
}

/// In-process store, for tests and single-run hosts.
#[derive(Default)]
pub struct InMemorySessionStore {
    blob: tokio::sync::Mutex<Option<String>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn get_state(&self) -> Result<Option<String>> {
        Ok(self.blob.lock().await.clone())
    }

    async fn create_state(&self, blob: &str) -> Result<()> {
        *self.blob.lock().await = Some(blob.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::worker::WorkerType;

    #[tokio::test]
    async fn snapshot_roundtrips_through_the_store() {
        let snapshot = AgentSnapshot {
            user_query: "compare vendors".to_string(),
            subtasks: vec![SubtaskRecord::new("compare vendors")],
            next_report_ordinal: 3,
            report_base: "run".to_string(),
            workers: vec![WorkerRecord {
                name: "scout".to_string(),
                description: "searches".to_string(),
                worker_type: WorkerType::Dynamic,
                toolset: vec!["search".to_string()],
            }],
            saved_at: Utc::now(),
        };

        let store = InMemorySessionStore::new();
        store.create_state(&snapshot.to_blob().unwrap()).await.unwrap();

        let blob = store.get_state().await.unwrap().unwrap();
        let restored = AgentSnapshot::from_blob(&blob).unwrap();
        assert_eq!(restored.user_query, "compare vendors");
        assert_eq!(restored.next_report_ordinal, 3);
        assert_eq!(restored.subtasks[0].objective, "compare vendors");
        assert_eq!(restored.workers[0].name, "scout");
    }
}
