//! Memory log collaborator contract.
//!
//! The session's working memory is an ordered log of messages, exclusively
//! owned by one agent instance (no cross-session sharing, no locks). The
//! condenser relies on two metadata flags: `is_report` marks a report
//! boundary, `interrupted` marks a synthetic tool result recorded during
//! cancellation cleanup.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::ai::types::{Content, Role};

/// One entry in the memory log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryMsg {
    pub role: Role,
    pub content: Vec<Content>,
    /// Marks a report boundary for memory compaction.
    #[serde(default)]
    pub is_report: bool,
    /// Marks a synthetic result flushed during cancellation.
    #[serde(default)]
    pub interrupted: bool,
}

impl MemoryMsg {
    pub fn new(role: Role, content: Vec<Content>) -> Self {
        Self {
            role,
            content,
            is_report: false,
            interrupted: false,
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, vec![Content::text(text)])
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(Role::Assistant, vec![Content::text(text)])
    }

    pub fn report(text: impl Into<String>) -> Self {
        Self {
            is_report: true,
            ..Self::assistant(text)
        }
    }

    pub fn has_tool_use(&self) -> bool {
        self.content
            .iter()
            .any(|c| matches!(c, Content::ToolUse { .. }))
    }

    pub fn has_tool_result(&self) -> bool {
        self.content
            .iter()
            .any(|c| matches!(c, Content::ToolResult { .. }))
    }

    /// True when this message carries a tool_use block with the given name.
    pub fn calls_tool(&self, name: &str) -> bool {
        self.content.iter().any(|c| {
            matches!(c, Content::ToolUse { name: n, .. } if n == name)
        })
    }

    pub fn joined_text(&self) -> String {
        let mut out = String::new();
        for block in &self.content {
            if let Content::Text { text } = block {
                if !out.is_empty() {
                    out.push('\n');
                }
                out.push_str(text);
            }
        }
        out
    }
}

/// Ordered, index-addressable message log.
#[async_trait]
pub trait MemoryLog: Send + Sync {
    async fn add(&mut self, msg: MemoryMsg);
    async fn get_all(&self) -> Vec<MemoryMsg>;
    /// Delete by index set. Indices refer to the current log; out-of-range
    /// entries are ignored.
    async fn delete(&mut self, indices: &[usize]);
    async fn size(&self) -> usize;
    async fn clear(&mut self);
}

/// Reference in-process implementation.
#[derive(Debug, Default)]
pub struct InMemoryLog {
    messages: Vec<MemoryMsg>,
}

impl InMemoryLog {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MemoryLog for InMemoryLog {
    async fn add(&mut self, msg: MemoryMsg) {
        self.messages.push(msg);
    }

    async fn get_all(&self) -> Vec<MemoryMsg> {
        self.messages.clone()
    }

    async fn delete(&mut self, indices: &[usize]) {
        let mut sorted: Vec<usize> = indices
            .iter()
            .copied()
            .filter(|&i| i < self.messages.len())
            .collect();
        sorted.sort_unstable();
        sorted.dedup();
        for index in sorted.into_iter().rev() {
            self.messages.remove(index);
        }
    }

    async fn size(&self) -> usize {
        self.messages.len()
    }

    async fn clear(&mut self) {
        self.messages.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn delete_handles_unsorted_and_out_of_range_indices() {
        let mut log = InMemoryLog::new();
        for i in 0..5 {
            log.add(MemoryMsg::user(format!("m{i}"))).await;
        }

        log.delete(&[3, 1, 99, 3]).await;

        let remaining: Vec<String> = log.get_all().await.iter().map(|m| m.joined_text()).collect();
        assert_eq!(remaining, vec!["m0", "m2", "m4"]);
    }

    #[tokio::test]
    async fn report_flag_survives_the_log() {
        let mut log = InMemoryLog::new();
        log.add(MemoryMsg::report("intermediate findings")).await;
        let all = log.get_all().await;
        assert!(all[0].is_report);
        assert_eq!(all[0].role, Role::Assistant);
    }
}
