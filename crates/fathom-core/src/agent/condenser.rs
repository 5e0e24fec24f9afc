//! Report condensation and memory compaction.
//!
//! Unbounded exploration would overflow working memory, so whenever a
//! milestone closes the condenser collapses the memory tail since the last
//! report boundary into a persisted markdown artifact and deletes the bulky
//! span. Artifacts are ordinal-numbered and immutable once written; the
//! final report is assembled from them in order (or straight from memory
//! when the run never produced one).
//!
//! Artifact writes are atomic (temp file + rename): an I/O failure is fatal
//! for the run and never leaves a partial file behind.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::ai::types::{Content, ModelMessage, Role};
use crate::ai::ModelClient;
use crate::memory::{MemoryLog, MemoryMsg};
use crate::prompts;

use super::stack::SubtaskStack;

/// Intrinsic tool name through which the agent invokes condensation; also
/// the backward-walk boundary during compaction.
pub const SUMMARIZE_TOOL: &str = "summarize_intermediate_results";

static OPEN_ITEM: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^\s*[-*]?\s*\[ \]").unwrap());
static DONE_ITEM: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^\s*[-*]?\s*\[[xX]\]").unwrap());

/// (open, done) counts of a markdown gap checklist.
pub fn checklist_progress(gaps: &str) -> (usize, usize) {
    (OPEN_ITEM.find_iter(gaps).count(), DONE_ITEM.find_iter(gaps).count())
}

/// Result of one condensation pass.
#[derive(Debug)]
pub enum SummarizeOutcome {
    /// Nothing accumulated since the last boundary.
    NoResult { hint: String },
    /// Report written and memory compacted.
    Report {
        text: String,
        path: PathBuf,
        /// Text to fold back into the conversation.
        hint: String,
        /// True when the caller should flag its tool-result message as a
        /// report boundary (agent-invoked condensation). System-invoked
        /// condensation records its own boundary note instead.
        mark_boundary: bool,
    },
}

pub struct ReportCondenser {
    model: Arc<dyn ModelClient>,
    dir: PathBuf,
    base: String,
    /// Ordinal of the next intermediate report, starting at 1. Incremented
    /// only after a successful write, so ordinals are gapless.
    next_ordinal: usize,
}

impl ReportCondenser {
    pub fn new(model: Arc<dyn ModelClient>, dir: impl Into<PathBuf>, base: impl Into<String>) -> Self {
        Self {
            model,
            dir: dir.into(),
            base: base.into(),
            next_ordinal: 1,
        }
    }

    pub fn next_ordinal(&self) -> usize {
        self.next_ordinal
    }

    /// Restore the ordinal counter from a snapshot.
    pub fn set_next_ordinal(&mut self, ordinal: usize) {
        self.next_ordinal = ordinal.max(1);
    }

    fn intermediate_path(&self, ordinal: usize) -> PathBuf {
        self.dir
            .join(format!("{}_inprocess_report_{ordinal}.md", self.base))
    }

    fn final_path(&self) -> PathBuf {
        self.dir.join(format!("{}_detailed_report.md", self.base))
    }

    /// Condense everything since the last report boundary into an artifact.
    ///
    /// `agent_invoked` distinguishes the agent calling the summarize tool
    /// (the checklist gets a progress-tick pass first, and the caller keeps
    /// the summary as its tool result) from system-invoked condensation
    /// before a focus switch (the summary is appended as a fresh assistant
    /// note flagged as a boundary).
    pub async fn summarize(
        &mut self,
        stack: &mut SubtaskStack,
        memory: &mut dyn MemoryLog,
        agent_invoked: bool,
    ) -> Result<SummarizeOutcome> {
        let tail = intermediate_tail(memory, false).await;
        if tail.is_empty() {
            return Ok(SummarizeOutcome::NoResult {
                hint: prompts::NO_RESULT_HINT.to_string(),
            });
        }

        if agent_invoked {
            self.tick_plan_progress(stack, &tail).await?;
        }

        // Heading depth mirrors the recursion depth so nested subtask
        // reports stay subordinate when concatenated.
        let prefix = "#".repeat(stack.len().max(1));
        let system = format!(
            "{}\nStart section headings at level '{prefix}'.",
            prompts::SUMMARIZE_SYS_PROMPT
        );

        let mut tool_result = String::new();
        for msg in &tail {
            for block in &msg.content {
                if let Content::ToolResult { output, .. } = block {
                    tool_result.push_str(&output.to_string());
                    tool_result.push('\n');
                }
            }
        }

        let root = stack.root()?;
        let active = stack.peek()?;
        let instruction = prompts::fill(
            prompts::SUMMARIZE_INST,
            &[
                ("objective", &root.objective),
                ("root_gaps", root.knowledge_gaps.as_deref().unwrap_or("None")),
                ("cur_gaps", active.working_plan.as_deref().unwrap_or("None")),
                ("tool_result", &tool_result),
            ],
        );

        tracing::info!(ordinal = self.next_ordinal, "Condensing intermediate results");
        let response = self
            .model
            .invoke(
                &[ModelMessage::system(system), ModelMessage::user(instruction)],
                &[],
            )
            .await?;
        let report = response.joined_text();

        let path = self.intermediate_path(self.next_ordinal);
        write_atomic(&path, &report).await?;
        self.next_ordinal += 1;

        compact_tail(memory).await;

        if agent_invoked {
            Ok(SummarizeOutcome::Report {
                hint: prompts::fill(
                    prompts::UPDATE_REPORT_HINT,
                    &[
                        ("intermediate_report", &report),
                        ("report_path", &path.display().to_string()),
                    ],
                ),
                text: report,
                path,
                mark_boundary: true,
            })
        } else {
            memory.add(MemoryMsg::report(report.clone())).await;
            Ok(SummarizeOutcome::Report {
                hint: prompts::fill(
                    prompts::SAVE_REPORT_HINT,
                    &[("intermediate_report", &report)],
                ),
                text: report,
                path,
                mark_boundary: false,
            })
        }
    }

    /// Assemble and persist the final report; returns its text and path.
    ///
    /// When intermediate artifacts exist they are re-read in ordinal order
    /// and merged; otherwise the report is synthesized directly from the
    /// still-present intermediate memory.
    pub async fn final_report(
        &mut self,
        memory: &mut dyn MemoryLog,
    ) -> Result<(String, PathBuf)> {
        let messages = if self.next_ordinal > 1 {
            let mut drafts = String::new();
            for ordinal in 1..self.next_ordinal {
                let path = self.intermediate_path(ordinal);
                let content = tokio::fs::read_to_string(&path)
                    .await
                    .with_context(|| format!("reading draft report {}", path.display()))?;
                drafts.push_str(&content);
                drafts.push('\n');
            }
            vec![
                ModelMessage::system(prompts::REPORTING_SYS_PROMPT),
                ModelMessage::user(format!("Draft report:\n{drafts}")),
            ]
        } else {
            let tail = intermediate_tail(memory, true).await;
            let mut messages = vec![ModelMessage::system(prompts::REPORTING_SYS_PROMPT)];
            messages.extend(tail.iter().map(|msg| ModelMessage {
                role: msg.role,
                content: msg.content.clone(),
            }));
            messages
        };

        tracing::info!("Merging drafts into the final report");
        let response = self.model.invoke(&messages, &[]).await?;
        let report = response.joined_text();

        let path = self.final_path();
        write_atomic(&path, &report).await?;
        Ok((report, path))
    }

    /// Ask the model to mark completed checklist items and fold the revision
    /// back into the active record.
    async fn tick_plan_progress(
        &self,
        stack: &mut SubtaskStack,
        tail: &[MemoryMsg],
    ) -> Result<()> {
        let active = stack.peek()?;
        let gaps = active
            .knowledge_gaps
            .clone()
            .unwrap_or_else(|| active.objective.clone());

        let mut messages: Vec<ModelMessage> = tail
            .iter()
            .map(|msg| ModelMessage {
                role: msg.role,
                content: msg.content.clone(),
            })
            .collect();
        messages.push(ModelMessage::user(prompts::fill(
            prompts::SUMMARIZE_PLAN_UPDATE,
            &[("knowledge_gaps", &gaps)],
        )));

        let response = self.model.invoke(&messages, &[]).await?;
        let revision = response.joined_text();
        if !revision.trim().is_empty() {
            let (open, done) = checklist_progress(&revision);
            tracing::debug!(open, done, "Checklist progress after tick pass");
            stack.peek_mut()?.knowledge_gaps = Some(revision);
        }
        Ok(())
    }
}

/// Memory tail since the last report boundary, oldest first. With
/// `trim_tool_use`, trailing tool_use messages are dropped (they have no
/// matching result yet and would confuse a report synthesis call).
pub(crate) async fn intermediate_tail(memory: &dyn MemoryLog, trim_tool_use: bool) -> Vec<MemoryMsg> {
    let all = memory.get_all().await;
    let mut tail: Vec<MemoryMsg> = all
        .into_iter()
        .rev()
        .take_while(|msg| !msg.is_report)
        .collect();
    tail.reverse();
    if trim_tool_use {
        while tail.last().is_some_and(MemoryMsg::has_tool_use) {
            tail.pop();
        }
    }
    tail
}

/// Delete the just-summarized span: walk backward until a genuine user
/// message, a prior report boundary, or an earlier summarize call, and
/// remove the run in between (boundary messages stay). Tool results ride
/// user-role messages and do not stop the walk - purging them is the whole
/// point. A summarize call sitting at the tail is the invocation being
/// served right now; it is kept so its pending result can pair with it, and
/// the span before it is removed.
async fn compact_tail(memory: &mut dyn MemoryLog) {
    let all = memory.get_all().await;
    let mut end = all.len();
    while end > 0 && all[end - 1].calls_tool(SUMMARIZE_TOOL) {
        end -= 1;
    }
    let mut start = end;
    while start > 0 {
        let msg = &all[start - 1];
        if msg.is_report
            || (msg.role == Role::User && !msg.has_tool_result())
            || msg.calls_tool(SUMMARIZE_TOOL)
        {
            break;
        }
        start -= 1;
    }
    if start == end {
        return;
    }
    let indices: Vec<usize> = (start..end).collect();
    tracing::debug!(from = start, count = end - start, "Compacting summarized memory span");
    memory.delete(&indices).await;
}

async fn write_atomic(path: &Path, content: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("creating report directory {}", parent.display()))?;
    }
    let tmp = path.with_extension("md.tmp");
    tokio::fs::write(&tmp, content)
        .await
        .with_context(|| format!("writing report {}", tmp.display()))?;
    tokio::fs::rename(&tmp, path)
        .await
        .with_context(|| format!("publishing report {}", path.display()))?;
    Ok(())
}
