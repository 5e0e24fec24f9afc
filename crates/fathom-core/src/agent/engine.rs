//! Decomposition, follow-up judgment, and failure reflection.
//!
//! The engine is the state machine over the active subtask. All three
//! operations go through a structured model call and return a typed outcome;
//! a payload that fails validation never causes a structural mutation - the
//! caller gets a retry hint to surface on the next reasoning turn.
//!
//! The engine revises records in place (plans, knowledge gaps) but never
//! pushes subtasks itself: `Explore` / `Decomposed` outcomes instruct the
//! orchestrator, which persists an intermediate report of the current
//! subtask before switching focus.

use std::sync::Arc;

use anyhow::Result;
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::ai::structured::{FieldSpec, FieldType, StructuredSpec};
use crate::ai::types::{Content, ModelMessage, Role};
use crate::ai::ModelClient;
use crate::memory::{MemoryLog, MemoryMsg};
use crate::prompts;
use crate::tools::{ToolContext, ToolRegistry};

use super::stack::SubtaskStack;

/// Structured payload of a decomposition call.
#[derive(Debug, Clone, Deserialize)]
pub struct Decomposition {
    pub knowledge_gaps: String,
    pub working_plan: String,
}

/// Structured payload of the pre-judgment extraction screening.
#[derive(Debug, Clone, Deserialize)]
pub struct ExtractionCheck {
    pub reasoning: String,
    pub need_extraction: bool,
    #[serde(default)]
    pub url: String,
}

/// Structured payload of the follow-up judgment.
#[derive(Debug, Clone, Deserialize)]
pub struct FollowupJudgment {
    pub reasoning: String,
    #[serde(default)]
    pub knowledge_gap_revision: String,
    pub to_further_explore: bool,
    #[serde(default)]
    pub subtask: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RephraseDecision {
    #[serde(default)]
    pub need_rephrase: bool,
    #[serde(default)]
    pub rephrased_plan: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DecomposeDecision {
    #[serde(default)]
    pub need_decompose: bool,
    #[serde(default)]
    pub failed_subtask: String,
}

/// Structured payload of a failure reflection.
#[derive(Debug, Clone, Deserialize)]
pub struct Reflection {
    #[serde(default)]
    pub rephrase_subtask: RephraseDecision,
    #[serde(default)]
    pub decompose_subtask: DecomposeDecision,
}

fn decomposition_spec() -> StructuredSpec {
    StructuredSpec {
        description: "Report the knowledge gaps and working plan for the current subtask.",
        fields: vec![
            FieldSpec::required(
                "knowledge_gaps",
                FieldType::String,
                "A markdown checklist of essential knowledge gaps, each on its own line; \
                 perspective-expansion items flagged with (EXPANSION).",
            ),
            FieldSpec::required(
                "working_plan",
                FieldType::String,
                "A logically ordered step-by-step working plan (3-5 steps), each step \
                 starting with its number. Expansion steps clearly marked with (EXPANSION).",
            ),
        ],
    }
}

fn extraction_spec() -> StructuredSpec {
    StructuredSpec {
        description: "Decide whether any search result warrants deeper single-page extraction.",
        fields: vec![
            FieldSpec::required(
                "reasoning",
                FieldType::String,
                "The reasoning for your decision, including a summary of evidence and logic \
                 for whether more information is needed.",
            ),
            FieldSpec::required(
                "need_extraction",
                FieldType::Bool,
                "Whether more information is to be extracted.",
            ),
            FieldSpec::optional(
                "url",
                FieldType::String,
                "Direct URL to the original search result requiring further extraction, or \
                 an empty string if not applicable.",
                json!(""),
            ),
        ],
    }
}

fn judgment_spec() -> StructuredSpec {
    StructuredSpec {
        description: "Judge whether the gathered information closes the knowledge gaps.",
        fields: vec![
            FieldSpec::required(
                "reasoning",
                FieldType::String,
                "The reasoning for your decision, including specific gaps or opportunities \
                 if the current information is still insufficient.",
            ),
            FieldSpec::optional(
                "knowledge_gap_revision",
                FieldType::String,
                "The revised knowledge gaps; mark items with sufficient information as [x].",
                json!(""),
            ),
            FieldSpec::required(
                "to_further_explore",
                FieldType::Bool,
                "Whether the information content is adequate or a further exploration \
                 subtask is needed.",
            ),
            FieldSpec::optional(
                "subtask",
                FieldType::String,
                "Actionable description of the follow-up task, or an empty string if not \
                 applicable.",
                json!(""),
            ),
        ],
    }
}

fn reflection_spec() -> StructuredSpec {
    StructuredSpec {
        description: "Decide whether the failed subtask should be rephrased or decomposed.",
        fields: vec![
            FieldSpec::optional(
                "rephrase_subtask",
                FieldType::Object,
                "Object with `need_rephrase` (bool) and `rephrased_plan` (the modified \
                 working plan with only the inappropriate step replaced).",
                json!({}),
            ),
            FieldSpec::optional(
                "decompose_subtask",
                FieldType::Object,
                "Object with `need_decompose` (bool) and `failed_subtask` (the failed step \
                 to decompose further).",
                json!({}),
            ),
        ],
    }
}

/// Result of a decomposition attempt. Every variant carries the text to
/// surface to the reasoning loop.
#[derive(Debug, Clone)]
pub enum DecomposeOutcome {
    Decomposed { detail: String },
    Retry { hint: String },
    DepthExhausted { hint: String },
}

/// Result of a follow-up judgment.
#[derive(Debug, Clone)]
pub enum FollowUpOutcome {
    /// Gathered information suffices; no structural change.
    GapsClosed { reasoning: String },
    /// A child subtask should be pushed after persisting a report.
    Explore { objective: String, reasoning: String },
    /// Exploration proposed but the depth budget is spent.
    DepthExhausted { hint: String },
    /// Judgment payload was malformed; no structural change.
    Retry { hint: String },
}

/// Result of a failure reflection. Rephrase and decompose are mutually
/// exclusive; when a payload signals both, rephrase wins.
#[derive(Debug, Clone)]
pub enum ReflectionOutcome {
    Rephrased { detail: String },
    Decomposed { objective: String, detail: String },
    NoChange { detail: String },
    DepthExhausted { hint: String },
    Retry { hint: String },
}

/// Stateless driver for the three structured judgment calls.
#[derive(Clone)]
pub struct ResearchEngine {
    model: Arc<dyn ModelClient>,
}

impl ResearchEngine {
    pub fn new(model: Arc<dyn ModelClient>) -> Self {
        Self { model }
    }

    /// Fill the active subtask's knowledge gaps and working plan.
    ///
    /// Ancestor plans are provided as context so a child plan does not
    /// re-cover ground the parent already claimed.
    pub async fn decompose(&self, stack: &mut SubtaskStack) -> Result<DecomposeOutcome> {
        if stack.len() > stack.max_depth() {
            return Ok(DecomposeOutcome::DepthExhausted {
                hint: prompts::MAX_DEPTH_HINT.to_string(),
            });
        }

        let mut previous_plan = String::new();
        for (i, record) in stack.records().iter().enumerate() {
            previous_plan.push_str(&format!(
                "The {i}-th plan: {}\n",
                record.working_plan.as_deref().unwrap_or("None")
            ));
        }
        let instruction = prompts::fill(
            prompts::PREVIOUS_PLAN_INST,
            &[
                ("previous_plan", &previous_plan),
                ("objective", &stack.peek()?.objective),
            ],
        );

        tracing::info!(depth = stack.len(), "Decomposing the active subtask");
        let spec = decomposition_spec();
        let response = self
            .model
            .invoke(
                &[
                    ModelMessage::system(prompts::DECOMPOSE_SYS_PROMPT),
                    ModelMessage::user(instruction),
                ],
                &[spec.to_tool()],
            )
            .await?;

        match spec.parse::<Decomposition>(&response) {
            Ok(decomposition) => {
                let detail = format!(
                    "## Knowledge Gaps:\n{}\n## Working Plan:\n{}",
                    decomposition.knowledge_gaps, decomposition.working_plan
                );
                stack.revise_top(
                    Some(decomposition.working_plan),
                    Some(decomposition.knowledge_gaps),
                )?;
                Ok(DecomposeOutcome::Decomposed { detail })
            }
            Err(err) => {
                tracing::warn!(reason = %err.reason, "Decomposition payload rejected");
                // Reset so the next cycle retries from a clean record.
                let top = stack.peek_mut()?;
                top.working_plan = None;
                top.knowledge_gaps = None;
                Ok(DecomposeOutcome::Retry {
                    hint: prompts::fill(
                        prompts::RETRY_HINT,
                        &[("state", "decomposing the subtask")],
                    ),
                })
            }
        }
    }

    /// Judge gathered search evidence against the active knowledge gaps.
    ///
    /// Runs an optional single-page extraction sub-step first, then the
    /// judgment proper. Gap revisions are applied in place; exploration is
    /// returned as an outcome for the orchestrator to act on.
    #[allow(clippy::too_many_arguments)]
    pub async fn follow_up(
        &self,
        stack: &mut SubtaskStack,
        memory: &mut dyn MemoryLog,
        registry: &ToolRegistry,
        tool_ctx: &ToolContext,
        extract_tool: &str,
        search_queries: &str,
        search_results: &str,
    ) -> Result<FollowUpOutcome> {
        let root_checklist = stack
            .root()?
            .knowledge_gaps
            .clone()
            .unwrap_or_default();
        let active = stack.peek()?;
        let active_gaps = active
            .knowledge_gaps
            .clone()
            .unwrap_or_else(|| active.objective.clone());

        let expansion_inst = prompts::fill(
            prompts::EXPANSION_INST,
            &[
                ("checklist", &root_checklist),
                ("knowledge_gaps", &active_gaps),
                ("search_query", search_queries),
                ("search_results", search_results),
            ],
        );

        // Step 1: screen the results for a page worth extracting in full.
        tracing::info!("Screening search results for follow-up extraction");
        let extraction = {
            let spec = extraction_spec();
            let response = self
                .model
                .invoke(&[ModelMessage::user(expansion_inst.clone())], &[spec.to_tool()])
                .await?;
            match spec.parse::<ExtractionCheck>(&response) {
                Ok(check) => {
                    memory
                        .add(MemoryMsg::assistant(format!(
                            "Extraction check: need_extraction={}, url={}\n{}",
                            check.need_extraction, check.url, check.reasoning
                        )))
                        .await;
                    Some(check)
                }
                Err(err) => {
                    tracing::warn!(reason = %err.reason, "Extraction payload rejected");
                    None
                }
            }
        };

        let screening_reasoning = extraction
            .as_ref()
            .map(|c| c.reasoning.clone())
            .unwrap_or_else(|| "I need more information.".to_string());

        // Step 2: extract the flagged page through the tool registry.
        let mut extraction_exchange = Vec::new();
        if let Some(check) = &extraction {
            if check.need_extraction && !check.url.is_empty() && registry.contains(extract_tool) {
                tracing::info!(url = %check.url, "Reading flagged page in full");
                let call_id = Uuid::new_v4().to_string();
                let params = json!({ "urls": [check.url], "extract_depth": "basic" });
                let result = registry.execute(extract_tool, params.clone(), tool_ctx).await;

                let use_msg = MemoryMsg::new(
                    Role::Assistant,
                    vec![Content::ToolUse {
                        id: call_id.clone(),
                        name: extract_tool.to_string(),
                        input: params,
                    }],
                );
                let result_msg = MemoryMsg::new(
                    Role::User,
                    vec![Content::ToolResult {
                        tool_use_id: call_id,
                        output: json!(result.output),
                        is_error: result.is_error.then_some(true),
                    }],
                );
                memory.add(use_msg.clone()).await;
                memory.add(result_msg.clone()).await;
                extraction_exchange = vec![use_msg, result_msg];
            }
        }

        // Step 3: the judgment proper.
        tracing::info!("Judging whether the knowledge gaps are fulfilled");
        let mut messages = vec![
            ModelMessage::user(expansion_inst),
            ModelMessage::assistant(screening_reasoning),
        ];
        for msg in &extraction_exchange {
            messages.push(ModelMessage {
                role: msg.role,
                content: msg.content.clone(),
            });
        }
        messages.push(ModelMessage::user(prompts::FOLLOW_UP_JUDGE_SYS_PROMPT));

        let spec = judgment_spec();
        let response = self.model.invoke(&messages, &[spec.to_tool()]).await?;
        let judgment = match spec.parse::<FollowupJudgment>(&response) {
            Ok(judgment) => judgment,
            Err(err) => {
                tracing::warn!(reason = %err.reason, "Follow-up judgment rejected");
                return Ok(FollowUpOutcome::Retry {
                    hint: prompts::fill(
                        prompts::RETRY_HINT,
                        &[("state", "judging the follow-up")],
                    ),
                });
            }
        };
        memory
            .add(MemoryMsg::assistant(format!(
                "Follow-up judgment: to_further_explore={}\n{}",
                judgment.to_further_explore, judgment.reasoning
            )))
            .await;

        if !judgment.knowledge_gap_revision.is_empty() {
            stack.peek_mut()?.knowledge_gaps = Some(judgment.knowledge_gap_revision.clone());
        }

        if judgment.to_further_explore {
            if !stack.can_push() {
                Ok(FollowUpOutcome::DepthExhausted {
                    hint: prompts::MAX_DEPTH_HINT.to_string(),
                })
            } else if judgment.subtask.is_empty() {
                // Exploration requested without an objective is a malformed
                // judgment, not a depth problem.
                Ok(FollowUpOutcome::Retry {
                    hint: prompts::fill(
                        prompts::RETRY_HINT,
                        &[("state", "judging the follow-up")],
                    ),
                })
            } else {
                Ok(FollowUpOutcome::Explore {
                    objective: judgment.subtask,
                    reasoning: if judgment.reasoning.is_empty() {
                        prompts::NEED_DEEPER_HINT.to_string()
                    } else {
                        judgment.reasoning
                    },
                })
            }
        } else {
            Ok(FollowUpOutcome::GapsClosed {
                reasoning: if judgment.reasoning.is_empty() {
                    prompts::SUFFICIENT_HINT.to_string()
                } else {
                    judgment.reasoning
                },
            })
        }
    }

    /// Reflect on a stalled subtask: rephrase the flawed step in place, or
    /// propose a decomposition of it.
    pub async fn reflect(
        &self,
        stack: &mut SubtaskStack,
        history: &[MemoryMsg],
    ) -> Result<ReflectionOutcome> {
        let mut conversation_history = String::new();
        for msg in history {
            let role = match msg.role {
                Role::User => "user",
                Role::Assistant => "assistant",
                Role::System => "system",
            };
            conversation_history.push_str(&format!("[{role}] {}\n", msg.joined_text()));
        }

        let active = stack.peek()?;
        let instruction = prompts::fill(
            prompts::REFLECT_INSTRUCTION,
            &[
                ("conversation_history", &conversation_history),
                ("objective", &active.objective),
                ("plan", active.working_plan.as_deref().unwrap_or("None")),
                ("knowledge_gaps", active.knowledge_gaps.as_deref().unwrap_or("None")),
            ],
        );

        tracing::info!("Reflecting on the stalled subtask");
        let spec = reflection_spec();
        let response = self
            .model
            .invoke(
                &[
                    ModelMessage::system(prompts::REFLECT_SYS_PROMPT),
                    ModelMessage::user(instruction),
                ],
                &[spec.to_tool()],
            )
            .await?;

        let reflection = match spec.parse::<Reflection>(&response) {
            Ok(reflection) => reflection,
            Err(err) => {
                tracing::warn!(reason = %err.reason, "Reflection payload rejected");
                return Ok(ReflectionOutcome::Retry {
                    hint: prompts::fill(
                        prompts::RETRY_HINT,
                        &[("state", "making the reflection")],
                    ),
                });
            }
        };

        // Rephrase takes precedence when a payload signals both branches.
        if reflection.rephrase_subtask.need_rephrase {
            let plan = reflection.rephrase_subtask.rephrased_plan;
            stack.peek_mut()?.working_plan = Some(plan.clone());
            return Ok(ReflectionOutcome::Rephrased {
                detail: format!("Rephrased the working plan:\n{plan}"),
            });
        }
        if reflection.decompose_subtask.need_decompose {
            // Reflection is allowed one push past the exploration gate: it
            // may grow the stack to max_depth + 1, never beyond.
            if stack.len() > stack.max_depth() {
                return Ok(ReflectionOutcome::DepthExhausted {
                    hint: prompts::MAX_DEPTH_HINT.to_string(),
                });
            }
            let objective = reflection.decompose_subtask.failed_subtask;
            return Ok(ReflectionOutcome::Decomposed {
                detail: format!("Decomposing the failed step: {objective}"),
                objective,
            });
        }
        Ok(ReflectionOutcome::NoChange {
            detail: "Reflection proposed no structural change.".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::structured::STRUCTURED_OUTPUT_TOOL;
    use crate::ai::types::{AiTool, FinishReason, ModelResponse};
    use crate::memory::InMemoryLog;
    use async_trait::async_trait;
    use serde_json::Value;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    struct ScriptedModel {
        responses: Mutex<VecDeque<ModelResponse>>,
    }

    impl ScriptedModel {
        fn new(responses: Vec<ModelResponse>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.into()),
            })
        }
    }

    #[async_trait]
    impl ModelClient for ScriptedModel {
        async fn invoke(
            &self,
            _messages: &[ModelMessage],
            _tools: &[AiTool],
        ) -> Result<ModelResponse> {
            Ok(self
                .responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| ModelResponse::text("script exhausted")))
        }
    }

    fn structured(input: Value) -> ModelResponse {
        ModelResponse {
            content: vec![Content::ToolUse {
                id: "call".into(),
                name: STRUCTURED_OUTPUT_TOOL.into(),
                input,
            }],
            finish_reason: FinishReason::ToolCalls,
        }
    }

    fn stack_with_root(max_depth: usize) -> SubtaskStack {
        let mut stack = SubtaskStack::new(max_depth);
        stack.push("survey LLM agents").unwrap();
        stack
    }

    #[tokio::test]
    async fn decompose_fills_plan_and_gaps() {
        let model = ScriptedModel::new(vec![structured(json!({
            "knowledge_gaps": "- [ ] taxonomy of agents",
            "working_plan": "1. search surveys\n2. compare"
        }))]);
        let engine = ResearchEngine::new(model);
        let mut stack = stack_with_root(3);

        let outcome = engine.decompose(&mut stack).await.unwrap();
        assert!(matches!(outcome, DecomposeOutcome::Decomposed { .. }));
        let top = stack.peek().unwrap();
        assert_eq!(top.working_plan.as_deref(), Some("1. search surveys\n2. compare"));
        assert_eq!(top.knowledge_gaps.as_deref(), Some("- [ ] taxonomy of agents"));
    }

    #[tokio::test]
    async fn decompose_parse_failure_leaves_record_empty_and_hints_retry() {
        let model = ScriptedModel::new(vec![structured(json!({"working_plan": 42}))]);
        let engine = ResearchEngine::new(model);
        let mut stack = stack_with_root(3);

        let outcome = engine.decompose(&mut stack).await.unwrap();
        let DecomposeOutcome::Retry { hint } = outcome else {
            panic!("expected retry outcome");
        };
        assert!(hint.contains("decomposing the subtask"));
        assert!(stack.peek().unwrap().working_plan.is_none());
    }

    #[tokio::test]
    async fn follow_up_pushes_nothing_but_signals_exploration() {
        let model = ScriptedModel::new(vec![
            // extraction screening: nothing to extract
            structured(json!({
                "reasoning": "results look shallow",
                "need_extraction": false
            })),
            // judgment: explore deeper
            structured(json!({
                "reasoning": "pricing data is missing",
                "knowledge_gap_revision": "- [x] find vendors\n- [ ] pricing",
                "to_further_explore": true,
                "subtask": "collect pricing data"
            })),
        ]);
        let engine = ResearchEngine::new(model);
        let mut stack = stack_with_root(3);
        let mut memory = InMemoryLog::new();
        let registry = ToolRegistry::new();

        let outcome = engine
            .follow_up(
                &mut stack,
                &mut memory,
                &registry,
                &ToolContext::default(),
                "extract",
                "vendor pricing",
                "result blob",
            )
            .await
            .unwrap();

        let FollowUpOutcome::Explore { objective, .. } = outcome else {
            panic!("expected exploration");
        };
        assert_eq!(objective, "collect pricing data");
        // Revision applied in place, stack untouched.
        assert_eq!(stack.len(), 1);
        assert_eq!(
            stack.peek().unwrap().knowledge_gaps.as_deref(),
            Some("- [x] find vendors\n- [ ] pricing")
        );
    }

    #[tokio::test]
    async fn follow_up_at_depth_limit_reports_exhaustion() {
        let model = ScriptedModel::new(vec![
            structured(json!({"reasoning": "r", "need_extraction": false})),
            structured(json!({
                "reasoning": "needs more",
                "to_further_explore": true,
                "subtask": "go deeper"
            })),
        ]);
        let engine = ResearchEngine::new(model);
        let mut stack = SubtaskStack::new(1);
        stack.push("root").unwrap();
        let mut memory = InMemoryLog::new();
        let registry = ToolRegistry::new();

        let outcome = engine
            .follow_up(
                &mut stack,
                &mut memory,
                &registry,
                &ToolContext::default(),
                "extract",
                "q",
                "r",
            )
            .await
            .unwrap();
        assert!(matches!(outcome, FollowUpOutcome::DepthExhausted { .. }));
        assert_eq!(stack.len(), 1);
    }

    #[tokio::test]
    async fn follow_up_explore_without_an_objective_hints_retry() {
        let model = ScriptedModel::new(vec![
            structured(json!({"reasoning": "r", "need_extraction": false})),
            // explore requested but the subtask field is left empty
            structured(json!({
                "reasoning": "something is missing",
                "to_further_explore": true
            })),
        ]);
        let engine = ResearchEngine::new(model);
        let mut stack = stack_with_root(3);
        let mut memory = InMemoryLog::new();
        let registry = ToolRegistry::new();

        let outcome = engine
            .follow_up(
                &mut stack,
                &mut memory,
                &registry,
                &ToolContext::default(),
                "extract",
                "q",
                "r",
            )
            .await
            .unwrap();
        // Depth budget remains, so this must not claim exhaustion.
        let FollowUpOutcome::Retry { hint } = outcome else {
            panic!("expected retry outcome");
        };
        assert!(hint.contains("judging the follow-up"));
        assert_eq!(stack.len(), 1);
    }

    #[tokio::test]
    async fn reflection_prefers_rephrase_when_both_branches_signal() {
        let model = ScriptedModel::new(vec![structured(json!({
            "rephrase_subtask": {"need_rephrase": true, "rephrased_plan": "1. narrower query"},
            "decompose_subtask": {"need_decompose": true, "failed_subtask": "step 2"}
        }))]);
        let engine = ResearchEngine::new(model);
        let mut stack = stack_with_root(3);

        let outcome = engine.reflect(&mut stack, &[]).await.unwrap();
        assert!(matches!(outcome, ReflectionOutcome::Rephrased { .. }));
        assert_eq!(stack.peek().unwrap().working_plan.as_deref(), Some("1. narrower query"));
        // No push happened.
        assert_eq!(stack.len(), 1);
    }

    #[tokio::test]
    async fn reflection_decompose_is_blocked_at_depth_limit() {
        let responses = vec![
            structured(json!({
                "decompose_subtask": {"need_decompose": true, "failed_subtask": "step 2"}
            })),
            structured(json!({
                "decompose_subtask": {"need_decompose": true, "failed_subtask": "step 3"}
            })),
        ];
        let engine = ResearchEngine::new(ScriptedModel::new(responses));
        let mut stack = SubtaskStack::new(1);
        stack.push("root").unwrap();

        let first = engine.reflect(&mut stack, &[]).await.unwrap();
        let ReflectionOutcome::Decomposed { objective, .. } = first else {
            panic!("expected decomposition proposal");
        };
        stack.push(objective).unwrap();
        assert_eq!(stack.len(), 2);

        let second = engine.reflect(&mut stack, &[]).await.unwrap();
        assert!(matches!(second, ReflectionOutcome::DepthExhausted { .. }));
        assert_eq!(stack.len(), 2);
    }

    #[tokio::test]
    async fn reflection_parse_failure_takes_no_action() {
        let model = ScriptedModel::new(vec![ModelResponse::text("I am confused")]);
        let engine = ResearchEngine::new(model);
        let mut stack = stack_with_root(3);
        stack.revise_top(Some("plan".into()), None).unwrap();

        let outcome = engine.reflect(&mut stack, &[]).await.unwrap();
        let ReflectionOutcome::Retry { hint } = outcome else {
            panic!("expected retry outcome");
        };
        assert!(hint.contains("making the reflection"));
        assert_eq!(stack.peek().unwrap().working_plan.as_deref(), Some("plan"));
    }
}
