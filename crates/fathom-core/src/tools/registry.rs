//! Tool registry for managing available tools.
//!
//! Tools are external collaborators: the core registers them, hands their
//! schemas to the model, and dispatches calls. Workers receive a scoped
//! subset of the registry via named groups.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use crate::ai::types::AiTool;

/// Maximum tool output folded back into memory before truncation.
const MAX_TOOL_OUTPUT_CHARS: usize = 30_000;

/// Tool execution result.
#[derive(Debug, Clone)]
pub struct ToolResult {
    pub output: String,
    pub is_error: bool,
    /// Set when execution was cut short by a user interrupt; the
    /// orchestrator records these as synthetic results during cleanup.
    pub is_interrupted: bool,
    /// Structured side-channel for callers that need more than text
    /// (worker responses, report paths).
    pub metadata: Option<Value>,
}

impl ToolResult {
    pub fn success(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            is_error: false,
            is_interrupted: false,
            metadata: None,
        }
    }

    pub fn error(msg: impl std::fmt::Display) -> Self {
        Self {
            output: msg.to_string(),
            is_error: true,
            is_interrupted: false,
            metadata: None,
        }
    }

    pub fn interrupted(msg: impl Into<String>) -> Self {
        Self {
            output: msg.into(),
            is_error: true,
            is_interrupted: true,
            metadata: None,
        }
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// Context for tool execution.
#[derive(Debug, Clone, Default)]
pub struct ToolContext {
    pub working_dir: PathBuf,
}

/// A callable tool.
#[async_trait]
pub trait Tool: Send + Sync {
    fn description(&self) -> &str;
    /// JSON schema of the tool's parameters.
    fn input_schema(&self) -> Value;
    async fn execute(&self, params: Value, ctx: &ToolContext) -> ToolResult;
}

struct Registration {
    tool: Arc<dyn Tool>,
    group: Option<String>,
}

/// Registry of available tools. Registration order is preserved so that
/// schema listings are deterministic.
#[derive(Default)]
pub struct ToolRegistry {
    order: Vec<String>,
    tools: HashMap<String, Registration>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool under `name`, optionally tagging it with a group.
    /// Re-registering a name replaces the tool in place.
    pub fn register(&mut self, name: impl Into<String>, tool: Arc<dyn Tool>, group: Option<&str>) {
        let name = name.into();
        if !self.tools.contains_key(&name) {
            self.order.push(name.clone());
        }
        self.tools.insert(
            name,
            Registration {
                tool,
                group: group.map(ToString::to_string),
            },
        );
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// All registered tool names, in registration order.
    pub fn names(&self) -> Vec<String> {
        self.order.clone()
    }

    /// Names in a given group, in registration order.
    pub fn names_in_group(&self, group: &str) -> Vec<String> {
        self.order
            .iter()
            .filter(|name| {
                self.tools
                    .get(*name)
                    .and_then(|r| r.group.as_deref())
                    .is_some_and(|g| g == group)
            })
            .cloned()
            .collect()
    }

    /// JSON tool schemas for the model, in registration order.
    pub fn schemas(&self) -> Vec<AiTool> {
        self.order
            .iter()
            .filter_map(|name| {
                let reg = self.tools.get(name)?;
                Some(AiTool {
                    name: name.clone(),
                    description: reg.tool.description().to_string(),
                    input_schema: reg.tool.input_schema(),
                })
            })
            .collect()
    }

    /// Schemas restricted to a named subset (worker tool scoping).
    pub fn schemas_for(&self, names: &[String]) -> Vec<AiTool> {
        self.schemas()
            .into_iter()
            .filter(|t| names.contains(&t.name))
            .collect()
    }

    /// Names in `requested` that are not registered.
    pub fn missing_from(&self, requested: &[String]) -> Vec<String> {
        requested
            .iter()
            .filter(|name| !self.contains(name))
            .cloned()
            .collect()
    }

    /// Execute a tool by name. Unknown tools produce an error result (a
    /// tool-level failure the model can react to), not a crash.
    pub async fn execute(&self, name: &str, params: Value, ctx: &ToolContext) -> ToolResult {
        let Some(reg) = self.tools.get(name) else {
            tracing::warn!(tool = name, "Unknown tool requested");
            return ToolResult::error(format!("Unknown tool: {name}"));
        };

        let result = reg.tool.execute(params, ctx).await;
        tracing::debug!(
            tool = name,
            is_error = result.is_error,
            output_len = result.output.len(),
            "Tool execution completed"
        );

        ToolResult {
            output: truncate_output(&result.output),
            ..result
        }
    }
}

/// Truncate oversized tool output on a line boundary, keeping a marker.
pub fn truncate_output(output: &str) -> String {
    if output.len() <= MAX_TOOL_OUTPUT_CHARS {
        return output.to_string();
    }

    let truncated_len = floor_char_boundary(output, MAX_TOOL_OUTPUT_CHARS);
    let truncated = &output[..truncated_len];
    let break_point = truncated.rfind('\n').unwrap_or(truncated_len);
    let clean = &output[..break_point];
    format!(
        "{}\n\n[... OUTPUT TRUNCATED: {} chars -> {} chars ...]",
        clean,
        output.len(),
        clean.len()
    )
}

fn floor_char_boundary(text: &str, index: usize) -> usize {
    let mut boundary = index.min(text.len());
    while boundary > 0 && !text.is_char_boundary(boundary) {
        boundary -= 1;
    }
    boundary
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn description(&self) -> &str {
            "Echo the input back"
        }

        fn input_schema(&self) -> Value {
            json!({"type": "object", "properties": {"text": {"type": "string"}}})
        }

        async fn execute(&self, params: Value, _ctx: &ToolContext) -> ToolResult {
            ToolResult::success(params["text"].as_str().unwrap_or_default().to_string())
        }
    }

    fn registry() -> ToolRegistry {
        let mut reg = ToolRegistry::new();
        reg.register("echo", Arc::new(EchoTool), Some("research"));
        reg.register("echo2", Arc::new(EchoTool), None);
        reg
    }

    #[tokio::test]
    async fn unknown_tool_is_an_error_result_not_a_panic() {
        let reg = registry();
        let result = reg
            .execute("missing", json!({}), &ToolContext::default())
            .await;
        assert!(result.is_error);
        assert!(result.output.contains("Unknown tool"));
    }

    #[tokio::test]
    async fn execute_dispatches_to_registered_tool() {
        let reg = registry();
        let result = reg
            .execute("echo", json!({"text": "hi"}), &ToolContext::default())
            .await;
        assert!(!result.is_error);
        assert_eq!(result.output, "hi");
    }

    #[test]
    fn group_scoping_filters_names() {
        let reg = registry();
        assert_eq!(reg.names_in_group("research"), vec!["echo"]);
        assert_eq!(reg.names(), vec!["echo", "echo2"]);
    }

    #[test]
    fn schemas_for_restricts_to_a_scoped_toolset() {
        let reg = registry();
        let toolset = reg.names_in_group("research");
        let schemas = reg.schemas_for(&toolset);
        assert_eq!(schemas.len(), 1);
        assert_eq!(schemas[0].name, "echo");
    }

    #[test]
    fn missing_from_reports_unregistered_names() {
        let reg = registry();
        let missing = reg.missing_from(&["echo".to_string(), "nope".to_string()]);
        assert_eq!(missing, vec!["nope"]);
    }

    #[test]
    fn truncation_keeps_line_boundary_and_marker() {
        let long: String = std::iter::repeat("line of output\n").take(4000).collect();
        let out = truncate_output(&long);
        assert!(out.len() < long.len());
        assert!(out.contains("OUTPUT TRUNCATED"));
        let kept = &out[..out.find("\n\n[...").unwrap()];
        assert!(kept.ends_with("line of output"));
    }
}
