//! Structured model output via a synthetic tool call.
//!
//! Judgment calls (decomposition, follow-up, reflection) need typed data
//! back from the model. The pattern: describe the expected shape as an
//! explicit `StructuredSpec` value, present it to the model as a one-off
//! tool schema, then collect the tool_use arguments from the response and
//! validate them against the spec before deserializing.
//!
//! Validation failures are a recoverable condition - the caller gets the
//! raw payload back in the error and is expected to retry on the next
//! cycle, never to crash.

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use thiserror::Error;

use super::types::{AiTool, Content, ModelResponse};

/// Name of the synthetic tool used to carry structured output.
pub const STRUCTURED_OUTPUT_TOOL: &str = "emit_structured_output";

/// Primitive type tags for structured fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    String,
    Bool,
    Object,
}

impl FieldType {
    fn json_name(self) -> &'static str {
        match self {
            FieldType::String => "string",
            FieldType::Bool => "boolean",
            FieldType::Object => "object",
        }
    }

    fn matches(self, value: &Value) -> bool {
        match self {
            FieldType::String => value.is_string(),
            FieldType::Bool => value.is_boolean(),
            FieldType::Object => value.is_object(),
        }
    }
}

/// One field of a structured output shape.
#[derive(Debug, Clone)]
pub struct FieldSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub field_type: FieldType,
    /// Default applied when the model omits the field. A field with no
    /// default is required.
    pub default: Option<Value>,
}

impl FieldSpec {
    pub fn required(name: &'static str, field_type: FieldType, description: &'static str) -> Self {
        Self {
            name,
            description,
            field_type,
            default: None,
        }
    }

    pub fn optional(
        name: &'static str,
        field_type: FieldType,
        description: &'static str,
        default: Value,
    ) -> Self {
        Self {
            name,
            description,
            field_type,
            default: Some(default),
        }
    }
}

/// Explicit schema/validator value for a structured model call.
#[derive(Debug, Clone)]
pub struct StructuredSpec {
    pub description: &'static str,
    pub fields: Vec<FieldSpec>,
}

/// Raised when the model's structured payload cannot be validated.
#[derive(Debug, Error)]
#[error("structured output rejected: {reason} (raw: {raw})")]
pub struct StructuredParseError {
    pub reason: String,
    /// The offending payload, kept for diagnostics and retry hints.
    pub raw: Value,
}

impl StructuredSpec {
    /// Render as the synthetic tool schema presented to the model.
    pub fn to_tool(&self) -> AiTool {
        let mut properties = Map::new();
        let mut required = Vec::new();
        for field in &self.fields {
            properties.insert(
                field.name.to_string(),
                serde_json::json!({
                    "type": field.field_type.json_name(),
                    "description": field.description,
                }),
            );
            if field.default.is_none() {
                required.push(Value::String(field.name.to_string()));
            }
        }
        AiTool {
            name: STRUCTURED_OUTPUT_TOOL.to_string(),
            description: self.description.to_string(),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": Value::Object(properties),
                "required": Value::Array(required),
            }),
        }
    }

    /// Validate a raw payload: required fields present, types correct,
    /// defaults filled in. Unknown fields are dropped rather than rejected.
    pub fn validate(&self, raw: Value) -> Result<Value, StructuredParseError> {
        let Value::Object(input) = &raw else {
            return Err(StructuredParseError {
                reason: "payload is not a JSON object".to_string(),
                raw,
            });
        };

        let mut out = Map::new();
        for field in &self.fields {
            match input.get(field.name) {
                Some(value) if field.field_type.matches(value) => {
                    out.insert(field.name.to_string(), value.clone());
                }
                Some(value) => {
                    return Err(StructuredParseError {
                        reason: format!(
                            "field '{}' has wrong type (expected {}, got {})",
                            field.name,
                            field.field_type.json_name(),
                            type_name(value)
                        ),
                        raw,
                    });
                }
                None => match &field.default {
                    Some(default) => {
                        out.insert(field.name.to_string(), default.clone());
                    }
                    None => {
                        return Err(StructuredParseError {
                            reason: format!("missing required field '{}'", field.name),
                            raw,
                        });
                    }
                },
            }
        }
        Ok(Value::Object(out))
    }

    /// Collect tool_use arguments from a response, validate, deserialize.
    ///
    /// Multiple tool_use blocks are merged in order (later blocks win per
    /// key), matching how providers occasionally split one logical call.
    pub fn parse<T: DeserializeOwned>(
        &self,
        response: &ModelResponse,
    ) -> Result<T, StructuredParseError> {
        let mut merged = Map::new();
        for block in &response.content {
            if let Content::ToolUse { input, .. } = block {
                if let Value::Object(obj) = input {
                    for (k, v) in obj {
                        merged.insert(k.clone(), v.clone());
                    }
                }
            }
        }
        if merged.is_empty() {
            return Err(StructuredParseError {
                reason: "response carried no tool_use payload".to_string(),
                raw: Value::String(response.joined_text()),
            });
        }

        let validated = self.validate(Value::Object(merged))?;
        serde_json::from_value(validated.clone()).map_err(|e| StructuredParseError {
            reason: format!("deserialization failed: {e}"),
            raw: validated,
        })
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::types::FinishReason;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Deserialize)]
    struct Sample {
        answer: String,
        done: bool,
    }

    fn sample_spec() -> StructuredSpec {
        StructuredSpec {
            description: "sample",
            fields: vec![
                FieldSpec::required("answer", FieldType::String, "the answer"),
                FieldSpec::optional("done", FieldType::Bool, "finished", json!(false)),
            ],
        }
    }

    fn tool_response(input: Value) -> ModelResponse {
        ModelResponse {
            content: vec![Content::ToolUse {
                id: "t1".into(),
                name: STRUCTURED_OUTPUT_TOOL.into(),
                input,
            }],
            finish_reason: FinishReason::ToolCalls,
        }
    }

    #[test]
    fn defaults_fill_missing_optionals() {
        let parsed: Sample = sample_spec()
            .parse(&tool_response(json!({"answer": "42"})))
            .unwrap();
        assert_eq!(parsed.answer, "42");
        assert!(!parsed.done);
    }

    #[test]
    fn missing_required_field_is_a_parse_error() {
        let err = sample_spec()
            .parse::<Sample>(&tool_response(json!({"done": true})))
            .unwrap_err();
        assert!(err.reason.contains("answer"));
    }

    #[test]
    fn wrong_type_is_rejected_with_raw_payload() {
        let err = sample_spec()
            .parse::<Sample>(&tool_response(json!({"answer": 7})))
            .unwrap_err();
        assert!(err.reason.contains("wrong type"));
        assert_eq!(err.raw["answer"], json!(7));
    }

    #[test]
    fn text_only_response_is_a_parse_error() {
        let response = ModelResponse::text("no structure here");
        assert!(sample_spec().parse::<Sample>(&response).is_err());
    }

    #[test]
    fn tool_schema_marks_required_fields() {
        let tool = sample_spec().to_tool();
        let required = tool.input_schema["required"].as_array().unwrap();
        assert_eq!(required, &vec![json!("answer")]);
    }
}
