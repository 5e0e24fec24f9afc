//! Model collaborator contract: message types, the `ModelClient` trait, and
//! structured-output validation.

pub mod client;
pub mod structured;
pub mod types;

pub use client::ModelClient;
pub use structured::{FieldSpec, FieldType, StructuredParseError, StructuredSpec};
pub use types::{AiTool, AiToolCall, Content, FinishReason, ModelMessage, ModelResponse, Role};
