//! Model client collaborator contract.
//!
//! The core never talks to a provider directly; the host supplies an
//! implementation of `ModelClient` (HTTP, local inference, a scripted fake
//! in tests). Streaming is a transport concern and stays on the host side -
//! the core consumes fully assembled responses.

use anyhow::Result;
use async_trait::async_trait;

use super::types::{AiTool, ModelMessage, ModelResponse};

/// The single inference entry point the core depends on.
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Run one inference over `messages`. When `tools` is non-empty the
    /// model may answer with tool_use blocks instead of (or alongside) text.
    async fn invoke(&self, messages: &[ModelMessage], tools: &[AiTool]) -> Result<ModelResponse>;
}
