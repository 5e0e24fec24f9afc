//! Tool collaborator contract and registry.

pub mod registry;

pub use registry::{truncate_output, Tool, ToolContext, ToolRegistry, ToolResult};
