//! Fathom core library
//!
//! Recursive task decomposition and orchestration for an autonomous
//! deep-research agent. The planning agent keeps its current focus on a
//! depth-bounded subtask stack, alternates reasoning and acting through a
//! lifecycle hook pipeline, delegates scoped work to a pool of workers,
//! and condenses intermediate findings into markdown reports that are
//! merged into one final report.
//!
//! - [`agent`] - The stack, engine, condenser, hooks, workers, and the
//!   orchestrating loop itself
//! - [`ai`] - Model client trait, message/content types, structured output
//! - [`memory`] - Append-ordered conversation log
//! - [`tools`] - Tool trait, registry, grouped schemas
//! - [`prompts`] - Prompt templates and hint strings

pub mod agent;
pub mod ai;
pub mod memory;
pub mod prompts;
pub mod tools;
