//! # sqlcraft Agent
//!
//! Turns a natural-language question into an answer drawn from the database:
//! 1. Introspect the schema (fresh on every question)
//! 2. Ask the model for a plan, then for one SQL statement
//! 3. Run it read-only
//! 4. Empty result or error? Feed that back and try again, up to the attempt budget
//! 5. Hand the rows back to the model for a natural-language answer
//!
//! `ToolAgent` is the other shape of the same loop: the model decides when to
//! call the `sql_query` / `describe_schema` tools itself.
//!
//! Neither agent returns an error. Every failure ends up as answer text.

mod agent;
pub mod prompt;
mod retry;
mod tool;

#[cfg(test)]
mod testing;

pub use agent::{schema_diagnostic, AgentConfig, Answer, Outcome, QueryAgent, FAILURE_MESSAGE};
pub use retry::{Feedback, RetryPolicy};
pub use tool::{QueryTool, SchemaTool, Tool, ToolAgent, ToolRegistry, QUERY_TOOL, SCHEMA_TOOL};
