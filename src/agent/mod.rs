//! Mortgage assistant agent: system prompt and the tool-calling loop.

pub mod executor;
pub mod prompt;

pub use executor::{Agent, AgentReply, EMPTY_ANSWER_MESSAGE, ITERATION_LIMIT_MESSAGE};
pub use prompt::build_system_prompt;
