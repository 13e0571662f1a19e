// medbot-core/src/lib.rs

//! Core library for medbot, a command-line medical assistant.
//!
//! A [`Conversation`] keeps the transcript and runs the tool-dispatch loop
//! against a [`ChatBackend`] (normally a [`FallbackLlm`]) and a
//! [`ToolProvider`] (normally a [`ToolRegistry`] holding the dataset and
//! web-search tools).

pub mod api;
pub mod config;
pub mod conversation;
pub mod errors;
pub mod fallback;
pub mod ingest;
pub mod providers;
pub mod sql;
pub mod tools;

#[cfg(test)]
mod conversation_tests;

pub mod models {
    pub mod chat;
    pub mod tools;
}

use anyhow::Result;

pub use async_trait::async_trait;
pub use config::{AgentConfig, Credentials, ModelConfig};
pub use conversation::{Conversation, TurnOutput};
pub use errors::{MedbotError, ToolError};
pub use fallback::FallbackLlm;
pub use models::chat::{ApiResponse, ChatMessage, Choice, Role};
pub use models::tools::{
    ToolCall, ToolDefinition, ToolFunction, ToolInput, ToolParameter, ToolParameterType,
    ToolParametersDefinition,
};
pub use tools::ToolRegistry;

/// Trait defining the interface for providing tools to a [`Conversation`].
#[async_trait]
pub trait ToolProvider: Send + Sync {
    /// Returns the definitions of all tools available, in a stable order.
    fn get_tool_definitions(&self) -> Vec<ToolDefinition>;
    /// Executes the tool with the given name and input arguments.
    async fn execute_tool(&self, tool_name: &str, input: ToolInput) -> Result<String, ToolError>;
}

/// Produces the next assistant message for a transcript.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
    ) -> Result<ChatMessage>;
}

/// Receives progress notifications while a turn runs.
pub trait TurnObserver: Send + Sync {
    /// Called right before the tool `tool_name` is dispatched.
    fn tool_called(&self, tool_name: &str);
}

/// Details the execution result of a single tool call within a turn.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ToolExecutionResult {
    /// The unique ID associated with the AI's request to call this tool.
    pub tool_call_id: String,
    /// The name of the tool that was executed.
    pub tool_name: String,
    /// The input arguments passed to the tool (represented as a JSON value).
    pub input: serde_json::Value,
    /// The string output produced by the tool (or an error message if status is Failure).
    pub output: String,
    /// The status of the execution.
    pub status: ToolExecutionStatus,
}

/// Indicates whether a tool execution succeeded or failed.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq)]
pub enum ToolExecutionStatus {
    Success,
    Failure,
}
