// medbot-core/src/conversation.rs

//! The transcript and the tool-dispatch loop.

use serde_json::Value as JsonValue;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, trace, warn};

use crate::errors::{MedbotError, ToolError};
use crate::models::chat::ChatMessage;
use crate::models::tools::ToolCall;
use crate::{ChatBackend, ToolExecutionResult, ToolExecutionStatus, ToolProvider, TurnObserver};

pub const DEFAULT_MAX_TOOL_ROUNDS: usize = 8;
pub const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(180);

/// Result of one [`Conversation::submit`] call.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct TurnOutput {
    /// Content of the assistant message that ended the turn.
    pub final_answer: String,
    /// Every tool dispatched during the turn, in order.
    pub tool_results: Vec<ToolExecutionResult>,
    /// Number of tool-call rounds the turn needed.
    pub rounds: usize,
}

/// An interactive session: the system message, every turn so far, and the
/// collaborators used to extend it.
pub struct Conversation {
    backend: Arc<dyn ChatBackend>,
    tool_provider: Arc<dyn ToolProvider>,
    messages: Vec<ChatMessage>,
    max_tool_rounds: usize,
    tool_timeout: Duration,
    observer: Option<Arc<dyn TurnObserver>>,
}

impl Conversation {
    pub fn new(
        system_prompt: impl Into<String>,
        backend: Arc<dyn ChatBackend>,
        tool_provider: Arc<dyn ToolProvider>,
    ) -> Self {
        Self {
            backend,
            tool_provider,
            messages: vec![ChatMessage::system(system_prompt)],
            max_tool_rounds: DEFAULT_MAX_TOOL_ROUNDS,
            tool_timeout: DEFAULT_TOOL_TIMEOUT,
            observer: None,
        }
    }

    pub fn with_max_tool_rounds(mut self, max_tool_rounds: usize) -> Self {
        self.max_tool_rounds = max_tool_rounds.max(1);
        self
    }

    pub fn with_tool_timeout(mut self, tool_timeout: Duration) -> Self {
        self.tool_timeout = tool_timeout;
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn TurnObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    /// Drops every turn, keeping only the system message.
    pub fn reset(&mut self) {
        self.messages.truncate(1);
    }

    /// Runs one user turn to completion.
    ///
    /// On error the transcript is restored to its state before the call.
    pub async fn submit(&mut self, user_text: &str) -> Result<TurnOutput, MedbotError> {
        let mark = self.messages.len();
        info!(num_messages = mark, "Starting turn.");
        self.messages.push(ChatMessage::user(user_text));

        match self.dispatch_until_answer().await {
            Ok(output) => {
                info!(rounds = output.rounds, tools = output.tool_results.len(), "Turn finished.");
                Ok(output)
            }
            Err(e) => {
                error!(error = %e, "Turn failed; discarding it from the transcript.");
                self.messages.truncate(mark);
                Err(e)
            }
        }
    }

    async fn dispatch_until_answer(&mut self) -> Result<TurnOutput, MedbotError> {
        let tool_definitions = self.tool_provider.get_tool_definitions();
        let mut collected_tool_results: Vec<ToolExecutionResult> = Vec::new();
        let mut rounds = 0;

        loop {
            debug!(
                num_messages = self.messages.len(),
                num_tools = tool_definitions.len(),
                "Requesting completion."
            );
            let response_message = self
                .backend
                .complete(&self.messages, &tool_definitions)
                .await
                .map_err(MedbotError::Api)?;
            trace!(message = %serde_json::to_string_pretty(&response_message).unwrap_or_default(), "Assistant message");

            let tool_calls = response_message.requested_tool_calls().to_vec();
            self.messages.push(response_message);

            if tool_calls.is_empty() {
                info!("Received final response from AI (no further tool calls requested).");
                let final_answer = self
                    .messages
                    .last()
                    .map(|m| m.text().to_string())
                    .unwrap_or_default();
                return Ok(TurnOutput {
                    final_answer,
                    tool_results: collected_tool_results,
                    rounds,
                });
            }

            rounds += 1;
            if rounds > self.max_tool_rounds {
                warn!(limit = self.max_tool_rounds, "Model kept requesting tools past the round limit.");
                return Err(MedbotError::ToolLoopLimit(self.max_tool_rounds));
            }
            info!(round = rounds, count = tool_calls.len(), "AI requested {} tool call(s).", tool_calls.len());

            for tool_call in &tool_calls {
                let result = self.dispatch(tool_call).await;
                self.messages.push(ChatMessage::tool_result(
                    &result.tool_call_id,
                    &result.tool_name,
                    &result.output,
                ));
                collected_tool_results.push(result);
            }
        }
    }

    async fn dispatch(&self, tool_call: &ToolCall) -> ToolExecutionResult {
        let tool_name = tool_call.function.name.clone();
        debug!(tool_call_id = %tool_call.id, tool_name = %tool_name, "Processing request for tool '{}'.", tool_name);
        if let Some(observer) = &self.observer {
            observer.tool_called(&tool_name);
        }

        let tool_input = match tool_call.parse_arguments() {
            Ok(input) => input,
            Err(e) => {
                error!(tool_call_id = %tool_call.id, tool_name = %tool_name, error = %e, "Failed to parse arguments for tool '{}'.", tool_name);
                let err = ToolError::InvalidArguments {
                    name: tool_name.clone(),
                    reason: format!("{}. Arguments received: {}", e, tool_call.function.arguments),
                };
                return ToolExecutionResult {
                    tool_call_id: tool_call.id.clone(),
                    tool_name,
                    input: JsonValue::String(tool_call.function.arguments.clone()),
                    output: err.to_string(),
                    status: ToolExecutionStatus::Failure,
                };
            }
        };

        let input_json = serde_json::to_value(&tool_input.arguments).unwrap_or(JsonValue::Null);
        let execution = tokio::time::timeout(
            self.tool_timeout,
            self.tool_provider.execute_tool(&tool_name, tool_input),
        )
        .await
        .unwrap_or_else(|_| {
            Err(ToolError::TimedOut {
                name: tool_name.clone(),
                secs: self.tool_timeout.as_secs(),
            })
        });

        let (output, status) = match execution {
            Ok(output) => {
                info!(tool_call_id = %tool_call.id, tool_name = %tool_name, "Tool '{}' executed successfully.", tool_name);
                trace!(output = %output, "Output from tool '{}'", tool_name);
                (output, ToolExecutionStatus::Success)
            }
            Err(e) => {
                error!(tool_call_id = %tool_call.id, tool_name = %tool_name, error = %e, "Execution failed for tool '{}'.", tool_name);
                (e.to_string(), ToolExecutionStatus::Failure)
            }
        };

        ToolExecutionResult {
            tool_call_id: tool_call.id.clone(),
            tool_name,
            input: input_json,
            output,
            status,
        }
    }
}
