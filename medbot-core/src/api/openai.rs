// medbot-core/src/api/openai.rs

//! OpenAI-compatible chat completions (OpenAI, Azure / GitHub Models).

use anyhow::{anyhow, Context, Result};
use reqwest::Client;
use serde_json::{json, to_value, Value};
use tracing::{debug, trace};
use uuid::Uuid;

use super::{send_with_retry, RetryPolicy};
use crate::config::ModelConfig;
use crate::models::chat::{ApiResponse, ChatMessage};
use crate::models::tools::ToolDefinition;

pub async fn get_chat_completion(
    client: &Client,
    model_config: &ModelConfig,
    api_key: &str,
    messages: &[ChatMessage],
    tool_definitions: &[ToolDefinition],
    policy: RetryPolicy,
) -> Result<ApiResponse> {
    let url_str = &model_config.endpoint;
    let request_body = build_chat_request(model_config, messages, tool_definitions)?;

    debug!(
        url = %url_str,
        model = %model_config.model_name,
        num_messages = messages.len(),
        num_tools = tool_definitions.len(),
        "Sending chat completion request."
    );
    trace!(
        "Request JSON: {}",
        serde_json::to_string_pretty(&request_body).unwrap_or_default()
    );

    let response = send_with_retry(
        || {
            client
                .post(url_str)
                .header("Content-Type", "application/json")
                .header("Authorization", format!("Bearer {}", api_key))
                .json(&request_body)
        },
        policy,
    )
    .await?;

    let response_value: Value = response
        .json()
        .await
        .context("Failed to read API response body as JSON")?;

    parse_chat_response(response_value)
}

/// Converts a raw response body into an [`ApiResponse`], filling in a
/// missing `id`.
pub fn parse_chat_response(response_value: Value) -> Result<ApiResponse> {
    let mut response_json_obj = if let Value::Object(map) = response_value {
        map
    } else {
        return Err(anyhow!(
            "API response was not a JSON object: {:?}",
            response_value
        ));
    };

    if !response_json_obj.contains_key("id") {
        let new_id = format!("chatcmpl-{}", Uuid::new_v4());
        debug!(
            "Added missing 'id' field to API response with value: {}",
            new_id
        );
        response_json_obj.insert("id".to_string(), json!(new_id));
    }

    let api_response: ApiResponse = serde_json::from_value(Value::Object(response_json_obj))
        .context("Failed to deserialize API response")?;

    if api_response.choices.is_empty() {
        return Err(anyhow!("API response contained no choices"));
    }

    if let Some(choice) = api_response.choices.first() {
        match &choice.message.tool_calls {
            Some(tool_calls) => debug!(count = tool_calls.len(), "Response requests tool calls."),
            None => debug!("No tool calls"),
        }
    }

    Ok(api_response)
}

pub fn build_chat_request(
    model_config: &ModelConfig,
    messages: &[ChatMessage],
    tool_definitions: &[ToolDefinition],
) -> Result<Value> {
    let mut request_map = serde_json::Map::new();
    request_map.insert("model".to_string(), json!(model_config.model_name));
    request_map.insert("messages".to_string(), to_value(messages)?);

    let tools_json: Vec<Value> = tool_definitions
        .iter()
        .map(|tool_def| {
            json!({
                "type": "function",
                "function": tool_def
            })
        })
        .collect();

    if !tools_json.is_empty() {
        request_map.insert("tools".to_string(), Value::Array(tools_json));
        request_map.insert("tool_choice".to_string(), json!("auto"));
    }

    if let Some(parameters) = model_config.parameters.as_table() {
        for (key, value) in parameters {
            let json_value = to_value(value.clone())
                .with_context(|| format!("Failed to convert TOML parameter '{}' to JSON", key))?;
            request_map.insert(key.clone(), json_value);
        }
    }
    Ok(Value::Object(request_map))
}
