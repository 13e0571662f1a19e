// medbot-core/src/api/gemini.rs

//! Gemini `generateContent` for plain prompts (no tool calling).

use anyhow::{anyhow, Context, Result};
use reqwest::Client;
use serde_json::{json, Value};
use tracing::{debug, error, warn};

use super::{send_with_retry, RetryPolicy};
use crate::config::ModelConfig;

/// `<base>/<model>:generateContent`
pub fn generate_content_url(model_config: &ModelConfig) -> String {
    format!(
        "{}/{}:generateContent",
        model_config.endpoint.trim_end_matches('/'),
        model_config.model_name
    )
}

pub fn build_generate_request(model_config: &ModelConfig, prompt: &str) -> Result<Value> {
    let mut payload = json!({
        "contents": [{
            "role": "user",
            "parts": [{ "text": prompt }]
        }]
    });

    if let Some(parameters) = model_config.parameters.as_table() {
        if !parameters.is_empty() {
            let mut generation_config = serde_json::Map::new();
            for (key, value) in parameters {
                let json_value = serde_json::to_value(value.clone()).with_context(|| {
                    format!("Failed to convert TOML parameter '{}' to JSON", key)
                })?;
                generation_config.insert(key.clone(), json_value);
            }
            payload["generationConfig"] = Value::Object(generation_config);
        }
    }
    Ok(payload)
}

pub async fn generate_content(
    client: &Client,
    model_config: &ModelConfig,
    api_key: &str,
    prompt: &str,
    policy: RetryPolicy,
) -> Result<String> {
    let url = generate_content_url(model_config);
    let payload = build_generate_request(model_config, prompt)?;
    debug!(url = %url, model = %model_config.model_name, "Sending generateContent request.");

    let response = send_with_retry(
        || {
            client
                .post(&url)
                .header("Content-Type", "application/json")
                .header("x-goog-api-key", api_key)
                .json(&payload)
        },
        policy,
    )
    .await?;

    let response_body = response
        .text()
        .await
        .context("Failed to read Gemini response body")?;
    parse_generate_response(&response_body)
}

/// Extracts the concatenated text parts of the first candidate.
pub fn parse_generate_response(response_body: &str) -> Result<String> {
    let raw_response: Value = serde_json::from_str(response_body)
        .with_context(|| format!("Failed to parse Gemini response: {}", response_body))?;

    let candidates = raw_response
        .get("candidates")
        .and_then(|c| c.as_array())
        .cloned()
        .unwrap_or_default();

    let Some(candidate) = candidates.first() else {
        return Err(blocked_or_empty(&raw_response, response_body));
    };
    if candidates.len() > 1 {
        warn!("Handling only the first candidate from Gemini response.");
    }

    let finish_reason = candidate
        .get("finishReason")
        .and_then(|fr| fr.as_str())
        .unwrap_or("STOP");
    if !["STOP", "MAX_TOKENS"].contains(&finish_reason) {
        warn!(finish_reason = %finish_reason, "Gemini candidate finished abnormally.");
        return Err(anyhow!(
            "Gemini response candidate indicates non-standard completion (finishReason: {})",
            finish_reason
        ));
    }

    let text: String = candidate
        .pointer("/content/parts")
        .and_then(|p| p.as_array())
        .map(|parts| {
            parts
                .iter()
                .filter_map(|part| part.get("text").and_then(|t| t.as_str()))
                .collect()
        })
        .unwrap_or_default();

    if text.is_empty() {
        return Err(anyhow!(
            "Gemini response candidate contained no text. Raw Response: {}",
            response_body
        ));
    }
    Ok(text)
}

fn blocked_or_empty(raw_response: &Value, response_body: &str) -> anyhow::Error {
    if let Some(reason) = raw_response
        .pointer("/promptFeedback/blockReason")
        .and_then(|r| r.as_str())
    {
        error!(block_reason = %reason, "Gemini request blocked (empty candidates).");
        return anyhow!("Gemini request blocked due to: {} (empty candidates)", reason);
    }
    anyhow!(
        "Failed to extract candidates from Gemini response (candidates array was empty). Raw Response: {}",
        response_body
    )
}
