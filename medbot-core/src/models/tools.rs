// medbot-core/src/models/tools.rs
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::HashMap;

// --- Structs for AI Tool Interaction ---

/// Represents a tool call requested by the AI model.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ToolCall {
    pub id: String,
    #[serde(rename = "type", default = "default_call_type")]
    pub call_type: String, // Always "function" for chat completions
    pub function: ToolFunction,
}

fn default_call_type() -> String {
    "function".to_string()
}

impl ToolCall {
    /// Parses the JSON-encoded argument string into a [`ToolInput`].
    ///
    /// An empty argument string is treated as an empty object.
    pub fn parse_arguments(&self) -> Result<ToolInput, serde_json::Error> {
        let raw = self.function.arguments.trim();
        if raw.is_empty() {
            return Ok(ToolInput::default());
        }
        let arguments: HashMap<String, JsonValue> = serde_json::from_str(raw)?;
        Ok(ToolInput { arguments })
    }
}

/// Represents the function call details within a ToolCall.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ToolFunction {
    pub name: String,
    /// Arguments are expected to be a JSON string by the AI model
    pub arguments: String,
}

// --- Tool Definition and Input ---

/// Defines the schema for a tool that can be presented to the AI.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: ToolParametersDefinition,
}

impl ToolDefinition {
    /// A tool taking one required string parameter named `question`.
    pub fn single_question(
        name: impl Into<String>,
        description: impl Into<String>,
        question_description: impl Into<String>,
    ) -> Self {
        let mut properties = HashMap::new();
        properties.insert(
            "question".to_string(),
            ToolParameter::string(question_description),
        );
        Self {
            name: name.into(),
            description: description.into(),
            parameters: ToolParametersDefinition {
                param_type: "object".to_string(),
                properties,
                required: vec!["question".to_string()],
            },
        }
    }
}

/// Defines the parameters structure for a tool.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ToolParametersDefinition {
    #[serde(rename = "type")]
    pub param_type: String,
    pub properties: HashMap<String, ToolParameter>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required: Vec<String>,
}

/// Defines a single parameter within a tool's schema.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ToolParameter {
    #[serde(rename = "type")]
    pub param_type: ToolParameterType,
    pub description: String,
}

impl ToolParameter {
    pub fn string(description: impl Into<String>) -> Self {
        Self {
            param_type: ToolParameterType::String,
            description: description.into(),
        }
    }
}

/// Represents the type of a tool parameter.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum ToolParameterType {
    String,
    Integer,
    Number,
    Boolean,
    Array,
    Object,
}

/// Represents the input arguments provided for a tool execution at runtime.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct ToolInput {
    pub arguments: HashMap<String, JsonValue>,
}

impl ToolInput {
    /// Fetches a required string argument.
    pub fn required_str(&self, key: &str) -> Result<&str, String> {
        match self.arguments.get(key) {
            Some(JsonValue::String(s)) => Ok(s.as_str()),
            Some(other) => Err(format!(
                "Invalid type for argument '{}': expected a string, got {}",
                key, other
            )),
            None => Err(format!("Missing required argument: '{}'", key)),
        }
    }
}
