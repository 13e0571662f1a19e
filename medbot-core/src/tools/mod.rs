// medbot-core/src/tools/mod.rs

//! Tool definitions and executors.
//!
//! A [`ToolRegistry`] is a fixed, ordered mapping from tool name to its
//! schema and a [`ToolExecutor`]. It is built once at startup and then only
//! read.

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use crate::errors::{MedbotError, ToolError};
use crate::models::tools::{ToolDefinition, ToolInput, ToolParameterType};
use crate::sql::SqlAgent;
use crate::ToolProvider;

pub mod dataset;
pub mod web_search;

pub use dataset::{Dataset, DatasetTool};
pub use web_search::{TavilySearch, WebSearch, WebSearchTool, WEB_SEARCH_TOOL_NAME};

/// Text in, text out. May fail.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    async fn execute(&self, input: &ToolInput) -> Result<String>;
}

struct RegisteredTool {
    definition: ToolDefinition,
    executor: Arc<dyn ToolExecutor>,
}

#[derive(Default)]
pub struct ToolRegistry {
    tools: Vec<RegisteredTool>,
    index: HashMap<String, usize>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a tool. Names must be unique.
    pub fn register(
        &mut self,
        definition: ToolDefinition,
        executor: Arc<dyn ToolExecutor>,
    ) -> Result<(), MedbotError> {
        if self.index.contains_key(&definition.name) {
            return Err(MedbotError::config(format!(
                "Tool '{}' is registered twice",
                definition.name
            )));
        }
        debug!(tool = %definition.name, "Registering tool.");
        self.index.insert(definition.name.clone(), self.tools.len());
        self.tools.push(RegisteredTool {
            definition,
            executor,
        });
        Ok(())
    }

    pub fn with_tool(
        mut self,
        definition: ToolDefinition,
        executor: Arc<dyn ToolExecutor>,
    ) -> Result<Self, MedbotError> {
        self.register(definition, executor)?;
        Ok(self)
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.definition.name.as_str()).collect()
    }
}

#[async_trait]
impl ToolProvider for ToolRegistry {
    fn get_tool_definitions(&self) -> Vec<ToolDefinition> {
        self.tools.iter().map(|t| t.definition.clone()).collect()
    }

    async fn execute_tool(&self, tool_name: &str, input: ToolInput) -> Result<String, ToolError> {
        let tool = self
            .index
            .get(tool_name)
            .map(|&i| &self.tools[i])
            .ok_or_else(|| ToolError::UnknownTool(tool_name.to_string()))?;

        validate_input(&tool.definition, &input).map_err(|reason| ToolError::InvalidArguments {
            name: tool_name.to_string(),
            reason,
        })?;

        tool.executor
            .execute(&input)
            .await
            .map_err(|source| ToolError::Failed {
                name: tool_name.to_string(),
                source,
            })
    }
}

/// Checks required parameters are present and declared types match.
fn validate_input(definition: &ToolDefinition, input: &ToolInput) -> Result<(), String> {
    for key in &definition.parameters.required {
        match input.arguments.get(key) {
            None | Some(JsonValue::Null) => {
                return Err(format!("Missing required argument: '{}'", key));
            }
            Some(_) => {}
        }
    }
    for (key, value) in &input.arguments {
        let Some(param) = definition.parameters.properties.get(key) else {
            continue;
        };
        if value.is_null() {
            continue;
        }
        let matches = match param.param_type {
            ToolParameterType::String => value.is_string(),
            ToolParameterType::Integer => value.is_i64() || value.is_u64(),
            ToolParameterType::Number => value.is_number(),
            ToolParameterType::Boolean => value.is_boolean(),
            ToolParameterType::Array => value.is_array(),
            ToolParameterType::Object => value.is_object(),
        };
        if !matches {
            return Err(format!(
                "Invalid type for argument '{}': expected {:?}, got {}",
                key, param.param_type, value
            ));
        }
    }
    Ok(())
}

/// Schemas of the assistant's tools, in registration order.
pub fn medical_tool_definitions() -> Vec<ToolDefinition> {
    Dataset::ALL
        .iter()
        .map(Dataset::tool_definition)
        .chain(std::iter::once(WebSearchTool::definition()))
        .collect()
}

/// Builds the assistant's tool set: one query tool per dataset, then web search.
pub fn medical_registry(
    dataset_agents: Vec<(Dataset, Arc<dyn SqlAgent>)>,
    search: Arc<dyn WebSearch>,
    max_results: usize,
) -> Result<ToolRegistry, MedbotError> {
    let mut registry = ToolRegistry::new();
    for (dataset, agent) in dataset_agents {
        registry.register(dataset.tool_definition(), Arc::new(DatasetTool::new(dataset, agent)))?;
    }
    registry.register(
        WebSearchTool::definition(),
        Arc::new(WebSearchTool::new(search, max_results)),
    )?;
    Ok(registry)
}
