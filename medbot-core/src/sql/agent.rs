// medbot-core/src/sql/agent.rs
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use super::{SqlAgent, SqlDatabase};
use crate::conversation::{Conversation, DEFAULT_MAX_TOOL_ROUNDS};
use crate::errors::MedbotError;
use crate::models::tools::{ToolDefinition, ToolInput, ToolParameter, ToolParametersDefinition};
use crate::tools::dataset::Dataset;
use crate::tools::{ToolExecutor, ToolRegistry};
use crate::ChatBackend;

pub const LIST_TABLES_TOOL: &str = "sql_db_list_tables";
pub const SCHEMA_TOOL: &str = "sql_db_schema";
pub const QUERY_TOOL: &str = "sql_db_query";

const TOP_K: usize = 10;

/// Answers questions about one dataset by letting the model inspect the
/// schema and run read-only SQL against it.
pub struct LlmSqlAgent {
    dataset: Dataset,
    backend: Arc<dyn ChatBackend>,
    toolbox: Arc<ToolRegistry>,
    max_tool_rounds: usize,
    tool_timeout: Duration,
}

impl LlmSqlAgent {
    pub fn new(
        dataset: Dataset,
        database: Arc<SqlDatabase>,
        backend: Arc<dyn ChatBackend>,
    ) -> Result<Self, MedbotError> {
        Ok(Self {
            dataset,
            backend,
            toolbox: Arc::new(sql_toolbox(database)?),
            max_tool_rounds: DEFAULT_MAX_TOOL_ROUNDS,
            tool_timeout: Duration::from_secs(60),
        })
    }

    pub fn with_max_tool_rounds(mut self, max_tool_rounds: usize) -> Self {
        self.max_tool_rounds = max_tool_rounds;
        self
    }

    pub fn with_tool_timeout(mut self, tool_timeout: Duration) -> Self {
        self.tool_timeout = tool_timeout;
        self
    }

    fn system_prompt(&self) -> String {
        format!(
            "You are an agent designed to interact with a SQLite database holding the {label} dataset \
(main table: {table}).\n\
Given an input question, create a syntactically correct SQLite query to run, then look at the results \
of the query and return the answer.\n\
Unless the user specifies a specific number of examples they wish to obtain, always limit your query \
to at most {top_k} results. You can order the results by a relevant column to return the most \
interesting examples.\n\
Never query for all the columns from a specific table, only ask for the relevant columns given the question.\n\
Always start by calling {list} to see which tables exist, then call {schema} for the relevant tables \
before writing a query with {query}.\n\
If a query fails, rewrite it and try again.\n\
DO NOT make any DML statements (INSERT, UPDATE, DELETE, DROP etc.) to the database.\n\
Answer with a short sentence that states the result.",
            label = self.dataset.label(),
            table = self.dataset.table_name(),
            top_k = TOP_K,
            list = LIST_TABLES_TOOL,
            schema = SCHEMA_TOOL,
            query = QUERY_TOOL,
        )
    }
}

#[async_trait]
impl SqlAgent for LlmSqlAgent {
    async fn invoke(&self, question: &str) -> Result<String> {
        info!(dataset = %self.dataset, "SQL agent answering question.");
        let mut conversation = Conversation::new(
            self.system_prompt(),
            Arc::clone(&self.backend),
            self.toolbox.clone(),
        )
        .with_max_tool_rounds(self.max_tool_rounds)
        .with_tool_timeout(self.tool_timeout);

        let output = conversation.submit(question).await?;
        debug!(dataset = %self.dataset, rounds = output.rounds, "SQL agent finished.");
        Ok(output.final_answer)
    }
}

/// The three database tools the SQL agent works with.
pub fn sql_toolbox(database: Arc<SqlDatabase>) -> Result<ToolRegistry, MedbotError> {
    ToolRegistry::new()
        .with_tool(
            ToolDefinition {
                name: LIST_TABLES_TOOL.to_string(),
                description: "Returns a comma-separated list of the tables in the database.".to_string(),
                parameters: ToolParametersDefinition {
                    param_type: "object".to_string(),
                    properties: HashMap::new(),
                    required: vec![],
                },
            },
            Arc::new(ListTables(database.clone())),
        )?
        .with_tool(
            single_string_tool(
                SCHEMA_TOOL,
                "Returns the schema and sample rows for the given tables. \
Call the table listing tool first to be sure the tables exist.",
                "table_names",
                "Comma-separated list of table names, for example: table1, table2",
            ),
            Arc::new(TableSchema(database.clone())),
        )?
        .with_tool(
            single_string_tool(
                QUERY_TOOL,
                "Runs a read-only SQLite query and returns the resulting rows. \
If the query is not correct an error message is returned; rewrite the query and try again.",
                "query",
                "A syntactically correct SQLite SELECT query.",
            ),
            Arc::new(RunQuery(database)),
        )
}

fn single_string_tool(name: &str, description: &str, param: &str, param_description: &str) -> ToolDefinition {
    let mut properties = HashMap::new();
    properties.insert(param.to_string(), ToolParameter::string(param_description));
    ToolDefinition {
        name: name.to_string(),
        description: description.to_string(),
        parameters: ToolParametersDefinition {
            param_type: "object".to_string(),
            properties,
            required: vec![param.to_string()],
        },
    }
}

struct ListTables(Arc<SqlDatabase>);

#[async_trait]
impl ToolExecutor for ListTables {
    async fn execute(&self, _input: &ToolInput) -> Result<String> {
        Ok(self.0.table_names().await?.join(", "))
    }
}

struct TableSchema(Arc<SqlDatabase>);

#[async_trait]
impl ToolExecutor for TableSchema {
    async fn execute(&self, input: &ToolInput) -> Result<String> {
        let raw = input.required_str("table_names").map_err(|e| anyhow!(e))?;
        let tables: Vec<String> = raw
            .split(',')
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect();
        if tables.is_empty() {
            return Err(anyhow!("no table names given"));
        }
        self.0.table_info(tables).await
    }
}

struct RunQuery(Arc<SqlDatabase>);

#[async_trait]
impl ToolExecutor for RunQuery {
    async fn execute(&self, input: &ToolInput) -> Result<String> {
        let query = input.required_str("query").map_err(|e| anyhow!(e))?;
        self.0.run_query(query.to_string()).await
    }
}
