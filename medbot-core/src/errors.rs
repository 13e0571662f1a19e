// medbot-core/src/errors.rs
use thiserror::Error;

/// Errors that can occur while setting up or running the assistant.
#[derive(Error, Debug)]
pub enum MedbotError {
    /// Error related to configuration loading, validation or credentials.
    #[error("Configuration Error: {0}")]
    Config(String),

    /// Error during interaction with a model provider API.
    #[error("API Error: {0}")]
    Api(#[source] anyhow::Error),

    /// The model kept requesting tools past the per-turn round limit.
    #[error("Tool-call loop limit exceeded: the model requested tools in more than {0} consecutive rounds")]
    ToolLoopLimit(usize),

    /// Error opening or querying a dataset database.
    #[error("Database Error: {0}")]
    Database(#[source] anyhow::Error),

    /// Error while loading a CSV file into a database.
    #[error("Ingest Error: {0}")]
    Ingest(String),
}

impl MedbotError {
    pub fn config(msg: impl Into<String>) -> Self {
        MedbotError::Config(msg.into())
    }
}

/// Failure of a single tool dispatch.
///
/// The `Display` text is what the model receives as the tool result.
#[derive(Error, Debug)]
pub enum ToolError {
    #[error("Error: Unknown tool '{0}'")]
    UnknownTool(String),

    #[error("Error executing tool '{name}': invalid arguments: {reason}")]
    InvalidArguments { name: String, reason: String },

    #[error("Error executing tool '{name}': {source:#}")]
    Failed {
        name: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Error executing tool '{name}': timed out after {secs}s")]
    TimedOut { name: String, secs: u64 },
}
