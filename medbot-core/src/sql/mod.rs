// medbot-core/src/sql/mod.rs

//! Natural-language access to the dataset databases.

use anyhow::Result;
use async_trait::async_trait;

pub mod agent;
pub mod database;

pub use agent::LlmSqlAgent;
pub use database::SqlDatabase;

/// Answers a natural-language question about one database.
#[async_trait]
pub trait SqlAgent: Send + Sync {
    async fn invoke(&self, question: &str) -> Result<String>;
}
