// medbot-cli/src/setup.rs
use anyhow::{anyhow, Context, Result};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use medbot_core::{
    api::{build_http_client, RetryPolicy},
    providers::{ChatProvider, DirectBackend, GeminiProvider, OpenAIProvider, TextProvider},
    sql::{LlmSqlAgent, SqlAgent, SqlDatabase},
    tools::{medical_registry, Dataset, TavilySearch},
    AgentConfig, Conversation, Credentials, FallbackLlm, MedbotError, ToolRegistry, TurnObserver,
};

pub const CONFIG_FILENAME: &str = "Medbot.toml";

/// Walks from `start` up through its ancestors looking for the config file.
pub fn find_config_file(start: &Path) -> Option<PathBuf> {
    let mut current = Some(start);
    while let Some(dir) = current {
        let candidate = dir.join(CONFIG_FILENAME);
        if candidate.is_file() {
            return Some(candidate);
        }
        current = dir.parent();
    }
    None
}

/// A loaded configuration and the directory its relative paths resolve against.
pub struct LoadedConfig {
    pub config: AgentConfig,
    pub base_dir: PathBuf,
}

impl LoadedConfig {
    pub fn dataset_dir(&self) -> PathBuf {
        resolve_dataset_dir(&self.base_dir, &self.config.datasets.directory)
    }
}

pub fn resolve_dataset_dir(base_dir: &Path, directory: &Path) -> PathBuf {
    if directory.is_absolute() {
        directory.to_path_buf()
    } else {
        base_dir.join(directory)
    }
}

pub fn load_cli_config(explicit: Option<&Path>) -> Result<LoadedConfig> {
    let current_dir = env::current_dir().context("Failed to get current directory")?;
    let config_path = match explicit {
        Some(path) => Some(path.to_path_buf()),
        None => find_config_file(&current_dir),
    };

    let Some(config_path) = config_path else {
        info!(
            "No {} found in {} or its parents; using the built-in configuration.",
            CONFIG_FILENAME,
            current_dir.display()
        );
        return Ok(LoadedConfig {
            config: AgentConfig::default_config()?,
            base_dir: current_dir,
        });
    };

    info!("Found configuration file at: {:?}", config_path);
    let config_toml_content = fs::read_to_string(&config_path)
        .with_context(|| format!("Failed to read config file: {:?}", config_path))?;
    let config = AgentConfig::from_toml_str(&config_toml_content)
        .context("Failed to parse or validate configuration content")?;
    let base_dir = config_path
        .parent()
        .map(Path::to_path_buf)
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(current_dir);
    Ok(LoadedConfig { config, base_dir })
}

/// Wires the providers, the fallback, the dataset agents and the web search
/// into a fresh [`Conversation`].
pub fn build_conversation(
    loaded: &LoadedConfig,
    credentials: Credentials,
    observer: Arc<dyn TurnObserver>,
) -> Result<(Conversation, Arc<ToolRegistry>)> {
    let config = &loaded.config;
    let limits = &config.limits;
    let retry = RetryPolicy::from_limits(limits);
    let http_client = build_http_client(limits.request_timeout())?;

    let primary: Arc<dyn ChatProvider> = Arc::new(
        OpenAIProvider::new(
            config.primary.model_config.clone(),
            http_client.clone(),
            credentials.primary,
        )
        .with_retry(retry),
    );
    let secondary: Option<Arc<dyn TextProvider>> =
        match (&config.secondary, credentials.secondary) {
            (Some(secondary), Some(key)) => Some(Arc::new(
                GeminiProvider::new(secondary.model_config.clone(), http_client.clone(), key)
                    .with_retry(retry),
            )),
            _ => None,
        };
    let llm = Arc::new(FallbackLlm::new(primary.clone(), secondary));
    // Dataset answers must come from executed SQL, so the agents get no fallback.
    let sql_backend = Arc::new(DirectBackend::new(primary));

    let dataset_dir = loaded.dataset_dir();
    let mut agents: Vec<(Dataset, Arc<dyn SqlAgent>)> = Vec::new();
    for dataset in Dataset::ALL {
        let db_path = dataset_dir.join(dataset.database_file());
        if !db_path.is_file() {
            warn!(
                dataset = %dataset,
                path = %db_path.display(),
                "Dataset database not found; run `medbot ingest` to create it."
            );
        }
        let agent: Arc<dyn SqlAgent> = Arc::new(
            LlmSqlAgent::new(dataset, Arc::new(SqlDatabase::new(db_path)), sql_backend.clone())?
                .with_max_tool_rounds(limits.max_tool_rounds)
                .with_tool_timeout(limits.request_timeout()),
        );
        agents.push((dataset, agent));
    }

    let search = Arc::new(
        TavilySearch::new(&config.web_search, http_client, credentials.web_search)
            .with_retry(retry),
    );
    let registry = Arc::new(medical_registry(
        agents,
        search,
        config.web_search.max_results,
    )?);
    info!(tools = ?registry.names(), "Tool registry ready.");

    let conversation = Conversation::new(config.system_prompt.clone(), llm, registry.clone())
        .with_max_tool_rounds(limits.max_tool_rounds)
        .with_tool_timeout(limits.tool_timeout())
        .with_observer(observer);
    Ok((conversation, registry))
}

/// Resolves credentials from the environment, mapping a missing primary key
/// to a user-facing error.
pub fn resolve_credentials(config: &AgentConfig) -> Result<Credentials> {
    Credentials::from_env(config).map_err(|e| match e {
        MedbotError::Config(msg) => anyhow!(msg),
        other => anyhow!(other),
    })
}
