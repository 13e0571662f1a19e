// medbot-core/src/config.rs

//! Configuration structures, parsing, validation and credential resolution.

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};
use url::Url;

use crate::errors::MedbotError;

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful medical assistant with access to multiple tools. Use them to answer questions about heart disease, cancer, diabetes, and general medical information.";

// `system_prompt` is left out so it comes from `DEFAULT_SYSTEM_PROMPT`.
const DEFAULT_CONFIG_TOML: &str = r#"
[primary]
api_key_env_var = "GITHUB_TOKEN"
[primary.model_config]
model_name = "gpt-4o-mini"
endpoint = "https://models.inference.ai.azure.com/chat/completions"
parameters = { temperature = 0.5 }

[secondary]
api_key_env_var = "GEMINI_API_KEY"
[secondary.model_config]
model_name = "gemini-2.5-flash"
endpoint = "https://generativelanguage.googleapis.com/v1beta/models"

[web_search]
api_key_env_var = "TAVILY_API_KEY"
endpoint = "https://api.tavily.com/search"
max_results = 3

[datasets]
directory = "databases"
"#;

#[derive(Deserialize, Debug, Clone)]
pub struct AgentConfig {
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
    pub primary: ProviderConfig,
    #[serde(default)]
    pub secondary: Option<ProviderConfig>,
    #[serde(default)]
    pub web_search: WebSearchConfig,
    #[serde(default)]
    pub datasets: DatasetsConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
}

#[derive(Deserialize, Debug, Clone)]
pub struct ProviderConfig {
    pub api_key_env_var: String,
    pub model_config: ModelConfig,
}

#[derive(Deserialize, Debug, Clone)]
pub struct ModelConfig {
    pub model_name: String,
    pub endpoint: String,
    #[serde(default = "empty_table")]
    pub parameters: toml::Value,
}

#[derive(Deserialize, Debug, Clone)]
pub struct WebSearchConfig {
    #[serde(default = "default_search_key_var")]
    pub api_key_env_var: String,
    #[serde(default = "default_search_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_max_results")]
    pub max_results: usize,
}

#[derive(Deserialize, Debug, Clone)]
pub struct DatasetsConfig {
    /// Directory holding the dataset databases, relative to the config file.
    #[serde(default = "default_dataset_dir")]
    pub directory: PathBuf,
}

#[derive(Deserialize, Debug, Clone)]
pub struct LimitsConfig {
    #[serde(default = "default_max_tool_rounds")]
    pub max_tool_rounds: usize,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_tool_timeout")]
    pub tool_timeout_secs: u64,
    #[serde(default)]
    pub max_retries: u32,
    #[serde(default = "default_retry_delay")]
    pub retry_initial_delay_ms: u64,
}

fn default_system_prompt() -> String {
    DEFAULT_SYSTEM_PROMPT.to_string()
}
fn empty_table() -> toml::Value {
    toml::Value::Table(Default::default())
}
fn default_search_key_var() -> String {
    "TAVILY_API_KEY".to_string()
}
fn default_search_endpoint() -> String {
    "https://api.tavily.com/search".to_string()
}
fn default_max_results() -> usize {
    3
}
fn default_dataset_dir() -> PathBuf {
    PathBuf::from("databases")
}
fn default_max_tool_rounds() -> usize {
    8
}
fn default_request_timeout() -> u64 {
    60
}
fn default_tool_timeout() -> u64 {
    180
}
fn default_retry_delay() -> u64 {
    1000
}

impl Default for WebSearchConfig {
    fn default() -> Self {
        Self {
            api_key_env_var: default_search_key_var(),
            endpoint: default_search_endpoint(),
            max_results: default_max_results(),
        }
    }
}

impl Default for DatasetsConfig {
    fn default() -> Self {
        Self {
            directory: default_dataset_dir(),
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_tool_rounds: default_max_tool_rounds(),
            request_timeout_secs: default_request_timeout(),
            tool_timeout_secs: default_tool_timeout(),
            max_retries: 0,
            retry_initial_delay_ms: default_retry_delay(),
        }
    }
}

impl LimitsConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn tool_timeout(&self) -> Duration {
        Duration::from_secs(self.tool_timeout_secs)
    }

    pub fn retry_initial_delay(&self) -> Duration {
        Duration::from_millis(self.retry_initial_delay_ms)
    }
}

impl AgentConfig {
    /// The configuration used when no config file is present.
    pub fn default_config() -> Result<AgentConfig> {
        Self::from_toml_str(DEFAULT_CONFIG_TOML).context("Built-in default configuration is invalid")
    }

    pub fn from_toml_str(config_toml_content: &str) -> Result<AgentConfig> {
        let config: AgentConfig = match toml::from_str(config_toml_content) {
            Ok(cfg) => cfg,
            Err(e) => {
                tracing::error!(error = %e, "Failed to parse TOML content");
                return Err(anyhow!(e))
                    .context("Failed to parse configuration TOML content. Check TOML syntax.");
            }
        };

        // --- Basic Checks ---
        if config.system_prompt.trim().is_empty() {
            return Err(anyhow!("'system_prompt' in config content is empty."));
        }

        // --- Provider Validation ---
        validate_provider("primary", &config.primary)?;
        if let Some(secondary) = &config.secondary {
            validate_provider("secondary", secondary)?;
        }

        // --- Web Search Validation ---
        if config.web_search.api_key_env_var.trim().is_empty() {
            return Err(anyhow!("'web_search.api_key_env_var' is empty."));
        }
        Url::parse(&config.web_search.endpoint).with_context(|| {
            format!(
                "Invalid URL format for web_search endpoint ('{}').",
                config.web_search.endpoint
            )
        })?;
        if config.web_search.max_results == 0 {
            return Err(anyhow!("'web_search.max_results' must be at least 1."));
        }

        // --- Limits Validation ---
        if config.limits.max_tool_rounds == 0 {
            return Err(anyhow!("'limits.max_tool_rounds' must be at least 1."));
        }
        if config.limits.request_timeout_secs == 0 || config.limits.tool_timeout_secs == 0 {
            return Err(anyhow!("Timeouts in [limits] must be greater than zero."));
        }

        info!("Successfully parsed and validated agent configuration.");
        Ok(config)
    }
}

fn validate_provider(key: &str, provider: &ProviderConfig) -> Result<()> {
    if provider.model_config.model_name.trim().is_empty() {
        return Err(anyhow!("Provider '{}' is missing 'model_config.model_name'.", key));
    }
    if provider.api_key_env_var.trim().is_empty() {
        return Err(anyhow!("Provider '{}' is missing 'api_key_env_var'.", key));
    }
    let endpoint = &provider.model_config.endpoint;
    if endpoint.trim().is_empty() {
        return Err(anyhow!("Provider '{}' has an empty 'model_config.endpoint'.", key));
    }
    Url::parse(endpoint).with_context(|| {
        format!("Invalid URL format for endpoint ('{}') in provider '{}'.", endpoint, key)
    })?;
    if !provider.model_config.parameters.is_table() {
        return Err(anyhow!(
            "Provider '{}' has invalid 'model_config.parameters'. Expected a TOML table.",
            key
        ));
    }
    Ok(())
}

/// API keys resolved from the environment at startup.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub primary: String,
    pub secondary: Option<String>,
    pub web_search: Option<String>,
}

impl Credentials {
    /// Resolves credentials through `lookup` (normally `std::env::var`).
    ///
    /// Only the primary credential is mandatory.
    pub fn resolve<F>(config: &AgentConfig, lookup: F) -> Result<Credentials, MedbotError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let fetch = |var: &str| lookup(var).filter(|v| !v.trim().is_empty());

        let primary_var = &config.primary.api_key_env_var;
        let primary = fetch(primary_var).ok_or_else(|| {
            MedbotError::config(format!(
                "{} environment variable not set. Please provide a valid token for the primary model provider.",
                primary_var
            ))
        })?;

        let secondary = match &config.secondary {
            Some(secondary) => {
                let key = fetch(&secondary.api_key_env_var);
                if key.is_none() {
                    warn!(
                        var = %secondary.api_key_env_var,
                        "Secondary provider credential not set; fallback will be unavailable."
                    );
                }
                key
            }
            None => None,
        };

        let web_search = fetch(&config.web_search.api_key_env_var);
        if web_search.is_none() {
            warn!(
                var = %config.web_search.api_key_env_var,
                "Web search credential not set; the web search tool will report errors."
            );
        }

        Ok(Credentials {
            primary,
            secondary,
            web_search,
        })
    }

    pub fn from_env(config: &AgentConfig) -> Result<Credentials, MedbotError> {
        Self::resolve(config, |var| std::env::var(var).ok())
    }
}
