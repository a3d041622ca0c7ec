use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::agent::models;
use crate::error::{Result, SwarmError};

/// Top-level Cauldron configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub swarm: SwarmConfig,
}

/// Where the swarm service lives and how steps are parameterized by default.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwarmConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_swarm_path")]
    pub swarm_path: String,
    #[serde(default = "default_langgraph_path")]
    pub langgraph_path: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_model")]
    pub default_model: String,
    #[serde(default = "default_max_tokens")]
    pub default_max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub default_temperature: f32,
    /// Whole-run timeout applied by the CLI. The engine itself has none.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub retry: Option<RetryConfig>,
}

impl Default for SwarmConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            swarm_path: default_swarm_path(),
            langgraph_path: default_langgraph_path(),
            api_key: None,
            default_model: default_model(),
            default_max_tokens: default_max_tokens(),
            default_temperature: default_temperature(),
            timeout_secs: None,
            retry: None,
        }
    }
}

impl SwarmConfig {
    /// Full URL of the single-agent endpoint.
    pub fn swarm_url(&self) -> String {
        join_url(&self.base_url, &self.swarm_path)
    }

    /// Full URL of the graph endpoint.
    pub fn langgraph_url(&self) -> String {
        join_url(&self.base_url, &self.langgraph_path)
    }
}

fn join_url(base: &str, path: &str) -> String {
    if path.starts_with("http://") || path.starts_with("https://") {
        return path.to_string();
    }
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

fn default_base_url() -> String { "http://localhost:3000".to_string() }
fn default_swarm_path() -> String { "/api/ai/swarm".to_string() }
fn default_langgraph_path() -> String { "/api/ai/swarm/langgraph".to_string() }
fn default_model() -> String { models::DEFAULT.to_string() }
fn default_max_tokens() -> u32 { 2048 }
fn default_temperature() -> f32 { 0.7 }

/// Retry configuration for swarm requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff")]
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_ms: default_max_backoff(),
        }
    }
}

fn default_max_retries() -> u32 { 3 }
fn default_initial_backoff() -> u64 { 1000 }
fn default_max_backoff() -> u64 { 30000 }

impl AppConfig {
    /// Load config from a TOML file, with env var expansion.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|_| SwarmError::ConfigNotFound(path.display().to_string()))?;

        // Expand ${ENV_VAR} references
        let expanded = expand_env_vars(&content);

        toml::from_str(&expanded).map_err(|e| SwarmError::Config(e.to_string()))
    }

    /// Build a config from `CAULDRON_SWARM_URL` and `GROQ_API_KEY`.
    pub fn from_env() -> Self {
        let mut config = AppConfig::default();
        if let Ok(url) = std::env::var("CAULDRON_SWARM_URL") {
            if !url.is_empty() {
                config.swarm.base_url = url;
            }
        }
        config.swarm.api_key = std::env::var("GROQ_API_KEY").ok().filter(|k| !k.is_empty());
        config
    }
}

/// Replace each `${NAME}` with the value of the env var `NAME`.
///
/// Unset names and an unterminated `${` are left as written.
fn expand_env_vars(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(open) = rest.find("${") {
        out.push_str(&rest[..open]);
        let tail = &rest[open + 2..];
        let Some(close) = tail.find('}') else {
            out.push_str(&rest[open..]);
            return out;
        };
        let name = &tail[..close];
        match std::env::var(name) {
            Ok(value) => out.push_str(&value),
            Err(_) => out.push_str(&rest[open..open + close + 3]),
        }
        rest = &tail[close + 1..];
    }

    out.push_str(rest);
    out
}
