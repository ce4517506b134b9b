use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use crate::runner::ErrorCachePolicy;

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const DEFAULT_MODEL: &str = "claude-sonnet-4-5";
const DEFAULT_MAX_TOKENS: u32 = 4096;
const DEFAULT_RATE_LIMIT_SECS: u64 = 60;
const DEFAULT_POLL_INTERVAL_SECS: u64 = 30;
const API_KEY_ENV: &str = "ANTHROPIC_API_KEY";

/// Runtime configuration, read from a JSON file (see `config.example.json`).
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Key into `providers` selecting the active provider.
    pub provider: String,
    pub providers: HashMap<String, ProviderConfig>,
    /// Prompt definition file.
    pub prompts: PathBuf,
    /// Response cache root. No caching when absent.
    #[serde(default)]
    pub cache: Option<PathBuf>,
    /// Pause after every live LLM call, in seconds.
    #[serde(default = "default_rate_limit")]
    pub rate_limit: u64,
    #[serde(default)]
    pub temperature: f32,
    /// Store failed calls in the cache so they are not retried on the next run.
    #[serde(default)]
    pub cache_errors: bool,
    #[serde(default = "default_poll_interval")]
    pub batch_poll_interval: u64,
}

/// Everything the LLM client needs to talk to a provider.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
    #[serde(default = "default_model")]
    pub model: String,
    /// Falls back to `ANTHROPIC_API_KEY` when empty.
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            api_key: String::new(),
            base_url: default_base_url(),
            max_tokens: default_max_tokens(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Cannot read config file '{}'", path.display()))?;
        Self::from_json(&raw).with_context(|| format!("Invalid config file '{}'", path.display()))
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let config: Config = serde_json::from_str(raw)?;
        if !config.providers.contains_key(&config.provider) {
            bail!("Unknown provider: {}", config.provider);
        }
        Ok(config)
    }

    /// Settings for the active provider. With `require_key`, a missing API key (in the
    /// file and in the environment) is an error.
    pub fn provider_config(&self, require_key: bool) -> Result<ProviderConfig> {
        let mut provider = self
            .providers
            .get(&self.provider)
            .cloned()
            .with_context(|| format!("Unknown provider: {}", self.provider))?;
        if provider.api_key.trim().is_empty() {
            provider.api_key = std::env::var(API_KEY_ENV).unwrap_or_default();
        }
        if require_key && provider.api_key.trim().is_empty() {
            bail!(
                "No API key for provider '{}': set providers.{}.api_key or {API_KEY_ENV}",
                self.provider,
                self.provider
            );
        }
        Ok(provider)
    }

    pub fn rate_limit(&self) -> Duration {
        Duration::from_secs(self.rate_limit)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.batch_poll_interval)
    }

    pub fn error_cache_policy(&self) -> ErrorCachePolicy {
        if self.cache_errors {
            ErrorCachePolicy::Store
        } else {
            ErrorCachePolicy::Skip
        }
    }
}

fn default_rate_limit() -> u64 {
    DEFAULT_RATE_LIMIT_SECS
}

fn default_poll_interval() -> u64 {
    DEFAULT_POLL_INTERVAL_SECS
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_max_tokens() -> u32 {
    DEFAULT_MAX_TOKENS
}
