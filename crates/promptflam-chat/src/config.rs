//! Relay configuration: upstream endpoint, model and sampling parameters.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

pub const DEFAULT_ENDPOINT: &str = "https://api.perplexity.ai/chat/completions";
pub const DEFAULT_MODEL: &str = "sonar";
pub const DEFAULT_TEMPERATURE: f64 = 0.7;
pub const DEFAULT_MAX_TOKENS: usize = 1500;
pub const DEFAULT_RECENCY_FILTER: &str = "month";

/// Leading system turn injected ahead of every conversation.
pub const SYSTEM_PROMPT: &str = "You are a helpful writing assistant for journalists and content creators. \
Provide accurate, well-researched responses with citations when relevant.
Be concise and factual. Always cite your sources using numbered references like [1], [2], etc.";

/// Relay configuration (read from relay-config.json).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,
    #[serde(default = "default_recency_filter")]
    pub search_recency_filter: String,
    /// Upper bound on reading an upstream error body.
    #[serde(default = "default_error_body_timeout")]
    pub error_body_timeout_secs: u64,
}

fn default_endpoint() -> String {
    DEFAULT_ENDPOINT.into()
}
fn default_model() -> String {
    DEFAULT_MODEL.into()
}
fn default_temperature() -> f64 {
    DEFAULT_TEMPERATURE
}
fn default_max_tokens() -> usize {
    DEFAULT_MAX_TOKENS
}
fn default_recency_filter() -> String {
    DEFAULT_RECENCY_FILTER.into()
}
fn default_error_body_timeout() -> u64 {
    5
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            endpoint: default_endpoint(),
            model: default_model(),
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
            search_recency_filter: default_recency_filter(),
            error_body_timeout_secs: default_error_body_timeout(),
        }
    }
}

impl RelayConfig {
    /// Load config from file, falling back to env vars and defaults.
    pub fn load(config_path: &Path) -> Self {
        let mut config: RelayConfig = std::fs::read_to_string(config_path)
            .ok()
            .and_then(|s| serde_json::from_str(&s).ok())
            .unwrap_or_default();

        config.apply_env(|name| std::env::var(name).ok());

        info!(
            "Relay config: model={} endpoint={} key={}",
            config.model,
            config.endpoint,
            if config.is_configured() { "set" } else { "missing" }
        );

        config
    }

    /// Env vars fill in the key when the file has none, and override the
    /// endpoint and model when present.
    fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        if self.api_key.as_deref().map_or(true, str::is_empty) {
            self.api_key = var("PERPLEXITY_API_KEY").filter(|k| !k.is_empty());
        }
        if let Some(endpoint) = var("PERPLEXITY_API_URL") {
            self.endpoint = endpoint;
        }
        if let Some(model) = var("PERPLEXITY_MODEL") {
            self.model = model;
        }
    }

    /// Usable upstream credential, if any.
    pub fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref().filter(|k| !k.is_empty())
    }

    pub fn is_configured(&self) -> bool {
        self.api_key().is_some()
    }

    pub fn error_body_timeout(&self) -> Duration {
        Duration::from_secs(self.error_body_timeout_secs)
    }
}
