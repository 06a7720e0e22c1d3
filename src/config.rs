//! Explicit configuration record
//!
//! Built once in the binary from the environment and injected into every
//! component that talks to an external capability. Nothing else reads
//! the environment.

use crate::error::PipelineError;
use std::env;
use std::time::Duration;

/// Per-request timeout applied to every external HTTP call.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub openai_api_key: String,
    pub tavily_api_key: String,
    pub serper_api_key: String,
    pub model: String,
    pub request_timeout: Duration,
}

impl AgentConfig {
    /// Load configuration from the environment (a .env file is honored).
    /// Missing keys are a startup error, not a runtime surprise.
    pub fn from_env() -> crate::Result<Self> {
        dotenv::dotenv().ok();

        Ok(Self {
            openai_api_key: require("OPENAI_API_KEY")?,
            tavily_api_key: require("TAVILY_API_KEY")?,
            serper_api_key: require("SERPER_API_KEY")?,
            model: env::var("OPENAI_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string()),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        })
    }
}

fn require(key: &str) -> crate::Result<String> {
    env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| PipelineError::ConfigError(format!("{} is not set", key)))
}
