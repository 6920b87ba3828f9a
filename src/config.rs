use serde::{Deserialize, Serialize};

const DEFAULT_BASE_URL: &str = "https://integrate.api.nvidia.com/v1";
const DEFAULT_MODEL: &str = "openai/gpt-oss-20b";
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_FORECAST_HORIZON_DAYS: u32 = 30;
const DEFAULT_MAX_AGENT_ITERATIONS: usize = 5;

/// Application configuration, loaded from the environment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key for the OpenAI-compatible reasoning service. When absent
    /// the agent runs entirely on the deterministic fallback router.
    pub api_key: Option<String>,
    /// Base URL of the chat-completions endpoint.
    pub base_url: String,
    /// Model identifier passed to the reasoning service.
    pub model: String,
    pub log_level: String,
    /// Default horizon for demand forecasts when the caller omits one.
    pub forecast_horizon_days: u32,
    /// Hard cap on tool-calling rounds per user message.
    pub max_agent_iterations: usize,
}

impl AppConfig {
    pub fn load() -> Self {
        Self {
            api_key: std::env::var("SUPPLYSIGHT_API_KEY")
                .ok()
                .filter(|k| !k.trim().is_empty()),
            base_url: std::env::var("SUPPLYSIGHT_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_BASE_URL.to_string()),
            model: std::env::var("SUPPLYSIGHT_MODEL")
                .unwrap_or_else(|_| DEFAULT_MODEL.to_string()),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| DEFAULT_LOG_LEVEL.to_string()),
            forecast_horizon_days: std::env::var("SUPPLYSIGHT_FORECAST_HORIZON")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_FORECAST_HORIZON_DAYS),
            max_agent_iterations: DEFAULT_MAX_AGENT_ITERATIONS,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            forecast_horizon_days: DEFAULT_FORECAST_HORIZON_DAYS,
            max_agent_iterations: DEFAULT_MAX_AGENT_ITERATIONS,
        }
    }
}
