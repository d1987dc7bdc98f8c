//! Environment-driven configuration
//!
//! Server settings always load. Agent settings can fail (missing keys);
//! the API still starts in that case and reports itself degraded.

use crate::error::OrchestrationError;
use crate::Result;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";
pub const DEFAULT_ALPHA_VANTAGE_URL: &str = "https://www.alphavantage.co/query";
pub const DEFAULT_SEARCH_URL: &str = "https://www.googleapis.com/customsearch/v1";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let host = lookup("HOST").unwrap_or_else(|| "127.0.0.1".to_string());
        let port = match lookup("PORT").or_else(|| lookup("API_PORT")) {
            Some(raw) => parse_value("PORT", &raw)?,
            None => 8000,
        };

        Ok(Self { host, port })
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
}

#[derive(Debug, Clone)]
pub struct MarketDataConfig {
    pub api_key: String,
    pub base_url: String,
}

#[derive(Debug, Clone)]
pub struct SearchConfig {
    pub api_key: String,
    pub engine_id: String,
    pub search_url: String,
    pub page_size: u8,
}

#[derive(Debug, Clone)]
pub struct ScrapeConfig {
    pub enabled: bool,
    pub max_pages: usize,
    pub max_chars: usize,
}

/// Everything needed to build the agent pipeline
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub llm: LlmConfig,
    pub market: MarketDataConfig,
    pub search: SearchConfig,
    pub scrape: ScrapeConfig,
    pub max_iterations: u32,
    pub http_timeout: Duration,
}

impl AgentConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let llm = LlmConfig {
            api_key: require(&get, &["GEMINI_API_KEY"])?,
            model: get("GEMINI_MODEL").unwrap_or_else(|| DEFAULT_GEMINI_MODEL.to_string()),
            base_url: get("GEMINI_BASE_URL")
                .unwrap_or_else(|| DEFAULT_GEMINI_BASE_URL.to_string()),
        };

        let market = MarketDataConfig {
            api_key: require(&get, &["STOCK_MARKET_API", "ALPHA_VANTAGE_API_KEY"])?,
            base_url: get("ALPHA_VANTAGE_BASE_URL")
                .unwrap_or_else(|| DEFAULT_ALPHA_VANTAGE_URL.to_string()),
        };

        let page_size: u8 = optional(&get, "SEARCH_PAGE_SIZE", 10)?;
        if !(1..=10).contains(&page_size) {
            return Err(OrchestrationError::ConfigError(format!(
                "SEARCH_PAGE_SIZE must be between 1 and 10, got {}",
                page_size
            )));
        }

        let search = SearchConfig {
            api_key: require(&get, &["GOOGLE_SEARCH_API_KEY"])?,
            engine_id: require(&get, &["GOOGLE_SEARCH_ENGINE_ID"])?,
            search_url: get("GOOGLE_CUSTOM_SEARCH_URL")
                .unwrap_or_else(|| DEFAULT_SEARCH_URL.to_string()),
            page_size,
        };

        let scrape = ScrapeConfig {
            enabled: optional(&get, "WEB_SCRAPE_ENABLED", false)?,
            max_pages: optional(&get, "SCRAPE_MAX_PAGES", 3)?,
            max_chars: optional(&get, "SCRAPE_MAX_CHARS", 4000)?,
        };

        let max_iterations: u32 = optional(&get, "PIPELINE_MAX_ITERATIONS", 3)?;
        let timeout_secs: u64 = optional(&get, "HTTP_TIMEOUT_SECS", 30)?;

        Ok(Self {
            llm,
            market,
            search,
            scrape,
            max_iterations: max_iterations.max(1),
            http_timeout: Duration::from_secs(timeout_secs),
        })
    }
}

fn require<F>(get: &F, keys: &[&str]) -> Result<String>
where
    F: Fn(&str) -> Option<String>,
{
    keys.iter().find_map(|key| get(*key)).ok_or_else(|| {
        let names = match keys {
            [first, rest @ ..] if !rest.is_empty() => format!("{} (or {})", first, rest.join(", ")),
            _ => keys.join(", "),
        };
        OrchestrationError::ConfigError(format!("{} environment variable not set", names))
    })
}

fn optional<F, T>(get: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match get(key) {
        Some(raw) => parse_value(key, &raw),
        None => Ok(default),
    }
}

fn parse_value<T: FromStr>(key: &str, raw: &str) -> Result<T> {
    raw.trim().parse().map_err(|_| {
        OrchestrationError::ConfigError(format!("{} has an invalid value: {:?}", key, raw))
    })
}
