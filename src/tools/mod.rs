//! Tool adapters
//!
//! Thin wrappers over the three external data sources. Adapters make a
//! single attempt per call (no retry, no backoff) and report problems as
//! `ToolResult::Failure` instead of returning errors, so a specialist can
//! always turn a failed call into a refusal.

use crate::models::{ScrapedPage, SearchHit, ToolResult};
use crate::Result;
use reqwest::Client;
use std::time::Duration;

pub mod market;
pub mod scrape;
pub mod search;

pub use market::{AlphaVantageClient, MarketCall, MarketFunction, MarketPayload};
pub use scrape::WebScraper;
pub use search::GoogleSearchClient;

/// Market data source (Alpha Vantage in production)
#[async_trait::async_trait]
pub trait MarketDataTool: Send + Sync {
    fn name(&self) -> &'static str;
    async fn fetch(&self, call: &MarketCall) -> ToolResult<MarketPayload>;
}

/// Web search source (Google Custom Search in production)
#[async_trait::async_trait]
pub trait SearchTool: Send + Sync {
    fn name(&self) -> &'static str;
    async fn search(&self, query: &str) -> ToolResult<Vec<SearchHit>>;
}

/// Page fetcher. Returns one entry per hit, in input order, whether or
/// not the fetch succeeded.
#[async_trait::async_trait]
pub trait ScrapeTool: Send + Sync {
    async fn scrape(&self, hits: &[SearchHit]) -> Vec<ScrapedPage>;
}

/// Shared outbound client settings for all adapters
pub(crate) fn http_client(timeout: Duration) -> Result<Client> {
    let client = Client::builder()
        .pool_idle_timeout(Duration::from_secs(60))
        .pool_max_idle_per_host(8)
        .timeout(timeout)
        .user_agent(concat!("stocksage-orchestrator/", env!("CARGO_PKG_VERSION")))
        .build()?;

    Ok(client)
}
