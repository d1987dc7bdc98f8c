//! Google Custom Search adapter

use super::{http_client, SearchTool};
use crate::config::SearchConfig;
use crate::error::OrchestrationError;
use crate::models::{SearchHit, ToolResult};
use crate::Result;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Debug, Deserialize)]
struct SearchResponse {
    // absent when the query matched nothing
    #[serde(default)]
    items: Vec<SearchItem>,
}

#[derive(Debug, Deserialize)]
struct SearchItem {
    #[serde(default)]
    title: String,
    #[serde(default)]
    snippet: String,
    #[serde(default)]
    link: String,
}

#[derive(Debug, Clone)]
pub struct GoogleSearchClient {
    client: Client,
    api_key: String,
    engine_id: String,
    search_url: String,
    page_size: u8,
}

impl GoogleSearchClient {
    pub fn new(config: &SearchConfig, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: http_client(timeout)?,
            api_key: config.api_key.clone(),
            engine_id: config.engine_id.clone(),
            search_url: config.search_url.clone(),
            page_size: config.page_size,
        })
    }

    /// Ranked hits in API order; an empty Vec when nothing matched
    pub async fn query(&self, query: &str) -> Result<Vec<SearchHit>> {
        let response = self
            .client
            .get(&self.search_url)
            .query(&[
                ("key", self.api_key.as_str()),
                ("cx", self.engine_id.as_str()),
                ("q", query),
                ("num", self.page_size.to_string().as_str()),
            ])
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|e| OrchestrationError::AdapterTransport(format!("Search request failed: {}", e)))?;

        let body: SearchResponse = response.json().await.map_err(|e| {
            OrchestrationError::AdapterData(format!("Invalid search response: {}", e))
        })?;

        Ok(body
            .items
            .into_iter()
            .take(self.page_size as usize)
            .map(|item| SearchHit {
                title: item.title,
                snippet: item.snippet,
                link: item.link,
            })
            .collect())
    }
}

#[async_trait::async_trait]
impl SearchTool for GoogleSearchClient {
    fn name(&self) -> &'static str {
        "google_custom_search"
    }

    async fn search(&self, query: &str) -> ToolResult<Vec<SearchHit>> {
        let result = self.query(query).await;

        match &result {
            Ok(hits) => info!(hits = hits.len(), "Web search completed"),
            Err(e) => warn!(error = %e, "Web search failed"),
        }

        result.into()
    }
}
