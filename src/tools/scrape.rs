//! Page scraping for web search hits

use super::{http_client, ScrapeTool};
use crate::config::ScrapeConfig;
use crate::error::OrchestrationError;
use crate::models::{ScrapedPage, SearchHit};
use crate::Result;
use reqwest::Client;
use scraper::{Html, Selector};
use std::time::Duration;
use tracing::{debug, warn};

/// Elements whose text never reaches the reader
const HIDDEN_TAGS: [&str; 4] = ["script", "style", "noscript", "template"];

/// Fetches each hit's link and reduces the page to visible text
pub struct WebScraper {
    client: Client,
    max_chars: usize,
    title_selector: Selector,
    body_selector: Selector,
}

impl WebScraper {
    pub fn new(config: &ScrapeConfig, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: http_client(timeout)?,
            max_chars: config.max_chars,
            title_selector: Selector::parse("title").map_err(|e| {
                OrchestrationError::ConfigError(format!("Invalid title selector: {}", e))
            })?,
            body_selector: Selector::parse("body").map_err(|e| {
                OrchestrationError::ConfigError(format!("Invalid body selector: {}", e))
            })?,
        })
    }

    pub async fn fetch_text(&self, url: &str) -> Result<String> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|e| OrchestrationError::AdapterTransport(format!("Fetch failed: {}", e)))?;

        let html = response
            .text()
            .await
            .map_err(|e| OrchestrationError::AdapterData(format!("Unreadable page body: {}", e)))?;

        Ok(self.visible_text(&html))
    }

    /// Title plus visible body text, whitespace-collapsed and capped at
    /// `max_chars` characters
    pub fn visible_text(&self, html: &str) -> String {
        let document = Html::parse_document(html);
        let root = document
            .select(&self.body_selector)
            .next()
            .unwrap_or_else(|| document.root_element());

        let mut text = String::new();
        if let Some(title) = document.select(&self.title_selector).next() {
            for word in title.text().flat_map(str::split_whitespace) {
                if !text.is_empty() {
                    text.push(' ');
                }
                text.push_str(word);
            }
        }
        for node in root.descendants() {
            let Some(fragment) = node.value().as_text() else {
                continue;
            };
            let hidden = node.ancestors().any(|ancestor| {
                ancestor
                    .value()
                    .as_element()
                    .map(|el| HIDDEN_TAGS.contains(&el.name()))
                    .unwrap_or(false)
            });
            if hidden {
                continue;
            }
            for word in fragment.split_whitespace() {
                if !text.is_empty() {
                    text.push(' ');
                }
                text.push_str(word);
            }
        }

        truncate_chars(text, self.max_chars)
    }
}

#[async_trait::async_trait]
impl ScrapeTool for WebScraper {
    async fn scrape(&self, hits: &[SearchHit]) -> Vec<ScrapedPage> {
        let mut pages = Vec::with_capacity(hits.len());

        // one at a time, in rank order
        for hit in hits {
            let (content, error) = match self.fetch_text(&hit.link).await {
                Ok(text) => {
                    debug!(link = %hit.link, chars = text.chars().count(), "Page scraped");
                    (Some(text), None)
                }
                Err(e) => {
                    warn!(link = %hit.link, error = %e, "Page scrape failed");
                    (None, Some(e.to_string()))
                }
            };

            pages.push(ScrapedPage {
                title: hit.title.clone(),
                snippet: hit.snippet.clone(),
                link: hit.link.clone(),
                content,
                error,
            });
        }

        pages
    }
}

fn truncate_chars(text: String, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => text[..cut].to_string(),
        None => text,
    }
}
