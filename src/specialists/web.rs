//! Web intelligence specialist (search + optional scraping)

use super::{prior_context, Specialist, HISTORY_WINDOW, WEB_REFUSAL};
use crate::gemini::{LlmClient, LlmRequest};
use crate::models::{ScrapedPage, SearchHit, SpecialistId, SpecialistOutput, ToolResult};
use crate::state::Session;
use crate::tools::{ScrapeTool, SearchTool};
use crate::Result;
use std::sync::Arc;
use tracing::{debug, info, warn};

const ANSWER_INSTRUCTION: &str = r#"You are a web research analyst.
Answer the question using ONLY the numbered search results and page text supplied in the message.
Cite sources by their number, e.g. [2]. If the sources do not answer the question, say so plainly.
Never add facts that are not present in the sources."#;

pub struct WebSpecialist {
    llm: Arc<dyn LlmClient>,
    search: Arc<dyn SearchTool>,
    scraper: Option<Arc<dyn ScrapeTool>>,
    max_pages: usize,
}

impl WebSpecialist {
    pub fn new(llm: Arc<dyn LlmClient>, search: Arc<dyn SearchTool>) -> Self {
        Self {
            llm,
            search,
            scraper: None,
            max_pages: 0,
        }
    }

    /// Also fetch the top `max_pages` hits before answering
    pub fn with_scraper(mut self, scraper: Arc<dyn ScrapeTool>, max_pages: usize) -> Self {
        self.scraper = Some(scraper);
        self.max_pages = max_pages;
        self
    }
}

fn render_sources(hits: &[SearchHit], pages: &[ScrapedPage]) -> String {
    let mut out = String::new();

    for (i, hit) in hits.iter().enumerate() {
        out.push_str(&format!(
            "[{}] {}\nURL: {}\nSnippet: {}\n",
            i + 1,
            hit.title,
            hit.link,
            hit.snippet
        ));

        // pages line up with the first hits
        if let Some(page) = pages.get(i) {
            match (&page.content, &page.error) {
                (Some(content), _) => out.push_str(&format!("Page text: {}\n", content)),
                (None, Some(error)) => out.push_str(&format!("Page unavailable: {}\n", error)),
                (None, None) => {}
            }
        }
        out.push('\n');
    }

    out
}

#[async_trait::async_trait]
impl Specialist for WebSpecialist {
    fn id(&self) -> SpecialistId {
        SpecialistId::Web
    }

    async fn answer(
        &self,
        query: &str,
        session: &Session,
        prior: &[SpecialistOutput],
    ) -> Result<SpecialistOutput> {
        let hits = match self.search.search(query).await {
            ToolResult::Success(hits) if hits.is_empty() => {
                return Ok(SpecialistOutput::refusal(
                    self.id(),
                    WEB_REFUSAL,
                    format!("No search results for: {}", query),
                ));
            }
            ToolResult::Success(hits) => hits,
            ToolResult::Failure(failure) => {
                warn!(
                    agent_id = %self.id(),
                    tool = self.search.name(),
                    kind = ?failure.kind,
                    reason = %failure.reason,
                    "Web search unavailable"
                );
                return Ok(SpecialistOutput::refusal(self.id(), WEB_REFUSAL, failure.reason));
            }
        };

        let pages = match &self.scraper {
            Some(scraper) => {
                let top = &hits[..self.max_pages.min(hits.len())];
                let pages = scraper.scrape(top).await;
                debug!(
                    scraped = pages.iter().filter(|p| p.content.is_some()).count(),
                    failed = pages.iter().filter(|p| p.error.is_some()).count(),
                    "Scrape pass complete"
                );
                pages
            }
            None => Vec::new(),
        };

        info!(
            agent_id = %self.id(),
            tool = self.search.name(),
            hits = hits.len(),
            pages = pages.len(),
            "Answering from web sources"
        );

        let message = format!(
            "Question: {}\n\nSearch results:\n{}{}",
            query,
            render_sources(&hits, &pages),
            prior_context(prior)
        );

        let text = self
            .llm
            .generate(
                &LlmRequest::new("web_answer", ANSWER_INSTRUCTION, message)
                    .with_history(session.history.context(HISTORY_WINDOW)),
            )
            .await?;

        Ok(SpecialistOutput::grounded(self.id(), text.trim()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{InMemorySessionStore, SessionStore};
    use crate::testing::{hit, transport_failure, FakeScraper, FakeSearch, ScriptedLlm};

    fn echo_llm() -> Arc<ScriptedLlm> {
        Arc::new(ScriptedLlm::new(|request| Ok(request.message.clone())))
    }

    #[tokio::test]
    async fn test_answer_cites_hits() {
        let llm = echo_llm();
        let search = Arc::new(FakeSearch::hits(vec![hit(1), hit(2)]));
        let specialist = WebSpecialist::new(llm.clone(), search);
        let session = InMemorySessionStore::new().create_session("u").await.unwrap();

        let output = specialist.answer("latest fed news", &session, &[]).await.unwrap();

        assert!(output.grounded);
        assert!(output.text.contains("[1] Result 1"));
        assert!(output.text.contains("URL: https://news.example/2"));
        assert!(!output.text.contains("Page text"));
        assert_eq!(llm.stages(), vec!["web_answer"]);
    }

    #[tokio::test]
    async fn test_scrapes_only_top_pages() {
        let llm = echo_llm();
        let search = Arc::new(FakeSearch::hits(vec![hit(1), hit(2), hit(3)]));
        let scraper = Arc::new(FakeScraper::new("Rates were held at 5.25%."));
        let specialist = WebSpecialist::new(llm, search).with_scraper(scraper.clone(), 2);
        let session = InMemorySessionStore::new().create_session("u").await.unwrap();

        let output = specialist.answer("fed rates", &session, &[]).await.unwrap();

        assert_eq!(
            *scraper.scraped.lock().unwrap(),
            vec!["https://news.example/1", "https://news.example/2"]
        );
        assert_eq!(output.text.matches("Page text: Rates were held").count(), 2);
    }

    #[tokio::test]
    async fn test_search_failure_is_refusal() {
        let llm = echo_llm();
        let search = Arc::new(FakeSearch::returning(transport_failure("dns error")));
        let specialist = WebSpecialist::new(llm.clone(), search);
        let session = InMemorySessionStore::new().create_session("u").await.unwrap();

        let output = specialist.answer("anything", &session, &[]).await.unwrap();

        assert!(!output.grounded);
        assert_eq!(output.text, WEB_REFUSAL);
        assert_eq!(output.detail.as_deref(), Some("dns error"));
        assert!(llm.stages().is_empty());
    }

    #[tokio::test]
    async fn test_no_hits_is_refusal() {
        let specialist = WebSpecialist::new(echo_llm(), Arc::new(FakeSearch::hits(Vec::new())));
        let session = InMemorySessionStore::new().create_session("u").await.unwrap();

        let output = specialist.answer("zzzqqq", &session, &[]).await.unwrap();
        assert!(!output.grounded);
        assert_eq!(output.text, WEB_REFUSAL);
    }

    #[test]
    fn test_render_marks_failed_pages() {
        let pages = vec![ScrapedPage {
            title: "Result 1".into(),
            snippet: "Snippet 1".into(),
            link: "https://news.example/1".into(),
            content: None,
            error: Some("HTTP status 403".into()),
        }];

        let rendered = render_sources(&[hit(1), hit(2)], &pages);
        assert!(rendered.contains("Page unavailable: HTTP status 403"));
        assert!(rendered.contains("[2] Result 2"));
    }
}
