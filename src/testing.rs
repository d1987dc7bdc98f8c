//! Shared test doubles: local HTTP stubs and scripted collaborators

use crate::gemini::{LlmClient, LlmRequest};
use crate::models::{FailureKind, ScrapedPage, SearchHit, ToolFailure, ToolResult};
use crate::tools::{MarketCall, MarketDataTool, MarketPayload, ScrapeTool, SearchTool};
use crate::Result;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tokio::net::TcpListener;

/// Serve `app` on an ephemeral local port and return its base URL
pub async fn spawn_stub(app: axum::Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

type Responder = Box<dyn Fn(&LlmRequest) -> Result<String> + Send + Sync>;

/// LLM double that answers by stage and records every request
pub struct ScriptedLlm {
    responder: Responder,
    requests: Mutex<Vec<LlmRequest>>,
}

impl ScriptedLlm {
    pub fn new(responder: impl Fn(&LlmRequest) -> Result<String> + Send + Sync + 'static) -> Self {
        Self {
            responder: Box::new(responder),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<LlmRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn stages(&self) -> Vec<&'static str> {
        self.requests().iter().map(|r| r.stage).collect()
    }

    pub fn count(&self, stage: &str) -> usize {
        self.stages().into_iter().filter(|s| *s == stage).count()
    }
}

#[async_trait::async_trait]
impl LlmClient for ScriptedLlm {
    async fn generate(&self, request: &LlmRequest) -> Result<String> {
        self.requests.lock().unwrap().push(request.clone());
        (self.responder)(request)
    }
}

pub struct FakeMarket {
    result: ToolResult<MarketPayload>,
    pub calls: Mutex<Vec<MarketCall>>,
}

impl FakeMarket {
    pub fn returning(result: ToolResult<MarketPayload>) -> Self {
        Self {
            result,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait::async_trait]
impl MarketDataTool for FakeMarket {
    fn name(&self) -> &'static str {
        "fake_market"
    }

    async fn fetch(&self, call: &MarketCall) -> ToolResult<MarketPayload> {
        self.calls.lock().unwrap().push(call.clone());
        self.result.clone()
    }
}

pub struct FakeSearch {
    result: ToolResult<Vec<SearchHit>>,
    calls: AtomicUsize,
}

impl FakeSearch {
    pub fn returning(result: ToolResult<Vec<SearchHit>>) -> Self {
        Self {
            result,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn hits(hits: Vec<SearchHit>) -> Self {
        Self::returning(ToolResult::Success(hits))
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl SearchTool for FakeSearch {
    fn name(&self) -> &'static str {
        "fake_search"
    }

    async fn search(&self, _query: &str) -> ToolResult<Vec<SearchHit>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.result.clone()
    }
}

/// Scraper double: every page gets the same body text
pub struct FakeScraper {
    pub body: String,
    pub scraped: Mutex<Vec<String>>,
}

impl FakeScraper {
    pub fn new(body: &str) -> Self {
        Self {
            body: body.to_string(),
            scraped: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait::async_trait]
impl ScrapeTool for FakeScraper {
    async fn scrape(&self, hits: &[SearchHit]) -> Vec<ScrapedPage> {
        let mut scraped = self.scraped.lock().unwrap();
        hits.iter()
            .map(|hit| {
                scraped.push(hit.link.clone());
                ScrapedPage {
                    title: hit.title.clone(),
                    snippet: hit.snippet.clone(),
                    link: hit.link.clone(),
                    content: Some(self.body.clone()),
                    error: None,
                }
            })
            .collect()
    }
}

pub fn hit(n: usize) -> SearchHit {
    SearchHit {
        title: format!("Result {}", n),
        snippet: format!("Snippet {}", n),
        link: format!("https://news.example/{}", n),
    }
}

pub fn transport_failure<T>(reason: &str) -> ToolResult<T> {
    ToolResult::Failure(ToolFailure {
        kind: FailureKind::Transport,
        reason: reason.to_string(),
        retryable: true,
    })
}
