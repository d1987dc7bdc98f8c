//! Query routing
//!
//! One LLM call decides which specialists a query needs. Anything the
//! classifier cannot read becomes a clarification request; there is no
//! keyword fallback and no guessing.

use crate::error::OrchestrationError;
use crate::gemini::{extract_json_object, LlmClient, LlmRequest};
use crate::models::RouteDecision;
use crate::state::Session;
use crate::Result;
use std::sync::Arc;
use tracing::{info, warn};

pub const DEFAULT_CLARIFICATION: &str = "Could you clarify what you would like to know? For example, ask about a company's stock price or indicators, or about recent news on a topic.";

const ROUTER_INSTRUCTION: &str = r#"You are a query router for a financial assistant with two specialists:

- financial: live market data from Alpha Vantage (stock quotes, intraday/daily prices, company fundamentals, RSI/SMA/EMA indicators).
- web: Google search over current news, events and general information.

Pick exactly one route:
- "financial" for questions answerable from market data alone.
- "web" for news, events or general questions.
- "both" when the question needs market data AND news/context (e.g. "Why did TSLA drop today?").
- "clarify" when the question is too vague to route. Provide a short clarifying question.

Reply with JSON only:
{"route": "financial|web|both|clarify", "clarification": "<question, only for clarify>"}"#;

pub struct RouteClassifier {
    llm: Arc<dyn LlmClient>,
}

impl RouteClassifier {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }

    pub async fn classify(&self, query: &str, session: &Session) -> Result<RouteDecision> {
        let reply = self
            .llm
            .generate(&LlmRequest::new("router", ROUTER_INSTRUCTION, query))
            .await?;

        match parse_route(&reply) {
            Ok(decision) => {
                info!(session_id = %session.session_id, route = decision.label(), "Query routed");
                Ok(decision)
            }
            Err(OrchestrationError::RouterAmbiguous(reason)) => {
                warn!(session_id = %session.session_id, reason = %reason, "Router reply unusable, asking for clarification");
                Ok(RouteDecision::Clarify {
                    question: DEFAULT_CLARIFICATION.to_string(),
                })
            }
            Err(e) => Err(e),
        }
    }
}

/// Read a router reply: a JSON object (optionally fenced) or a bare label
pub fn parse_route(reply: &str) -> Result<RouteDecision> {
    let (label, clarification) = match extract_json_object(reply) {
        Some(value) => (
            value
                .get("route")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string(),
            value
                .get("clarification")
                .and_then(|v| v.as_str())
                .map(str::trim)
                .filter(|q| !q.is_empty())
                .map(str::to_string),
        ),
        None => (reply.to_string(), None),
    };

    let normalized = label
        .trim()
        .trim_matches(|c: char| !c.is_alphanumeric() && c != '_')
        .to_lowercase();

    match normalized.as_str() {
        "financial" | "finance" | "data_researcher_agent" => Ok(RouteDecision::FinancialOnly),
        "web" | "web_intelligence_agent" => Ok(RouteDecision::WebOnly),
        "both" => Ok(RouteDecision::Both),
        "clarify" => Ok(RouteDecision::Clarify {
            question: clarification.unwrap_or_else(|| DEFAULT_CLARIFICATION.to_string()),
        }),
        _ => Err(OrchestrationError::RouterAmbiguous(format!(
            "Unrecognised route: {:?}",
            reply.trim()
        ))),
    }
}
