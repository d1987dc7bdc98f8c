//! Pipeline controller
//!
//! ROUTE → DISPATCH → LOOP? → SYNTHESIZE | DIRECT → DONE
//!
//! Specialists run one after another (financial first). After each round
//! the refiner may ask for another round with a sharper query, up to
//! `max_iterations` rounds. A specialist that refused sits out the later
//! rounds, and a round in which every specialist refused ends the loop:
//! tool failures are final for the request.

pub mod refine;

use crate::classifier::RouteClassifier;
use crate::config::AgentConfig;
use crate::error::OrchestrationError;
use crate::gemini::{GeminiClient, LlmClient};
use crate::memory::MessageRole;
use crate::models::{
    PipelineOutcome, PipelineStage, Query, RouteDecision, SpecialistId, SpecialistOutput,
};
use crate::specialists::{FinancialSpecialist, Specialist, WebSpecialist};
use crate::state::Session;
use crate::synthesizer::Synthesizer;
use crate::tools::{AlphaVantageClient, GoogleSearchClient, WebScraper};
use crate::Result;
use refine::{RefinementDecision, Refiner};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

pub struct Orchestrator {
    classifier: RouteClassifier,
    financial: Arc<dyn Specialist>,
    web: Arc<dyn Specialist>,
    refiner: Refiner,
    synthesizer: Synthesizer,
    max_iterations: u32,
}

impl Orchestrator {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        financial: Arc<dyn Specialist>,
        web: Arc<dyn Specialist>,
        max_iterations: u32,
    ) -> Self {
        Self {
            classifier: RouteClassifier::new(llm.clone()),
            financial,
            web,
            refiner: Refiner::new(llm.clone()),
            synthesizer: Synthesizer::new(llm),
            max_iterations: max_iterations.max(1),
        }
    }

    /// Wire the production collaborators (Gemini, Alpha Vantage, Google)
    pub fn from_config(config: &AgentConfig) -> Result<Self> {
        let timeout = config.http_timeout;
        let llm: Arc<dyn LlmClient> = Arc::new(GeminiClient::new(&config.llm, timeout)?);

        let market = Arc::new(AlphaVantageClient::new(&config.market, timeout)?);
        let financial = FinancialSpecialist::new(llm.clone(), market);

        let search = Arc::new(GoogleSearchClient::new(&config.search, timeout)?);
        let mut web = WebSpecialist::new(llm.clone(), search);
        if config.scrape.enabled {
            let scraper = Arc::new(WebScraper::new(&config.scrape, timeout)?);
            web = web.with_scraper(scraper, config.scrape.max_pages);
        }

        info!(
            model = %config.llm.model,
            max_iterations = config.max_iterations,
            scraping = config.scrape.enabled,
            "Pipeline initialized"
        );

        Ok(Self::new(
            llm,
            Arc::new(financial),
            Arc::new(web),
            config.max_iterations,
        ))
    }

    pub fn max_iterations(&self) -> u32 {
        self.max_iterations
    }

    fn specialist(&self, id: SpecialistId) -> &dyn Specialist {
        match id {
            SpecialistId::Financial => self.financial.as_ref(),
            SpecialistId::Web => self.web.as_ref(),
        }
    }

    /// Run one query end to end. Every failure surfaces as `PipelineFault`.
    pub async fn run(&self, query: &Query, session: &mut Session) -> Result<PipelineOutcome> {
        let start_time = Instant::now();

        info!(
            session_id = %query.session_id,
            user_id = %query.user_id,
            query = %query.text,
            "Pipeline: starting"
        );

        match self.execute(query, session).await {
            Ok(outcome) => {
                info!(
                    session_id = %query.session_id,
                    route = outcome.route.label(),
                    iterations = outcome.iterations,
                    grounded = outcome.grounded,
                    elapsed_ms = start_time.elapsed().as_millis() as u64,
                    "Pipeline: complete"
                );
                Ok(outcome)
            }
            Err(e) => {
                error!(session_id = %query.session_id, error = %e, "Pipeline: aborted");
                Err(match e {
                    OrchestrationError::PipelineFault(_) => e,
                    other => OrchestrationError::PipelineFault(other.to_string()),
                })
            }
        }
    }

    async fn execute(&self, query: &Query, session: &mut Session) -> Result<PipelineOutcome> {
        let mut state = PipelineState::new(&query.text);
        session.record(MessageRole::User, query.text.clone(), "query");

        // === ROUTE ===
        let route = self.classifier.classify(&query.text, session).await?;
        state.enter(PipelineStage::Routing, route.label());

        if let RouteDecision::Clarify { question } = &route {
            state.enter(PipelineStage::Direct, "clarification requested");
            session.record(MessageRole::Agent, question.clone(), "clarification");
            return Ok(state.finish(question.clone(), route, None));
        }

        loop {
            // === DISPATCH ===
            state.iteration += 1;
            let iteration = state.iteration;
            let mut round_grounded = false;

            for id in route.specialists() {
                if state.refused.contains(id) {
                    debug!(
                        session_id = %query.session_id,
                        iteration,
                        agent_id = %id,
                        "Skipping specialist, its tool already failed"
                    );
                    continue;
                }

                let output = self
                    .specialist(*id)
                    .answer(&state.current_query, session, &state.outputs)
                    .await?;

                debug!(
                    session_id = %query.session_id,
                    iteration,
                    agent_id = %id,
                    grounded = output.grounded,
                    "Specialist answered"
                );
                state.enter(
                    PipelineStage::Dispatching,
                    format!(
                        "round {} {} -> {}",
                        iteration,
                        id,
                        if output.grounded { "grounded" } else { "refused" }
                    ),
                );

                session.record(MessageRole::Agent, output.text.clone(), id.agent_id());
                if output.grounded {
                    round_grounded = true;
                } else {
                    state.refused.push(*id);
                }
                state.outputs.push(output);
            }

            // === LOOP ===
            if !round_grounded {
                warn!(session_id = %query.session_id, iteration, "Every specialist refused, ending loop");
                state.enter(PipelineStage::Looping, "all specialists refused");
                break;
            }
            if iteration >= self.max_iterations {
                state.enter(
                    PipelineStage::Looping,
                    format!("iteration limit {} reached", self.max_iterations),
                );
                break;
            }

            match self
                .refiner
                .review(&query.text, &state.current_query, &state.outputs)
                .await?
            {
                RefinementDecision::Converged => {
                    state.enter(PipelineStage::Looping, format!("converged after {}", iteration));
                    break;
                }
                RefinementDecision::Refine { query: refined } => {
                    info!(session_id = %query.session_id, iteration, refined = %refined, "Refining query");
                    state.enter(PipelineStage::Looping, format!("refine -> {}", refined));
                    state.current_query = refined;
                }
            }
        }

        let (text, detail) = if state.outputs.len() >= 2 {
            // === SYNTHESIZE ===
            // stable: rounds stay in order within each specialist
            state.outputs.sort_by_key(|o| o.agent_id);
            let text = self.synthesizer.synthesize(&query.text, &state.outputs).await?;
            state.enter(
                PipelineStage::Synthesizing,
                format!("{} findings", state.outputs.len()),
            );

            let mut details: Vec<&str> = Vec::new();
            for reason in state.outputs.iter().filter_map(|o| o.detail.as_deref()) {
                if !details.contains(&reason) {
                    details.push(reason);
                }
            }
            let detail = (!details.is_empty()).then(|| details.join("; "));
            (text, detail)
        } else {
            // === DIRECT ===
            let Some(output) = state.outputs.first() else {
                return Err(OrchestrationError::PipelineFault(
                    "No specialist produced an answer".to_string(),
                ));
            };
            let single = (output.text.clone(), output.detail.clone());
            state.enter(PipelineStage::Direct, "single finding");
            single
        };

        session.record(MessageRole::Agent, text.clone(), "answer");
        Ok(state.finish(text, route, detail))
    }
}

/// Per-run accumulator, dropped when the run ends
struct PipelineState {
    stage: PipelineStage,
    iteration: u32,
    current_query: String,
    outputs: Vec<SpecialistOutput>,
    /// Specialists that refused; they sit out the remaining rounds
    refused: Vec<SpecialistId>,
    trace: Vec<String>,
}

impl PipelineState {
    fn new(query: &str) -> Self {
        Self {
            stage: PipelineStage::Routing,
            iteration: 0,
            current_query: query.to_string(),
            outputs: Vec::new(),
            refused: Vec::new(),
            trace: Vec::new(),
        }
    }

    fn enter(&mut self, stage: PipelineStage, note: impl std::fmt::Display) {
        self.stage = stage;
        self.trace.push(format!("{}: {}", stage, note));
    }

    fn finish(mut self, text: String, route: RouteDecision, detail: Option<String>) -> PipelineOutcome {
        self.stage = PipelineStage::Done;
        self.trace.push(self.stage.to_string());

        PipelineOutcome {
            text,
            grounded: self.outputs.iter().any(|o| o.grounded),
            route,
            outputs: self.outputs,
            iterations: self.iteration,
            detail,
            trace: self.trace,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::specialists::{FINANCIAL_REFUSAL, WEB_REFUSAL};
    use crate::state::{InMemorySessionStore, SessionStore};
    use crate::testing::{hit, transport_failure, FakeMarket, FakeSearch, ScriptedLlm};
    use crate::tools::market::Quote;
    use crate::tools::MarketPayload;
    use crate::models::ToolResult;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn quote() -> MarketPayload {
        MarketPayload::Quote(Quote {
            symbol: "AAPL".to_string(),
            price: 150.25,
            open: 147.80,
            high: 151.10,
            low: 146.95,
            volume: 45_200_000,
            latest_trading_day: "2025-11-01".to_string(),
            previous_close: 146.87,
            change: 3.38,
            change_percent: "2.3014%".to_string(),
        })
    }

    fn build(
        llm: Arc<ScriptedLlm>,
        market: ToolResult<MarketPayload>,
        search: ToolResult<Vec<crate::models::SearchHit>>,
        max_iterations: u32,
    ) -> (Orchestrator, Arc<FakeMarket>, Arc<FakeSearch>) {
        let market = Arc::new(FakeMarket::returning(market));
        let search = Arc::new(FakeSearch::returning(search));
        let orchestrator = Orchestrator::new(
            llm.clone(),
            Arc::new(FinancialSpecialist::new(llm.clone(), market.clone())),
            Arc::new(WebSpecialist::new(llm, search.clone())),
            max_iterations,
        );
        (orchestrator, market, search)
    }

    async fn session() -> Session {
        InMemorySessionStore::new().create_session("default-user").await.unwrap()
    }

    fn scripted(route: &'static str) -> Arc<ScriptedLlm> {
        Arc::new(ScriptedLlm::new(move |request| {
            Ok(match request.stage {
                "router" => format!(r#"{{"route": "{}"}}"#, route),
                "financial_plan" => r#"{"function": "GLOBAL_QUOTE", "symbol": "AAPL"}"#.to_string(),
                "financial_answer" => "AAPL last traded at $150.25, up 2.30%.".to_string(),
                "web_answer" => "Apple unveiled new products this week [1].".to_string(),
                "refine" => r#"{"decision": "converged"}"#.to_string(),
                "synthesize" => request.message.clone(),
                other => panic!("unexpected stage {}", other),
            })
        }))
    }

    #[tokio::test]
    async fn test_financial_query_passes_through_directly() {
        let llm = scripted("financial");
        let (orchestrator, market, search) =
            build(llm.clone(), ToolResult::Success(quote()), ToolResult::Success(vec![hit(1)]), 3);
        let mut session = session().await;
        let query = session.query("What is the current price of AAPL?");

        let outcome = orchestrator.run(&query, &mut session).await.unwrap();

        assert_eq!(outcome.route, RouteDecision::FinancialOnly);
        assert!(outcome.text.contains("150.25"));
        assert!(outcome.grounded);
        assert_eq!(outcome.iterations, 1);
        assert_eq!(market.call_count(), 1);
        assert_eq!(search.call_count(), 0);
        assert_eq!(llm.count("synthesize"), 0);
        assert_eq!(outcome.trace.last().map(String::as_str), Some("DONE"));
    }

    #[tokio::test]
    async fn test_both_route_synthesizes_financial_first() {
        let llm = scripted("both");
        let (orchestrator, market, search) =
            build(llm.clone(), ToolResult::Success(quote()), ToolResult::Success(vec![hit(1)]), 3);
        let mut session = session().await;
        let query = session.query("How is Apple doing and why?");

        let outcome = orchestrator.run(&query, &mut session).await.unwrap();

        let order: Vec<_> = outcome.outputs.iter().map(|o| o.agent_id).collect();
        assert_eq!(order, vec![SpecialistId::Financial, SpecialistId::Web]);
        assert_eq!(market.call_count(), 1);
        assert_eq!(search.call_count(), 1);
        assert_eq!(llm.count("synthesize"), 1);

        let financial = outcome.text.find("150.25").unwrap();
        let web = outcome.text.find("new products").unwrap();
        assert!(financial < web);

        // web specialist saw the financial finding
        let web_request = llm
            .requests()
            .into_iter()
            .find(|r| r.stage == "web_answer")
            .unwrap();
        assert!(web_request.message.contains("data_researcher_agent: AAPL last traded"));
    }

    #[tokio::test]
    async fn test_loop_never_exceeds_max_iterations() {
        let counter = Arc::new(AtomicUsize::new(0));
        let refines = counter.clone();
        let llm = Arc::new(ScriptedLlm::new(move |request| {
            Ok(match request.stage {
                "router" => r#"{"route": "web"}"#.to_string(),
                "web_answer" => "Some news [1].".to_string(),
                "refine" => {
                    let n = refines.fetch_add(1, Ordering::SeqCst);
                    format!(r#"{{"decision": "refine", "query": "more detail {}"}}"#, n)
                }
                "synthesize" => "merged".to_string(),
                other => panic!("unexpected stage {}", other),
            })
        }));
        let (orchestrator, _, search) =
            build(llm.clone(), ToolResult::Success(quote()), ToolResult::Success(vec![hit(1)]), 3);
        let mut session = session().await;
        let query = session.query("latest AI news");

        let outcome = orchestrator.run(&query, &mut session).await.unwrap();

        assert_eq!(outcome.iterations, 3);
        assert_eq!(search.call_count(), 3);
        assert_eq!(counter.load(Ordering::SeqCst), 2);
        assert_eq!(outcome.outputs.len(), 3);
        assert_eq!(outcome.text, "merged");
    }

    #[tokio::test]
    async fn test_refusal_round_ends_loop() {
        let llm = scripted("web");
        let (orchestrator, _, search) = build(
            llm.clone(),
            ToolResult::Success(quote()),
            transport_failure("error sending request: connection refused"),
            3,
        );
        let mut session = session().await;
        let query = session.query("latest AI news");

        let outcome = orchestrator.run(&query, &mut session).await.unwrap();

        assert_eq!(outcome.text, WEB_REFUSAL);
        assert!(!outcome.grounded);
        assert_eq!(outcome.detail.as_deref(), Some("error sending request: connection refused"));
        assert_eq!(outcome.iterations, 1);
        assert_eq!(search.call_count(), 1);
        assert_eq!(llm.count("refine"), 0);
    }

    #[tokio::test]
    async fn test_partial_refusal_is_reported_in_synthesis() {
        let llm = scripted("both");
        let (orchestrator, _, _) = build(
            llm.clone(),
            transport_failure("rate limited"),
            ToolResult::Success(vec![hit(1)]),
            3,
        );
        let mut session = session().await;
        let query = session.query("Why did AAPL move?");

        let outcome = orchestrator.run(&query, &mut session).await.unwrap();

        assert!(outcome.grounded);
        assert!(outcome.text.contains(FINANCIAL_REFUSAL));
        assert!(outcome.text.contains("[DATA UNAVAILABLE]"));
        assert_eq!(outcome.detail.as_deref(), Some("rate limited"));
    }

    #[tokio::test]
    async fn test_failed_tool_is_not_called_again() {
        let refines = Arc::new(AtomicUsize::new(0));
        let counter = refines.clone();
        let llm = Arc::new(ScriptedLlm::new(move |request| {
            Ok(match request.stage {
                "router" => r#"{"route": "both"}"#.to_string(),
                "financial_plan" => r#"{"function": "GLOBAL_QUOTE", "symbol": "AAPL"}"#.to_string(),
                "web_answer" => "Apple shares rose after earnings [1].".to_string(),
                "refine" if counter.fetch_add(1, Ordering::SeqCst) == 0 => {
                    r#"{"decision": "refine", "query": "Apple earnings reaction"}"#.to_string()
                }
                "refine" => r#"{"decision": "converged"}"#.to_string(),
                "synthesize" => request.message.clone(),
                other => panic!("unexpected stage {}", other),
            })
        }));
        let (orchestrator, market, search) = build(
            llm.clone(),
            transport_failure("API notice: 5 calls per minute"),
            ToolResult::Success(vec![hit(1)]),
            3,
        );
        let mut session = session().await;
        let query = session.query("Why did AAPL move?");

        let outcome = orchestrator.run(&query, &mut session).await.unwrap();

        assert_eq!(outcome.iterations, 2);
        assert_eq!(market.call_count(), 1);
        assert_eq!(llm.count("financial_plan"), 1);
        assert_eq!(search.call_count(), 2);
        assert_eq!(outcome.outputs.len(), 3);
        assert_eq!(outcome.detail.as_deref(), Some("API notice: 5 calls per minute"));
    }

    #[tokio::test]
    async fn test_synthesis_orders_rounds_within_each_specialist() {
        let financial_round = Arc::new(AtomicUsize::new(0));
        let web_round = Arc::new(AtomicUsize::new(0));
        let (f, w) = (financial_round.clone(), web_round.clone());
        let llm = Arc::new(ScriptedLlm::new(move |request| {
            Ok(match request.stage {
                "router" => r#"{"route": "both"}"#.to_string(),
                "financial_plan" => r#"{"function": "GLOBAL_QUOTE", "symbol": "AAPL"}"#.to_string(),
                "financial_answer" => format!("Financial r{}", f.fetch_add(1, Ordering::SeqCst) + 1),
                "web_answer" => format!("Web r{}", w.fetch_add(1, Ordering::SeqCst) + 1),
                "refine" => r#"{"decision": "refine", "query": "Apple earnings reaction"}"#.to_string(),
                "synthesize" => request.message.clone(),
                other => panic!("unexpected stage {}", other),
            })
        }));
        let (orchestrator, _, _) =
            build(llm.clone(), ToolResult::Success(quote()), ToolResult::Success(vec![hit(1)]), 2);
        let mut session = session().await;
        let query = session.query("How is Apple doing and why?");

        let outcome = orchestrator.run(&query, &mut session).await.unwrap();

        assert_eq!(outcome.iterations, 2);
        let texts: Vec<_> = outcome.outputs.iter().map(|o| o.text.as_str()).collect();
        assert_eq!(texts, vec!["Financial r1", "Financial r2", "Web r1", "Web r2"]);

        let synthesis = llm
            .requests()
            .into_iter()
            .find(|r| r.stage == "synthesize")
            .unwrap();
        let positions: Vec<usize> = texts
            .iter()
            .map(|t| synthesis.message.find(t).unwrap())
            .collect();
        assert!(positions.windows(2).all(|pair| pair[0] < pair[1]));
    }

    #[tokio::test]
    async fn test_clarify_invokes_no_specialist() {
        let llm = Arc::new(ScriptedLlm::new(|_| {
            Ok(r#"{"route": "clarify", "clarification": "Which company do you mean?"}"#.to_string())
        }));
        let (orchestrator, market, search) =
            build(llm, ToolResult::Success(quote()), ToolResult::Success(vec![hit(1)]), 3);
        let mut session = session().await;
        let query = session.query("how is it doing");

        let outcome = orchestrator.run(&query, &mut session).await.unwrap();

        assert_eq!(outcome.text, "Which company do you mean?");
        assert_eq!(outcome.iterations, 0);
        assert_eq!(market.call_count() + search.call_count(), 0);
    }

    #[tokio::test]
    async fn test_llm_failure_is_pipeline_fault() {
        let llm = Arc::new(ScriptedLlm::new(|request| match request.stage {
            "router" => Ok("financial".to_string()),
            _ => Err(OrchestrationError::LlmError("503 overloaded".into())),
        }));
        let (orchestrator, _, _) =
            build(llm, ToolResult::Success(quote()), ToolResult::Success(vec![hit(1)]), 3);
        let mut session = session().await;
        let query = session.query("AAPL price");

        let err = orchestrator.run(&query, &mut session).await.unwrap_err();
        assert!(matches!(err, OrchestrationError::PipelineFault(_)));
        assert!(err.to_string().contains("503 overloaded"));
    }

    #[test]
    fn test_max_iterations_floor() {
        let llm = scripted("web");
        let (orchestrator, _, _) =
            build(llm, ToolResult::Success(quote()), ToolResult::Success(vec![hit(1)]), 0);
        assert_eq!(orchestrator.max_iterations(), 1);
    }
}
