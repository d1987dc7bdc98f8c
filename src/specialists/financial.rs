//! Financial data specialist (Alpha Vantage)

use super::{prior_context, Specialist, FINANCIAL_REFUSAL, HISTORY_WINDOW};
use crate::gemini::{extract_json_object, LlmClient, LlmRequest};
use crate::models::{SpecialistId, SpecialistOutput, ToolResult};
use crate::state::Session;
use crate::tools::{MarketCall, MarketDataTool, MarketFunction};
use crate::Result;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, warn};

const ANSWER_INSTRUCTION: &str = r#"You are a professional financial data analyst.
You answer ONLY from the Alpha Vantage data supplied in the message. Do not use outside knowledge and never invent figures.

Response structure:
1. Data source: name the Alpha Vantage function used.
2. Key metrics: present the returned values clearly (price, open, high, low, volume, indicator values).
3. Analysis: derived observations that follow directly from the numbers.
4. Summary: one or two sentences.

Never make forward-looking statements, predictions, or buy/sell/hold recommendations."#;

#[derive(Debug, Deserialize)]
struct MarketPlan {
    function: Option<String>,
    symbol: Option<String>,
    interval: Option<String>,
}

pub struct FinancialSpecialist {
    llm: Arc<dyn LlmClient>,
    market: Arc<dyn MarketDataTool>,
}

impl FinancialSpecialist {
    pub fn new(llm: Arc<dyn LlmClient>, market: Arc<dyn MarketDataTool>) -> Self {
        Self { llm, market }
    }
}

fn plan_instruction() -> String {
    let mut functions = String::new();
    for function in MarketFunction::ALL {
        functions.push_str(&format!("- {}: {}\n", function, function.description()));
    }

    format!(
        r#"You select the single Alpha Vantage call that answers a financial question.

Available functions:
{}
Reply with JSON only:
{{"function": "<FUNCTION>", "symbol": "<TICKER>", "interval": "<1min|5min|15min|30min|60min, intraday only>"}}

Use the exchange ticker (e.g. "Apple" -> "AAPL"). If no company or ticker can be identified, reply {{"symbol": null}}."#,
        functions
    )
}

/// Turn the planner reply into an adapter call, or a reason it can't be
pub fn parse_plan(reply: &str) -> std::result::Result<MarketCall, String> {
    let value = extract_json_object(reply).ok_or("No market data plan could be parsed")?;
    let plan: MarketPlan = serde_json::from_value(value)
        .map_err(|e| format!("Malformed market data plan: {}", e))?;

    let symbol = plan
        .symbol
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or("No ticker symbol could be identified in the query")?;

    let function = match plan.function.as_deref() {
        None => MarketFunction::GlobalQuote,
        Some(raw) => MarketFunction::from_selector(raw)
            .ok_or_else(|| format!("Unsupported market data function: {}", raw))?,
    };

    let mut call = MarketCall::new(function, symbol);
    if let Some(interval) = plan.interval.filter(|i| !i.trim().is_empty()) {
        if function == MarketFunction::TimeSeriesIntraday {
            call = call.with_interval(interval.trim());
        }
    }
    Ok(call)
}

#[async_trait::async_trait]
impl Specialist for FinancialSpecialist {
    fn id(&self) -> SpecialistId {
        SpecialistId::Financial
    }

    async fn answer(
        &self,
        query: &str,
        session: &Session,
        prior: &[SpecialistOutput],
    ) -> Result<SpecialistOutput> {
        let plan_reply = self
            .llm
            .generate(&LlmRequest::new(
                "financial_plan",
                plan_instruction(),
                format!("Question: {}{}", query, prior_context(prior)),
            ))
            .await?;

        let call = match parse_plan(&plan_reply) {
            Ok(call) => call,
            Err(reason) => {
                warn!(agent_id = %self.id(), reason = %reason, "No usable market data plan");
                return Ok(SpecialistOutput::refusal(self.id(), FINANCIAL_REFUSAL, reason));
            }
        };

        info!(
            agent_id = %self.id(),
            tool = self.market.name(),
            function = %call.function,
            symbol = %call.symbol,
            "Fetching market data"
        );

        let payload = match self.market.fetch(&call).await {
            ToolResult::Success(payload) => payload,
            ToolResult::Failure(failure) => {
                warn!(
                    agent_id = %self.id(),
                    tool = self.market.name(),
                    kind = ?failure.kind,
                    reason = %failure.reason,
                    "Market data unavailable"
                );
                return Ok(SpecialistOutput::refusal(
                    self.id(),
                    FINANCIAL_REFUSAL,
                    failure.reason,
                ));
            }
        };

        let message = format!(
            "Question: {}\n\nAlpha Vantage {} data for {}:\n{}{}",
            query,
            call.function,
            call.symbol,
            serde_json::to_string_pretty(&payload)?,
            prior_context(prior)
        );

        let text = self
            .llm
            .generate(
                &LlmRequest::new("financial_answer", ANSWER_INSTRUCTION, message)
                    .with_history(session.history.context(HISTORY_WINDOW)),
            )
            .await?;

        Ok(SpecialistOutput::grounded(self.id(), text.trim()))
    }
}
