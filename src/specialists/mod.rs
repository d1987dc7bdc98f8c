//! Specialist agents
//!
//! Each specialist is grounded in exactly one data tool. When the tool
//! fails the specialist answers with a fixed refusal and never lets the
//! LLM fill the gap.

use crate::models::{SpecialistId, SpecialistOutput};
use crate::state::Session;
use crate::Result;

pub mod financial;
pub mod web;

pub use financial::FinancialSpecialist;
pub use web::WebSpecialist;

pub const FINANCIAL_REFUSAL: &str = "I cannot provide a reliable answer because the Alpha Vantage data source did not return sufficient information.";

pub const WEB_REFUSAL: &str = "I cannot provide a reliable answer because the web search did not return any usable results.";

/// How many earlier session messages accompany an answer call
pub(crate) const HISTORY_WINDOW: usize = 10;

#[async_trait::async_trait]
pub trait Specialist: Send + Sync {
    fn id(&self) -> SpecialistId;

    /// Answer `query`, seeing every output produced earlier in the run.
    /// Tool failures come back as refusals; only LLM errors are `Err`.
    async fn answer(
        &self,
        query: &str,
        session: &Session,
        prior: &[SpecialistOutput],
    ) -> Result<SpecialistOutput>;
}

/// Earlier findings block appended to a specialist prompt
pub(crate) fn prior_context(prior: &[SpecialistOutput]) -> String {
    if prior.is_empty() {
        return String::new();
    }

    let mut out = String::from("\n\nEarlier findings in this conversation:\n");
    for output in prior {
        let status = if output.grounded { "" } else { " (data unavailable)" };
        out.push_str(&format!("- {}{}: {}\n", output.agent_id, status, output.text));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prior_context_marks_refusals() {
        assert_eq!(prior_context(&[]), "");

        let prior = vec![
            SpecialistOutput::grounded(SpecialistId::Financial, "AAPL last traded at $150.25."),
            SpecialistOutput::refusal(SpecialistId::Web, WEB_REFUSAL, "timeout"),
        ];
        let block = prior_context(&prior);

        assert!(block.contains("data_researcher_agent: AAPL last traded at $150.25."));
        assert!(block.contains("web_intelligence_agent (data unavailable)"));
    }
}
