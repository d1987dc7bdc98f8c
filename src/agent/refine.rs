//! Refinement stage: decide whether another dispatch round is worth it

use crate::gemini::{extract_json_object, LlmClient, LlmRequest};
use crate::models::SpecialistOutput;
use crate::Result;
use std::sync::Arc;
use tracing::debug;

const REFINE_INSTRUCTION: &str = r#"You review answers gathered for a user's question.
If the answers already address the question, reply {"decision": "converged"}.
If a more specific follow-up query would fill a clear gap, reply {"decision": "refine", "query": "<new query>"}.
Reply with JSON only."#;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefinementDecision {
    Converged,
    Refine { query: String },
}

pub struct Refiner {
    llm: Arc<dyn LlmClient>,
}

impl Refiner {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }

    pub async fn review(
        &self,
        original: &str,
        current: &str,
        outputs: &[SpecialistOutput],
    ) -> Result<RefinementDecision> {
        let mut message = format!("Original question: {}\nLast query used: {}\n\nAnswers so far:\n", original, current);
        for output in outputs {
            message.push_str(&format!("- {}: {}\n", output.agent_id, output.text));
        }

        let reply = self
            .llm
            .generate(&LlmRequest::new("refine", REFINE_INSTRUCTION, message))
            .await?;

        let decision = parse_decision(&reply, current);
        debug!(?decision, "Refinement reviewed");
        Ok(decision)
    }
}

/// Anything but a usable, new follow-up query counts as converged
pub fn parse_decision(reply: &str, current: &str) -> RefinementDecision {
    let Some(value) = extract_json_object(reply) else {
        return RefinementDecision::Converged;
    };

    let decision = value
        .get("decision")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .trim()
        .to_lowercase();
    let query = value
        .get("query")
        .and_then(|v| v.as_str())
        .map(str::trim)
        .unwrap_or_default();

    if decision == "refine" && !query.is_empty() && !query.eq_ignore_ascii_case(current.trim()) {
        RefinementDecision::Refine {
            query: query.to_string(),
        }
    } else {
        RefinementDecision::Converged
    }
}
