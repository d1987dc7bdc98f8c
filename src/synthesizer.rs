//! Merge several specialist outputs into one answer

use crate::gemini::{LlmClient, LlmRequest};
use crate::models::SpecialistOutput;
use crate::Result;
use std::sync::Arc;
use tracing::info;

const SYNTHESIS_INSTRUCTION: &str = r#"You combine findings from specialist analysts into one answer for the user.

Rules:
- Keep every factual claim from the findings exactly as stated. Do not add facts, figures or sources of your own.
- Present financial market data first, then news and contextual information.
- Point out correlations between the market data and the news where the findings support them.
- If a finding says its data was unavailable, tell the user that part of the data could not be retrieved.
- Never make predictions or give buy/sell/hold recommendations."#;

pub struct Synthesizer {
    llm: Arc<dyn LlmClient>,
}

impl Synthesizer {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }

    /// `outputs` are expected in presentation order (financial first)
    pub async fn synthesize(&self, query: &str, outputs: &[SpecialistOutput]) -> Result<String> {
        let mut message = format!("User question: {}\n\nFindings:\n", query);
        for (i, output) in outputs.iter().enumerate() {
            let status = if output.grounded { "" } else { " [DATA UNAVAILABLE]" };
            message.push_str(&format!(
                "\n### {} ({}){}\n{}\n",
                i + 1,
                output.agent_id,
                status,
                output.text
            ));
        }

        info!(findings = outputs.len(), "Synthesizing answer");

        let text = self
            .llm
            .generate(&LlmRequest::new("synthesize", SYNTHESIS_INSTRUCTION, message))
            .await?;

        Ok(text.trim().to_string())
    }
}
