//! Core data models for the query pipeline

use crate::error::OrchestrationError;
use serde::{Deserialize, Serialize};
use std::fmt;

//
// ================= Query =================
//

/// One user query, immutable for the lifetime of a request
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Query {
    pub text: String,
    pub user_id: String,
    pub session_id: String,
}

impl Query {
    pub fn new(
        text: impl Into<String>,
        user_id: impl Into<String>,
        session_id: impl Into<String>,
    ) -> Self {
        Self {
            text: text.into(),
            user_id: user_id.into(),
            session_id: session_id.into(),
        }
    }
}

//
// ================= Tool I/O =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Transport,
    Data,
    RateLimited,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ToolFailure {
    pub kind: FailureKind,
    pub reason: String,
    pub retryable: bool,
}

impl ToolFailure {
    pub fn from_error(error: &OrchestrationError) -> Self {
        let (kind, reason) = match error {
            OrchestrationError::AdapterTransport(reason) => (FailureKind::Transport, reason.clone()),
            OrchestrationError::AdapterRateLimited(reason) => {
                (FailureKind::RateLimited, reason.clone())
            }
            OrchestrationError::AdapterData(reason) => (FailureKind::Data, reason.clone()),
            OrchestrationError::HttpError(_) | OrchestrationError::IoError(_) => {
                (FailureKind::Transport, error.to_string())
            }
            other => (FailureKind::Data, other.to_string()),
        };

        Self {
            kind,
            reason,
            retryable: error.is_retryable(),
        }
    }
}

impl fmt::Display for ToolFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.reason)
    }
}

/// Outcome of a single adapter call
#[derive(Debug, Clone, PartialEq)]
pub enum ToolResult<T> {
    Success(T),
    Failure(ToolFailure),
}

impl<T> ToolResult<T> {
    pub fn failure(&self) -> Option<&ToolFailure> {
        match self {
            ToolResult::Success(_) => None,
            ToolResult::Failure(failure) => Some(failure),
        }
    }
}

impl<T> From<crate::Result<T>> for ToolResult<T> {
    fn from(result: crate::Result<T>) -> Self {
        match result {
            Ok(payload) => ToolResult::Success(payload),
            Err(error) => ToolResult::Failure(ToolFailure::from_error(&error)),
        }
    }
}

/// One ranked search result, in the order the search API returned it
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SearchHit {
    pub title: String,
    pub snippet: String,
    pub link: String,
}

/// A search hit after its link was fetched. Exactly one of
/// `content` / `error` is set.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScrapedPage {
    pub title: String,
    pub snippet: String,
    pub link: String,
    pub content: Option<String>,
    pub error: Option<String>,
}

//
// ================= Routing =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum SpecialistId {
    Financial,
    Web,
}

impl SpecialistId {
    pub fn agent_id(&self) -> &'static str {
        match self {
            SpecialistId::Financial => "data_researcher_agent",
            SpecialistId::Web => "web_intelligence_agent",
        }
    }
}

impl fmt::Display for SpecialistId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.agent_id())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RouteDecision {
    FinancialOnly,
    WebOnly,
    Both,
    Clarify { question: String },
}

impl RouteDecision {
    /// Specialists to invoke, financial always before web
    pub fn specialists(&self) -> &'static [SpecialistId] {
        match self {
            RouteDecision::FinancialOnly => &[SpecialistId::Financial],
            RouteDecision::WebOnly => &[SpecialistId::Web],
            RouteDecision::Both => &[SpecialistId::Financial, SpecialistId::Web],
            RouteDecision::Clarify { .. } => &[],
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            RouteDecision::FinancialOnly => "financial",
            RouteDecision::WebOnly => "web",
            RouteDecision::Both => "both",
            RouteDecision::Clarify { .. } => "clarify",
        }
    }
}

//
// ================= Specialist Output =================
//

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SpecialistOutput {
    pub agent_id: SpecialistId,
    pub text: String,
    pub grounded: bool,
    /// Adapter failure reason when the specialist refused
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl SpecialistOutput {
    pub fn grounded(agent_id: SpecialistId, text: impl Into<String>) -> Self {
        Self {
            agent_id,
            text: text.into(),
            grounded: true,
            detail: None,
        }
    }

    pub fn refusal(agent_id: SpecialistId, text: &str, detail: impl Into<String>) -> Self {
        Self {
            agent_id,
            text: text.to_string(),
            grounded: false,
            detail: Some(detail.into()),
        }
    }
}

//
// ================= Pipeline =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PipelineStage {
    Routing,
    Dispatching,
    Looping,
    Synthesizing,
    Direct,
    Done,
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PipelineStage::Routing => "ROUTE",
            PipelineStage::Dispatching => "DISPATCH",
            PipelineStage::Looping => "LOOP",
            PipelineStage::Synthesizing => "SYNTHESIZE",
            PipelineStage::Direct => "DIRECT",
            PipelineStage::Done => "DONE",
        };
        write!(f, "{}", s)
    }
}

/// Final result of one pipeline run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineOutcome {
    pub text: String,
    pub route: RouteDecision,
    pub outputs: Vec<SpecialistOutput>,
    pub iterations: u32,
    pub grounded: bool,
    pub detail: Option<String>,
    pub trace: Vec<String>,
}
