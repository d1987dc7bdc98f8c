//! Error types for the query orchestrator

use thiserror::Error;

/// Result type alias for orchestrator operations
pub type Result<T> = std::result::Result<T, OrchestrationError>;

#[derive(Error, Debug)]
pub enum OrchestrationError {

    // =============================
    // Tool Adapter Errors
    // =============================

    #[error("Adapter transport error: {0}")]
    AdapterTransport(String),

    #[error("Adapter data error: {0}")]
    AdapterData(String),

    #[error("Adapter rate limited: {0}")]
    AdapterRateLimited(String),

    // =============================
    // Core Pipeline Errors
    // =============================

    #[error("Router could not classify the query: {0}")]
    RouterAmbiguous(String),

    #[error("Pipeline fault: {0}")]
    PipelineFault(String),

    #[error("Invalid request: {0}")]
    RequestValidation(String),

    #[error("LLM error: {0}")]
    LlmError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Session error: {0}")]
    SessionError(String),

    // =============================
    // External Library Conversions
    // =============================

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl OrchestrationError {
    /// Whether a caller could reasonably try the same call again later.
    /// Informational only: nothing in the pipeline retries.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::AdapterTransport(_)
                | Self::AdapterRateLimited(_)
                | Self::HttpError(_)
                | Self::IoError(_)
        )
    }
}
