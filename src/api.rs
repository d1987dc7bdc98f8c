//! REST API server
//!
//! `GET /`, `GET /health` and `POST /chat`. Each chat request gets a fresh
//! session that is released once the response is built, or when the
//! request is dropped.

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info, warn};

use crate::agent::Orchestrator;
use crate::config::ServerConfig;
use crate::error::OrchestrationError;
use crate::state::{InMemorySessionStore, SessionStore};

pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Longest accepted query, in characters
pub const MAX_QUERY_CHARS: usize = 5000;

const STATUS_INITIALIZED: &str = "initialized";

/// =============================
/// Request / Response Models
/// =============================

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ChatRequest {
    pub query: String,
    #[serde(default = "default_user_id")]
    pub user_id: String,
}

fn default_user_id() -> String {
    "default-user".to_string()
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatResponse {
    pub response: String,
    pub session_id: String,
    pub timestamp: String,
    /// Tool failure detail when the answer is a refusal
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub detail: String,
    pub timestamp: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
    pub version: String,
    pub agent_status: String,
}

fn timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn error_response(status: StatusCode, detail: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorResponse {
            detail: detail.into(),
            timestamp: timestamp(),
        }),
    )
        .into_response()
}

/// =============================
/// API State
/// =============================

/// Built once at startup; only the session registry changes afterwards
#[derive(Clone)]
pub struct ApiState {
    pub orchestrator: Option<Arc<Orchestrator>>,
    pub sessions: Arc<dyn SessionStore>,
    pub agent_status: String,
}

impl ApiState {
    pub fn ready(orchestrator: Arc<Orchestrator>) -> Self {
        Self {
            orchestrator: Some(orchestrator),
            sessions: Arc::new(InMemorySessionStore::new()),
            agent_status: STATUS_INITIALIZED.to_string(),
        }
    }

    /// Serve health and info only; chat answers 503
    pub fn degraded(reason: &OrchestrationError) -> Self {
        Self {
            orchestrator: None,
            sessions: Arc::new(InMemorySessionStore::new()),
            agent_status: format!("error: {}", reason),
        }
    }

    pub fn with_sessions(mut self, sessions: Arc<dyn SessionStore>) -> Self {
        self.sessions = sessions;
        self
    }
}

/// Holds a session for the lifetime of one chat request. Releasing it on
/// drop covers requests whose handler future is cancelled mid-run.
struct SessionLease {
    sessions: Arc<dyn SessionStore>,
    session_id: Option<String>,
}

impl SessionLease {
    fn new(sessions: Arc<dyn SessionStore>, session_id: String) -> Self {
        Self {
            sessions,
            session_id: Some(session_id),
        }
    }

    async fn release(mut self) {
        if let Some(session_id) = self.session_id.take() {
            release_session(self.sessions.as_ref(), &session_id).await;
        }
    }
}

impl Drop for SessionLease {
    fn drop(&mut self) {
        let Some(session_id) = self.session_id.take() else {
            return;
        };
        warn!(session_id = %session_id, "Chat request dropped before completion");

        let sessions = self.sessions.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    release_session(sessions.as_ref(), &session_id).await;
                });
            }
            Err(_) => {
                error!(session_id = %session_id, "No runtime to release session on");
            }
        }
    }
}

async fn release_session(sessions: &dyn SessionStore, session_id: &str) {
    if let Err(e) = sessions.release(session_id).await {
        warn!(session_id = %session_id, error = %e, "Session release failed");
    }
}

fn validate(request: &ChatRequest) -> crate::Result<()> {
    if request.query.trim().is_empty() {
        return Err(OrchestrationError::RequestValidation(
            "Query cannot be empty".to_string(),
        ));
    }
    let chars = request.query.chars().count();
    if chars > MAX_QUERY_CHARS {
        return Err(OrchestrationError::RequestValidation(format!(
            "Query is too long ({} characters, maximum {})",
            chars, MAX_QUERY_CHARS
        )));
    }
    Ok(())
}

/// =============================
/// Info + Health Endpoints
/// =============================

async fn root() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "message": "Welcome to the StockSage multi-agent chat orchestrator API",
        "version": APP_VERSION,
        "endpoints": {
            "root": "GET /",
            "health": "GET /health",
            "chat": "POST /chat",
        }
    }))
}

async fn health(State(state): State<ApiState>) -> (StatusCode, Json<HealthResponse>) {
    let ready = state.orchestrator.is_some();
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(HealthResponse {
            status: if ready { "healthy" } else { "degraded" }.to_string(),
            timestamp: timestamp(),
            version: APP_VERSION.to_string(),
            agent_status: state.agent_status.clone(),
        }),
    )
}

/// =============================
/// Chat Endpoint
/// =============================

async fn chat(
    State(state): State<ApiState>,
    payload: std::result::Result<Json<ChatRequest>, JsonRejection>,
) -> Response {
    let Some(orchestrator) = state.orchestrator.clone() else {
        error!("Chat request received but agent not initialized");
        return error_response(
            StatusCode::SERVICE_UNAVAILABLE,
            format!("Service unavailable: Agent status is '{}'", state.agent_status),
        );
    };

    let request = match payload {
        Ok(Json(request)) => request,
        Err(rejection) => {
            warn!(error = %rejection, "Rejected chat payload");
            return error_response(rejection.status(), rejection.body_text());
        }
    };

    if let Err(e) = validate(&request) {
        warn!(error = %e, "Invalid chat request");
        let detail = match e {
            OrchestrationError::RequestValidation(reason) => reason,
            other => other.to_string(),
        };
        return error_response(StatusCode::BAD_REQUEST, detail);
    }

    let mut session = match state.sessions.create_session(&request.user_id).await {
        Ok(session) => session,
        Err(e) => {
            error!(error = %e, "Could not create session");
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("An error occurred while processing your request: {}", e),
            );
        }
    };
    let session_id = session.session_id.clone();
    let lease = SessionLease::new(state.sessions.clone(), session_id.clone());

    info!(user_id = %request.user_id, session_id = %session_id, "Processing chat request");

    let query = session.query(request.query.trim());
    let result = orchestrator.run(&query, &mut session).await;
    lease.release().await;

    match result {
        Ok(outcome) => (
            StatusCode::OK,
            Json(ChatResponse {
                response: outcome.text,
                session_id,
                timestamp: timestamp(),
                error: outcome.detail,
            }),
        )
            .into_response(),
        Err(e) => {
            error!(session_id = %session_id, error = %e, "Error processing chat request");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("An error occurred while processing your request: {}", e),
            )
        }
    }
}

/// =============================
/// Router
/// =============================

pub fn create_router(state: ApiState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/chat", post(chat))
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
}

/// =============================
/// Server Startup
/// =============================

pub async fn start_server(
    state: ApiState,
    config: &ServerConfig,
) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let router = create_router(state);
    let addr = config.bind_addr();

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("API Server listening on http://{}", addr);

    axum::serve(listener, router).await?;

    Ok(())
}
