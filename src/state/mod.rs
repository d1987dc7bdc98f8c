//! Session state
//!
//! One session per request, in-memory only. Sessions are never reused:
//! every call to `create_session` mints a fresh `session_<uuid>` id, and
//! the record is dropped when the request finishes.

use crate::error::OrchestrationError;
use crate::memory::{ConversationHistory, ConversationMessage, MessageRole};
use crate::models::Query;
use crate::Result;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

/// Conversation identity for a single request
#[derive(Debug, Clone)]
pub struct Session {
    pub session_id: String,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
    pub history: ConversationHistory,
}

impl Session {
    fn new(session_id: String, user_id: String) -> Self {
        let history = ConversationHistory::new(session_id.clone(), user_id.clone());
        Self {
            session_id,
            user_id,
            created_at: Utc::now(),
            history,
        }
    }

    pub fn query(&self, text: impl Into<String>) -> Query {
        Query::new(text, self.user_id.clone(), self.session_id.clone())
    }

    pub fn record(&mut self, role: MessageRole, content: impl Into<String>, message_type: &str) {
        self.history.add_message(ConversationMessage::new(
            role,
            content.into(),
            Some(message_type.to_string()),
        ));
    }
}

/// Trait for session bookkeeping
#[async_trait::async_trait]
pub trait SessionStore: Send + Sync {
    async fn create_session(&self, user_id: &str) -> Result<Session>;
    async fn release(&self, session_id: &str) -> Result<()>;
    async fn active_sessions(&self) -> usize;
    /// Total sessions ever created by this process
    fn issued_total(&self) -> u64;
}

#[derive(Debug, Clone)]
struct SessionRecord {
    user_id: String,
    created_at: DateTime<Utc>,
}

/// In-memory session registry; lost on restart
pub struct InMemorySessionStore {
    sessions: Arc<RwLock<HashMap<String, SessionRecord>>>,
    issued: AtomicU64,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            issued: AtomicU64::new(0),
        }
    }
}

impl Default for InMemorySessionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl SessionStore for InMemorySessionStore {
    async fn create_session(&self, user_id: &str) -> Result<Session> {
        let mut sessions = self.sessions.write().await;

        let session_id = loop {
            let candidate = format!("session_{}", Uuid::new_v4());
            if !sessions.contains_key(&candidate) {
                break candidate;
            }
        };

        sessions.insert(
            session_id.clone(),
            SessionRecord {
                user_id: user_id.to_string(),
                created_at: Utc::now(),
            },
        );
        self.issued.fetch_add(1, Ordering::Relaxed);

        debug!(session_id = %session_id, user_id, "Session created");
        Ok(Session::new(session_id, user_id.to_string()))
    }

    async fn release(&self, session_id: &str) -> Result<()> {
        let removed = self.sessions.write().await.remove(session_id);

        match removed {
            Some(record) => {
                debug!(
                    session_id,
                    user_id = %record.user_id,
                    lifetime_ms = (Utc::now() - record.created_at).num_milliseconds(),
                    "Session released"
                );
                Ok(())
            }
            None => Err(OrchestrationError::SessionError(format!(
                "Unknown session: {}",
                session_id
            ))),
        }
    }

    async fn active_sessions(&self) -> usize {
        self.sessions.read().await.len()
    }

    fn issued_total(&self) -> u64 {
        self.issued.load(Ordering::Relaxed)
    }
}
