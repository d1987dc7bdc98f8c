//! Conversation history storage
//!
//! Messages exchanged inside one session, in arrival order. Histories are
//! never persisted; they die with the session.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use uuid::Uuid;

/// Role of a message sender
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Agent,
}

/// A single message in the conversation history
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub message_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub role: MessageRole,
    pub content: String,
    /// Optional metadata about message type (query, answer, clarification, etc.)
    pub message_type: Option<String>,
}

impl ConversationMessage {
    /// Create a new conversation message
    pub fn new(role: MessageRole, content: String, message_type: Option<String>) -> Self {
        Self {
            message_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            role,
            content,
            message_type,
        }
    }
}

/// Conversation history for a single session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationHistory {
    pub session_id: String,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    messages: VecDeque<ConversationMessage>,
}

impl ConversationHistory {
    pub fn new(session_id: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            user_id: user_id.into(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
            messages: VecDeque::new(),
        }
    }

    /// Add a message to history
    pub fn add_message(&mut self, message: ConversationMessage) {
        self.messages.push_back(message);
        self.updated_at = Utc::now();
    }

    /// Owned copy of up to `count` messages preceding the pending user
    /// turn, oldest first. A trailing user message is the live question,
    /// which callers send on its own.
    pub fn context(&self, count: usize) -> Vec<ConversationMessage> {
        let end = match self.messages.back() {
            Some(last) if last.role == MessageRole::User => self.messages.len() - 1,
            _ => self.messages.len(),
        };
        let skip = end.saturating_sub(count);
        self.messages.iter().take(end).skip(skip).cloned().collect()
    }

    pub fn message_count(&self) -> usize {
        self.messages.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conversation_message_creation() {
        let msg = ConversationMessage::new(
            MessageRole::User,
            "What is the S&P 500?".to_string(),
            Some("query".to_string()),
        );
        assert_eq!(msg.role, MessageRole::User);
        assert_eq!(msg.message_type.as_deref(), Some("query"));
    }

    #[test]
    fn test_conversation_history() {
        let mut history = ConversationHistory::new("session_1", "user123");

        history.add_message(ConversationMessage::new(
            MessageRole::User,
            "What is RSI?".to_string(),
            Some("query".to_string()),
        ));
        history.add_message(ConversationMessage::new(
            MessageRole::Agent,
            "RSI is a momentum oscillator...".to_string(),
            Some("answer".to_string()),
        ));

        assert_eq!(history.message_count(), 2);
    }

    #[test]
    fn test_context_keeps_order() {
        let mut history = ConversationHistory::new("session_2", "user123");

        for i in 0..10 {
            history.add_message(ConversationMessage::new(
                MessageRole::Agent,
                format!("Answer {}", i),
                None,
            ));
        }

        let context = history.context(3);
        let texts: Vec<_> = context.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(texts, vec!["Answer 7", "Answer 8", "Answer 9"]);
        assert_eq!(history.context(50).len(), 10);
    }

    #[test]
    fn test_context_leaves_out_pending_question() {
        let mut history = ConversationHistory::new("session_3", "user123");
        history.add_message(ConversationMessage::new(
            MessageRole::Agent,
            "AAPL last traded at $150.25.".to_string(),
            Some("data_researcher_agent".to_string()),
        ));
        history.add_message(ConversationMessage::new(
            MessageRole::User,
            "Why did it move?".to_string(),
            Some("query".to_string()),
        ));

        let context = history.context(10);
        assert_eq!(context.len(), 1);
        assert_eq!(context[0].role, MessageRole::Agent);

        // only the pending question
        let mut fresh = ConversationHistory::new("session_4", "user123");
        fresh.add_message(ConversationMessage::new(
            MessageRole::User,
            "AAPL price?".to_string(),
            Some("query".to_string()),
        ));
        assert!(fresh.context(10).is_empty());
    }
}
