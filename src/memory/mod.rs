//! Session-scoped conversation memory
//!
//! Gives every LLM call inside a request the conversation so far
//! (the user query plus earlier specialist answers).

pub mod store;

pub use store::{ConversationHistory, ConversationMessage, MessageRole};
