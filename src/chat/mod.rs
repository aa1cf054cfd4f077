//! Chat session controller
//!
//! Sequences user input, assistant replies and conversation history against
//! the chat backend. Only the language choice and the current conversation id
//! survive restarts.

mod client;
mod session;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use client::{ChatClient, ChatReply, ConversationSummary, StoredConversation, StoredMessage};
pub use session::{ChatSession, PersistedState, STATE_FILE};

/// Message author
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The farmer
    User,
    /// The assistant
    Model,
}

/// A message in the chat transcript
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Unique within the transcript
    pub id: String,
    /// Author
    pub role: Role,
    /// Text as written
    pub content: String,
    /// When it was added
    pub timestamp: DateTime<Utc>,
}

impl Message {
    /// Create a message stamped now with a fresh id
    #[must_use]
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            role,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }
}
