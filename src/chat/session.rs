//! Chat transcript and conversation state

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::client::{ChatClient, ConversationSummary};
use super::{Message, Role};
use crate::{Language, Result};

/// File holding the persisted session state inside the data dir
pub const STATE_FILE: &str = "chat-state.json";

/// The part of a session that survives restarts
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedState {
    /// Selected language
    pub language: Language,
    /// Conversation to continue
    pub conversation_id: Option<String>,
}

impl PersistedState {
    /// Read state from `path`; `None` when the file is missing or unreadable
    #[must_use]
    pub fn load(path: &Path) -> Option<Self> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "failed to read chat state");
                return None;
            }
        };

        match serde_json::from_str(&content) {
            Ok(state) => Some(state),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "ignoring corrupt chat state");
                None
            }
        }
    }

    /// Write state to `path`
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be written
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}

/// Chat session with the assistant
pub struct ChatSession {
    client: ChatClient,
    state_path: Option<PathBuf>,
    messages: Vec<Message>,
    conversations: Vec<ConversationSummary>,
    conversation_id: Option<String>,
    language: Language,
    is_loading: bool,
}

impl ChatSession {
    /// Create an unpersisted session
    #[must_use]
    pub const fn new(client: ChatClient, language: Language) -> Self {
        Self {
            client,
            state_path: None,
            messages: Vec::new(),
            conversations: Vec::new(),
            conversation_id: None,
            language,
            is_loading: false,
        }
    }

    /// Create a session persisted in `data_dir`, restoring any saved state
    ///
    /// `language` applies only when nothing was saved.
    #[must_use]
    pub fn restore(client: ChatClient, data_dir: &Path, language: Language) -> Self {
        let path = data_dir.join(STATE_FILE);
        let state = PersistedState::load(&path).unwrap_or(PersistedState {
            language,
            conversation_id: None,
        });

        tracing::debug!(
            language = %state.language,
            conversation = ?state.conversation_id,
            "chat state restored"
        );

        Self {
            state_path: Some(path),
            conversation_id: state.conversation_id,
            language: state.language,
            ..Self::new(client, language)
        }
    }

    /// Apply a language chosen for this run, replacing the restored one
    ///
    /// The choice is saved so later sessions start in it too.
    #[must_use]
    pub fn with_language_override(mut self, language: Option<Language>) -> Self {
        if let Some(language) = language {
            if language != self.language {
                tracing::debug!(from = %self.language, to = %language, "language overridden");
            }
            self.set_language(language);
        }
        self
    }

    /// Messages in the transcript
    #[must_use]
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Conversations from the last [`ChatSession::load_conversations`]
    #[must_use]
    pub fn conversations(&self) -> &[ConversationSummary] {
        &self.conversations
    }

    /// Current conversation id
    #[must_use]
    pub fn conversation_id(&self) -> Option<&str> {
        self.conversation_id.as_deref()
    }

    /// Selected language
    #[must_use]
    pub const fn language(&self) -> Language {
        self.language
    }

    /// Whether a backend request is in flight
    #[must_use]
    pub const fn is_loading(&self) -> bool {
        self.is_loading
    }

    /// Send a user message and append the assistant's reply
    ///
    /// On failure the user message stays in the transcript.
    ///
    /// # Errors
    ///
    /// Returns error if the backend request fails
    pub async fn send_message(&mut self, content: &str) -> Result<&Message> {
        self.messages.push(Message::new(Role::User, content));
        self.is_loading = true;

        let result = self
            .client
            .send(content, self.conversation_id.as_deref(), self.language)
            .await;
        self.is_loading = false;

        let reply = result.inspect_err(|e| tracing::error!(error = %e, "send message failed"))?;

        tracing::debug!(conversation = %reply.conversation_id, chars = reply.response.len(), "reply received");
        self.conversation_id = Some(reply.conversation_id);
        self.persist();

        Ok(self.push(Message::new(Role::Model, reply.response)))
    }

    /// Ask for advice about a crop and append it
    ///
    /// # Errors
    ///
    /// Returns error if the backend request fails
    pub async fn get_crop_advice(&mut self, crop_type: &str) -> Result<&Message> {
        self.is_loading = true;
        let result = self.client.crop_advice(crop_type, self.language).await;
        self.is_loading = false;

        let advice = result.inspect_err(|e| tracing::error!(error = %e, "crop advice failed"))?;
        Ok(self.push(Message::new(Role::Model, advice)))
    }

    /// Describe a pest problem and append the diagnosis
    ///
    /// # Errors
    ///
    /// Returns error if the backend request fails
    pub async fn analyze_pest(&mut self, description: &str, crop_type: Option<&str>) -> Result<&Message> {
        let mut content = format!("Pest/Disease Issue: {description}");
        if let Some(crop) = crop_type {
            content.push_str(&format!(" (Crop: {crop})"));
        }
        self.messages.push(Message::new(Role::User, content));
        self.is_loading = true;

        let result = self.client.analyze_pest(description, crop_type).await;
        self.is_loading = false;

        let analysis = result.inspect_err(|e| tracing::error!(error = %e, "pest analysis failed"))?;
        Ok(self.push(Message::new(Role::Model, analysis)))
    }

    /// Refresh the conversation list
    ///
    /// # Errors
    ///
    /// Returns error if the backend request fails; the previous list is kept
    pub async fn load_conversations(&mut self) -> Result<&[ConversationSummary]> {
        self.conversations = self.client.conversations().await?;
        Ok(&self.conversations)
    }

    /// Replace the transcript with a stored conversation
    ///
    /// # Errors
    ///
    /// Returns error if the backend request fails; the transcript is unchanged
    pub async fn load_conversation(&mut self, id: &str) -> Result<()> {
        let conversation = self.client.conversation(id).await?;

        self.messages = conversation
            .messages
            .into_iter()
            .enumerate()
            .map(|(index, stored)| Message {
                id: format!("{id}-{index}"),
                role: stored.role,
                content: stored.parts,
                timestamp: stored.timestamp,
            })
            .collect();
        self.conversation_id = Some(id.to_string());
        self.language = conversation.language;
        self.persist();

        tracing::debug!(conversation = id, messages = self.messages.len(), "conversation loaded");
        Ok(())
    }

    /// Delete a conversation, clearing the transcript if it is the current one
    ///
    /// # Errors
    ///
    /// Returns error if the backend request fails
    pub async fn delete_conversation(&mut self, id: &str) -> Result<()> {
        self.client.delete_conversation(id).await?;

        self.conversations.retain(|c| c.id != id);
        if self.conversation_id.as_deref() == Some(id) {
            self.messages.clear();
            self.conversation_id = None;
            self.persist();
        }
        Ok(())
    }

    /// Start a fresh conversation
    pub fn clear_chat(&mut self) {
        self.messages.clear();
        self.conversation_id = None;
        self.persist();
    }

    /// Change the conversation language
    pub fn set_language(&mut self, language: Language) {
        self.language = language;
        self.persist();
    }

    fn push(&mut self, message: Message) -> &Message {
        let index = self.messages.len();
        self.messages.push(message);
        &self.messages[index]
    }

    fn persist(&self) {
        let Some(path) = &self.state_path else {
            return;
        };

        let state = PersistedState {
            language: self.language,
            conversation_id: self.conversation_id.clone(),
        };
        if let Err(e) = state.save(path) {
            tracing::warn!(path = %path.display(), error = %e, "failed to save chat state");
        }
    }
}
