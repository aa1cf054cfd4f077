//! HTTP client for the Sathi chat backend

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::Role;
use crate::{Error, Language, Result};

/// Conversation listed by the backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationSummary {
    /// Conversation id
    pub id: String,
    /// Short preview of the opening message
    #[serde(default)]
    pub preview: String,
    /// Number of stored messages
    #[serde(default)]
    pub message_count: usize,
    /// Text of the latest message
    #[serde(default)]
    pub last_message: String,
    /// Time of the latest message
    #[serde(default)]
    pub last_updated: Option<DateTime<Utc>>,
    /// Conversation language
    #[serde(default)]
    pub language: Language,
}

/// Stored message as returned by the backend
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StoredMessage {
    /// Author
    pub role: Role,
    /// Message text
    pub parts: String,
    /// When the message was stored
    pub timestamp: DateTime<Utc>,
}

/// Full conversation transcript
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StoredConversation {
    /// Messages in order
    pub messages: Vec<StoredMessage>,
    /// Conversation language
    #[serde(default)]
    pub language: Language,
}

/// Assistant reply to a chat message
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatReply {
    /// Assistant text
    pub response: String,
    /// Conversation the exchange belongs to
    pub conversation_id: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ChatRequest<'a> {
    message: &'a str,
    conversation_id: Option<&'a str>,
    language: Language,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CropAdviceRequest<'a> {
    crop_type: &'a str,
    language: Language,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PestRequest<'a> {
    description: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    crop_type: Option<&'a str>,
}

#[derive(Deserialize)]
struct CropAdviceResponse {
    advice: String,
}

#[derive(Deserialize)]
struct PestResponse {
    analysis: String,
}

#[derive(Deserialize)]
struct ConversationsResponse {
    conversations: Vec<ConversationSummary>,
}

#[derive(Deserialize)]
struct ConversationResponse {
    conversation: StoredConversation,
}

/// Client for the chat backend's `/chat` routes
#[derive(Clone)]
pub struct ChatClient {
    api_url: String,
    client: reqwest::Client,
    auth_token: Option<String>,
}

impl ChatClient {
    /// Create a client for the backend at `api_url`
    #[must_use]
    pub fn new(api_url: &str) -> Self {
        Self {
            api_url: api_url.trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
            auth_token: None,
        }
    }

    /// Send a bearer token with each request
    #[must_use]
    pub fn with_auth_token(mut self, token: Option<String>) -> Self {
        self.auth_token = token;
        self
    }

    /// Send a user message and get the assistant's reply
    ///
    /// # Errors
    ///
    /// Returns error if the request fails or the backend rejects it
    pub async fn send(
        &self,
        message: &str,
        conversation_id: Option<&str>,
        language: Language,
    ) -> Result<ChatReply> {
        let body = ChatRequest {
            message,
            conversation_id,
            language,
        };
        let request = self.client.post(self.url("/chat/chat")).json(&body);
        self.execute(request).await
    }

    /// Ask for growing advice about a crop
    ///
    /// # Errors
    ///
    /// Returns error if the request fails or the backend rejects it
    pub async fn crop_advice(&self, crop_type: &str, language: Language) -> Result<String> {
        let body = CropAdviceRequest {
            crop_type,
            language,
        };
        let request = self.client.post(self.url("/chat/crop-advice")).json(&body);
        let response: CropAdviceResponse = self.execute(request).await?;
        Ok(response.advice)
    }

    /// Ask for a pest or disease diagnosis
    ///
    /// # Errors
    ///
    /// Returns error if the request fails or the backend rejects it
    pub async fn analyze_pest(&self, description: &str, crop_type: Option<&str>) -> Result<String> {
        let body = PestRequest {
            description,
            crop_type,
        };
        let request = self.client.post(self.url("/chat/analyze-pest")).json(&body);
        let response: PestResponse = self.execute(request).await?;
        Ok(response.analysis)
    }

    /// List the user's conversations
    ///
    /// # Errors
    ///
    /// Returns error if the request fails or the backend rejects it
    pub async fn conversations(&self) -> Result<Vec<ConversationSummary>> {
        let request = self.client.get(self.url("/chat/conversations"));
        let response: ConversationsResponse = self.execute(request).await?;
        Ok(response.conversations)
    }

    /// Fetch one conversation's transcript
    ///
    /// # Errors
    ///
    /// Returns error if the request fails or the backend rejects it
    pub async fn conversation(&self, id: &str) -> Result<StoredConversation> {
        let request = self
            .client
            .get(self.url(&format!("/chat/conversations/{id}")));
        let response: ConversationResponse = self.execute(request).await?;
        Ok(response.conversation)
    }

    /// Delete a conversation
    ///
    /// # Errors
    ///
    /// Returns error if the request fails or the backend rejects it
    pub async fn delete_conversation(&self, id: &str) -> Result<()> {
        let request = self
            .client
            .delete(self.url(&format!("/chat/conversations/{id}")));
        self.send_checked(request).await?;
        Ok(())
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.api_url)
    }

    async fn execute<T: DeserializeOwned>(&self, request: reqwest::RequestBuilder) -> Result<T> {
        let response = self.send_checked(request).await?;
        let body = response.text().await?;
        Ok(serde_json::from_str(&body)?)
    }

    async fn send_checked(&self, mut request: reqwest::RequestBuilder) -> Result<reqwest::Response> {
        if let Some(token) = &self.auth_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(status = %status, body = %body, "chat backend error");
            return Err(Error::Chat(format!("chat backend error {status}: {body}")));
        }

        Ok(response)
    }
}
