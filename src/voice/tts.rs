//! Remote text-to-speech tier

use std::time::Duration;

use async_trait::async_trait;

use crate::{Error, Language, Result};

/// Remote voice service returning encoded audio
#[async_trait]
pub trait RemoteSynthesizer: Send + Sync {
    /// Synthesize normalized text spoken in `language`
    ///
    /// # Returns
    ///
    /// Audio bytes (MP3 format)
    ///
    /// # Errors
    ///
    /// Returns error if the service is unreachable, rejects the request, or
    /// returns an empty payload
    async fn synthesize(&self, text: &str, language: Language) -> Result<Vec<u8>>;
}

/// Synthesizes speech through the chat backend's TTS endpoint
pub struct HttpSynthesizer {
    client: reqwest::Client,
    url: String,
    auth_token: Option<String>,
}

impl HttpSynthesizer {
    /// Create a synthesizer posting to `url`
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            url: url.into(),
            auth_token: None,
        })
    }

    /// Send a bearer token with each request
    #[must_use]
    pub fn with_auth_token(mut self, token: Option<String>) -> Self {
        self.auth_token = token;
        self
    }
}

#[async_trait]
impl RemoteSynthesizer for HttpSynthesizer {
    async fn synthesize(&self, text: &str, language: Language) -> Result<Vec<u8>> {
        #[derive(serde::Serialize)]
        struct TtsRequest<'a> {
            text: &'a str,
            language: Language,
        }

        tracing::debug!(chars = text.len(), %language, "requesting remote synthesis");

        let mut request = self
            .client
            .post(&self.url)
            .header(reqwest::header::ACCEPT, "audio/mpeg")
            .json(&TtsRequest { text, language });
        if let Some(token) = &self.auth_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Tts(format!("remote TTS error {status}: {body}")));
        }

        let audio = response.bytes().await?;
        if audio.is_empty() {
            return Err(Error::Tts("remote TTS returned empty audio".to_string()));
        }

        tracing::debug!(bytes = audio.len(), "remote synthesis complete");
        Ok(audio.to_vec())
    }
}
