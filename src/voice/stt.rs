//! Speech-to-text for captured utterances

use crate::config::{SttConfig, SttProvider};
use crate::{Error, Language, Result};

const WHISPER_URL: &str = "https://api.openai.com/v1/audio/transcriptions";
const DEEPGRAM_URL: &str = "https://api.deepgram.com/v1/listen";

/// Response from `OpenAI` Whisper transcription API
#[derive(serde::Deserialize)]
struct WhisperResponse {
    text: String,
}

/// Response from Deepgram transcription API
#[derive(serde::Deserialize)]
struct DeepgramResponse {
    results: DeepgramResults,
}

#[derive(serde::Deserialize)]
struct DeepgramResults {
    channels: Vec<DeepgramChannel>,
}

#[derive(serde::Deserialize)]
struct DeepgramChannel {
    alternatives: Vec<DeepgramAlternative>,
}

#[derive(serde::Deserialize)]
struct DeepgramAlternative {
    transcript: String,
    #[serde(default)]
    confidence: Option<f32>,
}

/// A transcribed utterance
#[derive(Debug, Clone, PartialEq)]
pub struct Transcript {
    /// Recognized text, trimmed
    pub text: String,
    /// Provider confidence, 1.0 when the provider reports none
    pub confidence: f32,
}

/// Transcribes WAV audio through a hosted STT provider
pub struct Transcriber {
    client: reqwest::Client,
    provider: SttProvider,
    api_key: String,
    model: String,
    endpoint: String,
}

impl Transcriber {
    /// Create a transcriber for `provider`
    ///
    /// # Errors
    ///
    /// Returns error if the API key is empty
    pub fn new(provider: SttProvider, api_key: String, model: Option<String>) -> Result<Self> {
        if api_key.is_empty() {
            return Err(Error::Config(format!(
                "{} API key required for transcription",
                provider_name(provider)
            )));
        }

        let (model, endpoint) = match provider {
            SttProvider::Whisper => (model.unwrap_or_else(|| "whisper-1".to_string()), WHISPER_URL),
            SttProvider::Deepgram => (model.unwrap_or_else(|| "nova-2".to_string()), DEEPGRAM_URL),
        };

        Ok(Self {
            client: reqwest::Client::new(),
            provider,
            api_key,
            model,
            endpoint: endpoint.to_string(),
        })
    }

    /// Create a transcriber from config
    ///
    /// # Errors
    ///
    /// Returns error if no API key is configured
    pub fn from_config(config: &SttConfig) -> Result<Self> {
        let api_key = config.api_key.clone().ok_or_else(|| {
            Error::Config(format!(
                "{} API key not set",
                provider_name(config.provider)
            ))
        })?;
        Self::new(config.provider, api_key, config.model.clone())
    }

    /// Point the transcriber at another endpoint
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Transcribe WAV audio spoken in `language`
    ///
    /// # Errors
    ///
    /// Returns error if the request fails or the provider rejects it
    pub async fn transcribe(&self, audio: &[u8], language: Language) -> Result<Transcript> {
        match self.provider {
            SttProvider::Whisper => self.transcribe_whisper(audio, language).await,
            SttProvider::Deepgram => self.transcribe_deepgram(audio, language).await,
        }
    }

    async fn transcribe_whisper(&self, audio: &[u8], language: Language) -> Result<Transcript> {
        tracing::debug!(audio_bytes = audio.len(), %language, "starting Whisper transcription");

        let form = reqwest::multipart::Form::new()
            .part(
                "file",
                reqwest::multipart::Part::bytes(audio.to_vec())
                    .file_name("audio.wav")
                    .mime_str("audio/wav")
                    .map_err(|e| Error::Stt(e.to_string()))?,
            )
            .text("model", self.model.clone())
            .text("language", language.code());

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "Whisper API error");
            return Err(Error::Stt(format!("Whisper API error {status}: {body}")));
        }

        let result: WhisperResponse = response.json().await?;
        let text = result.text.trim().to_string();

        tracing::info!(transcript = %text, "transcription complete");
        Ok(Transcript {
            text,
            confidence: 1.0,
        })
    }

    async fn transcribe_deepgram(&self, audio: &[u8], language: Language) -> Result<Transcript> {
        tracing::debug!(audio_bytes = audio.len(), %language, "starting Deepgram transcription");

        let response = self
            .client
            .post(&self.endpoint)
            .query(&[
                ("model", self.model.as_str()),
                ("language", language.code()),
                ("punctuate", "true"),
            ])
            .header("Authorization", format!("Token {}", self.api_key))
            .header("Content-Type", "audio/wav")
            .body(audio.to_vec())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "Deepgram API error");
            return Err(Error::Stt(format!("Deepgram API error {status}: {body}")));
        }

        let result: DeepgramResponse = response.json().await?;
        let transcript = result
            .results
            .channels
            .into_iter()
            .next()
            .and_then(|c| c.alternatives.into_iter().next())
            .map(|a| Transcript {
                text: a.transcript.trim().to_string(),
                confidence: a.confidence.unwrap_or(1.0),
            })
            .unwrap_or(Transcript {
                text: String::new(),
                confidence: 0.0,
            });

        tracing::info!(transcript = %transcript.text, "transcription complete");
        Ok(transcript)
    }
}

const fn provider_name(provider: SttProvider) -> &'static str {
    match provider {
        SttProvider::Whisper => "OpenAI",
        SttProvider::Deepgram => "Deepgram",
    }
}
