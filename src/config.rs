//! Configuration management for the Sathi voice pipeline
//!
//! Values come from an optional `sathi.toml`, then environment overrides.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::{Error, Language, Result};

/// Default chat backend base URL
pub const DEFAULT_API_URL: &str = "http://localhost:5000/api/v1";

/// Sathi configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Chat backend base URL (chat, TTS endpoints hang off it)
    pub api_url: String,

    /// Bearer token for the chat backend
    pub api_token: Option<String>,

    /// Default UI language before any persisted choice
    pub language: Language,

    /// Directory for persisted chat state
    pub data_dir: PathBuf,

    /// Speech capture policy
    pub recognition: RecognitionConfig,

    /// Speech output settings
    pub synthesis: SynthesisConfig,

    /// Transcription service used by the microphone recognizer
    pub stt: SttConfig,
}

/// Speech capture policy
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RecognitionConfig {
    /// Delay before restarting after no speech (ms)
    pub retry_delay_ms: u64,

    /// Automatic no-speech restarts per interaction
    pub max_retries: u32,

    /// Hard ceiling on one listening interaction (s)
    pub session_timeout_secs: u64,

    /// Silence after which the microphone recognizer reports no speech (s)
    pub no_speech_window_secs: u64,
}

impl Default for RecognitionConfig {
    fn default() -> Self {
        Self {
            retry_delay_ms: 400,
            max_retries: 3,
            session_timeout_secs: 15,
            no_speech_window_secs: 6,
        }
    }
}

/// Speech output settings
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SynthesisConfig {
    /// Try the remote voice service before local synthesis
    pub remote_enabled: bool,

    /// Remote synthesis request timeout (s)
    pub remote_timeout_secs: u64,

    /// Substrings of voice names that mark a preferred provider
    pub preferred_providers: Vec<String>,

    /// Devanagari share above which text is spoken as Hindi
    pub devanagari_threshold: f32,

    /// Local synthesis command
    pub local_command: String,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            remote_enabled: true,
            remote_timeout_secs: 10,
            preferred_providers: vec!["google".to_string()],
            devanagari_threshold: crate::language::DEFAULT_DEVANAGARI_THRESHOLD,
            local_command: "espeak-ng".to_string(),
        }
    }
}

/// Transcription provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SttProvider {
    /// `OpenAI` Whisper
    #[default]
    Whisper,
    /// Deepgram
    Deepgram,
}

/// Transcription service settings
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SttConfig {
    /// Provider backend
    pub provider: SttProvider,

    /// Provider API key
    pub api_key: Option<String>,

    /// Model identifier (provider default when unset)
    pub model: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            api_token: None,
            language: Language::En,
            data_dir: default_data_dir(),
            recognition: RecognitionConfig::default(),
            synthesis: SynthesisConfig::default(),
            stt: SttConfig::default(),
        }
    }
}

/// Platform data directory (`~/.local/share/sathi` on Linux)
fn default_data_dir() -> PathBuf {
    directories::ProjectDirs::from("farm", "sathi", "sathi")
        .map_or_else(|| PathBuf::from(".sathi"), |d| d.data_dir().to_path_buf())
}

/// Platform config file path (`~/.config/sathi/sathi.toml` on Linux)
fn default_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("farm", "sathi", "sathi")
        .map(|d| d.config_dir().join("sathi.toml"))
}

impl Config {
    /// Load configuration from file and environment
    ///
    /// `SATHI_CONFIG` names the file; otherwise the platform config dir is
    /// checked. A missing file is not an error.
    ///
    /// # Errors
    ///
    /// Returns error if the file exists but cannot be read or parsed, or an
    /// environment override is malformed
    pub fn load() -> Result<Self> {
        let path = std::env::var("SATHI_CONFIG")
            .ok()
            .map(PathBuf::from)
            .or_else(default_config_path);

        let mut config = match path {
            Some(path) if path.exists() => Self::from_file(&path)?,
            _ => Self::default(),
        };

        config.apply_env()?;

        if let Err(e) = std::fs::create_dir_all(&config.data_dir) {
            tracing::warn!(
                path = %config.data_dir.display(),
                error = %e,
                "failed to create data directory"
            );
        }

        Ok(config)
    }

    /// Parse a TOML config file
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or parsed
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        tracing::info!(path = %path.display(), "loaded config");
        Ok(config)
    }

    /// Apply environment overrides
    fn apply_env(&mut self) -> Result<()> {
        if let Ok(url) = std::env::var("SATHI_API_URL") {
            self.api_url = url;
        }
        if let Ok(token) = std::env::var("SATHI_API_TOKEN") {
            self.api_token = Some(token);
        }
        if let Ok(language) = std::env::var("SATHI_LANGUAGE") {
            self.language = language.parse()?;
        }
        if let Ok(dir) = std::env::var("SATHI_DATA_DIR") {
            self.data_dir = PathBuf::from(dir);
        }
        if let Ok(secs) = std::env::var("SATHI_TTS_TIMEOUT_SECS") {
            self.synthesis.remote_timeout_secs = secs
                .parse()
                .map_err(|_| Error::Config(format!("invalid SATHI_TTS_TIMEOUT_SECS: {secs}")))?;
        }
        if let Ok(command) = std::env::var("SATHI_LOCAL_TTS") {
            self.synthesis.local_command = command;
        }
        if let Ok(provider) = std::env::var("SATHI_STT_PROVIDER") {
            self.stt.provider = match provider.to_ascii_lowercase().as_str() {
                "whisper" => SttProvider::Whisper,
                "deepgram" => SttProvider::Deepgram,
                other => {
                    return Err(Error::Config(format!("unknown STT provider: {other}")));
                }
            };
        }
        if let Ok(model) = std::env::var("SATHI_STT_MODEL") {
            self.stt.model = Some(model);
        }
        if self.stt.api_key.is_none() {
            let key_var = match self.stt.provider {
                SttProvider::Whisper => "OPENAI_API_KEY",
                SttProvider::Deepgram => "DEEPGRAM_API_KEY",
            };
            self.stt.api_key = std::env::var(key_var).ok();
        }

        Ok(())
    }

    /// Remote synthesis endpoint
    #[must_use]
    pub fn tts_url(&self) -> String {
        format!("{}/chat/text-to-speech", self.api_url.trim_end_matches('/'))
    }
}
