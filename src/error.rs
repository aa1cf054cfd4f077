//! Error types for the Sathi voice pipeline

use thiserror::Error;

/// Result type alias for Sathi operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the Sathi voice pipeline
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Speech recognition engine error
    #[error("recognition error: {0}")]
    Recognition(String),

    /// Speech-to-text error
    #[error("STT error: {0}")]
    Stt(String),

    /// Remote text-to-speech error
    #[error("TTS error: {0}")]
    Tts(String),

    /// Local speech synthesis error
    #[error("synthesis error: {0}")]
    Synthesis(String),

    /// Audio device or decoding error
    #[error("audio error: {0}")]
    Audio(String),

    /// Chat backend error
    #[error("chat error: {0}")]
    Chat(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}
