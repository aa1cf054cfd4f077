//! Sathi voice - voice interaction pipeline for the Sathi farming assistant
//!
//! This library provides:
//! - Speech capture with bounded no-speech retry and a hard timeout
//! - Speech output: text normalization, Hindi/English detection, remote
//!   synthesis with local fallback
//! - The chat session controller that sits between them
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │                    Chat session                       │
//! │   messages  │  conversations  │  language  │  state   │
//! └──────┬──────────────────────────────────────┬────────┘
//!        │ transcripts                          │ replies
//! ┌──────▼────────────────┐        ┌────────────▼─────────┐
//! │    Speech capture     │        │    Speech output      │
//! │ retry │ timeout │ STT │        │ normalize │ remote TTS│
//! │                       │        │ detect    │ local TTS │
//! └───────────────────────┘        └───────────────────────┘
//! ```

pub mod chat;
pub mod config;
pub mod error;
pub mod language;
pub mod voice;

pub use config::Config;
pub use error::{Error, Result};
pub use language::{Language, detect_language};
