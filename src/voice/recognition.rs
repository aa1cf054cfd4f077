//! Host speech-recognition contract
//!
//! A [`RecognitionBackend`] wraps whatever native engine the host offers.
//! It pushes events through a [`SessionSink`] that stamps every event with
//! the identity of the session it belongs to, so the listener can tell live
//! events from leftovers of an aborted session.

use std::fmt;

use tokio::sync::mpsc;

use crate::{Language, Result};

/// Identity of one recognition session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

/// Engine configuration applied at every session start
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecognitionSettings {
    /// Spoken language
    pub language: Language,
    /// BCP-47 tag handed to the engine (`hi-IN`, `en-IN`)
    pub lang_tag: String,
    /// Keep listening across pauses
    pub continuous: bool,
    /// Emit non-final hypotheses
    pub interim_results: bool,
    /// Alternatives per result slot
    pub max_alternatives: u32,
}

impl RecognitionSettings {
    /// Settings for a listening session in a language
    #[must_use]
    pub fn for_language(language: Language) -> Self {
        Self {
            language,
            lang_tag: language.bcp47().to_string(),
            continuous: true,
            interim_results: true,
            max_alternatives: 1,
        }
    }
}

/// One result slot of a recognition event
#[derive(Debug, Clone, PartialEq)]
pub struct ResultSlot {
    /// Best alternative transcript
    pub transcript: String,
    /// Engine confidence in `[0, 1]`
    pub confidence: f32,
    /// Whether the engine will revise this slot
    pub is_final: bool,
}

impl ResultSlot {
    /// A final slot
    #[must_use]
    pub fn final_result(transcript: impl Into<String>, confidence: f32) -> Self {
        Self {
            transcript: transcript.into(),
            confidence: confidence.clamp(0.0, 1.0),
            is_final: true,
        }
    }

    /// A non-final slot
    #[must_use]
    pub fn interim(transcript: impl Into<String>) -> Self {
        Self {
            transcript: transcript.into(),
            confidence: 0.0,
            is_final: false,
        }
    }
}

/// Transcript assembled from the slots of one event
#[derive(Debug, Clone, PartialEq)]
pub struct TranscriptEvent {
    /// Trimmed text, possibly empty
    pub text: String,
    /// Whether the text is final
    pub is_final: bool,
    /// Mean confidence of the contributing slots
    pub confidence: f32,
}

impl TranscriptEvent {
    /// Concatenate the slots from `from` onward that match `is_final`
    ///
    /// Returns `None` when no slot contributes any text.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn collect(results: &[ResultSlot], from: usize, is_final: bool) -> Option<Self> {
        let slots: Vec<&ResultSlot> = results
            .iter()
            .skip(from)
            .filter(|s| s.is_final == is_final)
            .filter(|s| !s.transcript.trim().is_empty())
            .collect();

        if slots.is_empty() {
            return None;
        }

        let text = slots
            .iter()
            .map(|s| s.transcript.trim())
            .collect::<Vec<_>>()
            .join(" ");
        let confidence = slots.iter().map(|s| s.confidence).sum::<f32>() / slots.len() as f32;

        Some(Self {
            text,
            is_final,
            confidence,
        })
    }
}

/// Why a recognition session failed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecognitionErrorKind {
    /// Nothing was said before the engine gave up
    NoSpeech,
    /// No usable microphone
    AudioCaptureUnavailable,
    /// Microphone access was refused
    PermissionDenied,
    /// Engine could not reach its service
    NetworkError,
    /// Session was aborted
    Aborted,
    /// Engine does not support the requested language
    LanguageUnsupported,
    /// Anything else, with the engine's raw code
    Unknown(String),
}

impl RecognitionErrorKind {
    /// Capability-absence error reported when the host has no recognizer
    #[must_use]
    pub fn unsupported() -> Self {
        Self::Unknown("unsupported".to_string())
    }

    /// Map an engine error code (`no-speech`, `not-allowed`, ...) to a kind
    #[must_use]
    pub fn from_code(code: &str) -> Self {
        match code {
            "no-speech" => Self::NoSpeech,
            "audio-capture" => Self::AudioCaptureUnavailable,
            "not-allowed" | "service-not-allowed" => Self::PermissionDenied,
            "network" => Self::NetworkError,
            "aborted" => Self::Aborted,
            "language-not-supported" => Self::LanguageUnsupported,
            other => Self::Unknown(other.to_string()),
        }
    }

    /// Engine-style code for logs
    #[must_use]
    pub fn code(&self) -> &str {
        match self {
            Self::NoSpeech => "no-speech",
            Self::AudioCaptureUnavailable => "audio-capture",
            Self::PermissionDenied => "not-allowed",
            Self::NetworkError => "network",
            Self::Aborted => "aborted",
            Self::LanguageUnsupported => "language-not-supported",
            Self::Unknown(code) => code,
        }
    }

    /// Text shown to the user
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::NoSpeech => "No speech detected. Please try again.".to_string(),
            Self::AudioCaptureUnavailable => "Microphone not accessible.".to_string(),
            Self::PermissionDenied => "Microphone permission denied.".to_string(),
            Self::NetworkError => "Network error occurred.".to_string(),
            Self::Aborted => "Speech recognition stopped.".to_string(),
            Self::LanguageUnsupported => {
                "This language is not supported by the speech engine.".to_string()
            }
            Self::Unknown(code) if code == "unsupported" => {
                "Speech recognition is not supported on this device.".to_string()
            }
            Self::Unknown(code) => format!("Speech recognition error: {code}"),
        }
    }
}

impl fmt::Display for RecognitionErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Event pushed by a native engine
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    /// Engine began capturing
    Started,
    /// Result slots, starting at `result_index`
    Result {
        /// First slot that changed in this event
        result_index: usize,
        /// All slots of the session so far
        results: Vec<ResultSlot>,
    },
    /// Engine failure
    Error(RecognitionErrorKind),
    /// Engine stopped; always the last event of a session
    Ended,
}

/// Engine event tagged with its session
#[derive(Debug, Clone, PartialEq)]
pub struct SessionEvent {
    /// Session that produced the event
    pub session: SessionId,
    /// The event
    pub event: EngineEvent,
}

/// Everything the listener reacts to
#[derive(Debug)]
pub(crate) enum Dispatch {
    Engine(SessionEvent),
    RetryDue(SessionId),
    TimeoutElapsed(u64),
}

/// Channel handed to a backend for one session
#[derive(Debug, Clone)]
pub struct SessionSink {
    session: SessionId,
    tx: mpsc::UnboundedSender<Dispatch>,
}

impl SessionSink {
    pub(crate) const fn new(session: SessionId, tx: mpsc::UnboundedSender<Dispatch>) -> Self {
        Self { session, tx }
    }

    /// Sink whose events are read directly instead of by a listener
    #[must_use]
    pub fn channel(session: SessionId) -> (Self, SessionEvents) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(session, tx), SessionEvents { rx })
    }

    /// Session this sink reports for
    #[must_use]
    pub const fn session(&self) -> SessionId {
        self.session
    }

    /// Push an event; returns `false` once the listener is gone
    pub fn send(&self, event: EngineEvent) -> bool {
        self.tx
            .send(Dispatch::Engine(SessionEvent {
                session: self.session,
                event,
            }))
            .is_ok()
    }

    /// Report that capture began
    pub fn started(&self) -> bool {
        self.send(EngineEvent::Started)
    }

    /// Report result slots
    pub fn result(&self, result_index: usize, results: Vec<ResultSlot>) -> bool {
        self.send(EngineEvent::Result {
            result_index,
            results,
        })
    }

    /// Report an engine failure
    pub fn error(&self, kind: RecognitionErrorKind) -> bool {
        self.send(EngineEvent::Error(kind))
    }

    /// Report the end of the session
    pub fn ended(&self) -> bool {
        self.send(EngineEvent::Ended)
    }
}

/// Receiving end of [`SessionSink::channel`]
#[derive(Debug)]
pub struct SessionEvents {
    rx: mpsc::UnboundedReceiver<Dispatch>,
}

impl SessionEvents {
    /// Next engine event; `None` once every sink is dropped
    pub async fn recv(&mut self) -> Option<SessionEvent> {
        while let Some(dispatch) = self.rx.recv().await {
            if let Dispatch::Engine(event) = dispatch {
                return Some(event);
            }
        }
        None
    }
}

/// Native speech-recognition capability
///
/// Calls return immediately; outcomes arrive later through the sink given to
/// [`RecognitionBackend::start`]. A session always finishes with
/// [`EngineEvent::Ended`] unless it is aborted.
pub trait RecognitionBackend {
    /// Whether the host offers recognition at all
    fn is_supported(&self) -> bool;

    /// Begin a session with the given settings
    ///
    /// # Errors
    ///
    /// Returns error if the engine refuses to start
    fn start(&mut self, settings: &RecognitionSettings, sink: SessionSink) -> Result<()>;

    /// Ask the engine to finish, delivering any pending final result
    fn stop(&mut self);

    /// Tear the session down without results
    ///
    /// # Errors
    ///
    /// Returns error if the engine fails to abort
    fn abort(&mut self) -> Result<()>;
}
