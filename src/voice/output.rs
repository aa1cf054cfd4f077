//! Speech output pipeline
//!
//! [`SpeechOutput`] speaks assistant messages. Text is normalized, its
//! language detected, and the remote voice tried first; any remote failure
//! falls back to the local engine without telling the user. At most one
//! utterance plays at a time: a new request cancels the previous one before
//! anything else happens.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::task::{AbortHandle, JoinHandle};

use super::local::LocalSynthesizer;
use super::normalize::normalize;
use super::playback::{AudioPlayer, PlaybackCancel};
use super::tts::RemoteSynthesizer;
use super::voices::LocalUtterance;
use crate::Language;
use crate::config::SynthesisConfig;
use crate::language::{DEFAULT_DEVANAGARI_THRESHOLD, detect_language_with_threshold};

/// Shown when neither tier could speak a message
pub const PLAYBACK_FAILED_MESSAGE: &str = "Unable to play audio.";

/// Which engine produced the speech
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SynthesisTier {
    /// Remote voice service
    Remote,
    /// Host-native synthesis
    Local,
}

/// Lifecycle of an utterance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    /// Created, synthesis not started
    Pending,
    /// Audio is playing
    Playing,
    /// Finished or stopped
    Ended,
    /// Neither tier could play it
    Failed,
}

/// One outbound playback request
#[derive(Debug, Clone, PartialEq)]
pub struct SpeechUtterance {
    /// Request sequence number
    pub id: u64,
    /// Message being spoken
    pub message_id: String,
    /// Text as written by the assistant
    pub raw_text: String,
    /// Text after [`normalize`]
    pub normalized_text: String,
    /// Language the text is spoken in
    pub detected_language: Language,
    /// Tier currently used
    pub synthesis_tier: SynthesisTier,
    /// Playback lifecycle
    pub playback_state: PlaybackState,
}

/// How a playback request ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackOutcome {
    /// Spoken to the end (or stopped) by the given tier
    Finished(SynthesisTier),
    /// Normalized text was empty, nothing to say
    Skipped,
    /// Neither tier could play; carries the user-facing message
    Failed(String),
    /// Cancelled by a newer request or an explicit stop
    Superseded,
}

/// Output pipeline settings
#[derive(Debug, Clone, PartialEq)]
pub struct OutputSettings {
    /// Try the remote tier first
    pub remote_enabled: bool,
    /// Ceiling on the remote synthesis request
    pub remote_timeout: Duration,
    /// Voice-name substrings preferred by local voice selection
    pub preferred_providers: Vec<String>,
    /// Devanagari share above which text is Hindi
    pub devanagari_threshold: f32,
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            remote_enabled: true,
            remote_timeout: Duration::from_secs(10),
            preferred_providers: vec!["google".to_string()],
            devanagari_threshold: DEFAULT_DEVANAGARI_THRESHOLD,
        }
    }
}

impl From<&SynthesisConfig> for OutputSettings {
    fn from(config: &SynthesisConfig) -> Self {
        Self {
            remote_enabled: config.remote_enabled,
            remote_timeout: Duration::from_secs(config.remote_timeout_secs),
            preferred_providers: config.preferred_providers.clone(),
            devanagari_threshold: config.devanagari_threshold,
        }
    }
}

struct Active {
    utterance: SpeechUtterance,
    task: Option<AbortHandle>,
    cancel: PlaybackCancel,
}

#[derive(Default)]
struct Shared {
    next_id: u64,
    current: Option<Active>,
    last: Option<SpeechUtterance>,
}

/// Handle to a running playback request
pub struct PlaybackHandle {
    id: u64,
    join: JoinHandle<PlaybackOutcome>,
}

impl PlaybackHandle {
    /// Request sequence number
    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }

    /// Wait for the request to end
    pub async fn finished(self) -> PlaybackOutcome {
        match self.join.await {
            Ok(outcome) => outcome,
            Err(e) if e.is_cancelled() => PlaybackOutcome::Superseded,
            Err(e) => {
                tracing::error!(error = %e, "playback task panicked");
                PlaybackOutcome::Failed(PLAYBACK_FAILED_MESSAGE.to_string())
            }
        }
    }
}

/// Speaks messages through a remote voice with local fallback
#[derive(Clone)]
pub struct SpeechOutput {
    remote: Option<Arc<dyn RemoteSynthesizer>>,
    local: Arc<dyn LocalSynthesizer>,
    player: Arc<dyn AudioPlayer>,
    settings: Arc<OutputSettings>,
    shared: Arc<Mutex<Shared>>,
}

impl SpeechOutput {
    /// Create a pipeline; without a remote synthesizer only the local tier is used
    pub fn new(
        remote: Option<Arc<dyn RemoteSynthesizer>>,
        local: Arc<dyn LocalSynthesizer>,
        player: Arc<dyn AudioPlayer>,
        settings: OutputSettings,
    ) -> Self {
        Self {
            remote,
            local,
            player,
            settings: Arc::new(settings),
            shared: Arc::new(Mutex::new(Shared::default())),
        }
    }

    /// Speak a message in the language detected from its text
    ///
    /// Must be called within a Tokio runtime.
    pub fn play_audio(&self, message_id: impl Into<String>, text: &str) -> PlaybackHandle {
        self.play_audio_in(message_id, text, None)
    }

    /// Speak a message, optionally forcing the language
    ///
    /// Must be called within a Tokio runtime.
    pub fn play_audio_in(
        &self,
        message_id: impl Into<String>,
        text: &str,
        language: Option<Language>,
    ) -> PlaybackHandle {
        self.cancel_current();

        let normalized_text = normalize(text);
        let detected_language = language.unwrap_or_else(|| {
            detect_language_with_threshold(&normalized_text, self.settings.devanagari_threshold)
        });
        let message_id = message_id.into();

        let cancel = PlaybackCancel::new();
        let utterance = {
            let mut shared = self.lock();
            shared.next_id += 1;
            let utterance = SpeechUtterance {
                id: shared.next_id,
                message_id,
                raw_text: text.to_string(),
                normalized_text,
                detected_language,
                synthesis_tier: if self.remote_available() {
                    SynthesisTier::Remote
                } else {
                    SynthesisTier::Local
                },
                playback_state: PlaybackState::Pending,
            };
            shared.current = Some(Active {
                utterance: utterance.clone(),
                task: None,
                cancel: cancel.clone(),
            });
            utterance
        };

        tracing::debug!(
            utterance = utterance.id,
            message = %utterance.message_id,
            language = %utterance.detected_language,
            raw_chars = utterance.raw_text.len(),
            chars = utterance.normalized_text.len(),
            "playback requested"
        );

        let id = utterance.id;
        let pipeline = self.clone();
        let join = tokio::spawn(async move { pipeline.run(utterance, cancel).await });

        if let Some(active) = self.lock().current.as_mut().filter(|a| a.utterance.id == id) {
            active.task = Some(join.abort_handle());
        }

        PlaybackHandle { id, join }
    }

    /// Stop any playback and clear every message's playing flag
    ///
    /// Safe to call when nothing is playing.
    pub fn stop_audio(&self) {
        tracing::debug!("stop audio requested");
        self.cancel_current();
    }

    /// Message currently being spoken
    #[must_use]
    pub fn playing_message(&self) -> Option<String> {
        self.lock()
            .current
            .as_ref()
            .map(|a| a.utterance.message_id.clone())
    }

    /// Whether a message is being spoken
    #[must_use]
    pub fn is_audio_playing(&self, message_id: &str) -> bool {
        self.lock()
            .current
            .as_ref()
            .is_some_and(|a| a.utterance.message_id == message_id)
    }

    /// Snapshot of the active utterance
    #[must_use]
    pub fn current_utterance(&self) -> Option<SpeechUtterance> {
        self.lock().current.as_ref().map(|a| a.utterance.clone())
    }

    /// Snapshot of the most recently finished utterance
    #[must_use]
    pub fn last_utterance(&self) -> Option<SpeechUtterance> {
        self.lock().last.clone()
    }

    fn remote_available(&self) -> bool {
        self.settings.remote_enabled && self.remote.is_some()
    }

    fn lock(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Cancel the active utterance on both tiers and release it
    fn cancel_current(&self) {
        let previous = self.lock().current.take();

        if let Some(mut active) = previous {
            tracing::debug!(utterance = active.utterance.id, "cancelling playback");
            active.cancel.cancel();
            if let Some(task) = active.task.take() {
                task.abort();
            }
            active.utterance.playback_state = PlaybackState::Ended;
            self.lock().last = Some(active.utterance);
        }

        self.local.cancel();
    }

    /// Whether `id` is still the active utterance
    fn is_current(&self, id: u64) -> bool {
        self.lock()
            .current
            .as_ref()
            .is_some_and(|a| a.utterance.id == id)
    }

    fn update(&self, id: u64, tier: SynthesisTier, state: PlaybackState) {
        if let Some(active) = self.lock().current.as_mut().filter(|a| a.utterance.id == id) {
            active.utterance.synthesis_tier = tier;
            active.utterance.playback_state = state;
        }
    }

    /// Release the utterance if it is still current
    fn complete(&self, id: u64, state: PlaybackState) {
        let mut shared = self.lock();
        if shared.current.as_ref().is_some_and(|a| a.utterance.id == id) {
            if let Some(mut active) = shared.current.take() {
                active.utterance.playback_state = state;
                shared.last = Some(active.utterance);
            }
        }
    }

    async fn run(&self, utterance: SpeechUtterance, cancel: PlaybackCancel) -> PlaybackOutcome {
        let id = utterance.id;
        let text = utterance.normalized_text;
        let language = utterance.detected_language;

        if text.is_empty() {
            tracing::debug!(utterance = id, "nothing to speak");
            self.complete(id, PlaybackState::Ended);
            return PlaybackOutcome::Skipped;
        }

        if let Some(remote) = self.remote.as_ref().filter(|_| self.settings.remote_enabled) {
            if let Some(audio) = self.fetch_remote(remote.as_ref(), &text, language).await {
                if !self.is_current(id) {
                    return PlaybackOutcome::Superseded;
                }
                self.update(id, SynthesisTier::Remote, PlaybackState::Playing);

                match self.player.play(audio, cancel).await {
                    Ok(()) => {
                        tracing::debug!(utterance = id, "remote playback ended");
                        self.complete(id, PlaybackState::Ended);
                        return PlaybackOutcome::Finished(SynthesisTier::Remote);
                    }
                    Err(e) => {
                        tracing::warn!(utterance = id, error = %e, "remote audio failed, using local voice");
                    }
                }
            }
        }

        if !self.is_current(id) {
            return PlaybackOutcome::Superseded;
        }
        self.update(id, SynthesisTier::Local, PlaybackState::Playing);

        let voices = self.local.voices().await;
        let local = LocalUtterance::new(text, language, &voices, &self.settings.preferred_providers);

        match self.local.speak(&local).await {
            Ok(()) => {
                tracing::debug!(utterance = id, "local playback ended");
                self.complete(id, PlaybackState::Ended);
                PlaybackOutcome::Finished(SynthesisTier::Local)
            }
            Err(e) => {
                tracing::warn!(utterance = id, error = %e, "local synthesis failed");
                self.complete(id, PlaybackState::Failed);
                PlaybackOutcome::Failed(PLAYBACK_FAILED_MESSAGE.to_string())
            }
        }
    }

    /// Remote tier request; `None` means fall back
    async fn fetch_remote(
        &self,
        remote: &dyn RemoteSynthesizer,
        text: &str,
        language: Language,
    ) -> Option<Vec<u8>> {
        let ceiling = self.settings.remote_timeout;

        match tokio::time::timeout(ceiling, remote.synthesize(text, language)).await {
            Ok(Ok(audio)) if !audio.is_empty() => Some(audio),
            Ok(Ok(_)) => {
                tracing::warn!("remote synthesis returned no audio, using local voice");
                None
            }
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "remote synthesis unavailable, using local voice");
                None
            }
            Err(_) => {
                tracing::warn!(timeout = ?ceiling, "remote synthesis timed out, using local voice");
                None
            }
        }
    }
}
