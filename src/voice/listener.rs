//! Speech capture engine
//!
//! [`SpeechCapture`] turns the push-style event stream of a
//! [`RecognitionBackend`] into a `start_listening` / `stop_listening`
//! contract. It retries a few times when the engine hears nothing, puts a
//! hard ceiling on how long one interaction may listen, and delivers only
//! final transcripts.
//!
//! ```text
//! Idle ──start──▶ Listening ──final result / stop / timeout / error──▶ Idle
//!                    │  ▲
//!                    └──┘ no-speech with retries left
//! ```

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::recognition::{
    Dispatch, EngineEvent, RecognitionBackend, RecognitionErrorKind, RecognitionSettings,
    ResultSlot, SessionEvent, SessionId, SessionSink, TranscriptEvent,
};
use crate::Language;
use crate::config::RecognitionConfig;

/// Shown when the engine refuses to start
pub const START_FAILED_MESSAGE: &str = "Failed to start voice recognition.";

/// Shown when the listening ceiling passes without a transcript
pub const TIMEOUT_MESSAGE: &str = "No speech detected in time. Please try again.";

/// Listening state visible to callers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenState {
    /// No session
    Idle,
    /// Session active (including a pending no-speech restart)
    Listening,
    /// Stop requested, waiting for the engine to end
    Stopping,
}

/// Retry and timeout policy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturePolicy {
    /// Delay before restarting after a no-speech error
    pub retry_delay: Duration,
    /// Automatic restarts allowed per interaction
    pub max_retries: u32,
    /// Hard ceiling on one listening interaction
    pub session_timeout: Duration,
}

impl Default for CapturePolicy {
    fn default() -> Self {
        Self {
            retry_delay: Duration::from_millis(400),
            max_retries: 3,
            session_timeout: Duration::from_secs(15),
        }
    }
}

impl From<&RecognitionConfig> for CapturePolicy {
    fn from(config: &RecognitionConfig) -> Self {
        Self {
            retry_delay: Duration::from_millis(config.retry_delay_ms),
            max_retries: config.max_retries,
            session_timeout: Duration::from_secs(config.session_timeout_secs),
        }
    }
}

type Callback = Box<dyn FnMut(String)>;

/// Listening controller over a recognition backend
pub struct SpeechCapture<B: RecognitionBackend> {
    backend: B,
    supported: bool,
    policy: CapturePolicy,
    language: Language,
    on_result: Callback,
    on_error: Callback,

    state: ListenState,
    next_session: u64,
    active: Option<SessionId>,
    native_running: bool,
    interaction: u64,
    retry_count: u32,
    manually_stopped: bool,
    result_obtained: bool,
    timed_out: bool,
    retry_timer: Option<JoinHandle<()>>,
    timeout_timer: Option<JoinHandle<()>>,

    tx: mpsc::UnboundedSender<Dispatch>,
    rx: mpsc::UnboundedReceiver<Dispatch>,
}

impl<B: RecognitionBackend> SpeechCapture<B> {
    /// Create a capture engine
    ///
    /// `on_result` receives trimmed final transcripts; `on_error` receives
    /// user-facing messages. Support is probed once here.
    pub fn new(
        backend: B,
        language: Language,
        on_result: impl FnMut(String) + 'static,
        on_error: impl FnMut(String) + 'static,
    ) -> Self {
        let supported = backend.is_supported();
        let (tx, rx) = mpsc::unbounded_channel();

        Self {
            backend,
            supported,
            policy: CapturePolicy::default(),
            language,
            on_result: Box::new(on_result),
            on_error: Box::new(on_error),
            state: ListenState::Idle,
            next_session: 1,
            active: None,
            native_running: false,
            interaction: 0,
            retry_count: 0,
            manually_stopped: false,
            result_obtained: false,
            timed_out: false,
            retry_timer: None,
            timeout_timer: None,
            tx,
            rx,
        }
    }

    /// Replace the retry and timeout policy
    #[must_use]
    pub fn with_policy(mut self, policy: CapturePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Whether the host offers speech recognition
    #[must_use]
    pub const fn is_supported(&self) -> bool {
        self.supported
    }

    /// Whether a session is active
    #[must_use]
    pub fn is_listening(&self) -> bool {
        self.state == ListenState::Listening
    }

    /// Current state
    #[must_use]
    pub const fn state(&self) -> ListenState {
        self.state
    }

    /// Automatic restarts used in the current interaction
    #[must_use]
    pub const fn retry_count(&self) -> u32 {
        self.retry_count
    }

    /// Language used for the next session
    #[must_use]
    pub const fn language(&self) -> Language {
        self.language
    }

    /// Change the language; takes effect at the next start
    pub const fn set_language(&mut self, language: Language) {
        self.language = language;
    }

    /// Borrow the backend
    #[must_use]
    pub const fn backend(&self) -> &B {
        &self.backend
    }

    /// Start listening
    ///
    /// A no-op while already listening. Reports through `on_error` when the
    /// host has no recognizer.
    pub fn start_listening(&mut self) {
        if !self.supported {
            tracing::debug!("speech recognition unsupported");
            self.surface(&RecognitionErrorKind::unsupported());
            return;
        }

        match self.state {
            ListenState::Listening => {
                tracing::warn!(session = ?self.active, "already listening, ignoring start");
                return;
            }
            ListenState::Stopping => self.abort_native(),
            ListenState::Idle => {}
        }

        self.interaction += 1;
        self.retry_count = 0;
        self.manually_stopped = false;
        self.result_obtained = false;
        self.timed_out = false;
        self.clear_timers();

        self.begin_session();
    }

    /// Stop listening
    ///
    /// Cooperative: the engine acknowledges later with its end event, so the
    /// state passes through [`ListenState::Stopping`]. Cancels a pending
    /// no-speech restart.
    pub fn stop_listening(&mut self) {
        if self.state != ListenState::Listening {
            return;
        }

        tracing::debug!(session = ?self.active, "stop requested");
        self.manually_stopped = true;
        self.clear_timers();

        if self.native_running {
            self.backend.stop();
            self.state = ListenState::Stopping;
        } else {
            self.finish();
        }
    }

    /// Wait for the next event and handle it
    pub async fn process_next(&mut self) {
        if let Some(dispatch) = self.rx.recv().await {
            self.dispatch(dispatch);
        }
    }

    /// Handle every event that is already queued, returning how many ran
    pub fn process_pending(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(dispatch) = self.rx.try_recv() {
            self.dispatch(dispatch);
            handled += 1;
        }
        handled
    }

    /// Handle events until the engine is idle
    pub async fn run_until_idle(&mut self) {
        while self.state != ListenState::Idle {
            self.process_next().await;
        }
    }

    /// Cancel timers and abort any session; never fails
    pub fn dispose(&mut self) {
        self.clear_timers();
        if self.native_running || self.active.is_some() {
            self.abort_native();
        }
        self.active = None;
        self.state = ListenState::Idle;
    }

    fn dispatch(&mut self, dispatch: Dispatch) {
        match dispatch {
            Dispatch::Engine(SessionEvent { session, event }) => {
                if self.active != Some(session) {
                    tracing::trace!(%session, ?event, "ignoring event from stale session");
                    return;
                }
                self.handle_engine_event(session, event);
            }
            Dispatch::RetryDue(session) => self.handle_retry_due(session),
            Dispatch::TimeoutElapsed(interaction) => self.handle_timeout(interaction),
        }
    }

    fn handle_engine_event(&mut self, session: SessionId, event: EngineEvent) {
        match event {
            EngineEvent::Started => {
                tracing::debug!(%session, "recognition started");
                if self.state == ListenState::Listening && self.timeout_timer.is_none() {
                    self.arm_timeout();
                }
            }
            EngineEvent::Result {
                result_index,
                results,
            } => self.handle_results(session, result_index, &results),
            EngineEvent::Error(kind) => self.handle_error(session, kind),
            EngineEvent::Ended => {
                tracing::debug!(%session, "recognition ended");
                self.native_running = false;
                if self.retry_timer.is_some() {
                    return;
                }
                self.finish();
            }
        }
    }

    fn handle_results(&mut self, session: SessionId, result_index: usize, results: &[ResultSlot]) {
        if let Some(interim) = TranscriptEvent::collect(results, result_index, false) {
            tracing::trace!(%session, preview = %interim.text, "interim transcript");
        }

        if self.result_obtained || self.timed_out {
            return;
        }

        let Some(transcript) = TranscriptEvent::collect(results, result_index, true) else {
            return;
        };

        tracing::debug!(
            %session,
            confidence = transcript.confidence,
            chars = transcript.text.len(),
            "final transcript"
        );

        self.result_obtained = true;
        self.retry_count = 0;
        self.clear_timers();
        (self.on_result)(transcript.text);

        if self.state == ListenState::Listening && self.native_running {
            self.backend.stop();
            self.state = ListenState::Stopping;
        }
    }

    fn handle_error(&mut self, session: SessionId, kind: RecognitionErrorKind) {
        tracing::debug!(%session, error = %kind, retries = self.retry_count, "recognition error");

        let suppressed = self.timed_out
            || (self.manually_stopped && kind == RecognitionErrorKind::NoSpeech)
            || (self.result_obtained
                && matches!(kind, RecognitionErrorKind::Aborted | RecognitionErrorKind::NoSpeech));

        if kind == RecognitionErrorKind::NoSpeech && !suppressed {
            if self.retry_count < self.policy.max_retries {
                self.retry_count += 1;
                tracing::debug!(
                    %session,
                    attempt = self.retry_count,
                    max = self.policy.max_retries,
                    "no speech, restarting"
                );
                self.schedule_retry(session);
                return;
            }
            tracing::debug!(%session, "no-speech retries exhausted");
        }

        if !suppressed {
            self.surface(&kind);
        }
        self.finish();
    }

    fn handle_retry_due(&mut self, session: SessionId) {
        if self.active != Some(session)
            || self.manually_stopped
            || self.state != ListenState::Listening
        {
            tracing::trace!(%session, "ignoring stale retry");
            return;
        }

        self.retry_timer = None;
        if self.native_running {
            self.abort_native();
        }
        self.begin_session();
    }

    fn handle_timeout(&mut self, interaction: u64) {
        if interaction != self.interaction || self.state != ListenState::Listening {
            tracing::trace!(interaction, "ignoring stale timeout");
            return;
        }

        tracing::debug!(session = ?self.active, "listening timed out");
        self.timeout_timer = None;
        self.timed_out = true;
        self.clear_timers();

        if !self.result_obtained {
            (self.on_error)(TIMEOUT_MESSAGE.to_string());
        }

        if self.native_running {
            self.backend.stop();
            self.state = ListenState::Stopping;
        } else {
            self.finish();
        }
    }

    fn begin_session(&mut self) {
        let session = SessionId(self.next_session);
        self.next_session += 1;

        let settings = RecognitionSettings::for_language(self.language);
        let sink = SessionSink::new(session, self.tx.clone());

        match self.backend.start(&settings, sink) {
            Ok(()) => {
                tracing::debug!(%session, lang = %settings.lang_tag, "recognition session created");
                self.active = Some(session);
                self.native_running = true;
                self.state = ListenState::Listening;
            }
            Err(e) => {
                tracing::warn!(%session, error = %e, "failed to start recognition");
                self.clear_timers();
                self.active = None;
                self.native_running = false;
                self.state = ListenState::Idle;
                (self.on_error)(START_FAILED_MESSAGE.to_string());
            }
        }
    }

    fn schedule_retry(&mut self, session: SessionId) {
        if let Some(timer) = self.retry_timer.take() {
            timer.abort();
        }

        let tx = self.tx.clone();
        let delay = self.policy.retry_delay;
        self.retry_timer = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(Dispatch::RetryDue(session));
        }));
    }

    fn arm_timeout(&mut self) {
        let tx = self.tx.clone();
        let ceiling = self.policy.session_timeout;
        let interaction = self.interaction;
        self.timeout_timer = Some(tokio::spawn(async move {
            tokio::time::sleep(ceiling).await;
            let _ = tx.send(Dispatch::TimeoutElapsed(interaction));
        }));
    }

    fn clear_timers(&mut self) {
        if let Some(timer) = self.retry_timer.take() {
            timer.abort();
        }
        if let Some(timer) = self.timeout_timer.take() {
            timer.abort();
        }
    }

    fn finish(&mut self) {
        self.clear_timers();
        self.active = None;
        self.native_running = false;
        self.state = ListenState::Idle;
    }

    fn abort_native(&mut self) {
        if let Err(e) = self.backend.abort() {
            tracing::debug!(error = %e, "abort failed, ignoring");
        }
        self.native_running = false;
    }

    fn surface(&mut self, kind: &RecognitionErrorKind) {
        let message = kind.user_message();
        tracing::debug!(error = %kind, message = %message, "reporting recognition error");
        (self.on_error)(message);
    }
}

impl<B: RecognitionBackend> Drop for SpeechCapture<B> {
    fn drop(&mut self) {
        self.dispose();
    }
}
