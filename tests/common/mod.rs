//! Shared test utilities

#![allow(dead_code)]

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use sathi_voice::voice::{
    AudioPlayer, LocalSynthesizer, LocalUtterance, PlaybackCancel, RecognitionBackend,
    RecognitionSettings, RemoteSynthesizer, SessionSink, VoiceDescriptor,
};
use sathi_voice::{Error, Language, Result};

/// Collects callback invocations
#[derive(Clone, Default)]
pub struct Recorder(Rc<RefCell<Vec<String>>>);

impl Recorder {
    /// Callback that appends to this recorder
    pub fn callback(&self) -> impl FnMut(String) + 'static {
        let inner = Rc::clone(&self.0);
        move |value| inner.borrow_mut().push(value)
    }

    /// Everything recorded so far
    pub fn values(&self) -> Vec<String> {
        self.0.borrow().clone()
    }
}

/// Recognition backend driven by the test through its sinks
pub struct FakeBackend {
    pub supported: bool,
    pub fail_start: bool,
    /// Report `Started` as soon as a session begins
    pub auto_start: bool,
    /// Report `Ended` when asked to stop
    pub end_on_stop: bool,
    pub starts: Vec<RecognitionSettings>,
    pub sinks: Vec<SessionSink>,
    pub stops: usize,
    pub aborts: usize,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self {
            supported: true,
            fail_start: false,
            auto_start: true,
            end_on_stop: true,
            starts: Vec::new(),
            sinks: Vec::new(),
            stops: 0,
            aborts: 0,
        }
    }

    pub fn unsupported() -> Self {
        Self {
            supported: false,
            ..Self::new()
        }
    }

    /// Sink of the most recent session
    pub fn sink(&self) -> &SessionSink {
        self.sinks.last().expect("no session started")
    }
}

impl RecognitionBackend for FakeBackend {
    fn is_supported(&self) -> bool {
        self.supported
    }

    fn start(&mut self, settings: &RecognitionSettings, sink: SessionSink) -> Result<()> {
        if self.fail_start {
            return Err(Error::Recognition("engine busy".to_string()));
        }
        self.starts.push(settings.clone());
        if self.auto_start {
            sink.started();
        }
        self.sinks.push(sink);
        Ok(())
    }

    fn stop(&mut self) {
        self.stops += 1;
        if self.end_on_stop {
            if let Some(sink) = self.sinks.last() {
                sink.ended();
            }
        }
    }

    fn abort(&mut self) -> Result<()> {
        self.aborts += 1;
        Err(Error::Recognition("abort is best effort".to_string()))
    }
}

/// How the fake remote voice responds
#[derive(Clone)]
pub enum RemoteBehavior {
    Audio(Vec<u8>),
    Empty,
    Fail,
    Hang,
}

/// Remote synthesizer recording what it was asked to say
pub struct FakeRemote {
    behavior: RemoteBehavior,
    pub calls: Mutex<Vec<(String, Language)>>,
}

impl FakeRemote {
    pub fn new(behavior: RemoteBehavior) -> Self {
        Self {
            behavior,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<(String, Language)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl RemoteSynthesizer for FakeRemote {
    async fn synthesize(&self, text: &str, language: Language) -> Result<Vec<u8>> {
        self.calls.lock().unwrap().push((text.to_string(), language));
        match &self.behavior {
            RemoteBehavior::Audio(audio) => Ok(audio.clone()),
            RemoteBehavior::Empty => Ok(Vec::new()),
            RemoteBehavior::Fail => Err(Error::Tts("remote TTS error 503".to_string())),
            RemoteBehavior::Hang => {
                std::future::pending::<()>().await;
                unreachable!()
            }
        }
    }
}

/// Player that "plays" for a fixed time
///
/// Sound comes from a detached task, the way a real device keeps going after
/// the caller stops waiting, so only the cancel token can silence it.
pub struct FakePlayer {
    duration: Duration,
    fail: bool,
    pub plays: AtomicUsize,
    pub tokens: Mutex<Vec<PlaybackCancel>>,
    sounding: Arc<AtomicUsize>,
    overlaps: Arc<AtomicUsize>,
}

impl FakePlayer {
    pub fn new(duration: Duration) -> Self {
        Self {
            duration,
            fail: false,
            plays: AtomicUsize::new(0),
            tokens: Mutex::new(Vec::new()),
            sounding: Arc::new(AtomicUsize::new(0)),
            overlaps: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new(Duration::ZERO)
        }
    }

    pub fn plays(&self) -> usize {
        self.plays.load(Ordering::SeqCst)
    }

    /// Plays whose token has been cancelled
    pub fn cancelled(&self) -> usize {
        self.tokens
            .lock()
            .unwrap()
            .iter()
            .filter(|t| t.is_cancelled())
            .count()
    }

    /// Times a clip started while another was still sounding
    pub fn overlaps(&self) -> usize {
        self.overlaps.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AudioPlayer for FakePlayer {
    async fn play(&self, _audio: Vec<u8>, cancel: PlaybackCancel) -> Result<()> {
        self.plays.fetch_add(1, Ordering::SeqCst);
        self.tokens.lock().unwrap().push(cancel.clone());
        if self.fail {
            return Err(Error::Audio("decode failed".to_string()));
        }

        let duration = self.duration;
        let sounding = Arc::clone(&self.sounding);
        let overlaps = Arc::clone(&self.overlaps);
        let device = tokio::spawn(async move {
            if cancel.is_cancelled() {
                return;
            }
            if sounding.fetch_add(1, Ordering::SeqCst) > 0 {
                overlaps.fetch_add(1, Ordering::SeqCst);
            }
            tokio::select! {
                () = tokio::time::sleep(duration) => {}
                () = cancel.cancelled() => {}
            }
            sounding.fetch_sub(1, Ordering::SeqCst);
        });

        let _ = device.await;
        Ok(())
    }
}

/// Local synthesizer recording utterances
pub struct FakeLocal {
    voices: Vec<VoiceDescriptor>,
    duration: Duration,
    fail: bool,
    pub spoken: Mutex<Vec<LocalUtterance>>,
    pub cancels: AtomicUsize,
}

impl FakeLocal {
    pub fn new(duration: Duration) -> Self {
        Self {
            voices: vec![
                VoiceDescriptor::new("Google हिन्दी", "hi-IN", false),
                VoiceDescriptor::new("Lekha", "hi-IN", true),
                VoiceDescriptor::new("Rishi", "en-IN", true),
                VoiceDescriptor::new("Samantha", "en-US", true),
            ],
            duration,
            fail: false,
            spoken: Mutex::new(Vec::new()),
            cancels: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new(Duration::ZERO)
        }
    }

    pub fn spoken(&self) -> Vec<LocalUtterance> {
        self.spoken.lock().unwrap().clone()
    }
}

#[async_trait]
impl LocalSynthesizer for FakeLocal {
    async fn voices(&self) -> Vec<VoiceDescriptor> {
        self.voices.clone()
    }

    async fn speak(&self, utterance: &LocalUtterance) -> Result<()> {
        self.spoken.lock().unwrap().push(utterance.clone());
        if self.fail {
            return Err(Error::Synthesis("voice not installed".to_string()));
        }
        tokio::time::sleep(self.duration).await;
        Ok(())
    }

    fn cancel(&self) {
        self.cancels.fetch_add(1, Ordering::SeqCst);
    }
}
