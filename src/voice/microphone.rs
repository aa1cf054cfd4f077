//! Microphone recognition backend
//!
//! Captures from an [`AudioSource`] on a dedicated thread, cuts the stream
//! into utterances, and transcribes each one through the configured STT
//! provider. Each transcribed utterance is reported as a final result.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::watch;

use super::capture::{AudioSource, SAMPLE_RATE, samples_to_wav};
use super::recognition::{
    RecognitionBackend, RecognitionErrorKind, RecognitionSettings, ResultSlot, SessionSink,
};
use super::segmenter::SpeechSegmenter;
use super::stt::Transcriber;
use crate::{Error, Language, Result};

/// How often the capture thread drains the microphone buffer
const POLL_INTERVAL: Duration = Duration::from_millis(100);

struct Control {
    stop: AtomicBool,
    abort: watch::Sender<bool>,
}

impl Control {
    fn abort(&self) {
        self.abort.send_replace(true);
    }
}

struct Worker {
    control: Arc<Control>,
    thread: thread::JoinHandle<()>,
}

/// Recognition backend over a local audio source and a hosted STT service
pub struct MicrophoneRecognizer {
    source: Arc<dyn AudioSource>,
    transcriber: Arc<Transcriber>,
    runtime: Handle,
    no_speech_window: Duration,
    poll_interval: Duration,
    worker: Option<Worker>,
}

impl MicrophoneRecognizer {
    /// Create a recognizer
    ///
    /// Transcription requests run on the current Tokio runtime, which must be
    /// multi-threaded.
    ///
    /// # Errors
    ///
    /// Returns error if called outside a Tokio runtime
    pub fn new(
        source: Arc<dyn AudioSource>,
        transcriber: Transcriber,
        no_speech_window: Duration,
    ) -> Result<Self> {
        let runtime = Handle::try_current()
            .map_err(|e| Error::Recognition(format!("no async runtime: {e}")))?;

        Ok(Self {
            source,
            transcriber: Arc::new(transcriber),
            runtime,
            no_speech_window,
            poll_interval: POLL_INTERVAL,
            worker: None,
        })
    }

    /// Drain the source at a different rate
    #[must_use]
    pub const fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Abort the previous session and wait for its thread
    ///
    /// Bounded by one poll interval: an in-flight transcription is abandoned
    /// as soon as the abort is seen.
    fn retire_worker(&mut self) {
        let Some(worker) = self.worker.take() else {
            return;
        };

        if !worker.thread.is_finished() {
            tracing::debug!("superseding running capture session");
        }
        worker.control.abort();
        if worker.thread.join().is_err() {
            tracing::error!("capture thread panicked");
        }
    }
}

impl RecognitionBackend for MicrophoneRecognizer {
    fn is_supported(&self) -> bool {
        self.source.is_available()
    }

    fn start(&mut self, settings: &RecognitionSettings, sink: SessionSink) -> Result<()> {
        self.retire_worker();

        let (abort_tx, abort_rx) = watch::channel(false);
        let control = Arc::new(Control {
            stop: AtomicBool::new(false),
            abort: abort_tx,
        });
        let job = Job {
            source: Arc::clone(&self.source),
            transcriber: Arc::clone(&self.transcriber),
            runtime: self.runtime.clone(),
            language: settings.language,
            no_speech_window: self.no_speech_window,
            poll_interval: self.poll_interval,
            control: Arc::clone(&control),
            aborted: abort_rx,
            sink,
        };

        let thread = thread::Builder::new()
            .name("sathi-microphone".to_string())
            .spawn(move || job.run())
            .map_err(|e| Error::Recognition(format!("failed to spawn capture thread: {e}")))?;

        self.worker = Some(Worker { control, thread });
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(worker) = &self.worker {
            worker.control.stop.store(true, Ordering::SeqCst);
        }
    }

    fn abort(&mut self) -> Result<()> {
        if let Some(worker) = &self.worker {
            worker.control.abort();
        }
        Ok(())
    }
}

impl Drop for MicrophoneRecognizer {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.take() {
            worker.control.abort();
        }
    }
}

/// Outcome of handing one utterance to the transcriber
enum Delivery {
    Continue,
    Failed,
    Aborted,
}

/// One recognition session on the capture thread
struct Job {
    source: Arc<dyn AudioSource>,
    transcriber: Arc<Transcriber>,
    runtime: Handle,
    language: Language,
    no_speech_window: Duration,
    poll_interval: Duration,
    control: Arc<Control>,
    aborted: watch::Receiver<bool>,
    sink: SessionSink,
}

impl Job {
    fn is_aborted(&self) -> bool {
        *self.aborted.borrow()
    }

    fn run(self) {
        let session = self.sink.session();

        let mut stream = match self.source.open() {
            Ok(stream) => stream,
            Err(e) => {
                tracing::warn!(%session, error = %e, "microphone unavailable");
                self.sink.error(RecognitionErrorKind::AudioCaptureUnavailable);
                self.sink.ended();
                return;
            }
        };

        self.sink.started();
        tracing::debug!(%session, language = %self.language, "microphone session started");

        let mut segmenter = SpeechSegmenter::default();
        let mut results = Vec::new();

        loop {
            thread::sleep(self.poll_interval);

            if self.is_aborted() {
                self.sink.error(RecognitionErrorKind::Aborted);
                break;
            }

            let samples = stream.read();

            if self.control.stop.load(Ordering::SeqCst) {
                if let Some(segment) = segmenter.push(&samples).or_else(|| segmenter.flush()) {
                    if matches!(self.deliver(&segment, &mut results), Delivery::Aborted) {
                        self.sink.error(RecognitionErrorKind::Aborted);
                    }
                }
                break;
            }

            if let Some(segment) = segmenter.push(&samples) {
                match self.deliver(&segment, &mut results) {
                    Delivery::Continue => continue,
                    Delivery::Failed => break,
                    Delivery::Aborted => {
                        self.sink.error(RecognitionErrorKind::Aborted);
                        break;
                    }
                }
            }

            if !segmenter.heard_speech() && segmenter.silent_for() >= self.no_speech_window {
                self.sink.error(RecognitionErrorKind::NoSpeech);
                break;
            }
        }

        drop(stream);
        self.sink.ended();
        tracing::debug!(%session, "microphone session ended");
    }

    /// Transcribe a segment and report it
    fn deliver(&self, segment: &[f32], results: &mut Vec<ResultSlot>) -> Delivery {
        let wav = match samples_to_wav(segment, SAMPLE_RATE) {
            Ok(wav) => wav,
            Err(e) => {
                tracing::error!(error = %e, "failed to encode utterance");
                self.sink
                    .error(RecognitionErrorKind::Unknown("audio-encoding".to_string()));
                return Delivery::Failed;
            }
        };

        let mut aborted = self.aborted.clone();
        let transcript = self.runtime.block_on(async {
            tokio::select! {
                result = self.transcriber.transcribe(&wav, self.language) => Some(result),
                _ = aborted.wait_for(|aborted| *aborted) => None,
            }
        });

        match transcript {
            None => {
                tracing::debug!("transcription abandoned");
                Delivery::Aborted
            }
            Some(Ok(transcript)) if transcript.text.is_empty() => {
                tracing::debug!("empty transcript, still listening");
                Delivery::Continue
            }
            Some(Ok(transcript)) => {
                results.push(ResultSlot::final_result(transcript.text, transcript.confidence));
                self.sink.result(results.len() - 1, results.clone());
                Delivery::Continue
            }
            Some(Err(e)) => {
                tracing::warn!(error = %e, "transcription failed");
                self.sink.error(RecognitionErrorKind::NetworkError);
                Delivery::Failed
            }
        }
    }
}
