//! Voice interaction
//!
//! Speech capture ([`SpeechCapture`] over a [`RecognitionBackend`]) and
//! speech output ([`SpeechOutput`]: normalization, language detection,
//! remote synthesis with local fallback).

mod capture;
mod listener;
mod local;
mod microphone;
mod normalize;
mod output;
mod playback;
mod recognition;
mod segmenter;
mod stt;
mod tts;
mod voices;

#[cfg(feature = "audio")]
pub use capture::{AudioCapture, Microphone};
pub use capture::{AudioSource, SAMPLE_RATE, SampleStream, samples_to_wav};
pub use listener::{CapturePolicy, ListenState, START_FAILED_MESSAGE, SpeechCapture, TIMEOUT_MESSAGE};
pub use local::{EspeakSynthesizer, LocalSynthesizer, parse_voice_list};
pub use microphone::MicrophoneRecognizer;
pub use normalize::{ends_with_terminator, normalize};
pub use output::{
    OutputSettings, PLAYBACK_FAILED_MESSAGE, PlaybackHandle, PlaybackOutcome, PlaybackState,
    SpeechOutput, SpeechUtterance, SynthesisTier,
};
pub use playback::{AudioPlayer, PlaybackCancel};
#[cfg(feature = "audio")]
pub use playback::SpeakerPlayer;
pub use recognition::{
    EngineEvent, RecognitionBackend, RecognitionErrorKind, RecognitionSettings, ResultSlot,
    SessionEvent, SessionEvents, SessionId, SessionSink, TranscriptEvent,
};
pub use segmenter::{ENERGY_THRESHOLD, SegmenterState, SpeechSegmenter, rms_energy};
pub use stt::{Transcriber, Transcript};
pub use tts::{HttpSynthesizer, RemoteSynthesizer};
pub use voices::{
    ENGLISH_RATE, HINDI_RATE, LocalUtterance, VoiceDescriptor, select_voice, speaking_rate,
};
