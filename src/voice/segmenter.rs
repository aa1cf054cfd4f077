//! Energy-based speech segmentation
//!
//! Splits the microphone stream into utterances: speech starts when RMS
//! energy crosses a threshold and ends after a stretch of silence.

use super::capture::SAMPLE_RATE;

/// RMS energy above which a chunk counts as speech
pub const ENERGY_THRESHOLD: f32 = 0.03;

/// Minimum utterance length (0.3s at 16kHz)
const MIN_SPEECH_SAMPLES: usize = 4800;

/// Trailing silence that ends an utterance (0.8s at 16kHz)
const END_SILENCE_SAMPLES: usize = 12800;

/// Segmenter state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmenterState {
    /// Waiting for speech
    Waiting,
    /// Accumulating an utterance
    Speaking,
}

/// Splits captured audio into speech segments
#[derive(Debug)]
pub struct SpeechSegmenter {
    threshold: f32,
    state: SegmenterState,
    speech: Vec<f32>,
    silence: usize,
    heard_speech: bool,
    idle_samples: usize,
}

impl Default for SpeechSegmenter {
    fn default() -> Self {
        Self::new(ENERGY_THRESHOLD)
    }
}

impl SpeechSegmenter {
    /// Create a segmenter with the given RMS threshold
    #[must_use]
    pub const fn new(threshold: f32) -> Self {
        Self {
            threshold,
            state: SegmenterState::Waiting,
            speech: Vec::new(),
            silence: 0,
            heard_speech: false,
            idle_samples: 0,
        }
    }

    /// Feed a chunk; returns a finished utterance when one completes
    pub fn push(&mut self, samples: &[f32]) -> Option<Vec<f32>> {
        if samples.is_empty() {
            return None;
        }

        let energy = rms_energy(samples);
        let is_speech = energy > self.threshold;

        match self.state {
            SegmenterState::Waiting => {
                if is_speech {
                    tracing::trace!(energy, "speech started");
                    self.state = SegmenterState::Speaking;
                    self.heard_speech = true;
                    self.speech.clear();
                    self.speech.extend_from_slice(samples);
                    self.silence = 0;
                } else {
                    self.idle_samples += samples.len();
                }
                None
            }
            SegmenterState::Speaking => {
                self.speech.extend_from_slice(samples);
                if is_speech {
                    self.silence = 0;
                } else {
                    self.silence += samples.len();
                }

                if self.silence <= END_SILENCE_SAMPLES {
                    return None;
                }

                let segment = self.take_segment();
                if segment.is_none() {
                    tracing::trace!("blip too short, discarded");
                }
                segment
            }
        }
    }

    /// End of input: return the utterance in progress, if long enough
    pub fn flush(&mut self) -> Option<Vec<f32>> {
        match self.state {
            SegmenterState::Speaking => self.take_segment(),
            SegmenterState::Waiting => None,
        }
    }

    /// Whether any chunk so far crossed the threshold
    #[must_use]
    pub const fn heard_speech(&self) -> bool {
        self.heard_speech
    }

    /// Time spent waiting without ever hearing speech
    #[must_use]
    pub fn silent_for(&self) -> std::time::Duration {
        if self.heard_speech {
            return std::time::Duration::ZERO;
        }
        std::time::Duration::from_millis(self.idle_samples as u64 * 1000 / u64::from(SAMPLE_RATE))
    }

    /// Current state
    #[must_use]
    pub const fn state(&self) -> SegmenterState {
        self.state
    }

    fn take_segment(&mut self) -> Option<Vec<f32>> {
        let voiced = self.speech.len().saturating_sub(self.silence);
        self.state = SegmenterState::Waiting;
        self.silence = 0;
        let speech = std::mem::take(&mut self.speech);
        (voiced > MIN_SPEECH_SAMPLES).then_some(speech)
    }
}

/// RMS energy of a chunk
#[allow(clippy::cast_precision_loss)]
#[must_use]
pub fn rms_energy(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }

    let sum_squares: f32 = samples.iter().map(|s| s * s).sum();
    (sum_squares / samples.len() as f32).sqrt()
}
