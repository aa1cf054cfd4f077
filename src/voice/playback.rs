//! Audio playback of remote synthesis output

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::watch;

use crate::Result;

/// Cancellation for one utterance's playback
///
/// Clones share state. Once cancelled it stays cancelled.
#[derive(Debug, Clone)]
pub struct PlaybackCancel(Arc<watch::Sender<bool>>);

impl PlaybackCancel {
    /// A token that is not cancelled
    #[must_use]
    pub fn new() -> Self {
        Self(Arc::new(watch::channel(false).0))
    }

    /// Stop the playback this token was handed to
    pub fn cancel(&self) {
        self.0.send_replace(true);
    }

    /// Whether [`PlaybackCancel::cancel`] was called
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        *self.0.borrow()
    }

    /// Resolve once cancelled
    pub async fn cancelled(&self) {
        let mut rx = self.0.subscribe();
        // The sender lives as long as `self`
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }
}

impl Default for PlaybackCancel {
    fn default() -> Self {
        Self::new()
    }
}

/// Plays encoded audio returned by the remote voice service
#[async_trait]
pub trait AudioPlayer: Send + Sync {
    /// Play MP3 bytes, resolving when playback ends
    ///
    /// Must not start sound once `cancel` is set, and resolves normally when
    /// it is set mid-playback.
    ///
    /// # Errors
    ///
    /// Returns error if the audio cannot be decoded or played
    async fn play(&self, audio: Vec<u8>, cancel: PlaybackCancel) -> Result<()>;
}

#[cfg(feature = "audio")]
pub use speaker::SpeakerPlayer;

#[cfg(feature = "audio")]
mod speaker {
    use std::io::Cursor;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::{Duration, Instant};

    use async_trait::async_trait;
    use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
    use cpal::{SampleRate, StreamConfig};

    use super::{AudioPlayer, PlaybackCancel};
    use crate::{Error, Result};

    /// Decoded mono audio
    pub(super) struct DecodedAudio {
        pub samples: Vec<f32>,
        pub sample_rate: u32,
    }

    /// Plays MP3 audio to the default output device
    #[derive(Debug, Default)]
    pub struct SpeakerPlayer;

    impl SpeakerPlayer {
        /// Create a speaker player
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }
    }

    #[async_trait]
    impl AudioPlayer for SpeakerPlayer {
        async fn play(&self, audio: Vec<u8>, cancel: PlaybackCancel) -> Result<()> {
            if cancel.is_cancelled() {
                tracing::debug!("playback cancelled before start");
                return Ok(());
            }

            let decoded = decode_mp3(&audio)?;

            tokio::task::spawn_blocking(move || play_blocking(&decoded, &cancel))
                .await
                .map_err(|e| Error::Audio(format!("playback task failed: {e}")))?
        }
    }

    /// Play samples until they run out or playback is cancelled
    fn play_blocking(audio: &DecodedAudio, cancel: &PlaybackCancel) -> Result<()> {
        if audio.samples.is_empty() || cancel.is_cancelled() {
            return Ok(());
        }

        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| Error::Audio("no output device available".to_string()))?;

        let rate = SampleRate(audio.sample_rate);
        let supported_config = device
            .supported_output_configs()
            .map_err(|e| Error::Audio(e.to_string()))?
            .find(|c| c.channels() == 1 && c.min_sample_rate() <= rate && c.max_sample_rate() >= rate)
            .or_else(|| {
                // Fallback: try stereo
                device.supported_output_configs().ok()?.find(|c| {
                    c.channels() == 2 && c.min_sample_rate() <= rate && c.max_sample_rate() >= rate
                })
            })
            .ok_or_else(|| Error::Audio("no suitable output config found".to_string()))?;

        let config: StreamConfig = supported_config.with_sample_rate(rate).config();
        let channels = config.channels as usize;

        let samples = Arc::new(audio.samples.clone());
        let position = Arc::new(AtomicUsize::new(0));
        let failed = Arc::new(Mutex::new(None::<String>));

        let stream_samples = Arc::clone(&samples);
        let stream_position = Arc::clone(&position);
        let stream_failed = Arc::clone(&failed);

        let stream = device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    for frame in data.chunks_mut(channels) {
                        let pos = stream_position.load(Ordering::Relaxed);
                        let sample = stream_samples.get(pos).copied().unwrap_or(0.0);
                        frame.fill(sample);
                        if pos < stream_samples.len() {
                            stream_position.store(pos + 1, Ordering::Relaxed);
                        }
                    }
                },
                move |err| {
                    tracing::error!(error = %err, "audio playback error");
                    if let Ok(mut slot) = stream_failed.lock() {
                        *slot = Some(err.to_string());
                    }
                },
                None,
            )
            .map_err(|e| Error::Audio(e.to_string()))?;

        stream.play().map_err(|e| Error::Audio(e.to_string()))?;

        let duration_ms = (samples.len() as u64 * 1000) / u64::from(audio.sample_rate);
        let deadline = Instant::now() + Duration::from_millis(duration_ms + 500);

        while position.load(Ordering::Relaxed) < samples.len() {
            if cancel.is_cancelled() {
                tracing::debug!("playback stopped");
                return Ok(());
            }
            if let Some(err) = failed.lock().ok().and_then(|mut slot| slot.take()) {
                return Err(Error::Audio(err));
            }
            if Instant::now() > deadline {
                break;
            }
            std::thread::sleep(Duration::from_millis(50));
        }

        // Small delay to ensure audio finishes
        std::thread::sleep(Duration::from_millis(100));
        drop(stream);
        tracing::debug!(samples = samples.len(), "playback complete");

        Ok(())
    }

    /// Decode MP3 bytes to mono f32 samples
    pub(super) fn decode_mp3(mp3_data: &[u8]) -> Result<DecodedAudio> {
        let mut decoder = minimp3::Decoder::new(Cursor::new(mp3_data));
        let mut samples = Vec::new();
        let mut sample_rate = 0;

        loop {
            match decoder.next_frame() {
                Ok(frame) => {
                    #[allow(clippy::cast_sign_loss)]
                    {
                        sample_rate = frame.sample_rate as u32;
                    }
                    if frame.channels == 2 {
                        samples.extend(frame.data.chunks(2).map(|chunk| {
                            let left = f32::from(chunk[0]) / 32768.0;
                            let right =
                                f32::from(chunk.get(1).copied().unwrap_or(chunk[0])) / 32768.0;
                            f32::midpoint(left, right)
                        }));
                    } else {
                        samples.extend(frame.data.iter().map(|&s| f32::from(s) / 32768.0));
                    }
                }
                Err(minimp3::Error::Eof) => break,
                Err(e) => return Err(Error::Audio(format!("MP3 decode error: {e}"))),
            }
        }

        if sample_rate == 0 {
            return Err(Error::Audio("no MP3 frames in payload".to_string()));
        }

        Ok(DecodedAudio {
            samples,
            sample_rate,
        })
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn test_decode_rejects_garbage() {
            assert!(decode_mp3(b"definitely not an mp3").is_err());
            assert!(decode_mp3(&[]).is_err());
        }

        #[tokio::test]
        async fn test_cancelled_playback_never_decodes() {
            let cancel = PlaybackCancel::new();
            cancel.cancel();

            let result = SpeakerPlayer::new().play(b"not audio".to_vec(), cancel).await;
            assert!(result.is_ok());
        }
    }
}
