//! Microphone capture and WAV encoding

use crate::{Error, Result};

/// Capture sample rate (16kHz speech)
pub const SAMPLE_RATE: u32 = 16000;

#[cfg(feature = "audio")]
pub use device::{AudioCapture, Microphone};

/// Where a recognizer gets its audio
///
/// Streams are opened on the capture thread, so they need not be `Send`.
pub trait AudioSource: Send + Sync {
    /// Whether a capture device is present
    fn is_available(&self) -> bool;

    /// Start capturing
    ///
    /// # Errors
    ///
    /// Returns error if the device cannot capture speech audio
    fn open(&self) -> Result<Box<dyn SampleStream>>;
}

/// A running capture
pub trait SampleStream {
    /// Mono 16kHz samples captured since the last call
    fn read(&mut self) -> Vec<f32>;
}

#[cfg(feature = "audio")]
mod device {
    use std::sync::{Arc, Mutex};

    use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
    use cpal::{SampleRate, Stream};

    use super::{AudioSource, SAMPLE_RATE, SampleStream};
    use crate::{Error, Result};

    /// The default input device
    #[derive(Debug, Clone, Copy, Default)]
    pub struct Microphone;

    impl AudioSource for Microphone {
        fn is_available(&self) -> bool {
            cpal::default_host().default_input_device().is_some()
        }

        fn open(&self) -> Result<Box<dyn SampleStream>> {
            Ok(Box::new(AudioCapture::open()?))
        }
    }

    /// Live capture from the default input device
    ///
    /// Capture runs from [`AudioCapture::open`] until the value is dropped.
    /// The stream is not `Send`; keep it on the thread that opened it.
    pub struct AudioCapture {
        buffer: Arc<Mutex<Vec<f32>>>,
        _stream: Stream,
    }

    impl AudioCapture {
        /// Open the default microphone and start capturing mono 16kHz audio
        ///
        /// # Errors
        ///
        /// Returns error if there is no input device or it cannot capture speech audio
        pub fn open() -> Result<Self> {
            let host = cpal::default_host();
            let device = host
                .default_input_device()
                .ok_or_else(|| Error::Audio("no input device available".to_string()))?;

            let rate = SampleRate(SAMPLE_RATE);
            let supported = |channels: u16| {
                device.supported_input_configs().ok()?.find(|c| {
                    c.channels() == channels && c.min_sample_rate() <= rate && c.max_sample_rate() >= rate
                })
            };
            let config = supported(1)
                .or_else(|| supported(2))
                .ok_or_else(|| Error::Audio("no suitable input config found".to_string()))?
                .with_sample_rate(rate)
                .config();
            let channels = usize::from(config.channels);

            let buffer = Arc::new(Mutex::new(Vec::new()));
            let sink = Arc::clone(&buffer);

            let stream = device
                .build_input_stream(
                    &config,
                    move |data: &[f32], _: &cpal::InputCallbackInfo| {
                        if let Ok(mut buf) = sink.lock() {
                            if channels == 1 {
                                buf.extend_from_slice(data);
                            } else {
                                #[allow(clippy::cast_precision_loss)]
                                buf.extend(
                                    data.chunks(channels)
                                        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32),
                                );
                            }
                        }
                    },
                    |err| {
                        tracing::error!(error = %err, "audio capture error");
                    },
                    None,
                )
                .map_err(|e| Error::Audio(e.to_string()))?;

            stream.play().map_err(|e| Error::Audio(e.to_string()))?;

            tracing::debug!(
                device = device.name().unwrap_or_default(),
                sample_rate = SAMPLE_RATE,
                channels,
                "microphone opened"
            );

            Ok(Self {
                buffer,
                _stream: stream,
            })
        }

        /// Take the samples captured since the last call
        #[must_use]
        pub fn drain(&self) -> Vec<f32> {
            self.buffer
                .lock()
                .map(|mut buf| std::mem::take(&mut *buf))
                .unwrap_or_default()
        }
    }

    impl SampleStream for AudioCapture {
        fn read(&mut self) -> Vec<f32> {
            self.drain()
        }
    }

    impl Drop for AudioCapture {
        fn drop(&mut self) {
            tracing::debug!("microphone closed");
        }
    }
}

/// Encode mono f32 samples as 16-bit PCM WAV for transcription upload
///
/// # Errors
///
/// Returns error if WAV encoding fails
pub fn samples_to_wav(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = std::io::Cursor::new(Vec::new());
    let mut writer =
        hound::WavWriter::new(&mut cursor, spec).map_err(|e| Error::Audio(e.to_string()))?;

    for &sample in samples {
        #[allow(clippy::cast_possible_truncation)]
        let pcm = (sample.clamp(-1.0, 1.0) * f32::from(i16::MAX)) as i16;
        writer
            .write_sample(pcm)
            .map_err(|e| Error::Audio(e.to_string()))?;
    }
    writer.finalize().map_err(|e| Error::Audio(e.to_string()))?;

    Ok(cursor.into_inner())
}
