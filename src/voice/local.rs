//! Local speech synthesis tier
//!
//! The host-native engine used when the remote voice is unavailable. On
//! desktop hosts this drives `espeak-ng`, which plays through the default
//! output device itself.

use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::sync::{Notify, OnceCell};

use super::voices::{LocalUtterance, VoiceDescriptor};
use crate::{Error, Result};

/// Default espeak speaking rate in words per minute
const ESPEAK_BASE_WPM: f32 = 175.0;

/// Default espeak pitch (0-99)
const ESPEAK_BASE_PITCH: f32 = 50.0;

/// Default espeak amplitude (0-200)
const ESPEAK_BASE_AMPLITUDE: f32 = 100.0;

/// Host-native speech synthesis
#[async_trait]
pub trait LocalSynthesizer: Send + Sync {
    /// Voices the engine offers
    async fn voices(&self) -> Vec<VoiceDescriptor>;

    /// Speak an utterance, resolving when speech ends
    ///
    /// Being cancelled through [`LocalSynthesizer::cancel`] resolves normally.
    ///
    /// # Errors
    ///
    /// Returns error if the engine cannot speak the utterance
    async fn speak(&self, utterance: &LocalUtterance) -> Result<()>;

    /// Clear anything being spoken
    fn cancel(&self);
}

/// Local synthesis through the `espeak-ng` command
pub struct EspeakSynthesizer {
    program: PathBuf,
    voices: OnceCell<Vec<VoiceDescriptor>>,
    cancelled: Notify,
}

impl EspeakSynthesizer {
    /// Locate the synthesis command on `PATH`
    ///
    /// # Errors
    ///
    /// Returns error if the command cannot be found
    pub fn new(command: &str) -> Result<Self> {
        let program = which::which(command)
            .map_err(|e| Error::Synthesis(format!("local synthesizer {command} not found: {e}")))?;

        tracing::debug!(program = %program.display(), "local synthesizer found");

        Ok(Self {
            program,
            voices: OnceCell::new(),
            cancelled: Notify::new(),
        })
    }

    async fn query_voices(&self) -> Vec<VoiceDescriptor> {
        let output = Command::new(&self.program)
            .arg("--voices")
            .stdin(Stdio::null())
            .output()
            .await;

        match output {
            Ok(output) if output.status.success() => {
                let voices = parse_voice_list(&String::from_utf8_lossy(&output.stdout));
                tracing::debug!(count = voices.len(), "local voice catalog loaded");
                voices
            }
            Ok(output) => {
                tracing::warn!(status = %output.status, "voice listing failed");
                Vec::new()
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to run voice listing");
                Vec::new()
            }
        }
    }
}

#[async_trait]
impl LocalSynthesizer for EspeakSynthesizer {
    async fn voices(&self) -> Vec<VoiceDescriptor> {
        self.voices
            .get_or_init(|| self.query_voices())
            .await
            .clone()
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    async fn speak(&self, utterance: &LocalUtterance) -> Result<()> {
        let voice = utterance
            .voice
            .as_ref()
            .map_or_else(|| utterance.language.code().to_string(), |v| v.language_tag.clone());
        let wpm = (ESPEAK_BASE_WPM * utterance.rate).round() as u32;
        let pitch = (ESPEAK_BASE_PITCH * utterance.pitch).round().clamp(0.0, 99.0) as u32;
        let amplitude = (ESPEAK_BASE_AMPLITUDE * utterance.volume).round().clamp(0.0, 200.0) as u32;

        // Register interest before spawning so an early cancel is not lost
        let cancelled = self.cancelled.notified();
        tokio::pin!(cancelled);
        cancelled.as_mut().enable();

        let mut child = Command::new(&self.program)
            .args(["-v", &voice])
            .args(["-s", &wpm.to_string()])
            .args(["-p", &pitch.to_string()])
            .args(["-a", &amplitude.to_string()])
            .arg("--stdin")
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::Synthesis(format!("failed to spawn local synthesizer: {e}")))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(utterance.text.as_bytes())
                .await
                .map_err(|e| Error::Synthesis(format!("failed to write text: {e}")))?;
        }

        tracing::debug!(voice = %voice, wpm, chars = utterance.text.len(), "local speech started");

        tokio::select! {
            status = child.wait() => {
                let status = status?;
                if status.success() {
                    tracing::debug!("local speech completed");
                    Ok(())
                } else {
                    Err(Error::Synthesis(format!("local synthesizer exited with {status}")))
                }
            }
            () = &mut cancelled => {
                if let Err(e) = child.kill().await {
                    tracing::debug!(error = %e, "failed to kill local synthesizer");
                }
                tracing::debug!("local speech interrupted");
                Ok(())
            }
        }
    }

    fn cancel(&self) {
        self.cancelled.notify_waiters();
    }
}

/// Parse `espeak-ng --voices` output
///
/// ```text
/// Pty Language       Age/Gender VoiceName          File                 Other Languages
///  5  hi              --/M      Hindi              inc/hi
/// ```
#[must_use]
pub fn parse_voice_list(output: &str) -> Vec<VoiceDescriptor> {
    output
        .lines()
        .skip_while(|line| !line.trim_start().starts_with("Pty"))
        .skip(1)
        .filter_map(|line| {
            let fields: Vec<&str> = line.split_whitespace().collect();
            let language = fields.get(1)?;
            let name = fields.get(3)?;
            Some(VoiceDescriptor::new(name.replace('_', " "), *language, true))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_voice_list() {
        let output = "\
Pty Language       Age/Gender VoiceName          File                 Other Languages
 5  af              --/M      Afrikaans          gmw/af
 2  en-gb           --/M      English_(Great_Britain) gmw/en            (en 2)
 5  hi              --/M      Hindi              inc/hi
";
        let voices = parse_voice_list(output);
        assert_eq!(voices.len(), 3);
        assert_eq!(voices[1].name, "English (Great Britain)");
        assert_eq!(voices[1].language_tag, "en-gb");
        assert_eq!(voices[2], VoiceDescriptor::new("Hindi", "hi", true));
    }

    #[test]
    fn test_parse_voice_list_without_header() {
        assert!(parse_voice_list("").is_empty());
        assert!(parse_voice_list("garbage\nlines").is_empty());
    }
}
