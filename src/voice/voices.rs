//! Voice catalog selection and local utterance settings

use serde::{Deserialize, Serialize};

use crate::Language;

/// Speaking rate for Hindi, slowed for clarity
pub const HINDI_RATE: f32 = 0.85;

/// Speaking rate for English
pub const ENGLISH_RATE: f32 = 0.9;

/// A voice offered by the host synthesis engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceDescriptor {
    /// Display name (e.g. "Google हिन्दी")
    pub name: String,
    /// Language tag (e.g. `hi-IN`)
    pub language_tag: String,
    /// Installed locally rather than served over the network
    pub is_local_service: bool,
}

impl VoiceDescriptor {
    /// Create a voice descriptor
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        language_tag: impl Into<String>,
        is_local_service: bool,
    ) -> Self {
        Self {
            name: name.into(),
            language_tag: language_tag.into(),
            is_local_service,
        }
    }
}

/// One request to the local synthesis engine
#[derive(Debug, Clone, PartialEq)]
pub struct LocalUtterance {
    /// Normalized text to speak
    pub text: String,
    /// Language of the text
    pub language: Language,
    /// BCP-47 tag handed to the engine
    pub lang_tag: String,
    /// Chosen voice, `None` for the host default
    pub voice: Option<VoiceDescriptor>,
    /// Rate multiplier (1.0 is nominal)
    pub rate: f32,
    /// Pitch multiplier (1.0 is nominal)
    pub pitch: f32,
    /// Volume (0.0 to 1.0)
    pub volume: f32,
}

impl LocalUtterance {
    /// Build an utterance for text in a language, picking a voice from the catalog
    #[must_use]
    pub fn new(
        text: impl Into<String>,
        language: Language,
        voices: &[VoiceDescriptor],
        preferred_providers: &[String],
    ) -> Self {
        let voice = select_voice(voices, language, preferred_providers).cloned();

        tracing::debug!(
            language = %language,
            voices = voices.len(),
            voice = voice.as_ref().map_or("system default", |v| v.name.as_str()),
            "selected local voice"
        );

        Self {
            text: text.into(),
            language,
            lang_tag: language.bcp47().to_string(),
            voice,
            rate: speaking_rate(language),
            pitch: 1.0,
            volume: 1.0,
        }
    }
}

/// Speaking rate for a language
#[must_use]
pub const fn speaking_rate(language: Language) -> f32 {
    match language {
        Language::Hi => HINDI_RATE,
        Language::En => ENGLISH_RATE,
    }
}

/// Pick the best voice for a language
///
/// Only voices whose tag matches the language prefix are considered. Precedence:
/// a preferred provider named in the voice name, then a locally installed voice,
/// then the first match. Within each tier an exact regional tag (`hi-IN`) wins.
/// Returns `None` when the host default should be used.
#[must_use]
pub fn select_voice<'a>(
    voices: &'a [VoiceDescriptor],
    language: Language,
    preferred_providers: &[String],
) -> Option<&'a VoiceDescriptor> {
    let candidates: Vec<&VoiceDescriptor> = voices
        .iter()
        .filter(|v| language.matches_tag(&v.language_tag))
        .collect();

    if candidates.is_empty() {
        tracing::debug!(language = %language, "no voices for language, using host default");
        return None;
    }

    let preferred: Vec<&VoiceDescriptor> = candidates
        .iter()
        .copied()
        .filter(|v| {
            let name = v.name.to_lowercase();
            preferred_providers
                .iter()
                .any(|p| name.contains(&p.to_lowercase()))
        })
        .collect();
    if let Some(voice) = pick(&preferred, language) {
        return Some(voice);
    }

    let local: Vec<&VoiceDescriptor> = candidates
        .iter()
        .copied()
        .filter(|v| v.is_local_service)
        .collect();
    if let Some(voice) = pick(&local, language) {
        return Some(voice);
    }

    pick(&candidates, language)
}

/// First voice of a tier, preferring an exact regional tag
fn pick<'a>(tier: &[&'a VoiceDescriptor], language: Language) -> Option<&'a VoiceDescriptor> {
    tier.iter()
        .find(|v| is_regional(v, language))
        .or_else(|| tier.first())
        .copied()
}

fn is_regional(voice: &VoiceDescriptor, language: Language) -> bool {
    voice
        .language_tag
        .replace('_', "-")
        .eq_ignore_ascii_case(language.bcp47())
}
