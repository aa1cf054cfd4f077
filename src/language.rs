//! Spoken language handling and script-based language detection

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::Error;

/// Share of Devanagari characters above which text is treated as Hindi
pub const DEFAULT_DEVANAGARI_THRESHOLD: f32 = 0.2;

/// Languages the assistant speaks and understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    /// English (Indian locale)
    #[default]
    En,
    /// Hindi
    Hi,
}

impl Language {
    /// Short language code sent to backends (`en`, `hi`)
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::En => "en",
            Self::Hi => "hi",
        }
    }

    /// BCP-47 tag used by recognition and synthesis engines
    #[must_use]
    pub const fn bcp47(self) -> &'static str {
        match self {
            Self::En => "en-IN",
            Self::Hi => "hi-IN",
        }
    }

    /// Whether a voice language tag (e.g. `hi-IN`, `en_GB`) belongs to this language
    #[must_use]
    pub fn matches_tag(self, tag: &str) -> bool {
        tag.to_ascii_lowercase().starts_with(self.code())
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Language {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "en" | "en-in" | "english" => Ok(Self::En),
            "hi" | "hi-in" | "hindi" => Ok(Self::Hi),
            other => Err(Error::Config(format!("unsupported language: {other}"))),
        }
    }
}

/// Whether a character lies in the Devanagari block (U+0900..=U+097F)
#[must_use]
pub const fn is_devanagari(c: char) -> bool {
    matches!(c, '\u{0900}'..='\u{097F}')
}

/// Fraction of non-whitespace characters that are Devanagari
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn devanagari_share(text: &str) -> f32 {
    let (devanagari, total) = text
        .chars()
        .filter(|c| !c.is_whitespace())
        .fold((0usize, 0usize), |(d, t), c| {
            (d + usize::from(is_devanagari(c)), t + 1)
        });

    if total == 0 {
        return 0.0;
    }

    devanagari as f32 / total as f32
}

/// Detect the spoken language of text using the default threshold
#[must_use]
pub fn detect_language(text: &str) -> Language {
    detect_language_with_threshold(text, DEFAULT_DEVANAGARI_THRESHOLD)
}

/// Detect the spoken language of text
///
/// Text is Hindi when its Devanagari share strictly exceeds `threshold`.
#[must_use]
pub fn detect_language_with_threshold(text: &str, threshold: f32) -> Language {
    if devanagari_share(text) > threshold {
        Language::Hi
    } else {
        Language::En
    }
}
