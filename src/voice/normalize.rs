//! Text normalization for natural-sounding speech
//!
//! Assistant replies arrive as chat markdown with emoji, lists and asides.
//! [`normalize`] flattens them into plain sentences that synthesis engines
//! read with sensible pauses.

use std::sync::LazyLock;

use regex::Regex;

/// Upper bound on normalization passes before giving up on a fixed point
const MAX_PASSES: usize = 8;

/// Sentence terminators, including the Devanagari danda
const TERMINATORS: [char; 4] = ['.', '!', '?', '।'];

fn regex(pattern: &str) -> Regex {
    Regex::new(pattern).expect("valid regex")
}

// Step 1: emphasis markup. Markers must hug their content so bullets survive.
static BOLD_ITALIC: LazyLock<Regex> =
    LazyLock::new(|| regex(r"\*\*\*([^\s*](?:.*?[^\s*])?)\*\*\*"));
static BOLD: LazyLock<Regex> = LazyLock::new(|| regex(r"\*\*([^\s*](?:.*?[^\s*])?)\*\*"));
static ITALIC_STAR: LazyLock<Regex> = LazyLock::new(|| regex(r"\*([^\s*](?:.*?[^\s*])?)\*"));
static UNDERLINE: LazyLock<Regex> = LazyLock::new(|| {
    regex(r"(^|[^\p{L}\p{N}_])__([^\s_](?:.*?[^\s_])?)__([^\p{L}\p{N}_]|$)")
});
static ITALIC_UNDERSCORE: LazyLock<Regex> = LazyLock::new(|| {
    regex(r"(^|[^\p{L}\p{N}_])_([^\s_](?:.*?[^\s_])?)_([^\p{L}\p{N}_]|$)")
});
static STRIKETHROUGH: LazyLock<Regex> = LazyLock::new(|| regex(r"~~([^\s~](?:.*?[^\s~])?)~~"));

// Step 2: code
static CODE_BLOCK: LazyLock<Regex> = LazyLock::new(|| regex(r"(?s)```.*?```"));
static INLINE_CODE: LazyLock<Regex> = LazyLock::new(|| regex(r"`([^`\n]+)`"));

// Step 3: links and images
static LINK: LazyLock<Regex> = LazyLock::new(|| regex(r"!?\[([^\]\n]*)\]\([^)\n]*\)"));

// Step 5: list markers, ordinals and heading markers at line start
static LINE_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    regex(r"(?m)^[ \t]*(?:(?:#{1,6}|[-*+•>]|\d{1,3}[.)])[ \t]+)+")
});

// Step 6: heading-style trailing colon
static TRAILING_COLON: LazyLock<Regex> =
    LazyLock::new(|| regex(r"(?m)([^:\s])[ \t]*:[ \t]*$"));

// Step 6b: innermost parenthetical aside
static PARENTHETICAL: LazyLock<Regex> = LazyLock::new(|| regex(r"\(([^()]*)\)"));

// Step 7: line breaks
static PARAGRAPH_BREAK: LazyLock<Regex> = LazyLock::new(|| regex(r"\n(?:[ \t]*\n)+"));

// Step 8: repeated punctuation
static REPEATED_DOTS: LazyLock<Regex> = LazyLock::new(|| regex(r"\.{2,}"));
static REPEATED_BANGS: LazyLock<Regex> = LazyLock::new(|| regex(r"!{2,}"));
static REPEATED_QUESTIONS: LazyLock<Regex> = LazyLock::new(|| regex(r"\?{2,}"));
static REPEATED_DANDAS: LazyLock<Regex> = LazyLock::new(|| regex(r"।{2,}"));
static REPEATED_COMMAS: LazyLock<Regex> = LazyLock::new(|| regex(r",(?:\s*,)+"));
static REPEATED_SEMICOLONS: LazyLock<Regex> = LazyLock::new(|| regex(r";(?:\s*;)+"));
static SOFT_BEFORE_TERMINATOR: LazyLock<Regex> =
    LazyLock::new(|| regex(r"[,;:]\s*([.!?।])"));
static TERMINATOR_RUN: LazyLock<Regex> =
    LazyLock::new(|| regex(r"([.!?।])(?:\s*[.!?।,;:])+"));

// Step 9: spacing around punctuation
static SPACE_BEFORE_PUNCT: LazyLock<Regex> = LazyLock::new(|| regex(r"\s+([,.!?;:।])"));
static MISSING_SPACE_AFTER: LazyLock<Regex> =
    LazyLock::new(|| regex(r#"([,!?;।])([^\s\d,.!?;:।"'])"#));
static SPACE_AFTER_PUNCT: LazyLock<Regex> = LazyLock::new(|| regex(r"([,.!?;:।])\s+"));

// Step 10: whitespace
static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| regex(r"\s+"));
static LEADING_PUNCT: LazyLock<Regex> = LazyLock::new(|| regex(r"^[\s,;:.!?।]+"));
static TRAILING_SOFT_PUNCT: LazyLock<Regex> = LazyLock::new(|| regex(r"[\s,;:]+$"));

/// Normalize assistant text for speech synthesis
///
/// Strips markdown, code, links and emoji, flattens lists and asides into
/// flowing sentences, and tidies punctuation. The result is a single line
/// that ends with a sentence terminator, or is empty.
///
/// Passes repeat until the text stops changing, so the function is
/// idempotent: `normalize(&normalize(t)) == normalize(t)`.
#[must_use]
pub fn normalize(text: &str) -> String {
    let mut current = normalize_pass(text);

    for _ in 1..MAX_PASSES {
        let next = normalize_pass(&current);
        if next == current {
            return current;
        }
        current = next;
    }

    tracing::debug!(len = current.len(), "normalization did not settle");
    current
}

/// Whether text already ends in a sentence terminator
#[must_use]
pub fn ends_with_terminator(text: &str) -> bool {
    text.chars().last().is_some_and(|c| TERMINATORS.contains(&c))
}

fn normalize_pass(text: &str) -> String {
    let mut s = text.replace("\r\n", "\n").replace('\r', "\n");

    // 1. emphasis
    s = BOLD_ITALIC.replace_all(&s, "$1").into_owned();
    s = BOLD.replace_all(&s, "$1").into_owned();
    s = ITALIC_STAR.replace_all(&s, "$1").into_owned();
    s = UNDERLINE.replace_all(&s, "${1}${2}${3}").into_owned();
    s = ITALIC_UNDERSCORE.replace_all(&s, "${1}${2}${3}").into_owned();
    s = STRIKETHROUGH.replace_all(&s, "$1").into_owned();

    // 2. code
    s = CODE_BLOCK.replace_all(&s, "").into_owned();
    s = INLINE_CODE.replace_all(&s, "$1").into_owned();
    s.retain(|c| c != '`');

    // 3. links
    s = LINK.replace_all(&s, "$1").into_owned();

    // 4. emoji
    s.retain(|c| !is_emoji(c));

    // 5. list and heading markers
    s = LINE_MARKER.replace_all(&s, "").into_owned();

    // 6. "heading:" at line end reads as a sentence
    s = TRAILING_COLON.replace_all(&s, "$1.").into_owned();

    // 6b. asides, innermost first
    while PARENTHETICAL.is_match(&s) {
        s = PARENTHETICAL.replace_all(&s, ", $1, ").into_owned();
    }
    s = s.replace(['(', ')'], " ");

    // 7. line breaks
    s = PARAGRAPH_BREAK.replace_all(&s, ". ").into_owned();
    s = s.replace('\n', " ");

    // 8. repeated punctuation
    s = s.replace('…', ".");
    s = REPEATED_DOTS.replace_all(&s, ".").into_owned();
    s = REPEATED_BANGS.replace_all(&s, "!").into_owned();
    s = REPEATED_QUESTIONS.replace_all(&s, "?").into_owned();
    s = REPEATED_DANDAS.replace_all(&s, "।").into_owned();
    s = REPEATED_COMMAS.replace_all(&s, ",").into_owned();
    s = REPEATED_SEMICOLONS.replace_all(&s, ";").into_owned();
    s = SOFT_BEFORE_TERMINATOR.replace_all(&s, "$1").into_owned();
    s = TERMINATOR_RUN.replace_all(&s, "$1").into_owned();

    // 9. spacing around punctuation
    s = SPACE_BEFORE_PUNCT.replace_all(&s, "$1").into_owned();
    s = MISSING_SPACE_AFTER.replace_all(&s, "$1 $2").into_owned();
    s = SPACE_AFTER_PUNCT.replace_all(&s, "$1 ").into_owned();

    // 10. whitespace
    s = WHITESPACE.replace_all(&s, " ").into_owned();
    s = LEADING_PUNCT.replace(&s, "").into_owned();
    s = TRAILING_SOFT_PUNCT.replace(&s, "").into_owned();
    let mut s = s.trim().to_string();

    // 11. terminal punctuation
    if !s.is_empty() && !ends_with_terminator(&s) {
        s.push('.');
    }

    s
}

/// Emoji and pictographic symbols that synthesis engines read badly
const fn is_emoji(c: char) -> bool {
    matches!(
        c as u32,
        0x1F000..=0x1FAFF
            | 0x2600..=0x27BF
            | 0x2B00..=0x2BFF
            | 0x231A..=0x231B
            | 0x23E9..=0x23FA
            | 0xFE0F
            | 0x20E3
    )
}
