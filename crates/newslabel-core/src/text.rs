//! Text normalization, token estimation, and deterministic truncation

use crate::Result;
use regex::Regex;
use unicode_normalization::UnicodeNormalization;

/// Zero-width and formatting characters that carry no content
const INVISIBLE_CHARS: &[char] = &[
    '\u{00a0}', '\u{200b}', '\u{200c}', '\u{200d}', '\u{2060}', '\u{feff}', '\u{202f}',
    '\u{00ad}', '\u{000b}', '\u{000c}', '\u{001f}', '\u{007f}', '\u{0000}',
];

/// Marker appended to content cut by [`truncate_chars`]
pub const ELLIPSIS: &str = "...";

/// NFC-normalize, drop invisible characters, and collapse all whitespace runs
/// (including newlines and tabs) to single spaces.
pub fn normalize_text(text: &str) -> String {
    let composed: String = text
        .nfc()
        .filter(|c| !INVISIBLE_CHARS.contains(c))
        .collect();
    composed.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Comparison key for taxonomy matching: normalized, case-folded, and with
/// `-` always surrounded by exactly one space.
pub fn normalize_key(text: &str) -> String {
    normalize_text(&text.replace('-', " - ")).to_lowercase()
}

/// Rough token estimate for OpenAI-style BPE vocabularies.
///
/// ASCII characters count one unit, everything else two units, and four
/// units make a token. Vietnamese diacritics tokenize poorly, so this errs
/// high; the service-reported usage is what gets billed.
pub fn estimate_tokens(text: &str) -> u32 {
    tokens_for_units(text.chars().map(char_units).sum())
}

/// Saturates at `u32::MAX`
fn tokens_for_units(units: u64) -> u32 {
    u32::try_from(units.div_ceil(4)).unwrap_or(u32::MAX)
}

fn char_units(c: char) -> u64 {
    if c.is_ascii() {
        1
    } else {
        2
    }
}

/// Truncate `text` so that [`estimate_tokens`] of the result is at most
/// `max_tokens`. Keeps the start of the content and always cuts on a char
/// boundary. Returns the (possibly unchanged) text and whether it was cut.
pub fn truncate_to_tokens(text: &str, max_tokens: u32) -> (&str, bool) {
    if estimate_tokens(text) <= max_tokens {
        return (text, false);
    }

    let budget = max_tokens as u64 * 4;
    let mut used = 0u64;
    let mut end = 0usize;
    for (offset, c) in text.char_indices() {
        let units = char_units(c);
        if used + units > budget {
            break;
        }
        used += units;
        end = offset + c.len_utf8();
    }

    (&text[..end], true)
}

/// Cap `text` at `max_chars` characters, appending [`ELLIPSIS`] when cut
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((offset, _)) => format!("{}{}", &text[..offset], ELLIPSIS),
        None => text.to_string(),
    }
}

/// Cleaner for raw crawled article text
pub struct TextCleaner {
    html_tag_regex: Regex,
}

impl TextCleaner {
    /// Create a new text cleaner
    pub fn new() -> Result<Self> {
        Ok(Self {
            html_tag_regex: Regex::new(r"<[^>]+>").map_err(|e| {
                crate::Error::config(format!("Failed to compile HTML tag regex: {}", e))
            })?,
        })
    }

    /// Strip HTML tags and normalize the remaining text
    pub fn clean(&self, text: &str) -> String {
        let stripped = self.html_tag_regex.replace_all(text, " ");
        normalize_text(&stripped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_text_collapses_whitespace() {
        assert_eq!(normalize_text("  a\n\tb\r\n  c  "), "a b c");
    }

    #[test]
    fn test_normalize_text_drops_invisible_chars() {
        assert_eq!(normalize_text("Môi\u{200b} trường\u{feff}"), "Môi trường");
    }

    #[test]
    fn test_normalize_text_composes() {
        let decomposed = "Đa dạng sinh học".nfd().collect::<String>();
        assert_eq!(normalize_text(&decomposed), "Đa dạng sinh học");
    }

    #[test]
    fn test_normalize_key() {
        assert_eq!(normalize_key("Biển-Hải Đảo"), "biển - hải đảo");
        assert_eq!(normalize_key("Biển - hải đảo"), "biển - hải đảo");
    }

    #[test]
    fn test_estimate_tokens() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
        // 7 ASCII + 3 non-ASCII = 13 units
        assert_eq!(estimate_tokens("Môi trường"), 4);
    }

    #[test]
    fn test_token_estimate_saturates() {
        assert_eq!(tokens_for_units(8), 2);
        assert_eq!(tokens_for_units(u32::MAX as u64 * 4), u32::MAX);
        assert_eq!(tokens_for_units(u32::MAX as u64 * 4 + 8), u32::MAX);
        assert_eq!(tokens_for_units(u64::MAX), u32::MAX);
    }

    #[test]
    fn test_truncate_to_tokens_within_budget() {
        let (text, truncated) = truncate_to_tokens("short text", 100);
        assert_eq!(text, "short text");
        assert!(!truncated);
    }

    #[test]
    fn test_truncate_to_tokens_preserves_start() {
        let long = "đất ".repeat(500);
        let (text, truncated) = truncate_to_tokens(&long, 50);
        assert!(truncated);
        assert!(long.starts_with(text));
        assert!(estimate_tokens(text) <= 50);
        assert!(estimate_tokens(text) >= 49);
    }

    #[test]
    fn test_truncate_to_tokens_is_deterministic() {
        let long = "Tài nguyên nước ".repeat(200);
        assert_eq!(truncate_to_tokens(&long, 33), truncate_to_tokens(&long, 33));
    }

    #[test]
    fn test_truncate_to_tokens_zero_budget() {
        let (text, truncated) = truncate_to_tokens("anything", 0);
        assert_eq!(text, "");
        assert!(truncated);
    }

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("abcdef", 3), "abc...");
        assert_eq!(truncate_chars("abc", 3), "abc");
        assert_eq!(truncate_chars("Việt Nam", 4), "Việt...");
    }

    #[test]
    fn test_text_cleaner_strips_html() {
        let cleaner = TextCleaner::new().unwrap();
        assert_eq!(
            cleaner.clean("<p>Ô nhiễm <b>nguồn nước</b></p>\n"),
            "Ô nhiễm nguồn nước"
        );
    }
}
