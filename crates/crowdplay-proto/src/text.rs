//! Text validation helpers shared by chat and username handling.

use once_cell::sync::Lazy;
use regex::Regex;

/// Matches `\xHH`, `\uHHHH` and `\u{1HHHH}` escape sequences.
static ESCAPE: Lazy<Regex> = Lazy::new(|| {
    #[allow(clippy::unwrap_used)]
    Regex::new(r"(\\x[\da-f]{2}|\\u[\da-f]{4}|\\u\{1[\da-f]{4}\})").unwrap()
});

/// True when every byte is typeable ASCII (`' '..='~'`), so no control
/// characters, tabs or newlines.
pub fn is_printable_ascii(s: &str) -> bool {
    s.bytes().all(|b| (b' '..=b'~').contains(&b))
}

/// Length of `s` with every escape sequence collapsed to one character.
///
/// Clients may smuggle multi-byte glyphs through their chat box as escapes;
/// the chat size cap is enforced against this length, not the raw one.
pub fn escaped_len(s: &str) -> usize {
    ESCAPE.replace_all(s, "X").len()
}
