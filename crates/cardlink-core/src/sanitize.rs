//! Display name to safe token derivation
//!
//! Pipeline:
//! 1. NFD-normalize and drop combining marks (`é` -> `e`)
//! 2. Transliterate ligatures and letters NFD cannot decompose (`Æ` -> `Ae`,
//!    and so `Ǣ` -> `Ae` once its macron is gone)
//! 3. Transliterate remaining non-Latin letters and digits via deunicode
//! 4. Drop everything outside `[A-Za-z0-9 _-]`
//! 5. Collapse whitespace runs to one space and trim

use crate::card::SafeToken;
use crate::error::{Error, Result};
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Letters with no canonical decomposition, mapped the way card names
/// are conventionally written in ASCII.
const LIGATURES: &[(char, &str)] = &[
    ('Æ', "Ae"),
    ('æ', "ae"),
    ('Œ', "Oe"),
    ('œ', "oe"),
    ('ß', "ss"),
    ('Ø', "O"),
    ('ø', "o"),
    ('Đ', "D"),
    ('đ', "d"),
    ('Ð', "D"),
    ('ð', "d"),
    ('Ł', "L"),
    ('ł', "l"),
    ('Þ', "Th"),
    ('þ', "th"),
];

/// Derive the safe token for a display name.
///
/// Pure and deterministic. Fails with [`Error::EmptyToken`] when nothing
/// usable is left, rather than producing a blank filename.
pub fn sanitize(display_name: &str) -> Result<SafeToken> {
    let mut filtered = String::with_capacity(display_name.len());
    for c in display_name.nfd().filter(|c| !is_combining_mark(*c)) {
        if c.is_ascii() {
            push_allowed(c, &mut filtered);
        } else if let Some((_, ascii)) = LIGATURES.iter().find(|(l, _)| *l == c) {
            filtered.push_str(ascii);
        } else if c.is_whitespace() {
            filtered.push(' ');
        } else if c.is_alphanumeric() {
            // Non-Latin scripts; punctuation and symbols fall through and are dropped
            if let Some(ascii) = deunicode::deunicode_char(c) {
                ascii.chars().for_each(|a| push_allowed(a, &mut filtered));
            }
        }
    }

    let token = filtered.split_whitespace().collect::<Vec<_>>().join(" ");

    if token.is_empty() {
        return Err(Error::EmptyToken {
            display_name: display_name.to_string(),
        });
    }

    Ok(SafeToken::new_unchecked(token))
}

/// Check if a character may appear in a safe token
pub fn is_allowed(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == ' ' || c == '_' || c == '-'
}

fn push_allowed(c: char, out: &mut String) {
    if c.is_ascii_whitespace() {
        out.push(' ');
    } else if is_allowed(c) {
        out.push(c);
    }
}
