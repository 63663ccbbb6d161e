//! Structural fingerprints of text.
//!
//! A pattern replaces every run of letters and digits with a single
//! [`MARKER`] and every run of spaces with a single space. Punctuation, tabs
//! and newlines pass through, so `"Item23, item-A"` and `"Box7, lid-Q"` share
//! the pattern `"M, M-M"` (with `M` standing for the marker).

use crate::pattern::store::PatternError;
use std::ops::Range;

/// Stands in for one run of letters and digits. A private-use code point, so
/// it cannot be confused with anything a text legitimately contains.
pub const MARKER: char = '\u{E000}';

/// A pattern together with the source bytes each of its characters came from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PatternMap {
    pattern: String,
    spans: Vec<Range<usize>>,
}

impl PatternMap {
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn into_pattern(self) -> String {
        self.pattern
    }

    /// Number of pattern characters.
    pub fn len(&self) -> usize {
        self.spans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }

    /// Byte range in the source text that produced pattern character `index`.
    pub fn span(&self, index: usize) -> Option<Range<usize>> {
        self.spans.get(index).cloned()
    }
}

fn is_word(c: char) -> bool {
    c.is_alphanumeric() || c == MARKER
}

/// Compute the pattern of `text`, remembering where each character came from.
pub fn map_pattern(text: &str) -> PatternMap {
    let mut map = PatternMap::default();
    let mut last: Option<char> = None;

    for (offset, c) in text.char_indices() {
        let end = offset + c.len_utf8();
        let symbol = if is_word(c) { MARKER } else { c };

        // Marker runs and space runs collapse into the previous character
        if (symbol == MARKER || symbol == ' ') && last == Some(symbol) {
            if let Some(span) = map.spans.last_mut() {
                span.end = end;
            }
            continue;
        }

        map.pattern.push(symbol);
        map.spans.push(offset..end);
        last = Some(symbol);
    }

    map
}

pub fn create_pattern(text: &str) -> String {
    map_pattern(text).into_pattern()
}

/// Render a pattern as a single-line token: the marker becomes `*`, and the
/// characters with a meaning in the pattern table are backslash-escaped.
pub fn encode_pattern(pattern: &str) -> String {
    let mut encoded = String::with_capacity(pattern.len());
    for c in pattern.chars() {
        match c {
            MARKER => encoded.push('*'),
            '\\' => encoded.push_str("\\\\"),
            '*' => encoded.push_str("\\*"),
            '[' => encoded.push_str("\\["),
            ']' => encoded.push_str("\\]"),
            '#' => encoded.push_str("\\#"),
            ' ' => encoded.push_str("\\s"),
            '\n' => encoded.push_str("\\n"),
            '\t' => encoded.push_str("\\t"),
            '\r' => encoded.push_str("\\r"),
            other => encoded.push(other),
        }
    }
    encoded
}

/// Inverse of [`encode_pattern`].
pub fn decode_pattern(encoded: &str) -> Result<String, PatternError> {
    let mut decoded = String::with_capacity(encoded.len());
    let mut chars = encoded.char_indices();

    while let Some((position, c)) = chars.next() {
        match c {
            '*' => decoded.push(MARKER),
            '[' | ']' => return Err(PatternError::UnescapedBracket { position }),
            '\\' => {
                let Some((_, escaped)) = chars.next() else {
                    return Err(PatternError::DanglingEscape);
                };
                decoded.push(match escaped {
                    '\\' | '*' | '[' | ']' | '#' => escaped,
                    's' => ' ',
                    'n' => '\n',
                    't' => '\t',
                    'r' => '\r',
                    other => {
                        return Err(PatternError::UnknownEscape {
                            sequence: format!("\\{other}"),
                            position,
                        })
                    }
                });
            }
            other => decoded.push(other),
        }
    }

    Ok(decoded)
}

/// The last `n` characters of `s`.
pub(crate) fn tail_chars(s: &str, n: usize) -> &str {
    let skip = s.chars().count().saturating_sub(n);
    match s.char_indices().nth(skip) {
        Some((offset, _)) => &s[offset..],
        None => "",
    }
}

/// The first `n` characters of `s`.
pub(crate) fn head_chars(s: &str, n: usize) -> &str {
    match s.char_indices().nth(n) {
        Some((offset, _)) => &s[..offset],
        None => s,
    }
}
