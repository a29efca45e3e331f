//! Lexical helpers shared by the expression, condition and statement parsers
//!
//! All scanning is byte based. Every delimiter the grammars care about is
//! ASCII, so only offsets of ASCII bytes are returned and each one is a `str`
//! boundary. Offsets derived by arithmetic (`i - 2`, `i + 1`) are not; look
//! at those through `as_bytes()` or `str::get` before slicing.

/// Byte offsets of ASCII characters outside any parenthesis group or
/// single-quoted text
pub fn top_level_indices(text: &str) -> Vec<usize> {
    let mut out = Vec::with_capacity(text.len());
    let mut depth: i32 = 0;
    let mut quoted = false;

    for (i, b) in text.bytes().enumerate() {
        match b {
            b'\'' => quoted = !quoted,
            b'(' if !quoted => depth += 1,
            b')' if !quoted => depth -= 1,
            _ if !quoted && depth == 0 && b.is_ascii() => out.push(i),
            _ => {},
        }
    }
    out
}

/// Index of the `)` closing the `(` at `open`
pub fn closing_paren(text: &str, open: usize) -> Option<usize> {
    let bytes = text.as_bytes();
    if bytes.get(open) != Some(&b'(') {
        return None;
    }

    let mut depth = 0;
    let mut quoted = false;
    for (i, b) in bytes.iter().enumerate().skip(open) {
        match b {
            b'\'' => quoted = !quoted,
            b'(' if !quoted => depth += 1,
            b')' if !quoted => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            },
            _ => {},
        }
    }
    None
}

/// Inner text when `text` is exactly one parenthesised group
pub fn group_body(text: &str) -> Option<&str> {
    let text = text.trim();
    match closing_paren(text, 0) {
        Some(close) if close == text.len() - 1 => Some(&text[1..close]),
        _ => None,
    }
}

/// Split on `sep` at top level, trimming each part and dropping empty ones
pub fn split_top_level(text: &str, sep: u8) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0;

    for i in top_level_indices(text) {
        if text.as_bytes()[i] == sep {
            parts.push(text[start..i].trim());
            start = i + 1;
        }
    }
    parts.push(text[start..].trim());
    parts.retain(|p| !p.is_empty());
    parts
}

/// Strip one leading `!` (not followed by `=`)
pub fn strip_not(text: &str) -> (bool, &str) {
    let text = text.trim();
    match text.strip_prefix('!') {
        Some(rest) if !rest.starts_with('=') => (true, rest.trim_start()),
        _ => (false, text),
    }
}

/// Strip matching single quotes around `text`
pub fn unquote(text: &str) -> &str {
    let text = text.trim();
    text.strip_prefix('\'')
        .and_then(|t| t.strip_suffix('\''))
        .unwrap_or(text)
}
