//! Escape handling for string literals, shared by the translator (literal
//! capture) and the parser (strings-table decoding), plus the inverse used
//! when the disassembler dumps a string table.

use crate::error::EscapeError;

/// Decodes the escape sequences in the body of a string literal (the text
/// between the quotes). A bare `"` is an error; a bare `'` is accepted as an
/// ordinary character.
pub fn unescape(s: &str) -> Result<String, EscapeError> {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();

    while let Some(c) = chars.next() {
        if c == '"' {
            return Err(EscapeError::UnescapedQuote);
        }
        if c != '\\' {
            out.push(c);
            continue;
        }

        let escape = chars.next().ok_or(EscapeError::DanglingBackslash)?;
        match escape {
            '\\' => out.push('\\'),
            '"' => out.push('"'),
            '\'' => out.push('\''),
            '0' => out.push('\0'),
            'a' => out.push('\x07'),
            'b' => out.push('\x08'),
            'f' => out.push('\x0C'),
            'n' => out.push('\n'),
            'r' => out.push('\r'),
            't' => out.push('\t'),
            'v' => out.push('\x0B'),
            'u' | 'U' => {
                let digits = if escape == 'u' { 4 } else { 8 };
                let mut code_point: u32 = 0;
                for _ in 0..digits {
                    let digit = chars
                        .next()
                        .and_then(|d| d.to_digit(16))
                        .ok_or(EscapeError::IncompleteUnicodeEscape)?;
                    code_point = code_point * 16 + digit;
                }
                let decoded =
                    char::from_u32(code_point).ok_or(EscapeError::InvalidCodePoint(code_point))?;
                out.push(decoded);
            }
            other => return Err(EscapeError::UnknownEscape(other)),
        }
    }

    Ok(out)
}

/// Re-escapes a decoded string so that `unescape(escape(s)) == s`. Used when
/// dumping a string table back to text.
pub fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\0' => out.push_str("\\0"),
            '\x07' => out.push_str("\\a"),
            '\x08' => out.push_str("\\b"),
            '\x0C' => out.push_str("\\f"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\x0B' => out.push_str("\\v"),
            other => out.push(other),
        }
    }
    out
}

/// Byte ranges, quotes included, of every double-quote delimited literal in
/// a line. Quote pairing honors backslash escapes. Returns `None` when a
/// literal is opened but never closed.
pub fn find_literals(line: &str) -> Option<Vec<(usize, usize)>> {
    let mut ranges = Vec::new();
    let mut open: Option<usize> = None;
    let mut chars = line.char_indices();

    while let Some((i, c)) = chars.next() {
        match open {
            None => {
                if c == '"' {
                    open = Some(i);
                }
            }
            Some(start) => match c {
                '\\' => {
                    chars.next();
                }
                '"' => {
                    ranges.push((start, i + 1));
                    open = None;
                }
                _ => {}
            },
        }
    }

    match open {
        Some(_) => None,
        None => Some(ranges),
    }
}
