//! Normalizes surface assembly into the canonical form the parser accepts:
//! strips comments, rewrites convenience operand spellings, converts float
//! literals to their bit patterns, and hoists string literals into an
//! appended strings table.

use indexmap::IndexSet;
use ironarch::{inst, OperandSize};

use crate::error::TranslateError;
use crate::parse::is_label_line;
use crate::strings;

/// Runs all four passes over trimmed source lines and returns canonical
/// direct assembly, line for line, plus a `strings:` block when any string
/// literals were captured.
pub fn translate(lines: &[String]) -> Result<Vec<String>, TranslateError> {
    let stripped: Vec<String> = lines.iter().map(|line| strip_comment(line)).collect();
    let rewritten = rewrite_operands(&stripped)?;
    let floated = rewrite_float_literals(&rewritten)?;
    build_string_table(floated)
}

// ----------------------------------------------------------------
// Pass 1: comments

/// A line starting with `#` becomes blank; an inline `#` truncates the line.
fn strip_comment(line: &str) -> String {
    let line = line.trim();
    if line.starts_with('#') {
        String::new()
    } else if let Some(at) = line.find('#') {
        line[..at].trim().to_string()
    } else {
        line.to_string()
    }
}

// ----------------------------------------------------------------
// Pass 2: operand spellings

/// Walks each instruction line's tokens right to left, rewriting operand
/// spellings until a size keyword, a known mnemonic, or the first token is
/// reached.
fn rewrite_operands(lines: &[String]) -> Result<Vec<String>, TranslateError> {
    let mut out = Vec::with_capacity(lines.len());
    for line in lines {
        if line.is_empty() || is_label_line(line) {
            out.push(line.clone());
            continue;
        }
        let mut tokens: Vec<String> = line.split_whitespace().map(str::to_string).collect();
        let mut i = tokens.len() - 1;
        while i > 0
            && !OperandSize::is_size_keyword(&tokens[i])
            && inst::lookup(&tokens[i]).is_none()
        {
            tokens[i] = rewrite_operand(&tokens[i])?;
            i -= 1;
        }
        out.push(tokens.join(" "));
    }
    Ok(out)
}

fn rewrite_operand(token: &str) -> Result<String, TranslateError> {
    if let Some(rewritten) = rewrite_register_hex_offset(token)? {
        return Ok(rewritten);
    }
    if let Some(rest) = strip_prefix_ignore_case(token, "mem:0x") {
        if !rest.is_empty() && rest.chars().all(|c| c.is_ascii_hexdigit()) {
            let address = u64::from_str_radix(rest, 16)
                .map_err(|_| TranslateError::InvalidHexLiteral(token.to_string()))?;
            return Ok(format!("0x{address:016x}"));
        }
    }
    if let Some(rest) = strip_prefix_ignore_case(token, "0x") {
        if !rest.is_empty() && rest.chars().all(|c| c.is_ascii_hexdigit()) {
            let value = u64::from_str_radix(rest, 16)
                .map_err(|_| TranslateError::InvalidHexLiteral(token.to_string()))?;
            return Ok(value.to_string());
        }
    }
    Ok(token.to_string())
}

/// `*reg+0x10` and `*reg-0x10` become their decimal-offset forms.
fn rewrite_register_hex_offset(token: &str) -> Result<Option<String>, TranslateError> {
    let Some(body) = token.strip_prefix('*') else {
        return Ok(None);
    };
    let Some(sign_at) = body.find(['+', '-']) else {
        return Ok(None);
    };
    let (register, rest) = body.split_at(sign_at);
    if register.is_empty() || !register.chars().all(|c| c.is_ascii_alphabetic()) {
        return Ok(None);
    }
    let negative = rest.starts_with('-');
    let Some(hex) = strip_prefix_ignore_case(&rest[1..], "0x") else {
        return Ok(None);
    };
    if hex.is_empty() || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return Ok(None);
    }

    let magnitude = u64::from_str_radix(hex, 16)
        .map_err(|_| TranslateError::InvalidHexLiteral(token.to_string()))?;
    let offset = if negative {
        -(magnitude as i128)
    } else {
        magnitude as i128
    };
    if offset < i32::MIN as i128 || offset > i32::MAX as i128 {
        return Err(TranslateError::OffsetOutOfRange(offset as i64));
    }
    let sign = if negative { "" } else { "+" };
    Ok(Some(format!("*{register}{sign}{offset}")))
}

fn strip_prefix_ignore_case<'a>(s: &'a str, prefix: &str) -> Option<&'a str> {
    let head = s.get(..prefix.len())?;
    head.eq_ignore_ascii_case(prefix).then(|| &s[prefix.len()..])
}

// ----------------------------------------------------------------
// Pass 3: float literals

/// Rewrites `single(f)` and `double(f)` operands to the decimal form of the
/// IEEE 754 bit pattern, requiring (or synthesizing) the matching size token.
fn rewrite_float_literals(lines: &[String]) -> Result<Vec<String>, TranslateError> {
    let mut out = Vec::with_capacity(lines.len());
    for line in lines {
        if line.is_empty() || is_label_line(line) || line.contains('"') {
            out.push(line.clone());
            continue;
        }
        let tokens: Vec<&str> = line.split_whitespace().collect();
        if inst::lookup(tokens[0]).is_none() {
            out.push(line.clone());
            continue;
        }
        let explicit = tokens.len() > 1 && OperandSize::is_size_keyword(tokens[1]);
        let operands_at = if explicit { 2 } else { 1 };
        if tokens.len() <= operands_at {
            out.push(line.clone());
            continue;
        }

        let mut size_token: Option<String> = explicit.then(|| tokens[1].to_uppercase());
        let mut operands: Vec<String> = tokens[operands_at..]
            .iter()
            .map(|t| t.to_string())
            .collect();
        for operand in &mut operands {
            let Some((precision, inner)) = match_float_literal(operand) else {
                continue;
            };
            let (bits, required) = match precision {
                FloatPrecision::Single => {
                    let value: f32 = inner
                        .parse()
                        .map_err(|_| TranslateError::InvalidFloatLiteral(operand.clone()))?;
                    (value.to_bits() as u64, "DWORD")
                }
                FloatPrecision::Double => {
                    let value: f64 = inner
                        .parse()
                        .map_err(|_| TranslateError::InvalidFloatLiteral(operand.clone()))?;
                    (value.to_bits(), "QWORD")
                }
            };
            match &size_token {
                Some(declared) if declared != required => {
                    return Err(TranslateError::SizeMismatch {
                        literal: precision.name(),
                        required,
                        declared: declared.clone(),
                    });
                }
                Some(_) => {}
                None => size_token = Some(required.to_string()),
            }
            *operand = bits.to_string();
        }

        let mut rebuilt = vec![tokens[0].to_string()];
        if let Some(size) = size_token {
            rebuilt.push(size);
        }
        rebuilt.extend(operands);
        out.push(rebuilt.join(" "));
    }
    Ok(out)
}

#[derive(Clone, Copy)]
enum FloatPrecision {
    Single,
    Double,
}

impl FloatPrecision {
    fn name(self) -> &'static str {
        match self {
            FloatPrecision::Single => "single",
            FloatPrecision::Double => "double",
        }
    }
}

fn match_float_literal(token: &str) -> Option<(FloatPrecision, &str)> {
    let body = token.strip_suffix(')')?;
    let (precision, inner) = if let Some(inner) = strip_prefix_ignore_case(body, "single(") {
        (FloatPrecision::Single, inner)
    } else if let Some(inner) = strip_prefix_ignore_case(body, "double(") {
        (FloatPrecision::Double, inner)
    } else {
        return None;
    };
    let shape_ok = !inner.is_empty()
        && inner.chars().all(|c| c.is_ascii_digit() || c == '.')
        && inner.matches('.').count() <= 1;
    shape_ok.then_some((precision, inner))
}

// ----------------------------------------------------------------
// Pass 4: string literals

/// Captures every quoted literal into a deduplicated, first-appearance
/// ordered table, replaces each occurrence with `str:N`, forces a QWORD size
/// onto sizeless lines that gained a reference (hwcall excepted), and
/// appends the `strings:` block when the table is non-empty.
fn build_string_table(mut lines: Vec<String>) -> Result<Vec<String>, TranslateError> {
    let mut table: IndexSet<String> = IndexSet::new();
    let mut hits: Vec<(usize, Vec<(usize, usize)>)> = Vec::new();

    for (i, line) in lines.iter().enumerate() {
        if line.is_empty() || is_label_line(line) {
            continue;
        }
        let ranges = strings::find_literals(line)
            .ok_or_else(|| TranslateError::UnterminatedStringLiteral(line.clone()))?;
        if ranges.is_empty() {
            continue;
        }
        for &(start, end) in &ranges {
            // validate escapes up front so errors name the offending line
            strings::unescape(&line[start + 1..end - 1])?;
            table.insert(line[start..end].to_string());
        }
        hits.push((i, ranges));
    }

    for (i, ranges) in hits {
        let line = &lines[i];
        let mut rebuilt = String::with_capacity(line.len());
        let mut copied_to = 0;
        for (start, end) in ranges {
            rebuilt.push_str(&line[copied_to..start]);
            let index = table
                .get_index_of(&line[start..end])
                .expect("literal captured during first scan");
            rebuilt.push_str(&format!("str:{index}"));
            copied_to = end;
        }
        rebuilt.push_str(&line[copied_to..]);

        let tokens: Vec<&str> = rebuilt.split_whitespace().collect();
        let exempt = tokens[0].eq_ignore_ascii_case("hwcall");
        let sized = tokens.len() > 1 && OperandSize::is_size_keyword(tokens[1]);
        lines[i] = if !exempt && !sized {
            let mut forced = vec![tokens[0].to_string(), "QWORD".to_string()];
            forced.extend(tokens[1..].iter().map(|t| t.to_string()));
            forced.join(" ")
        } else {
            tokens.join(" ")
        };
    }

    if !table.is_empty() {
        lines.push("strings:".to_string());
        for (index, literal) in table.iter().enumerate() {
            lines.push(format!("{index}: {literal}"));
        }
    }
    Ok(lines)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(source: &[&str]) -> Vec<String> {
        let lines: Vec<String> = source.iter().map(|s| s.to_string()).collect();
        translate(&lines).unwrap()
    }

    #[test]
    fn test_comment_stripping() {
        let out = run(&["# full line comment", "push DWORD 5 # trailing", "end"]);
        assert_eq!(out, vec!["", "push DWORD 5", "end"]);
    }

    #[test]
    fn test_hex_literal_rewrites() {
        let out = run(&["push DWORD 0x2A"]);
        assert_eq!(out, vec!["push DWORD 42"]);

        let out = run(&["mov QWORD mem:0xFF eax"]);
        assert_eq!(out, vec!["mov QWORD 0x00000000000000ff eax"]);
    }

    #[test]
    fn test_register_hex_offset_rewrites() {
        let out = run(&["mov QWORD *eax+0x10 ebx"]);
        assert_eq!(out, vec!["mov QWORD *eax+16 ebx"]);

        let out = run(&["mov QWORD *eax-0x10 ebx"]);
        assert_eq!(out, vec!["mov QWORD *eax-16 ebx"]);
    }

    #[test]
    fn test_rewrite_stops_at_mnemonic_and_size() {
        // the mnemonic and size keyword themselves are never rewritten
        let out = run(&["push BYTE 0xF"]);
        assert_eq!(out, vec!["push BYTE 15"]);
    }

    #[test]
    fn test_offset_out_of_range() {
        let lines = vec!["mov QWORD *eax+0xFFFFFFFFFF ebx".to_string()];
        assert!(matches!(
            translate(&lines),
            Err(TranslateError::OffsetOutOfRange(_))
        ));
    }

    #[test]
    fn test_single_float_synthesizes_dword() {
        let out = run(&["push single(1.0)"]);
        assert_eq!(out, vec!["push DWORD 1065353216"]);
    }

    #[test]
    fn test_double_float_requires_qword() {
        let out = run(&["push QWORD double(1.0)"]);
        assert_eq!(out, vec!["push QWORD 4607182418800017408"]);

        let lines = vec!["push DWORD double(1.0)".to_string()];
        assert!(matches!(
            translate(&lines),
            Err(TranslateError::SizeMismatch { .. })
        ));
    }

    #[test]
    fn test_string_literal_extraction() {
        let out = run(&["globals: 0", "main:", "push \"hello\"", "end"]);
        assert_eq!(
            out,
            vec![
                "globals: 0",
                "main:",
                "push QWORD str:0",
                "end",
                "strings:",
                "0: \"hello\"",
            ]
        );
    }

    #[test]
    fn test_string_literals_deduplicate_in_first_appearance_order() {
        let out = run(&["push \"b\"", "push \"a\"", "push \"b\""]);
        assert_eq!(
            out,
            vec![
                "push QWORD str:0",
                "push QWORD str:1",
                "push QWORD str:0",
                "strings:",
                "0: \"b\"",
                "1: \"a\"",
            ]
        );
    }

    #[test]
    fn test_hwcall_exempt_from_forced_size() {
        let out = run(&["hwcall \"Terminal::WriteLine\""]);
        assert_eq!(
            out,
            vec![
                "hwcall str:0",
                "strings:",
                "0: \"Terminal::WriteLine\"",
            ]
        );
    }

    #[test]
    fn test_explicit_size_not_forced() {
        let out = run(&["push DWORD \"x\""]);
        assert_eq!(out[0], "push DWORD str:0");
    }

    #[test]
    fn test_no_strings_block_without_literals() {
        let out = run(&["globals: 0", "main:", "end"]);
        assert!(!out.iter().any(|l| l == "strings:"));
    }

    #[test]
    fn test_unterminated_literal() {
        let lines = vec!["push \"oops".to_string()];
        assert!(matches!(
            translate(&lines),
            Err(TranslateError::UnterminatedStringLiteral(_))
        ));
    }
}
