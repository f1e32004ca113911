//! Parses canonical direct assembly into a structured file: a globals
//! declaration, labelled instruction blocks in appearance order, and an
//! optional strings table.

use indexmap::IndexMap;
use ironarch::{inst, OperandSize};

use crate::error::{ParseError, ParseErrorKind};
use crate::strings;

/// One instruction as written: a lowercase mnemonic, the declared size if the
/// instruction takes one, and the raw operand texts in slot order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedInstruction {
    pub mnemonic: String,
    pub size: Option<OperandSize>,
    pub operands: [Option<String>; 3],
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedBlock {
    pub name: String,
    pub instructions: Vec<ParsedInstruction>,
}

/// Decoded strings-table entries, in index order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedStringTable {
    pub strings: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedFile {
    pub globals_size: u32,
    pub blocks: Vec<ParsedBlock>,
    pub string_table: ParsedStringTable,
}

/// Parses canonical lines. Blocks keep their order of appearance, so the
/// first block in source is the first laid out in the image.
pub fn parse_file(lines: &[String]) -> Result<ParsedFile, ParseError> {
    let lines: Vec<&str> = lines.iter().map(|l| l.trim()).collect();

    let globals_at = lines
        .iter()
        .position(|l| !l.is_empty())
        .ok_or_else(|| ParseError::new(1, ParseErrorKind::MissingGlobalsDeclaration))?;
    let globals_size = parse_globals(lines[globals_at], globals_at + 1)?;

    // labels partition everything after the declaration into blocks
    let mut labels: IndexMap<String, usize> = IndexMap::new();
    let mut strings_at: Option<usize> = None;
    let mut first_content = true;
    for (i, line) in lines.iter().enumerate().skip(globals_at + 1) {
        if line.is_empty() {
            continue;
        }
        match label_name(line) {
            Some(name) if name.eq_ignore_ascii_case("strings") => {
                if strings_at.is_some() {
                    return Err(ParseError::new(i + 1, ParseErrorKind::DuplicateStringsTable));
                }
                strings_at = Some(i);
            }
            Some(name) => {
                if labels.insert(name.to_string(), i).is_some() {
                    return Err(ParseError::new(
                        i + 1,
                        ParseErrorKind::DuplicateLabel(name.to_string()),
                    ));
                }
            }
            None if first_content => {
                return Err(ParseError::new(i + 1, ParseErrorKind::ExpectedLabel));
            }
            None => {}
        }
        first_content = false;
    }

    let mut blocks = Vec::with_capacity(labels.len());
    for (name, &start) in &labels {
        let mut instructions = Vec::new();
        for (i, line) in lines.iter().enumerate().skip(start + 1) {
            if line.is_empty() {
                continue;
            }
            if is_label_line(line) {
                break;
            }
            instructions.push(parse_instruction(line, i + 1)?);
        }
        if instructions.is_empty() {
            return Err(ParseError::new(
                start + 1,
                ParseErrorKind::EmptyBlock(name.clone()),
            ));
        }
        blocks.push(ParsedBlock {
            name: name.clone(),
            instructions,
        });
    }

    let mut string_table = ParsedStringTable::default();
    if let Some(start) = strings_at {
        for (i, line) in lines.iter().enumerate().skip(start + 1) {
            if line.is_empty() {
                continue;
            }
            if is_label_line(line) {
                break;
            }
            let (index, text) = parse_string_entry(line, i + 1)?;
            let expected = string_table.strings.len();
            if index != expected {
                return Err(ParseError::new(
                    i + 1,
                    ParseErrorKind::StringIndexMismatch {
                        expected,
                        found: index,
                    },
                ));
            }
            string_table.strings.push(text);
        }
        if string_table.strings.is_empty() {
            return Err(ParseError::new(start + 1, ParseErrorKind::EmptyStringsTable));
        }
    }

    Ok(ParsedFile {
        globals_size,
        blocks,
        string_table,
    })
}

fn parse_globals(line: &str, line_number: usize) -> Result<u32, ParseError> {
    let Some(rest) = line.strip_prefix("globals:") else {
        return Err(ParseError::new(
            line_number,
            ParseErrorKind::MissingGlobalsDeclaration,
        ));
    };
    let rest = rest.trim();
    rest.parse::<u32>()
        .map_err(|_| ParseError::new(line_number, ParseErrorKind::InvalidGlobalsSize(rest.to_string())))
}

fn parse_instruction(line: &str, line_number: usize) -> Result<ParsedInstruction, ParseError> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    let mnemonic = tokens[0].to_ascii_lowercase();
    let info = inst::lookup(&mnemonic).ok_or_else(|| {
        ParseError::new(line_number, ParseErrorKind::UnknownMnemonic(tokens[0].to_string()))
    })?;

    let mut size = None;
    let mut operands_at = 1;
    if info.has_size {
        let token = tokens.get(1).ok_or_else(|| {
            ParseError::new(line_number, ParseErrorKind::MissingSizeOperand(mnemonic.clone()))
        })?;
        let parsed = OperandSize::parse(token).ok_or_else(|| {
            ParseError::new(line_number, ParseErrorKind::InvalidSize(token.to_string()))
        })?;
        size = Some(parsed);
        operands_at = 2;
    }

    let rest = &tokens[operands_at.min(tokens.len())..];
    if rest.len() != info.operand_count as usize {
        return Err(ParseError::new(
            line_number,
            ParseErrorKind::OperandCountMismatch {
                mnemonic,
                expected: info.operand_count,
                found: rest.len(),
            },
        ));
    }

    let mut operands: [Option<String>; 3] = [None, None, None];
    for (slot, token) in rest.iter().enumerate() {
        operands[slot] = Some(token.to_string());
    }
    Ok(ParsedInstruction {
        mnemonic,
        size,
        operands,
    })
}

fn parse_string_entry(line: &str, line_number: usize) -> Result<(usize, String), ParseError> {
    let malformed = || ParseError::new(line_number, ParseErrorKind::MalformedStringEntry);

    let colon = line.find(':').ok_or_else(malformed)?;
    let index: usize = line[..colon].trim().parse().map_err(|_| malformed())?;
    let text = line[colon + 1..].trim();
    let inner = text
        .strip_prefix('"')
        .and_then(|t| t.strip_suffix('"'))
        .ok_or_else(malformed)?;
    let decoded = strings::unescape(inner)
        .map_err(|e| ParseError::new(line_number, ParseErrorKind::from(e)))?;
    Ok((index, decoded))
}

// ----------------------------------------------------------------
// Shared lexical helpers

/// `[A-Za-z_][A-Za-z0-9_]*`, matched in full.
pub(crate) fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

pub(crate) fn is_label_line(line: &str) -> bool {
    label_name(line).is_some()
}

/// The identifier of a label line (`name:` with nothing after the colon).
pub(crate) fn label_name(line: &str) -> Option<&str> {
    let name = line.strip_suffix(':')?;
    is_identifier(name).then_some(name)
}
