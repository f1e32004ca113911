//! Turns a binary image back into canonical direct assembly. Decoding is
//! more tolerant than assembly: an unknown opcode becomes a `?? ??` marker
//! and a too-new version yields a diagnostic string, while anything that
//! breaks the byte stream itself (bad magic, truncation) is an error.

use std::collections::HashMap;

use ironarch::{inst, OperandSize, Register, WireKind};

use crate::assemble::{operand_shifts, STRING_PLACEHOLDER_TAG};
use crate::error::DisasmError;
use crate::link::{ASSEMBLER_VERSION, HEADER_SIZE, MAGIC, SPEC_VERSION};
use crate::strings;

/// Emitted in place of an instruction whose opcode is not in the table.
/// Decoding advances exactly two bytes so later instructions may resync.
pub const ILLEGAL_INSTRUCTION: &str = "?? ??";

const MAX_SUPPORTED_SPEC_VERSION: u32 = SPEC_VERSION;
const MAX_SUPPORTED_ASSEMBLER_VERSION: u32 = ASSEMBLER_VERSION;

/// Width of the address column in verbose output.
const ADDRESS_COLUMN_WIDTH: usize = 20;

// ----------------------------------------------------------------
// Byte-stream reader

struct Reader<'a> {
    buffer: &'a [u8],
    position: usize,
}

impl<'a> Reader<'a> {
    fn new(buffer: &'a [u8], position: usize) -> Self {
        Reader { buffer, position }
    }

    fn take(&mut self, count: usize) -> Result<&'a [u8], DisasmError> {
        let end = self
            .position
            .checked_add(count)
            .filter(|&end| end <= self.buffer.len())
            .ok_or(DisasmError::UnexpectedEof(self.position))?;
        let bytes = &self.buffer[self.position..end];
        self.position = end;
        Ok(bytes)
    }

    fn read_u8(&mut self) -> Result<u8, DisasmError> {
        Ok(self.take(1)?[0])
    }

    fn read_u16(&mut self) -> Result<u16, DisasmError> {
        let bytes = self.take(2)?;
        Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
    }

    fn read_u32(&mut self) -> Result<u32, DisasmError> {
        let bytes = self.take(4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn read_i32(&mut self) -> Result<i32, DisasmError> {
        Ok(self.read_u32()? as i32)
    }

    fn read_u64(&mut self) -> Result<u64, DisasmError> {
        let bytes = self.take(8)?;
        let mut array = [0u8; 8];
        array.copy_from_slice(bytes);
        Ok(u64::from_le_bytes(array))
    }
}

// ----------------------------------------------------------------
// Instruction decoding

/// Decodes the single instruction at `offset` in `buffer`, with no string
/// table in scope. Returns the text, the number of bytes consumed, and the
/// raw bytes.
pub fn decode_one(buffer: &[u8], offset: usize) -> Result<(String, usize, Vec<u8>), DisasmError> {
    let mut reader = Reader::new(buffer, offset);
    decode_instruction(&mut reader, &HashMap::new())
}

fn decode_instruction(
    reader: &mut Reader,
    strings_by_address: &HashMap<u64, usize>,
) -> Result<(String, usize, Vec<u8>), DisasmError> {
    let start = reader.position;
    let opcode = reader.read_u16()?;
    let Some(info) = inst::lookup_by_opcode(opcode) else {
        let raw = reader.buffer[start..reader.position].to_vec();
        return Ok((ILLEGAL_INSTRUCTION.to_string(), 2, raw));
    };

    let mut size = None;
    let mut kinds: [Option<WireKind>; 3] = [None; 3];
    if info.has_flags {
        let flags = reader.read_u8()?;
        if info.has_size {
            size = OperandSize::try_from(flags >> 6).ok();
        }
        let shifts = operand_shifts(info);
        for slot in 0..info.operand_count as usize {
            kinds[slot] = WireKind::try_from((flags >> shifts[slot]) & 0b11).ok();
        }
    } else {
        // flagless instructions only ever carry address-shaped operands
        for slot in 0..info.operand_count as usize {
            kinds[slot] = Some(WireKind::Address);
        }
    }

    let mut text = String::from(info.mnemonic);
    if let Some(size) = size {
        text.push(' ');
        text.push_str(&size.to_string());
    }
    for slot in 0..info.operand_count as usize {
        let Some(kind) = kinds[slot] else { continue };
        let effective_size = info.implicit_sizes[slot].or(size);
        text.push(' ');
        text.push_str(&decode_operand(reader, kind, effective_size, strings_by_address)?);
    }

    let consumed = reader.position - start;
    let raw = reader.buffer[start..reader.position].to_vec();
    Ok((text, consumed, raw))
}

fn decode_operand(
    reader: &mut Reader,
    kind: WireKind,
    size: Option<OperandSize>,
    strings_by_address: &HashMap<u64, usize>,
) -> Result<String, DisasmError> {
    match kind {
        WireKind::Address => {
            let value = reader.read_u64()?;
            let indirect = value & (1 << 63) != 0;
            let address = value & !(1 << 63);
            let star = if indirect { "*" } else { "" };
            Ok(format!("{star}0x{address:016x}"))
        }
        WireKind::Register => {
            let byte = reader.read_u8()?;
            let indirect = byte & 0x80 != 0;
            let has_offset = byte & 0x40 != 0;
            let ordinal = byte & 0x3F;
            let offset = if has_offset {
                Some(reader.read_i32()?)
            } else {
                None
            };
            let Ok(register) = Register::try_from(ordinal) else {
                return Ok(format!("~UNKNOWN REGISTER 0x{ordinal:02X}~"));
            };
            match offset {
                Some(_) if !indirect => {
                    Ok("~REGISTER HAS OFFSET WITHOUT BEING A POINTER~".to_string())
                }
                Some(offset) if offset >= 0 => Ok(format!("*{register}+{offset}")),
                Some(offset) => Ok(format!("*{register}{offset}")),
                None if indirect => Ok(format!("*{register}")),
                None => Ok(register.to_string()),
            }
        }
        WireKind::Numeric => {
            let size = size.unwrap_or(OperandSize::QWord);
            let value = match size {
                OperandSize::Byte => u64::from(reader.read_u8()?),
                OperandSize::Word => {
                    let bytes = reader.take(2)?;
                    u64::from(u16::from_le_bytes([bytes[0], bytes[1]]))
                }
                OperandSize::DWord => u64::from(reader.read_u32()?),
                OperandSize::QWord => reader.read_u64()?,
            };
            Ok(value.to_string())
        }
        WireKind::StringRef => {
            let value = reader.read_u64()?;
            if value & 0xFFFF_FFFF_0000_0000 == STRING_PLACEHOLDER_TAG {
                Ok(format!("str:{}", value as u32))
            } else if let Some(index) = strings_by_address.get(&value) {
                Ok(format!("str:{index}"))
            } else {
                Ok(format!("0x{value:016x}"))
            }
        }
    }
}

// ----------------------------------------------------------------
// Whole-image disassembly

/// Disassembles a complete image into canonical text. With `show_addresses`
/// and `show_bytes` the output gains an address column and a raw-bytes
/// column.
pub fn disassemble_program(
    image: &[u8],
    show_addresses: bool,
    show_bytes: bool,
) -> Result<String, DisasmError> {
    let mut reader = Reader::new(image, 0);
    let magic = reader.read_u32().map_err(|_| DisasmError::NotAnImage)?;
    if magic != MAGIC {
        return Err(DisasmError::NotAnImage);
    }
    let spec_version = reader.read_u32().map_err(|_| DisasmError::NotAnImage)?;
    if spec_version > MAX_SUPPORTED_SPEC_VERSION {
        return Ok(format!(
            "Program not supported: specification version 0x{spec_version:08X} is newer than 0x{MAX_SUPPORTED_SPEC_VERSION:08X}."
        ));
    }
    let assembler_version = reader.read_u32().map_err(|_| DisasmError::NotAnImage)?;
    if assembler_version > MAX_SUPPORTED_ASSEMBLER_VERSION {
        return Ok(format!(
            "Program not supported: assembler version 0x{assembler_version:08X} is newer than 0x{MAX_SUPPORTED_ASSEMBLER_VERSION:08X}."
        ));
    }
    let first_instruction_address = reader.read_u64().map_err(|_| DisasmError::NotAnImage)?;
    let strings_table_address = reader.read_u64().map_err(|_| DisasmError::NotAnImage)?;
    if first_instruction_address < HEADER_SIZE || strings_table_address < first_instruction_address
    {
        return Err(DisasmError::NotAnImage);
    }
    let globals_size = first_instruction_address - HEADER_SIZE;
    let code_length = strings_table_address - first_instruction_address;

    let (table, strings_by_address) = scan_string_table(image, strings_table_address as usize)?;

    let mut reader = Reader::new(image, first_instruction_address as usize);
    let mut addresses = Vec::new();
    let mut texts = Vec::new();
    let mut raw_columns = Vec::new();
    let mut consumed: u64 = 0;
    while consumed < code_length {
        let at = reader.position;
        let (text, length, raw) = decode_instruction(&mut reader, &strings_by_address)?;
        addresses.push(format!("0x{at:016x}"));
        texts.push(text);
        raw_columns.push(hex_bytes(&raw));
        consumed += length as u64;
    }

    let mut out = String::new();
    out.push_str(&format!("globals: {globals_size}\n"));
    out.push_str("main:\n");
    let text_width = texts.iter().map(String::len).max().unwrap_or(0) + 2;
    for i in 0..texts.len() {
        let mut line = String::new();
        if show_addresses {
            line.push_str(&pad(&addresses[i], ADDRESS_COLUMN_WIDTH));
        }
        if show_bytes {
            line.push_str(&pad(&texts[i], text_width));
            line.push_str(&raw_columns[i]);
        } else if show_addresses {
            line.push_str(&texts[i]);
        } else {
            line.push('\t');
            line.push_str(&texts[i]);
        }
        out.push_str(line.trim_end());
        out.push('\n');
    }

    if !table.is_empty() {
        out.push_str("strings:\n");
        for (index, entry) in table.iter().enumerate() {
            out.push_str(&format!("\t{index}: \"{}\"\n", strings::escape(entry)));
        }
    }
    Ok(out)
}

/// Reads every string entry from the table at the end of the image and maps
/// each entry's address back to its index, for rebuilding `str:N` operands.
fn scan_string_table(
    image: &[u8],
    table_address: usize,
) -> Result<(Vec<String>, HashMap<u64, usize>), DisasmError> {
    let mut entries = Vec::new();
    let mut by_address = HashMap::new();
    let mut reader = Reader::new(image, table_address);
    while reader.position < image.len() {
        by_address.insert(reader.position as u64, entries.len());
        let length = reader.read_u32()? as usize;
        let bytes = reader.take(length)?;
        entries.push(String::from_utf8_lossy(bytes).into_owned());
    }
    Ok((entries, by_address))
}

fn hex_bytes(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{b:02X}"))
        .collect::<Vec<_>>()
        .join(" ")
}

fn pad(s: &str, width: usize) -> String {
    let mut out = s.to_string();
    while out.len() < width {
        out.push(' ');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assemble::assemble_file;
    use crate::link::link_file;
    use crate::parse::parse_file;

    fn assemble(source: &[&str]) -> Vec<u8> {
        let lines: Vec<String> = source.iter().map(|s| s.to_string()).collect();
        let parsed = parse_file(&lines).unwrap();
        let assembled = assemble_file(&parsed).unwrap();
        link_file(&assembled, &parsed.string_table).unwrap()
    }

    #[test]
    fn test_round_trip_simple_program() {
        let image = assemble(&["globals: 0", "main:", "push DWORD 5", "end"]);
        let text = disassemble_program(&image, false, false).unwrap();
        assert_eq!(text, "globals: 0\nmain:\n\tpush DWORD 5\n\tend\n");
    }

    #[test]
    fn test_bad_magic() {
        let image = b"nope nope nope nope nope nope".to_vec();
        assert_eq!(
            disassemble_program(&image, false, false),
            Err(DisasmError::NotAnImage)
        );
    }

    #[test]
    fn test_newer_version_yields_diagnostic() {
        let mut image = assemble(&["globals: 0", "main:", "end"]);
        image[4..8].copy_from_slice(&0x7FFF_0000u32.to_le_bytes());
        let text = disassemble_program(&image, false, false).unwrap();
        assert!(text.starts_with("Program not supported"));
    }

    #[test]
    fn test_unknown_opcode_marker() {
        let mut image = assemble(&["globals: 0", "main:", "nop", "end"]);
        // overwrite nop's opcode with one no instruction uses
        image[28..30].copy_from_slice(&0xFFFFu16.to_le_bytes());
        let text = disassemble_program(&image, false, false).unwrap();
        assert_eq!(text, "globals: 0\nmain:\n\t?? ??\n\tend\n");
    }

    #[test]
    fn test_decode_one() {
        let buffer = vec![0x02, 0x01, 0xA0, 0x05, 0x00, 0x00, 0x00];
        let (text, length, raw) = decode_one(&buffer, 0).unwrap();
        assert_eq!(text, "push DWORD 5");
        assert_eq!(length, 7);
        assert_eq!(raw, buffer);
    }

    #[test]
    fn test_decode_one_unlinked_string_placeholder() {
        let mut buffer = vec![0x02, 0x01, 0xF0];
        buffer.extend_from_slice(&(STRING_PLACEHOLDER_TAG | 3).to_le_bytes());
        let (text, _, _) = decode_one(&buffer, 0).unwrap();
        assert_eq!(text, "push QWORD str:3");
    }

    #[test]
    fn test_register_operands_round_trip() {
        let image = assemble(&[
            "globals: 0",
            "main:",
            "mov QWORD *ebp-8 eax",
            "mov QWORD *eax+70 *esp",
            "end",
        ]);
        let text = disassemble_program(&image, false, false).unwrap();
        assert!(text.contains("mov QWORD *ebp-8 eax"));
        assert!(text.contains("mov QWORD *eax+70 *esp"));
    }

    #[test]
    fn test_corrupt_register_offset_marker() {
        // register byte with the offset bit but not the pointer bit
        let mut buffer = vec![0x02, 0x01, 0x90, 0x40];
        buffer.extend_from_slice(&8i32.to_le_bytes());
        let (text, _, _) = decode_one(&buffer, 0).unwrap();
        assert!(text.contains("~REGISTER HAS OFFSET WITHOUT BEING A POINTER~"));
    }

    #[test]
    fn test_string_table_round_trip() {
        let image = assemble(&[
            "globals: 0",
            "main:",
            "hwcall str:0",
            "push QWORD str:1",
            "end",
            "strings:",
            "0: \"Terminal::WriteLine\"",
            "1: \"a\\nb\"",
        ]);
        let text = disassemble_program(&image, false, false).unwrap();
        // hwcall is flagless, so its linked operand reads back as an address
        assert!(text.contains("hwcall 0x"));
        assert!(text.contains("push QWORD str:1"));
        assert!(text.contains("strings:"));
        assert!(text.contains("0: \"Terminal::WriteLine\""));
        assert!(text.contains("1: \"a\\nb\""));
    }

    #[test]
    fn test_globals_size_recovered() {
        let image = assemble(&["globals: 64", "main:", "end"]);
        let text = disassemble_program(&image, false, false).unwrap();
        assert!(text.starts_with("globals: 64\n"));
    }

    #[test]
    fn test_flagless_jump_decodes_as_address() {
        let image = assemble(&["globals: 0", "main:", "jmp exit", "exit:", "end"]);
        let text = disassemble_program(&image, false, false).unwrap();
        assert!(text.contains("jmp 0x0000000000000026"));
    }

    #[test]
    fn test_verbose_columns() {
        let image = assemble(&["globals: 0", "main:", "end"]);
        let text = disassemble_program(&image, true, true).unwrap();
        assert!(text.contains("0x000000000000001c"));
        assert!(text.contains("01 00"));
    }

    #[test]
    fn test_truncated_image() {
        let image = assemble(&["globals: 0", "main:", "push DWORD 5", "end"]);
        let result = disassemble_program(&image[..30], false, false);
        assert!(matches!(result, Err(DisasmError::UnexpectedEof(_))));
    }
}
