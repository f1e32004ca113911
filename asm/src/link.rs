//! Lays out the final image and patches every pending reference: header,
//! zeroed globals area, code in block appearance order, then the string
//! table.

use indexmap::IndexMap;
use serde::Serialize;

use crate::assemble::{AssembledFile, RefTarget};
use crate::error::LinkError;
use crate::parse::ParsedStringTable;

/// `IEXE` read as a little-endian u32.
pub const MAGIC: u32 = 0x4558_4549;
pub const SPEC_VERSION: u32 = 0x0002_0000;
pub const ASSEMBLER_VERSION: u32 = 0x0002_0000;

/// Magic, two versions, first-instruction address, strings-table address.
pub const HEADER_SIZE: u64 = 4 + 4 + 4 + 8 + 8;

/// The addresses chosen for every block and strings-table entry. Also
/// serializable, for the optional address-map dump.
#[derive(Debug, Clone, Serialize)]
pub struct Layout {
    pub first_instruction_address: u64,
    pub strings_table_address: u64,
    pub blocks: IndexMap<String, u64>,
    pub strings: Vec<u64>,
}

/// Assigns addresses without emitting anything. Code begins right after the
/// globals area; each string entry occupies a 4-byte length plus its UTF-8
/// bytes.
pub fn compute_layout(file: &AssembledFile, table: &ParsedStringTable) -> Layout {
    let first_instruction_address = HEADER_SIZE + u64::from(file.globals_size);

    let mut blocks = IndexMap::with_capacity(file.blocks.len());
    let mut cursor = first_instruction_address;
    for block in &file.blocks {
        blocks.insert(block.name.clone(), cursor);
        cursor += block.size_in_bytes;
    }

    let strings_table_address = cursor;
    let mut strings = Vec::with_capacity(table.strings.len());
    for entry in &table.strings {
        strings.push(cursor);
        cursor += 4 + entry.len() as u64;
    }

    Layout {
        first_instruction_address,
        strings_table_address,
        blocks,
        strings,
    }
}

/// Produces the complete binary image. Any unresolved reference fails the
/// whole link; no partial image is returned.
pub fn link_file(file: &AssembledFile, table: &ParsedStringTable) -> Result<Vec<u8>, LinkError> {
    let layout = compute_layout(file, table);

    let image_size = layout.strings_table_address
        + table
            .strings
            .iter()
            .map(|s| 4 + s.len() as u64)
            .sum::<u64>();
    let mut image = Vec::with_capacity(image_size as usize);

    image.extend_from_slice(&MAGIC.to_le_bytes());
    image.extend_from_slice(&SPEC_VERSION.to_le_bytes());
    image.extend_from_slice(&ASSEMBLER_VERSION.to_le_bytes());
    image.extend_from_slice(&layout.first_instruction_address.to_le_bytes());
    image.extend_from_slice(&layout.strings_table_address.to_le_bytes());
    image.resize(image.len() + file.globals_size as usize, 0);

    for block in &file.blocks {
        for instruction in &block.instructions {
            let mut bytes = instruction.bytes.clone();
            for pending in &instruction.refs {
                let address = match &pending.target {
                    RefTarget::Label(name) => *layout
                        .blocks
                        .get(name)
                        .ok_or_else(|| LinkError::UnresolvedLabel(name.clone()))?,
                    RefTarget::StringIndex(index) => *layout
                        .strings
                        .get(*index as usize)
                        .ok_or(LinkError::UnresolvedStringIndex(*index))?,
                };
                bytes[pending.offset..pending.offset + 8]
                    .copy_from_slice(&address.to_le_bytes());
            }
            image.extend_from_slice(&bytes);
        }
    }

    for entry in &table.strings {
        image.extend_from_slice(&(entry.len() as u32).to_le_bytes());
        image.extend_from_slice(entry.as_bytes());
    }

    Ok(image)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assemble::assemble_file;
    use crate::parse::parse_file;

    fn link(source: &[&str]) -> Result<Vec<u8>, LinkError> {
        let lines: Vec<String> = source.iter().map(|s| s.to_string()).collect();
        let parsed = parse_file(&lines).unwrap();
        let assembled = assemble_file(&parsed).unwrap();
        link_file(&assembled, &parsed.string_table)
    }

    #[test]
    fn test_minimal_image_layout() {
        let image = link(&["globals: 0", "main:", "push DWORD 5", "end"]).unwrap();
        assert_eq!(&image[0..4], &MAGIC.to_le_bytes());
        assert_eq!(&image[4..8], &SPEC_VERSION.to_le_bytes());
        assert_eq!(&image[8..12], &ASSEMBLER_VERSION.to_le_bytes());
        assert_eq!(u64::from_le_bytes(image[12..20].try_into().unwrap()), 28);
        // 7 bytes for push, 2 for end
        assert_eq!(u64::from_le_bytes(image[20..28].try_into().unwrap()), 37);
        assert_eq!(&image[28..35], &[0x02, 0x01, 0xA0, 0x05, 0x00, 0x00, 0x00]);
        assert_eq!(&image[35..37], &[0x01, 0x00]);
        assert_eq!(image.len(), 37);
    }

    #[test]
    fn test_globals_area_is_zeroed() {
        let image = link(&["globals: 8", "main:", "end"]).unwrap();
        assert_eq!(u64::from_le_bytes(image[12..20].try_into().unwrap()), 36);
        assert_eq!(&image[28..36], &[0u8; 8]);
    }

    #[test]
    fn test_forward_label_reference() {
        let image = link(&["globals: 0", "main:", "jmp exit", "exit:", "end"]).unwrap();
        // jmp is 10 bytes, so exit begins at 38
        let target = u64::from_le_bytes(image[30..38].try_into().unwrap());
        assert_eq!(target, 38);
        assert_eq!(&image[38..40], &[0x01, 0x00]);
    }

    #[test]
    fn test_string_reference_patched() {
        let image = link(&[
            "globals: 0",
            "main:",
            "hwcall str:0",
            "end",
            "strings:",
            "0: \"hi\"",
        ])
        .unwrap();
        let strings_table_address = u64::from_le_bytes(image[20..28].try_into().unwrap());
        let patched = u64::from_le_bytes(image[30..38].try_into().unwrap());
        assert_eq!(patched, strings_table_address);
        let at = strings_table_address as usize;
        assert_eq!(&image[at..at + 4], &2u32.to_le_bytes());
        assert_eq!(&image[at + 4..at + 6], b"hi");
    }

    #[test]
    fn test_no_sentinel_survives_linking() {
        let image = link(&[
            "globals: 0",
            "main:",
            "jmp other",
            "other:",
            "push QWORD str:0",
            "call main",
            "end",
            "strings:",
            "0: \"hi\"",
        ])
        .unwrap();
        for window in image.windows(8) {
            let value = u64::from_le_bytes(window.try_into().unwrap());
            assert_ne!(value, 0xCCCC_CCCC_CCCC_CCCC);
            assert_ne!(value, 0xDDDD_DDDD_DDDD_DDDD);
            assert_ne!(value, 0xEEEE_EEEE_EEEE_EEEE);
            assert_ne!(value & 0xFFFF_FFFF_0000_0000, 0xAAAA_AAAA_0000_0000);
        }
    }

    #[test]
    fn test_unresolved_label() {
        let result = link(&["globals: 0", "main:", "jmp nowhere"]);
        assert!(matches!(result, Err(LinkError::UnresolvedLabel(_))));
    }

    #[test]
    fn test_unresolved_string_index() {
        let result = link(&[
            "globals: 0",
            "main:",
            "hwcall str:5",
            "strings:",
            "0: \"hi\"",
        ]);
        assert_eq!(result, Err(LinkError::UnresolvedStringIndex(5)));
    }

    #[test]
    fn test_linking_is_deterministic() {
        let source = [
            "globals: 4",
            "main:",
            "call helper",
            "end",
            "helper:",
            "push QWORD str:0",
            "ret",
            "strings:",
            "0: \"abc\"",
        ];
        assert_eq!(link(&source).unwrap(), link(&source).unwrap());
    }

    #[test]
    fn test_layout_block_addresses() {
        let lines: Vec<String> = ["globals: 0", "main:", "end", "after:", "nop"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let parsed = parse_file(&lines).unwrap();
        let assembled = assemble_file(&parsed).unwrap();
        let layout = compute_layout(&assembled, &parsed.string_table);
        assert_eq!(layout.first_instruction_address, 28);
        assert_eq!(layout.blocks["main"], 28);
        assert_eq!(layout.blocks["after"], 30);
        assert_eq!(layout.strings_table_address, 32);
    }
}
