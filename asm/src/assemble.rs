//! Encodes parsed instructions into their binary form: a little-endian
//! opcode, an optional flags byte, then the operands. Label and string
//! operands cannot be resolved yet, so each instruction carries a side table
//! of pending references for the linker to patch by offset.

use ironarch::{inst, InstructionInfo, OperandSize, Register, WireKind};

use crate::error::AssembleError;
use crate::parse::{is_identifier, ParsedBlock, ParsedFile, ParsedInstruction};

/// Recognizable fill patterns written where a label's address will go, one
/// per operand slot. The linker patches by recorded offset; the sentinels
/// exist so an unpatched slot is visible in a hex dump.
pub const LABEL_SENTINELS: [u64; 3] = [
    0xCCCC_CCCC_CCCC_CCCC,
    0xDDDD_DDDD_DDDD_DDDD,
    0xEEEE_EEEE_EEEE_EEEE,
];

/// Fill pattern for an unresolved string reference; the low dword holds the
/// table index.
pub const STRING_PLACEHOLDER_TAG: u64 = 0xAAAA_AAAA_0000_0000;

/// Longest possible encoding: 2-byte opcode, flags byte, three 8-byte
/// operands.
pub const MAX_INSTRUCTION_LENGTH: usize = 27;

/// A classified operand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operand {
    /// `0x` followed by exactly sixteen hex digits, optionally `*`-prefixed
    /// for indirection.
    Address { address: u64, indirect: bool },
    Register(Register),
    RegisterPointer(Register),
    RegisterPointerOffset(Register, i32),
    Literal(u64),
    StringRef(u32),
    Label(String),
}

impl Operand {
    /// Matches operand text against the canonical forms. Anything that fits
    /// no form but is a valid identifier is presumed to be a label.
    pub fn classify(text: &str) -> Result<Operand, AssembleError> {
        if let Some(address) = match_address(text)? {
            return Ok(address);
        }
        if let Some(register) = Register::parse(text) {
            return Ok(Operand::Register(register));
        }
        if let Some(pointer) = match_register_pointer(text)? {
            return Ok(pointer);
        }
        if !text.is_empty() && text.chars().all(|c| c.is_ascii_digit()) {
            let value = text
                .parse::<u64>()
                .map_err(|_| AssembleError::LiteralOutOfRange(text.to_string()))?;
            return Ok(Operand::Literal(value));
        }
        if let Some(rest) = text.strip_prefix("str:") {
            if !rest.is_empty() && rest.chars().all(|c| c.is_ascii_digit()) {
                let index = rest
                    .parse::<u32>()
                    .map_err(|_| AssembleError::UnrecognizedOperand(text.to_string()))?;
                return Ok(Operand::StringRef(index));
            }
        }
        if is_identifier(text) {
            return Ok(Operand::Label(text.to_string()));
        }
        Err(AssembleError::UnrecognizedOperand(text.to_string()))
    }

    fn wire_kind(&self) -> WireKind {
        match self {
            Operand::Address { .. } | Operand::Label(_) => WireKind::Address,
            Operand::Register(_)
            | Operand::RegisterPointer(_)
            | Operand::RegisterPointerOffset(..) => WireKind::Register,
            Operand::Literal(_) => WireKind::Numeric,
            Operand::StringRef(_) => WireKind::StringRef,
        }
    }
}

fn match_address(text: &str) -> Result<Option<Operand>, AssembleError> {
    let (body, indirect) = match text.strip_prefix('*') {
        Some(rest) => (rest, true),
        None => (text, false),
    };
    let Some(hex) = body.strip_prefix("0x") else {
        return Ok(None);
    };
    if hex.len() != 16 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return Ok(None);
    }
    let address = u64::from_str_radix(hex, 16)
        .map_err(|_| AssembleError::UnrecognizedOperand(text.to_string()))?;
    Ok(Some(Operand::Address { address, indirect }))
}

fn match_register_pointer(text: &str) -> Result<Option<Operand>, AssembleError> {
    let Some(body) = text.strip_prefix('*') else {
        return Ok(None);
    };
    if let Some(register) = Register::parse(body) {
        return Ok(Some(Operand::RegisterPointer(register)));
    }
    let Some(sign_at) = body.find(['+', '-']) else {
        return Ok(None);
    };
    let (name, rest) = body.split_at(sign_at);
    let Some(register) = Register::parse(name) else {
        return Ok(None);
    };
    let digits = &rest[1..];
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return Ok(None);
    }
    let magnitude: i64 = digits
        .parse()
        .map_err(|_| AssembleError::LiteralOutOfRange(text.to_string()))?;
    let offset = if rest.starts_with('-') {
        -magnitude
    } else {
        magnitude
    };
    let offset = i32::try_from(offset)
        .map_err(|_| AssembleError::LiteralOutOfRange(text.to_string()))?;
    Ok(Some(Operand::RegisterPointerOffset(register, offset)))
}

// ----------------------------------------------------------------
// Pending references

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefTarget {
    Label(String),
    StringIndex(u32),
}

/// One 8-byte field the linker must overwrite with a final address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingRef {
    pub slot: usize,
    /// Byte offset of the field within the instruction's encoding.
    pub offset: usize,
    pub target: RefTarget,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssembledInstruction {
    pub bytes: Vec<u8>,
    pub refs: Vec<PendingRef>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssembledBlock {
    pub name: String,
    pub instructions: Vec<AssembledInstruction>,
    pub size_in_bytes: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssembledFile {
    pub globals_size: u32,
    pub blocks: Vec<AssembledBlock>,
}

// ----------------------------------------------------------------
// Encoding

pub fn assemble_file(file: &ParsedFile) -> Result<AssembledFile, AssembleError> {
    let blocks = file
        .blocks
        .iter()
        .map(assemble_block)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(AssembledFile {
        globals_size: file.globals_size,
        blocks,
    })
}

pub fn assemble_block(block: &ParsedBlock) -> Result<AssembledBlock, AssembleError> {
    let instructions = block
        .instructions
        .iter()
        .map(assemble_instruction)
        .collect::<Result<Vec<_>, _>>()?;
    let size_in_bytes = instructions.iter().map(|i| i.bytes.len() as u64).sum();
    Ok(AssembledBlock {
        name: block.name.clone(),
        instructions,
        size_in_bytes,
    })
}

pub fn assemble_instruction(
    instruction: &ParsedInstruction,
) -> Result<AssembledInstruction, AssembleError> {
    let info = inst::lookup(&instruction.mnemonic)
        .ok_or_else(|| AssembleError::UnknownMnemonic(instruction.mnemonic.clone()))?;

    let mut bytes = Vec::with_capacity(MAX_INSTRUCTION_LENGTH);
    bytes.extend_from_slice(&info.opcode.to_le_bytes());
    let flags_at = bytes.len();
    if info.has_flags {
        bytes.push(0);
    }

    let mut flags: u8 = 0;
    if info.has_size {
        if let Some(size) = instruction.size {
            flags |= u8::from(size) << 6;
        }
    }

    let shifts = operand_shifts(info);
    let mut refs = Vec::new();
    for slot in 0..info.operand_count as usize {
        let Some(text) = &instruction.operands[slot] else {
            continue;
        };
        let operand = Operand::classify(text)?;
        if !info.has_flags
            && !matches!(
                operand,
                Operand::Address { .. } | Operand::Label(_) | Operand::StringRef(_)
            )
        {
            return Err(AssembleError::OperandMustBeAddress {
                mnemonic: info.mnemonic.to_string(),
                operand: text.clone(),
            });
        }
        let effective_size = info.implicit_sizes[slot]
            .or(instruction.size)
            .or((!info.has_size).then_some(OperandSize::QWord));
        encode_operand(&mut bytes, &mut refs, info, &operand, effective_size, slot)?;
        flags |= u8::from(operand.wire_kind()) << shifts[slot];
    }

    if info.has_flags {
        bytes[flags_at] = flags;
    }
    Ok(AssembledInstruction { bytes, refs })
}

/// Flags-byte bit positions for each operand slot. The unary long-word
/// class keeps its destination in the low-order position.
pub(crate) fn operand_shifts(info: &InstructionInfo) -> [u8; 3] {
    if info.implicit_second_operand {
        [4, 0, 0]
    } else {
        [4, 2, 0]
    }
}

fn encode_operand(
    bytes: &mut Vec<u8>,
    refs: &mut Vec<PendingRef>,
    info: &InstructionInfo,
    operand: &Operand,
    size: Option<OperandSize>,
    slot: usize,
) -> Result<(), AssembleError> {
    match operand {
        Operand::Address { address, indirect } => {
            if *address & (1 << 63) != 0 {
                return Err(AssembleError::AddressOutOfRange(*address));
            }
            let value = address | if *indirect { 1 << 63 } else { 0 };
            bytes.extend_from_slice(&value.to_le_bytes());
        }
        Operand::Register(register) => bytes.push(u8::from(*register)),
        Operand::RegisterPointer(register) => bytes.push(u8::from(*register) | 0x80),
        Operand::RegisterPointerOffset(register, offset) => {
            bytes.push(u8::from(*register) | 0xC0);
            bytes.extend_from_slice(&offset.to_le_bytes());
        }
        Operand::Literal(value) => {
            let size = size.ok_or(AssembleError::MissingOperandSize)?;
            match size {
                OperandSize::Byte => bytes.push(*value as u8),
                OperandSize::Word => bytes.extend_from_slice(&(*value as u16).to_le_bytes()),
                OperandSize::DWord => bytes.extend_from_slice(&(*value as u32).to_le_bytes()),
                OperandSize::QWord => bytes.extend_from_slice(&value.to_le_bytes()),
            }
        }
        Operand::StringRef(index) => {
            refs.push(PendingRef {
                slot,
                offset: bytes.len(),
                target: RefTarget::StringIndex(*index),
            });
            let placeholder = STRING_PLACEHOLDER_TAG | u64::from(*index);
            bytes.extend_from_slice(&placeholder.to_le_bytes());
        }
        Operand::Label(name) => {
            if !info.allows_labels {
                return Err(AssembleError::LabelNotAllowed(info.mnemonic.to_string()));
            }
            refs.push(PendingRef {
                slot,
                offset: bytes.len(),
                target: RefTarget::Label(name.clone()),
            });
            bytes.extend_from_slice(&LABEL_SENTINELS[slot].to_le_bytes());
        }
    }
    Ok(())
}
