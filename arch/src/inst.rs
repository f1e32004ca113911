use std::collections::HashMap;

use bimap::BiMap;
use once_cell::sync::Lazy;

use crate::operand::OperandSize;

/// Encoding metadata for one IronArc instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstructionInfo {
    /// Display name, suitable for diagnostics.
    pub proper_name: &'static str,
    /// Lookup key in assembly source, always lowercase.
    pub mnemonic: &'static str,
    /// Two-byte opcode written little-endian at the start of the encoding.
    pub opcode: u16,
    /// Whether a flags byte follows the opcode.
    pub has_flags: bool,
    /// Whether the instruction carries an explicit operand-size specifier,
    /// both as a size token in source and as the top two flags-byte bits.
    pub has_size: bool,
    /// Number of syntactic operands (0 to 3).
    pub operand_count: u8,
    /// Whether operands may be block labels.
    pub allows_labels: bool,
    /// The unary long-word class: two syntactic operands whose destination
    /// type bits occupy the low-order flags position, keeping the binary
    /// layout uniform with the three-operand long-word instructions.
    pub implicit_second_operand: bool,
    /// Per-operand size overrides that apply regardless of the declared size.
    pub implicit_sizes: [Option<OperandSize>; 3],
}

impl InstructionInfo {
    /// An instruction with no flags byte. Its operands, if any, are always
    /// encoded as 8-byte addresses (labels and string references included).
    const fn plain(
        proper_name: &'static str,
        mnemonic: &'static str,
        opcode: u16,
        operand_count: u8,
        allows_labels: bool,
    ) -> Self {
        InstructionInfo {
            proper_name,
            mnemonic,
            opcode,
            has_flags: false,
            has_size: false,
            operand_count,
            allows_labels,
            implicit_second_operand: false,
            implicit_sizes: [None; 3],
        }
    }

    /// An instruction with a flags byte and an explicit size specifier.
    const fn sized(
        proper_name: &'static str,
        mnemonic: &'static str,
        opcode: u16,
        operand_count: u8,
    ) -> Self {
        InstructionInfo {
            proper_name,
            mnemonic,
            opcode,
            has_flags: true,
            has_size: true,
            operand_count,
            allows_labels: false,
            implicit_second_operand: false,
            implicit_sizes: [None; 3],
        }
    }

    /// A three-operand long-word instruction: the declared size names the
    /// element width, but the operands themselves are true 64-bit values.
    const fn long3(proper_name: &'static str, mnemonic: &'static str, opcode: u16) -> Self {
        InstructionInfo {
            implicit_sizes: [Some(OperandSize::QWord); 3],
            ..Self::sized(proper_name, mnemonic, opcode, 3)
        }
    }

    /// A unary long-word instruction: one source operand and a destination,
    /// with the destination's type bits in the low-order flags position.
    const fn long_unary(proper_name: &'static str, mnemonic: &'static str, opcode: u16) -> Self {
        InstructionInfo {
            implicit_second_operand: true,
            implicit_sizes: [Some(OperandSize::QWord), Some(OperandSize::QWord), None],
            ..Self::sized(proper_name, mnemonic, opcode, 2)
        }
    }
}

/// Every IronArc instruction, in opcode order.
pub static TABLE: &[InstructionInfo] = &[
    // Control flow (0x00__)
    InstructionInfo::plain("No Operation", "nop", 0x0000, 0, false),
    InstructionInfo::plain("End", "end", 0x0001, 0, false),
    InstructionInfo::plain("Jump", "jmp", 0x0002, 1, true),
    InstructionInfo::plain("Call", "call", 0x0003, 1, true),
    InstructionInfo::plain("Return", "ret", 0x0004, 0, false),
    InstructionInfo::plain("Jump if Equal", "je", 0x0005, 1, true),
    InstructionInfo::plain("Jump if Not Equal", "jne", 0x0006, 1, true),
    InstructionInfo::plain("Jump if Less Than", "jlt", 0x0007, 1, true),
    InstructionInfo::plain("Jump if Greater Than", "jgt", 0x0008, 1, true),
    InstructionInfo::plain("Jump if Less Than or Equal To", "jlte", 0x0009, 1, true),
    InstructionInfo::plain("Jump if Greater Than or Equal To", "jgte", 0x000A, 1, true),
    InstructionInfo::plain("Absolute Jump", "jmpa", 0x000B, 1, true),
    InstructionInfo::plain("Hardware Call", "hwcall", 0x000C, 1, false),
    InstructionInfo::plain("Stack Argument Prologue", "stackargs", 0x000D, 0, false),
    // Data operations (0x01__)
    InstructionInfo::sized("Move Data", "mov", 0x0100, 2),
    // movln takes no size token; its source and destination are pointers
    // (QWORD by default) and its length operand is always a DWORD.
    InstructionInfo {
        proper_name: "Move Data with Length",
        mnemonic: "movln",
        opcode: 0x0101,
        has_flags: true,
        has_size: false,
        operand_count: 3,
        allows_labels: false,
        implicit_second_operand: false,
        implicit_sizes: [None, None, Some(OperandSize::DWord)],
    },
    InstructionInfo::sized("Push to Stack", "push", 0x0102, 1),
    InstructionInfo::sized("Pop from Stack", "pop", 0x0103, 1),
    InstructionInfo::sized("Read Array Value", "arrayread", 0x0104, 1),
    InstructionInfo::sized("Write Array Value", "arraywrite", 0x0105, 2),
    // Integral/bitwise stack operations (0x020_)
    InstructionInfo::sized("Stack Addition", "add", 0x0200, 0),
    InstructionInfo::sized("Stack Subtraction", "sub", 0x0201, 0),
    InstructionInfo::sized("Stack Multiplication", "mult", 0x0202, 0),
    InstructionInfo::sized("Stack Division", "div", 0x0203, 0),
    InstructionInfo::sized("Stack Modulus Division", "mod", 0x0204, 0),
    InstructionInfo::sized("Stack Increment", "inc", 0x0205, 0),
    InstructionInfo::sized("Stack Decrement", "dec", 0x0206, 0),
    InstructionInfo::sized("Stack Bitwise AND", "bwand", 0x0207, 0),
    InstructionInfo::sized("Stack Bitwise OR", "bwor", 0x0208, 0),
    InstructionInfo::sized("Stack Bitwise XOR", "bwxor", 0x0209, 0),
    InstructionInfo::sized("Stack Bitwise NOT", "bwnot", 0x020A, 0),
    InstructionInfo::sized("Stack Bitwise Shift Left", "lshift", 0x020B, 0),
    InstructionInfo::sized("Stack Bitwise Shift Right", "rshift", 0x020C, 0),
    InstructionInfo::sized("Stack Logical AND", "land", 0x020D, 0),
    InstructionInfo::sized("Stack Logical OR", "lor", 0x020E, 0),
    InstructionInfo::sized("Stack Logical XOR", "lxor", 0x020F, 0),
    InstructionInfo::sized("Stack Logical NOT", "lnot", 0x0210, 0),
    InstructionInfo::sized("Stack Comparison", "cmp", 0x0211, 0),
    // Long-word operations (0x021_ onward)
    InstructionInfo::long3("Long Addition", "addl", 0x0212),
    InstructionInfo::long3("Long Subtraction", "subl", 0x0213),
    InstructionInfo::long3("Long Multiplication", "multl", 0x0214),
    InstructionInfo::long3("Long Division", "divl", 0x0215),
    InstructionInfo::long3("Long Modulus Division", "modl", 0x0216),
    InstructionInfo::long_unary("Long Increment", "incl", 0x0217),
    InstructionInfo::long_unary("Long Decrement", "decl", 0x0218),
    InstructionInfo::long3("Long Bitwise AND", "bwandl", 0x0219),
    InstructionInfo::long3("Long Bitwise OR", "bworl", 0x021A),
    InstructionInfo::long3("Long Bitwise XOR", "bwxorl", 0x021B),
    InstructionInfo::long_unary("Long Bitwise NOT", "bwnotl", 0x021C),
    InstructionInfo::long3("Long Bitwise Shift Left", "lshiftl", 0x021D),
    InstructionInfo::long3("Long Bitwise Shift Right", "rshiftl", 0x021E),
    InstructionInfo::long3("Long Logical AND", "landl", 0x021F),
    InstructionInfo::long3("Long Logical OR", "lorl", 0x0220),
    InstructionInfo::long3("Long Logical XOR", "lxorl", 0x0221),
    InstructionInfo::long_unary("Long Logical NOT", "lnotl", 0x0222),
    InstructionInfo::long3("Long Comparison", "cmpl", 0x0223),
    // Floating point stack operations (0x028_)
    InstructionInfo::sized("Floating Stack Addition", "fadd", 0x0280, 0),
    InstructionInfo::sized("Floating Stack Subtraction", "fsub", 0x0281, 0),
    InstructionInfo::sized("Floating Stack Multiplication", "fmult", 0x0282, 0),
    InstructionInfo::sized("Floating Stack Division", "fdiv", 0x0283, 0),
    InstructionInfo::sized("Floating Stack Modulus Division", "fmod", 0x0284, 0),
    InstructionInfo::sized("Floating Stack Comparison", "fcmp", 0x0285, 0),
    InstructionInfo::sized("Floating Stack Square Root", "fsqrt", 0x0286, 0),
];

static BY_MNEMONIC: Lazy<HashMap<&'static str, &'static InstructionInfo>> =
    Lazy::new(|| TABLE.iter().map(|info| (info.mnemonic, info)).collect());

static OPCODES: Lazy<BiMap<&'static str, u16>> =
    Lazy::new(|| TABLE.iter().map(|info| (info.mnemonic, info.opcode)).collect());

/// Looks up an instruction by mnemonic, case-insensitively.
pub fn lookup(mnemonic: &str) -> Option<&'static InstructionInfo> {
    BY_MNEMONIC
        .get(mnemonic.to_ascii_lowercase().as_str())
        .copied()
}

/// Looks up an instruction by opcode. Opcodes are unique across the table,
/// so at most one instruction can match.
pub fn lookup_by_opcode(opcode: u16) -> Option<&'static InstructionInfo> {
    OPCODES
        .get_by_right(&opcode)
        .and_then(|mnemonic| BY_MNEMONIC.get(mnemonic).copied())
}
