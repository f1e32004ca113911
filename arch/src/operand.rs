use num_enum::{IntoPrimitive, TryFromPrimitive};
use strum::{Display, EnumString};

/// Operand size declared by an instruction. The discriminant is the value
/// packed into the top two bits of a flags byte.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    TryFromPrimitive,
    IntoPrimitive,
    EnumString,
    Display,
)]
#[strum(serialize_all = "UPPERCASE", ascii_case_insensitive)]
#[repr(u8)]
pub enum OperandSize {
    Byte = 0,
    Word = 1,
    DWord = 2,
    QWord = 3,
}

impl OperandSize {
    pub fn parse(s: &str) -> Option<Self> {
        s.parse::<Self>().ok()
    }

    /// Width in bytes of a numeric literal of this size.
    pub fn byte_count(self) -> usize {
        match self {
            OperandSize::Byte => 1,
            OperandSize::Word => 2,
            OperandSize::DWord => 4,
            OperandSize::QWord => 8,
        }
    }

    /// Whether a token is one of the size keywords (`byte word dword qword`).
    pub fn is_size_keyword(s: &str) -> bool {
        Self::parse(s).is_some()
    }
}

/// The 2-bit operand type code carried in a flags byte. Labels are realized
/// as memory addresses once resolved, so they share code 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum WireKind {
    Address = 0,
    Register = 1,
    Numeric = 2,
    StringRef = 3,
}
