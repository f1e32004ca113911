use num_enum::{IntoPrimitive, TryFromPrimitive};
use strum::{Display, EnumString};

/// The thirteen IronArc processor registers. The discriminant is the
/// ordinal encoded in register operand bytes (low six bits).
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
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[repr(u8)]
pub enum Register {
    Eax,
    Ebx,
    Ecx,
    Edx,
    Eex,
    Efx,
    Egx,
    Ehx,
    Ebp,
    Esp,
    Eip,
    Eflags,
    Erp,
}

impl Register {
    pub fn parse(s: &str) -> Option<Self> {
        s.parse::<Self>().ok()
    }
}
