use strum_macros::{Display, EnumIter, EnumString};

/// An 8-bit register as it appears in the `r` slot of an opcode.
///
/// The discriminant is the 3-bit register field used by the CPU. Slot 6 is taken by `(hl)` which
/// is modelled as an [`Indirect`] operand instead.
#[derive(Debug, Hash, Eq, PartialEq, Clone, Copy, Display, EnumString, EnumIter)]
#[strum(serialize_all = "lowercase")]
pub enum Reg8 {
    B = 0,
    C = 1,
    D = 2,
    E = 3,
    H = 4,
    L = 5,
    A = 7,
}

impl Reg8 {
    pub fn code(self) -> u8 {
        self as u8
    }
}

/// A 16-bit register pair in the `rr` slot of an opcode.
#[derive(Debug, Hash, Eq, PartialEq, Clone, Copy, Display, EnumString, EnumIter)]
#[strum(serialize_all = "lowercase")]
pub enum Reg16 {
    BC = 0,
    DE = 1,
    HL = 2,
    SP = 3,
}

impl Reg16 {
    pub fn code(self) -> u8 {
        self as u8
    }
}

/// Index registers, selected by an opcode prefix.
#[derive(Debug, Hash, Eq, PartialEq, Clone, Copy, Display, EnumString, EnumIter)]
#[strum(serialize_all = "lowercase")]
pub enum IndexReg {
    IX,
    IY,
}

impl IndexReg {
    pub fn prefix(self) -> u8 {
        match self {
            IndexReg::IX => 0xDD,
            IndexReg::IY => 0xFD,
        }
    }
}

/// Flag conditions used by conditional jumps, calls and returns.
#[derive(Debug, Hash, Eq, PartialEq, Clone, Copy, Display, EnumString, EnumIter)]
#[strum(serialize_all = "lowercase")]
pub enum Condition {
    NZ = 0,
    Z = 1,
    NC = 2,
    C = 3,
    PO = 4,
    PE = 5,
    P = 6,
    M = 7,
}

impl Condition {
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Whether `jr` can test this condition.
    pub fn is_relative(self) -> bool {
        self.code() <= Condition::C.code()
    }
}

/// Register-like words that can never be used as label names.
pub const RESERVED_NAMES: &[&str] = &[
    "a", "b", "c", "d", "e", "h", "l", "i", "r", "bc", "de", "hl", "af", "sp", "ix", "iy", "af'",
];
