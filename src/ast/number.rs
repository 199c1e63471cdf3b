use std::fmt;

/// How a literal was written in the source, kept so it can be spelled back the same way.
#[derive(Debug, Hash, Eq, PartialEq, Clone, Copy)]
pub enum NumberFormat {
    Unsigned,
    Signed,
    Hex,
    Char,
}

/// A numeric literal and its display format.
///
/// The value is kept wide enough to hold every literal the assembler accepts, i.e. `-32768` up to
/// `65535`. Range checks against the operand width happen when encoding.
#[derive(Debug, Hash, Eq, PartialEq, Clone, Copy)]
pub struct Number {
    pub value: i32,
    pub format: NumberFormat,
}

impl Number {
    pub fn new(value: i32, format: NumberFormat) -> Self {
        Self { value, format }
    }

    pub fn unsigned(value: i32) -> Self {
        Self::new(value, NumberFormat::Unsigned)
    }

    pub fn hex(value: i32) -> Self {
        Self::new(value, NumberFormat::Hex)
    }

    pub fn fits_byte(&self) -> bool {
        (-128..=255).contains(&self.value)
    }

    pub fn fits_word(&self) -> bool {
        (-32768..=0xffff).contains(&self.value)
    }

    pub fn as_byte(&self) -> u8 {
        self.value as u8
    }

    pub fn as_word(&self) -> u16 {
        self.value as u16
    }
}

impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.format {
            NumberFormat::Unsigned | NumberFormat::Signed => write!(f, "{}", self.value),
            NumberFormat::Hex => write!(f, "${:x}", self.value),
            NumberFormat::Char => write!(f, "'{}'", (self.value as u8) as char),
        }
    }
}

/// Displacement of an indexed operand such as `(ix+5)`.
///
/// Hex displacements are written as the raw byte, decimal ones are signed.
#[derive(Debug, Hash, Eq, PartialEq, Clone, Copy)]
pub struct Displacement(pub Number);

impl Displacement {
    pub fn as_byte(&self) -> u8 {
        self.0.as_byte()
    }
}

impl fmt::Display for Displacement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.value < 0 {
            write!(f, "-{}", -self.0.value)
        } else {
            write!(f, "+{}", self.0)
        }
    }
}
