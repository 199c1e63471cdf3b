use crate::{
    assembler::interner::{InternError, StrId, StringPools},
    ast::{Mnemonic, Operand},
};

/// How the linker turns an evaluated expression into opcode bits.
#[derive(Debug, Hash, Eq, PartialEq, Clone, Copy)]
pub enum ExprPatch {
    /// A signed or unsigned byte.
    Byte,
    /// A little-endian word.
    Word,
    /// A big-endian word, used by the `push nn` extended opcode.
    WordBigEndian,
    /// `rst` vector or'ed into the opcode.
    Restart,
    /// Bit number shifted into bits 3-5 of the opcode.
    BitIndex,
    /// Interrupt mode selecting the second opcode byte of `im`.
    InterruptMode,
}

#[derive(Debug, Hash, Eq, PartialEq, Clone, Copy)]
pub enum Width {
    Byte,
    Word,
}

impl Width {
    pub fn max(&self) -> u16 {
        match self {
            Width::Byte => 0xff,
            Width::Word => 0xffff,
        }
    }

    pub fn size(&self) -> usize {
        match self {
            Width::Byte => 1,
            Width::Word => 2,
        }
    }
}

/// What a deferred reference resolves to.
#[derive(Debug, Hash, Eq, PartialEq, Clone, Copy)]
pub enum Target {
    /// 16-bit absolute address of a label.
    Absolute(StrId),
    /// 8-bit displacement to a local label, relative to the instruction start.
    Relative(StrId),
    /// Difference between two labels.
    Difference {
        minuend: StrId,
        subtrahend: StrId,
        width: Width,
    },
    /// An `=expression` operand.
    Expression { expr: StrId, patch: ExprPatch },
}

impl Target {
    /// Number of bytes the linker rewrites.
    pub fn width(&self) -> Width {
        match self {
            Target::Absolute(_) => Width::Word,
            Target::Relative(_) => Width::Byte,
            Target::Difference { width, .. } => *width,
            Target::Expression {
                patch: ExprPatch::Word | ExprPatch::WordBigEndian,
                ..
            } => Width::Word,
            Target::Expression { .. } => Width::Byte,
        }
    }
}

/// A reference that can only be resolved by the linker.
#[derive(Debug, Hash, Eq, PartialEq, Clone, Copy)]
pub struct Fixup {
    /// Offset of the patched byte(s) within the instruction.
    pub offset: u8,
    pub target: Target,
}

impl Fixup {
    /// Whether the byte at `ix` of the instruction is rewritten by this fixup.
    pub fn covers(&self, ix: usize) -> bool {
        let start = self.offset as usize;
        (start..start + self.target.width().size()).contains(&ix)
    }
}

/// The encoded form of an instruction or directive.
#[derive(Debug, Hash, Eq, PartialEq, Clone)]
pub enum Code {
    /// Opcode and operand bytes. Bytes covered by a fixup are placeholders.
    Bytes { bytes: Vec<u8>, fixup: Option<Fixup> },
    /// `ds count, value`
    Fill { count: u16, value: u8 },
    /// `align n`, holding `log2(n)`.
    Align(u8),
    /// `org nn`
    Origin(u16),
    /// `map`
    Map,
}

impl Code {
    pub fn bytes(bytes: Vec<u8>) -> Self {
        Code::Bytes { bytes, fixup: None }
    }

    pub fn with_fixup(bytes: Vec<u8>, offset: u8, target: Target) -> Self {
        Code::Bytes {
            bytes,
            fixup: Some(Fixup { offset, target }),
        }
    }

    /// Encoded bytes, empty for directives without a fixed encoding.
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Code::Bytes { bytes, .. } => bytes,
            _ => &[],
        }
    }

    pub fn fixup(&self) -> Option<&Fixup> {
        match self {
            Code::Bytes { fixup, .. } => fixup.as_ref(),
            _ => None,
        }
    }

    /// Bytes this code occupies in the image. Alignment padding depends on the final address and is
    /// not included.
    pub fn size(&self) -> u16 {
        match self {
            Code::Bytes { bytes, .. } => bytes.len() as u16,
            Code::Fill { count, .. } => *count,
            Code::Align(_) | Code::Origin(_) | Code::Map => 0,
        }
    }
}

/// An encoded instruction: the canonical operands it was built from and the resulting code.
#[derive(Debug, Hash, Eq, PartialEq, Clone)]
pub struct Instruction {
    pub mnemonic: Mnemonic,
    pub operands: Vec<Operand>,
    pub code: Code,
}

impl Instruction {
    pub fn new(mnemonic: Mnemonic, operands: Vec<Operand>, code: Code) -> Self {
        Self {
            mnemonic,
            operands,
            code,
        }
    }

    pub fn size(&self) -> u16 {
        self.code.size()
    }

    /// Canonical source text of the instruction, e.g. `ld a, (ix+3)`.
    pub fn render(&self, pools: &StringPools) -> Result<String, InternError> {
        let mut s = self.mnemonic.to_string();
        for (ix, operand) in self.operands.iter().enumerate() {
            s.push_str(if ix == 0 { " " } else { ", " });
            s.push_str(&operand.render(pools)?);
        }
        Ok(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Number, Reg8};

    use pretty_assertions::assert_eq;

    #[test]
    fn test_render_and_size() -> Result<(), InternError> {
        let pools = StringPools::default();
        let ins = Instruction::new(
            Mnemonic::Ld,
            vec![
                Operand::Reg8(Reg8::A),
                Operand::Immediate(Number::unsigned(1)),
            ],
            Code::bytes(vec![0x3E, 0x01]),
        );
        assert_eq!(ins.render(&pools)?, "ld a, 1");
        assert_eq!(ins.size(), 2);

        let nop = Instruction::new(Mnemonic::Nop, vec![], Code::bytes(vec![0x00]));
        assert_eq!(nop.render(&pools)?, "nop");

        assert_eq!(Code::Fill { count: 300, value: 0 }.size(), 300);
        assert_eq!(Code::Align(3).size(), 0);
        Ok(())
    }
}
