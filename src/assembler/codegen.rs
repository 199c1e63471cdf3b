use thiserror::Error;

use crate::{
    assembler::codegen::opcode::{Family, OPCODE_MAPPING},
    ast::{Code, ExprPatch, Fixup, Mnemonic, Operand, Target, Width},
};

pub(crate) use io::INTERRUPT_MODES;

/// Mapping from mnemonics to encoding families.
pub mod opcode;

/// `add`, `adc`, `sbc`, logic, compare and `inc`/`dec`.
mod arith;
/// `bit`/`res`/`set`, rotates and shifts, Next bit manipulation.
mod bits;
/// `db`, `dw`, `ds`, `align`, `org` and `map`.
mod data;
/// Jumps, calls, returns and restarts.
mod flow;
/// `in`, `out`, `im`, `nextreg` and `test`.
mod io;
/// `ld`, `ex`, `push` and `pop`.
mod load;

#[derive(Error, Debug, PartialEq, Eq, Clone)]
pub enum CodeGenError {
    #[error("Bad register for {0}")]
    BadRegister(Mnemonic),
    #[error("Wrong number of operands for {0}")]
    OperandCount(Mnemonic),
    #[error("Bad number: {0}")]
    BadNumber(i32),
    #[error("Number too big: {0}")]
    NumberTooBig(i32),
    #[error("Number is negative: {0}")]
    NegativeNumber(i32),
    #[error("Bad condition code for {0}")]
    ConditionCode(Mnemonic),
    #[error("Label not allowed here for {0}")]
    BadLabel(Mnemonic),
    #[error("Only one label or expression per instruction for {0}")]
    MultipleDeferred(Mnemonic),
}

/// Accumulates the bytes of one instruction together with at most one fixup.
#[derive(Debug)]
struct Emitter {
    mnemonic: Mnemonic,
    bytes: Vec<u8>,
    fixup: Option<Fixup>,
}

impl Emitter {
    fn new(mnemonic: Mnemonic, bytes: &[u8]) -> Self {
        Self {
            mnemonic,
            bytes: bytes.to_vec(),
            fixup: None,
        }
    }

    fn byte(&mut self, byte: u8) -> &mut Self {
        self.bytes.push(byte);
        self
    }

    fn word(&mut self, word: u16) -> &mut Self {
        self.bytes.extend_from_slice(&word.to_le_bytes());
        self
    }

    /// Record a fixup patching the byte at `offset`.
    fn defer_at(&mut self, offset: usize, target: Target) -> Result<&mut Self, CodeGenError> {
        if self.fixup.is_some() {
            return Err(CodeGenError::MultipleDeferred(self.mnemonic));
        }
        self.fixup = Some(Fixup {
            offset: offset as u8,
            target,
        });
        Ok(self)
    }

    /// Record a fixup for bytes about to be appended.
    fn defer(&mut self, target: Target) -> Result<&mut Self, CodeGenError> {
        let offset = self.bytes.len();
        self.defer_at(offset, target)
    }

    /// Append an 8-bit immediate: a number, an `=expression` or a label difference.
    fn imm8(&mut self, operand: &Operand) -> Result<&mut Self, CodeGenError> {
        match operand {
            Operand::Immediate(n) => {
                let value = byte_value(n.value)?;
                Ok(self.byte(value))
            }
            Operand::Expression(expr) => {
                self.defer(Target::Expression {
                    expr: *expr,
                    patch: ExprPatch::Byte,
                })?;
                Ok(self.byte(0))
            }
            Operand::LabelDiff(minuend, subtrahend) => {
                self.defer(Target::Difference {
                    minuend: *minuend,
                    subtrahend: *subtrahend,
                    width: Width::Byte,
                })?;
                Ok(self.byte(0))
            }
            Operand::Label(_) => Err(CodeGenError::BadLabel(self.mnemonic)),
            _ => Err(CodeGenError::BadRegister(self.mnemonic)),
        }
    }

    /// Append a 16-bit immediate: a number, a label, an `=expression` or a label difference.
    fn imm16(&mut self, operand: &Operand) -> Result<&mut Self, CodeGenError> {
        match operand {
            Operand::Immediate(n) => {
                let value = word_value(n.value)?;
                Ok(self.word(value))
            }
            Operand::Label(label) => {
                self.defer(Target::Absolute(*label))?;
                Ok(self.word(0))
            }
            Operand::Expression(expr) => {
                self.defer(Target::Expression {
                    expr: *expr,
                    patch: ExprPatch::Word,
                })?;
                Ok(self.word(0))
            }
            Operand::LabelDiff(minuend, subtrahend) => {
                self.defer(Target::Difference {
                    minuend: *minuend,
                    subtrahend: *subtrahend,
                    width: Width::Word,
                })?;
                Ok(self.word(0))
            }
            _ => Err(CodeGenError::BadRegister(self.mnemonic)),
        }
    }

    /// Append the address of a `(nn)`, `(label)` or `(=expression)` operand.
    fn address(&mut self, operand: &Operand) -> Result<&mut Self, CodeGenError> {
        match operand {
            Operand::Address(n) => {
                let value = address_value(n.value)?;
                Ok(self.word(value))
            }
            Operand::AddressLabel(label) => {
                self.defer(Target::Absolute(*label))?;
                Ok(self.word(0))
            }
            Operand::AddressExpression(expr) => {
                self.defer(Target::Expression {
                    expr: *expr,
                    patch: ExprPatch::Word,
                })?;
                Ok(self.word(0))
            }
            _ => Err(CodeGenError::BadRegister(self.mnemonic)),
        }
    }

    fn finish(&mut self) -> Code {
        Code::Bytes {
            bytes: std::mem::take(&mut self.bytes),
            fixup: self.fixup.take(),
        }
    }
}

fn byte_value(value: i32) -> Result<u8, CodeGenError> {
    if (-128..=255).contains(&value) {
        Ok(value as u8)
    } else {
        Err(CodeGenError::NumberTooBig(value))
    }
}

fn word_value(value: i32) -> Result<u16, CodeGenError> {
    if (-32768..=0xffff).contains(&value) {
        Ok(value as u16)
    } else {
        Err(CodeGenError::NumberTooBig(value))
    }
}

fn address_value(value: i32) -> Result<u16, CodeGenError> {
    if value < 0 {
        Err(CodeGenError::NegativeNumber(value))
    } else if value > 0xffff {
        Err(CodeGenError::NumberTooBig(value))
    } else {
        Ok(value as u16)
    }
}

/// Whether the operand is one of the forms of a `(nn)` memory address.
fn is_address(operand: &Operand) -> bool {
    matches!(
        operand,
        Operand::Address(_) | Operand::AddressLabel(_) | Operand::AddressExpression(_)
    )
}

/// Whether the operand can stand where an immediate value is expected.
fn is_immediate(operand: &Operand) -> bool {
    matches!(
        operand,
        Operand::Immediate(_) | Operand::Label(_) | Operand::Expression(_) | Operand::LabelDiff(..)
    )
}

/// Encode one instruction or directive from its parsed operands.
#[tracing::instrument(level = "trace")]
pub fn encode(mnemonic: Mnemonic, operands: &[Operand]) -> Result<Code, CodeGenError> {
    let family = OPCODE_MAPPING
        .find_family(mnemonic)
        .ok_or(CodeGenError::BadRegister(mnemonic))?;

    match family {
        Family::Implied(bytes) => {
            if !operands.is_empty() {
                return Err(CodeGenError::OperandCount(mnemonic));
            }
            Ok(Code::bytes(bytes.to_vec()))
        }
        Family::Arith { reg, imm } => arith::encode_arith(mnemonic, reg, imm, operands),
        Family::Add => arith::encode_add(mnemonic, operands),
        Family::Carry { reg, imm, pair } => {
            arith::encode_carry(mnemonic, reg, imm, pair, operands)
        }
        Family::IncDec {
            reg,
            pair,
            hl,
            index,
        } => arith::encode_inc_dec(mnemonic, reg, pair, hl, index, operands),
        Family::BitOp(base) => bits::encode_bit_op(mnemonic, base, operands),
        Family::Shift(base) => bits::encode_shift(mnemonic, base, operands),
        Family::Barrel(op) => bits::encode_barrel(mnemonic, op, operands),
        Family::Mirror => bits::encode_mirror(mnemonic, operands),
        Family::Mul => bits::encode_mul(mnemonic, operands),
        Family::Jp => flow::encode_jp(mnemonic, operands),
        Family::Call => flow::encode_call(mnemonic, operands),
        Family::Jr => flow::encode_jr(mnemonic, operands),
        Family::Djnz => flow::encode_djnz(mnemonic, operands),
        Family::Ret => flow::encode_ret(mnemonic, operands),
        Family::Rst => flow::encode_rst(mnemonic, operands),
        Family::Im => io::encode_im(mnemonic, operands),
        Family::In => io::encode_in(mnemonic, operands),
        Family::Out => io::encode_out(mnemonic, operands),
        Family::Nextreg => io::encode_nextreg(mnemonic, operands),
        Family::Test => io::encode_test(mnemonic, operands),
        Family::Push => load::encode_push(mnemonic, operands),
        Family::Pop => load::encode_pop(mnemonic, operands),
        Family::Ex => load::encode_ex(mnemonic, operands),
        Family::Ld => load::encode_ld(mnemonic, operands),
        Family::Db => data::encode_db(mnemonic, operands),
        Family::Dw => data::encode_dw(mnemonic, operands),
        Family::Ds => data::encode_ds(mnemonic, operands),
        Family::Align => data::encode_align(mnemonic, operands),
        Family::Org => data::encode_org(mnemonic, operands),
        Family::Map => {
            if !operands.is_empty() {
                return Err(CodeGenError::OperandCount(mnemonic));
            }
            Ok(Code::Map)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Number, Reg8};

    use pretty_assertions::assert_eq;

    #[test]
    fn test_implied() -> Result<(), CodeGenError> {
        let tests = vec![
            (Mnemonic::Nop, vec![0x00]),
            (Mnemonic::Ldir, vec![0xED, 0xB0]),
            (Mnemonic::Neg, vec![0xED, 0x44]),
            (Mnemonic::Nbrk, vec![0xED, 0x91, 0x02, 0x08]),
            (Mnemonic::Swapnib, vec![0xED, 0x23]),
        ];
        for (mnemonic, expected) in tests {
            assert_eq!(encode(mnemonic, &[])?, Code::bytes(expected));
        }
        Ok(())
    }

    #[test]
    fn test_implied_rejects_operands() {
        assert_eq!(
            encode(Mnemonic::Nop, &[Operand::Reg8(Reg8::A)]),
            Err(CodeGenError::OperandCount(Mnemonic::Nop))
        );
    }

    #[test]
    fn test_single_fixup() {
        let mut emitter = Emitter::new(Mnemonic::Nextreg, &[0xED, 0x91]);
        let mut pools = crate::assembler::interner::StringPools::default();
        let a = pools.add("A").unwrap();
        let b = pools.add("B").unwrap();
        assert!(emitter.imm8(&Operand::Expression(a)).is_ok());
        assert_eq!(
            emitter.imm8(&Operand::Expression(b)).map(|_| ()),
            Err(CodeGenError::MultipleDeferred(Mnemonic::Nextreg))
        );
        assert_eq!(
            emitter.imm8(&Operand::Immediate(Number::unsigned(256))).map(|_| ()),
            Err(CodeGenError::NumberTooBig(256))
        );
    }
}
