use super::{is_immediate, CodeGenError, Emitter};
use crate::ast::{Code, Mnemonic, Operand, Reg16, Reg8};

/// Encode the accumulator operand of an 8-bit arithmetic or logic instruction.
///
/// `reg` is the opcode for `b`; the other registers, `(hl)` and `(ix+d)` are derived from it.
fn accumulator_form(
    mnemonic: Mnemonic,
    reg: u8,
    imm: u8,
    operand: &Operand,
) -> Result<Code, CodeGenError> {
    match operand {
        Operand::Reg8(r) => Ok(Code::bytes(vec![reg | r.code()])),
        Operand::Indirect(_) if operand.is_hl_indirect() => Ok(Code::bytes(vec![reg | 6])),
        Operand::Indexed(ix, d) => Ok(Code::bytes(vec![ix.prefix(), reg | 6, d.as_byte()])),
        operand if is_immediate(operand) => {
            Ok(Emitter::new(mnemonic, &[imm]).imm8(operand)?.finish())
        }
        _ => Err(CodeGenError::BadRegister(mnemonic)),
    }
}

/// `and`, `or`, `xor`, `cp`, `sub`. Both `sub b` and `sub a, b` are accepted.
pub(super) fn encode_arith(
    mnemonic: Mnemonic,
    reg: u8,
    imm: u8,
    operands: &[Operand],
) -> Result<Code, CodeGenError> {
    match operands {
        [operand] => accumulator_form(mnemonic, reg, imm, operand),
        [Operand::Reg8(Reg8::A), operand] => accumulator_form(mnemonic, reg, imm, operand),
        [_, _] => Err(CodeGenError::BadRegister(mnemonic)),
        _ => Err(CodeGenError::OperandCount(mnemonic)),
    }
}

pub(super) fn encode_add(mnemonic: Mnemonic, operands: &[Operand]) -> Result<Code, CodeGenError> {
    match operands {
        [Operand::Reg8(Reg8::A), operand] => accumulator_form(mnemonic, 0x80, 0xC6, operand),
        [Operand::Reg16(Reg16::HL), Operand::Reg16(rr)] => {
            Ok(Code::bytes(vec![0x09 | (rr.code() << 4)]))
        }
        [Operand::Index(ix), Operand::Index(iy)] if ix == iy => {
            Ok(Code::bytes(vec![ix.prefix(), 0x29]))
        }
        [Operand::Index(ix), Operand::Reg16(rr)] if *rr != Reg16::HL => {
            Ok(Code::bytes(vec![ix.prefix(), 0x09 | (rr.code() << 4)]))
        }
        // Next: add hl/de/bc, a
        [Operand::Reg16(rr), Operand::Reg8(Reg8::A)] if *rr != Reg16::SP => {
            let op = match rr {
                Reg16::HL => 0x31,
                Reg16::DE => 0x32,
                _ => 0x33,
            };
            Ok(Code::bytes(vec![0xED, op]))
        }
        // Next: add hl/de/bc, nn
        [Operand::Reg16(rr), operand] if *rr != Reg16::SP && is_immediate(operand) => {
            let op = match rr {
                Reg16::HL => 0x34,
                Reg16::DE => 0x35,
                _ => 0x36,
            };
            Ok(Emitter::new(mnemonic, &[0xED, op]).imm16(operand)?.finish())
        }
        [_, _] => Err(CodeGenError::BadRegister(mnemonic)),
        _ => Err(CodeGenError::OperandCount(mnemonic)),
    }
}

/// `adc` and `sbc`.
pub(super) fn encode_carry(
    mnemonic: Mnemonic,
    reg: u8,
    imm: u8,
    pair: u8,
    operands: &[Operand],
) -> Result<Code, CodeGenError> {
    match operands {
        [Operand::Reg8(Reg8::A), operand] => accumulator_form(mnemonic, reg, imm, operand),
        [Operand::Reg16(Reg16::HL), Operand::Reg16(rr)] => {
            Ok(Code::bytes(vec![0xED, pair | (rr.code() << 4)]))
        }
        [_, _] => Err(CodeGenError::BadRegister(mnemonic)),
        _ => Err(CodeGenError::OperandCount(mnemonic)),
    }
}

pub(super) fn encode_inc_dec(
    mnemonic: Mnemonic,
    reg: u8,
    pair: u8,
    hl: u8,
    index: u8,
    operands: &[Operand],
) -> Result<Code, CodeGenError> {
    match operands {
        [Operand::Reg8(r)] => Ok(Code::bytes(vec![reg | (r.code() << 3)])),
        [Operand::Reg16(rr)] => Ok(Code::bytes(vec![pair | (rr.code() << 4)])),
        [operand] if operand.is_hl_indirect() => Ok(Code::bytes(vec![hl])),
        [Operand::Indexed(ix, d)] => Ok(Code::bytes(vec![ix.prefix(), hl, d.as_byte()])),
        [Operand::Index(ix)] => Ok(Code::bytes(vec![ix.prefix(), index])),
        [_] => Err(CodeGenError::BadRegister(mnemonic)),
        _ => Err(CodeGenError::OperandCount(mnemonic)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        assembler::codegen::encode,
        ast::{Displacement, IndexReg, Indirect, Number, NumberFormat},
    };

    use pretty_assertions::assert_eq;

    fn imm(value: i32) -> Operand {
        Operand::Immediate(Number::unsigned(value))
    }

    fn ix(d: i32) -> Operand {
        Operand::Indexed(IndexReg::IX, Displacement(Number::new(d, NumberFormat::Signed)))
    }

    #[test]
    fn test_arith() -> Result<(), CodeGenError> {
        let a = Operand::Reg8(Reg8::A);
        let tests = vec![
            (Mnemonic::Sub, vec![Operand::Reg8(Reg8::B)], vec![0x90]),
            (Mnemonic::Sub, vec![a, Operand::Reg8(Reg8::B)], vec![0x90]),
            (Mnemonic::And, vec![imm(0x0f)], vec![0xE6, 0x0f]),
            (Mnemonic::Xor, vec![a], vec![0xAF]),
            (Mnemonic::Or, vec![Operand::Indirect(Indirect::HL)], vec![0xB6]),
            (Mnemonic::Cp, vec![ix(-2)], vec![0xDD, 0xBE, 0xFE]),
            (Mnemonic::Add, vec![a, imm(1)], vec![0xC6, 0x01]),
            (Mnemonic::Add, vec![a, Operand::Reg8(Reg8::L)], vec![0x85]),
            (Mnemonic::Adc, vec![a, imm(1)], vec![0xCE, 0x01]),
            (Mnemonic::Sbc, vec![a, Operand::Reg8(Reg8::C)], vec![0x99]),
        ];
        for (mnemonic, operands, expected) in tests {
            assert_eq!(encode(mnemonic, &operands)?, Code::bytes(expected));
        }
        Ok(())
    }

    #[test]
    fn test_16bit_arith() -> Result<(), CodeGenError> {
        let hl = Operand::Reg16(Reg16::HL);
        let tests = vec![
            (Mnemonic::Add, vec![hl, Operand::Reg16(Reg16::DE)], vec![0x19]),
            (Mnemonic::Add, vec![hl, hl], vec![0x29]),
            (
                Mnemonic::Add,
                vec![Operand::Index(IndexReg::IY), Operand::Reg16(Reg16::SP)],
                vec![0xFD, 0x39],
            ),
            (
                Mnemonic::Add,
                vec![Operand::Index(IndexReg::IX), Operand::Index(IndexReg::IX)],
                vec![0xDD, 0x29],
            ),
            (Mnemonic::Adc, vec![hl, Operand::Reg16(Reg16::BC)], vec![0xED, 0x4A]),
            (Mnemonic::Sbc, vec![hl, Operand::Reg16(Reg16::SP)], vec![0xED, 0x72]),
            (
                Mnemonic::Add,
                vec![Operand::Reg16(Reg16::DE), Operand::Reg8(Reg8::A)],
                vec![0xED, 0x32],
            ),
            (Mnemonic::Add, vec![hl, imm(0x1234)], vec![0xED, 0x34, 0x34, 0x12]),
        ];
        for (mnemonic, operands, expected) in tests {
            assert_eq!(encode(mnemonic, &operands)?, Code::bytes(expected));
        }
        Ok(())
    }

    #[test]
    fn test_inc_dec() -> Result<(), CodeGenError> {
        let tests = vec![
            (Mnemonic::Inc, vec![Operand::Reg8(Reg8::A)], vec![0x3C]),
            (Mnemonic::Dec, vec![Operand::Reg8(Reg8::B)], vec![0x05]),
            (Mnemonic::Inc, vec![Operand::Reg16(Reg16::SP)], vec![0x33]),
            (Mnemonic::Dec, vec![Operand::Reg16(Reg16::DE)], vec![0x1B]),
            (Mnemonic::Inc, vec![Operand::Indirect(Indirect::HL)], vec![0x34]),
            (Mnemonic::Dec, vec![ix(5)], vec![0xDD, 0x35, 0x05]),
            (Mnemonic::Inc, vec![Operand::Index(IndexReg::IY)], vec![0xFD, 0x23]),
            (Mnemonic::Dec, vec![Operand::Index(IndexReg::IX)], vec![0xDD, 0x2B]),
        ];
        for (mnemonic, operands, expected) in tests {
            assert_eq!(encode(mnemonic, &operands)?, Code::bytes(expected));
        }
        Ok(())
    }

    #[test]
    fn test_errors() {
        let tests = vec![
            (
                Mnemonic::Add,
                vec![Operand::Reg8(Reg8::B), Operand::Reg8(Reg8::C)],
                CodeGenError::BadRegister(Mnemonic::Add),
            ),
            (Mnemonic::And, vec![imm(256)], CodeGenError::NumberTooBig(256)),
            (Mnemonic::Inc, vec![], CodeGenError::OperandCount(Mnemonic::Inc)),
            (
                Mnemonic::Add,
                vec![Operand::Index(IndexReg::IX), Operand::Reg16(Reg16::HL)],
                CodeGenError::BadRegister(Mnemonic::Add),
            ),
        ];
        for (mnemonic, operands, expected) in tests {
            assert_eq!(encode(mnemonic, &operands), Err(expected));
        }
    }
}
