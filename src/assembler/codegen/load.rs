use super::{is_address, is_immediate, CodeGenError, Emitter};
use crate::ast::{Code, ExprPatch, Indirect, Mnemonic, Operand, Reg16, Reg8, Target};

fn bytes(bytes: &[u8]) -> Result<Code, CodeGenError> {
    Ok(Code::bytes(bytes.to_vec()))
}

pub(super) fn encode_ld(mnemonic: Mnemonic, operands: &[Operand]) -> Result<Code, CodeGenError> {
    let [dst, src] = operands else {
        return Err(CodeGenError::OperandCount(mnemonic));
    };

    match (dst, src) {
        // 8-bit register moves
        (Operand::Reg8(r), Operand::Reg8(r2)) => bytes(&[0x40 | (r.code() << 3) | r2.code()]),
        (Operand::Reg8(r), Operand::Indirect(Indirect::HL)) => bytes(&[0x46 | (r.code() << 3)]),
        (Operand::Indirect(Indirect::HL), Operand::Reg8(r)) => bytes(&[0x70 | r.code()]),
        (Operand::Reg8(r), Operand::Indexed(ix, d)) => {
            bytes(&[ix.prefix(), 0x46 | (r.code() << 3), d.as_byte()])
        }
        (Operand::Indexed(ix, d), Operand::Reg8(r)) => {
            bytes(&[ix.prefix(), 0x70 | r.code(), d.as_byte()])
        }

        // Accumulator special forms
        (Operand::Reg8(Reg8::A), Operand::Indirect(Indirect::BC)) => bytes(&[0x0A]),
        (Operand::Reg8(Reg8::A), Operand::Indirect(Indirect::DE)) => bytes(&[0x1A]),
        (Operand::Indirect(Indirect::BC), Operand::Reg8(Reg8::A)) => bytes(&[0x02]),
        (Operand::Indirect(Indirect::DE), Operand::Reg8(Reg8::A)) => bytes(&[0x12]),
        (Operand::Reg8(Reg8::A), Operand::I) => bytes(&[0xED, 0x57]),
        (Operand::Reg8(Reg8::A), Operand::R) => bytes(&[0xED, 0x5F]),
        (Operand::I, Operand::Reg8(Reg8::A)) => bytes(&[0xED, 0x47]),
        (Operand::R, Operand::Reg8(Reg8::A)) => bytes(&[0xED, 0x4F]),

        // 8-bit immediates
        (Operand::Reg8(r), value) if is_immediate(value) => {
            Ok(Emitter::new(mnemonic, &[0x06 | (r.code() << 3)])
                .imm8(value)?
                .finish())
        }
        (Operand::Indirect(Indirect::HL), value) if is_immediate(value) => {
            Ok(Emitter::new(mnemonic, &[0x36]).imm8(value)?.finish())
        }
        (Operand::Indexed(ix, d), value) if is_immediate(value) => {
            Ok(Emitter::new(mnemonic, &[ix.prefix(), 0x36, d.as_byte()])
                .imm8(value)?
                .finish())
        }

        // Memory at an absolute address
        (Operand::Reg8(Reg8::A), address) if is_address(address) => {
            Ok(Emitter::new(mnemonic, &[0x3A]).address(address)?.finish())
        }
        (address, Operand::Reg8(Reg8::A)) if is_address(address) => {
            Ok(Emitter::new(mnemonic, &[0x32]).address(address)?.finish())
        }
        (Operand::Reg16(Reg16::HL), address) if is_address(address) => {
            Ok(Emitter::new(mnemonic, &[0x2A]).address(address)?.finish())
        }
        (address, Operand::Reg16(Reg16::HL)) if is_address(address) => {
            Ok(Emitter::new(mnemonic, &[0x22]).address(address)?.finish())
        }
        (Operand::Reg16(rr), address) if is_address(address) => {
            Ok(Emitter::new(mnemonic, &[0xED, 0x4B | (rr.code() << 4)])
                .address(address)?
                .finish())
        }
        (address, Operand::Reg16(rr)) if is_address(address) => {
            Ok(Emitter::new(mnemonic, &[0xED, 0x43 | (rr.code() << 4)])
                .address(address)?
                .finish())
        }
        (Operand::Index(ix), address) if is_address(address) => {
            Ok(Emitter::new(mnemonic, &[ix.prefix(), 0x2A])
                .address(address)?
                .finish())
        }
        (address, Operand::Index(ix)) if is_address(address) => {
            Ok(Emitter::new(mnemonic, &[ix.prefix(), 0x22])
                .address(address)?
                .finish())
        }

        // 16-bit immediates
        (Operand::Reg16(rr), value) if is_immediate(value) => {
            Ok(Emitter::new(mnemonic, &[0x01 | (rr.code() << 4)])
                .imm16(value)?
                .finish())
        }
        (Operand::Index(ix), value) if is_immediate(value) => {
            Ok(Emitter::new(mnemonic, &[ix.prefix(), 0x21])
                .imm16(value)?
                .finish())
        }

        // Stack pointer
        (Operand::Reg16(Reg16::SP), Operand::Reg16(Reg16::HL)) => bytes(&[0xF9]),
        (Operand::Reg16(Reg16::SP), Operand::Index(ix)) => bytes(&[ix.prefix(), 0xF9]),

        _ => Err(CodeGenError::BadRegister(mnemonic)),
    }
}

pub(super) fn encode_ex(mnemonic: Mnemonic, operands: &[Operand]) -> Result<Code, CodeGenError> {
    match operands {
        [Operand::AF, Operand::ShadowAF] => bytes(&[0x08]),
        [Operand::Reg16(Reg16::DE), Operand::Reg16(Reg16::HL)] => bytes(&[0xEB]),
        [Operand::Indirect(Indirect::SP), Operand::Reg16(Reg16::HL)] => bytes(&[0xE3]),
        [Operand::Indirect(Indirect::SP), Operand::Index(ix)] => bytes(&[ix.prefix(), 0xE3]),
        [_, _] => Err(CodeGenError::BadRegister(mnemonic)),
        _ => Err(CodeGenError::OperandCount(mnemonic)),
    }
}

/// Encode the register of `push` or `pop`. `af` takes the slot of `sp`.
fn stack_register(mnemonic: Mnemonic, base: u8, operand: &Operand) -> Result<Code, CodeGenError> {
    match operand {
        Operand::Reg16(Reg16::SP) => Err(CodeGenError::BadRegister(mnemonic)),
        Operand::Reg16(rr) => bytes(&[base | (rr.code() << 4)]),
        Operand::AF => bytes(&[base | 0x30]),
        Operand::Index(ix) => bytes(&[ix.prefix(), base | 0x20]),
        _ => Err(CodeGenError::BadRegister(mnemonic)),
    }
}

pub(super) fn encode_push(mnemonic: Mnemonic, operands: &[Operand]) -> Result<Code, CodeGenError> {
    match operands {
        // Next: push nn, stored big-endian.
        [Operand::Immediate(n)] => {
            let [lo, hi] = super::word_value(n.value)?.to_le_bytes();
            bytes(&[0xED, 0x8A, hi, lo])
        }
        [Operand::Expression(expr)] => Ok(Code::with_fixup(
            vec![0xED, 0x8A, 0, 0],
            2,
            Target::Expression {
                expr: *expr,
                patch: ExprPatch::WordBigEndian,
            },
        )),
        [operand] => stack_register(mnemonic, 0xC5, operand),
        _ => Err(CodeGenError::OperandCount(mnemonic)),
    }
}

pub(super) fn encode_pop(mnemonic: Mnemonic, operands: &[Operand]) -> Result<Code, CodeGenError> {
    match operands {
        [operand] => stack_register(mnemonic, 0xC1, operand),
        _ => Err(CodeGenError::OperandCount(mnemonic)),
    }
}
