use super::{CodeGenError, Emitter};
use crate::ast::{Code, ExprPatch, Mnemonic, Operand, Reg16, Reg8, Target};

/// `bit`, `res` and `set`. The bit number may be an `=expression` resolved at link time.
pub(super) fn encode_bit_op(
    mnemonic: Mnemonic,
    base: u8,
    operands: &[Operand],
) -> Result<Code, CodeGenError> {
    let [bit, target] = operands else {
        return Err(CodeGenError::OperandCount(mnemonic));
    };

    let (bit, expr) = match bit {
        Operand::Immediate(n) if n.value < 0 => return Err(CodeGenError::NegativeNumber(n.value)),
        Operand::Immediate(n) if n.value > 7 => return Err(CodeGenError::NumberTooBig(n.value)),
        Operand::Immediate(n) => (n.value as u8, None),
        Operand::Expression(expr) => (0, Some(*expr)),
        Operand::Label(_) => return Err(CodeGenError::BadLabel(mnemonic)),
        _ => return Err(CodeGenError::BadNumber(0)),
    };

    let op = base | (bit << 3);
    let (mut emitter, op_offset) = match target {
        Operand::Reg8(r) => (Emitter::new(mnemonic, &[0xCB, op | r.code()]), 1),
        operand if operand.is_hl_indirect() => (Emitter::new(mnemonic, &[0xCB, op | 6]), 1),
        Operand::Indexed(ix, d) => (
            Emitter::new(mnemonic, &[ix.prefix(), 0xCB, d.as_byte(), op | 6]),
            3,
        ),
        _ => return Err(CodeGenError::BadRegister(mnemonic)),
    };

    if let Some(expr) = expr {
        emitter.defer_at(
            op_offset,
            Target::Expression {
                expr,
                patch: ExprPatch::BitIndex,
            },
        )?;
    }

    Ok(emitter.finish())
}

/// Rotates and shifts that use the `CB` prefix.
pub(super) fn encode_shift(
    mnemonic: Mnemonic,
    base: u8,
    operands: &[Operand],
) -> Result<Code, CodeGenError> {
    match operands {
        [Operand::Reg8(r)] => Ok(Code::bytes(vec![0xCB, base | r.code()])),
        [operand] if operand.is_hl_indirect() => Ok(Code::bytes(vec![0xCB, base | 6])),
        [Operand::Indexed(ix, d)] => Ok(Code::bytes(vec![
            ix.prefix(),
            0xCB,
            d.as_byte(),
            base | 6,
        ])),
        [_] => Err(CodeGenError::BadRegister(mnemonic)),
        _ => Err(CodeGenError::OperandCount(mnemonic)),
    }
}

/// Next barrel shifts, which only exist as `op de, b`.
pub(super) fn encode_barrel(
    mnemonic: Mnemonic,
    op: u8,
    operands: &[Operand],
) -> Result<Code, CodeGenError> {
    match operands {
        [Operand::Reg16(Reg16::DE), Operand::Reg8(Reg8::B)] => Ok(Code::bytes(vec![0xED, op])),
        [_, _] => Err(CodeGenError::BadRegister(mnemonic)),
        _ => Err(CodeGenError::OperandCount(mnemonic)),
    }
}

pub(super) fn encode_mirror(
    mnemonic: Mnemonic,
    operands: &[Operand],
) -> Result<Code, CodeGenError> {
    match operands {
        [Operand::Reg8(Reg8::A)] => Ok(Code::bytes(vec![0xED, 0x24])),
        [_] => Err(CodeGenError::BadRegister(mnemonic)),
        _ => Err(CodeGenError::OperandCount(mnemonic)),
    }
}

pub(super) fn encode_mul(mnemonic: Mnemonic, operands: &[Operand]) -> Result<Code, CodeGenError> {
    match operands {
        [Operand::Reg8(Reg8::D), Operand::Reg8(Reg8::E)] => Ok(Code::bytes(vec![0xED, 0x30])),
        [_, _] => Err(CodeGenError::BadRegister(mnemonic)),
        _ => Err(CodeGenError::OperandCount(mnemonic)),
    }
}
