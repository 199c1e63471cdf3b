use super::{CodeGenError, Emitter};
use crate::ast::{Code, ExprPatch, Indirect, Mnemonic, Operand, Target};

/// Append the target of an absolute jump or call. Label differences make no sense here.
fn jump_target(emitter: &mut Emitter, operand: &Operand) -> Result<(), CodeGenError> {
    match operand {
        Operand::Immediate(_) | Operand::Label(_) | Operand::Expression(_) => {
            emitter.imm16(operand)?;
            Ok(())
        }
        _ => Err(CodeGenError::BadLabel(emitter.mnemonic)),
    }
}

fn absolute(
    mnemonic: Mnemonic,
    plain: u8,
    conditional: u8,
    operands: &[Operand],
) -> Result<Code, CodeGenError> {
    let mut emitter = match operands {
        [_] => Emitter::new(mnemonic, &[plain]),
        [Operand::Condition(cc), _] => Emitter::new(mnemonic, &[conditional | (cc.code() << 3)]),
        [_, _] => return Err(CodeGenError::ConditionCode(mnemonic)),
        _ => return Err(CodeGenError::OperandCount(mnemonic)),
    };
    if let Some(target) = operands.last() {
        jump_target(&mut emitter, target)?;
    }
    Ok(emitter.finish())
}

pub(super) fn encode_jp(mnemonic: Mnemonic, operands: &[Operand]) -> Result<Code, CodeGenError> {
    match operands {
        [Operand::Indirect(Indirect::HL)] => Ok(Code::bytes(vec![0xE9])),
        [Operand::Indirect(Indirect::Index(ix))] => Ok(Code::bytes(vec![ix.prefix(), 0xE9])),
        [Operand::Indirect(Indirect::C)] => Ok(Code::bytes(vec![0xED, 0x98])),
        _ => absolute(mnemonic, 0xC3, 0xC2, operands),
    }
}

pub(super) fn encode_call(mnemonic: Mnemonic, operands: &[Operand]) -> Result<Code, CodeGenError> {
    absolute(mnemonic, 0xCD, 0xC4, operands)
}

/// Relative jumps only accept a label, resolved by the linker to a displacement.
fn relative(mnemonic: Mnemonic, opcode: u8, target: &Operand) -> Result<Code, CodeGenError> {
    match target {
        Operand::Label(label) => Ok(Code::with_fixup(
            vec![opcode, 0],
            1,
            Target::Relative(*label),
        )),
        _ => Err(CodeGenError::BadLabel(mnemonic)),
    }
}

pub(super) fn encode_jr(mnemonic: Mnemonic, operands: &[Operand]) -> Result<Code, CodeGenError> {
    match operands {
        [target] => relative(mnemonic, 0x18, target),
        [Operand::Condition(cc), target] if cc.is_relative() => {
            relative(mnemonic, 0x20 | (cc.code() << 3), target)
        }
        [_, _] => Err(CodeGenError::ConditionCode(mnemonic)),
        _ => Err(CodeGenError::OperandCount(mnemonic)),
    }
}

pub(super) fn encode_djnz(mnemonic: Mnemonic, operands: &[Operand]) -> Result<Code, CodeGenError> {
    match operands {
        [target] => relative(mnemonic, 0x10, target),
        _ => Err(CodeGenError::OperandCount(mnemonic)),
    }
}

pub(super) fn encode_ret(mnemonic: Mnemonic, operands: &[Operand]) -> Result<Code, CodeGenError> {
    match operands {
        [] => Ok(Code::bytes(vec![0xC9])),
        [Operand::Condition(cc)] => Ok(Code::bytes(vec![0xC0 | (cc.code() << 3)])),
        [_] => Err(CodeGenError::ConditionCode(mnemonic)),
        _ => Err(CodeGenError::OperandCount(mnemonic)),
    }
}

pub(super) fn encode_rst(mnemonic: Mnemonic, operands: &[Operand]) -> Result<Code, CodeGenError> {
    match operands {
        [Operand::Immediate(n)] if n.value < 0 => Err(CodeGenError::NegativeNumber(n.value)),
        [Operand::Immediate(n)] if n.value > 0x38 || n.value % 8 != 0 => {
            Err(CodeGenError::BadNumber(n.value))
        }
        [Operand::Immediate(n)] => Ok(Code::bytes(vec![0xC7 | n.value as u8])),
        [Operand::Expression(expr)] => Ok(Code::with_fixup(
            vec![0xC7],
            0,
            Target::Expression {
                expr: *expr,
                patch: ExprPatch::Restart,
            },
        )),
        [_] => Err(CodeGenError::BadNumber(0)),
        _ => Err(CodeGenError::OperandCount(mnemonic)),
    }
}
