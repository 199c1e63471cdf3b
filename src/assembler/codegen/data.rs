use super::{CodeGenError, Emitter};
use crate::ast::{Code, Mnemonic, Number, NumberFormat, Operand};

pub const MAX_DB_VALUES: usize = 4;
pub const MAX_DW_VALUES: usize = 2;

/// Literal lists share one display format, except that unsigned and signed decimals mix.
fn check_formats(numbers: &[Number]) -> Result<(), CodeGenError> {
    let decimal = |f: NumberFormat| matches!(f, NumberFormat::Unsigned | NumberFormat::Signed);
    if let Some(first) = numbers.first() {
        for n in numbers {
            if n.format != first.format && !(decimal(n.format) && decimal(first.format)) {
                return Err(CodeGenError::BadNumber(n.value));
            }
        }
    }
    Ok(())
}

fn literals(operands: &[Operand]) -> Option<Vec<Number>> {
    operands
        .iter()
        .map(|op| match op {
            Operand::Immediate(n) => Some(*n),
            _ => None,
        })
        .collect()
}

pub(super) fn encode_db(mnemonic: Mnemonic, operands: &[Operand]) -> Result<Code, CodeGenError> {
    if operands.is_empty() || operands.len() > MAX_DB_VALUES {
        return Err(CodeGenError::OperandCount(mnemonic));
    }

    match literals(operands) {
        Some(numbers) => {
            check_formats(&numbers)?;
            let mut emitter = Emitter::new(mnemonic, &[]);
            for operand in operands {
                emitter.imm8(operand)?;
            }
            Ok(emitter.finish())
        }
        None if operands.len() == 1 => Ok(Emitter::new(mnemonic, &[])
            .imm8(&operands[0])?
            .finish()),
        None => Err(CodeGenError::BadNumber(0)),
    }
}

pub(super) fn encode_dw(mnemonic: Mnemonic, operands: &[Operand]) -> Result<Code, CodeGenError> {
    if operands.is_empty() || operands.len() > MAX_DW_VALUES {
        return Err(CodeGenError::OperandCount(mnemonic));
    }

    match literals(operands) {
        Some(numbers) => {
            check_formats(&numbers)?;
            let mut emitter = Emitter::new(mnemonic, &[]);
            for operand in operands {
                emitter.imm16(operand)?;
            }
            Ok(emitter.finish())
        }
        None if operands.len() == 1 => Ok(Emitter::new(mnemonic, &[])
            .imm16(&operands[0])?
            .finish()),
        None => Err(CodeGenError::BadNumber(0)),
    }
}

/// `ds count, value` reserves `count` bytes filled with `value`.
pub(super) fn encode_ds(mnemonic: Mnemonic, operands: &[Operand]) -> Result<Code, CodeGenError> {
    let [Operand::Immediate(count), Operand::Immediate(value)] = operands else {
        return Err(match operands.len() {
            2 => CodeGenError::BadNumber(0),
            _ => CodeGenError::OperandCount(mnemonic),
        });
    };

    if count.value < 0 {
        return Err(CodeGenError::NegativeNumber(count.value));
    }
    if count.value == 0 {
        return Err(CodeGenError::BadNumber(count.value));
    }
    if count.value > 0xffff {
        return Err(CodeGenError::NumberTooBig(count.value));
    }
    let value = super::byte_value(value.value)?;

    Ok(Code::Fill {
        count: count.value as u16,
        value,
    })
}

/// `align n` with `n` a power of two from 2 to 256.
pub(super) fn encode_align(mnemonic: Mnemonic, operands: &[Operand]) -> Result<Code, CodeGenError> {
    match operands {
        [Operand::Immediate(n)] if (2..=256).contains(&n.value) && n.value.count_ones() == 1 => {
            Ok(Code::Align(n.value.trailing_zeros() as u8))
        }
        [Operand::Immediate(n)] => Err(CodeGenError::BadNumber(n.value)),
        [_] => Err(CodeGenError::BadNumber(0)),
        _ => Err(CodeGenError::OperandCount(mnemonic)),
    }
}

pub(super) fn encode_org(mnemonic: Mnemonic, operands: &[Operand]) -> Result<Code, CodeGenError> {
    match operands {
        [Operand::Immediate(n)] if n.value < 0 => Err(CodeGenError::NegativeNumber(n.value)),
        [Operand::Immediate(n)] => Ok(Code::Origin(super::word_value(n.value)?)),
        [_] => Err(CodeGenError::BadNumber(0)),
        _ => Err(CodeGenError::OperandCount(mnemonic)),
    }
}
