use super::{CodeGenError, Emitter};
use crate::ast::{Code, ExprPatch, Indirect, Mnemonic, Operand, Reg8, Target};

/// Second opcode byte of `im 0`, `im 1` and `im 2`.
pub(crate) const INTERRUPT_MODES: [u8; 3] = [0x46, 0x56, 0x5E];

pub(super) fn encode_im(mnemonic: Mnemonic, operands: &[Operand]) -> Result<Code, CodeGenError> {
    match operands {
        [Operand::Immediate(n)] if n.value < 0 => Err(CodeGenError::NegativeNumber(n.value)),
        [Operand::Immediate(n)] => INTERRUPT_MODES
            .get(n.value as usize)
            .map(|op| Code::bytes(vec![0xED, *op]))
            .ok_or(CodeGenError::NumberTooBig(n.value)),
        [Operand::Expression(expr)] => Ok(Code::with_fixup(
            vec![0xED, INTERRUPT_MODES[0]],
            1,
            Target::Expression {
                expr: *expr,
                patch: ExprPatch::InterruptMode,
            },
        )),
        [_] => Err(CodeGenError::BadNumber(0)),
        _ => Err(CodeGenError::OperandCount(mnemonic)),
    }
}

/// Append an 8-bit port number written as `(n)` or `(=expression)`.
fn port(emitter: &mut Emitter, operand: &Operand) -> Result<(), CodeGenError> {
    match operand {
        Operand::Address(n) if n.value > 0xff => Err(CodeGenError::NumberTooBig(n.value)),
        Operand::Address(n) => {
            emitter.byte(n.value as u8);
            Ok(())
        }
        Operand::AddressExpression(expr) => {
            emitter.defer(Target::Expression {
                expr: *expr,
                patch: ExprPatch::Byte,
            })?;
            emitter.byte(0);
            Ok(())
        }
        _ => Err(CodeGenError::BadRegister(emitter.mnemonic)),
    }
}

pub(super) fn encode_in(mnemonic: Mnemonic, operands: &[Operand]) -> Result<Code, CodeGenError> {
    match operands {
        [Operand::Reg8(r), Operand::Indirect(Indirect::C)] => {
            Ok(Code::bytes(vec![0xED, 0x40 | (r.code() << 3)]))
        }
        [Operand::Reg8(Reg8::A), operand] => {
            let mut emitter = Emitter::new(mnemonic, &[0xDB]);
            port(&mut emitter, operand)?;
            Ok(emitter.finish())
        }
        [_, _] => Err(CodeGenError::BadRegister(mnemonic)),
        _ => Err(CodeGenError::OperandCount(mnemonic)),
    }
}

pub(super) fn encode_out(mnemonic: Mnemonic, operands: &[Operand]) -> Result<Code, CodeGenError> {
    match operands {
        [Operand::Indirect(Indirect::C), Operand::Reg8(r)] => {
            Ok(Code::bytes(vec![0xED, 0x41 | (r.code() << 3)]))
        }
        [operand, Operand::Reg8(Reg8::A)] => {
            let mut emitter = Emitter::new(mnemonic, &[0xD3]);
            port(&mut emitter, operand)?;
            Ok(emitter.finish())
        }
        [_, _] => Err(CodeGenError::BadRegister(mnemonic)),
        _ => Err(CodeGenError::OperandCount(mnemonic)),
    }
}

/// `nextreg reg, a` and `nextreg reg, value`.
pub(super) fn encode_nextreg(
    mnemonic: Mnemonic,
    operands: &[Operand],
) -> Result<Code, CodeGenError> {
    match operands {
        [register, Operand::Reg8(Reg8::A)] => {
            Ok(Emitter::new(mnemonic, &[0xED, 0x92]).imm8(register)?.finish())
        }
        [register, value] => Ok(Emitter::new(mnemonic, &[0xED, 0x91])
            .imm8(register)?
            .imm8(value)?
            .finish()),
        _ => Err(CodeGenError::OperandCount(mnemonic)),
    }
}

pub(super) fn encode_test(mnemonic: Mnemonic, operands: &[Operand]) -> Result<Code, CodeGenError> {
    match operands {
        [value] => Ok(Emitter::new(mnemonic, &[0xED, 0x27]).imm8(value)?.finish()),
        _ => Err(CodeGenError::OperandCount(mnemonic)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        assembler::{codegen::encode, interner::StringPools},
        ast::Number,
    };

    use pretty_assertions::assert_eq;

    fn imm(value: i32) -> Operand {
        Operand::Immediate(Number::unsigned(value))
    }

    #[test]
    fn test_io() -> Result<(), CodeGenError> {
        let a = Operand::Reg8(Reg8::A);
        let port = Operand::Address(Number::hex(0xfe));
        let tests = vec![
            (Mnemonic::Im, vec![imm(0)], vec![0xED, 0x46]),
            (Mnemonic::Im, vec![imm(2)], vec![0xED, 0x5E]),
            (Mnemonic::In, vec![a, port], vec![0xDB, 0xFE]),
            (
                Mnemonic::In,
                vec![Operand::Reg8(Reg8::E), Operand::Indirect(Indirect::C)],
                vec![0xED, 0x58],
            ),
            (Mnemonic::Out, vec![port, a], vec![0xD3, 0xFE]),
            (
                Mnemonic::Out,
                vec![Operand::Indirect(Indirect::C), Operand::Reg8(Reg8::H)],
                vec![0xED, 0x61],
            ),
            (Mnemonic::Nextreg, vec![imm(7), a], vec![0xED, 0x92, 0x07]),
            (Mnemonic::Nextreg, vec![imm(7), imm(3)], vec![0xED, 0x91, 0x07, 0x03]),
            (Mnemonic::Test, vec![imm(0x80)], vec![0xED, 0x27, 0x80]),
        ];
        for (mnemonic, operands, expected) in tests {
            assert_eq!(encode(mnemonic, &operands)?, Code::bytes(expected));
        }
        Ok(())
    }

    #[test]
    fn test_interrupt_mode_expression() -> Result<(), CodeGenError> {
        let mut pools = StringPools::default();
        let expr = pools.add("MODE").unwrap();
        assert_eq!(
            encode(Mnemonic::Im, &[Operand::Expression(expr)])?,
            Code::with_fixup(
                vec![0xED, 0x46],
                1,
                Target::Expression {
                    expr,
                    patch: ExprPatch::InterruptMode
                }
            )
        );
        Ok(())
    }

    #[test]
    fn test_errors() {
        let tests = vec![
            (Mnemonic::Im, vec![imm(3)], CodeGenError::NumberTooBig(3)),
            (
                Mnemonic::In,
                vec![Operand::Reg8(Reg8::A), Operand::Address(Number::hex(0x100))],
                CodeGenError::NumberTooBig(0x100),
            ),
            (
                Mnemonic::Out,
                vec![Operand::Address(Number::hex(0xfe)), Operand::Reg8(Reg8::B)],
                CodeGenError::BadRegister(Mnemonic::Out),
            ),
        ];
        for (mnemonic, operands, expected) in tests {
            assert_eq!(encode(mnemonic, &operands), Err(expected));
        }
    }
}
