use crate::{
    assembler::interner::{InternError, StrId, StringPools},
    ast::{Condition, Displacement, IndexReg, Number, Reg16, Reg8},
};

/// Register pairs that can be used as a pointer, e.g. `(bc)`.
#[derive(Debug, Hash, Eq, PartialEq, Clone, Copy)]
pub enum Indirect {
    BC,
    DE,
    HL,
    SP,
    /// `(c)`, the port addressed by `c` in `in`/`out`.
    C,
    /// `(ix)` and `(iy)` without displacement, only valid for `jp`.
    Index(IndexReg),
}

/// A single parsed operand.
///
/// Operands are stored in canonical form in the instruction record and are what the decoder spells
/// back out. Label and expression text is held by the module's string pools.
#[derive(Debug, Hash, Eq, PartialEq, Clone, Copy)]
pub enum Operand {
    Reg8(Reg8),
    Reg16(Reg16),
    Index(IndexReg),
    AF,
    /// The shadow register pair `af'`.
    ShadowAF,
    I,
    R,
    Indirect(Indirect),
    /// `(ix+d)` / `(iy+d)`
    Indexed(IndexReg, Displacement),
    Condition(Condition),
    Immediate(Number),
    /// `(nn)`
    Address(Number),
    Label(StrId),
    /// `(label)`
    AddressLabel(StrId),
    /// `label1-label2`
    LabelDiff(StrId, StrId),
    /// `=expression`
    Expression(StrId),
    /// `(=expression)`
    AddressExpression(StrId),
}

impl Operand {
    /// Render the operand the way it would be typed.
    pub fn render(&self, pools: &StringPools) -> Result<String, InternError> {
        Ok(match self {
            Operand::Reg8(r) => r.to_string(),
            Operand::Reg16(rr) => rr.to_string(),
            Operand::Index(ix) => ix.to_string(),
            Operand::AF => "af".to_string(),
            Operand::ShadowAF => "af'".to_string(),
            Operand::I => "i".to_string(),
            Operand::R => "r".to_string(),
            Operand::Indirect(ind) => match ind {
                Indirect::BC => "(bc)".to_string(),
                Indirect::DE => "(de)".to_string(),
                Indirect::HL => "(hl)".to_string(),
                Indirect::SP => "(sp)".to_string(),
                Indirect::C => "(c)".to_string(),
                Indirect::Index(ix) => format!("({})", ix),
            },
            Operand::Indexed(ix, d) => format!("({}{})", ix, d),
            Operand::Condition(cc) => cc.to_string(),
            Operand::Immediate(n) => n.to_string(),
            Operand::Address(n) => format!("({})", n),
            Operand::Label(id) => pools.get(*id)?.to_string(),
            Operand::AddressLabel(id) => format!("({})", pools.get(*id)?),
            Operand::LabelDiff(a, b) => format!("{}-{}", pools.get(*a)?, pools.get(*b)?),
            Operand::Expression(id) => format!("={}", pools.get(*id)?),
            Operand::AddressExpression(id) => format!("(={})", pools.get(*id)?),
        })
    }

    /// Whether the operand references `(hl)`.
    pub fn is_hl_indirect(&self) -> bool {
        matches!(self, Operand::Indirect(Indirect::HL))
    }

    /// Whether the operand only becomes known at link time.
    pub fn is_deferred(&self) -> bool {
        matches!(
            self,
            Operand::Label(_)
                | Operand::AddressLabel(_)
                | Operand::LabelDiff(..)
                | Operand::Expression(_)
                | Operand::AddressExpression(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::NumberFormat;

    use pretty_assertions::assert_eq;

    #[test]
    fn test_render() -> Result<(), InternError> {
        let mut pools = StringPools::default();
        let start = pools.add("start")?;
        let end = pools.add("end")?;
        let exp = pools.add("SIZE*2")?;

        let tests = vec![
            (Operand::Reg8(Reg8::A), "a"),
            (Operand::ShadowAF, "af'"),
            (Operand::Indirect(Indirect::Index(IndexReg::IY)), "(iy)"),
            (
                Operand::Indexed(
                    IndexReg::IX,
                    Displacement(Number::new(-3, NumberFormat::Signed)),
                ),
                "(ix-3)",
            ),
            (Operand::Address(Number::hex(0x4000)), "($4000)"),
            (Operand::AddressLabel(start), "(start)"),
            (Operand::LabelDiff(end, start), "end-start"),
            (Operand::Expression(exp), "=SIZE*2"),
            (Operand::AddressExpression(exp), "(=SIZE*2)"),
        ];
        for (operand, expected) in tests {
            assert_eq!(operand.render(&pools)?, expected);
        }
        Ok(())
    }
}
