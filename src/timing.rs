use std::fmt;

use crate::ast::{Indirect, Instruction, Mnemonic, Operand, Reg16, Reg8};

/// Flag bits of the `f` register.
pub mod flags {
    pub const S: u8 = 0x80;
    pub const Z: u8 = 0x40;
    pub const H: u8 = 0x10;
    pub const P: u8 = 0x04;
    pub const N: u8 = 0x02;
    pub const C: u8 = 0x01;

    pub const SZHPNC: u8 = S | Z | H | P | N | C;
    pub const SZHPN: u8 = S | Z | H | P | N;
    pub const SZHPC: u8 = S | Z | H | P | C;
    pub const HPN: u8 = H | P | N;
    pub const HNC: u8 = H | N | C;
    pub const HN: u8 = H | N;
}

use flags::*;

/// Machine cycles, T-states and the flags an instruction writes.
///
/// The first entry of each pair is the cost when a condition is not met or a block instruction
/// terminates, the second when a branch is taken or the block instruction repeats. Both are equal
/// for everything else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Timing {
    pub m: [u8; 2],
    pub t: [u8; 2],
    pub flags: u8,
}

impl Timing {
    const fn fixed(m: u8, t: u8, flags: u8) -> Self {
        Self {
            m: [m, m],
            t: [t, t],
            flags,
        }
    }

    const fn branch(m: [u8; 2], t: [u8; 2], flags: u8) -> Self {
        Self { m, t, flags }
    }

    const fn none() -> Self {
        Self::fixed(0, 0, 0)
    }

    pub fn is_conditional(&self) -> bool {
        self.t[0] != self.t[1]
    }
}

impl fmt::Display for Timing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_conditional() {
            write!(f, "{}/{}", self.t[0], self.t[1])
        } else {
            write!(f, "{}", self.t[0])
        }
    }
}

fn is_indexed(operand: &Operand) -> bool {
    matches!(operand, Operand::Indexed(..))
}

fn is_immediate(operand: &Operand) -> bool {
    matches!(
        operand,
        Operand::Immediate(_) | Operand::Label(_) | Operand::Expression(_) | Operand::LabelDiff(..)
    )
}

fn is_address(operand: &Operand) -> bool {
    matches!(
        operand,
        Operand::Address(_) | Operand::AddressLabel(_) | Operand::AddressExpression(_)
    )
}

/// 8-bit arithmetic and logic on the accumulator, costed by the source operand.
fn accumulator(source: Option<&Operand>) -> Timing {
    match source {
        Some(op) if is_indexed(op) => Timing::fixed(5, 19, SZHPNC),
        Some(op) if op.is_hl_indirect() || is_immediate(op) => Timing::fixed(2, 7, SZHPNC),
        _ => Timing::fixed(1, 4, SZHPNC),
    }
}

fn add(operands: &[Operand]) -> Timing {
    match operands {
        [Operand::Index(_), _] => Timing::fixed(4, 15, HNC),
        [Operand::Reg16(_), Operand::Reg8(Reg8::A)] => Timing::fixed(2, 8, C),
        [Operand::Reg16(_), Operand::Reg16(_)] => Timing::fixed(3, 11, HNC),
        [Operand::Reg16(_), _] => Timing::fixed(4, 16, 0),
        _ => accumulator(operands.last()),
    }
}

fn carry(operands: &[Operand]) -> Timing {
    match operands {
        [Operand::Reg16(_), _] => Timing::fixed(4, 15, SZHPNC),
        _ => accumulator(operands.last()),
    }
}

fn inc_dec(operands: &[Operand]) -> Timing {
    match operands {
        [op] if op.is_hl_indirect() => Timing::fixed(3, 11, SZHPN),
        [Operand::Indexed(..)] => Timing::fixed(6, 23, SZHPN),
        [Operand::Index(_)] => Timing::fixed(2, 10, 0),
        [Operand::Reg16(_)] => Timing::fixed(1, 6, 0),
        _ => Timing::fixed(1, 4, SZHPN),
    }
}

/// Rotates, shifts and `res`/`set`, which all read-modify-write their target.
fn read_modify_write(target: Option<&Operand>, flags: u8) -> Timing {
    match target {
        Some(op) if op.is_hl_indirect() => Timing::fixed(4, 15, flags),
        Some(op) if is_indexed(op) => Timing::fixed(6, 23, flags),
        _ => Timing::fixed(2, 8, flags),
    }
}

fn bit(target: Option<&Operand>) -> Timing {
    match target {
        Some(op) if op.is_hl_indirect() => Timing::fixed(3, 12, SZHPN),
        Some(op) if is_indexed(op) => Timing::fixed(5, 20, SZHPN),
        _ => Timing::fixed(2, 8, SZHPN),
    }
}

fn ld(operands: &[Operand]) -> Timing {
    let [dst, src] = operands else {
        return Timing::none();
    };
    match (dst, src) {
        (Operand::Index(_), src) if is_immediate(src) => Timing::fixed(4, 14, 0),
        (Operand::Index(_), src) if is_address(src) => Timing::fixed(6, 20, 0),
        (dst, Operand::Index(_)) if is_address(dst) => Timing::fixed(6, 20, 0),
        (Operand::Reg16(Reg16::SP), Operand::Index(_)) => Timing::fixed(2, 10, 0),
        (dst, src) if is_indexed(dst) || is_indexed(src) => Timing::fixed(5, 19, 0),
        (Operand::I | Operand::R, _) | (_, Operand::I | Operand::R) => Timing::fixed(2, 9, 0),
        (Operand::Reg16(Reg16::HL), src) if is_address(src) => Timing::fixed(5, 16, 0),
        (dst, Operand::Reg16(Reg16::HL)) if is_address(dst) => Timing::fixed(5, 16, 0),
        (Operand::Reg16(_), src) if is_address(src) => Timing::fixed(6, 20, 0),
        (dst, Operand::Reg16(_)) if is_address(dst) => Timing::fixed(6, 20, 0),
        (Operand::Reg16(Reg16::SP), Operand::Reg16(Reg16::HL)) => Timing::fixed(1, 6, 0),
        (Operand::Reg16(_), _) => Timing::fixed(3, 10, 0),
        (dst, src) if dst.is_hl_indirect() && is_immediate(src) => Timing::fixed(3, 10, 0),
        (Operand::Reg8(_), src) if is_immediate(src) => Timing::fixed(2, 7, 0),
        (Operand::Indirect(_), _) | (_, Operand::Indirect(_)) => Timing::fixed(2, 7, 0),
        (dst, src) if is_address(dst) || is_address(src) => Timing::fixed(4, 13, 0),
        _ => Timing::fixed(1, 4, 0),
    }
}

fn ex(operands: &[Operand]) -> Timing {
    match operands {
        [Operand::AF, _] => Timing::fixed(1, 4, SZHPNC),
        [Operand::Indirect(Indirect::SP), Operand::Index(_)] => Timing::fixed(6, 23, 0),
        [Operand::Indirect(Indirect::SP), _] => Timing::fixed(5, 19, 0),
        _ => Timing::fixed(1, 4, 0),
    }
}

fn jp(operands: &[Operand]) -> Timing {
    match operands {
        [Operand::Indirect(Indirect::Index(_))] => Timing::fixed(2, 8, 0),
        [Operand::Indirect(Indirect::HL)] => Timing::fixed(1, 4, 0),
        [Operand::Indirect(Indirect::C)] => Timing::fixed(3, 13, SZHPNC),
        _ => Timing::fixed(3, 10, 0),
    }
}

/// Timing of an encoded instruction, derived from its mnemonic and operand classes.
///
/// Directives take no time.
pub fn timing(instruction: &Instruction) -> Timing {
    let operands = instruction.operands.as_slice();
    let conditional = matches!(operands.first(), Some(Operand::Condition(_)));

    match instruction.mnemonic {
        Mnemonic::Adc | Mnemonic::Sbc => carry(operands),
        Mnemonic::Add => add(operands),
        Mnemonic::Sub | Mnemonic::And | Mnemonic::Or | Mnemonic::Xor | Mnemonic::Cp => {
            accumulator(operands.last())
        }
        Mnemonic::Inc | Mnemonic::Dec => inc_dec(operands),
        Mnemonic::Bit => bit(operands.last()),
        Mnemonic::Res | Mnemonic::Set => read_modify_write(operands.last(), 0),
        Mnemonic::Rl
        | Mnemonic::Rr
        | Mnemonic::Rlc
        | Mnemonic::Rrc
        | Mnemonic::Sla
        | Mnemonic::Sra
        | Mnemonic::Srl => read_modify_write(operands.last(), SZHPNC),

        Mnemonic::Call if conditional => Timing::branch([3, 5], [10, 17], 0),
        Mnemonic::Call => Timing::fixed(5, 17, 0),
        Mnemonic::Jp => jp(operands),
        Mnemonic::Jr if conditional => Timing::branch([2, 3], [7, 12], 0),
        Mnemonic::Jr => Timing::fixed(3, 12, 0),
        Mnemonic::Djnz => Timing::branch([2, 3], [8, 13], 0),
        Mnemonic::Ret if conditional => Timing::branch([1, 3], [5, 11], 0),
        Mnemonic::Ret => Timing::fixed(3, 10, 0),
        Mnemonic::Reti | Mnemonic::Retn => Timing::fixed(4, 14, 0),
        Mnemonic::Rst => Timing::fixed(3, 11, 0),

        Mnemonic::Ld => ld(operands),
        Mnemonic::Ex => ex(operands),
        Mnemonic::Push => match operands {
            [Operand::Index(_)] => Timing::fixed(4, 15, 0),
            [op] if is_immediate(op) => Timing::fixed(6, 23, 0),
            _ => Timing::fixed(3, 11, 0),
        },
        Mnemonic::Pop => match operands {
            [Operand::Index(_)] => Timing::fixed(4, 14, 0),
            _ => Timing::fixed(3, 10, 0),
        },

        Mnemonic::In => match operands {
            [_, Operand::Indirect(Indirect::C)] => Timing::fixed(3, 12, SZHPN),
            _ => Timing::fixed(3, 11, 0),
        },
        Mnemonic::Out => match operands {
            [Operand::Indirect(Indirect::C), _] => Timing::fixed(3, 12, 0),
            _ => Timing::fixed(3, 11, 0),
        },
        Mnemonic::Nextreg => match operands {
            [_, Operand::Reg8(Reg8::A)] => Timing::fixed(4, 17, 0),
            _ => Timing::fixed(5, 20, 0),
        },

        Mnemonic::Ccf | Mnemonic::Scf => Timing::fixed(1, 4, HNC),
        Mnemonic::Cpl => Timing::fixed(1, 4, HN),
        Mnemonic::Daa => Timing::fixed(1, 4, SZHPC),
        Mnemonic::Rla | Mnemonic::Rlca | Mnemonic::Rra | Mnemonic::Rrca => {
            Timing::fixed(1, 4, HNC)
        }
        Mnemonic::Rld | Mnemonic::Rrd => Timing::fixed(5, 18, SZHPN),
        Mnemonic::Neg => Timing::fixed(2, 8, SZHPNC),
        Mnemonic::Im => Timing::fixed(2, 8, 0),
        Mnemonic::Di | Mnemonic::Ei | Mnemonic::Exx | Mnemonic::Halt | Mnemonic::Nop => {
            Timing::fixed(1, 4, 0)
        }

        Mnemonic::Cpd | Mnemonic::Cpi => Timing::fixed(4, 16, SZHPN),
        Mnemonic::Cpdr | Mnemonic::Cpir => Timing::branch([4, 5], [16, 21], SZHPN),
        Mnemonic::Ldd | Mnemonic::Ldi => Timing::fixed(4, 16, HPN),
        Mnemonic::Lddr | Mnemonic::Ldir => Timing::branch([4, 5], [16, 21], HPN),
        Mnemonic::Ind | Mnemonic::Ini | Mnemonic::Outd | Mnemonic::Outi => {
            Timing::fixed(4, 16, SZHPN)
        }
        Mnemonic::Indr | Mnemonic::Inir | Mnemonic::Otdr | Mnemonic::Otir => {
            Timing::branch([4, 5], [16, 21], SZHPN)
        }

        Mnemonic::Lddx | Mnemonic::Ldix => Timing::fixed(4, 16, 0),
        Mnemonic::Lddrx | Mnemonic::Ldirx | Mnemonic::Ldpirx => {
            Timing::branch([4, 5], [16, 21], 0)
        }
        Mnemonic::Ldws => Timing::fixed(4, 16, SZHPN),
        Mnemonic::Outinb => Timing::fixed(4, 16, SZHPNC),
        Mnemonic::Brlc
        | Mnemonic::Bsla
        | Mnemonic::Bsra
        | Mnemonic::Bsrf
        | Mnemonic::Bsrl
        | Mnemonic::Swapnib
        | Mnemonic::Pixelad
        | Mnemonic::Pixeldn
        | Mnemonic::Setae
        | Mnemonic::Mirror
        | Mnemonic::Mul => Timing::fixed(2, 8, 0),
        Mnemonic::Test => Timing::fixed(3, 11, SZHPNC),
        Mnemonic::Nbrk => Timing::fixed(5, 20, 0),

        Mnemonic::Align
        | Mnemonic::Db
        | Mnemonic::Dw
        | Mnemonic::Ds
        | Mnemonic::Map
        | Mnemonic::Org => Timing::none(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembler::{interner::StringPools, parser::Parser, parser::DEFAULT_MAX_LINE_LEN};
    use crate::ast::Node;

    use pretty_assertions::assert_eq;

    fn timing_of(text: &str) -> Timing {
        let mut pools = StringPools::default();
        let line = Parser::new(&mut pools, DEFAULT_MAX_LINE_LEN)
            .parse_line(text)
            .unwrap();
        match line.node {
            Node::Instruction(ins) => timing(&ins),
            node => panic!("not an instruction: {:?}", node),
        }
    }

    #[test]
    fn test_cycles() {
        let tests = vec![
            ("nop", Timing::fixed(1, 4, 0)),
            ("add a,b", Timing::fixed(1, 4, SZHPNC)),
            ("add a,(hl)", Timing::fixed(2, 7, SZHPNC)),
            ("add a,(ix+1)", Timing::fixed(5, 19, SZHPNC)),
            ("add hl,de", Timing::fixed(3, 11, HNC)),
            ("add ix,bc", Timing::fixed(4, 15, HNC)),
            ("add hl,a", Timing::fixed(2, 8, C)),
            ("add de,$100", Timing::fixed(4, 16, 0)),
            ("adc hl,bc", Timing::fixed(4, 15, SZHPNC)),
            ("cp 10", Timing::fixed(2, 7, SZHPNC)),
            ("inc (iy+2)", Timing::fixed(6, 23, SZHPN)),
            ("dec bc", Timing::fixed(1, 6, 0)),
            ("bit 3,(hl)", Timing::fixed(3, 12, SZHPN)),
            ("set 3,(ix+0)", Timing::fixed(6, 23, 0)),
            ("rl c", Timing::fixed(2, 8, SZHPNC)),
            ("ld a,b", Timing::fixed(1, 4, 0)),
            ("ld a,5", Timing::fixed(2, 7, 0)),
            ("ld (hl),5", Timing::fixed(3, 10, 0)),
            ("ld a,(de)", Timing::fixed(2, 7, 0)),
            ("ld a,($4000)", Timing::fixed(4, 13, 0)),
            ("ld hl,($4000)", Timing::fixed(5, 16, 0)),
            ("ld de,($4000)", Timing::fixed(6, 20, 0)),
            ("ld ix,$4000", Timing::fixed(4, 14, 0)),
            ("ld sp,hl", Timing::fixed(1, 6, 0)),
            ("ld bc,$4000", Timing::fixed(3, 10, 0)),
            ("ld a,i", Timing::fixed(2, 9, 0)),
            ("push ix", Timing::fixed(4, 15, 0)),
            ("push $1234", Timing::fixed(6, 23, 0)),
            ("pop af", Timing::fixed(3, 10, 0)),
            ("ex (sp),hl", Timing::fixed(5, 19, 0)),
            ("in a,(c)", Timing::fixed(3, 12, SZHPN)),
            ("out ($fe),a", Timing::fixed(3, 11, 0)),
            ("nextreg 7,a", Timing::fixed(4, 17, 0)),
            ("ldir", Timing::branch([4, 5], [16, 21], HPN)),
            ("db 1", Timing::none()),
        ];
        for (input, expected) in tests {
            assert_eq!(timing_of(input), expected, "input: {}", input);
        }
    }

    #[test]
    fn test_branches() {
        let tests = vec![
            ("jp $8000", "10"),
            ("jp (hl)", "4"),
            ("jp nz,$8000", "10"),
            ("call z,$8000", "10/17"),
            ("ret nc", "5/11"),
            ("ret", "10"),
            ("jr c,loop", "7/12"),
            ("jr loop", "12"),
            ("djnz loop", "8/13"),
        ];
        for (input, expected) in tests {
            assert_eq!(timing_of(input).to_string(), expected, "input: {}", input);
        }
    }
}
