use lazy_static::lazy_static;
use std::collections::HashMap;
use strum::IntoEnumIterator;

use crate::ast::Mnemonic;

/// The encoding family of a mnemonic along with the opcode bytes that tell its members apart.
#[derive(Debug, Hash, Eq, PartialEq, Clone, Copy)]
pub enum Family {
    /// No operands, fixed opcode bytes.
    Implied(&'static [u8]),
    /// `and`, `or`, `xor`, `cp`, `sub`: register base and immediate opcode.
    Arith { reg: u8, imm: u8 },
    Add,
    /// `adc`/`sbc`: accumulator forms plus the `ED`-prefixed `hl,rr` opcode.
    Carry { reg: u8, imm: u8, pair: u8 },
    IncDec { reg: u8, pair: u8, hl: u8, index: u8 },
    /// `bit`, `res`, `set`
    BitOp(u8),
    /// `rlc`, `rrc`, `rl`, `rr`, `sla`, `sra`, `srl`
    Shift(u8),
    /// Next barrel shifts of `de` by `b`.
    Barrel(u8),
    Jp,
    Jr,
    Call,
    Djnz,
    Ret,
    Rst,
    Im,
    In,
    Out,
    Push,
    Pop,
    Ex,
    Ld,
    Mirror,
    Mul,
    Nextreg,
    Test,
    Db,
    Dw,
    Ds,
    Align,
    Org,
    Map,
}

/// A mapper between mnemonics, their spelling and their encoding family.
#[derive(Debug)]
pub struct OpcodeMapping {
    /// Mnemonic names in ascending order, searched with a binary search.
    names: Vec<(&'static str, Mnemonic)>,
    families: HashMap<Mnemonic, Family>,
}

impl OpcodeMapping {
    /// Find the mnemonic spelled `name`.
    pub fn find_mnemonic(&self, name: &str) -> Option<Mnemonic> {
        self.names
            .binary_search_by(|(n, _)| (*n).cmp(name))
            .ok()
            .map(|ix| self.names[ix].1)
    }

    /// Find the encoding family of a mnemonic.
    pub fn find_family(&self, mnemonic: Mnemonic) -> Option<Family> {
        self.families.get(&mnemonic).copied()
    }

    fn new() -> Self {
        let mut names: Vec<(&'static str, Mnemonic)> =
            Mnemonic::iter().map(|m| (m.into(), m)).collect();
        names.sort_by(|a, b| a.0.cmp(b.0));

        let mappings = vec![
            (Mnemonic::Adc, Family::Carry { reg: 0x88, imm: 0xCE, pair: 0x4A }),
            (Mnemonic::Add, Family::Add),
            (Mnemonic::Align, Family::Align),
            (Mnemonic::And, Family::Arith { reg: 0xA0, imm: 0xE6 }),
            (Mnemonic::Bit, Family::BitOp(0x40)),
            (Mnemonic::Brlc, Family::Barrel(0x2C)),
            (Mnemonic::Bsla, Family::Barrel(0x28)),
            (Mnemonic::Bsra, Family::Barrel(0x29)),
            (Mnemonic::Bsrf, Family::Barrel(0x2B)),
            (Mnemonic::Bsrl, Family::Barrel(0x2A)),
            (Mnemonic::Call, Family::Call),
            (Mnemonic::Ccf, Family::Implied(&[0x3F])),
            (Mnemonic::Cp, Family::Arith { reg: 0xB8, imm: 0xFE }),
            (Mnemonic::Cpd, Family::Implied(&[0xED, 0xA9])),
            (Mnemonic::Cpdr, Family::Implied(&[0xED, 0xB9])),
            (Mnemonic::Cpi, Family::Implied(&[0xED, 0xA1])),
            (Mnemonic::Cpir, Family::Implied(&[0xED, 0xB1])),
            (Mnemonic::Cpl, Family::Implied(&[0x2F])),
            (Mnemonic::Daa, Family::Implied(&[0x27])),
            (Mnemonic::Db, Family::Db),
            (Mnemonic::Dec, Family::IncDec { reg: 0x05, pair: 0x0B, hl: 0x35, index: 0x2B }),
            (Mnemonic::Di, Family::Implied(&[0xF3])),
            (Mnemonic::Djnz, Family::Djnz),
            (Mnemonic::Ds, Family::Ds),
            (Mnemonic::Dw, Family::Dw),
            (Mnemonic::Ei, Family::Implied(&[0xFB])),
            (Mnemonic::Ex, Family::Ex),
            (Mnemonic::Exx, Family::Implied(&[0xD9])),
            (Mnemonic::Halt, Family::Implied(&[0x76])),
            (Mnemonic::Im, Family::Im),
            (Mnemonic::In, Family::In),
            (Mnemonic::Inc, Family::IncDec { reg: 0x04, pair: 0x03, hl: 0x34, index: 0x23 }),
            (Mnemonic::Ind, Family::Implied(&[0xED, 0xAA])),
            (Mnemonic::Indr, Family::Implied(&[0xED, 0xBA])),
            (Mnemonic::Ini, Family::Implied(&[0xED, 0xA2])),
            (Mnemonic::Inir, Family::Implied(&[0xED, 0xB2])),
            (Mnemonic::Jp, Family::Jp),
            (Mnemonic::Jr, Family::Jr),
            (Mnemonic::Ld, Family::Ld),
            (Mnemonic::Ldd, Family::Implied(&[0xED, 0xA8])),
            (Mnemonic::Lddr, Family::Implied(&[0xED, 0xB8])),
            (Mnemonic::Lddrx, Family::Implied(&[0xED, 0xBC])),
            (Mnemonic::Lddx, Family::Implied(&[0xED, 0xAC])),
            (Mnemonic::Ldi, Family::Implied(&[0xED, 0xA0])),
            (Mnemonic::Ldir, Family::Implied(&[0xED, 0xB0])),
            (Mnemonic::Ldirx, Family::Implied(&[0xED, 0xB4])),
            (Mnemonic::Ldix, Family::Implied(&[0xED, 0xA4])),
            (Mnemonic::Ldpirx, Family::Implied(&[0xED, 0xB7])),
            (Mnemonic::Ldws, Family::Implied(&[0xED, 0xA5])),
            (Mnemonic::Map, Family::Map),
            (Mnemonic::Mirror, Family::Mirror),
            (Mnemonic::Mul, Family::Mul),
            (Mnemonic::Nbrk, Family::Implied(&[0xED, 0x91, 0x02, 0x08])),
            (Mnemonic::Neg, Family::Implied(&[0xED, 0x44])),
            (Mnemonic::Nextreg, Family::Nextreg),
            (Mnemonic::Nop, Family::Implied(&[0x00])),
            (Mnemonic::Or, Family::Arith { reg: 0xB0, imm: 0xF6 }),
            (Mnemonic::Org, Family::Org),
            (Mnemonic::Otdr, Family::Implied(&[0xED, 0xBB])),
            (Mnemonic::Otir, Family::Implied(&[0xED, 0xB3])),
            (Mnemonic::Out, Family::Out),
            (Mnemonic::Outd, Family::Implied(&[0xED, 0xAB])),
            (Mnemonic::Outi, Family::Implied(&[0xED, 0xA3])),
            (Mnemonic::Outinb, Family::Implied(&[0xED, 0x90])),
            (Mnemonic::Pixelad, Family::Implied(&[0xED, 0x94])),
            (Mnemonic::Pixeldn, Family::Implied(&[0xED, 0x93])),
            (Mnemonic::Pop, Family::Pop),
            (Mnemonic::Push, Family::Push),
            (Mnemonic::Res, Family::BitOp(0x80)),
            (Mnemonic::Ret, Family::Ret),
            (Mnemonic::Reti, Family::Implied(&[0xED, 0x4D])),
            (Mnemonic::Retn, Family::Implied(&[0xED, 0x45])),
            (Mnemonic::Rl, Family::Shift(0x10)),
            (Mnemonic::Rla, Family::Implied(&[0x17])),
            (Mnemonic::Rlc, Family::Shift(0x00)),
            (Mnemonic::Rlca, Family::Implied(&[0x07])),
            (Mnemonic::Rld, Family::Implied(&[0xED, 0x6F])),
            (Mnemonic::Rr, Family::Shift(0x18)),
            (Mnemonic::Rra, Family::Implied(&[0x1F])),
            (Mnemonic::Rrc, Family::Shift(0x08)),
            (Mnemonic::Rrca, Family::Implied(&[0x0F])),
            (Mnemonic::Rrd, Family::Implied(&[0xED, 0x67])),
            (Mnemonic::Rst, Family::Rst),
            (Mnemonic::Sbc, Family::Carry { reg: 0x98, imm: 0xDE, pair: 0x42 }),
            (Mnemonic::Scf, Family::Implied(&[0x37])),
            (Mnemonic::Set, Family::BitOp(0xC0)),
            (Mnemonic::Setae, Family::Implied(&[0xED, 0x95])),
            (Mnemonic::Sla, Family::Shift(0x20)),
            (Mnemonic::Sra, Family::Shift(0x28)),
            (Mnemonic::Srl, Family::Shift(0x38)),
            (Mnemonic::Sub, Family::Arith { reg: 0x90, imm: 0xD6 }),
            (Mnemonic::Swapnib, Family::Implied(&[0xED, 0x23])),
            (Mnemonic::Test, Family::Test),
            (Mnemonic::Xor, Family::Arith { reg: 0xA8, imm: 0xEE }),
        ];

        let families = mappings.into_iter().collect();

        Self { names, families }
    }
}

lazy_static! {
    pub static ref OPCODE_MAPPING: OpcodeMapping = OpcodeMapping::new();
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;

    #[test]
    fn test_every_mnemonic_has_a_family() {
        for mnemonic in Mnemonic::iter() {
            assert!(
                OPCODE_MAPPING.find_family(mnemonic).is_some(),
                "missing family for {}",
                mnemonic
            );
        }
    }

    #[test]
    fn test_find_mnemonic() {
        let tests = vec![
            ("adc", Some(Mnemonic::Adc)),
            ("xor", Some(Mnemonic::Xor)),
            ("ld", Some(Mnemonic::Ld)),
            ("lddrx", Some(Mnemonic::Lddrx)),
            ("Ld", None),
            ("lda", None),
            ("", None),
        ];
        for (name, expected) in tests {
            assert_eq!(OPCODE_MAPPING.find_mnemonic(name), expected);
        }
    }
}
