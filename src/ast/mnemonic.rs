/// Mnemonic of an instruction or assembler directive.
///
/// Mnemonics are written in lowercase and matched case-sensitively. The `Z80N` opcodes of the
/// ZX Spectrum Next are included.
#[derive(
    Debug,
    Hash,
    Eq,
    PartialEq,
    Clone,
    Copy,
    PartialOrd,
    Ord,
    strum_macros::Display,
    strum_macros::EnumString,
    strum_macros::EnumIter,
    strum_macros::IntoStaticStr,
)]
#[strum(serialize_all = "lowercase")]
pub enum Mnemonic {
    Adc,
    Add,
    Align,
    And,
    Bit,
    Brlc,
    Bsla,
    Bsra,
    Bsrf,
    Bsrl,
    Call,
    Ccf,
    Cp,
    Cpd,
    Cpdr,
    Cpi,
    Cpir,
    Cpl,
    Daa,
    Db,
    Dec,
    Di,
    Djnz,
    Ds,
    Dw,
    Ei,
    Ex,
    Exx,
    Halt,
    Im,
    In,
    Inc,
    Ind,
    Indr,
    Ini,
    Inir,
    Jp,
    Jr,
    Ld,
    Ldd,
    Lddr,
    Lddrx,
    Lddx,
    Ldi,
    Ldir,
    Ldirx,
    Ldix,
    Ldpirx,
    Ldws,
    Map,
    Mirror,
    Mul,
    Nbrk,
    Neg,
    Nextreg,
    Nop,
    Or,
    Org,
    Otdr,
    Otir,
    Out,
    Outd,
    Outi,
    Outinb,
    Pixelad,
    Pixeldn,
    Pop,
    Push,
    Res,
    Ret,
    Reti,
    Retn,
    Rl,
    Rla,
    Rlc,
    Rlca,
    Rld,
    Rr,
    Rra,
    Rrc,
    Rrca,
    Rrd,
    Rst,
    Sbc,
    Scf,
    Set,
    Setae,
    Sla,
    Sra,
    Srl,
    Sub,
    Swapnib,
    Test,
    Xor,
}

/// Longest mnemonic accepted by the parser.
pub const MAX_MNEMONIC_LEN: usize = 7;

impl Mnemonic {
    /// Assembler directives rather than CPU instructions.
    pub fn is_directive(&self) -> bool {
        matches!(
            self,
            Mnemonic::Align | Mnemonic::Db | Mnemonic::Dw | Mnemonic::Ds | Mnemonic::Map
                | Mnemonic::Org
        )
    }

    /// Mnemonics whose first operand may be a condition code.
    pub fn takes_condition(&self) -> bool {
        matches!(
            self,
            Mnemonic::Jp | Mnemonic::Jr | Mnemonic::Call | Mnemonic::Ret
        )
    }
}
