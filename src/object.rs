use std::{fs, path::Path, str::FromStr};

use strum::IntoEnumIterator;
use thiserror::Error;

use crate::{
    assembler::{
        codegen,
        interner::{InternError, PoolKind, StrId, StringPools},
        Program, DEFAULT_MAX_LINES,
    },
    ast::{
        Condition, Displacement, IncludeKind, IndexReg, Indirect, Instruction, Line, Mnemonic, Node,
        Number, NumberFormat, Operand, Reg16, Reg8, TextKind,
    },
};

pub const MAGIC: &[u8; 4] = b"Z80X";
/// Object format written by this version. Older objects are read, newer ones are rejected.
pub const VERSION: u8 = 6;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ObjectError {
    #[error("Can't open {0}")]
    Open(String),
    #[error("Can't read {0}")]
    Read(String),
    #[error("Can't write {0}")]
    Write(String),
    #[error("Corrupt object file: {0}")]
    Corrupt(String),
    #[error("Object format version {0} is newer than this assembler")]
    ObjectFormatTooOld(u8),
    #[error(transparent)]
    Intern(#[from] InternError),
}

/// Fletcher-16 with modulo 256 sums.
pub fn checksum(data: &[u8]) -> u16 {
    let (mut sum1, mut sum2) = (0u8, 0u8);
    for byte in data {
        sum1 = sum1.wrapping_add(*byte);
        sum2 = sum2.wrapping_add(sum1);
    }
    ((sum2 as u16) << 8) | sum1 as u16
}

fn enum_index<T: IntoEnumIterator + PartialEq>(value: T) -> u8 {
    T::iter().position(|v| v == value).unwrap_or(0) as u8
}

mod tag {
    pub const EMPTY: u8 = 0;
    pub const COMMENT: u8 = 1;
    pub const LABEL: u8 = 2;
    pub const CONSTANT: u8 = 3;
    pub const TEXT: u8 = 4;
    pub const INCLUDE: u8 = 5;
    pub const INSTRUCTION: u8 = 6;
}

mod operand_tag {
    pub const REG8: u8 = 0;
    pub const REG16: u8 = 1;
    pub const INDEX: u8 = 2;
    pub const AF: u8 = 3;
    pub const SHADOW_AF: u8 = 4;
    pub const I: u8 = 5;
    pub const R: u8 = 6;
    pub const INDIRECT: u8 = 7;
    pub const INDEXED: u8 = 8;
    pub const CONDITION: u8 = 9;
    pub const IMMEDIATE: u8 = 10;
    pub const ADDRESS: u8 = 11;
    pub const LABEL: u8 = 12;
    pub const ADDRESS_LABEL: u8 = 13;
    pub const LABEL_DIFF: u8 = 14;
    pub const EXPRESSION: u8 = 15;
    pub const ADDRESS_EXPRESSION: u8 = 16;
}

#[derive(Debug, Default)]
struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    fn u8(&mut self, value: u8) {
        self.buf.push(value);
    }

    fn u16(&mut self, value: u16) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    fn str(&mut self, s: &str) {
        self.u8(s.len() as u8);
        self.buf.extend_from_slice(s.as_bytes());
    }

    fn id(&mut self, id: StrId) {
        self.u8(u8::from(id.is_long()));
        self.u8(id.index);
    }

    fn number(&mut self, n: &Number) {
        let format = match n.format {
            NumberFormat::Unsigned => 0,
            NumberFormat::Signed => 1,
            NumberFormat::Hex => 2,
            NumberFormat::Char => 3,
        };
        self.u8(format);
        self.buf.extend_from_slice(&n.value.to_le_bytes());
    }

    fn indirect(&mut self, indirect: &Indirect) {
        match indirect {
            Indirect::BC => self.u8(0),
            Indirect::DE => self.u8(1),
            Indirect::HL => self.u8(2),
            Indirect::SP => self.u8(3),
            Indirect::C => self.u8(4),
            Indirect::Index(ix) => {
                self.u8(5);
                self.u8(enum_index(*ix));
            }
        }
    }

    fn operand(&mut self, operand: &Operand) {
        use operand_tag::*;

        match operand {
            Operand::Reg8(r) => {
                self.u8(REG8);
                self.u8(enum_index(*r));
            }
            Operand::Reg16(rr) => {
                self.u8(REG16);
                self.u8(enum_index(*rr));
            }
            Operand::Index(ix) => {
                self.u8(INDEX);
                self.u8(enum_index(*ix));
            }
            Operand::AF => self.u8(AF),
            Operand::ShadowAF => self.u8(SHADOW_AF),
            Operand::I => self.u8(I),
            Operand::R => self.u8(R),
            Operand::Indirect(indirect) => {
                self.u8(INDIRECT);
                self.indirect(indirect);
            }
            Operand::Indexed(ix, d) => {
                self.u8(INDEXED);
                self.u8(enum_index(*ix));
                self.number(&d.0);
            }
            Operand::Condition(cc) => {
                self.u8(CONDITION);
                self.u8(enum_index(*cc));
            }
            Operand::Immediate(n) => {
                self.u8(IMMEDIATE);
                self.number(n);
            }
            Operand::Address(n) => {
                self.u8(ADDRESS);
                self.number(n);
            }
            Operand::Label(id) => {
                self.u8(LABEL);
                self.id(*id);
            }
            Operand::AddressLabel(id) => {
                self.u8(ADDRESS_LABEL);
                self.id(*id);
            }
            Operand::LabelDiff(a, b) => {
                self.u8(LABEL_DIFF);
                self.id(*a);
                self.id(*b);
            }
            Operand::Expression(id) => {
                self.u8(EXPRESSION);
                self.id(*id);
            }
            Operand::AddressExpression(id) => {
                self.u8(ADDRESS_EXPRESSION);
                self.id(*id);
            }
        }
    }

    fn line(&mut self, line: &Line) {
        match &line.node {
            Node::Empty => self.u8(tag::EMPTY),
            Node::Comment(id) => {
                self.u8(tag::COMMENT);
                self.id(*id);
            }
            Node::Label(id) => {
                self.u8(tag::LABEL);
                self.id(*id);
            }
            Node::Constant { name, expr } => {
                self.u8(tag::CONSTANT);
                self.id(*name);
                self.id(*expr);
            }
            Node::Text { kind, text } => {
                self.u8(tag::TEXT);
                self.u8(kind.delimiter() as u8);
                self.id(*text);
            }
            Node::Include { kind, path } => {
                self.u8(tag::INCLUDE);
                self.u8(kind.prefix() as u8);
                self.id(*path);
            }
            Node::Instruction(ins) => {
                self.u8(tag::INSTRUCTION);
                self.str(ins.mnemonic.into());
                self.u8(ins.operands.len() as u8);
                for operand in &ins.operands {
                    self.operand(operand);
                }
            }
        }
        match line.comment {
            Some(id) => {
                self.u8(1);
                self.id(id);
            }
            None => self.u8(0),
        }
    }
}

/// Serialize a program: header, both string pools, the records and a trailing checksum.
pub fn to_bytes(program: &Program) -> Vec<u8> {
    let mut w = Writer::default();
    w.buf.extend_from_slice(MAGIC);
    w.u8(VERSION);
    w.u16(program.pools.short().len() as u16);
    w.u16(program.pools.long().len() as u16);
    w.u16(program.lines.len() as u16);

    for s in program.pools.short().iter().chain(program.pools.long().iter()) {
        w.str(s);
    }
    for line in &program.lines {
        w.line(line);
    }

    let sum = checksum(&w.buf);
    w.u16(sum);
    w.buf
}

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

fn corrupt(what: &str) -> ObjectError {
    ObjectError::Corrupt(what.to_string())
}

impl<'a> Reader<'a> {
    fn u8(&mut self) -> Result<u8, ObjectError> {
        let byte = *self.data.get(self.pos).ok_or_else(|| corrupt("truncated"))?;
        self.pos += 1;
        Ok(byte)
    }

    fn u16(&mut self) -> Result<u16, ObjectError> {
        Ok(u16::from_le_bytes([self.u8()?, self.u8()?]))
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], ObjectError> {
        let bytes = self
            .data
            .get(self.pos..self.pos + len)
            .ok_or_else(|| corrupt("truncated"))?;
        self.pos += len;
        Ok(bytes)
    }

    fn str(&mut self) -> Result<&'a str, ObjectError> {
        let len = self.u8()? as usize;
        std::str::from_utf8(self.take(len)?).map_err(|_| corrupt("bad string"))
    }

    fn variant<T: IntoEnumIterator>(&mut self) -> Result<T, ObjectError> {
        let ix = self.u8()?;
        T::iter()
            .nth(ix as usize)
            .ok_or_else(|| corrupt("bad register"))
    }

    fn id(&mut self, pools: &StringPools) -> Result<StrId, ObjectError> {
        let id = match self.u8()? {
            0 => StrId::short(self.u8()?),
            1 => StrId::long(self.u8()?),
            _ => return Err(corrupt("bad string id")),
        };
        pools.get(id).map_err(|_| corrupt("bad string id"))?;
        Ok(id)
    }

    fn number(&mut self) -> Result<Number, ObjectError> {
        let format = match self.u8()? {
            0 => NumberFormat::Unsigned,
            1 => NumberFormat::Signed,
            2 => NumberFormat::Hex,
            3 => NumberFormat::Char,
            _ => return Err(corrupt("bad number format")),
        };
        let bytes = self.take(4)?;
        let value = i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        Ok(Number::new(value, format))
    }

    fn indirect(&mut self) -> Result<Indirect, ObjectError> {
        Ok(match self.u8()? {
            0 => Indirect::BC,
            1 => Indirect::DE,
            2 => Indirect::HL,
            3 => Indirect::SP,
            4 => Indirect::C,
            5 => Indirect::Index(self.variant::<IndexReg>()?),
            _ => return Err(corrupt("bad indirect operand")),
        })
    }

    fn operand(&mut self, pools: &StringPools) -> Result<Operand, ObjectError> {
        use operand_tag::*;

        Ok(match self.u8()? {
            REG8 => Operand::Reg8(self.variant::<Reg8>()?),
            REG16 => Operand::Reg16(self.variant::<Reg16>()?),
            INDEX => Operand::Index(self.variant::<IndexReg>()?),
            AF => Operand::AF,
            SHADOW_AF => Operand::ShadowAF,
            I => Operand::I,
            R => Operand::R,
            INDIRECT => Operand::Indirect(self.indirect()?),
            INDEXED => {
                let ix = self.variant::<IndexReg>()?;
                Operand::Indexed(ix, Displacement(self.number()?))
            }
            CONDITION => Operand::Condition(self.variant::<Condition>()?),
            IMMEDIATE => Operand::Immediate(self.number()?),
            ADDRESS => Operand::Address(self.number()?),
            LABEL => Operand::Label(self.id(pools)?),
            ADDRESS_LABEL => Operand::AddressLabel(self.id(pools)?),
            LABEL_DIFF => {
                let minuend = self.id(pools)?;
                Operand::LabelDiff(minuend, self.id(pools)?)
            }
            EXPRESSION => Operand::Expression(self.id(pools)?),
            ADDRESS_EXPRESSION => Operand::AddressExpression(self.id(pools)?),
            _ => return Err(corrupt("bad operand")),
        })
    }

    fn line(&mut self, pools: &StringPools) -> Result<Line, ObjectError> {
        let node = match self.u8()? {
            tag::EMPTY => Node::Empty,
            tag::COMMENT => Node::Comment(self.id(pools)?),
            tag::LABEL => Node::Label(self.id(pools)?),
            tag::CONSTANT => {
                let name = self.id(pools)?;
                Node::Constant {
                    name,
                    expr: self.id(pools)?,
                }
            }
            tag::TEXT => {
                let kind = TextKind::from_delimiter(self.u8()? as char)
                    .ok_or_else(|| corrupt("bad string delimiter"))?;
                Node::Text {
                    kind,
                    text: self.id(pools)?,
                }
            }
            tag::INCLUDE => {
                let kind = IncludeKind::from_prefix(self.u8()? as char)
                    .ok_or_else(|| corrupt("bad include"))?;
                Node::Include {
                    kind,
                    path: self.id(pools)?,
                }
            }
            tag::INSTRUCTION => {
                let mnemonic = self.str()?;
                let mnemonic = Mnemonic::from_str(mnemonic)
                    .map_err(|_| ObjectError::Corrupt(format!("bad mnemonic {}", mnemonic)))?;
                let count = self.u8()?;
                let operands = (0..count)
                    .map(|_| self.operand(pools))
                    .collect::<Result<Vec<_>, _>>()?;
                // Opcode bytes are not stored; the record must still encode.
                let code = codegen::encode(mnemonic, &operands)
                    .map_err(|e| ObjectError::Corrupt(format!("{}: {}", mnemonic, e)))?;
                Node::Instruction(Instruction::new(mnemonic, operands, code))
            }
            _ => return Err(corrupt("bad record")),
        };
        let comment = match self.u8()? {
            0 => None,
            1 => Some(self.id(pools)?),
            _ => return Err(corrupt("bad comment flag")),
        };
        Ok(Line::with_comment(node, comment))
    }
}

/// Deserialize a program written by [`to_bytes`].
#[tracing::instrument(skip(data))]
pub fn from_bytes(data: &[u8]) -> Result<Program, ObjectError> {
    if data.len() < MAGIC.len() + 1 + 6 + 2 || &data[..MAGIC.len()] != MAGIC {
        return Err(corrupt("bad header"));
    }
    let (body, sum) = data.split_at(data.len() - 2);
    if checksum(body) != u16::from_le_bytes([sum[0], sum[1]]) {
        return Err(corrupt("checksum mismatch"));
    }

    let mut r = Reader {
        data: body,
        pos: MAGIC.len(),
    };
    let version = r.u8()?;
    if version > VERSION {
        return Err(ObjectError::ObjectFormatTooOld(version));
    }
    let short_count = r.u16()? as usize;
    let long_count = r.u16()? as usize;
    let line_count = r.u16()? as usize;
    if short_count > 256 || long_count > 256 || line_count > DEFAULT_MAX_LINES {
        return Err(corrupt("bad counts"));
    }

    let mut pools = StringPools::new(short_count, long_count);
    for (kind, count) in [(PoolKind::Short, short_count), (PoolKind::Long, long_count)] {
        for ix in 0..count {
            let s = r.str()?;
            let id = match kind {
                PoolKind::Short => pools.add_short(s)?,
                PoolKind::Long => pools.add_long(s)?,
            };
            if id.index as usize != ix {
                return Err(corrupt("duplicate string"));
            }
        }
    }

    let mut program = Program::new(pools);
    for _ in 0..line_count {
        let line = r.line(&program.pools)?;
        program.lines.push(line);
    }
    if r.pos != body.len() {
        return Err(corrupt("trailing data"));
    }

    Ok(program)
}

/// Write a program to an object file.
#[tracing::instrument(skip(program))]
pub fn save(program: &Program, path: &Path) -> Result<(), ObjectError> {
    fs::write(path, to_bytes(program))
        .map_err(|e| ObjectError::Write(format!("{}: {}", path.display(), e)))?;
    tracing::debug!(lines = program.lines.len(), "Saved object");
    Ok(())
}

/// Read an object file into `program`.
///
/// A file that cannot be opened leaves `program` untouched. Any other failure leaves it empty.
#[tracing::instrument(skip(program))]
pub fn load(path: &Path, program: &mut Program) -> Result<(), ObjectError> {
    let data = fs::read(path).map_err(|_| ObjectError::Open(path.display().to_string()))?;
    match from_bytes(&data) {
        Ok(loaded) => {
            *program = loaded;
            Ok(())
        }
        Err(e) => {
            tracing::warn!(error = %e, "Failed to load object");
            program.clear();
            Err(e)
        }
    }
}

/// Read an object file.
pub fn read(path: &Path) -> Result<Program, ObjectError> {
    let mut program = Program::default();
    load(path, &mut program)?;
    Ok(program)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembler::{assemble, AssemblerConfig};

    use pretty_assertions::assert_eq;

    const SOURCE: &str = "\
;Copies a block
.Main
  ld hl,source
  ld de,$4000
  ld bc,end-source
  ldir
  ld a,(ix-3)
  bit =BIT,(hl)
  jr nz,Main  ;again
  ex af,af'
  push $1234
#message#
-lib
.BIT equ 2
.source
  ds 4,'x'
.end
";

    #[test]
    fn test_object_round_trip() -> Result<(), Box<dyn std::error::Error>> {
        let program = assemble(SOURCE, &AssemblerConfig::default())?;
        let bytes = to_bytes(&program);
        assert_eq!(&bytes[..4], MAGIC);
        assert_eq!(bytes[4], VERSION);

        let loaded = from_bytes(&bytes)?;
        assert_eq!(loaded.render()?, program.render()?);
        assert_eq!(loaded.lines, program.lines);
        Ok(())
    }

    #[test]
    fn test_checksum() {
        assert_eq!(checksum(&[]), 0);
        assert_eq!(checksum(&[1, 2]), 0x0403);
        assert_eq!(checksum(&[0xff, 0xff]), 0xfdfe);
    }

    #[test]
    fn test_corrupt() -> Result<(), Box<dyn std::error::Error>> {
        let program = assemble(SOURCE, &AssemblerConfig::default())?;
        let bytes = to_bytes(&program);

        let mut flipped = bytes.clone();
        flipped[12] ^= 0x55;
        assert_eq!(
            from_bytes(&flipped).map(|_| ()),
            Err(ObjectError::Corrupt("checksum mismatch".into()))
        );

        let mut newer = bytes[..bytes.len() - 2].to_vec();
        newer[4] = VERSION + 1;
        let sum = checksum(&newer);
        newer.extend_from_slice(&sum.to_le_bytes());
        assert_eq!(
            from_bytes(&newer).map(|_| ()),
            Err(ObjectError::ObjectFormatTooOld(VERSION + 1))
        );

        assert_eq!(
            from_bytes(b"nope").map(|_| ()),
            Err(ObjectError::Corrupt("bad header".into()))
        );
        Ok(())
    }

    #[test]
    fn test_load_clears_on_error() -> Result<(), Box<dyn std::error::Error>> {
        let dir = std::env::temp_dir().join(format!("z80asm-object-{}", std::process::id()));
        fs::create_dir_all(&dir)?;
        let path = dir.join("bad.x");
        fs::write(&path, b"Z80X\x06garbage!")?;

        let mut program = assemble(SOURCE, &AssemblerConfig::default())?;
        assert!(load(&path, &mut program).is_err());
        assert!(program.lines.is_empty());
        assert_eq!(program.pools.short().len(), 0);

        let mut program = assemble(SOURCE, &AssemblerConfig::default())?;
        let missing = dir.join("missing.x");
        assert_eq!(
            load(&missing, &mut program),
            Err(ObjectError::Open(missing.display().to_string()))
        );
        assert!(!program.lines.is_empty());

        fs::remove_dir_all(&dir)?;
        Ok(())
    }
}
