use std::str::FromStr;

use thiserror::Error;

use crate::{
    assembler::{
        codegen::{self, opcode::OPCODE_MAPPING, CodeGenError},
        interner::{InternError, StrId, StringPools, SHORT_STRING_LEN},
        lexer::Lexer,
    },
    ast::{
        Condition, Displacement, IncludeKind, IndexReg, Indirect, Instruction, Line, Mnemonic, Node,
        Number, NumberFormat, Operand, Reg16, Reg8, TextKind, MAX_MNEMONIC_LEN, RESERVED_NAMES,
    },
    expression,
};

/// Default longest source line, not counting surrounding whitespace.
pub const DEFAULT_MAX_LINE_LEN: usize = 32;

#[derive(Error, Debug, PartialEq, Eq, Clone)]
pub enum ParseError {
    #[error("Bad mnemonic: {0}")]
    BadMnemonic(String),
    #[error("Bad number: {0}")]
    BadNumber(String),
    #[error("Number too big: {0}")]
    NumberTooBig(String),
    #[error("Comma expected")]
    CommaExpected,
    #[error("Bad register: {0}")]
    BadRegister(String),
    #[error("Bad label: {0}")]
    BadLabel(String),
    #[error("Nothing may follow a long label: {0}")]
    LongLabelExtra(String),
    #[error("Comment too long: {0}")]
    BadComment(String),
    #[error("Bad expression: {0}")]
    BadExpression(String),
    #[error("Bad filename: {0}")]
    BadFilename(String),
    #[error("Line too long ({0} characters)")]
    LineTooLong(usize),
    #[error("Too many lines")]
    TooManyLines,
    #[error("Unexpected input: {0}")]
    UnexpectedInput(String),
    #[error(transparent)]
    Intern(#[from] InternError),
    #[error(transparent)]
    CodeGen(#[from] CodeGenError),
}

/// Whether `name` can be used as a label: `_` or a letter, then letters, digits or `_`, and not
/// the name of a register.
pub fn is_label_name(name: &str) -> bool {
    let mut chars = name.chars();
    let valid_start = matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_');
    valid_start
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !RESERVED_NAMES.contains(&name)
}

/// Turns single source lines into [`Line`] records, interning their text into `pools`.
pub struct Parser<'a> {
    pools: &'a mut StringPools,
    max_line_len: usize,
}

impl<'a> Parser<'a> {
    pub fn new(pools: &'a mut StringPools, max_line_len: usize) -> Self {
        Self {
            pools,
            max_line_len,
        }
    }

    /// Parse one line. Both the input and its canonical rendering must fit the line length limit,
    /// so anything accepted here can be rendered and parsed again.
    #[tracing::instrument(level = "trace", skip(self))]
    pub fn parse_line(&mut self, text: &str) -> Result<Line, ParseError> {
        let text = text.trim();
        if text.chars().count() > self.max_line_len {
            return Err(ParseError::LineTooLong(text.chars().count()));
        }

        let line = self.parse_record(text)?;
        let len = line.render(self.pools)?.chars().count();
        if len > self.max_line_len {
            return Err(ParseError::LineTooLong(len));
        }
        Ok(line)
    }

    fn parse_record(&mut self, text: &str) -> Result<Line, ParseError> {
        let mut lexer = Lexer::new(text);
        let Some(first) = lexer.peek() else {
            return Ok(Line::new(Node::Empty));
        };

        if first == ';' {
            lexer.read_char();
            let comment = self.pools.add(lexer.rest().trim_end())?;
            return Ok(Line::new(Node::Comment(comment)));
        }
        if first == '.' {
            lexer.read_char();
            return self.parse_label(&mut lexer);
        }
        if let Some(kind) = TextKind::from_delimiter(first) {
            lexer.read_char();
            return self.parse_text(&mut lexer, kind);
        }
        if let Some(kind) = IncludeKind::from_prefix(first) {
            lexer.read_char();
            return self.parse_include(&mut lexer, kind);
        }

        self.parse_instruction(&mut lexer)
    }

    fn intern_label(&mut self, name: &str) -> Result<StrId, ParseError> {
        if !is_label_name(name) {
            return Err(ParseError::BadLabel(name.to_string()));
        }
        Ok(self.pools.add(name)?)
    }

    /// Intern an expression after checking that it parses.
    fn intern_expression(&mut self, text: &str) -> Result<StrId, ParseError> {
        expression::validate(text).map_err(|_| ParseError::BadExpression(text.to_string()))?;
        Ok(self.pools.add(text)?)
    }

    /// A trailing `;comment`, if any. Only short comments fit on a line with other content.
    fn parse_comment(&mut self, lexer: &mut Lexer) -> Result<Option<StrId>, ParseError> {
        lexer.skip_whitespace();
        if lexer.at_end() {
            return Ok(None);
        }
        if !lexer.eat(';') {
            return Err(ParseError::CommaExpected);
        }
        let comment = lexer.rest().trim();
        if comment.len() >= SHORT_STRING_LEN {
            return Err(ParseError::BadComment(comment.to_string()));
        }
        Ok(Some(self.pools.add_short(comment)?))
    }

    fn parse_label(&mut self, lexer: &mut Lexer) -> Result<Line, ParseError> {
        let name = lexer.read_identifier();
        let id = self.intern_label(name)?;
        let long = id.is_long();

        let after_name = lexer.position();
        lexer.skip_whitespace();
        if lexer.at_end() {
            return Ok(Line::new(Node::Label(id)));
        }

        if lexer.position() > after_name && lexer.read_identifier() == "equ" {
            let rest = lexer.rest();
            if rest.starts_with(char::is_whitespace) {
                let expr = self.intern_expression(rest.trim())?;
                return Ok(Line::new(Node::Constant { name: id, expr }));
            }
        }
        lexer.reset(after_name);

        if long {
            return Err(ParseError::LongLabelExtra(name.to_string()));
        }
        lexer.skip_whitespace();
        if lexer.peek() != Some(';') {
            return Err(ParseError::BadLabel(lexer.rest().to_string()));
        }
        let comment = self.parse_comment(lexer)?;
        Ok(Line::with_comment(Node::Label(id), comment))
    }

    /// A string runs to its closing delimiter, or to the end of the line when there is none.
    fn parse_text(&mut self, lexer: &mut Lexer, kind: TextKind) -> Result<Line, ParseError> {
        let delimiter = kind.delimiter();
        let text = lexer.read_while(|c| c != delimiter);
        let text = self.pools.add(text)?;
        let comment = if lexer.eat(delimiter) {
            self.parse_comment(lexer)?
        } else {
            None
        };
        Ok(Line::with_comment(Node::Text { kind, text }, comment))
    }

    fn parse_include(&mut self, lexer: &mut Lexer, kind: IncludeKind) -> Result<Line, ParseError> {
        let path = lexer.rest().trim();
        if path.is_empty() || path.contains(char::is_whitespace) {
            return Err(ParseError::BadFilename(path.to_string()));
        }
        let path = self.pools.add(path)?;
        Ok(Line::new(Node::Include { kind, path }))
    }

    fn parse_instruction(&mut self, lexer: &mut Lexer) -> Result<Line, ParseError> {
        let word = lexer.read_while(|c| !c.is_whitespace() && c != ';');
        let mnemonic = Some(word)
            .filter(|w| w.len() <= MAX_MNEMONIC_LEN && w.chars().all(|c| c.is_ascii_lowercase()))
            .and_then(|w| OPCODE_MAPPING.find_mnemonic(w))
            .ok_or_else(|| ParseError::BadMnemonic(word.to_string()))?;

        let mut operands = Vec::new();
        lexer.skip_whitespace();
        if !lexer.at_end() && lexer.peek() != Some(';') {
            loop {
                let operand = self.parse_operand(lexer, mnemonic, operands.is_empty())?;
                operands.push(operand);
                if !lexer.eat(',') {
                    break;
                }
            }
        }

        let comment = self.parse_comment(lexer)?;
        let code = codegen::encode(mnemonic, &operands)?;

        Ok(Line::with_comment(
            Node::Instruction(Instruction::new(mnemonic, operands, code)),
            comment,
        ))
    }

    fn parse_operand(
        &mut self,
        lexer: &mut Lexer,
        mnemonic: Mnemonic,
        first: bool,
    ) -> Result<Operand, ParseError> {
        lexer.skip_whitespace();
        match lexer.peek() {
            Some('(') => {
                lexer.read_char();
                self.parse_indirect(lexer)
            }
            Some('=') => {
                lexer.read_char();
                let text = lexer.read_expression()?;
                Ok(Operand::Expression(self.intern_expression(text)?))
            }
            Some(c) if c.is_ascii_alphabetic() || c == '_' => {
                self.parse_word_operand(lexer, mnemonic, first)
            }
            _ if lexer.at_number() => Ok(Operand::Immediate(lexer.read_number()?)),
            _ => Err(ParseError::UnexpectedInput(lexer.rest().to_string())),
        }
    }

    fn parse_word_operand(
        &mut self,
        lexer: &mut Lexer,
        mnemonic: Mnemonic,
        first: bool,
    ) -> Result<Operand, ParseError> {
        let word = lexer.read_identifier();

        if first && mnemonic.takes_condition() {
            if let Ok(cc) = Condition::from_str(word) {
                let before = lexer.position();
                let followed_by_comma = lexer.eat(',');
                lexer.reset(before);
                if mnemonic == Mnemonic::Ret || followed_by_comma {
                    return Ok(Operand::Condition(cc));
                }
            }
        }

        if let Ok(r) = Reg8::from_str(word) {
            return Ok(Operand::Reg8(r));
        }
        if let Ok(rr) = Reg16::from_str(word) {
            return Ok(Operand::Reg16(rr));
        }
        if let Ok(ix) = IndexReg::from_str(word) {
            return Ok(Operand::Index(ix));
        }
        match word {
            "af" => return Ok(Operand::AF),
            "af'" => return Ok(Operand::ShadowAF),
            "i" => return Ok(Operand::I),
            "r" => return Ok(Operand::R),
            _ => (),
        }

        let label = self.intern_label(word)?;
        // `end-start` is a label difference, `label-1` is not accepted.
        if lexer.peek() == Some('-')
            && matches!(lexer.peek_nth(1), Some(c) if c.is_ascii_alphabetic() || c == '_')
        {
            lexer.read_char();
            let other = lexer.read_identifier();
            let other = self.intern_label(other)?;
            return Ok(Operand::LabelDiff(label, other));
        }
        Ok(Operand::Label(label))
    }

    /// Everything after an opening bracket.
    fn parse_indirect(&mut self, lexer: &mut Lexer) -> Result<Operand, ParseError> {
        lexer.skip_whitespace();
        let operand = match lexer.peek() {
            Some('=') => {
                lexer.read_char();
                let text = lexer.read_expression()?;
                Operand::AddressExpression(self.intern_expression(text)?)
            }
            Some(c) if c.is_ascii_alphabetic() || c == '_' => {
                let word = lexer.read_identifier();
                match word {
                    "bc" => Operand::Indirect(Indirect::BC),
                    "de" => Operand::Indirect(Indirect::DE),
                    "hl" => Operand::Indirect(Indirect::HL),
                    "sp" => Operand::Indirect(Indirect::SP),
                    "c" => Operand::Indirect(Indirect::C),
                    _ => match IndexReg::from_str(word) {
                        Ok(ix) => self.parse_indexed(lexer, ix)?,
                        Err(_) => Operand::AddressLabel(self.intern_label(word)?),
                    },
                }
            }
            _ if lexer.at_number() => Operand::Address(lexer.read_number()?),
            _ => return Err(ParseError::BadRegister(lexer.rest().to_string())),
        };

        if !lexer.eat(')') {
            return Err(ParseError::BadRegister(lexer.rest().to_string()));
        }
        Ok(operand)
    }

    /// `(ix)` or `(ix+d)`. Decimal displacements are signed, hex ones are a raw byte.
    fn parse_indexed(&mut self, lexer: &mut Lexer, ix: IndexReg) -> Result<Operand, ParseError> {
        lexer.skip_whitespace();
        let negative = match lexer.peek() {
            Some('+') => false,
            Some('-') => true,
            _ => return Ok(Operand::Indirect(Indirect::Index(ix))),
        };
        lexer.read_char();
        lexer.skip_whitespace();

        if !matches!(lexer.peek(), Some(c) if c.is_ascii_digit() || c == '$') {
            return Err(ParseError::BadNumber(lexer.rest().to_string()));
        }
        let number = lexer.read_number()?;
        let literal = || {
            let sign = if negative { "-" } else { "+" };
            format!("{}{}", sign, number)
        };

        let displacement = match (number.format, negative) {
            (NumberFormat::Hex, true) => return Err(ParseError::BadNumber(literal())),
            (NumberFormat::Hex, false) if number.value > 0xff => {
                return Err(ParseError::NumberTooBig(literal()))
            }
            (NumberFormat::Hex, false) => number,
            (_, true) if number.value > 128 => return Err(ParseError::NumberTooBig(literal())),
            (_, true) if number.value == 0 => Number::unsigned(0),
            (_, true) => Number::new(-number.value, NumberFormat::Signed),
            (_, false) if number.value > 127 => return Err(ParseError::NumberTooBig(literal())),
            (_, false) => number,
        };

        Ok(Operand::Indexed(ix, Displacement(displacement)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Code;

    use pretty_assertions::assert_eq;

    fn parse(text: &str) -> Result<(Line, StringPools), ParseError> {
        let mut pools = StringPools::default();
        let line = Parser::new(&mut pools, DEFAULT_MAX_LINE_LEN).parse_line(text)?;
        Ok((line, pools))
    }

    fn render(text: &str) -> Result<String, ParseError> {
        let (line, pools) = parse(text)?;
        Ok(line.render(&pools)?)
    }

    fn bytes(text: &str) -> Result<Vec<u8>, ParseError> {
        match parse(text)?.0.node {
            Node::Instruction(ins) => Ok(ins.code.as_bytes().to_vec()),
            node => panic!("not an instruction: {:?}", node),
        }
    }

    #[test]
    fn test_canonical_text() -> Result<(), ParseError> {
        let tests = vec![
            ("", ""),
            ("ld a ,  b", "  ld a, b"),
            ("  ld a,(ix+5)", "  ld a, (ix+5)"),
            ("ld (iy-3),$10", "  ld (iy-3), $10"),
            ("ex af,af'", "  ex af, af'"),
            ("jp nz,loop", "  jp nz, loop"),
            ("jr c,back ;again", "  jr c, back ;again"),
            ("ret c", "  ret c"),
            ("ld hl,end-start", "  ld hl, end-start"),
            ("ld a,=SIZE*2", "  ld a, =SIZE*2"),
            ("ld (=BUF+1),a", "  ld (=BUF+1), a"),
            ("ld de,(ptr)", "  ld de, (ptr)"),
            ("ld bc,'x'", "  ld bc, 'x'"),
            ("ld b,-1", "  ld b, -1"),
            ("db 1,2,3", "  db 1, 2, 3"),
            ("; a comment", "; a comment"),
            (".loop", ".loop"),
            (".loop ; top", ".loop ;top"),
            (".SIZE equ 4*8", ".SIZE equ 4*8"),
            ("#Hello#", "#Hello#"),
            ("'abc", "'abc'"),
            ("-lib", "-lib"),
            ("!font.bin", "!font.bin"),
        ];
        for (input, expected) in tests {
            assert_eq!(render(input)?, expected, "input: {}", input);
        }
        Ok(())
    }

    #[test]
    fn test_idempotent() -> Result<(), ParseError> {
        let inputs = vec![
            "ld a,(ix-128)",
            "ld (iy+$ff),b",
            "bit 7,(hl)",
            "out (c),a",
            "in a,($fe)",
            "jp (ix)",
            "add hl,de ;sum",
            "push $1234",
            "ds 10,$e5",
        ];
        for input in inputs {
            let once = render(input)?;
            assert_eq!(render(&once)?, once, "input: {}", input);
        }
        Ok(())
    }

    #[test]
    fn test_negative_zero() -> Result<(), ParseError> {
        let tests = vec![
            ("ld a,(ix-0)", "ld a,(ix+0)", "  ld a, (ix+0)"),
            ("ld b,-0", "ld b,0", "  ld b, 0"),
            ("ld hl,-0", "ld hl,0", "  ld hl, 0"),
        ];
        for (input, same_as, expected) in tests {
            assert_eq!(parse(input)?.0, parse(same_as)?.0, "input: {}", input);
            assert_eq!(render(input)?, expected, "input: {}", input);
        }
        Ok(())
    }

    #[test]
    fn test_encoding() -> Result<(), ParseError> {
        let tests = vec![
            ("nop", vec![0x00]),
            ("ld a,b", vec![0x78]),
            ("ld a,(ix+5)", vec![0xDD, 0x7E, 0x05]),
            ("ld (iy-1),$10", vec![0xFD, 0x36, 0xFF, 0x10]),
            ("ld hl,$1234", vec![0x21, 0x34, 0x12]),
            ("jp nz,$8000", vec![0xC2, 0x00, 0x80]),
            ("ret c", vec![0xD8]),
            ("ld c,c", vec![0x49]),
            ("out (c),c", vec![0xED, 0x49]),
            ("jp (c)", vec![0xED, 0x98]),
            ("nextreg 7,a", vec![0xED, 0x92, 0x07]),
        ];
        for (input, expected) in tests {
            assert_eq!(bytes(input)?, expected, "input: {}", input);
        }
        Ok(())
    }

    #[test]
    fn test_deferred_operands() -> Result<(), ParseError> {
        let (line, pools) = parse("call Print")?;
        let Node::Instruction(ins) = line.node else {
            panic!("not an instruction");
        };
        let print = pools.find("Print").unwrap();
        assert_eq!(ins.operands, vec![Operand::Label(print)]);
        assert_eq!(ins.code.fixup().map(|f| f.offset), Some(1));
        assert_eq!(ins.size(), 3);
        Ok(())
    }

    #[test]
    fn test_directives() -> Result<(), ParseError> {
        let (line, _) = parse("align 16")?;
        let Node::Instruction(ins) = line.node else {
            panic!("not an instruction");
        };
        assert_eq!(ins.code, Code::Align(4));
        Ok(())
    }

    #[test]
    fn test_errors() {
        let tests = vec![
            ("lx a,b", ParseError::BadMnemonic("lx".into())),
            ("LD a,b", ParseError::BadMnemonic("LD".into())),
            ("ld a b", ParseError::CommaExpected),
            ("ld a,(ix+128)", ParseError::NumberTooBig("+128".into())),
            ("ld a,(ix-$10)", ParseError::BadNumber("-$10".into())),
            ("ld a,70000", ParseError::NumberTooBig("70000".into())),
            ("ld a,=(1", ParseError::BadExpression("(1".into())),
            ("ld a,=1+", ParseError::BadExpression("1+".into())),
            (".1abc", ParseError::BadLabel("1abc".into())),
            (".hl", ParseError::BadLabel("hl".into())),
            (".loop nop", ParseError::BadLabel("nop".into())),
            (".averylonglabel ;x", ParseError::LongLabelExtra("averylonglabel".into())),
            ("nop ;this is too long", ParseError::BadComment("this is too long".into())),
            ("- ", ParseError::BadFilename("".into())),
            (
                "ld a,b ;01234567890123456789012345",
                ParseError::LineTooLong(34),
            ),
            (
                "db $ff,$ff,$ff,$ff ;abcdefghijk",
                ParseError::LineTooLong(36),
            ),
            ("jr $8000", ParseError::CodeGen(CodeGenError::BadLabel(Mnemonic::Jr))),
            (
                "ld a,label",
                ParseError::CodeGen(CodeGenError::BadLabel(Mnemonic::Ld)),
            ),
            (
                "ld (hl),(hl)",
                ParseError::CodeGen(CodeGenError::BadRegister(Mnemonic::Ld)),
            ),
        ];
        for (input, expected) in tests {
            assert_eq!(parse(input).map(|_| ()), Err(expected), "input: {}", input);
        }
    }
}
