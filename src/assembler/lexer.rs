use crate::{
    assembler::parser::ParseError,
    ast::{Number, NumberFormat},
};

/// A cursor over the text of a single source line.
///
/// The lexer hands out the primitive pieces an operand is made of: identifiers, numbers,
/// punctuation and raw expression text. Deciding what those pieces mean is left to the parser.
#[derive(Debug, Clone)]
pub struct Lexer<'a> {
    input: &'a str,
    position: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self { input, position: 0 }
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn reset(&mut self, position: usize) {
        self.position = position;
    }

    pub fn rest(&self) -> &'a str {
        &self.input[self.position..]
    }

    pub fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    pub fn peek_nth(&self, n: usize) -> Option<char> {
        self.rest().chars().nth(n)
    }

    pub fn at_end(&self) -> bool {
        self.position >= self.input.len()
    }

    pub fn read_char(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.position += ch.len_utf8();
        Some(ch)
    }

    pub fn skip_whitespace(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_whitespace()) {
            self.read_char();
        }
    }

    /// Consume `c` if it is the next non-blank character.
    pub fn eat(&mut self, c: char) -> bool {
        self.skip_whitespace();
        if self.peek() == Some(c) {
            self.read_char();
            true
        } else {
            false
        }
    }

    pub fn read_while(&mut self, pred: impl Fn(char) -> bool) -> &'a str {
        let start = self.position;
        while matches!(self.peek(), Some(c) if pred(c)) {
            self.read_char();
        }
        &self.input[start..self.position]
    }

    /// Read a word made of alphanumerics and underscores. A trailing `'` is kept so that `af'`
    /// comes back as one word.
    pub fn read_identifier(&mut self) -> &'a str {
        let start = self.position;
        self.read_while(|c| c.is_ascii_alphanumeric() || c == '_');
        if self.peek() == Some('\'') && &self.input[start..self.position] == "af" {
            self.read_char();
        }
        &self.input[start..self.position]
    }

    /// Whether the next character starts a numeric or character literal.
    pub fn at_number(&self) -> bool {
        matches!(self.peek(), Some(c) if c.is_ascii_digit() || c == '$' || c == '-' || c == '\'')
    }

    /// Read a decimal, `$hex` or `'c'` literal.
    ///
    /// Only the lexical range of a word is checked here, i.e. `-32768..=65535`.
    pub fn read_number(&mut self) -> Result<Number, ParseError> {
        self.skip_whitespace();
        let start = self.position;

        if self.peek() == Some('\'') {
            self.read_char();
            let ch = self.read_char();
            let close = self.read_char();
            return match (ch, close) {
                (Some(c), Some('\'')) if c != '\'' && c.is_ascii() => {
                    Ok(Number::new(c as i32, NumberFormat::Char))
                }
                _ => Err(ParseError::BadNumber(self.input[start..self.position].into())),
            };
        }

        let negative = self.peek() == Some('-');
        if negative {
            self.read_char();
        }

        let (digits, radix, format) = if self.peek() == Some('$') {
            self.read_char();
            (
                self.read_while(|c| c.is_ascii_hexdigit()),
                16,
                NumberFormat::Hex,
            )
        } else {
            let format = if negative {
                NumberFormat::Signed
            } else {
                NumberFormat::Unsigned
            };
            (self.read_while(|c| c.is_ascii_digit()), 10, format)
        };

        let literal = &self.input[start..self.position];
        // Hex literals are unsigned and a number must not run into a word.
        if digits.is_empty()
            || (negative && radix == 16)
            || matches!(self.peek(), Some(c) if c.is_ascii_alphanumeric() || c == '_')
        {
            return Err(ParseError::BadNumber(literal.into()));
        }

        let value = i64::from_str_radix(digits, radix)
            .map_err(|_| ParseError::NumberTooBig(literal.into()))?;
        let value = if negative { -value } else { value };
        if !(-32768..=0xffff).contains(&value) {
            return Err(ParseError::NumberTooBig(literal.into()));
        }

        // `-0` is spelled back as `0`.
        let format = if value == 0 && format == NumberFormat::Signed {
            NumberFormat::Unsigned
        } else {
            format
        };
        Ok(Number::new(value as i32, format))
    }

    /// Read the text of an inline expression, stopping at `,`, `;`, the end of the line or a `)`
    /// that closes a bracket opened before the expression. Brackets within must balance.
    pub fn read_expression(&mut self) -> Result<&'a str, ParseError> {
        let start = self.position;
        let mut depth = 0usize;
        let mut in_char = false;

        while let Some(c) = self.peek() {
            if in_char {
                in_char = c != '\'';
            } else {
                match c {
                    '\'' => in_char = true,
                    '(' => depth += 1,
                    ')' if depth == 0 => break,
                    ')' => depth -= 1,
                    ',' | ';' => break,
                    _ => (),
                }
            }
            self.read_char();
        }

        let text = self.input[start..self.position].trim_end();
        if depth != 0 || in_char || text.trim().is_empty() {
            return Err(ParseError::BadExpression(self.input[start..self.position].into()));
        }
        Ok(text.trim_start())
    }
}
