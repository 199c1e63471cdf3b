use thiserror::Error;

use crate::{
    assembler::{
        interner::{InternError, StringPools, DEFAULT_LONG_STRINGS, DEFAULT_SHORT_STRINGS},
        parser::{ParseError, Parser, DEFAULT_MAX_LINE_LEN},
    },
    ast::{Instruction, Line, Node},
};

/// Generates opcode bytes and fixups from parsed operands.
pub mod codegen;

/// Short and long string pools shared by the records of one module.
pub mod interner;

/// Splits a single line into identifiers, numbers and punctuation.
///
/// For example, the operands of `ld a,(ix+5)` are read as the identifier `a`, a comma, an
/// opening bracket, the identifier `ix`, a signed number and a closing bracket.
pub mod lexer;

/// Parses lines of text into [`Line`] records.
pub mod parser;

pub const DEFAULT_MAX_LINES: usize = 512;

/// Limits applied while assembling a module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssemblerConfig {
    pub max_line_len: usize,
    pub max_lines: usize,
    pub short_strings: usize,
    pub long_strings: usize,
}

impl Default for AssemblerConfig {
    fn default() -> Self {
        Self {
            max_line_len: DEFAULT_MAX_LINE_LEN,
            max_lines: DEFAULT_MAX_LINES,
            short_strings: DEFAULT_SHORT_STRINGS,
            long_strings: DEFAULT_LONG_STRINGS,
        }
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
#[error("Line {line}: {text}: {source}")]
pub struct AssemblerError {
    /// One based line number.
    pub line: usize,
    pub text: String,
    pub source: ParseError,
}

/// An assembled module: its records and the strings they reference.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Program {
    pub lines: Vec<Line>,
    pub pools: StringPools,
}

impl Program {
    pub fn new(pools: StringPools) -> Self {
        Self {
            lines: Vec::new(),
            pools,
        }
    }

    pub fn instructions(&self) -> impl Iterator<Item = &Instruction> {
        self.lines.iter().filter_map(|line| match &line.node {
            Node::Instruction(ins) => Some(ins),
            _ => None,
        })
    }

    /// Canonical source text, one line per record.
    pub fn render(&self) -> Result<String, InternError> {
        let mut text = String::new();
        for line in &self.lines {
            text.push_str(&line.render(&self.pools)?);
            text.push('\n');
        }
        Ok(text)
    }

    pub fn clear(&mut self) {
        self.lines.clear();
        self.pools.reset();
    }
}

/// Assemble the text of one module.
///
/// Lines are parsed independently. Labels, expressions and includes are left for the linker, so
/// the result is position independent.
#[tracing::instrument(skip(source))]
pub fn assemble(source: &str, config: &AssemblerConfig) -> Result<Program, AssemblerError> {
    let mut program = Program::new(StringPools::new(config.short_strings, config.long_strings));

    for (ix, text) in source.lines().enumerate() {
        let error = |source| AssemblerError {
            line: ix + 1,
            text: text.to_string(),
            source,
        };
        if ix >= config.max_lines {
            return Err(error(ParseError::TooManyLines));
        }
        let line = Parser::new(&mut program.pools, config.max_line_len)
            .parse_line(text)
            .map_err(error)?;
        program.lines.push(line);
    }

    tracing::debug!(
        lines = program.lines.len(),
        short = program.pools.short().len(),
        long = program.pools.long().len(),
        "Assembled module"
    );

    Ok(program)
}
