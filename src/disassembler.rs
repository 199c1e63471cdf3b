use thiserror::Error;

use crate::assembler::{
    interner::InternError,
    parser::{ParseError, Parser},
    AssemblerConfig, Program,
};

pub mod listing;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum DisassemblerError {
    #[error(transparent)]
    Intern(#[from] InternError),
    #[error("Line {line}: {text}: {source}")]
    Parse {
        line: usize,
        text: String,
        source: ParseError,
    },
    #[error("Line {line}: {text}: does not assemble back to the same record")]
    Mismatch { line: usize, text: String },
}

/// Decode every record of a program back to its canonical source text.
#[tracing::instrument(skip(program))]
pub fn disassemble(program: &Program) -> Result<Vec<String>, DisassemblerError> {
    program
        .lines
        .iter()
        .map(|line| line.render(&program.pools).map_err(DisassemblerError::from))
        .collect()
}

/// Decode a program and check that every line assembles back to the record it came from.
///
/// Rendering uses the program's own string pools, so re-parsing into a copy of them yields the
/// same string ids and the records can be compared directly. Lines are re-parsed with the same
/// length limit the source was assembled with.
#[tracing::instrument(skip_all)]
pub fn verify(
    program: &Program,
    config: &AssemblerConfig,
) -> Result<Vec<String>, DisassemblerError> {
    let text = disassemble(program)?;
    let mut pools = program.pools.clone();

    for (ix, (line, rendered)) in program.lines.iter().zip(&text).enumerate() {
        let parsed = Parser::new(&mut pools, config.max_line_len)
            .parse_line(rendered)
            .map_err(|source| DisassemblerError::Parse {
                line: ix + 1,
                text: rendered.clone(),
                source,
            })?;
        if &parsed != line {
            tracing::warn!(line = ix + 1, text = rendered.as_str(), "Round trip mismatch");
            return Err(DisassemblerError::Mismatch {
                line: ix + 1,
                text: rendered.clone(),
            });
        }
    }

    Ok(text)
}
