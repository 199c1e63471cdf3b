use crate::{
    assembler::{interner::InternError, Program},
    ast::{Code, Line, Node, TextKind},
    timing::timing,
};

/// Assembly listing of a single module placed at a base address.
///
/// Bytes that the linker still has to patch are shown as `??`.
#[derive(Debug)]
pub struct Listing<'a> {
    program: &'a Program,
    current_address: usize,
    str: String,
}

impl<'a> Listing<'a> {
    pub fn new(program: &'a Program, start_address: u16) -> Self {
        Self {
            program,
            current_address: start_address as usize,
            str: String::new(),
        }
    }

    pub fn default(program: &'a Program) -> Self {
        Self::new(program, 0x8000)
    }

    /// Bytes emitted by a line and the number of bytes it occupies at `addr`.
    fn line_bytes(&self, addr: usize, line: &Line) -> Result<(Vec<String>, usize), InternError> {
        let hex = |bytes: &[u8]| bytes.iter().map(|b| format!("{:02x}", b)).collect::<Vec<_>>();

        Ok(match &line.node {
            Node::Text { kind, text } => {
                let text = self.program.pools.get(*text)?;
                let mut bytes = Vec::with_capacity(kind.size(text));
                if kind.has_length_prefix() {
                    bytes.push(text.len() as u8);
                }
                bytes.extend_from_slice(text.as_bytes());
                let size = bytes.len();
                (hex(&bytes), size)
            }
            Node::Instruction(ins) => match &ins.code {
                Code::Bytes { bytes, fixup } => {
                    let shown = bytes
                        .iter()
                        .enumerate()
                        .map(|(ix, b)| match fixup {
                            Some(fixup) if fixup.covers(ix) => "??".to_string(),
                            _ => format!("{:02x}", b),
                        })
                        .collect();
                    (shown, bytes.len())
                }
                Code::Fill { count, value } => {
                    let count = *count as usize;
                    (hex(&vec![*value; count.min(4)]), count)
                }
                Code::Align(log2) => {
                    let align = 1usize << log2;
                    let adjust = addr & (align - 1);
                    let padding = if adjust == 0 { 0 } else { align - adjust };
                    (hex(&vec![0; padding.min(4)]), padding)
                }
                Code::Origin(_) | Code::Map => (vec![], 0),
            },
            _ => (vec![], 0),
        })
    }

    /// Generate a listing line from a record and its memory address
    ///
    /// E.g. `0x8000  cd ?? ??         17    call print`
    pub fn generate_line(&self, addr: usize, line: &Line) -> Result<(String, usize), InternError> {
        let (bytes, size) = self.line_bytes(addr, line)?;
        let mut bytes_str = bytes.join(" ");
        if bytes.len() == 4 && size > 4 {
            bytes_str.push_str("..");
        }
        let cycles = match &line.node {
            Node::Instruction(ins) if size > 0 && !matches!(ins.code, Code::Fill { .. }) => {
                timing(ins).to_string()
            }
            _ => String::new(),
        };
        let text = line.render(&self.program.pools)?;

        Ok((
            format!("0x{:04x}  {:<13} {:>5}  {}", addr, bytes_str, cycles, text)
                .trim_end()
                .to_string()
                + "\n",
            size,
        ))
    }

    #[tracing::instrument(skip(self))]
    pub fn generate(&mut self) -> Result<String, InternError> {
        self.str.push_str(" Addr   Hexdump       Cycles  Source\n");
        self.str.push_str("--------------------------------------\n");
        //                 0x8000  cd ?? ??         17    call print

        for line in &self.program.lines {
            if let Node::Instruction(ins) = &line.node {
                if let Code::Origin(addr) = ins.code {
                    self.current_address = addr as usize;
                }
            }
            let (text, size) = self.generate_line(self.current_address, line)?;
            self.str.push_str(&text);
            self.current_address += size;
        }

        Ok(self.str.clone())
    }
}
