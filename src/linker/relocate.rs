use std::{fs, io::Write};

use super::{
    symbols::{is_global, Label, LabelKind},
    Linker, LinkerError, Location, Module, BRANCH_MAX, BRANCH_MIN,
};
use crate::{
    assembler::codegen::INTERRUPT_MODES,
    ast::{Code, ExprPatch, Fixup, IncludeKind, Node, Target, Width},
    expression::{self, ExpressionError},
};

pub const WRITE_BUFFER_SIZE: usize = 1024;

/// Output staging buffer. It is flushed before it would overflow and before padding is written.
struct WriteBuffer<'a, W: Write> {
    out: &'a mut W,
    buf: Vec<u8>,
    flushed: usize,
}

impl<'a, W: Write> WriteBuffer<'a, W> {
    fn new(out: &'a mut W) -> Self {
        Self {
            out,
            buf: Vec::with_capacity(WRITE_BUFFER_SIZE),
            flushed: 0,
        }
    }

    /// Bytes written so far, buffered or not.
    fn position(&self) -> usize {
        self.flushed + self.buf.len()
    }

    fn flush(&mut self) -> Result<(), LinkerError> {
        if self.buf.is_empty() {
            return Ok(());
        }
        self.out
            .write_all(&self.buf)
            .map_err(|e| LinkerError::Write(e.to_string()))?;
        self.flushed += self.buf.len();
        self.buf.clear();
        Ok(())
    }

    fn write(&mut self, bytes: &[u8]) -> Result<(), LinkerError> {
        if self.buf.len() + bytes.len() > WRITE_BUFFER_SIZE {
            self.flush()?;
        }
        if bytes.len() > WRITE_BUFFER_SIZE {
            self.out
                .write_all(bytes)
                .map_err(|e| LinkerError::Write(e.to_string()))?;
            self.flushed += bytes.len();
        } else {
            self.buf.extend_from_slice(bytes);
        }
        Ok(())
    }

    fn pad(&mut self, value: u8, mut count: usize) -> Result<(), LinkerError> {
        self.flush()?;
        while count > 0 {
            let chunk = count.min(WRITE_BUFFER_SIZE);
            self.buf.resize(chunk, value);
            count -= chunk;
            if count > 0 {
                self.flush()?;
            }
        }
        Ok(())
    }

    fn finish(mut self) -> Result<usize, LinkerError> {
        self.flush()?;
        self.out
            .flush()
            .map_err(|e| LinkerError::Write(e.to_string()))?;
        Ok(self.flushed)
    }
}

impl Linker {
    /// Value of a label seen from an expression. Constants are evaluated on demand one level
    /// deeper than the expression that refers to them.
    fn label_value(
        &self,
        module: &Module,
        label: &Label,
        depth: usize,
    ) -> Result<i16, ExpressionError> {
        match &label.kind {
            LabelKind::Address => Ok(label.addr as i16),
            LabelKind::Constant { value: Some(v), .. } => Ok(*v),
            LabelKind::Constant { expr, value: None } => {
                self.evaluate(module, expr, depth + 1, is_global(&label.name))
            }
            LabelKind::Align(_) => Err(ExpressionError::UnresolvedLabel(label.name.clone())),
        }
    }

    /// Resolve a name used in an expression of `module`. Global constants may only use globals.
    fn resolve_name(
        &self,
        module: &Module,
        name: &str,
        depth: usize,
        in_global: bool,
    ) -> Result<i16, ExpressionError> {
        if is_global(name) {
            let (owner, label) = self
                .find_global_label(name)
                .ok_or_else(|| ExpressionError::UnresolvedLabel(name.to_string()))?;
            return self.label_value(owner, label, depth);
        }
        if in_global {
            return Err(ExpressionError::LocalInGlobalConstant(name.to_string()));
        }
        let label = module
            .find_local(name)
            .ok_or_else(|| ExpressionError::UnresolvedLabel(name.to_string()))?;
        self.label_value(module, label, depth)
    }

    fn evaluate(
        &self,
        module: &Module,
        text: &str,
        depth: usize,
        in_global: bool,
    ) -> Result<i16, ExpressionError> {
        let mut resolver =
            |name: &str, depth: usize| self.resolve_name(module, name, depth, in_global);
        expression::evaluate(text, &mut resolver, depth)
    }

    fn find_global_label(&self, name: &str) -> Option<(&Module, &Label)> {
        let global = self.symbols.find_global(name)?;
        let module = self.module(global.module)?;
        Some((module, module.labels.get(global.label)?))
    }

    /// Evaluate every global constant now that all addresses are known.
    #[tracing::instrument(skip(self))]
    pub fn resolve_global_constants(&mut self) -> Result<(), LinkerError> {
        for id in self.order.clone() {
            let count = self.module(id).map_or(0, |m| m.labels.len());
            for ix in 0..count {
                let Some(module) = self.module(id) else {
                    continue;
                };
                let label = &module.labels[ix];
                let LabelKind::Constant { expr, value: None } = &label.kind else {
                    continue;
                };
                if !is_global(&label.name) {
                    continue;
                }

                let value = self
                    .evaluate(module, expr, 0, true)
                    .map_err(|source| LinkerError::Expression {
                        at: module.location(label.line),
                        source,
                    })?;
                tracing::trace!(name = label.name.as_str(), value, "Global constant");

                if let Some(module) = self.module_mut(id) {
                    if let LabelKind::Constant { value: slot, .. } = &mut module.labels[ix].kind {
                        *slot = Some(value);
                    }
                }
            }
        }
        Ok(())
    }

    /// Address of a label referenced by an instruction: local labels first, then globals.
    fn address_of(&self, module: &Module, name: &str, at: &Location) -> Result<u16, LinkerError> {
        let (owner, label) = module
            .find_local(name)
            .map(|label| (module, label))
            .or_else(|| self.find_global_label(name))
            .ok_or_else(|| LinkerError::UnresolvedLabel {
                at: at.clone(),
                name: name.to_string(),
            })?;
        self.label_value(owner, label, 0)
            .map(|v| v as u16)
            .map_err(|source| LinkerError::Expression {
                at: at.clone(),
                source,
            })
    }

    /// Fill in the bytes covered by a fixup. `pc` is the address of the instruction.
    fn patch(
        &self,
        module: &Module,
        bytes: &[u8],
        fixup: &Fixup,
        pc: u16,
        at: &Location,
    ) -> Result<Vec<u8>, LinkerError> {
        let mut bytes = bytes.to_vec();
        let o = fixup.offset as usize;
        let pools = &module.program.pools;
        let too_big = |reason, value| LinkerError::SizeTooBig {
            at: at.clone(),
            reason,
            value,
        };

        match fixup.target {
            Target::Absolute(id) => {
                let addr = self.address_of(module, pools.get(id)?, at)?;
                bytes[o..o + 2].copy_from_slice(&addr.to_le_bytes());
            }
            Target::Relative(id) => {
                let name = pools.get(id)?;
                let label = module
                    .find_local(name)
                    .filter(|label| label.is_address())
                    .ok_or_else(|| LinkerError::UnresolvedLabel {
                        at: at.clone(),
                        name: name.to_string(),
                    })?;
                let diff = label.addr as i32 - pc as i32;
                if !(BRANCH_MIN..=BRANCH_MAX).contains(&diff) {
                    return Err(LinkerError::JumpTooFar { at: at.clone() });
                }
                bytes[o] = (diff - 2) as i8 as u8;
            }
            Target::Difference {
                minuend,
                subtrahend,
                width,
            } => {
                let a = self.address_of(module, pools.get(minuend)?, at)?;
                let b = self.address_of(module, pools.get(subtrahend)?, at)?;
                if b > a {
                    return Err(LinkerError::NegativeSize { at: at.clone() });
                }
                let diff = a - b;
                if diff > width.max() {
                    return Err(too_big("Too big", diff as i32));
                }
                match width {
                    Width::Byte => bytes[o] = diff as u8,
                    Width::Word => bytes[o..o + 2].copy_from_slice(&diff.to_le_bytes()),
                }
            }
            Target::Expression { expr, patch } => {
                let value = self
                    .evaluate(module, pools.get(expr)?, 0, false)
                    .map_err(|source| LinkerError::Expression {
                        at: at.clone(),
                        source,
                    })?;
                let v = value as i32;
                match patch {
                    ExprPatch::Byte => {
                        if !(-128..=255).contains(&v) {
                            return Err(too_big("immediate too big", v));
                        }
                        bytes[o] = v as u8;
                    }
                    ExprPatch::Word => {
                        bytes[o..o + 2].copy_from_slice(&(value as u16).to_le_bytes())
                    }
                    ExprPatch::WordBigEndian => {
                        bytes[o..o + 2].copy_from_slice(&(value as u16).to_be_bytes())
                    }
                    ExprPatch::Restart => {
                        if !(0..=0x38).contains(&v) || v & 7 != 0 {
                            return Err(too_big("bad argument to rst", v));
                        }
                        bytes[o] |= v as u8;
                    }
                    ExprPatch::BitIndex => {
                        if !(0..=7).contains(&v) {
                            return Err(too_big("bad bit position", v));
                        }
                        bytes[o] |= (v as u8) << 3;
                    }
                    ExprPatch::InterruptMode => {
                        bytes[o] = *INTERRUPT_MODES
                            .get(v as usize)
                            .ok_or_else(|| too_big("bad arg for im", v))?;
                    }
                }
            }
        }

        Ok(bytes)
    }

    /// Replay every module in order, writing the image to `out`. Returns the image size.
    #[tracing::instrument(skip(self, out))]
    pub fn emit(&self, out: &mut impl Write) -> Result<usize, LinkerError> {
        let start = self.start_address as usize;
        let mut buf = WriteBuffer::new(out);
        let mut last = String::new();

        for module in self.ordered() {
            last.clone_from(&module.fname);
            for (ix, line) in module.program.lines.iter().enumerate() {
                let pc = (start + buf.position()) as u16;
                match &line.node {
                    Node::Text { kind, text } => {
                        let text = module.program.pools.get(*text)?;
                        if kind.has_length_prefix() {
                            buf.write(&[text.len() as u8])?;
                        }
                        buf.write(text.as_bytes())?;
                    }
                    Node::Include {
                        kind: IncludeKind::Binary,
                        ..
                    } => {
                        let Some(binary) = module.binary(ix) else {
                            continue;
                        };
                        let data = fs::read(&binary.path)
                            .map_err(|_| LinkerError::Open(binary.path.display().to_string()))?;
                        buf.flush()?;
                        buf.write(&data)?;
                    }
                    Node::Instruction(ins) => match &ins.code {
                        Code::Bytes { bytes, fixup: None } => buf.write(bytes)?,
                        Code::Bytes {
                            bytes,
                            fixup: Some(fixup),
                        } => {
                            let at = module.location(ix + 1);
                            let bytes = self.patch(module, bytes, fixup, pc, &at)?;
                            buf.write(&bytes)?;
                        }
                        Code::Fill { count, value } => buf.pad(*value, *count as usize)?,
                        Code::Align(log2) => {
                            let align = 1usize << log2;
                            let adjust = (start + buf.position()) & (align - 1);
                            if adjust > 0 {
                                buf.pad(0, align - adjust)?;
                            }
                        }
                        Code::Origin(_) | Code::Map => {}
                    },
                    _ => {}
                }
            }
        }

        let size = buf.finish()?;
        if size > 0xffff - start {
            return Err(LinkerError::ProgramTooBig(last));
        }
        tracing::debug!(size, "Emitted image");
        Ok(size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        assembler::{assemble, AssemblerConfig},
        linker::LinkerConfig,
    };

    use pretty_assertions::assert_eq;

    fn link(sources: &[(&str, &str)]) -> Result<Vec<u8>, LinkerError> {
        let mut linker = Linker::new(LinkerConfig::default());
        for (name, source) in sources {
            let program = assemble(source, &AssemblerConfig::default()).unwrap();
            linker.add_program(name, program)?;
        }
        linker.link_to_vec()
    }

    fn error(sources: &[(&str, &str)]) -> String {
        link(sources).unwrap_err().to_string()
    }

    #[test]
    fn test_branch_range() {
        let image = link(&[("main.x", ".Main\n  jr fwd\n  ds 127,0\n.fwd\n")]).unwrap();
        assert_eq!(&image[..2], &[0x18, 0x7f]);

        let image = link(&[("main.x", ".Main\n.back\n  ds 126,0\n  jr back\n")]).unwrap();
        assert_eq!(&image[126..], &[0x18, 0x80]);

        assert_eq!(
            error(&[("main.x", ".Main\n  jr fwd\n  ds 128,0\n.fwd\n")]),
            "main.x line 2 label too far"
        );
        assert_eq!(
            error(&[("main.x", ".Main\n.back\n  ds 127,0\n  jr back\n")]),
            "main.x line 4 label too far"
        );
    }

    #[test]
    fn test_absolute_and_difference() {
        let image = link(&[
            ("main.x", ".Main\n  call Print\n.start\n  db end-start\n  dw start\n.end\n"),
            ("print.x", ".Print\n  ret\n"),
        ])
        .unwrap();
        assert_eq!(image, vec![0xcd, 0x06, 0x80, 0x03, 0x03, 0x80, 0xc9]);

        assert_eq!(
            error(&[("main.x", ".Main\n.start\n  db start-end\n.end\n")]),
            "main.x:3 Negative difference"
        );
        assert_eq!(
            error(&[("main.x", ".Main\n  call Missing\n")]),
            "main.x:2 Unknown: Missing"
        );
    }

    #[test]
    fn test_expressions() {
        let image = link(&[
            (
                "main.x",
                ".Main\n  ld a,=SIZE*2\n  rst =VEC\n  im =2\n  push =$1234\n  bit =SIZE,a\n",
            ),
            ("defs.x", ".SIZE equ 3\n.VEC equ $10\n"),
        ])
        .unwrap();
        assert_eq!(
            image,
            vec![0x3e, 0x06, 0xd7, 0xed, 0x5e, 0xed, 0x8a, 0x12, 0x34, 0xcb, 0x5f]
        );

        let tests = vec![
            (".Main\n  ld a,=300\n", "main.x:2 immediate too big :300"),
            (".Main\n  rst =9\n", "main.x:2 bad argument to rst :9"),
            (".Main\n  im =3\n", "main.x:2 bad arg for im :3"),
            (".Main\n  bit =8,a\n", "main.x:2 bad bit position :8"),
            (".Main\n  ld a,=1/0\n", "main.x:2 Divide by zero"),
        ];
        for (source, expected) in tests {
            assert_eq!(error(&[("main.x", source)]), expected, "source: {}", source);
        }
    }

    #[test]
    fn test_global_constants() {
        let image = link(&[
            ("main.x", ".Main\n  ld a,=TOTAL\n"),
            ("defs.x", ".COUNT equ 4\n.TOTAL equ COUNT*2+1\n"),
        ])
        .unwrap();
        assert_eq!(image, vec![0x3e, 0x09]);

        assert_eq!(
            error(&[("main.x", ".Main\n  ld a,=LOOP\n.LOOP equ LOOP+1\n")]),
            "main.x:3 Recursive definition of LOOP"
        );
        assert_eq!(
            error(&[("main.x", ".Main\n  ld a,=ALL\n.part equ 1\n.ALL equ part\n")]),
            "main.x:4 Global EQU references local EQU: part"
        );
    }

    #[test]
    fn test_align_padding() {
        let image = link(&[("main.x", ".Main\n  nop\n  align 4\n.table\n  db 1\n")]).unwrap();
        assert_eq!(image, vec![0x00, 0x00, 0x00, 0x00, 0x01]);

        let image = link(&[("main.x", ".Main\n  ld hl,0\n  nop\n  align 4\n  db 1\n")]).unwrap();
        assert_eq!(image, vec![0x21, 0x00, 0x00, 0x00, 0x01]);
    }

    #[test]
    fn test_write_buffer() -> Result<(), LinkerError> {
        let mut out = Vec::new();
        let mut buf = WriteBuffer::new(&mut out);
        buf.write(&[1, 2, 3])?;
        assert_eq!(buf.position(), 3);
        assert_eq!(buf.flushed, 0);

        buf.pad(0xaa, WRITE_BUFFER_SIZE + 2)?;
        assert_eq!(buf.position(), WRITE_BUFFER_SIZE + 5);
        assert_eq!(buf.flushed, WRITE_BUFFER_SIZE + 3);

        buf.write(&vec![7; WRITE_BUFFER_SIZE * 2])?;
        assert_eq!(buf.finish()?, WRITE_BUFFER_SIZE * 3 + 5);

        assert_eq!(&out[..4], &[1, 2, 3, 0xaa]);
        assert_eq!(out[WRITE_BUFFER_SIZE + 4], 0xaa);
        assert_eq!(out[WRITE_BUFFER_SIZE + 5], 7);
        assert_eq!(out.len(), WRITE_BUFFER_SIZE * 3 + 5);
        Ok(())
    }
}
