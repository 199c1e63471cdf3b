use std::{
    fs,
    path::{Path, PathBuf},
};

use super::{
    symbols::{is_global, Global, Label, LabelKind},
    Binary, Linker, LinkerError, Location, Module, ModuleId,
};
use crate::{
    assembler::Program,
    ast::{Code, IncludeKind, Node},
    object::{self, ObjectError},
};

/// Whether `path` names an object file, i.e. has an `.x` extension.
pub fn is_object_file(path: &Path) -> bool {
    matches!(path.extension().and_then(|e| e.to_str()), Some("x" | "X"))
}

/// Object files directly inside `dir`, sorted by name. Subdirectories are not searched.
pub fn scan_dir(dir: &Path) -> Result<Vec<PathBuf>, LinkerError> {
    let read_error = |e: std::io::Error| LinkerError::Read(format!("{}: {}", dir.display(), e));

    let mut files = Vec::new();
    for entry in fs::read_dir(dir).map_err(read_error)? {
        let path = entry.map_err(read_error)?.path();
        if path.is_file() && is_object_file(&path) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Labels, size, includes and binaries found while replaying one module.
#[derive(Debug, Default)]
struct Scan {
    labels: Vec<Label>,
    size: u32,
    includes: Vec<PathBuf>,
    binaries: Vec<Binary>,
}

impl Linker {
    /// Load the inputs, which may be object files or directories of them, and every module they
    /// include.
    #[tracing::instrument(skip(self))]
    pub fn collect(&mut self, inputs: &[PathBuf]) -> Result<(), LinkerError> {
        for input in inputs {
            self.queue(input.clone())?;
        }
        while let Some(path) = self.pending.pop_front() {
            self.load(&path)?;
        }

        tracing::debug!(
            modules = self.modules.len(),
            labels = self.symbols.label_count(),
            globals = self.symbols.global_count(),
            "Collected modules"
        );
        Ok(())
    }

    fn queue(&mut self, path: PathBuf) -> Result<(), LinkerError> {
        if path.is_dir() {
            for file in scan_dir(&path)? {
                self.queue(file)?;
            }
            return Ok(());
        }

        if self.modules.len() + self.pending.len() >= self.config.max_files {
            return Err(LinkerError::TooManyFiles(self.config.max_files));
        }
        let path = match path.extension() {
            Some(_) => path,
            None => path.with_extension("x"),
        };
        tracing::trace!(path = %path.display(), "Queued");
        self.pending.push_back(path);
        Ok(())
    }

    fn load(&mut self, path: &Path) -> Result<ModuleId, LinkerError> {
        let program = object::read(path).map_err(|e| match e {
            ObjectError::Open(file) => LinkerError::Open(file),
            source => LinkerError::Object {
                file: path.display().to_string(),
                source,
            },
        })?;
        self.add_program(path, program)
    }

    /// Add one module: record its labels and size and queue the modules it includes.
    #[tracing::instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn add_program(
        &mut self,
        path: impl AsRef<Path>,
        program: Program,
    ) -> Result<ModuleId, LinkerError> {
        if self.modules.len() >= self.config.max_files {
            return Err(LinkerError::TooManyFiles(self.config.max_files));
        }

        let path = path.as_ref().to_path_buf();
        let id = ModuleId(self.modules.len());
        let fname = path.display().to_string();
        let scan = self.scan(id, &path, &fname, &program)?;

        if scan.size > 0xffff {
            return Err(LinkerError::ProgramTooBig(fname));
        }
        self.modules.push(Module {
            id,
            path,
            fname,
            program,
            labels: scan.labels,
            size: scan.size as u16,
            binaries: scan.binaries,
        });
        for include in scan.includes {
            self.queue(include)?;
        }

        Ok(id)
    }

    fn scan(
        &mut self,
        id: ModuleId,
        path: &Path,
        fname: &str,
        program: &Program,
    ) -> Result<Scan, LinkerError> {
        let base = path.parent().unwrap_or_else(|| Path::new(""));
        let mut scan = Scan::default();

        for (ix, line) in program.lines.iter().enumerate() {
            let at = Location::new(fname, ix + 1);
            match &line.node {
                Node::Label(name) => {
                    let name = program.pools.get(*name)?;
                    self.define(id, &mut scan, name, LabelKind::Address, at)?;
                }
                Node::Constant { name, expr } => {
                    let name = program.pools.get(*name)?;
                    let kind = LabelKind::Constant {
                        expr: program.pools.get(*expr)?.to_string(),
                        value: None,
                    };
                    self.define(id, &mut scan, name, kind, at)?;
                }
                Node::Text { kind, text } => {
                    scan.size += kind.size(program.pools.get(*text)?) as u32;
                }
                Node::Include { kind, path } => {
                    let name = program.pools.get(*path)?;
                    match kind {
                        IncludeKind::Local => scan.includes.push(base.join(name)),
                        IncludeKind::System => {
                            scan.includes.push(self.config.system_dir.join(name))
                        }
                        IncludeKind::Binary => {
                            let path = base.join(name);
                            let size = fs::metadata(&path)
                                .map_err(|_| {
                                    LinkerError::Open(format!("or stat {}", path.display()))
                                })?
                                .len();
                            if size > 0xffff || scan.size + size as u32 > 0xffff {
                                return Err(LinkerError::ProgramTooBig(path.display().to_string()));
                            }
                            scan.size += size as u32;
                            scan.binaries.push(Binary {
                                line: ix,
                                path,
                                size: size as u16,
                            });
                        }
                    }
                }
                Node::Instruction(ins) => match ins.code {
                    Code::Origin(addr) => {
                        if self.got_org {
                            return Err(LinkerError::TooManyOrgs);
                        }
                        self.got_org = true;
                        self.start_address = addr;
                    }
                    Code::Map => self.wants_map = true,
                    Code::Align(log2) => {
                        self.symbols.reserve_label()?;
                        scan.labels.push(Label {
                            name: String::new(),
                            kind: LabelKind::Align(log2),
                            offset: scan.size as u16,
                            addr: 0,
                            line: ix + 1,
                        });
                    }
                    _ => scan.size += ins.size() as u32,
                },
                Node::Empty | Node::Comment(_) => {}
            }
        }

        Ok(scan)
    }

    fn define(
        &mut self,
        id: ModuleId,
        scan: &mut Scan,
        name: &str,
        kind: LabelKind,
        at: Location,
    ) -> Result<(), LinkerError> {
        self.symbols.reserve_label()?;

        if is_global(name) {
            let global = Global {
                module: id,
                label: scan.labels.len(),
            };
            self.symbols.define_global(name, global, at.clone())?;
            if name == self.config.entry && kind == LabelKind::Address {
                self.entry = Some(id);
            }
        } else if scan
            .labels
            .iter()
            .any(|l| l.name == name && !matches!(l.kind, LabelKind::Align(_)))
        {
            return Err(LinkerError::MultipleDefinitions {
                name: name.to_string(),
                at,
                first: None,
            });
        }

        scan.labels.push(Label {
            name: name.to_string(),
            kind,
            offset: scan.size.min(0xffff) as u16,
            addr: 0,
            line: at.line,
        });
        Ok(())
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

    fn program(source: &str) -> Program {
        assemble(source, &AssemblerConfig::default()).unwrap()
    }

    #[test]
    fn test_labels_and_size() -> Result<(), LinkerError> {
        let mut linker = Linker::new(LinkerConfig::default());
        let id = linker.add_program(
            "main.x",
            program(".Main\n  ld a,1\n#hi#\n  align 4\n.loop\n  jr loop\n.N equ 3\n  map\n"),
        )?;

        let module = linker.module(id).unwrap();
        assert_eq!(module.size, 7);
        let labels: Vec<_> = module
            .labels
            .iter()
            .map(|l| (l.name.as_str(), l.offset))
            .collect();
        assert_eq!(labels, vec![("Main", 0), ("", 5), ("loop", 5), ("N", 7)]);
        assert_eq!(linker.entry, Some(id));
        assert!(linker.wants_map());
        assert_eq!(linker.symbols().global_count(), 2);
        assert_eq!(linker.symbols().label_count(), 4);
        Ok(())
    }

    #[test]
    fn test_multiple_definitions() {
        let mut linker = Linker::new(LinkerConfig::default());
        assert!(linker.add_program("a.x", program(".Main\n.Print\n")).is_ok());
        assert_eq!(
            linker
                .add_program("b.x", program("  nop\n.Print\n"))
                .map_err(|e| e.to_string()),
            Err("Print defined in a.x:2 and b.x:2".to_string())
        );

        let mut linker = Linker::new(LinkerConfig::default());
        assert_eq!(
            linker
                .add_program("a.x", program(".loop\n  nop\n.loop\n"))
                .map_err(|e| e.to_string()),
            Err("loop multiply defined in a.x:3".to_string())
        );
    }

    #[test]
    fn test_org() {
        let mut linker = Linker::new(LinkerConfig::default());
        assert!(linker.add_program("a.x", program("  org $6000\n")).is_ok());
        assert_eq!(linker.start_address(), 0x6000);
        assert_eq!(
            linker.add_program("b.x", program("  org $7000\n")),
            Err(LinkerError::TooManyOrgs)
        );
    }

    #[test]
    fn test_capacity() {
        let config = LinkerConfig {
            max_labels: 2,
            ..LinkerConfig::default()
        };
        let mut linker = Linker::new(config);
        assert_eq!(
            linker.add_program("a.x", program(".a\n.b\n.c\n")),
            Err(LinkerError::TooManyLabels(2))
        );

        let config = LinkerConfig {
            max_globals: 1,
            ..LinkerConfig::default()
        };
        let mut linker = Linker::new(config);
        assert_eq!(
            linker.add_program("a.x", program(".Main\n.Other\n")),
            Err(LinkerError::TooManyGlobals(1))
        );

        let config = LinkerConfig {
            max_files: 1,
            ..LinkerConfig::default()
        };
        let mut linker = Linker::new(config);
        assert!(linker.add_program("a.x", program(".Main\n")).is_ok());
        assert_eq!(
            linker.add_program("b.x", program(".b\n")),
            Err(LinkerError::TooManyFiles(1))
        );
    }

    #[test]
    fn test_is_object_file() {
        assert!(is_object_file(Path::new("dir/main.x")));
        assert!(is_object_file(Path::new("MAIN.X")));
        assert!(!is_object_file(Path::new("main.t")));
        assert!(!is_object_file(Path::new("main")));
    }
}
