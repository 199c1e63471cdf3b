use std::{
    collections::VecDeque,
    fmt, fs,
    io::BufWriter,
    path::{Path, PathBuf},
};

use thiserror::Error;

use crate::{
    assembler::{interner::InternError, Program},
    expression::ExpressionError,
    linker::symbols::{Label, SymbolTable},
    object::ObjectError,
};

/// Loading modules and following their includes.
mod collect;

/// Module order and address assignment.
mod layout;

/// Writes the map file.
mod map;

/// Evaluates constants, patches fixups and writes the image.
mod relocate;

/// Labels and the global symbol table.
pub mod symbols;

pub const DEFAULT_START_ADDRESS: u16 = 0x8000;
pub const DEFAULT_ENTRY: &str = "Main";
pub const DEFAULT_MAX_LABELS: usize = 1280;
pub const DEFAULT_MAX_GLOBALS: usize = 128;
pub const DEFAULT_MAX_FILES: usize = 64;

/// Relative branches reach from 126 bytes back to 129 bytes forward of the instruction start.
pub const BRANCH_MIN: i32 = -126;
pub const BRANCH_MAX: i32 = 129;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkerConfig {
    /// Load address unless a module contains an `org`.
    pub start_address: u16,
    /// Global label whose module goes first and names the image.
    pub entry: String,
    pub max_labels: usize,
    pub max_globals: usize,
    pub max_files: usize,
    /// Directory searched by `+name` includes.
    pub system_dir: PathBuf,
    /// Image path overriding the one derived from the entry module.
    pub output: Option<PathBuf>,
    /// Write a map file even if no module asks for one.
    pub map: bool,
}

impl Default for LinkerConfig {
    fn default() -> Self {
        Self {
            start_address: DEFAULT_START_ADDRESS,
            entry: DEFAULT_ENTRY.to_string(),
            max_labels: DEFAULT_MAX_LABELS,
            max_globals: DEFAULT_MAX_GLOBALS,
            max_files: DEFAULT_MAX_FILES,
            system_dir: PathBuf::from("lib"),
            output: None,
            map: false,
        }
    }
}

/// A module file name and one based line number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    pub file: String,
    pub line: usize,
}

impl Location {
    pub fn new(file: &str, line: usize) -> Self {
        Self {
            file: file.to_string(),
            line,
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file, self.line)
    }
}

fn describe_definitions(at: &Location, first: &Option<Location>) -> String {
    match first {
        Some(first) => format!("defined in {} and {}", first, at),
        None => format!("multiply defined in {}", at),
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum LinkerError {
    #[error("Can't open {0}")]
    Open(String),
    #[error("Can't read {0}")]
    Read(String),
    #[error("Can't write {0}")]
    Write(String),
    #[error("{file}: {source}")]
    Object { file: String, source: ObjectError },
    #[error("Max label limit {0} reached")]
    TooManyLabels(usize),
    #[error("Global limit {0} reached")]
    TooManyGlobals(usize),
    #[error("Max file limit {0} reached")]
    TooManyFiles(usize),
    #[error("{name} {}", describe_definitions(.at, .first))]
    MultipleDefinitions {
        name: String,
        at: Location,
        first: Option<Location>,
    },
    #[error("{at} Unknown: {name}")]
    UnresolvedLabel { at: Location, name: String },
    #[error("No {0} label defined")]
    NoEntryLabel(String),
    #[error("{0} included twice!")]
    DuplicateModule(String),
    #[error("{} line {} label too far", .at.file, .at.line)]
    JumpTooFar { at: Location },
    #[error("{at} Negative difference")]
    NegativeSize { at: Location },
    #[error("{at} {reason} :{value}")]
    SizeTooBig {
        at: Location,
        reason: &'static str,
        value: i32,
    },
    #[error("{0} past end of memory")]
    ProgramTooBig(String),
    #[error("Only one org statement allowed")]
    TooManyOrgs,
    #[error("{at} {source}")]
    Expression {
        at: Location,
        source: ExpressionError,
    },
    #[error(transparent)]
    Intern(#[from] InternError),
}

/// Checked index of a loaded module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModuleId(usize);

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A raw file spliced into the image by a `!name` line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binary {
    /// Index of the including line.
    pub line: usize,
    pub path: PathBuf,
    pub size: u16,
}

/// One object file taking part in a link.
#[derive(Debug)]
pub struct Module {
    pub id: ModuleId,
    pub path: PathBuf,
    /// Name used for ordering and in messages.
    pub fname: String,
    pub program: Program,
    pub labels: Vec<Label>,
    /// Bytes emitted, not counting alignment padding.
    pub size: u16,
    pub binaries: Vec<Binary>,
}

impl Module {
    pub fn location(&self, line: usize) -> Location {
        Location::new(&self.fname, line)
    }

    /// Module-local label by name. Global names are looked up in the symbol table instead.
    pub fn find_local(&self, name: &str) -> Option<&Label> {
        self.labels
            .iter()
            .find(|label| label.name == name && !matches!(label.kind, symbols::LabelKind::Align(_)))
    }

    fn binary(&self, line: usize) -> Option<&Binary> {
        self.binaries.iter().find(|b| b.line == line)
    }
}

/// The linker state, advanced one stage at a time:
///
/// 1. [`Linker::add_program`] / [`Linker::collect`]
/// 2. [`Linker::order`]
/// 3. [`Linker::assign_addresses`]
/// 4. [`Linker::resolve_global_constants`]
/// 5. [`Linker::emit`]
/// 6. [`Linker::write_map`]
#[derive(Debug)]
pub struct Linker {
    config: LinkerConfig,
    modules: Vec<Module>,
    symbols: SymbolTable,
    /// Module files waiting to be loaded, in the order they were named.
    pending: VecDeque<PathBuf>,
    order: Vec<ModuleId>,
    entry: Option<ModuleId>,
    start_address: u16,
    got_org: bool,
    wants_map: bool,
}

impl Linker {
    pub fn new(config: LinkerConfig) -> Self {
        Self {
            symbols: SymbolTable::new(config.max_labels, config.max_globals),
            start_address: config.start_address,
            wants_map: config.map,
            config,
            modules: Vec::new(),
            pending: VecDeque::new(),
            order: Vec::new(),
            entry: None,
            got_org: false,
        }
    }

    pub fn module(&self, id: ModuleId) -> Option<&Module> {
        self.modules.get(id.0)
    }

    fn module_mut(&mut self, id: ModuleId) -> Option<&mut Module> {
        self.modules.get_mut(id.0)
    }

    /// Modules in link order. Empty until [`Linker::order`] has run.
    pub fn ordered(&self) -> impl Iterator<Item = &Module> {
        self.order.iter().filter_map(|id| self.module(*id))
    }

    pub fn start_address(&self) -> u16 {
        self.start_address
    }

    pub fn wants_map(&self) -> bool {
        self.wants_map
    }

    pub fn symbols(&self) -> &SymbolTable {
        &self.symbols
    }

    /// Address of a global label, or value of a global constant, once resolved.
    pub fn global_value(&self, name: &str) -> Option<u16> {
        let global = self.symbols.find_global(name)?;
        let label = self.module(global.module)?.labels.get(global.label)?;
        match label.kind {
            symbols::LabelKind::Address => Some(label.addr),
            symbols::LabelKind::Constant { value, .. } => value.map(|v| v as u16),
            symbols::LabelKind::Align(_) => None,
        }
    }

    /// Image path: the configured output, else the entry module's path without extension.
    pub fn image_path(&self) -> Option<PathBuf> {
        if let Some(output) = &self.config.output {
            return Some(output.clone());
        }
        let entry = self.module(self.entry?)?;
        Some(entry.path.with_extension(""))
    }

    pub fn map_path(&self) -> Option<PathBuf> {
        self.image_path().map(|image| image.with_extension("map"))
    }

    /// Run every stage after collection and return the image bytes.
    pub fn link_to_vec(&mut self) -> Result<Vec<u8>, LinkerError> {
        self.order()?;
        self.assign_addresses()?;
        self.resolve_global_constants()?;
        let mut image = Vec::new();
        self.emit(&mut image)?;
        Ok(image)
    }
}

/// Files written by a successful link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkOutput {
    pub image: PathBuf,
    pub map: Option<PathBuf>,
    pub start_address: u16,
    pub size: usize,
    pub modules: usize,
}

fn remove_file(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!(path = %path.display(), error = %e, "Failed to remove");
        }
    }
}

fn create(path: &Path) -> Result<BufWriter<fs::File>, LinkerError> {
    fs::File::create(path)
        .map(BufWriter::new)
        .map_err(|e| LinkerError::Write(format!("{}: {}", path.display(), e)))
}

/// Link object files and directories of object files into a binary image.
///
/// Partially written output is removed when any stage fails.
#[tracing::instrument(skip(config))]
pub fn link(inputs: &[PathBuf], config: LinkerConfig) -> Result<LinkOutput, LinkerError> {
    let mut linker = Linker::new(config);
    linker.collect(inputs)?;
    linker.order()?;
    linker.assign_addresses()?;
    linker.resolve_global_constants()?;

    let image = linker
        .image_path()
        .ok_or_else(|| LinkerError::NoEntryLabel(linker.config.entry.clone()))?;
    let map = linker.map_path().filter(|_| linker.wants_map());
    remove_file(&image);
    if let Some(map) = &map {
        remove_file(map);
    }

    let result: Result<usize, LinkerError> = (|| {
        let size = linker.emit(&mut create(&image)?)?;
        if let Some(map) = &map {
            linker.write_map(&mut create(map)?)?;
        }
        Ok(size)
    })();

    match result {
        Ok(size) => {
            tracing::info!(image = %image.display(), size, "Linked");
            Ok(LinkOutput {
                image,
                map,
                start_address: linker.start_address(),
                size,
                modules: linker.order.len(),
            })
        }
        Err(e) => {
            remove_file(&image);
            if let Some(map) = &map {
                remove_file(map);
            }
            Err(e)
        }
    }
}
