use std::{collections::HashMap, fmt};

use super::{LinkerError, Location, ModuleId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LabelKind {
    /// A code or data address.
    Address,
    /// `.name equ expression`. Global constants get their value once all addresses are known.
    Constant { expr: String, value: Option<i16> },
    /// Position of an `align` directive, holding `log2` of the alignment.
    Align(u8),
}

/// A label defined by a module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Label {
    pub name: String,
    pub kind: LabelKind,
    /// Byte offset from the start of the module, not counting alignment padding.
    pub offset: u16,
    /// Absolute address, set when the module is placed.
    pub addr: u16,
    pub line: usize,
}

impl Label {
    pub fn is_address(&self) -> bool {
        self.kind == LabelKind::Address
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            LabelKind::Address => write!(f, "{} = ${:04x}", self.name, self.addr),
            LabelKind::Constant { expr, value: None } => write!(f, "{} equ {}", self.name, expr),
            LabelKind::Constant {
                expr,
                value: Some(v),
            } => write!(f, "{} equ {} = {}", self.name, expr, v),
            LabelKind::Align(log2) => write!(f, "align {}", 1u16 << log2),
        }
    }
}

/// Names starting with an uppercase letter are visible to every module.
pub fn is_global(name: &str) -> bool {
    name.starts_with(|c: char| c.is_ascii_uppercase())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Global {
    pub module: ModuleId,
    /// Index into the module's labels.
    pub label: usize,
}

/// The global symbol table, plus a count of every label defined so far.
#[derive(Debug)]
pub struct SymbolTable {
    globals: HashMap<String, (Global, Location)>,
    label_count: usize,
    max_labels: usize,
    max_globals: usize,
}

impl SymbolTable {
    pub fn new(max_labels: usize, max_globals: usize) -> Self {
        Self {
            globals: HashMap::new(),
            label_count: 0,
            max_labels,
            max_globals,
        }
    }

    /// Account for one more label of any kind.
    pub fn reserve_label(&mut self) -> Result<(), LinkerError> {
        if self.label_count == self.max_labels {
            return Err(LinkerError::TooManyLabels(self.max_labels));
        }
        self.label_count += 1;
        Ok(())
    }

    /// Claim a global name defined at `at`.
    pub fn define_global(
        &mut self,
        name: &str,
        global: Global,
        at: Location,
    ) -> Result<(), LinkerError> {
        if let Some((_, first)) = self.globals.get(name) {
            return Err(LinkerError::MultipleDefinitions {
                name: name.to_string(),
                at,
                first: Some(first.clone()),
            });
        }
        if self.globals.len() == self.max_globals {
            return Err(LinkerError::TooManyGlobals(self.max_globals));
        }
        self.globals.insert(name.to_string(), (global, at));
        Ok(())
    }

    pub fn find_global(&self, name: &str) -> Option<Global> {
        self.globals.get(name).map(|(global, _)| *global)
    }

    pub fn global_count(&self) -> usize {
        self.globals.len()
    }

    pub fn label_count(&self) -> usize {
        self.label_count
    }
}
