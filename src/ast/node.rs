use crate::{
    assembler::interner::{InternError, StrId, StringPools},
    ast::Instruction,
};

/// Delimiter of a string line. `#` and `@` strings are prefixed with a length byte.
#[derive(Debug, Hash, Eq, PartialEq, Clone, Copy)]
pub enum TextKind {
    Single,
    Double,
    Hash,
    At,
}

impl TextKind {
    pub fn from_delimiter(c: char) -> Option<Self> {
        match c {
            '\'' => Some(TextKind::Single),
            '"' => Some(TextKind::Double),
            '#' => Some(TextKind::Hash),
            '@' => Some(TextKind::At),
            _ => None,
        }
    }

    pub fn delimiter(&self) -> char {
        match self {
            TextKind::Single => '\'',
            TextKind::Double => '"',
            TextKind::Hash => '#',
            TextKind::At => '@',
        }
    }

    pub fn has_length_prefix(&self) -> bool {
        matches!(self, TextKind::Hash | TextKind::At)
    }

    /// Bytes a string line occupies in the image.
    pub fn size(&self, text: &str) -> usize {
        text.len() + usize::from(self.has_length_prefix())
    }
}

#[derive(Debug, Hash, Eq, PartialEq, Clone, Copy)]
pub enum IncludeKind {
    /// `-file`, relative to the including module.
    Local,
    /// `+file`, relative to the system library directory.
    System,
    /// `!file`, raw bytes spliced into the image.
    Binary,
}

impl IncludeKind {
    pub fn from_prefix(c: char) -> Option<Self> {
        match c {
            '-' => Some(IncludeKind::Local),
            '+' => Some(IncludeKind::System),
            '!' => Some(IncludeKind::Binary),
            _ => None,
        }
    }

    pub fn prefix(&self) -> char {
        match self {
            IncludeKind::Local => '-',
            IncludeKind::System => '+',
            IncludeKind::Binary => '!',
        }
    }
}

/// What a single source line holds.
#[derive(Debug, Hash, Eq, PartialEq, Clone)]
pub enum Node {
    Empty,
    /// A full-line `;comment`.
    Comment(StrId),
    /// `.name`
    Label(StrId),
    /// `.name equ expression`
    Constant { name: StrId, expr: StrId },
    Text { kind: TextKind, text: StrId },
    Include { kind: IncludeKind, path: StrId },
    Instruction(Instruction),
}

/// One record of a module: a node and an optional trailing comment.
#[derive(Debug, Hash, Eq, PartialEq, Clone)]
pub struct Line {
    pub node: Node,
    pub comment: Option<StrId>,
}

impl Line {
    pub fn new(node: Node) -> Self {
        Self {
            node,
            comment: None,
        }
    }

    pub fn with_comment(node: Node, comment: Option<StrId>) -> Self {
        Self { node, comment }
    }

    /// Canonical text of the line.
    pub fn render(&self, pools: &StringPools) -> Result<String, InternError> {
        let mut s = match &self.node {
            Node::Empty => String::new(),
            Node::Comment(id) => format!(";{}", pools.get(*id)?),
            Node::Label(id) => format!(".{}", pools.get(*id)?),
            Node::Constant { name, expr } => {
                format!(".{} equ {}", pools.get(*name)?, pools.get(*expr)?)
            }
            Node::Text { kind, text } => {
                let delim = kind.delimiter();
                format!("{}{}{}", delim, pools.get(*text)?, delim)
            }
            Node::Include { kind, path } => format!("{}{}", kind.prefix(), pools.get(*path)?),
            Node::Instruction(ins) => format!("  {}", ins.render(pools)?),
        };
        if let Some(comment) = self.comment {
            if !s.is_empty() {
                s.push(' ');
            }
            s.push(';');
            s.push_str(pools.get(comment)?);
        }
        Ok(s)
    }
}
