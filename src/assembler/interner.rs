use std::{collections::HashMap, fmt};

use thiserror::Error;

/// Strings shorter than this go into the short pool.
pub const SHORT_STRING_LEN: usize = 12;
/// Longest string that can be interned at all.
pub const LONG_STRING_LEN: usize = 32;

pub const DEFAULT_SHORT_STRINGS: usize = 128;
pub const DEFAULT_LONG_STRINGS: usize = 32;

#[derive(Error, Debug, PartialEq, Eq, Clone)]
pub enum InternError {
    #[error("Too many short strings")]
    TooManyShortStrings,
    #[error("Too many long strings")]
    TooManyLongStrings,
    #[error("String too long: {0}")]
    StringTooLong(String),
    #[error("Bad string id: {0}")]
    BadStringId(StrId),
}

#[derive(Debug, Hash, Eq, PartialEq, Clone, Copy, PartialOrd, Ord)]
pub enum PoolKind {
    Short,
    Long,
}

/// Reference to an interned string.
#[derive(Debug, Hash, Eq, PartialEq, Clone, Copy, PartialOrd, Ord)]
pub struct StrId {
    pub pool: PoolKind,
    pub index: u8,
}

impl StrId {
    pub fn short(index: u8) -> Self {
        Self {
            pool: PoolKind::Short,
            index,
        }
    }

    pub fn long(index: u8) -> Self {
        Self {
            pool: PoolKind::Long,
            index,
        }
    }

    pub fn is_long(&self) -> bool {
        self.pool == PoolKind::Long
    }
}

impl fmt::Display for StrId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.pool {
            PoolKind::Short => write!(f, "s{}", self.index),
            PoolKind::Long => write!(f, "l{}", self.index),
        }
    }
}

/// A single insertion-ordered, deduplicating string arena.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pool {
    strings: Vec<String>,
    lookup: HashMap<String, u8>,
    capacity: usize,
}

impl Pool {
    pub fn new(capacity: usize) -> Self {
        Self {
            strings: Vec::new(),
            lookup: HashMap::new(),
            capacity: capacity.min(u8::MAX as usize + 1),
        }
    }

    fn find(&self, s: &str) -> Option<u8> {
        self.lookup.get(s).copied()
    }

    fn push(&mut self, s: &str) -> Option<u8> {
        if let Some(ix) = self.find(s) {
            return Some(ix);
        }
        if self.strings.len() >= self.capacity {
            return None;
        }
        let ix = self.strings.len() as u8;
        self.strings.push(s.to_string());
        self.lookup.insert(s.to_string(), ix);
        Some(ix)
    }

    fn get(&self, ix: u8) -> Option<&str> {
        self.strings.get(ix as usize).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.strings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.strings.iter().map(String::as_str)
    }

    pub fn clear(&mut self) {
        self.strings.clear();
        self.lookup.clear();
    }
}

/// The short and long string pools of one module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StringPools {
    short: Pool,
    long: Pool,
}

impl Default for StringPools {
    fn default() -> Self {
        Self::new(DEFAULT_SHORT_STRINGS, DEFAULT_LONG_STRINGS)
    }
}

impl StringPools {
    pub fn new(short_capacity: usize, long_capacity: usize) -> Self {
        Self {
            short: Pool::new(short_capacity),
            long: Pool::new(long_capacity),
        }
    }

    /// Intern `s` in the pool matching its length.
    #[tracing::instrument(level = "trace", skip(self))]
    pub fn add(&mut self, s: &str) -> Result<StrId, InternError> {
        if s.len() < SHORT_STRING_LEN {
            self.add_short(s)
        } else {
            self.add_long(s)
        }
    }

    pub fn add_short(&mut self, s: &str) -> Result<StrId, InternError> {
        if s.len() >= SHORT_STRING_LEN {
            return Err(InternError::StringTooLong(s.to_string()));
        }
        self.short
            .push(s)
            .map(StrId::short)
            .ok_or(InternError::TooManyShortStrings)
    }

    pub fn add_long(&mut self, s: &str) -> Result<StrId, InternError> {
        if s.len() > LONG_STRING_LEN {
            return Err(InternError::StringTooLong(s.to_string()));
        }
        self.long
            .push(s)
            .map(StrId::long)
            .ok_or(InternError::TooManyLongStrings)
    }

    /// Look up an interned string without adding it.
    pub fn find(&self, s: &str) -> Option<StrId> {
        if s.len() < SHORT_STRING_LEN {
            self.short.find(s).map(StrId::short)
        } else {
            self.long.find(s).map(StrId::long)
        }
    }

    pub fn get(&self, id: StrId) -> Result<&str, InternError> {
        let pool = match id.pool {
            PoolKind::Short => &self.short,
            PoolKind::Long => &self.long,
        };
        pool.get(id.index).ok_or(InternError::BadStringId(id))
    }

    pub fn short(&self) -> &Pool {
        &self.short
    }

    pub fn long(&self) -> &Pool {
        &self.long
    }

    pub fn reset(&mut self) {
        self.short.clear();
        self.long.clear();
    }
}
