#![forbid(unsafe_code)]

use std::{fmt::Debug, str::FromStr};

use serde::{Deserialize, Serialize};

pub mod catalog;
pub mod display;
pub mod expr;
pub mod order;
pub mod request;
pub mod rewrite;
pub mod types;


/// One type in a [types::TypeTable].
///
/// Types refer to each other (base types, property targets) by TypeId,
/// never by reference.
#[derive(Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct TypeId(pub u32);

impl TypeId {
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// This forces single-line output even when pretty-printed
impl Debug for TypeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "type@{}", self.0)
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct ParseTypeIdError;

impl FromStr for TypeId {
    type Err = ParseTypeIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let index = s.strip_prefix("type@").ok_or(ParseTypeIdError)?;
        let index = index.parse::<u32>().map_err(|_| ParseTypeIdError)?;
        Ok(TypeId(index))
    }
}

/// A declared property: the type that declares it and its position among
/// that type's own declared properties.
#[derive(Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct PropId(pub TypeId, pub u16);

impl PropId {
    pub fn declaring_type(self) -> TypeId {
        self.0
    }
}

impl Debug for PropId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "p@{}:{}", self.0.0, self.1)
    }
}

/// A lambda parameter in the expression IR.
#[derive(Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct Var(pub u32);

impl Debug for Var {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "${}", self.0)
    }
}

impl std::fmt::Display for Var {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "${}", self.0)
    }
}

impl From<u32> for Var {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

/// Allocates fresh lambda parameters.
#[derive(Default, Debug)]
pub struct VarAllocator {
    next: u32,
}

impl VarAllocator {
    /// Start allocating above every variable already in use
    pub fn starting_at(next: u32) -> Self {
        Self { next }
    }

    pub fn alloc(&mut self) -> Var {
        let var = Var(self.next);
        self.next += 1;
        var
    }
}
