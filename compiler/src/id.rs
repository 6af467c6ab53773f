// id.rs — Stable identifiers for compiler artifacts
//
// Expression ids are allocated in document order by the parser, so two
// parses of the same document agree on every id. CIR ids are dense indices
// into per-function tables.

use std::fmt;

/// Identifier of an expression node; keys the checker's type side table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ExprId(pub u32);

/// A CIR virtual register. Each register has exactly one definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Reg(pub u32);

/// A CIR basic block, indexing `CirFunction::blocks`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(pub u32);

/// A CIR local slot, indexing `CirFunction::locals`. Parameters occupy the
/// first slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LocalId(pub u32);

impl BlockId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl LocalId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl Reg {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for Reg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%{}", self.0)
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bb{}", self.0)
    }
}

impl fmt::Display for LocalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${}", self.0)
    }
}

/// Allocator for expression ids. Produces monotonically increasing ids in
/// allocation (document) order.
#[derive(Debug, Default)]
pub struct IdAllocator {
    next_expr: u32,
}

impl IdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alloc_expr(&mut self) -> ExprId {
        let id = ExprId(self.next_expr);
        self.next_expr += 1;
        id
    }

    pub fn expr_count(&self) -> u32 {
        self.next_expr
    }
}
