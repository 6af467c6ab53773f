// scope.rs — Lexical scope stack
//
// A stack of frames mapping identifiers to entries. Inner frames shadow
// outer ones; a frame lives for the AST subtree being processed. The type
// checker stores `Binding`s; lowering stores local slots.

use std::collections::HashMap;

use crate::types::Type;

/// Where a binding was introduced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    Param,
    Let,
    LoopVar,
    Pattern,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Binding {
    pub ty: Type,
    pub mutable: bool,
    pub origin: Origin,
}

#[derive(Debug, Clone)]
pub struct Scopes<T> {
    frames: Vec<HashMap<String, T>>,
}

impl<T> Default for Scopes<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Scopes<T> {
    /// A stack with one (function-level) frame.
    pub fn new() -> Self {
        Scopes {
            frames: vec![HashMap::new()],
        }
    }

    pub fn push(&mut self) {
        self.frames.push(HashMap::new());
    }

    pub fn pop(&mut self) {
        debug_assert!(self.frames.len() > 1, "popped the function frame");
        self.frames.pop();
    }

    /// Bind `name` in the innermost frame, shadowing any outer binding.
    pub fn define(&mut self, name: impl Into<String>, entry: T) {
        if let Some(frame) = self.frames.last_mut() {
            frame.insert(name.into(), entry);
        }
    }

    pub fn lookup(&self, name: &str) -> Option<&T> {
        self.frames.iter().rev().find_map(|f| f.get(name))
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inner_frames_shadow_outer() {
        let mut s: Scopes<u32> = Scopes::new();
        s.define("x", 1);
        s.push();
        s.define("x", 2);
        assert_eq!(s.lookup("x"), Some(&2));
        s.pop();
        assert_eq!(s.lookup("x"), Some(&1));
        assert_eq!(s.lookup("y"), None);
    }

    #[test]
    fn bindings_carry_origin() {
        let mut s = Scopes::new();
        s.define(
            "i",
            Binding {
                ty: crate::types::I64,
                mutable: false,
                origin: Origin::LoopVar,
            },
        );
        let b = s.lookup("i").unwrap();
        assert_eq!(b.origin, Origin::LoopVar);
        assert!(!b.mutable);
        assert_eq!(s.depth(), 1);
    }
}
