// cfg.rs — Control-flow graph analysis over CIR functions
//
// Predecessors, reverse postorder, reachability, immediate dominators
// (Cooper, Harvey and Kennedy's iterative algorithm) and natural loops.
// Every query is over a snapshot; rebuild after rewriting a function.
//
// Preconditions: every terminator target is a valid block index.
// Postconditions: `idom` is defined for every reachable block.
// Failure modes: none.
// Side effects: none.

use std::collections::BTreeSet;

use crate::cir::CirFunction;
use crate::id::BlockId;

#[derive(Debug, Clone)]
pub struct Cfg {
    pub succs: Vec<Vec<BlockId>>,
    pub preds: Vec<Vec<BlockId>>,
    /// Reachable blocks in reverse postorder; entry first.
    pub rpo: Vec<BlockId>,
    pub reachable: Vec<bool>,
    idom: Vec<Option<BlockId>>,
}

/// A natural loop: the blocks that reach a back edge's source without
/// passing through the header.
#[derive(Debug, Clone, PartialEq)]
pub struct Loop {
    pub header: BlockId,
    /// Sources of back edges into the header.
    pub latches: Vec<BlockId>,
    pub body: BTreeSet<BlockId>,
}

impl Loop {
    /// Edges leaving the loop, as (inside, outside).
    pub fn exits(&self, cfg: &Cfg) -> Vec<(BlockId, BlockId)> {
        let mut out = Vec::new();
        for &b in &self.body {
            for &s in &cfg.succs[b.index()] {
                if !self.body.contains(&s) {
                    out.push((b, s));
                }
            }
        }
        out
    }

    /// Predecessors of the header from outside the loop.
    pub fn entries(&self, cfg: &Cfg) -> Vec<BlockId> {
        cfg.preds[self.header.index()]
            .iter()
            .copied()
            .filter(|p| !self.body.contains(p))
            .collect()
    }
}

impl Cfg {
    pub fn build(f: &CirFunction) -> Cfg {
        let n = f.blocks.len();
        let succs: Vec<Vec<BlockId>> = f.blocks.iter().map(|b| b.term.successors()).collect();
        let mut preds = vec![Vec::new(); n];
        for (b, ss) in succs.iter().enumerate() {
            for s in ss {
                if !preds[s.index()].contains(&BlockId(b as u32)) {
                    preds[s.index()].push(BlockId(b as u32));
                }
            }
        }

        // Iterative DFS postorder from the entry.
        let mut reachable = vec![false; n];
        let mut post = Vec::with_capacity(n);
        if n > 0 {
            let mut stack: Vec<(BlockId, usize)> = vec![(BlockId(0), 0)];
            reachable[0] = true;
            while let Some((b, i)) = stack.pop() {
                match succs[b.index()].get(i) {
                    Some(&s) => {
                        stack.push((b, i + 1));
                        if !reachable[s.index()] {
                            reachable[s.index()] = true;
                            stack.push((s, 0));
                        }
                    }
                    None => post.push(b),
                }
            }
        }
        post.reverse();
        let rpo = post;

        let mut cfg = Cfg {
            succs,
            preds,
            rpo,
            reachable,
            idom: vec![None; n],
        };
        cfg.compute_dominators();
        cfg
    }

    fn compute_dominators(&mut self) {
        if self.rpo.is_empty() {
            return;
        }
        let mut order = vec![usize::MAX; self.succs.len()];
        for (i, b) in self.rpo.iter().enumerate() {
            order[b.index()] = i;
        }
        let entry = self.rpo[0];
        self.idom[entry.index()] = Some(entry);
        let mut changed = true;
        while changed {
            changed = false;
            for &b in self.rpo.iter().skip(1) {
                let mut new_idom: Option<BlockId> = None;
                for &p in &self.preds[b.index()] {
                    if self.idom[p.index()].is_none() {
                        continue;
                    }
                    new_idom = Some(match new_idom {
                        None => p,
                        Some(cur) => self.intersect(p, cur, &order),
                    });
                }
                if new_idom.is_some() && self.idom[b.index()] != new_idom {
                    self.idom[b.index()] = new_idom;
                    changed = true;
                }
            }
        }
    }

    fn intersect(&self, mut a: BlockId, mut b: BlockId, order: &[usize]) -> BlockId {
        while a != b {
            while order[a.index()] > order[b.index()] {
                a = self.idom[a.index()].unwrap_or(a);
            }
            while order[b.index()] > order[a.index()] {
                b = self.idom[b.index()].unwrap_or(b);
            }
        }
        a
    }

    pub fn idom(&self, b: BlockId) -> Option<BlockId> {
        self.idom.get(b.index()).copied().flatten()
    }

    /// True if every path from the entry to `b` passes through `a`.
    pub fn dominates(&self, a: BlockId, b: BlockId) -> bool {
        if !self.reachable[a.index()] || !self.reachable[b.index()] {
            return false;
        }
        let mut cur = b;
        loop {
            if cur == a {
                return true;
            }
            match self.idom(cur) {
                Some(d) if d != cur => cur = d,
                _ => return false,
            }
        }
    }

    /// Edges `(latch, header)` whose target dominates their source.
    pub fn back_edges(&self) -> Vec<(BlockId, BlockId)> {
        let mut out = Vec::new();
        for &b in &self.rpo {
            for &s in &self.succs[b.index()] {
                if self.dominates(s, b) {
                    out.push((b, s));
                }
            }
        }
        out
    }

    /// False if some edge targets an earlier block in reverse postorder that
    /// does not dominate its source, i.e. a cycle with more than one entry.
    pub fn is_reducible(&self) -> bool {
        let mut order = vec![usize::MAX; self.succs.len()];
        for (i, b) in self.rpo.iter().enumerate() {
            order[b.index()] = i;
        }
        self.rpo.iter().all(|&b| {
            self.succs[b.index()]
                .iter()
                .all(|&s| order[s.index()] > order[b.index()] || self.dominates(s, b))
        })
    }

    /// Natural loops, one per header, innermost first (smallest body).
    pub fn natural_loops(&self) -> Vec<Loop> {
        let mut loops: Vec<Loop> = Vec::new();
        for (latch, header) in self.back_edges() {
            let mut body = BTreeSet::from([header]);
            let mut stack = vec![latch];
            while let Some(b) = stack.pop() {
                if body.insert(b) {
                    stack.extend(self.preds[b.index()].iter().copied().filter(|p| self.reachable[p.index()]));
                }
            }
            match loops.iter_mut().find(|l| l.header == header) {
                Some(l) => {
                    l.latches.push(latch);
                    l.body.extend(body);
                }
                None => loops.push(Loop {
                    header,
                    latches: vec![latch],
                    body,
                }),
            }
        }
        loops.sort_by_key(|l| (l.body.len(), l.header));
        loops
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cir::{Block, Operand, Terminator};
    use crate::types::Type;
    use sirs_runtime::Value;

    fn func(terms: Vec<Terminator>) -> CirFunction {
        CirFunction {
            name: "f".into(),
            params: 0,
            locals: vec![],
            returns: Type::Unit,
            blocks: terms
                .into_iter()
                .map(|term| Block { insts: vec![], term })
                .collect(),
            next_reg: 0,
        }
    }

    fn br(a: u32, b: u32) -> Terminator {
        Terminator::Branch {
            cond: Operand::Const(Value::Bool(true)),
            then_bb: BlockId(a),
            else_bb: BlockId(b),
        }
    }

    fn ret() -> Terminator {
        Terminator::Return(Operand::Const(Value::Unit))
    }

    #[test]
    fn diamond_dominators() {
        // 0 -> {1, 2} -> 3
        let f = func(vec![br(1, 2), Terminator::Jump(BlockId(3)), Terminator::Jump(BlockId(3)), ret()]);
        let cfg = Cfg::build(&f);
        assert_eq!(cfg.idom(BlockId(3)), Some(BlockId(0)));
        assert!(cfg.dominates(BlockId(0), BlockId(3)));
        assert!(!cfg.dominates(BlockId(1), BlockId(3)));
        assert!(cfg.back_edges().is_empty());
        assert_eq!(cfg.rpo[0], BlockId(0));
    }

    #[test]
    fn while_loop_is_natural() {
        // 0 -> 1 (header) -> {2 (body), 3 (exit)}; 2 -> 1
        let f = func(vec![Terminator::Jump(BlockId(1)), br(2, 3), Terminator::Jump(BlockId(1)), ret()]);
        let cfg = Cfg::build(&f);
        assert_eq!(cfg.back_edges(), vec![(BlockId(2), BlockId(1))]);
        let loops = cfg.natural_loops();
        assert_eq!(loops.len(), 1);
        assert_eq!(loops[0].header, BlockId(1));
        assert_eq!(loops[0].body, BTreeSet::from([BlockId(1), BlockId(2)]));
        assert_eq!(loops[0].exits(&cfg), vec![(BlockId(1), BlockId(3))]);
        assert_eq!(loops[0].entries(&cfg), vec![BlockId(0)]);
        assert!(cfg.is_reducible());
    }

    #[test]
    fn unreachable_blocks_are_flagged() {
        let f = func(vec![ret(), ret()]);
        let cfg = Cfg::build(&f);
        assert_eq!(cfg.reachable, vec![true, false]);
        assert!(!cfg.dominates(BlockId(1), BlockId(1)));
    }

    #[test]
    fn irreducible_loop_detected() {
        // 0 -> {1, 2}; 1 -> 2; 2 -> 1: two entries into the 1/2 cycle.
        let f = func(vec![br(1, 2), Terminator::Jump(BlockId(2)), br(1, 3), ret()]);
        let cfg = Cfg::build(&f);
        assert!(!cfg.is_reducible());
        assert!(cfg.natural_loops().is_empty());
    }
}
