// inline.rs — Function inlining
//
// Replaces direct calls with a copy of the callee's body. A callee qualifies
// when it has at most `SMALL_CALLEE` instructions, or at most `SINGLE_SITE_CALLEE`
// and exactly one call site in the program. Functions in a call-graph cycle,
// including self-recursion and cycles through interface dispatch, are never
// inlined.
//
// The callee's parameters and locals become fresh caller locals, its
// registers are renamed, and each `ret` stores into a result slot and jumps
// to the continuation of the split call block.

use std::collections::{BTreeSet, HashMap, HashSet};

use crate::cir::{Block, CirFunction, CirProgram, Inst, InstKind, LocalDecl, Operand, Terminator};
use crate::id::{BlockId, LocalId, Reg};

pub const SMALL_CALLEE: usize = 40;
pub const SINGLE_SITE_CALLEE: usize = 120;
/// Stop inlining into a caller once it grows past this many instructions.
const CALLER_BUDGET: usize = 2000;

pub(super) fn run(program: &mut CirProgram) -> bool {
    let snapshot = program.clone();
    let by_name: HashMap<&str, &CirFunction> = snapshot.functions.iter().map(|f| (f.name.as_str(), f)).collect();
    let graph = call_graph(&snapshot);
    let recursive = recursive_functions(&graph);
    let sites = call_sites(&snapshot);

    let eligible: HashMap<&str, &CirFunction> = by_name
        .iter()
        .filter(|(name, g)| {
            let n = g.inst_count();
            let single = sites.get(**name).copied().unwrap_or(0) == 1;
            !recursive.contains(**name) && (n <= SMALL_CALLEE || (single && n <= SINGLE_SITE_CALLEE))
        })
        .map(|(name, g)| (*name, *g))
        .collect();

    let mut changed = false;
    for f in &mut program.functions {
        let mut inlined = 0usize;
        while f.inst_count() <= CALLER_BUDGET {
            let Some((b, i, callee)) = find_site(f, &eligible) else {
                break;
            };
            inline_at(f, b, i, callee);
            inlined += 1;
            changed = true;
        }
        if inlined > 0 {
            tracing::debug!(function = %f.name, inlined, "inlined call sites");
        }
    }
    changed
}

fn find_site<'s>(
    f: &CirFunction,
    eligible: &HashMap<&str, &'s CirFunction>,
) -> Option<(usize, usize, &'s CirFunction)> {
    for (bi, b) in f.blocks.iter().enumerate() {
        for (ii, inst) in b.insts.iter().enumerate() {
            if let InstKind::Call { func, .. } = &inst.kind {
                if func == &f.name {
                    continue;
                }
                if let Some(g) = eligible.get(func.as_str()) {
                    return Some((bi, ii, *g));
                }
            }
        }
    }
    None
}

/// Direct and dispatch-table callees of every function.
pub(crate) fn call_graph(program: &CirProgram) -> HashMap<String, BTreeSet<String>> {
    let mut graph = HashMap::new();
    for f in &program.functions {
        let mut out = BTreeSet::new();
        for inst in f.blocks.iter().flat_map(|b| &b.insts) {
            match &inst.kind {
                InstKind::Call { func, .. } => {
                    out.insert(func.clone());
                }
                InstKind::CallDyn { interface, slot, .. } => {
                    if let Some(table) = program.dispatch.vtables.get(interface) {
                        for slots in table.values() {
                            if let Some(target) = slots.get(*slot) {
                                out.insert(target.clone());
                            }
                        }
                    }
                }
                _ => {}
            }
        }
        graph.insert(f.name.clone(), out);
    }
    graph
}

/// Functions on a call-graph cycle (Tarjan's strongly connected components).
pub(crate) fn recursive_functions(graph: &HashMap<String, BTreeSet<String>>) -> HashSet<String> {
    struct Tarjan<'g> {
        graph: &'g HashMap<String, BTreeSet<String>>,
        index: HashMap<&'g str, usize>,
        low: HashMap<&'g str, usize>,
        stack: Vec<&'g str>,
        on_stack: HashSet<&'g str>,
        next: usize,
        out: HashSet<String>,
    }

    impl<'g> Tarjan<'g> {
        fn visit(&mut self, v: &'g str) {
            self.index.insert(v, self.next);
            self.low.insert(v, self.next);
            self.next += 1;
            self.stack.push(v);
            self.on_stack.insert(v);
            let graph = self.graph;
            if let Some(succs) = graph.get(v) {
                for w in succs {
                    let w = w.as_str();
                    if !graph.contains_key(w) {
                        continue;
                    }
                    if !self.index.contains_key(w) {
                        self.visit(w);
                        let lw = self.low[w];
                        let lv = self.low[v];
                        self.low.insert(v, lv.min(lw));
                    } else if self.on_stack.contains(w) {
                        let iw = self.index[w];
                        let lv = self.low[v];
                        self.low.insert(v, lv.min(iw));
                    }
                }
            }
            if self.low[v] == self.index[v] {
                let mut component = Vec::new();
                while let Some(w) = self.stack.pop() {
                    self.on_stack.remove(w);
                    component.push(w);
                    if w == v {
                        break;
                    }
                }
                let self_loop = graph.get(v).is_some_and(|s| s.contains(v));
                if component.len() > 1 || self_loop {
                    self.out.extend(component.into_iter().map(str::to_string));
                }
            }
        }
    }

    let mut t = Tarjan {
        graph,
        index: HashMap::new(),
        low: HashMap::new(),
        stack: Vec::new(),
        on_stack: HashSet::new(),
        next: 0,
        out: HashSet::new(),
    };
    let mut names: Vec<&str> = graph.keys().map(String::as_str).collect();
    names.sort_unstable();
    for v in names {
        if !t.index.contains_key(v) {
            t.visit(v);
        }
    }
    t.out
}

fn call_sites(program: &CirProgram) -> HashMap<String, usize> {
    let mut sites = HashMap::new();
    for inst in program
        .functions
        .iter()
        .flat_map(|f| &f.blocks)
        .flat_map(|b| &b.insts)
    {
        if let InstKind::Call { func, .. } = &inst.kind {
            *sites.entry(func.clone()).or_insert(0) += 1;
        }
    }
    sites
}

/// Inline the call at `f.blocks[b].insts[i]`.
fn inline_at(f: &mut CirFunction, b: usize, i: usize, callee: &CirFunction) {
    let tail = f.blocks[b].insts.split_off(i + 1);
    let Some(call) = f.blocks[b].insts.pop() else {
        return;
    };
    let InstKind::Call { args, .. } = call.kind else {
        return;
    };

    let local_base = f.locals.len() as u32;
    for l in &callee.locals {
        f.locals.push(LocalDecl {
            name: format!("{}.{}", callee.name, l.name),
            ty: l.ty.clone(),
        });
    }
    let result = call
        .dst
        .map(|_| f.add_local(format!("{}.ret", callee.name), callee.returns.clone()));

    // Continuation holds the rest of the split block.
    let old_term = std::mem::replace(&mut f.blocks[b].term, Terminator::Unreachable);
    let cont = BlockId(f.blocks.len() as u32);
    let mut cont_insts = Vec::with_capacity(tail.len() + 1);
    if let (Some(dst), Some(slot)) = (call.dst, result) {
        cont_insts.push(Inst {
            dst: Some(dst),
            kind: InstKind::Load(slot),
        });
    }
    cont_insts.extend(tail);
    f.blocks.push(Block {
        insts: cont_insts,
        term: old_term,
    });

    let block_base = f.blocks.len() as u32;
    let mut regs: HashMap<Reg, Reg> = HashMap::new();
    let mut rename = |r: Reg, f: &mut CirFunction| *regs.entry(r).or_insert_with(|| f.fresh_reg());
    let relocal = |l: LocalId| LocalId(l.0 + local_base);

    let mut copies = Vec::with_capacity(callee.blocks.len());
    for block in &callee.blocks {
        let mut insts = Vec::with_capacity(block.insts.len() + 1);
        for inst in &block.insts {
            let mut kind = inst.kind.clone();
            match &mut kind {
                InstKind::Load(l) => *l = relocal(*l),
                InstKind::Store { local, .. } => *local = relocal(*local),
                _ => {}
            }
            for op in kind.operands_mut() {
                if let Operand::Reg(r) = op {
                    *r = rename(*r, f);
                }
            }
            let dst = inst.dst.map(|r| rename(r, f));
            insts.push(Inst { dst, kind });
        }
        let term = match &block.term {
            Terminator::Return(v) => {
                let mut v = v.clone();
                if let Operand::Reg(r) = &mut v {
                    *r = rename(*r, f);
                }
                if let Some(slot) = result {
                    insts.push(Inst {
                        dst: None,
                        kind: InstKind::Store { local: slot, value: v },
                    });
                }
                Terminator::Jump(cont)
            }
            other => {
                let mut t = other.clone();
                t.retarget(|x| BlockId(x.0 + block_base));
                for op in t.operands_mut() {
                    if let Operand::Reg(r) = op {
                        *r = rename(*r, f);
                    }
                }
                t
            }
        };
        copies.push(Block { insts, term });
    }
    f.blocks.extend(copies);

    for (j, arg) in args.into_iter().enumerate() {
        f.blocks[b].insts.push(Inst {
            dst: None,
            kind: InstKind::Store {
                local: LocalId(local_base + j as u32),
                value: arg,
            },
        });
    }
    f.blocks[b].term = Terminator::Jump(BlockId(block_base));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph(edges: &[(&str, &[&str])]) -> HashMap<String, BTreeSet<String>> {
        edges
            .iter()
            .map(|(f, cs)| (f.to_string(), cs.iter().map(|c| c.to_string()).collect()))
            .collect()
    }

    #[test]
    fn cycles_are_recursive() {
        let g = graph(&[
            ("main", &["even", "leaf"]),
            ("even", &["odd"]),
            ("odd", &["even"]),
            ("fact", &["fact"]),
            ("leaf", &[]),
        ]);
        let r = recursive_functions(&g);
        let mut names: Vec<&str> = r.iter().map(String::as_str).collect();
        names.sort_unstable();
        assert_eq!(names, vec!["even", "fact", "odd"]);
    }
}
