// dce.rs — Dead code elimination
//
// Removes blocks unreachable from the entry, instructions whose results are
// unused and that have no effect, and stores to locals that are never
// loaded. Iterates to a fixed point.

use std::collections::{HashMap, HashSet};

use crate::cfg::Cfg;
use crate::cir::{CirFunction, InstKind};
use crate::id::{BlockId, LocalId};

pub(super) fn run(f: &mut CirFunction) -> bool {
    let mut changed = remove_unreachable(f);
    loop {
        let step = remove_unused(f) | remove_dead_stores(f);
        if !step {
            break;
        }
        changed = true;
    }
    changed
}

/// Drop unreachable blocks and renumber the rest, keeping the entry first.
pub(crate) fn remove_unreachable(f: &mut CirFunction) -> bool {
    let cfg = Cfg::build(f);
    if cfg.reachable.iter().all(|r| *r) {
        return false;
    }
    let mut remap: HashMap<BlockId, BlockId> = HashMap::new();
    let mut kept = Vec::new();
    for (i, block) in std::mem::take(&mut f.blocks).into_iter().enumerate() {
        if cfg.reachable[i] {
            remap.insert(BlockId(i as u32), BlockId(kept.len() as u32));
            kept.push(block);
        }
    }
    for b in &mut kept {
        b.term.retarget(|t| remap.get(&t).copied().unwrap_or(t));
    }
    tracing::trace!(function = %f.name, removed = cfg.reachable.len() - kept.len(), "removed unreachable blocks");
    f.blocks = kept;
    true
}

fn remove_unused(f: &mut CirFunction) -> bool {
    let uses = f.use_counts();
    let mut changed = false;
    for b in &mut f.blocks {
        let before = b.insts.len();
        b.insts.retain(|inst| match inst.dst {
            Some(r) => uses.contains_key(&r) || inst.kind.has_effect(),
            None => true,
        });
        changed |= b.insts.len() != before;
    }
    changed
}

fn remove_dead_stores(f: &mut CirFunction) -> bool {
    let loaded: HashSet<LocalId> = f
        .blocks
        .iter()
        .flat_map(|b| &b.insts)
        .filter_map(|i| match i.kind {
            InstKind::Load(l) => Some(l),
            _ => None,
        })
        .collect();
    let mut changed = false;
    for b in &mut f.blocks {
        let before = b.insts.len();
        b.insts
            .retain(|inst| !matches!(&inst.kind, InstKind::Store { local, .. } if !loaded.contains(local)));
        changed |= b.insts.len() != before;
    }
    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cir::{Block, Inst, Operand, Terminator};
    use crate::id::Reg;
    use crate::types::Type;
    use sirs_runtime::ops::{BinOp, IntTy, OpTy};
    use sirs_runtime::Value;

    #[test]
    fn removes_dead_values_blocks_and_stores() {
        let i32t = OpTy::Int(IntTy::I32);
        let mut f = CirFunction {
            name: "f".into(),
            params: 1,
            locals: vec![],
            returns: Type::Int(IntTy::I32),
            blocks: vec![
                Block {
                    insts: vec![
                        Inst {
                            dst: Some(Reg(0)),
                            kind: InstKind::Load(LocalId(0)),
                        },
                        // unused and pure
                        Inst {
                            dst: Some(Reg(1)),
                            kind: InstKind::Binary {
                                op: BinOp::Add,
                                ty: i32t,
                                lhs: Operand::Reg(Reg(0)),
                                rhs: Operand::Const(Value::Int(1)),
                            },
                        },
                        // unused but may fault
                        Inst {
                            dst: Some(Reg(2)),
                            kind: InstKind::Binary {
                                op: BinOp::Div,
                                ty: i32t,
                                lhs: Operand::Const(Value::Int(1)),
                                rhs: Operand::Reg(Reg(0)),
                            },
                        },
                        Inst {
                            dst: None,
                            kind: InstKind::Store {
                                local: LocalId(1),
                                value: Operand::Reg(Reg(0)),
                            },
                        },
                    ],
                    term: Terminator::Return(Operand::Reg(Reg(0))),
                },
                Block {
                    insts: vec![],
                    term: Terminator::Unreachable,
                },
            ],
            next_reg: 3,
        };
        f.add_local("x", Type::Int(IntTy::I32));
        f.add_local("dead", Type::Int(IntTy::I32));
        assert!(run(&mut f));
        assert_eq!(f.blocks.len(), 1);
        let kinds: Vec<String> = f.blocks[0].insts.iter().map(|i| i.to_string()).collect();
        assert_eq!(kinds, vec!["%0 = load $0", "%2 = div.i32 1, %0"]);
        assert!(!run(&mut f));
    }
}
