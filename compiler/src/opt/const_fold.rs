// const_fold.rs — Constant folding and propagation
//
// Each round folds instructions whose operands are all constants, forwards
// copies, forwards stores to later loads in the same block, replaces loads
// of locals that hold a single dominating constant store, and turns branches
// on constants into jumps. Rounds stop at a fixed point or after
// `CONST_FOLD_MAX_ROUNDS`.
//
// Evaluation goes through `sirs_runtime::ops`, so folded results match
// execution exactly. Operations that would fault are left in place.

use std::collections::HashMap;

use sirs_runtime::ops;
use sirs_runtime::Value;

use crate::cfg::Cfg;
use crate::cir::{CirFunction, InstKind, Operand, Terminator};
use crate::id::{BlockId, LocalId, Reg};

/// Propagation rounds per function per invocation.
pub const CONST_FOLD_MAX_ROUNDS: usize = 16;

pub(super) fn run(f: &mut CirFunction) -> bool {
    let mut changed = false;
    for round in 0..CONST_FOLD_MAX_ROUNDS {
        let mut step = fold_instructions(f);
        step |= forward_in_block(f);
        step |= forward_single_store(f);
        step |= fold_branches(f);
        if !step {
            tracing::trace!(function = %f.name, rounds = round, "constant folding reached a fixed point");
            break;
        }
        changed = true;
    }
    changed
}

/// Value of an instruction whose operands are all constants.
pub(super) fn evaluate(kind: &InstKind) -> Option<Value> {
    let consts: Option<Vec<&Value>> = kind.operands().into_iter().map(Operand::as_const).collect();
    let args = consts?;
    match kind {
        InstKind::Copy(_) => Some(args[0].clone()),
        InstKind::Binary { op, ty, .. } => ops::binary(*op, *ty, args[0], args[1]).ok(),
        InstKind::Unary { op, ty, .. } => ops::unary(*op, *ty, args[0]).ok(),
        InstKind::Cast { from, to, .. } => ops::cast(*from, *to, args[0]).ok(),
        InstKind::Extract { index, .. } => args[0].extract(*index).ok(),
        InstKind::Tag(_) => args[0].tag().ok().map(|t| Value::Int(i64::from(t))),
        InstKind::Index { .. } => {
            let i = args[1].as_int().ok()?;
            args[0].index(i).ok()
        }
        InstKind::Intrinsic { which, ty, .. } if which.is_pure() => {
            let owned: Vec<Value> = args.into_iter().cloned().collect();
            ops::pure_intrinsic(*which, *ty, &owned).ok()
        }
        InstKind::Aggregate { kind, .. } => Some(kind.build(args.into_iter().cloned().collect())),
        InstKind::MakeDyn { concrete, .. } => Some(Value::Dyn {
            concrete: *concrete,
            value: Box::new(args[0].clone()),
        }),
        _ => None,
    }
}

/// Follow `map` until the operand is no longer a mapped register.
fn resolve(map: &HashMap<Reg, Operand>, op: &Operand) -> Operand {
    let mut cur = op.clone();
    for _ in 0..map.len() {
        match &cur {
            Operand::Reg(r) => match map.get(r) {
                Some(next) => cur = next.clone(),
                None => break,
            },
            Operand::Const(_) => break,
        }
    }
    cur
}

fn substitute(f: &mut CirFunction, map: HashMap<Reg, Operand>) -> bool {
    if map.is_empty() {
        return false;
    }
    let resolved: HashMap<Reg, Operand> = map.keys().map(|r| (*r, resolve(&map, &Operand::Reg(*r)))).collect();
    f.replace_uses(&resolved);
    true
}

/// Fold constant instructions into `copy` and propagate copies into uses.
fn fold_instructions(f: &mut CirFunction) -> bool {
    let mut map: HashMap<Reg, Operand> = HashMap::new();
    let mut changed = false;
    for b in &mut f.blocks {
        for inst in &mut b.insts {
            let Some(dst) = inst.dst else {
                continue;
            };
            if let InstKind::Copy(src) = &inst.kind {
                map.insert(dst, src.clone());
                continue;
            }
            if inst.kind.has_effect() && !matches!(inst.kind, InstKind::Index { .. } | InstKind::Binary { .. }) {
                continue;
            }
            if let Some(v) = evaluate(&inst.kind) {
                inst.kind = InstKind::Copy(Operand::Const(v.clone()));
                map.insert(dst, Operand::Const(v));
                changed = true;
            }
        }
    }
    // Only count substitutions that actually reach a use.
    let uses = f.use_counts();
    map.retain(|r, _| uses.contains_key(r));
    substitute(f, map) || changed
}

/// Loads that follow a store (or an earlier load) of the same local within
/// a block take the known value directly.
fn forward_in_block(f: &mut CirFunction) -> bool {
    let mut map: HashMap<Reg, Operand> = HashMap::new();
    for b in &mut f.blocks {
        let mut known: HashMap<LocalId, Operand> = HashMap::new();
        for inst in &mut b.insts {
            match &inst.kind {
                InstKind::Store { local, value } => {
                    known.insert(*local, value.clone());
                }
                InstKind::Load(local) => {
                    let Some(dst) = inst.dst else {
                        continue;
                    };
                    match known.get(local) {
                        Some(v) => {
                            map.insert(dst, v.clone());
                            inst.kind = InstKind::Copy(v.clone());
                        }
                        None => {
                            known.insert(*local, Operand::Reg(dst));
                        }
                    }
                }
                _ => {}
            }
        }
    }
    substitute(f, map)
}

/// A non-parameter local with exactly one store, of a constant, is that
/// constant at every load the store dominates.
fn forward_single_store(f: &mut CirFunction) -> bool {
    let mut stores: HashMap<LocalId, Vec<(BlockId, usize, Operand)>> = HashMap::new();
    for (bi, b) in f.blocks.iter().enumerate() {
        for (ii, inst) in b.insts.iter().enumerate() {
            if let InstKind::Store { local, value } = &inst.kind {
                stores
                    .entry(*local)
                    .or_default()
                    .push((BlockId(bi as u32), ii, value.clone()));
            }
        }
    }
    let params = f.params;
    let single: HashMap<LocalId, (BlockId, usize, Value)> = stores
        .into_iter()
        .filter(|(l, _)| l.index() >= params)
        .filter_map(|(l, s)| match s.as_slice() {
            [(b, i, Operand::Const(v))] => Some((l, (*b, *i, v.clone()))),
            _ => None,
        })
        .collect();
    if single.is_empty() {
        return false;
    }
    let cfg = Cfg::build(f);
    let mut changed = false;
    for (bi, b) in f.blocks.iter_mut().enumerate() {
        let here = BlockId(bi as u32);
        for (ii, inst) in b.insts.iter_mut().enumerate() {
            let InstKind::Load(local) = inst.kind else {
                continue;
            };
            let Some((sb, si, v)) = single.get(&local) else {
                continue;
            };
            let dominated = if *sb == here {
                *si < ii
            } else {
                cfg.dominates(*sb, here)
            };
            if dominated {
                inst.kind = InstKind::Copy(Operand::Const(v.clone()));
                changed = true;
            }
        }
    }
    changed
}

fn fold_branches(f: &mut CirFunction) -> bool {
    let mut changed = false;
    for b in &mut f.blocks {
        let target = match &b.term {
            Terminator::Branch {
                cond: Operand::Const(Value::Bool(c)),
                then_bb,
                else_bb,
            } => Some(if *c { *then_bb } else { *else_bb }),
            Terminator::Branch { then_bb, else_bb, .. } if then_bb == else_bb => Some(*then_bb),
            _ => None,
        };
        if let Some(t) = target {
            b.term = Terminator::Jump(t);
            changed = true;
        }
    }
    changed
}
