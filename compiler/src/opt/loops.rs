// loops.rs — Loop-invariant code motion, full unrolling, strength reduction
//
// Only natural loops of a reducible CFG with a unique preheader (a single
// outside predecessor ending in `jump header`) are considered; anything else
// is left untouched. Each pass rewrites one loop at a time and re-analyzes
// the function before looking for the next candidate.

use std::collections::{HashMap, HashSet};

use sirs_runtime::ops::{BinOp, Intrinsic, IntTy, OpTy};
use sirs_runtime::Value;

use super::dce::remove_unreachable;
use crate::cfg::{Cfg, Loop};
use crate::cir::{CirFunction, Inst, InstKind, Operand, Terminator};
use crate::id::{BlockId, LocalId, Reg};

/// Largest trip count that is fully unrolled.
pub const UNROLL_MAX_TRIP: i128 = 8;
/// Largest unrolled body, in instructions.
pub const UNROLL_MAX_SIZE: usize = 256;
/// Loop rewrites per function per invocation.
const MAX_REWRITES: usize = 16;

/// Natural loops that have a preheader.
fn candidates(f: &CirFunction, cfg: &Cfg) -> Vec<(Loop, BlockId)> {
    if !cfg.is_reducible() {
        return Vec::new();
    }
    cfg.natural_loops()
        .into_iter()
        .filter_map(|lp| {
            let entries: Vec<BlockId> = lp
                .entries(cfg)
                .into_iter()
                .filter(|p| cfg.reachable[p.index()])
                .collect();
            match entries.as_slice() {
                [pre] if f.block(*pre).term == Terminator::Jump(lp.header) => Some((lp, *pre)),
                _ => None,
            }
        })
        .collect()
}

/// Apply `rewrite` to one candidate loop at a time until none applies.
fn rewrite_loops(f: &mut CirFunction, rewrite: impl Fn(&mut CirFunction, &Cfg, &Loop, BlockId) -> bool) -> bool {
    let mut changed = false;
    for _ in 0..MAX_REWRITES {
        let cfg = Cfg::build(f);
        let applied = candidates(f, &cfg)
            .iter()
            .any(|(lp, pre)| rewrite(f, &cfg, lp, *pre));
        if !applied {
            break;
        }
        changed = true;
    }
    changed
}

fn loop_stores(f: &CirFunction, lp: &Loop) -> HashSet<LocalId> {
    lp.body
        .iter()
        .flat_map(|b| &f.block(*b).insts)
        .filter_map(|i| match i.kind {
            InstKind::Store { local, .. } => Some(local),
            _ => None,
        })
        .collect()
}

fn push_before_term(f: &mut CirFunction, b: BlockId, insts: impl IntoIterator<Item = Inst>) {
    f.blocks[b.index()].insts.extend(insts);
}

// ── Loop-invariant code motion ──────────────────────────────────────────────

/// Pure, non-faulting instructions that may run speculatively.
fn speculatable(kind: &InstKind, stored: &HashSet<LocalId>) -> bool {
    match kind {
        InstKind::Copy(_)
        | InstKind::Unary { .. }
        | InstKind::Cast { .. }
        | InstKind::Aggregate { .. }
        | InstKind::MakeDyn { .. } => true,
        InstKind::Binary { .. } => !kind.has_effect(),
        InstKind::Load(l) => !stored.contains(l),
        InstKind::Intrinsic { which, .. } => matches!(
            which,
            Intrinsic::Sqrt | Intrinsic::Exp | Intrinsic::Log | Intrinsic::Abs | Intrinsic::Len | Intrinsic::Contains
        ),
        _ => false,
    }
}

pub(super) fn hoist_invariants(f: &mut CirFunction) -> bool {
    rewrite_loops(f, hoist_loop)
}

fn hoist_loop(f: &mut CirFunction, cfg: &Cfg, lp: &Loop, pre: BlockId) -> bool {
    let stored = loop_stores(f, lp);
    let defined: HashSet<Reg> = lp
        .body
        .iter()
        .flat_map(|b| &f.block(*b).insts)
        .filter_map(|i| i.dst)
        .collect();
    let mut hoisted_regs: HashSet<Reg> = HashSet::new();
    let mut hoisted: Vec<Inst> = Vec::new();
    for &b in cfg.rpo.iter().filter(|b| lp.body.contains(b)) {
        let insts = std::mem::take(&mut f.blocks[b.index()].insts);
        let mut keep = Vec::with_capacity(insts.len());
        for inst in insts {
            let invariant = inst.dst.is_some()
                && speculatable(&inst.kind, &stored)
                && inst.kind.operands().iter().all(|op| match op {
                    Operand::Const(_) => true,
                    Operand::Reg(r) => !defined.contains(r) || hoisted_regs.contains(r),
                });
            if invariant {
                hoisted_regs.extend(inst.dst);
                hoisted.push(inst);
            } else {
                keep.push(inst);
            }
        }
        f.blocks[b.index()].insts = keep;
    }
    if hoisted.is_empty() {
        return false;
    }
    tracing::trace!(function = %f.name, header = %lp.header, count = hoisted.len(), "hoisted loop invariants");
    push_before_term(f, pre, hoisted);
    true
}

// ── Full unrolling ──────────────────────────────────────────────────────────

/// A `for`-style loop: header compares a counter against a constant and
/// branches to a single latch block that increments the counter by one.
struct Counted {
    latch: BlockId,
    exit: BlockId,
    trip: i128,
}

fn counted_loop(f: &CirFunction, lp: &Loop, pre: BlockId) -> Option<Counted> {
    let header = lp.header;
    let [latch] = lp.latches.as_slice() else {
        return None;
    };
    let latch = *latch;
    if lp.body.len() != 2 || latch == header || f.block(latch).term != Terminator::Jump(header) {
        return None;
    }
    let h = f.block(header);
    let Terminator::Branch {
        cond: Operand::Reg(c),
        then_bb,
        else_bb: exit,
    } = h.term
    else {
        return None;
    };
    if then_bb != latch || lp.body.contains(&exit) || h.insts.iter().any(|i| i.kind.has_effect()) {
        return None;
    }
    let def_in = |insts: &[Inst], r: Reg| insts.iter().position(|i| i.dst == Some(r));

    let ci = def_in(&h.insts, c)?;
    let InstKind::Binary {
        op: BinOp::Lt,
        ty: OpTy::Int(t),
        lhs: Operand::Reg(i),
        rhs: Operand::Const(Value::Int(n)),
    } = h.insts[ci].kind
    else {
        return None;
    };
    let ii = def_in(&h.insts, i)?;
    let InstKind::Load(counter) = h.insts[ii].kind else {
        return None;
    };

    // The latch's only store to the counter is `counter = load counter + 1`.
    let l = f.block(latch);
    let stores: Vec<usize> = l
        .insts
        .iter()
        .enumerate()
        .filter(|(_, x)| matches!(x.kind, InstKind::Store { local, .. } if local == counter))
        .map(|(p, _)| p)
        .collect();
    let [si] = stores.as_slice() else {
        return None;
    };
    let InstKind::Store {
        value: Operand::Reg(k), ..
    } = l.insts[*si].kind
    else {
        return None;
    };
    let ki = def_in(&l.insts, k)?;
    let InstKind::Binary {
        op: BinOp::Add,
        ty: OpTy::Int(kt),
        lhs: Operand::Reg(j),
        rhs: Operand::Const(Value::Int(1)),
    } = l.insts[ki].kind
    else {
        return None;
    };
    let ji = def_in(&l.insts, j)?;
    if kt != t || !matches!(l.insts[ji].kind, InstKind::Load(x) if x == counter) {
        return None;
    }

    // Start value: the preheader's last store to the counter.
    let start = f.block(pre).insts.iter().rev().find_map(|x| match &x.kind {
        InstKind::Store { local, value } if *local == counter => Some(value.clone()),
        _ => None,
    })?;
    let Operand::Const(Value::Int(s)) = start else {
        return None;
    };
    let trip = (t.to_i128(n) - t.to_i128(s)).max(0);
    let size = h.insts.len() + l.insts.len();
    if trip > UNROLL_MAX_TRIP || trip as usize * size > UNROLL_MAX_SIZE {
        return None;
    }

    // Registers defined in the loop must not be used after it.
    let defined: HashSet<Reg> = h.insts.iter().chain(&l.insts).filter_map(|x| x.dst).collect();
    let escapes = f.blocks.iter().enumerate().any(|(bi, b)| {
        !lp.body.contains(&BlockId(bi as u32))
            && b.insts
                .iter()
                .flat_map(|x| x.kind.operands())
                .chain(b.term.operands())
                .any(|op| matches!(op, Operand::Reg(r) if defined.contains(r)))
    });
    if escapes {
        return None;
    }
    Some(Counted { latch, exit, trip })
}

pub(super) fn unroll(f: &mut CirFunction) -> bool {
    let changed = rewrite_loops(f, |f, _, lp, pre| {
        let Some(plan) = counted_loop(f, lp, pre) else {
            return false;
        };
        let header = f.block(lp.header).insts.clone();
        let latch = f.block(plan.latch).insts.clone();
        let mut body = Vec::with_capacity(plan.trip as usize * (header.len() + latch.len()));
        for _ in 0..plan.trip {
            let mut regs: HashMap<Reg, Reg> = HashMap::new();
            for inst in header.iter().chain(&latch) {
                let mut kind = inst.kind.clone();
                for op in kind.operands_mut() {
                    if let Operand::Reg(r) = op {
                        if let Some(n) = regs.get(r) {
                            *r = *n;
                        }
                    }
                }
                let dst = inst.dst.map(|d| {
                    let n = f.fresh_reg();
                    regs.insert(d, n);
                    n
                });
                body.push(Inst { dst, kind });
            }
        }
        tracing::trace!(function = %f.name, header = %lp.header, trip = plan.trip as u64, "unrolled loop");
        push_before_term(f, pre, body);
        f.blocks[pre.index()].term = Terminator::Jump(plan.exit);
        true
    });
    if changed {
        remove_unreachable(f);
    }
    changed
}

// ── Strength reduction ──────────────────────────────────────────────────────

/// Local `c` whose only store inside the loop is `c = load c + step`.
struct Induction {
    local: LocalId,
    ty: IntTy,
    step: i64,
    store: (BlockId, usize),
}

fn inductions(f: &CirFunction, lp: &Loop) -> Vec<Induction> {
    let mut stores: HashMap<LocalId, Vec<(BlockId, usize)>> = HashMap::new();
    for &b in &lp.body {
        for (p, inst) in f.block(b).insts.iter().enumerate() {
            if let InstKind::Store { local, .. } = inst.kind {
                stores.entry(local).or_default().push((b, p));
            }
        }
    }
    let mut out = Vec::new();
    for (local, sites) in stores {
        let [(b, p)] = sites.as_slice() else {
            continue;
        };
        let insts = &f.block(*b).insts;
        let InstKind::Store {
            value: Operand::Reg(k), ..
        } = insts[*p].kind
        else {
            continue;
        };
        let Some(ki) = insts[..*p].iter().position(|i| i.dst == Some(k)) else {
            continue;
        };
        let InstKind::Binary {
            op: BinOp::Add,
            ty: OpTy::Int(ty),
            lhs: Operand::Reg(j),
            rhs: Operand::Const(Value::Int(step)),
        } = insts[ki].kind
        else {
            continue;
        };
        let loads_self = insts[..ki]
            .iter()
            .any(|i| i.dst == Some(j) && i.kind == InstKind::Load(local));
        if loads_self {
            out.push(Induction {
                local,
                ty,
                step,
                store: (*b, *p),
            });
        }
    }
    out.sort_by_key(|iv| iv.local);
    out
}

/// True if `local` holds a value when control reaches `pre`.
fn initialized_before(f: &CirFunction, cfg: &Cfg, local: LocalId, pre: BlockId) -> bool {
    local.index() < f.params
        || f.blocks.iter().enumerate().any(|(bi, b)| {
            let here = BlockId(bi as u32);
            (here == pre || cfg.dominates(here, pre))
                && b.insts
                    .iter()
                    .any(|i| matches!(i.kind, InstKind::Store { local: l, .. } if l == local))
        })
}

/// `load c` followed in the same block by `mul c, m` with no store to `c`
/// in between. Returns (block, mul index, multiplier).
fn find_multiply(f: &CirFunction, lp: &Loop, iv: &Induction) -> Option<(BlockId, usize, i64)> {
    for &b in &lp.body {
        let insts = &f.block(b).insts;
        let mut current: HashSet<Reg> = HashSet::new();
        for (p, inst) in insts.iter().enumerate() {
            match &inst.kind {
                InstKind::Load(l) if *l == iv.local => current.extend(inst.dst),
                InstKind::Store { local, .. } if *local == iv.local => current.clear(),
                InstKind::Binary {
                    op: BinOp::Mul,
                    ty: OpTy::Int(t),
                    lhs,
                    rhs,
                } if *t == iv.ty => {
                    let m = match (lhs, rhs) {
                        (Operand::Reg(r), Operand::Const(Value::Int(m)))
                        | (Operand::Const(Value::Int(m)), Operand::Reg(r))
                            if current.contains(r) =>
                        {
                            Some(*m)
                        }
                        _ => None,
                    };
                    if let Some(m) = m {
                        return Some((b, p, m));
                    }
                }
                _ => {}
            }
        }
    }
    None
}

pub(super) fn reduce_strength(f: &mut CirFunction) -> bool {
    rewrite_loops(f, |f, cfg, lp, pre| {
        for iv in inductions(f, lp) {
            if !initialized_before(f, cfg, iv.local, pre) {
                continue;
            }
            let Some((mb, mi, m)) = find_multiply(f, lp, &iv) else {
                continue;
            };
            let ty = f.locals[iv.local.index()].ty.clone();
            let name = format!("{}.x{m}", f.locals[iv.local.index()].name);
            let scaled = f.add_local(name, ty);
            let op = OpTy::Int(iv.ty);

            // Uses see `scaled == c * m`.
            f.blocks[mb.index()].insts[mi].kind = InstKind::Load(scaled);

            let (sb, si) = iv.store;
            let (d, e) = (f.fresh_reg(), f.fresh_reg());
            let delta = iv.ty.wrap(m.wrapping_mul(iv.step));
            let update = [
                Inst {
                    dst: Some(d),
                    kind: InstKind::Load(scaled),
                },
                Inst {
                    dst: Some(e),
                    kind: InstKind::Binary {
                        op: BinOp::Add,
                        ty: op,
                        lhs: Operand::Reg(d),
                        rhs: Operand::Const(Value::Int(delta)),
                    },
                },
                Inst {
                    dst: None,
                    kind: InstKind::Store {
                        local: scaled,
                        value: Operand::Reg(e),
                    },
                },
            ];
            let at = si + 1;
            f.blocks[sb.index()].insts.splice(at..at, update);

            let (a, p) = (f.fresh_reg(), f.fresh_reg());
            push_before_term(
                f,
                pre,
                [
                    Inst {
                        dst: Some(a),
                        kind: InstKind::Load(iv.local),
                    },
                    Inst {
                        dst: Some(p),
                        kind: InstKind::Binary {
                            op: BinOp::Mul,
                            ty: op,
                            lhs: Operand::Reg(a),
                            rhs: Operand::Const(Value::Int(m)),
                        },
                    },
                    Inst {
                        dst: None,
                        kind: InstKind::Store {
                            local: scaled,
                            value: Operand::Reg(p),
                        },
                    },
                ],
            );
            tracing::trace!(function = %f.name, header = %lp.header, multiplier = m, "strength-reduced multiply");
            return true;
        }
        false
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cir::Block;
    use crate::types::Type;

    const I64: OpTy = OpTy::Int(IntTy::I64);

    fn inst(dst: u32, kind: InstKind) -> Inst {
        Inst {
            dst: Some(Reg(dst)),
            kind,
        }
    }

    fn store(local: u32, value: Operand) -> Inst {
        Inst {
            dst: None,
            kind: InstKind::Store {
                local: LocalId(local),
                value,
            },
        }
    }

    fn reg(r: u32) -> Operand {
        Operand::Reg(Reg(r))
    }

    fn int(v: i64) -> Operand {
        Operand::Const(Value::Int(v))
    }

    /// s = 0; for i in 0..n { s = s + i * 3 }; return s
    fn counted(n: i64) -> CirFunction {
        let bin = |op, lhs, rhs| InstKind::Binary { op, ty: I64, lhs, rhs };
        let mut f = CirFunction {
            name: "f".into(),
            params: 0,
            locals: vec![],
            returns: Type::Int(IntTy::I64),
            blocks: vec![
                Block {
                    insts: vec![store(0, int(0)), store(1, int(0))],
                    term: Terminator::Jump(BlockId(1)),
                },
                Block {
                    insts: vec![inst(0, InstKind::Load(LocalId(1))), inst(1, bin(BinOp::Lt, reg(0), int(n)))],
                    term: Terminator::Branch {
                        cond: reg(1),
                        then_bb: BlockId(2),
                        else_bb: BlockId(3),
                    },
                },
                Block {
                    insts: vec![
                        inst(2, InstKind::Load(LocalId(0))),
                        inst(3, InstKind::Load(LocalId(1))),
                        inst(4, bin(BinOp::Mul, reg(3), int(3))),
                        inst(5, bin(BinOp::Add, reg(2), reg(4))),
                        store(0, reg(5)),
                        inst(6, InstKind::Load(LocalId(1))),
                        inst(7, bin(BinOp::Add, reg(6), int(1))),
                        store(1, reg(7)),
                    ],
                    term: Terminator::Jump(BlockId(1)),
                },
                Block {
                    insts: vec![inst(8, InstKind::Load(LocalId(0)))],
                    term: Terminator::Return(reg(8)),
                },
            ],
            next_reg: 9,
        };
        f.add_local("s", Type::Int(IntTy::I64));
        f.add_local("i", Type::Int(IntTy::I64));
        f
    }

    #[test]
    fn small_counted_loop_unrolls() {
        let mut f = counted(3);
        assert!(unroll(&mut f));
        let cfg = Cfg::build(&f);
        assert!(cfg.natural_loops().is_empty());
        // three copies of the header and latch
        assert_eq!(f.inst_count(), 2 + 3 * 10 + 1);
        assert!(crate::cir::verify(&crate::cir::CirProgram {
            functions: vec![f],
            dispatch: Default::default(),
        })
        .structurally_sound());
    }

    #[test]
    fn long_loop_is_not_unrolled() {
        let mut f = counted(100);
        assert!(!unroll(&mut f));
    }

    #[test]
    fn invariant_loads_are_hoisted() {
        let mut f = counted(100);
        // `k` is never stored inside the loop, so its load moves out.
        let k = f.add_local("k", Type::Int(IntTy::I64));
        f.blocks[0].insts.push(store(k.0, int(7)));
        f.blocks[2].insts.insert(0, inst(9, InstKind::Load(k)));
        f.next_reg = 10;
        assert!(hoist_invariants(&mut f));
        assert!(f.blocks[0].insts.iter().any(|i| i.dst == Some(Reg(9))));
        assert!(f.blocks[2].insts.iter().all(|i| i.dst != Some(Reg(9))));
    }

    #[test]
    fn induction_multiply_becomes_an_add() {
        let mut f = counted(100);
        assert!(reduce_strength(&mut f));
        let body = &f.blocks[2].insts;
        assert!(!body
            .iter()
            .any(|i| matches!(i.kind, InstKind::Binary { op: BinOp::Mul, .. })));
        assert_eq!(f.locals[2].name, "i.x3");
        assert!(f.blocks[0]
            .insts
            .iter()
            .any(|i| matches!(i.kind, InstKind::Binary { op: BinOp::Mul, .. })));
    }
}
