// stmt.rs — Statement lowering
//
// Structured control flow becomes explicit blocks. Join, exit and latch
// blocks are created only once some edge targets them, so code after a
// `return` or an infinite loop never produces an orphan block.

use sirs_runtime::ops::{BinOp, IntTy, OpTy};
use sirs_runtime::Value;

use super::{FnLower, LoopTargets};
use crate::ast::{Arm, Expr, ExprKind, Literal, Stmt, StmtKind};
use crate::cir::{InstKind, Operand, Terminator};
use crate::id::BlockId;
use crate::typeck::{ArmTest, BindSource};
use crate::types::Type;

fn is_const_true(e: &Expr) -> bool {
    matches!(
        e.kind,
        ExprKind::Lit {
            value: Literal::Bool(true),
            ..
        }
    )
}

impl<'l, 'a> FnLower<'l, 'a> {
    /// Lower a statement list in the current scope. Statements after a
    /// terminator are dropped.
    pub(super) fn block(&mut self, stmts: &[Stmt]) {
        for s in stmts {
            if self.cur.is_none() {
                break;
            }
            self.stmt(s);
        }
    }

    fn scoped_block(&mut self, stmts: &[Stmt]) {
        self.scopes.push();
        self.block(stmts);
        self.scopes.pop();
    }

    /// Jump to a lazily created block, creating it on first use.
    fn jump_lazy(&mut self, slot: &mut Option<BlockId>) {
        if self.cur.is_none() {
            return;
        }
        let target = match *slot {
            Some(b) => b,
            None => {
                let b = self.new_block();
                *slot = Some(b);
                b
            }
        };
        self.jump(target);
    }

    fn stmt(&mut self, s: &Stmt) {
        match &s.kind {
            StmtKind::Let { name, value, .. } => {
                let ty = self
                    .l
                    .typed
                    .binding_types
                    .get(&s.span)
                    .map(|t| self.subst(t))
                    .unwrap_or(Type::Unit);
                let v = self.value(value);
                let local = self.func.add_local(name.clone(), ty);
                self.store(local, v);
                self.scopes.define(name.clone(), local);
            }

            StmtKind::Assign { name, value } => {
                let v = self.value(value);
                if let Some(local) = self.scopes.lookup(name).copied() {
                    self.store(local, v);
                }
            }

            StmtKind::Expr(e) => {
                self.value(e);
            }

            StmtKind::Return(value) => {
                let v = match value {
                    Some(e) => self.value(e),
                    None => Operand::Const(Value::Unit),
                };
                self.terminate(Terminator::Return(v));
            }

            StmtKind::If {
                cond,
                then_body,
                else_body,
            } => {
                let c = self.value(cond);
                let then_bb = self.new_block();
                let mut join = None;
                let else_bb = if else_body.is_empty() {
                    let j = self.new_block();
                    join = Some(j);
                    j
                } else {
                    self.new_block()
                };
                self.terminate(Terminator::Branch {
                    cond: c,
                    then_bb,
                    else_bb,
                });
                self.cur = Some(then_bb);
                self.scoped_block(then_body);
                self.jump_lazy(&mut join);
                if !else_body.is_empty() {
                    self.cur = Some(else_bb);
                    self.scoped_block(else_body);
                    self.jump_lazy(&mut join);
                }
                self.cur = join;
            }

            StmtKind::While { cond, body } => {
                let header = self.new_block();
                self.jump(header);
                self.cur = Some(header);
                // `while true` runs its body straight from the header.
                let mut exit = None;
                if !is_const_true(cond) {
                    let c = self.value(cond);
                    let body_bb = self.new_block();
                    let exit_bb = self.new_block();
                    exit = Some(exit_bb);
                    self.terminate(Terminator::Branch {
                        cond: c,
                        then_bb: body_bb,
                        else_bb: exit_bb,
                    });
                    self.cur = Some(body_bb);
                }
                self.loops.push(LoopTargets {
                    continue_bb: Some(header),
                    exit_bb: exit,
                });
                self.scoped_block(body);
                if self.cur.is_some() {
                    self.jump(header);
                }
                self.cur = self.loops.pop().and_then(|t| t.exit_bb);
            }

            StmtKind::For {
                var,
                start,
                end,
                body,
            } => self.for_loop(s, var, start, end, body),

            StmtKind::Match { scrutinee, arms } => self.match_stmt(scrutinee, arms),

            StmtKind::Observe { dist, params, value } => {
                let params = params.iter().map(|p| self.value(p)).collect();
                let value = self.value(value);
                self.emit_void(InstKind::Observe {
                    dist: dist.clone(),
                    params,
                    value,
                });
            }

            StmtKind::Break => {
                if let Some(mut t) = self.loops.pop() {
                    let mut exit = t.exit_bb;
                    self.jump_lazy(&mut exit);
                    t.exit_bb = exit;
                    self.loops.push(t);
                }
            }

            StmtKind::Continue => {
                if let Some(mut t) = self.loops.pop() {
                    let mut cont = t.continue_bb;
                    self.jump_lazy(&mut cont);
                    t.continue_bb = cont;
                    self.loops.push(t);
                }
            }
        }
    }

    /// `for var in start..end`: `end` is evaluated once, before the first
    /// iteration.
    fn for_loop(&mut self, s: &Stmt, var: &str, start: &Expr, end: &Expr, body: &[Stmt]) {
        let ty = self
            .l
            .typed
            .binding_types
            .get(&s.span)
            .map(|t| self.subst(t))
            .unwrap_or(crate::types::I64);
        let op_ty = ty.op_ty();
        let lo = self.value(start);
        let hi = self.value(end);
        let counter = self.func.add_local(var.to_string(), ty.clone());
        let limit = self.func.add_local(format!("{var}.end"), ty);
        self.store(counter, lo);
        self.store(limit, hi);

        let header = self.new_block();
        self.jump(header);
        self.cur = Some(header);
        let i = self.emit_op(InstKind::Load(counter));
        let n = self.emit_op(InstKind::Load(limit));
        let c = self.emit_op(InstKind::Binary {
            op: BinOp::Lt,
            ty: op_ty,
            lhs: i,
            rhs: n,
        });
        let body_bb = self.new_block();
        let exit_bb = self.new_block();
        self.terminate(Terminator::Branch {
            cond: c,
            then_bb: body_bb,
            else_bb: exit_bb,
        });

        self.cur = Some(body_bb);
        self.loops.push(LoopTargets {
            continue_bb: None,
            exit_bb: Some(exit_bb),
        });
        self.scopes.push();
        self.scopes.define(var.to_string(), counter);
        self.block(body);
        self.scopes.pop();
        let mut latch = self.loops.pop().and_then(|t| t.continue_bb);
        self.jump_lazy(&mut latch);
        if let Some(latch) = latch {
            self.cur = Some(latch);
            let i = self.emit_op(InstKind::Load(counter));
            let next = self.emit_op(InstKind::Binary {
                op: BinOp::Add,
                ty: op_ty,
                lhs: i,
                rhs: Operand::Const(Value::Int(1)),
            });
            self.store(counter, next);
            self.jump(header);
        }
        self.cur = Some(exit_bb);
    }

    /// Arms are tested in order; the checker guarantees exhaustiveness, so
    /// the last reachable arm needs no test.
    fn match_stmt(&mut self, scrutinee: &Expr, arms: &[Arm]) {
        let scrut_ty = self.ty(scrutinee.id);
        let v = self.value(scrutinee);
        let live: Vec<(&Arm, ArmTest, Vec<crate::typeck::PatternBinding>)> = arms
            .iter()
            .filter_map(|arm| {
                let info = self.l.typed.arms.get(&arm.span)?;
                info.reachable
                    .then(|| (arm, info.test.clone(), info.bindings.clone()))
            })
            .collect();
        let needs_tag = live
            .iter()
            .take(live.len().saturating_sub(1))
            .any(|(_, t, _)| matches!(t, ArmTest::Tag(_)));
        let tag = needs_tag.then(|| self.emit_op(InstKind::Tag(v.clone())));

        let mut join = None;
        for (i, (arm, test, bindings)) in live.iter().enumerate() {
            if self.cur.is_none() {
                break;
            }
            let last = i + 1 == live.len();
            let cond = match (test, last) {
                (_, true) | (ArmTest::Always, _) => None,
                (ArmTest::Tag(t), false) => Some(self.emit_op(InstKind::Binary {
                    op: BinOp::Eq,
                    ty: OpTy::Int(IntTy::U32),
                    lhs: tag.clone().unwrap_or(Operand::Const(Value::Int(0))),
                    rhs: Operand::Const(Value::Int(i64::from(*t))),
                })),
                (ArmTest::Literal(lit), false) => Some(self.emit_op(InstKind::Binary {
                    op: BinOp::Eq,
                    ty: scrut_ty.op_ty(),
                    lhs: v.clone(),
                    rhs: Operand::Const(lit.clone()),
                })),
            };
            let next = match cond {
                Some(c) => {
                    let body_bb = self.new_block();
                    let next_bb = self.new_block();
                    self.terminate(Terminator::Branch {
                        cond: c,
                        then_bb: body_bb,
                        else_bb: next_bb,
                    });
                    self.cur = Some(body_bb);
                    Some(next_bb)
                }
                None => None,
            };

            self.scopes.push();
            for b in bindings {
                let value = match b.source {
                    BindSource::Whole => v.clone(),
                    BindSource::Slot(slot) => self.emit_op(InstKind::Extract {
                        base: v.clone(),
                        index: slot,
                    }),
                };
                let ty = self.subst(&b.ty);
                let local = self.func.add_local(b.name.clone(), ty);
                self.store(local, value);
                self.scopes.define(b.name.clone(), local);
            }
            self.block(&arm.body);
            self.scopes.pop();
            self.jump_lazy(&mut join);

            match next {
                Some(n) => self.cur = Some(n),
                // An unconditional arm ends the chain.
                None => break,
            }
        }
        // Falling past every test cannot happen for an exhaustive match.
        if self.cur.is_some() {
            self.terminate(Terminator::Unreachable);
        }
        self.cur = join;
    }
}
