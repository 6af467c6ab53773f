// stmt.rs — Statement checking and control-flow reachability
//
// `block` returns whether control can fall off the end of a statement list.
// That single bit drives missing-return detection (E0207) and unreachable
// statement warnings (W0214).

use super::expr::{is_untyped_literal, kind_type};
use super::Checker;
use crate::ast::{Expr, ExprKind, Literal, Stmt, StmtKind};
use crate::diag::codes;
use crate::scope::{Binding, Origin};
use crate::types::{common_type, Type};

fn is_const_true(e: &Expr) -> bool {
    matches!(
        e.kind,
        ExprKind::Lit {
            value: Literal::Bool(true),
            ..
        }
    )
}

impl<'a> Checker<'a> {
    /// Check a statement list in a fresh scope.
    pub(super) fn scoped_block(&mut self, stmts: &[Stmt]) -> bool {
        self.scopes.push();
        let falls = self.block(stmts);
        self.scopes.pop();
        falls
    }

    /// Check a statement list in the current scope.
    pub(super) fn block(&mut self, stmts: &[Stmt]) -> bool {
        let mut falls = true;
        let mut warned = false;
        for s in stmts {
            if !falls && !warned {
                warned = true;
                self.warn(codes::W0214, &s.span, "unreachable statement");
            }
            let f = self.stmt(s);
            falls = falls && f;
        }
        falls
    }

    fn stmt(&mut self, s: &Stmt) -> bool {
        let span = &s.span;
        match &s.kind {
            StmtKind::Let {
                name,
                ty,
                mutable,
                value,
            } => {
                let declared = match ty {
                    Some(t) => self.resolve(t, &span.child("type")),
                    None => None,
                };
                let found = match (&declared, ty) {
                    (Some(d), _) => self.expect(value, d),
                    // Unresolvable annotation: still check the initializer.
                    (None, Some(_)) => {
                        self.expr(value, None);
                        None
                    }
                    (None, None) => self.expr(value, None),
                };
                let bound = found.or(declared).unwrap_or(Type::Unit);
                self.tables.binding_types.insert(span.clone(), bound.clone());
                self.scopes.define(
                    name.clone(),
                    Binding {
                        ty: bound,
                        mutable: *mutable,
                        origin: Origin::Let,
                    },
                );
                true
            }

            StmtKind::Assign { name, value } => {
                let Some(b) = self.scopes.lookup(name).cloned() else {
                    self.error(codes::E0201, span, format!("unknown variable '{name}'"));
                    self.expr(value, None);
                    return true;
                };
                if !b.mutable {
                    let what = match b.origin {
                        Origin::Param => "parameter",
                        Origin::Let => "binding",
                        Origin::LoopVar => "loop variable",
                        Origin::Pattern => "pattern binding",
                    };
                    let d = crate::diag::Diagnostic::error(
                        crate::diag::Phase::Type,
                        span.clone(),
                        format!("cannot assign to immutable {what} '{name}'"),
                    )
                    .with_code(codes::E0205);
                    let d = if matches!(b.origin, Origin::Let | Origin::Param) {
                        d.with_hint(format!("declare '{name}' with \"mutable\": true"))
                    } else {
                        d
                    };
                    self.diagnostics.push(d);
                }
                self.expect(value, &b.ty);
                true
            }

            StmtKind::Expr(e) => {
                self.expr(e, None);
                true
            }

            StmtKind::Return(value) => {
                let returns = self.ctx.returns.clone();
                match value {
                    Some(v) => {
                        self.expect(v, &returns);
                    }
                    None if returns != Type::Unit => {
                        self.error(codes::E0200, span, format!("return without a value in a function returning {returns}"));
                    }
                    None => {}
                }
                false
            }

            StmtKind::If {
                cond,
                then_body,
                else_body,
            } => {
                self.expect(cond, &Type::Bool);
                let t = self.scoped_block(then_body);
                let e = self.scoped_block(else_body);
                t || e
            }

            StmtKind::While { cond, body } => {
                self.expect(cond, &Type::Bool);
                self.ctx.loops.push(false);
                self.scoped_block(body);
                let broke = self.ctx.loops.pop().unwrap_or(false);
                !is_const_true(cond) || broke
            }

            StmtKind::For {
                var,
                start,
                end,
                body,
            } => {
                let (st, et) = if is_untyped_literal(start) {
                    let et = self.expr(end, None);
                    (self.expr(start, et.as_ref()), et)
                } else {
                    let st = self.expr(start, None);
                    (st.clone(), self.expr(end, st.as_ref()))
                };
                let var_ty = match (st, et) {
                    (Some(st), Some(et)) => match common_type(&st, &et, self.options.widening) {
                        Some(t) if t.is_int() => {
                            if st != t {
                                self.coerce(start.id, &start.span, &st, &t);
                            }
                            if et != t {
                                self.coerce(end.id, &end.span, &et, &t);
                            }
                            t
                        }
                        _ => {
                            self.error(
                                codes::E0200,
                                span,
                                format!("for bounds must share an integer type, found {st} and {et}"),
                            );
                            crate::types::I64
                        }
                    },
                    _ => crate::types::I64,
                };
                self.tables.binding_types.insert(span.clone(), var_ty.clone());
                self.scopes.push();
                self.scopes.define(
                    var.clone(),
                    Binding {
                        ty: var_ty,
                        mutable: false,
                        origin: Origin::LoopVar,
                    },
                );
                self.ctx.loops.push(false);
                self.block(body);
                self.ctx.loops.pop();
                self.scopes.pop();
                true
            }

            StmtKind::Match { scrutinee, arms } => self.match_stmt(span, scrutinee, arms),

            StmtKind::Observe { dist, params, value } => {
                if let Some(kind) = self.distribution(dist, params, span) {
                    self.expect(value, &kind_type(kind));
                } else {
                    self.expr(value, None);
                }
                true
            }

            StmtKind::Break | StmtKind::Continue => {
                let is_break = matches!(s.kind, StmtKind::Break);
                match self.ctx.loops.last_mut() {
                    Some(broke) => {
                        if is_break {
                            *broke = true;
                        }
                    }
                    None => {
                        let kw = if is_break { "break" } else { "continue" };
                        self.error(codes::E0211, span, format!("'{kw}' outside of a loop"));
                    }
                }
                false
            }
        }
    }
}
