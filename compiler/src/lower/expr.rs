// expr.rs — Expression lowering
//
// Every expression becomes a flat instruction sequence ending in an operand.
// Implicit conversions recorded by the checker are applied after the
// expression itself: widening becomes a cast and union injection wraps the
// value in a variant.

use sirs_runtime::ops::{BinOp, Intrinsic, IntTy, OpTy, UnOp};
use sirs_runtime::value::SOME_TAG;
use sirs_runtime::Value;

use super::{instance_name, FnLower};
use crate::ast::{BinaryOp, Expr, ExprKind, Literal, UnaryOp};
use crate::cir::{AggKind, InstKind, Operand, Terminator};
use crate::diag::codes;
use crate::typeck::{Coercion, MethodTarget};
use crate::types::Type;

pub(super) fn binop(op: BinaryOp) -> Option<BinOp> {
    Some(match op {
        BinaryOp::Add => BinOp::Add,
        BinaryOp::Sub => BinOp::Sub,
        BinaryOp::Mul => BinOp::Mul,
        BinaryOp::Div => BinOp::Div,
        BinaryOp::Rem => BinOp::Rem,
        BinaryOp::Eq => BinOp::Eq,
        BinaryOp::Ne => BinOp::Ne,
        BinaryOp::Lt => BinOp::Lt,
        BinaryOp::Le => BinOp::Le,
        BinaryOp::Gt => BinOp::Gt,
        BinaryOp::Ge => BinOp::Ge,
        BinaryOp::BitAnd => BinOp::BitAnd,
        BinaryOp::BitOr => BinOp::BitOr,
        BinaryOp::BitXor => BinOp::BitXor,
        BinaryOp::Shl => BinOp::Shl,
        BinaryOp::Shr => BinOp::Shr,
        BinaryOp::And | BinaryOp::Or => return None,
    })
}

/// Constant for a literal at its checked type.
pub(super) fn literal_value(lit: &Literal, ty: &Type) -> Value {
    match (lit, ty) {
        (Literal::Int(i), Type::Int(t)) => Value::Int(t.from_i128(*i)),
        (Literal::Int(i), Type::Float(t)) => Value::Float(t.round(*i as f64)),
        (Literal::Int(i), _) => Value::Int(IntTy::I64.from_i128(*i)),
        (Literal::Float(x), Type::Float(t)) => Value::Float(t.round(*x)),
        (Literal::Float(x), _) => Value::Float(*x),
        (Literal::Bool(b), _) => Value::Bool(*b),
        (Literal::Str(s), _) => Value::Str(s.clone()),
        (Literal::Unit, _) => Value::Unit,
    }
}

impl<'l, 'a> FnLower<'l, 'a> {
    /// Lower `e` and apply its recorded coercion.
    pub(super) fn value(&mut self, e: &Expr) -> Operand {
        let v = self.expr(e);
        match self.l.typed.coercions.get(&e.id).cloned() {
            None => v,
            Some(Coercion::Widen { from, to }) => {
                let (from, to) = (self.subst(&from), self.subst(&to));
                if from == to {
                    v
                } else {
                    self.emit_op(InstKind::Cast {
                        from: from.op_ty(),
                        to: to.op_ty(),
                        value: v,
                    })
                }
            }
            Some(Coercion::Inject { tag, .. }) => self.emit_op(InstKind::Aggregate {
                kind: AggKind::Variant(tag),
                elems: vec![v],
            }),
        }
    }

    fn values(&mut self, es: &[Expr]) -> Vec<Operand> {
        es.iter().map(|e| self.value(e)).collect()
    }

    /// Operand type of an already-coerced expression.
    fn value_op_ty(&self, e: &Expr) -> OpTy {
        self.l
            .typed
            .value_type(e.id)
            .map(|t| self.subst(&t).op_ty())
            .unwrap_or(OpTy::Any)
    }

    fn expr(&mut self, e: &Expr) -> Operand {
        match &e.kind {
            ExprKind::Lit { value, .. } => Operand::Const(literal_value(value, &self.ty(e.id))),

            ExprKind::Var(name) => match self.scopes.lookup(name).copied() {
                Some(local) => self.emit_op(InstKind::Load(local)),
                None => Operand::Const(Value::Unit),
            },

            ExprKind::Binary { op, lhs, rhs } => match binop(*op) {
                Some(bop) => {
                    let ty = self.value_op_ty(lhs);
                    let l = self.value(lhs);
                    let r = self.value(rhs);
                    self.emit_op(InstKind::Binary {
                        op: bop,
                        ty,
                        lhs: l,
                        rhs: r,
                    })
                }
                None => self.short_circuit(*op == BinaryOp::And, lhs, rhs),
            },

            ExprKind::Unary { op, operand } => {
                let ty = self.value_op_ty(operand);
                let v = self.value(operand);
                let op = match op {
                    UnaryOp::Neg => UnOp::Neg,
                    UnaryOp::Not => UnOp::Not,
                };
                self.emit_op(InstKind::Unary { op, ty, operand: v })
            }

            ExprKind::Call { callee, args, .. } => {
                let func = match self.l.typed.call_type_args.get(&e.id) {
                    Some(targs) => {
                        let targs: Vec<Type> = targs.iter().map(|t| self.subst(t)).collect();
                        self.instance(callee, &targs, e)
                    }
                    None => callee.clone(),
                };
                let args = self.values(args);
                self.emit_op(InstKind::Call { func, args })
            }

            ExprKind::MethodCall {
                receiver,
                method,
                args,
            } => self.method_call(e, receiver, method, args),

            ExprKind::AsDyn { interface, value } => {
                let ty = self.ty(value.id);
                let v = self.value(value);
                match self.l.dispatch.concrete_id(&ty) {
                    Some(concrete) => self.emit_op(InstKind::MakeDyn { concrete, value: v }),
                    None => {
                        let span = e.span.clone();
                        self.l
                            .error(codes::E0301, &span, format!("no implementation of '{interface}' for {ty}"));
                        v
                    }
                }
            }

            ExprKind::Cast { value, .. } => {
                let from = self.value_op_ty(value);
                let to = self.ty(e.id).op_ty();
                let v = self.value(value);
                if from == to {
                    v
                } else {
                    self.emit_op(InstKind::Cast { from, to, value: v })
                }
            }

            ExprKind::Array(elems) => {
                let elems = self.values(elems);
                self.emit_op(InstKind::Aggregate {
                    kind: AggKind::Array,
                    elems,
                })
            }

            ExprKind::Tuple(elems) => {
                let elems = self.values(elems);
                self.emit_op(InstKind::Aggregate {
                    kind: AggKind::Tuple,
                    elems,
                })
            }

            ExprKind::Record { fields, .. } => {
                let ty = self.ty(e.id);
                let order = self.l.typed.decls.record_fields(&ty).unwrap_or_default();
                let mut elems = Vec::with_capacity(order.len());
                for (name, _) in &order {
                    if let Some((_, x)) = fields.iter().find(|(n, _)| n == name) {
                        elems.push(self.value(x));
                    }
                }
                self.emit_op(InstKind::Aggregate {
                    kind: AggKind::Record,
                    elems,
                })
            }

            ExprKind::Variant { variant, payload, .. } => {
                let ty = self.ty(e.id);
                let tag = self
                    .l
                    .typed
                    .decls
                    .variant(&ty, variant)
                    .map(|(t, _)| t)
                    .unwrap_or(0);
                let elems = self.values(payload);
                if elems.is_empty() {
                    return Operand::Const(Value::Variant {
                        tag,
                        payload: Vec::new(),
                    });
                }
                self.emit_op(InstKind::Aggregate {
                    kind: AggKind::Variant(tag),
                    elems,
                })
            }

            ExprKind::Some(value) => {
                let v = self.value(value);
                self.emit_op(InstKind::Aggregate {
                    kind: AggKind::Variant(SOME_TAG),
                    elems: vec![v],
                })
            }

            ExprKind::None(_) => Operand::Const(Value::none()),

            ExprKind::Map { entries, .. } => {
                let mut elems = Vec::with_capacity(entries.len() * 2);
                for (k, v) in entries {
                    elems.push(self.value(k));
                    elems.push(self.value(v));
                }
                self.emit_op(InstKind::Aggregate {
                    kind: AggKind::Map,
                    elems,
                })
            }

            ExprKind::Set { elems, .. } => {
                let elems = self.values(elems);
                self.emit_op(InstKind::Aggregate {
                    kind: AggKind::Set,
                    elems,
                })
            }

            ExprKind::Field { base, field } => {
                let bt = self.ty(base.id);
                let index = match &bt {
                    Type::Tuple(_) => field.parse::<usize>().unwrap_or(0),
                    _ => self.l.typed.decls.field(&bt, field).map(|(i, _)| i).unwrap_or(0),
                };
                let b = self.value(base);
                self.emit_op(InstKind::Extract { base: b, index })
            }

            ExprKind::Index { base, index } => {
                let b = self.value(base);
                let ity = self.value_op_ty(index);
                let i = self.value(index);
                // Indices of any integer type address the same element.
                let i = match ity {
                    OpTy::Int(IntTy::I64) => i,
                    OpTy::Int(t) if t != IntTy::U64 => self.emit_op(InstKind::Cast {
                        from: ity,
                        to: OpTy::Int(IntTy::I64),
                        value: i,
                    }),
                    _ => i,
                };
                self.emit_op(InstKind::Index { base: b, index: i })
            }

            ExprKind::Intrinsic { name, args } => {
                let Some(which) = Intrinsic::from_name(name) else {
                    return Operand::Const(Value::Unit);
                };
                let ty = match which {
                    Intrinsic::Sqrt | Intrinsic::Exp | Intrinsic::Log | Intrinsic::Abs => self.ty(e.id).op_ty(),
                    _ => OpTy::Any,
                };
                let args = self.values(args);
                self.emit_op(InstKind::Intrinsic { which, ty, args })
            }

            ExprKind::Sample { dist, params } => {
                let params = self.values(params);
                self.emit_op(InstKind::Sample {
                    dist: dist.clone(),
                    params,
                })
            }
        }
    }

    /// `a && b` / `a || b`: the right operand runs only when needed.
    fn short_circuit(&mut self, is_and: bool, lhs: &Expr, rhs: &Expr) -> Operand {
        let tmp = self.func.add_local(if is_and { "and.tmp" } else { "or.tmp" }, Type::Bool);
        let l = self.value(lhs);
        self.store(tmp, l.clone());
        let rhs_bb = self.new_block();
        let join = self.new_block();
        let (then_bb, else_bb) = if is_and { (rhs_bb, join) } else { (join, rhs_bb) };
        self.terminate(Terminator::Branch {
            cond: l,
            then_bb,
            else_bb,
        });
        self.cur = Some(rhs_bb);
        let r = self.value(rhs);
        self.store(tmp, r);
        self.jump(join);
        self.cur = Some(join);
        self.emit_op(InstKind::Load(tmp))
    }

    /// Name of a generic instance, scheduling it on first use.
    fn instance(&mut self, callee: &str, targs: &[Type], e: &Expr) -> String {
        let name = instance_name(callee, targs);
        if self.l.scheduled.contains(&name) {
            return name;
        }
        if self.l.scheduled.len() >= super::MAX_INSTANCES {
            self.l.error(
                codes::E0302,
                &e.span,
                format!(
                    "instantiating '{name}' exceeds the limit of {} generic instances",
                    super::MAX_INSTANCES
                ),
            );
            return name;
        }
        let program = self.l.program;
        let Some(f) = program.function(callee) else {
            return name;
        };
        let subst = f
            .type_params
            .iter()
            .map(|p| p.name.clone())
            .zip(targs.iter().cloned())
            .collect();
        tracing::debug!(instance = %name, "scheduling generic instance");
        self.l.schedule(f, subst, name.clone());
        name
    }

    fn method_call(&mut self, e: &Expr, receiver: &Expr, method: &str, args: &[Expr]) -> Operand {
        let target = self.l.typed.methods.get(&e.id).cloned();
        let recv_ty = self.ty(receiver.id);
        let recv = self.value(receiver);
        let mut args = self.values(args);
        match target {
            Some(MethodTarget::Dynamic { interface, slot }) => self.emit_op(InstKind::CallDyn {
                interface,
                slot,
                receiver: recv,
                args,
            }),
            Some(MethodTarget::Static { function }) => {
                args.insert(0, recv);
                self.emit_op(InstKind::Call { func: function, args })
            }
            Some(MethodTarget::Bound { interface, method }) => {
                let function = self
                    .l
                    .typed
                    .decls
                    .find_impl(&interface, &recv_ty)
                    .and_then(|imp| imp.methods.get(&method).cloned());
                match function {
                    Some(func) => {
                        args.insert(0, recv);
                        self.emit_op(InstKind::Call { func, args })
                    }
                    None => {
                        let span = e.span.clone();
                        self.l.error(
                            codes::E0301,
                            &span,
                            format!("no implementation of '{interface}.{method}' for {recv_ty}"),
                        );
                        Operand::Const(Value::Unit)
                    }
                }
            }
            None => {
                let span = e.span.clone();
                self.l
                    .error(codes::E0301, &span, format!("unresolved method '{method}' on {recv_ty}"));
                Operand::Const(Value::Unit)
            }
        }
    }
}
