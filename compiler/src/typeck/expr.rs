// expr.rs — Expression typing
//
// Types flow upward from literals and operands; an expected type flows
// downward to untyped literals and empty collections. Every typed expression
// is recorded in the expression table.

use std::collections::HashMap;

use sirs_runtime::dist::{ParamShape, ValueKind};
use sirs_runtime::ops::Intrinsic;
use sirs_runtime::Variate;

use super::generics::infer_bindings;
use super::{Checker, MethodTarget};
use crate::ast::{BinaryOp, Expr, ExprKind, Literal, Span, UnaryOp};
use crate::diag::codes;
use crate::types::{common_type, Type, F64, I64};

pub(super) fn is_untyped_literal(e: &Expr) -> bool {
    matches!(
        &e.kind,
        ExprKind::Lit {
            ty: None,
            value: Literal::Int(_) | Literal::Float(_)
        }
    )
}

/// Compile-time value of a distribution parameter, when it is a literal.
fn const_variate(e: &Expr) -> Option<Variate> {
    match &e.kind {
        ExprKind::Lit {
            value: Literal::Float(x),
            ..
        } => Some(Variate::Real(*x)),
        ExprKind::Unary {
            op: UnaryOp::Neg,
            operand,
        } => match const_variate(operand)? {
            Variate::Real(x) => Some(Variate::Real(-x)),
            _ => None,
        },
        ExprKind::Array(elems) => elems
            .iter()
            .map(|e| const_variate(e)?.as_f64())
            .collect::<Option<Vec<_>>>()
            .map(Variate::Vector),
        _ => None,
    }
}

pub(super) fn kind_type(kind: ValueKind) -> Type {
    match kind {
        ValueKind::Real => F64,
        ValueKind::Integer => I64,
        ValueKind::Vector => Type::Slice(Box::new(F64)),
    }
}

impl<'a> Checker<'a> {
    /// Type `e`, recording the result. `None` means an error was reported.
    pub(super) fn expr(&mut self, e: &Expr, expected: Option<&Type>) -> Option<Type> {
        let ty = self.expr_kind(e, expected)?;
        self.record(e.id, ty)
    }

    fn expr_kind(&mut self, e: &Expr, expected: Option<&Type>) -> Option<Type> {
        let decls = self.decls;
        let span = &e.span;
        match &e.kind {
            ExprKind::Lit { ty, value } => Some(Self::literal_type(value, ty.as_ref(), expected)),

            ExprKind::Var(name) => match self.scopes.lookup(name) {
                Some(b) => Some(b.ty.clone()),
                None => {
                    let mut d = crate::diag::Diagnostic::error(
                        crate::diag::Phase::Type,
                        span.clone(),
                        format!("unknown variable '{name}'"),
                    )
                    .with_code(codes::E0201);
                    if decls.functions.contains_key(name) {
                        d = d.with_hint(format!("'{name}' is a function; functions are not values"));
                    }
                    self.diagnostics.push(d);
                    None
                }
            },

            ExprKind::Binary { op, lhs, rhs } => self.binary(span, *op, lhs, rhs, expected),

            ExprKind::Unary { op, operand } => {
                let t = self.expr(operand, expected)?;
                let ok = match op {
                    UnaryOp::Neg => self.satisfies(&t, "Num"),
                    UnaryOp::Not => t == Type::Bool || t.is_int(),
                };
                if ok {
                    Some(t)
                } else {
                    self.error(
                        codes::E0204,
                        span,
                        format!("operator '{}' is not defined for {t}", op.symbol()),
                    );
                    None
                }
            }

            ExprKind::Call {
                callee,
                type_args,
                args,
            } => self.call(e, callee, type_args, args),

            ExprKind::MethodCall {
                receiver,
                method,
                args,
            } => self.method_call(e, receiver, method, args),

            ExprKind::AsDyn { interface, value } => {
                if !decls.interfaces.contains_key(interface) {
                    self.error(codes::E0201, span, format!("unknown interface '{interface}'"));
                    self.expr(value, None);
                    return None;
                }
                let t = self.expr(value, None)?;
                if matches!(t, Type::Dyn(_)) {
                    self.error(codes::E0209, span, format!("{t} is already an interface value"));
                    return None;
                }
                if !self.satisfies(&t, interface) {
                    self.diagnostics.push(
                        crate::diag::Diagnostic::error(
                            crate::diag::Phase::Type,
                            span.clone(),
                            format!("type {t} does not implement interface '{interface}'"),
                        )
                        .with_code(codes::E0209)
                        .with_hint(format!("add an impl of '{interface}' for {t}")),
                    );
                    return None;
                }
                Some(Type::Dyn(interface.clone()))
            }

            ExprKind::Cast { ty, value } => {
                let target = self.resolve(ty, &span.child("type"));
                let found = self.expr(value, None)?;
                let target = target?;
                let ok = found == target
                    || (found.is_numeric() && target.is_numeric())
                    || (found == Type::Bool && target.is_numeric());
                if ok {
                    Some(target)
                } else {
                    self.error(codes::E0204, span, format!("cannot cast {found} to {target}"));
                    None
                }
            }

            ExprKind::Array(elems) => {
                let hint = expected.and_then(Type::sequence_elem).cloned();
                let elem = self.elements(elems, hint, span, "array")?;
                Some(Type::Array(Box::new(elem), elems.len() as u64))
            }

            ExprKind::Tuple(elems) => {
                let hints: Vec<Option<Type>> = match expected {
                    Some(Type::Tuple(ts)) if ts.len() == elems.len() => ts.iter().cloned().map(Some).collect(),
                    _ => vec![None; elems.len()],
                };
                let types: Vec<Option<Type>> = elems
                    .iter()
                    .zip(&hints)
                    .map(|(x, h)| match h {
                        Some(h) => self.expect(x, h),
                        None => self.expr(x, None),
                    })
                    .collect();
                Some(Type::Tuple(types.into_iter().collect::<Option<Vec<_>>>()?))
            }

            ExprKind::Record {
                name,
                type_args,
                fields,
            } => {
                let Some(info) = decls.records.get(name) else {
                    self.error(codes::E0201, span, format!("unknown record type '{name}'"));
                    fields.iter().for_each(|(_, x)| {
                        self.expr(x, None);
                    });
                    return None;
                };
                let mut slots = Vec::new();
                let mut ok = true;
                for (fname, fty) in &info.fields {
                    match fields.iter().find(|(n, _)| n == fname) {
                        Some((_, x)) => slots.push((fty.clone(), x)),
                        None => {
                            ok = false;
                            self.error(
                                codes::E0200,
                                span,
                                format!("missing field '{fname}' in record '{name}'"),
                            );
                        }
                    }
                }
                for (fname, x) in fields {
                    if !info.fields.iter().any(|(n, _)| n == fname) {
                        ok = false;
                        self.error(
                            codes::E0201,
                            &span.child("fields").child(fname),
                            format!("record '{name}' has no field '{fname}'"),
                        );
                        self.expr(x, None);
                    }
                }
                let args = self.instantiate_decl(name, &info.type_params, type_args, expected, &slots, span);
                if !ok {
                    return None;
                }
                Some(Type::Named {
                    name: name.clone(),
                    args: args?,
                })
            }

            ExprKind::Variant {
                enum_name,
                variant,
                type_args,
                payload,
            } => {
                let Some(info) = decls.enums.get(enum_name) else {
                    self.error(codes::E0201, span, format!("unknown enum type '{enum_name}'"));
                    return None;
                };
                let Some((_, declared)) = info.variants.iter().find(|(n, _)| n == variant) else {
                    let names: Vec<&str> = info.variants.iter().map(|(n, _)| n.as_str()).collect();
                    self.diagnostics.push(
                        crate::diag::Diagnostic::error(
                            crate::diag::Phase::Type,
                            span.child("variant"),
                            format!("enum '{enum_name}' has no variant '{variant}'"),
                        )
                        .with_code(codes::E0201)
                        .with_hint(format!("variants are: {}", names.join(", "))),
                    );
                    return None;
                };
                if declared.len() != payload.len() {
                    self.error(
                        codes::E0203,
                        span,
                        format!(
                            "variant '{enum_name}.{variant}' takes {} payload value(s), got {}",
                            declared.len(),
                            payload.len()
                        ),
                    );
                    return None;
                }
                let slots: Vec<(Type, &Expr)> = declared.iter().cloned().zip(payload.iter()).collect();
                let args = self.instantiate_decl(enum_name, &info.type_params, type_args, expected, &slots, span)?;
                Some(Type::Named {
                    name: enum_name.clone(),
                    args,
                })
            }

            ExprKind::Some(value) => match expected {
                Some(Type::Optional(inner)) => {
                    let inner = (**inner).clone();
                    self.expect(value, &inner)?;
                    Some(Type::Optional(Box::new(inner)))
                }
                _ => Some(Type::Optional(Box::new(self.expr(value, None)?))),
            },

            ExprKind::None(ty) => Some(Type::Optional(Box::new(self.resolve(ty, &span.child("type"))?))),

            ExprKind::Map {
                key,
                value,
                entries,
            } => {
                let k = self.resolve(key, &span.child("key"));
                let v = self.resolve(value, &span.child("value"));
                let (k, v) = (k?, v?);
                self.hashable(&k, span)?;
                let mut ok = true;
                for (ke, ve) in entries {
                    ok &= self.expect(ke, &k).is_some();
                    ok &= self.expect(ve, &v).is_some();
                }
                ok.then(|| Type::Map(Box::new(k), Box::new(v)))
            }

            ExprKind::Set { elem, elems } => {
                let t = self.resolve(elem, &span.child("elem"))?;
                self.hashable(&t, span)?;
                let mut ok = true;
                for x in elems {
                    ok &= self.expect(x, &t).is_some();
                }
                ok.then(|| Type::Set(Box::new(t)))
            }

            ExprKind::Field { base, field } => {
                let bt = self.expr(base, None)?;
                if let Type::Tuple(ts) = &bt {
                    if let Some(t) = field.parse::<usize>().ok().and_then(|i| ts.get(i)) {
                        return Some(t.clone());
                    }
                }
                match decls.field(&bt, field) {
                    Some((_, t)) => Some(t),
                    None => {
                        self.error(codes::E0201, &span.child("field"), format!("{bt} has no field '{field}'"));
                        None
                    }
                }
            }

            ExprKind::Index { base, index } => {
                let bt = self.expr(base, None);
                let it = self.expr(index, Some(&I64));
                let (bt, it) = (bt?, it?);
                if !it.is_int() {
                    self.mismatch(&index.span, &I64, &it);
                    return None;
                }
                match bt.sequence_elem() {
                    Some(t) => Some(t.clone()),
                    None => {
                        self.error(codes::E0204, span, format!("cannot index into {bt}"));
                        None
                    }
                }
            }

            ExprKind::Intrinsic { name, args } => self.intrinsic(span, name, args, expected),

            ExprKind::Sample { dist, params } => {
                let kind = self.distribution(dist, params, span)?;
                Some(kind_type(kind))
            }
        }
    }

    fn hashable(&mut self, t: &Type, span: &Span) -> Option<()> {
        if self.satisfies(t, "Eq") {
            Some(())
        } else {
            self.error(codes::E0204, span, format!("{t} cannot be used as a map key or set element"));
            None
        }
    }

    /// Elements of an array literal share one type: the expected element
    /// type if known, otherwise that of the first non-literal element.
    fn elements(&mut self, elems: &[Expr], hint: Option<Type>, span: &Span, what: &str) -> Option<Type> {
        let elem = match hint {
            Some(t) => t,
            None => {
                if elems.is_empty() {
                    self.error(codes::E0213, span, format!("cannot infer the element type of an empty {what}"));
                    return None;
                }
                let pivot = elems.iter().position(|x| !is_untyped_literal(x)).unwrap_or(0);
                self.expr(&elems[pivot], None)?
            }
        };
        let mut ok = true;
        for x in elems {
            if self.tables.expr_types.contains_key(&x.id) {
                let found = self.tables.expr_types[&x.id].clone();
                ok &= self.coerce(x.id, &x.span, &found, &elem);
            } else {
                ok &= self.expect(x, &elem).is_some();
            }
        }
        ok.then_some(elem)
    }

    fn binary(
        &mut self,
        span: &Span,
        op: BinaryOp,
        lhs: &Expr,
        rhs: &Expr,
        expected: Option<&Type>,
    ) -> Option<Type> {
        if op.is_logical() {
            let l = self.expect(lhs, &Type::Bool);
            let r = self.expect(rhs, &Type::Bool);
            l?;
            r?;
            return Some(Type::Bool);
        }
        let hint = if op.is_arithmetic() || op.is_bitwise() {
            expected.cloned()
        } else {
            None
        };
        let (lt, rt) = if is_untyped_literal(lhs) && !is_untyped_literal(rhs) {
            let rt = self.expr(rhs, hint.as_ref());
            let lt = self.expr(lhs, rt.as_ref().or(hint.as_ref()));
            (lt, rt)
        } else {
            let lt = self.expr(lhs, hint.as_ref());
            let rt = self.expr(rhs, lt.as_ref().or(hint.as_ref()));
            (lt, rt)
        };
        let (lt, rt) = (lt?, rt?);
        let Some(common) = common_type(&lt, &rt, self.options.widening) else {
            self.error(
                codes::E0200,
                span,
                format!("operands of '{}' have incompatible types {lt} and {rt}", op.symbol()),
            );
            return None;
        };
        if lt != common {
            self.coerce(lhs.id, &lhs.span, &lt, &common);
        }
        if rt != common {
            self.coerce(rhs.id, &rhs.span, &rt, &common);
        }
        let ok = if op.is_arithmetic() {
            self.satisfies(&common, "Num") || (op == BinaryOp::Add && common == Type::Str)
        } else if op.is_bitwise() {
            common.is_int()
                || (common == Type::Bool && matches!(op, BinaryOp::BitAnd | BinaryOp::BitOr | BinaryOp::BitXor))
        } else if op.is_ordering() {
            self.satisfies(&common, "Ord")
        } else {
            self.satisfies(&common, "Eq")
        };
        if !ok {
            self.error(
                codes::E0204,
                span,
                format!("operator '{}' is not defined for {common}", op.symbol()),
            );
            return None;
        }
        if op.is_ordering() || op.is_equality() {
            Some(Type::Bool)
        } else {
            Some(common)
        }
    }

    /// Check `args` against `params`, reporting arity mismatches.
    fn args(&mut self, what: &str, params: &[Type], args: &[Expr], span: &Span) -> bool {
        if params.len() != args.len() {
            self.error(
                codes::E0203,
                span,
                format!("{what} expects {} argument(s), got {}", params.len(), args.len()),
            );
            for a in args {
                self.expr(a, None);
            }
            return false;
        }
        let mut ok = true;
        for (p, a) in params.iter().zip(args) {
            ok &= self.expect(a, p).is_some();
        }
        ok
    }

    fn call(&mut self, e: &Expr, callee: &str, type_args: &[Type], args: &[Expr]) -> Option<Type> {
        let decls = self.decls;
        let span = &e.span;
        let Some(sig) = decls.functions.get(callee) else {
            self.error(codes::E0201, &span.child("callee"), format!("unknown function '{callee}'"));
            for a in args {
                self.expr(a, None);
            }
            return None;
        };
        if sig.type_params.is_empty() {
            if !type_args.is_empty() {
                self.error(codes::E0203, &span.child("type_args"), format!("'{callee}' is not generic"));
                return None;
            }
            let ok = self.args(&format!("'{callee}'"), &sig.params, args, span);
            return ok.then(|| sig.returns.clone());
        }
        if sig.params.len() != args.len() {
            return self
                .args(&format!("'{callee}'"), &sig.params, args, span)
                .then(|| sig.returns.clone());
        }
        let (subst, found) = self.instantiate(callee, &sig.type_params, &sig.params, type_args, args, span)?;
        let mut ok = true;
        for ((param, arg), found) in sig.params.iter().zip(args).zip(found) {
            match found {
                Some(f) => ok &= self.coerce(arg.id, &arg.span, &f, &param.substitute(&subst)),
                None => ok = false,
            }
        }
        let ordered: Vec<Type> = sig
            .type_params
            .iter()
            .filter_map(|p| subst.get(&p.name).cloned())
            .collect();
        ok &= self.check_bounds(callee, &sig.type_params, &ordered, span);
        self.tables.call_type_args.insert(e.id, ordered);
        ok.then(|| sig.returns.substitute(&subst))
    }

    fn method_call(&mut self, e: &Expr, receiver: &Expr, method: &str, args: &[Expr]) -> Option<Type> {
        let decls = self.decls;
        let span = &e.span;
        let rt = self.expr(receiver, None)?;
        let what = format!("method '{method}'");
        match &rt {
            Type::Dyn(iface) => {
                let Some((slot, m)) = decls.interface_method(iface, method) else {
                    self.error(codes::E0201, span, format!("interface '{iface}' has no method '{method}'"));
                    return None;
                };
                self.tables.methods.insert(
                    e.id,
                    MethodTarget::Dynamic {
                        interface: iface.clone(),
                        slot,
                    },
                );
                self.args(&what, &m.params, args, span).then(|| m.returns.clone())
            }
            Type::Param(p) => {
                let bounds = self.ctx.bounds.get(p).cloned().unwrap_or_default();
                let hit = bounds
                    .iter()
                    .find_map(|b| decls.interface_method(b, method).map(|(_, m)| (b.clone(), m)));
                let Some((iface, m)) = hit else {
                    self.error(
                        codes::E0201,
                        span,
                        format!("type parameter '{p}' has no method '{method}' in its bounds"),
                    );
                    return None;
                };
                self.tables.methods.insert(
                    e.id,
                    MethodTarget::Bound {
                        interface: iface,
                        method: method.to_string(),
                    },
                );
                self.args(&what, &m.params, args, span).then(|| m.returns.clone())
            }
            concrete => match decls.static_method(concrete, method) {
                Ok(Some((_, function))) => {
                    let sig = decls.functions.get(function)?;
                    self.tables.methods.insert(
                        e.id,
                        MethodTarget::Static {
                            function: function.to_string(),
                        },
                    );
                    let params = sig.params.get(1..).unwrap_or(&[]);
                    self.args(&what, params, args, span).then(|| sig.returns.clone())
                }
                Ok(None) => {
                    self.error(codes::E0201, span, format!("no method '{method}' for type {concrete}"));
                    None
                }
                Err(candidates) => {
                    self.error(
                        codes::E0209,
                        span,
                        format!(
                            "method '{method}' on {concrete} is ambiguous between interfaces {}",
                            candidates.join(", ")
                        ),
                    );
                    None
                }
            },
        }
    }

    /// Type arguments of a record or enum construction: explicit, taken from
    /// the expected type, or inferred from the slots. Coerces every slot.
    fn instantiate_decl(
        &mut self,
        name: &str,
        tparams: &[String],
        explicit: &[Type],
        expected: Option<&Type>,
        slots: &[(Type, &Expr)],
        span: &Span,
    ) -> Option<Vec<Type>> {
        let mut subst: HashMap<String, Type> = HashMap::new();
        if !explicit.is_empty() {
            if explicit.len() != tparams.len() {
                self.error(
                    codes::E0203,
                    &span.child("type_args"),
                    format!("'{name}' expects {} type argument(s), got {}", tparams.len(), explicit.len()),
                );
                return None;
            }
            for (i, (p, t)) in tparams.iter().zip(explicit).enumerate() {
                let t = self.resolve(t, &span.child("type_args").index(i))?;
                subst.insert(p.clone(), t);
            }
        } else if let Some(Type::Named { name: n, args }) = expected {
            if n == name && args.len() == tparams.len() {
                subst.extend(tparams.iter().cloned().zip(args.iter().cloned()));
            }
        }
        let mut found = Vec::with_capacity(slots.len());
        for (declared, x) in slots {
            let hint = declared.substitute(&subst);
            let hint = tparams
                .iter()
                .all(|p| !mentions(&hint, p))
                .then_some(hint);
            let t = self.expr(x, hint.as_ref());
            if let Some(t) = &t {
                infer_bindings(declared, t, tparams, &mut subst);
            }
            found.push(t);
        }
        if let Some(missing) = tparams.iter().find(|p| !subst.contains_key(*p)) {
            self.diagnostics.push(
                crate::diag::Diagnostic::error(
                    crate::diag::Phase::Type,
                    span.clone(),
                    format!("cannot infer type parameter '{missing}' of '{name}'"),
                )
                .with_code(codes::E0213)
                .with_hint("add type_args or an annotated let"),
            );
            return None;
        }
        let mut ok = true;
        for ((declared, x), t) in slots.iter().zip(found) {
            match t {
                Some(t) => ok &= self.coerce(x.id, &x.span, &t, &declared.substitute(&subst)),
                None => ok = false,
            }
        }
        let args: Vec<Type> = tparams.iter().filter_map(|p| subst.get(p).cloned()).collect();
        ok.then_some(args)
    }

    fn intrinsic(&mut self, span: &Span, name: &str, args: &[Expr], expected: Option<&Type>) -> Option<Type> {
        let Some(which) = Intrinsic::from_name(name) else {
            self.error(codes::E0201, &span.child("name"), format!("unknown intrinsic '{name}'"));
            return None;
        };
        let arity = match which {
            Intrinsic::Print => None,
            Intrinsic::Len | Intrinsic::Sqrt | Intrinsic::Exp | Intrinsic::Log | Intrinsic::Abs => Some(1..=1),
            Intrinsic::Contains | Intrinsic::Get | Intrinsic::Push => Some(2..=2),
            Intrinsic::Insert => Some(2..=3),
        };
        if let Some(range) = arity {
            if !range.contains(&args.len()) {
                self.error(
                    codes::E0203,
                    span,
                    format!("intrinsic '{name}' cannot take {} argument(s)", args.len()),
                );
                return None;
            }
        }
        let bad = |c: &mut Self, t: &Type| -> Option<Type> {
            c.error(codes::E0204, span, format!("intrinsic '{name}' is not defined for {t}"));
            None
        };
        match which {
            Intrinsic::Print => {
                let mut ok = true;
                for a in args {
                    ok &= self.expr(a, None).is_some();
                }
                ok.then_some(Type::Unit)
            }
            Intrinsic::Len => {
                let t = self.expr(&args[0], None)?;
                match t {
                    Type::Array(..) | Type::Slice(_) | Type::Str | Type::Map(..) | Type::Set(_) => Some(I64),
                    other => bad(self, &other),
                }
            }
            Intrinsic::Sqrt | Intrinsic::Exp | Intrinsic::Log => {
                let hint = match expected {
                    Some(t @ Type::Float(_)) => t.clone(),
                    _ => F64,
                };
                let t = self.expr(&args[0], Some(&hint))?;
                if t.is_float() {
                    Some(t)
                } else {
                    bad(self, &t)
                }
            }
            Intrinsic::Abs => {
                let t = self.expr(&args[0], expected)?;
                if self.satisfies(&t, "Num") {
                    Some(t)
                } else {
                    bad(self, &t)
                }
            }
            Intrinsic::Contains | Intrinsic::Get | Intrinsic::Insert | Intrinsic::Push => {
                let c = self.expr(&args[0], None)?;
                match (which, &c, args.len()) {
                    (Intrinsic::Contains, Type::Map(k, _), _)
                    | (Intrinsic::Contains, Type::Set(k), _)
                    | (Intrinsic::Contains, Type::Array(k, _), _)
                    | (Intrinsic::Contains, Type::Slice(k), _) => {
                        self.expect(&args[1], k)?;
                        Some(Type::Bool)
                    }
                    (Intrinsic::Get, Type::Map(k, v), _) => {
                        self.expect(&args[1], k)?;
                        Some(Type::Optional(v.clone()))
                    }
                    (Intrinsic::Insert, Type::Map(k, v), 3) => {
                        let a = self.expect(&args[1], k);
                        let b = self.expect(&args[2], v);
                        a?;
                        b?;
                        Some(c.clone())
                    }
                    (Intrinsic::Insert, Type::Set(t), 2) => {
                        self.expect(&args[1], t)?;
                        Some(c.clone())
                    }
                    (Intrinsic::Push, Type::Array(t, _) | Type::Slice(t), _) => {
                        self.expect(&args[1], t)?;
                        Some(Type::Slice(t.clone()))
                    }
                    _ => bad(self, &c),
                }
            }
        }
    }

    /// Validate a `sample`/`observe` site against the registry and return the
    /// kind of value the distribution produces.
    pub(super) fn distribution(&mut self, dist: &str, params: &[Expr], span: &Span) -> Option<ValueKind> {
        let def = match self.registry.lookup(dist) {
            Ok(def) => def,
            Err(err) => {
                self.diagnostics.push(
                    crate::diag::Diagnostic::error(crate::diag::Phase::Type, span.child("dist"), err.to_string())
                        .with_code(codes::E0212)
                        .with_hint(format!("registered distributions: {}", self.registry.list().join(", "))),
                );
                for p in params {
                    self.expr(p, None);
                }
                return None;
            }
        };
        if def.params.len() != params.len() {
            self.error(
                codes::E0203,
                &span.child("params"),
                format!(
                    "distribution '{dist}' expects {} parameter(s), got {}",
                    def.params.len(),
                    params.len()
                ),
            );
            return None;
        }
        let mut ok = true;
        let mut consts = Vec::with_capacity(params.len());
        for (spec, p) in def.params.iter().zip(params) {
            let want = match spec.shape {
                ParamShape::Scalar => F64,
                ParamShape::Vector => Type::Slice(Box::new(F64)),
            };
            ok &= self.expect(p, &want).is_some();
            consts.push(const_variate(p));
        }
        if !ok {
            return None;
        }
        if let Some(values) = consts.into_iter().collect::<Option<Vec<_>>>() {
            if let Err(err) = def.check_params(&values) {
                self.error(codes::E0212, &span.child("params"), err.to_string());
                return None;
            }
        }
        Some(def.value_kind())
    }
}

fn mentions(t: &Type, param: &str) -> bool {
    match t {
        Type::Param(p) => p == param,
        Type::Array(x, _) | Type::Slice(x) | Type::Set(x) | Type::Optional(x) => mentions(x, param),
        Type::Map(k, v) => mentions(k, param) || mentions(v, param),
        Type::Tuple(ts) | Type::Union(ts) | Type::Named { args: ts, .. } => ts.iter().any(|x| mentions(x, param)),
        _ => false,
    }
}
