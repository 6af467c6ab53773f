// generics.rs — Type-argument inference and bound checking
//
// Generic calls are checked by matching each declared parameter type against
// the argument's type to bind type parameters, then verifying the bound set
// of every binding.

use std::collections::HashMap;

use super::Checker;
use crate::ast::{Expr, Span, TypeParam};
use crate::diag::codes;
use crate::types::Type;

/// Bind the type parameters in `pattern` by structural match against
/// `actual`. First binding wins; mismatches are left for coercion to report.
pub fn infer_bindings(pattern: &Type, actual: &Type, params: &[String], subst: &mut HashMap<String, Type>) {
    match (pattern, actual) {
        (Type::Param(p), _) if params.contains(p) => {
            subst.entry(p.clone()).or_insert_with(|| actual.clone());
        }
        (Type::Array(p, _), Type::Array(a, _))
        | (Type::Slice(p), Type::Slice(a))
        | (Type::Slice(p), Type::Array(a, _))
        | (Type::Set(p), Type::Set(a))
        | (Type::Optional(p), Type::Optional(a)) => infer_bindings(p, a, params, subst),
        (Type::Map(pk, pv), Type::Map(ak, av)) => {
            infer_bindings(pk, ak, params, subst);
            infer_bindings(pv, av, params, subst);
        }
        (Type::Tuple(ps), Type::Tuple(as_)) | (Type::Union(ps), Type::Union(as_)) if ps.len() == as_.len() => {
            for (p, a) in ps.iter().zip(as_) {
                infer_bindings(p, a, params, subst);
            }
        }
        (Type::Named { name: pn, args: pa }, Type::Named { name: an, args: aa })
            if pn == an && pa.len() == aa.len() =>
        {
            for (p, a) in pa.iter().zip(aa) {
                infer_bindings(p, a, params, subst);
            }
        }
        _ => {}
    }
}

impl<'a> Checker<'a> {
    /// True if `ty` has capability `bound` in the current function.
    pub(super) fn satisfies(&self, ty: &Type, bound: &str) -> bool {
        if let Type::Param(p) = ty {
            let declared = self.ctx.bounds.get(p).map(Vec::as_slice).unwrap_or(&[]);
            return declared.iter().any(|b| {
                b == bound || (b == "Num" && (bound == "Ord" || bound == "Eq")) || (b == "Ord" && bound == "Eq")
            });
        }
        match bound {
            "Num" => ty.is_numeric(),
            "Ord" => ty.is_ordered(),
            "Eq" => !contains_dyn(ty),
            iface => self.decls.find_impl(iface, ty).is_some(),
        }
    }

    /// Verify each inferred type argument against its declared bounds.
    pub(super) fn check_bounds(&mut self, callee: &str, tparams: &[TypeParam], args: &[Type], span: &Span) -> bool {
        let mut ok = true;
        for (tp, arg) in tparams.iter().zip(args) {
            for bound in &tp.bounds {
                if !self.satisfies(arg, bound) {
                    ok = false;
                    self.error(
                        codes::E0208,
                        span,
                        format!(
                            "type {arg} does not satisfy bound '{bound}' of type parameter '{}' in call to '{callee}'",
                            tp.name
                        ),
                    );
                }
            }
        }
        ok
    }

    /// Resolve the type arguments of a generic call: explicit ones when
    /// given, otherwise inferred from the arguments. Arguments are checked
    /// here; the caller coerces them against the substituted signature.
    pub(super) fn instantiate(
        &mut self,
        callee: &str,
        tparams: &[TypeParam],
        declared: &[Type],
        explicit: &[Type],
        args: &[Expr],
        span: &Span,
    ) -> Option<(HashMap<String, Type>, Vec<Option<Type>>)> {
        let names: Vec<String> = tparams.iter().map(|p| p.name.clone()).collect();
        let mut subst = HashMap::new();
        if !explicit.is_empty() {
            if explicit.len() != names.len() {
                self.error(
                    codes::E0203,
                    &span.child("type_args"),
                    format!(
                        "'{callee}' expects {} type argument(s), got {}",
                        names.len(),
                        explicit.len()
                    ),
                );
                return None;
            }
            for (i, (n, t)) in names.iter().zip(explicit).enumerate() {
                let t = self.resolve(t, &span.child("type_args").index(i))?;
                subst.insert(n.clone(), t);
            }
        }
        let mut found = Vec::with_capacity(args.len());
        for (param, arg) in declared.iter().zip(args) {
            let hint = param.substitute(&subst);
            let hint = hint.is_concrete_in(&names).then_some(hint);
            let t = self.expr(arg, hint.as_ref());
            if let Some(t) = &t {
                infer_bindings(param, t, &names, &mut subst);
            }
            found.push(t);
        }
        if let Some(missing) = names.iter().find(|n| !subst.contains_key(*n)) {
            self.error(
                codes::E0213,
                span,
                format!("cannot infer type parameter '{missing}' of '{callee}'"),
            );
            return None;
        }
        Some((subst, found))
    }
}

fn contains_dyn(ty: &Type) -> bool {
    match ty {
        Type::Dyn(_) => true,
        Type::Array(t, _) | Type::Slice(t) | Type::Set(t) | Type::Optional(t) => contains_dyn(t),
        Type::Map(k, v) => contains_dyn(k) || contains_dyn(v),
        Type::Tuple(ts) | Type::Union(ts) | Type::Named { args: ts, .. } => ts.iter().any(contains_dyn),
        _ => false,
    }
}

impl Type {
    /// True if none of `params` occurs in the type.
    fn is_concrete_in(&self, params: &[String]) -> bool {
        match self {
            Type::Param(p) => !params.contains(p),
            Type::Array(t, _) | Type::Slice(t) | Type::Set(t) | Type::Optional(t) => t.is_concrete_in(params),
            Type::Map(k, v) => k.is_concrete_in(params) && v.is_concrete_in(params),
            Type::Tuple(ts) | Type::Union(ts) | Type::Named { args: ts, .. } => {
                ts.iter().all(|t| t.is_concrete_in(params))
            }
            _ => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{F64, I64};

    fn p(n: &str) -> Type {
        Type::Param(n.into())
    }

    #[test]
    fn binds_through_containers() {
        let params = vec!["T".to_string(), "U".to_string()];
        let mut subst = HashMap::new();
        let pattern = Type::Map(Box::new(p("T")), Box::new(Type::Slice(Box::new(p("U")))));
        let actual = Type::Map(Box::new(Type::Str), Box::new(Type::Array(Box::new(F64), 3)));
        infer_bindings(&pattern, &actual, &params, &mut subst);
        assert_eq!(subst.get("T"), Some(&Type::Str));
        assert_eq!(subst.get("U"), Some(&F64));
    }

    #[test]
    fn first_binding_wins() {
        let params = vec!["T".to_string()];
        let mut subst = HashMap::new();
        infer_bindings(&p("T"), &I64, &params, &mut subst);
        infer_bindings(&p("T"), &F64, &params, &mut subst);
        assert_eq!(subst.get("T"), Some(&I64));
    }

    #[test]
    fn concreteness_is_relative_to_params() {
        let t = Type::Optional(Box::new(p("T")));
        assert!(!t.is_concrete_in(&["T".to_string()]));
        assert!(t.is_concrete_in(&["U".to_string()]));
    }
}
