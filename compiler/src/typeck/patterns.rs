// patterns.rs — Match arms and exhaustiveness
//
// Each arm's pattern is turned into an `ArmTest` plus the bindings it
// introduces. Coverage is tracked by name over the scrutinee's value space:
// enum variants, `some`/`none`, `true`/`false`, or union member types. Other
// scrutinee types need a catch-all arm.

use std::collections::{BTreeSet, HashSet};

use sirs_runtime::value::{NONE_TAG, SOME_TAG};
use sirs_runtime::Value;

use super::{ArmInfo, ArmTest, BindSource, Checker, PatternBinding};
use crate::ast::{Arm, Expr, Literal, Pattern, PatternKind, Span};
use crate::diag::{codes, Diagnostic, Phase};
use crate::scope::{Binding, Origin};
use crate::types::Type;

/// Finite value space of a scrutinee type, by constructor name.
enum Space {
    Closed(Vec<String>),
    Open,
}

struct Checked {
    test: ArmTest,
    bindings: Vec<PatternBinding>,
    /// Constructor or constant this arm covers; `None` for catch-alls.
    key: Option<String>,
}

impl<'a> Checker<'a> {
    fn space(&self, ty: &Type) -> Space {
        match ty {
            Type::Bool => Space::Closed(vec!["false".into(), "true".into()]),
            Type::Optional(_) => Space::Closed(vec!["none".into(), "some".into()]),
            Type::Union(members) => Space::Closed(members.iter().map(|m| m.to_string()).collect()),
            t => match self.decls.enum_variants(t) {
                Some(vs) => Space::Closed(vs.into_iter().map(|(n, _)| n).collect()),
                None => Space::Open,
            },
        }
    }

    pub(super) fn match_stmt(&mut self, span: &Span, scrutinee: &Expr, arms: &[Arm]) -> bool {
        let Some(st) = self.expr(scrutinee, None) else {
            for arm in arms {
                self.scoped_block(&arm.body);
            }
            return true;
        };
        let space = self.space(&st);
        let mut covered: BTreeSet<String> = BTreeSet::new();
        let mut catch_all = false;
        let mut falls = false;
        for arm in arms {
            let checked = self.pattern(&st, &arm.pattern);
            let reachable = match &checked {
                Some(c) => !catch_all && c.key.as_ref().map_or(true, |k| !covered.contains(k)),
                None => !catch_all,
            };
            if !reachable {
                self.warn(codes::W0214, &arm.span, "unreachable match arm");
            }
            self.scopes.push();
            if let Some(c) = &checked {
                for b in &c.bindings {
                    self.scopes.define(
                        b.name.clone(),
                        Binding {
                            ty: b.ty.clone(),
                            mutable: false,
                            origin: Origin::Pattern,
                        },
                    );
                }
            }
            falls |= self.block(&arm.body);
            self.scopes.pop();
            if let Some(c) = checked {
                match &c.key {
                    Some(k) => {
                        covered.insert(k.clone());
                    }
                    None => catch_all = true,
                }
                self.tables.arms.insert(
                    arm.span.clone(),
                    ArmInfo {
                        test: c.test,
                        bindings: c.bindings,
                        reachable,
                    },
                );
            }
        }
        if catch_all {
            return falls;
        }
        match space {
            Space::Closed(names) => {
                let missing: Vec<String> = names.into_iter().filter(|n| !covered.contains(n)).collect();
                if !missing.is_empty() {
                    self.diagnostics.push(
                        Diagnostic::error(
                            Phase::Type,
                            span.clone(),
                            format!("non-exhaustive match: missing variant(s) {}", missing.join(", ")),
                        )
                        .with_code(codes::E0206)
                        .with_hint("add an arm for each missing variant or a wildcard arm"),
                    );
                    return true;
                }
                falls
            }
            Space::Open => {
                self.diagnostics.push(
                    Diagnostic::error(
                        Phase::Type,
                        span.clone(),
                        format!("non-exhaustive match on {st}: a wildcard or binding arm is required"),
                    )
                    .with_code(codes::E0206),
                );
                true
            }
        }
    }

    fn invalid(&mut self, span: &Span, msg: impl Into<String>) -> Option<Checked> {
        self.error(codes::E0210, span, msg);
        None
    }

    /// Bindings for payload slots; `_` skips a slot.
    fn slot_bindings(&mut self, span: &Span, names: &[String], payload: &[Type]) -> Option<Vec<PatternBinding>> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for (i, (name, ty)) in names.iter().zip(payload).enumerate() {
            if name == "_" {
                continue;
            }
            if !seen.insert(name.as_str()) {
                self.error(codes::E0202, &span.child("bindings").index(i), format!("'{name}' is bound twice"));
                return None;
            }
            out.push(PatternBinding {
                name: name.clone(),
                source: BindSource::Slot(i),
                ty: ty.clone(),
            });
        }
        Some(out)
    }

    fn pattern(&mut self, st: &Type, p: &Pattern) -> Option<Checked> {
        let span = &p.span;
        match &p.kind {
            PatternKind::Wildcard => Some(Checked {
                test: ArmTest::Always,
                bindings: Vec::new(),
                key: None,
            }),
            PatternKind::Bind(name) => Some(Checked {
                test: ArmTest::Always,
                bindings: vec![PatternBinding {
                    name: name.clone(),
                    source: BindSource::Whole,
                    ty: st.clone(),
                }],
                key: None,
            }),
            PatternKind::Variant { variant, bindings } => {
                let (tag, payload) = match st {
                    Type::Optional(inner) => match variant.as_str() {
                        "some" => (SOME_TAG, vec![(**inner).clone()]),
                        "none" => (NONE_TAG, Vec::new()),
                        other => {
                            return self.invalid(span, format!("optional patterns are 'some' or 'none', found '{other}'"))
                        }
                    },
                    t => match self.decls.variant(t, variant) {
                        Some(v) => v,
                        None if self.decls.is_enum(t) => {
                            return self.invalid(span, format!("{t} has no variant '{variant}'"));
                        }
                        None => return self.invalid(span, format!("variant pattern on non-enum type {t}")),
                    },
                };
                if bindings.len() != payload.len() {
                    return self.invalid(
                        span,
                        format!(
                            "variant '{variant}' has {} payload value(s), pattern binds {}",
                            payload.len(),
                            bindings.len()
                        ),
                    );
                }
                let bindings = self.slot_bindings(span, bindings, &payload)?;
                Some(Checked {
                    test: ArmTest::Tag(tag),
                    bindings,
                    key: Some(variant.clone()),
                })
            }
            PatternKind::Literal(lit) => {
                let value = match (st, lit) {
                    (Type::Int(t), Literal::Int(i)) if t.fits(*i) => Value::Int(t.from_i128(*i)),
                    (Type::Bool, Literal::Bool(b)) => Value::Bool(*b),
                    (Type::Str, Literal::Str(s)) => Value::Str(s.clone()),
                    _ => return self.invalid(span, format!("literal pattern {lit} cannot match {st}")),
                };
                Some(Checked {
                    test: ArmTest::Literal(value),
                    bindings: Vec::new(),
                    key: Some(lit.to_string()),
                })
            }
            PatternKind::Type { ty, binding } => {
                let Type::Union(members) = st else {
                    return self.invalid(span, format!("type pattern on non-union type {st}"));
                };
                let t = self.resolve(ty, &span.child("type"))?;
                let Some(tag) = members.iter().position(|m| *m == t) else {
                    return self.invalid(span, format!("{t} is not a member of {st}"));
                };
                let bindings = binding
                    .iter()
                    .map(|name| PatternBinding {
                        name: name.clone(),
                        source: BindSource::Slot(0),
                        ty: t.clone(),
                    })
                    .collect();
                Some(Checked {
                    test: ArmTest::Tag(tag as u32),
                    bindings,
                    key: Some(t.to_string()),
                })
            }
        }
    }
}
