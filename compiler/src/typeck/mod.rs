// typeck — Type checking for SIRS programs
//
// Assigns a resolved type to every expression, validates statements against
// the enclosing function's return type, resolves generic instantiations and
// method dispatch, and checks match exhaustiveness.
//
// Preconditions: `program` is the output of a successful parse.
// Postconditions: when no error diagnostic is produced, every expression id
//   has an entry in `TypedProgram::expr_types`, every call to a generic
//   function has its type arguments recorded, and every method call has a
//   `MethodTarget`.
// Failure modes: type errors are accumulated as E02xx diagnostics; checking
//   continues past a local error.
// Side effects: none.

mod decls;
mod expr;
mod generics;
mod patterns;
mod stmt;

use std::collections::HashMap;

use serde_json::{json, Map, Value as Json};
use sirs_runtime::{Registry, Value};

use crate::ast::{Expr, ExprKind, Literal, Program, Span, Stmt, StmtKind};
use crate::diag::{codes, DiagCode, Diagnostic, Phase};
use crate::id::ExprId;
use crate::scope::{Binding, Origin, Scopes};
use crate::types::{can_widen, Type, WideningPolicy};

pub use decls::{resolve_type, Decls, EnumInfo, FnSig, ImplInfo, InterfaceInfo, MethodInfo, RecordInfo};

// ── Public types ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default)]
pub struct CheckOptions {
    pub widening: WideningPolicy,
}

/// Implicit conversion applied to an expression's value.
#[derive(Debug, Clone, PartialEq)]
pub enum Coercion {
    /// Numeric widening.
    Widen { from: Type, to: Type },
    /// Wrap a value into the union member with this tag.
    Inject { tag: u32, union: Type },
}

/// How a method call is dispatched.
#[derive(Debug, Clone, PartialEq)]
pub enum MethodTarget {
    /// Receiver has a concrete type; call the implementing function.
    Static { function: String },
    /// Receiver is `dyn I`; dispatch through the vtable slot.
    Dynamic { interface: String, slot: usize },
    /// Receiver is a bounded type parameter; resolved per instantiation.
    Bound { interface: String, method: String },
}

/// Runtime test selecting a match arm.
#[derive(Debug, Clone, PartialEq)]
pub enum ArmTest {
    Always,
    /// Variant tag (enum variant, `none`=0/`some`=1, union member index).
    Tag(u32),
    /// Equality with a constant.
    Literal(Value),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindSource {
    /// The scrutinee itself.
    Whole,
    /// Payload slot of the matched variant.
    Slot(usize),
}

#[derive(Debug, Clone, PartialEq)]
pub struct PatternBinding {
    pub name: String,
    pub source: BindSource,
    pub ty: Type,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ArmInfo {
    pub test: ArmTest,
    pub bindings: Vec<PatternBinding>,
    /// False when an earlier arm already covers every value this arm matches.
    pub reachable: bool,
}

/// Result of type checking: declaration tables plus per-node annotations.
#[derive(Debug, Clone, Default)]
pub struct TypedProgram {
    pub decls: Decls,
    pub expr_types: HashMap<ExprId, Type>,
    pub coercions: HashMap<ExprId, Coercion>,
    pub call_type_args: HashMap<ExprId, Vec<Type>>,
    pub methods: HashMap<ExprId, MethodTarget>,
    /// Keyed by arm span.
    pub arms: HashMap<Span, ArmInfo>,
    /// Types of `let` and `for` bindings, keyed by statement span.
    pub binding_types: HashMap<Span, Type>,
}

impl TypedProgram {
    pub fn type_of(&self, id: ExprId) -> Option<&Type> {
        self.expr_types.get(&id)
    }

    /// Type of an expression's value after its coercion, if any.
    pub fn value_type(&self, id: ExprId) -> Option<Type> {
        match self.coercions.get(&id) {
            Some(Coercion::Widen { to, .. }) => Some(to.clone()),
            Some(Coercion::Inject { union, .. }) => Some(union.clone()),
            None => self.expr_types.get(&id).cloned(),
        }
    }

    /// JSON listing of signatures and expression types, for `--emit typed`.
    pub fn describe(&self, program: &Program) -> Json {
        let functions: Vec<Json> = program
            .functions
            .iter()
            .filter_map(|f| {
                let sig = self.decls.functions.get(&f.name)?;
                let mut exprs = Map::new();
                visit_exprs(&f.body, &mut |e| {
                    if let Some(t) = self.expr_types.get(&e.id) {
                        exprs.insert(e.span.to_string(), json!(t.to_string()));
                    }
                });
                let params: Vec<String> = sig.params.iter().map(|t| t.to_string()).collect();
                Some(json!({
                    "name": f.name,
                    "type_params": f.type_params.iter().map(|p| p.name.clone()).collect::<Vec<_>>(),
                    "signature": format!("fn({}) -> {}", params.join(", "), sig.returns),
                    "exprs": exprs,
                }))
            })
            .collect();
        json!({ "functions": functions })
    }
}

pub struct CheckResult {
    pub typed: TypedProgram,
    pub diagnostics: Vec<Diagnostic>,
}

// ── Entry point ─────────────────────────────────────────────────────────────

/// Type check a parsed program. Distribution names in `sample`/`observe` are
/// validated against `registry`.
pub fn check(program: &Program, registry: &Registry, options: &CheckOptions) -> CheckResult {
    let mut diagnostics = Vec::new();
    let decls = decls::Collector::collect(program, &mut diagnostics);
    let mut checker = Checker::new(&decls, registry, *options, diagnostics);
    for f in &program.functions {
        checker.check_function(f);
    }
    let Checker {
        tables,
        diagnostics,
        ..
    } = checker;
    CheckResult {
        typed: TypedProgram {
            decls,
            expr_types: tables.expr_types,
            coercions: tables.coercions,
            call_type_args: tables.call_type_args,
            methods: tables.methods,
            arms: tables.arms,
            binding_types: tables.binding_types,
        },
        diagnostics,
    }
}

/// Pre-order walk over every expression in a statement list.
pub fn visit_exprs(stmts: &[Stmt], f: &mut impl FnMut(&Expr)) {
    fn expr(e: &Expr, f: &mut impl FnMut(&Expr)) {
        f(e);
        match &e.kind {
            ExprKind::Lit { .. } | ExprKind::Var(_) | ExprKind::None(_) => {}
            ExprKind::Binary { lhs, rhs, .. } => {
                expr(lhs, f);
                expr(rhs, f);
            }
            ExprKind::Unary { operand: x, .. }
            | ExprKind::AsDyn { value: x, .. }
            | ExprKind::Cast { value: x, .. }
            | ExprKind::Some(x)
            | ExprKind::Field { base: x, .. } => expr(x, f),
            ExprKind::Call { args: xs, .. }
            | ExprKind::Array(xs)
            | ExprKind::Tuple(xs)
            | ExprKind::Variant { payload: xs, .. }
            | ExprKind::Set { elems: xs, .. }
            | ExprKind::Intrinsic { args: xs, .. }
            | ExprKind::Sample { params: xs, .. } => xs.iter().for_each(|x| expr(x, f)),
            ExprKind::MethodCall { receiver, args, .. } => {
                expr(receiver, f);
                args.iter().for_each(|x| expr(x, f));
            }
            ExprKind::Record { fields, .. } => fields.iter().for_each(|(_, x)| expr(x, f)),
            ExprKind::Map { entries, .. } => entries.iter().for_each(|(k, v)| {
                expr(k, f);
                expr(v, f);
            }),
            ExprKind::Index { base, index } => {
                expr(base, f);
                expr(index, f);
            }
        }
    }
    for s in stmts {
        match &s.kind {
            StmtKind::Let { value: e, .. } | StmtKind::Assign { value: e, .. } | StmtKind::Expr(e) => {
                expr(e, f)
            }
            StmtKind::Return(e) => {
                if let Some(e) = e {
                    expr(e, f);
                }
            }
            StmtKind::If {
                cond,
                then_body,
                else_body,
            } => {
                expr(cond, f);
                visit_exprs(then_body, f);
                visit_exprs(else_body, f);
            }
            StmtKind::While { cond, body } => {
                expr(cond, f);
                visit_exprs(body, f);
            }
            StmtKind::For { start, end, body, .. } => {
                expr(start, f);
                expr(end, f);
                visit_exprs(body, f);
            }
            StmtKind::Match { scrutinee, arms } => {
                expr(scrutinee, f);
                for a in arms {
                    visit_exprs(&a.body, f);
                }
            }
            StmtKind::Observe { params, value, .. } => {
                params.iter().for_each(|x| expr(x, f));
                expr(value, f);
            }
            StmtKind::Break | StmtKind::Continue => {}
        }
    }
}

// ── Engine ──────────────────────────────────────────────────────────────────

#[derive(Default)]
struct Tables {
    expr_types: HashMap<ExprId, Type>,
    coercions: HashMap<ExprId, Coercion>,
    call_type_args: HashMap<ExprId, Vec<Type>>,
    methods: HashMap<ExprId, MethodTarget>,
    arms: HashMap<Span, ArmInfo>,
    binding_types: HashMap<Span, Type>,
}

/// Per-function context.
struct FnCtx {
    type_params: Vec<String>,
    bounds: HashMap<String, Vec<String>>,
    returns: Type,
    /// One entry per enclosing loop: whether a `break` targets it.
    loops: Vec<bool>,
}

impl Default for FnCtx {
    fn default() -> Self {
        FnCtx {
            type_params: Vec::new(),
            bounds: HashMap::new(),
            returns: Type::Unit,
            loops: Vec::new(),
        }
    }
}

pub(crate) struct Checker<'a> {
    decls: &'a Decls,
    registry: &'a Registry,
    options: CheckOptions,
    tables: Tables,
    diagnostics: Vec<Diagnostic>,
    scopes: Scopes<Binding>,
    ctx: FnCtx,
}

impl<'a> Checker<'a> {
    fn new(
        decls: &'a Decls,
        registry: &'a Registry,
        options: CheckOptions,
        diagnostics: Vec<Diagnostic>,
    ) -> Self {
        Checker {
            decls,
            registry,
            options,
            tables: Tables::default(),
            diagnostics,
            scopes: Scopes::new(),
            ctx: FnCtx::default(),
        }
    }

    // ── Diagnostics ──

    fn error(&mut self, code: DiagCode, span: &Span, msg: impl Into<String>) {
        self.diagnostics
            .push(Diagnostic::error(Phase::Type, span.clone(), msg).with_code(code));
    }

    fn warn(&mut self, code: DiagCode, span: &Span, msg: impl Into<String>) {
        self.diagnostics
            .push(Diagnostic::warning(Phase::Type, span.clone(), msg).with_code(code));
    }

    fn mismatch(&mut self, span: &Span, expected: &Type, found: &Type) {
        let d = Diagnostic::error(
            Phase::Type,
            span.clone(),
            format!("type mismatch: expected {expected}, found {found}"),
        )
        .with_code(codes::E0200);
        let d = match (expected, found) {
            (e, f) if e.is_numeric() && f.is_numeric() => d.with_hint(format!("use an explicit cast to {e}")),
            (Type::Dyn(i), _) => d.with_hint(format!("wrap the value with as_dyn '{i}'")),
            (Type::Optional(_), _) => d.with_hint("wrap the value with 'some'"),
            _ => d,
        };
        self.diagnostics.push(d);
    }

    // ── Type helpers ──

    fn resolve(&mut self, ty: &Type, span: &Span) -> Option<Type> {
        resolve_type(self.decls, ty, &self.ctx.type_params, span, &mut self.diagnostics)
    }

    /// Accept `found` where `expected` is required, recording any implicit
    /// conversion on `id`. Reports E0200 on failure.
    fn coerce(&mut self, id: ExprId, span: &Span, found: &Type, expected: &Type) -> bool {
        if found == expected {
            return true;
        }
        if can_widen(found, expected, self.options.widening) {
            if found.is_numeric() {
                self.tables.coercions.insert(
                    id,
                    Coercion::Widen {
                        from: found.clone(),
                        to: expected.clone(),
                    },
                );
            }
            return true;
        }
        if let Type::Union(members) = expected {
            if let Some(tag) = members.iter().position(|m| m == found) {
                self.tables.coercions.insert(
                    id,
                    Coercion::Inject {
                        tag: tag as u32,
                        union: expected.clone(),
                    },
                );
                return true;
            }
        }
        self.mismatch(span, expected, found);
        false
    }

    /// Check `e` against `expected`, applying implicit conversions.
    fn expect(&mut self, e: &Expr, expected: &Type) -> Option<Type> {
        let found = self.expr(e, Some(expected))?;
        if self.coerce(e.id, &e.span, &found, expected) {
            Some(expected.clone())
        } else {
            None
        }
    }

    fn record(&mut self, id: ExprId, ty: Type) -> Option<Type> {
        self.tables.expr_types.insert(id, ty.clone());
        Some(ty)
    }

    /// Type an untyped literal from context: same category and in range,
    /// else `i64` / `f64`.
    fn literal_type(value: &Literal, declared: Option<&Type>, expected: Option<&Type>) -> Type {
        if let Some(t) = declared {
            return t.clone();
        }
        match (value, expected) {
            (Literal::Int(i), Some(Type::Int(t))) if t.fits(*i) => Type::Int(*t),
            (Literal::Int(i), _) => {
                if sirs_runtime::ops::IntTy::I64.fits(*i) {
                    crate::types::I64
                } else {
                    Type::Int(sirs_runtime::ops::IntTy::U64)
                }
            }
            (Literal::Float(_), Some(Type::Float(t))) => Type::Float(*t),
            (Literal::Float(_), _) => crate::types::F64,
            (Literal::Bool(_), _) => Type::Bool,
            (Literal::Str(_), _) => Type::Str,
            (Literal::Unit, _) => Type::Unit,
        }
    }

    // ── Functions ──

    fn check_function(&mut self, f: &crate::ast::Function) {
        let Some(sig) = self.decls.functions.get(&f.name) else {
            return;
        };
        if sig.span != f.span {
            // Duplicate definition, already reported.
            return;
        }
        self.ctx = FnCtx {
            type_params: f.type_params.iter().map(|p| p.name.clone()).collect(),
            bounds: f
                .type_params
                .iter()
                .map(|p| (p.name.clone(), p.bounds.clone()))
                .collect(),
            returns: sig.returns.clone(),
            loops: Vec::new(),
        };
        self.scopes = Scopes::new();
        let mut names = std::collections::HashSet::new();
        for (p, ty) in f.params.iter().zip(sig.params.iter()) {
            if !names.insert(p.name.as_str()) {
                self.error(codes::E0202, &p.span, format!("duplicate parameter '{}'", p.name));
            }
            if p.constraint.is_some() && !matches!(ty, Type::Float(_)) {
                self.error(
                    codes::E0200,
                    &p.span.child("constraint"),
                    format!("parameter constraints apply to float parameters, found {ty}"),
                );
            }
            self.scopes.define(
                p.name.clone(),
                Binding {
                    ty: ty.clone(),
                    mutable: p.mutable,
                    origin: Origin::Param,
                },
            );
        }
        let falls_through = self.block(&f.body);
        if falls_through && sig.returns != Type::Unit {
            self.diagnostics.push(
                Diagnostic::error(
                    Phase::Type,
                    f.span.clone(),
                    format!("function '{}' may reach its end without returning {}", f.name, sig.returns),
                )
                .with_code(codes::E0207)
                .with_hint("add a return statement on every path"),
            );
        }
    }
}

#[cfg(test)]
mod tests;
