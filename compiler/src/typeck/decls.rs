// decls.rs — Declaration tables
//
// Collects records, enums, interfaces, impls and function signatures into
// lookup tables, resolving every type written in a declaration. Shared by the
// checker, lowering, and the JSON value bridge.
//
// Failure modes: duplicate names (E0202), unknown types (E0201), malformed
//   impls (E0209).

use std::collections::{BTreeMap, HashSet};

use crate::ast::{Program, Span, TypeBody, TypeParam};
use crate::diag::{codes, Diagnostic, Phase};
use crate::types::Type;

pub const BUILTIN_BOUNDS: [&str; 3] = ["Num", "Ord", "Eq"];

#[derive(Debug, Clone, PartialEq)]
pub struct RecordInfo {
    pub type_params: Vec<String>,
    pub fields: Vec<(String, Type)>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnumInfo {
    pub type_params: Vec<String>,
    pub variants: Vec<(String, Vec<Type>)>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InterfaceInfo {
    pub methods: Vec<MethodInfo>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MethodInfo {
    pub name: String,
    pub params: Vec<Type>,
    pub returns: Type,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImplInfo {
    pub interface: String,
    pub for_type: Type,
    /// Method name to implementing function.
    pub methods: BTreeMap<String, String>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FnSig {
    pub type_params: Vec<TypeParam>,
    pub params: Vec<Type>,
    pub returns: Type,
    pub span: Span,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Decls {
    pub records: BTreeMap<String, RecordInfo>,
    pub enums: BTreeMap<String, EnumInfo>,
    pub interfaces: BTreeMap<String, InterfaceInfo>,
    pub impls: Vec<ImplInfo>,
    pub functions: BTreeMap<String, FnSig>,
}

fn subst_for(params: &[String], args: &[Type]) -> std::collections::HashMap<String, Type> {
    params.iter().cloned().zip(args.iter().cloned()).collect()
}

impl Decls {
    pub fn is_record(&self, ty: &Type) -> bool {
        matches!(ty, Type::Named { name, .. } if self.records.contains_key(name))
    }

    pub fn is_enum(&self, ty: &Type) -> bool {
        matches!(ty, Type::Named { name, .. } if self.enums.contains_key(name))
    }

    /// Fields of a record type with its type arguments substituted.
    pub fn record_fields(&self, ty: &Type) -> Option<Vec<(String, Type)>> {
        let Type::Named { name, args } = ty else {
            return None;
        };
        let info = self.records.get(name)?;
        let subst = subst_for(&info.type_params, args);
        Some(
            info.fields
                .iter()
                .map(|(n, t)| (n.clone(), t.substitute(&subst)))
                .collect(),
        )
    }

    /// Position and type of a record field.
    pub fn field(&self, ty: &Type, field: &str) -> Option<(usize, Type)> {
        self.record_fields(ty)?
            .into_iter()
            .enumerate()
            .find(|(_, (n, _))| n == field)
            .map(|(i, (_, t))| (i, t))
    }

    /// Variants of an enum type with its type arguments substituted.
    pub fn enum_variants(&self, ty: &Type) -> Option<Vec<(String, Vec<Type>)>> {
        let Type::Named { name, args } = ty else {
            return None;
        };
        let info = self.enums.get(name)?;
        let subst = subst_for(&info.type_params, args);
        Some(
            info.variants
                .iter()
                .map(|(n, ps)| (n.clone(), ps.iter().map(|t| t.substitute(&subst)).collect()))
                .collect(),
        )
    }

    /// Tag and payload types of an enum variant.
    pub fn variant(&self, ty: &Type, variant: &str) -> Option<(u32, Vec<Type>)> {
        self.enum_variants(ty)?
            .into_iter()
            .enumerate()
            .find(|(_, (n, _))| n == variant)
            .map(|(i, (_, p))| (i as u32, p))
    }

    pub fn find_impl(&self, interface: &str, ty: &Type) -> Option<&ImplInfo> {
        self.impls
            .iter()
            .find(|i| i.interface == interface && &i.for_type == ty)
    }

    /// Implementing function of `method` for a concrete receiver type. Errs
    /// with the candidate interfaces when the method is ambiguous.
    pub fn static_method(&self, ty: &Type, method: &str) -> Result<Option<(&str, &str)>, Vec<String>> {
        let hits: Vec<&ImplInfo> = self
            .impls
            .iter()
            .filter(|i| &i.for_type == ty && i.methods.contains_key(method))
            .collect();
        match hits.as_slice() {
            [] => Ok(None),
            [one] => Ok(one
                .methods
                .get(method)
                .map(|f| (one.interface.as_str(), f.as_str()))),
            many => Err(many.iter().map(|i| i.interface.clone()).collect()),
        }
    }

    pub fn interface_method(&self, interface: &str, method: &str) -> Option<(usize, &MethodInfo)> {
        self.interfaces
            .get(interface)?
            .methods
            .iter()
            .enumerate()
            .find(|(_, m)| m.name == method)
    }
}

// ── Collection ──────────────────────────────────────────────────────────────

pub(crate) struct Collector<'a> {
    pub decls: Decls,
    pub diagnostics: &'a mut Vec<Diagnostic>,
}

impl<'a> Collector<'a> {
    fn error(&mut self, code: crate::diag::DiagCode, span: Span, msg: impl Into<String>) {
        self.diagnostics
            .push(Diagnostic::error(Phase::Type, span, msg).with_code(code));
    }

    pub fn collect(program: &Program, diagnostics: &'a mut Vec<Diagnostic>) -> Decls {
        let mut c = Collector {
            decls: Decls::default(),
            diagnostics,
        };
        c.register_names(program);
        c.resolve_bodies(program);
        c.collect_impls(program);
        c.decls
    }

    /// First pass: names only, so declarations may refer to each other.
    fn register_names(&mut self, program: &Program) {
        let mut seen = HashSet::new();
        for t in &program.types {
            if !seen.insert(t.name.clone()) || Type::primitive(&t.name).is_some() {
                self.error(codes::E0202, t.span.clone(), format!("duplicate type '{}'", t.name));
                continue;
            }
            match &t.body {
                TypeBody::Record(_) => {
                    self.decls.records.insert(
                        t.name.clone(),
                        RecordInfo {
                            type_params: t.type_params.clone(),
                            fields: Vec::new(),
                            span: t.span.clone(),
                        },
                    );
                }
                TypeBody::Enum(_) => {
                    self.decls.enums.insert(
                        t.name.clone(),
                        EnumInfo {
                            type_params: t.type_params.clone(),
                            variants: Vec::new(),
                            span: t.span.clone(),
                        },
                    );
                }
            }
        }
        for i in &program.interfaces {
            if BUILTIN_BOUNDS.contains(&i.name.as_str())
                || self.decls.interfaces.contains_key(&i.name)
            {
                self.error(codes::E0202, i.span.clone(), format!("duplicate interface '{}'", i.name));
                continue;
            }
            self.decls.interfaces.insert(
                i.name.clone(),
                InterfaceInfo {
                    methods: Vec::new(),
                    span: i.span.clone(),
                },
            );
        }
        for f in &program.functions {
            if self.decls.functions.contains_key(&f.name) {
                self.error(codes::E0202, f.span.clone(), format!("duplicate function '{}'", f.name));
                continue;
            }
            self.decls.functions.insert(
                f.name.clone(),
                FnSig {
                    type_params: f.type_params.clone(),
                    params: Vec::new(),
                    returns: Type::Unit,
                    span: f.span.clone(),
                },
            );
        }
    }

    fn resolve_bodies(&mut self, program: &Program) {
        for t in &program.types {
            let tparams = t.type_params.clone();
            let span = t.span.clone();
            match &t.body {
                TypeBody::Record(fields) => {
                    let mut names = HashSet::new();
                    let mut out = Vec::new();
                    for (fi, f) in fields.iter().enumerate() {
                        let fspan = span.child("record").child("fields").index(fi);
                        if !names.insert(f.name.clone()) {
                            self.error(codes::E0202, fspan.clone(), format!("duplicate field '{}'", f.name));
                        }
                        if let Some(ty) = resolve_type(&self.decls, &f.ty, &tparams, &fspan, self.diagnostics) {
                            out.push((f.name.clone(), ty));
                        }
                    }
                    if let Some(r) = self.decls.records.get_mut(&t.name) {
                        if r.span == span {
                            r.fields = out;
                        }
                    }
                }
                TypeBody::Enum(variants) => {
                    let mut names = HashSet::new();
                    let mut out = Vec::new();
                    for (vi, v) in variants.iter().enumerate() {
                        let vspan = span.child("enum").child("variants").index(vi);
                        if !names.insert(v.name.clone()) {
                            self.error(codes::E0202, vspan.clone(), format!("duplicate variant '{}'", v.name));
                        }
                        let payload: Vec<Type> = v
                            .payload
                            .iter()
                            .filter_map(|p| resolve_type(&self.decls, p, &tparams, &vspan, self.diagnostics))
                            .collect();
                        out.push((v.name.clone(), payload));
                    }
                    if let Some(e) = self.decls.enums.get_mut(&t.name) {
                        if e.span == span {
                            e.variants = out;
                        }
                    }
                }
            }
        }

        for i in &program.interfaces {
            let mut names = HashSet::new();
            let mut methods = Vec::new();
            for (mi, m) in i.methods.iter().enumerate() {
                let mspan = i.span.child("methods").index(mi);
                if !names.insert(m.name.clone()) {
                    self.error(codes::E0202, mspan.clone(), format!("duplicate method '{}'", m.name));
                    continue;
                }
                let params: Option<Vec<Type>> = m
                    .params
                    .iter()
                    .map(|p| resolve_type(&self.decls, p, &[], &mspan, self.diagnostics))
                    .collect();
                let returns = resolve_type(&self.decls, &m.returns, &[], &mspan, self.diagnostics);
                if let (Some(params), Some(returns)) = (params, returns) {
                    methods.push(MethodInfo {
                        name: m.name.clone(),
                        params,
                        returns,
                    });
                }
            }
            if let Some(info) = self.decls.interfaces.get_mut(&i.name) {
                if info.span == i.span {
                    info.methods = methods;
                }
            }
        }

        for f in &program.functions {
            let mut tparams = Vec::new();
            for (ti, tp) in f.type_params.iter().enumerate() {
                let tspan = f.span.child("type_params").index(ti);
                if tparams.contains(&tp.name) {
                    self.error(codes::E0202, tspan.clone(), format!("duplicate type parameter '{}'", tp.name));
                }
                for b in &tp.bounds {
                    if !BUILTIN_BOUNDS.contains(&b.as_str()) && !self.decls.interfaces.contains_key(b) {
                        self.error(codes::E0201, tspan.clone(), format!("unknown bound '{b}'"));
                    }
                }
                tparams.push(tp.name.clone());
            }
            let params: Vec<Type> = f
                .params
                .iter()
                .map(|p| {
                    resolve_type(&self.decls, &p.ty, &tparams, &p.span, self.diagnostics)
                        .unwrap_or(Type::Unit)
                })
                .collect();
            let returns = resolve_type(&self.decls, &f.returns, &tparams, &f.span.child("returns"), self.diagnostics)
                .unwrap_or(Type::Unit);
            if let Some(sig) = self.decls.functions.get_mut(&f.name) {
                if sig.span == f.span {
                    sig.params = params;
                    sig.returns = returns;
                }
            }
        }
    }

    fn collect_impls(&mut self, program: &Program) {
        for imp in &program.impls {
            let span = imp.span.clone();
            let Some(for_type) = resolve_type(&self.decls, &imp.for_type, &[], &span.child("for"), self.diagnostics) else {
                continue;
            };
            if matches!(for_type, Type::Dyn(_)) {
                self.error(codes::E0209, span.child("for"), "cannot implement an interface for a dyn type");
                continue;
            }
            let Some(iface) = self.decls.interfaces.get(&imp.interface).cloned() else {
                self.error(codes::E0201, span.child("interface"), format!("unknown interface '{}'", imp.interface));
                continue;
            };
            if self.decls.find_impl(&imp.interface, &for_type).is_some() {
                self.error(
                    codes::E0202,
                    span.clone(),
                    format!("duplicate impl of '{}' for {}", imp.interface, for_type),
                );
                continue;
            }
            let mut ok = true;
            let methods: BTreeMap<String, String> = imp.methods.iter().cloned().collect();
            for m in &iface.methods {
                if !methods.contains_key(&m.name) {
                    ok = false;
                    self.error(
                        codes::E0209,
                        span.clone(),
                        format!("impl of '{}' for {} is missing method '{}'", imp.interface, for_type, m.name),
                    );
                }
            }
            for (method, func) in &methods {
                let mspan = span.child("methods").child(method);
                let Some(m) = iface.methods.iter().find(|m| &m.name == method) else {
                    ok = false;
                    self.error(codes::E0209, mspan, format!("'{method}' is not a method of '{}'", imp.interface));
                    continue;
                };
                let Some(sig) = self.decls.functions.get(func) else {
                    ok = false;
                    self.error(codes::E0201, mspan, format!("unknown function '{func}'"));
                    continue;
                };
                let mut expected = vec![for_type.clone()];
                expected.extend(m.params.iter().cloned());
                if !sig.type_params.is_empty() || sig.params != expected || sig.returns != m.returns {
                    ok = false;
                    let want = expected.iter().map(|t| t.to_string()).collect::<Vec<_>>().join(", ");
                    self.error(
                        codes::E0209,
                        mspan,
                        format!(
                            "function '{func}' does not match '{}.{method}': expected ({want}) -> {}",
                            imp.interface, m.returns
                        ),
                    );
                }
            }
            if ok {
                self.decls.impls.push(ImplInfo {
                    interface: imp.interface.clone(),
                    for_type,
                    methods,
                    span,
                });
            }
        }
    }
}

// ── Type resolution ─────────────────────────────────────────────────────────

fn unknown(span: &Span, diagnostics: &mut Vec<Diagnostic>, msg: String) -> Option<Type> {
    diagnostics.push(Diagnostic::error(Phase::Type, span.clone(), msg).with_code(codes::E0201));
    None
}

/// Validate a written type against the declarations. A bare name that is a
/// type parameter in scope becomes `Param`.
pub fn resolve_type(
    decls: &Decls,
    ty: &Type,
    type_params: &[String],
    span: &Span,
    diagnostics: &mut Vec<Diagnostic>,
) -> Option<Type> {
    let go = |t: &Type, d: &mut Vec<Diagnostic>| resolve_type(decls, t, type_params, span, d);
    match ty {
        Type::Int(_) | Type::Float(_) | Type::Bool | Type::Str | Type::Unit => Some(ty.clone()),
        Type::Array(e, n) => Some(Type::Array(Box::new(go(e, diagnostics)?), *n)),
        Type::Slice(e) => Some(Type::Slice(Box::new(go(e, diagnostics)?))),
        Type::Set(e) => Some(Type::Set(Box::new(go(e, diagnostics)?))),
        Type::Optional(e) => Some(Type::Optional(Box::new(go(e, diagnostics)?))),
        Type::Map(k, v) => {
            let k = go(k, diagnostics);
            let v = go(v, diagnostics);
            Some(Type::Map(Box::new(k?), Box::new(v?)))
        }
        Type::Tuple(ts) => {
            let ts: Vec<Option<Type>> = ts.iter().map(|t| go(t, diagnostics)).collect();
            Some(Type::Tuple(ts.into_iter().collect::<Option<Vec<_>>>()?))
        }
        Type::Union(ts) => {
            let ts: Vec<Option<Type>> = ts.iter().map(|t| go(t, diagnostics)).collect();
            let mut members = ts.into_iter().collect::<Option<Vec<_>>>()?;
            if !members.iter().all(Type::is_concrete) {
                diagnostics.push(
                    Diagnostic::error(Phase::Type, span.clone(), "union members must be concrete types")
                        .with_code(codes::E0200),
                );
                return None;
            }
            members.sort();
            members.dedup();
            Some(Type::Union(members))
        }
        Type::Param(p) => {
            if type_params.contains(p) {
                Some(ty.clone())
            } else {
                unknown(span, diagnostics, format!("unknown type parameter '{p}'"))
            }
        }
        Type::Dyn(i) => {
            if decls.interfaces.contains_key(i) {
                Some(ty.clone())
            } else {
                unknown(span, diagnostics, format!("unknown interface '{i}'"))
            }
        }
        Type::Named { name, args } => {
            if args.is_empty() && type_params.contains(name) {
                return Some(Type::Param(name.clone()));
            }
            let arity = decls
                .records
                .get(name)
                .map(|r| r.type_params.len())
                .or_else(|| decls.enums.get(name).map(|e| e.type_params.len()));
            let resolved: Vec<Option<Type>> = args.iter().map(|t| go(t, diagnostics)).collect();
            match arity {
                None => unknown(span, diagnostics, format!("unknown type '{name}'")),
                Some(n) if n != args.len() => unknown(
                    span,
                    diagnostics,
                    format!("type '{name}' expects {n} type argument(s), got {}", args.len()),
                ),
                Some(_) => Some(Type::Named {
                    name: name.clone(),
                    args: resolved.into_iter().collect::<Option<Vec<_>>>()?,
                }),
            }
        }
    }
}
