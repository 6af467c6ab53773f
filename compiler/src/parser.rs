// Parser for SIRS structured-IR documents.
//
// Walks a `serde_json::Value` into the AST, validating the document shape
// on the way. Structural errors are accumulated with JSON-pointer spans so
// one run reports every malformed node.
//
// Preconditions: none; any JSON text is accepted as input.
// Postconditions: `program` is Some iff no structural error was recorded.
//   Expression ids are allocated in document (pre-order) order.
// Failure modes: malformed JSON (E0100), missing fields (E0101), wrong
//   shapes (E0102), unknown keys or kinds (E0103), literals that do not fit
//   their declared type (E0104), unsupported version (E0105).
// Side effects: none.

use serde_json::{Map, Value};
use thiserror::Error;

use crate::ast::*;
use crate::diag::{codes, DiagCode, Diagnostic, Phase};
use crate::id::IdAllocator;
use crate::types::Type;
use sirs_runtime::ops::FloatTy;

pub const SCHEMA_VERSION: u64 = 1;

/// Result of parsing: AST plus any structural diagnostics.
#[derive(Debug)]
pub struct ParseResult {
    pub program: Option<Program>,
    pub diagnostics: Vec<Diagnostic>,
}

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("malformed JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{} structural error(s)", .0.len())]
    Structural(Vec<Diagnostic>),
}

impl ParseError {
    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        match self {
            ParseError::Json(e) => vec![Diagnostic::error(
                Phase::Structural,
                Span::root(),
                format!("malformed JSON: {e}"),
            )
            .with_code(codes::E0100)],
            ParseError::Structural(d) => d.clone(),
        }
    }
}

/// Parse SIRS JSON text.
pub fn parse(source: &str) -> ParseResult {
    match serde_json::from_str::<Value>(source) {
        Ok(doc) => parse_value(&doc),
        Err(e) => ParseResult {
            program: None,
            diagnostics: ParseError::Json(e).diagnostics(),
        },
    }
}

/// Parse an already-decoded document.
pub fn parse_value(doc: &Value) -> ParseResult {
    let mut p = Parser {
        diagnostics: Vec::new(),
        ids: IdAllocator::new(),
    };
    let program = p.program(doc);
    if p.diagnostics.is_empty() {
        ParseResult {
            program,
            diagnostics: Vec::new(),
        }
    } else {
        ParseResult {
            program: None,
            diagnostics: p.diagnostics,
        }
    }
}

/// Parse into a `Result`, for callers that do not need partial output.
pub fn parse_program(source: &str) -> Result<Program, ParseError> {
    let doc: Value = serde_json::from_str(source)?;
    let result = parse_value(&doc);
    match result.program {
        Some(p) => Ok(p),
        None => Err(ParseError::Structural(result.diagnostics)),
    }
}

struct Parser {
    diagnostics: Vec<Diagnostic>,
    ids: IdAllocator,
}

fn describe(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

impl Parser {
    fn error(&mut self, code: DiagCode, span: Span, msg: impl Into<String>) {
        self.diagnostics
            .push(Diagnostic::error(Phase::Structural, span, msg).with_code(code));
    }

    // ── Shape helpers ──

    fn object<'v>(&mut self, v: &'v Value, span: &Span, what: &str) -> Option<&'v Map<String, Value>> {
        match v {
            Value::Object(m) => Some(m),
            other => {
                self.error(
                    codes::E0102,
                    span.clone(),
                    format!("expected {what} object, found {}", describe(other)),
                );
                None
            }
        }
    }

    fn check_keys(&mut self, obj: &Map<String, Value>, allowed: &[&str], span: &Span, what: &str) {
        for key in obj.keys() {
            if !allowed.contains(&key.as_str()) {
                self.error(
                    codes::E0103,
                    span.child(key),
                    format!("unknown key '{key}' in {what}"),
                );
            }
        }
    }

    fn field<'v>(&mut self, obj: &'v Map<String, Value>, key: &str, span: &Span, what: &str) -> Option<&'v Value> {
        let v = obj.get(key);
        if v.is_none() {
            self.error(
                codes::E0101,
                span.clone(),
                format!("{what} is missing required field '{key}'"),
            );
        }
        v
    }

    fn string(&mut self, v: &Value, span: &Span) -> Option<String> {
        match v {
            Value::String(s) => Some(s.clone()),
            other => {
                self.error(
                    codes::E0102,
                    span.clone(),
                    format!("expected string, found {}", describe(other)),
                );
                None
            }
        }
    }

    fn string_field(&mut self, obj: &Map<String, Value>, key: &str, span: &Span, what: &str) -> Option<String> {
        let v = self.field(obj, key, span, what)?;
        self.string(v, &span.child(key))
    }

    fn array<'v>(&mut self, v: &'v Value, span: &Span) -> Option<&'v Vec<Value>> {
        match v {
            Value::Array(a) => Some(a),
            other => {
                self.error(
                    codes::E0102,
                    span.clone(),
                    format!("expected array, found {}", describe(other)),
                );
                None
            }
        }
    }

    fn bool_field(&mut self, obj: &Map<String, Value>, key: &str, span: &Span) -> bool {
        match obj.get(key) {
            None => false,
            Some(Value::Bool(b)) => *b,
            Some(other) => {
                self.error(
                    codes::E0102,
                    span.child(key),
                    format!("expected boolean, found {}", describe(other)),
                );
                false
            }
        }
    }

    /// Parse every element of an array, keeping the ones that parse.
    fn list<T>(&mut self, v: &Value, span: &Span, mut item: impl FnMut(&mut Self, &Value, &Span) -> Option<T>) -> Option<Vec<T>> {
        let items = self.array(v, span)?;
        let mut out = Vec::with_capacity(items.len());
        let mut ok = true;
        for (i, elem) in items.iter().enumerate() {
            match item(self, elem, &span.index(i)) {
                Some(x) => out.push(x),
                None => ok = false,
            }
        }
        ok.then_some(out)
    }

    fn opt_list<T>(&mut self, obj: &Map<String, Value>, key: &str, span: &Span, item: impl FnMut(&mut Self, &Value, &Span) -> Option<T>) -> Option<Vec<T>> {
        match obj.get(key) {
            None => Some(Vec::new()),
            Some(v) => self.list(v, &span.child(key), item),
        }
    }

    fn strings(&mut self, v: &Value, span: &Span) -> Option<Vec<String>> {
        self.list(v, span, |p, v, s| p.string(v, s))
    }

    // ── Program ──

    fn program(&mut self, doc: &Value) -> Option<Program> {
        let root = Span::root();
        let obj = self.object(doc, &root, "program")?;
        self.check_keys(obj, &["version", "types", "interfaces", "impls", "functions"], &root, "program");
        if let Some(v) = obj.get("version") {
            if v.as_u64() != Some(SCHEMA_VERSION) {
                self.error(
                    codes::E0105,
                    root.child("version"),
                    format!("unsupported schema version {v}; expected {SCHEMA_VERSION}"),
                );
            }
        }
        let types = self.opt_list(obj, "types", &root, Self::type_decl);
        let interfaces = self.opt_list(obj, "interfaces", &root, Self::interface_decl);
        let impls = self.opt_list(obj, "impls", &root, Self::impl_decl);
        let functions = match self.field(obj, "functions", &root, "program") {
            Some(v) => self.list(v, &root.child("functions"), Self::function),
            None => None,
        };
        Some(Program {
            types: types?,
            interfaces: interfaces?,
            impls: impls?,
            functions: functions?,
        })
    }

    /// `type_params` entries are `{name, bounds?}` objects or bare names.
    fn type_params(&mut self, obj: &Map<String, Value>, span: &Span) -> Option<Vec<TypeParam>> {
        self.opt_list(obj, "type_params", span, |p, v, s| {
            if let Value::String(name) = v {
                return Some(TypeParam {
                    name: name.clone(),
                    bounds: Vec::new(),
                });
            }
            let o = p.object(v, s, "type parameter")?;
            p.check_keys(o, &["name", "bounds"], s, "type parameter");
            let name = p.string_field(o, "name", s, "type parameter");
            let bounds = match o.get("bounds") {
                Some(b) => p.strings(b, &s.child("bounds")),
                None => Some(Vec::new()),
            };
            Some(TypeParam {
                name: name?,
                bounds: bounds?,
            })
        })
    }

    fn function(&mut self, v: &Value, span: &Span) -> Option<Function> {
        let obj = self.object(v, span, "function")?;
        self.check_keys(obj, &["name", "type_params", "params", "returns", "body"], span, "function");
        let name = self.string_field(obj, "name", span, "function");
        let type_params = self.type_params(obj, span);
        let params = match self.field(obj, "params", span, "function") {
            Some(v) => self.list(v, &span.child("params"), Self::param),
            None => None,
        };
        let returns = match obj.get("returns") {
            Some(v) => self.ty(v, &span.child("returns")),
            None => Some(Type::Unit),
        };
        let body = match self.field(obj, "body", span, "function") {
            Some(v) => self.block(v, &span.child("body")),
            None => None,
        };
        Some(Function {
            name: name?,
            type_params: type_params?,
            params: params?,
            returns: returns?,
            body: body?,
            span: span.clone(),
        })
    }

    fn param(&mut self, v: &Value, span: &Span) -> Option<Param> {
        let obj = self.object(v, span, "parameter")?;
        self.check_keys(obj, &["name", "type", "mutable", "constraint"], span, "parameter");
        let name = self.string_field(obj, "name", span, "parameter");
        let ty = match self.field(obj, "type", span, "parameter") {
            Some(t) => self.ty(t, &span.child("type")),
            None => None,
        };
        let mutable = self.bool_field(obj, "mutable", span);
        let constraint = match obj.get("constraint") {
            None => None,
            Some(c) => Some(self.param_constraint(c, &span.child("constraint"))?),
        };
        Some(Param {
            name: name?,
            ty: ty?,
            mutable,
            constraint,
            span: span.clone(),
        })
    }

    fn param_constraint(&mut self, v: &Value, span: &Span) -> Option<ParamConstraint> {
        match v {
            Value::String(s) => match s.as_str() {
                "real" => Some(ParamConstraint::Real),
                "positive" => Some(ParamConstraint::Positive),
                "unit_interval" => Some(ParamConstraint::UnitInterval),
                other => {
                    self.error(codes::E0103, span.clone(), format!("unknown constraint '{other}'"));
                    None
                }
            },
            Value::Object(o) => {
                self.check_keys(o, &["interval"], span, "constraint");
                let bounds = self.field(o, "interval", span, "constraint")?;
                let pair = bounds
                    .as_array()
                    .filter(|a| a.len() == 2)
                    .and_then(|a| Some((a[0].as_f64()?, a[1].as_f64()?)));
                match pair {
                    Some((lo, hi)) => Some(ParamConstraint::Interval(lo, hi)),
                    None => {
                        self.error(
                            codes::E0102,
                            span.child("interval"),
                            "interval must be a [lo, hi] pair of numbers",
                        );
                        None
                    }
                }
            }
            other => {
                self.error(
                    codes::E0102,
                    span.clone(),
                    format!("expected constraint, found {}", describe(other)),
                );
                None
            }
        }
    }

    fn type_decl(&mut self, v: &Value, span: &Span) -> Option<TypeDecl> {
        let obj = self.object(v, span, "type declaration")?;
        self.check_keys(obj, &["name", "type_params", "record", "enum"], span, "type declaration");
        let name = self.string_field(obj, "name", span, "type declaration");
        let type_params = self.type_params(obj, span).and_then(|tps| {
            if tps.iter().any(|tp| !tp.bounds.is_empty()) {
                self.error(
                    codes::E0102,
                    span.child("type_params"),
                    "type declaration parameters take no bounds",
                );
                return None;
            }
            Some(tps.into_iter().map(|tp| tp.name).collect::<Vec<_>>())
        });
        let body = match (obj.get("record"), obj.get("enum")) {
            (Some(r), None) => self.record_body(r, &span.child("record")),
            (None, Some(e)) => self.enum_body(e, &span.child("enum")),
            _ => {
                self.error(
                    codes::E0102,
                    span.clone(),
                    "type declaration needs exactly one of 'record' or 'enum'",
                );
                None
            }
        };
        Some(TypeDecl {
            name: name?,
            type_params: type_params?,
            body: body?,
            span: span.clone(),
        })
    }

    fn record_body(&mut self, v: &Value, span: &Span) -> Option<TypeBody> {
        let obj = self.object(v, span, "record")?;
        self.check_keys(obj, &["fields"], span, "record");
        let fields = self.field(obj, "fields", span, "record")?;
        let fields = self.list(fields, &span.child("fields"), |p, v, s| {
            let o = p.object(v, s, "field")?;
            p.check_keys(o, &["name", "type"], s, "field");
            let name = p.string_field(o, "name", s, "field");
            let ty = match p.field(o, "type", s, "field") {
                Some(t) => p.ty(t, &s.child("type")),
                None => None,
            };
            Some(FieldDecl { name: name?, ty: ty? })
        })?;
        Some(TypeBody::Record(fields))
    }

    fn enum_body(&mut self, v: &Value, span: &Span) -> Option<TypeBody> {
        let obj = self.object(v, span, "enum")?;
        self.check_keys(obj, &["variants"], span, "enum");
        let variants = self.field(obj, "variants", span, "enum")?;
        let variants = self.list(variants, &span.child("variants"), |p, v, s| {
            let o = p.object(v, s, "variant")?;
            p.check_keys(o, &["name", "payload"], s, "variant");
            let name = p.string_field(o, "name", s, "variant");
            let payload = p.opt_list(o, "payload", s, Self::ty);
            Some(VariantDecl {
                name: name?,
                payload: payload?,
            })
        })?;
        Some(TypeBody::Enum(variants))
    }

    fn interface_decl(&mut self, v: &Value, span: &Span) -> Option<InterfaceDecl> {
        let obj = self.object(v, span, "interface")?;
        self.check_keys(obj, &["name", "methods"], span, "interface");
        let name = self.string_field(obj, "name", span, "interface");
        let methods = match self.field(obj, "methods", span, "interface") {
            Some(m) => self.list(m, &span.child("methods"), |p, v, s| {
                let o = p.object(v, s, "method signature")?;
                p.check_keys(o, &["name", "params", "returns"], s, "method signature");
                let name = p.string_field(o, "name", s, "method signature");
                let params = p.opt_list(o, "params", s, Self::ty);
                let returns = match o.get("returns") {
                    Some(r) => p.ty(r, &s.child("returns")),
                    None => Some(Type::Unit),
                };
                Some(MethodSig {
                    name: name?,
                    params: params?,
                    returns: returns?,
                })
            }),
            None => None,
        };
        Some(InterfaceDecl {
            name: name?,
            methods: methods?,
            span: span.clone(),
        })
    }

    fn impl_decl(&mut self, v: &Value, span: &Span) -> Option<ImplDecl> {
        let obj = self.object(v, span, "impl")?;
        self.check_keys(obj, &["interface", "for", "methods"], span, "impl");
        let interface = self.string_field(obj, "interface", span, "impl");
        let for_type = match self.field(obj, "for", span, "impl") {
            Some(t) => self.ty(t, &span.child("for")),
            None => None,
        };
        let methods = match self.field(obj, "methods", span, "impl") {
            Some(m) => {
                let mspan = span.child("methods");
                let o = self.object(m, &mspan, "method table");
                o.and_then(|o| {
                    let mut out = Vec::with_capacity(o.len());
                    let mut ok = true;
                    for (method, func) in o {
                        match self.string(func, &mspan.child(method)) {
                            Some(f) => out.push((method.clone(), f)),
                            None => ok = false,
                        }
                    }
                    out.sort();
                    ok.then_some(out)
                })
            }
            None => None,
        };
        Some(ImplDecl {
            interface: interface?,
            for_type: for_type?,
            methods: methods?,
            span: span.clone(),
        })
    }

    // ── Types ──

    fn ty(&mut self, v: &Value, span: &Span) -> Option<Type> {
        match v {
            Value::String(s) => Some(Type::primitive(s).unwrap_or_else(|| Type::named(s.clone()))),
            Value::Object(o) if o.len() == 1 => {
                let (key, inner) = o.iter().next()?;
                let s = span.child(key);
                match key.as_str() {
                    "array" => {
                        let a = self.object(inner, &s, "array type")?;
                        self.check_keys(a, &["elem", "len"], &s, "array type");
                        let elem = match self.field(a, "elem", &s, "array type") {
                            Some(e) => self.ty(e, &s.child("elem")),
                            None => None,
                        };
                        let len = match self.field(a, "len", &s, "array type") {
                            Some(n) => match n.as_u64() {
                                Some(n) => Some(n),
                                None => {
                                    self.error(codes::E0102, s.child("len"), "array length must be a non-negative integer");
                                    None
                                }
                            },
                            None => None,
                        };
                        Some(Type::Array(Box::new(elem?), len?))
                    }
                    "slice" => Some(Type::Slice(Box::new(self.ty(inner, &s)?))),
                    "set" => Some(Type::Set(Box::new(self.ty(inner, &s)?))),
                    "optional" => Some(Type::Optional(Box::new(self.ty(inner, &s)?))),
                    "tuple" => Some(Type::Tuple(self.list(inner, &s, Self::ty)?)),
                    "union" => {
                        let members = self.list(inner, &s, Self::ty)?;
                        if members.len() < 2 {
                            self.error(codes::E0102, s, "union needs at least two members");
                            return None;
                        }
                        Some(Type::Union(members))
                    }
                    "map" => {
                        let m = self.object(inner, &s, "map type")?;
                        self.check_keys(m, &["key", "value"], &s, "map type");
                        let k = match self.field(m, "key", &s, "map type") {
                            Some(k) => self.ty(k, &s.child("key")),
                            None => None,
                        };
                        let val = match self.field(m, "value", &s, "map type") {
                            Some(x) => self.ty(x, &s.child("value")),
                            None => None,
                        };
                        Some(Type::Map(Box::new(k?), Box::new(val?)))
                    }
                    "named" => {
                        let n = self.object(inner, &s, "named type")?;
                        self.check_keys(n, &["name", "args"], &s, "named type");
                        let name = self.string_field(n, "name", &s, "named type");
                        let args = self.opt_list(n, "args", &s, Self::ty);
                        Some(Type::Named {
                            name: name?,
                            args: args?,
                        })
                    }
                    "param" => Some(Type::Param(self.string(inner, &s)?)),
                    "dyn" => Some(Type::Dyn(self.string(inner, &s)?)),
                    other => {
                        self.error(codes::E0103, span.clone(), format!("unknown type constructor '{other}'"));
                        None
                    }
                }
            }
            other => {
                self.error(
                    codes::E0102,
                    span.clone(),
                    format!(
                        "expected a type name or a single-key type object, found {}",
                        describe(other)
                    ),
                );
                None
            }
        }
    }

    // ── Statements ──

    fn block(&mut self, v: &Value, span: &Span) -> Option<Vec<Stmt>> {
        self.list(v, span, Self::stmt)
    }

    fn kind<'v>(&mut self, obj: &'v Map<String, Value>, span: &Span, what: &str) -> Option<&'v str> {
        match self.field(obj, "kind", span, what)? {
            Value::String(s) => Some(s.as_str()),
            other => {
                self.error(
                    codes::E0102,
                    span.child("kind"),
                    format!("expected string kind, found {}", describe(other)),
                );
                None
            }
        }
    }

    fn expr_field(&mut self, obj: &Map<String, Value>, key: &str, span: &Span, what: &str) -> Option<Expr> {
        let v = self.field(obj, key, span, what)?;
        self.expr(v, &span.child(key))
    }

    fn block_field(&mut self, obj: &Map<String, Value>, key: &str, span: &Span, what: &str) -> Option<Vec<Stmt>> {
        let v = self.field(obj, key, span, what)?;
        self.block(v, &span.child(key))
    }

    fn exprs_field(&mut self, obj: &Map<String, Value>, key: &str, span: &Span, what: &str) -> Option<Vec<Expr>> {
        let v = self.field(obj, key, span, what)?;
        self.list(v, &span.child(key), Self::expr)
    }

    fn stmt(&mut self, v: &Value, span: &Span) -> Option<Stmt> {
        let obj = self.object(v, span, "statement")?;
        let kind = self.kind(obj, span, "statement")?;
        let what = format!("'{kind}' statement");
        let w = what.as_str();
        let keys: &[&str] = match kind {
            "let" => &["kind", "name", "type", "mutable", "value"],
            "assign" => &["kind", "name", "value"],
            "expr" => &["kind", "expr"],
            "return" => &["kind", "value"],
            "if" => &["kind", "cond", "then", "else"],
            "while" => &["kind", "cond", "body"],
            "for" => &["kind", "var", "start", "end", "body"],
            "match" => &["kind", "scrutinee", "arms"],
            "observe" => &["kind", "dist", "params", "value"],
            "break" | "continue" => &["kind"],
            other => {
                self.error(codes::E0103, span.child("kind"), format!("unknown statement kind '{other}'"));
                return None;
            }
        };
        self.check_keys(obj, keys, span, w);

        let kind = match kind {
            "let" => {
                let name = self.string_field(obj, "name", span, w);
                let ty = match obj.get("type") {
                    Some(t) => Some(self.ty(t, &span.child("type"))?),
                    None => None,
                };
                let mutable = self.bool_field(obj, "mutable", span);
                let value = self.expr_field(obj, "value", span, w);
                StmtKind::Let {
                    name: name?,
                    ty,
                    mutable,
                    value: value?,
                }
            }
            "assign" => {
                let name = self.string_field(obj, "name", span, w);
                let value = self.expr_field(obj, "value", span, w);
                StmtKind::Assign {
                    name: name?,
                    value: value?,
                }
            }
            "expr" => StmtKind::Expr(self.expr_field(obj, "expr", span, w)?),
            "return" => match obj.get("value") {
                Some(v) => StmtKind::Return(Some(self.expr(v, &span.child("value"))?)),
                None => StmtKind::Return(None),
            },
            "if" => {
                let cond = self.expr_field(obj, "cond", span, w);
                let then_body = self.block_field(obj, "then", span, w);
                let else_body = match obj.get("else") {
                    Some(e) => self.block(e, &span.child("else")),
                    None => Some(Vec::new()),
                };
                StmtKind::If {
                    cond: cond?,
                    then_body: then_body?,
                    else_body: else_body?,
                }
            }
            "while" => {
                let cond = self.expr_field(obj, "cond", span, w);
                let body = self.block_field(obj, "body", span, w);
                StmtKind::While {
                    cond: cond?,
                    body: body?,
                }
            }
            "for" => {
                let var = self.string_field(obj, "var", span, w);
                let start = self.expr_field(obj, "start", span, w);
                let end = self.expr_field(obj, "end", span, w);
                let body = self.block_field(obj, "body", span, w);
                StmtKind::For {
                    var: var?,
                    start: start?,
                    end: end?,
                    body: body?,
                }
            }
            "match" => {
                let scrutinee = self.expr_field(obj, "scrutinee", span, w);
                let arms = match self.field(obj, "arms", span, w) {
                    Some(a) => self.list(a, &span.child("arms"), Self::arm),
                    None => None,
                };
                StmtKind::Match {
                    scrutinee: scrutinee?,
                    arms: arms?,
                }
            }
            "observe" => {
                let dist = self.string_field(obj, "dist", span, w);
                let params = self.exprs_field(obj, "params", span, w);
                let value = self.expr_field(obj, "value", span, w);
                StmtKind::Observe {
                    dist: dist?,
                    params: params?,
                    value: value?,
                }
            }
            "break" => StmtKind::Break,
            _ => StmtKind::Continue,
        };
        Some(Stmt {
            kind,
            span: span.clone(),
        })
    }

    fn arm(&mut self, v: &Value, span: &Span) -> Option<Arm> {
        let obj = self.object(v, span, "match arm")?;
        self.check_keys(obj, &["pattern", "body"], span, "match arm");
        let pattern = match self.field(obj, "pattern", span, "match arm") {
            Some(p) => self.pattern(p, &span.child("pattern")),
            None => None,
        };
        let body = self.block_field(obj, "body", span, "match arm");
        Some(Arm {
            pattern: pattern?,
            body: body?,
            span: span.clone(),
        })
    }

    fn pattern(&mut self, v: &Value, span: &Span) -> Option<Pattern> {
        let obj = self.object(v, span, "pattern")?;
        let kind = self.kind(obj, span, "pattern")?;
        let kind = match kind {
            "wildcard" => {
                self.check_keys(obj, &["kind"], span, "pattern");
                PatternKind::Wildcard
            }
            "bind" => {
                self.check_keys(obj, &["kind", "name"], span, "pattern");
                PatternKind::Bind(self.string_field(obj, "name", span, "bind pattern")?)
            }
            "variant" => {
                self.check_keys(obj, &["kind", "variant", "bindings"], span, "pattern");
                let variant = self.string_field(obj, "variant", span, "variant pattern");
                let bindings = match obj.get("bindings") {
                    Some(b) => self.strings(b, &span.child("bindings")),
                    None => Some(Vec::new()),
                };
                PatternKind::Variant {
                    variant: variant?,
                    bindings: bindings?,
                }
            }
            "literal" => {
                self.check_keys(obj, &["kind", "value"], span, "pattern");
                let value = self.field(obj, "value", span, "literal pattern")?;
                PatternKind::Literal(self.literal(value, None, &span.child("value"))?)
            }
            "type" => {
                self.check_keys(obj, &["kind", "type", "binding"], span, "pattern");
                let ty = match self.field(obj, "type", span, "type pattern") {
                    Some(t) => self.ty(t, &span.child("type")),
                    None => None,
                };
                let binding = match obj.get("binding") {
                    Some(b) => Some(self.string(b, &span.child("binding"))?),
                    None => None,
                };
                PatternKind::Type { ty: ty?, binding }
            }
            other => {
                self.error(codes::E0103, span.child("kind"), format!("unknown pattern kind '{other}'"));
                return None;
            }
        };
        Some(Pattern {
            kind,
            span: span.clone(),
        })
    }

    // ── Literals ──

    /// Validate a JSON literal against an optional declared type.
    fn literal(&mut self, v: &Value, declared: Option<&Type>, span: &Span) -> Option<Literal> {
        let mismatch = |p: &mut Self, what: &str| {
            let declared = declared.map(|t| t.to_string()).unwrap_or_default();
            p.error(
                codes::E0104,
                span.clone(),
                format!("{what} literal does not fit declared type {declared}"),
            );
            None
        };
        match v {
            Value::Bool(b) => match declared {
                None | Some(Type::Bool) => Some(Literal::Bool(*b)),
                Some(_) => mismatch(self, "boolean"),
            },
            Value::String(s) => match declared {
                None | Some(Type::Str) => Some(Literal::Str(s.clone())),
                Some(_) => mismatch(self, "string"),
            },
            Value::Null => match declared {
                None | Some(Type::Unit) => Some(Literal::Unit),
                Some(_) => mismatch(self, "unit"),
            },
            Value::Number(n) => {
                let int = n
                    .as_i64()
                    .map(i128::from)
                    .or_else(|| n.as_u64().map(i128::from));
                match (int, declared) {
                    (Some(i), None) => Some(Literal::Int(i)),
                    (Some(i), Some(Type::Int(t))) => {
                        if t.fits(i) {
                            Some(Literal::Int(i))
                        } else {
                            self.error(
                                codes::E0104,
                                span.clone(),
                                format!("integer literal {i} is out of range for {}", t.name()),
                            );
                            None
                        }
                    }
                    (Some(i), Some(Type::Float(t))) => Some(Literal::Float(t.round(i as f64))),
                    (None, None) => Some(Literal::Float(n.as_f64()?)),
                    (None, Some(Type::Float(FloatTy::F32))) => {
                        Some(Literal::Float(FloatTy::F32.round(n.as_f64()?)))
                    }
                    (None, Some(Type::Float(FloatTy::F64))) => Some(Literal::Float(n.as_f64()?)),
                    (None, Some(Type::Int(_))) => {
                        self.error(
                            codes::E0104,
                            span.clone(),
                            "floating literal where an integer type is declared",
                        );
                        None
                    }
                    _ => mismatch(self, "numeric"),
                }
            }
            other => {
                self.error(
                    codes::E0102,
                    span.clone(),
                    format!("expected a literal, found {}", describe(other)),
                );
                None
            }
        }
    }

    // ── Expressions ──

    fn type_args(&mut self, obj: &Map<String, Value>, span: &Span) -> Option<Vec<Type>> {
        self.opt_list(obj, "type_args", span, Self::ty)
    }

    fn expr(&mut self, v: &Value, span: &Span) -> Option<Expr> {
        let obj = self.object(v, span, "expression")?;
        let kind = self.kind(obj, span, "expression")?;
        let id = self.ids.alloc_expr();
        let what = format!("'{kind}' expression");
        let w = what.as_str();
        let keys: &[&str] = match kind {
            "lit" => &["kind", "type", "value"],
            "var" => &["kind", "name"],
            "binary" => &["kind", "op", "lhs", "rhs"],
            "unary" => &["kind", "op", "operand"],
            "call" => &["kind", "callee", "type_args", "args"],
            "method_call" => &["kind", "receiver", "method", "args"],
            "as_dyn" => &["kind", "interface", "value"],
            "cast" => &["kind", "type", "value"],
            "array" | "tuple" => &["kind", "elems"],
            "record" => &["kind", "name", "type_args", "fields"],
            "variant" => &["kind", "enum", "variant", "type_args", "payload"],
            "some" => &["kind", "value"],
            "none" => &["kind", "type"],
            "map" => &["kind", "key", "value", "entries"],
            "set" => &["kind", "elem", "elems"],
            "field" => &["kind", "base", "field"],
            "index" => &["kind", "base", "index"],
            "intrinsic" => &["kind", "name", "args"],
            "sample" => &["kind", "dist", "params"],
            other => {
                self.error(codes::E0103, span.child("kind"), format!("unknown expression kind '{other}'"));
                return None;
            }
        };
        self.check_keys(obj, keys, span, w);

        let kind = match kind {
            "lit" => {
                let ty = match obj.get("type") {
                    Some(t) => {
                        let t = self.ty(t, &span.child("type"))?;
                        if !matches!(t, Type::Int(_) | Type::Float(_) | Type::Bool | Type::Str | Type::Unit) {
                            self.error(codes::E0104, span.child("type"), format!("literal type must be primitive, found {t}"));
                            return None;
                        }
                        Some(t)
                    }
                    None => None,
                };
                let value = self.field(obj, "value", span, w)?;
                let value = self.literal(value, ty.as_ref(), &span.child("value"))?;
                ExprKind::Lit { ty, value }
            }
            "var" => ExprKind::Var(self.string_field(obj, "name", span, w)?),
            "binary" => {
                let op = self.string_field(obj, "op", span, w);
                let op = op.and_then(|s| {
                    let parsed = BinaryOp::from_symbol(&s);
                    if parsed.is_none() {
                        self.error(codes::E0103, span.child("op"), format!("unknown binary operator '{s}'"));
                    }
                    parsed
                });
                let lhs = self.expr_field(obj, "lhs", span, w);
                let rhs = self.expr_field(obj, "rhs", span, w);
                ExprKind::Binary {
                    op: op?,
                    lhs: Box::new(lhs?),
                    rhs: Box::new(rhs?),
                }
            }
            "unary" => {
                let op = self.string_field(obj, "op", span, w);
                let op = op.and_then(|s| {
                    let parsed = UnaryOp::from_symbol(&s);
                    if parsed.is_none() {
                        self.error(codes::E0103, span.child("op"), format!("unknown unary operator '{s}'"));
                    }
                    parsed
                });
                let operand = self.expr_field(obj, "operand", span, w);
                ExprKind::Unary {
                    op: op?,
                    operand: Box::new(operand?),
                }
            }
            "call" => {
                let callee = self.string_field(obj, "callee", span, w);
                let type_args = self.type_args(obj, span);
                let args = self.exprs_field(obj, "args", span, w);
                ExprKind::Call {
                    callee: callee?,
                    type_args: type_args?,
                    args: args?,
                }
            }
            "method_call" => {
                let receiver = self.expr_field(obj, "receiver", span, w);
                let method = self.string_field(obj, "method", span, w);
                let args = self.exprs_field(obj, "args", span, w);
                ExprKind::MethodCall {
                    receiver: Box::new(receiver?),
                    method: method?,
                    args: args?,
                }
            }
            "as_dyn" => {
                let interface = self.string_field(obj, "interface", span, w);
                let value = self.expr_field(obj, "value", span, w);
                ExprKind::AsDyn {
                    interface: interface?,
                    value: Box::new(value?),
                }
            }
            "cast" => {
                let ty = match self.field(obj, "type", span, w) {
                    Some(t) => self.ty(t, &span.child("type")),
                    None => None,
                };
                let value = self.expr_field(obj, "value", span, w);
                ExprKind::Cast {
                    ty: ty?,
                    value: Box::new(value?),
                }
            }
            "array" => ExprKind::Array(self.exprs_field(obj, "elems", span, w)?),
            "tuple" => ExprKind::Tuple(self.exprs_field(obj, "elems", span, w)?),
            "record" => {
                let name = self.string_field(obj, "name", span, w);
                let type_args = self.type_args(obj, span);
                let fields = match self.field(obj, "fields", span, w) {
                    Some(f) => {
                        let fspan = span.child("fields");
                        self.object(f, &fspan, "field initializer").and_then(|o| {
                            let mut out = Vec::with_capacity(o.len());
                            let mut ok = true;
                            let mut keys: Vec<&String> = o.keys().collect();
                            keys.sort();
                            for key in keys {
                                match self.expr(&o[key], &fspan.child(key)) {
                                    Some(e) => out.push((key.clone(), e)),
                                    None => ok = false,
                                }
                            }
                            ok.then_some(out)
                        })
                    }
                    None => None,
                };
                ExprKind::Record {
                    name: name?,
                    type_args: type_args?,
                    fields: fields?,
                }
            }
            "variant" => {
                let enum_name = self.string_field(obj, "enum", span, w);
                let variant = self.string_field(obj, "variant", span, w);
                let type_args = self.type_args(obj, span);
                let payload = self.opt_list(obj, "payload", span, Self::expr);
                ExprKind::Variant {
                    enum_name: enum_name?,
                    variant: variant?,
                    type_args: type_args?,
                    payload: payload?,
                }
            }
            "some" => ExprKind::Some(Box::new(self.expr_field(obj, "value", span, w)?)),
            "none" => {
                let t = self.field(obj, "type", span, w)?;
                ExprKind::None(self.ty(t, &span.child("type"))?)
            }
            "map" => {
                let key = match self.field(obj, "key", span, w) {
                    Some(t) => self.ty(t, &span.child("key")),
                    None => None,
                };
                let value = match self.field(obj, "value", span, w) {
                    Some(t) => self.ty(t, &span.child("value")),
                    None => None,
                };
                let entries = match self.field(obj, "entries", span, w) {
                    Some(e) => self.list(e, &span.child("entries"), |p, v, s| {
                        let pair = p.array(v, s)?;
                        if pair.len() != 2 {
                            p.error(codes::E0102, s.clone(), "map entry must be a [key, value] pair");
                            return None;
                        }
                        let k = p.expr(&pair[0], &s.index(0));
                        let v = p.expr(&pair[1], &s.index(1));
                        Some((k?, v?))
                    }),
                    None => None,
                };
                ExprKind::Map {
                    key: key?,
                    value: value?,
                    entries: entries?,
                }
            }
            "set" => {
                let elem = match self.field(obj, "elem", span, w) {
                    Some(t) => self.ty(t, &span.child("elem")),
                    None => None,
                };
                let elems = self.exprs_field(obj, "elems", span, w);
                ExprKind::Set {
                    elem: elem?,
                    elems: elems?,
                }
            }
            "field" => {
                let base = self.expr_field(obj, "base", span, w);
                let field = match self.field(obj, "field", span, w) {
                    // Tuple components may be addressed by number.
                    Some(Value::Number(n)) if n.is_u64() => Some(n.to_string()),
                    Some(f) => self.string(f, &span.child("field")),
                    None => None,
                };
                ExprKind::Field {
                    base: Box::new(base?),
                    field: field?,
                }
            }
            "index" => {
                let base = self.expr_field(obj, "base", span, w);
                let index = self.expr_field(obj, "index", span, w);
                ExprKind::Index {
                    base: Box::new(base?),
                    index: Box::new(index?),
                }
            }
            "intrinsic" => {
                let name = self.string_field(obj, "name", span, w);
                let args = self.exprs_field(obj, "args", span, w);
                ExprKind::Intrinsic {
                    name: name?,
                    args: args?,
                }
            }
            _ => {
                let dist = self.string_field(obj, "dist", span, w);
                let params = self.exprs_field(obj, "params", span, w);
                ExprKind::Sample {
                    dist: dist?,
                    params: params?,
                }
            }
        };
        Some(Expr {
            id,
            kind,
            span: span.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse_ok(doc: Value) -> Program {
        let result = parse_value(&doc);
        assert!(
            result.diagnostics.is_empty(),
            "unexpected errors: {:#?}",
            result.diagnostics
        );
        result.program.expect("expected program")
    }

    fn parse_err(doc: Value) -> Vec<Diagnostic> {
        let result = parse_value(&doc);
        assert!(result.program.is_none(), "expected failure");
        result.diagnostics
    }

    fn has(diags: &[Diagnostic], code: DiagCode, ptr: &str) -> bool {
        diags.iter().any(|d| d.code == Some(code) && d.span.as_str() == ptr)
    }

    fn main_returning(value: Value) -> Value {
        json!({"functions": [{"name": "main", "params": [], "returns": "i32",
            "body": [{"kind": "return", "value": value}]}]})
    }

    // ── Programs ──

    #[test]
    fn minimal_program() {
        let p = parse_ok(json!({"functions": []}));
        assert!(p.functions.is_empty());
        assert!(p.types.is_empty());
    }

    #[test]
    fn add_example() {
        let p = parse_ok(json!({"version": 1, "functions": [{
            "name": "main", "params": [], "returns": "i32",
            "body": [
                {"kind": "let", "name": "a", "type": "i32", "value": {"kind": "lit", "type": "i32", "value": 10}},
                {"kind": "let", "name": "b", "type": "i32", "value": {"kind": "lit", "type": "i32", "value": 20}},
                {"kind": "return", "value": {"kind": "binary", "op": "+",
                    "lhs": {"kind": "var", "name": "a"}, "rhs": {"kind": "var", "name": "b"}}}
            ]}]}));
        let main = p.function("main").unwrap();
        assert_eq!(main.returns, Type::primitive("i32").unwrap());
        assert_eq!(main.body.len(), 3);
        match &main.body[2].kind {
            StmtKind::Return(Some(Expr {
                kind: ExprKind::Binary { op, .. },
                span,
                ..
            })) => {
                assert_eq!(*op, BinaryOp::Add);
                assert_eq!(span.as_str(), "/functions/0/body/2/value");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn returns_defaults_to_unit() {
        let p = parse_ok(json!({"functions": [{"name": "f", "params": [], "body": []}]}));
        assert_eq!(p.functions[0].returns, Type::Unit);
    }

    #[test]
    fn expression_ids_follow_document_order() {
        let p = parse_ok(main_returning(json!({"kind": "binary", "op": "*",
            "lhs": {"kind": "lit", "value": 2}, "rhs": {"kind": "lit", "value": 3}})));
        let StmtKind::Return(Some(e)) = &p.functions[0].body[0].kind else {
            panic!("expected return");
        };
        assert_eq!(e.id.0, 0);
        let ExprKind::Binary { lhs, rhs, .. } = &e.kind else {
            panic!("expected binary");
        };
        assert_eq!((lhs.id.0, rhs.id.0), (1, 2));
    }

    // ── Types ──

    #[test]
    fn composite_types() {
        let p = parse_ok(json!({"functions": [{"name": "f", "params": [
            {"name": "a", "type": {"array": {"elem": "f64", "len": 3}}},
            {"name": "m", "type": {"map": {"key": "string", "value": {"optional": "i64"}}}},
            {"name": "u", "type": {"union": ["i32", "string"]}},
            {"name": "s", "type": "Shape"},
            {"name": "d", "type": {"dyn": "Area"}}
        ], "body": []}]}));
        let params = &p.functions[0].params;
        assert_eq!(params[0].ty.to_string(), "[f64; 3]");
        assert_eq!(params[1].ty.to_string(), "map<string, i64?>");
        assert_eq!(params[2].ty.to_string(), "(i32 | string)");
        assert_eq!(params[3].ty, Type::named("Shape"));
        assert_eq!(params[4].ty, Type::Dyn("Area".into()));
    }

    #[test]
    fn single_member_union_rejected() {
        let d = parse_err(json!({"functions": [{"name": "f", "params": [
            {"name": "u", "type": {"union": ["i32"]}}], "body": []}]}));
        assert!(has(&d, codes::E0102, "/functions/0/params/0/type/union"));
    }

    // ── Structural errors ──

    #[test]
    fn unknown_top_level_key_rejected() {
        let d = parse_err(json!({"functions": [], "extra": 1}));
        assert!(has(&d, codes::E0103, "/extra"));
    }

    #[test]
    fn missing_functions_rejected() {
        let d = parse_err(json!({"types": []}));
        assert!(has(&d, codes::E0101, ""));
    }

    #[test]
    fn unsupported_version_rejected() {
        let d = parse_err(json!({"version": 2, "functions": []}));
        assert!(has(&d, codes::E0105, "/version"));
    }

    #[test]
    fn malformed_json_reported() {
        let r = parse("{\"functions\": [");
        assert!(r.program.is_none());
        assert_eq!(r.diagnostics[0].code, Some(codes::E0100));
    }

    #[test]
    fn errors_accumulate_across_nodes() {
        let d = parse_err(json!({"functions": [
            {"name": "f", "params": [], "body": [{"kind": "explode"}]},
            {"params": [], "body": []}
        ]}));
        assert!(has(&d, codes::E0103, "/functions/0/body/0/kind"));
        assert!(has(&d, codes::E0101, "/functions/1"));
    }

    #[test]
    fn unknown_field_in_node_rejected() {
        let d = parse_err(main_returning(json!({"kind": "lit", "value": 1, "colour": "red"})));
        assert!(has(&d, codes::E0103, "/functions/0/body/0/value/colour"));
    }

    // ── Literals ──

    #[test]
    fn float_literal_rejected_for_integer_type() {
        let d = parse_err(main_returning(json!({"kind": "lit", "type": "i32", "value": 1.5})));
        assert!(has(&d, codes::E0104, "/functions/0/body/0/value/value"));
    }

    #[test]
    fn integer_literal_out_of_range() {
        let d = parse_err(main_returning(json!({"kind": "lit", "type": "u8", "value": 256})));
        assert!(has(&d, codes::E0104, "/functions/0/body/0/value/value"));
        let d = parse_err(main_returning(json!({"kind": "lit", "type": "u32", "value": -1})));
        assert!(has(&d, codes::E0104, "/functions/0/body/0/value/value"));
    }

    #[test]
    fn integer_json_accepted_for_float_type() {
        let p = parse_ok(main_returning(json!({"kind": "lit", "type": "f64", "value": 2})));
        let StmtKind::Return(Some(e)) = &p.functions[0].body[0].kind else {
            panic!("expected return");
        };
        assert!(matches!(e.kind, ExprKind::Lit { value: Literal::Float(v), .. } if v == 2.0));
    }

    #[test]
    fn u64_max_literal() {
        let p = parse_ok(main_returning(json!({"kind": "lit", "type": "u64", "value": u64::MAX})));
        let StmtKind::Return(Some(e)) = &p.functions[0].body[0].kind else {
            panic!("expected return");
        };
        assert!(matches!(e.kind, ExprKind::Lit { value: Literal::Int(v), .. } if v == u64::MAX as i128));
    }

    // ── Declarations ──

    #[test]
    fn type_params_accept_names_or_objects() {
        let field = json!({"fields": [{"name": "a", "type": {"param": "T"}}]});
        let p = parse_ok(json!({
            "types": [
                {"name": "Pair", "type_params": ["T"], "record": field},
                {"name": "Cell", "type_params": [{"name": "T"}], "record": field}
            ],
            "functions": [{"name": "id", "type_params": ["T"], "params": [{"name": "x", "type": {"param": "T"}}],
                "returns": {"param": "T"}, "body": [{"kind": "return", "value": {"kind": "var", "name": "x"}}]}]
        }));
        assert_eq!(p.types[0].type_params, vec!["T".to_string()]);
        assert_eq!(p.types[1].type_params, vec!["T".to_string()]);
        assert_eq!(p.functions[0].type_params[0].name, "T");
        assert!(p.functions[0].type_params[0].bounds.is_empty());

        let d = parse_err(json!({
            "types": [{"name": "Bad", "type_params": [{"name": "T", "bounds": ["Num"]}], "record": field}],
            "functions": []
        }));
        assert!(has(&d, codes::E0102, "/types/0/type_params"), "{d:?}");
    }

    #[test]
    fn enum_interface_and_impl() {
        let p = parse_ok(json!({
            "types": [{"name": "Shape", "enum": {"variants": [
                {"name": "Circle", "payload": ["f64"]}, {"name": "Square", "payload": ["f64"]}]}}],
            "interfaces": [{"name": "Area", "methods": [{"name": "area", "params": [], "returns": "f64"}]}],
            "impls": [{"interface": "Area", "for": "Shape", "methods": {"area": "shape_area"}}],
            "functions": []
        }));
        let TypeBody::Enum(variants) = &p.types[0].body else {
            panic!("expected enum");
        };
        assert_eq!(variants.len(), 2);
        assert_eq!(p.interfaces[0].methods[0].returns, Type::primitive("f64").unwrap());
        assert_eq!(p.impls[0].methods, vec![("area".to_string(), "shape_area".to_string())]);
    }

    #[test]
    fn record_and_enum_together_rejected() {
        let d = parse_err(json!({"types": [{"name": "X", "record": {"fields": []},
            "enum": {"variants": []}}], "functions": []}));
        assert!(has(&d, codes::E0102, "/types/0"));
    }

    #[test]
    fn param_constraints() {
        let p = parse_ok(json!({"functions": [{"name": "model", "params": [
            {"name": "mu", "type": "f64"},
            {"name": "sigma", "type": "f64", "constraint": "positive"},
            {"name": "p", "type": "f64", "constraint": {"interval": [0, 2]}}
        ], "body": []}]}));
        let ps = &p.functions[0].params;
        assert_eq!(ps[0].constraint, None);
        assert_eq!(ps[1].constraint, Some(ParamConstraint::Positive));
        assert_eq!(ps[2].constraint, Some(ParamConstraint::Interval(0.0, 2.0)));
    }

    #[test]
    fn match_and_patterns() {
        let p = parse_ok(json!({"functions": [{"name": "f", "params": [{"name": "x", "type": {"optional": "i32"}}],
            "returns": "i32", "body": [{"kind": "match", "scrutinee": {"kind": "var", "name": "x"}, "arms": [
                {"pattern": {"kind": "variant", "variant": "some", "bindings": ["v"]},
                 "body": [{"kind": "return", "value": {"kind": "var", "name": "v"}}]},
                {"pattern": {"kind": "wildcard"}, "body": [{"kind": "return", "value": {"kind": "lit", "value": 0}}]}
            ]}]}]}));
        let StmtKind::Match { arms, .. } = &p.functions[0].body[0].kind else {
            panic!("expected match");
        };
        assert_eq!(
            arms[0].pattern.kind,
            PatternKind::Variant {
                variant: "some".into(),
                bindings: vec!["v".into()]
            }
        );
        assert_eq!(arms[1].pattern.kind, PatternKind::Wildcard);
    }

    #[test]
    fn record_fields_sorted_by_name() {
        let p = parse_ok(main_returning(json!({"kind": "record", "name": "P",
            "fields": {"y": {"kind": "lit", "value": 2}, "x": {"kind": "lit", "value": 1}}})));
        let StmtKind::Return(Some(e)) = &p.functions[0].body[0].kind else {
            panic!("expected return");
        };
        let ExprKind::Record { fields, .. } = &e.kind else {
            panic!("expected record");
        };
        let names: Vec<&str> = fields.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["x", "y"]);
    }
}
