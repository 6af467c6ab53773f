// unparse.rs — AST back to the structured-IR schema
//
// Emits canonical JSON: optional fields are written only when they differ
// from their defaults, types use the single-key object forms (named types
// always as `{"named": ..}`). Re-parsing the output yields an equal AST.
//
// Preconditions: none.
// Postconditions: `parse_value(&unparse(p))` reproduces `p`.
// Failure modes: none.
// Side effects: none.

use serde_json::{json, Map, Value};

use crate::ast::*;
use crate::parser::SCHEMA_VERSION;
use crate::types::Type;

pub fn unparse(program: &Program) -> Value {
    json!({
        "version": SCHEMA_VERSION,
        "types": program.types.iter().map(type_decl).collect::<Vec<_>>(),
        "interfaces": program.interfaces.iter().map(interface).collect::<Vec<_>>(),
        "impls": program.impls.iter().map(impl_decl).collect::<Vec<_>>(),
        "functions": program.functions.iter().map(function).collect::<Vec<_>>(),
    })
}

pub fn ty(t: &Type) -> Value {
    let all = |ts: &[Type]| ts.iter().map(ty).collect::<Vec<_>>();
    match t {
        Type::Int(_) | Type::Float(_) | Type::Bool | Type::Str | Type::Unit => {
            Value::String(t.to_string())
        }
        Type::Array(e, n) => json!({"array": {"elem": ty(e), "len": n}}),
        Type::Slice(e) => json!({"slice": ty(e)}),
        Type::Tuple(ts) => json!({"tuple": all(ts)}),
        Type::Map(k, v) => json!({"map": {"key": ty(k), "value": ty(v)}}),
        Type::Set(e) => json!({"set": ty(e)}),
        Type::Optional(e) => json!({"optional": ty(e)}),
        Type::Union(ts) => json!({"union": all(ts)}),
        Type::Named { name, args } if args.is_empty() => json!({"named": {"name": name}}),
        Type::Named { name, args } => json!({"named": {"name": name, "args": all(args)}}),
        Type::Param(p) => json!({"param": p}),
        Type::Dyn(i) => json!({"dyn": i}),
    }
}

fn types(ts: &[Type]) -> Value {
    Value::Array(ts.iter().map(ty).collect())
}

fn function(f: &Function) -> Value {
    let mut obj = Map::new();
    obj.insert("name".into(), json!(f.name));
    if !f.type_params.is_empty() {
        let tps: Vec<Value> = f
            .type_params
            .iter()
            .map(|tp| {
                if tp.bounds.is_empty() {
                    json!({"name": tp.name})
                } else {
                    json!({"name": tp.name, "bounds": tp.bounds})
                }
            })
            .collect();
        obj.insert("type_params".into(), Value::Array(tps));
    }
    obj.insert(
        "params".into(),
        Value::Array(f.params.iter().map(param).collect()),
    );
    obj.insert("returns".into(), ty(&f.returns));
    obj.insert("body".into(), block(&f.body));
    Value::Object(obj)
}

fn param(p: &Param) -> Value {
    let mut obj = Map::new();
    obj.insert("name".into(), json!(p.name));
    obj.insert("type".into(), ty(&p.ty));
    if p.mutable {
        obj.insert("mutable".into(), json!(true));
    }
    if let Some(c) = p.constraint {
        let c = match c {
            ParamConstraint::Real => json!("real"),
            ParamConstraint::Positive => json!("positive"),
            ParamConstraint::UnitInterval => json!("unit_interval"),
            ParamConstraint::Interval(lo, hi) => json!({"interval": [lo, hi]}),
        };
        obj.insert("constraint".into(), c);
    }
    Value::Object(obj)
}

fn type_decl(d: &TypeDecl) -> Value {
    let mut obj = Map::new();
    obj.insert("name".into(), json!(d.name));
    if !d.type_params.is_empty() {
        obj.insert("type_params".into(), json!(d.type_params));
    }
    match &d.body {
        TypeBody::Record(fields) => {
            let fields: Vec<Value> = fields
                .iter()
                .map(|f| json!({"name": f.name, "type": ty(&f.ty)}))
                .collect();
            obj.insert("record".into(), json!({ "fields": fields }));
        }
        TypeBody::Enum(variants) => {
            let variants: Vec<Value> = variants
                .iter()
                .map(|v| {
                    if v.payload.is_empty() {
                        json!({"name": v.name})
                    } else {
                        json!({"name": v.name, "payload": types(&v.payload)})
                    }
                })
                .collect();
            obj.insert("enum".into(), json!({ "variants": variants }));
        }
    }
    Value::Object(obj)
}

fn interface(i: &InterfaceDecl) -> Value {
    let methods: Vec<Value> = i
        .methods
        .iter()
        .map(|m| json!({"name": m.name, "params": types(&m.params), "returns": ty(&m.returns)}))
        .collect();
    json!({"name": i.name, "methods": methods})
}

fn impl_decl(i: &ImplDecl) -> Value {
    let methods: Map<String, Value> = i
        .methods
        .iter()
        .map(|(m, f)| (m.clone(), json!(f)))
        .collect();
    json!({"interface": i.interface, "for": ty(&i.for_type), "methods": methods})
}

// ── Statements ──

fn block(stmts: &[Stmt]) -> Value {
    Value::Array(stmts.iter().map(stmt).collect())
}

fn stmt(s: &Stmt) -> Value {
    match &s.kind {
        StmtKind::Let {
            name,
            ty: t,
            mutable,
            value,
        } => {
            let mut obj = Map::new();
            obj.insert("kind".into(), json!("let"));
            obj.insert("name".into(), json!(name));
            if let Some(t) = t {
                obj.insert("type".into(), ty(t));
            }
            if *mutable {
                obj.insert("mutable".into(), json!(true));
            }
            obj.insert("value".into(), expr(value));
            Value::Object(obj)
        }
        StmtKind::Assign { name, value } => {
            json!({"kind": "assign", "name": name, "value": expr(value)})
        }
        StmtKind::Expr(e) => json!({"kind": "expr", "expr": expr(e)}),
        StmtKind::Return(None) => json!({"kind": "return"}),
        StmtKind::Return(Some(e)) => json!({"kind": "return", "value": expr(e)}),
        StmtKind::If {
            cond,
            then_body,
            else_body,
        } => {
            if else_body.is_empty() {
                json!({"kind": "if", "cond": expr(cond), "then": block(then_body)})
            } else {
                json!({"kind": "if", "cond": expr(cond), "then": block(then_body), "else": block(else_body)})
            }
        }
        StmtKind::While { cond, body } => {
            json!({"kind": "while", "cond": expr(cond), "body": block(body)})
        }
        StmtKind::For {
            var,
            start,
            end,
            body,
        } => json!({"kind": "for", "var": var, "start": expr(start), "end": expr(end), "body": block(body)}),
        StmtKind::Match { scrutinee, arms } => {
            let arms: Vec<Value> = arms
                .iter()
                .map(|a| json!({"pattern": pattern(&a.pattern), "body": block(&a.body)}))
                .collect();
            json!({"kind": "match", "scrutinee": expr(scrutinee), "arms": arms})
        }
        StmtKind::Observe { dist, params, value } => {
            json!({"kind": "observe", "dist": dist, "params": exprs(params), "value": expr(value)})
        }
        StmtKind::Break => json!({"kind": "break"}),
        StmtKind::Continue => json!({"kind": "continue"}),
    }
}

fn pattern(p: &Pattern) -> Value {
    match &p.kind {
        PatternKind::Wildcard => json!({"kind": "wildcard"}),
        PatternKind::Bind(n) => json!({"kind": "bind", "name": n}),
        PatternKind::Variant { variant, bindings } if bindings.is_empty() => {
            json!({"kind": "variant", "variant": variant})
        }
        PatternKind::Variant { variant, bindings } => {
            json!({"kind": "variant", "variant": variant, "bindings": bindings})
        }
        PatternKind::Literal(l) => json!({"kind": "literal", "value": literal(l)}),
        PatternKind::Type { ty: t, binding: None } => json!({"kind": "type", "type": ty(t)}),
        PatternKind::Type {
            ty: t,
            binding: Some(b),
        } => json!({"kind": "type", "type": ty(t), "binding": b}),
    }
}

// ── Expressions ──

fn literal(l: &Literal) -> Value {
    match l {
        Literal::Int(v) => {
            if let Ok(i) = i64::try_from(*v) {
                json!(i)
            } else {
                json!(*v as u64)
            }
        }
        Literal::Float(v) => json!(v),
        Literal::Bool(b) => json!(b),
        Literal::Str(s) => json!(s),
        Literal::Unit => Value::Null,
    }
}

fn exprs(es: &[Expr]) -> Value {
    Value::Array(es.iter().map(expr).collect())
}

fn with_type_args(mut v: Value, type_args: &[Type]) -> Value {
    if !type_args.is_empty() {
        if let Value::Object(obj) = &mut v {
            obj.insert("type_args".into(), types(type_args));
        }
    }
    v
}

pub fn expr(e: &Expr) -> Value {
    match &e.kind {
        ExprKind::Lit { ty: None, value } => json!({"kind": "lit", "value": literal(value)}),
        ExprKind::Lit { ty: Some(t), value } => {
            json!({"kind": "lit", "type": ty(t), "value": literal(value)})
        }
        ExprKind::Var(n) => json!({"kind": "var", "name": n}),
        ExprKind::Binary { op, lhs, rhs } => {
            json!({"kind": "binary", "op": op.symbol(), "lhs": expr(lhs), "rhs": expr(rhs)})
        }
        ExprKind::Unary { op, operand } => {
            json!({"kind": "unary", "op": op.symbol(), "operand": expr(operand)})
        }
        ExprKind::Call {
            callee,
            type_args,
            args,
        } => with_type_args(
            json!({"kind": "call", "callee": callee, "args": exprs(args)}),
            type_args,
        ),
        ExprKind::MethodCall {
            receiver,
            method,
            args,
        } => json!({"kind": "method_call", "receiver": expr(receiver), "method": method, "args": exprs(args)}),
        ExprKind::AsDyn { interface, value } => {
            json!({"kind": "as_dyn", "interface": interface, "value": expr(value)})
        }
        ExprKind::Cast { ty: t, value } => {
            json!({"kind": "cast", "type": ty(t), "value": expr(value)})
        }
        ExprKind::Array(es) => json!({"kind": "array", "elems": exprs(es)}),
        ExprKind::Tuple(es) => json!({"kind": "tuple", "elems": exprs(es)}),
        ExprKind::Record {
            name,
            type_args,
            fields,
        } => {
            let fields: Map<String, Value> = fields.iter().map(|(n, e)| (n.clone(), expr(e))).collect();
            with_type_args(
                json!({"kind": "record", "name": name, "fields": fields}),
                type_args,
            )
        }
        ExprKind::Variant {
            enum_name,
            variant,
            type_args,
            payload,
        } => {
            let mut v = json!({"kind": "variant", "enum": enum_name, "variant": variant});
            if !payload.is_empty() {
                if let Value::Object(obj) = &mut v {
                    obj.insert("payload".into(), exprs(payload));
                }
            }
            with_type_args(v, type_args)
        }
        ExprKind::Some(v) => json!({"kind": "some", "value": expr(v)}),
        ExprKind::None(t) => json!({"kind": "none", "type": ty(t)}),
        ExprKind::Map {
            key,
            value,
            entries,
        } => {
            let entries: Vec<Value> = entries
                .iter()
                .map(|(k, v)| json!([expr(k), expr(v)]))
                .collect();
            json!({"kind": "map", "key": ty(key), "value": ty(value), "entries": entries})
        }
        ExprKind::Set { elem, elems } => {
            json!({"kind": "set", "elem": ty(elem), "elems": exprs(elems)})
        }
        ExprKind::Field { base, field } => {
            json!({"kind": "field", "base": expr(base), "field": field})
        }
        ExprKind::Index { base, index } => {
            json!({"kind": "index", "base": expr(base), "index": expr(index)})
        }
        ExprKind::Intrinsic { name, args } => {
            json!({"kind": "intrinsic", "name": name, "args": exprs(args)})
        }
        ExprKind::Sample { dist, params } => {
            json!({"kind": "sample", "dist": dist, "params": exprs(params)})
        }
    }
}
