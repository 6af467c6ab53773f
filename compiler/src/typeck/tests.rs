use serde_json::{json, Value as Json};
use sirs_runtime::Registry;

use super::*;
use crate::diag::{has_errors, DiagLevel};
use crate::parser::parse_value;

fn check_doc(doc: Json) -> (Program, CheckResult) {
    check_with(doc, CheckOptions::default())
}

fn check_with(doc: Json, options: CheckOptions) -> (Program, CheckResult) {
    let parsed = parse_value(&doc);
    assert!(parsed.diagnostics.is_empty(), "{:?}", parsed.diagnostics);
    let program = parsed.program.expect("program");
    let registry = Registry::with_builtins();
    let result = check(&program, &registry, &options);
    (program, result)
}

fn codes_of(r: &CheckResult) -> Vec<&'static str> {
    r.diagnostics.iter().filter_map(|d| d.code.map(|c| c.0)).collect()
}

fn lit(v: Json) -> Json {
    json!({"kind": "lit", "value": v})
}

fn typed_lit(t: &str, v: Json) -> Json {
    json!({"kind": "lit", "type": t, "value": v})
}

fn var(n: &str) -> Json {
    json!({"kind": "var", "name": n})
}

fn bin(op: &str, l: Json, r: Json) -> Json {
    json!({"kind": "binary", "op": op, "lhs": l, "rhs": r})
}

fn ret(e: Json) -> Json {
    json!({"kind": "return", "value": e})
}

fn main_fn(returns: &str, body: Json) -> Json {
    json!({"functions": [{"name": "main", "params": [], "returns": returns, "body": body}]})
}

fn shapes_doc(arms: Json) -> Json {
    json!({
        "types": [{"name": "Shape", "enum": {"variants": [
            {"name": "A"}, {"name": "B", "payload": ["i32"]}, {"name": "C"}]}}],
        "functions": [{"name": "f", "params": [{"name": "s", "type": "Shape"}], "returns": "i32", "body": [
            {"kind": "match", "scrutinee": var("s"), "arms": arms},
            ret(typed_lit("i32", json!(0)))
        ]}]
    })
}

// ── Basics ──

#[test]
fn sum_of_two_locals() {
    let (program, r) = check_doc(main_fn(
        "i32",
        json!([
            {"kind": "let", "name": "a", "type": "i32", "value": lit(json!(10))},
            {"kind": "let", "name": "b", "type": "i32", "value": lit(json!(20))},
            ret(bin("+", var("a"), var("b")))
        ]),
    ));
    assert!(r.diagnostics.is_empty(), "{:?}", r.diagnostics);
    let mut count = 0;
    visit_exprs(&program.functions[0].body, &mut |e| {
        count += 1;
        assert!(r.typed.type_of(e.id).is_some(), "untyped expression at {}", e.span);
    });
    assert_eq!(count, 5);
}

#[test]
fn untyped_literal_adopts_context_type() {
    let (_, r) = check_doc(main_fn(
        "i32",
        json!([{"kind": "let", "name": "a", "type": "i32", "value": var("x")}]),
    ));
    assert_eq!(codes_of(&r), vec!["E0201", "E0207"]);

    let (program, r) = check_doc(main_fn("u8", json!([ret(lit(json!(200)))])));
    assert!(r.diagnostics.is_empty(), "{:?}", r.diagnostics);
    let StmtKind::Return(Some(e)) = &program.functions[0].body[0].kind else {
        panic!("expected return");
    };
    assert_eq!(r.typed.type_of(e.id), Some(&Type::primitive("u8").unwrap()));
}

#[test]
fn integer_literal_is_not_a_float() {
    let (_, r) = check_doc(main_fn("f64", json!([ret(lit(json!(1)))])));
    assert_eq!(codes_of(&r), vec!["E0200"]);
    let d = &r.diagnostics[0];
    assert_eq!(d.span.as_str(), "/functions/0/body/0/value");
    assert!(d.message.contains("expected f64, found i64"), "{}", d.message);
    assert!(d.hint.as_deref().unwrap_or("").contains("cast"));
}

#[test]
fn widening_follows_policy() {
    let doc = json!({"functions": [{"name": "f", "params": [{"name": "x", "type": "i16"}],
        "returns": "i64", "body": [ret(var("x"))]}]});
    let (program, r) = check_doc(doc.clone());
    assert!(r.diagnostics.is_empty(), "{:?}", r.diagnostics);
    let StmtKind::Return(Some(e)) = &program.functions[0].body[0].kind else {
        panic!("expected return");
    };
    assert!(matches!(r.typed.coercions.get(&e.id), Some(Coercion::Widen { .. })));
    assert_eq!(r.typed.value_type(e.id), Some(crate::types::I64));

    let (_, r) = check_with(
        doc,
        CheckOptions {
            widening: WideningPolicy::Strict,
        },
    );
    assert_eq!(codes_of(&r), vec!["E0200"]);
}

#[test]
fn mixed_operands_widen_to_common_type() {
    let doc = json!({"functions": [{"name": "f",
        "params": [{"name": "a", "type": "i32"}, {"name": "b", "type": "i64"}],
        "returns": "i64", "body": [ret(bin("+", var("a"), var("b")))]}]});
    let (_, r) = check_doc(doc);
    assert!(r.diagnostics.is_empty(), "{:?}", r.diagnostics);
    assert_eq!(r.typed.coercions.len(), 1);
}

#[test]
fn operator_not_defined_for_bool() {
    let (_, r) = check_doc(main_fn(
        "bool",
        json!([ret(bin("+", lit(json!(true)), lit(json!(false))))]),
    ));
    assert_eq!(codes_of(&r), vec!["E0204"]);
}

#[test]
fn assignment_to_immutable_binding() {
    let (_, r) = check_doc(main_fn(
        "unit",
        json!([
            {"kind": "let", "name": "a", "value": lit(json!(1))},
            {"kind": "assign", "name": "a", "value": lit(json!(2))}
        ]),
    ));
    assert_eq!(codes_of(&r), vec!["E0205"]);
}

#[test]
fn errors_accumulate() {
    let (_, r) = check_doc(main_fn(
        "i32",
        json!([
            {"kind": "let", "name": "a", "type": "i32", "value": lit(json!(true))},
            {"kind": "expr", "expr": var("nope")},
            {"kind": "expr", "expr": {"kind": "call", "callee": "missing", "args": []}},
            ret(typed_lit("i32", json!(0)))
        ]),
    ));
    assert_eq!(codes_of(&r), vec!["E0200", "E0201", "E0201"]);
}

#[test]
fn arity_mismatch_on_call() {
    let doc = json!({"functions": [
        {"name": "g", "params": [{"name": "x", "type": "i32"}], "returns": "i32", "body": [ret(var("x"))]},
        {"name": "main", "params": [], "body": [
            {"kind": "expr", "expr": {"kind": "call", "callee": "g", "args": []}}]}
    ]});
    let (_, r) = check_doc(doc);
    assert_eq!(codes_of(&r), vec!["E0203"]);
}

// ── Control flow ──

#[test]
fn missing_return_detected() {
    let (_, r) = check_doc(main_fn(
        "i32",
        json!([{"kind": "if", "cond": lit(json!(true)), "then": [ret(typed_lit("i32", json!(1)))]}]),
    ));
    assert_eq!(codes_of(&r), vec!["E0207"]);
    assert_eq!(r.diagnostics[0].span.as_str(), "/functions/0");
}

#[test]
fn infinite_loop_needs_no_return() {
    let (_, r) = check_doc(main_fn(
        "i32",
        json!([{"kind": "while", "cond": lit(json!(true)), "body": []}]),
    ));
    assert!(r.diagnostics.is_empty(), "{:?}", r.diagnostics);

    let (_, r) = check_doc(main_fn(
        "i32",
        json!([{"kind": "while", "cond": lit(json!(true)), "body": [{"kind": "break"}]}]),
    ));
    assert_eq!(codes_of(&r), vec!["E0207"]);
}

#[test]
fn break_outside_loop() {
    let (_, r) = check_doc(main_fn("unit", json!([{"kind": "break"}])));
    assert_eq!(codes_of(&r), vec!["E0211"]);
}

#[test]
fn unreachable_statement_warns() {
    let (_, r) = check_doc(main_fn(
        "i32",
        json!([ret(typed_lit("i32", json!(1))), {"kind": "expr", "expr": lit(json!(2))}]),
    ));
    assert_eq!(codes_of(&r), vec!["W0214"]);
    assert!(!has_errors(&r.diagnostics));
    assert_eq!(r.diagnostics[0].level, DiagLevel::Warning);
}

#[test]
fn for_loop_variable_takes_bound_type() {
    let doc = json!({"functions": [{"name": "f", "params": [{"name": "n", "type": "i32"}],
        "returns": "i32", "body": [
            {"kind": "let", "name": "s", "type": "i32", "mutable": true, "value": lit(json!(0))},
            {"kind": "for", "var": "i", "start": lit(json!(0)), "end": var("n"), "body": [
                {"kind": "assign", "name": "s", "value": bin("+", var("s"), var("i"))}]},
            ret(var("s"))
        ]}]});
    let (program, r) = check_doc(doc);
    assert!(r.diagnostics.is_empty(), "{:?}", r.diagnostics);
    let for_span = &program.functions[0].body[1].span;
    assert_eq!(r.typed.binding_types.get(for_span), Some(&Type::primitive("i32").unwrap()));
}

// ── Match ──

#[test]
fn non_exhaustive_match_names_missing_variant() {
    let (_, r) = check_doc(shapes_doc(json!([
        {"pattern": {"kind": "variant", "variant": "A"}, "body": []},
        {"pattern": {"kind": "variant", "variant": "B", "bindings": ["x"]}, "body": []}
    ])));
    assert_eq!(codes_of(&r), vec!["E0206"]);
    assert!(r.diagnostics[0].message.contains("missing variant(s) C"), "{}", r.diagnostics[0].message);
}

#[test]
fn wildcard_makes_match_exhaustive() {
    let (_, r) = check_doc(shapes_doc(json!([
        {"pattern": {"kind": "variant", "variant": "A"}, "body": []},
        {"pattern": {"kind": "wildcard"}, "body": []}
    ])));
    assert!(r.diagnostics.is_empty(), "{:?}", r.diagnostics);
}

#[test]
fn arms_record_tags_and_bindings() {
    let (program, r) = check_doc(shapes_doc(json!([
        {"pattern": {"kind": "variant", "variant": "B", "bindings": ["x"]}, "body": [ret(var("x"))]},
        {"pattern": {"kind": "wildcard"}, "body": []},
        {"pattern": {"kind": "variant", "variant": "C"}, "body": []}
    ])));
    assert_eq!(codes_of(&r), vec!["W0214"]);
    let StmtKind::Match { arms, .. } = &program.functions[0].body[0].kind else {
        panic!("expected match");
    };
    let first = &r.typed.arms[&arms[0].span];
    assert_eq!(first.test, ArmTest::Tag(1));
    assert_eq!(first.bindings[0].source, BindSource::Slot(0));
    assert!(!r.typed.arms[&arms[2].span].reachable);
}

#[test]
fn invalid_variant_pattern() {
    let (_, r) = check_doc(shapes_doc(json!([
        {"pattern": {"kind": "variant", "variant": "B"}, "body": []},
        {"pattern": {"kind": "wildcard"}, "body": []}
    ])));
    assert_eq!(codes_of(&r), vec!["E0210"]);
}

#[test]
fn optional_and_union_matches() {
    let doc = json!({"functions": [
        {"name": "f", "params": [{"name": "o", "type": {"optional": "i64"}}], "returns": "i64", "body": [
            {"kind": "match", "scrutinee": var("o"), "arms": [
                {"pattern": {"kind": "variant", "variant": "some", "bindings": ["v"]}, "body": [ret(var("v"))]},
                {"pattern": {"kind": "variant", "variant": "none"}, "body": [ret(lit(json!(0)))]}
            ]}]},
        {"name": "g", "params": [{"name": "u", "type": {"union": ["i64", "string"]}}], "returns": "i64", "body": [
            {"kind": "match", "scrutinee": var("u"), "arms": [
                {"pattern": {"kind": "type", "type": "i64", "binding": "n"}, "body": [ret(var("n"))]}
            ]},
            ret(lit(json!(0)))]}
    ]});
    let (_, r) = check_doc(doc);
    assert_eq!(codes_of(&r), vec!["E0206"]);
    assert!(r.diagnostics[0].message.contains("string"));
}

#[test]
fn union_injection_is_recorded() {
    let doc = json!({"functions": [{"name": "f", "params": [], "returns": {"union": ["i64", "string"]},
        "body": [ret(lit(json!("hi")))]}]});
    let (program, r) = check_doc(doc);
    assert!(r.diagnostics.is_empty(), "{:?}", r.diagnostics);
    let StmtKind::Return(Some(e)) = &program.functions[0].body[0].kind else {
        panic!("expected return");
    };
    assert!(matches!(r.typed.coercions.get(&e.id), Some(Coercion::Inject { tag: 1, .. })));
}

// ── Generics and interfaces ──

fn generic_doc(arg: Json) -> Json {
    json!({"functions": [
        {"name": "max", "type_params": [{"name": "T", "bounds": ["Ord"]}],
         "params": [{"name": "a", "type": "T"}, {"name": "b", "type": "T"}], "returns": "T", "body": [
            {"kind": "if", "cond": bin(">", var("a"), var("b")), "then": [ret(var("a"))]},
            ret(var("b"))]},
        {"name": "main", "params": [], "body": [
            {"kind": "expr", "expr": {"kind": "call", "callee": "max", "args": [arg.clone(), arg]}}]}
    ]})
}

#[test]
fn generic_call_infers_type_arguments() {
    let (program, r) = check_doc(generic_doc(typed_lit("f32", json!(1.5))));
    assert!(r.diagnostics.is_empty(), "{:?}", r.diagnostics);
    let StmtKind::Expr(call) = &program.functions[1].body[0].kind else {
        panic!("expected call");
    };
    assert_eq!(r.typed.call_type_args[&call.id], vec![Type::primitive("f32").unwrap()]);
    assert_eq!(r.typed.type_of(call.id), Some(&Type::primitive("f32").unwrap()));
}

#[test]
fn unsatisfied_bound_is_reported() {
    let (_, r) = check_doc(generic_doc(lit(json!(true))));
    assert_eq!(codes_of(&r), vec!["E0208"]);
}

#[test]
fn generic_body_limited_to_bounds() {
    let doc = json!({"functions": [{"name": "add", "type_params": [{"name": "T"}],
        "params": [{"name": "a", "type": "T"}, {"name": "b", "type": "T"}], "returns": "T",
        "body": [ret(bin("+", var("a"), var("b")))]}]});
    let (_, r) = check_doc(doc);
    assert_eq!(codes_of(&r), vec!["E0204"]);
}

fn area_doc(main_body: Json) -> Json {
    json!({
        "types": [
            {"name": "Sq", "record": {"fields": [{"name": "s", "type": "f64"}]}},
            {"name": "Circle", "record": {"fields": [{"name": "r", "type": "f64"}]}}
        ],
        "interfaces": [{"name": "Area", "methods": [{"name": "area", "returns": "f64"}]}],
        "impls": [{"interface": "Area", "for": "Sq", "methods": {"area": "sq_area"}}],
        "functions": [
            {"name": "sq_area", "params": [{"name": "q", "type": "Sq"}], "returns": "f64", "body": [
                ret(bin("*", json!({"kind": "field", "base": var("q"), "field": "s"}),
                             json!({"kind": "field", "base": var("q"), "field": "s"})))]},
            {"name": "main", "params": [], "returns": "f64", "body": main_body}
        ]
    })
}

#[test]
fn dyn_dispatch_resolves_slot() {
    let (program, r) = check_doc(area_doc(json!([
        {"kind": "let", "name": "d", "value": {"kind": "as_dyn", "interface": "Area",
            "value": {"kind": "record", "name": "Sq", "fields": {"s": lit(json!(2.0))}}}},
        ret(json!({"kind": "method_call", "receiver": var("d"), "method": "area", "args": []}))
    ])));
    assert!(r.diagnostics.is_empty(), "{:?}", r.diagnostics);
    let StmtKind::Return(Some(call)) = &program.functions[1].body[1].kind else {
        panic!("expected return");
    };
    assert_eq!(
        r.typed.methods[&call.id],
        MethodTarget::Dynamic {
            interface: "Area".into(),
            slot: 0
        }
    );
}

#[test]
fn as_dyn_requires_impl() {
    let (_, r) = check_doc(area_doc(json!([
        {"kind": "let", "name": "d", "value": {"kind": "as_dyn", "interface": "Area",
            "value": {"kind": "record", "name": "Circle", "fields": {"r": lit(json!(1.0))}}}},
        ret(lit(json!(0.0)))
    ])));
    assert_eq!(codes_of(&r), vec!["E0209"]);
}

#[test]
fn static_method_call() {
    let (program, r) = check_doc(area_doc(json!([
        ret(json!({"kind": "method_call",
             "receiver": {"kind": "record", "name": "Sq", "fields": {"s": lit(json!(3.0))}},
             "method": "area", "args": []}))
    ])));
    assert!(r.diagnostics.is_empty(), "{:?}", r.diagnostics);
    let StmtKind::Return(Some(call)) = &program.functions[1].body[0].kind else {
        panic!("expected return");
    };
    assert_eq!(
        r.typed.methods[&call.id],
        MethodTarget::Static {
            function: "sq_area".into()
        }
    );
}

#[test]
fn generic_enum_needs_type_arguments() {
    let doc = json!({
        "types": [{"name": "Opt", "type_params": ["T"], "enum": {"variants": [
            {"name": "Nothing"}, {"name": "Just", "payload": ["T"]}]}}],
        "functions": [{"name": "main", "params": [], "body": [
            {"kind": "let", "name": "a", "value": {"kind": "variant", "enum": "Opt", "variant": "Just",
                "payload": [typed_lit("i8", json!(1))]}},
            {"kind": "let", "name": "b", "value": {"kind": "variant", "enum": "Opt", "variant": "Nothing"}},
            {"kind": "let", "name": "c", "type": {"named": {"name": "Opt", "args": ["f64"]}},
                "value": {"kind": "variant", "enum": "Opt", "variant": "Nothing"}}
        ]}]
    });
    let (program, r) = check_doc(doc);
    assert_eq!(codes_of(&r), vec!["E0213"]);
    let a = &program.functions[0].body[0].span;
    assert_eq!(r.typed.binding_types[a].to_string(), "Opt<i8>");
}

// ── Intrinsics and distributions ──

#[test]
fn collection_intrinsics() {
    let m = json!({"kind": "map", "key": "string", "value": "i64", "entries": [[lit(json!("a")), lit(json!(1))]]});
    let (_, r) = check_doc(main_fn(
        "i64",
        json!([
            {"kind": "let", "name": "m", "value": m},
            {"kind": "let", "name": "g", "value": {"kind": "intrinsic", "name": "get", "args": [var("m"), lit(json!("a"))]}},
            {"kind": "let", "name": "m2", "value": {"kind": "intrinsic", "name": "insert",
                "args": [var("m"), lit(json!("b")), lit(json!(2))]}},
            {"kind": "expr", "expr": {"kind": "intrinsic", "name": "print", "args": [var("g"), var("m2")]}},
            ret(json!({"kind": "intrinsic", "name": "len", "args": [var("m2")]}))
        ]),
    ));
    assert!(r.diagnostics.is_empty(), "{:?}", r.diagnostics);
}

#[test]
fn sample_and_observe_use_registry() {
    let (_, r) = check_doc(main_fn(
        "f64",
        json!([
            {"kind": "let", "name": "x", "value": {"kind": "sample", "dist": "normal",
                "params": [lit(json!(0.0)), lit(json!(1.0))]}},
            {"kind": "observe", "dist": "bernoulli", "params": [lit(json!(0.5))], "value": lit(json!(1))},
            ret(var("x"))
        ]),
    ));
    assert!(r.diagnostics.is_empty(), "{:?}", r.diagnostics);

    let (_, r) = check_doc(main_fn(
        "unit",
        json!([
            {"kind": "expr", "expr": {"kind": "sample", "dist": "nope", "params": []}},
            {"kind": "expr", "expr": {"kind": "sample", "dist": "normal", "params": [lit(json!(0.0))]}},
            {"kind": "expr", "expr": {"kind": "sample", "dist": "normal",
                "params": [lit(json!(0.0)), lit(json!(-1.0))]}}
        ]),
    ));
    assert_eq!(codes_of(&r), vec!["E0212", "E0203", "E0212"]);
}

#[test]
fn describe_lists_signatures() {
    let (program, r) = check_doc(generic_doc(typed_lit("i32", json!(1))));
    let d = r.typed.describe(&program);
    assert_eq!(d["functions"][0]["signature"], "fn(T, T) -> T");
    assert_eq!(d["functions"][1]["exprs"]["/functions/1/body/0/expr"], "i32");
}
