use serde_json::{json, Value as Json};
use sirs_runtime::Registry;

use super::*;
use crate::diag::has_errors;
use crate::parser::parse_value;
use crate::pass::StageCert;
use crate::typeck::{check, CheckOptions};

fn lower_doc(doc: Json) -> LowerResult {
    let parsed = parse_value(&doc);
    assert!(parsed.diagnostics.is_empty(), "{:?}", parsed.diagnostics);
    let program = parsed.program.expect("program");
    let registry = Registry::with_builtins();
    let checked = check(&program, &registry, &CheckOptions::default());
    assert!(!has_errors(&checked.diagnostics), "{:?}", checked.diagnostics);
    lower(&program, &checked.typed)
}

fn lit(v: Json) -> Json {
    json!({"kind": "lit", "value": v})
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

fn clean(r: &LowerResult) {
    assert!(r.diagnostics.is_empty(), "{:?}", r.diagnostics);
    assert!(r.cert.all_pass(), "{:?}\n{}", r.cert.obligations(), r.cir);
}

#[test]
fn sum_of_two_locals() {
    let r = lower_doc(json!({"functions": [{"name": "main", "params": [], "returns": "i32", "body": [
        {"kind": "let", "name": "a", "type": "i32", "value": lit(json!(10))},
        {"kind": "let", "name": "b", "type": "i32", "value": lit(json!(20))},
        ret(bin("+", var("a"), var("b")))
    ]}]}));
    clean(&r);
    let main = r.cir.function("main").expect("main");
    assert_eq!(main.blocks.len(), 1);
    assert_eq!(main.locals.len(), 2);
    let text = main.to_string();
    assert!(text.contains("store $0, 10"), "{text}");
    assert!(text.contains("%2 = add.i32 %0, %1"), "{text}");
    assert!(text.contains("ret %2"), "{text}");
}

#[test]
fn if_without_else_branches_to_join() {
    let r = lower_doc(json!({"functions": [{"name": "f", "params": [{"name": "x", "type": "i64"}],
        "returns": "i64", "body": [
            {"kind": "if", "cond": bin("<", var("x"), lit(json!(0))), "then": [ret(lit(json!(0)))]},
            ret(var("x"))
    ]}]}));
    clean(&r);
    let f = &r.cir.functions[0];
    // entry, then, join
    assert_eq!(f.blocks.len(), 3);
    assert!(matches!(f.blocks[0].term, Terminator::Branch { .. }));
    assert!(matches!(f.blocks[1].term, Terminator::Return(_)));
}

#[test]
fn code_after_return_is_dropped() {
    let r = lower_doc(json!({"functions": [{"name": "f", "params": [], "returns": "i64", "body": [
        {"kind": "if", "cond": lit(json!(true)), "then": [ret(lit(json!(1)))], "else": [ret(lit(json!(2)))]},
    ]}]}));
    clean(&r);
    assert_eq!(r.cir.functions[0].blocks.len(), 3);
}

#[test]
fn while_loop_forms_natural_loop() {
    let r = lower_doc(json!({"functions": [{"name": "f", "params": [], "returns": "i64", "body": [
        {"kind": "let", "name": "i", "mutable": true, "value": lit(json!(0))},
        {"kind": "while", "cond": bin("<", var("i"), lit(json!(10))), "body": [
            {"kind": "assign", "name": "i", "value": bin("+", var("i"), lit(json!(1)))}
        ]},
        ret(var("i"))
    ]}]}));
    clean(&r);
    let cfg = crate::cfg::Cfg::build(&r.cir.functions[0]);
    let loops = cfg.natural_loops();
    assert_eq!(loops.len(), 1);
    assert_eq!(loops[0].header, BlockId(1));
}

#[test]
fn infinite_loop_with_break() {
    let r = lower_doc(json!({"functions": [{"name": "f", "params": [], "returns": "i64", "body": [
        {"kind": "while", "cond": lit(json!(true)), "body": [{"kind": "break"}]},
        ret(lit(json!(3)))
    ]}]}));
    clean(&r);
}

#[test]
fn for_loop_evaluates_end_once() {
    let r = lower_doc(json!({"functions": [{"name": "f", "params": [{"name": "n", "type": "i64"}],
        "returns": "i64", "body": [
            {"kind": "let", "name": "s", "mutable": true, "value": lit(json!(0))},
            {"kind": "for", "var": "i", "start": lit(json!(0)), "end": var("n"), "body": [
                {"kind": "assign", "name": "s", "value": bin("+", var("s"), var("i"))}
            ]},
            ret(var("s"))
    ]}]}));
    clean(&r);
    let f = &r.cir.functions[0];
    let names: Vec<&str> = f.locals.iter().map(|l| l.name.as_str()).collect();
    assert_eq!(names, vec!["n", "s", "i", "i.end"]);
    // The bound is read from its slot, never from `n`, inside the loop.
    let cfg = crate::cfg::Cfg::build(f);
    let lp = &cfg.natural_loops()[0];
    for b in &lp.body {
        for inst in &f.blocks[b.index()].insts {
            assert!(!matches!(inst.kind, InstKind::Load(LocalId(0))), "{inst}");
        }
    }
}

#[test]
fn match_tests_tags_in_order() {
    let r = lower_doc(json!({
        "types": [{"name": "Shape", "enum": {"variants": [
            {"name": "A"}, {"name": "B", "payload": ["i32"]}, {"name": "C"}]}}],
        "functions": [{"name": "f", "params": [{"name": "s", "type": "Shape"}], "returns": "i32", "body": [
            {"kind": "match", "scrutinee": var("s"), "arms": [
                {"pattern": {"kind": "variant", "variant": "B", "bindings": ["x"]}, "body": [ret(var("x"))]},
                {"pattern": {"kind": "wildcard"}, "body": [ret(json!({"kind": "lit", "type": "i32", "value": 0}))]}
            ]}
        ]}]
    }));
    clean(&r);
    let text = r.cir.functions[0].to_string();
    assert!(text.contains("tag %"), "{text}");
    assert!(text.contains("eq.u32"), "{text}");
    assert!(text.contains("extract %"), "{text}");
}

#[test]
fn generic_instances_are_named_by_arguments() {
    let r = lower_doc(json!({"functions": [
        {"name": "max", "type_params": [{"name": "T", "bounds": ["Ord"]}],
         "params": [{"name": "a", "type": "T"}, {"name": "b", "type": "T"}], "returns": "T", "body": [
            {"kind": "if", "cond": bin(">", var("a"), var("b")), "then": [ret(var("a"))]},
            ret(var("b"))]},
        {"name": "main", "params": [], "body": [
            {"kind": "expr", "expr": {"kind": "call", "callee": "max",
                "args": [{"kind": "lit", "type": "i32", "value": 1}, {"kind": "lit", "type": "i32", "value": 2}]}},
            {"kind": "expr", "expr": {"kind": "call", "callee": "max",
                "args": [{"kind": "lit", "type": "f64", "value": 1.0}, {"kind": "lit", "type": "f64", "value": 2.0}]}},
            {"kind": "expr", "expr": {"kind": "call", "callee": "max",
                "args": [{"kind": "lit", "type": "i32", "value": 3}, {"kind": "lit", "type": "i32", "value": 4}]}}
        ]}
    ]}));
    clean(&r);
    let names: Vec<&str> = r.cir.functions.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names, vec!["main", "max<i32>", "max<f64>"]);
    let text = r.cir.function("max<f64>").expect("instance").to_string();
    assert!(text.contains("gt.f64"), "{text}");
}

#[test]
fn dyn_values_dispatch_through_vtables() {
    let r = lower_doc(json!({
        "types": [{"name": "Sq", "record": {"fields": [{"name": "s", "type": "f64"}]}}],
        "interfaces": [{"name": "Area", "methods": [{"name": "area", "returns": "f64"}]}],
        "impls": [{"interface": "Area", "for": "Sq", "methods": {"area": "sq_area"}}],
        "functions": [
            {"name": "sq_area", "params": [{"name": "q", "type": "Sq"}], "returns": "f64", "body": [
                ret(bin("*", json!({"kind": "field", "base": var("q"), "field": "s"}),
                             json!({"kind": "field", "base": var("q"), "field": "s"})))]},
            {"name": "main", "params": [], "returns": "f64", "body": [
                {"kind": "let", "name": "d", "value": {"kind": "as_dyn", "interface": "Area",
                    "value": {"kind": "record", "name": "Sq", "fields": {"s": lit(json!(2.0))}}}},
                ret(json!({"kind": "method_call", "receiver": var("d"), "method": "area", "args": []}))
            ]}
        ]
    }));
    clean(&r);
    assert_eq!(r.cir.dispatch.lookup("Area", 0, 0), Some("sq_area"));
    let text = r.cir.to_string();
    assert!(text.contains("vtable Area for #0 = [sq_area]"), "{text}");
    assert!(text.contains("make_dyn #0"), "{text}");
    assert!(text.contains("call_dyn Area[0]"), "{text}");
}

#[test]
fn short_circuit_uses_a_join_block() {
    let r = lower_doc(json!({"functions": [{"name": "f", "params": [{"name": "a", "type": "bool"}, {"name": "b", "type": "bool"}],
        "returns": "bool", "body": [ret(bin("&&", var("a"), var("b")))]}]}));
    clean(&r);
    let f = &r.cir.functions[0];
    assert_eq!(f.blocks.len(), 3);
    assert_eq!(f.locals[2].name, "and.tmp");
}

#[test]
fn instance_name_format() {
    assert_eq!(instance_name("pair", &[Type::Bool, crate::types::F64]), "pair<bool, f64>");
}
