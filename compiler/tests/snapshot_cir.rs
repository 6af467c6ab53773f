// Snapshot tests: lock the CIR text form to detect unintended structural changes.
//
// Uses the library API (parse → check → lower → optimize) and snapshots the
// Display output. Snapshots are managed by `insta`.
//
// Run `cargo insta review` after intentional output changes to update baselines.

use std::sync::Arc;

use sirs_runtime::Registry;
use sirsc::codegen::CodegenOptions;
use sirsc::opt::OptLevel;
use sirsc::pass::PassId;
use sirsc::pipeline::{compile, CompileOptions};

fn cir_snapshot(source: &str, level: OptLevel) -> String {
    let options = CompileOptions {
        opt_level: level,
        ..CompileOptions::default()
    };
    let state = compile(
        source,
        Arc::new(Registry::with_builtins()),
        PassId::Optimize,
        &options,
        &CodegenOptions::default(),
    )
    .unwrap_or_else(|e| panic!("compile failed: {e}"));
    state.final_cir().expect("cir").to_string()
}

#[test]
fn constant_return_folds() {
    let source = r#"{"functions": [{"name": "main", "params": [], "returns": "i32", "body": [
        {"kind": "return", "value": {"kind": "binary", "op": "+",
            "lhs": {"kind": "lit", "value": 10}, "rhs": {"kind": "lit", "value": 20}}}
    ]}]}"#;
    insta::assert_snapshot!(cir_snapshot(source, OptLevel::O2), @r"
    fn main() -> i32 {
    bb0:
      ret 30
    }
    ");
}

#[test]
fn identity_keeps_its_parameter() {
    let source = r#"{"functions": [{"name": "id", "params": [{"name": "x", "type": "i64"}], "returns": "i64", "body": [
        {"kind": "return", "value": {"kind": "var", "name": "x"}}
    ]}]}"#;
    insta::assert_snapshot!(cir_snapshot(source, OptLevel::O0), @r"
    fn id(x: i64) -> i64 {
      local $0 x: i64
    bb0:
      %0 = load $0
      ret %0
    }
    ");
}
