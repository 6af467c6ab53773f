// Integration tests: verify that generated Rust code compiles and runs correctly.
//
// Each case writes `sirsc --emit rust` output into a throwaway binary crate
// that depends on `sirs-runtime` by path, builds it with the same cargo that
// runs the tests, and compares its stdout with the reference interpreter.
// The scratch crates share one target directory so the runtime is built once.
// Skipped automatically if cargo cannot be found.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use std::sync::atomic::{AtomicUsize, Ordering};

fn project_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .parent()
        .unwrap()
        .to_path_buf()
}

fn sirsc_binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_sirsc"))
}

fn cargo() -> Option<String> {
    let cargo = std::env::var("CARGO").unwrap_or_else(|_| "cargo".to_string());
    Command::new(&cargo)
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
        .then_some(cargo)
}

// ── Helpers ─────────────────────────────────────────────────────────────────

/// Unique counter for scratch crate names (avoids collisions in parallel tests).
static COUNTER: AtomicUsize = AtomicUsize::new(0);

fn run_sirsc(args: &[&str]) -> Output {
    Command::new(sirsc_binary())
        .args(args)
        .output()
        .expect("failed to run sirsc")
}

/// Build the generated source as a binary crate and return its stdout, or
/// `None` when no cargo is available.
fn build_and_run(rust_source: &str, name: &str) -> Option<String> {
    let cargo = match cargo() {
        Some(c) => c,
        None => {
            eprintln!("SKIP: cargo not found");
            return None;
        }
    };

    let root = project_root();
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    let dir = std::env::temp_dir().join(format!("sirsc_gen_{}_{}_{}", name, std::process::id(), n));
    std::fs::create_dir_all(dir.join("src")).expect("create scratch crate");
    let manifest = format!(
        "[package]\nname = \"sirsc-gen-{name}\"\nversion = \"0.0.0\"\nedition = \"2021\"\n\n\
         [dependencies]\nsirs-runtime = {{ path = {:?} }}\n\n[workspace]\n",
        root.join("runtime").to_string_lossy()
    );
    std::fs::write(dir.join("Cargo.toml"), manifest).expect("write manifest");
    std::fs::write(dir.join("src").join("main.rs"), rust_source).expect("write main.rs");
    // Reuse the workspace's resolved versions so the build works offline.
    let lock = root.join("Cargo.lock");
    if lock.exists() {
        let _ = std::fs::copy(&lock, dir.join("Cargo.lock"));
    }

    let target = root.join("target").join("sirsc-gen");
    let out = Command::new(&cargo)
        .args(["run", "--quiet", "--offline", "--manifest-path"])
        .arg(dir.join("Cargo.toml"))
        .env("CARGO_TARGET_DIR", &target)
        .output()
        .expect("failed to run cargo");
    let _ = std::fs::remove_dir_all(&dir);

    assert!(
        out.status.success(),
        "generated code for {name} failed to build or run:\n{}",
        String::from_utf8_lossy(&out.stderr)
    );
    Some(String::from_utf8(out.stdout).expect("utf-8 stdout"))
}

/// Expected stdout of a generated binary: printed lines, then the result.
fn interpreter_stdout(doc: &str) -> String {
    let out = run_sirsc(&["--emit", "run", doc]);
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    let report: serde_json::Value = serde_json::from_slice(&out.stdout).expect("run report");
    let mut expected = String::new();
    for line in report["output"].as_array().expect("output") {
        expected.push_str(line.as_str().expect("line"));
        expected.push('\n');
    }
    if !report["result"].is_null() {
        expected.push_str(&report["result"].to_string());
        expected.push('\n');
    }
    expected
}

fn assert_doc_runs_like_interpreter(doc: &Path, name: &str) {
    let doc = doc.to_str().unwrap();
    let gen = run_sirsc(&["--emit", "rust", doc]);
    assert!(gen.status.success(), "{}", String::from_utf8_lossy(&gen.stderr));
    let source = String::from_utf8(gen.stdout).expect("utf-8 source");
    if let Some(stdout) = build_and_run(&source, name) {
        assert_eq!(stdout, interpreter_stdout(doc));
    }
}

// ── Cases ───────────────────────────────────────────────────────────────────

#[test]
fn add_demo_prints_thirty() {
    let doc = project_root().join("demos").join("add.json");
    let gen = run_sirsc(&["--emit", "rust", doc.to_str().unwrap()]);
    assert!(gen.status.success());
    let source = String::from_utf8(gen.stdout).unwrap();
    if let Some(stdout) = build_and_run(&source, "add") {
        assert_eq!(stdout.trim(), "30");
    }
}

#[test]
fn control_flow_and_printing_match_interpreter() {
    let doc = serde_json::json!({"functions": [
        {"name": "square", "params": [{"name": "v", "type": "i64"}], "returns": "i64", "body": [
            {"kind": "return", "value": {"kind": "binary", "op": "*",
                "lhs": {"kind": "var", "name": "v"}, "rhs": {"kind": "var", "name": "v"}}}
        ]},
        {"name": "main", "params": [], "returns": "i64", "body": [
            {"kind": "let", "name": "s", "type": "i64", "mutable": true, "value": {"kind": "lit", "value": 0}},
            {"kind": "for", "var": "i", "start": {"kind": "lit", "value": 0}, "end": {"kind": "lit", "value": 10}, "body": [
                {"kind": "if", "cond": {"kind": "binary", "op": "==",
                    "lhs": {"kind": "binary", "op": "%", "lhs": {"kind": "var", "name": "i"}, "rhs": {"kind": "lit", "value": 3}},
                    "rhs": {"kind": "lit", "value": 0}},
                 "then": [{"kind": "continue"}]},
                {"kind": "assign", "name": "s", "value": {"kind": "binary", "op": "+",
                    "lhs": {"kind": "var", "name": "s"},
                    "rhs": {"kind": "call", "callee": "square", "args": [{"kind": "var", "name": "i"}]}}}
            ]},
            {"kind": "expr", "expr": {"kind": "intrinsic", "name": "print", "args": [{"kind": "var", "name": "s"}]}},
            {"kind": "return", "value": {"kind": "var", "name": "s"}}
        ]}
    ]});
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    let path = std::env::temp_dir().join(format!("sirsc_gen_doc_{}_{}.json", std::process::id(), n));
    std::fs::write(&path, doc.to_string()).unwrap();
    assert_doc_runs_like_interpreter(&path, "control");
    let _ = std::fs::remove_file(&path);
}
