// CLI tests: drive the `sirsc` binary over the documents in `demos/`.
//
// These lock the process contract: JSON on stdout, diagnostics on stderr,
// exit code 0 on success, 1 for rejected programs and runtime faults, 2 for
// usage and I/O errors.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};

fn sirsc_binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_sirsc"))
}

fn demo(name: &str) -> String {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .parent()
        .unwrap()
        .join("demos")
        .join(name)
        .to_str()
        .unwrap()
        .to_string()
}

fn run_sirsc(args: &[&str]) -> Output {
    Command::new(sirsc_binary())
        .args(args)
        .output()
        .expect("failed to run sirsc")
}

fn stdout_json(output: &Output) -> serde_json::Value {
    assert!(
        output.status.success(),
        "sirsc failed\nstderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).expect("stdout is JSON")
}

#[test]
fn run_prints_result_as_json() {
    let out = stdout_json(&run_sirsc(&["--emit", "run", &demo("add.json")]));
    assert_eq!(out["result"], 30);
    assert_eq!(out["log_weight"], 0.0);
    assert_eq!(out["output"], serde_json::json!([]));
}

#[test]
fn run_reads_arguments_from_stdin() {
    let mut child = Command::new(sirsc_binary())
        .args(["--emit", "run", &demo("sum_loop.json"), "--input", "-"])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("spawn sirsc");
    child.stdin.take().unwrap().write_all(b"[5]").unwrap();
    let out = stdout_json(&child.wait_with_output().unwrap());
    // 4 * (0 + 1 + 2 + 3 + 4)
    assert_eq!(out["result"], 40);
    assert_eq!(out["output"], serde_json::json!(["40"]));
}

#[test]
fn optimization_levels_agree() {
    let path = demo("sum_loop.json");
    let mut results = Vec::new();
    for level in ["0", "1", "2"] {
        let input = std::env::temp_dir().join(format!("sirsc-cli-args-{}-{level}.json", std::process::id()));
        std::fs::write(&input, "[9]").unwrap();
        let out = stdout_json(&run_sirsc(&[
            "--emit",
            "run",
            "-O",
            level,
            &path,
            "--input",
            input.to_str().unwrap(),
        ]));
        let _ = std::fs::remove_file(&input);
        results.push(out);
    }
    assert_eq!(results[0], results[1]);
    assert_eq!(results[1], results[2]);
}

#[test]
fn non_exhaustive_match_is_rejected() {
    let output = run_sirsc(&["--emit", "rust", &demo("shapes.json")]);
    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("E0206"), "stderr: {stderr}");
    assert!(stderr.contains("missing variant(s) C"), "stderr: {stderr}");
    assert!(output.stdout.is_empty());
}

#[test]
fn rust_output_is_byte_identical_across_runs() {
    let first = run_sirsc(&["--emit", "rust", &demo("add.json")]);
    let second = run_sirsc(&["--emit", "rust", &demo("add.json")]);
    assert!(first.status.success());
    assert_eq!(first.stdout, second.stdout);
    let text = String::from_utf8(first.stdout).unwrap();
    assert!(text.starts_with("// Generated by sirsc"), "{}", &text[..80.min(text.len())]);
    assert!(text.contains("fn main()"));
}

#[test]
fn entry_with_parameters_needs_no_main() {
    let output = run_sirsc(&["--emit", "rust", &demo("sum_loop.json")]);
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("E0501"));

    let output = run_sirsc(&["--emit", "rust", "--no-main", &demo("sum_loop.json")]);
    assert!(output.status.success());
    let text = String::from_utf8_lossy(&output.stdout);
    assert!(text.contains("// scale"), "{text}");
    assert!(!text.contains("fn main()"));
}

#[test]
fn verbose_logs_pass_contracts() {
    let output = Command::new(sirsc_binary())
        .args(["--emit", "cir", "--verbose", &demo("add.json")])
        .env_remove("RUST_LOG")
        .output()
        .expect("failed to run sirsc");
    assert!(output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("pass contract"), "stderr: {stderr}");
    assert!(stderr.contains("observable behavior unchanged"), "stderr: {stderr}");
    assert!(stderr.contains("cir + opt level"), "stderr: {stderr}");
    assert!(stderr.contains("OptCert"), "stderr: {stderr}");
}

#[test]
fn build_info_reports_hashes() {
    let info = stdout_json(&run_sirsc(&["--emit", "build-info", &demo("add.json")]));
    assert_eq!(info["source_hash"].as_str().map(str::len), Some(64));
    assert_eq!(info["registry_fingerprint"].as_str().map(str::len), Some(64));
    assert_eq!(info["manifest_schema_version"], 1);

    let other = stdout_json(&run_sirsc(&["--emit", "build-info", &demo("sum_loop.json")]));
    assert_ne!(info["source_hash"], other["source_hash"]);
    assert_eq!(info["registry_fingerprint"], other["registry_fingerprint"]);
}

#[test]
fn emit_ast_reparses() {
    let output = run_sirsc(&["--emit", "ast", &demo("shapes.json")]);
    // Structural output does not need the checker, so the non-exhaustive
    // match is not reported here.
    let doc = stdout_json(&output);
    assert!(sirsc::parser::parse_value(&doc).program.is_some());
}

#[test]
fn infer_reports_parameter_summaries() {
    let out = stdout_json(&run_sirsc(&[
        "--emit",
        "infer",
        &demo("gaussian.json"),
        "--chains",
        "2",
        "--samples",
        "300",
        "--warmup",
        "200",
        "--seed",
        "3",
    ]));
    assert_eq!(out["algorithm"], "amh");
    let params = out["diagnostics"]["params"].as_array().expect("params");
    let names: Vec<&str> = params.iter().filter_map(|p| p["name"].as_str()).collect();
    assert_eq!(names, vec!["mu", "sigma"]);
    assert!(out.get("chains").is_none());
}

#[test]
fn malformed_document_is_structural_error() {
    let path = std::env::temp_dir().join(format!("sirsc-cli-bad-{}.json", std::process::id()));
    std::fs::write(&path, r#"{"functions": [], "extra": 1}"#).unwrap();
    let output = run_sirsc(&["--emit", "rust", path.to_str().unwrap()]);
    let _ = std::fs::remove_file(&path);
    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("structural"), "stderr: {stderr}");
}

#[test]
fn missing_file_exits_with_two() {
    let output = run_sirsc(&["--emit", "rust", "/nonexistent/sirsc/input.json"]);
    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn wrong_argument_count_is_usage_error() {
    let input = std::env::temp_dir().join(format!("sirsc-cli-argc-{}.json", std::process::id()));
    std::fs::write(&input, "[]").unwrap();
    let output = run_sirsc(&["--emit", "run", &demo("sum_loop.json"), "--input", input.to_str().unwrap()]);
    let _ = std::fs::remove_file(&input);
    assert_eq!(output.status.code(), Some(2));
    assert!(String::from_utf8_lossy(&output.stderr).contains("takes 1 argument(s)"));
}
