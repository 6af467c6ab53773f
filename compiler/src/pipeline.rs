// pipeline.rs — Compilation state and pass orchestration
//
// Holds every pass artifact in one state struct and runs the minimal set of
// passes for a given terminal PassId.
//
// Preconditions: Program and Registry must be set before calling run_pipeline.
// Postconditions: all artifacts for required passes are populated, or has_error is set.
// Failure modes: any pass emitting error-level diagnostics; a lowered program
//   whose CIR certificate fails (E0301).
// Side effects: calls on_pass_complete after each pass; emits a tracing
//   event per pass with its timing.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use sirs_runtime::Registry;

use crate::ast::{Program, Span};
use crate::cir::{CirCert, CirProgram};
use crate::codegen::{CodegenOptions, GeneratedCode};
use crate::diag::{codes, has_errors, Diagnostic, Phase};
use crate::error::CompileError;
use crate::opt::{OptLevel, PassRecord};
use crate::pass::{descriptor, required_passes, PassId, StageCert};
use crate::typeck::{CheckOptions, TypedProgram};

// ── Options ────────────────────────────────────────────────────────────────

/// Options for the front and middle of the pipeline.
#[derive(Debug, Clone, Default)]
pub struct CompileOptions {
    pub check: CheckOptions,
    pub opt_level: OptLevel,
}

// ── Artifact storage ───────────────────────────────────────────────────────

/// Per-pass outputs, filled in pass order.
#[derive(Default)]
pub struct Artifacts {
    pub typed: Option<TypedProgram>,
    pub cir: Option<CirProgram>,
    pub lower_cert: Option<CirCert>,
    /// Source location of each lowered function, by CIR name.
    pub spans: HashMap<String, Span>,
    pub optimized: Option<CirProgram>,
    pub opt_cert: Option<CirCert>,
    pub opt_records: Vec<PassRecord>,
    pub generated: Option<GeneratedCode>,
}

/// Provenance metadata for hermetic builds and cache-key use.
///
/// `source_hash`: SHA-256 of the raw input document.
/// `registry_fingerprint`: SHA-256 of `Registry::canonical_json()`.
/// `compiler_version`: crate version from `Cargo.toml`.
#[derive(Debug, Clone, PartialEq)]
pub struct Provenance {
    pub source_hash: [u8; 32],
    pub registry_fingerprint: [u8; 32],
    pub compiler_version: &'static str,
}

impl Provenance {
    /// Hex string of the source hash (64 characters).
    pub fn source_hash_hex(&self) -> String {
        bytes_to_hex(&self.source_hash)
    }

    /// Hex string of the registry fingerprint (64 characters).
    pub fn registry_fingerprint_hex(&self) -> String {
        bytes_to_hex(&self.registry_fingerprint)
    }

    /// Serialize provenance as a JSON string for `--emit build-info`.
    pub fn to_json(&self) -> String {
        let value = serde_json::json!({
            "source_hash": self.source_hash_hex(),
            "registry_fingerprint": self.registry_fingerprint_hex(),
            "manifest_schema_version": 1,
            "compiler_version": self.compiler_version,
        });
        let mut s = serde_json::to_string_pretty(&value).unwrap_or_default();
        s.push('\n');
        s
    }
}

fn bytes_to_hex(bytes: &[u8; 32]) -> String {
    let mut s = String::with_capacity(64);
    for b in bytes {
        use std::fmt::Write;
        let _ = write!(s, "{:02x}", b);
    }
    s
}

fn sha256(data: &[u8]) -> [u8; 32] {
    use sha2::{Digest, Sha256};

    let mut hasher = Sha256::new();
    hasher.update(data);
    let mut hash = [0u8; 32];
    hash.copy_from_slice(&hasher.finalize());
    hash
}

/// Compute provenance from the input document and registry.
///
/// The registry fingerprint hashes `Registry::canonical_json()` (compact,
/// key-sorted) so it does not depend on registration order.
pub fn compute_provenance(source: &str, registry: &Registry) -> Provenance {
    Provenance {
        source_hash: sha256(source.as_bytes()),
        registry_fingerprint: sha256(registry.canonical_json().as_bytes()),
        compiler_version: env!("CARGO_PKG_VERSION"),
    }
}

/// Holds all compilation artifacts and accumulated diagnostics.
pub struct CompilationState {
    pub program: Program,
    pub registry: Arc<Registry>,
    pub artifacts: Artifacts,
    pub diagnostics: Vec<Diagnostic>,
    pub has_error: bool,
    pub provenance: Option<Provenance>,
}

impl CompilationState {
    pub fn new(program: Program, registry: Arc<Registry>) -> Self {
        Self {
            program,
            registry,
            artifacts: Artifacts::default(),
            diagnostics: Vec::new(),
            has_error: false,
            provenance: None,
        }
    }

    /// The program codegen consumes: optimized if the optimizer ran.
    pub fn final_cir(&self) -> Option<&CirProgram> {
        self.artifacts.optimized.as_ref().or(self.artifacts.cir.as_ref())
    }
}

// ── Error type ─────────────────────────────────────────────────────────────

/// Pipeline execution failed due to error-level diagnostics in a pass.
/// The specific diagnostics are available in `CompilationState.diagnostics`.
#[derive(Debug)]
pub struct PipelineError {
    /// The pass that produced the error.
    pub failing_pass: PassId,
}

impl PipelineError {
    /// Phase tag of the failing pass.
    pub fn phase(&self) -> Phase {
        match self.failing_pass {
            PassId::Check => Phase::Type,
            PassId::Lower => Phase::Lowering,
            PassId::Optimize => Phase::Optimization,
            PassId::Codegen => Phase::Codegen,
        }
    }

    /// Convert into a `CompileError` carrying the error diagnostics.
    pub fn into_compile_error(self, diagnostics: &[Diagnostic]) -> CompileError {
        CompileError::Phase {
            phase: self.phase(),
            diagnostics: diagnostics.iter().filter(|d| d.is_error()).cloned().collect(),
        }
    }
}

/// Per-pass post-processing: callback, accumulate, trace, error check.
fn finish_pass(
    state: &mut CompilationState,
    pass_id: PassId,
    diags: Vec<Diagnostic>,
    elapsed: Duration,
    on_pass_complete: &mut impl FnMut(PassId, &[Diagnostic]),
) -> Result<(), PipelineError> {
    on_pass_complete(pass_id, &diags);
    let is_err = has_errors(&diags);
    let desc = descriptor(pass_id);
    tracing::info!(
        pass = desc.name,
        elapsed_ms = elapsed.as_secs_f64() * 1000.0,
        diagnostics = diags.len(),
        "pass complete"
    );
    tracing::debug!(
        pass = desc.name,
        outputs = ?desc.outputs,
        invalidation_key = desc.invalidation_key,
        invariants = desc.invariants,
        "pass contract"
    );
    state.diagnostics.extend(diags);
    if is_err {
        state.has_error = true;
        return Err(PipelineError {
            failing_pass: pass_id,
        });
    }
    Ok(())
}

/// E0301 diagnostic for a certificate with failed obligations.
fn cert_failure(cert: &CirCert, what: &str) -> Option<Diagnostic> {
    if cert.all_pass() {
        return None;
    }
    Some(
        Diagnostic::error(
            Phase::Lowering,
            Span::root(),
            format!("{what} verification failed: {}", cert.failed().join(", ")),
        )
        .with_code(codes::E0301),
    )
}

// ── Pipeline runner ────────────────────────────────────────────────────────

/// Run the minimal set of passes to produce `terminal`.
///
/// Per-pass sequence: execute → on_pass_complete(callback) → trace → error check.
///
/// Preconditions: `state.program` and `state.registry` are set.
/// Postconditions: artifacts for all passes in `required_passes(terminal)` are populated,
///   or `state.has_error` is true.
/// Failure modes: any pass producing error-level diagnostics; lower cert failure.
/// Side effects: calls `on_pass_complete` after each pass for immediate diagnostic display.
pub fn run_pipeline(
    state: &mut CompilationState,
    terminal: PassId,
    options: &CompileOptions,
    codegen_options: &CodegenOptions,
    mut on_pass_complete: impl FnMut(PassId, &[Diagnostic]),
) -> Result<(), PipelineError> {
    let _span = tracing::info_span!("pipeline", terminal = descriptor(terminal).name).entered();

    for pass_id in required_passes(terminal) {
        let t = Instant::now();
        let diags = match pass_id {
            PassId::Check => {
                let result = crate::typeck::check(&state.program, &state.registry, &options.check);
                state.artifacts.typed = Some(result.typed);
                result.diagnostics
            }
            PassId::Lower => {
                let Some(typed) = state.artifacts.typed.as_ref() else {
                    return Err(PipelineError { failing_pass: pass_id });
                };
                let result = crate::lower::lower(&state.program, typed);
                let mut diags = result.diagnostics;
                // A failed certificate after a clean check is a compiler defect.
                if !has_errors(&diags) {
                    diags.extend(cert_failure(&result.cert, "CIR"));
                }
                state.artifacts.cir = Some(result.cir);
                state.artifacts.lower_cert = Some(result.cert);
                state.artifacts.spans = result.spans;
                diags
            }
            PassId::Optimize => {
                let Some(cir) = state.artifacts.cir.clone() else {
                    return Err(PipelineError { failing_pass: pass_id });
                };
                let result = crate::opt::optimize(cir, options.opt_level, &state.artifacts.spans);
                state.artifacts.optimized = Some(result.cir);
                state.artifacts.opt_cert = Some(result.cert);
                state.artifacts.opt_records = result.records;
                result.diagnostics
            }
            PassId::Codegen => {
                let Some(cir) = state.final_cir() else {
                    return Err(PipelineError { failing_pass: pass_id });
                };
                let mut codegen_options = codegen_options.clone();
                if codegen_options.provenance.is_none() {
                    codegen_options.provenance = state.provenance.clone();
                }
                let result = crate::codegen::codegen(cir, &codegen_options);
                state.artifacts.generated = Some(result.generated);
                result.diagnostics
            }
        };
        finish_pass(state, pass_id, diags, t.elapsed(), &mut on_pass_complete)?;
    }
    Ok(())
}

// ── Convenience driver ─────────────────────────────────────────────────────

/// Parse `source` and run the pipeline through `terminal`.
///
/// Returns the state on success; parse failures and failing passes become a
/// `CompileError` carrying their error diagnostics. Warnings are kept in
/// `state.diagnostics`.
pub fn compile(
    source: &str,
    registry: Arc<Registry>,
    terminal: PassId,
    options: &CompileOptions,
    codegen_options: &CodegenOptions,
) -> Result<CompilationState, CompileError> {
    let program = crate::parser::parse_program(source)?;
    let provenance = compute_provenance(source, &registry);
    let mut state = CompilationState::new(program, registry);
    state.provenance = Some(provenance);
    if let Err(e) = run_pipeline(&mut state, terminal, options, codegen_options, |_, _| {}) {
        return Err(e.into_compile_error(&state.diagnostics));
    }
    Ok(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    const ADD: &str = r#"{"functions": [{"name": "main", "params": [], "returns": "i32", "body": [
        {"kind": "let", "name": "a", "type": "i32", "value": {"kind": "lit", "value": 10}},
        {"kind": "let", "name": "b", "type": "i32", "value": {"kind": "lit", "value": 20}},
        {"kind": "return", "value": {"kind": "binary", "op": "+",
            "lhs": {"kind": "var", "name": "a"}, "rhs": {"kind": "var", "name": "b"}}}
    ]}]}"#;

    fn registry() -> Arc<Registry> {
        Arc::new(Registry::with_builtins())
    }

    #[test]
    fn check_only_stops_after_check() {
        let state = compile(ADD, registry(), PassId::Check, &CompileOptions::default(), &CodegenOptions::default())
            .expect("compile");
        assert!(state.artifacts.typed.is_some());
        assert!(state.artifacts.cir.is_none());
    }

    #[test]
    fn full_pipeline_produces_rust() {
        let state = compile(ADD, registry(), PassId::Codegen, &CompileOptions::default(), &CodegenOptions::default())
            .expect("compile");
        assert!(state.artifacts.lower_cert.as_ref().is_some_and(|c| c.all_pass()));
        assert!(state.artifacts.opt_cert.as_ref().is_some_and(|c| c.all_pass()));
        let code = state.artifacts.generated.expect("generated");
        let hash = state.provenance.expect("provenance").source_hash_hex();
        assert!(code.rust_source.contains(&hash));
    }

    #[test]
    fn callback_sees_each_pass_in_order() {
        let program = crate::parser::parse_program(ADD).expect("parse");
        let mut state = CompilationState::new(program, registry());
        let mut seen = Vec::new();
        run_pipeline(
            &mut state,
            PassId::Optimize,
            &CompileOptions::default(),
            &CodegenOptions::default(),
            |p, _| seen.push(p),
        )
        .expect("pipeline");
        assert_eq!(seen, vec![PassId::Check, PassId::Lower, PassId::Optimize]);
    }

    #[test]
    fn type_errors_stop_the_pipeline() {
        let src = r#"{"functions": [{"name": "main", "params": [], "returns": "i32", "body": [
            {"kind": "return", "value": {"kind": "lit", "value": true}}]}]}"#;
        let err = compile(src, registry(), PassId::Codegen, &CompileOptions::default(), &CodegenOptions::default())
            .err()
            .expect("type error");
        match &err {
            CompileError::Phase { phase, diagnostics } => {
                assert_eq!(*phase, Phase::Type);
                assert!(!diagnostics.is_empty());
            }
            other => panic!("unexpected {other}"),
        }
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn provenance_is_stable_and_tracks_input() {
        let r = Registry::with_builtins();
        let a = compute_provenance(ADD, &r);
        assert_eq!(a, compute_provenance(ADD, &r));
        assert_ne!(a.source_hash, compute_provenance("{}", &r).source_hash);
        assert_eq!(a.source_hash_hex().len(), 64);
        let info: serde_json::Value = serde_json::from_str(&a.to_json()).expect("json");
        assert_eq!(info["manifest_schema_version"], 1);
        assert_eq!(info["compiler_version"], env!("CARGO_PKG_VERSION"));
    }
}
