// model.rs — Inference bridge: a compiled function as a log density
//
// Treats an entry function whose parameters are all `f64` as an unnormalized
// log density: the value at θ is the log weight its `observe` statements
// accumulate when the interpreter runs it with θ as arguments.
//
// Preconditions: the CIR was lowered from `program` and passes verification.
// Postconditions: `log_density` is deterministic in θ (fixed session seed);
//   a runtime fault evaluates to negative infinity.
// Failure modes: `CompileError::Input` for a missing, generic or non-`f64`
//   entry; `CompileError::Inference` from the engine.
// Side effects: none; each evaluation runs in a fresh session.

use std::sync::Arc;

use serde_json::{json, Value as Json};
use sirs_runtime::dist::support::Constraint;
use sirs_runtime::infer::InferenceResult;
use sirs_runtime::{Algorithm, CancelToken, LogDensity, Options, Registry, Value};

use crate::ast::{ParamConstraint, Program};
use crate::cir::CirProgram;
use crate::error::CompileError;
use crate::interp::{run_entry, Limits};
use crate::types::F64;

/// Session seed used for every density evaluation.
const DENSITY_SEED: u64 = 0;

pub struct ModelDensity<'p> {
    cir: &'p CirProgram,
    entry: String,
    registry: Arc<Registry>,
    names: Vec<String>,
    constraints: Vec<Constraint>,
    limits: Limits,
}

impl<'p> ModelDensity<'p> {
    pub fn new(program: &Program, cir: &'p CirProgram, entry: &str, registry: Arc<Registry>) -> Result<Self, CompileError> {
        let func = program
            .functions
            .iter()
            .find(|f| f.name == entry)
            .ok_or_else(|| CompileError::Input(format!("no function named '{entry}'")))?;
        if !func.type_params.is_empty() {
            return Err(CompileError::Input(format!("model '{entry}' must not be generic")));
        }
        if func.params.is_empty() {
            return Err(CompileError::Input(format!("model '{entry}' has no parameters to infer")));
        }
        if let Some(p) = func.params.iter().find(|p| p.ty != F64) {
            return Err(CompileError::Input(format!(
                "model parameter '{}' has type {}, expected f64",
                p.name, p.ty
            )));
        }
        if cir.function(entry).is_none() {
            return Err(CompileError::Input(format!("'{entry}' was not lowered")));
        }
        let constraints = func
            .params
            .iter()
            .map(|p| match p.constraint.unwrap_or(ParamConstraint::Real) {
                ParamConstraint::Real => Constraint::Real,
                ParamConstraint::Positive => Constraint::Positive,
                ParamConstraint::UnitInterval => Constraint::Probability,
                ParamConstraint::Interval(lo, hi) => Constraint::Bounded { lo, hi },
            })
            .collect();
        Ok(ModelDensity {
            cir,
            entry: entry.to_string(),
            registry,
            names: func.params.iter().map(|p| p.name.clone()).collect(),
            constraints,
            limits: Limits::default(),
        })
    }

    pub fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    /// A point inside every parameter's support.
    pub fn initial_point(&self) -> Vec<f64> {
        self.constraints
            .iter()
            .map(|c| match *c {
                Constraint::Positive => 1.0,
                Constraint::Probability => 0.5,
                Constraint::Bounded { lo, hi } => lo + (hi - lo) / 2.0,
                _ => 0.0,
            })
            .collect()
    }
}

impl LogDensity for ModelDensity<'_> {
    fn dim(&self) -> usize {
        self.names.len()
    }

    fn log_density(&self, theta: &[f64]) -> f64 {
        let args = theta.iter().map(|&x| Value::Float(x)).collect();
        match run_entry(self.cir, &self.entry, args, self.registry.clone(), DENSITY_SEED, self.limits) {
            Ok(out) if !out.log_weight.is_nan() => out.log_weight,
            Ok(_) => f64::NEG_INFINITY,
            Err(fault) => {
                tracing::trace!(%fault, "model evaluation faulted");
                f64::NEG_INFINITY
            }
        }
    }

    fn constraints(&self) -> Vec<Constraint> {
        self.constraints.clone()
    }

    fn param_names(&self) -> Vec<String> {
        self.names.clone()
    }
}

/// Run `algorithm` on the model from its default initial point.
pub fn infer(
    model: &ModelDensity<'_>,
    algorithm: &Algorithm,
    options: &Options,
    cancel: &CancelToken,
) -> Result<InferenceResult, CompileError> {
    let initial = model.initial_point();
    tracing::info!(
        entry = %model.entry,
        algorithm = algorithm.name(),
        chains = options.chains,
        samples = options.samples,
        "running inference"
    );
    Ok(sirs_runtime::run(model, &initial, algorithm, options, cancel)?)
}

/// JSON report of a run: parameter summaries and diagnostics, plus the raw
/// chains when `with_chains` is set.
pub fn report(result: &InferenceResult, with_chains: bool) -> Json {
    let mut out = json!({
        "algorithm": result.algorithm,
        "state": result.state,
        "diagnostics": result.diagnostics,
    });
    if let Some(fit) = &result.variational {
        out["variational"] = json!(fit);
    }
    if with_chains {
        out["chains"] = json!(result.chains);
    }
    out
}
