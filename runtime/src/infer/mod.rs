// infer — Inference engine
//
// `run` drives one of four algorithms over a caller-supplied log density:
// random-walk Metropolis-Hastings, adaptive MH (step size tuned toward an
// acceptance band during warm-up), Hamiltonian Monte Carlo (leapfrog), and
// mean-field Gaussian variational inference.
//
// Run state machine: Initialized -> Running -> {Converged | Exhausted | Failed}.
// MCMC chains run in parallel (rayon), each with its own random stream
// derived from the seed and chain index; no chain sees another's state.
// The cancellation token is polled at every iteration boundary.
//
// Failure modes: a NaN or +inf log-probability aborts the run with
// `NumericalFailure`; proposals outside a parameter's constraint are
// rejected without evaluating the density.

pub mod cancel;
pub mod diagnostics;
mod hmc;
mod mh;
mod vi;

use std::fmt;

use rayon::prelude::*;
use serde::Serialize;

use crate::dist::{Constraint, Variate};
use crate::error::InferenceError;
use crate::rng::RngStream;

pub use cancel::CancelToken;
pub use diagnostics::{Diagnostics, ParamSummary};
pub use vi::VariationalFit;

// ── Model ───────────────────────────────────────────────────────────────────

/// Unnormalized log posterior over a fixed-dimension parameter vector.
pub trait LogDensity: Sync {
    fn dim(&self) -> usize;

    fn log_density(&self, theta: &[f64]) -> f64;

    /// Per-parameter constraints. Defaults to unconstrained reals.
    fn constraints(&self) -> Vec<Constraint> {
        vec![Constraint::Real; self.dim()]
    }

    fn param_names(&self) -> Vec<String> {
        (0..self.dim()).map(|i| format!("theta[{i}]")).collect()
    }

    /// Gradient of the log density. Defaults to central finite differences.
    fn gradient(&self, theta: &[f64]) -> Vec<f64> {
        finite_difference_gradient(|t| self.log_density(t), theta)
    }
}

/// Closure-backed model.
pub struct FnDensity<F> {
    dim: usize,
    constraints: Vec<Constraint>,
    f: F,
}

impl<F: Fn(&[f64]) -> f64 + Sync> FnDensity<F> {
    pub fn new(dim: usize, f: F) -> Self {
        FnDensity {
            dim,
            constraints: vec![Constraint::Real; dim],
            f,
        }
    }

    pub fn with_constraints(mut self, constraints: Vec<Constraint>) -> Self {
        self.constraints = constraints;
        self
    }
}

impl<F: Fn(&[f64]) -> f64 + Sync> LogDensity for FnDensity<F> {
    fn dim(&self) -> usize {
        self.dim
    }

    fn log_density(&self, theta: &[f64]) -> f64 {
        (self.f)(theta)
    }

    fn constraints(&self) -> Vec<Constraint> {
        self.constraints.clone()
    }
}

pub fn finite_difference_gradient(f: impl Fn(&[f64]) -> f64, theta: &[f64]) -> Vec<f64> {
    let mut shifted = theta.to_vec();
    (0..theta.len())
        .map(|i| {
            let h = 1e-5 * theta[i].abs().max(1.0);
            shifted[i] = theta[i] + h;
            let up = f(&shifted);
            shifted[i] = theta[i] - h;
            let down = f(&shifted);
            shifted[i] = theta[i];
            (up - down) / (2.0 * h)
        })
        .collect()
}

pub(crate) fn in_support(constraints: &[Constraint], theta: &[f64]) -> bool {
    constraints
        .iter()
        .zip(theta)
        .all(|(c, x)| c.admits(&Variate::Real(*x)))
}

/// NaN and +inf are failures; -inf is a legitimate zero-probability state.
pub(crate) fn check_log_prob(lp: f64) -> Result<f64, String> {
    if lp.is_nan() {
        Err("log-probability is NaN".to_string())
    } else if lp == f64::INFINITY {
        Err("log-probability overflowed to +inf".to_string())
    } else {
        Ok(lp)
    }
}

// ── Configuration ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Algorithm {
    MetropolisHastings {
        step_size: f64,
    },
    AdaptiveMetropolis {
        step_size: f64,
        target_low: f64,
        target_high: f64,
    },
    Hamiltonian {
        step_size: f64,
        leapfrog_steps: usize,
    },
    Variational {
        learning_rate: f64,
        iterations: usize,
        mc_samples: usize,
    },
}

impl Algorithm {
    pub fn metropolis() -> Self {
        Algorithm::MetropolisHastings { step_size: 1.0 }
    }

    pub fn adaptive_metropolis() -> Self {
        Algorithm::AdaptiveMetropolis {
            step_size: 1.0,
            target_low: 0.2,
            target_high: 0.5,
        }
    }

    pub fn hamiltonian() -> Self {
        Algorithm::Hamiltonian {
            step_size: 0.1,
            leapfrog_steps: 20,
        }
    }

    pub fn variational() -> Self {
        Algorithm::Variational {
            learning_rate: 0.05,
            iterations: 2000,
            mc_samples: 8,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Algorithm::MetropolisHastings { .. } => "mh",
            Algorithm::AdaptiveMetropolis { .. } => "amh",
            Algorithm::Hamiltonian { .. } => "hmc",
            Algorithm::Variational { .. } => "vi",
        }
    }

    fn validate(&self) -> Result<(), InferenceError> {
        let bad = |msg: &str| Err(InferenceError::InvalidOptions(msg.to_string()));
        match *self {
            Algorithm::MetropolisHastings { step_size }
            | Algorithm::AdaptiveMetropolis { step_size, .. }
            | Algorithm::Hamiltonian { step_size, .. }
                if !(step_size.is_finite() && step_size > 0.0) =>
            {
                bad("step size must be positive and finite")
            }
            Algorithm::AdaptiveMetropolis {
                target_low,
                target_high,
                ..
            } if !(0.0 < target_low && target_low < target_high && target_high < 1.0) => {
                bad("acceptance band must satisfy 0 < low < high < 1")
            }
            Algorithm::Hamiltonian { leapfrog_steps: 0, .. } => {
                bad("leapfrog steps must be at least 1")
            }
            Algorithm::Variational {
                learning_rate,
                iterations,
                mc_samples,
            } if !(learning_rate > 0.0) || iterations == 0 || mc_samples == 0 => {
                bad("variational learning rate, iterations and samples must be positive")
            }
            _ => Ok(()),
        }
    }
}

/// Run options shared by every algorithm.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Options {
    pub chains: usize,
    /// Retained draws per chain, after thinning.
    pub samples: usize,
    pub warmup: usize,
    pub thin: usize,
    pub seed: u64,
    /// Tune the step size during warm-up (adaptive MH, HMC).
    pub adapt: bool,
    /// Return `NotConverged` instead of a result when R-hat exceeds the
    /// tolerance.
    pub require_convergence: bool,
    pub rhat_tolerance: f64,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            chains: 4,
            samples: 1000,
            warmup: 500,
            thin: 1,
            seed: 0,
            adapt: true,
            require_convergence: false,
            rhat_tolerance: 1.05,
        }
    }
}

impl Options {
    fn validate(&self) -> Result<(), InferenceError> {
        if self.chains == 0 {
            return Err(InferenceError::InvalidOptions("chains must be at least 1".into()));
        }
        if self.samples == 0 {
            return Err(InferenceError::InvalidOptions("samples must be at least 1".into()));
        }
        if self.thin == 0 {
            return Err(InferenceError::InvalidOptions("thin must be at least 1".into()));
        }
        if !(self.rhat_tolerance >= 1.0) {
            return Err(InferenceError::InvalidOptions(
                "R-hat tolerance must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

// ── Results ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Initialized,
    Running,
    Converged,
    Exhausted,
    Failed,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunState::Initialized => "initialized",
            RunState::Running => "running",
            RunState::Converged => "converged",
            RunState::Exhausted => "exhausted",
            RunState::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Output of one chain. Owned by the run; read-only afterwards.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Trace {
    /// Retained draws, after warm-up and thinning.
    pub samples: Vec<Vec<f64>>,
    /// Log-probability of each retained draw.
    pub log_probs: Vec<f64>,
    /// Acceptance flag of every post-warm-up step.
    pub accepted: Vec<bool>,
    /// Step size in effect after warm-up.
    pub step_size: f64,
}

impl Trace {
    /// Draws of parameter `i`.
    pub fn column(&self, i: usize) -> Vec<f64> {
        self.samples.iter().map(|s| s[i]).collect()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct InferenceResult {
    pub algorithm: &'static str,
    pub state: RunState,
    pub chains: Vec<Trace>,
    pub diagnostics: Diagnostics,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variational: Option<VariationalFit>,
}

// ── Driver ──────────────────────────────────────────────────────────────────

/// Per-step kernel state shared by the MCMC algorithms.
pub(crate) struct ChainState {
    pub theta: Vec<f64>,
    pub log_prob: f64,
}

enum Kernel {
    RandomWalk(mh::RandomWalk),
    Leapfrog(hmc::Leapfrog),
}

impl Kernel {
    fn new(algorithm: &Algorithm, dim: usize) -> Option<Self> {
        match *algorithm {
            Algorithm::MetropolisHastings { step_size } => {
                Some(Kernel::RandomWalk(mh::RandomWalk::fixed(step_size)))
            }
            Algorithm::AdaptiveMetropolis {
                step_size,
                target_low,
                target_high,
            } => Some(Kernel::RandomWalk(mh::RandomWalk::adaptive(
                step_size,
                target_low,
                target_high,
            ))),
            Algorithm::Hamiltonian {
                step_size,
                leapfrog_steps,
            } => Some(Kernel::Leapfrog(hmc::Leapfrog::new(
                step_size,
                leapfrog_steps,
                dim,
            ))),
            Algorithm::Variational { .. } => None,
        }
    }

    fn step(
        &mut self,
        model: &dyn LogDensity,
        constraints: &[Constraint],
        state: &mut ChainState,
        rng: &mut RngStream,
    ) -> Result<bool, String> {
        match self {
            Kernel::RandomWalk(k) => k.step(model, constraints, state, rng),
            Kernel::Leapfrog(k) => k.step(model, constraints, state, rng),
        }
    }

    fn adapt(&mut self, accepted: bool) {
        match self {
            Kernel::RandomWalk(k) => k.adapt(accepted),
            Kernel::Leapfrog(k) => k.adapt(accepted),
        }
    }

    fn step_size(&self) -> f64 {
        match self {
            Kernel::RandomWalk(k) => k.step_size(),
            Kernel::Leapfrog(k) => k.step_size(),
        }
    }
}

/// Run inference.
///
/// `initial` must have the model's dimension, satisfy its constraints and
/// have a finite log density.
pub fn run(
    model: &dyn LogDensity,
    initial: &[f64],
    algorithm: &Algorithm,
    options: &Options,
    cancel: &CancelToken,
) -> Result<InferenceResult, InferenceError> {
    options.validate()?;
    algorithm.validate()?;

    let dim = model.dim();
    if initial.len() != dim {
        return Err(InferenceError::InvalidInitialState(format!(
            "expected {dim} parameter(s), got {}",
            initial.len()
        )));
    }
    let constraints = model.constraints();
    if !in_support(&constraints, initial) {
        return Err(InferenceError::InvalidInitialState(
            "initial parameters violate their constraints".to_string(),
        ));
    }
    let lp0 = model.log_density(initial);
    if !lp0.is_finite() {
        return Err(InferenceError::InvalidInitialState(format!(
            "log density at the initial point is {lp0}"
        )));
    }

    let names = model.param_names();
    let mut state = RunState::Initialized;
    tracing::info!(
        algorithm = algorithm.name(),
        chains = options.chains,
        samples = options.samples,
        warmup = options.warmup,
        "inference run {state}"
    );
    state = RunState::Running;
    tracing::debug!("inference run {state}");

    if let Algorithm::Variational {
        learning_rate,
        iterations,
        mc_samples,
    } = *algorithm
    {
        let settings = vi::Settings {
            learning_rate,
            iterations,
            mc_samples,
        };
        let (fit, trace) = vi::fit(model, &constraints, initial, &settings, options, cancel)?;
        let diagnostics = Diagnostics::compute(std::slice::from_ref(&trace), &names);
        let state = if fit.converged {
            RunState::Converged
        } else {
            RunState::Exhausted
        };
        tracing::info!(iterations = fit.iterations, "variational fit {state}");
        return Ok(InferenceResult {
            algorithm: algorithm.name(),
            state,
            chains: vec![trace],
            diagnostics,
            variational: Some(fit),
        });
    }

    let outcomes: Vec<Result<Trace, InferenceError>> = (0..options.chains)
        .into_par_iter()
        .map(|chain| run_chain(model, &constraints, initial, lp0, algorithm, options, cancel, chain))
        .collect();
    let chains = match outcomes.into_iter().collect::<Result<Vec<_>, _>>() {
        Ok(chains) => chains,
        Err(e) => {
            tracing::warn!(error = %e, "inference run {}", RunState::Failed);
            return Err(e);
        }
    };

    let diagnostics = Diagnostics::compute(&chains, &names);
    let converged = diagnostics
        .max_rhat
        .map(|r| r <= options.rhat_tolerance)
        .unwrap_or(false);
    let state = if converged {
        RunState::Converged
    } else {
        RunState::Exhausted
    };
    tracing::info!(
        max_rhat = ?diagnostics.max_rhat,
        acceptance = ?diagnostics.acceptance_rate,
        "inference run {state}"
    );
    if options.require_convergence && !converged {
        return Err(InferenceError::NotConverged(match diagnostics.max_rhat {
            Some(r) => format!("max R-hat {r:.4} exceeds {}", options.rhat_tolerance),
            None => "R-hat is undefined for these draws".to_string(),
        }));
    }

    Ok(InferenceResult {
        algorithm: algorithm.name(),
        state,
        chains,
        diagnostics,
        variational: None,
    })
}

#[allow(clippy::too_many_arguments)]
fn run_chain(
    model: &dyn LogDensity,
    constraints: &[Constraint],
    initial: &[f64],
    lp0: f64,
    algorithm: &Algorithm,
    options: &Options,
    cancel: &CancelToken,
    chain: usize,
) -> Result<Trace, InferenceError> {
    let Some(mut kernel) = Kernel::new(algorithm, initial.len()) else {
        return Err(InferenceError::InvalidOptions(
            "algorithm is not a Markov chain sampler".to_string(),
        ));
    };
    let mut rng = RngStream::new(options.seed).for_index(chain as u64);
    let mut state = ChainState {
        theta: initial.to_vec(),
        log_prob: lp0,
    };
    let post_warmup = options.samples * options.thin;
    let total = options.warmup + post_warmup;
    let mut trace = Trace {
        samples: Vec::with_capacity(options.samples),
        log_probs: Vec::with_capacity(options.samples),
        accepted: Vec::with_capacity(post_warmup),
        step_size: 0.0,
    };

    for iteration in 0..total {
        if cancel.is_cancelled() {
            return Err(InferenceError::Cancelled { chain, iteration });
        }
        let accepted = kernel
            .step(model, constraints, &mut state, &mut rng)
            .map_err(|detail| InferenceError::NumericalFailure {
                chain,
                iteration,
                detail,
            })?;

        if iteration < options.warmup {
            if options.adapt {
                kernel.adapt(accepted);
            }
            continue;
        }
        let post = iteration - options.warmup;
        trace.accepted.push(accepted);
        if post % options.thin == 0 {
            trace.samples.push(state.theta.clone());
            trace.log_probs.push(state.log_prob);
        }
        if post > 0 && post % 1000 == 0 {
            tracing::debug!(chain, iteration, step = kernel.step_size(), "chain progress");
        }
    }
    trace.step_size = kernel.step_size();
    Ok(trace)
}
