// vi.rs — Mean-field Gaussian variational inference
//
// The approximation is a diagonal Gaussian over the unconstrained space.
// Each coordinate maps back through its constraint's transform; the ELBO
// includes the log-Jacobian. Gradients use the reparameterization trick and
// updates use Adam.

use serde::Serialize;

use super::{check_log_prob, CancelToken, LogDensity, Options, Trace};
use crate::dist::{Constraint, Transform};
use crate::error::InferenceError;
use crate::rng::RngStream;
use crate::special::logistic;

const ADAM_BETA1: f64 = 0.9;
const ADAM_BETA2: f64 = 0.999;
const ADAM_EPS: f64 = 1e-8;
/// Window of the running ELBO mean used for the convergence check.
const ELBO_WINDOW: usize = 100;
const ELBO_REL_TOL: f64 = 1e-3;
const INITIAL_LOG_SCALE: f64 = -1.0;

pub(super) struct Settings {
    pub learning_rate: f64,
    pub iterations: usize,
    pub mc_samples: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VariationalFit {
    /// Location of each coordinate in unconstrained space.
    pub loc: Vec<f64>,
    /// Scale of each coordinate in unconstrained space.
    pub scale: Vec<f64>,
    /// Windowed ELBO means, one per completed window.
    pub elbo: Vec<f64>,
    pub iterations: usize,
    pub converged: bool,
}

/// d inverse(z) / dz and d log|J| / dz for a transform.
fn transform_derivatives(t: &Transform, z: f64) -> (f64, f64) {
    match *t {
        Transform::Identity => (1.0, 0.0),
        Transform::Log => (z.exp(), 1.0),
        Transform::Logit => {
            let s = logistic(z);
            (s * (1.0 - s), 1.0 - 2.0 * s)
        }
        Transform::Interval { lo, hi } => {
            let s = logistic(z);
            ((hi - lo) * s * (1.0 - s), 1.0 - 2.0 * s)
        }
    }
}

struct Adam {
    m: Vec<f64>,
    v: Vec<f64>,
    t: i32,
}

impl Adam {
    fn new(n: usize) -> Self {
        Adam {
            m: vec![0.0; n],
            v: vec![0.0; n],
            t: 0,
        }
    }

    /// Gradient ascent step.
    fn update(&mut self, params: &mut [f64], grad: &[f64], lr: f64) {
        self.t += 1;
        let c1 = 1.0 - ADAM_BETA1.powi(self.t);
        let c2 = 1.0 - ADAM_BETA2.powi(self.t);
        for i in 0..params.len() {
            self.m[i] = ADAM_BETA1 * self.m[i] + (1.0 - ADAM_BETA1) * grad[i];
            self.v[i] = ADAM_BETA2 * self.v[i] + (1.0 - ADAM_BETA2) * grad[i] * grad[i];
            params[i] += lr * (self.m[i] / c1) / ((self.v[i] / c2).sqrt() + ADAM_EPS);
        }
    }
}

/// Fit the approximation, then draw `options.samples` values from it.
pub(super) fn fit(
    model: &dyn LogDensity,
    constraints: &[Constraint],
    initial: &[f64],
    settings: &Settings,
    options: &Options,
    cancel: &CancelToken,
) -> Result<(VariationalFit, Trace), InferenceError> {
    let dim = initial.len();
    let transforms: Vec<Transform> = constraints.iter().map(Constraint::transform).collect();
    let mut loc: Vec<f64> = transforms
        .iter()
        .zip(initial)
        .map(|(t, x)| t.forward(*x))
        .collect();
    let mut log_scale = vec![INITIAL_LOG_SCALE; dim];
    let mut adam_loc = Adam::new(dim);
    let mut adam_scale = Adam::new(dim);
    let mut rng = RngStream::new(options.seed).for_index(0);

    let numerical = |iteration: usize, detail: String| InferenceError::NumericalFailure {
        chain: 0,
        iteration,
        detail,
    };

    let mut window_sum = 0.0;
    let mut window_len = 0;
    let mut elbo_history: Vec<f64> = Vec::new();
    let mut converged = false;
    let mut iterations = 0;

    for iteration in 0..settings.iterations {
        if cancel.is_cancelled() {
            return Err(InferenceError::Cancelled { chain: 0, iteration });
        }
        let mut g_loc = vec![0.0; dim];
        let mut g_scale = vec![0.0; dim];
        let mut elbo = 0.0;

        for _ in 0..settings.mc_samples {
            let eps: Vec<f64> = (0..dim).map(|_| rng.normal()).collect();
            let z: Vec<f64> = (0..dim).map(|i| loc[i] + log_scale[i].exp() * eps[i]).collect();
            let theta: Vec<f64> = (0..dim).map(|i| transforms[i].inverse(z[i])).collect();
            let lp = check_log_prob(model.log_density(&theta)).map_err(|d| numerical(iteration, d))?;
            let grad = model.gradient(&theta);
            if grad.iter().any(|g| g.is_nan()) {
                return Err(numerical(iteration, "gradient is NaN".to_string()));
            }
            let mut log_jac = 0.0;
            for i in 0..dim {
                log_jac += transforms[i].log_abs_det_jacobian(z[i]);
                let (dtheta, dlogjac) = transform_derivatives(&transforms[i], z[i]);
                let dz = grad[i] * dtheta + dlogjac;
                g_loc[i] += dz;
                g_scale[i] += dz * eps[i] * log_scale[i].exp();
            }
            elbo += lp + log_jac;
        }

        let n = settings.mc_samples as f64;
        let entropy: f64 = log_scale.iter().sum();
        elbo = elbo / n + entropy;
        for i in 0..dim {
            g_loc[i] /= n;
            g_scale[i] = g_scale[i] / n + 1.0;
        }
        if g_loc.iter().chain(&g_scale).any(|g| !g.is_finite()) {
            return Err(numerical(iteration, "ELBO gradient is not finite".to_string()));
        }
        adam_loc.update(&mut loc, &g_loc, settings.learning_rate);
        adam_scale.update(&mut log_scale, &g_scale, settings.learning_rate);
        iterations = iteration + 1;

        if elbo.is_finite() {
            window_sum += elbo;
            window_len += 1;
        }
        if window_len == ELBO_WINDOW {
            let mean = window_sum / window_len as f64;
            if let Some(prev) = elbo_history.last().copied() {
                let rel = ((mean - prev) / f64::max(prev.abs(), 1.0)).abs();
                if rel < ELBO_REL_TOL {
                    converged = true;
                }
            }
            elbo_history.push(mean);
            window_sum = 0.0;
            window_len = 0;
            tracing::debug!(iteration, elbo = mean, "variational progress");
            if converged {
                break;
            }
        }
    }

    let scale: Vec<f64> = log_scale.iter().map(|s| s.exp()).collect();
    let mut trace = Trace {
        samples: Vec::with_capacity(options.samples),
        log_probs: Vec::with_capacity(options.samples),
        accepted: Vec::new(),
        step_size: settings.learning_rate,
    };
    for _ in 0..options.samples {
        let theta: Vec<f64> = (0..dim)
            .map(|i| transforms[i].inverse(loc[i] + scale[i] * rng.normal()))
            .collect();
        trace.log_probs.push(model.log_density(&theta));
        trace.samples.push(theta);
    }

    Ok((
        VariationalFit {
            loc,
            scale,
            elbo: elbo_history,
            iterations,
            converged,
        },
        trace,
    ))
}
