// hmc.rs — Hamiltonian Monte Carlo with a leapfrog integrator
//
// Identity mass matrix. Energy H(q, p) = -log p(q) + |p|^2 / 2. A trajectory
// that leaves the support or produces a non-finite gradient is rejected as
// divergent; a NaN energy at the end of a trajectory is a numerical failure.

use super::{check_log_prob, in_support, ChainState, LogDensity};
use crate::dist::Constraint;
use crate::rng::RngStream;

/// Acceptance rate the warm-up adaptation aims for.
const TARGET_ACCEPT: f64 = 0.65;

pub(super) struct Leapfrog {
    step: f64,
    steps: usize,
    dim: usize,
    adapt_iter: usize,
}

impl Leapfrog {
    pub fn new(step: f64, steps: usize, dim: usize) -> Self {
        Leapfrog {
            step,
            steps,
            dim,
            adapt_iter: 0,
        }
    }

    pub fn step_size(&self) -> f64 {
        self.step
    }

    pub fn step(
        &mut self,
        model: &dyn LogDensity,
        constraints: &[Constraint],
        state: &mut ChainState,
        rng: &mut RngStream,
    ) -> Result<bool, String> {
        let p0: Vec<f64> = (0..self.dim).map(|_| rng.normal()).collect();
        let mut q = state.theta.clone();
        let mut p = p0.clone();

        let mut grad = model.gradient(&q);
        if !grad.iter().all(|g| g.is_finite()) {
            return Ok(false);
        }
        for _ in 0..self.steps {
            for (pi, gi) in p.iter_mut().zip(&grad) {
                *pi += 0.5 * self.step * gi;
            }
            for (qi, pi) in q.iter_mut().zip(&p) {
                *qi += self.step * pi;
            }
            if !in_support(constraints, &q) {
                return Ok(false);
            }
            grad = model.gradient(&q);
            if !grad.iter().all(|g| g.is_finite()) {
                return Ok(false);
            }
            for (pi, gi) in p.iter_mut().zip(&grad) {
                *pi += 0.5 * self.step * gi;
            }
        }

        let lp = check_log_prob(model.log_density(&q))?;
        let kinetic = |m: &[f64]| 0.5 * m.iter().map(|x| x * x).sum::<f64>();
        let h0 = -state.log_prob + kinetic(&p0);
        let h1 = -lp + kinetic(&p);
        if h1.is_nan() {
            return Err("Hamiltonian is NaN".to_string());
        }
        let log_ratio = h0 - h1;
        let accept = log_ratio > 0.0 || rng.uniform_open().ln() < log_ratio;
        if accept {
            state.theta = q;
            state.log_prob = lp;
        }
        Ok(accept)
    }

    /// Robbins-Monro update of log step size toward `TARGET_ACCEPT`.
    pub fn adapt(&mut self, accepted: bool) {
        self.adapt_iter += 1;
        let gain = 1.0 / (self.adapt_iter as f64 + 10.0).powf(0.6);
        let signal = if accepted { 1.0 } else { 0.0 } - TARGET_ACCEPT;
        self.step = (self.step.ln() + gain * signal).exp();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infer::FnDensity;

    #[test]
    fn samples_standard_normal() {
        let model = FnDensity::new(1, |t: &[f64]| -0.5 * t[0] * t[0]);
        let constraints = model.constraints();
        let mut k = Leapfrog::new(0.2, 10, 1);
        let mut state = ChainState {
            theta: vec![3.0],
            log_prob: -4.5,
        };
        let mut rng = RngStream::new(21);
        let mut xs = Vec::new();
        let mut accepts = 0;
        for _ in 0..3000 {
            accepts += k.step(&model, &constraints, &mut state, &mut rng).unwrap() as usize;
            xs.push(state.theta[0]);
        }
        let tail = &xs[500..];
        let mean = tail.iter().sum::<f64>() / tail.len() as f64;
        let var = tail.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / tail.len() as f64;
        assert!(mean.abs() < 0.15, "mean {mean}");
        assert!((var - 1.0).abs() < 0.2, "var {var}");
        assert!(accepts > 2500, "accepts {accepts}");
    }
}
