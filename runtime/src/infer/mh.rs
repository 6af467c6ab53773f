// mh.rs — Random-walk Metropolis-Hastings, fixed or adaptive step

use super::{check_log_prob, in_support, ChainState, LogDensity};
use crate::dist::Constraint;
use crate::rng::RngStream;

/// Warm-up steps per adaptation batch.
const ADAPT_BATCH: usize = 50;

pub(super) struct RandomWalk {
    step: f64,
    band: Option<(f64, f64)>,
    batch_accepts: usize,
    batch_len: usize,
    batches: usize,
}

impl RandomWalk {
    pub fn fixed(step: f64) -> Self {
        RandomWalk {
            step,
            band: None,
            batch_accepts: 0,
            batch_len: 0,
            batches: 0,
        }
    }

    pub fn adaptive(step: f64, low: f64, high: f64) -> Self {
        RandomWalk {
            band: Some((low, high)),
            ..Self::fixed(step)
        }
    }

    pub fn step_size(&self) -> f64 {
        self.step
    }

    /// One Gaussian proposal. Out-of-support proposals are rejected without
    /// evaluating the density.
    pub fn step(
        &mut self,
        model: &dyn LogDensity,
        constraints: &[Constraint],
        state: &mut ChainState,
        rng: &mut RngStream,
    ) -> Result<bool, String> {
        let proposal: Vec<f64> = state
            .theta
            .iter()
            .map(|x| x + self.step * rng.normal())
            .collect();
        if !in_support(constraints, &proposal) {
            return Ok(false);
        }
        let lp = check_log_prob(model.log_density(&proposal))?;
        let log_ratio = lp - state.log_prob;
        let accept = log_ratio > 0.0 || rng.uniform_open().ln() < log_ratio;
        if accept {
            state.theta = proposal;
            state.log_prob = lp;
        }
        Ok(accept)
    }

    /// Batch adaptation toward the acceptance band: after each batch the
    /// step is scaled by `exp(+-delta)` with `delta` shrinking as
    /// `1/sqrt(batches)`. Fixed-step walkers ignore this.
    pub fn adapt(&mut self, accepted: bool) {
        let Some((low, high)) = self.band else {
            return;
        };
        self.batch_len += 1;
        self.batch_accepts += accepted as usize;
        if self.batch_len < ADAPT_BATCH {
            return;
        }
        self.batches += 1;
        let rate = self.batch_accepts as f64 / self.batch_len as f64;
        let delta = (1.0 / (self.batches as f64).sqrt()).min(0.5);
        if rate < low {
            self.step *= (-delta).exp();
        } else if rate > high {
            self.step *= delta.exp();
        }
        self.batch_accepts = 0;
        self.batch_len = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infer::FnDensity;

    #[test]
    fn adaptive_step_moves_into_band() {
        let model = FnDensity::new(1, |t: &[f64]| -0.5 * t[0] * t[0]);
        let constraints = model.constraints();
        let mut walk = RandomWalk::adaptive(50.0, 0.2, 0.5);
        let mut state = ChainState {
            theta: vec![0.0],
            log_prob: 0.0,
        };
        let mut rng = RngStream::new(4);
        for _ in 0..4000 {
            let a = walk.step(&model, &constraints, &mut state, &mut rng).unwrap();
            walk.adapt(a);
        }
        assert!(walk.step_size() < 10.0, "step {}", walk.step_size());

        let mut accepts = 0;
        for _ in 0..4000 {
            accepts += walk.step(&model, &constraints, &mut state, &mut rng).unwrap() as usize;
        }
        let rate = accepts as f64 / 4000.0;
        assert!((0.1..0.65).contains(&rate), "rate {rate}");
    }

    #[test]
    fn out_of_support_proposal_is_rejected_unevaluated() {
        let model = FnDensity::new(1, |t: &[f64]| {
            assert!(t[0] > 0.0, "density evaluated outside support");
            -t[0]
        })
        .with_constraints(vec![Constraint::Positive]);
        let constraints = model.constraints();
        let mut walk = RandomWalk::fixed(5.0);
        let mut state = ChainState {
            theta: vec![0.01],
            log_prob: -0.01,
        };
        let mut rng = RngStream::new(8);
        for _ in 0..500 {
            walk.step(&model, &constraints, &mut state, &mut rng).unwrap();
            assert!(state.theta[0] > 0.0);
        }
    }
}
