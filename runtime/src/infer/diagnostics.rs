// diagnostics.rs — Convergence diagnostics
//
// Derived, read-only summaries of finished chains: acceptance rate,
// effective sample size (Geyer initial monotone sequence over the combined
// autocorrelation) and split R-hat. Recomputed on demand from traces.

use serde::Serialize;

use super::Trace;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParamSummary {
    pub name: String,
    pub mean: f64,
    pub sd: f64,
    pub q05: f64,
    pub q50: f64,
    pub q95: f64,
    pub ess: f64,
    /// Undefined when the draws have no within-chain variance.
    pub rhat: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Diagnostics {
    /// Mean post-warm-up acceptance over chains. None for non-MCMC runs.
    pub acceptance_rate: Option<f64>,
    pub chain_acceptance: Vec<f64>,
    pub max_rhat: Option<f64>,
    pub min_ess: f64,
    pub params: Vec<ParamSummary>,
}

impl Diagnostics {
    pub fn compute(chains: &[Trace], names: &[String]) -> Self {
        let chain_acceptance: Vec<f64> = chains.iter().filter_map(acceptance_rate).collect();
        let acceptance_rate = if chain_acceptance.is_empty() {
            None
        } else {
            Some(mean(&chain_acceptance))
        };

        let params: Vec<ParamSummary> = names
            .iter()
            .enumerate()
            .map(|(i, name)| {
                let columns: Vec<Vec<f64>> = chains.iter().map(|t| t.column(i)).collect();
                let mut pooled: Vec<f64> = columns.iter().flatten().copied().collect();
                pooled.sort_by(f64::total_cmp);
                ParamSummary {
                    name: name.clone(),
                    mean: mean(&pooled),
                    sd: variance(&pooled).sqrt(),
                    q05: quantile(&pooled, 0.05),
                    q50: quantile(&pooled, 0.50),
                    q95: quantile(&pooled, 0.95),
                    ess: effective_sample_size(&columns),
                    rhat: split_rhat(&columns),
                }
            })
            .collect();

        let max_rhat = params
            .iter()
            .map(|p| p.rhat)
            .try_fold(None::<f64>, |acc, r| {
                r.map(|r| Some(acc.map_or(r, |a: f64| a.max(r))))
            })
            .flatten();
        let min_ess = params
            .iter()
            .map(|p| p.ess)
            .fold(f64::INFINITY, f64::min);

        Diagnostics {
            acceptance_rate,
            chain_acceptance,
            max_rhat,
            min_ess: if min_ess.is_finite() { min_ess } else { 0.0 },
            params,
        }
    }
}

/// Fraction of accepted post-warm-up steps.
pub fn acceptance_rate(trace: &Trace) -> Option<f64> {
    if trace.accepted.is_empty() {
        return None;
    }
    let n = trace.accepted.iter().filter(|a| **a).count();
    Some(n as f64 / trace.accepted.len() as f64)
}

fn mean(xs: &[f64]) -> f64 {
    if xs.is_empty() {
        return f64::NAN;
    }
    xs.iter().sum::<f64>() / xs.len() as f64
}

/// Unbiased sample variance.
fn variance(xs: &[f64]) -> f64 {
    if xs.len() < 2 {
        return 0.0;
    }
    let m = mean(xs);
    xs.iter().map(|x| (x - m) * (x - m)).sum::<f64>() / (xs.len() - 1) as f64
}

/// Linear-interpolated quantile of sorted data.
fn quantile(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return f64::NAN;
    }
    let pos = q * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
}

/// Split R-hat: each chain is halved and the halves are compared as
/// separate chains. Requires at least two draws per half.
pub fn split_rhat(chains: &[Vec<f64>]) -> Option<f64> {
    let n = chains.iter().map(Vec::len).min()? / 2;
    if n < 2 {
        return None;
    }
    let halves: Vec<&[f64]> = chains
        .iter()
        .flat_map(|c| [&c[..n], &c[c.len() - n..]])
        .collect();
    let means: Vec<f64> = halves.iter().map(|h| mean(h)).collect();
    let w = mean(&halves.iter().map(|h| variance(h)).collect::<Vec<_>>());
    let b = n as f64 * variance(&means);
    if !(w > 0.0) {
        return None;
    }
    let nf = n as f64;
    let var_plus = (nf - 1.0) / nf * w + b / nf;
    Some((var_plus / w).sqrt())
}

/// Multi-chain effective sample size.
pub fn effective_sample_size(chains: &[Vec<f64>]) -> f64 {
    let n = chains.iter().map(Vec::len).min().unwrap_or(0);
    let m = chains.len();
    if n < 4 {
        return (m * n) as f64;
    }
    let chains: Vec<&[f64]> = chains.iter().map(|c| &c[..n]).collect();
    let means: Vec<f64> = chains.iter().map(|c| mean(c)).collect();
    let vars: Vec<f64> = chains.iter().map(|c| variance(c)).collect();
    let w = mean(&vars);
    let nf = n as f64;
    let b = if m > 1 { nf * variance(&means) } else { 0.0 };
    let var_plus = (nf - 1.0) / nf * w + b / nf;
    if !(var_plus > 0.0) {
        return (m * n) as f64;
    }

    let autocov = |c: &[f64], mu: f64, lag: usize| -> f64 {
        c[..n - lag]
            .iter()
            .zip(&c[lag..])
            .map(|(a, b)| (a - mu) * (b - mu))
            .sum::<f64>()
            / nf
    };
    let rho = |lag: usize| -> f64 {
        let mean_autocov = chains
            .iter()
            .zip(&means)
            .map(|(c, mu)| autocov(c, *mu, lag))
            .sum::<f64>()
            / m as f64;
        1.0 - (w - mean_autocov) / var_plus
    };

    // Geyer: sum consecutive pairs while positive, enforcing monotonicity.
    let mut tau = -1.0;
    let mut prev_pair = f64::INFINITY;
    let mut lag = 0;
    while lag + 1 < n {
        let pair = (rho(lag) + rho(lag + 1)).min(prev_pair);
        if pair <= 0.0 {
            break;
        }
        tau += 2.0 * pair;
        prev_pair = pair;
        lag += 2;
    }
    let total = (m * n) as f64;
    let floor = 1.0 / total.log10().max(1.0);
    total / tau.max(floor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rng::RngStream;

    fn iid(seed: u64, n: usize, shift: f64) -> Vec<f64> {
        let mut rng = RngStream::new(seed);
        (0..n).map(|_| rng.normal() + shift).collect()
    }

    #[test]
    fn rhat_near_one_for_identical_targets() {
        let chains: Vec<Vec<f64>> = (0..4).map(|s| iid(s + 1, 2000, 0.0)).collect();
        let r = split_rhat(&chains).unwrap();
        assert!((r - 1.0).abs() < 0.01, "rhat {r}");
    }

    #[test]
    fn rhat_flags_disagreeing_chains() {
        let chains = vec![iid(1, 1000, 0.0), iid(2, 1000, 5.0)];
        assert!(split_rhat(&chains).unwrap() > 1.5);
    }

    #[test]
    fn rhat_undefined_for_constant_draws() {
        assert_eq!(split_rhat(&[vec![1.0; 100]]), None);
        assert_eq!(split_rhat(&[vec![1.0, 2.0]]), None);
    }

    #[test]
    fn ess_of_iid_draws_is_close_to_n() {
        let chains: Vec<Vec<f64>> = (0..2).map(|s| iid(s + 10, 2000, 0.0)).collect();
        let ess = effective_sample_size(&chains);
        assert!(ess > 2800.0 && ess < 5500.0, "ess {ess}");
    }

    #[test]
    fn ess_of_autocorrelated_draws_is_small() {
        let mut rng = RngStream::new(3);
        let mut x = 0.0;
        let chain: Vec<f64> = (0..4000)
            .map(|_| {
                x = 0.95 * x + rng.normal();
                x
            })
            .collect();
        let ess = effective_sample_size(&[chain]);
        assert!(ess < 400.0, "ess {ess}");
    }

    #[test]
    fn acceptance_and_quantiles() {
        let trace = Trace {
            samples: (0..101).map(|i| vec![i as f64]).collect(),
            log_probs: vec![0.0; 101],
            accepted: vec![true, false, true, true],
            step_size: 1.0,
        };
        assert_eq!(acceptance_rate(&trace), Some(0.75));
        let d = Diagnostics::compute(&[trace], &["x".to_string()]);
        assert_eq!(d.params[0].q50, 50.0);
        assert_eq!(d.params[0].q05, 5.0);
    }
}
