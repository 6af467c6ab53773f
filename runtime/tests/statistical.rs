//! End-to-end statistical behavior of the runtime: sampling accuracy and
//! multi-chain MCMC convergence.

use sirs_runtime::dist::{Registry, Variate};
use sirs_runtime::infer::{run, Algorithm, CancelToken, FnDensity, Options, RunState};
use sirs_runtime::RngStream;

#[test]
fn bernoulli_half_mean_within_tolerance() {
    let registry = Registry::with_builtins();
    let mut rng = RngStream::new(2024);
    let n = 100_000;
    let mut total = 0i64;
    for _ in 0..n {
        match registry.sample("bernoulli", &[Variate::Real(0.5)], &mut rng).unwrap() {
            Variate::Int(k) => total += k,
            other => panic!("unexpected draw {other:?}"),
        }
    }
    let mean = total as f64 / n as f64;
    assert!((mean - 0.5).abs() < 0.01, "mean {mean}");
}

#[test]
fn builtin_sample_means() {
    let registry = Registry::with_builtins();
    let mut rng = RngStream::new(77);
    let cases: [(&str, Vec<Variate>, f64); 5] = [
        ("normal", vec![Variate::Real(2.0), Variate::Real(3.0)], 2.0),
        ("exponential", vec![Variate::Real(4.0)], 0.25),
        ("gamma", vec![Variate::Real(3.0), Variate::Real(2.0)], 1.5),
        ("beta", vec![Variate::Real(2.0), Variate::Real(2.0)], 0.5),
        ("poisson", vec![Variate::Real(6.0)], 6.0),
    ];
    for (name, params, expected) in cases {
        let n = 50_000;
        let sum: f64 = (0..n)
            .map(|_| registry.sample(name, &params, &mut rng).unwrap().as_f64().unwrap())
            .sum();
        let mean = sum / n as f64;
        assert!(
            (mean - expected).abs() < 0.05 * expected.max(1.0),
            "{name}: mean {mean}, expected {expected}"
        );
    }
}

#[test]
fn metropolis_four_chains_converge_on_unimodal_target() {
    let model = FnDensity::new(1, |t: &[f64]| -0.5 * ((t[0] - 1.0) / 2.0).powi(2));
    let options = Options {
        chains: 4,
        samples: 5000,
        warmup: 1000,
        seed: 11,
        ..Options::default()
    };
    let result = run(
        &model,
        &[0.0],
        &Algorithm::MetropolisHastings { step_size: 2.5 },
        &options,
        &CancelToken::new(),
    )
    .unwrap();

    let acceptance = result.diagnostics.acceptance_rate.unwrap();
    assert!(acceptance > 0.0 && acceptance < 1.0, "acceptance {acceptance}");
    let rhat = result.diagnostics.max_rhat.unwrap();
    assert!((rhat - 1.0).abs() < 0.05, "rhat {rhat}");
    assert_eq!(result.state, RunState::Converged);
    let mean = result.diagnostics.params[0].mean;
    assert!((mean - 1.0).abs() < 0.25, "mean {mean}");
}

#[test]
fn adaptive_and_hamiltonian_agree_on_posterior_mean() {
    let model = FnDensity::new(2, |t: &[f64]| {
        -0.5 * ((t[0] + 2.0).powi(2) + ((t[1] - 1.0) / 0.5).powi(2))
    });
    let options = Options {
        chains: 2,
        samples: 3000,
        warmup: 1000,
        seed: 5,
        ..Options::default()
    };
    for algorithm in [Algorithm::adaptive_metropolis(), Algorithm::hamiltonian()] {
        let result = run(&model, &[0.0, 0.0], &algorithm, &options, &CancelToken::new()).unwrap();
        let p = &result.diagnostics.params;
        assert!((p[0].mean + 2.0).abs() < 0.2, "{}: {}", algorithm.name(), p[0].mean);
        assert!((p[1].mean - 1.0).abs() < 0.1, "{}: {}", algorithm.name(), p[1].mean);
    }
}
