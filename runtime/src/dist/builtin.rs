// builtin.rs — Built-in distributions
//
// Closed-form log-densities; samplers use the transforms in `rng`
// (Box-Muller, Marsaglia-Tsang, ratio of gammas, inversion, PTRS).
// Every built-in carries at least one example parameter set and passes the
// same validation as a custom definition.

use std::f64::consts::PI;
use super::{Constraint, Definition, ExpFamily, ParamSpec, Support, Variate};
use crate::special::{ln_beta, ln_gamma, logit};

const LN_SQRT_2PI: f64 = 0.918_938_533_204_672_8;

fn real(params: &[Variate], i: usize) -> f64 {
    params.get(i).and_then(Variate::as_f64).unwrap_or(f64::NAN)
}

fn vector(params: &[Variate], i: usize) -> &[f64] {
    params.get(i).and_then(Variate::as_vector).unwrap_or(&[])
}

fn scalar(x: &Variate) -> f64 {
    x.as_f64().unwrap_or(f64::NAN)
}

/// All built-in definitions in registration order.
pub fn builtins() -> Vec<Definition> {
    vec![
        uniform(),
        normal(),
        exponential(),
        gamma(),
        beta(),
        bernoulli(),
        categorical(),
        poisson(),
        lognormal(),
        dirichlet(),
        cauchy(),
    ]
}

fn uniform() -> Definition {
    Definition::new(
        "uniform",
        vec![
            ParamSpec::scalar("lo", Constraint::Real),
            ParamSpec::scalar("hi", Constraint::Real),
        ],
        Support::ParamInterval { lo: 0, hi: 1 },
        |p, rng| Variate::Real(rng.uniform_range(real(p, 0), real(p, 1))),
        |p, _| -(real(p, 1) - real(p, 0)).ln(),
    )
    .with_param_check(|p| {
        if real(p, 0) < real(p, 1) {
            Ok(())
        } else {
            Err("lo must be strictly less than hi".to_string())
        }
    })
    .with_example(vec![Variate::Real(0.0), Variate::Real(1.0)])
    .with_example(vec![Variate::Real(-3.0), Variate::Real(7.5)])
}

fn normal() -> Definition {
    Definition::new(
        "normal",
        vec![
            ParamSpec::scalar("mean", Constraint::Real),
            ParamSpec::scalar("std", Constraint::Positive),
        ],
        Support::RealLine,
        |p, rng| Variate::Real(rng.normal_with(real(p, 0), real(p, 1))),
        |p, x| {
            let (mu, sigma) = (real(p, 0), real(p, 1));
            let z = (scalar(x) - mu) / sigma;
            -LN_SQRT_2PI - sigma.ln() - 0.5 * z * z
        },
    )
    .with_exp_family(ExpFamily {
        sufficient_statistics: vec!["x".to_string(), "x^2".to_string()],
        natural_parameters: |p| {
            let (mu, sigma) = (real(p, 0), real(p, 1));
            let var = sigma * sigma;
            vec![mu / var, -0.5 / var]
        },
    })
    .with_example(vec![Variate::Real(0.0), Variate::Real(1.0)])
    .with_example(vec![Variate::Real(10.0), Variate::Real(0.5)])
}

fn exponential() -> Definition {
    Definition::new(
        "exponential",
        vec![ParamSpec::scalar("rate", Constraint::Positive)],
        Support::NonNegativeReals,
        |p, rng| Variate::Real(rng.exponential(real(p, 0))),
        |p, x| {
            let rate = real(p, 0);
            rate.ln() - rate * scalar(x)
        },
    )
    .with_exp_family(ExpFamily {
        sufficient_statistics: vec!["x".to_string()],
        natural_parameters: |p| vec![-real(p, 0)],
    })
    .with_example(vec![Variate::Real(1.5)])
}

fn gamma() -> Definition {
    Definition::new(
        "gamma",
        vec![
            ParamSpec::scalar("shape", Constraint::Positive),
            ParamSpec::scalar("rate", Constraint::Positive),
        ],
        Support::PositiveReals,
        |p, rng| Variate::Real(rng.gamma(real(p, 0)) / real(p, 1)),
        |p, x| {
            let (a, b, v) = (real(p, 0), real(p, 1), scalar(x));
            a * b.ln() - ln_gamma(a) + (a - 1.0) * v.ln() - b * v
        },
    )
    .with_exp_family(ExpFamily {
        sufficient_statistics: vec!["ln x".to_string(), "x".to_string()],
        natural_parameters: |p| vec![real(p, 0) - 1.0, -real(p, 1)],
    })
    .with_example(vec![Variate::Real(2.0), Variate::Real(1.0)])
    .with_example(vec![Variate::Real(9.0), Variate::Real(0.5)])
}

fn beta() -> Definition {
    Definition::new(
        "beta",
        vec![
            ParamSpec::scalar("alpha", Constraint::Positive),
            ParamSpec::scalar("beta", Constraint::Positive),
        ],
        Support::UnitInterval,
        |p, rng| Variate::Real(rng.beta(real(p, 0), real(p, 1))),
        |p, x| {
            let (a, b, v) = (real(p, 0), real(p, 1), scalar(x));
            (a - 1.0) * v.ln() + (b - 1.0) * (1.0 - v).ln() - ln_beta(a, b)
        },
    )
    .with_exp_family(ExpFamily {
        sufficient_statistics: vec!["ln x".to_string(), "ln (1 - x)".to_string()],
        natural_parameters: |p| vec![real(p, 0) - 1.0, real(p, 1) - 1.0],
    })
    .with_example(vec![Variate::Real(2.0), Variate::Real(5.0)])
}

fn bernoulli() -> Definition {
    Definition::new(
        "bernoulli",
        vec![ParamSpec::scalar("p", Constraint::Probability)],
        Support::Binary,
        |p, rng| Variate::Int(rng.bool_with_prob(real(p, 0)) as i64),
        |p, x| {
            let prob = real(p, 0);
            if scalar(x) == 1.0 {
                prob.ln()
            } else {
                (1.0 - prob).ln()
            }
        },
    )
    .with_exp_family(ExpFamily {
        sufficient_statistics: vec!["x".to_string()],
        natural_parameters: |p| vec![logit(real(p, 0))],
    })
    .with_example(vec![Variate::Real(0.5)])
    .with_example(vec![Variate::Real(0.1)])
}

fn categorical() -> Definition {
    Definition::new(
        "categorical",
        vec![ParamSpec::vector("probs", Constraint::Simplex)],
        Support::CategoryIndex { param: 0 },
        |p, rng| Variate::Int(rng.weighted_choice(vector(p, 0)) as i64),
        |p, x| {
            let probs = vector(p, 0);
            probs
                .get(scalar(x) as usize)
                .map(|q| q.ln())
                .unwrap_or(f64::NEG_INFINITY)
        },
    )
    .with_exp_family(ExpFamily {
        sufficient_statistics: vec!["one_hot(x)".to_string()],
        natural_parameters: |p| vector(p, 0).iter().map(|q| q.ln()).collect(),
    })
    .with_example(vec![Variate::Vector(vec![0.2, 0.3, 0.5])])
}

fn poisson() -> Definition {
    Definition::new(
        "poisson",
        vec![ParamSpec::scalar("rate", Constraint::Positive)],
        Support::NonNegativeIntegers,
        |p, rng| Variate::Int(rng.poisson(real(p, 0))),
        |p, x| {
            let (lambda, k) = (real(p, 0), scalar(x));
            k * lambda.ln() - lambda - ln_gamma(k + 1.0)
        },
    )
    .with_exp_family(ExpFamily {
        sufficient_statistics: vec!["x".to_string()],
        natural_parameters: |p| vec![real(p, 0).ln()],
    })
    .with_example(vec![Variate::Real(3.0)])
    .with_example(vec![Variate::Real(25.0)])
}

fn lognormal() -> Definition {
    Definition::new(
        "lognormal",
        vec![
            ParamSpec::scalar("mu", Constraint::Real),
            ParamSpec::scalar("sigma", Constraint::Positive),
        ],
        Support::PositiveReals,
        |p, rng| Variate::Real(rng.normal_with(real(p, 0), real(p, 1)).exp()),
        |p, x| {
            let (mu, sigma, v) = (real(p, 0), real(p, 1), scalar(x));
            let z = (v.ln() - mu) / sigma;
            -v.ln() - sigma.ln() - LN_SQRT_2PI - 0.5 * z * z
        },
    )
    .with_exp_family(ExpFamily {
        sufficient_statistics: vec!["ln x".to_string(), "(ln x)^2".to_string()],
        natural_parameters: |p| {
            let (mu, sigma) = (real(p, 0), real(p, 1));
            let var = sigma * sigma;
            vec![mu / var, -0.5 / var]
        },
    })
    .with_example(vec![Variate::Real(0.0), Variate::Real(0.5)])
}

fn dirichlet() -> Definition {
    Definition::new(
        "dirichlet",
        vec![ParamSpec::vector("alpha", Constraint::PositiveVector)],
        Support::Simplex { param: 0 },
        |p, rng| {
            let draws: Vec<f64> = vector(p, 0).iter().map(|a| rng.gamma(*a)).collect();
            let total: f64 = draws.iter().sum();
            Variate::Vector(draws.into_iter().map(|g| g / total).collect())
        },
        |p, x| {
            let alpha = vector(p, 0);
            let Some(xs) = x.as_vector() else {
                return f64::NEG_INFINITY;
            };
            let norm = ln_gamma(alpha.iter().sum()) - alpha.iter().map(|a| ln_gamma(*a)).sum::<f64>();
            norm + alpha
                .iter()
                .zip(xs)
                .map(|(a, v)| (a - 1.0) * v.ln())
                .sum::<f64>()
        },
    )
    .with_exp_family(ExpFamily {
        sufficient_statistics: vec!["ln x_i".to_string()],
        natural_parameters: |p| vector(p, 0).iter().map(|a| a - 1.0).collect(),
    })
    .with_example(vec![Variate::Vector(vec![2.0, 3.0, 4.0])])
}

fn cauchy() -> Definition {
    Definition::new(
        "cauchy",
        vec![
            ParamSpec::scalar("loc", Constraint::Real),
            ParamSpec::scalar("scale", Constraint::Positive),
        ],
        Support::RealLine,
        |p, rng| {
            let u = rng.uniform_open();
            Variate::Real(real(p, 0) + real(p, 1) * (PI * (u - 0.5)).tan())
        },
        |p, x| {
            let (loc, scale) = (real(p, 0), real(p, 1));
            let z = (scalar(x) - loc) / scale;
            -(PI * scale * (1.0 + z * z)).ln()
        },
    )
    .with_example(vec![Variate::Real(0.0), Variate::Real(1.0)])
}
