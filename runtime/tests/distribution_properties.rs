//! Property tests for the distribution framework.

use proptest::prelude::*;
use sirs_runtime::dist::{Registry, Variate};

fn registry() -> Registry {
    Registry::with_builtins()
}

proptest! {
    #[test]
    fn outside_support_is_neg_infinity(x in -1e6f64..-1e-9) {
        let reg = registry();
        for (name, params) in [
            ("exponential", vec![Variate::Real(1.0)]),
            ("gamma", vec![Variate::Real(2.0), Variate::Real(1.0)]),
            ("lognormal", vec![Variate::Real(0.0), Variate::Real(1.0)]),
            ("beta", vec![Variate::Real(2.0), Variate::Real(3.0)]),
        ] {
            let ld = reg.log_density(name, &params, &Variate::Real(x)).unwrap();
            prop_assert_eq!(ld, f64::NEG_INFINITY, "{}", name);
        }
    }

    #[test]
    fn inside_support_is_finite(u in 1e-6f64..(1.0 - 1e-6), x in -50.0f64..50.0) {
        let reg = registry();
        let checks = [
            ("normal", vec![Variate::Real(0.0), Variate::Real(2.0)], Variate::Real(x)),
            ("cauchy", vec![Variate::Real(1.0), Variate::Real(0.5)], Variate::Real(x)),
            ("beta", vec![Variate::Real(0.5), Variate::Real(4.0)], Variate::Real(u)),
            ("uniform", vec![Variate::Real(0.0), Variate::Real(1.0)], Variate::Real(u)),
            ("exponential", vec![Variate::Real(0.3)], Variate::Real(x.abs())),
        ];
        for (name, params, value) in checks {
            let ld = reg.log_density(name, &params, &value).unwrap();
            prop_assert!(ld.is_finite(), "{} at {:?}: {}", name, value, ld);
        }
    }

    #[test]
    fn discrete_support_membership(k in -20i64..60) {
        let reg = registry();
        let ld = reg.log_density("poisson", &[Variate::Real(5.0)], &Variate::Int(k)).unwrap();
        prop_assert_eq!(ld.is_finite(), k >= 0);
        let ld = reg
            .log_density("categorical", &[Variate::Vector(vec![0.5, 0.25, 0.25])], &Variate::Int(k))
            .unwrap();
        prop_assert_eq!(ld.is_finite(), (0..3).contains(&k));
    }

    #[test]
    fn mixture_weights_normalize(weights in proptest::collection::vec(0.0f64..1e6, 1..6)) {
        prop_assume!(weights.iter().sum::<f64>() > 0.0);
        let reg = registry();
        let components: Vec<(&str, Vec<Variate>)> = weights
            .iter()
            .enumerate()
            .map(|(i, _)| ("normal", vec![Variate::Real(i as f64), Variate::Real(1.0)]))
            .collect();
        let defs: Vec<_> = components
            .iter()
            .map(|(n, p)| reg.component(n, p.clone()).unwrap())
            .collect();
        let mixture = sirs_runtime::dist::Mixture::new(defs, &weights).unwrap();
        let total: f64 = mixture.weights().iter().sum();
        prop_assert!((total - 1.0).abs() < 1e-12, "total {}", total);
        prop_assert!(mixture.weights().iter().all(|w| *w >= 0.0));
    }
}
