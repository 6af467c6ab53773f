// mixture.rs — Weighted mixtures of registered distributions
//
// Weights are validated (finite, non-negative, positive total) and normalized
// once at construction. Sampling picks a component proportionally to its
// weight and delegates; the density is the log-sum-exp of the weighted
// component densities.

use std::sync::Arc;

use super::{Definition, Support, Variate};
use crate::error::DistributionError;
use crate::special::log_sum_exp;

/// One mixture component: a registered definition bound to parameter values.
/// Built by `Registry::component`.
#[derive(Debug, Clone)]
pub struct Component {
    pub(crate) definition: Arc<Definition>,
    pub(crate) params: Vec<Variate>,
}

impl Component {
    pub fn name(&self) -> &str {
        &self.definition.name
    }

    pub fn params(&self) -> &[Variate] {
        &self.params
    }
}

#[derive(Debug, Clone)]
pub struct Mixture {
    components: Vec<Component>,
    weights: Vec<f64>,
}

impl Mixture {
    pub fn new(components: Vec<Component>, weights: &[f64]) -> Result<Self, DistributionError> {
        if components.is_empty() {
            return Err(DistributionError::InvalidMixture("no components".to_string()));
        }
        if components.len() != weights.len() {
            return Err(DistributionError::InvalidMixture(format!(
                "{} components but {} weights",
                components.len(),
                weights.len()
            )));
        }
        if let Some(w) = weights.iter().find(|w| !w.is_finite() || **w < 0.0) {
            return Err(DistributionError::InvalidMixture(format!(
                "weight {w} is negative or not finite"
            )));
        }
        let total: f64 = weights.iter().sum();
        if total <= 0.0 {
            return Err(DistributionError::InvalidMixture(
                "weights sum to zero".to_string(),
            ));
        }

        let kind = components[0].definition.value_kind();
        for c in &components {
            c.definition.check_params(&c.params)?;
            if c.definition.value_kind() != kind {
                return Err(DistributionError::InvalidMixture(format!(
                    "component '{}' produces {:?} values, expected {:?}",
                    c.definition.name,
                    c.definition.value_kind(),
                    kind
                )));
            }
        }

        Ok(Mixture {
            components,
            weights: weights.iter().map(|w| w / total).collect(),
        })
    }

    /// Normalized weights, in component order.
    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    pub fn components(&self) -> &[Component] {
        &self.components
    }

    /// Package the mixture as a parameterless definition. Components with
    /// zero weight contribute neither to the support nor to the density.
    pub(crate) fn into_definition(self, name: impl Into<String>) -> Definition {
        let live: Vec<(Component, f64)> = self
            .components
            .into_iter()
            .zip(self.weights)
            .filter(|(_, w)| *w > 0.0)
            .collect();
        let support = Support::Union(
            live.iter()
                .map(|(c, _)| (c.definition.support.clone(), c.params.clone()))
                .collect(),
        );
        let weights: Vec<f64> = live.iter().map(|(_, w)| *w).collect();
        let parts = Arc::new(live);
        let sampled = Arc::clone(&parts);

        Definition::new(
            name,
            Vec::new(),
            support,
            move |_, rng| {
                let i = rng.weighted_choice(&weights);
                let (c, _) = &sampled[i];
                c.definition.sample_unchecked(&c.params, rng)
            },
            move |_, x| {
                let terms: Vec<f64> = parts
                    .iter()
                    .map(|(c, w)| w.ln() + c.definition.log_density_unchecked(&c.params, x))
                    .collect();
                log_sum_exp(&terms)
            },
        )
        .with_example(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dist::Registry;
    use crate::rng::RngStream;

    fn normal(reg: &Registry, mean: f64) -> Component {
        reg.component("normal", vec![Variate::Real(mean), Variate::Real(1.0)])
            .unwrap()
    }

    #[test]
    fn weights_are_normalized() {
        let reg = Registry::with_builtins();
        let m = Mixture::new(vec![normal(&reg, -2.0), normal(&reg, 2.0)], &[30.0, 10.0]).unwrap();
        assert_eq!(m.weights(), &[0.75, 0.25]);
        assert_eq!(m.components()[1].name(), "normal");
    }

    #[test]
    fn rejects_bad_weights() {
        let reg = Registry::with_builtins();
        let n = |mean| normal(&reg, mean);
        assert!(Mixture::new(vec![n(0.0)], &[-1.0]).is_err());
        assert!(Mixture::new(vec![n(0.0)], &[0.0]).is_err());
        assert!(Mixture::new(vec![n(0.0)], &[f64::NAN]).is_err());
        assert!(Mixture::new(vec![n(0.0), n(1.0)], &[1.0]).is_err());
    }

    #[test]
    fn rejects_mixed_value_kinds() {
        let reg = Registry::with_builtins();
        let coin = reg.component("bernoulli", vec![Variate::Real(0.5)]).unwrap();
        let err = Mixture::new(vec![normal(&reg, 0.0), coin], &[1.0, 1.0]).unwrap_err();
        assert!(matches!(err, DistributionError::InvalidMixture(_)));
    }

    #[test]
    fn density_matches_weighted_sum() {
        let reg = Registry::with_builtins();
        reg.define_mixture(
            "bimodal",
            &[
                ("normal", vec![Variate::Real(-2.0), Variate::Real(1.0)]),
                ("normal", vec![Variate::Real(2.0), Variate::Real(1.0)]),
            ],
            &[1.0, 3.0],
        )
        .unwrap();
        let x = Variate::Real(0.5);
        let at = |mean: f64| {
            reg.log_density("normal", &[Variate::Real(mean), Variate::Real(1.0)], &x)
                .unwrap()
                .exp()
        };
        let expected = 0.25 * at(-2.0) + 0.75 * at(2.0);
        let got = reg.log_density("bimodal", &[], &x).unwrap().exp();
        assert!((got - expected).abs() < 1e-12);
    }

    #[test]
    fn sampling_follows_weights() {
        let reg = Registry::with_builtins();
        reg.define_mixture(
            "far",
            &[
                ("normal", vec![Variate::Real(-50.0), Variate::Real(1.0)]),
                ("normal", vec![Variate::Real(50.0), Variate::Real(1.0)]),
            ],
            &[1.0, 4.0],
        )
        .unwrap();
        let mut rng = RngStream::new(99);
        let n = 20_000;
        let right = (0..n)
            .filter(|_| reg.sample("far", &[], &mut rng).unwrap().as_f64().unwrap() > 0.0)
            .count();
        let frac = right as f64 / n as f64;
        assert!((frac - 0.8).abs() < 0.02, "frac {frac}");
    }
}
