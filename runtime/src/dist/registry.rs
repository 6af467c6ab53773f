// registry.rs — Distribution registry
//
// Explicit registry object, shared by reference between the compiler's
// validation step and the runtime's sampling calls. Reads take a shared
// lock; `define` validates outside the lock and inserts under the write lock,
// so a reader never observes a definition that has not passed validation.
//
// Preconditions: none. `with_builtins` registers the built-in set.
// Failure modes: unknown names, arity and parameter-constraint failures,
// invalid definitions. A failed `define` leaves the registry unchanged.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;

use super::builtin::builtins;
use super::mixture::{Component, Mixture};
use super::{validate, Definition, ParamShape, ValueKind, Variate};
use crate::error::DistributionError;
use crate::rng::RngStream;

// ── Data types ──────────────────────────────────────────────────────────────

/// Parameter as reported by `describe`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParamDescription {
    pub name: String,
    pub shape: ParamShape,
    pub constraint: String,
}

/// Summary of one registered distribution.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Description {
    pub name: String,
    pub params: Vec<ParamDescription>,
    pub support: String,
    pub value_kind: ValueKind,
    pub transform: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sufficient_statistics: Option<Vec<String>>,
    pub examples: Vec<Vec<Variate>>,
}

impl Description {
    fn of(def: &Definition) -> Self {
        Description {
            name: def.name.clone(),
            params: def
                .params
                .iter()
                .map(|p| ParamDescription {
                    name: p.name.clone(),
                    shape: p.shape,
                    constraint: p.constraint.to_string(),
                })
                .collect(),
            support: def.support.to_string(),
            value_kind: def.value_kind(),
            transform: def.transform.to_string(),
            sufficient_statistics: def
                .exp_family
                .as_ref()
                .map(|f| f.sufficient_statistics.clone()),
            examples: def.examples.clone(),
        }
    }
}

// ── Registry ────────────────────────────────────────────────────────────────

/// Registry of validated distribution definitions, keyed by name.
pub struct Registry {
    entries: RwLock<BTreeMap<String, Arc<Definition>>>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    /// An empty registry.
    pub fn new() -> Self {
        Registry {
            entries: RwLock::new(BTreeMap::new()),
        }
    }

    /// A registry holding every built-in distribution.
    pub fn with_builtins() -> Self {
        let mut entries = BTreeMap::new();
        for def in builtins() {
            debug_assert!(validate(&def).is_ok(), "built-in '{}' is invalid", def.name);
            entries.insert(def.name.clone(), Arc::new(def));
        }
        Registry {
            entries: RwLock::new(entries),
        }
    }

    /// Validate and register a definition.
    pub fn define(&self, def: Definition) -> Result<(), DistributionError> {
        if self.entries.read().contains_key(&def.name) {
            return Err(DistributionError::Duplicate(def.name));
        }
        validate(&def)?;

        let mut entries = self.entries.write();
        // Another writer may have won the race since the read check.
        if entries.contains_key(&def.name) {
            return Err(DistributionError::Duplicate(def.name));
        }
        tracing::debug!(name = %def.name, "registered distribution");
        entries.insert(def.name.clone(), Arc::new(def));
        Ok(())
    }

    /// Build a mixture from registered components and register it as `name`.
    /// `components` pairs a registered distribution name with its parameters.
    pub fn define_mixture(
        &self,
        name: &str,
        components: &[(&str, Vec<Variate>)],
        weights: &[f64],
    ) -> Result<(), DistributionError> {
        let components = components
            .iter()
            .map(|(dist, params)| self.component(dist, params.clone()))
            .collect::<Result<Vec<_>, DistributionError>>()?;
        let mixture = Mixture::new(components, weights)?;
        self.define(mixture.into_definition(name))
    }

    /// Bind a registered distribution to parameter values for use in a
    /// `Mixture`.
    pub fn component(&self, name: &str, params: Vec<Variate>) -> Result<Component, DistributionError> {
        Ok(Component {
            definition: self.lookup(name)?,
            params,
        })
    }

    pub fn lookup(&self, name: &str) -> Result<Arc<Definition>, DistributionError> {
        self.entries
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| DistributionError::Unknown(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.read().contains_key(name)
    }

    /// Registered names, sorted.
    pub fn list(&self) -> Vec<String> {
        self.entries.read().keys().cloned().collect()
    }

    pub fn describe(&self, name: &str) -> Result<Description, DistributionError> {
        Ok(Description::of(&*self.lookup(name)?))
    }

    /// Draw one variate. Parameters are checked first.
    pub fn sample(
        &self,
        name: &str,
        params: &[Variate],
        rng: &mut RngStream,
    ) -> Result<Variate, DistributionError> {
        let def = self.lookup(name)?;
        def.check_params(params)?;
        Ok(def.sample_unchecked(params, rng))
    }

    /// Log density or mass of `value`. Values outside the support give
    /// negative infinity; only unknown names and invalid parameters fail.
    pub fn log_density(
        &self,
        name: &str,
        params: &[Variate],
        value: &Variate,
    ) -> Result<f64, DistributionError> {
        let def = self.lookup(name)?;
        def.check_params(params)?;
        Ok(def.log_density_unchecked(params, value))
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Deterministic JSON of every description, used as a fingerprint.
    pub fn canonical_json(&self) -> String {
        let descriptions: Vec<Description> =
            self.entries.read().values().map(|d| Description::of(d)).collect();
        serde_json::to_string(&descriptions).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dist::{Constraint, ParamSpec, Support};

    fn shifted_exponential(name: &str, constraint: Constraint) -> Definition {
        Definition::new(
            name,
            vec![ParamSpec::scalar("rate", constraint)],
            Support::PositiveReals,
            |p: &[Variate], rng: &mut RngStream| {
                Variate::Real(1.0 + rng.exponential(p[0].as_f64().unwrap_or(1.0)))
            },
            |p: &[Variate], x: &Variate| {
                let rate = p[0].as_f64().unwrap_or(1.0);
                let v = x.as_f64().unwrap_or(0.0);
                if v < 1.0 {
                    f64::NEG_INFINITY
                } else {
                    rate.ln() - rate * (v - 1.0)
                }
            },
        )
        .with_example(vec![Variate::Real(2.0)])
    }

    #[test]
    fn builtins_registered_and_listed_sorted() {
        let reg = Registry::with_builtins();
        let names = reg.list();
        assert!(names.contains(&"normal".to_string()));
        assert!(names.contains(&"bernoulli".to_string()));
        let mut sorted = names.clone();
        sorted.sort();
        assert_eq!(names, sorted);
    }

    #[test]
    fn define_custom_distribution() {
        let reg = Registry::new();
        reg.define(shifted_exponential("shifted_exp", Constraint::Positive))
            .unwrap();
        let mut rng = RngStream::new(1);
        let x = reg
            .sample("shifted_exp", &[Variate::Real(2.0)], &mut rng)
            .unwrap();
        assert!(x.as_f64().unwrap() >= 1.0);
        let d = reg.describe("shifted_exp").unwrap();
        assert_eq!(d.params[0].constraint, "positive");
        assert_eq!(d.examples.len(), 1);
    }

    #[test]
    fn invalid_definition_never_enters_registry() {
        let reg = Registry::new();
        let bad = shifted_exponential("bad", Constraint::Bounded { lo: 3.0, hi: 1.0 });
        let err = reg.define(bad).unwrap_err();
        assert!(matches!(err, DistributionError::ConstraintViolation { .. }));
        assert!(!reg.contains("bad"));
        assert!(matches!(
            reg.sample("bad", &[Variate::Real(1.0)], &mut RngStream::new(0)),
            Err(DistributionError::Unknown(_))
        ));
    }

    #[test]
    fn failed_define_leaves_list_unchanged() {
        let reg = Registry::with_builtins();
        let before = reg.list();
        assert!(reg
            .define(shifted_exponential("bad", Constraint::Bounded { lo: 3.0, hi: 1.0 }))
            .is_err());
        assert!(reg
            .define(shifted_exponential("normal", Constraint::Positive))
            .is_err());
        assert!(reg.define_mixture("empty", &[], &[]).is_err());
        assert_eq!(reg.list(), before);
        assert_eq!(reg.canonical_json(), Registry::with_builtins().canonical_json());
    }

    #[test]
    fn concurrent_define_alongside_readers() {
        let reg = Registry::with_builtins();
        let builtin_count = reg.len();
        std::thread::scope(|scope| {
            scope.spawn(|| {
                for i in 0..16 {
                    reg.define(shifted_exponential(&format!("custom_{i}"), Constraint::Positive))
                        .unwrap();
                }
            });
            for t in 0..4u64 {
                let reg = &reg;
                scope.spawn(move || {
                    let mut rng = RngStream::new(t);
                    for _ in 0..200 {
                        let x = reg
                            .sample("normal", &[Variate::Real(0.0), Variate::Real(1.0)], &mut rng)
                            .unwrap();
                        assert!(x.as_f64().unwrap().is_finite());
                        assert!(reg.lookup("gamma").is_ok());
                        let names = reg.list();
                        assert!(names.len() >= builtin_count);
                        // Anything listed is already fully registered.
                        for name in names.iter().filter(|n| n.starts_with("custom_")) {
                            let y = reg.sample(name, &[Variate::Real(2.0)], &mut rng).unwrap();
                            assert!(y.as_f64().unwrap() >= 1.0);
                        }
                    }
                });
            }
        });
        assert_eq!(reg.len(), builtin_count + 16);
    }

    #[test]
    fn duplicate_rejected() {
        let reg = Registry::with_builtins();
        let err = reg
            .define(shifted_exponential("normal", Constraint::Positive))
            .unwrap_err();
        assert_eq!(err, DistributionError::Duplicate("normal".to_string()));
    }

    #[test]
    fn log_density_outside_support_is_neg_infinity() {
        let reg = Registry::with_builtins();
        let ld = reg
            .log_density("exponential", &[Variate::Real(1.0)], &Variate::Real(-0.5))
            .unwrap();
        assert_eq!(ld, f64::NEG_INFINITY);
        let ld = reg
            .log_density("bernoulli", &[Variate::Real(0.3)], &Variate::Int(2))
            .unwrap();
        assert_eq!(ld, f64::NEG_INFINITY);
    }

    #[test]
    fn invalid_parameters_are_errors() {
        let reg = Registry::with_builtins();
        let mut rng = RngStream::new(0);
        assert!(matches!(
            reg.sample("normal", &[Variate::Real(0.0), Variate::Real(-1.0)], &mut rng),
            Err(DistributionError::InvalidParameter { .. })
        ));
        assert!(matches!(
            reg.sample("normal", &[Variate::Real(0.0)], &mut rng),
            Err(DistributionError::Arity { .. })
        ));
        assert!(reg
            .sample("uniform", &[Variate::Real(2.0), Variate::Real(1.0)], &mut rng)
            .is_err());
    }

    #[test]
    fn mixture_registration() {
        let reg = Registry::with_builtins();
        reg.define_mixture(
            "bimodal",
            &[
                ("normal", vec![Variate::Real(-3.0), Variate::Real(1.0)]),
                ("normal", vec![Variate::Real(3.0), Variate::Real(1.0)]),
            ],
            &[2.0, 2.0],
        )
        .unwrap();
        let ld = reg.log_density("bimodal", &[], &Variate::Real(0.0)).unwrap();
        assert!(ld.is_finite());
        assert!(reg
            .define_mixture("broken", &[("nope", vec![])], &[1.0])
            .is_err());
    }

    #[test]
    fn canonical_json_is_stable() {
        let a = Registry::with_builtins().canonical_json();
        let b = Registry::with_builtins().canonical_json();
        assert_eq!(a, b);
        assert!(a.contains("\"name\":\"normal\""));
    }
}
