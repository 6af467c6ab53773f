// dist — Distribution framework
//
// A `Definition` bundles a name, ordered parameter specs, a support, a
// sampler, a log-density, reparameterization metadata and (for exponential
// family members) sufficient-statistic metadata. Definitions only become
// callable through a `Registry`, which validates them first.

pub mod builtin;
pub mod mixture;
pub mod registry;
pub mod support;

use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use crate::error::DistributionError;
use crate::rng::RngStream;

pub use mixture::Mixture;
pub use registry::{Description, Registry};
pub use support::{Constraint, Support, Transform};

// ── Values ──────────────────────────────────────────────────────────────────

/// A parameter value or a drawn value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Variate {
    Int(i64),
    Real(f64),
    Vector(Vec<f64>),
}

impl Variate {
    /// Scalar view; integers widen to f64.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Variate::Int(k) => Some(*k as f64),
            Variate::Real(x) => Some(*x),
            Variate::Vector(_) => None,
        }
    }

    pub fn as_vector(&self) -> Option<&[f64]> {
        match self {
            Variate::Vector(v) => Some(v),
            _ => None,
        }
    }

    pub fn is_finite(&self) -> bool {
        match self {
            Variate::Int(_) => true,
            Variate::Real(x) => x.is_finite(),
            Variate::Vector(v) => v.iter().all(|x| x.is_finite()),
        }
    }
}

impl fmt::Display for Variate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Variate::Int(k) => write!(f, "{k}"),
            Variate::Real(x) => write!(f, "{x}"),
            Variate::Vector(v) => {
                write!(f, "[")?;
                for (i, x) in v.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{x}")?;
                }
                write!(f, "]")
            }
        }
    }
}

/// Kind of value a distribution produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueKind {
    Real,
    Integer,
    Vector,
}

// ── Definition ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamShape {
    Scalar,
    Vector,
}

/// One declared parameter.
#[derive(Debug, Clone)]
pub struct ParamSpec {
    pub name: String,
    pub shape: ParamShape,
    pub constraint: Constraint,
}

impl ParamSpec {
    pub fn scalar(name: &str, constraint: Constraint) -> Self {
        ParamSpec {
            name: name.to_string(),
            shape: ParamShape::Scalar,
            constraint,
        }
    }

    pub fn vector(name: &str, constraint: Constraint) -> Self {
        ParamSpec {
            name: name.to_string(),
            shape: ParamShape::Vector,
            constraint,
        }
    }
}

pub type SampleFn = Arc<dyn Fn(&[Variate], &mut RngStream) -> Variate + Send + Sync>;
pub type DensityFn = Arc<dyn Fn(&[Variate], &Variate) -> f64 + Send + Sync>;
/// Cross-parameter check (e.g. `lo < hi`), run after per-parameter constraints.
pub type ParamCheck = Arc<dyn Fn(&[Variate]) -> Result<(), String> + Send + Sync>;

/// Exponential-family metadata: sufficient statistics and the map from
/// parameters to natural parameters.
#[derive(Clone)]
pub struct ExpFamily {
    pub sufficient_statistics: Vec<String>,
    pub natural_parameters: fn(&[Variate]) -> Vec<f64>,
}

/// A distribution definition. Not callable until registered: the sampler
/// and density are reachable only through `Registry::sample` and
/// `Registry::log_density`, after `validate` has accepted the definition.
///
/// ```compile_fail
/// use sirs_runtime::dist::{Definition, Support, Variate};
/// use sirs_runtime::rng::RngStream;
///
/// let def = Definition::new("d", Vec::new(), Support::RealLine, |_, _| Variate::Real(0.0), |_, _| 0.0);
/// let _ = (def.sampler)(&[], &mut RngStream::new(0));
/// ```
#[derive(Clone)]
pub struct Definition {
    pub name: String,
    pub params: Vec<ParamSpec>,
    pub support: Support,
    pub transform: Transform,
    sampler: SampleFn,
    density: DensityFn,
    pub param_check: Option<ParamCheck>,
    pub exp_family: Option<ExpFamily>,
    /// Example parameter sets; required for custom definitions, used by
    /// validation and surfaced by `describe`.
    pub examples: Vec<Vec<Variate>>,
}

impl Definition {
    pub fn new(
        name: impl Into<String>,
        params: Vec<ParamSpec>,
        support: Support,
        sampler: impl Fn(&[Variate], &mut RngStream) -> Variate + Send + Sync + 'static,
        density: impl Fn(&[Variate], &Variate) -> f64 + Send + Sync + 'static,
    ) -> Self {
        let transform = support.default_transform();
        Definition {
            name: name.into(),
            params,
            support,
            transform,
            sampler: Arc::new(sampler),
            density: Arc::new(density),
            param_check: None,
            exp_family: None,
            examples: Vec::new(),
        }
    }

    pub fn with_transform(mut self, transform: Transform) -> Self {
        self.transform = transform;
        self
    }

    pub fn with_param_check(
        mut self,
        check: impl Fn(&[Variate]) -> Result<(), String> + Send + Sync + 'static,
    ) -> Self {
        self.param_check = Some(Arc::new(check));
        self
    }

    pub fn with_exp_family(mut self, family: ExpFamily) -> Self {
        self.exp_family = Some(family);
        self
    }

    pub fn with_example(mut self, params: Vec<Variate>) -> Self {
        self.examples.push(params);
        self
    }

    pub fn value_kind(&self) -> ValueKind {
        self.support.value_kind()
    }

    /// Check arity, per-parameter constraints and the cross-parameter check.
    pub fn check_params(&self, params: &[Variate]) -> Result<(), DistributionError> {
        if params.len() != self.params.len() {
            return Err(DistributionError::Arity {
                name: self.name.clone(),
                expected: self.params.len(),
                found: params.len(),
            });
        }
        for (spec, value) in self.params.iter().zip(params) {
            if !spec.constraint.admits(value) {
                return Err(DistributionError::InvalidParameter {
                    name: self.name.clone(),
                    param: spec.name.clone(),
                    detail: format!("{} does not satisfy {}", value, spec.constraint),
                });
            }
        }
        if let Some(check) = &self.param_check {
            check(params).map_err(|detail| DistributionError::InvalidParameter {
                name: self.name.clone(),
                param: "*".to_string(),
                detail,
            })?;
        }
        Ok(())
    }

    /// Draw without checking parameters. Only registered definitions reach
    /// this.
    pub(crate) fn sample_unchecked(&self, params: &[Variate], rng: &mut RngStream) -> Variate {
        (self.sampler)(params, rng)
    }

    /// Log density with the support check applied first. Parameters must
    /// already be valid.
    pub(crate) fn log_density_unchecked(&self, params: &[Variate], value: &Variate) -> f64 {
        if !self.support.contains(params, value) {
            return f64::NEG_INFINITY;
        }
        (self.density)(params, value)
    }
}

impl fmt::Debug for Definition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Definition")
            .field("name", &self.name)
            .field("params", &self.params)
            .field("support", &self.support)
            .field("transform", &self.transform)
            .finish_non_exhaustive()
    }
}

// ── Validation ──────────────────────────────────────────────────────────────

/// Draws per example parameter set during validation.
const VALIDATION_DRAWS: usize = 16;
const VALIDATION_SEED: u64 = 0x5152_5345_5641_4C44;

/// Validate a definition before registration.
///
/// Checks that parameter names are unique, every constraint is internally
/// consistent and matches its parameter shape, the support only references
/// parameters of a compatible shape, the transform fits the support, and
/// that for every example the sampler stays inside the support and the
/// log-density is finite there.
pub fn validate(def: &Definition) -> Result<(), DistributionError> {
    let violation = |detail: String| DistributionError::ConstraintViolation {
        name: def.name.clone(),
        detail,
    };

    if def.name.is_empty() {
        return Err(violation("distribution name is empty".to_string()));
    }

    let mut seen = std::collections::HashSet::new();
    for spec in &def.params {
        if spec.name.is_empty() {
            return Err(violation("parameter with empty name".to_string()));
        }
        if !seen.insert(spec.name.as_str()) {
            return Err(violation(format!("duplicate parameter '{}'", spec.name)));
        }
        spec.constraint
            .check_consistent()
            .map_err(|d| violation(format!("parameter '{}': {}", spec.name, d)))?;
        let vector = spec.shape == ParamShape::Vector;
        if vector != spec.constraint.is_vector() {
            return Err(violation(format!(
                "parameter '{}' is {} but constraint '{}' is not",
                spec.name,
                if vector { "vector-valued" } else { "scalar" },
                spec.constraint
            )));
        }
    }

    for idx in def.support.param_refs() {
        let Some(spec) = def.params.get(idx) else {
            return Err(violation(format!(
                "support '{}' references missing parameter {}",
                def.support, idx
            )));
        };
        let wants_vector = matches!(
            def.support,
            Support::CategoryIndex { .. } | Support::Simplex { .. }
        );
        if wants_vector != (spec.shape == ParamShape::Vector) {
            return Err(violation(format!(
                "support '{}' is incompatible with parameter '{}'",
                def.support, spec.name
            )));
        }
    }

    if !def.support.accepts_transform(&def.transform) {
        return Err(violation(format!(
            "transform '{}' does not map support '{}' onto the real line",
            def.transform, def.support
        )));
    }

    if def.examples.is_empty() {
        return Err(violation("at least one example parameter set is required".to_string()));
    }

    let mut rng = RngStream::derive(VALIDATION_SEED, &def.name);
    for example in &def.examples {
        def.check_params(example)
            .map_err(|e| violation(format!("example parameters rejected: {e}")))?;
        for _ in 0..VALIDATION_DRAWS {
            let x = (def.sampler)(example, &mut rng);
            if !def.support.contains(example, &x) {
                return Err(violation(format!(
                    "sampler produced {x}, outside support '{}'",
                    def.support
                )));
            }
            let ld = (def.density)(example, &x);
            if !ld.is_finite() {
                return Err(violation(format!("log-density {ld} at sampled value {x}")));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn half_normal() -> Definition {
        Definition::new(
            "half_normal",
            vec![ParamSpec::scalar("scale", Constraint::Positive)],
            Support::PositiveReals,
            |p, rng| Variate::Real((rng.normal() * p[0].as_f64().unwrap_or(1.0)).abs()),
            |p, x| {
                let s = p[0].as_f64().unwrap_or(1.0);
                let v = x.as_f64().unwrap_or(f64::NAN);
                (2.0 / std::f64::consts::PI).sqrt().ln() - s.ln() - 0.5 * (v / s).powi(2)
            },
        )
        .with_example(vec![Variate::Real(2.0)])
    }

    #[test]
    fn valid_custom_definition_passes() {
        assert!(validate(&half_normal()).is_ok());
    }

    #[test]
    fn missing_examples_rejected() {
        let mut def = half_normal();
        def.examples.clear();
        assert!(matches!(
            validate(&def),
            Err(DistributionError::ConstraintViolation { .. })
        ));
    }

    #[test]
    fn transform_must_fit_support() {
        let def = half_normal().with_transform(Transform::Logit);
        let err = validate(&def).unwrap_err();
        assert!(err.to_string().contains("transform"), "{err}");
    }

    #[test]
    fn vector_constraint_on_scalar_param_rejected() {
        let mut def = half_normal();
        def.params[0].constraint = Constraint::Simplex;
        assert!(validate(&def).is_err());
    }

    #[test]
    fn sampler_outside_support_rejected() {
        let def = Definition::new(
            "half_normal",
            vec![ParamSpec::scalar("scale", Constraint::Positive)],
            Support::PositiveReals,
            |_, _| Variate::Real(-1.0),
            |_, _| 0.0,
        )
        .with_example(vec![Variate::Real(2.0)]);
        let err = validate(&def).unwrap_err();
        assert!(err.to_string().contains("outside support"), "{err}");
    }
}
