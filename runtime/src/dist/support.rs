// support.rs — Parameter constraints, support domains, reparameterization
//
// A `Constraint` restricts one parameter value. A `Support` describes where a
// distribution's density is nonzero; some supports depend on the parameter
// values (uniform bounds, categorical arity, simplex dimension). A `Transform`
// maps a constrained scalar domain onto the real line and back.

use std::fmt;
use std::sync::Arc;

use super::{Variate, ValueKind};

/// Tolerance when checking that a vector sums to one.
pub const SIMPLEX_TOLERANCE: f64 = 1e-6;

// ── Constraint ──────────────────────────────────────────────────────────────

pub type Predicate = Arc<dyn Fn(f64) -> bool + Send + Sync>;

/// Constraint on a single parameter value.
#[derive(Clone)]
pub enum Constraint {
    Real,
    Positive,
    NonNegative,
    /// Closed [0, 1].
    Probability,
    Bounded {
        lo: f64,
        hi: f64,
    },
    /// Non-negative integral value.
    Count,
    /// Vector of non-negative entries summing to one.
    Simplex,
    /// Vector of strictly positive entries.
    PositiveVector,
    /// Scalar predicate supplied by the definer.
    Custom {
        label: String,
        predicate: Predicate,
    },
}

impl Constraint {
    /// Whether this constraint applies to vector-valued parameters.
    pub fn is_vector(&self) -> bool {
        matches!(self, Constraint::Simplex | Constraint::PositiveVector)
    }

    /// True if `value` satisfies the constraint.
    pub fn admits(&self, value: &Variate) -> bool {
        match (self, value) {
            (Constraint::Simplex, Variate::Vector(v)) => is_simplex(v),
            (Constraint::PositiveVector, Variate::Vector(v)) => {
                !v.is_empty() && v.iter().all(|x| x.is_finite() && *x > 0.0)
            }
            (_, Variate::Vector(_)) => false,
            (c, scalar) => {
                let Some(x) = scalar.as_f64() else {
                    return false;
                };
                if x.is_nan() {
                    return false;
                }
                match c {
                    Constraint::Real => x.is_finite(),
                    Constraint::Positive => x.is_finite() && x > 0.0,
                    Constraint::NonNegative => x.is_finite() && x >= 0.0,
                    Constraint::Probability => (0.0..=1.0).contains(&x),
                    Constraint::Bounded { lo, hi } => x >= *lo && x <= *hi,
                    Constraint::Count => x.is_finite() && x >= 0.0 && x.fract() == 0.0,
                    Constraint::Custom { predicate, .. } => predicate(x),
                    Constraint::Simplex | Constraint::PositiveVector => false,
                }
            }
        }
    }

    /// Internal consistency of the constraint itself.
    pub fn check_consistent(&self) -> Result<(), String> {
        match self {
            Constraint::Bounded { lo, hi } => {
                if lo.is_nan() || hi.is_nan() {
                    Err("bounds must not be NaN".to_string())
                } else if lo >= hi {
                    Err(format!("empty bound [{lo}, {hi}]"))
                } else {
                    Ok(())
                }
            }
            Constraint::Custom { label, .. } if label.is_empty() => {
                Err("custom constraint needs a label".to_string())
            }
            _ => Ok(()),
        }
    }

    /// Reparameterization onto the real line for a parameter with this
    /// constraint.
    pub fn transform(&self) -> Transform {
        match self {
            Constraint::Positive | Constraint::NonNegative => Transform::Log,
            Constraint::Probability => Transform::Logit,
            Constraint::Bounded { lo, hi } if lo.is_finite() && hi.is_finite() => {
                Transform::Interval { lo: *lo, hi: *hi }
            }
            _ => Transform::Identity,
        }
    }
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constraint::Real => write!(f, "real"),
            Constraint::Positive => write!(f, "positive"),
            Constraint::NonNegative => write!(f, "non_negative"),
            Constraint::Probability => write!(f, "probability"),
            Constraint::Bounded { lo, hi } => write!(f, "bounded[{lo}, {hi}]"),
            Constraint::Count => write!(f, "count"),
            Constraint::Simplex => write!(f, "simplex"),
            Constraint::PositiveVector => write!(f, "positive_vector"),
            Constraint::Custom { label, .. } => write!(f, "custom({label})"),
        }
    }
}

impl fmt::Debug for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Constraint({self})")
    }
}

fn is_simplex(v: &[f64]) -> bool {
    !v.is_empty()
        && v.iter().all(|x| x.is_finite() && *x >= 0.0)
        && (v.iter().sum::<f64>() - 1.0).abs() <= SIMPLEX_TOLERANCE
}

// ── Support ─────────────────────────────────────────────────────────────────

/// Domain over which a distribution's density is nonzero.
#[derive(Debug, Clone)]
pub enum Support {
    RealLine,
    PositiveReals,
    NonNegativeReals,
    /// Open (0, 1).
    UnitInterval,
    /// Closed [lo, hi], fixed at definition time.
    Interval { lo: f64, hi: f64 },
    /// Closed [params[lo], params[hi]].
    ParamInterval { lo: usize, hi: usize },
    Integers,
    NonNegativeIntegers,
    /// {0, 1}.
    Binary,
    /// {0, .., len(params[param]) - 1}.
    CategoryIndex { param: usize },
    /// Probability vectors of dimension len(params[param]).
    Simplex { param: usize },
    /// Union of component supports, each bound to its own parameters.
    Union(Vec<(Support, Vec<Variate>)>),
}

impl Support {
    pub fn value_kind(&self) -> ValueKind {
        match self {
            Support::RealLine
            | Support::PositiveReals
            | Support::NonNegativeReals
            | Support::UnitInterval
            | Support::Interval { .. }
            | Support::ParamInterval { .. } => ValueKind::Real,
            Support::Integers
            | Support::NonNegativeIntegers
            | Support::Binary
            | Support::CategoryIndex { .. } => ValueKind::Integer,
            Support::Simplex { .. } => ValueKind::Vector,
            Support::Union(parts) => parts
                .first()
                .map(|(s, _)| s.value_kind())
                .unwrap_or(ValueKind::Real),
        }
    }

    pub fn is_discrete(&self) -> bool {
        self.value_kind() == ValueKind::Integer
    }

    /// Membership test. Parameters are assumed valid.
    pub fn contains(&self, params: &[Variate], value: &Variate) -> bool {
        match self {
            Support::Simplex { param } => match (value, params.get(*param)) {
                (Variate::Vector(x), Some(Variate::Vector(alpha))) => {
                    x.len() == alpha.len()
                        && x.iter().all(|v| *v > 0.0)
                        && is_simplex(x)
                }
                _ => false,
            },
            Support::Union(parts) => parts.iter().any(|(s, p)| s.contains(p, value)),
            Support::Integers
            | Support::NonNegativeIntegers
            | Support::Binary
            | Support::CategoryIndex { .. } => {
                let k = match value {
                    Variate::Int(k) => *k,
                    Variate::Real(x) if x.is_finite() && x.fract() == 0.0 => *x as i64,
                    _ => return false,
                };
                match self {
                    Support::Integers => true,
                    Support::NonNegativeIntegers => k >= 0,
                    Support::Binary => k == 0 || k == 1,
                    Support::CategoryIndex { param } => match params.get(*param) {
                        Some(Variate::Vector(p)) => k >= 0 && (k as usize) < p.len(),
                        _ => false,
                    },
                    _ => false,
                }
            }
            real => {
                let Some(x) = value.as_f64() else {
                    return false;
                };
                if !x.is_finite() {
                    return false;
                }
                match real {
                    Support::RealLine => true,
                    Support::PositiveReals => x > 0.0,
                    Support::NonNegativeReals => x >= 0.0,
                    Support::UnitInterval => x > 0.0 && x < 1.0,
                    Support::Interval { lo, hi } => x >= *lo && x <= *hi,
                    Support::ParamInterval { lo, hi } => {
                        match (
                            params.get(*lo).and_then(Variate::as_f64),
                            params.get(*hi).and_then(Variate::as_f64),
                        ) {
                            (Some(a), Some(b)) => x >= a && x <= b,
                            _ => false,
                        }
                    }
                    _ => false,
                }
            }
        }
    }

    /// Parameter indices this support reads.
    pub fn param_refs(&self) -> Vec<usize> {
        match self {
            Support::ParamInterval { lo, hi } => vec![*lo, *hi],
            Support::CategoryIndex { param } | Support::Simplex { param } => vec![*param],
            _ => Vec::new(),
        }
    }

    /// Transform compatible with this support.
    pub fn default_transform(&self) -> Transform {
        match self {
            Support::PositiveReals | Support::NonNegativeReals => Transform::Log,
            Support::UnitInterval => Transform::Logit,
            Support::Interval { lo, hi } => Transform::Interval { lo: *lo, hi: *hi },
            _ => Transform::Identity,
        }
    }

    /// Whether `transform` maps this support onto the real line.
    pub fn accepts_transform(&self, transform: &Transform) -> bool {
        match transform {
            Transform::Identity => true,
            Transform::Log => matches!(self, Support::PositiveReals | Support::NonNegativeReals),
            Transform::Logit => matches!(self, Support::UnitInterval),
            Transform::Interval { lo, hi } => {
                matches!(self, Support::Interval { lo: a, hi: b } if a == lo && b == hi)
            }
        }
    }
}

impl fmt::Display for Support {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Support::RealLine => write!(f, "real"),
            Support::PositiveReals => write!(f, "positive_real"),
            Support::NonNegativeReals => write!(f, "non_negative_real"),
            Support::UnitInterval => write!(f, "unit_interval"),
            Support::Interval { lo, hi } => write!(f, "interval[{lo}, {hi}]"),
            Support::ParamInterval { lo, hi } => write!(f, "interval[p{lo}, p{hi}]"),
            Support::Integers => write!(f, "integer"),
            Support::NonNegativeIntegers => write!(f, "non_negative_integer"),
            Support::Binary => write!(f, "binary"),
            Support::CategoryIndex { param } => write!(f, "category[p{param}]"),
            Support::Simplex { param } => write!(f, "simplex[p{param}]"),
            Support::Union(parts) => {
                write!(f, "union(")?;
                for (i, (s, _)) in parts.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{s}")?;
                }
                write!(f, ")")
            }
        }
    }
}

// ── Transform ───────────────────────────────────────────────────────────────

/// Bijection from a constrained scalar domain to the real line.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Transform {
    Identity,
    /// (0, inf) <-> R via log / exp.
    Log,
    /// (0, 1) <-> R via logit / sigmoid.
    Logit,
    /// (lo, hi) <-> R via scaled logit.
    Interval { lo: f64, hi: f64 },
}

impl Transform {
    /// Constrained value to unconstrained.
    pub fn forward(&self, x: f64) -> f64 {
        match self {
            Transform::Identity => x,
            Transform::Log => x.ln(),
            Transform::Logit => crate::special::logit(x),
            Transform::Interval { lo, hi } => crate::special::logit((x - lo) / (hi - lo)),
        }
    }

    /// Unconstrained value to constrained.
    pub fn inverse(&self, z: f64) -> f64 {
        match self {
            Transform::Identity => z,
            Transform::Log => z.exp(),
            Transform::Logit => crate::special::logistic(z),
            Transform::Interval { lo, hi } => lo + (hi - lo) * crate::special::logistic(z),
        }
    }

    /// log |d inverse(z) / dz|.
    pub fn log_abs_det_jacobian(&self, z: f64) -> f64 {
        match self {
            Transform::Identity => 0.0,
            Transform::Log => z,
            Transform::Logit => {
                let s = crate::special::logistic(z);
                s.ln() + (1.0 - s).ln()
            }
            Transform::Interval { lo, hi } => {
                let s = crate::special::logistic(z);
                (hi - lo).ln() + s.ln() + (1.0 - s).ln()
            }
        }
    }
}

impl fmt::Display for Transform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transform::Identity => write!(f, "identity"),
            Transform::Log => write!(f, "log"),
            Transform::Logit => write!(f, "logit"),
            Transform::Interval { lo, hi } => write!(f, "scaled_logit[{lo}, {hi}]"),
        }
    }
}
