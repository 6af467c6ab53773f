// error.rs — Runtime error taxonomy
//
// DistributionError: invalid definitions and invalid sample/density requests.
// InferenceError: numerical failure, cancellation, non-convergence.
// Fault: runtime faults raised by executing a program (interpreted or generated).
//
// All three are recoverable by the caller. None of them leaves the registry or
// a chain in a partially updated state.

use thiserror::Error;

/// Errors from the distribution framework.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DistributionError {
    #[error("unknown distribution '{0}'")]
    Unknown(String),

    #[error("distribution '{0}' is already registered")]
    Duplicate(String),

    /// A definition failed validation and was not registered.
    #[error("constraint violation in '{name}': {detail}")]
    ConstraintViolation { name: String, detail: String },

    #[error("'{name}' expects {expected} parameter(s), got {found}")]
    Arity {
        name: String,
        expected: usize,
        found: usize,
    },

    /// A parameter value does not satisfy its declared constraint.
    #[error("invalid parameter '{param}' for '{name}': {detail}")]
    InvalidParameter {
        name: String,
        param: String,
        detail: String,
    },

    /// A sampler produced a value outside the declared support.
    #[error("sampler for '{name}' produced a value outside its support")]
    OutOfSupport { name: String },

    #[error("invalid mixture: {0}")]
    InvalidMixture(String),
}

/// Errors from an inference run.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum InferenceError {
    /// NaN or +inf log-probability; the run is aborted.
    #[error("numerical failure in chain {chain} at iteration {iteration}: {detail}")]
    NumericalFailure {
        chain: usize,
        iteration: usize,
        detail: String,
    },

    #[error("run cancelled in chain {chain} at iteration {iteration}")]
    Cancelled { chain: usize, iteration: usize },

    #[error("invalid initial state: {0}")]
    InvalidInitialState(String),

    #[error("invalid options: {0}")]
    InvalidOptions(String),

    /// Only raised when the caller asked for convergence to be enforced.
    #[error("chains did not converge: {0}")]
    NotConverged(String),

    #[error(transparent)]
    Distribution(#[from] DistributionError),
}

/// A runtime fault raised while executing a program.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Fault {
    #[error("division by zero")]
    DivisionByZero,

    #[error("index {index} out of bounds for length {len}")]
    IndexOutOfBounds { index: i64, len: usize },

    #[error("control reached the end of a non-unit function")]
    MissingReturn,

    #[error("no implementation of '{interface}.{method}' for '{concrete}'")]
    MissingImpl {
        interface: String,
        method: String,
        concrete: String,
    },

    /// The value did not have the shape the operation expected. Only reachable
    /// from a compiler defect since programs are type checked.
    #[error("internal: {0}")]
    Shape(String),

    #[error("execution step limit of {0} exceeded")]
    FuelExhausted(u64),

    #[error("call depth limit of {0} exceeded")]
    StackOverflow(usize),

    #[error(transparent)]
    Distribution(#[from] DistributionError),
}
