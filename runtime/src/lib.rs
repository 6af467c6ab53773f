// sirs_runtime — probabilistic runtime for compiled SIRS programs
//
// Linked by generated code and by the compiler's reference interpreter.
// Holds the distribution framework, the inference engine, and the value
// model shared between interpreted and generated execution.

pub mod dist;
pub mod error;
pub mod infer;
pub mod ops;
pub mod rng;
pub mod session;
pub mod special;
pub mod value;

pub use dist::{Registry, Variate};
pub use error::{DistributionError, Fault, InferenceError};
pub use infer::{run, Algorithm, CancelToken, InferenceResult, LogDensity, Options};
pub use rng::RngStream;
pub use session::Session;
pub use value::Value;
