// sirsc — SIRS compiler
//
// Library root: parse → check → lower → optimize → codegen, plus the
// reference interpreter and the inference bridge.

pub mod ast;
pub mod cfg;
pub mod cir;
pub mod codegen;
pub mod diag;
pub mod error;
pub mod id;
pub mod interp;
pub mod json_value;
pub mod lower;
pub mod model;
pub mod opt;
pub mod parser;
pub mod pass;
pub mod pipeline;
pub mod scope;
pub mod typeck;
pub mod types;
pub mod unparse;

pub use error::CompileError;
