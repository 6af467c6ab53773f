// error.rs — Driver-level errors
//
// Phase diagnostics stay in `Diagnostic` lists; `CompileError` is what the
// library API and the CLI return once a run cannot continue. Each variant
// maps to a process exit code.

use std::path::PathBuf;

use sirs_runtime::{DistributionError, Fault, InferenceError};
use thiserror::Error;

use crate::diag::{Diagnostic, Phase};
use crate::parser::ParseError;

#[derive(Debug, Error)]
pub enum CompileError {
    #[error("cannot read '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Parse(#[from] ParseError),

    /// A phase recorded one or more error diagnostics.
    #[error("{phase} phase failed with {} error(s)", diagnostics.len())]
    Phase {
        phase: Phase,
        diagnostics: Vec<Diagnostic>,
    },

    /// Run or inference input that does not match the entry signature.
    #[error("invalid input: {0}")]
    Input(String),

    #[error("runtime fault: {0}")]
    Fault(#[from] Fault),

    #[error(transparent)]
    Inference(#[from] InferenceError),

    #[error(transparent)]
    Distribution(#[from] DistributionError),
}

impl CompileError {
    /// 1 for rejected programs and runtime faults, 2 for usage and I/O.
    pub fn exit_code(&self) -> i32 {
        match self {
            CompileError::Io { .. } | CompileError::Input(_) => 2,
            _ => 1,
        }
    }

    /// Diagnostics carried by the error, if any.
    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        match self {
            CompileError::Parse(e) => e.diagnostics(),
            CompileError::Phase { diagnostics, .. } => diagnostics.clone(),
            _ => Vec::new(),
        }
    }
}
