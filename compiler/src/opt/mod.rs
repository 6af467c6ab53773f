// opt — CIR optimizer
//
// Runs a fixed pass group over the program, repeating it until no pass
// reports a change or the round cap is reached. Each pass rewrites a copy of
// the program; the copy is verified and kept only if the certificate's
// structural obligations still hold.
//
// Preconditions: the input program passes `cir::verify`.
// Postconditions: the output program passes `cir::verify` structurally and
//   computes the same observable behavior as the input.
// Failure modes: a rejected pass result emits W0402 and is discarded;
//   constant integer division by zero on a reachable path emits E0401.
// Side effects: `tracing` events only.

mod const_fold;
mod dce;
mod inline;
mod loops;
mod simplify;

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use sirs_runtime::ops::{self, BinOp};

use crate::ast::Span;
use crate::cfg::Cfg;
use crate::cir::{self, CirCert, CirProgram, InstKind, Operand};
use crate::diag::{codes, Diagnostic, Phase};

pub use const_fold::CONST_FOLD_MAX_ROUNDS;

/// Upper bound on repetitions of the pass group.
pub const MAX_PIPELINE_ROUNDS: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OptLevel {
    O0,
    O1,
    #[default]
    O2,
}

impl FromStr for OptLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "0" | "O0" => Ok(OptLevel::O0),
            "1" | "O1" => Ok(OptLevel::O1),
            "2" | "O2" => Ok(OptLevel::O2),
            other => Err(format!("unknown optimization level '{other}'")),
        }
    }
}

impl fmt::Display for OptLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptLevel::O0 => f.write_str("O0"),
            OptLevel::O1 => f.write_str("O1"),
            OptLevel::O2 => f.write_str("O2"),
        }
    }
}

/// An optimizer pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OptPass {
    Inline,
    ConstFold,
    Dce,
    Simplify,
    Licm,
    Unroll,
    StrengthReduce,
}

impl OptPass {
    pub fn name(self) -> &'static str {
        match self {
            OptPass::Inline => "inline",
            OptPass::ConstFold => "const_fold",
            OptPass::Dce => "dce",
            OptPass::Simplify => "simplify_cfg",
            OptPass::Licm => "licm",
            OptPass::Unroll => "unroll",
            OptPass::StrengthReduce => "strength_reduce",
        }
    }

    /// Rewrite `program` in place. Returns whether anything changed.
    fn apply(self, program: &mut CirProgram) -> bool {
        if self == OptPass::Inline {
            return inline::run(program);
        }
        let mut changed = false;
        for f in &mut program.functions {
            changed |= match self {
                OptPass::Inline => false,
                OptPass::ConstFold => const_fold::run(f),
                OptPass::Dce => dce::run(f),
                OptPass::Simplify => simplify::run(f),
                OptPass::Licm => loops::hoist_invariants(f),
                OptPass::Unroll => loops::unroll(f),
                OptPass::StrengthReduce => loops::reduce_strength(f),
            };
        }
        changed
    }
}

/// Passes of one pipeline round, in order.
pub fn passes_for(level: OptLevel) -> &'static [OptPass] {
    match level {
        OptLevel::O0 => &[],
        OptLevel::O1 => &[OptPass::ConstFold, OptPass::Dce],
        OptLevel::O2 => &[
            OptPass::Inline,
            OptPass::ConstFold,
            OptPass::Dce,
            OptPass::Simplify,
            OptPass::Licm,
            OptPass::Unroll,
            OptPass::StrengthReduce,
            OptPass::ConstFold,
            OptPass::Dce,
            OptPass::Simplify,
        ],
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PassRecord {
    pub pass: &'static str,
    pub round: usize,
    pub changed: bool,
    pub reverted: bool,
}

pub struct OptResult {
    pub cir: CirProgram,
    pub cert: CirCert,
    pub records: Vec<PassRecord>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Optimize a verified program. `spans` maps function names to source
/// locations for diagnostics.
pub fn optimize(cir: CirProgram, level: OptLevel, spans: &HashMap<String, Span>) -> OptResult {
    let mut program = cir;
    let mut records = Vec::new();
    let mut diagnostics = Vec::new();
    let passes = passes_for(level);

    for round in 0..MAX_PIPELINE_ROUNDS {
        if passes.is_empty() {
            break;
        }
        let mut any = false;
        for &pass in passes {
            let mut candidate = program.clone();
            let changed = pass.apply(&mut candidate);
            let mut reverted = false;
            if changed {
                let cert = cir::verify(&candidate);
                if cert.structurally_sound() {
                    program = candidate;
                    any = true;
                } else {
                    reverted = true;
                    tracing::warn!(pass = pass.name(), round, "discarding pass result that failed verification");
                    diagnostics.push(
                        Diagnostic::warning(
                            Phase::Optimization,
                            Span::root(),
                            format!("pass '{}' produced invalid CIR; its result was discarded", pass.name()),
                        )
                        .with_code(codes::W0402),
                    );
                }
            }
            tracing::debug!(pass = pass.name(), round, changed, reverted, "optimizer pass");
            records.push(PassRecord {
                pass: pass.name(),
                round,
                changed,
                reverted,
            });
        }
        if !any {
            break;
        }
    }

    diagnostics.extend(constant_faults(&program, spans));
    let cert = cir::verify(&program);
    OptResult {
        cir: program,
        cert,
        records,
        diagnostics,
    }
}

/// Integer division or remainder by a constant zero on a reachable path.
pub fn constant_faults(program: &CirProgram, spans: &HashMap<String, Span>) -> Vec<Diagnostic> {
    let mut out = Vec::new();
    for f in &program.functions {
        let cfg = Cfg::build(f);
        for &b in &cfg.rpo {
            for inst in &f.blocks[b.index()].insts {
                let InstKind::Binary { op, ty, lhs, rhs } = &inst.kind else {
                    continue;
                };
                if !op.may_fault(*ty) {
                    continue;
                }
                let (Operand::Const(l), Operand::Const(r)) = (lhs, rhs) else {
                    continue;
                };
                if ops::binary(*op, *ty, l, r).is_err() {
                    let what = if *op == BinOp::Div { "division" } else { "remainder" };
                    let span = spans.get(&f.name).cloned().unwrap_or_else(Span::root);
                    out.push(
                        Diagnostic::error(
                            Phase::Optimization,
                            span,
                            format!("constant {what} by zero in '{}'", f.name),
                        )
                        .with_code(codes::E0401),
                    );
                }
            }
        }
    }
    out
}
