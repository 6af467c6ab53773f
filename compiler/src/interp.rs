// interp.rs — Reference interpreter for CIR
//
// Executes CIR directly against `sirs_runtime` so that optimized and
// unoptimized programs, and generated code, can be compared by their
// observable behavior: return value, observation log weight and printed
// output.
//
// Preconditions: the program passes `cir::verify` structurally.
// Postconditions: `call` returns the function's value or the first fault.
// Failure modes: runtime faults (division by zero, bounds, missing impl),
//   fuel exhaustion and call-depth overflow, all as `Fault`.
// Side effects: `print` output and log weight accumulate in the `Session`.

use std::collections::HashMap;
use std::sync::Arc;

use sirs_runtime::ops;
use sirs_runtime::{Fault, Registry, Session, Value};

use crate::cir::{CirFunction, CirProgram, InstKind, Operand, Terminator};
use crate::id::BlockId;

/// Default step budget: instructions plus terminators executed.
pub const DEFAULT_FUEL: u64 = 50_000_000;
/// Default maximum call depth.
pub const DEFAULT_MAX_DEPTH: usize = 512;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    pub fuel: u64,
    pub max_depth: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Limits {
            fuel: DEFAULT_FUEL,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

/// Observable outcome of running an entry function.
#[derive(Debug, Clone, PartialEq)]
pub struct Outcome {
    pub result: Value,
    pub log_weight: f64,
    pub output: Vec<String>,
    pub steps: u64,
}

pub struct Interpreter<'p> {
    program: &'p CirProgram,
    index: HashMap<&'p str, usize>,
    limits: Limits,
    steps: u64,
    depth: usize,
}

impl<'p> Interpreter<'p> {
    pub fn new(program: &'p CirProgram) -> Self {
        Interpreter {
            program,
            index: program.function_index(),
            limits: Limits::default(),
            steps: 0,
            depth: 0,
        }
    }

    pub fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    /// Steps executed so far across all calls.
    pub fn steps(&self) -> u64 {
        self.steps
    }

    pub fn call(&mut self, name: &str, args: Vec<Value>, session: &mut Session) -> Result<Value, Fault> {
        let program = self.program;
        let f = self
            .index
            .get(name)
            .map(|&i| &program.functions[i])
            .ok_or_else(|| Fault::Shape(format!("call to unknown function '{name}'")))?;
        if self.depth >= self.limits.max_depth {
            return Err(Fault::StackOverflow(self.limits.max_depth));
        }
        self.depth += 1;
        let result = self.execute(f, args, session);
        self.depth -= 1;
        result
    }

    fn tick(&mut self) -> Result<(), Fault> {
        self.steps += 1;
        if self.steps > self.limits.fuel {
            return Err(Fault::FuelExhausted(self.limits.fuel));
        }
        Ok(())
    }

    fn execute(&mut self, f: &'p CirFunction, args: Vec<Value>, session: &mut Session) -> Result<Value, Fault> {
        if args.len() != f.params {
            return Err(Fault::Shape(format!(
                "'{}' takes {} argument(s), got {}",
                f.name,
                f.params,
                args.len()
            )));
        }
        let mut frame = Frame {
            regs: vec![None; f.next_reg as usize],
            locals: vec![Value::Unit; f.locals.len()],
        };
        for (slot, arg) in frame.locals.iter_mut().zip(args) {
            *slot = arg;
        }

        let mut bb = BlockId(0);
        loop {
            let block = f
                .blocks
                .get(bb.index())
                .ok_or_else(|| Fault::Shape(format!("'{}' has no block {bb}", f.name)))?;
            for inst in &block.insts {
                self.tick()?;
                let v = self.eval(&inst.kind, &mut frame, session)?;
                if let Some(dst) = inst.dst {
                    frame.regs[dst.index()] = Some(v);
                }
            }
            self.tick()?;
            match &block.term {
                Terminator::Jump(t) => bb = *t,
                Terminator::Branch { cond, then_bb, else_bb } => {
                    bb = if frame.read(cond)?.as_bool()? { *then_bb } else { *else_bb };
                }
                Terminator::Return(v) => return frame.read(v),
                Terminator::Unreachable => return Err(Fault::MissingReturn),
            }
        }
    }

    fn eval(&mut self, kind: &InstKind, frame: &mut Frame, session: &mut Session) -> Result<Value, Fault> {
        Ok(match kind {
            InstKind::Copy(v) => frame.read(v)?,
            InstKind::Binary { op, ty, lhs, rhs } => ops::binary(*op, *ty, &frame.read(lhs)?, &frame.read(rhs)?)?,
            InstKind::Unary { op, ty, operand } => ops::unary(*op, *ty, &frame.read(operand)?)?,
            InstKind::Cast { from, to, value } => ops::cast(*from, *to, &frame.read(value)?)?,
            InstKind::Load(l) => frame.locals[l.index()].clone(),
            InstKind::Store { local, value } => {
                frame.locals[local.index()] = frame.read(value)?;
                Value::Unit
            }
            InstKind::Call { func, args } => {
                let args = frame.read_all(args)?;
                self.call(func, args, session)?
            }
            InstKind::CallDyn {
                interface,
                slot,
                receiver,
                args,
            } => {
                let receiver = frame.read(receiver)?;
                let (concrete, inner) = receiver.as_dyn()?;
                let Some(target) = self.program.dispatch.lookup(interface, concrete, *slot) else {
                    return Err(Fault::MissingImpl {
                        interface: interface.clone(),
                        method: format!("#{slot}"),
                        concrete: self
                            .program
                            .dispatch
                            .concrete
                            .get(concrete as usize)
                            .map_or_else(|| format!("#{concrete}"), |t| t.to_string()),
                    });
                };
                let mut full = Vec::with_capacity(args.len() + 1);
                full.push(inner.clone());
                full.extend(frame.read_all(args)?);
                self.call(target, full, session)?
            }
            InstKind::MakeDyn { concrete, value } => Value::Dyn {
                concrete: *concrete,
                value: Box::new(frame.read(value)?),
            },
            InstKind::Aggregate { kind, elems } => kind.build(frame.read_all(elems)?),
            InstKind::Extract { base, index } => frame.read(base)?.extract(*index)?,
            InstKind::Index { base, index } => {
                let i = frame.read(index)?.as_int()?;
                frame.read(base)?.index(i)?
            }
            InstKind::Tag(v) => Value::Int(i64::from(frame.read(v)?.tag()?)),
            InstKind::Intrinsic { which, ty, args } => ops::intrinsic(*which, *ty, &frame.read_all(args)?, session)?,
            InstKind::Sample { dist, params } => session.sample(dist, &frame.read_all(params)?)?,
            InstKind::Observe { dist, params, value } => {
                session.observe(dist, &frame.read_all(params)?, &frame.read(value)?)?;
                Value::Unit
            }
        })
    }
}

struct Frame {
    regs: Vec<Option<Value>>,
    locals: Vec<Value>,
}

impl Frame {
    fn read(&self, op: &Operand) -> Result<Value, Fault> {
        match op {
            Operand::Const(v) => Ok(v.clone()),
            Operand::Reg(r) => self
                .regs
                .get(r.index())
                .and_then(Option::as_ref)
                .cloned()
                .ok_or_else(|| Fault::Shape(format!("register {r} read before definition"))),
        }
    }

    fn read_all(&self, ops: &[Operand]) -> Result<Vec<Value>, Fault> {
        ops.iter().map(|o| self.read(o)).collect()
    }
}

/// Run `entry` in a fresh session seeded with `seed`.
pub fn run_entry(
    program: &CirProgram,
    entry: &str,
    args: Vec<Value>,
    registry: Arc<Registry>,
    seed: u64,
    limits: Limits,
) -> Result<Outcome, Fault> {
    let mut session = Session::new(registry, seed);
    let mut interp = Interpreter::new(program).with_limits(limits);
    let result = interp.call(entry, args, &mut session)?;
    tracing::debug!(entry, steps = interp.steps(), "interpreted entry function");
    Ok(Outcome {
        result,
        log_weight: session.log_weight(),
        output: session.take_output(),
        steps: interp.steps(),
    })
}
