// lower — Typed AST to CIR lowering
//
// Converts each type-checked function into a control-flow graph. Generic
// functions are monomorphized on demand: lowering starts from every
// non-generic function and enqueues one instance per distinct list of type
// arguments it meets at a call site. Interface dispatch tables are built
// from the impl declarations.
//
// Preconditions: the program type checked without errors.
// Postconditions: every block is reachable from its function's entry; the
//   returned `CirCert` covers the whole program.
// Failure modes: instantiation limit (E0302) or a missing impl for a bound
//   method (E0301); both produce error diagnostics.
// Side effects: none.

mod expr;
mod stmt;

use std::collections::{HashMap, HashSet, VecDeque};

use crate::ast::{Function, Program, Span};
use crate::cir::{self, Block, CirCert, CirFunction, CirProgram, DispatchTable, Inst, InstKind, Operand, Terminator};
use crate::diag::{Diagnostic, Phase};
use crate::id::{BlockId, LocalId, Reg};
use crate::scope::Scopes;
use crate::typeck::TypedProgram;
use crate::types::Type;

/// Upper bound on generic instances per program.
pub const MAX_INSTANCES: usize = 1024;

pub struct LowerResult {
    pub cir: CirProgram,
    pub cert: CirCert,
    /// Source location of each lowered function, by CIR name.
    pub spans: HashMap<String, Span>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Lower a type-checked program and verify the result.
pub fn lower(program: &Program, typed: &TypedProgram) -> LowerResult {
    let mut l = Lowerer {
        program,
        typed,
        queue: VecDeque::new(),
        scheduled: HashSet::new(),
        dispatch: build_dispatch(typed),
        spans: HashMap::new(),
        diagnostics: Vec::new(),
    };
    for f in &program.functions {
        let is_canonical = typed
            .decls
            .functions
            .get(&f.name)
            .is_some_and(|sig| sig.span == f.span);
        if f.type_params.is_empty() && is_canonical {
            l.schedule(f, HashMap::new(), f.name.clone());
        }
    }
    let mut functions = Vec::new();
    while let Some(inst) = l.queue.pop_front() {
        functions.push(FnLower::run(&mut l, inst));
    }
    let cir = CirProgram {
        functions,
        dispatch: l.dispatch,
    };
    let cert = cir::verify(&cir);
    tracing::debug!(functions = cir.functions.len(), "lowered program");
    LowerResult {
        cir,
        cert,
        spans: l.spans,
        diagnostics: l.diagnostics,
    }
}

/// Mangled name of a generic instance, e.g. `max<i32>`.
pub fn instance_name(function: &str, type_args: &[Type]) -> String {
    let args: Vec<String> = type_args.iter().map(|t| t.to_string()).collect();
    format!("{function}<{}>", args.join(", "))
}

fn build_dispatch(typed: &TypedProgram) -> DispatchTable {
    let mut table = DispatchTable::default();
    for imp in &typed.decls.impls {
        let id = match table.concrete_id(&imp.for_type) {
            Some(id) => id,
            None => {
                table.concrete.push(imp.for_type.clone());
                table.concrete.len() as u32 - 1
            }
        };
        let Some(iface) = typed.decls.interfaces.get(&imp.interface) else {
            continue;
        };
        let slots: Vec<String> = iface
            .methods
            .iter()
            .filter_map(|m| imp.methods.get(&m.name).cloned())
            .collect();
        table.vtables.entry(imp.interface.clone()).or_default().insert(id, slots);
    }
    table
}

// ── Program-level state ─────────────────────────────────────────────────────

struct Instance<'a> {
    function: &'a Function,
    subst: HashMap<String, Type>,
    name: String,
}

struct Lowerer<'a> {
    program: &'a Program,
    typed: &'a TypedProgram,
    queue: VecDeque<Instance<'a>>,
    scheduled: HashSet<String>,
    dispatch: DispatchTable,
    spans: HashMap<String, Span>,
    diagnostics: Vec<Diagnostic>,
}

impl<'a> Lowerer<'a> {
    fn schedule(&mut self, function: &'a Function, subst: HashMap<String, Type>, name: String) {
        if self.scheduled.insert(name.clone()) {
            self.spans.insert(name.clone(), function.span.clone());
            self.queue.push_back(Instance { function, subst, name });
        }
    }

    fn error(&mut self, code: crate::diag::DiagCode, span: &Span, msg: impl Into<String>) {
        self.diagnostics
            .push(Diagnostic::error(Phase::Lowering, span.clone(), msg).with_code(code));
    }
}

// ── Function-level state ────────────────────────────────────────────────────

struct LoopTargets {
    /// Target of `continue`; allocated on first use for `for` loops.
    continue_bb: Option<BlockId>,
    /// Target of `break` and the loop's normal exit; allocated on demand.
    exit_bb: Option<BlockId>,
}

struct FnLower<'l, 'a> {
    l: &'l mut Lowerer<'a>,
    subst: HashMap<String, Type>,
    func: CirFunction,
    /// Block receiving instructions; `None` after a terminator.
    cur: Option<BlockId>,
    scopes: Scopes<LocalId>,
    loops: Vec<LoopTargets>,
}

impl<'l, 'a> FnLower<'l, 'a> {
    fn run(l: &'l mut Lowerer<'a>, inst: Instance<'a>) -> CirFunction {
        let f = inst.function;
        let sig = l.typed.decls.functions.get(&f.name).cloned();
        let (params, returns) = match &sig {
            Some(sig) => (
                sig.params.iter().map(|t| t.substitute(&inst.subst)).collect::<Vec<_>>(),
                sig.returns.substitute(&inst.subst),
            ),
            None => (Vec::new(), Type::Unit),
        };
        let mut this = FnLower {
            l,
            subst: inst.subst,
            func: CirFunction {
                name: inst.name,
                params: params.len(),
                locals: Vec::new(),
                returns: returns.clone(),
                blocks: Vec::new(),
                next_reg: 0,
            },
            cur: None,
            scopes: Scopes::new(),
            loops: Vec::new(),
        };
        for (p, ty) in f.params.iter().zip(params) {
            let id = this.func.add_local(p.name.clone(), ty);
            this.scopes.define(p.name.clone(), id);
        }
        let entry = this.new_block();
        this.cur = Some(entry);
        this.block(&f.body);
        if this.cur.is_some() {
            let term = if returns == Type::Unit {
                Terminator::Return(Operand::Const(sirs_runtime::Value::Unit))
            } else {
                Terminator::Unreachable
            };
            this.terminate(term);
        }
        tracing::trace!(function = %this.func.name, blocks = this.func.blocks.len(), "lowered function");
        this.func
    }

    // ── Types ──

    /// Type of an expression in this instance.
    fn ty(&self, id: crate::id::ExprId) -> Type {
        self.l
            .typed
            .type_of(id)
            .map(|t| t.substitute(&self.subst))
            .unwrap_or(Type::Unit)
    }

    fn subst(&self, t: &Type) -> Type {
        t.substitute(&self.subst)
    }

    // ── Blocks and instructions ──

    fn new_block(&mut self) -> BlockId {
        self.func.blocks.push(Block {
            insts: Vec::new(),
            term: Terminator::Unreachable,
        });
        BlockId(self.func.blocks.len() as u32 - 1)
    }

    /// Append an instruction producing a value.
    fn emit(&mut self, kind: InstKind) -> Reg {
        let r = self.func.fresh_reg();
        if let Some(b) = self.cur {
            self.func.blocks[b.index()].insts.push(Inst { dst: Some(r), kind });
        }
        r
    }

    fn emit_op(&mut self, kind: InstKind) -> Operand {
        Operand::Reg(self.emit(kind))
    }

    /// Append an instruction with no result.
    fn emit_void(&mut self, kind: InstKind) {
        if let Some(b) = self.cur {
            self.func.blocks[b.index()].insts.push(Inst { dst: None, kind });
        }
    }

    /// End the current block. Later code is unreachable until a new block
    /// is selected.
    fn terminate(&mut self, term: Terminator) {
        if let Some(b) = self.cur.take() {
            self.func.blocks[b.index()].term = term;
        }
    }

    /// Jump from the current block, if any, to `target`.
    fn jump(&mut self, target: BlockId) {
        self.terminate(Terminator::Jump(target));
    }

    fn store(&mut self, local: LocalId, value: Operand) {
        self.emit_void(InstKind::Store { local, value });
    }
}

#[cfg(test)]
mod tests;
