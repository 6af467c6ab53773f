// cir.rs — Core Intermediate Representation
//
// A function is a list of basic blocks over virtual registers and local
// slots. Registers are single-definition temporaries; source variables live
// in locals and are accessed with explicit `load`/`store`. Blocks end in
// exactly one terminator. Operations carry the operand type so that
// evaluation can defer to `sirs_runtime::ops`.
//
// Preconditions: built by lowering from a type-checked program.
// Postconditions: `verify` returns a `CirCert` whose obligations describe
//   the structural soundness of every function.
// Failure modes: none (data plus pure checks).
// Side effects: none.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use sirs_runtime::ops::{BinOp, Intrinsic, OpTy, UnOp};
use sirs_runtime::Value;

use crate::cfg::Cfg;
use crate::id::{BlockId, LocalId, Reg};
use crate::pass::StageCert;
use crate::types::Type;

// ── Operands and instructions ───────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Reg(Reg),
    Const(Value),
}

impl Operand {
    pub fn as_const(&self) -> Option<&Value> {
        match self {
            Operand::Const(v) => Some(v),
            Operand::Reg(_) => None,
        }
    }

    pub fn as_reg(&self) -> Option<Reg> {
        match self {
            Operand::Reg(r) => Some(*r),
            Operand::Const(_) => None,
        }
    }
}

impl From<Reg> for Operand {
    fn from(r: Reg) -> Self {
        Operand::Reg(r)
    }
}

/// Shape of an aggregate construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggKind {
    Array,
    Tuple,
    Record,
    Variant(u32),
    /// Operands alternate key, value.
    Map,
    Set,
}

impl AggKind {
    /// The value an aggregate of this shape evaluates to.
    pub fn build(self, elems: Vec<Value>) -> Value {
        match self {
            AggKind::Array => Value::Array(elems),
            AggKind::Tuple => Value::Tuple(elems),
            AggKind::Record => Value::Record(elems),
            AggKind::Variant(tag) => Value::Variant { tag, payload: elems },
            AggKind::Map => {
                let mut it = elems.into_iter();
                let mut map = BTreeMap::new();
                while let (Some(k), Some(v)) = (it.next(), it.next()) {
                    map.insert(k, v);
                }
                Value::Map(map)
            }
            AggKind::Set => Value::Set(elems.into_iter().collect()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum InstKind {
    Copy(Operand),
    Binary {
        op: BinOp,
        ty: OpTy,
        lhs: Operand,
        rhs: Operand,
    },
    Unary {
        op: UnOp,
        ty: OpTy,
        operand: Operand,
    },
    Cast {
        from: OpTy,
        to: OpTy,
        value: Operand,
    },
    Load(LocalId),
    Store {
        local: LocalId,
        value: Operand,
    },
    Call {
        func: String,
        args: Vec<Operand>,
    },
    /// Call slot `slot` of `interface` on an interface value.
    CallDyn {
        interface: String,
        slot: usize,
        receiver: Operand,
        args: Vec<Operand>,
    },
    /// Wrap a value as an interface value of concrete type `concrete`.
    MakeDyn {
        concrete: u32,
        value: Operand,
    },
    Aggregate {
        kind: AggKind,
        elems: Vec<Operand>,
    },
    /// Tuple or record component, or variant payload slot.
    Extract {
        base: Operand,
        index: usize,
    },
    /// Bounds-checked array element.
    Index {
        base: Operand,
        index: Operand,
    },
    /// Variant tag.
    Tag(Operand),
    Intrinsic {
        which: Intrinsic,
        ty: OpTy,
        args: Vec<Operand>,
    },
    Sample {
        dist: String,
        params: Vec<Operand>,
    },
    Observe {
        dist: String,
        params: Vec<Operand>,
        value: Operand,
    },
}

impl InstKind {
    pub fn operands(&self) -> Vec<&Operand> {
        match self {
            InstKind::Copy(a)
            | InstKind::Unary { operand: a, .. }
            | InstKind::Cast { value: a, .. }
            | InstKind::Store { value: a, .. }
            | InstKind::MakeDyn { value: a, .. }
            | InstKind::Extract { base: a, .. }
            | InstKind::Tag(a) => vec![a],
            InstKind::Binary { lhs, rhs, .. } => vec![lhs, rhs],
            InstKind::Index { base, index } => vec![base, index],
            InstKind::Load(_) => Vec::new(),
            InstKind::Call { args, .. }
            | InstKind::Aggregate { elems: args, .. }
            | InstKind::Intrinsic { args, .. }
            | InstKind::Sample { params: args, .. } => args.iter().collect(),
            InstKind::CallDyn { receiver, args, .. } => std::iter::once(receiver).chain(args).collect(),
            InstKind::Observe { params, value, .. } => params.iter().chain(std::iter::once(value)).collect(),
        }
    }

    pub fn operands_mut(&mut self) -> Vec<&mut Operand> {
        match self {
            InstKind::Copy(a)
            | InstKind::Unary { operand: a, .. }
            | InstKind::Cast { value: a, .. }
            | InstKind::Store { value: a, .. }
            | InstKind::MakeDyn { value: a, .. }
            | InstKind::Extract { base: a, .. }
            | InstKind::Tag(a) => vec![a],
            InstKind::Binary { lhs, rhs, .. } => vec![lhs, rhs],
            InstKind::Index { base, index } => vec![base, index],
            InstKind::Load(_) => Vec::new(),
            InstKind::Call { args, .. }
            | InstKind::Aggregate { elems: args, .. }
            | InstKind::Intrinsic { args, .. }
            | InstKind::Sample { params: args, .. } => args.iter_mut().collect(),
            InstKind::CallDyn { receiver, args, .. } => std::iter::once(receiver).chain(args.iter_mut()).collect(),
            InstKind::Observe { params, value, .. } => params.iter_mut().chain(std::iter::once(value)).collect(),
        }
    }

    /// True if removing an unused instance of this instruction could change
    /// observable behavior: session effects, calls, local writes, or a
    /// possible fault.
    pub fn has_effect(&self) -> bool {
        match self {
            InstKind::Store { .. }
            | InstKind::Call { .. }
            | InstKind::CallDyn { .. }
            | InstKind::Sample { .. }
            | InstKind::Observe { .. }
            | InstKind::Index { .. } => true,
            InstKind::Binary { op, ty, .. } => op.may_fault(*ty),
            InstKind::Intrinsic { which, .. } => !which.is_pure(),
            _ => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Inst {
    pub dst: Option<Reg>,
    pub kind: InstKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Terminator {
    Jump(BlockId),
    Branch {
        cond: Operand,
        then_bb: BlockId,
        else_bb: BlockId,
    },
    Return(Operand),
    /// Control fell off the end of a non-unit function.
    Unreachable,
}

impl Terminator {
    pub fn successors(&self) -> Vec<BlockId> {
        match self {
            Terminator::Jump(b) => vec![*b],
            Terminator::Branch { then_bb, else_bb, .. } => vec![*then_bb, *else_bb],
            Terminator::Return(_) | Terminator::Unreachable => Vec::new(),
        }
    }

    pub fn operands(&self) -> Vec<&Operand> {
        match self {
            Terminator::Branch { cond, .. } => vec![cond],
            Terminator::Return(v) => vec![v],
            _ => Vec::new(),
        }
    }

    pub fn operands_mut(&mut self) -> Vec<&mut Operand> {
        match self {
            Terminator::Branch { cond, .. } => vec![cond],
            Terminator::Return(v) => vec![v],
            _ => Vec::new(),
        }
    }

    pub fn retarget(&mut self, f: impl Fn(BlockId) -> BlockId) {
        match self {
            Terminator::Jump(b) => *b = f(*b),
            Terminator::Branch { then_bb, else_bb, .. } => {
                *then_bb = f(*then_bb);
                *else_bb = f(*else_bb);
            }
            _ => {}
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub insts: Vec<Inst>,
    pub term: Terminator,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LocalDecl {
    pub name: String,
    pub ty: Type,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CirFunction {
    pub name: String,
    /// Parameters occupy locals `0..params`.
    pub params: usize,
    pub locals: Vec<LocalDecl>,
    pub returns: Type,
    /// Entry is block 0.
    pub blocks: Vec<Block>,
    /// One past the highest register number in use.
    pub next_reg: u32,
}

impl CirFunction {
    pub fn fresh_reg(&mut self) -> Reg {
        let r = Reg(self.next_reg);
        self.next_reg += 1;
        r
    }

    pub fn add_local(&mut self, name: impl Into<String>, ty: Type) -> LocalId {
        self.locals.push(LocalDecl { name: name.into(), ty });
        LocalId(self.locals.len() as u32 - 1)
    }

    pub fn block(&self, b: BlockId) -> &Block {
        &self.blocks[b.index()]
    }

    pub fn inst_count(&self) -> usize {
        self.blocks.iter().map(|b| b.insts.len()).sum()
    }

    /// Block and position of every register definition.
    pub fn definitions(&self) -> HashMap<Reg, (BlockId, usize)> {
        let mut defs = HashMap::new();
        for (bi, b) in self.blocks.iter().enumerate() {
            for (ii, inst) in b.insts.iter().enumerate() {
                if let Some(r) = inst.dst {
                    defs.insert(r, (BlockId(bi as u32), ii));
                }
            }
        }
        defs
    }

    /// Number of uses of each register.
    pub fn use_counts(&self) -> HashMap<Reg, usize> {
        let mut uses = HashMap::new();
        for b in &self.blocks {
            let ops = b.insts.iter().flat_map(|i| i.kind.operands()).chain(b.term.operands());
            for op in ops {
                if let Operand::Reg(r) = op {
                    *uses.entry(*r).or_insert(0) += 1;
                }
            }
        }
        uses
    }

    /// Replace every use of `from` with `to`.
    pub fn replace_uses(&mut self, map: &HashMap<Reg, Operand>) {
        if map.is_empty() {
            return;
        }
        let subst = |op: &mut Operand| {
            if let Operand::Reg(r) = op {
                if let Some(to) = map.get(r) {
                    *op = to.clone();
                }
            }
        };
        for b in &mut self.blocks {
            for inst in &mut b.insts {
                inst.kind.operands_mut().into_iter().for_each(subst);
            }
            b.term.operands_mut().into_iter().for_each(subst);
        }
    }
}

// ── Program ─────────────────────────────────────────────────────────────────

/// Interface dispatch: concrete type ids and per-interface vtables.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DispatchTable {
    /// Concrete type of each id used by `MakeDyn`.
    pub concrete: Vec<Type>,
    /// Interface -> concrete id -> implementing function per slot.
    pub vtables: BTreeMap<String, BTreeMap<u32, Vec<String>>>,
}

impl DispatchTable {
    pub fn concrete_id(&self, ty: &Type) -> Option<u32> {
        self.concrete.iter().position(|t| t == ty).map(|i| i as u32)
    }

    pub fn lookup(&self, interface: &str, concrete: u32, slot: usize) -> Option<&str> {
        self.vtables
            .get(interface)?
            .get(&concrete)?
            .get(slot)
            .map(String::as_str)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CirProgram {
    pub functions: Vec<CirFunction>,
    pub dispatch: DispatchTable,
}

impl CirProgram {
    pub fn function(&self, name: &str) -> Option<&CirFunction> {
        self.functions.iter().find(|f| f.name == name)
    }

    pub fn function_index(&self) -> HashMap<&str, usize> {
        self.functions
            .iter()
            .enumerate()
            .map(|(i, f)| (f.name.as_str(), i))
            .collect()
    }
}

// ── Verification ────────────────────────────────────────────────────────────

/// Structural obligations of a CIR program. Each field records whether the
/// obligation holds for every function.
#[derive(Debug, Clone, PartialEq)]
pub struct CirCert {
    /// C1: every branch target names an existing block.
    pub c1_targets_valid: bool,
    /// C2: every register has at most one definition.
    pub c2_single_definition: bool,
    /// C3: every register use is dominated by its definition.
    pub c3_defs_dominate_uses: bool,
    /// C4: every local slot referenced exists; parameter count fits.
    pub c4_locals_valid: bool,
    /// C5: every direct call and vtable entry names a function.
    pub c5_calls_resolved: bool,
    /// C6: every block is reachable from the entry.
    pub c6_all_reachable: bool,
}

impl CirCert {
    /// Obligations that must hold after every optimizer pass. Reachability
    /// may be broken transiently until DCE runs.
    pub fn structurally_sound(&self) -> bool {
        self.c1_targets_valid
            && self.c2_single_definition
            && self.c3_defs_dominate_uses
            && self.c4_locals_valid
            && self.c5_calls_resolved
    }
}

impl StageCert for CirCert {
    fn all_pass(&self) -> bool {
        self.structurally_sound() && self.c6_all_reachable
    }

    fn obligations(&self) -> Vec<(&'static str, bool)> {
        vec![
            ("C1_targets_valid", self.c1_targets_valid),
            ("C2_single_definition", self.c2_single_definition),
            ("C3_defs_dominate_uses", self.c3_defs_dominate_uses),
            ("C4_locals_valid", self.c4_locals_valid),
            ("C5_calls_resolved", self.c5_calls_resolved),
            ("C6_all_reachable", self.c6_all_reachable),
        ]
    }
}

pub fn verify(program: &CirProgram) -> CirCert {
    let names: std::collections::HashSet<&str> = program.functions.iter().map(|f| f.name.as_str()).collect();
    let mut cert = CirCert {
        c1_targets_valid: true,
        c2_single_definition: true,
        c3_defs_dominate_uses: true,
        c4_locals_valid: true,
        c5_calls_resolved: program
            .dispatch
            .vtables
            .values()
            .flat_map(|t| t.values().flatten())
            .all(|f| names.contains(f.as_str())),
        c6_all_reachable: true,
    };
    for f in &program.functions {
        verify_function(f, &names, &mut cert);
    }
    cert
}

fn verify_function(f: &CirFunction, names: &std::collections::HashSet<&str>, cert: &mut CirCert) {
    let n = f.blocks.len();
    if n == 0 {
        cert.c1_targets_valid = false;
        return;
    }
    if f.blocks.iter().any(|b| b.term.successors().iter().any(|s| s.index() >= n)) {
        cert.c1_targets_valid = false;
        return;
    }
    if f.params > f.locals.len() {
        cert.c4_locals_valid = false;
    }

    let mut defs: HashMap<Reg, (BlockId, usize)> = HashMap::new();
    for (bi, b) in f.blocks.iter().enumerate() {
        for (ii, inst) in b.insts.iter().enumerate() {
            if let Some(r) = inst.dst {
                if r.0 >= f.next_reg || defs.insert(r, (BlockId(bi as u32), ii)).is_some() {
                    cert.c2_single_definition = false;
                }
            }
            match &inst.kind {
                InstKind::Load(l) | InstKind::Store { local: l, .. } if l.index() >= f.locals.len() => {
                    cert.c4_locals_valid = false;
                }
                InstKind::Call { func, .. } if !names.contains(func.as_str()) => {
                    cert.c5_calls_resolved = false;
                }
                _ => {}
            }
        }
    }

    let cfg = Cfg::build(f);
    if cfg.reachable.iter().any(|r| !r) {
        cert.c6_all_reachable = false;
    }
    for (bi, b) in f.blocks.iter().enumerate() {
        let here = BlockId(bi as u32);
        if !cfg.reachable[bi] {
            continue;
        }
        let uses = b
            .insts
            .iter()
            .enumerate()
            .flat_map(|(ii, inst)| inst.kind.operands().into_iter().map(move |o| (ii, o)))
            .chain(b.term.operands().into_iter().map(|o| (b.insts.len(), o)));
        for (pos, op) in uses {
            let Operand::Reg(r) = op else { continue };
            let ok = match defs.get(r) {
                Some(&(db, di)) if db == here => di < pos,
                Some(&(db, _)) => cfg.dominates(db, here),
                None => false,
            };
            if !ok {
                cert.c3_defs_dominate_uses = false;
            }
        }
    }
}

// ── Display ─────────────────────────────────────────────────────────────────

fn write_const(f: &mut fmt::Formatter<'_>, v: &Value) -> fmt::Result {
    match v {
        Value::Str(s) => write!(f, "{s:?}"),
        other => write!(f, "{other}"),
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Reg(r) => write!(f, "{r}"),
            Operand::Const(v) => write_const(f, v),
        }
    }
}

fn write_list(f: &mut fmt::Formatter<'_>, ops: &[Operand]) -> fmt::Result {
    for (i, o) in ops.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{o}")?;
    }
    Ok(())
}

fn binop_name(op: BinOp) -> &'static str {
    match op {
        BinOp::Add => "add",
        BinOp::Sub => "sub",
        BinOp::Mul => "mul",
        BinOp::Div => "div",
        BinOp::Rem => "rem",
        BinOp::Eq => "eq",
        BinOp::Ne => "ne",
        BinOp::Lt => "lt",
        BinOp::Le => "le",
        BinOp::Gt => "gt",
        BinOp::Ge => "ge",
        BinOp::BitAnd => "and",
        BinOp::BitOr => "or",
        BinOp::BitXor => "xor",
        BinOp::Shl => "shl",
        BinOp::Shr => "shr",
    }
}

impl fmt::Display for InstKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InstKind::Copy(a) => write!(f, "copy {a}"),
            InstKind::Binary { op, ty, lhs, rhs } => write!(f, "{}.{ty} {lhs}, {rhs}", binop_name(*op)),
            InstKind::Unary { op, ty, operand } => {
                let name = match op {
                    UnOp::Neg => "neg",
                    UnOp::Not => "not",
                };
                write!(f, "{name}.{ty} {operand}")
            }
            InstKind::Cast { from, to, value } => write!(f, "cast.{from}.{to} {value}"),
            InstKind::Load(l) => write!(f, "load {l}"),
            InstKind::Store { local, value } => write!(f, "store {local}, {value}"),
            InstKind::Call { func, args } => {
                write!(f, "call {func}(")?;
                write_list(f, args)?;
                f.write_str(")")
            }
            InstKind::CallDyn {
                interface,
                slot,
                receiver,
                args,
            } => {
                write!(f, "call_dyn {interface}[{slot}] {receiver}(")?;
                write_list(f, args)?;
                f.write_str(")")
            }
            InstKind::MakeDyn { concrete, value } => write!(f, "make_dyn #{concrete} {value}"),
            InstKind::Aggregate { kind, elems } => {
                let open = match kind {
                    AggKind::Array => "array [".to_string(),
                    AggKind::Tuple => "tuple (".to_string(),
                    AggKind::Record => "record {".to_string(),
                    AggKind::Variant(t) => format!("variant #{t} ("),
                    AggKind::Map => "map {".to_string(),
                    AggKind::Set => "set {".to_string(),
                };
                let close = match kind {
                    AggKind::Array => "]",
                    AggKind::Tuple | AggKind::Variant(_) => ")",
                    _ => "}",
                };
                f.write_str(&open)?;
                write_list(f, elems)?;
                f.write_str(close)
            }
            InstKind::Extract { base, index } => write!(f, "extract {base}.{index}"),
            InstKind::Index { base, index } => write!(f, "index {base}[{index}]"),
            InstKind::Tag(a) => write!(f, "tag {a}"),
            InstKind::Intrinsic { which, ty, args } => {
                write!(f, "{}.{ty}(", which.name())?;
                write_list(f, args)?;
                f.write_str(")")
            }
            InstKind::Sample { dist, params } => {
                write!(f, "sample {dist}(")?;
                write_list(f, params)?;
                f.write_str(")")
            }
            InstKind::Observe { dist, params, value } => {
                write!(f, "observe {dist}(")?;
                write_list(f, params)?;
                write!(f, ") = {value}")
            }
        }
    }
}

impl fmt::Display for Inst {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.dst {
            Some(r) => write!(f, "{r} = {}", self.kind),
            None => write!(f, "{}", self.kind),
        }
    }
}

impl fmt::Display for Terminator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Terminator::Jump(b) => write!(f, "jump {b}"),
            Terminator::Branch { cond, then_bb, else_bb } => write!(f, "br {cond}, {then_bb}, {else_bb}"),
            Terminator::Return(v) => write!(f, "ret {v}"),
            Terminator::Unreachable => f.write_str("unreachable"),
        }
    }
}

impl fmt::Display for CirFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fn {}(", self.name)?;
        for (i, l) in self.locals.iter().take(self.params).enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}: {}", l.name, l.ty)?;
        }
        writeln!(f, ") -> {} {{", self.returns)?;
        for (i, l) in self.locals.iter().enumerate() {
            writeln!(f, "  local {} {}: {}", LocalId(i as u32), l.name, l.ty)?;
        }
        for (i, b) in self.blocks.iter().enumerate() {
            writeln!(f, "{}:", BlockId(i as u32))?;
            for inst in &b.insts {
                writeln!(f, "  {inst}")?;
            }
            writeln!(f, "  {}", b.term)?;
        }
        f.write_str("}")
    }
}

impl fmt::Display for CirProgram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (id, ty) in self.dispatch.concrete.iter().enumerate() {
            writeln!(f, "type #{id} = {ty}")?;
        }
        for (iface, table) in &self.dispatch.vtables {
            for (id, slots) in table {
                writeln!(f, "vtable {iface} for #{id} = [{}]", slots.join(", "))?;
            }
        }
        for (i, func) in self.functions.iter().enumerate() {
            if i > 0 || !self.dispatch.concrete.is_empty() {
                writeln!(f)?;
            }
            writeln!(f, "{func}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::I64;
    use sirs_runtime::ops::IntTy;

    fn int(v: i64) -> Operand {
        Operand::Const(Value::Int(v))
    }

    /// `fn add1(x) { return x + 1 }`
    fn add1() -> CirFunction {
        CirFunction {
            name: "add1".into(),
            params: 1,
            locals: vec![LocalDecl {
                name: "x".into(),
                ty: I64,
            }],
            returns: I64,
            blocks: vec![Block {
                insts: vec![
                    Inst {
                        dst: Some(Reg(0)),
                        kind: InstKind::Load(LocalId(0)),
                    },
                    Inst {
                        dst: Some(Reg(1)),
                        kind: InstKind::Binary {
                            op: BinOp::Add,
                            ty: OpTy::Int(IntTy::I64),
                            lhs: Operand::Reg(Reg(0)),
                            rhs: int(1),
                        },
                    },
                ],
                term: Terminator::Return(Operand::Reg(Reg(1))),
            }],
            next_reg: 2,
        }
    }

    fn program(functions: Vec<CirFunction>) -> CirProgram {
        CirProgram {
            functions,
            dispatch: DispatchTable::default(),
        }
    }

    #[test]
    fn well_formed_function_passes() {
        let cert = verify(&program(vec![add1()]));
        assert!(cert.all_pass(), "{:?}", cert.obligations());
    }

    #[test]
    fn use_before_definition_fails() {
        let mut f = add1();
        f.blocks[0].insts.swap(0, 1);
        let cert = verify(&program(vec![f]));
        assert!(!cert.c3_defs_dominate_uses);
        assert!(!cert.structurally_sound());
    }

    #[test]
    fn duplicate_definition_fails() {
        let mut f = add1();
        f.blocks[0].insts[1].dst = Some(Reg(0));
        assert!(!verify(&program(vec![f])).c2_single_definition);
    }

    #[test]
    fn unresolved_call_and_bad_target_fail() {
        let mut f = add1();
        f.blocks[0].insts.push(Inst {
            dst: Some(Reg(2)),
            kind: InstKind::Call {
                func: "missing".into(),
                args: vec![],
            },
        });
        f.next_reg = 3;
        let cert = verify(&program(vec![f.clone()]));
        assert!(!cert.c5_calls_resolved);

        f.blocks[0].term = Terminator::Jump(BlockId(7));
        assert!(!verify(&program(vec![f])).c1_targets_valid);
    }

    #[test]
    fn unreachable_block_is_sound_but_not_clean() {
        let mut f = add1();
        f.blocks.push(Block {
            insts: vec![],
            term: Terminator::Unreachable,
        });
        let cert = verify(&program(vec![f]));
        assert!(cert.structurally_sound());
        assert!(!cert.all_pass());
    }

    #[test]
    fn effects_and_display() {
        let div = InstKind::Binary {
            op: BinOp::Div,
            ty: OpTy::Int(IntTy::I32),
            lhs: int(1),
            rhs: int(2),
        };
        assert!(div.has_effect());
        let fdiv = InstKind::Binary {
            op: BinOp::Div,
            ty: OpTy::Float(sirs_runtime::ops::FloatTy::F64),
            lhs: Operand::Const(Value::Float(1.0)),
            rhs: Operand::Const(Value::Float(2.0)),
        };
        assert!(!fdiv.has_effect());
        assert_eq!(div.to_string(), "div.i32 1, 2");
        let text = add1().to_string();
        assert!(text.contains("%1 = add.i64 %0, 1"), "{text}");
        assert!(text.contains("ret %1"));
    }
}
