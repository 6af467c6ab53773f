// codegen.rs — Rust code generation for SIRS programs
//
// Transforms optimized CIR into a single Rust source file linked against
// `sirs_runtime`. Each CIR function becomes a `fn` over runtime `Value`s
// whose body is a block-dispatch state machine: registers and locals are
// slot vectors, every block is one `match` arm, and terminators assign the
// next block. Operations call `sirs_runtime::ops`, so generated code and the
// reference interpreter agree on every result and fault. Interface calls go
// through one generated dispatcher per interface, keyed by concrete type id.
//
// Preconditions: the program passes `cir::verify` (all obligations).
// Postconditions: returns `CodegenResult` with the generated source; the
//   output depends only on the program, options and provenance.
// Failure modes: a failing certificate or a missing or unsuitable entry
//   function produces E0501 and no source.
// Side effects: none.

use std::collections::HashMap;
use std::fmt::Write as _;

use sirs_runtime::ops::OpTy;
use sirs_runtime::Value;

use crate::ast::Span;
use crate::cir::{self, AggKind, CirFunction, CirProgram, InstKind, Operand, Terminator};
use crate::diag::{codes, Diagnostic, Phase};
use crate::pass::StageCert;
use crate::pipeline::Provenance;

// ── Public types ────────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct CodegenResult {
    pub generated: GeneratedCode,
    pub diagnostics: Vec<Diagnostic>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedCode {
    pub rust_source: String,
}

#[derive(Debug, Clone)]
pub struct CodegenOptions {
    /// Function called by the generated `main`. `None` emits a library
    /// module without `main`.
    pub entry: Option<String>,
    /// Default session seed; `SIRS_SEED` overrides it at run time.
    pub seed: u64,
    pub provenance: Option<Provenance>,
}

impl Default for CodegenOptions {
    fn default() -> Self {
        CodegenOptions {
            entry: Some("main".to_string()),
            seed: 0,
            provenance: None,
        }
    }
}

// ── Public entry point ──────────────────────────────────────────────────────

pub fn codegen(program: &CirProgram, options: &CodegenOptions) -> CodegenResult {
    let mut ctx = CodegenCtx::new(program, options);
    if ctx.check() {
        ctx.emit_all();
    }
    ctx.build_result()
}

// ── Internal context ────────────────────────────────────────────────────────

struct CodegenCtx<'a> {
    program: &'a CirProgram,
    options: &'a CodegenOptions,
    /// CIR function name to generated identifier index.
    fn_ids: HashMap<&'a str, usize>,
    out: String,
    diagnostics: Vec<Diagnostic>,
}

impl<'a> CodegenCtx<'a> {
    fn new(program: &'a CirProgram, options: &'a CodegenOptions) -> Self {
        CodegenCtx {
            program,
            options,
            fn_ids: program.function_index(),
            out: String::with_capacity(8192),
            diagnostics: Vec::new(),
        }
    }

    fn error(&mut self, message: String) {
        self.diagnostics
            .push(Diagnostic::error(Phase::Codegen, Span::root(), message).with_code(codes::E0501));
    }

    /// Certificate and entry checks. Returns false if nothing may be emitted.
    fn check(&mut self) -> bool {
        let cert = cir::verify(self.program);
        if !cert.all_pass() {
            let failed: Vec<&str> = cert
                .obligations()
                .into_iter()
                .filter(|(_, ok)| !ok)
                .map(|(name, _)| name)
                .collect();
            self.error(format!("CIR verification failed before code generation: {}", failed.join(", ")));
            return false;
        }
        let (program, options) = (self.program, self.options);
        if let Some(entry) = &options.entry {
            match program.function(entry) {
                None => {
                    self.error(format!("entry function '{entry}' does not exist"));
                    return false;
                }
                Some(f) if f.params > 0 => {
                    self.error(format!("entry function '{entry}' must take no parameters"));
                    return false;
                }
                Some(_) => {}
            }
        }
        true
    }

    fn build_result(self) -> CodegenResult {
        let rust_source = if self.diagnostics.is_empty() { self.out } else { String::new() };
        CodegenResult {
            generated: GeneratedCode { rust_source },
            diagnostics: self.diagnostics,
        }
    }

    // ── Top-level emit ──────────────────────────────────────────────────

    fn emit_all(&mut self) {
        let (program, options) = (self.program, self.options);
        self.emit_preamble();
        self.emit_type_table();
        for (i, f) in program.functions.iter().enumerate() {
            self.emit_function(i, f);
        }
        self.emit_dispatchers();
        if let Some(entry) = &options.entry {
            self.emit_main(entry);
        }
    }

    // ── Phase 1: Preamble ───────────────────────────────────────────────

    fn emit_preamble(&mut self) {
        self.out.push_str("// Generated by sirsc (SIRS compiler)\n");
        if let Some(p) = &self.options.provenance {
            let _ = writeln!(self.out, "// compiler-version: {}", p.compiler_version);
            let _ = writeln!(self.out, "// source-sha256: {}", p.source_hash_hex());
            let _ = writeln!(self.out, "// registry-sha256: {}", p.registry_fingerprint_hex());
        }
        self.out.push_str("#![allow(unused, clippy::all)]\n\n");
        self.out
            .push_str("use sirs_runtime::ops::{self, BinOp, FloatTy, IntTy, Intrinsic, OpTy, UnOp};\n");
        self.out.push_str("use sirs_runtime::{Fault, Registry, Session, Value};\n\n");
    }

    fn emit_type_table(&mut self) {
        if self.program.dispatch.concrete.is_empty() {
            return;
        }
        let _ = writeln!(
            self.out,
            "const CONCRETE_TYPES: [&str; {}] = [",
            self.program.dispatch.concrete.len()
        );
        for t in &self.program.dispatch.concrete {
            let _ = writeln!(self.out, "    {:?},", t.to_string());
        }
        self.out.push_str("];\n\n");
    }

    // ── Phase 2: Functions ──────────────────────────────────────────────

    fn emit_function(&mut self, index: usize, f: &CirFunction) {
        let _ = writeln!(self.out, "// {}", f.name);
        let _ = writeln!(
            self.out,
            "fn f{index}(s: &mut Session, args: Vec<Value>) -> Result<Value, Fault> {{"
        );
        let _ = writeln!(self.out, "    let mut l: Vec<Value> = vec![Value::Unit; {}];", f.locals.len());
        self.out
            .push_str("    for (slot, arg) in l.iter_mut().zip(args) {\n        *slot = arg;\n    }\n");
        let _ = writeln!(self.out, "    let mut r: Vec<Value> = vec![Value::Unit; {}];", f.next_reg);
        self.out.push_str("    let mut bb: usize = 0;\n");
        self.out.push_str("    loop {\n        match bb {\n");
        for (bi, block) in f.blocks.iter().enumerate() {
            let _ = writeln!(self.out, "            {bi} => {{");
            for inst in &block.insts {
                let stmt = self.inst_stmt(inst.dst.map(|d| d.index()), &inst.kind);
                let _ = writeln!(self.out, "                {stmt}");
            }
            let term = term_stmt(&block.term);
            let _ = writeln!(self.out, "                {term}");
            self.out.push_str("            }\n");
        }
        self.out
            .push_str("            _ => return Err(Fault::Shape(format!(\"no block {bb}\"))),\n");
        self.out.push_str("        }\n    }\n}\n\n");
    }

    fn call_expr(&self, func: &str, args: &[Operand]) -> String {
        let id = self.fn_ids.get(func).copied().unwrap_or(usize::MAX);
        format!("f{id}(s, {})?", vec_expr(args))
    }

    fn inst_stmt(&self, dst: Option<usize>, kind: &InstKind) -> String {
        let rhs = match kind {
            InstKind::Copy(v) => owned(v),
            InstKind::Binary { op, ty, lhs, rhs } => format!(
                "ops::binary(BinOp::{op:?}, {}, {}, {})?",
                op_ty(*ty),
                borrowed(lhs),
                borrowed(rhs)
            ),
            InstKind::Unary { op, ty, operand } => {
                format!("ops::unary(UnOp::{op:?}, {}, {})?", op_ty(*ty), borrowed(operand))
            }
            InstKind::Cast { from, to, value } => {
                format!("ops::cast({}, {}, {})?", op_ty(*from), op_ty(*to), borrowed(value))
            }
            InstKind::Load(local) => format!("l[{}].clone()", local.index()),
            InstKind::Store { local, value } => {
                return format!("l[{}] = {};", local.index(), owned(value));
            }
            InstKind::Call { func, args } => self.call_expr(func, args),
            InstKind::CallDyn {
                interface,
                slot,
                receiver,
                args,
            } => {
                let id = self
                    .program
                    .dispatch
                    .vtables
                    .keys()
                    .position(|k| k == interface)
                    .unwrap_or(usize::MAX);
                format!("dyn{id}(s, {slot}, {}, {})?", borrowed(receiver), vec_expr(args))
            }
            InstKind::MakeDyn { concrete, value } => {
                format!("Value::Dyn {{ concrete: {concrete}, value: Box::new({}) }}", owned(value))
            }
            InstKind::Aggregate { kind, elems } => aggregate_expr(*kind, elems.iter().map(owned).collect()),
            InstKind::Extract { base, index } => format!("{}.extract({index})?", paren(base)),
            InstKind::Index { base, index } => {
                format!("{}.index({}.as_int()?)?", paren(base), paren(index))
            }
            InstKind::Tag(v) => format!("Value::Int(i64::from({}.tag()?))", paren(v)),
            InstKind::Intrinsic { which, ty, args } => format!(
                "ops::intrinsic(Intrinsic::{which:?}, {}, &{}, s)?",
                op_ty(*ty),
                vec_expr(args)
            ),
            InstKind::Sample { dist, params } => format!("s.sample({dist:?}, &{})?", vec_expr(params)),
            InstKind::Observe { dist, params, value } => {
                format!("s.observe({dist:?}, &{}, {})?", vec_expr(params), borrowed(value))
            }
        };
        match dst {
            Some(d) => format!("r[{d}] = {rhs};"),
            None => format!("{rhs};"),
        }
    }

    // ── Phase 3: Interface dispatch ─────────────────────────────────────

    fn emit_dispatchers(&mut self) {
        for (id, (interface, table)) in self.program.dispatch.vtables.iter().enumerate() {
            let _ = writeln!(self.out, "// dispatch for interface {interface}");
            let _ = writeln!(
                self.out,
                "fn dyn{id}(s: &mut Session, slot: usize, receiver: &Value, args: Vec<Value>) -> Result<Value, Fault> {{"
            );
            self.out.push_str("    let (concrete, inner) = receiver.as_dyn()?;\n");
            self.out.push_str("    let mut full = Vec::with_capacity(args.len() + 1);\n");
            self.out.push_str("    full.push(inner.clone());\n    full.extend(args);\n");
            self.out.push_str("    match (concrete, slot) {\n");
            for (concrete, slots) in table {
                for (slot, target) in slots.iter().enumerate() {
                    let fid = self.fn_ids.get(target.as_str()).copied().unwrap_or(usize::MAX);
                    let _ = writeln!(self.out, "        ({concrete}, {slot}) => f{fid}(s, full),");
                }
            }
            let _ = writeln!(
                self.out,
                "        _ => Err(Fault::MissingImpl {{\n            interface: {:?}.to_string(),\n            method: format!(\"#{{slot}}\"),\n            concrete: CONCRETE_TYPES\n                .get(concrete as usize)\n                .map_or_else(|| format!(\"#{{concrete}}\"), |t| t.to_string()),\n        }}),",
                interface
            );
            self.out.push_str("    }\n}\n\n");
        }
    }

    // ── Phase 4: main ───────────────────────────────────────────────────

    fn emit_main(&mut self, entry: &str) {
        let id = self.fn_ids.get(entry).copied().unwrap_or(usize::MAX);
        self.out.push_str("fn main() {\n");
        self.out.push_str("    let registry = std::sync::Arc::new(Registry::with_builtins());\n");
        let _ = writeln!(
            self.out,
            "    let seed = std::env::var(\"SIRS_SEED\").ok().and_then(|v| v.parse().ok()).unwrap_or({}u64);",
            self.options.seed
        );
        self.out
            .push_str("    let mut session = Session::new(registry, seed).with_echo(true);\n");
        let _ = writeln!(self.out, "    match f{id}(&mut session, Vec::new()) {{");
        self.out.push_str("        Ok(Value::Unit) => {}\n");
        self.out.push_str("        Ok(v) => println!(\"{v}\"),\n");
        self.out.push_str("        Err(fault) => {\n");
        self.out
            .push_str("            eprintln!(\"runtime error: {fault}\");\n            std::process::exit(1);\n");
        self.out.push_str("        }\n    }\n}\n");
    }
}

// ── Expression rendering ────────────────────────────────────────────────────

fn term_stmt(term: &Terminator) -> String {
    match term {
        Terminator::Jump(t) => format!("bb = {};", t.index()),
        Terminator::Branch { cond, then_bb, else_bb } => format!(
            "bb = if {}.as_bool()? {{ {} }} else {{ {} }};",
            paren(cond),
            then_bb.index(),
            else_bb.index()
        ),
        Terminator::Return(v) => format!("return Ok({});", owned(v)),
        Terminator::Unreachable => "return Err(Fault::MissingReturn);".to_string(),
    }
}

fn owned(op: &Operand) -> String {
    match op {
        Operand::Reg(r) => format!("r[{}].clone()", r.index()),
        Operand::Const(v) => value_expr(v),
    }
}

fn borrowed(op: &Operand) -> String {
    match op {
        Operand::Reg(r) => format!("&r[{}]", r.index()),
        Operand::Const(v) => format!("&{}", value_expr(v)),
    }
}

/// An operand usable as a method receiver.
fn paren(op: &Operand) -> String {
    match op {
        Operand::Reg(r) => format!("r[{}]", r.index()),
        Operand::Const(v) => format!("({})", value_expr(v)),
    }
}

fn vec_expr(ops: &[Operand]) -> String {
    let items: Vec<String> = ops.iter().map(owned).collect();
    format!("vec![{}]", items.join(", "))
}

fn op_ty(ty: OpTy) -> String {
    match ty {
        OpTy::Int(t) => format!("OpTy::Int(IntTy::{t:?})"),
        OpTy::Float(t) => format!("OpTy::Float(FloatTy::{t:?})"),
        OpTy::Bool => "OpTy::Bool".to_string(),
        OpTy::Str => "OpTy::Str".to_string(),
        OpTy::Any => "OpTy::Any".to_string(),
    }
}

fn aggregate_expr(kind: AggKind, elems: Vec<String>) -> String {
    let list = elems.join(", ");
    match kind {
        AggKind::Array => format!("Value::Array(vec![{list}])"),
        AggKind::Tuple => format!("Value::Tuple(vec![{list}])"),
        AggKind::Record => format!("Value::Record(vec![{list}])"),
        AggKind::Variant(tag) => format!("Value::Variant {{ tag: {tag}, payload: vec![{list}] }}"),
        AggKind::Map => {
            let pairs: Vec<String> = elems.chunks(2).map(|kv| format!("({})", kv.join(", "))).collect();
            format!("Value::Map([{}].into_iter().collect())", pairs.join(", "))
        }
        AggKind::Set => format!("Value::Set([{list}].into_iter().collect())"),
    }
}

/// A Rust expression constructing `v`. Floats go through their bit pattern
/// so the generated constant is exact.
fn value_expr(v: &Value) -> String {
    let all = |xs: &[Value]| xs.iter().map(value_expr).collect::<Vec<_>>();
    match v {
        Value::Unit => "Value::Unit".to_string(),
        Value::Bool(b) => format!("Value::Bool({b})"),
        Value::Int(i64::MIN) => "Value::Int(i64::MIN)".to_string(),
        Value::Int(i) => format!("Value::Int({i})"),
        Value::Float(x) => format!("Value::Float(f64::from_bits({:#018x}))", x.to_bits()),
        Value::Str(s) => format!("Value::Str({s:?}.to_string())"),
        Value::Array(xs) => aggregate_expr(AggKind::Array, all(xs)),
        Value::Tuple(xs) => aggregate_expr(AggKind::Tuple, all(xs)),
        Value::Record(xs) => aggregate_expr(AggKind::Record, all(xs)),
        Value::Variant { tag, payload } => aggregate_expr(AggKind::Variant(*tag), all(payload)),
        Value::Map(m) => {
            let flat: Vec<String> = m.iter().flat_map(|(k, v)| [value_expr(k), value_expr(v)]).collect();
            aggregate_expr(AggKind::Map, flat)
        }
        Value::Set(s) => aggregate_expr(AggKind::Set, s.iter().map(value_expr).collect()),
        Value::Dyn { concrete, value } => {
            format!("Value::Dyn {{ concrete: {concrete}, value: Box::new({}) }}", value_expr(value))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cir::{Block, Inst};
    use crate::id::{BlockId, Reg};
    use crate::types::Type;
    use sirs_runtime::ops::{BinOp, IntTy};

    fn add_program() -> CirProgram {
        let i32t = OpTy::Int(IntTy::I32);
        let mut main = CirFunction {
            name: "main".into(),
            params: 0,
            locals: vec![],
            returns: Type::Int(IntTy::I32),
            blocks: vec![Block {
                insts: vec![Inst {
                    dst: Some(Reg(0)),
                    kind: InstKind::Binary {
                        op: BinOp::Add,
                        ty: i32t,
                        lhs: Operand::Const(Value::Int(10)),
                        rhs: Operand::Const(Value::Int(20)),
                    },
                }],
                term: Terminator::Return(Operand::Reg(Reg(0))),
            }],
            next_reg: 1,
        };
        main.add_local("unused", Type::Bool);
        CirProgram {
            functions: vec![main],
            dispatch: Default::default(),
        }
    }

    #[test]
    fn emits_state_machine_and_main() {
        let out = codegen(&add_program(), &CodegenOptions::default());
        assert!(out.diagnostics.is_empty(), "{:?}", out.diagnostics);
        let src = &out.generated.rust_source;
        assert!(src.starts_with("// Generated by sirsc"));
        assert!(src.contains("// main\nfn f0(s: &mut Session, args: Vec<Value>)"), "{src}");
        assert!(
            src.contains("r[0] = ops::binary(BinOp::Add, OpTy::Int(IntTy::I32), &Value::Int(10), &Value::Int(20))?;"),
            "{src}"
        );
        assert!(src.contains("return Ok(r[0].clone());"), "{src}");
        assert!(src.contains("match f0(&mut session, Vec::new())"), "{src}");
    }

    #[test]
    fn output_is_deterministic() {
        let a = codegen(&add_program(), &CodegenOptions::default());
        let b = codegen(&add_program(), &CodegenOptions::default());
        assert_eq!(a.generated, b.generated);
    }

    #[test]
    fn missing_entry_is_e0501() {
        let options = CodegenOptions {
            entry: Some("start".into()),
            ..CodegenOptions::default()
        };
        let out = codegen(&add_program(), &options);
        assert_eq!(out.diagnostics.len(), 1);
        assert_eq!(out.diagnostics[0].code, Some(codes::E0501));
        assert!(out.generated.rust_source.is_empty());
    }

    #[test]
    fn dangling_branch_is_rejected() {
        let mut p = add_program();
        p.functions[0].blocks[0].term = Terminator::Jump(BlockId(9));
        let out = codegen(&p, &CodegenOptions::default());
        assert_eq!(out.diagnostics[0].code, Some(codes::E0501));
        assert!(out.diagnostics[0].message.contains("C1_targets_valid"));
    }

    #[test]
    fn float_constants_are_exact() {
        assert_eq!(value_expr(&Value::Float(0.1)), "Value::Float(f64::from_bits(0x3fb999999999999a))");
        assert_eq!(value_expr(&Value::Int(i64::MIN)), "Value::Int(i64::MIN)");
        assert_eq!(
            value_expr(&Value::some(Value::Str("a".into()))),
            "Value::Variant { tag: 1, payload: vec![Value::Str(\"a\".to_string())] }"
        );
    }
}
