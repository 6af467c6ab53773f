// ops.rs — Scalar operations and intrinsics
//
// The single definition of arithmetic, comparison, cast and intrinsic
// semantics. The compiler's constant folder, its reference interpreter and
// generated code all call into this module, so they agree bit for bit.
//
// Integers wrap at their declared width. Integer division or remainder by
// zero is a `Fault`; float division follows IEEE 754. `f32` results are
// rounded after every operation.

use std::fmt;

use serde::Serialize;

use crate::error::Fault;
use crate::session::Session;
use crate::value::Value;

// ── Scalar types ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IntTy {
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
}

impl IntTy {
    pub const ALL: [IntTy; 8] = [
        IntTy::I8,
        IntTy::I16,
        IntTy::I32,
        IntTy::I64,
        IntTy::U8,
        IntTy::U16,
        IntTy::U32,
        IntTy::U64,
    ];

    pub fn bits(self) -> u32 {
        match self {
            IntTy::I8 | IntTy::U8 => 8,
            IntTy::I16 | IntTy::U16 => 16,
            IntTy::I32 | IntTy::U32 => 32,
            IntTy::I64 | IntTy::U64 => 64,
        }
    }

    pub fn signed(self) -> bool {
        matches!(self, IntTy::I8 | IntTy::I16 | IntTy::I32 | IntTy::I64)
    }

    pub fn name(self) -> &'static str {
        match self {
            IntTy::I8 => "i8",
            IntTy::I16 => "i16",
            IntTy::I32 => "i32",
            IntTy::I64 => "i64",
            IntTy::U8 => "u8",
            IntTy::U16 => "u16",
            IntTy::U32 => "u32",
            IntTy::U64 => "u64",
        }
    }

    pub fn min(self) -> i128 {
        if self.signed() {
            -(1i128 << (self.bits() - 1))
        } else {
            0
        }
    }

    pub fn max(self) -> i128 {
        if self.signed() {
            (1i128 << (self.bits() - 1)) - 1
        } else {
            (1i128 << self.bits()) - 1
        }
    }

    pub fn fits(self, v: i128) -> bool {
        v >= self.min() && v <= self.max()
    }

    /// Canonical stored form of a mathematical value: low `bits` bits,
    /// sign-extended for signed types, zero-extended otherwise (`u64` keeps
    /// its bit pattern in the `i64`).
    pub fn wrap(self, v: i64) -> i64 {
        match self {
            IntTy::I8 => v as i8 as i64,
            IntTy::I16 => v as i16 as i64,
            IntTy::I32 => v as i32 as i64,
            IntTy::I64 | IntTy::U64 => v,
            IntTy::U8 => v as u8 as i64,
            IntTy::U16 => v as u16 as i64,
            IntTy::U32 => v as u32 as i64,
        }
    }

    /// Stored form of an in-range literal.
    pub fn from_i128(self, v: i128) -> i64 {
        self.wrap(v as i64)
    }

    /// Mathematical value of a stored integer.
    pub fn to_i128(self, v: i64) -> i128 {
        if self == IntTy::U64 {
            v as u64 as i128
        } else {
            v as i128
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FloatTy {
    F32,
    F64,
}

impl FloatTy {
    pub fn name(self) -> &'static str {
        match self {
            FloatTy::F32 => "f32",
            FloatTy::F64 => "f64",
        }
    }

    pub fn round(self, x: f64) -> f64 {
        match self {
            FloatTy::F32 => x as f32 as f64,
            FloatTy::F64 => x,
        }
    }
}

/// Operand type of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OpTy {
    Int(IntTy),
    Float(FloatTy),
    Bool,
    Str,
    /// Composite operands; only equality is defined.
    Any,
}

impl fmt::Display for OpTy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OpTy::Int(t) => f.write_str(t.name()),
            OpTy::Float(t) => f.write_str(t.name()),
            OpTy::Bool => f.write_str("bool"),
            OpTy::Str => f.write_str("string"),
            OpTy::Any => f.write_str("any"),
        }
    }
}

// ── Operators ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
}

impl BinOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Rem => "%",
            BinOp::Eq => "==",
            BinOp::Ne => "!=",
            BinOp::Lt => "<",
            BinOp::Le => "<=",
            BinOp::Gt => ">",
            BinOp::Ge => ">=",
            BinOp::BitAnd => "&",
            BinOp::BitOr => "|",
            BinOp::BitXor => "^",
            BinOp::Shl => "<<",
            BinOp::Shr => ">>",
        }
    }

    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinOp::Eq | BinOp::Ne | BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge
        )
    }

    /// Integer division and remainder fault on a zero divisor.
    pub fn may_fault(self, ty: OpTy) -> bool {
        matches!(self, BinOp::Div | BinOp::Rem) && matches!(ty, OpTy::Int(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum UnOp {
    Neg,
    Not,
}

impl UnOp {
    pub fn symbol(self) -> &'static str {
        match self {
            UnOp::Neg => "-",
            UnOp::Not => "!",
        }
    }
}

fn shape(detail: impl Into<String>) -> Fault {
    Fault::Shape(detail.into())
}

// ── Evaluation ──────────────────────────────────────────────────────────────

pub fn binary(op: BinOp, ty: OpTy, a: &Value, b: &Value) -> Result<Value, Fault> {
    match ty {
        OpTy::Int(t) => int_binary(op, t, a.as_int()?, b.as_int()?),
        OpTy::Float(t) => float_binary(op, t, a.as_float()?, b.as_float()?),
        OpTy::Bool => {
            let (x, y) = (a.as_bool()?, b.as_bool()?);
            Ok(Value::Bool(match op {
                BinOp::Eq => x == y,
                BinOp::Ne => x != y,
                BinOp::BitAnd => x & y,
                BinOp::BitOr => x | y,
                BinOp::BitXor => x ^ y,
                _ => return Err(shape(format!("'{}' on bool", op.symbol()))),
            }))
        }
        OpTy::Str => {
            let (x, y) = (a.as_str()?, b.as_str()?);
            Ok(match op {
                BinOp::Add => Value::Str(format!("{x}{y}")),
                BinOp::Eq => Value::Bool(x == y),
                BinOp::Ne => Value::Bool(x != y),
                BinOp::Lt => Value::Bool(x < y),
                BinOp::Le => Value::Bool(x <= y),
                BinOp::Gt => Value::Bool(x > y),
                BinOp::Ge => Value::Bool(x >= y),
                _ => return Err(shape(format!("'{}' on string", op.symbol()))),
            })
        }
        OpTy::Any => match op {
            BinOp::Eq => Ok(Value::Bool(a == b)),
            BinOp::Ne => Ok(Value::Bool(a != b)),
            _ => Err(shape(format!("'{}' on composite values", op.symbol()))),
        },
    }
}

fn int_binary(op: BinOp, t: IntTy, x: i64, y: i64) -> Result<Value, Fault> {
    let signed = t.signed();
    let cmp = |o: std::cmp::Ordering| -> bool {
        match op {
            BinOp::Eq => o.is_eq(),
            BinOp::Ne => !o.is_eq(),
            BinOp::Lt => o.is_lt(),
            BinOp::Le => o.is_le(),
            BinOp::Gt => o.is_gt(),
            _ => o.is_ge(),
        }
    };
    if op.is_comparison() {
        let o = if signed {
            x.cmp(&y)
        } else {
            (x as u64).cmp(&(y as u64))
        };
        return Ok(Value::Bool(cmp(o)));
    }
    let shift = (y as u32) & (t.bits() - 1);
    let raw = match op {
        BinOp::Add => x.wrapping_add(y),
        BinOp::Sub => x.wrapping_sub(y),
        BinOp::Mul => x.wrapping_mul(y),
        BinOp::Div | BinOp::Rem if y == 0 => return Err(Fault::DivisionByZero),
        BinOp::Div if signed => x.wrapping_div(y),
        BinOp::Div => ((x as u64) / (y as u64)) as i64,
        BinOp::Rem if signed => x.wrapping_rem(y),
        BinOp::Rem => ((x as u64) % (y as u64)) as i64,
        BinOp::BitAnd => x & y,
        BinOp::BitOr => x | y,
        BinOp::BitXor => x ^ y,
        BinOp::Shl => x.wrapping_shl(shift),
        BinOp::Shr if signed => x >> shift,
        BinOp::Shr => ((x as u64) >> shift) as i64,
        _ => unreachable!("comparisons handled above"),
    };
    Ok(Value::Int(t.wrap(raw)))
}

fn float_binary(op: BinOp, t: FloatTy, x: f64, y: f64) -> Result<Value, Fault> {
    let v = match op {
        BinOp::Add => x + y,
        BinOp::Sub => x - y,
        BinOp::Mul => x * y,
        BinOp::Div => x / y,
        BinOp::Rem => x % y,
        BinOp::Eq => return Ok(Value::Bool(x == y)),
        BinOp::Ne => return Ok(Value::Bool(x != y)),
        BinOp::Lt => return Ok(Value::Bool(x < y)),
        BinOp::Le => return Ok(Value::Bool(x <= y)),
        BinOp::Gt => return Ok(Value::Bool(x > y)),
        BinOp::Ge => return Ok(Value::Bool(x >= y)),
        _ => return Err(shape(format!("'{}' on float", op.symbol()))),
    };
    Ok(Value::Float(t.round(v)))
}

pub fn unary(op: UnOp, ty: OpTy, a: &Value) -> Result<Value, Fault> {
    match (op, ty) {
        (UnOp::Neg, OpTy::Int(t)) => Ok(Value::Int(t.wrap(a.as_int()?.wrapping_neg()))),
        (UnOp::Neg, OpTy::Float(t)) => Ok(Value::Float(t.round(-a.as_float()?))),
        (UnOp::Not, OpTy::Bool) => Ok(Value::Bool(!a.as_bool()?)),
        (UnOp::Not, OpTy::Int(t)) => Ok(Value::Int(t.wrap(!a.as_int()?))),
        _ => Err(shape(format!("'{}' on {ty}", op.symbol()))),
    }
}

/// Explicit conversion. Float to int saturates (NaN becomes 0); int to int
/// wraps; bool to int gives 0 or 1.
pub fn cast(from: OpTy, to: OpTy, v: &Value) -> Result<Value, Fault> {
    match (from, to) {
        (a, b) if a == b => Ok(v.clone()),
        (OpTy::Int(f), OpTy::Int(t)) => Ok(Value::Int(t.wrap(f.to_i128(v.as_int()?) as i64))),
        (OpTy::Int(f), OpTy::Float(t)) => Ok(Value::Float(t.round(f.to_i128(v.as_int()?) as f64))),
        (OpTy::Float(_), OpTy::Float(t)) => Ok(Value::Float(t.round(v.as_float()?))),
        (OpTy::Float(_), OpTy::Int(t)) => {
            let x = v.as_float()?;
            let r = match t {
                IntTy::I8 => x as i8 as i64,
                IntTy::I16 => x as i16 as i64,
                IntTy::I32 => x as i32 as i64,
                IntTy::I64 => x as i64,
                IntTy::U8 => x as u8 as i64,
                IntTy::U16 => x as u16 as i64,
                IntTy::U32 => x as u32 as i64,
                IntTy::U64 => x as u64 as i64,
            };
            Ok(Value::Int(r))
        }
        (OpTy::Bool, OpTy::Int(_)) => Ok(Value::Int(v.as_bool()? as i64)),
        (OpTy::Bool, OpTy::Float(_)) => Ok(Value::Float(v.as_bool()? as i64 as f64)),
        _ => Err(shape(format!("cast from {from} to {to}"))),
    }
}

// ── Intrinsics ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Intrinsic {
    Len,
    Contains,
    Get,
    Insert,
    Push,
    Print,
    Sqrt,
    Exp,
    Log,
    Abs,
}

impl Intrinsic {
    pub const ALL: [Intrinsic; 10] = [
        Intrinsic::Len,
        Intrinsic::Contains,
        Intrinsic::Get,
        Intrinsic::Insert,
        Intrinsic::Push,
        Intrinsic::Print,
        Intrinsic::Sqrt,
        Intrinsic::Exp,
        Intrinsic::Log,
        Intrinsic::Abs,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Intrinsic::Len => "len",
            Intrinsic::Contains => "contains",
            Intrinsic::Get => "get",
            Intrinsic::Insert => "insert",
            Intrinsic::Push => "push",
            Intrinsic::Print => "print",
            Intrinsic::Sqrt => "sqrt",
            Intrinsic::Exp => "exp",
            Intrinsic::Log => "log",
            Intrinsic::Abs => "abs",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|i| i.name() == name)
    }

    /// Only `print` touches the session.
    pub fn is_pure(self) -> bool {
        self != Intrinsic::Print
    }
}

fn arg(args: &[Value], i: usize) -> Result<&Value, Fault> {
    args.get(i)
        .ok_or_else(|| shape(format!("missing intrinsic argument {i}")))
}

/// Evaluate an intrinsic. `ty` is the numeric type for `sqrt`, `exp`, `log`
/// and `abs`; ignored otherwise.
pub fn intrinsic(
    which: Intrinsic,
    ty: OpTy,
    args: &[Value],
    session: &mut Session,
) -> Result<Value, Fault> {
    match which {
        Intrinsic::Print => {
            let line = args
                .iter()
                .map(|v| v.to_string())
                .collect::<Vec<_>>()
                .join(" ");
            session.print(line);
            Ok(Value::Unit)
        }
        other => pure_intrinsic(other, ty, args),
    }
}

/// Evaluate a session-free intrinsic.
pub fn pure_intrinsic(which: Intrinsic, ty: OpTy, args: &[Value]) -> Result<Value, Fault> {
    let float = |f: fn(f64) -> f64| -> Result<Value, Fault> {
        match ty {
            OpTy::Float(t) => Ok(Value::Float(t.round(f(arg(args, 0)?.as_float()?)))),
            _ => Err(shape(format!("'{}' on {ty}", which.name()))),
        }
    };
    match which {
        Intrinsic::Len => Ok(Value::Int(arg(args, 0)?.len()?)),
        Intrinsic::Contains => Ok(Value::Bool(arg(args, 0)?.contains(arg(args, 1)?)?)),
        Intrinsic::Get => arg(args, 0)?.get(arg(args, 1)?),
        Intrinsic::Insert => {
            let value = args.get(2).cloned();
            arg(args, 0)?.insert(arg(args, 1)?.clone(), value)
        }
        Intrinsic::Push => arg(args, 0)?.push(arg(args, 1)?.clone()),
        Intrinsic::Sqrt => float(f64::sqrt),
        Intrinsic::Exp => float(f64::exp),
        Intrinsic::Log => float(f64::ln),
        Intrinsic::Abs => match ty {
            OpTy::Int(t) => Ok(Value::Int(t.wrap(arg(args, 0)?.as_int()?.wrapping_abs()))),
            _ => float(f64::abs),
        },
        Intrinsic::Print => Err(shape("print needs a session")),
    }
}
