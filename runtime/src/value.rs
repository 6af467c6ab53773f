// value.rs — Runtime value model
//
// One representation shared by the compiler's reference interpreter and by
// generated code for composite values. Integers of every width are stored as
// `i64` (unsigned 64-bit values as their bit pattern); the producer is
// responsible for wrapping to the declared width. `f32` values are stored
// widened to `f64` and rounded after every operation.
//
// Optionals are variants with tag 0 (`none`) and 1 (`some`). Union members
// are variants whose tag is the member index.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::dist::Variate;
use crate::error::Fault;

pub const NONE_TAG: u32 = 0;
pub const SOME_TAG: u32 = 1;

#[derive(Debug, Clone)]
pub enum Value {
    Unit,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Array(Vec<Value>),
    Tuple(Vec<Value>),
    /// Fields in declaration order.
    Record(Vec<Value>),
    Variant { tag: u32, payload: Vec<Value> },
    Map(BTreeMap<Value, Value>),
    Set(BTreeSet<Value>),
    /// Interface value: concrete type id plus the wrapped value.
    Dyn { concrete: u32, value: Box<Value> },
}

impl Value {
    pub fn none() -> Self {
        Value::Variant {
            tag: NONE_TAG,
            payload: Vec::new(),
        }
    }

    pub fn some(v: Value) -> Self {
        Value::Variant {
            tag: SOME_TAG,
            payload: vec![v],
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Value::Unit => 0,
            Value::Bool(_) => 1,
            Value::Int(_) => 2,
            Value::Float(_) => 3,
            Value::Str(_) => 4,
            Value::Array(_) => 5,
            Value::Tuple(_) => 6,
            Value::Record(_) => 7,
            Value::Variant { .. } => 8,
            Value::Map(_) => 9,
            Value::Set(_) => 10,
            Value::Dyn { .. } => 11,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Value::Unit => "unit",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "string",
            Value::Array(_) => "array",
            Value::Tuple(_) => "tuple",
            Value::Record(_) => "record",
            Value::Variant { .. } => "variant",
            Value::Map(_) => "map",
            Value::Set(_) => "set",
            Value::Dyn { .. } => "dyn",
        }
    }

    fn shape(&self, expected: &str) -> Fault {
        Fault::Shape(format!("expected {expected}, found {}", self.kind()))
    }

    // ── Accessors ───────────────────────────────────────────────────────────

    pub fn as_int(&self) -> Result<i64, Fault> {
        match self {
            Value::Int(v) => Ok(*v),
            other => Err(other.shape("int")),
        }
    }

    pub fn as_float(&self) -> Result<f64, Fault> {
        match self {
            Value::Float(v) => Ok(*v),
            other => Err(other.shape("float")),
        }
    }

    pub fn as_bool(&self) -> Result<bool, Fault> {
        match self {
            Value::Bool(v) => Ok(*v),
            other => Err(other.shape("bool")),
        }
    }

    pub fn as_str(&self) -> Result<&str, Fault> {
        match self {
            Value::Str(s) => Ok(s),
            other => Err(other.shape("string")),
        }
    }

    /// Elements of an array, tuple or record.
    pub fn elements(&self) -> Result<&[Value], Fault> {
        match self {
            Value::Array(v) | Value::Tuple(v) | Value::Record(v) => Ok(v),
            other => Err(other.shape("aggregate")),
        }
    }

    /// Component `i` of a tuple or record, or payload slot `i` of a variant.
    pub fn extract(&self, i: usize) -> Result<Value, Fault> {
        let slots = match self {
            Value::Tuple(v) | Value::Record(v) => v,
            Value::Variant { payload, .. } => payload,
            Value::Dyn { value, .. } => return value.extract(i),
            other => return Err(other.shape("tuple, record or variant")),
        };
        slots
            .get(i)
            .cloned()
            .ok_or_else(|| Fault::Shape(format!("component {i} out of range")))
    }

    pub fn tag(&self) -> Result<u32, Fault> {
        match self {
            Value::Variant { tag, .. } => Ok(*tag),
            other => Err(other.shape("variant")),
        }
    }

    /// Bounds-checked element read of an array.
    pub fn index(&self, index: i64) -> Result<Value, Fault> {
        match self {
            Value::Array(v) => usize::try_from(index)
                .ok()
                .and_then(|i| v.get(i))
                .cloned()
                .ok_or(Fault::IndexOutOfBounds {
                    index,
                    len: v.len(),
                }),
            other => Err(other.shape("array")),
        }
    }

    /// Unwrap an interface value into its concrete type id and payload.
    pub fn as_dyn(&self) -> Result<(u32, &Value), Fault> {
        match self {
            Value::Dyn { concrete, value } => Ok((*concrete, value)),
            other => Err(other.shape("dyn")),
        }
    }

    // ── Collection intrinsics ───────────────────────────────────────────────

    pub fn len(&self) -> Result<i64, Fault> {
        let n = match self {
            Value::Array(v) => v.len(),
            Value::Str(s) => s.chars().count(),
            Value::Map(m) => m.len(),
            Value::Set(s) => s.len(),
            other => return Err(other.shape("collection")),
        };
        Ok(n as i64)
    }

    pub fn contains(&self, key: &Value) -> Result<bool, Fault> {
        match self {
            Value::Map(m) => Ok(m.contains_key(key)),
            Value::Set(s) => Ok(s.contains(key)),
            Value::Array(v) => Ok(v.contains(key)),
            other => Err(other.shape("map, set or array")),
        }
    }

    /// Map lookup as an optional.
    pub fn get(&self, key: &Value) -> Result<Value, Fault> {
        match self {
            Value::Map(m) => Ok(m.get(key).cloned().map(Value::some).unwrap_or_else(Value::none)),
            other => Err(other.shape("map")),
        }
    }

    /// Functional insert: returns the updated map or set.
    pub fn insert(&self, key: Value, value: Option<Value>) -> Result<Value, Fault> {
        match (self, value) {
            (Value::Map(m), Some(v)) => {
                let mut m = m.clone();
                m.insert(key, v);
                Ok(Value::Map(m))
            }
            (Value::Set(s), None) => {
                let mut s = s.clone();
                s.insert(key);
                Ok(Value::Set(s))
            }
            (other, _) => Err(other.shape("map or set")),
        }
    }

    /// Functional push: returns the extended array.
    pub fn push(&self, elem: Value) -> Result<Value, Fault> {
        match self {
            Value::Array(v) => {
                let mut v = v.clone();
                v.push(elem);
                Ok(Value::Array(v))
            }
            other => Err(other.shape("array")),
        }
    }

    // ── Distribution bridge ─────────────────────────────────────────────────

    pub fn to_variate(&self) -> Result<Variate, Fault> {
        match self {
            Value::Int(k) => Ok(Variate::Int(*k)),
            Value::Float(x) => Ok(Variate::Real(*x)),
            Value::Array(v) => v
                .iter()
                .map(Value::as_float)
                .collect::<Result<Vec<_>, _>>()
                .map(Variate::Vector),
            other => Err(other.shape("numeric value")),
        }
    }

    pub fn from_variate(v: Variate) -> Self {
        match v {
            Variate::Int(k) => Value::Int(k),
            Variate::Real(x) => Value::Float(x),
            Variate::Vector(xs) => Value::Array(xs.into_iter().map(Value::Float).collect()),
        }
    }
}

// ── Ordering ────────────────────────────────────────────────────────────────

fn cmp_slices(a: &[Value], b: &[Value]) -> Ordering {
    a.iter().cmp(b.iter())
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        use Value::*;
        match (self, other) {
            (Unit, Unit) => Ordering::Equal,
            (Bool(a), Bool(b)) => a.cmp(b),
            (Int(a), Int(b)) => a.cmp(b),
            (Float(a), Float(b)) => a.total_cmp(b),
            (Str(a), Str(b)) => a.cmp(b),
            (Array(a), Array(b)) | (Tuple(a), Tuple(b)) | (Record(a), Record(b)) => {
                cmp_slices(a, b)
            }
            (
                Variant {
                    tag: ta,
                    payload: pa,
                },
                Variant {
                    tag: tb,
                    payload: pb,
                },
            ) => ta.cmp(tb).then_with(|| cmp_slices(pa, pb)),
            (Map(a), Map(b)) => a.iter().cmp(b.iter()),
            (Set(a), Set(b)) => a.iter().cmp(b.iter()),
            (
                Dyn {
                    concrete: ca,
                    value: va,
                },
                Dyn {
                    concrete: cb,
                    value: vb,
                },
            ) => ca.cmp(cb).then_with(|| va.cmp(vb)),
            (a, b) => a.rank().cmp(&b.rank()),
        }
    }
}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Value {}

// ── Conversions ─────────────────────────────────────────────────────────────

macro_rules! from_int {
    ($($t:ty),*) => {
        $(impl From<$t> for Value {
            fn from(v: $t) -> Self {
                Value::Int(v as i64)
            }
        })*
    };
}

from_int!(i8, i16, i32, i64, u8, u16, u32, u64);

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float(v as f64)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

impl From<()> for Value {
    fn from(_: ()) -> Self {
        Value::Unit
    }
}

// ── Display ─────────────────────────────────────────────────────────────────

fn write_seq(f: &mut fmt::Formatter<'_>, open: &str, items: &[Value], close: &str) -> fmt::Result {
    write!(f, "{open}")?;
    for (i, v) in items.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{v}")?;
    }
    write!(f, "{close}")
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Unit => write!(f, "()"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v:?}"),
            Value::Str(s) => write!(f, "{s}"),
            Value::Array(v) => write_seq(f, "[", v, "]"),
            Value::Tuple(v) => write_seq(f, "(", v, ")"),
            Value::Record(v) => write_seq(f, "{", v, "}"),
            Value::Variant { tag, payload } => {
                write!(f, "#{tag}")?;
                if payload.is_empty() {
                    Ok(())
                } else {
                    write_seq(f, "(", payload, ")")
                }
            }
            Value::Map(m) => {
                write!(f, "{{")?;
                for (i, (k, v)) in m.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{k}: {v}")?;
                }
                write!(f, "}}")
            }
            Value::Set(s) => {
                let items: Vec<Value> = s.iter().cloned().collect();
                write_seq(f, "{", &items, "}")
            }
            Value::Dyn { value, .. } => write!(f, "{value}"),
        }
    }
}
