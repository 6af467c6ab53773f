// types.rs — SIRS type representation and widening rules
//
// One `Type` is used for annotations in the AST and for resolved types in
// the checker. Declared records and enums are both `Named`; the declaration
// table decides which. `Param` names a type parameter of the enclosing
// generic function and disappears during monomorphization.
//
// Preconditions: none (types and pure functions).
// Postconditions: `Type` equality is structural and total.
// Failure modes: none.
// Side effects: none.

use std::collections::HashMap;
use std::fmt;

use sirs_runtime::ops::{FloatTy, IntTy, OpTy};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Type {
    Int(IntTy),
    Float(FloatTy),
    Bool,
    Str,
    Unit,
    Array(Box<Type>, u64),
    Slice(Box<Type>),
    Tuple(Vec<Type>),
    Map(Box<Type>, Box<Type>),
    Set(Box<Type>),
    Optional(Box<Type>),
    Union(Vec<Type>),
    Named { name: String, args: Vec<Type> },
    Param(String),
    Dyn(String),
}

/// Implicit numeric conversion policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WideningPolicy {
    /// Lossless widening within a numeric category.
    #[default]
    SameCategory,
    /// Types must match exactly.
    Strict,
}

pub const I64: Type = Type::Int(IntTy::I64);
pub const F64: Type = Type::Float(FloatTy::F64);

impl Type {
    pub fn named(name: impl Into<String>) -> Self {
        Type::Named {
            name: name.into(),
            args: Vec::new(),
        }
    }

    pub fn primitive(name: &str) -> Option<Self> {
        Some(match name {
            "bool" => Type::Bool,
            "string" => Type::Str,
            "unit" => Type::Unit,
            "f32" => Type::Float(FloatTy::F32),
            "f64" => Type::Float(FloatTy::F64),
            other => Type::Int(IntTy::ALL.into_iter().find(|t| t.name() == other)?),
        })
    }

    pub fn is_int(&self) -> bool {
        matches!(self, Type::Int(_))
    }

    pub fn is_float(&self) -> bool {
        matches!(self, Type::Float(_))
    }

    pub fn is_numeric(&self) -> bool {
        self.is_int() || self.is_float()
    }

    /// Types with a total order usable by `<` and friends.
    pub fn is_ordered(&self) -> bool {
        self.is_numeric() || *self == Type::Str
    }

    /// Element type of an array or slice.
    pub fn sequence_elem(&self) -> Option<&Type> {
        match self {
            Type::Array(e, _) | Type::Slice(e) => Some(e),
            _ => None,
        }
    }

    /// True if no type parameter occurs anywhere in the type.
    pub fn is_concrete(&self) -> bool {
        match self {
            Type::Param(_) => false,
            Type::Array(t, _) | Type::Slice(t) | Type::Set(t) | Type::Optional(t) => t.is_concrete(),
            Type::Map(k, v) => k.is_concrete() && v.is_concrete(),
            Type::Tuple(ts) | Type::Union(ts) | Type::Named { args: ts, .. } => {
                ts.iter().all(Type::is_concrete)
            }
            _ => true,
        }
    }

    /// Replace type parameters using `subst`. Unbound parameters are kept.
    pub fn substitute(&self, subst: &HashMap<String, Type>) -> Type {
        if subst.is_empty() {
            return self.clone();
        }
        let s = |t: &Type| Box::new(t.substitute(subst));
        let all = |ts: &[Type]| ts.iter().map(|t| t.substitute(subst)).collect();
        match self {
            Type::Param(p) => subst.get(p).cloned().unwrap_or_else(|| self.clone()),
            Type::Array(t, n) => Type::Array(s(t), *n),
            Type::Slice(t) => Type::Slice(s(t)),
            Type::Set(t) => Type::Set(s(t)),
            Type::Optional(t) => Type::Optional(s(t)),
            Type::Map(k, v) => Type::Map(s(k), s(v)),
            Type::Tuple(ts) => Type::Tuple(all(ts)),
            Type::Union(ts) => Type::Union(all(ts)),
            Type::Named { name, args } => Type::Named {
                name: name.clone(),
                args: all(args),
            },
            other => other.clone(),
        }
    }

    /// Operand type for CIR operations on values of this type.
    pub fn op_ty(&self) -> OpTy {
        match self {
            Type::Int(t) => OpTy::Int(*t),
            Type::Float(t) => OpTy::Float(*t),
            Type::Bool => OpTy::Bool,
            Type::Str => OpTy::Str,
            _ => OpTy::Any,
        }
    }

    /// Identifier-safe rendering used in mangled instance names.
    pub fn mangle(&self) -> String {
        self.to_string()
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
            .collect()
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let list = |f: &mut fmt::Formatter<'_>, ts: &[Type], sep: &str| -> fmt::Result {
            for (i, t) in ts.iter().enumerate() {
                if i > 0 {
                    f.write_str(sep)?;
                }
                write!(f, "{t}")?;
            }
            Ok(())
        };
        match self {
            Type::Int(t) => f.write_str(t.name()),
            Type::Float(t) => f.write_str(t.name()),
            Type::Bool => f.write_str("bool"),
            Type::Str => f.write_str("string"),
            Type::Unit => f.write_str("unit"),
            Type::Array(t, n) => write!(f, "[{t}; {n}]"),
            Type::Slice(t) => write!(f, "[{t}]"),
            Type::Tuple(ts) => {
                f.write_str("(")?;
                list(f, ts, ", ")?;
                f.write_str(")")
            }
            Type::Map(k, v) => write!(f, "map<{k}, {v}>"),
            Type::Set(t) => write!(f, "set<{t}>"),
            Type::Optional(t) => write!(f, "{t}?"),
            Type::Union(ts) => {
                f.write_str("(")?;
                list(f, ts, " | ")?;
                f.write_str(")")
            }
            Type::Named { name, args } => {
                f.write_str(name)?;
                if !args.is_empty() {
                    f.write_str("<")?;
                    list(f, args, ", ")?;
                    f.write_str(">")?;
                }
                Ok(())
            }
            Type::Param(p) => f.write_str(p),
            Type::Dyn(i) => write!(f, "dyn {i}"),
        }
    }
}

// ── Widening ────────────────────────────────────────────────────────────────

/// (family, rank, signed) for numeric types; family 0 = integer, 1 = float.
fn widening_rank(t: &Type) -> Option<(u8, u32, bool)> {
    match t {
        Type::Int(i) => Some((0, i.bits(), i.signed())),
        Type::Float(FloatTy::F32) => Some((1, 32, true)),
        Type::Float(FloatTy::F64) => Some((1, 64, true)),
        _ => None,
    }
}

/// Check if `from` can be implicitly converted to `to` under `policy`.
///
/// Besides numeric widening, a fixed-length array converts to a slice of the
/// same element type.
pub fn can_widen(from: &Type, to: &Type, policy: WideningPolicy) -> bool {
    if from == to {
        return true;
    }
    if let (Type::Array(a, _), Type::Slice(b)) = (from, to) {
        return a == b;
    }
    if policy == WideningPolicy::Strict {
        return false;
    }
    match (widening_rank(from), widening_rank(to)) {
        (Some((fam_from, rank_from, s_from)), Some((fam_to, rank_to, s_to))) => {
            if fam_from != fam_to {
                return false;
            }
            match (s_from, s_to) {
                (true, true) | (false, false) => rank_from < rank_to,
                // Unsigned fits a strictly wider signed type.
                (false, true) => rank_from < rank_to,
                (true, false) => false,
            }
        }
        _ => false,
    }
}

/// Least type both operands widen to, if any.
pub fn common_type(a: &Type, b: &Type, policy: WideningPolicy) -> Option<Type> {
    if can_widen(a, b, policy) {
        Some(b.clone())
    } else if can_widen(b, a, policy) {
        Some(a.clone())
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(name: &str) -> Type {
        Type::primitive(name).unwrap()
    }

    #[test]
    fn primitive_names() {
        assert_eq!(p("i32"), Type::Int(IntTy::I32));
        assert_eq!(p("f64"), F64);
        assert_eq!(Type::primitive("int"), None);
    }

    #[test]
    fn same_category_widening() {
        let pol = WideningPolicy::SameCategory;
        assert!(can_widen(&p("i8"), &p("i64"), pol));
        assert!(can_widen(&p("u8"), &p("u16"), pol));
        assert!(can_widen(&p("u8"), &p("i16"), pol));
        assert!(!can_widen(&p("u32"), &p("i32"), pol));
        assert!(!can_widen(&p("i8"), &p("u64"), pol));
        assert!(!can_widen(&p("i64"), &p("i32"), pol));
        assert!(can_widen(&p("f32"), &p("f64"), pol));
        assert!(!can_widen(&p("i32"), &p("f64"), pol));
        assert!(!can_widen(&p("f32"), &p("i64"), pol));
    }

    #[test]
    fn strict_policy_rejects_widening() {
        assert!(!can_widen(&p("i8"), &p("i64"), WideningPolicy::Strict));
        assert!(can_widen(&p("i8"), &p("i8"), WideningPolicy::Strict));
    }

    #[test]
    fn array_converts_to_slice() {
        let arr = Type::Array(Box::new(p("i32")), 3);
        let slice = Type::Slice(Box::new(p("i32")));
        assert!(can_widen(&arr, &slice, WideningPolicy::Strict));
        assert!(!can_widen(&slice, &arr, WideningPolicy::SameCategory));
    }

    #[test]
    fn common_type_picks_wider() {
        let pol = WideningPolicy::SameCategory;
        assert_eq!(common_type(&p("i16"), &p("i32"), pol), Some(p("i32")));
        assert_eq!(common_type(&p("i32"), &p("f64"), pol), None);
    }

    #[test]
    fn substitution_and_display() {
        let t = Type::Named {
            name: "Pair".into(),
            args: vec![Type::Param("T".into()), Type::Optional(Box::new(Type::Param("T".into())))],
        };
        let subst = HashMap::from([("T".to_string(), p("i32"))]);
        let s = t.substitute(&subst);
        assert!(s.is_concrete());
        assert!(!t.is_concrete());
        assert_eq!(s.to_string(), "Pair<i32, i32?>");
        assert_eq!(s.mangle(), "Pair_i32__i32__");
    }
}
