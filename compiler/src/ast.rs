// AST node types for SIRS structured-IR documents.
//
// Mirrors the JSON schema accepted by the parser. Every node carries a
// `Span`, the JSON pointer of the object it was parsed from, for error
// reporting in downstream phases. Expressions additionally carry an
// `ExprId` that keys the checker's type table.
//
// Preconditions: produced by the parser from a structurally valid document.
// Postconditions: each node's span points at the object it came from.
// Failure modes: none (data-only module).
// Side effects: none.

use std::fmt;

use serde::Serialize;

use crate::id::ExprId;
use crate::types::Type;

// ── Span ──

/// JSON pointer (RFC 6901) into the input document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct Span(String);

impl Span {
    pub fn root() -> Self {
        Span(String::new())
    }

    pub fn child(&self, key: &str) -> Self {
        let escaped = key.replace('~', "~0").replace('/', "~1");
        Span(format!("{}/{}", self.0, escaped))
    }

    pub fn index(&self, i: usize) -> Self {
        Span(format!("{}/{}", self.0, i))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            f.write_str("/")
        } else {
            f.write_str(&self.0)
        }
    }
}

impl Serialize for Span {
    fn serialize<S: serde::Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&self.to_string())
    }
}

// ── Root ──

/// A complete program document.
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub types: Vec<TypeDecl>,
    pub interfaces: Vec<InterfaceDecl>,
    pub impls: Vec<ImplDecl>,
    pub functions: Vec<Function>,
}

// ── Declarations ──

#[derive(Debug, Clone, PartialEq)]
pub struct TypeParam {
    pub name: String,
    /// `Num`, `Ord`, `Eq` or interface names.
    pub bounds: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    pub name: String,
    pub type_params: Vec<TypeParam>,
    pub params: Vec<Param>,
    pub returns: Type,
    pub body: Vec<Stmt>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub ty: Type,
    pub mutable: bool,
    /// Only consulted when the function is used as an inference model.
    pub constraint: Option<ParamConstraint>,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParamConstraint {
    Real,
    Positive,
    UnitInterval,
    Interval(f64, f64),
}

#[derive(Debug, Clone, PartialEq)]
pub struct TypeDecl {
    pub name: String,
    pub type_params: Vec<String>,
    pub body: TypeBody,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TypeBody {
    Record(Vec<FieldDecl>),
    Enum(Vec<VariantDecl>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldDecl {
    pub name: String,
    pub ty: Type,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VariantDecl {
    pub name: String,
    pub payload: Vec<Type>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InterfaceDecl {
    pub name: String,
    pub methods: Vec<MethodSig>,
    pub span: Span,
}

/// Interface method signature; the receiver is implicit.
#[derive(Debug, Clone, PartialEq)]
pub struct MethodSig {
    pub name: String,
    pub params: Vec<Type>,
    pub returns: Type,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImplDecl {
    pub interface: String,
    pub for_type: Type,
    /// (method name, implementing function name), sorted by method name.
    pub methods: Vec<(String, String)>,
    pub span: Span,
}

// ── Statements ──

#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
    pub kind: StmtKind,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    Let {
        name: String,
        ty: Option<Type>,
        mutable: bool,
        value: Expr,
    },
    Assign {
        name: String,
        value: Expr,
    },
    Expr(Expr),
    Return(Option<Expr>),
    If {
        cond: Expr,
        then_body: Vec<Stmt>,
        else_body: Vec<Stmt>,
    },
    While {
        cond: Expr,
        body: Vec<Stmt>,
    },
    /// Half-open integer range `start..end`.
    For {
        var: String,
        start: Expr,
        end: Expr,
        body: Vec<Stmt>,
    },
    Match {
        scrutinee: Expr,
        arms: Vec<Arm>,
    },
    Observe {
        dist: String,
        params: Vec<Expr>,
        value: Expr,
    },
    Break,
    Continue,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Arm {
    pub pattern: Pattern,
    pub body: Vec<Stmt>,
    pub span: Span,
}

// ── Patterns ──

#[derive(Debug, Clone, PartialEq)]
pub struct Pattern {
    pub kind: PatternKind,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PatternKind {
    Wildcard,
    Bind(String),
    /// Enum variant, or `some`/`none` for optionals.
    Variant {
        variant: String,
        bindings: Vec<String>,
    },
    Literal(Literal),
    /// Union member test.
    Type {
        ty: Type,
        binding: Option<String>,
    },
}

// ── Expressions ──

#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub id: ExprId,
    pub kind: ExprKind,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    /// Integer literal; wide enough for every `i64` and `u64` value.
    Int(i128),
    Float(f64),
    Bool(bool),
    Str(String),
    Unit,
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Int(v) => write!(f, "{v}"),
            Literal::Float(v) => write!(f, "{v:?}"),
            Literal::Bool(v) => write!(f, "{v}"),
            Literal::Str(s) => write!(f, "{s:?}"),
            Literal::Unit => f.write_str("()"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
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
    And,
    Or,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
}

impl BinaryOp {
    pub const ALL: [BinaryOp; 18] = [
        BinaryOp::Add,
        BinaryOp::Sub,
        BinaryOp::Mul,
        BinaryOp::Div,
        BinaryOp::Rem,
        BinaryOp::Eq,
        BinaryOp::Ne,
        BinaryOp::Lt,
        BinaryOp::Le,
        BinaryOp::Gt,
        BinaryOp::Ge,
        BinaryOp::And,
        BinaryOp::Or,
        BinaryOp::BitAnd,
        BinaryOp::BitOr,
        BinaryOp::BitXor,
        BinaryOp::Shl,
        BinaryOp::Shr,
    ];

    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Rem => "%",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
            BinaryOp::BitAnd => "&",
            BinaryOp::BitOr => "|",
            BinaryOp::BitXor => "^",
            BinaryOp::Shl => "<<",
            BinaryOp::Shr => ">>",
        }
    }

    pub fn from_symbol(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|op| op.symbol() == s)
    }

    pub fn is_arithmetic(self) -> bool {
        matches!(
            self,
            BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Rem
        )
    }

    pub fn is_bitwise(self) -> bool {
        matches!(
            self,
            BinaryOp::BitAnd | BinaryOp::BitOr | BinaryOp::BitXor | BinaryOp::Shl | BinaryOp::Shr
        )
    }

    pub fn is_ordering(self) -> bool {
        matches!(self, BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge)
    }

    pub fn is_equality(self) -> bool {
        matches!(self, BinaryOp::Eq | BinaryOp::Ne)
    }

    pub fn is_logical(self) -> bool {
        matches!(self, BinaryOp::And | BinaryOp::Or)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Neg,
    Not,
}

impl UnaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            UnaryOp::Neg => "-",
            UnaryOp::Not => "!",
        }
    }

    pub fn from_symbol(s: &str) -> Option<Self> {
        match s {
            "-" => Some(UnaryOp::Neg),
            "!" => Some(UnaryOp::Not),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Lit {
        ty: Option<Type>,
        value: Literal,
    },
    Var(String),
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Call {
        callee: String,
        type_args: Vec<Type>,
        args: Vec<Expr>,
    },
    MethodCall {
        receiver: Box<Expr>,
        method: String,
        args: Vec<Expr>,
    },
    AsDyn {
        interface: String,
        value: Box<Expr>,
    },
    Cast {
        ty: Type,
        value: Box<Expr>,
    },
    Array(Vec<Expr>),
    Tuple(Vec<Expr>),
    /// Fields sorted by name.
    Record {
        name: String,
        type_args: Vec<Type>,
        fields: Vec<(String, Expr)>,
    },
    Variant {
        enum_name: String,
        variant: String,
        type_args: Vec<Type>,
        payload: Vec<Expr>,
    },
    Some(Box<Expr>),
    None(Type),
    Map {
        key: Type,
        value: Type,
        entries: Vec<(Expr, Expr)>,
    },
    Set {
        elem: Type,
        elems: Vec<Expr>,
    },
    Field {
        base: Box<Expr>,
        field: String,
    },
    Index {
        base: Box<Expr>,
        index: Box<Expr>,
    },
    Intrinsic {
        name: String,
        args: Vec<Expr>,
    },
    Sample {
        dist: String,
        params: Vec<Expr>,
    },
}

impl Program {
    pub fn function(&self, name: &str) -> Option<&Function> {
        self.functions.iter().find(|f| f.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn span_escapes_pointer_tokens() {
        let s = Span::root().child("functions").index(2).child("a/b~c");
        assert_eq!(s.as_str(), "/functions/2/a~1b~0c");
        assert_eq!(Span::root().to_string(), "/");
    }

    #[test]
    fn operator_symbols_round_trip() {
        for op in BinaryOp::ALL {
            assert_eq!(BinaryOp::from_symbol(op.symbol()), Some(op));
        }
        assert_eq!(UnaryOp::from_symbol("!"), Some(UnaryOp::Not));
        assert_eq!(BinaryOp::from_symbol("**"), None);
    }
}
