//! Abstract Syntax Tree types for action scripts.
//!
//! The validator builds these incrementally, one logical line at a time, and
//! the interpreter walks the finished tree. Every node carries the absolute
//! byte span of the text it came from so diagnostics and runtime faults can
//! point back into the script.

use std::fmt;
use std::ops::Range;
use std::sync::Arc;

/// Absolute byte range into the assembled script.
pub type Span = Range<usize>;

/// A complete script: the top-level statement list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Program {
    pub body: Vec<Stmt>,
}

/// A statement and the span of its first logical line.
#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
    pub kind: StmtKind,
    pub span: Span,
}

impl Stmt {
    pub fn new(kind: StmtKind, span: Span) -> Self {
        Self { kind, span }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    /// Bare expression, usually a call: `print(x)`
    Expr(Expr),
    /// `target = value`
    Assign { target: Target, value: Expr },
    /// `target += value`
    AugAssign {
        target: Target,
        op: BinaryOp,
        value: Expr,
    },
    /// `if`/`elif` chain with optional `else`
    If {
        branches: Vec<Branch>,
        orelse: Option<Vec<Stmt>>,
    },
    /// `for a, b in iter:`
    For {
        targets: Vec<Ident>,
        iter: Expr,
        body: Vec<Stmt>,
    },
    /// `while cond:`
    While { cond: Expr, body: Vec<Stmt> },
    /// `def name(params):`
    FunctionDef(Arc<FunctionDef>),
    Return(Option<Expr>),
    Break,
    Continue,
    Pass,
}

/// One `if` or `elif` arm.
#[derive(Debug, Clone, PartialEq)]
pub struct Branch {
    pub cond: Expr,
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDef {
    pub name: Ident,
    pub params: Vec<Param>,
    pub body: Vec<Stmt>,
}

impl FunctionDef {
    /// Number of parameters without a default value.
    pub fn required_params(&self) -> usize {
        self.params.iter().filter(|p| p.default.is_none()).count()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: Ident,
    pub default: Option<Expr>,
}

/// A name together with where it was written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ident {
    pub name: String,
    pub span: Span,
}

/// The left-hand side of an assignment.
#[derive(Debug, Clone, PartialEq)]
pub enum Target {
    Name(Ident),
    Subscript { object: Expr, index: Expr },
    Tuple(Vec<Ident>),
}

impl Target {
    /// Convert a parsed expression into an assignment target.
    pub fn from_expr(expr: Expr) -> Result<Self, String> {
        match expr.kind {
            ExprKind::Name(name) => Ok(Target::Name(Ident {
                name,
                span: expr.span,
            })),
            ExprKind::Subscript { object, index } => Ok(Target::Subscript {
                object: *object,
                index: *index,
            }),
            ExprKind::Tuple(items) => items
                .into_iter()
                .map(|item| match item.kind {
                    ExprKind::Name(name) => Ok(Ident {
                        name,
                        span: item.span,
                    }),
                    _ => Err("can only unpack into plain names".to_string()),
                })
                .collect::<Result<Vec<_>, _>>()
                .map(Target::Tuple),
            _ => Err("cannot assign to expression".to_string()),
        }
    }

    /// Names this target binds.
    pub fn bound_names(&self) -> Vec<&Ident> {
        match self {
            Target::Name(ident) => vec![ident],
            Target::Subscript { .. } => Vec::new(),
            Target::Tuple(idents) => idents.iter().collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,
}

impl Expr {
    pub fn new(kind: ExprKind, span: Span) -> Self {
        Self { kind, span }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Literal(Literal),
    /// `f"text {expr:spec}"`
    FString(Vec<FStringPart>),
    Name(String),
    List(Vec<Expr>),
    Tuple(Vec<Expr>),
    Dict(Vec<(Expr, Expr)>),
    Call {
        func: Box<Expr>,
        args: Vec<Expr>,
        kwargs: Vec<(Ident, Expr)>,
    },
    Attribute {
        object: Box<Expr>,
        attr: Ident,
    },
    Subscript {
        object: Box<Expr>,
        index: Box<Expr>,
    },
    Slice {
        object: Box<Expr>,
        lower: Option<Box<Expr>>,
        upper: Option<Box<Expr>>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        left: Box<Expr>,
        op: BinaryOp,
        right: Box<Expr>,
    },
    Compare {
        left: Box<Expr>,
        op: CompareOp,
        right: Box<Expr>,
    },
    Logical {
        left: Box<Expr>,
        op: LogicalOp,
        right: Box<Expr>,
    },
    /// `then if cond else orelse`
    IfElse {
        cond: Box<Expr>,
        then: Box<Expr>,
        orelse: Box<Expr>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum FStringPart {
    Text(String),
    Field { expr: Expr, spec: Option<String> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Pos,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Mod,
    Pow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    NotEq,
    Lt,
    Gt,
    LtEq,
    GtEq,
    In,
    NotIn,
    Is,
    IsNot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BinaryOp::Add => write!(f, "+"),
            BinaryOp::Sub => write!(f, "-"),
            BinaryOp::Mul => write!(f, "*"),
            BinaryOp::Div => write!(f, "/"),
            BinaryOp::FloorDiv => write!(f, "//"),
            BinaryOp::Mod => write!(f, "%"),
            BinaryOp::Pow => write!(f, "**"),
        }
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompareOp::Eq => write!(f, "=="),
            CompareOp::NotEq => write!(f, "!="),
            CompareOp::Lt => write!(f, "<"),
            CompareOp::Gt => write!(f, ">"),
            CompareOp::LtEq => write!(f, "<="),
            CompareOp::GtEq => write!(f, ">="),
            CompareOp::In => write!(f, "in"),
            CompareOp::NotIn => write!(f, "not in"),
            CompareOp::Is => write!(f, "is"),
            CompareOp::IsNot => write!(f, "is not"),
        }
    }
}
