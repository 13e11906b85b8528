//! Expression trees over positionally indexed sources.
//!
//! Expressions never name sources; they hold indices into the query's
//! source arena. That keeps every tree position-independent: planning can
//! append sources (association expansion) without rewriting clause trees
//! that reference earlier ones.

use serde::{Deserialize, Serialize};

use crate::types::{SemanticType, Value};

// =============================================================================
// Operators
// =============================================================================

/// Binary operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinaryOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    Add,
    Sub,
    Mul,
    Div,
    Like,
    /// Membership test: right-hand side is a list, span, or pinned list.
    In,
}

impl BinaryOp {
    /// Whether this operator compares a left-hand field against a
    /// right-hand value, making the field's type authoritative for casts.
    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            BinaryOp::Eq | BinaryOp::Ne | BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge
        )
    }
}

/// Unary operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnaryOp {
    Not,
    Neg,
    IsNull,
}

// =============================================================================
// Placeholders
// =============================================================================

/// The payload attached to a placeholder (`^value` in the surface syntax).
///
/// The shape matters: a scalar payload is valid in value position, a list
/// payload only on the right of a membership test, and an expression
/// payload in neither (the builder layer should have spliced it).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Pin {
    Value(Value),
    List(Vec<Value>),
    Expr(Box<Expr>),
}

/// One part of a raw fragment: literal text or an interpolated expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FragmentPart {
    Raw(String),
    Expr(Expr),
}

// =============================================================================
// Expr
// =============================================================================

/// An expression node.
///
/// Placeholder lifecycle: the builder layer produces `Pinned` nodes;
/// planning replaces each with `Param` (scalar) or `ParamSpan` (list
/// membership) while appending the cast+dumped payloads to the flat
/// parameter list. A normalized query contains no `Pinned` nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    /// Field access: source index + field name.
    Field { source: usize, name: String },

    /// Caller-authored literal embedded in the query.
    Literal(Value),

    /// Placeholder carrying its runtime payload; consumed by planning.
    Pinned(Pin),

    /// Positional reference into the flat parameter list.
    Param(usize),

    /// A contiguous run of parameters, rendered `^(start, count)`.
    /// Produced from list placeholders in membership position.
    ParamSpan { start: usize, count: usize },

    /// In-place list of expressions (membership right-hand side).
    List(Vec<Expr>),

    /// Explicit type tag: `type(expr, ty)`.
    Tagged {
        expr: Box<Expr>,
        ty: SemanticType,
    },

    Unary {
        op: UnaryOp,
        expr: Box<Expr>,
    },

    Binary {
        left: Box<Expr>,
        op: BinaryOp,
        right: Box<Expr>,
    },

    /// Function or operator application by name.
    Call { name: String, args: Vec<Expr> },

    /// Raw fragment with interpolated parts.
    Fragment(Vec<FragmentPart>),

    /// Window application: `expr OVER window_name`.
    Over {
        expr: Box<Expr>,
        window: String,
    },
}

impl Expr {
    /// Field access on a source binding.
    pub fn field(source: usize, name: impl Into<String>) -> Self {
        Expr::Field {
            source,
            name: name.into(),
        }
    }

    /// Literal value.
    pub fn literal(value: impl Into<Value>) -> Self {
        Expr::Literal(value.into())
    }

    /// Scalar placeholder.
    pub fn pinned(value: impl Into<Value>) -> Self {
        Expr::Pinned(Pin::Value(value.into()))
    }

    /// List placeholder (membership right-hand side).
    pub fn pinned_list(values: impl IntoIterator<Item = Value>) -> Self {
        Expr::Pinned(Pin::List(values.into_iter().collect()))
    }

    /// Explicit type tag.
    pub fn tagged(expr: Expr, ty: SemanticType) -> Self {
        Expr::Tagged {
            expr: Box::new(expr),
            ty,
        }
    }

    pub fn binary(left: Expr, op: BinaryOp, right: Expr) -> Self {
        Expr::Binary {
            left: Box::new(left),
            op,
            right: Box::new(right),
        }
    }

    pub fn eq(left: Expr, right: Expr) -> Self {
        Expr::binary(left, BinaryOp::Eq, right)
    }

    pub fn and(left: Expr, right: Expr) -> Self {
        Expr::binary(left, BinaryOp::And, right)
    }

    /// Membership test: `left in right`.
    pub fn is_in(left: Expr, right: Expr) -> Self {
        Expr::binary(left, BinaryOp::In, right)
    }

    /// Boolean TRUE, used as the neutral `on` condition.
    pub fn true_lit() -> Self {
        Expr::Literal(Value::Bool(true))
    }
}

// =============================================================================
// Diagnostic rendering
// =============================================================================

impl std::fmt::Display for Expr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Expr::Field { source, name } => write!(f, "s{}.{}", source, name),
            Expr::Literal(v) => write!(f, "{}", v),
            Expr::Pinned(Pin::Value(v)) => write!(f, "^{}", v),
            Expr::Pinned(Pin::List(vs)) => write!(f, "^{}", Value::List(vs.clone())),
            Expr::Pinned(Pin::Expr(e)) => write!(f, "^({})", e),
            Expr::Param(ix) => write!(f, "^{}", ix),
            Expr::ParamSpan { start, count } => write!(f, "^({}, {})", start, count),
            Expr::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            Expr::Tagged { expr, ty } => write!(f, "type({}, {})", expr, ty),
            Expr::Unary { op, expr } => match op {
                UnaryOp::Not => write!(f, "not({})", expr),
                UnaryOp::Neg => write!(f, "-({})", expr),
                UnaryOp::IsNull => write!(f, "is_null({})", expr),
            },
            Expr::Binary { left, op, right } => {
                let sym = match op {
                    BinaryOp::Eq => "==",
                    BinaryOp::Ne => "!=",
                    BinaryOp::Lt => "<",
                    BinaryOp::Le => "<=",
                    BinaryOp::Gt => ">",
                    BinaryOp::Ge => ">=",
                    BinaryOp::And => "and",
                    BinaryOp::Or => "or",
                    BinaryOp::Add => "+",
                    BinaryOp::Sub => "-",
                    BinaryOp::Mul => "*",
                    BinaryOp::Div => "/",
                    BinaryOp::Like => "like",
                    BinaryOp::In => "in",
                };
                write!(f, "{} {} {}", left, sym, right)
            }
            Expr::Call { name, args } => {
                write!(f, "{}(", name)?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", arg)?;
                }
                write!(f, ")")
            }
            Expr::Fragment(parts) => {
                write!(f, "fragment(")?;
                for part in parts {
                    match part {
                        FragmentPart::Raw(s) => write!(f, "{}", s)?,
                        FragmentPart::Expr(e) => write!(f, "{}", e)?,
                    }
                }
                write!(f, ")")
            }
            Expr::Over { expr, window } => write!(f, "{} over {}", expr, window),
        }
    }
}
