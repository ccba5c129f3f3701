//! Owned syntax tree of the unit language
//!
//! Produced by [`crate::lower`] from the tree-sitter CST. Everything in here
//! already passed the capability checks, so the interpreter never needs to
//! look at source text again.

use generative_artifact::Value;
use std::sync::Arc;

/// A function definition (top-level, nested or lambda)
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDef {
    pub name: String,
    pub params: Vec<Param>,
    pub body: Vec<Stmt>,
    pub line: usize,
}

impl FunctionDef {
    /// Number of parameters that can be filled positionally
    #[must_use]
    pub fn positional_arity(&self) -> usize {
        self.params
            .iter()
            .take_while(|p| p.kind == ParamKind::Positional)
            .count()
    }
}

/// How a parameter binds arguments
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    /// Ordinary parameter, fillable by position or keyword
    Positional,
    /// Keyword-only parameter (after `*` or `*args`)
    KeywordOnly,
    /// `*args`
    VarArgs,
    /// `**kwargs`
    VarKwargs,
}

/// One parameter of a function definition
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub kind: ParamKind,
    pub default: Option<Expr>,
}

/// Statement plus the line it starts on
#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
    pub line: usize,
    pub kind: StmtKind,
}

/// Statement forms of the unit language
#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    Expr(Expr),
    /// `a = b = value`; targets assigned left to right
    Assign { targets: Vec<Target>, value: Expr },
    AugAssign { target: Target, op: BinOp, value: Expr },
    Return(Option<Expr>),
    If {
        branches: Vec<(Expr, Vec<Stmt>)>,
        orelse: Vec<Stmt>,
    },
    For {
        target: Target,
        iter: Expr,
        body: Vec<Stmt>,
        orelse: Vec<Stmt>,
    },
    While {
        test: Expr,
        body: Vec<Stmt>,
        orelse: Vec<Stmt>,
    },
    Break,
    Continue,
    Pass,
    /// `raise Class(message)`; `None` class re-raises
    Raise {
        class: Option<String>,
        message: Option<Expr>,
    },
    Assert { test: Expr, message: Option<Expr> },
    FunctionDef(Arc<FunctionDef>),
    /// `import module [as alias]`
    Import { module: String, alias: String },
    /// `from module import name [as alias], ...`
    ImportFrom {
        module: String,
        names: Vec<(String, String)>,
    },
}

/// Assignment target
#[derive(Debug, Clone, PartialEq)]
pub enum Target {
    /// Named variable, optionally indexed: `x`, `x[i]`, `x[i][j]`
    Place { root: String, path: Vec<Expr> },
    /// Destructuring: `a, b` or `(a, b)` or `[a, b]`
    Unpack(Vec<Target>),
}

impl Target {
    /// Assignment target naming a plain variable
    #[must_use]
    pub fn name(root: impl Into<String>) -> Self {
        Self::Place {
            root: root.into(),
            path: Vec::new(),
        }
    }
}

/// Binary arithmetic and bitwise operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Mod,
    Pow,
    BitAnd,
    BitOr,
    BitXor,
    LShift,
    RShift,
}

impl BinOp {
    /// Operator from its source token
    #[must_use]
    pub fn from_token(token: &str) -> Option<Self> {
        let op = match token.trim_end_matches('=') {
            "+" => Self::Add,
            "-" => Self::Sub,
            "*" => Self::Mul,
            "/" => Self::Div,
            "//" => Self::FloorDiv,
            "%" => Self::Mod,
            "**" => Self::Pow,
            "&" => Self::BitAnd,
            "|" => Self::BitOr,
            "^" => Self::BitXor,
            "<<" => Self::LShift,
            ">>" => Self::RShift,
            _ => return None,
        };
        Some(op)
    }

    /// Operator as written in source
    #[must_use]
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::FloorDiv => "//",
            Self::Mod => "%",
            Self::Pow => "**",
            Self::BitAnd => "&",
            Self::BitOr => "|",
            Self::BitXor => "^",
            Self::LShift => "<<",
            Self::RShift => ">>",
        }
    }
}

/// Unary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Pos,
    Invert,
    Not,
}

/// Short-circuiting boolean operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoolOp {
    And,
    Or,
}

/// Comparison operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    NotEq,
    Lt,
    LtE,
    Gt,
    GtE,
    In,
    NotIn,
    Is,
    IsNot,
}

impl CmpOp {
    /// Operator for a comparison token, if it is one
    #[must_use]
    pub fn from_token(token: &str) -> Option<Self> {
        let normalized = token.split_whitespace().collect::<Vec<_>>().join(" ");
        let op = match normalized.as_str() {
            "==" => Self::Eq,
            "!=" | "<>" => Self::NotEq,
            "<" => Self::Lt,
            "<=" => Self::LtE,
            ">" => Self::Gt,
            ">=" => Self::GtE,
            "in" => Self::In,
            "not in" => Self::NotIn,
            "is" => Self::Is,
            "is not" => Self::IsNot,
            _ => return None,
        };
        Some(op)
    }
}

/// Call argument
#[derive(Debug, Clone, PartialEq)]
pub enum Arg {
    Positional(Expr),
    Keyword(String, Expr),
    /// `*iterable`
    Splat(Expr),
    /// `**mapping`
    KwSplat(Expr),
}

/// Comprehension clause, in source order
#[derive(Debug, Clone, PartialEq)]
pub enum Clause {
    For { target: Target, iter: Expr },
    If(Expr),
}

/// Expression forms of the unit language
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Const(Value),
    Name(String),
    Binary {
        op: BinOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Bool {
        op: BoolOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    /// `a < b <= c`
    Compare {
        first: Box<Expr>,
        rest: Vec<(CmpOp, Expr)>,
    },
    IfExp {
        test: Box<Expr>,
        body: Box<Expr>,
        orelse: Box<Expr>,
    },
    Call {
        func: Box<Expr>,
        args: Vec<Arg>,
    },
    /// `receiver.name(args)`
    Method {
        receiver: Box<Expr>,
        name: String,
        args: Vec<Arg>,
    },
    /// `value.name` outside a call (module constants and functions)
    Attribute {
        value: Box<Expr>,
        name: String,
    },
    Subscript {
        value: Box<Expr>,
        index: Box<Expr>,
    },
    Slice {
        value: Box<Expr>,
        lower: Option<Box<Expr>>,
        upper: Option<Box<Expr>>,
        step: Option<Box<Expr>>,
    },
    List(Vec<Expr>),
    Tuple(Vec<Expr>),
    Dict(Vec<(Expr, Expr)>),
    ListComp {
        element: Box<Expr>,
        clauses: Vec<Clause>,
    },
    DictComp {
        key: Box<Expr>,
        value: Box<Expr>,
        clauses: Vec<Clause>,
    },
    Lambda(Arc<FunctionDef>),
}

impl Expr {
    /// Named place this expression denotes, if any (`xs`, `grid[i][j]`)
    #[must_use]
    pub fn as_place(&self) -> Option<(&str, Vec<&Expr>)> {
        match self {
            Expr::Name(name) => Some((name.as_str(), Vec::new())),
            Expr::Subscript { value, index } => {
                let (root, mut path) = value.as_place()?;
                path.push(index);
                Some((root, path))
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operator_tokens() {
        assert_eq!(BinOp::from_token("//="), Some(BinOp::FloorDiv));
        assert_eq!(BinOp::from_token("**"), Some(BinOp::Pow));
        assert_eq!(CmpOp::from_token("not  in"), Some(CmpOp::NotIn));
        assert_eq!(CmpOp::from_token("is not"), Some(CmpOp::IsNot));
        assert_eq!(CmpOp::from_token("=>"), None);
    }

    #[test]
    fn nested_subscript_is_a_place() {
        let expr = Expr::Subscript {
            value: Box::new(Expr::Subscript {
                value: Box::new(Expr::Name("grid".into())),
                index: Box::new(Expr::Const(Value::Int(0))),
            }),
            index: Box::new(Expr::Const(Value::Int(1))),
        };
        let (root, path) = expr.as_place().unwrap();
        assert_eq!(root, "grid");
        assert_eq!(path.len(), 2);
        assert!(Expr::Const(Value::None).as_place().is_none());
    }
}
