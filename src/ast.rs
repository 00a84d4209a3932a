//! The host-facing typed expression tree.
//!
//! This is the narrow adapter surface between whatever front end supplies a
//! typed condition (the bundled parser, the builder DSL, or a real
//! toolchain binding) and the classifier. Implicit conversions inserted by
//! the front end appear as `Convert`, explicit source-level casts as
//! `Cast`; the classifier treats the two differently.

use crate::types::CType;

#[derive(Clone, Debug, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub ty: CType,
}

#[derive(Clone, Debug, PartialEq)]
pub enum ExprKind {
    Var {
        name: String,
    },
    IntLit {
        text: String,
        value: i128,
    },
    StrLit {
        value: String,
    },
    Null,
    /// Implicit conversion (promotion or usual arithmetic conversion).
    Convert {
        inner: Box<Expr>,
    },
    /// Explicit source-level cast; the target type is `Expr::ty`.
    Cast {
        inner: Box<Expr>,
    },
    AddrOf {
        inner: Box<Expr>,
    },
    Binary {
        op: BinOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    And {
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Or {
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Call {
        name: String,
        args: Vec<Expr>,
    },
    /// A shape the classifier does not model (member access, subscript).
    /// Carries its original source text.
    Opaque {
        text: String,
    },
    /// A subtree already rejected by earlier host analysis.
    Error,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize)]
pub enum BinOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

impl BinOp {
    pub fn as_str(self) -> &'static str {
        match self {
            BinOp::Eq => "==",
            BinOp::Ne => "!=",
            BinOp::Lt => "<",
            BinOp::Le => "<=",
            BinOp::Gt => ">",
            BinOp::Ge => ">=",
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Rem => "%",
        }
    }

    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinOp::Eq | BinOp::Ne | BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge
        )
    }

    /// Binding strength among the arithmetic operators; comparisons bind
    /// weakest of the modelled binary shapes.
    pub fn precedence(self) -> u8 {
        match self {
            BinOp::Mul | BinOp::Div | BinOp::Rem => 5,
            BinOp::Add | BinOp::Sub => 4,
            _ => 3,
        }
    }
}

impl Expr {
    pub fn new(kind: ExprKind, ty: CType) -> Self {
        Self { kind, ty }
    }

    /// True if any node of this expression carries a host error mark.
    /// Checked before any rewrite work begins.
    pub fn contains_error(&self) -> bool {
        match &self.kind {
            ExprKind::Error => true,
            ExprKind::Convert { inner } | ExprKind::Cast { inner } | ExprKind::AddrOf { inner } => {
                inner.contains_error()
            }
            ExprKind::Binary { left, right, .. }
            | ExprKind::And { left, right }
            | ExprKind::Or { left, right } => left.contains_error() || right.contains_error(),
            ExprKind::Call { args, .. } => args.iter().any(Expr::contains_error),
            _ => false,
        }
    }
}
