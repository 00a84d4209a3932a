//! Builder functions for constructing typed condition trees directly,
//! mirroring what a C front end would hand the classifier. `binary`, `and`
//! and `or` insert the implicit integer promotions and usual arithmetic
//! conversions a front end performs, so trees built here render the same
//! way parsed or toolchain-supplied trees do.

use crate::ast::{BinOp, Expr, ExprKind};
use crate::types::CType;

pub fn var(name: impl Into<String>, ty: CType) -> Expr {
    Expr::new(ExprKind::Var { name: name.into() }, ty)
}

pub fn lit(value: i64) -> Expr {
    Expr::new(
        ExprKind::IntLit {
            text: value.to_string(),
            value: value as i128,
        },
        CType::int(),
    )
}

pub fn str_lit(text: impl Into<String>) -> Expr {
    Expr::new(ExprKind::StrLit { value: text.into() }, CType::char_ptr())
}

pub fn null() -> Expr {
    Expr::new(ExprKind::Null, CType::void_ptr())
}

pub fn cast(ty: CType, inner: Expr) -> Expr {
    Expr::new(
        ExprKind::Cast {
            inner: Box::new(inner),
        },
        ty,
    )
}

pub fn addr_of(inner: Expr) -> Expr {
    let ty = CType::pointer_to(inner.ty.clone());
    Expr::new(
        ExprKind::AddrOf {
            inner: Box::new(inner),
        },
        ty,
    )
}

pub fn call(name: impl Into<String>, ret: CType, args: Vec<Expr>) -> Expr {
    Expr::new(
        ExprKind::Call {
            name: name.into(),
            args,
        },
        ret,
    )
}

pub fn opaque(text: impl Into<String>, ty: CType) -> Expr {
    Expr::new(ExprKind::Opaque { text: text.into() }, ty)
}

/// Wraps `expr` in an implicit conversion to `ty` unless it already has
/// that type.
pub fn convert(ty: CType, expr: Expr) -> Expr {
    if expr.ty == ty {
        return expr;
    }
    Expr::new(
        ExprKind::Convert {
            inner: Box::new(expr),
        },
        ty,
    )
}

pub fn binary(op: BinOp, left: Expr, right: Expr) -> Expr {
    let (left, right, operand_ty) = converted_operands(left, right);
    let result_ty = if op.is_comparison() {
        CType::int()
    } else {
        operand_ty
    };
    Expr::new(
        ExprKind::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        },
        result_ty,
    )
}

pub fn eq(left: Expr, right: Expr) -> Expr {
    binary(BinOp::Eq, left, right)
}

pub fn ne(left: Expr, right: Expr) -> Expr {
    binary(BinOp::Ne, left, right)
}

pub fn lt(left: Expr, right: Expr) -> Expr {
    binary(BinOp::Lt, left, right)
}

pub fn gt(left: Expr, right: Expr) -> Expr {
    binary(BinOp::Gt, left, right)
}

pub fn add(left: Expr, right: Expr) -> Expr {
    binary(BinOp::Add, left, right)
}

pub fn and(left: Expr, right: Expr) -> Expr {
    Expr::new(
        ExprKind::And {
            left: Box::new(left),
            right: Box::new(right),
        },
        CType::int(),
    )
}

pub fn or(left: Expr, right: Expr) -> Expr {
    Expr::new(
        ExprKind::Or {
            left: Box::new(left),
            right: Box::new(right),
        },
        CType::int(),
    )
}

fn converted_operands(left: Expr, right: Expr) -> (Expr, Expr, CType) {
    if left.ty.is_int() && right.ty.is_int() {
        let common = left.ty.common_with(&right.ty);
        let l = convert(common.clone(), left);
        let r = convert(common.clone(), right);
        (l, r, common)
    } else {
        // Pointer operands are compared as-is; no conversion is rendered.
        let ty = left.ty.clone();
        (left, right, ty)
    }
}
