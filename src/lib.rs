//! Assertion rewriting and introspection for C-style conditions.
//!
//! When an instrumented `assert` fires, this crate reconstructs what the
//! programmer wrote, substitutes the values that were actually computed,
//! and lists every evaluated subexpression, before terminating the process
//! the way the original assertion would have.
//!
//! # Pipeline overview
//!
//! 1. **Adapt**: a front end ([`parse`], the [`dsl`] builders, or a
//!    toolchain binding) supplies a typed [`ast::Expr`]
//! 2. **Rewrite**: [`pipeline::rewrite`] refuses trees with prior error
//!    marks and classifies the rest into an arena [`classify::ExprTree`]
//! 3. **Record**: [`eval::record`] evaluates with original semantics
//!    (short-circuit preserved, each operand computed exactly once) and
//!    captures every reached subexpression in evaluation order
//! 4. **Report**: [`report::build_report`] renders the symbolic A form and
//!    the value-substituted E form, prunes irrelevant branches, assigns
//!    colors and writes the failure protocol
//!
//! The key design constraints:
//!
//! - **No unsafe**: `unsafe` is forbidden in this crate.
//! - **Original semantics**: instrumentation never changes what the
//!   condition computes, only what is remembered about it.
//! - **Deterministic output**: one recording renders byte-identically
//!   however many times it is displayed.
#![forbid(unsafe_code)]

pub mod ast;
pub mod classify;
pub mod color;
pub mod dsl;
pub mod env;
pub mod error;
pub mod eval;
pub mod parse;
pub mod pipeline;
pub mod render;
pub mod report;
pub mod types;
pub mod value;

pub use ast::{BinOp, Expr, ExprKind};
pub use classify::{ExprTree, NodeId};
pub use env::MapEnv;
pub use error::{IntrospectError, IntrospectResult};
pub use eval::{record, Env, EvalRecord, Recording};
pub use parse::{parse_condition, Scope};
pub use pipeline::{rewrite, AssertionSite, Diagnostics, Outcome, PREVIOUS_ERROR_DIAGNOSTIC};
pub use report::{build_report, FailureReport, ReportStyle};
pub use types::{CType, IntWidth};
pub use value::Value;
