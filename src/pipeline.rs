//! Build-time and run-time orchestration for one assertion occurrence:
//! the previous-error gate, classification into an [`AssertionSite`], and
//! the evaluate → report → abort sequence.

use std::io::Write;

use tracing::{debug, instrument, warn};

use crate::ast::Expr;
use crate::classify::{classify, ExprTree};
use crate::error::IntrospectResult;
use crate::eval::{record, Env};
use crate::report::{build_report, fail_and_abort, FailureReport, ReportStyle};

/// Fixed phrase emitted when the rewrite is skipped; the surrounding build
/// still fails for the original reason, this is additive context only.
pub const PREVIOUS_ERROR_DIAGNOSTIC: &str =
    "not rewriting assertion: expression contains a previous error";

/// The host's diagnostic-reporting facility.
pub trait Diagnostics {
    fn note(&mut self, message: &str);
}

/// Collects diagnostics in memory; the test-facing implementation.
#[derive(Debug, Default)]
pub struct CollectDiagnostics {
    pub messages: Vec<String>,
}

impl Diagnostics for CollectDiagnostics {
    fn note(&mut self, message: &str) {
        self.messages.push(message.to_string());
    }
}

/// Forwards diagnostics to the tracing subscriber.
#[derive(Debug, Default)]
pub struct LogDiagnostics;

impl Diagnostics for LogDiagnostics {
    fn note(&mut self, message: &str) {
        warn!("{message}");
    }
}

/// One rewritten assertion occurrence: the classified tree plus the
/// original condition text, built once and immutable afterwards.
#[derive(Clone, Debug)]
pub struct AssertionSite {
    source: String,
    tree: ExprTree,
}

/// The build-time step. Returns `None` when any part of the expression
/// carries a prior error mark, after emitting the skip diagnostic; the
/// occurrence is then left exactly as the host produced it.
#[instrument(skip(expr, diagnostics))]
pub fn rewrite(
    source: &str,
    expr: &Expr,
    diagnostics: &mut dyn Diagnostics,
) -> Option<AssertionSite> {
    if expr.contains_error() {
        diagnostics.note(PREVIOUS_ERROR_DIAGNOSTIC);
        return None;
    }
    let tree = classify(expr);
    debug!(nodes = tree.len(), "classified assertion condition");
    Some(AssertionSite {
        source: source.to_string(),
        tree,
    })
}

/// Outcome of one run-time evaluation of a site.
#[derive(Clone, Debug)]
pub enum Outcome {
    Passed,
    Failed(FailureReport),
}

impl AssertionSite {
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn tree(&self) -> &ExprTree {
        &self.tree
    }

    /// Evaluates the condition with original semantics; on failure the
    /// full report is built but nothing is printed.
    #[instrument(skip_all)]
    pub fn evaluate(&self, env: &mut dyn Env, style: ReportStyle) -> IntrospectResult<Outcome> {
        let mut recording = record(&self.tree, env)?;
        if recording.passed() {
            return Ok(Outcome::Passed);
        }
        let report = build_report(&self.source, &self.tree, &mut recording, style);
        Ok(Outcome::Failed(report))
    }

    /// Evaluates and, on failure, writes the report to `w`. Returns whether
    /// the condition held.
    pub fn check(
        &self,
        env: &mut dyn Env,
        style: ReportStyle,
        w: &mut dyn Write,
    ) -> IntrospectResult<bool> {
        match self.evaluate(env, style)? {
            Outcome::Passed => Ok(true),
            Outcome::Failed(report) => {
                report.write_to(w)?;
                Ok(false)
            }
        }
    }

    /// The full assertion semantics: report and abort on failure.
    pub fn enforce(&self, env: &mut dyn Env, style: ReportStyle) -> IntrospectResult<()> {
        match self.evaluate(env, style)? {
            Outcome::Passed => Ok(()),
            Outcome::Failed(report) => fail_and_abort(&report),
        }
    }
}
