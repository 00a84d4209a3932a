//! The failure reporter: assembles the report from the classified tree and
//! the record table, writes the five-part text protocol through a flushing
//! sink, and drives the abnormal-termination path.
//!
//! Protocol (order is load-bearing):
//!
//! ```text
//! > assert(<original source text>)
//! A assert(<symbolic reconstruction>)
//! E assert(<values substituted, "..." for unreached>)
//! > subexpressions:
//!   <text> = <value>
//! ```

use std::io::Write;

use crate::classify::ExprTree;
use crate::color;
use crate::eval::Recording;
use crate::render;

#[derive(Clone, Copy, Debug, Default)]
pub struct ReportStyle {
    /// Emit ANSI color escapes linking each record across the A line, the
    /// E line and the subexpression list.
    pub color: bool,
}

#[derive(Clone, Debug, serde::Serialize)]
pub struct SubexprLine {
    pub text: String,
    pub value: String,
}

#[derive(Clone, Debug, serde::Serialize)]
pub struct FailureReport {
    /// Original condition text as written at the assertion site.
    pub source: String,
    /// `assert(...)` with the symbolic A form.
    pub a_line: String,
    /// `assert(...)` with the value-substituted E form.
    pub e_line: String,
    pub subexpressions: Vec<SubexprLine>,
}

pub fn build_report(
    source: &str,
    tree: &ExprTree,
    recording: &mut Recording,
    style: ReportStyle,
) -> FailureReport {
    let pruned = recording.pruned(tree);
    color::assign_colors(tree, recording, &pruned);

    let a = render::render_a(tree, recording, style.color);
    let e = render::render_e(tree, recording, &pruned, style.color);

    let mut subexpressions: Vec<SubexprLine> = Vec::new();
    for rec in recording.records() {
        if pruned[rec.node.index()] || rec.text.is_empty() {
            continue;
        }
        let duplicate = subexpressions
            .iter()
            .any(|line| strip_sgr(&line.text) == rec.text && strip_sgr(&line.value) == rec.value_text);
        if duplicate {
            continue;
        }
        let (text, value) = if style.color {
            match rec.color {
                Some(c) => (
                    format!("{}{}{}", c.escape(), rec.text, color::RESET),
                    format!("{}{}{}", c.escape(), rec.value_text, color::RESET),
                ),
                None => (rec.text.clone(), rec.value_text.clone()),
            }
        } else {
            (rec.text.clone(), rec.value_text.clone())
        };
        subexpressions.push(SubexprLine { text, value });
    }

    FailureReport {
        source: source.to_string(),
        a_line: format!("assert({a})"),
        e_line: format!("assert({e})"),
        subexpressions,
    }
}

/// Removes SGR escape sequences so colored output compares equal to plain.
pub fn strip_sgr(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find('\x1b') {
        out.push_str(&rest[..start]);
        match rest[start..].find('m') {
            Some(end) => rest = &rest[start + end + 1..],
            None => {
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

impl FailureReport {
    /// Writes the protocol and flushes, so the report survives even if the
    /// subsequent termination raises a signal.
    pub fn write_to(&self, w: &mut dyn Write) -> std::io::Result<()> {
        writeln!(w, "> assert({})", self.source)?;
        writeln!(w, "A {}", self.a_line)?;
        writeln!(w, "E {}", self.e_line)?;
        writeln!(w, "> subexpressions:")?;
        for line in &self.subexpressions {
            writeln!(w, "  {} = {}", line.text, line.value)?;
        }
        w.flush()
    }

    pub fn to_lines(&self) -> Vec<String> {
        let mut buf = Vec::new();
        // Writing to a Vec cannot fail.
        self.write_to(&mut buf).expect("in-memory write");
        String::from_utf8_lossy(&buf)
            .lines()
            .map(str::to_string)
            .collect()
    }
}

/// Prints the report to stdout and terminates the process the way the
/// augmented assertion primitive would.
pub fn fail_and_abort(report: &FailureReport) -> ! {
    let stdout = std::io::stdout();
    let mut lock = stdout.lock();
    // Termination is imminent either way; a failed write must not keep the
    // process alive.
    let _ = report.write_to(&mut lock);
    drop(lock);
    std::process::abort()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::classify;
    use crate::dsl;
    use crate::env::MapEnv;
    use crate::eval::record;
    use crate::types::CType;

    fn failing_report(style: ReportStyle) -> FailureReport {
        let e = dsl::eq(dsl::var("n", CType::int()), dsl::lit(5));
        let tree = classify(&e);
        let mut env = MapEnv::new().with_int("n", 3);
        let mut rec = record(&tree, &mut env).unwrap();
        build_report("n == 5", &tree, &mut rec, style)
    }

    #[test]
    fn protocol_lines_in_order() {
        let report = failing_report(ReportStyle::default());
        assert_eq!(
            report.to_lines(),
            vec![
                "> assert(n == 5)",
                "A assert(n == 5)",
                "E assert(3 == 5)",
                "> subexpressions:",
                "  n = 3",
            ]
        );
    }

    #[test]
    fn colored_output_strips_to_plain() {
        let plain = failing_report(ReportStyle::default());
        let colored = failing_report(ReportStyle { color: true });
        let stripped: Vec<String> = colored
            .to_lines()
            .iter()
            .map(|l| strip_sgr(l))
            .collect();
        assert_eq!(stripped, plain.to_lines());
    }

    #[test]
    fn duplicate_subexpression_lines_are_deduplicated() {
        // n == n evaluates n twice (two records) but lists it once.
        let e = dsl::ne(
            dsl::var("n", CType::int()),
            dsl::var("n", CType::int()),
        );
        let tree = classify(&e);
        let mut env = MapEnv::new().with_int("n", 3);
        let mut rec = record(&tree, &mut env).unwrap();
        let report = build_report("n != n", &tree, &mut rec, ReportStyle::default());
        assert_eq!(report.subexpressions.len(), 1);
        assert_eq!(report.e_line, "assert(3 != 3)");
    }

    #[test]
    fn report_serializes_to_json() {
        let report = failing_report(ReportStyle::default());
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["a_line"], "assert(n == 5)");
        assert_eq!(json["subexpressions"][0]["text"], "n");
        assert_eq!(json["subexpressions"][0]["value"], "3");
    }
}
