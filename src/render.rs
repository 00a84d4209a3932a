//! Renders the two parallel forms of a classified condition from one
//! recursive walk: the symbolic A form (original syntax, implicit casts
//! made explicit) and the value-substituted E form (reached leaves replaced
//! by their recorded values, everything else by an ellipsis).

use crate::classify::{ExprTree, NodeId, NodeKind};
use crate::color::{ColorId, RESET};
use crate::eval::Recording;
use crate::value::NULL_TEXT;

pub const ELLIPSIS: &str = "...";

/// Plain symbolic text of one subtree, uncolored. This is also what the
/// recorder stores as a cast record's slot text.
pub fn symbol_text(tree: &ExprTree, id: NodeId) -> String {
    let mut out = String::new();
    a_node(tree, None, id, Parent::Root, false, &mut out);
    out
}

pub fn render_a(tree: &ExprTree, recording: &Recording, color: bool) -> String {
    let mut out = String::new();
    a_node(tree, Some(recording), tree.root(), Parent::Root, color, &mut out);
    out
}

pub fn render_e(tree: &ExprTree, recording: &Recording, pruned: &[bool], color: bool) -> String {
    let mut out = String::new();
    e_node(
        tree,
        recording,
        pruned,
        tree.root(),
        Parent::Root,
        color,
        &mut out,
    );
    out
}

#[derive(Clone, Copy)]
enum Parent {
    Root,
    /// Enclosing arithmetic operator; carries its precedence and whether
    /// the child is the right operand.
    Arith { prec: u8, right: bool },
    Other,
}

/// Comparisons and logical operators are always parenthesized below the
/// root; arithmetic only where precedence would otherwise be lost.
fn needs_parens(tree: &ExprTree, id: NodeId, parent: Parent) -> bool {
    match &tree.node(id).kind {
        NodeKind::And { .. } | NodeKind::Or { .. } => !matches!(parent, Parent::Root),
        NodeKind::Binary { op, .. } if op.is_comparison() => !matches!(parent, Parent::Root),
        NodeKind::Binary { op, .. } => match parent {
            Parent::Arith { prec, right } => {
                op.precedence() < prec || (op.precedence() == prec && right)
            }
            _ => false,
        },
        _ => false,
    }
}

fn paint(out: &mut String, text: &str, color: Option<ColorId>, enabled: bool) {
    match color {
        Some(c) if enabled => {
            out.push_str(&c.escape());
            out.push_str(text);
            out.push_str(RESET);
        }
        _ => out.push_str(text),
    }
}

fn record_color(recording: Option<&Recording>, id: NodeId) -> Option<ColorId> {
    recording.and_then(|r| r.record_for(id)).and_then(|r| r.color)
}

fn a_node(
    tree: &ExprTree,
    recording: Option<&Recording>,
    id: NodeId,
    parent: Parent,
    color: bool,
    out: &mut String,
) {
    let parens = needs_parens(tree, id, parent);
    if parens {
        out.push('(');
    }
    let own_color = record_color(recording, id);
    match &tree.node(id).kind {
        NodeKind::Var { name } => paint(out, name, own_color, color),
        NodeKind::Const { text, .. } => out.push_str(text),
        NodeKind::Str { text } => out.push_str(&format!("\"{text}\"")),
        NodeKind::Null => out.push_str("NULL"),
        NodeKind::AddrOf { operand } => paint(out, &format!("&{operand}"), own_color, color),
        NodeKind::Opaque { .. } => out.push_str(ELLIPSIS),
        NodeKind::Cast { .. } => {
            // The whole chain is one slot, so it colors as one segment.
            paint(out, &cast_text(tree, id), own_color, color);
        }
        NodeKind::Call { name, args } => {
            paint(out, &format!("{name}("), own_color, color);
            for (i, &arg) in args.iter().enumerate() {
                if i > 0 {
                    paint(out, ", ", own_color, color);
                }
                a_node(tree, recording, arg, Parent::Root, color, out);
            }
            paint(out, ")", own_color, color);
        }
        NodeKind::Binary { op, left, right } => {
            let (lp, rp) = child_contexts(op.is_comparison(), op.precedence());
            a_node(tree, recording, *left, lp, color, out);
            out.push_str(&format!(" {} ", op.as_str()));
            a_node(tree, recording, *right, rp, color, out);
        }
        NodeKind::And { left, right } => {
            a_node(tree, recording, *left, Parent::Other, color, out);
            out.push_str(" && ");
            a_node(tree, recording, *right, Parent::Other, color, out);
        }
        NodeKind::Or { left, right } => {
            a_node(tree, recording, *left, Parent::Other, color, out);
            out.push_str(" || ");
            a_node(tree, recording, *right, Parent::Other, color, out);
        }
    }
    if parens {
        out.push(')');
    }
}

fn child_contexts(is_comparison: bool, prec: u8) -> (Parent, Parent) {
    if is_comparison {
        (Parent::Other, Parent::Other)
    } else {
        (
            Parent::Arith { prec, right: false },
            Parent::Arith { prec, right: true },
        )
    }
}

fn cast_text(tree: &ExprTree, id: NodeId) -> String {
    let NodeKind::Cast { inner, .. } = &tree.node(id).kind else {
        return symbol_text(tree, id);
    };
    let target = tree.node(id).ty.spelled();
    let inner_text = symbol_text(tree, *inner);
    let wrapped = matches!(
        tree.node(*inner).kind,
        NodeKind::Binary { .. } | NodeKind::And { .. } | NodeKind::Or { .. }
    );
    if wrapped {
        format!("({target})({inner_text})")
    } else {
        format!("({target}){inner_text}")
    }
}

fn e_node(
    tree: &ExprTree,
    recording: &Recording,
    pruned: &[bool],
    id: NodeId,
    parent: Parent,
    color: bool,
    out: &mut String,
) {
    let parens = needs_parens(tree, id, parent);
    if parens {
        out.push('(');
    }
    if !recording.reached(id) || pruned[id.index()] {
        out.push_str(ELLIPSIS);
        if parens {
            out.push(')');
        }
        return;
    }
    match &tree.node(id).kind {
        NodeKind::Opaque { .. } => out.push_str(ELLIPSIS),
        NodeKind::Const { text, .. } => out.push_str(text),
        NodeKind::Str { text } => out.push_str(&format!("\"{text}\"")),
        NodeKind::Null => out.push_str(NULL_TEXT),
        NodeKind::Binary { op, left, right } => {
            let (lp, rp) = child_contexts(op.is_comparison(), op.precedence());
            e_node(tree, recording, pruned, *left, lp, color, out);
            out.push_str(&format!(" {} ", op.as_str()));
            e_node(tree, recording, pruned, *right, rp, color, out);
        }
        NodeKind::And { left, right } => {
            e_node(tree, recording, pruned, *left, Parent::Other, color, out);
            out.push_str(" && ");
            e_node(tree, recording, pruned, *right, Parent::Other, color, out);
        }
        NodeKind::Or { left, right } => {
            e_node(tree, recording, pruned, *left, Parent::Other, color, out);
            out.push_str(" || ");
            e_node(tree, recording, pruned, *right, Parent::Other, color, out);
        }
        _ => match recording.record_for(id) {
            Some(rec) => paint(out, &rec.value_text, rec.color, color),
            // A reached node with no record and no structure of its own
            // has nothing better than its symbolic text.
            None => out.push_str(&symbol_text(tree, id)),
        },
    }
    if parens {
        out.push(')');
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::classify;
    use crate::dsl;
    use crate::env::MapEnv;
    use crate::eval::record;
    use crate::types::CType;
    use crate::value::Value;

    fn rendered(e: &crate::ast::Expr, env: &mut MapEnv) -> (String, String) {
        let tree = classify(e);
        let rec = record(&tree, env).unwrap();
        let pruned = rec.pruned(&tree);
        (
            render_a(&tree, &rec, false),
            render_e(&tree, &rec, &pruned, false),
        )
    }

    #[test]
    fn sanity_forms() {
        let e = dsl::eq(dsl::var("n", CType::int()), dsl::lit(5));
        let mut env = MapEnv::new().with_int("n", 3);
        let (a, ev) = rendered(&e, &mut env);
        assert_eq!(a, "n == 5");
        assert_eq!(ev, "3 == 5");
    }

    #[test]
    fn and_with_passed_left_collapses() {
        let e = dsl::and(
            dsl::eq(dsl::var("n", CType::int()), dsl::lit(42)),
            dsl::eq(dsl::var("m", CType::int()), dsl::lit(7)),
        );
        let mut env = MapEnv::new().with_int("n", 42).with_int("m", 6);
        let (a, ev) = rendered(&e, &mut env);
        assert_eq!(a, "(n == 42) && (m == 7)");
        assert_eq!(ev, "(...) && (6 == 7)");
    }

    #[test]
    fn and_with_failed_left_shows_short_circuit() {
        let e = dsl::and(
            dsl::eq(dsl::var("n", CType::int()), dsl::lit(5)),
            dsl::eq(dsl::var("m", CType::int()), dsl::lit(7)),
        );
        let mut env = MapEnv::new().with_int("n", 42).with_int("m", 6);
        let (a, ev) = rendered(&e, &mut env);
        assert_eq!(a, "(n == 5) && (m == 7)");
        assert_eq!(ev, "(42 == 5) && (...)");
    }

    #[test]
    fn fired_or_shows_both_sides() {
        let e = dsl::or(
            dsl::eq(dsl::var("n", CType::int()), dsl::lit(43)),
            dsl::eq(dsl::var("m", CType::int()), dsl::lit(7)),
        );
        let mut env = MapEnv::new().with_int("n", 42).with_int("m", 6);
        let (_, ev) = rendered(&e, &mut env);
        assert_eq!(ev, "(42 == 43) || (6 == 7)");
    }

    #[test]
    fn cast_chain_a_form_spells_both_levels() {
        // short x; x + 5 == (short)n
        let e = dsl::eq(
            dsl::add(dsl::var("x", CType::short()), dsl::lit(5)),
            dsl::cast(CType::short(), dsl::var("n", CType::int())),
        );
        let mut env = MapEnv::new()
            .with_value("x", Value::typed_int(4464, CType::short()))
            .with_int("n", 70000);
        let (a, ev) = rendered(&e, &mut env);
        assert_eq!(a, "(int)x + 5 == (int)(short int)n");
        assert_eq!(ev, "4464 + 5 == 4464");
    }

    #[test]
    fn opaque_renders_ellipsis_in_both_forms() {
        let e = dsl::eq(
            dsl::opaque("c.b.a", CType::int()),
            dsl::var("n", CType::int()),
        );
        let mut env = MapEnv::new()
            .with_int("n", 3)
            .with_opaque("c.b.a", Value::int(7));
        let (a, ev) = rendered(&e, &mut env);
        assert_eq!(a, "... == n");
        assert_eq!(ev, "... == 3");
    }

    #[test]
    fn arithmetic_parenthesizes_only_when_needed() {
        // (a + b) * c keeps its parens; a + b * c does not grow any.
        let grouped = dsl::binary(
            crate::ast::BinOp::Mul,
            dsl::add(dsl::var("a", CType::int()), dsl::var("b", CType::int())),
            dsl::var("c", CType::int()),
        );
        let e = dsl::eq(grouped, dsl::lit(0));
        let mut env = MapEnv::new()
            .with_int("a", 1)
            .with_int("b", 2)
            .with_int("c", 3);
        let (a, _) = rendered(&e, &mut env);
        assert_eq!(a, "(a + b) * c == 0");
    }

    #[test]
    fn string_and_null_substitution() {
        let e = dsl::eq(
            dsl::call("strstr", CType::char_ptr(), vec![
                dsl::str_lit("hello world"),
                dsl::var("s", CType::char_ptr()),
            ]),
            dsl::null(),
        );
        let mut env = MapEnv::new().with_str("s", "world").with_fn(
            "strstr",
            |args: &[Value]| match &args[1] {
                Value::Ptr {
                    pointee: Some(needle),
                    ..
                } => Value::string(0x5000, needle.clone()),
                _ => Value::null(),
            },
        );
        let (a, ev) = rendered(&e, &mut env);
        assert_eq!(a, "strstr(\"hello world\", s) == NULL");
        assert_eq!(ev, "\"world\" == (nil)");
    }
}
