//! The expression classifier: maps the host-facing tree onto the closed
//! set of shapes the recorder and renderer understand, held in a per
//! occurrence arena. Classification never fails; unknown shapes become
//! opaque nodes and only cost precision.

use tracing::debug;

use crate::ast::{self, BinOp, Expr, ExprKind};
use crate::types::CType;

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize)]
pub struct NodeId(u32);

impl NodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Clone, Debug)]
pub struct Node {
    pub kind: NodeKind,
    pub ty: CType,
}

#[derive(Clone, Debug)]
pub enum NodeKind {
    Var {
        name: String,
    },
    Const {
        text: String,
        value: i128,
    },
    Str {
        text: String,
    },
    Null,
    /// A cast, explicit or an implicit promotion made visible. Chains
    /// (cast-of-cast) are preserved, one node per level.
    Cast {
        inner: NodeId,
        promotion: bool,
    },
    /// Address-of a named lvalue; a single leaf, never dereferenced.
    AddrOf {
        operand: String,
    },
    Binary {
        op: BinOp,
        left: NodeId,
        right: NodeId,
    },
    And {
        left: NodeId,
        right: NodeId,
    },
    Or {
        left: NodeId,
        right: NodeId,
    },
    Call {
        name: String,
        args: Vec<NodeId>,
    },
    /// Unmodelled shape; carries the original source text when known.
    Opaque {
        text: String,
    },
}

/// Classified condition tree for one assertion occurrence. Nodes are arena
/// entries addressed by [`NodeId`]; children always precede their parent.
#[derive(Clone, Debug)]
pub struct ExprTree {
    nodes: Vec<Node>,
    root: NodeId,
}

impl ExprTree {
    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn children(&self, id: NodeId) -> Vec<NodeId> {
        match &self.node(id).kind {
            NodeKind::Cast { inner, .. } => vec![*inner],
            NodeKind::Binary { left, right, .. }
            | NodeKind::And { left, right }
            | NodeKind::Or { left, right } => vec![*left, *right],
            NodeKind::Call { args, .. } => args.clone(),
            _ => Vec::new(),
        }
    }

    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = self.children(id);
        while let Some(n) = stack.pop() {
            out.push(n);
            stack.extend(self.children(n));
        }
        out
    }
}

pub fn classify(expr: &Expr) -> ExprTree {
    let mut nodes = Vec::new();
    let root = add(&mut nodes, expr);
    ExprTree { nodes, root }
}

fn add(nodes: &mut Vec<Node>, expr: &Expr) -> NodeId {
    let kind = match &expr.kind {
        ExprKind::Var { name } => NodeKind::Var { name: name.clone() },
        ExprKind::IntLit { text, value } => NodeKind::Const {
            text: text.clone(),
            value: *value,
        },
        ExprKind::StrLit { value } => NodeKind::Str {
            text: value.clone(),
        },
        ExprKind::Null => NodeKind::Null,
        ExprKind::Convert { inner } => {
            // A conversion that changes nothing, or one applied to a
            // compound expression purely for promotion, is not part of the
            // original surface syntax: look through it so rendering matches
            // what the programmer wrote.
            if expr.ty == inner.ty || is_compound(inner) {
                return add(nodes, inner);
            }
            NodeKind::Cast {
                inner: add(nodes, inner),
                promotion: true,
            }
        }
        ExprKind::Cast { inner } => NodeKind::Cast {
            inner: add(nodes, inner),
            promotion: false,
        },
        ExprKind::AddrOf { inner } => match &inner.kind {
            ExprKind::Var { name } => NodeKind::AddrOf {
                operand: name.clone(),
            },
            ExprKind::Opaque { text } => NodeKind::AddrOf {
                operand: text.clone(),
            },
            other => {
                debug!(?other, "address-of an unmodelled operand, degrading");
                NodeKind::Opaque {
                    text: String::new(),
                }
            }
        },
        ExprKind::Binary { op, left, right } => NodeKind::Binary {
            op: *op,
            left: add(nodes, left),
            right: add(nodes, right),
        },
        ExprKind::And { left, right } => NodeKind::And {
            left: add(nodes, left),
            right: add(nodes, right),
        },
        ExprKind::Or { left, right } => NodeKind::Or {
            left: add(nodes, left),
            right: add(nodes, right),
        },
        ExprKind::Call { name, args } => NodeKind::Call {
            name: name.clone(),
            args: args.iter().map(|a| add(nodes, a)).collect(),
        },
        ExprKind::Opaque { text } => NodeKind::Opaque { text: text.clone() },
        // The pipeline refuses to rewrite trees with error marks; if one
        // slips through, degrade rather than fail.
        ExprKind::Error => NodeKind::Opaque {
            text: String::new(),
        },
    };
    nodes.push(Node {
        kind,
        ty: expr.ty.clone(),
    });
    NodeId((nodes.len() - 1) as u32)
}

fn is_compound(expr: &ast::Expr) -> bool {
    matches!(
        expr.kind,
        ExprKind::Binary { .. } | ExprKind::And { .. } | ExprKind::Or { .. }
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsl;

    #[test]
    fn cast_chain_is_preserved_level_by_level() {
        // (int)(short int)n, as produced by promotion over an explicit cast.
        let e = dsl::convert(
            CType::int(),
            dsl::cast(CType::short(), dsl::var("n", CType::int())),
        );
        let tree = classify(&e);

        let NodeKind::Cast { inner, promotion } = &tree.node(tree.root()).kind else {
            panic!("expected outer cast");
        };
        assert!(*promotion);
        let NodeKind::Cast {
            inner: base,
            promotion: inner_promo,
        } = &tree.node(*inner).kind
        else {
            panic!("expected inner cast");
        };
        assert!(!*inner_promo);
        assert!(matches!(tree.node(*base).kind, NodeKind::Var { .. }));
    }

    #[test]
    fn promotion_of_compound_operand_is_looked_through() {
        // An implicit widening around (x + 5) must not render as a cast.
        let sum = dsl::add(dsl::var("x", CType::int()), dsl::lit(5));
        let widened = dsl::convert(CType::long(), sum);
        let tree = classify(&widened);
        assert!(matches!(
            tree.node(tree.root()).kind,
            NodeKind::Binary { .. }
        ));
    }

    #[test]
    fn redundant_conversion_is_dropped() {
        let e = crate::ast::Expr::new(
            crate::ast::ExprKind::Convert {
                inner: Box::new(dsl::var("n", CType::int())),
            },
            CType::int(),
        );
        let tree = classify(&e);
        assert!(matches!(tree.node(tree.root()).kind, NodeKind::Var { .. }));
        assert_eq!(tree.len(), 1);
    }

    #[test]
    fn address_of_variable_is_a_leaf() {
        let e = dsl::addr_of(dsl::var("n", CType::int()));
        let tree = classify(&e);
        let NodeKind::AddrOf { operand } = &tree.node(tree.root()).kind else {
            panic!("expected addr-of leaf");
        };
        assert_eq!(operand, "n");
        assert!(tree.node(tree.root()).ty.is_pointer());
    }

    #[test]
    fn member_access_stays_opaque_inside_supported_operator() {
        let e = dsl::eq(
            dsl::opaque("c.b.a", CType::int()),
            dsl::var("n", CType::int()),
        );
        let tree = classify(&e);
        let NodeKind::Binary { left, .. } = &tree.node(tree.root()).kind else {
            panic!("expected binary");
        };
        assert!(matches!(tree.node(*left).kind, NodeKind::Opaque { .. }));
    }

    #[test]
    fn children_precede_parents_in_the_arena() {
        let e = dsl::and(
            dsl::eq(dsl::var("n", CType::int()), dsl::lit(1)),
            dsl::eq(dsl::var("m", CType::int()), dsl::lit(2)),
        );
        let tree = classify(&e);
        for id in (0..tree.len() as u32).map(NodeId) {
            for child in tree.children(id) {
                assert!(child.index() < id.index());
            }
        }
        assert_eq!(tree.root().index(), tree.len() - 1);
    }
}
