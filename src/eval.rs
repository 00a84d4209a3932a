//! The evaluation recorder: a single short-circuit-preserving walk over a
//! classified tree that evaluates exactly as the original condition would,
//! capturing each reached leaf, call and cast once, in evaluation order.
//!
//! The record table is the DAG substrate of the report: the same record is
//! referenced from the A line, the E line and the subexpression list, so
//! "evaluate once, display many times" holds by construction.

use tracing::{debug, instrument, trace};

use crate::ast::BinOp;
use crate::classify::{ExprTree, NodeId, NodeKind};
use crate::color::ColorId;
use crate::error::{IntrospectError, IntrospectResult};
use crate::render;
use crate::types::CType;
use crate::value::{format_value, Value};

/// The runtime surface the instrumented condition reads from: the frame's
/// variables, callable functions, opaque lvalues and addresses.
pub trait Env {
    fn var(&mut self, name: &str) -> IntrospectResult<Value>;
    fn call(&mut self, name: &str, args: &[Value]) -> IntrospectResult<Value>;
    fn opaque(&mut self, text: &str) -> IntrospectResult<Value>;
    fn address_of(&mut self, name: &str) -> IntrospectResult<u64>;
}

/// One reached leaf/call/cast: the saved-slot contents plus presentation.
#[derive(Clone, Debug, serde::Serialize)]
pub struct EvalRecord {
    pub node: NodeId,
    pub text: String,
    pub order: usize,
    pub value: Value,
    pub value_text: String,
    pub color: Option<ColorId>,
}

/// Everything one evaluation of an assertion condition produced.
#[derive(Clone, Debug)]
pub struct Recording {
    records: Vec<EvalRecord>,
    by_node: Vec<Option<usize>>,
    reached: Vec<bool>,
    values: Vec<Option<Value>>,
    result: Value,
}

impl Recording {
    pub fn records(&self) -> &[EvalRecord] {
        &self.records
    }

    pub fn records_mut(&mut self) -> &mut [EvalRecord] {
        &mut self.records
    }

    pub fn result(&self) -> &Value {
        &self.result
    }

    pub fn passed(&self) -> bool {
        self.result.truthy()
    }

    pub fn reached(&self, id: NodeId) -> bool {
        self.reached[id.index()]
    }

    pub fn record_for(&self, id: NodeId) -> Option<&EvalRecord> {
        self.by_node[id.index()].map(|i| &self.records[i])
    }

    pub fn value_of(&self, id: NodeId) -> Option<&Value> {
        self.values[id.index()].as_ref()
    }

    /// Marks subtrees that were evaluated but are irrelevant to the
    /// failure: an operand of `&&` that came out true contributed nothing
    /// to why the whole condition is false, so it collapses to an ellipsis
    /// in the E form and its records are dropped from the list.
    pub fn pruned(&self, tree: &ExprTree) -> Vec<bool> {
        let mut pruned = vec![false; tree.len()];
        self.prune_walk(tree, tree.root(), &mut pruned);
        pruned
    }

    fn prune_walk(&self, tree: &ExprTree, id: NodeId, pruned: &mut [bool]) {
        match &tree.node(id).kind {
            NodeKind::And { left, right } => {
                for side in [*left, *right] {
                    if !self.reached(side) {
                        continue;
                    }
                    let passed = self.value_of(side).is_some_and(Value::truthy);
                    if passed {
                        pruned[side.index()] = true;
                        for d in tree.descendants(side) {
                            pruned[d.index()] = true;
                        }
                    } else {
                        self.prune_walk(tree, side, pruned);
                    }
                }
            }
            _ => {
                for child in tree.children(id) {
                    if self.reached(child) {
                        self.prune_walk(tree, child, pruned);
                    }
                }
            }
        }
    }
}

/// Evaluates `tree` against `env` with original semantics and returns the
/// populated record table.
#[instrument(skip_all)]
pub fn record(tree: &ExprTree, env: &mut dyn Env) -> IntrospectResult<Recording> {
    let mut recorder = Recorder {
        tree,
        env,
        records: Vec::new(),
        by_node: vec![None; tree.len()],
        reached: vec![false; tree.len()],
        values: vec![None; tree.len()],
        next_lit_addr: 0x40_1000,
    };
    let result = recorder.eval(tree.root())?;
    Ok(Recording {
        records: recorder.records,
        by_node: recorder.by_node,
        reached: recorder.reached,
        values: recorder.values,
        result,
    })
}

struct Recorder<'a> {
    tree: &'a ExprTree,
    env: &'a mut dyn Env,
    records: Vec<EvalRecord>,
    by_node: Vec<Option<usize>>,
    reached: Vec<bool>,
    values: Vec<Option<Value>>,
    next_lit_addr: u64,
}

impl Recorder<'_> {
    fn eval(&mut self, id: NodeId) -> IntrospectResult<Value> {
        self.reached[id.index()] = true;
        let ty = self.tree.node(id).ty.clone();
        let value = match &self.tree.node(id).kind.clone() {
            NodeKind::Var { name } => {
                let v = self.env.var(name)?;
                self.push_record(id, name.clone(), v.clone());
                v
            }
            NodeKind::Const { value, .. } => Value::typed_int(*value, ty),
            NodeKind::Str { text } => self.string_literal(text),
            NodeKind::Null => Value::null(),
            NodeKind::Cast { .. } => self.eval_cast_chain(id)?,
            NodeKind::AddrOf { operand } => {
                let addr = self.env.address_of(operand)?;
                let v = Value::Ptr {
                    addr,
                    pointee: None,
                };
                self.push_record(id, format!("&{operand}"), v.clone());
                v
            }
            NodeKind::Binary { op, left, right } => {
                let l = self.eval(*left)?;
                let r = self.eval(*right)?;
                apply_binop(*op, &l, &r, &ty)?
            }
            NodeKind::And { left, right } => {
                let l = self.eval(*left)?;
                if !l.truthy() {
                    debug!("short-circuit: left operand of && is false");
                    Value::typed_int(0, CType::int())
                } else {
                    let r = self.eval(*right)?;
                    Value::typed_int(r.truthy() as i128, CType::int())
                }
            }
            NodeKind::Or { left, right } => {
                let l = self.eval(*left)?;
                if l.truthy() {
                    debug!("short-circuit: left operand of || is true");
                    Value::typed_int(1, CType::int())
                } else {
                    let r = self.eval(*right)?;
                    Value::typed_int(r.truthy() as i128, CType::int())
                }
            }
            NodeKind::Call { name, args } => {
                let mut vals = Vec::with_capacity(args.len());
                for &arg in args {
                    vals.push(self.eval(arg)?);
                }
                let ret = self.env.call(name, &vals)?;
                let shown: Vec<String> = args.iter().map(|&a| self.display_text(a)).collect();
                self.push_record(id, format!("{}({})", name, shown.join(", ")), ret.clone());
                ret
            }
            NodeKind::Opaque { text } => {
                if text.is_empty() {
                    // A degraded shape with no spelling to look up. It still
                    // renders as an ellipsis; standing in a neutral value
                    // keeps the run alive.
                    debug!("unmodelled operand without source text, using placeholder");
                    placeholder(&ty)
                } else {
                    let v = self.env.opaque(text)?;
                    self.push_record(id, text.clone(), v.clone());
                    v
                }
            }
        };
        self.values[id.index()] = Some(value.clone());
        Ok(value)
    }

    /// A whole cast chain is one recording unit: the innermost operand is
    /// read once, every cast level applies in order, and the post-cast
    /// value lands under the outermost cast's slot.
    fn eval_cast_chain(&mut self, id: NodeId) -> IntrospectResult<Value> {
        let mut chain = vec![id];
        let mut base = id;
        while let NodeKind::Cast { inner, .. } = self.tree.node(base).kind {
            base = inner;
            if matches!(self.tree.node(base).kind, NodeKind::Cast { .. }) {
                chain.push(base);
            }
        }

        self.reached[base.index()] = true;
        let base_ty = self.tree.node(base).ty.clone();
        let base_value = match &self.tree.node(base).kind.clone() {
            NodeKind::Var { name } => self.env.var(name)?,
            NodeKind::Const { value, .. } => Value::typed_int(*value, base_ty),
            NodeKind::Str { text } => self.string_literal(text),
            NodeKind::Null => Value::null(),
            // Calls and compound operands inside a cast record normally.
            _ => self.eval(base)?,
        };
        self.values[base.index()] = Some(base_value.clone());

        let mut v = base_value;
        for &cast_id in chain.iter().rev() {
            self.reached[cast_id.index()] = true;
            v = v.cast_to(&self.tree.node(cast_id).ty);
            self.values[cast_id.index()] = Some(v.clone());
        }
        self.push_record(id, render::symbol_text(self.tree, id), v.clone());
        Ok(v)
    }

    fn string_literal(&mut self, text: &str) -> Value {
        let addr = self.next_lit_addr;
        self.next_lit_addr += 0x40;
        Value::string(addr, text)
    }

    fn push_record(&mut self, id: NodeId, text: String, value: Value) {
        let order = self.records.len();
        let value_text = format_value(&value, &self.tree.node(id).ty);
        trace!(order, %text, %value_text, "recorded subexpression");
        self.by_node[id.index()] = Some(order);
        self.records.push(EvalRecord {
            node: id,
            text,
            order,
            value,
            value_text,
            color: None,
        });
    }

    /// How an already-evaluated node appears inside an enclosing call's
    /// record text: recorded nodes show their captured value, literals
    /// show themselves.
    fn display_text(&self, id: NodeId) -> String {
        if let Some(rec) = self.by_node[id.index()].map(|i| &self.records[i]) {
            return rec.value_text.clone();
        }
        match &self.tree.node(id).kind {
            NodeKind::Const { text, .. } => text.clone(),
            NodeKind::Str { text } => format!("\"{text}\""),
            NodeKind::Null => "NULL".to_string(),
            _ => match self.values[id.index()].as_ref() {
                Some(v) => format_value(v, &self.tree.node(id).ty),
                None => render::symbol_text(self.tree, id),
            },
        }
    }
}

fn placeholder(ty: &CType) -> Value {
    match ty {
        CType::Pointer(_) => Value::null(),
        _ => Value::typed_int(0, ty.clone()),
    }
}

fn apply_binop(op: BinOp, l: &Value, r: &Value, result_ty: &CType) -> IntrospectResult<Value> {
    if op.is_comparison() {
        let outcome = match op {
            BinOp::Eq => l.raw_bits() == r.raw_bits(),
            BinOp::Ne => l.raw_bits() != r.raw_bits(),
            BinOp::Lt => l.raw_bits() < r.raw_bits(),
            BinOp::Le => l.raw_bits() <= r.raw_bits(),
            BinOp::Gt => l.raw_bits() > r.raw_bits(),
            BinOp::Ge => l.raw_bits() >= r.raw_bits(),
            _ => unreachable!(),
        };
        return Ok(Value::typed_int(outcome as i128, CType::int()));
    }

    // Pointer arithmetic degrades to byte offsets; the pointee text no
    // longer describes the new address.
    if let Value::Ptr { addr, .. } = l {
        let delta = r.raw_bits() as u64;
        let addr = match op {
            BinOp::Add => addr.wrapping_add(delta),
            BinOp::Sub => addr.wrapping_sub(delta),
            _ => {
                return Err(IntrospectError::evaluation(
                    "unsupported pointer arithmetic in assertion operand",
                ))
            }
        };
        return Ok(Value::Ptr {
            addr,
            pointee: None,
        });
    }

    let (a, b) = (l.raw_bits(), r.raw_bits());
    let raw = match op {
        BinOp::Add => a.wrapping_add(b),
        BinOp::Sub => a.wrapping_sub(b),
        BinOp::Mul => a.wrapping_mul(b),
        BinOp::Div | BinOp::Rem if b == 0 => {
            return Err(IntrospectError::evaluation(
                "division by zero in assertion operand",
            ))
        }
        BinOp::Div => a.wrapping_div(b),
        BinOp::Rem => a.wrapping_rem(b),
        _ => unreachable!(),
    };
    Ok(Value::typed_int(raw, result_ty.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::classify;
    use crate::dsl;
    use crate::env::MapEnv;
    use crate::types::CType;

    #[test]
    fn records_follow_evaluation_order() {
        // f(12, n) == 5 records n before the call, the call before nothing.
        let e = dsl::eq(
            dsl::call(
                "f",
                CType::int(),
                vec![dsl::lit(12), dsl::var("n", CType::int())],
            ),
            dsl::lit(5),
        );
        let tree = classify(&e);
        let mut env = MapEnv::new()
            .with_int("n", 20)
            .with_fn("f", |args: &[Value]| {
                Value::int((args[0].raw_bits() + args[1].raw_bits()) as i64)
            });
        let rec = record(&tree, &mut env).unwrap();
        assert!(!rec.passed());

        let texts: Vec<&str> = rec.records().iter().map(|r| r.text.as_str()).collect();
        assert_eq!(texts, vec!["n", "f(12, 20)"]);
        assert_eq!(rec.records()[1].value_text, "32");
    }

    #[test]
    fn short_circuited_branch_is_never_reached() {
        let e = dsl::and(
            dsl::eq(dsl::var("n", CType::int()), dsl::lit(5)),
            dsl::eq(
                dsl::call("boom", CType::int(), vec![dsl::var("n", CType::int())]),
                dsl::var("n", CType::int()),
            ),
        );
        let tree = classify(&e);
        let mut env = MapEnv::new()
            .with_int("n", 42)
            .with_fn("boom", |_: &[Value]| panic!("must not be evaluated"));
        let rec = record(&tree, &mut env).unwrap();
        assert!(!rec.passed());
        assert_eq!(rec.records().len(), 1);
        assert_eq!(rec.records()[0].text, "n");
    }

    #[test]
    fn call_evaluates_exactly_once() {
        use std::cell::Cell;
        use std::rc::Rc;

        let calls = Rc::new(Cell::new(0));
        let seen = calls.clone();
        let e = dsl::eq(
            dsl::call(
                "call_me_once",
                CType::int(),
                vec![dsl::var("n", CType::int())],
            ),
            dsl::var("n", CType::int()),
        );
        let tree = classify(&e);
        let mut env = MapEnv::new()
            .with_int("n", 3)
            .with_fn("call_me_once", move |args: &[Value]| {
                seen.set(seen.get() + 1);
                Value::int(args[0].raw_bits() as i64 + 1)
            });
        let rec = record(&tree, &mut env).unwrap();
        assert_eq!(calls.get(), 1);
        let texts: Vec<&str> = rec.records().iter().map(|r| r.text.as_str()).collect();
        assert_eq!(texts, vec!["n", "call_me_once(3)"]);
    }

    #[test]
    fn cast_chain_records_post_cast_value_once() {
        // (int)(short int)n with n = 70000 shows the truncated value.
        let e = dsl::eq(
            dsl::convert(
                CType::int(),
                dsl::cast(CType::short(), dsl::var("n", CType::int())),
            ),
            dsl::lit(0),
        );
        let tree = classify(&e);
        let mut env = MapEnv::new().with_int("n", 70000);
        let rec = record(&tree, &mut env).unwrap();
        assert_eq!(rec.records().len(), 1);
        assert_eq!(rec.records()[0].text, "(int)(short int)n");
        assert_eq!(rec.records()[0].value_text, "4464");
    }

    #[test]
    fn passed_and_branch_is_pruned() {
        let e = dsl::and(
            dsl::eq(dsl::var("n", CType::int()), dsl::lit(42)),
            dsl::eq(dsl::var("m", CType::int()), dsl::lit(7)),
        );
        let tree = classify(&e);
        let mut env = MapEnv::new().with_int("n", 42).with_int("m", 6);
        let rec = record(&tree, &mut env).unwrap();
        let pruned = rec.pruned(&tree);

        let visible: Vec<&str> = rec
            .records()
            .iter()
            .filter(|r| !pruned[r.node.index()])
            .map(|r| r.text.as_str())
            .collect();
        assert_eq!(visible, vec!["m"]);
    }

    #[test]
    fn address_of_records_the_operand_address() {
        let e = dsl::eq(dsl::addr_of(dsl::var("n", CType::int())), dsl::null());
        let tree = classify(&e);
        let mut env = MapEnv::new();
        let rec = record(&tree, &mut env).unwrap();
        assert!(!rec.passed());
        assert_eq!(rec.records().len(), 1);
        assert_eq!(rec.records()[0].text, "&n");
        assert!(rec.records()[0].value_text.starts_with("0x"));
    }

    #[test]
    fn unmodelled_address_of_degrades_without_failing() {
        // Address-of a call has no recordable spelling; the run must still
        // complete, with the operand as an unrecorded ellipsis.
        let e = dsl::ne(dsl::addr_of(dsl::call("f", CType::int(), vec![])), dsl::null());
        let tree = classify(&e);
        let mut env = MapEnv::new();
        let rec = record(&tree, &mut env).unwrap();
        assert!(rec.records().is_empty());
        assert!(!rec.passed());

        let pruned = rec.pruned(&tree);
        assert_eq!(
            crate::render::render_e(&tree, &rec, &pruned, false),
            "... != (nil)"
        );
    }

    #[test]
    fn division_by_zero_is_an_evaluation_error() {
        let e = dsl::eq(
            dsl::binary(
                crate::ast::BinOp::Div,
                dsl::var("n", CType::int()),
                dsl::var("z", CType::int()),
            ),
            dsl::lit(1),
        );
        let tree = classify(&e);
        let mut env = MapEnv::new().with_int("n", 5).with_int("z", 0);
        assert!(record(&tree, &mut env).is_err());
    }
}
