//! Expression evaluation over a [`Document`].

use std::collections::HashSet;

use super::parser::{ArithOp, Axis, CompareOp, Expr, NodeTest, PathExpr, PathStart, Step};
use crate::error::XPathError;
use crate::xml::{Document, NodeId, NodeKind};

/// Result of evaluating an expression
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Nodes in document order, without duplicates
    Nodes(Vec<NodeId>),
    String(String),
    Number(f64),
    Boolean(bool),
}

impl Value {
    pub fn to_boolean(&self) -> bool {
        match self {
            Value::Nodes(nodes) => !nodes.is_empty(),
            Value::String(s) => !s.is_empty(),
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::Boolean(b) => *b,
        }
    }

    pub fn to_string_value(&self, doc: &Document) -> String {
        match self {
            Value::Nodes(nodes) => nodes.first().map(|n| doc.string_value(*n)).unwrap_or_default(),
            Value::String(s) => s.clone(),
            Value::Number(n) => format_number(*n),
            Value::Boolean(b) => b.to_string(),
        }
    }

    pub fn to_number(&self, doc: &Document) -> f64 {
        match self {
            Value::Number(n) => *n,
            Value::Boolean(b) => {
                if *b {
                    1.0
                } else {
                    0.0
                }
            }
            other => parse_number(&other.to_string_value(doc)),
        }
    }

    pub fn into_nodes(self, what: &str) -> Result<Vec<NodeId>, XPathError> {
        match self {
            Value::Nodes(nodes) => Ok(nodes),
            other => Err(XPathError::Type(format!(
                "{} requires a node-set, got {}",
                what,
                other.type_name()
            ))),
        }
    }

    fn type_name(&self) -> &'static str {
        match self {
            Value::Nodes(_) => "node-set",
            Value::String(_) => "string",
            Value::Number(_) => "number",
            Value::Boolean(_) => "boolean",
        }
    }
}

/// XPath string form of a number
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        let text = if n > 0.0 { "Infinity" } else { "-Infinity" };
        text.to_string()
    } else if n == n.trunc() && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

/// XPath number conversion of a string: optional sign, digits, optional
/// fraction; anything else is NaN.
pub fn parse_number(s: &str) -> f64 {
    let t = s.trim();
    let body = t.strip_prefix('-').unwrap_or(t);
    let valid = !body.is_empty()
        && body.chars().all(|c| c.is_ascii_digit() || c == '.')
        && body.chars().filter(|c| *c == '.').count() <= 1
        && body != ".";
    if valid {
        t.parse().unwrap_or(f64::NAN)
    } else {
        f64::NAN
    }
}

/// Variable bindings visible to an evaluation, innermost last
#[derive(Debug, Clone, Default)]
pub struct Bindings {
    entries: Vec<(String, Value)>,
}

impl Bindings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, name: &str, value: Value) {
        self.entries.push((name.to_string(), value));
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.entries.iter().rev().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    /// Number of bindings, usable as a mark for [`Bindings::truncate`]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn truncate(&mut self, mark: usize) {
        self.entries.truncate(mark);
    }
}

/// Dynamic context of one evaluation
#[derive(Debug, Clone, Copy)]
pub struct EvalContext<'a> {
    pub doc: &'a Document,
    pub node: NodeId,
    pub position: usize,
    pub size: usize,
    /// Node returned by `current()`: the node the rule fired on
    pub current: NodeId,
    pub bindings: &'a Bindings,
}

impl<'a> EvalContext<'a> {
    pub fn new(doc: &'a Document, node: NodeId, bindings: &'a Bindings) -> Self {
        Self {
            doc,
            node,
            position: 1,
            size: 1,
            current: node,
            bindings,
        }
    }

    fn at(&self, node: NodeId, position: usize, size: usize) -> Self {
        Self {
            node,
            position,
            size,
            ..*self
        }
    }
}

pub(crate) fn evaluate(expr: &Expr, ctx: &EvalContext<'_>) -> Result<Value, XPathError> {
    match expr {
        Expr::Or(l, r) => Ok(Value::Boolean(
            evaluate(l, ctx)?.to_boolean() || evaluate(r, ctx)?.to_boolean(),
        )),
        Expr::And(l, r) => Ok(Value::Boolean(
            evaluate(l, ctx)?.to_boolean() && evaluate(r, ctx)?.to_boolean(),
        )),
        Expr::Compare(op, l, r) => {
            let left = evaluate(l, ctx)?;
            let right = evaluate(r, ctx)?;
            Ok(Value::Boolean(compare(*op, &left, &right, ctx.doc)))
        }
        Expr::Arith(op, l, r) => {
            let a = evaluate(l, ctx)?.to_number(ctx.doc);
            let b = evaluate(r, ctx)?.to_number(ctx.doc);
            Ok(Value::Number(match op {
                ArithOp::Add => a + b,
                ArithOp::Sub => a - b,
                ArithOp::Mul => a * b,
                ArithOp::Div => a / b,
                ArithOp::Mod => a % b,
            }))
        }
        Expr::Negate(inner) => Ok(Value::Number(-evaluate(inner, ctx)?.to_number(ctx.doc))),
        Expr::Union(l, r) => {
            let mut nodes = evaluate(l, ctx)?.into_nodes("'|'")?;
            nodes.extend(evaluate(r, ctx)?.into_nodes("'|'")?);
            Ok(Value::Nodes(document_order(nodes)))
        }
        Expr::Literal(s) => Ok(Value::String(s.clone())),
        Expr::Number(n) => Ok(Value::Number(*n)),
        Expr::Variable(name) => ctx
            .bindings
            .get(name)
            .cloned()
            .ok_or_else(|| XPathError::UndefinedVariable(name.clone())),
        Expr::Call(function, args) => function.call(args, ctx),
        Expr::Filter(primary, predicates) => {
            let nodes = evaluate(primary, ctx)?.into_nodes("a predicate")?;
            Ok(Value::Nodes(apply_predicates(nodes, predicates, ctx)?))
        }
        Expr::Path(path) => evaluate_path(path, ctx).map(Value::Nodes),
    }
}

fn evaluate_path(path: &PathExpr, ctx: &EvalContext<'_>) -> Result<Vec<NodeId>, XPathError> {
    let mut nodes = match &path.start {
        PathStart::Root => vec![ctx.doc.root()],
        PathStart::Context => vec![ctx.node],
        PathStart::Expr(expr) => evaluate(expr, ctx)?.into_nodes("a path")?,
    };
    for step in &path.steps {
        nodes = evaluate_step(step, &nodes, ctx)?;
    }
    Ok(nodes)
}

fn evaluate_step(step: &Step, input: &[NodeId], ctx: &EvalContext<'_>) -> Result<Vec<NodeId>, XPathError> {
    let mut out = Vec::new();
    for node in input {
        let candidates: Vec<NodeId> = axis_nodes(ctx.doc, *node, step.axis)
            .into_iter()
            .filter(|n| matches_test(ctx.doc, *n, &step.test, step.axis))
            .collect();
        out.extend(apply_predicates(candidates, &step.predicates, ctx)?);
    }
    Ok(document_order(out))
}

/// Filter `nodes` (in axis order) through each predicate in turn
fn apply_predicates(
    mut nodes: Vec<NodeId>,
    predicates: &[Expr],
    ctx: &EvalContext<'_>,
) -> Result<Vec<NodeId>, XPathError> {
    for predicate in predicates {
        let size = nodes.len();
        let mut kept = Vec::with_capacity(size);
        for (i, node) in nodes.iter().enumerate() {
            let inner = ctx.at(*node, i + 1, size);
            let keep = match evaluate(predicate, &inner)? {
                Value::Number(n) => n == (i + 1) as f64,
                other => other.to_boolean(),
            };
            if keep {
                kept.push(*node);
            }
        }
        nodes = kept;
    }
    Ok(nodes)
}

/// Nodes on `axis` from `node`, in proximity order
fn axis_nodes(doc: &Document, node: NodeId, axis: Axis) -> Vec<NodeId> {
    match axis {
        Axis::Child => doc.children(node).to_vec(),
        Axis::Descendant => doc.descendants(node),
        Axis::DescendantOrSelf => {
            let mut v = vec![node];
            v.extend(doc.descendants(node));
            v
        }
        Axis::SelfAxis => vec![node],
        Axis::Parent => doc.parent(node).into_iter().collect(),
        Axis::Ancestor => doc.ancestors(node),
        Axis::AncestorOrSelf => {
            let mut v = vec![node];
            v.extend(doc.ancestors(node));
            v
        }
        Axis::Attribute => doc.attributes(node).to_vec(),
        Axis::FollowingSibling | Axis::PrecedingSibling => {
            if doc.is_attribute(node) {
                return Vec::new();
            }
            let Some(parent) = doc.parent(node) else {
                return Vec::new();
            };
            let siblings = doc.children(parent);
            let Some(idx) = siblings.iter().position(|s| *s == node) else {
                return Vec::new();
            };
            if axis == Axis::FollowingSibling {
                siblings[idx + 1..].to_vec()
            } else {
                siblings[..idx].iter().rev().copied().collect()
            }
        }
        Axis::Following => {
            let excluded: HashSet<NodeId> = doc.descendants(node).into_iter().collect();
            doc.node_ids()
                .filter(|n| *n > node && !doc.is_attribute(*n) && !excluded.contains(n))
                .collect()
        }
        Axis::Preceding => {
            let ancestors: HashSet<NodeId> = doc.ancestors(node).into_iter().collect();
            let mut v: Vec<NodeId> = doc
                .node_ids()
                .filter(|n| {
                    *n < node
                        && !doc.is_attribute(*n)
                        && !ancestors.contains(n)
                        && !matches!(doc.kind(*n), NodeKind::Document)
                })
                .collect();
            v.reverse();
            v
        }
    }
}

fn matches_test(doc: &Document, node: NodeId, test: &NodeTest, axis: Axis) -> bool {
    let principal = |n: NodeId| {
        if axis == Axis::Attribute {
            doc.is_attribute(n)
        } else {
            doc.is_element(n)
        }
    };
    match test {
        NodeTest::Node => true,
        NodeTest::Text => doc.is_text(node),
        NodeTest::Comment => matches!(doc.kind(node), NodeKind::Comment(_)),
        NodeTest::Any => principal(node),
        NodeTest::Name { namespace, local } => {
            principal(node)
                && doc
                    .name(node)
                    .map_or(false, |n| n.local == *local && n.namespace == *namespace)
        }
        NodeTest::Namespace(ns) => {
            principal(node) && doc.name(node).map_or(false, |n| n.namespace.as_deref() == Some(ns))
        }
        NodeTest::LocalName(local) => {
            principal(node) && doc.name(node).map_or(false, |n| n.local == *local)
        }
    }
}

pub(crate) fn document_order(mut nodes: Vec<NodeId>) -> Vec<NodeId> {
    nodes.sort();
    nodes.dedup();
    nodes
}

fn compare(op: CompareOp, left: &Value, right: &Value, doc: &Document) -> bool {
    match (left, right) {
        (Value::Nodes(a), Value::Nodes(b)) => {
            let bs: Vec<String> = b.iter().map(|n| doc.string_value(*n)).collect();
            a.iter().any(|x| {
                let xs = doc.string_value(*x);
                bs.iter().any(|ys| compare_atomic(op, &Value::String(xs.clone()), &Value::String(ys.clone()), doc))
            })
        }
        (Value::Nodes(a), other) => a.iter().any(|x| node_vs_atomic(op, doc, *x, other, false)),
        (other, Value::Nodes(b)) => b.iter().any(|y| node_vs_atomic(op, doc, *y, other, true)),
        _ => compare_atomic(op, left, right, doc),
    }
}

fn node_vs_atomic(op: CompareOp, doc: &Document, node: NodeId, atomic: &Value, flipped: bool) -> bool {
    let node_value = match atomic {
        Value::Number(_) => Value::Number(parse_number(&doc.string_value(node))),
        Value::Boolean(_) => Value::Boolean(true),
        _ => Value::String(doc.string_value(node)),
    };
    if flipped {
        compare_atomic(op, atomic, &node_value, doc)
    } else {
        compare_atomic(op, &node_value, atomic, doc)
    }
}

fn compare_atomic(op: CompareOp, left: &Value, right: &Value, doc: &Document) -> bool {
    match op {
        CompareOp::Eq | CompareOp::NotEq => {
            let equal = if matches!(left, Value::Boolean(_)) || matches!(right, Value::Boolean(_)) {
                left.to_boolean() == right.to_boolean()
            } else if matches!(left, Value::Number(_)) || matches!(right, Value::Number(_)) {
                left.to_number(doc) == right.to_number(doc)
            } else {
                left.to_string_value(doc) == right.to_string_value(doc)
            };
            if op == CompareOp::Eq {
                equal
            } else {
                !equal
            }
        }
        _ => {
            let a = left.to_number(doc);
            let b = right.to_number(doc);
            match op {
                CompareOp::Lt => a < b,
                CompareOp::Le => a <= b,
                CompareOp::Gt => a > b,
                _ => a >= b,
            }
        }
    }
}
