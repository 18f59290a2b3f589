//! Path-addressed access to the syntax tree.
//!
//! A [`Path`] is a list of steps from the root block to a node. Paths are
//! plain values: they stay meaningful only for the tree they were computed
//! on. When several paths found in one snapshot are used for mutation,
//! apply them deepest first (see [`sort_deepest_first`]) so that replacing
//! one node never moves another one that is still pending.

use crate::ast::*;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PathSegment {
    /// A named single child, e.g. `body` or `condition`.
    Field(&'static str),
    /// The i-th statement of a block.
    Index(usize),
    /// The i-th element of a named list, e.g. `args` or `values`.
    Item(&'static str, usize),
}

pub type Path = Vec<PathSegment>;

#[derive(Debug, Clone, Copy)]
pub enum NodeRef<'a> {
    Block(&'a Block),
    Statement(&'a Statement),
    Expression(&'a Expression),
    IfClause(&'a IfClause),
    TableField(&'a TableField),
}

#[derive(Debug)]
pub enum NodeMut<'a> {
    Block(&'a mut Block),
    Statement(&'a mut Statement),
    Expression(&'a mut Expression),
    IfClause(&'a mut IfClause),
    TableField(&'a mut TableField),
}

/// An owned node, as handed to [`replace`].
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Block(Block),
    Statement(Statement),
    Expression(Expression),
    IfClause(IfClause),
    TableField(TableField),
}

impl Node {
    fn kind(&self) -> &'static str {
        match self {
            Node::Block(_) => "block",
            Node::Statement(_) => "statement",
            Node::Expression(_) => "expression",
            Node::IfClause(_) => "if clause",
            Node::TableField(_) => "table field",
        }
    }
}

fn push_list<'a, T>(
    out: &mut Vec<(PathSegment, NodeRef<'a>)>,
    name: &'static str,
    items: &'a [T],
    wrap: fn(&'a T) -> NodeRef<'a>,
) {
    for (i, item) in items.iter().enumerate() {
        out.push((PathSegment::Item(name, i), wrap(item)));
    }
}

/// Direct children of a node, in source order.
pub fn children(node: NodeRef<'_>) -> Vec<(PathSegment, NodeRef<'_>)> {
    use PathSegment::Field;
    let mut out = Vec::new();
    match node {
        NodeRef::Block(block) => {
            for (i, stmt) in block.iter().enumerate() {
                out.push((PathSegment::Index(i), NodeRef::Statement(stmt)));
            }
        }
        NodeRef::Statement(stmt) => match stmt {
            Statement::Assignment { targets, values } => {
                push_list(&mut out, "targets", targets, NodeRef::Expression);
                push_list(&mut out, "values", values, NodeRef::Expression);
            }
            Statement::Local { values, .. } | Statement::Return { values } => {
                push_list(&mut out, "values", values, NodeRef::Expression);
            }
            Statement::LocalFunction { function, .. } | Statement::Function { function, .. } => {
                out.push((Field("body"), NodeRef::Block(&function.body)));
            }
            Statement::Call { call } => out.push((Field("call"), NodeRef::Expression(call))),
            Statement::Do { body } => out.push((Field("body"), NodeRef::Block(body))),
            Statement::While { condition, body } => {
                out.push((Field("condition"), NodeRef::Expression(condition)));
                out.push((Field("body"), NodeRef::Block(body)));
            }
            Statement::Repeat { body, condition } => {
                out.push((Field("body"), NodeRef::Block(body)));
                out.push((Field("condition"), NodeRef::Expression(condition)));
            }
            Statement::If { clauses, else_body } => {
                push_list(&mut out, "clauses", clauses, NodeRef::IfClause);
                if let Some(else_body) = else_body {
                    out.push((Field("else_body"), NodeRef::Block(else_body)));
                }
            }
            Statement::NumericFor {
                start,
                end,
                step,
                body,
                ..
            } => {
                out.push((Field("start"), NodeRef::Expression(start)));
                out.push((Field("end"), NodeRef::Expression(end)));
                if let Some(step) = step {
                    out.push((Field("step"), NodeRef::Expression(step)));
                }
                out.push((Field("body"), NodeRef::Block(body)));
            }
            Statement::GenericFor {
                iterators, body, ..
            } => {
                push_list(&mut out, "iterators", iterators, NodeRef::Expression);
                out.push((Field("body"), NodeRef::Block(body)));
            }
            Statement::Break => {}
        },
        NodeRef::IfClause(clause) => {
            out.push((Field("condition"), NodeRef::Expression(&clause.condition)));
            out.push((Field("body"), NodeRef::Block(&clause.body)));
        }
        NodeRef::TableField(field) => match field {
            TableField::Positional(value) | TableField::Named { value, .. } => {
                out.push((Field("value"), NodeRef::Expression(value)));
            }
            TableField::Keyed { key, value } => {
                out.push((Field("key"), NodeRef::Expression(key)));
                out.push((Field("value"), NodeRef::Expression(value)));
            }
        },
        NodeRef::Expression(expr) => match expr {
            Expression::Nil
            | Expression::True
            | Expression::False
            | Expression::Vararg
            | Expression::Number(_)
            | Expression::String(_)
            | Expression::Identifier(_) => {}
            Expression::Function(function) => {
                out.push((Field("body"), NodeRef::Block(&function.body)));
            }
            Expression::Table(fields) => push_list(&mut out, "fields", fields, NodeRef::TableField),
            Expression::Binary { left, right, .. } | Expression::Logical { left, right, .. } => {
                out.push((Field("left"), NodeRef::Expression(left)));
                out.push((Field("right"), NodeRef::Expression(right)));
            }
            Expression::Unary { operand, .. } => {
                out.push((Field("operand"), NodeRef::Expression(operand)));
            }
            Expression::Member { base, .. } => out.push((Field("base"), NodeRef::Expression(base))),
            Expression::Index { base, key } => {
                out.push((Field("base"), NodeRef::Expression(base)));
                out.push((Field("key"), NodeRef::Expression(key)));
            }
            Expression::Call { callee, args } => {
                out.push((Field("callee"), NodeRef::Expression(callee)));
                push_list(&mut out, "args", args, NodeRef::Expression);
            }
            Expression::MethodCall { receiver, args, .. } => {
                out.push((Field("receiver"), NodeRef::Expression(receiver)));
                push_list(&mut out, "args", args, NodeRef::Expression);
            }
            Expression::Paren(inner) => out.push((Field("inner"), NodeRef::Expression(inner))),
        },
    }
    out
}

fn child_mut(node: NodeMut<'_>, segment: PathSegment) -> Option<NodeMut<'_>> {
    use PathSegment::{Field, Index, Item};
    match (node, segment) {
        (NodeMut::Block(block), Index(i)) => block.get_mut(i).map(NodeMut::Statement),
        (NodeMut::Statement(stmt), segment) => match (stmt, segment) {
            (Statement::Assignment { targets, .. }, Item("targets", i)) => {
                targets.get_mut(i).map(NodeMut::Expression)
            }
            (
                Statement::Assignment { values, .. }
                | Statement::Local { values, .. }
                | Statement::Return { values },
                Item("values", i),
            ) => values.get_mut(i).map(NodeMut::Expression),
            (
                Statement::LocalFunction { function, .. } | Statement::Function { function, .. },
                Field("body"),
            ) => Some(NodeMut::Block(&mut function.body)),
            (Statement::Call { call }, Field("call")) => Some(NodeMut::Expression(call)),
            (
                Statement::Do { body }
                | Statement::While { body, .. }
                | Statement::Repeat { body, .. }
                | Statement::NumericFor { body, .. }
                | Statement::GenericFor { body, .. },
                Field("body"),
            ) => Some(NodeMut::Block(body)),
            (
                Statement::While { condition, .. } | Statement::Repeat { condition, .. },
                Field("condition"),
            ) => Some(NodeMut::Expression(condition)),
            (Statement::If { clauses, .. }, Item("clauses", i)) => {
                clauses.get_mut(i).map(NodeMut::IfClause)
            }
            (Statement::If { else_body, .. }, Field("else_body")) => {
                else_body.as_mut().map(NodeMut::Block)
            }
            (Statement::NumericFor { start, .. }, Field("start")) => {
                Some(NodeMut::Expression(start))
            }
            (Statement::NumericFor { end, .. }, Field("end")) => Some(NodeMut::Expression(end)),
            (Statement::NumericFor { step, .. }, Field("step")) => step.as_mut().map(NodeMut::Expression),
            (Statement::GenericFor { iterators, .. }, Item("iterators", i)) => {
                iterators.get_mut(i).map(NodeMut::Expression)
            }
            _ => None,
        },
        (NodeMut::IfClause(clause), Field("condition")) => {
            Some(NodeMut::Expression(&mut clause.condition))
        }
        (NodeMut::IfClause(clause), Field("body")) => Some(NodeMut::Block(&mut clause.body)),
        (NodeMut::TableField(field), segment) => match (field, segment) {
            (
                TableField::Positional(value)
                | TableField::Named { value, .. }
                | TableField::Keyed { value, .. },
                Field("value"),
            ) => Some(NodeMut::Expression(value)),
            (TableField::Keyed { key, .. }, Field("key")) => Some(NodeMut::Expression(key)),
            _ => None,
        },
        (NodeMut::Expression(expr), segment) => match (expr, segment) {
            (Expression::Function(function), Field("body")) => {
                Some(NodeMut::Block(&mut function.body))
            }
            (Expression::Table(fields), Item("fields", i)) => {
                fields.get_mut(i).map(NodeMut::TableField)
            }
            (
                Expression::Binary { left, .. } | Expression::Logical { left, .. },
                Field("left"),
            ) => Some(NodeMut::Expression(left)),
            (
                Expression::Binary { right, .. } | Expression::Logical { right, .. },
                Field("right"),
            ) => Some(NodeMut::Expression(right)),
            (Expression::Unary { operand, .. }, Field("operand")) => {
                Some(NodeMut::Expression(operand))
            }
            (
                Expression::Member { base, .. } | Expression::Index { base, .. },
                Field("base"),
            ) => Some(NodeMut::Expression(base)),
            (Expression::Index { key, .. }, Field("key")) => Some(NodeMut::Expression(key)),
            (Expression::Call { callee, .. }, Field("callee")) => {
                Some(NodeMut::Expression(callee))
            }
            (Expression::MethodCall { receiver, .. }, Field("receiver")) => {
                Some(NodeMut::Expression(receiver))
            }
            (
                Expression::Call { args, .. } | Expression::MethodCall { args, .. },
                Item("args", i),
            ) => args.get_mut(i).map(NodeMut::Expression),
            (Expression::Paren(inner), Field("inner")) => Some(NodeMut::Expression(inner)),
            _ => None,
        },
        _ => None,
    }
}

/// Every node satisfying `predicate`, in pre-order. Nodes whose path would
/// be longer than `max_depth` are neither tested nor descended into.
pub fn find<F>(root: &Block, max_depth: usize, mut predicate: F) -> Vec<Path>
where
    F: FnMut(NodeRef<'_>, &[PathSegment]) -> bool,
{
    let mut found = Vec::new();
    let mut path = Path::new();
    visit(NodeRef::Block(root), &mut path, max_depth, &mut predicate, &mut found);
    found
}

fn visit<F>(
    node: NodeRef<'_>,
    path: &mut Path,
    max_depth: usize,
    predicate: &mut F,
    found: &mut Vec<Path>,
) where
    F: FnMut(NodeRef<'_>, &[PathSegment]) -> bool,
{
    if predicate(node, path.as_slice()) {
        found.push(path.clone());
    }
    if path.len() >= max_depth {
        return;
    }
    for (segment, child) in children(node) {
        path.push(segment);
        visit(child, path, max_depth, predicate, found);
        path.pop();
    }
}

pub fn get<'a>(root: &'a Block, path: &[PathSegment]) -> Option<NodeRef<'a>> {
    let mut node = NodeRef::Block(root);
    for segment in path {
        node = children(node)
            .into_iter()
            .find(|(candidate, _)| candidate == segment)
            .map(|(_, child)| child)?;
    }
    Some(node)
}

pub fn get_mut<'a>(root: &'a mut Block, path: &[PathSegment]) -> Option<NodeMut<'a>> {
    let mut node = NodeMut::Block(root);
    for segment in path {
        node = child_mut(node, *segment)?;
    }
    Some(node)
}

/// Overwrite the node at `path`. Returns `false`, leaving the tree as it
/// was, when the path no longer resolves or names a slot of another kind.
pub fn replace(root: &mut Block, path: &[PathSegment], node: Node) -> bool {
    let kind = node.kind();
    let replaced = match (get_mut(root, path), node) {
        (Some(NodeMut::Block(slot)), Node::Block(new)) => {
            *slot = new;
            true
        }
        (Some(NodeMut::Statement(slot)), Node::Statement(new)) => {
            *slot = new;
            true
        }
        (Some(NodeMut::Expression(slot)), Node::Expression(new)) => {
            *slot = new;
            true
        }
        (Some(NodeMut::IfClause(slot)), Node::IfClause(new)) => {
            *slot = new;
            true
        }
        (Some(NodeMut::TableField(slot)), Node::TableField(new)) => {
            *slot = new;
            true
        }
        _ => false,
    };
    if !replaced {
        debug!(?path, kind, "replacement target no longer resolves, skipped");
    }
    replaced
}

/// Longest paths first; paths of equal length keep their relative order.
pub fn sort_deepest_first(paths: &mut [Path]) {
    paths.sort_by(|a, b| b.len().cmp(&a.len()));
}
