//! Lexical scope tracking and a scope-aware tree walker.
//!
//! [`ScopeTracker`] answers one question: is a name bound by a visible local
//! declaration at this point of the walk. The walk functions open a scope for
//! every construct that introduces one and register names exactly where Lua
//! makes them visible: local names after their initializers, a local
//! function's name before its body, loop variables and parameters for the
//! body only.

use crate::ast::*;
use rustc_hash::FxHashSet;

#[derive(Debug, Clone)]
pub struct ScopeTracker {
    scopes: Vec<FxHashSet<String>>,
}

impl ScopeTracker {
    pub fn new() -> Self {
        Self {
            scopes: vec![FxHashSet::default()],
        }
    }

    pub fn push(&mut self) {
        self.scopes.push(FxHashSet::default());
    }

    pub fn pop(&mut self) {
        // the outermost scope stays
        if self.scopes.len() > 1 {
            self.scopes.pop();
        }
    }

    pub fn declare(&mut self, name: impl Into<String>) {
        if let Some(innermost) = self.scopes.last_mut() {
            innermost.insert(name.into());
        }
    }

    pub fn is_bound(&self, name: &str) -> bool {
        self.scopes.iter().rev().any(|scope| scope.contains(name))
    }

    pub fn depth(&self) -> usize {
        self.scopes.len()
    }
}

impl Default for ScopeTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Hooks called by the walk functions. Every hook defaults to doing nothing.
pub trait ScopeVisitor {
    /// An identifier expression, read or assigned. `bound` is true when a
    /// visible declaration binds the name. The hook may replace the whole
    /// expression; the replacement is not walked.
    fn visit_reference(&mut self, _expr: &mut Expression, _bound: bool) {}

    /// A name being declared: local, local function, parameter or loop
    /// variable. Scoping follows the name as it was before the hook ran.
    fn visit_binding(&mut self, _name: &mut String) {}

    /// A `function a.b:c() ... end` statement, before its body is walked.
    /// `root_bound` tells whether `a` is a bound name. The hook may rewrite
    /// the statement; whatever it becomes is walked afterwards.
    fn visit_function_statement(&mut self, _stmt: &mut Statement, _root_bound: bool) {}
}

/// Walk a block in a scope of its own.
pub fn walk_block<V>(visitor: &mut V, scope: &mut ScopeTracker, block: &mut Block)
where
    V: ScopeVisitor + ?Sized,
{
    scope.push();
    walk_statements(visitor, scope, block);
    scope.pop();
}

/// Walk statements in the current scope.
pub fn walk_statements<V>(visitor: &mut V, scope: &mut ScopeTracker, block: &mut [Statement])
where
    V: ScopeVisitor + ?Sized,
{
    for stmt in block {
        walk_statement(visitor, scope, stmt);
    }
}

fn declare_binding<V>(visitor: &mut V, scope: &mut ScopeTracker, name: &mut String)
where
    V: ScopeVisitor + ?Sized,
{
    let original = name.clone();
    visitor.visit_binding(name);
    scope.declare(original);
}

pub fn walk_statement<V>(visitor: &mut V, scope: &mut ScopeTracker, stmt: &mut Statement)
where
    V: ScopeVisitor + ?Sized,
{
    if let Statement::Function { name, .. } = stmt {
        let root_bound = scope.is_bound(name.root());
        visitor.visit_function_statement(stmt, root_bound);
    }

    match stmt {
        Statement::Assignment { targets, values } => {
            walk_expressions(visitor, scope, values);
            walk_expressions(visitor, scope, targets);
        }
        Statement::Local { names, values } => {
            walk_expressions(visitor, scope, values);
            for name in names {
                declare_binding(visitor, scope, name);
            }
        }
        Statement::LocalFunction { name, function } => {
            declare_binding(visitor, scope, name);
            walk_function(visitor, scope, function, false);
        }
        Statement::Function { name, function } => {
            let is_method = name.method.is_some();
            walk_function(visitor, scope, function, is_method);
        }
        Statement::Call { call } => walk_expression(visitor, scope, call),
        Statement::Do { body } => walk_block(visitor, scope, body),
        Statement::While { condition, body } => {
            walk_expression(visitor, scope, condition);
            walk_block(visitor, scope, body);
        }
        Statement::Repeat { body, condition } => {
            // the condition sees the body's locals
            scope.push();
            walk_statements(visitor, scope, body);
            walk_expression(visitor, scope, condition);
            scope.pop();
        }
        Statement::If { clauses, else_body } => {
            for clause in clauses {
                walk_expression(visitor, scope, &mut clause.condition);
                walk_block(visitor, scope, &mut clause.body);
            }
            if let Some(else_body) = else_body {
                walk_block(visitor, scope, else_body);
            }
        }
        Statement::NumericFor {
            variable,
            start,
            end,
            step,
            body,
        } => {
            walk_expression(visitor, scope, start);
            walk_expression(visitor, scope, end);
            if let Some(step) = step {
                walk_expression(visitor, scope, step);
            }
            scope.push();
            declare_binding(visitor, scope, variable);
            walk_statements(visitor, scope, body);
            scope.pop();
        }
        Statement::GenericFor {
            variables,
            iterators,
            body,
        } => {
            walk_expressions(visitor, scope, iterators);
            scope.push();
            for variable in variables {
                declare_binding(visitor, scope, variable);
            }
            walk_statements(visitor, scope, body);
            scope.pop();
        }
        Statement::Return { values } => walk_expressions(visitor, scope, values),
        Statement::Break => {}
    }
}

fn walk_function<V>(
    visitor: &mut V,
    scope: &mut ScopeTracker,
    function: &mut FunctionBody,
    implicit_self: bool,
) where
    V: ScopeVisitor + ?Sized,
{
    scope.push();
    if implicit_self {
        scope.declare("self");
    }
    for param in &mut function.params {
        declare_binding(visitor, scope, param);
    }
    walk_statements(visitor, scope, &mut function.body);
    scope.pop();
}

fn walk_expressions<V>(visitor: &mut V, scope: &mut ScopeTracker, expressions: &mut [Expression])
where
    V: ScopeVisitor + ?Sized,
{
    for expr in expressions {
        walk_expression(visitor, scope, expr);
    }
}

pub fn walk_expression<V>(visitor: &mut V, scope: &mut ScopeTracker, expr: &mut Expression)
where
    V: ScopeVisitor + ?Sized,
{
    match expr {
        Expression::Identifier(name) => {
            let bound = scope.is_bound(name);
            visitor.visit_reference(expr, bound);
        }
        Expression::Nil
        | Expression::True
        | Expression::False
        | Expression::Vararg
        | Expression::Number(_)
        | Expression::String(_) => {}
        Expression::Function(function) => walk_function(visitor, scope, function, false),
        Expression::Table(fields) => {
            for field in fields {
                match field {
                    TableField::Positional(value) | TableField::Named { value, .. } => {
                        walk_expression(visitor, scope, value);
                    }
                    TableField::Keyed { key, value } => {
                        walk_expression(visitor, scope, key);
                        walk_expression(visitor, scope, value);
                    }
                }
            }
        }
        Expression::Binary { left, right, .. } | Expression::Logical { left, right, .. } => {
            walk_expression(visitor, scope, left);
            walk_expression(visitor, scope, right);
        }
        Expression::Unary { operand, .. } => walk_expression(visitor, scope, operand),
        Expression::Member { base, .. } => walk_expression(visitor, scope, base),
        Expression::Index { base, key } => {
            walk_expression(visitor, scope, base);
            walk_expression(visitor, scope, key);
        }
        Expression::Call { callee, args } => {
            walk_expression(visitor, scope, callee);
            walk_expressions(visitor, scope, args);
        }
        Expression::MethodCall { receiver, args, .. } => {
            walk_expression(visitor, scope, receiver);
            walk_expressions(visitor, scope, args);
        }
        Expression::Paren(inner) => walk_expression(visitor, scope, inner),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    /// Records every reference with its classification.
    #[derive(Default)]
    struct Classifier {
        references: Vec<(String, bool)>,
        bindings: Vec<String>,
    }

    impl ScopeVisitor for Classifier {
        fn visit_reference(&mut self, expr: &mut Expression, bound: bool) {
            if let Expression::Identifier(name) = expr {
                self.references.push((name.clone(), bound));
            }
        }

        fn visit_binding(&mut self, name: &mut String) {
            self.bindings.push(name.clone());
        }
    }

    fn classify(source: &str) -> Classifier {
        let mut block = parse(source).unwrap();
        let mut classifier = Classifier::default();
        walk_block(&mut classifier, &mut ScopeTracker::new(), &mut block);
        classifier
    }

    fn refs(pairs: &[(&str, bool)]) -> Vec<(String, bool)> {
        pairs.iter().map(|(n, b)| (n.to_string(), *b)).collect()
    }

    #[test]
    fn test_tracker_shadowing() {
        let mut scope = ScopeTracker::new();
        scope.declare("x");
        scope.push();
        scope.declare("y");
        assert!(scope.is_bound("x") && scope.is_bound("y"));
        scope.pop();
        assert!(!scope.is_bound("y"));
        scope.pop();
        assert_eq!(scope.depth(), 1);
        assert!(scope.is_bound("x"));
    }

    #[test]
    fn test_parameters_bound_globals_free() {
        let result = classify("function f(p) local q = p + g end");
        assert_eq!(result.references, refs(&[("p", true), ("g", false)]));
        assert_eq!(result.bindings, vec!["p", "q"]);
    }

    #[test]
    fn test_local_visible_only_after_initializer() {
        let result = classify("local x = x; print(x)");
        assert_eq!(
            result.references,
            refs(&[("x", false), ("print", false), ("x", true)])
        );
    }

    #[test]
    fn test_local_function_sees_itself() {
        let result = classify("local function f() return f() end");
        assert_eq!(result.references, refs(&[("f", true)]));
    }

    #[test]
    fn test_block_scopes_close() {
        let result = classify("do local a = 1 end print(a) for i = 1, 2 do x = i end y = i");
        assert_eq!(
            result.references,
            refs(&[
                ("print", false),
                ("a", false),
                ("i", true),
                ("x", false),
                ("i", false),
                ("y", false),
            ])
        );
    }

    #[test]
    fn test_repeat_condition_sees_body_locals() {
        let result = classify("repeat local done = true until done");
        assert_eq!(result.references, refs(&[("done", true)]));
    }

    #[test]
    fn test_method_has_implicit_self() {
        let result = classify("function obj:m() return self, obj end");
        assert_eq!(result.references, refs(&[("self", true), ("obj", false)]));
    }

    #[test]
    fn test_field_names_are_not_references() {
        let result = classify("local t = { a = 1 } print(t.a)");
        assert_eq!(result.references, refs(&[("print", false), ("t", true)]));
    }
}
