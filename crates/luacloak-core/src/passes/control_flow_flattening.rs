//! Control-flow flattening.
//!
//! Each block becomes a state machine: its statements are placed in the
//! arms of a binary dispatch tree keyed by a random state number, and a
//! `while` loop runs the arm for the current state until the state is `nil`.
//!
//! ```lua
//! local a, b               -- locals of the block, hoisted under fresh names
//! local S = 1174
//! while S ~= nil do
//!     if S < 90210 then ... S = 90210 else ... S = nil end
//! end
//! if S ~= nil then break end   -- only when a `break` escaped the machine
//! ```
//!
//! Blocks are rewritten deepest first, so nested blocks are already flat
//! when their parent is processed.

use super::{ObfuscationPass, PassContext};
use crate::ast::*;
use crate::error::Result;
use crate::scope::{walk_expression, walk_statement, ScopeTracker, ScopeVisitor};
use crate::tree::{self, NodeMut, NodeRef, PathSegment};
use rand::Rng;
use rustc_hash::{FxHashMap, FxHashSet};
use tracing::debug;

/// Blocks nested deeper than this many path steps are left as they are.
const MAX_BLOCK_DEPTH: usize = 30;

const STATE_MIN: i64 = -2_000_000_000;
const STATE_MAX: i64 = 2_000_000_000;

pub struct ControlFlowFlatteningPass;

impl ControlFlowFlatteningPass {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ControlFlowFlatteningPass {
    fn default() -> Self {
        Self::new()
    }
}

impl ObfuscationPass for ControlFlowFlatteningPass {
    fn name(&self) -> &'static str {
        "control-flow"
    }

    fn description(&self) -> &'static str {
        "Flattening control flow"
    }

    fn run(&mut self, mut block: Block, ctx: &mut PassContext) -> Result<Block> {
        let mut paths = tree::find(&block, MAX_BLOCK_DEPTH, |node, _| {
            matches!(node, NodeRef::Block(statements) if !statements.is_empty())
        });
        tree::sort_deepest_first(&mut paths);

        for path in &paths {
            let Some(NodeMut::Block(target)) = tree::get_mut(&mut block, path) else {
                continue;
            };
            let statements = std::mem::take(target);
            let (flattened, rebinder) = flatten(statements, ctx);
            *target = flattened;

            if let Some((PathSegment::Field("body"), parent)) = path.split_last() {
                if let Some(NodeMut::Statement(Statement::Repeat { condition, .. })) =
                    tree::get_mut(&mut block, parent)
                {
                    // `until` sees the body's locals, now under their aliases
                    rebinder.rebind_expression(condition);
                }
            }
        }

        debug!(blocks = paths.len(), "blocks flattened");
        Ok(block)
    }
}

/// Renames references to hoisted locals.
#[derive(Debug, Default)]
struct Rebinder {
    aliases: FxHashMap<String, String>,
}

impl Rebinder {
    fn rebind_expression(&self, expr: &mut Expression) {
        let mut visitor = RebindVisitor(&self.aliases);
        walk_expression(&mut visitor, &mut ScopeTracker::new(), expr);
    }

    fn rebind_statement(&self, stmt: &mut Statement) {
        let mut visitor = RebindVisitor(&self.aliases);
        walk_statement(&mut visitor, &mut ScopeTracker::new(), stmt);
    }

    /// Turn a top-level statement into one that can run inside a dispatch
    /// arm. Locals become assignments to fresh names declared up front.
    fn hoist(
        &mut self,
        stmt: Statement,
        ctx: &mut PassContext,
        declared: &mut Vec<String>,
    ) -> Statement {
        match stmt {
            Statement::Local { names, mut values } => {
                // initializers still see the previous bindings
                for value in &mut values {
                    self.rebind_expression(value);
                }
                let targets = names
                    .into_iter()
                    .map(|name| {
                        let alias = ctx.fresh_name();
                        declared.push(alias.clone());
                        self.aliases.insert(name, alias.clone());
                        Expression::Identifier(alias)
                    })
                    .collect();
                if values.is_empty() {
                    values.push(Expression::Nil);
                }
                Statement::Assignment { targets, values }
            }
            Statement::LocalFunction { name, function } => {
                let alias = ctx.fresh_name();
                declared.push(alias.clone());
                // the body may call itself
                self.aliases.insert(name, alias.clone());
                let mut value = Expression::Function(Box::new(function));
                self.rebind_expression(&mut value);
                Statement::Assignment {
                    targets: vec![Expression::Identifier(alias)],
                    values: vec![value],
                }
            }
            mut other => {
                self.rebind_statement(&mut other);
                other
            }
        }
    }
}

struct RebindVisitor<'a>(&'a FxHashMap<String, String>);

impl ScopeVisitor for RebindVisitor<'_> {
    fn visit_reference(&mut self, expr: &mut Expression, bound: bool) {
        if bound {
            return;
        }
        if let Expression::Identifier(name) = expr {
            if let Some(alias) = self.0.get(name.as_str()) {
                *name = alias.clone();
            }
        }
    }

    fn visit_function_statement(&mut self, stmt: &mut Statement, root_bound: bool) {
        if root_bound {
            return;
        }
        if let Statement::Function { name, .. } = stmt {
            if let Some(alias) = self.0.get(name.root()).cloned() {
                name.path[0] = alias;
            }
        }
    }
}

fn flatten(statements: Block, ctx: &mut PassContext) -> (Block, Rebinder) {
    let escapes = statements.iter().any(has_escaping_break);
    let mut rebinder = Rebinder::default();
    let mut declared = Vec::new();
    let segments: Vec<Statement> = statements
        .into_iter()
        .map(|stmt| rebinder.hoist(stmt, ctx, &mut declared))
        .collect();

    let state = ctx.fresh_name();
    let ids = state_ids(segments.len(), &mut ctx.rng);

    let mut arms: Vec<(i64, Block)> = segments
        .into_iter()
        .enumerate()
        .map(|(i, stmt)| {
            let mut body = Vec::with_capacity(2);
            let falls_through = !stmt.is_early_exit();
            body.push(stmt);
            if falls_through {
                let next = ids.get(i + 1).map_or(Expression::Nil, |&id| Expression::integer(id));
                body.push(Statement::Assignment {
                    targets: vec![Expression::identifier(&state)],
                    values: vec![next],
                });
            }
            (ids[i], body)
        })
        .collect();
    arms.sort_by_key(|(id, _)| *id);

    let mut out = Vec::with_capacity(4);
    if !declared.is_empty() {
        out.push(Statement::Local {
            names: declared,
            values: Vec::new(),
        });
    }
    out.push(Statement::Local {
        names: vec![state.clone()],
        values: vec![Expression::integer(ids[0])],
    });
    out.push(Statement::While {
        condition: state_is_live(&state),
        body: dispatch(&state, arms, &mut ctx.rng),
    });
    if escapes {
        out.push(Statement::If {
            clauses: vec![IfClause {
                condition: state_is_live(&state),
                body: vec![Statement::Break],
            }],
            else_body: None,
        });
    }
    (out, rebinder)
}

fn state_is_live(state: &str) -> Expression {
    Expression::binary(BinaryOp::NotEqual, Expression::identifier(state), Expression::Nil)
}

/// `count` distinct state numbers, in execution order.
fn state_ids<R: Rng + ?Sized>(count: usize, rng: &mut R) -> Vec<i64> {
    let mut seen = FxHashSet::default();
    let mut ids = Vec::with_capacity(count);
    while ids.len() < count {
        let id = rng.gen_range(STATE_MIN..=STATE_MAX);
        if seen.insert(id) {
            ids.push(id);
        }
    }
    ids
}

/// Binary search over the sorted arms. Each split picks one of four
/// equivalent comparison shapes.
fn dispatch<R: Rng + ?Sized>(state: &str, mut arms: Vec<(i64, Block)>, rng: &mut R) -> Block {
    if arms.len() <= 1 {
        return arms.pop().map(|(_, body)| body).unwrap_or_default();
    }
    let upper = arms.split_off(arms.len() / 2);
    let last_lower = arms[arms.len() - 1].0;
    let first_upper = upper[0].0;
    let s = || Expression::identifier(state);

    let (condition, then_arms, else_arms) = match rng.gen_range(0..4) {
        0 => (
            Expression::binary(BinaryOp::LessThan, Expression::integer(last_lower), s()),
            upper,
            arms,
        ),
        1 => (
            Expression::binary(BinaryOp::LessThanOrEqual, s(), Expression::integer(last_lower)),
            arms,
            upper,
        ),
        2 => (
            Expression::binary(BinaryOp::GreaterThan, Expression::integer(first_upper), s()),
            arms,
            upper,
        ),
        _ => (
            Expression::binary(BinaryOp::GreaterThanOrEqual, s(), Expression::integer(first_upper)),
            upper,
            arms,
        ),
    };

    vec![Statement::If {
        clauses: vec![IfClause {
            condition,
            body: dispatch(state, then_arms, rng),
        }],
        else_body: Some(dispatch(state, else_arms, rng)),
    }]
}

/// A `break` that would leave the block's enclosing loop. Loops and
/// functions catch their own.
fn has_escaping_break(stmt: &Statement) -> bool {
    match stmt {
        Statement::Break => true,
        Statement::Do { body } => body.iter().any(has_escaping_break),
        Statement::If { clauses, else_body } => {
            clauses
                .iter()
                .any(|clause| clause.body.iter().any(has_escaping_break))
                || else_body
                    .as_ref()
                    .is_some_and(|body| body.iter().any(has_escaping_break))
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codegen::emit_block;
    use crate::config::OutputFormat;
    use crate::parser::parse;
    use crate::passes::test_support::{context, run_lua};
    use indoc::indoc;

    fn flatten_source(source: &str, seed: u64) -> String {
        let block = parse(source).unwrap();
        let mut ctx = context(seed, &block);
        let block = ControlFlowFlatteningPass::new().run(block, &mut ctx).unwrap();
        emit_block(&block, OutputFormat::Readable)
    }

    fn assert_same_results(source: &str) {
        for seed in [1, 2, 3] {
            let flattened = flatten_source(source, seed);
            assert_eq!(run_lua(source), run_lua(&flattened), "flattened:\n{}", flattened);
        }
    }

    #[test]
    fn test_statements_run_in_order() {
        assert_same_results(indoc! {r#"
            local out = {}
            out[#out + 1] = "a"
            out[#out + 1] = "b"
            out[#out + 1] = "c"
            out[#out + 1] = "d"
            out[#out + 1] = "e"
            return table.concat(out)
        "#});
    }

    #[test]
    fn test_root_becomes_state_machine() {
        let text = flatten_source("local a = 1 local b = 2 return a + b", 5);
        let block = parse(&text).unwrap();
        assert!(matches!(block[0], Statement::Local { ref values, .. } if values.is_empty()));
        assert!(matches!(block[2], Statement::While { .. }));
        assert_eq!(run_lua(&text), vec!["Integer(3)".to_string()]);
    }

    #[test]
    fn test_early_return_stops_the_machine() {
        assert_same_results(indoc! {r#"
            local function f(x)
                if x > 1 then return "big" end
                return "small"
            end
            return f(5), f(0)
        "#});
    }

    #[test]
    fn test_break_is_forwarded_to_the_loop() {
        let source = indoc! {r#"
            local n = 0
            for i = 1, 10 do
                n = n + 1
                if i == 4 then break end
                n = n + 10
            end
            while true do
                n = n + 100
                break
            end
            return n
        "#};
        assert_same_results(source);
        assert!(flatten_source(source, 9).contains("break"));
    }

    #[test]
    fn test_repeat_condition_sees_hoisted_locals() {
        assert_same_results(indoc! {r#"
            local i = 0
            repeat
                local done = i >= 3
                i = i + 1
            until done
            return i
        "#});
    }

    #[test]
    fn test_shadowing_and_redeclaration() {
        assert_same_results(indoc! {r#"
            local x = 1
            local x = x + 1
            local f = function() return x end
            local x = x * 10
            return f(), x
        "#});
    }

    #[test]
    fn test_closures_capture_per_iteration() {
        assert_same_results(indoc! {r#"
            local fs = {}
            for i = 1, 3 do
                local v = i * 2
                fs[i] = function() return v end
            end
            return fs[1](), fs[2](), fs[3]()
        "#});
    }

    #[test]
    fn test_local_functions_and_methods() {
        assert_same_results(indoc! {r#"
            local function fact(n) if n <= 1 then return 1 end return n * fact(n - 1) end
            local obj = { v = 3 }
            function obj.get() return obj.v end
            function obj:twice() return self.v * 2 end
            return fact(5), obj.get(), obj:twice()
        "#});
    }

    #[test]
    fn test_reference_before_declaration_stays_global() {
        assert_same_results(indoc! {r#"
            g = "global"
            local before = g
            local g = "local"
            return before, g
        "#});
    }

    #[test]
    fn test_state_ids_are_distinct() {
        let mut ctx = context(3, &Vec::new());
        let ids = state_ids(200, &mut ctx.rng);
        let unique: FxHashSet<_> = ids.iter().collect();
        assert_eq!(unique.len(), 200);
        assert!(ids.iter().all(|id| (STATE_MIN..=STATE_MAX).contains(id)));
    }

    #[test]
    fn test_escaping_break_detection() {
        let block = parse("while true do if x then break end end").unwrap();
        assert!(!has_escaping_break(&block[0]));
        let Statement::While { body, .. } = &block[0] else {
            panic!("expected while");
        };
        assert!(has_escaping_break(&body[0]));
    }
}
