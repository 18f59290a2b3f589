//! Global indirection.
//!
//! Every free name becomes an index on an environment proxy, `P["print"]`.
//! The proxy is the real environment, passed to a wrapper function among
//! decoy arguments and recovered after a seeded shuffle:
//!
//! ```lua
//! return (function(...)
//!     local A = { ... }
//!     <shuffle A[1..N] with seed>
//!     local P = A[k]
//!     return (function(...) <program> end)(select(N + 1, ...))
//! end)(<decoys and (_ENV or getfenv())>, ...)
//! ```

pub mod shuffle;

use super::{reparse, ObfuscationPass, PassContext};
use crate::ast::*;
use crate::codegen::emit_block;
use crate::config::OutputFormat;
use crate::error::{ObfuscateError, Result};
use crate::scope::{walk_block, ScopeTracker, ScopeVisitor};
use rand::Rng;
use shuffle::ShuffleNames;
use tracing::debug;

const STAGE: &str = "global indirection";
const ENVIRONMENT: &str = "(_ENV or getfenv())";
const MIN_DECOYS: usize = 10;
const MAX_DECOYS: usize = 25;

pub struct GlobalIndirectionPass;

impl GlobalIndirectionPass {
    pub fn new() -> Self {
        Self
    }
}

impl Default for GlobalIndirectionPass {
    fn default() -> Self {
        Self::new()
    }
}

impl ObfuscationPass for GlobalIndirectionPass {
    fn name(&self) -> &'static str {
        "hide-globals"
    }

    fn description(&self) -> &'static str {
        "Hiding globals"
    }

    fn run(&mut self, mut block: Block, ctx: &mut PassContext) -> Result<Block> {
        let proxy = ctx.fresh_name();
        let mut rewriter = GlobalRewriter {
            proxy: &proxy,
            rewritten: 0,
        };
        let mut scope = ScopeTracker::new();
        scope.declare(proxy.as_str());
        walk_block(&mut rewriter, &mut scope, &mut block);
        debug!(globals = rewriter.rewritten, "global references rewritten");

        let decoys = ctx.rng.gen_range(MIN_DECOYS..=MAX_DECOYS);
        let count = decoys + 1;
        let environment_index = ctx.rng.gen_range(0..count);
        let arguments: Vec<String> = (0..count)
            .map(|i| {
                if i == environment_index {
                    ENVIRONMENT.to_string()
                } else {
                    decoy(&mut ctx.rng)
                }
            })
            .collect();

        let seed = ctx.rng.gen_range(0..shuffle::SEED_LIMIT);
        let slot = shuffle::predict_slot(seed, count, environment_index).ok_or_else(|| {
            ObfuscateError::InvariantViolation(format!(
                "environment index {} outside {} shuffled arguments",
                environment_index, count
            ))
        })?;

        let names = ShuffleNames {
            table: ctx.fresh_name(),
            state: ctx.fresh_name(),
            counter: ctx.fresh_name(),
            pick: ctx.fresh_name(),
        };
        let text = format!(
            "return (function(...)\n\
             local {table} = {{ ... }}\n\
             {shuffle}\
             local {proxy} = {table}[{index}]\n\
             return (function(...)\n{body}\nend)(select({rest}, ...))\n\
             end)({arguments}, ...)\n",
            table = names.table,
            shuffle = shuffle::render_lua(&names, seed, count),
            index = slot + 1,
            body = emit_block(&block, OutputFormat::Readable),
            rest = count + 1,
            arguments = arguments.join(", "),
        );
        reparse(STAGE, text)
    }
}

struct GlobalRewriter<'a> {
    proxy: &'a str,
    rewritten: usize,
}

impl GlobalRewriter<'_> {
    fn proxied(&mut self, name: &str) -> Expression {
        self.rewritten += 1;
        Expression::index(Expression::identifier(self.proxy), Expression::string(name))
    }
}

impl ScopeVisitor for GlobalRewriter<'_> {
    fn visit_reference(&mut self, expr: &mut Expression, bound: bool) {
        if bound {
            return;
        }
        if let Expression::Identifier(name) = expr {
            let name = std::mem::take(name);
            *expr = self.proxied(&name);
        }
    }

    fn visit_function_statement(&mut self, stmt: &mut Statement, root_bound: bool) {
        if root_bound {
            return;
        }
        let Statement::Function { name, function } = stmt else {
            return;
        };
        let mut target = self.proxied(name.root());
        for field in &name.path[1..] {
            target = Expression::Member {
                base: Box::new(target),
                name: field.clone(),
            };
        }
        let mut function = std::mem::replace(
            function,
            FunctionBody {
                params: Vec::new(),
                is_vararg: false,
                body: Vec::new(),
            },
        );
        if let Some(method) = name.method.take() {
            target = Expression::Member {
                base: Box::new(target),
                name: method,
            };
            function.params.insert(0, "self".to_string());
        }
        *stmt = Statement::Assignment {
            targets: vec![target],
            values: vec![Expression::Function(Box::new(function))],
        };
    }
}

/// An inert expression that looks like it means something.
fn decoy<R: Rng + ?Sized>(rng: &mut R) -> String {
    match rng.gen_range(0..4) {
        0 => {
            // the outer operator never divides, so a zero operand is harmless
            let outer = ["+", "-", "*"][rng.gen_range(0..3)];
            let a = binary_noise(rng);
            let b = binary_noise(rng);
            format!("({} {} {})", a, outer, b)
        }
        1 => {
            let comparison = [">", "<", "==", "~="][rng.gen_range(0..4)];
            format!(
                "({} {} {} and {} or {})",
                constant(rng),
                comparison,
                constant(rng),
                constant(rng),
                constant(rng)
            )
        }
        2 => format!(
            "(({} / {}) % {})",
            rng.gen_range(1_000_000..=9_999_999),
            1u32 << rng.gen_range(2..=8),
            rng.gen_range(128..=255)
        ),
        _ => {
            let length = rng.gen_range(5..=15);
            let text: String = (0..length)
                .map(|_| rng.gen_range(b'A'..=b'Z') as char)
                .collect();
            format!("(#(\"{}\") * {})", text, constant(rng))
        }
    }
}

fn binary_noise<R: Rng + ?Sized>(rng: &mut R) -> String {
    let op = ["+", "-", "*", "%"][rng.gen_range(0..4)];
    format!("({} {} {})", constant(rng), op, constant(rng))
}

fn constant<R: Rng + ?Sized>(rng: &mut R) -> String {
    if rng.gen_bool(0.5) {
        format!("0x{:X}", rng.gen_range(0x100..=0xFF_FFFF))
    } else {
        rng.gen_range(1000..=9_999_999).to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{parse, parse_expression};
    use crate::passes::test_support::{context, run_lua};
    use crate::tree::{self, NodeRef};
    use indoc::indoc;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn hide(source: &str, seed: u64) -> Block {
        let block = parse(source).unwrap();
        let mut ctx = context(seed, &block);
        GlobalIndirectionPass::new().run(block, &mut ctx).unwrap()
    }

    fn assert_same_results(source: &str) {
        for seed in [1, 2, 3, 4] {
            let hidden = emit_block(&hide(source, seed), OutputFormat::Readable);
            assert_eq!(run_lua(source), run_lua(&hidden), "hidden:\n{}", hidden);
        }
    }

    fn free_identifiers(block: &Block) -> Vec<String> {
        tree::find(block, usize::MAX, |node, _| {
            matches!(node, NodeRef::Expression(Expression::Identifier(name)) if name == "print" || name == "math")
        })
        .iter()
        .map(|path| format!("{:?}", path))
        .collect()
    }

    #[test]
    fn test_free_names_go_through_the_proxy() {
        let block = hide("print(math.floor(1.5))", 7);
        assert!(free_identifiers(&block).is_empty());
        let text = emit_block(&block, OutputFormat::Minified);
        assert!(text.contains("\"print\""), "{}", text);
        assert!(text.contains("\"math\"]).floor") || text.contains("\"math\"].floor"), "{}", text);
    }

    #[test]
    fn test_program_behaviour_is_kept() {
        assert_same_results(indoc! {r#"
            counter = 10
            local function bump(n) counter = counter + n return counter end
            local t = { floor = math.floor, text = string.rep("ab", 2) }
            return bump(5), t.floor(2.7), t.text, type(print), counter
        "#});
    }

    #[test]
    fn test_global_function_declarations() {
        assert_same_results(indoc! {r#"
            obj = { n = 1 }
            function obj.inc(k) obj.n = obj.n + k end
            function obj:get() return self.n end
            function helper() return "h" end
            obj.inc(4)
            return obj:get(), helper(), type(obj.get)
        "#});
    }

    #[test]
    fn test_chunk_varargs_are_forwarded() {
        let hidden = emit_block(&hide("return select('#', ...), ...", 3), OutputFormat::Minified);
        let lua = mlua::Lua::new();
        let (count, first): (i64, String) = lua
            .load(&hidden)
            .call(("x".to_string(), "y".to_string()))
            .unwrap();
        assert_eq!((count, first.as_str()), (2, "x"));
    }

    #[test]
    fn test_locals_and_parameters_stay_direct() {
        let block = hide("local x = 1 local function f(y) return x + y end return f(2)", 5);
        let text = emit_block(&block, OutputFormat::Minified);
        assert!(!text.contains("\"x\""), "{}", text);
        assert!(!text.contains("\"y\""), "{}", text);
        assert_eq!(run_lua(&text), vec!["Integer(3)".to_string()]);
    }

    #[test]
    fn test_decoys_are_valid_expressions_without_errors() {
        let mut rng = StdRng::seed_from_u64(99);
        let decoys: Vec<String> = (0..200).map(|_| decoy(&mut rng)).collect();
        for text in &decoys {
            assert!(parse_expression(text).is_ok(), "{}", text);
        }
        let source = format!("local t = {{ {} }} return #t", decoys.join(", "));
        assert_eq!(run_lua(&source), vec!["Integer(200)".to_string()]);
    }
}
