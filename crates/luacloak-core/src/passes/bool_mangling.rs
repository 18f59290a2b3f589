//! `true` and `false` become comparisons between random integers.

use super::{ObfuscationPass, PassContext};
use crate::ast::*;
use crate::error::Result;
use crate::tree::{self, Node, NodeRef};
use rand::Rng;
use tracing::debug;

const OPERAND_RANGE: i64 = 9_000_000_000;
const MAX_GAP: i64 = 900_000;

/// (operator when true, operator when false, whether the right operand is
/// above the left one)
const SHAPES: [(BinaryOp, BinaryOp, bool); 5] = [
    (BinaryOp::NotEqual, BinaryOp::Equal, true),
    (BinaryOp::GreaterThan, BinaryOp::LessThanOrEqual, false),
    (BinaryOp::GreaterThanOrEqual, BinaryOp::LessThan, false),
    (BinaryOp::LessThan, BinaryOp::GreaterThanOrEqual, true),
    (BinaryOp::LessThanOrEqual, BinaryOp::GreaterThan, true),
];

pub struct BoolManglingPass {
    percentage: u8,
}

impl BoolManglingPass {
    pub fn new(percentage: u8) -> Self {
        Self { percentage }
    }
}

impl Default for BoolManglingPass {
    fn default() -> Self {
        Self::new(80)
    }
}

impl ObfuscationPass for BoolManglingPass {
    fn name(&self) -> &'static str {
        "mangle-bools"
    }

    fn description(&self) -> &'static str {
        "Mangling booleans"
    }

    fn run(&mut self, mut block: Block, ctx: &mut PassContext) -> Result<Block> {
        let literals = tree::find(&block, usize::MAX, |node, _| {
            matches!(node, NodeRef::Expression(Expression::True | Expression::False))
        });
        let selected = ctx.sample(literals, self.percentage);
        let mut mangled = 0usize;
        for path in &selected {
            let value = matches!(tree::get(&block, path), Some(NodeRef::Expression(Expression::True)));
            let comparison = comparison_for(value, &mut ctx.rng);
            if tree::replace(&mut block, path, Node::Expression(comparison)) {
                mangled += 1;
            }
        }
        debug!(mangled, "booleans mangled");
        Ok(block)
    }
}

fn comparison_for<R: Rng + ?Sized>(value: bool, rng: &mut R) -> Expression {
    let (when_true, when_false, ascending) = SHAPES[rng.gen_range(0..SHAPES.len())];
    let left = rng.gen_range(-OPERAND_RANGE..=OPERAND_RANGE);
    let gap = rng.gen_range(1..=MAX_GAP);
    let right = if ascending { left + gap } else { left - gap };
    let op = if value { when_true } else { when_false };
    Expression::Paren(Box::new(Expression::binary(
        op,
        Expression::integer(left),
        Expression::integer(right),
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codegen::emit_expression;
    use crate::config::OutputFormat;
    use crate::parser::parse;
    use crate::passes::test_support::{context, run_lua};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_every_shape_keeps_the_truth_value() {
        let mut rng = StdRng::seed_from_u64(12);
        let mut checks = Vec::new();
        for i in 0..60 {
            let value = i % 2 == 0;
            let text = emit_expression(&comparison_for(value, &mut rng), OutputFormat::Minified);
            checks.push(format!("({} == {})", text, value));
        }
        let source = format!("return {}", checks.join(" and "));
        assert_eq!(run_lua(&source), vec!["Boolean(true)".to_string()]);
    }

    #[test]
    fn test_program_with_booleans() {
        let source = "local t = { a = true, b = false } if t.a and not t.b then return true, false end";
        let block = parse(source).unwrap();
        let mut ctx = context(2, &block);
        let block = BoolManglingPass::new(100).run(block, &mut ctx).unwrap();
        let text = crate::codegen::emit_block(&block, OutputFormat::Minified);
        assert!(!text.contains("true") && !text.contains("false"), "{}", text);
        assert_eq!(run_lua(source), run_lua(&text));
    }
}
