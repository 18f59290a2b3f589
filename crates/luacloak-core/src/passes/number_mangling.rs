//! Integer literals become arithmetic that evaluates to the same value.

use super::{ObfuscationPass, PassContext};
use crate::ast::*;
use crate::error::{ObfuscateError, Result};
use crate::tree::{self, Node, NodeRef};
use rand::Rng;
use tracing::debug;

/// Literals at or above this magnitude are left alone.
const LIMIT: i64 = 1 << 31;
const SEED_RANGE: i64 = 1_000_000;
const MAX_FACTOR: i64 = 1000;
/// Keeps every intermediate value exactly representable as a double.
const MAX_PRODUCT: i64 = 100_000_000_000_000;

pub struct NumberManglingPass {
    percentage: u8,
}

impl NumberManglingPass {
    pub fn new(percentage: u8) -> Self {
        Self { percentage }
    }
}

impl Default for NumberManglingPass {
    fn default() -> Self {
        Self::new(75)
    }
}

impl ObfuscationPass for NumberManglingPass {
    fn name(&self) -> &'static str {
        "mangle-numbers"
    }

    fn description(&self) -> &'static str {
        "Mangling numbers"
    }

    fn run(&mut self, mut block: Block, ctx: &mut PassContext) -> Result<Block> {
        let literals = tree::find(&block, usize::MAX, |node, _| {
            matches!(
                node,
                NodeRef::Expression(Expression::Number(literal))
                    if literal.integer_value().is_some_and(|v| v.unsigned_abs() < LIMIT as u64)
            )
        });
        let selected = ctx.sample(literals, self.percentage);
        let mut mangled = 0usize;

        for path in &selected {
            let Some(NodeRef::Expression(Expression::Number(literal))) = tree::get(&block, path)
            else {
                continue;
            };
            let Some(value) = literal.integer_value() else {
                continue;
            };
            let equation = equation_for(value, &mut ctx.rng);
            if evaluate(&equation) != Some(value) {
                return Err(ObfuscateError::InvariantViolation(format!(
                    "mangled form of {} does not evaluate back to it",
                    value
                )));
            }
            if tree::replace(&mut block, path, Node::Expression(equation)) {
                mangled += 1;
            }
        }

        debug!(mangled, "numbers mangled");
        Ok(block)
    }
}

fn hex(value: i64) -> Expression {
    let literal = Expression::Number(NumberLiteral::new(format!("0x{:X}", value.unsigned_abs())));
    if value < 0 {
        Expression::Unary {
            op: UnaryOp::Negate,
            operand: Box::new(literal),
        }
    } else {
        literal
    }
}

/// `((a op b) op c) +/- d` equal to `target`.
fn equation_for<R: Rng + ?Sized>(target: i64, rng: &mut R) -> Expression {
    let mut running = rng.gen_range(-SEED_RANGE..=SEED_RANGE);
    let mut expr = hex(running);

    for _ in 0..2 {
        let mut op = [BinaryOp::Add, BinaryOp::Subtract, BinaryOp::Multiply][rng.gen_range(0..3)];
        let operand = if op == BinaryOp::Multiply {
            let factor = rng.gen_range(1..=MAX_FACTOR);
            if (running * factor).abs() > MAX_PRODUCT {
                op = BinaryOp::Add;
                rng.gen_range(1..=SEED_RANGE)
            } else {
                factor
            }
        } else {
            rng.gen_range(1..=SEED_RANGE)
        };
        running = match op {
            BinaryOp::Add => running + operand,
            BinaryOp::Subtract => running - operand,
            _ => running * operand,
        };
        expr = Expression::Paren(Box::new(Expression::binary(op, expr, hex(operand))));
    }

    let offset = target - running;
    let op = if offset >= 0 {
        BinaryOp::Add
    } else {
        BinaryOp::Subtract
    };
    Expression::Paren(Box::new(Expression::binary(op, expr, hex(offset.abs()))))
}

/// Value of an integer expression made of literals, `+ - *`, negation and
/// parentheses. `None` for anything else or on overflow.
fn evaluate(expr: &Expression) -> Option<i64> {
    match expr {
        Expression::Number(literal) => literal.integer_value(),
        Expression::Paren(inner) => evaluate(inner),
        Expression::Unary {
            op: UnaryOp::Negate,
            operand,
        } => evaluate(operand)?.checked_neg(),
        Expression::Binary { op, left, right } => {
            let (left, right) = (evaluate(left)?, evaluate(right)?);
            match op {
                BinaryOp::Add => left.checked_add(right),
                BinaryOp::Subtract => left.checked_sub(right),
                BinaryOp::Multiply => left.checked_mul(right),
                _ => None,
            }
        }
        _ => None,
    }
}
