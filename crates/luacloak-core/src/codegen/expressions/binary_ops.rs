//! When an operand has to be parenthesised to keep its place in the tree.

use crate::ast::{Expression, UNARY_PRIORITY};

/// Binding priorities of an infix expression, `None` for anything else.
pub fn infix_priority(expression: &Expression) -> Option<(u8, u8)> {
    match expression {
        Expression::Binary { op, .. } => Some(op.priority()),
        Expression::Logical { op, .. } => Some(op.priority()),
        _ => None,
    }
}

/// Whether `operand`, as the left operand of an operator with priorities
/// `parent`, would be re-associated without parentheses.
pub fn left_needs_parens(parent: (u8, u8), operand: &Expression) -> bool {
    if let Some((_, right)) = infix_priority(operand) {
        return parent.0 > right;
    }
    matches!(operand, Expression::Unary { .. }) && parent.0 > UNARY_PRIORITY
}

pub fn right_needs_parens(parent: (u8, u8), operand: &Expression) -> bool {
    match infix_priority(operand) {
        Some((left, _)) => left <= parent.1,
        None => false,
    }
}

pub fn unary_operand_needs_parens(operand: &Expression) -> bool {
    match infix_priority(operand) {
        Some((left, _)) => left <= UNARY_PRIORITY,
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{BinaryOp, UnaryOp};

    fn binary(op: BinaryOp) -> Expression {
        Expression::binary(op, Expression::identifier("x"), Expression::identifier("y"))
    }

    #[test]
    fn test_same_priority_left_associative() {
        let parent = BinaryOp::Subtract.priority();
        assert!(!left_needs_parens(parent, &binary(BinaryOp::Add)));
        assert!(right_needs_parens(parent, &binary(BinaryOp::Add)));
    }

    #[test]
    fn test_right_associative_operators() {
        let parent = BinaryOp::Concatenate.priority();
        assert!(left_needs_parens(parent, &binary(BinaryOp::Concatenate)));
        assert!(!right_needs_parens(parent, &binary(BinaryOp::Concatenate)));
    }

    #[test]
    fn test_unary_under_power() {
        let negated = Expression::Unary {
            op: UnaryOp::Negate,
            operand: Box::new(Expression::identifier("x")),
        };
        assert!(left_needs_parens(BinaryOp::Power.priority(), &negated));
        assert!(!left_needs_parens(BinaryOp::Multiply.priority(), &negated));
        assert!(!unary_operand_needs_parens(&binary(BinaryOp::Power)));
        assert!(unary_operand_needs_parens(&binary(BinaryOp::Multiply)));
    }
}
