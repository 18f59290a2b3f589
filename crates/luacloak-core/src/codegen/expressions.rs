use super::CodeGenerator;
use crate::ast::*;

pub mod binary_ops;

use binary_ops::{left_needs_parens, right_needs_parens, unary_operand_needs_parens};

impl CodeGenerator {
    pub fn generate_expression(&mut self, expr: &Expression) {
        match expr {
            Expression::Nil => self.write("nil"),
            Expression::True => self.write("true"),
            Expression::False => self.write("false"),
            Expression::Vararg => self.write("..."),
            Expression::Number(number) => self.write(&number.raw),
            Expression::String(string) => self.write(&string.raw),
            Expression::Identifier(name) => self.write(name),
            Expression::Function(function) => {
                self.write("function");
                self.generate_function_body(function);
            }
            Expression::Table(fields) => self.generate_table(fields),
            Expression::Binary { op, left, right } => {
                self.generate_infix(op.priority(), op.as_str(), left, right)
            }
            Expression::Logical { op, left, right } => {
                self.generate_infix(op.priority(), op.as_str(), left, right)
            }
            Expression::Unary { op, operand } => {
                self.write(op.as_str());
                let start = self.emitter.position();
                self.generate_operand(operand, unary_operand_needs_parens(operand));
                // `- -x` must not turn into a comment
                if *op == UnaryOp::Negate && self.emitter.byte_at(start) == Some(b'-') {
                    self.emitter.insert_at(start, " ");
                }
            }
            Expression::Member { base, name } => {
                self.generate_prefix(base);
                self.write(".");
                self.write(name);
            }
            Expression::Index { base, key } => {
                self.generate_prefix(base);
                self.generate_bracketed(key);
            }
            Expression::Call { callee, args } => {
                self.generate_prefix(callee);
                self.generate_arguments(args);
            }
            Expression::MethodCall {
                receiver,
                method,
                args,
            } => {
                self.generate_prefix(receiver);
                self.write(":");
                self.write(method);
                self.generate_arguments(args);
            }
            Expression::Paren(inner) => {
                self.write("(");
                self.generate_expression(inner);
                self.write(")");
            }
        }
    }

    fn generate_infix(&mut self, priority: (u8, u8), op: &str, left: &Expression, right: &Expression) {
        self.generate_operand(left, left_needs_parens(priority, left));
        self.write(" ");
        self.write(op);
        self.write(" ");
        self.generate_operand(right, right_needs_parens(priority, right));
    }

    fn generate_operand(&mut self, operand: &Expression, parenthesize: bool) {
        if parenthesize {
            self.write("(");
            self.generate_expression(operand);
            self.write(")");
        } else {
            self.generate_expression(operand);
        }
    }

    /// Bases of calls and accesses must be prefix expressions.
    fn generate_prefix(&mut self, base: &Expression) {
        self.generate_operand(base, !base.is_prefix());
    }

    /// `[key]`, spaced out when the key itself opens with a bracket.
    fn generate_bracketed(&mut self, key: &Expression) {
        self.write("[");
        let start = self.emitter.position();
        self.generate_expression(key);
        if self.emitter.byte_at(start) == Some(b'[') {
            self.emitter.insert_at(start, " ");
            self.write(" ");
        }
        self.write("]");
    }

    fn generate_arguments(&mut self, args: &[Expression]) {
        self.write("(");
        self.generate_expression_list(args);
        self.write(")");
    }

    pub(super) fn generate_expression_list(&mut self, expressions: &[Expression]) {
        for (i, expression) in expressions.iter().enumerate() {
            if i > 0 {
                self.write(", ");
            }
            self.generate_expression(expression);
        }
    }

    fn generate_table(&mut self, fields: &[TableField]) {
        if fields.is_empty() {
            self.write("{}");
            return;
        }
        self.write("{ ");
        for (i, field) in fields.iter().enumerate() {
            if i > 0 {
                self.write(", ");
            }
            match field {
                TableField::Positional(value) => self.generate_expression(value),
                TableField::Named { name, value } => {
                    self.write(name);
                    self.write(" = ");
                    self.generate_expression(value);
                }
                TableField::Keyed { key, value } => {
                    self.generate_bracketed(key);
                    self.write(" = ");
                    self.generate_expression(value);
                }
            }
        }
        self.write(" }");
    }

    /// Parameter list and body, after `function` and an optional name.
    pub(super) fn generate_function_body(&mut self, function: &FunctionBody) {
        self.write("(");
        let mut params = function.params.join(", ");
        if function.is_vararg {
            if !params.is_empty() {
                params.push_str(", ");
            }
            params.push_str("...");
        }
        self.write(&params);
        self.writeln(")");
        self.indent();
        self.generate_block(&function.body);
        self.dedent();
        self.write_indent();
        self.write("end");
    }
}
