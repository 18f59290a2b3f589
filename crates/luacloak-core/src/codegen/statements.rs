use super::CodeGenerator;
use crate::ast::*;

impl CodeGenerator {
    pub fn generate_block(&mut self, block: &[Statement]) {
        for (i, stmt) in block.iter().enumerate() {
            let next = block.get(i + 1);
            // A return or break must close its block; one that does not is
            // given a block of its own.
            let wrap = stmt.is_early_exit() && next.is_some();
            if wrap {
                self.write_indent();
                self.writeln("do");
                self.indent();
            }
            self.write_indent();
            self.generate_statement_body(stmt);
            if wrap {
                self.writeln("");
                self.dedent();
                self.write_indent();
                self.write("end");
            }
            if next.is_some_and(starts_with_paren) {
                self.write(";");
            }
            self.writeln("");
        }
    }

    pub fn generate_statement(&mut self, stmt: &Statement) {
        self.write_indent();
        self.generate_statement_body(stmt);
    }

    fn generate_statement_body(&mut self, stmt: &Statement) {
        match stmt {
            Statement::Assignment { targets, values } => {
                self.generate_expression_list(targets);
                self.write(" = ");
                self.generate_expression_list(values);
            }
            Statement::Local { names, values } => {
                self.write("local ");
                self.write(&names.join(", "));
                if !values.is_empty() {
                    self.write(" = ");
                    self.generate_expression_list(values);
                }
            }
            Statement::LocalFunction { name, function } => {
                self.write("local function ");
                self.write(name);
                self.generate_function_body(function);
            }
            Statement::Function { name, function } => {
                self.write("function ");
                self.write(&name.path.join("."));
                if let Some(method) = &name.method {
                    self.write(":");
                    self.write(method);
                }
                self.generate_function_body(function);
            }
            Statement::Call { call } => self.generate_expression(call),
            Statement::Do { body } => {
                self.writeln("do");
                self.generate_nested_block(body);
                self.write("end");
            }
            Statement::While { condition, body } => {
                self.write("while ");
                self.generate_expression(condition);
                self.writeln(" do");
                self.generate_nested_block(body);
                self.write("end");
            }
            Statement::Repeat { body, condition } => {
                self.writeln("repeat");
                self.generate_nested_block(body);
                self.write("until ");
                self.generate_expression(condition);
            }
            Statement::If { clauses, else_body } => {
                for (i, clause) in clauses.iter().enumerate() {
                    self.write(if i == 0 { "if " } else { "elseif " });
                    self.generate_expression(&clause.condition);
                    self.writeln(" then");
                    self.generate_nested_block(&clause.body);
                }
                if let Some(else_body) = else_body {
                    self.writeln("else");
                    self.generate_nested_block(else_body);
                }
                self.write("end");
            }
            Statement::NumericFor {
                variable,
                start,
                end,
                step,
                body,
            } => {
                self.write("for ");
                self.write(variable);
                self.write(" = ");
                self.generate_expression(start);
                self.write(", ");
                self.generate_expression(end);
                if let Some(step) = step {
                    self.write(", ");
                    self.generate_expression(step);
                }
                self.writeln(" do");
                self.generate_nested_block(body);
                self.write("end");
            }
            Statement::GenericFor {
                variables,
                iterators,
                body,
            } => {
                self.write("for ");
                self.write(&variables.join(", "));
                self.write(" in ");
                self.generate_expression_list(iterators);
                self.writeln(" do");
                self.generate_nested_block(body);
                self.write("end");
            }
            Statement::Return { values } => {
                self.write("return");
                if !values.is_empty() {
                    self.write(" ");
                    self.generate_expression_list(values);
                }
            }
            Statement::Break => self.write("break"),
        }
    }

    /// Indented body followed by the indentation of the closing keyword.
    fn generate_nested_block(&mut self, body: &[Statement]) {
        self.indent();
        self.generate_block(body);
        self.dedent();
        self.write_indent();
    }
}

/// Whether the statement's text opens with `(`, which would otherwise be
/// read as a call on the previous statement.
fn starts_with_paren(stmt: &Statement) -> bool {
    let mut expr = match stmt {
        Statement::Call { call } => call,
        Statement::Assignment { targets, .. } => match targets.first() {
            Some(target) => target,
            None => return false,
        },
        _ => return false,
    };
    loop {
        expr = match expr {
            Expression::Call { callee, .. } => callee.as_ref(),
            Expression::MethodCall { receiver, .. } => receiver.as_ref(),
            Expression::Member { base, .. } | Expression::Index { base, .. } => base.as_ref(),
            Expression::Identifier(_) => return false,
            // parenthesised, or wrapped by the generator for not being a prefix
            _ => return true,
        };
    }
}
