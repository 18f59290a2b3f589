//! Tree-to-text code generation.
//!
//! Generation is total over the syntax tree. Parentheses are only added
//! where operator priorities or prefix-expression rules demand them, so
//! parsing the output of a parsed tree gives back the same tree.

mod emitter;
mod expressions;
mod statements;

pub use emitter::Emitter;

use crate::ast::{Block, Expression, Statement};
use crate::config::OutputFormat;

pub struct CodeGenerator {
    emitter: Emitter,
}

impl CodeGenerator {
    pub fn new(format: OutputFormat) -> Self {
        Self {
            emitter: Emitter::new().with_output_format(format),
        }
    }

    pub fn finish(mut self) -> String {
        self.emitter.take_output()
    }

    fn write(&mut self, s: &str) {
        self.emitter.write(s);
    }

    fn writeln(&mut self, s: &str) {
        self.emitter.writeln(s);
    }

    fn write_indent(&mut self) {
        self.emitter.write_indent();
    }

    fn indent(&mut self) {
        self.emitter.indent();
    }

    fn dedent(&mut self) {
        self.emitter.dedent();
    }
}

pub fn emit_block(block: &Block, format: OutputFormat) -> String {
    let mut generator = CodeGenerator::new(format);
    generator.generate_block(block);
    generator.finish()
}

pub fn emit_statement(statement: &Statement, format: OutputFormat) -> String {
    let mut generator = CodeGenerator::new(format);
    generator.generate_statement(statement);
    generator.finish()
}

pub fn emit_expression(expression: &Expression, format: OutputFormat) -> String {
    let mut generator = CodeGenerator::new(format);
    generator.generate_expression(expression);
    generator.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::*;
    use crate::parser::parse;
    use indoc::indoc;

    fn minified(source: &str) -> String {
        emit_block(&parse(source).unwrap(), OutputFormat::Minified)
    }

    fn assert_round_trip(source: &str) {
        let tree = parse(source).unwrap();
        for format in [OutputFormat::Readable, OutputFormat::Minified] {
            let text = emit_block(&tree, format);
            let reparsed = parse(&text).unwrap_or_else(|e| panic!("{}\n{}", e, text));
            assert_eq!(reparsed, tree, "round trip changed the tree:\n{}", text);
        }
    }

    #[test]
    fn test_round_trip_corpus() {
        assert_round_trip(indoc! {r#"
            local a, b = 1, 2.5e3
            local s = "x\n" .. 'y' .. [==[long]]string]==]
            local t = { 1, 2; x = 3, [a + b] = { nested = true }, f(), ... }
            function t.m:method(p, ...)
                return self, p, ...
            end
            local function fact(n)
                if n <= 1 then
                    return 1
                elseif n == 2 then
                    return 2
                else
                    return n * fact(n - 1)
                end
            end
            for i = 10, 1, -1 do
                if i % 2 == 0 then break end
            end
            for k, v in pairs(t) do
                print(k, v)
            end
            while a < 10 do a = a + 1 end
            repeat local z = a until z > 3
            do local w = not a and b or -a ^ 2 end
            x = (a + b) * c // 2 | 3 & ~4 << 1
            y = #t .. "n"
            print "literal"
            setmetatable {} (t)
            obj:method():other{}
            ;(f or g)()
        "#});
    }

    #[test]
    fn test_minified_output_is_one_line() {
        let output = minified("local x = 1\nif x then\n  print(x)\nend\n");
        insta::assert_snapshot!(output, @"local x = 1 if x then print(x) end");
    }

    #[test]
    fn test_readable_output_indents_blocks() {
        let tree = parse("if x then print(x) end").unwrap();
        assert_eq!(
            emit_block(&tree, OutputFormat::Readable),
            "if x then\n    print(x)\nend\n"
        );
    }

    #[test]
    fn test_generated_tree_gets_needed_parentheses() {
        let a = Expression::identifier("a");
        let sum = Expression::binary(BinaryOp::Add, a.clone(), Expression::identifier("b"));
        let product = Expression::binary(BinaryOp::Multiply, sum.clone(), Expression::identifier("c"));
        insta::assert_snapshot!(emit_expression(&product, OutputFormat::Minified), @"(a + b) * c");

        let difference = Expression::binary(BinaryOp::Subtract, a, sum);
        insta::assert_snapshot!(emit_expression(&difference, OutputFormat::Minified), @"a - (a + b)");
    }

    #[test]
    fn test_power_and_unary_priorities() {
        let negated = Expression::Unary {
            op: UnaryOp::Negate,
            operand: Box::new(Expression::identifier("a")),
        };
        let power = Expression::binary(BinaryOp::Power, negated, Expression::integer(2));
        insta::assert_snapshot!(emit_expression(&power, OutputFormat::Minified), @"(-a) ^ 2");
    }

    #[test]
    fn test_nested_negation_never_forms_a_comment() {
        let inner = Expression::integer(-5);
        let outer = Expression::Unary {
            op: UnaryOp::Negate,
            operand: Box::new(inner),
        };
        insta::assert_snapshot!(emit_expression(&outer, OutputFormat::Minified), @"- -5");
    }

    #[test]
    fn test_non_prefix_bases_are_wrapped() {
        let call = Expression::MethodCall {
            receiver: Box::new(Expression::string("ab")),
            method: "rep".to_string(),
            args: vec![Expression::integer(2)],
        };
        insta::assert_snapshot!(emit_expression(&call, OutputFormat::Minified), @r#"("ab"):rep(2)"#);
    }

    #[test]
    fn test_long_bracket_key_gets_spaces() {
        insta::assert_snapshot!(minified("x = t[ [[k]] ]"), @"x = t[ [[k]] ]");
    }

    #[test]
    fn test_early_exit_before_end_of_block_is_wrapped() {
        let block = vec![
            Statement::Return { values: vec![Expression::integer(1)] },
            Statement::Call {
                call: Expression::call(Expression::identifier("f"), vec![]),
            },
        ];
        insta::assert_snapshot!(emit_block(&block, OutputFormat::Minified), @"do return 1 end f()");
    }

    #[test]
    fn test_semicolon_before_parenthesised_statement() {
        insta::assert_snapshot!(minified("a = b;(f)()"), @"a = b; (f)()");
    }

    #[test]
    fn test_function_expression_in_readable_mode() {
        let tree = parse("f(function(x) return x end)").unwrap();
        assert_eq!(
            emit_block(&tree, OutputFormat::Readable),
            "f(function(x)\n    return x\nend)\n"
        );
    }
}
