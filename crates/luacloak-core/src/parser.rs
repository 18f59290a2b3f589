//! Recursive-descent parser producing the owned syntax tree.
//!
//! Operator precedence follows the reference Lua parser: binary operators
//! are read by priority climbing over the table in [`BinaryOp::priority`].
//! Every parenthesised expression in the source becomes an explicit
//! [`Expression::Paren`], so emitting a parsed tree and parsing it again
//! yields the same tree.

use crate::ast::*;
use crate::error::ParseError;
use crate::lexer::{tokenize, Token, TokenKind};

/// Deepest statement/expression nesting accepted before bailing out.
const MAX_NESTING_DEPTH: usize = 200;

pub fn parse(source: &str) -> Result<Block, ParseError> {
    let tokens = tokenize(source)?;
    Parser::new(tokens).parse_chunk()
}

/// Parse a single expression, e.g. a template fragment.
pub fn parse_expression(source: &str) -> Result<Expression, ParseError> {
    let tokens = tokenize(source)?;
    let mut parser = Parser::new(tokens);
    let expression = parser.expression()?;
    parser.expect(TokenKind::Eof)?;
    Ok(expression)
}

#[derive(Debug, Clone, Copy)]
enum InfixOp {
    Binary(BinaryOp),
    Logical(LogicalOp),
}

impl InfixOp {
    fn priority(self) -> (u8, u8) {
        match self {
            InfixOp::Binary(op) => op.priority(),
            InfixOp::Logical(op) => op.priority(),
        }
    }
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
    /// One entry per enclosing function: whether it accepts `...`.
    vararg_scopes: Vec<bool>,
    /// One entry per enclosing function: number of loops open inside it.
    loop_depths: Vec<usize>,
}

impl Parser {
    fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            pos: 0,
            depth: 0,
            vararg_scopes: vec![true],
            loop_depths: vec![0],
        }
    }

    fn parse_chunk(mut self) -> Result<Block, ParseError> {
        let block = self.block()?;
        self.expect(TokenKind::Eof)?;
        Ok(block)
    }

    // ----- token helpers -----

    fn current(&self) -> &Token {
        // The token list always ends with Eof and the cursor never passes it.
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn kind(&self) -> &TokenKind {
        &self.current().kind
    }

    fn peek_kind(&self) -> &TokenKind {
        &self.tokens[(self.pos + 1).min(self.tokens.len() - 1)].kind
    }

    fn check(&self, kind: &TokenKind) -> bool {
        self.kind() == kind
    }

    fn bump(&mut self) -> TokenKind {
        let kind = self.kind().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        kind
    }

    fn accept(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn error_here(&self, message: impl Into<String>) -> ParseError {
        let token = self.current();
        ParseError::new(message, token.line, token.column)
    }

    fn expect(&mut self, kind: TokenKind) -> Result<(), ParseError> {
        if self.accept(&kind) {
            return Ok(());
        }
        Err(self.error_here(format!(
            "{} expected near {}",
            kind.describe(),
            self.kind().describe()
        )))
    }

    /// Like `expect`, but names the opening token when it is on another line.
    fn expect_match(
        &mut self,
        kind: TokenKind,
        opener: TokenKind,
        line: usize,
    ) -> Result<(), ParseError> {
        if self.accept(&kind) {
            return Ok(());
        }
        if line == self.current().line {
            return self.expect(kind);
        }
        Err(self.error_here(format!(
            "{} expected (to close {} at line {}) near {}",
            kind.describe(),
            opener.describe(),
            line,
            self.kind().describe()
        )))
    }

    fn name(&mut self) -> Result<String, ParseError> {
        match self.kind() {
            TokenKind::Name(name) => {
                let name = name.clone();
                self.bump();
                Ok(name)
            }
            other => Err(self.error_here(format!("<name> expected near {}", other.describe()))),
        }
    }

    fn enter(&mut self) -> Result<(), ParseError> {
        self.depth += 1;
        if self.depth > MAX_NESTING_DEPTH {
            return Err(self.error_here("chunk has too many syntax levels"));
        }
        Ok(())
    }

    fn exit(&mut self) {
        self.depth -= 1;
    }

    fn block_follows(&self) -> bool {
        matches!(
            self.kind(),
            TokenKind::Else | TokenKind::ElseIf | TokenKind::End | TokenKind::Until | TokenKind::Eof
        )
    }

    // ----- statements -----

    fn block(&mut self) -> Result<Block, ParseError> {
        let mut block = Block::new();
        while !self.block_follows() {
            if self.check(&TokenKind::Return) {
                block.push(self.return_statement()?);
                if !self.block_follows() {
                    return Err(self.error_here(format!(
                        "'end' expected near {}",
                        self.kind().describe()
                    )));
                }
                break;
            }
            if let Some(statement) = self.statement()? {
                block.push(statement);
            }
        }
        Ok(block)
    }

    fn statement(&mut self) -> Result<Option<Statement>, ParseError> {
        self.enter()?;
        let line = self.current().line;
        let statement = match self.kind() {
            TokenKind::Semicolon => {
                self.bump();
                None
            }
            TokenKind::If => Some(self.if_statement(line)?),
            TokenKind::While => {
                self.bump();
                let condition = self.expression()?;
                self.expect(TokenKind::Do)?;
                let body = self.loop_body()?;
                self.expect_match(TokenKind::End, TokenKind::While, line)?;
                Some(Statement::While { condition, body })
            }
            TokenKind::Do => {
                self.bump();
                let body = self.block()?;
                self.expect_match(TokenKind::End, TokenKind::Do, line)?;
                Some(Statement::Do { body })
            }
            TokenKind::For => Some(self.for_statement(line)?),
            TokenKind::Repeat => {
                self.bump();
                let body = self.loop_body()?;
                self.expect_match(TokenKind::Until, TokenKind::Repeat, line)?;
                let condition = self.expression()?;
                Some(Statement::Repeat { body, condition })
            }
            TokenKind::Function => {
                self.bump();
                let name = self.function_name()?;
                let function = self.function_body(line)?;
                Some(Statement::Function { name, function })
            }
            TokenKind::Local => {
                self.bump();
                if self.accept(&TokenKind::Function) {
                    let name = self.name()?;
                    let function = self.function_body(line)?;
                    Some(Statement::LocalFunction { name, function })
                } else {
                    Some(self.local_statement()?)
                }
            }
            TokenKind::Break => {
                if self.loop_depths.last().copied().unwrap_or(0) == 0 {
                    return Err(self.error_here("break outside a loop"));
                }
                self.bump();
                Some(Statement::Break)
            }
            TokenKind::Goto | TokenKind::DoubleColon => {
                return Err(self.error_here("goto and labels are not supported"));
            }
            _ => Some(self.expression_statement()?),
        };
        self.exit();
        Ok(statement)
    }

    fn loop_body(&mut self) -> Result<Block, ParseError> {
        if let Some(depth) = self.loop_depths.last_mut() {
            *depth += 1;
        }
        let body = self.block();
        if let Some(depth) = self.loop_depths.last_mut() {
            *depth -= 1;
        }
        body
    }

    fn if_statement(&mut self, line: usize) -> Result<Statement, ParseError> {
        let mut clauses = Vec::new();
        loop {
            // `if` on the first round, `elseif` afterwards
            self.bump();
            let condition = self.expression()?;
            self.expect(TokenKind::Then)?;
            let body = self.block()?;
            clauses.push(IfClause { condition, body });
            if !self.check(&TokenKind::ElseIf) {
                break;
            }
        }
        let else_body = if self.accept(&TokenKind::Else) {
            Some(self.block()?)
        } else {
            None
        };
        self.expect_match(TokenKind::End, TokenKind::If, line)?;
        Ok(Statement::If { clauses, else_body })
    }

    fn for_statement(&mut self, line: usize) -> Result<Statement, ParseError> {
        self.bump();
        let first = self.name()?;
        if self.accept(&TokenKind::Assign) {
            let start = self.expression()?;
            self.expect(TokenKind::Comma)?;
            let end = self.expression()?;
            let step = if self.accept(&TokenKind::Comma) {
                Some(self.expression()?)
            } else {
                None
            };
            self.expect(TokenKind::Do)?;
            let body = self.loop_body()?;
            self.expect_match(TokenKind::End, TokenKind::For, line)?;
            return Ok(Statement::NumericFor {
                variable: first,
                start,
                end,
                step,
                body,
            });
        }

        let mut variables = vec![first];
        while self.accept(&TokenKind::Comma) {
            variables.push(self.name()?);
        }
        self.expect(TokenKind::In)?;
        let iterators = self.expression_list()?;
        self.expect(TokenKind::Do)?;
        let body = self.loop_body()?;
        self.expect_match(TokenKind::End, TokenKind::For, line)?;
        Ok(Statement::GenericFor {
            variables,
            iterators,
            body,
        })
    }

    fn function_name(&mut self) -> Result<FunctionName, ParseError> {
        let mut path = vec![self.name()?];
        while self.accept(&TokenKind::Dot) {
            path.push(self.name()?);
        }
        let method = if self.accept(&TokenKind::Colon) {
            Some(self.name()?)
        } else {
            None
        };
        Ok(FunctionName { path, method })
    }

    fn local_statement(&mut self) -> Result<Statement, ParseError> {
        let mut names = Vec::new();
        loop {
            names.push(self.name()?);
            if self.check(&TokenKind::Less) {
                return Err(self.error_here("local variable attributes are not supported"));
            }
            if !self.accept(&TokenKind::Comma) {
                break;
            }
        }
        let values = if self.accept(&TokenKind::Assign) {
            self.expression_list()?
        } else {
            Vec::new()
        };
        Ok(Statement::Local { names, values })
    }

    fn return_statement(&mut self) -> Result<Statement, ParseError> {
        self.bump();
        let values = if self.block_follows() || self.check(&TokenKind::Semicolon) {
            Vec::new()
        } else {
            self.expression_list()?
        };
        self.accept(&TokenKind::Semicolon);
        Ok(Statement::Return { values })
    }

    fn expression_statement(&mut self) -> Result<Statement, ParseError> {
        let first = self.suffixed_expression()?;
        if self.check(&TokenKind::Assign) || self.check(&TokenKind::Comma) {
            let mut targets = vec![first];
            while self.accept(&TokenKind::Comma) {
                targets.push(self.suffixed_expression()?);
            }
            if !targets.iter().all(is_assignable) {
                return Err(self.error_here("syntax error near '='"));
            }
            self.expect(TokenKind::Assign)?;
            let values = self.expression_list()?;
            return Ok(Statement::Assignment { targets, values });
        }
        if first.is_call() {
            return Ok(Statement::Call { call: first });
        }
        Err(self.error_here(format!("syntax error near {}", self.kind().describe())))
    }

    fn function_body(&mut self, line: usize) -> Result<FunctionBody, ParseError> {
        self.expect(TokenKind::LeftParen)?;
        let mut params = Vec::new();
        let mut is_vararg = false;
        if !self.check(&TokenKind::RightParen) {
            loop {
                if self.accept(&TokenKind::Ellipsis) {
                    is_vararg = true;
                    break;
                }
                params.push(self.name()?);
                if !self.accept(&TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(TokenKind::RightParen)?;

        self.vararg_scopes.push(is_vararg);
        self.loop_depths.push(0);
        let body = self.block();
        self.vararg_scopes.pop();
        self.loop_depths.pop();

        let body = body?;
        self.expect_match(TokenKind::End, TokenKind::Function, line)?;
        Ok(FunctionBody {
            params,
            is_vararg,
            body,
        })
    }

    // ----- expressions -----

    fn expression_list(&mut self) -> Result<Vec<Expression>, ParseError> {
        let mut expressions = vec![self.expression()?];
        while self.accept(&TokenKind::Comma) {
            expressions.push(self.expression()?);
        }
        Ok(expressions)
    }

    fn expression(&mut self) -> Result<Expression, ParseError> {
        self.sub_expression(0)
    }

    fn sub_expression(&mut self, limit: u8) -> Result<Expression, ParseError> {
        self.enter()?;
        let mut left = match unary_op(self.kind()) {
            Some(op) => {
                self.bump();
                let operand = self.sub_expression(UNARY_PRIORITY)?;
                Expression::Unary {
                    op,
                    operand: Box::new(operand),
                }
            }
            None => self.simple_expression()?,
        };

        while let Some(op) = infix_op(self.kind()) {
            let (left_priority, right_priority) = op.priority();
            if left_priority <= limit {
                break;
            }
            self.bump();
            let right = self.sub_expression(right_priority)?;
            left = match op {
                InfixOp::Binary(op) => Expression::binary(op, left, right),
                InfixOp::Logical(op) => Expression::Logical {
                    op,
                    left: Box::new(left),
                    right: Box::new(right),
                },
            };
        }
        self.exit();
        Ok(left)
    }

    fn simple_expression(&mut self) -> Result<Expression, ParseError> {
        let line = self.current().line;
        let expression = match self.kind() {
            TokenKind::Number(raw) => Expression::Number(NumberLiteral::new(raw.clone())),
            TokenKind::String(raw) => Expression::String(StringLiteral::new(raw.clone())),
            TokenKind::Nil => Expression::Nil,
            TokenKind::True => Expression::True,
            TokenKind::False => Expression::False,
            TokenKind::Ellipsis => {
                if !self.vararg_scopes.last().copied().unwrap_or(false) {
                    return Err(self.error_here("cannot use '...' outside a vararg function"));
                }
                Expression::Vararg
            }
            TokenKind::LeftBrace => return self.table_constructor(),
            TokenKind::Function => {
                self.bump();
                let function = self.function_body(line)?;
                return Ok(Expression::Function(Box::new(function)));
            }
            _ => return self.suffixed_expression(),
        };
        self.bump();
        Ok(expression)
    }

    fn primary_expression(&mut self) -> Result<Expression, ParseError> {
        match self.kind() {
            TokenKind::Name(_) => Ok(Expression::Identifier(self.name()?)),
            TokenKind::LeftParen => {
                let line = self.current().line;
                self.bump();
                let inner = self.expression()?;
                self.expect_match(TokenKind::RightParen, TokenKind::LeftParen, line)?;
                Ok(Expression::Paren(Box::new(inner)))
            }
            other => Err(self.error_here(format!("unexpected symbol near {}", other.describe()))),
        }
    }

    fn suffixed_expression(&mut self) -> Result<Expression, ParseError> {
        let mut expression = self.primary_expression()?;
        loop {
            expression = match self.kind() {
                TokenKind::Dot => {
                    self.bump();
                    let name = self.name()?;
                    Expression::Member {
                        base: Box::new(expression),
                        name,
                    }
                }
                TokenKind::LeftBracket => {
                    self.bump();
                    let key = self.expression()?;
                    self.expect(TokenKind::RightBracket)?;
                    Expression::index(expression, key)
                }
                TokenKind::Colon => {
                    self.bump();
                    let method = self.name()?;
                    let args = self.call_arguments()?;
                    Expression::MethodCall {
                        receiver: Box::new(expression),
                        method,
                        args,
                    }
                }
                TokenKind::LeftParen | TokenKind::String(_) | TokenKind::LeftBrace => {
                    let args = self.call_arguments()?;
                    Expression::call(expression, args)
                }
                _ => return Ok(expression),
            };
        }
    }

    fn call_arguments(&mut self) -> Result<Vec<Expression>, ParseError> {
        match self.kind() {
            TokenKind::String(raw) => {
                let literal = Expression::String(StringLiteral::new(raw.clone()));
                self.bump();
                Ok(vec![literal])
            }
            TokenKind::LeftBrace => Ok(vec![self.table_constructor()?]),
            TokenKind::LeftParen => {
                let line = self.current().line;
                self.bump();
                let args = if self.check(&TokenKind::RightParen) {
                    Vec::new()
                } else {
                    self.expression_list()?
                };
                self.expect_match(TokenKind::RightParen, TokenKind::LeftParen, line)?;
                Ok(args)
            }
            other => Err(self.error_here(format!(
                "function arguments expected near {}",
                other.describe()
            ))),
        }
    }

    fn table_constructor(&mut self) -> Result<Expression, ParseError> {
        let line = self.current().line;
        self.expect(TokenKind::LeftBrace)?;
        let mut fields = Vec::new();
        while !self.check(&TokenKind::RightBrace) {
            let field = match (self.kind(), self.peek_kind()) {
                (TokenKind::Name(_), TokenKind::Assign) => {
                    let name = self.name()?;
                    self.bump();
                    TableField::Named {
                        name,
                        value: self.expression()?,
                    }
                }
                (TokenKind::LeftBracket, _) => {
                    self.bump();
                    let key = self.expression()?;
                    self.expect(TokenKind::RightBracket)?;
                    self.expect(TokenKind::Assign)?;
                    TableField::Keyed {
                        key,
                        value: self.expression()?,
                    }
                }
                _ => TableField::Positional(self.expression()?),
            };
            fields.push(field);
            if !self.accept(&TokenKind::Comma) && !self.accept(&TokenKind::Semicolon) {
                break;
            }
        }
        self.expect_match(TokenKind::RightBrace, TokenKind::LeftBrace, line)?;
        Ok(Expression::Table(fields))
    }
}

fn is_assignable(expression: &Expression) -> bool {
    matches!(
        expression,
        Expression::Identifier(_) | Expression::Member { .. } | Expression::Index { .. }
    )
}

fn unary_op(kind: &TokenKind) -> Option<UnaryOp> {
    match kind {
        TokenKind::Minus => Some(UnaryOp::Negate),
        TokenKind::Not => Some(UnaryOp::Not),
        TokenKind::Hash => Some(UnaryOp::Length),
        TokenKind::Tilde => Some(UnaryOp::BitwiseNot),
        _ => None,
    }
}

fn infix_op(kind: &TokenKind) -> Option<InfixOp> {
    let op = match kind {
        TokenKind::Plus => BinaryOp::Add,
        TokenKind::Minus => BinaryOp::Subtract,
        TokenKind::Star => BinaryOp::Multiply,
        TokenKind::Slash => BinaryOp::Divide,
        TokenKind::DoubleSlash => BinaryOp::IntegerDivide,
        TokenKind::Percent => BinaryOp::Modulo,
        TokenKind::Caret => BinaryOp::Power,
        TokenKind::DoubleDot => BinaryOp::Concatenate,
        TokenKind::Equal => BinaryOp::Equal,
        TokenKind::NotEqual => BinaryOp::NotEqual,
        TokenKind::Less => BinaryOp::LessThan,
        TokenKind::LessEqual => BinaryOp::LessThanOrEqual,
        TokenKind::Greater => BinaryOp::GreaterThan,
        TokenKind::GreaterEqual => BinaryOp::GreaterThanOrEqual,
        TokenKind::Ampersand => BinaryOp::BitwiseAnd,
        TokenKind::Pipe => BinaryOp::BitwiseOr,
        TokenKind::Tilde => BinaryOp::BitwiseXor,
        TokenKind::ShiftLeft => BinaryOp::ShiftLeft,
        TokenKind::ShiftRight => BinaryOp::ShiftRight,
        TokenKind::And => return Some(InfixOp::Logical(LogicalOp::And)),
        TokenKind::Or => return Some(InfixOp::Logical(LogicalOp::Or)),
        _ => return None,
    };
    Some(InfixOp::Binary(op))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ident(name: &str) -> Box<Expression> {
        Box::new(Expression::identifier(name))
    }

    #[test]
    fn test_precedence_climbing() {
        let block = parse("x = a + b * c ^ d").unwrap();
        let Statement::Assignment { values, .. } = &block[0] else {
            panic!("expected assignment");
        };
        let power = Expression::binary(
            BinaryOp::Power,
            Expression::identifier("c"),
            Expression::identifier("d"),
        );
        let product = Expression::binary(BinaryOp::Multiply, Expression::identifier("b"), power);
        assert_eq!(
            values[0],
            Expression::binary(BinaryOp::Add, Expression::identifier("a"), product)
        );
    }

    #[test]
    fn test_power_is_right_associative_and_binds_over_unary() {
        let block = parse("x = -a ^ b ^ c").unwrap();
        let Statement::Assignment { values, .. } = &block[0] else {
            panic!("expected assignment");
        };
        let Expression::Unary { op: UnaryOp::Negate, operand } = &values[0] else {
            panic!("expected negation, got {:?}", values[0]);
        };
        let Expression::Binary { op: BinaryOp::Power, left, right } = operand.as_ref() else {
            panic!("expected power");
        };
        assert_eq!(left, &ident("a"));
        assert!(matches!(right.as_ref(), Expression::Binary { op: BinaryOp::Power, .. }));
    }

    #[test]
    fn test_concat_is_right_associative() {
        let block = parse("x = a .. b .. c").unwrap();
        let Statement::Assignment { values, .. } = &block[0] else {
            panic!("expected assignment");
        };
        let Expression::Binary { left, right, .. } = &values[0] else {
            panic!("expected concat");
        };
        assert_eq!(left, &ident("a"));
        assert!(matches!(right.as_ref(), Expression::Binary { op: BinaryOp::Concatenate, .. }));
    }

    #[test]
    fn test_method_declaration_and_call() {
        let block = parse("function a.b:c(x) return self end a:c(1)").unwrap();
        assert_eq!(
            block[0],
            Statement::Function {
                name: FunctionName {
                    path: vec!["a".to_string(), "b".to_string()],
                    method: Some("c".to_string()),
                },
                function: FunctionBody {
                    params: vec!["x".to_string()],
                    is_vararg: false,
                    body: vec![Statement::Return {
                        values: vec![Expression::identifier("self")],
                    }],
                },
            }
        );
        assert!(matches!(
            &block[1],
            Statement::Call { call: Expression::MethodCall { method, .. } } if method == "c"
        ));
    }

    #[test]
    fn test_table_constructor_fields() {
        let block = parse("t = { 1, x = 2, [k] = 3; f() }").unwrap();
        let Statement::Assignment { values, .. } = &block[0] else {
            panic!("expected assignment");
        };
        let Expression::Table(fields) = &values[0] else {
            panic!("expected table");
        };
        assert_eq!(fields.len(), 4);
        assert!(matches!(&fields[1], TableField::Named { name, .. } if name == "x"));
        assert!(matches!(&fields[2], TableField::Keyed { .. }));
    }

    #[test]
    fn test_string_and_table_call_arguments() {
        let block = parse("print 'hi' f{1}").unwrap();
        assert_eq!(block.len(), 2);
    }

    #[test]
    fn test_return_must_end_block() {
        let err = parse("return 1 x = 2").unwrap_err();
        assert!(err.message.contains("'end' expected"), "{}", err.message);
    }

    #[test]
    fn test_rejects_goto_and_attributes() {
        assert!(parse("goto done ::done::").is_err());
        assert!(parse("local x <const> = 1").is_err());
    }

    #[test]
    fn test_rejects_misplaced_break_and_vararg() {
        assert!(parse("break").is_err());
        assert!(parse("while true do local f = function() break end end").is_err());
        assert!(parse("function f() return ... end").is_err());
        assert!(parse("function f(...) return ... end").is_ok());
    }

    #[test]
    fn test_nesting_limit() {
        let source = format!("x = {}1{}", "(".repeat(500), ")".repeat(500));
        let err = parse(&source).unwrap_err();
        assert_eq!(err.message, "chunk has too many syntax levels");
    }

    #[test]
    fn test_error_position() {
        let err = parse("local x = \n  = 3").unwrap_err();
        assert_eq!((err.line, err.column), (2, 3));
    }

    #[test]
    fn test_non_call_expression_statement() {
        let err = parse("x").unwrap_err();
        assert!(err.message.starts_with("syntax error"));
    }
}
