//! Owned syntax tree for Lua programs.
//!
//! Every parent exclusively owns its children, so a tree can be cloned,
//! moved between passes and rewritten in place without any sharing. Field
//! names of dot accesses, method names and named table keys are plain
//! strings rather than identifier nodes: they are never variable references.

use serde::Serialize;

/// A sequential list of statements: a chunk, function body, loop body or
/// branch body.
pub type Block = Vec<Statement>;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Statement {
    /// `a, b.c, d[e] = x, y`
    Assignment {
        targets: Vec<Expression>,
        values: Vec<Expression>,
    },
    /// `local a, b = x, y`
    Local {
        names: Vec<String>,
        values: Vec<Expression>,
    },
    /// `local function f(...) ... end`
    LocalFunction {
        name: String,
        function: FunctionBody,
    },
    /// `function a.b:c(...) ... end`
    Function {
        name: FunctionName,
        function: FunctionBody,
    },
    /// A call used as a statement. Always holds a `Call` or `MethodCall`.
    Call { call: Expression },
    Do { body: Block },
    While { condition: Expression, body: Block },
    Repeat { body: Block, condition: Expression },
    If {
        clauses: Vec<IfClause>,
        else_body: Option<Block>,
    },
    NumericFor {
        variable: String,
        start: Expression,
        end: Expression,
        step: Option<Expression>,
        body: Block,
    },
    GenericFor {
        variables: Vec<String>,
        iterators: Vec<Expression>,
        body: Block,
    },
    Return { values: Vec<Expression> },
    Break,
}

impl Statement {
    /// `return` and `break` leave the enclosing construct on their own.
    pub fn is_early_exit(&self) -> bool {
        matches!(self, Statement::Return { .. } | Statement::Break)
    }
}

/// One `if`/`elseif` arm.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IfClause {
    pub condition: Expression,
    pub body: Block,
}

/// The dotted name of a function declaration statement.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FunctionName {
    pub path: Vec<String>,
    pub method: Option<String>,
}

impl FunctionName {
    pub fn simple(name: impl Into<String>) -> Self {
        Self {
            path: vec![name.into()],
            method: None,
        }
    }

    /// The variable the declaration ultimately assigns through.
    pub fn root(&self) -> &str {
        &self.path[0]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FunctionBody {
    pub params: Vec<String>,
    pub is_vararg: bool,
    pub body: Block,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Expression {
    Nil,
    True,
    False,
    Vararg,
    Number(NumberLiteral),
    String(StringLiteral),
    Identifier(String),
    Function(Box<FunctionBody>),
    Table(Vec<TableField>),
    Binary {
        op: BinaryOp,
        left: Box<Expression>,
        right: Box<Expression>,
    },
    /// `and`/`or`, which yield one of their operands rather than a boolean.
    Logical {
        op: LogicalOp,
        left: Box<Expression>,
        right: Box<Expression>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expression>,
    },
    /// `base.name`
    Member { base: Box<Expression>, name: String },
    /// `base[key]`
    Index {
        base: Box<Expression>,
        key: Box<Expression>,
    },
    Call {
        callee: Box<Expression>,
        args: Vec<Expression>,
    },
    /// `receiver:method(args)`
    MethodCall {
        receiver: Box<Expression>,
        method: String,
        args: Vec<Expression>,
    },
    /// `(expr)`, which also truncates a multi-value expression to one value.
    Paren(Box<Expression>),
}

impl Expression {
    pub fn identifier(name: impl Into<String>) -> Self {
        Expression::Identifier(name.into())
    }

    /// A double-quoted string literal holding `text`.
    pub fn string(text: impl AsRef<[u8]>) -> Self {
        Expression::String(StringLiteral::quoted(text.as_ref()))
    }

    /// An integer constant; negative values become a unary minus.
    pub fn integer(value: i64) -> Self {
        let literal = Expression::Number(NumberLiteral::new(value.unsigned_abs().to_string()));
        if value < 0 {
            Expression::Unary {
                op: UnaryOp::Negate,
                operand: Box::new(literal),
            }
        } else {
            literal
        }
    }

    pub fn index(base: Expression, key: Expression) -> Self {
        Expression::Index {
            base: Box::new(base),
            key: Box::new(key),
        }
    }

    pub fn call(callee: Expression, args: Vec<Expression>) -> Self {
        Expression::Call {
            callee: Box::new(callee),
            args,
        }
    }

    pub fn binary(op: BinaryOp, left: Expression, right: Expression) -> Self {
        Expression::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn is_call(&self) -> bool {
        matches!(self, Expression::Call { .. } | Expression::MethodCall { .. })
    }

    /// Calls and `...` expand to every value they produce when they are the
    /// last expression of a list.
    pub fn is_multi_value(&self) -> bool {
        self.is_call() || matches!(self, Expression::Vararg)
    }

    /// Expressions that may appear as the base of a call, index or member
    /// access without parentheses.
    pub fn is_prefix(&self) -> bool {
        matches!(
            self,
            Expression::Identifier(_)
                | Expression::Member { .. }
                | Expression::Index { .. }
                | Expression::Call { .. }
                | Expression::MethodCall { .. }
                | Expression::Paren(_)
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum TableField {
    /// `value`
    Positional(Expression),
    /// `name = value`
    Named { name: String, value: Expression },
    /// `[key] = value`
    Keyed { key: Expression, value: Expression },
}

/// A numeric literal, kept in its source spelling.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NumberLiteral {
    pub raw: String,
}

impl NumberLiteral {
    pub fn new(raw: impl Into<String>) -> Self {
        Self { raw: raw.into() }
    }

    /// The value of a decimal or hexadecimal integer literal, if it is one.
    pub fn integer_value(&self) -> Option<i64> {
        let raw = self.raw.as_str();
        if let Some(hex) = raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")) {
            if hex.is_empty() || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
                return None;
            }
            return i64::from_str_radix(hex, 16).ok();
        }
        if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        raw.parse().ok()
    }
}

/// A string literal, kept in its source spelling (quoted or long bracket).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StringLiteral {
    pub raw: String,
}

impl StringLiteral {
    pub fn new(raw: impl Into<String>) -> Self {
        Self { raw: raw.into() }
    }

    /// Build a double-quoted literal whose content is exactly `bytes`.
    pub fn quoted(bytes: &[u8]) -> Self {
        let mut raw = String::with_capacity(bytes.len() + 2);
        raw.push('"');
        for &byte in bytes {
            match byte {
                b'"' => raw.push_str("\\\""),
                b'\\' => raw.push_str("\\\\"),
                b'\n' => raw.push_str("\\n"),
                b'\r' => raw.push_str("\\r"),
                b'\t' => raw.push_str("\\t"),
                0x20..=0x7e => raw.push(byte as char),
                // Three digits so a following digit is never absorbed.
                _ => raw.push_str(&format!("\\{:03}", byte)),
            }
        }
        raw.push('"');
        Self { raw }
    }

    pub fn is_long_bracket(&self) -> bool {
        self.raw.starts_with('[')
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BinaryOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    IntegerDivide,
    Modulo,
    Power,
    Concatenate,
    Equal,
    NotEqual,
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
    BitwiseAnd,
    BitwiseOr,
    BitwiseXor,
    ShiftLeft,
    ShiftRight,
}

impl BinaryOp {
    pub fn as_str(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Subtract => "-",
            BinaryOp::Multiply => "*",
            BinaryOp::Divide => "/",
            BinaryOp::IntegerDivide => "//",
            BinaryOp::Modulo => "%",
            BinaryOp::Power => "^",
            BinaryOp::Concatenate => "..",
            BinaryOp::Equal => "==",
            BinaryOp::NotEqual => "~=",
            BinaryOp::LessThan => "<",
            BinaryOp::LessThanOrEqual => "<=",
            BinaryOp::GreaterThan => ">",
            BinaryOp::GreaterThanOrEqual => ">=",
            BinaryOp::BitwiseAnd => "&",
            BinaryOp::BitwiseOr => "|",
            BinaryOp::BitwiseXor => "~",
            BinaryOp::ShiftLeft => "<<",
            BinaryOp::ShiftRight => ">>",
        }
    }

    /// Left and right binding priorities, as in the reference Lua parser.
    pub fn priority(self) -> (u8, u8) {
        match self {
            BinaryOp::Add | BinaryOp::Subtract => (10, 10),
            BinaryOp::Multiply | BinaryOp::Divide | BinaryOp::IntegerDivide | BinaryOp::Modulo => {
                (11, 11)
            }
            BinaryOp::Power => (14, 13),
            BinaryOp::Concatenate => (9, 8),
            BinaryOp::ShiftLeft | BinaryOp::ShiftRight => (7, 7),
            BinaryOp::BitwiseAnd => (6, 6),
            BinaryOp::BitwiseXor => (5, 5),
            BinaryOp::BitwiseOr => (4, 4),
            BinaryOp::Equal
            | BinaryOp::NotEqual
            | BinaryOp::LessThan
            | BinaryOp::LessThanOrEqual
            | BinaryOp::GreaterThan
            | BinaryOp::GreaterThanOrEqual => (3, 3),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LogicalOp {
    And,
    Or,
}

impl LogicalOp {
    pub fn as_str(self) -> &'static str {
        match self {
            LogicalOp::And => "and",
            LogicalOp::Or => "or",
        }
    }

    pub fn priority(self) -> (u8, u8) {
        match self {
            LogicalOp::And => (2, 2),
            LogicalOp::Or => (1, 1),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum UnaryOp {
    Negate,
    Not,
    Length,
    BitwiseNot,
}

impl UnaryOp {
    pub fn as_str(self) -> &'static str {
        match self {
            UnaryOp::Negate => "-",
            UnaryOp::Not => "not ",
            UnaryOp::Length => "#",
            UnaryOp::BitwiseNot => "~",
        }
    }
}

/// Priority of every unary operator; only `^` binds tighter.
pub const UNARY_PRIORITY: u8 = 12;
