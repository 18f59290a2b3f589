use std::fmt;
use thiserror::Error;

/// A syntax error in Lua source, with the 1-based position where it was
/// detected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    pub message: String,
    pub line: usize,
    pub column: usize,
}

impl ParseError {
    pub fn new(message: impl Into<String>, line: usize, column: usize) -> Self {
        Self {
            message: message.into(),
            line,
            column,
        }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}: {}", self.line, self.column, self.message)
    }
}

impl std::error::Error for ParseError {}

#[derive(Debug, Error)]
pub enum ObfuscateError {
    #[error("parse error at {0}")]
    Parse(#[from] ParseError),

    /// Text generated by a pass did not parse back. Always a bug in the pass.
    #[error("{stage} produced code that does not parse ({source})\n{text}")]
    Reparse {
        stage: &'static str,
        text: String,
        source: ParseError,
    },

    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    #[error("invalid string literal: {0}")]
    InvalidStringLiteral(String),

    #[error("configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, ObfuscateError>;
