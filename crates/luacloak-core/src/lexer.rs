//! Lua tokenizer.
//!
//! Comments, whitespace and a leading `#` line are dropped. Numeric and
//! string literals are kept in their source spelling so code generation can
//! reproduce them exactly; escape sequences are only interpreted by the
//! passes that need the decoded bytes.

use crate::error::ParseError;

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Name(String),
    Number(String),
    String(String),

    And,
    Break,
    Do,
    Else,
    ElseIf,
    End,
    False,
    For,
    Function,
    Goto,
    If,
    In,
    Local,
    Nil,
    Not,
    Or,
    Repeat,
    Return,
    Then,
    True,
    Until,
    While,

    Plus,
    Minus,
    Star,
    Slash,
    DoubleSlash,
    Percent,
    Caret,
    Hash,
    Ampersand,
    Tilde,
    Pipe,
    ShiftLeft,
    ShiftRight,
    Equal,
    NotEqual,
    LessEqual,
    GreaterEqual,
    Less,
    Greater,
    Assign,
    LeftParen,
    RightParen,
    LeftBrace,
    RightBrace,
    LeftBracket,
    RightBracket,
    DoubleColon,
    Semicolon,
    Colon,
    Comma,
    Dot,
    DoubleDot,
    Ellipsis,

    Eof,
}

impl TokenKind {
    fn keyword(text: &str) -> Option<TokenKind> {
        let kind = match text {
            "and" => TokenKind::And,
            "break" => TokenKind::Break,
            "do" => TokenKind::Do,
            "else" => TokenKind::Else,
            "elseif" => TokenKind::ElseIf,
            "end" => TokenKind::End,
            "false" => TokenKind::False,
            "for" => TokenKind::For,
            "function" => TokenKind::Function,
            "goto" => TokenKind::Goto,
            "if" => TokenKind::If,
            "in" => TokenKind::In,
            "local" => TokenKind::Local,
            "nil" => TokenKind::Nil,
            "not" => TokenKind::Not,
            "or" => TokenKind::Or,
            "repeat" => TokenKind::Repeat,
            "return" => TokenKind::Return,
            "then" => TokenKind::Then,
            "true" => TokenKind::True,
            "until" => TokenKind::Until,
            "while" => TokenKind::While,
            _ => return None,
        };
        Some(kind)
    }

    /// Human readable form for error messages.
    pub fn describe(&self) -> String {
        match self {
            TokenKind::Name(name) => format!("'{}'", name),
            TokenKind::Number(raw) | TokenKind::String(raw) => format!("'{}'", raw),
            TokenKind::Eof => "<eof>".to_string(),
            other => format!("'{}'", other.symbol()),
        }
    }

    fn symbol(&self) -> &'static str {
        match self {
            TokenKind::And => "and",
            TokenKind::Break => "break",
            TokenKind::Do => "do",
            TokenKind::Else => "else",
            TokenKind::ElseIf => "elseif",
            TokenKind::End => "end",
            TokenKind::False => "false",
            TokenKind::For => "for",
            TokenKind::Function => "function",
            TokenKind::Goto => "goto",
            TokenKind::If => "if",
            TokenKind::In => "in",
            TokenKind::Local => "local",
            TokenKind::Nil => "nil",
            TokenKind::Not => "not",
            TokenKind::Or => "or",
            TokenKind::Repeat => "repeat",
            TokenKind::Return => "return",
            TokenKind::Then => "then",
            TokenKind::True => "true",
            TokenKind::Until => "until",
            TokenKind::While => "while",
            TokenKind::Plus => "+",
            TokenKind::Minus => "-",
            TokenKind::Star => "*",
            TokenKind::Slash => "/",
            TokenKind::DoubleSlash => "//",
            TokenKind::Percent => "%",
            TokenKind::Caret => "^",
            TokenKind::Hash => "#",
            TokenKind::Ampersand => "&",
            TokenKind::Tilde => "~",
            TokenKind::Pipe => "|",
            TokenKind::ShiftLeft => "<<",
            TokenKind::ShiftRight => ">>",
            TokenKind::Equal => "==",
            TokenKind::NotEqual => "~=",
            TokenKind::LessEqual => "<=",
            TokenKind::GreaterEqual => ">=",
            TokenKind::Less => "<",
            TokenKind::Greater => ">",
            TokenKind::Assign => "=",
            TokenKind::LeftParen => "(",
            TokenKind::RightParen => ")",
            TokenKind::LeftBrace => "{",
            TokenKind::RightBrace => "}",
            TokenKind::LeftBracket => "[",
            TokenKind::RightBracket => "]",
            TokenKind::DoubleColon => "::",
            TokenKind::Semicolon => ";",
            TokenKind::Colon => ":",
            TokenKind::Comma => ",",
            TokenKind::Dot => ".",
            TokenKind::DoubleDot => "..",
            TokenKind::Ellipsis => "...",
            TokenKind::Name(_) | TokenKind::Number(_) | TokenKind::String(_) | TokenKind::Eof => "",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub line: usize,
    pub column: usize,
}

pub struct Lexer<'src> {
    source: &'src [u8],
    pos: usize,
    line: usize,
    line_start: usize,
}

impl<'src> Lexer<'src> {
    pub fn new(source: &'src str) -> Self {
        Self {
            source: source.as_bytes(),
            pos: 0,
            line: 1,
            line_start: 0,
        }
    }

    pub fn tokenize(mut self) -> Result<Vec<Token>, ParseError> {
        self.skip_shebang();
        let mut tokens = Vec::new();
        loop {
            self.skip_whitespace_and_comments()?;
            let line = self.line;
            let column = self.column();
            let kind = self.next_kind()?;
            let is_eof = kind == TokenKind::Eof;
            tokens.push(Token { kind, line, column });
            if is_eof {
                return Ok(tokens);
            }
        }
    }

    fn column(&self) -> usize {
        self.pos - self.line_start + 1
    }

    fn peek(&self) -> Option<u8> {
        self.source.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.source.get(self.pos + offset).copied()
    }

    fn error(&self, message: impl Into<String>) -> ParseError {
        ParseError::new(message, self.line, self.column())
    }

    fn advance(&mut self) {
        if self.source[self.pos] == b'\n' {
            self.line += 1;
            self.line_start = self.pos + 1;
        }
        self.pos += 1;
    }

    fn text(&self, start: usize) -> String {
        String::from_utf8_lossy(&self.source[start..self.pos]).into_owned()
    }

    fn skip_shebang(&mut self) {
        if self.peek() == Some(b'#') {
            while self.peek().is_some_and(|c| c != b'\n') {
                self.pos += 1;
            }
        }
    }

    fn skip_whitespace_and_comments(&mut self) -> Result<(), ParseError> {
        loop {
            while self.peek().is_some_and(is_space) {
                self.advance();
            }
            if self.peek() == Some(b'-') && self.peek_at(1) == Some(b'-') {
                self.pos += 2;
                if self.long_bracket_level().is_some() {
                    self.scan_long_bracket("comment")?;
                } else {
                    while self.peek().is_some_and(|c| c != b'\n') {
                        self.pos += 1;
                    }
                }
                continue;
            }
            return Ok(());
        }
    }

    /// The level of a long bracket opening at the cursor (`[[` is 0, `[=[`
    /// is 1), without consuming it.
    fn long_bracket_level(&self) -> Option<usize> {
        if self.peek() != Some(b'[') {
            return None;
        }
        let mut level = 0;
        while self.peek_at(1 + level) == Some(b'=') {
            level += 1;
        }
        (self.peek_at(1 + level) == Some(b'[')).then_some(level)
    }

    /// Consume a long bracket starting at the cursor and return its raw text.
    fn scan_long_bracket(&mut self, what: &str) -> Result<String, ParseError> {
        let start = self.pos;
        let (line, column) = (self.line, self.column());
        let level = self.long_bracket_level().unwrap_or(0);
        self.pos += level + 2;
        loop {
            match self.peek() {
                None => {
                    return Err(ParseError::new(
                        format!("unfinished long {}", what),
                        line,
                        column,
                    ))
                }
                Some(b']') => {
                    let closes = (0..level).all(|i| self.peek_at(1 + i) == Some(b'='))
                        && self.peek_at(1 + level) == Some(b']');
                    if closes {
                        self.pos += level + 2;
                        return Ok(self.text(start));
                    }
                    self.pos += 1;
                }
                Some(_) => self.advance(),
            }
        }
    }

    fn next_kind(&mut self) -> Result<TokenKind, ParseError> {
        let Some(ch) = self.peek() else {
            return Ok(TokenKind::Eof);
        };

        if ch.is_ascii_alphabetic() || ch == b'_' {
            let start = self.pos;
            while self.peek().is_some_and(|c| c.is_ascii_alphanumeric() || c == b'_') {
                self.pos += 1;
            }
            let text = self.text(start);
            return Ok(TokenKind::keyword(&text).unwrap_or(TokenKind::Name(text)));
        }

        if ch.is_ascii_digit() || (ch == b'.' && self.peek_at(1).is_some_and(|c| c.is_ascii_digit())) {
            return self.scan_number();
        }

        if ch == b'"' || ch == b'\'' {
            return self.scan_quoted_string(ch);
        }

        if self.long_bracket_level().is_some() {
            return self.scan_long_bracket("string").map(TokenKind::String);
        }

        let next = self.peek_at(1);
        let (kind, width) = match (ch, next) {
            (b'.', Some(b'.')) if self.peek_at(2) == Some(b'.') => (TokenKind::Ellipsis, 3),
            (b'.', Some(b'.')) => (TokenKind::DoubleDot, 2),
            (b'.', _) => (TokenKind::Dot, 1),
            (b'/', Some(b'/')) => (TokenKind::DoubleSlash, 2),
            (b'/', _) => (TokenKind::Slash, 1),
            (b'=', Some(b'=')) => (TokenKind::Equal, 2),
            (b'=', _) => (TokenKind::Assign, 1),
            (b'~', Some(b'=')) => (TokenKind::NotEqual, 2),
            (b'~', _) => (TokenKind::Tilde, 1),
            (b'<', Some(b'=')) => (TokenKind::LessEqual, 2),
            (b'<', Some(b'<')) => (TokenKind::ShiftLeft, 2),
            (b'<', _) => (TokenKind::Less, 1),
            (b'>', Some(b'=')) => (TokenKind::GreaterEqual, 2),
            (b'>', Some(b'>')) => (TokenKind::ShiftRight, 2),
            (b'>', _) => (TokenKind::Greater, 1),
            (b':', Some(b':')) => (TokenKind::DoubleColon, 2),
            (b':', _) => (TokenKind::Colon, 1),
            (b'+', _) => (TokenKind::Plus, 1),
            (b'-', _) => (TokenKind::Minus, 1),
            (b'*', _) => (TokenKind::Star, 1),
            (b'%', _) => (TokenKind::Percent, 1),
            (b'^', _) => (TokenKind::Caret, 1),
            (b'#', _) => (TokenKind::Hash, 1),
            (b'&', _) => (TokenKind::Ampersand, 1),
            (b'|', _) => (TokenKind::Pipe, 1),
            (b'(', _) => (TokenKind::LeftParen, 1),
            (b')', _) => (TokenKind::RightParen, 1),
            (b'{', _) => (TokenKind::LeftBrace, 1),
            (b'}', _) => (TokenKind::RightBrace, 1),
            (b'[', _) => (TokenKind::LeftBracket, 1),
            (b']', _) => (TokenKind::RightBracket, 1),
            (b';', _) => (TokenKind::Semicolon, 1),
            (b',', _) => (TokenKind::Comma, 1),
            _ => {
                return Err(self.error(format!("unexpected character '{}'", ch.escape_ascii())))
            }
        };
        self.pos += width;
        Ok(kind)
    }

    fn scan_number(&mut self) -> Result<TokenKind, ParseError> {
        let start = self.pos;
        let is_hex = self.peek() == Some(b'0') && matches!(self.peek_at(1), Some(b'x' | b'X'));
        let is_digit = move |c: u8| {
            if is_hex {
                c.is_ascii_hexdigit()
            } else {
                c.is_ascii_digit()
            }
        };
        let exponent = if is_hex { [b'p', b'P'] } else { [b'e', b'E'] };
        if is_hex {
            self.pos += 2;
        }

        while self.peek().is_some_and(is_digit) {
            self.pos += 1;
        }
        if self.peek() == Some(b'.') {
            self.pos += 1;
            while self.peek().is_some_and(is_digit) {
                self.pos += 1;
            }
        }
        if self.peek().is_some_and(|c| exponent.contains(&c)) {
            self.pos += 1;
            if matches!(self.peek(), Some(b'+' | b'-')) {
                self.pos += 1;
            }
            if !self.peek().is_some_and(|c| c.is_ascii_digit()) {
                return Err(self.error(format!("malformed number near '{}'", self.text(start))));
            }
            while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                self.pos += 1;
            }
        }

        let malformed = self
            .peek()
            .is_some_and(|c| c.is_ascii_alphanumeric() || c == b'_' || c == b'.')
            || (is_hex && self.pos == start + 2);
        if malformed {
            return Err(self.error(format!("malformed number near '{}'", self.text(start))));
        }
        Ok(TokenKind::Number(self.text(start)))
    }

    fn scan_quoted_string(&mut self, quote: u8) -> Result<TokenKind, ParseError> {
        let start = self.pos;
        self.pos += 1;
        loop {
            match self.peek() {
                None | Some(b'\n') | Some(b'\r') => {
                    return Err(self.error("unfinished string"));
                }
                Some(b'\\') => {
                    self.pos += 1;
                    match self.peek() {
                        None => return Err(self.error("unfinished string")),
                        // \z skips the following whitespace, newlines included
                        Some(b'z') => {
                            self.pos += 1;
                            while self.peek().is_some_and(is_space) {
                                self.advance();
                            }
                        }
                        Some(_) => self.advance(),
                    }
                }
                Some(c) if c == quote => {
                    self.pos += 1;
                    return Ok(TokenKind::String(self.text(start)));
                }
                Some(_) => self.pos += 1,
            }
        }
    }
}

/// Lua's `isspace` set, which unlike ASCII whitespace includes `\v`.
pub(crate) fn is_space(byte: u8) -> bool {
    matches!(byte, b' ' | b'\t' | b'\n' | 0x0b | 0x0c | b'\r')
}

pub fn tokenize(source: &str) -> Result<Vec<Token>, ParseError> {
    Lexer::new(source).tokenize()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        tokenize(source)
            .unwrap()
            .into_iter()
            .map(|token| token.kind)
            .collect()
    }

    #[test]
    fn test_keywords_and_names() {
        assert_eq!(
            kinds("local x = nil"),
            vec![
                TokenKind::Local,
                TokenKind::Name("x".to_string()),
                TokenKind::Assign,
                TokenKind::Nil,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_numbers_keep_spelling() {
        assert_eq!(
            kinds("0xFF 1.5e3 .5 3"),
            vec![
                TokenKind::Number("0xFF".to_string()),
                TokenKind::Number("1.5e3".to_string()),
                TokenKind::Number(".5".to_string()),
                TokenKind::Number("3".to_string()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_vertical_tab_is_whitespace() {
        assert_eq!(
            kinds("x\x0b=\x0c1"),
            vec![
                TokenKind::Name("x".to_string()),
                TokenKind::Assign,
                TokenKind::Number("1".to_string()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_malformed_number() {
        assert!(tokenize("3x").is_err());
        assert!(tokenize("0x").is_err());
        assert!(tokenize("1e+").is_err());
    }

    #[test]
    fn test_strings_and_long_brackets() {
        assert_eq!(
            kinds(r#"'a\'b' [==[x]]y]==]"#),
            vec![
                TokenKind::String(r#"'a\'b'"#.to_string()),
                TokenKind::String("[==[x]]y]==]".to_string()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_comments_and_shebang_are_skipped() {
        let source = "#!/usr/bin/lua\n-- line\n--[[ block\n comment ]] x";
        let tokens = tokenize(source).unwrap();
        assert_eq!(tokens[0].kind, TokenKind::Name("x".to_string()));
        assert_eq!((tokens[0].line, tokens[0].column), (4, 13));
    }

    #[test]
    fn test_operators() {
        assert_eq!(
            kinds("a // b ~= c .. ... << >>"),
            vec![
                TokenKind::Name("a".to_string()),
                TokenKind::DoubleSlash,
                TokenKind::Name("b".to_string()),
                TokenKind::NotEqual,
                TokenKind::Name("c".to_string()),
                TokenKind::DoubleDot,
                TokenKind::Ellipsis,
                TokenKind::ShiftLeft,
                TokenKind::ShiftRight,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_unfinished_string_reports_position() {
        let err = tokenize("x = 'abc\n").unwrap_err();
        assert_eq!(err.message, "unfinished string");
        assert_eq!(err.line, 1);
    }
}
