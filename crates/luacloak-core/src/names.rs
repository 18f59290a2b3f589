//! Fresh identifier generation.
//!
//! Every generated name is unique for the run and never collides with a
//! name that appears in the input program.

use crate::ast::Block;
use crate::codegen::emit_block;
use crate::config::OutputFormat;
use crate::lexer::{tokenize, TokenKind};
use once_cell::sync::Lazy;
use rand::Rng;
use rustc_hash::FxHashSet;

const LETTERS: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";
const ALPHANUMERIC: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const CONFUSABLE_LEADING: &[u8] = b"lIjJi";
const CONFUSABLE: &[u8] = b"lIjJi1";

const PLAIN_LENGTH: usize = 10;
const CONFUSABLE_LENGTH: usize = 15;

static KEYWORDS: Lazy<FxHashSet<&'static str>> = Lazy::new(|| {
    [
        "and", "break", "do", "else", "elseif", "end", "false", "for", "function", "goto", "if",
        "in", "local", "nil", "not", "or", "repeat", "return", "then", "true", "until", "while",
    ]
    .into_iter()
    .collect()
});

pub fn is_keyword(name: &str) -> bool {
    KEYWORDS.contains(name)
}

#[derive(Debug, Clone, Default)]
pub struct NameGenerator {
    used: FxHashSet<String>,
}

impl NameGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// A generator that avoids every name spelled anywhere in `block`.
    pub fn avoiding_names_in(block: &Block) -> Self {
        let mut generator = Self::new();
        let text = emit_block(block, OutputFormat::Minified);
        // Text produced by the generator always tokenizes.
        if let Ok(tokens) = tokenize(&text) {
            for token in tokens {
                if let TokenKind::Name(name) = token.kind {
                    generator.reserve(name);
                }
            }
        }
        generator
    }

    pub fn reserve(&mut self, name: impl Into<String>) {
        self.used.insert(name.into());
    }

    pub fn is_used(&self, name: &str) -> bool {
        self.used.contains(name)
    }

    /// A random alphanumeric name starting with a letter.
    pub fn fresh<R: Rng + ?Sized>(&mut self, rng: &mut R) -> String {
        self.generate(rng, LETTERS, ALPHANUMERIC, PLAIN_LENGTH)
    }

    /// A name made only of easily confused glyphs, e.g. `lIjJi1lIiJ1jlIJ`.
    pub fn fresh_confusable<R: Rng + ?Sized>(&mut self, rng: &mut R) -> String {
        self.generate(rng, CONFUSABLE_LEADING, CONFUSABLE, CONFUSABLE_LENGTH)
    }

    fn generate<R: Rng + ?Sized>(
        &mut self,
        rng: &mut R,
        leading: &[u8],
        rest: &[u8],
        length: usize,
    ) -> String {
        loop {
            let mut name = String::with_capacity(length);
            name.push(leading[rng.gen_range(0..leading.len())] as char);
            for _ in 1..length {
                name.push(rest[rng.gen_range(0..rest.len())] as char);
            }
            if !is_keyword(&name) && self.used.insert(name.clone()) {
                return name;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_fresh_names_are_unique_identifiers() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut names = NameGenerator::new();
        let mut seen = FxHashSet::default();
        for _ in 0..500 {
            let name = names.fresh(&mut rng);
            assert_eq!(name.len(), PLAIN_LENGTH);
            assert!(name.as_bytes()[0].is_ascii_alphabetic());
            assert!(name.bytes().all(|b| b.is_ascii_alphanumeric()));
            assert!(seen.insert(name));
        }
    }

    #[test]
    fn test_confusable_names() {
        let mut rng = StdRng::seed_from_u64(2);
        let mut names = NameGenerator::new();
        let name = names.fresh_confusable(&mut rng);
        assert_eq!(name.len(), CONFUSABLE_LENGTH);
        assert!(name.bytes().all(|b| CONFUSABLE.contains(&b)));
        assert!(name.as_bytes()[0] != b'1');
    }

    #[test]
    fn test_program_names_are_reserved() {
        let block = parse("local alpha = beta.gamma").unwrap();
        let names = NameGenerator::avoiding_names_in(&block);
        assert!(names.is_used("alpha"));
        assert!(names.is_used("beta"));
        assert!(names.is_used("gamma"));
        assert!(!names.is_used("local"));
    }
}
