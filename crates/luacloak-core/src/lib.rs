//! luacloak core: parsing, code generation and the obfuscation passes.
//!
//! A program flows through the pipeline as an owned [`ast::Block`]:
//! [`parser::parse`] builds it, each pass in [`passes`] rewrites it, and
//! [`codegen::emit_block`] turns it back into Lua source. The
//! [`pipeline::Obfuscator`] wires the passes together in their fixed order.

pub mod ast;
pub mod codegen;
pub mod config;
pub mod error;
pub mod lexer;
pub mod names;
pub mod parser;
pub mod passes;
pub mod pipeline;
pub mod scope;
pub mod tree;

pub use ast::{Block, Expression, Statement};
pub use codegen::{emit_block, emit_expression, emit_statement};
pub use config::{ObfuscatorConfig, OutputFormat, PassConfig};
pub use error::{ObfuscateError, ParseError};
pub use parser::parse;
pub use pipeline::Obfuscator;
