//! Standard-mode tokenizer, AST and parser.

pub mod ast;
pub mod lexer;
pub mod parser;

pub use ast::*;
pub use parser::parse;
