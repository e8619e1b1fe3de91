//! The STLR grammar language: pest front end, syntax tree, validation and
//! compilation to a [`RuleSet`](crate::rules::RuleSet).

pub mod ast;
pub mod compile;
pub mod parser;
pub mod validate;

pub use compile::{compile, compile_ast, compile_str, Grammar};
pub use parser::parse;
pub use validate::{validate, ValidationResult};
