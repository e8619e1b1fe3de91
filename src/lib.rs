//! A grammar-driven packrat parsing engine.
//!
//! Grammars are written in STLR, compiled to a [`RuleSet`] and run through
//! a [`Language`], which drives the [`Engine`] over a [`LexicalCursor`] and
//! builds a tree of [`Node`]s.

pub mod annotations;
pub mod behaviour;
pub mod charset;
pub mod cli;
pub mod cursor;
pub mod engine;
pub mod errors;
pub mod ir;
pub mod language;
pub mod result;
pub mod rules;
pub mod source;
pub mod stlr;
pub mod token;
pub mod tree;

pub use crate::annotations::{RuleAnnotation, RuleAnnotationValue, RuleAnnotations};
pub use crate::behaviour::{Behaviour, Cardinality, Kind};
pub use crate::charset::CharacterSet;
pub use crate::cursor::{LexicalContext, LexicalCursor, ScanFailure};
pub use crate::engine::{Engine, EngineConfig};
pub use crate::errors::{ErrorCategory, ErrorKind, SourceContext, Span, StlrError};
pub use crate::ir::{AstBuilder, IntermediateRepresentation, LookAheadIr, MatchRecord};
pub use crate::language::{Language, ParseOutput, TokenStream};
pub use crate::result::MatchResult;
pub use crate::rules::{Rule, RuleId, RuleKind, RuleSet};
pub use crate::source::Source;
pub use crate::stlr::Grammar;
pub use crate::token::{Token, TokenTable};
pub use crate::tree::{HeterogeneousNode, Node, NodeValue, Tree, TreeNode};
