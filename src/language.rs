//! The entry point for parsing: a rule set plus the roots to start from.

use std::collections::VecDeque;
use std::sync::Arc;

use log::debug;

use crate::cursor::LexicalCursor;
use crate::engine::{on_parse_stack, Engine, EngineConfig};
use crate::errors::{ErrorKind, Span, StlrError};
use crate::ir::AstBuilder;
use crate::rules::{RuleId, RuleSet};
use crate::source::Source;
use crate::tree::{Node, Tree, TreeNode};

/// Nodes of a parse together with the non-fatal errors it produced.
#[derive(Debug, Clone)]
pub struct ParseOutput<N = Node> {
    pub source: Source,
    pub nodes: Vec<N>,
    pub errors: Vec<StlrError>,
}

impl<N: TreeNode> ParseOutput<N> {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn into_tree(self) -> Tree<N> {
        Tree::new(self.source, self.nodes)
    }
}

/// A compiled grammar ready to parse. Cheap to clone and shareable across
/// threads; every parse owns its cursor, IR and memo cache.
#[derive(Debug, Clone)]
pub struct Language {
    rules: Arc<RuleSet>,
    roots: Arc<[RuleId]>,
    config: EngineConfig,
}

impl Language {
    pub fn new(rules: impl Into<Arc<RuleSet>>, roots: Vec<RuleId>) -> Self {
        Self {
            rules: rules.into(),
            roots: roots.into(),
            config: EngineConfig::default(),
        }
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    pub fn roots(&self) -> &[RuleId] {
        &self.roots
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Parses the whole source, collecting trailing input as an error.
    /// Only fatal errors are returned as `Err`.
    ///
    /// The parse runs on a thread of its own, sized for the configured
    /// `max_depth`, so deeply nested input ends in a `RecursionLimit` error
    /// whatever the stack of the calling thread.
    pub fn parse<N: TreeNode>(&self, source: impl Into<Source>) -> Result<ParseOutput<N>, StlrError> {
        let source = source.into();
        on_parse_stack(&self.config, || self.parse_source(source))?
    }

    fn parse_source<N: TreeNode>(&self, source: Source) -> Result<ParseOutput<N>, StlrError> {
        debug!(
            "parsing {} scalars with {} root rule(s)",
            source.len(),
            self.roots.len()
        );

        let mut cursor = LexicalCursor::new(source.clone());
        let mut ir: AstBuilder<N> = AstBuilder::new(source.clone(), self.config.memoize);
        let engine = Engine::new(&self.rules, self.config);

        let mut errors = Vec::new();
        let mut first = true;
        loop {
            let before = cursor.position();
            let matched = match_root(&engine, &self.roots, &mut cursor, &mut ir)?;

            if !matched {
                if first && cursor.end_of_input() {
                    errors.append(&mut ir.take_errors());
                }
                break;
            }
            first = false;
            ir.clear_errors();
            if cursor.end_of_input() || cursor.position() == before {
                break;
            }
        }

        if !cursor.end_of_input() {
            errors.push(trailing_input(&cursor, ir.take_errors()));
        }

        let stats = ir.memo_stats();
        let (nodes, errors) = ir.complete(errors)?;
        debug!(
            "parsed {} top-level node(s), {} error(s); memo {} hit(s), {} miss(es)",
            nodes.len(),
            errors.len(),
            stats.hits,
            stats.misses
        );

        Ok(ParseOutput {
            source,
            nodes,
            errors,
        })
    }

    /// Parses the whole source, failing on the first error of any kind.
    pub fn build<N: TreeNode>(&self, source: impl Into<Source>) -> Result<Tree<N>, StlrError> {
        let mut output = self.parse::<N>(source)?;
        if output.errors.is_empty() {
            Ok(output.into_tree())
        } else {
            Err(output.errors.remove(0))
        }
    }

    /// Lazily yields top-level nodes, one root match at a time.
    pub fn token_stream(&self, source: impl Into<Source>) -> TokenStream {
        let source = source.into();
        TokenStream {
            language: self.clone(),
            cursor: LexicalCursor::new(source.clone()),
            ir: AstBuilder::new(source, self.config.memoize),
            pending: VecDeque::new(),
            started: false,
            done: false,
        }
    }
}

/// Tries every root in order. True if one matched.
fn match_root<N: TreeNode>(
    engine: &Engine<'_>,
    roots: &[RuleId],
    cursor: &mut LexicalCursor,
    ir: &mut AstBuilder<N>,
) -> Result<bool, StlrError> {
    for &root in roots {
        if engine.evaluate(root, cursor, ir)?.is_success() {
            return Ok(true);
        }
    }
    Ok(false)
}

fn trailing_input(cursor: &LexicalCursor, causes: Vec<StlrError>) -> StlrError {
    let span = Span::new(cursor.position(), cursor.source().len());
    StlrError::new(ErrorKind::TrailingInput, span).with_causes(causes)
}

/// Forward-only iterator over the top-level nodes of a parse.
///
/// Yields `Err` at most once (unmatched input, or a fatal error) and is
/// fused afterwards.
pub struct TokenStream {
    language: Language,
    cursor: LexicalCursor,
    ir: AstBuilder<Node>,
    pending: VecDeque<Node>,
    started: bool,
    done: bool,
}

impl TokenStream {
    /// Position of the next unmatched scalar.
    pub fn position(&self) -> usize {
        self.cursor.position()
    }

    fn advance(&mut self) -> Result<bool, StlrError> {
        let config = self.language.config;
        on_parse_stack(&config, || self.match_next())?
    }

    fn match_next(&mut self) -> Result<bool, StlrError> {
        let engine = Engine::new(&self.language.rules, self.language.config);
        let before = self.cursor.position();
        let matched = match_root(&engine, &self.language.roots, &mut self.cursor, &mut self.ir)?;

        self.pending.extend(self.ir.drain_nodes());
        if !matched {
            return if self.cursor.end_of_input() {
                Ok(false)
            } else {
                Err(trailing_input(&self.cursor, self.ir.take_errors()))
            };
        }

        self.ir.clear_errors();
        self.ir.clear_memo();
        Ok(self.cursor.position() > before)
    }
}

impl Iterator for TokenStream {
    type Item = Result<Node, StlrError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(node) = self.pending.pop_front() {
                return Some(Ok(node));
            }
            if self.done || (self.started && self.cursor.end_of_input()) {
                self.done = true;
                return None;
            }
            self.started = true;

            match self.advance() {
                Ok(true) => {}
                Ok(false) => {
                    self.done = true;
                    if !self.cursor.end_of_input() {
                        let error = trailing_input(&self.cursor, self.ir.take_errors());
                        self.pending.clear();
                        return Some(Err(error));
                    }
                }
                Err(error) => {
                    self.done = true;
                    return Some(Err(error));
                }
            }
        }
    }
}

impl std::iter::FusedIterator for TokenStream {}
