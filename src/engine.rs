//! Rule evaluation.
//!
//! Every rule, whatever its kind, goes through [`Engine::evaluate`]:
//!
//! 1. memo check through the IR (a hit replays the cursor and returns);
//! 2. mark, skipping when the rule is skipping or `@void`;
//! 3. look-ahead rules run against [`LookAheadIr`] and always rewind;
//! 4. negated rules invert each attempt and consume one scalar on success;
//! 5. a greedy cardinality loop, never backtracking into repetition;
//! 6. resolution into ignorable failure, failure, or success;
//! 7. node emission and
//! 8. memo write, both done by the IR in `did_evaluate`.
//!
//! Ordinary failures are `Ok` results. Only fatal errors (an `@fatal` rule,
//! the recursion limit, an unresolved placeholder) are returned as `Err` and
//! unwind the whole parse.
//!
//! Evaluation recurses natively, one `evaluate` per nested rule. Callers that
//! parse untrusted input run it through [`on_parse_stack`], which gives the
//! parse a thread whose stack holds `max_depth` nested rules, so the limit
//! is reached before the stack is.

use std::cell::Cell;
use std::thread;

use log::{debug, trace};
use serde::Deserialize;

use crate::annotations::RuleAnnotations;
use crate::cursor::LexicalCursor;
use crate::errors::{ErrorKind, Span, StlrError};
use crate::ir::{IntermediateRepresentation, LookAheadIr, MatchRecord};
use crate::result::MatchResult;
use crate::rules::{Rule, RuleId, RuleKind, RuleSet};
use crate::token::Token;

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Per-language evaluation settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Maximum number of nested rule evaluations before the parse is
    /// aborted with a fatal `RecursionLimit` error. Each rule entered while
    /// another is still being evaluated counts once.
    pub max_depth: usize,
    /// Cache every evaluation by rule and position. Turning it off gives the
    /// same trees, only slower on grammars that backtrack.
    pub memoize: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_depth: 1000,
            memoize: true,
        }
    }
}

impl EngineConfig {
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn with_memoize(mut self, memoize: bool) -> Self {
        self.memoize = memoize;
        self
    }

    /// Stack size of the thread [`on_parse_stack`] starts.
    pub fn stack_size(&self) -> usize {
        self.max_depth
            .saturating_mul(STACK_PER_EVALUATION)
            .max(MIN_PARSE_STACK)
    }
}

/// Native stack reserved for one nested evaluation. Unoptimized builds use
/// well under half of this.
const STACK_PER_EVALUATION: usize = 64 * 1024;

const MIN_PARSE_STACK: usize = 2 * 1024 * 1024;

/// Runs `parse` on a scoped thread sized by [`EngineConfig::stack_size`] and
/// waits for it. A panic inside `parse` is resumed on the caller's thread.
pub fn on_parse_stack<R, F>(config: &EngineConfig, parse: F) -> Result<R, StlrError>
where
    R: Send,
    F: FnOnce() -> R + Send,
{
    thread::scope(|scope| {
        let handle = thread::Builder::new()
            .name("stlr-parse".into())
            .stack_size(config.stack_size())
            .spawn_scoped(scope, parse)
            .map_err(|error| StlrError::undefined(format!("cannot start the parse thread: {}", error)))?;
        Ok(handle
            .join()
            .unwrap_or_else(|panic| std::panic::resume_unwind(panic)))
    })
}

// ============================================================================
// ENGINE
// ============================================================================

pub struct Engine<'r> {
    rules: &'r RuleSet,
    config: EngineConfig,
    /// Evaluations currently open.
    depth: Cell<usize>,
}

impl<'r> Engine<'r> {
    pub fn new(rules: &'r RuleSet, config: EngineConfig) -> Self {
        Self {
            rules,
            config,
            depth: Cell::new(0),
        }
    }

    pub fn rules(&self) -> &'r RuleSet {
        self.rules
    }

    /// Number of rule evaluations currently open.
    pub fn depth(&self) -> usize {
        self.depth.get()
    }

    /// Evaluates rule `id` at the cursor.
    pub fn evaluate(
        &self,
        id: RuleId,
        cursor: &mut LexicalCursor,
        ir: &mut dyn IntermediateRepresentation,
    ) -> Result<MatchResult, StlrError> {
        let (id, rule) = self.rules.resolve(id)?;
        let depth = self.depth.get();

        if depth >= self.config.max_depth {
            debug!(
                "recursion limit reached in {} at {}",
                rule.produces,
                cursor.position()
            );
            return Err(StlrError::new(
                ErrorKind::RecursionLimit {
                    limit: self.config.max_depth,
                },
                Span::at(cursor.position()),
            ));
        }

        self.depth.set(depth + 1);
        let result = self.evaluate_rule(id, rule, cursor, ir);
        self.depth.set(depth);
        result
    }

    fn evaluate_rule(
        &self,
        id: RuleId,
        rule: &'r Rule,
        cursor: &mut LexicalCursor,
        ir: &mut dyn IntermediateRepresentation,
    ) -> Result<MatchResult, StlrError> {
        let start = cursor.position();
        let skipping = rule.behaviour.is_skipping() || rule.annotations.is_void();

        if let Some(record) = ir.will_evaluate(id, rule, start) {
            if record.result.is_success() {
                cursor.mark(skipping);
                cursor.replay(record.end, &record.excluded);
                cursor.proceed();
            }
            return Ok(record.result);
        }

        cursor.mark(skipping);
        let matches = if rule.behaviour.lookahead {
            cursor.mark(false);
            let matches = self.repeat(rule, cursor, &mut LookAheadIr);
            cursor.rewind();
            matches
        } else {
            self.repeat(rule, cursor, ir)
        };
        let matches = match matches {
            Ok(matches) => matches,
            Err(error) => {
                cursor.rewind();
                return Err(error);
            }
        };

        let cardinality = rule.behaviour.cardinality;
        let (record, error) = if matches == 0 && cardinality.minimum == 0 {
            cursor.rewind();
            let (token, annotations) = self.ignorable_identity(rule)?;
            ir.ignorable_failure(token, annotations, start);
            (MatchRecord::failed(MatchResult::IgnorableFailure(start)), None)
        } else if matches < cardinality.minimum {
            cursor.rewind();
            let error = self.failure(rule, start, ir.failure_causes());
            if error.is_fatal() {
                debug!("fatal error in {}: {}", rule.produces, error);
                return Err(error);
            }
            (MatchRecord::failed(MatchResult::Failure(start)), Some(error))
        } else {
            let context = cursor.proceed();
            let end = cursor.position();
            let result = if rule.behaviour.lookahead {
                MatchResult::Consumed(start..start)
            } else if rule.behaviour.is_structural() {
                MatchResult::Success(context.range())
            } else {
                MatchResult::Consumed(context.range())
            };
            let gaps = context.gaps().to_vec();
            let record = MatchRecord {
                result,
                end,
                gaps,
                excluded: context.into_excluded(),
            };
            (record, None)
        };

        trace!("{} at {}: {:?}", rule.produces, start, record.result);
        ir.did_evaluate(id, rule, &record, error);
        Ok(record.result)
    }

    /// The cardinality loop. Returns how many attempts succeeded.
    fn repeat(
        &self,
        rule: &Rule,
        cursor: &mut LexicalCursor,
        ir: &mut dyn IntermediateRepresentation,
    ) -> Result<usize, StlrError> {
        let cardinality = rule.behaviour.cardinality;
        let mut matches = 0;

        while cardinality.allows_more(matches) {
            let before = cursor.position();
            let checkpoint = ir.checkpoint();

            cursor.mark(false);
            let matched = match self.attempt(rule, cursor, ir) {
                Ok(matched) => matched,
                Err(error) => {
                    cursor.rewind();
                    return Err(error);
                }
            };

            if !matched {
                cursor.rewind();
                ir.restore(checkpoint);
                break;
            }

            cursor.proceed();
            matches += 1;
            if cursor.position() == before {
                // Every further attempt would match the same empty input.
                matches = matches.max(cardinality.minimum);
                break;
            }
        }

        Ok(matches)
    }

    /// One attempt, with negation applied.
    fn attempt(
        &self,
        rule: &Rule,
        cursor: &mut LexicalCursor,
        ir: &mut dyn IntermediateRepresentation,
    ) -> Result<bool, StlrError> {
        if !rule.behaviour.negated {
            return self.match_once(rule, cursor, ir);
        }

        cursor.mark(false);
        let inner = self.match_once(rule, cursor, &mut LookAheadIr);
        cursor.rewind();
        if inner? {
            return Ok(false);
        }
        Ok(cursor.scan_next().is_ok())
    }

    /// Matches the rule's payload exactly once, ignoring its behaviour.
    fn match_once(
        &self,
        rule: &Rule,
        cursor: &mut LexicalCursor,
        ir: &mut dyn IntermediateRepresentation,
    ) -> Result<bool, StlrError> {
        match &rule.kind {
            RuleKind::Terminal(text) => Ok(cursor.scan_terminal(text).is_ok()),
            RuleKind::TerminalFromSet(set) => Ok(cursor.scan_one_of(set).is_ok()),
            RuleKind::TerminalUntil(terminator) => Ok(cursor.scan_up_to(terminator).is_ok()),
            RuleKind::TerminalUntilSet(set) => Ok(cursor.scan_up_to_set(set).is_ok()),
            RuleKind::Regex(regex) => Ok(cursor.scan_regex(regex).is_ok()),
            RuleKind::Sequence(elements) => {
                for &element in elements {
                    if self.evaluate(element, cursor, ir)?.is_failure() {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            RuleKind::Choice(alternatives) => {
                for &alternative in alternatives {
                    if self.evaluate(alternative, cursor, ir)?.can_continue() {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            RuleKind::Reference(target) => Ok(self.evaluate(*target, cursor, ir)?.can_continue()),
            RuleKind::Inherit(target) => {
                let (_, target) = self.rules.resolve(*target)?;
                self.match_once(target, cursor, ir)
            }
            RuleKind::Custom {
                description,
                matcher,
            } => match matcher(cursor) {
                Ok(matched) => Ok(matched),
                Err(error) => {
                    ir.record_error(StlrError::new(
                        ErrorKind::Undefined {
                            message: format!("{}: {}", description, error),
                        },
                        Span::at(cursor.position()),
                    ));
                    Ok(false)
                }
            },
            RuleKind::Recursive(_) => Err(StlrError::undefined(format!(
                "recursive rule '{}' evaluated without resolution",
                rule.produces
            ))),
        }
    }

    /// Token and annotations reported for an ignorable failure. A plain
    /// wrapper made by a modifier reports the rule it wraps, so `@pin item?`
    /// still pins `item`.
    fn ignorable_identity(&self, rule: &'r Rule) -> Result<(&'r Token, &'r RuleAnnotations), StlrError> {
        if let Some(token) = rule.behaviour.token() {
            return Ok((token, &rule.annotations));
        }
        match &rule.kind {
            RuleKind::Reference(target) if rule.annotations.is_empty() => {
                let (_, target) = self.rules.resolve(*target)?;
                let token = target.behaviour.token().unwrap_or(&target.produces);
                Ok((token, &target.annotations))
            }
            _ => Ok((&rule.produces, &rule.annotations)),
        }
    }

    /// The error for a rule that matched fewer times than required.
    fn failure(&self, rule: &Rule, start: usize, causes: Vec<StlrError>) -> StlrError {
        let reached = causes
            .iter()
            .map(|cause| cause.span.end)
            .max()
            .unwrap_or(start)
            .max(start);
        let span = Span::new(start, reached);

        let message = rule.annotations.error().map(str::to_string);
        let kind = match message {
            Some(message) if rule.annotations.is_fatal() => ErrorKind::Fatal { message },
            None if rule.annotations.is_fatal() => ErrorKind::Fatal {
                message: format!("expected {}", rule.produces),
            },
            Some(message) if rule.behaviour.is_structural() => ErrorKind::Parsing { message },
            Some(message) => ErrorKind::Scanning { message },
            None => {
                if let RuleKind::Sequence(_) = rule.kind {
                    let specific = causes
                        .iter()
                        .flat_map(|cause| std::iter::once(cause).chain(cause.all_causes()))
                        .find(|cause| cause.kind.is_specific())
                        .map(|cause| (cause.kind.clone(), cause.span));
                    if let Some((kind, span)) = specific {
                        return StlrError::new(kind, span).with_causes(causes);
                    }
                }
                ErrorKind::MatchFailed {
                    token: rule.produces.to_string(),
                }
            }
        };

        StlrError::new(kind, span).with_causes(causes)
    }
}
