//! The intermediate representation sits between the engine and whatever is
//! being built from a parse.
//!
//! The engine announces every rule evaluation through
//! [`IntermediateRepresentation::will_evaluate`] and closes it with
//! [`IntermediateRepresentation::did_evaluate`]. The pair is strictly nested,
//! mirroring the cursor's marks, which is what lets [`AstBuilder`] keep a
//! stack of child frames and a packrat memo cache without ever looking at
//! the cursor itself.

mod builder;
mod memo;

use std::ops::Range;

pub use builder::AstBuilder;
pub use memo::{MemoCache, MemoEntry, MemoStats};

use crate::annotations::RuleAnnotations;
use crate::errors::StlrError;
use crate::result::MatchResult;
use crate::rules::{Rule, RuleId};
use crate::token::Token;

/// Everything needed to replay an evaluation without scanning again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchRecord {
    pub result: MatchResult,
    /// Cursor position after the evaluation. Differs from the end of a
    /// successful range when trailing text was skipped.
    pub end: usize,
    /// Skipped regions inside a successful range, left out of its text.
    pub gaps: Vec<Range<usize>>,
    /// Regions the evaluation excluded from the enclosing match's text.
    pub excluded: Vec<Range<usize>>,
}

impl MatchRecord {
    pub fn failed(result: MatchResult) -> Self {
        let end = result.end();
        Self {
            result,
            end,
            gaps: Vec::new(),
            excluded: Vec::new(),
        }
    }
}

pub trait IntermediateRepresentation {
    /// Called before `rule` is evaluated at `position`. Returning a record
    /// short-circuits the evaluation; `did_evaluate` is then not called.
    fn will_evaluate(&mut self, id: RuleId, rule: &Rule, position: usize) -> Option<MatchRecord>;

    /// Closes the evaluation opened by the matching `will_evaluate`. `error`
    /// is set when the result is a hard failure.
    fn did_evaluate(&mut self, id: RuleId, rule: &Rule, record: &MatchRecord, error: Option<StlrError>);

    /// A rule allowed to match zero times found nothing at `position`.
    fn ignorable_failure(&mut self, token: &Token, annotations: &RuleAnnotations, position: usize);

    /// Marks the current output so a failed repetition can be undone.
    fn checkpoint(&self) -> usize;

    fn restore(&mut self, checkpoint: usize);

    fn record_error(&mut self, error: StlrError);

    /// Removes and returns the errors recorded since the current evaluation
    /// began, to be attached as causes of its failure.
    fn failure_causes(&mut self) -> Vec<StlrError>;
}

/// Used while evaluating look-ahead and negated rules: nothing is recorded
/// and nothing is cached.
#[derive(Debug, Default, Clone, Copy)]
pub struct LookAheadIr;

impl IntermediateRepresentation for LookAheadIr {
    fn will_evaluate(&mut self, _: RuleId, _: &Rule, _: usize) -> Option<MatchRecord> {
        None
    }

    fn did_evaluate(&mut self, _: RuleId, _: &Rule, _: &MatchRecord, _: Option<StlrError>) {}

    fn ignorable_failure(&mut self, _: &Token, _: &RuleAnnotations, _: usize) {}

    fn checkpoint(&self) -> usize {
        0
    }

    fn restore(&mut self, _: usize) {}

    fn record_error(&mut self, _: StlrError) {}

    fn failure_causes(&mut self) -> Vec<StlrError> {
        Vec::new()
    }
}
