use log::trace;

use super::memo::{MemoCache, MemoEntry, MemoStats};
use super::{IntermediateRepresentation, MatchRecord};
use crate::annotations::RuleAnnotations;
use crate::errors::StlrError;
use crate::result::MatchResult;
use crate::rules::{Rule, RuleId};
use crate::source::Source;
use crate::token::Token;
use crate::tree::TreeNode;

/// One open evaluation.
#[derive(Debug)]
struct Evaluation {
    id: RuleId,
    position: usize,
    /// Length of the frame this evaluation writes into, when it began.
    frame_len: usize,
    errors_len: usize,
    /// Structural rules collect their children in a frame of their own.
    structural: bool,
}

/// Builds a tree of `N` from the engine's callbacks.
///
/// Frames form a stack parallel to the open structural rules: a successful
/// structural rule pops its frame and turns it into a node (or hoists it, or
/// drops it) in the frame below.
#[derive(Debug)]
pub struct AstBuilder<N: TreeNode> {
    source: Source,
    memo: MemoCache<N>,
    memoize: bool,
    frames: Vec<Vec<N>>,
    stack: Vec<Evaluation>,
    errors: Vec<StlrError>,
}

impl<N: TreeNode> AstBuilder<N> {
    pub fn new(source: Source, memoize: bool) -> Self {
        Self {
            source,
            memo: MemoCache::new(),
            memoize,
            frames: vec![Vec::new()],
            stack: Vec::new(),
            errors: Vec::new(),
        }
    }

    pub fn source(&self) -> &Source {
        &self.source
    }

    /// Top-level nodes built so far.
    pub fn nodes(&self) -> &[N] {
        &self.frames[0]
    }

    /// Removes and returns the finished top-level nodes.
    pub fn drain_nodes(&mut self) -> Vec<N> {
        std::mem::take(&mut self.frames[0])
    }

    pub fn errors(&self) -> &[StlrError] {
        &self.errors
    }

    pub fn take_errors(&mut self) -> Vec<StlrError> {
        std::mem::take(&mut self.errors)
    }

    pub fn clear_errors(&mut self) {
        self.errors.clear();
    }

    /// Forgets cached matches; only safe once the cursor has moved past every
    /// position they describe.
    pub fn clear_memo(&mut self) {
        self.memo.clear();
    }

    pub fn memo_stats(&self) -> MemoStats {
        self.memo.stats()
    }

    /// Finishes the build, returning the top-level nodes and `errors` merged
    /// with every error still accumulated.
    pub fn complete(mut self, mut errors: Vec<StlrError>) -> Result<(Vec<N>, Vec<StlrError>), StlrError> {
        if !self.stack.is_empty() || self.frames.len() != 1 {
            return Err(StlrError::undefined(format!(
                "unbalanced evaluation: {} rules still open",
                self.stack.len()
            )));
        }
        errors.append(&mut self.errors);
        let nodes = self.frames.pop().unwrap_or_default();
        Ok((nodes, errors))
    }

    fn output_frame(&mut self) -> &mut Vec<N> {
        let index = match self.stack.last() {
            Some(evaluation) if evaluation.structural => self.frames.len() - 2,
            _ => self.frames.len() - 1,
        };
        &mut self.frames[index]
    }

    fn current_frame(&mut self) -> &mut Vec<N> {
        let last = self.frames.len() - 1;
        &mut self.frames[last]
    }
}

impl<N: TreeNode> IntermediateRepresentation for AstBuilder<N> {
    fn will_evaluate(&mut self, id: RuleId, rule: &Rule, position: usize) -> Option<MatchRecord> {
        if self.memoize {
            if let Some(entry) = self.memo.get(id, position) {
                trace!("memo hit for {} at {}", rule.produces, position);
                let record = entry.record.clone();
                let nodes = entry.nodes.clone();
                let errors = entry.errors.clone();
                self.current_frame().extend(nodes);
                self.errors.extend(errors);
                return Some(record);
            }
        }

        let frame_len = self.current_frame().len();
        let structural = rule.behaviour.is_structural();
        if structural {
            self.frames.push(Vec::new());
        }
        self.stack.push(Evaluation {
            id,
            position,
            frame_len,
            errors_len: self.errors.len(),
            structural,
        });
        None
    }

    fn did_evaluate(&mut self, id: RuleId, rule: &Rule, record: &MatchRecord, error: Option<StlrError>) {
        let evaluation = self
            .stack
            .pop()
            .expect("did_evaluate() called without a matching will_evaluate()");
        debug_assert_eq!(evaluation.id, id);

        let children = if evaluation.structural {
            self.frames
                .pop()
                .expect("structural evaluation lost its frame")
        } else {
            Vec::new()
        };

        match &record.result {
            MatchResult::Success(range) => {
                self.errors.truncate(evaluation.errors_len);
                if let Some(token) = rule.behaviour.token() {
                    let annotations = &rule.annotations;
                    match (annotations.is_void(), annotations.is_transient()) {
                        (true, _) => {}
                        (false, true) => self.current_frame().extend(children),
                        (false, false) => {
                            let node = N::create(
                                token.clone(),
                                range.clone(),
                                record.gaps.clone(),
                                children,
                                annotations,
                                &self.source,
                            );
                            self.current_frame().push(node);
                        }
                    }
                }
            }
            MatchResult::Consumed(_) => {
                self.errors.truncate(evaluation.errors_len);
            }
            MatchResult::IgnorableFailure(_) => {}
            MatchResult::Failure(_) => {
                self.current_frame().truncate(evaluation.frame_len);
                if let Some(error) = error {
                    self.errors.push(error);
                }
            }
        }

        if self.memoize {
            let nodes = self.current_frame()[evaluation.frame_len..].to_vec();
            let errors = self.errors[evaluation.errors_len.min(self.errors.len())..].to_vec();
            self.memo.insert(
                id,
                evaluation.position,
                MemoEntry {
                    record: record.clone(),
                    nodes,
                    errors,
                },
            );
        }
    }

    fn ignorable_failure(&mut self, token: &Token, annotations: &RuleAnnotations, position: usize) {
        if annotations.is_pinned() {
            let node = N::create(
                token.clone(),
                position..position,
                Vec::new(),
                Vec::new(),
                annotations,
                &self.source,
            );
            self.output_frame().push(node);
        }
    }

    fn checkpoint(&self) -> usize {
        self.frames.last().map_or(0, Vec::len)
    }

    fn restore(&mut self, checkpoint: usize) {
        self.current_frame().truncate(checkpoint);
    }

    fn record_error(&mut self, error: StlrError) {
        self.errors.push(error);
    }

    fn failure_causes(&mut self) -> Vec<StlrError> {
        let since = self
            .stack
            .last()
            .map_or(0, |evaluation| evaluation.errors_len)
            .min(self.errors.len());
        self.errors.split_off(since)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotations::{RuleAnnotation, RuleAnnotationValue};
    use crate::rules::RuleSet;
    use crate::tree::Node;

    fn success(range: std::ops::Range<usize>) -> MatchRecord {
        MatchRecord {
            end: range.end,
            result: MatchResult::Success(range),
            gaps: Vec::new(),
            excluded: Vec::new(),
        }
    }

    #[test]
    fn structural_rules_nest() {
        let mut rules = RuleSet::new();
        let x = rules.terminal("x");
        let inner_token = rules.token("inner");
        let outer_token = rules.token("outer");
        let inner = rules.structural(x, inner_token);
        let outer = rules.structural(inner, outer_token);

        let mut ir: AstBuilder<Node> = AstBuilder::new(Source::new("x"), true);
        assert!(ir.will_evaluate(outer, rules.get(outer), 0).is_none());
        assert!(ir.will_evaluate(inner, rules.get(inner), 0).is_none());
        ir.did_evaluate(inner, rules.get(inner), &success(0..1), None);
        ir.did_evaluate(outer, rules.get(outer), &success(0..1), None);

        let (nodes, errors) = ir.complete(Vec::new()).unwrap();
        assert!(errors.is_empty());
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].token.name(), Some("outer"));
        assert_eq!(nodes[0].children[0].token.name(), Some("inner"));
    }

    #[test]
    fn transient_hoists_and_void_drops() {
        let mut rules = RuleSet::new();
        let x = rules.terminal("x");
        let leaf_token = rules.token("leaf");
        let group_token = rules.token("group");
        let leaf = rules.structural(x, leaf_token);
        let transient = rules.structural_annotated(
            leaf,
            group_token.clone(),
            RuleAnnotations::new().with(RuleAnnotation::Transient, RuleAnnotationValue::Set),
        );
        let void = rules.structural_annotated(
            leaf,
            group_token,
            RuleAnnotations::new().with(RuleAnnotation::Void, RuleAnnotationValue::Set),
        );

        let mut ir: AstBuilder<Node> = AstBuilder::new(Source::new("xx"), false);
        for (id, at) in [(transient, 0), (void, 1)] {
            ir.will_evaluate(id, rules.get(id), at);
            ir.will_evaluate(leaf, rules.get(leaf), at);
            ir.did_evaluate(leaf, rules.get(leaf), &success(at..at + 1), None);
            ir.did_evaluate(id, rules.get(id), &success(at..at + 1), None);
        }

        let names: Vec<_> = ir.nodes().iter().map(|n| n.token.to_string()).collect();
        assert_eq!(names, vec!["leaf"]);
    }

    #[test]
    fn memo_replays_nodes() {
        let mut rules = RuleSet::new();
        let x = rules.terminal("x");
        let token = rules.token("x");
        let node = rules.structural(x, token);

        let mut ir: AstBuilder<Node> = AstBuilder::new(Source::new("x"), true);
        ir.will_evaluate(node, rules.get(node), 0);
        ir.did_evaluate(node, rules.get(node), &success(0..1), None);

        let replayed = ir.will_evaluate(node, rules.get(node), 0);
        assert_eq!(replayed, Some(success(0..1)));
        assert_eq!(ir.nodes().len(), 2);
        assert_eq!(ir.memo_stats().hits, 1);
    }

    #[test]
    fn failures_keep_errors_as_causes() {
        let mut rules = RuleSet::new();
        let x = rules.terminal("x");

        let mut ir: AstBuilder<Node> = AstBuilder::new(Source::new("y"), false);
        ir.will_evaluate(x, rules.get(x), 0);
        ir.record_error(StlrError::match_failed("inner", 0));
        let causes = ir.failure_causes();
        let error = StlrError::match_failed("x", 0).with_causes(causes);
        ir.did_evaluate(x, rules.get(x), &MatchRecord::failed(MatchResult::Failure(0)), Some(error));

        let (_, errors) = ir.complete(Vec::new()).unwrap();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].causes.len(), 1);
    }
}
