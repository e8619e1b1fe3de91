//! The lexical cursor: one read position over a [`Source`] with nested
//! backtracking marks.
//!
//! ## Mark discipline
//!
//! Every [`LexicalCursor::mark`] must be balanced by exactly one
//! [`LexicalCursor::proceed`] (commit) or [`LexicalCursor::rewind`]
//! (backtrack), in LIFO order. Unbalanced use panics; it is a bug in the
//! caller, not a property of the input.
//!
//! ## Skipping
//!
//! A mark opened with `skipping = true` still moves the cursor normally, but
//! once proceeded its region is excluded from the text accumulated by every
//! enclosing mark. Exclusions travel outwards through non-skipping marks and
//! are discarded together with a mark that is rewound.

use std::ops::Range;

use regex::Regex;
use thiserror::Error;

use crate::charset::CharacterSet;
use crate::source::Source;

/// Why a scanning primitive did not match. The cursor position is unchanged
/// whenever one of these is returned.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScanFailure {
    #[error("unexpected end of input at {position}")]
    UnexpectedEndOfInput { position: usize },
    #[error("no match at {position}")]
    NoMatch { position: usize },
}

#[derive(Debug)]
struct Mark {
    start: usize,
    skipping: bool,
    /// Proceeded skip regions inside this mark, ascending and disjoint.
    excluded: Vec<Range<usize>>,
}

/// The result of proceeding a mark.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LexicalContext {
    range: Range<usize>,
    full_range: Range<usize>,
    matched: String,
    gaps: Vec<Range<usize>>,
    excluded: Vec<Range<usize>>,
}

impl LexicalContext {
    /// The matched range with excluded (skipped) text trimmed from both ends.
    pub fn range(&self) -> Range<usize> {
        self.range.clone()
    }

    /// Everything the cursor moved over between mark and proceed.
    pub fn full_range(&self) -> Range<usize> {
        self.full_range.clone()
    }

    /// The matched text with every excluded region removed.
    pub fn matched_string(&self) -> &str {
        &self.matched
    }

    /// Excluded regions strictly inside [`LexicalContext::range`].
    pub fn gaps(&self) -> &[Range<usize>] {
        &self.gaps
    }

    /// The regions this mark excluded from the enclosing mark's text.
    pub fn excluded(&self) -> &[Range<usize>] {
        &self.excluded
    }

    pub fn into_excluded(self) -> Vec<Range<usize>> {
        self.excluded
    }
}

/// A single read pointer over scalar-addressed source text.
#[derive(Debug)]
pub struct LexicalCursor {
    source: Source,
    position: usize,
    marks: Vec<Mark>,
}

impl LexicalCursor {
    pub fn new(source: impl Into<Source>) -> Self {
        Self {
            source: source.into(),
            position: 0,
            marks: Vec::new(),
        }
    }

    pub fn source(&self) -> &Source {
        &self.source
    }

    pub fn position(&self) -> usize {
        self.position
    }

    /// Number of open marks.
    pub fn depth(&self) -> usize {
        self.marks.len()
    }

    pub fn end_of_input(&self) -> bool {
        self.position >= self.source.len()
    }

    /// The scalar under the cursor, if any.
    pub fn current(&self) -> Option<char> {
        self.source.scalar(self.position)
    }

    // ========================================================================
    // MARKS
    // ========================================================================

    pub fn mark(&mut self, skipping: bool) {
        self.marks.push(Mark {
            start: self.position,
            skipping,
            excluded: Vec::new(),
        });
    }

    /// Commits the most recent mark and folds its text into the enclosing one.
    pub fn proceed(&mut self) -> LexicalContext {
        let mark = self
            .marks
            .pop()
            .expect("proceed() called without a matching mark()");

        let end = self.position;
        let mut context = self.context_for(&mark, end);

        let excluded = if mark.skipping {
            if mark.start < end {
                vec![mark.start..end]
            } else {
                Vec::new()
            }
        } else {
            mark.excluded
        };
        if let Some(parent) = self.marks.last_mut() {
            parent.excluded.extend(excluded.iter().cloned());
        }
        context.excluded = excluded;

        context
    }

    /// Drops the most recent mark and moves back to where it was taken.
    pub fn rewind(&mut self) {
        let mark = self
            .marks
            .pop()
            .expect("rewind() called without a matching mark()");
        self.position = mark.start;
    }

    /// Moves the cursor directly to `position`. Used to replay memoized
    /// matches; the caller is responsible for wrapping it in a mark.
    pub fn seek(&mut self, position: usize) {
        self.position = position.min(self.source.len());
    }

    /// Moves to `end` as if a match had been scanned, re-applying the regions
    /// that match excluded from the enclosing text.
    pub fn replay(&mut self, end: usize, excluded: &[Range<usize>]) {
        self.seek(end);
        if let Some(mark) = self.marks.last_mut() {
            mark.excluded.extend(excluded.iter().cloned());
        }
    }

    fn context_for(&self, mark: &Mark, end: usize) -> LexicalContext {
        let full_range = mark.start..end;
        let matched = self
            .source
            .slice_without(full_range.clone(), &mark.excluded)
            .into_owned();

        let mut start = mark.start;
        for excluded in &mark.excluded {
            if excluded.start <= start {
                start = start.max(excluded.end);
            } else {
                break;
            }
        }
        let mut trimmed_end = end;
        for excluded in mark.excluded.iter().rev() {
            if excluded.end >= trimmed_end && excluded.start < trimmed_end {
                trimmed_end = excluded.start;
            } else {
                break;
            }
        }
        let range = if start < trimmed_end {
            start..trimmed_end
        } else {
            let at = start.min(end);
            at..at
        };

        let gaps = mark
            .excluded
            .iter()
            .map(|excluded| excluded.start.max(range.start)..excluded.end.min(range.end))
            .filter(|gap| gap.start < gap.end)
            .collect();

        LexicalContext {
            range,
            full_range,
            matched,
            gaps,
            excluded: Vec::new(),
        }
    }

    // ========================================================================
    // SCANNING PRIMITIVES
    // ========================================================================

    /// Consumes exactly one scalar.
    pub fn scan_next(&mut self) -> Result<char, ScanFailure> {
        let c = self.current().ok_or(ScanFailure::UnexpectedEndOfInput {
            position: self.position,
        })?;
        self.position += 1;
        Ok(c)
    }

    /// Consumes `terminal` if the input continues with it.
    pub fn scan_terminal(&mut self, terminal: &str) -> Result<(), ScanFailure> {
        let start = self.position;
        for expected in terminal.chars() {
            match self.source.scalar(self.position) {
                Some(c) if c == expected => self.position += 1,
                Some(_) => {
                    self.position = start;
                    return Err(ScanFailure::NoMatch { position: start });
                }
                None => {
                    self.position = start;
                    return Err(ScanFailure::UnexpectedEndOfInput { position: start });
                }
            }
        }
        Ok(())
    }

    /// Consumes one scalar if it is a member of `set`.
    pub fn scan_one_of(&mut self, set: &CharacterSet) -> Result<char, ScanFailure> {
        match self.current() {
            Some(c) if set.contains(c) => {
                self.position += 1;
                Ok(c)
            }
            Some(_) => Err(ScanFailure::NoMatch {
                position: self.position,
            }),
            None => Err(ScanFailure::UnexpectedEndOfInput {
                position: self.position,
            }),
        }
    }

    /// Consumes scalars up to, but not including, the next occurrence of
    /// `terminator`.
    pub fn scan_up_to(&mut self, terminator: &str) -> Result<(), ScanFailure> {
        let start = self.position;
        let needle: Vec<char> = terminator.chars().collect();
        let haystack = self.source.scalars();

        let mut at = start;
        while at + needle.len() <= haystack.len() {
            if haystack[at..at + needle.len()] == needle[..] {
                self.position = at;
                return Ok(());
            }
            at += 1;
        }

        Err(ScanFailure::UnexpectedEndOfInput { position: start })
    }

    /// Consumes scalars up to, but not including, the next member of `set`.
    pub fn scan_up_to_set(&mut self, set: &CharacterSet) -> Result<(), ScanFailure> {
        let start = self.position;
        let found = self.source.scalars()[start..]
            .iter()
            .position(|&c| set.contains(c));

        match found {
            Some(offset) => {
                self.position = start + offset;
                Ok(())
            }
            None => Err(ScanFailure::UnexpectedEndOfInput { position: start }),
        }
    }

    /// Consumes the match of an anchored (`^`-prefixed) regular expression
    /// applied to the remaining input.
    pub fn scan_regex(&mut self, regex: &Regex) -> Result<(), ScanFailure> {
        let start = self.position;
        let byte_start = self.source.byte_range(start..start).start;
        let rest = &self.source.as_str()[byte_start..];

        match regex.find(rest) {
            Some(found) if found.start() == 0 => {
                self.position = start + found.as_str().chars().count();
                Ok(())
            }
            _ if rest.is_empty() => Err(ScanFailure::UnexpectedEndOfInput { position: start }),
            _ => Err(ScanFailure::NoMatch { position: start }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn proceed_returns_the_marked_text() {
        let mut cursor = LexicalCursor::new("Hello, World");
        cursor.mark(false);
        cursor.scan_terminal("Hello").unwrap();
        let context = cursor.proceed();

        assert_eq!(context.range(), 0..5);
        assert_eq!(context.matched_string(), "Hello");
        assert_eq!(cursor.depth(), 0);
    }

    #[test]
    fn rewind_restores_position() {
        let mut cursor = LexicalCursor::new("abc");
        cursor.mark(false);
        cursor.scan_next().unwrap();
        cursor.scan_next().unwrap();
        cursor.rewind();

        assert_eq!(cursor.position(), 0);
    }

    #[test]
    fn failed_terminal_leaves_position_unchanged() {
        let mut cursor = LexicalCursor::new("abd");
        assert!(cursor.scan_terminal("abc").is_err());
        assert_eq!(cursor.position(), 0);
        assert_eq!(
            cursor.scan_terminal("abdx"),
            Err(ScanFailure::UnexpectedEndOfInput { position: 0 })
        );
    }

    #[test]
    fn nested_skip_is_excluded_from_outer_text() {
        let mut cursor = LexicalCursor::new("\"hi\"");
        cursor.mark(false);

        cursor.mark(true);
        cursor.scan_terminal("\"").unwrap();
        cursor.proceed();

        cursor.mark(false);
        cursor.scan_terminal("hi").unwrap();
        cursor.proceed();

        cursor.mark(true);
        cursor.scan_terminal("\"").unwrap();
        cursor.proceed();

        let context = cursor.proceed();
        assert_eq!(cursor.position(), 4);
        assert_eq!(context.matched_string(), "hi");
        assert_eq!(context.range(), 1..3);
        assert_eq!(context.full_range(), 0..4);
        assert!(context.gaps().is_empty());
    }

    #[test]
    fn interior_skips_become_gaps() {
        let mut cursor = LexicalCursor::new("a=b");
        cursor.mark(false);
        cursor.scan_terminal("a").unwrap();
        cursor.mark(true);
        cursor.scan_terminal("=").unwrap();
        cursor.proceed();
        cursor.scan_terminal("b").unwrap();

        let context = cursor.proceed();
        assert_eq!(context.range(), 0..3);
        assert_eq!(context.gaps(), &[1..2]);
        assert_eq!(context.matched_string(), "ab");
    }

    #[test]
    fn skip_inside_scan_inside_skip() {
        let mut cursor = LexicalCursor::new("a-b-c");
        cursor.mark(false);
        cursor.scan_terminal("a").unwrap();

        cursor.mark(true);
        cursor.mark(false);
        cursor.scan_terminal("-").unwrap();
        cursor.mark(true);
        cursor.scan_terminal("b").unwrap();
        cursor.proceed();
        cursor.proceed();
        cursor.scan_terminal("-").unwrap();
        cursor.proceed();

        cursor.scan_terminal("c").unwrap();
        let context = cursor.proceed();

        assert_eq!(context.matched_string(), "ac");
        assert_eq!(context.range(), 0..5);
    }

    #[test]
    fn rewound_skip_marks_are_forgotten() {
        let mut cursor = LexicalCursor::new("ab");
        cursor.mark(false);
        cursor.mark(false);
        cursor.mark(true);
        cursor.scan_terminal("a").unwrap();
        cursor.proceed();
        cursor.rewind();
        cursor.scan_terminal("ab").unwrap();

        assert_eq!(cursor.proceed().matched_string(), "ab");
    }

    #[test]
    fn replay_restores_exclusions() {
        let mut cursor = LexicalCursor::new("\"hi\"!");
        cursor.mark(false);
        cursor.mark(false);
        cursor.mark(true);
        cursor.scan_terminal("\"").unwrap();
        cursor.proceed();
        cursor.scan_terminal("hi").unwrap();
        let first = cursor.proceed();
        cursor.rewind();

        assert_eq!(first.excluded(), &[0..1]);

        cursor.mark(false);
        cursor.mark(false);
        cursor.replay(3, first.excluded());
        cursor.proceed();
        assert_eq!(cursor.proceed().matched_string(), "hi");
    }

    #[test]
    fn scan_up_to_stops_before_terminator() {
        let mut cursor = LexicalCursor::new("abc*/rest");
        cursor.scan_up_to("*/").unwrap();
        assert_eq!(cursor.position(), 3);

        let mut cursor = LexicalCursor::new("abc");
        assert!(cursor.scan_up_to("*/").is_err());
        assert_eq!(cursor.position(), 0);
    }

    #[test]
    fn scan_up_to_set_and_one_of() {
        let mut cursor = LexicalCursor::new("key = value");
        cursor.scan_up_to_set(&CharacterSet::Whitespaces).unwrap();
        assert_eq!(cursor.position(), 3);
        assert_eq!(cursor.scan_one_of(&CharacterSet::Whitespaces), Ok(' '));
    }

    #[test]
    fn scan_next_at_end_fails() {
        let mut cursor = LexicalCursor::new("");
        assert!(cursor.end_of_input());
        assert_eq!(
            cursor.scan_next(),
            Err(ScanFailure::UnexpectedEndOfInput { position: 0 })
        );
    }

    #[test]
    fn anchored_regex() {
        let regex = Regex::new("^(?:[0-9]+)").unwrap();
        let mut cursor = LexicalCursor::new("42x");
        cursor.scan_regex(&regex).unwrap();
        assert_eq!(cursor.position(), 2);
        assert!(cursor.scan_regex(&regex).is_err());
    }

    #[test]
    #[should_panic(expected = "without a matching mark")]
    fn unbalanced_proceed_panics() {
        let mut cursor = LexicalCursor::new("x");
        cursor.proceed();
    }
}
