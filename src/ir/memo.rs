//! Packrat cache: `(rule, position)` to the outcome of evaluating that rule
//! there, including the nodes and errors it left behind.

use std::collections::HashMap;

use super::MatchRecord;
use crate::errors::StlrError;
use crate::rules::RuleId;

#[derive(Debug, Clone)]
pub struct MemoEntry<N> {
    pub record: MatchRecord,
    /// Nodes the evaluation appended to its parent's frame.
    pub nodes: Vec<N>,
    /// Errors the evaluation left in the error list.
    pub errors: Vec<StlrError>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MemoStats {
    pub hits: usize,
    pub misses: usize,
    pub entries: usize,
}

#[derive(Debug)]
pub struct MemoCache<N> {
    entries: HashMap<(RuleId, usize), MemoEntry<N>>,
    hits: usize,
    misses: usize,
}

impl<N> Default for MemoCache<N> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
            hits: 0,
            misses: 0,
        }
    }
}

impl<N> MemoCache<N> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&mut self, id: RuleId, position: usize) -> Option<&MemoEntry<N>> {
        match self.entries.get(&(id, position)) {
            Some(entry) => {
                self.hits += 1;
                Some(entry)
            }
            None => {
                self.misses += 1;
                None
            }
        }
    }

    /// Entries are written once; a second write for the same key is ignored.
    pub fn insert(&mut self, id: RuleId, position: usize, entry: MemoEntry<N>) {
        self.entries.entry((id, position)).or_insert(entry);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> MemoStats {
        MemoStats {
            hits: self.hits,
            misses: self.misses,
            entries: self.entries.len(),
        }
    }
}
