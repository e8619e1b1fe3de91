//! Scalar-addressed source text.
//!
//! Every position handed out by the engine is an index of a Unicode scalar,
//! not a byte offset. `Source` keeps both views so ranges can be turned back
//! into string slices (and into byte spans for diagnostics) in O(1).

use std::borrow::Cow;
use std::ops::Range;
use std::sync::Arc;

/// Immutable, fully buffered input text. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Source {
    text: Arc<str>,
    scalars: Arc<[char]>,
    /// Byte offset of every scalar, plus one trailing entry for the end.
    offsets: Arc<[usize]>,
}

impl Source {
    pub fn new(text: impl Into<Arc<str>>) -> Self {
        let text: Arc<str> = text.into();
        let mut scalars = Vec::with_capacity(text.len());
        let mut offsets = Vec::with_capacity(text.len() + 1);
        for (offset, c) in text.char_indices() {
            offsets.push(offset);
            scalars.push(c);
        }
        offsets.push(text.len());

        Self {
            text,
            scalars: scalars.into(),
            offsets: offsets.into(),
        }
    }

    /// Number of scalars.
    pub fn len(&self) -> usize {
        self.scalars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scalars.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn text(&self) -> &Arc<str> {
        &self.text
    }

    pub fn scalar(&self, index: usize) -> Option<char> {
        self.scalars.get(index).copied()
    }

    pub fn scalars(&self) -> &[char] {
        &self.scalars
    }

    /// Converts a scalar range to the corresponding byte range. Out of bounds
    /// indices are clamped to the end of the text.
    pub fn byte_range(&self, range: Range<usize>) -> Range<usize> {
        let last = self.offsets.len() - 1;
        let start = self.offsets[range.start.min(last)];
        let end = self.offsets[range.end.min(last)];
        start..end.max(start)
    }

    /// Converts a byte offset to the index of the scalar starting at (or
    /// containing) it.
    pub fn scalar_index(&self, byte_offset: usize) -> usize {
        match self.offsets.binary_search(&byte_offset) {
            Ok(index) => index,
            Err(index) => index.saturating_sub(1),
        }
    }

    /// The text covered by a scalar range.
    pub fn slice(&self, range: Range<usize>) -> &str {
        &self.text[self.byte_range(range)]
    }

    /// The text covered by `range` with every gap left out. Gaps are
    /// ascending scalar ranges; only their overlap with `range` counts.
    pub fn slice_without(&self, range: Range<usize>, gaps: &[Range<usize>]) -> Cow<'_, str> {
        if gaps.is_empty() {
            return Cow::Borrowed(self.slice(range));
        }

        let mut text = String::new();
        let mut at = range.start;
        for gap in gaps {
            let start = gap.start.clamp(at, range.end.max(at));
            if start > at {
                text.push_str(self.slice(at..start));
            }
            at = at.max(gap.end.min(range.end));
        }
        if at < range.end {
            text.push_str(self.slice(at..range.end));
        }
        Cow::Owned(text)
    }
}

impl From<&str> for Source {
    fn from(text: &str) -> Self {
        Source::new(text)
    }
}

impl From<String> for Source {
    fn from(text: String) -> Self {
        Source::new(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_ranges_map_to_bytes() {
        let source = Source::new("héllo");
        assert_eq!(source.len(), 5);
        assert_eq!(source.byte_range(1..2), 1..3);
        assert_eq!(source.slice(1..4), "éll");
        assert_eq!(source.slice(4..99), "o");
        assert_eq!(source.scalar_index(3), 2);
        assert_eq!(source.scalar_index(6), 5);
    }
}
