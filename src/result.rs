//! The outcome of one rule evaluation attempt.

use std::ops::Range;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchResult {
    /// Matched; a structural rule produced a node over the range.
    Success(Range<usize>),
    /// Matched, but nothing is persisted for it.
    Consumed(Range<usize>),
    /// A required match was not found at the position.
    Failure(usize),
    /// A rule allowed to match zero times found nothing. Not an error.
    IgnorableFailure(usize),
}

impl MatchResult {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_) | Self::Consumed(_))
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failure(_))
    }

    /// Whether the enclosing rule may carry on (a match or an ignorable miss).
    pub fn can_continue(&self) -> bool {
        !self.is_failure()
    }

    pub fn range(&self) -> Option<Range<usize>> {
        match self {
            Self::Success(range) | Self::Consumed(range) => Some(range.clone()),
            _ => None,
        }
    }

    /// End of the matched range, or the position of a miss.
    pub fn end(&self) -> usize {
        match self {
            Self::Success(range) | Self::Consumed(range) => range.end,
            Self::Failure(position) | Self::IgnorableFailure(position) => *position,
        }
    }
}
