//! How a rule is evaluated, independent of what it matches.

use std::fmt;

use serde::Serialize;

use crate::token::Token;

/// What a successful match leaves behind.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum Kind {
    /// Consumes input that is excluded from the enclosing match's text.
    Skipping,
    /// Consumes input that is part of the enclosing match, creates no node.
    Scanning,
    /// Creates a node for the token.
    Structural(Token),
}

/// How many times a rule must (and may) match in a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Cardinality {
    pub minimum: usize,
    /// `None` means unbounded.
    pub maximum: Option<usize>,
}

impl Cardinality {
    pub const ONE: Cardinality = Cardinality::new(1, Some(1));
    pub const OPTIONAL: Cardinality = Cardinality::new(0, Some(1));
    pub const NONE_OR_MORE: Cardinality = Cardinality::new(0, None);
    pub const ONE_OR_MORE: Cardinality = Cardinality::new(1, None);

    pub const fn new(minimum: usize, maximum: Option<usize>) -> Self {
        Self { minimum, maximum }
    }

    /// Whether another attempt is allowed after `matches` successes.
    pub fn allows_more(&self, matches: usize) -> bool {
        self.maximum.map_or(true, |maximum| matches < maximum)
    }

    pub fn is_one(&self) -> bool {
        *self == Self::ONE
    }
}

impl Default for Cardinality {
    fn default() -> Self {
        Self::ONE
    }
}

impl fmt::Display for Cardinality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.minimum, self.maximum) {
            (1, Some(1)) => Ok(()),
            (0, Some(1)) => write!(f, "?"),
            (0, None) => write!(f, "*"),
            (1, None) => write!(f, "+"),
            (min, None) => write!(f, "{{{},}}", min),
            (min, Some(max)) if min == max => write!(f, "{{{}}}", min),
            (min, Some(max)) => write!(f, "{{{},{}}}", min, max),
        }
    }
}

/// The configured execution mode of a rule instance.
///
/// Values are immutable; every modifier returns a new behaviour so that a
/// wrapped rule never changes the rule it was derived from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Behaviour {
    pub kind: Kind,
    pub cardinality: Cardinality,
    pub negated: bool,
    pub lookahead: bool,
}

impl Behaviour {
    pub fn new(kind: Kind) -> Self {
        Self {
            kind,
            cardinality: Cardinality::ONE,
            negated: false,
            lookahead: false,
        }
    }

    pub fn scanning() -> Self {
        Self::new(Kind::Scanning)
    }

    pub fn skipping() -> Self {
        Self::new(Kind::Skipping)
    }

    pub fn structural(token: Token) -> Self {
        Self::new(Kind::Structural(token))
    }

    pub fn with_kind(&self, kind: Kind) -> Self {
        Self {
            kind,
            ..self.clone()
        }
    }

    pub fn with_cardinality(&self, cardinality: Cardinality) -> Self {
        Self {
            cardinality,
            ..self.clone()
        }
    }

    pub fn negate(&self) -> Self {
        Self {
            negated: !self.negated,
            ..self.clone()
        }
    }

    pub fn lookahead(&self) -> Self {
        Self {
            lookahead: true,
            ..self.clone()
        }
    }

    pub fn is_structural(&self) -> bool {
        matches!(self.kind, Kind::Structural(_))
    }

    pub fn is_skipping(&self) -> bool {
        self.kind == Kind::Skipping
    }

    pub fn token(&self) -> Option<&Token> {
        match &self.kind {
            Kind::Structural(token) => Some(token),
            _ => None,
        }
    }

    /// Writes the STLR prefix operators for this behaviour.
    pub(crate) fn fmt_prefix(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_skipping() {
            write!(f, "-")?;
        }
        if self.lookahead {
            write!(f, ">>")?;
        }
        if self.negated {
            write!(f, "!")?;
        }
        Ok(())
    }
}

impl Default for Behaviour {
    fn default() -> Self {
        Self::scanning()
    }
}
