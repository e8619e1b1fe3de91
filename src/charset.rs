//! Character sets used by set-membership and scan-until terminals.

use std::collections::BTreeSet;
use std::fmt;

/// A set of Unicode scalars.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CharacterSet {
    Letters,
    UppercaseLetters,
    LowercaseLetters,
    Alphanumerics,
    DecimalDigits,
    /// Horizontal whitespace only.
    Whitespaces,
    Newlines,
    WhitespacesAndNewlines,
    Punctuation,
    Symbols,
    /// An explicit set of scalars, e.g. the scalars of a string literal.
    Scalars(BTreeSet<char>),
    /// An inclusive scalar range, `"a"..."z"` in STLR.
    Range(char, char),
    Union(Vec<CharacterSet>),
}

impl CharacterSet {
    /// Resolves an STLR `.name` character set. Both the singular and plural
    /// spellings are accepted (`.letter`, `.letters`).
    pub fn from_name(name: &str) -> Option<Self> {
        let set = match name {
            "letter" | "letters" => Self::Letters,
            "uppercaseLetter" | "uppercaseLetters" => Self::UppercaseLetters,
            "lowercaseLetter" | "lowercaseLetters" => Self::LowercaseLetters,
            "alphaNumeric" | "alphanumeric" | "alphanumerics" => Self::Alphanumerics,
            "decimalDigit" | "decimalDigits" | "digit" | "digits" => Self::DecimalDigits,
            "whitespace" | "whitespaces" => Self::Whitespaces,
            "newline" | "newlines" => Self::Newlines,
            "whitespaceOrNewline" | "whitespacesAndNewlines" | "whitespaceAndNewline" => {
                Self::WhitespacesAndNewlines
            }
            "punctuation" | "punctuationCharacters" => Self::Punctuation,
            "symbol" | "symbols" => Self::Symbols,
            "backslash" => Self::Scalars(BTreeSet::from(['\\'])),
            _ => return None,
        };
        Some(set)
    }

    pub fn scalars(chars: impl IntoIterator<Item = char>) -> Self {
        Self::Scalars(chars.into_iter().collect())
    }

    pub fn contains(&self, c: char) -> bool {
        match self {
            Self::Letters => c.is_alphabetic(),
            Self::UppercaseLetters => c.is_uppercase(),
            Self::LowercaseLetters => c.is_lowercase(),
            Self::Alphanumerics => c.is_alphanumeric(),
            Self::DecimalDigits => c.is_ascii_digit(),
            Self::Whitespaces => c.is_whitespace() && !is_newline(c),
            Self::Newlines => is_newline(c),
            Self::WhitespacesAndNewlines => c.is_whitespace(),
            Self::Punctuation => c.is_ascii_punctuation() && !is_ascii_symbol(c),
            Self::Symbols => is_ascii_symbol(c),
            Self::Scalars(set) => set.contains(&c),
            Self::Range(low, high) => (*low..=*high).contains(&c),
            Self::Union(sets) => sets.iter().any(|set| set.contains(c)),
        }
    }

    /// Returns the union of `self` and `other`.
    pub fn union(self, other: CharacterSet) -> Self {
        match self {
            Self::Union(mut sets) => {
                sets.push(other);
                Self::Union(sets)
            }
            set => Self::Union(vec![set, other]),
        }
    }
}

fn is_newline(c: char) -> bool {
    matches!(c, '\n' | '\r' | '\u{0B}' | '\u{0C}' | '\u{85}' | '\u{2028}' | '\u{2029}')
}

fn is_ascii_symbol(c: char) -> bool {
    matches!(c, '$' | '+' | '<' | '=' | '>' | '^' | '`' | '|' | '~')
}

impl fmt::Display for CharacterSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Letters => write!(f, ".letter"),
            Self::UppercaseLetters => write!(f, ".uppercaseLetter"),
            Self::LowercaseLetters => write!(f, ".lowercaseLetter"),
            Self::Alphanumerics => write!(f, ".alphaNumeric"),
            Self::DecimalDigits => write!(f, ".decimalDigit"),
            Self::Whitespaces => write!(f, ".whitespace"),
            Self::Newlines => write!(f, ".newline"),
            Self::WhitespacesAndNewlines => write!(f, ".whitespaceOrNewline"),
            Self::Punctuation => write!(f, ".punctuation"),
            Self::Symbols => write!(f, ".symbol"),
            Self::Scalars(set) => {
                let text: String = set.iter().collect();
                write!(f, "{:?}", text)
            }
            Self::Range(low, high) => write!(f, "{:?}...{:?}", low, high),
            Self::Union(sets) => {
                let parts: Vec<String> = sets.iter().map(|s| s.to_string()).collect();
                write!(f, "({})", parts.join(" | "))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn whitespace_excludes_newlines() {
        let ws = CharacterSet::Whitespaces;
        assert!(ws.contains(' '));
        assert!(ws.contains('\t'));
        assert!(!ws.contains('\n'));
        assert!(CharacterSet::WhitespacesAndNewlines.contains('\n'));
    }

    #[test]
    fn named_sets_resolve_both_spellings() {
        assert_eq!(
            CharacterSet::from_name("decimalDigits"),
            CharacterSet::from_name("decimalDigit")
        );
        assert!(CharacterSet::from_name("nonsense").is_none());
    }

    #[test]
    fn ranges_and_unions() {
        let set = CharacterSet::Range('a', 'f').union(CharacterSet::scalars(['_']));
        assert!(set.contains('c'));
        assert!(set.contains('_'));
        assert!(!set.contains('g'));
    }
}
