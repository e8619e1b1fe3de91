//! Token identities.
//!
//! A token names *what kind of thing* a rule matched (`identifier`,
//! `whitespace`, a literal such as `"Hello"`). Many rule instances may produce
//! the same token, so identity is a plain integer; the display name is carried
//! alongside for diagnostics and tree printing only.

use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use serde::{Serialize, Serializer};

/// An opaque, hashable token identity.
///
/// Equality and hashing only consider `id`; two tokens with the same id but
/// different names are the same token.
#[derive(Debug, Clone)]
pub struct Token {
    id: u32,
    name: Option<Arc<str>>,
}

impl Token {
    /// Creates a token with a display name.
    pub fn new(id: u32, name: impl Into<Arc<str>>) -> Self {
        Self {
            id,
            name: Some(name.into()),
        }
    }

    /// Creates a token that only carries its raw identity.
    pub fn anonymous(id: u32) -> Self {
        Self { id, name: None }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }
}

impl PartialEq for Token {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Token {}

impl Hash for Token {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{}", name),
            None => write!(f, "#{}", self.id),
        }
    }
}

impl Serialize for Token {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match &self.name {
            Some(name) => serializer.serialize_str(name),
            None => serializer.serialize_u32(self.id),
        }
    }
}

/// Stable name-to-identity mapping for one grammar.
///
/// Interning the same name twice yields the same token, which is what lets a
/// literal used in several places (or a rule and its `@token` override) share
/// one identity.
#[derive(Debug, Default, Clone)]
pub struct TokenTable {
    tokens: Vec<Token>,
    by_name: HashMap<Arc<str>, u32>,
}

impl TokenTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the token for `name`, creating it on first use.
    pub fn intern(&mut self, name: &str) -> Token {
        if let Some(&id) = self.by_name.get(name) {
            return self.tokens[id as usize].clone();
        }

        let id = self.tokens.len() as u32;
        let name: Arc<str> = Arc::from(name);
        let token = Token::new(id, Arc::clone(&name));
        self.by_name.insert(name, id);
        self.tokens.push(token.clone());
        token
    }

    /// Looks up an already interned token by name.
    pub fn get(&self, name: &str) -> Option<&Token> {
        self.by_name
            .get(name)
            .map(|&id| &self.tokens[id as usize])
    }

    /// Looks up a token by its raw identity.
    pub fn by_id(&self, id: u32) -> Option<&Token> {
        self.tokens.get(id as usize)
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Token> {
        self.tokens.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_is_stable() {
        let mut table = TokenTable::new();
        let a = table.intern("identifier");
        let b = table.intern("whitespace");
        let again = table.intern("identifier");

        assert_eq!(a, again);
        assert_ne!(a, b);
        assert_eq!(table.len(), 2);
        assert_eq!(table.get("whitespace").map(Token::id), Some(b.id()));
    }

    #[test]
    fn identity_ignores_name() {
        assert_eq!(Token::new(3, "x"), Token::anonymous(3));
        assert_eq!(Token::anonymous(3).to_string(), "#3");
    }
}
