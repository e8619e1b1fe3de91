//! Rule annotations (`@void`, `@transient`, `@pin`, `@error("…")`, …).

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

/// The closed set of annotation keys, plus free-form custom labels.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum RuleAnnotation {
    Token,
    Error,
    Void,
    Transient,
    Pinned,
    Type,
    Custom(String),
}

impl RuleAnnotation {
    /// Maps an STLR annotation label to its key.
    pub fn from_label(label: &str) -> Self {
        match label {
            "token" => Self::Token,
            "error" => Self::Error,
            "void" => Self::Void,
            "transient" => Self::Transient,
            "pin" | "pinned" => Self::Pinned,
            "type" => Self::Type,
            other => Self::Custom(other.to_string()),
        }
    }

    pub fn label(&self) -> &str {
        match self {
            Self::Token => "token",
            Self::Error => "error",
            Self::Void => "void",
            Self::Transient => "transient",
            Self::Pinned => "pin",
            Self::Type => "type",
            Self::Custom(label) => label,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum RuleAnnotationValue {
    String(String),
    Bool(bool),
    Int(i64),
    /// The annotation is present without a value.
    Set,
}

impl fmt::Display for RuleAnnotationValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(s) => write!(f, "{:?}", s),
            Self::Bool(b) => write!(f, "{}", b),
            Self::Int(i) => write!(f, "{}", i),
            Self::Set => Ok(()),
        }
    }
}

/// Custom label that escalates a rule's failure to a parse-aborting error.
pub const FATAL: &str = "fatal";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct RuleAnnotations(BTreeMap<RuleAnnotation, RuleAnnotationValue>);

impl RuleAnnotations {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: RuleAnnotation, value: RuleAnnotationValue) -> Self {
        self.0.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: RuleAnnotation, value: RuleAnnotationValue) {
        self.0.insert(key, value);
    }

    pub fn get(&self, key: &RuleAnnotation) -> Option<&RuleAnnotationValue> {
        self.0.get(key)
    }

    pub fn contains(&self, key: &RuleAnnotation) -> bool {
        self.0.contains_key(key)
    }

    pub fn remove(&mut self, key: &RuleAnnotation) -> Option<RuleAnnotationValue> {
        self.0.remove(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&RuleAnnotation, &RuleAnnotationValue)> {
        self.0.iter()
    }

    /// Annotations of `self`, overridden by those of `other`.
    pub fn merged(&self, other: &RuleAnnotations) -> Self {
        let mut merged = self.clone();
        for (key, value) in other.iter() {
            merged.0.insert(key.clone(), value.clone());
        }
        merged
    }

    fn flag(&self, key: &RuleAnnotation) -> bool {
        !matches!(
            self.0.get(key),
            None | Some(RuleAnnotationValue::Bool(false))
        )
    }

    pub fn is_void(&self) -> bool {
        self.flag(&RuleAnnotation::Void)
    }

    pub fn is_transient(&self) -> bool {
        self.flag(&RuleAnnotation::Transient)
    }

    pub fn is_pinned(&self) -> bool {
        self.flag(&RuleAnnotation::Pinned)
    }

    pub fn is_fatal(&self) -> bool {
        self.flag(&RuleAnnotation::Custom(FATAL.to_string()))
    }

    /// The custom error message, if any.
    pub fn error(&self) -> Option<&str> {
        match self.0.get(&RuleAnnotation::Error) {
            Some(RuleAnnotationValue::String(message)) => Some(message),
            _ => None,
        }
    }

    pub fn type_name(&self) -> Option<&str> {
        match self.0.get(&RuleAnnotation::Type) {
            Some(RuleAnnotationValue::String(name)) => Some(name),
            _ => None,
        }
    }
}

impl fmt::Display for RuleAnnotations {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (key, value) in self.iter() {
            match value {
                RuleAnnotationValue::Set => write!(f, "@{} ", key.label())?,
                value => write!(f, "@{}({}) ", key.label(), value)?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_and_messages() {
        let annotations = RuleAnnotations::new()
            .with(RuleAnnotation::Void, RuleAnnotationValue::Set)
            .with(RuleAnnotation::Transient, RuleAnnotationValue::Bool(false))
            .with(
                RuleAnnotation::Error,
                RuleAnnotationValue::String("expected a value".into()),
            )
            .with(RuleAnnotation::from_label("fatal"), RuleAnnotationValue::Set);

        assert!(annotations.is_void());
        assert!(!annotations.is_transient());
        assert!(annotations.is_fatal());
        assert_eq!(annotations.error(), Some("expected a value"));
    }

    #[test]
    fn merge_prefers_overrides() {
        let base = RuleAnnotations::new().with(RuleAnnotation::Pinned, RuleAnnotationValue::Set);
        let overrides =
            RuleAnnotations::new().with(RuleAnnotation::Pinned, RuleAnnotationValue::Bool(false));

        assert!(base.is_pinned());
        assert!(!base.merged(&overrides).is_pinned());
    }
}
