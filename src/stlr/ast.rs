//! Syntax tree of an STLR grammar file. Spans are scalar indices into the
//! grammar source.

use crate::annotations::{RuleAnnotation, RuleAnnotationValue, RuleAnnotations};
use crate::behaviour::Cardinality;
use crate::errors::Span;

#[derive(Debug, Clone, PartialEq)]
pub struct GrammarAst {
    pub name: Option<String>,
    pub declarations: Vec<Declaration>,
}

impl GrammarAst {
    pub fn declaration(&self, identifier: &str) -> Option<&Declaration> {
        self.declarations
            .iter()
            .find(|declaration| declaration.identifier == identifier)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Declaration {
    pub annotations: Vec<Annotation>,
    pub identifier: String,
    pub identifier_span: Span,
    pub expression: Expression,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Annotation {
    pub label: String,
    pub value: Option<AnnotationLiteral>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AnnotationLiteral {
    String(String),
    Bool(bool),
    Int(i64),
}

/// Converts parsed annotations to rule annotations; later ones win.
pub fn rule_annotations(annotations: &[Annotation]) -> RuleAnnotations {
    let mut converted = RuleAnnotations::new();
    for annotation in annotations {
        let value = match &annotation.value {
            None => RuleAnnotationValue::Set,
            Some(AnnotationLiteral::String(s)) => RuleAnnotationValue::String(s.clone()),
            Some(AnnotationLiteral::Bool(b)) => RuleAnnotationValue::Bool(*b),
            Some(AnnotationLiteral::Int(i)) => RuleAnnotationValue::Int(*i),
        };
        converted.insert(RuleAnnotation::from_label(&annotation.label), value);
    }
    converted
}

/// Alternatives separated by `|`.
#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    pub alternatives: Vec<Sequence>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Sequence {
    pub elements: Vec<Element>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    pub annotations: Vec<Annotation>,
    pub modifiers: Vec<Modifier>,
    pub primary: Primary,
    pub quantifier: Option<Quantifier>,
    pub span: Span,
}

impl Element {
    pub fn has_modifier(&self, modifier: Modifier) -> bool {
        self.modifiers.contains(&modifier)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Modifier {
    /// `-`
    Skip,
    /// `~`
    Transient,
    /// `!`
    Not,
    /// `>>`
    Lookahead,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Primary {
    Identifier(String),
    Terminal(String),
    /// `"a"..."z"`; both ends as written, validated later.
    Range(String, String),
    CharacterSet(String),
    Regex(String),
    Group(Expression),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quantifier {
    Optional,
    NoneOrMore,
    OneOrMore,
    Bounded { minimum: usize, maximum: Option<usize> },
}

impl Quantifier {
    pub fn cardinality(self) -> Cardinality {
        match self {
            Quantifier::Optional => Cardinality::OPTIONAL,
            Quantifier::NoneOrMore => Cardinality::NONE_OR_MORE,
            Quantifier::OneOrMore => Cardinality::ONE_OR_MORE,
            Quantifier::Bounded { minimum, maximum } => Cardinality::new(minimum, maximum),
        }
    }
}
