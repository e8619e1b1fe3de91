//! STLR syntax tree to rule graph.
//!
//! Declarations are compiled on demand, starting from the first. When a
//! declaration is reached again while it is still being compiled, a
//! recursive placeholder is handed out instead and resolved as soon as the
//! real rule exists.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use log::debug;

use super::ast::*;
use super::parser::parse;
use super::validate::{range_bounds, root_declarations, validate};
use crate::annotations::{RuleAnnotation, RuleAnnotationValue, RuleAnnotations};
use crate::behaviour::Behaviour;
use crate::charset::CharacterSet;
use crate::errors::{ErrorKind, SourceContext, Span, StlrError};
use crate::language::Language;
use crate::rules::{RuleId, RuleSet};
use crate::token::Token;

/// A compiled grammar.
#[derive(Debug, Clone)]
pub struct Grammar {
    name: Option<String>,
    rules: Arc<RuleSet>,
    roots: Vec<RuleId>,
    definitions: Vec<(String, RuleId)>,
    warnings: Vec<StlrError>,
}

impl Grammar {
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    pub fn roots(&self) -> &[RuleId] {
        &self.roots
    }

    /// The rule compiled for a declaration.
    pub fn rule(&self, identifier: &str) -> Option<RuleId> {
        self.definitions
            .iter()
            .find(|(name, _)| name == identifier)
            .map(|(_, id)| *id)
    }

    /// Declarations in source order.
    pub fn definitions(&self) -> impl Iterator<Item = (&str, RuleId)> {
        self.definitions.iter().map(|(name, id)| (name.as_str(), *id))
    }

    /// Non-fatal findings of validation.
    pub fn warnings(&self) -> &[StlrError] {
        &self.warnings
    }

    /// A language parsing from the grammar's root rules.
    pub fn language(&self) -> Language {
        Language::new(Arc::clone(&self.rules), self.roots.clone())
    }

    /// A language parsing from the named declaration only.
    pub fn language_from(&self, identifier: &str) -> Option<Language> {
        let root = self.rule(identifier)?;
        Some(Language::new(Arc::clone(&self.rules), vec![root]))
    }
}

impl fmt::Display for Grammar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(name) = &self.name {
            writeln!(f, "grammar {}\n", name)?;
        }
        for (name, id) in self.definitions() {
            writeln!(f, "{} = {}", name, self.rules.display(id))?;
        }
        Ok(())
    }
}

// ============================================================================
// PUBLIC API
// ============================================================================

/// Parses, validates and compiles STLR source.
pub fn compile(source: &SourceContext) -> Result<Grammar, Vec<StlrError>> {
    let ast = parse(source).map_err(|error| vec![error])?;
    compile_ast(&ast)
}

/// Compiles STLR text that has no file behind it.
pub fn compile_str(text: &str) -> Result<Grammar, Vec<StlrError>> {
    compile(&SourceContext::from_file("<grammar>", text))
}

/// Validates and compiles an already parsed grammar.
pub fn compile_ast(ast: &GrammarAst) -> Result<Grammar, Vec<StlrError>> {
    let validation = validate(ast);
    if !validation.is_valid() {
        return Err(validation.errors);
    }

    let mut compiler = Compiler::new(ast);
    let mut definitions = Vec::with_capacity(ast.declarations.len());
    for (index, declaration) in ast.declarations.iter().enumerate() {
        let id = compiler.declaration(index).map_err(|error| vec![error])?;
        definitions.push((declaration.identifier.clone(), id));
    }

    let roots = root_declarations(ast)
        .into_iter()
        .filter_map(|root| compiler.compiled(&root.identifier))
        .collect::<Vec<_>>();

    debug!(
        "compiled grammar {}: {} declarations, {} rules, {} root(s)",
        ast.name.as_deref().unwrap_or("<unnamed>"),
        definitions.len(),
        compiler.rules.len(),
        roots.len()
    );

    Ok(Grammar {
        name: ast.name.clone(),
        rules: Arc::new(compiler.rules),
        roots,
        definitions,
        warnings: validation.warnings,
    })
}

// ============================================================================
// COMPILER
// ============================================================================

/// What the rest of the grammar needs to know about a declaration before it
/// is compiled.
struct Header {
    token: Token,
    annotations: RuleAnnotations,
}

struct Compiler<'a> {
    ast: &'a GrammarAst,
    rules: RuleSet,
    index: HashMap<&'a str, usize>,
    headers: Vec<Header>,
    compiled: Vec<Option<RuleId>>,
    in_progress: Vec<bool>,
    placeholders: HashMap<Token, RuleId>,
}

impl<'a> Compiler<'a> {
    fn new(ast: &'a GrammarAst) -> Self {
        let mut rules = RuleSet::new();
        let mut index = HashMap::new();
        let mut headers = Vec::with_capacity(ast.declarations.len());

        for (position, declaration) in ast.declarations.iter().enumerate() {
            index.entry(declaration.identifier.as_str()).or_insert(position);
            let annotations = rule_annotations(&declaration.annotations);
            let token = match annotations.get(&RuleAnnotation::Token) {
                Some(RuleAnnotationValue::String(name)) => rules.token(name),
                _ => rules.token(&declaration.identifier),
            };
            headers.push(Header { token, annotations });
        }

        Self {
            ast,
            rules,
            index,
            compiled: vec![None; ast.declarations.len()],
            in_progress: vec![false; ast.declarations.len()],
            headers,
            placeholders: HashMap::new(),
        }
    }

    fn compiled(&self, identifier: &str) -> Option<RuleId> {
        self.index
            .get(identifier)
            .and_then(|&index| self.compiled[index])
    }

    fn declaration(&mut self, index: usize) -> Result<RuleId, StlrError> {
        if let Some(id) = self.compiled[index] {
            return Ok(id);
        }

        let token = self.headers[index].token.clone();
        if self.in_progress[index] {
            let rules = &mut self.rules;
            let placeholder = *self
                .placeholders
                .entry(token.clone())
                .or_insert_with(|| rules.recursive(token));
            return Ok(placeholder);
        }

        self.in_progress[index] = true;
        let ast = self.ast;
        let expression = self.expression(&ast.declarations[index].expression)?;
        let annotations = self.headers[index].annotations.clone();
        let id = self
            .rules
            .derive(expression, Behaviour::structural(token.clone()), annotations);

        if let Some(placeholder) = self.placeholders.remove(&token) {
            self.rules.resolve_recursive(placeholder, id)?;
        }
        self.in_progress[index] = false;
        self.compiled[index] = Some(id);
        Ok(id)
    }

    fn expression(&mut self, expression: &'a Expression) -> Result<RuleId, StlrError> {
        let mut alternatives = expression
            .alternatives
            .iter()
            .map(|sequence| self.sequence(sequence))
            .collect::<Result<Vec<_>, _>>()?;

        match alternatives.len() {
            1 => Ok(alternatives.remove(0)),
            _ => Ok(self.rules.choice(alternatives)),
        }
    }

    fn sequence(&mut self, sequence: &'a Sequence) -> Result<RuleId, StlrError> {
        let mut elements = sequence
            .elements
            .iter()
            .map(|element| self.element(element))
            .collect::<Result<Vec<_>, _>>()?;

        match elements.len() {
            1 => Ok(elements.remove(0)),
            _ => Ok(self.rules.sequence(elements)),
        }
    }

    /// Prefix modifiers bind tighter than the quantifier, innermost first.
    fn element(&mut self, element: &'a Element) -> Result<RuleId, StlrError> {
        let mut annotations = rule_annotations(&element.annotations);

        let mut id = match &element.primary {
            Primary::Identifier(identifier) => {
                // Skipping a named rule voids it: no node, no text.
                if element.has_modifier(Modifier::Skip) {
                    annotations.insert(RuleAnnotation::Void, RuleAnnotationValue::Set);
                }
                if element.has_modifier(Modifier::Transient) {
                    annotations.insert(RuleAnnotation::Transient, RuleAnnotationValue::Set);
                }
                self.reference(identifier, annotations, element.span)?
            }
            primary => {
                let id = self.primary(primary, element.span)?;
                self.annotate(id, annotations)
            }
        };

        let is_identifier = matches!(element.primary, Primary::Identifier(_));
        for modifier in element.modifiers.iter().rev() {
            id = match modifier {
                Modifier::Skip if is_identifier => id,
                Modifier::Skip => self.rules.consume(id),
                Modifier::Not => self.rules.not(id),
                Modifier::Lookahead => self.rules.lookahead(id),
                Modifier::Transient => id,
            };
        }

        if let Some(quantifier) = element.quantifier {
            id = self.rules.repeated(id, quantifier.cardinality());
        }
        Ok(id)
    }

    /// A declaration used as an element. Element annotations override the
    /// declaration's own through an inheriting rule.
    fn reference(
        &mut self,
        identifier: &str,
        annotations: RuleAnnotations,
        span: Span,
    ) -> Result<RuleId, StlrError> {
        let index = *self.index.get(identifier).ok_or_else(|| {
            StlrError::new(
                ErrorKind::UndefinedIdentifier {
                    identifier: identifier.to_string(),
                },
                span,
            )
        })?;
        let target = self.declaration(index)?;
        if annotations.is_empty() {
            return Ok(target);
        }

        let header = &self.headers[index];
        let merged = header.annotations.merged(&annotations);
        let token = match annotations.get(&RuleAnnotation::Token) {
            Some(RuleAnnotationValue::String(name)) => self.rules.token(name),
            _ => header.token.clone(),
        };
        Ok(self
            .rules
            .inherit(target, Behaviour::structural(token), merged))
    }

    /// Annotations on an anonymous element; `@token` makes it structural.
    fn annotate(&mut self, id: RuleId, annotations: RuleAnnotations) -> RuleId {
        if annotations.is_empty() {
            return id;
        }
        match annotations.get(&RuleAnnotation::Token) {
            Some(RuleAnnotationValue::String(name)) => {
                let token = self.rules.token(name);
                self.rules.structural_annotated(id, token, annotations.clone())
            }
            _ => self.rules.annotated(id, annotations),
        }
    }

    fn primary(&mut self, primary: &'a Primary, span: Span) -> Result<RuleId, StlrError> {
        match primary {
            Primary::Terminal(text) => Ok(self.rules.terminal(text)),
            Primary::Range(low, high) => {
                let (first, last) = range_bounds(low, high).ok_or_else(|| {
                    StlrError::new(
                        ErrorKind::InvalidRange {
                            low: low.clone(),
                            high: high.clone(),
                        },
                        span,
                    )
                })?;
                Ok(self.rules.one_of(CharacterSet::Range(first, last)))
            }
            Primary::CharacterSet(name) => {
                let set = CharacterSet::from_name(name).ok_or_else(|| {
                    StlrError::new(ErrorKind::InvalidCharacterSet { name: name.clone() }, span)
                })?;
                Ok(self.rules.one_of(set))
            }
            Primary::Regex(pattern) => self.rules.regex(pattern).map_err(|error| {
                StlrError::new(
                    ErrorKind::InvalidRegex {
                        pattern: pattern.clone(),
                        reason: error.to_string(),
                    },
                    span,
                )
            }),
            Primary::Group(expression) => self.expression(expression),
            Primary::Identifier(identifier) => {
                self.reference(identifier, RuleAnnotations::new(), span)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::behaviour::Kind;
    use crate::rules::RuleKind;

    #[test]
    fn declarations_are_structural() {
        let grammar = compile_str("greeting = \"Hello\" name\nname = .letters+").unwrap();
        let greeting = grammar.rule("greeting").unwrap();
        let rule = grammar.rules().get(greeting);

        assert_eq!(rule.produces.name(), Some("greeting"));
        assert!(matches!(rule.behaviour.kind, Kind::Structural(_)));
        assert_eq!(grammar.roots(), &[greeting]);
    }

    #[test]
    fn recursion_uses_a_placeholder() {
        let grammar = compile_str("list = \"(\" list* \")\"").unwrap();
        let list = grammar.rule("list").unwrap();

        let placeholders: Vec<_> = grammar
            .rules()
            .iter()
            .filter(|(_, rule)| matches!(rule.kind, RuleKind::Recursive(_)))
            .collect();
        assert_eq!(placeholders.len(), 1);
        assert_eq!(grammar.rules().resolve(placeholders[0].0).unwrap().0, list);
    }

    #[test]
    fn token_override() {
        let grammar = compile_str("@token(\"id\") identifier = .letters+").unwrap();
        let id = grammar.rule("identifier").unwrap();
        assert_eq!(grammar.rules().get(id).produces.name(), Some("id"));
    }

    #[test]
    fn validation_errors_are_returned() {
        let errors = compile_str("a = a \"x\"\nb = missing").unwrap_err();
        let suffixes: Vec<_> = errors.iter().map(|e| e.kind.code_suffix()).collect();
        assert_eq!(suffixes, vec!["undefined_identifier", "left_recursion"]);
    }

    #[test]
    fn display_round_trips_structure() {
        let grammar = compile_str("quoted = -\"\\\"\" (!\"\\\"\")+ -\"\\\"\"").unwrap();
        assert_eq!(
            grammar.to_string(),
            "quoted = (-\"\\\"\" !\"\\\"\"+ -\"\\\"\")\n"
        );
    }
}
