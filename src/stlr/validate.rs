//! Compile-time checks on a parsed grammar.
//!
//! The engine assumes a validated rule graph: every identifier resolves to
//! exactly one declaration and no declaration can reach itself without
//! consuming input. Each validator covers one concern and reports into a
//! [`ValidationResult`].

use std::collections::{HashMap, HashSet};

use regex::Regex;

use super::ast::*;
use crate::charset::CharacterSet;
use crate::errors::{ErrorKind, StlrError};

// =====================
// Results
// =====================

#[derive(Debug, Default)]
pub struct ValidationResult {
    pub errors: Vec<StlrError>,
    pub warnings: Vec<StlrError>,
    pub suggestions: Vec<String>,
}

pub trait ValidationReporter {
    fn report_error(&mut self, error: StlrError);
    fn report_warning(&mut self, warning: StlrError);
    fn report_suggestion(&mut self, message: impl Into<String>);
}

impl ValidationReporter for ValidationResult {
    fn report_error(&mut self, error: StlrError) {
        self.errors.push(error);
    }
    fn report_warning(&mut self, warning: StlrError) {
        self.warnings.push(warning.as_warning());
    }
    fn report_suggestion(&mut self, message: impl Into<String>) {
        self.suggestions.push(message.into());
    }
}

impl ValidationResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

// =====================
// Public API
// =====================

/// Runs every validator over `grammar`.
pub fn validate(grammar: &GrammarAst) -> ValidationResult {
    let mut result = ValidationResult::new();

    GrammarValidators::check_duplicate_definitions(grammar, &mut result);
    GrammarValidators::check_identifiers(grammar, &mut result);
    GrammarValidators::check_literals(grammar, &mut result);
    GrammarValidators::check_left_recursion(grammar, &mut result);
    GrammarValidators::check_unused_declarations(grammar, &mut result);

    result
}

/// Declarations no other declaration refers to, in order. If every
/// declaration is referenced, the last one.
pub fn root_declarations(grammar: &GrammarAst) -> Vec<&Declaration> {
    let referenced = referenced_by_others(grammar);
    let roots: Vec<&Declaration> = grammar
        .declarations
        .iter()
        .filter(|declaration| !referenced.contains(declaration.identifier.as_str()))
        .collect();

    if roots.is_empty() {
        grammar.declarations.last().into_iter().collect()
    } else {
        roots
    }
}

fn referenced_by_others(grammar: &GrammarAst) -> HashSet<&str> {
    let mut referenced = HashSet::new();
    for declaration in &grammar.declarations {
        let mut identifiers = Vec::new();
        visit_identifiers(&declaration.expression, &mut |identifier, _| {
            identifiers.push(identifier)
        });
        referenced.extend(
            identifiers
                .into_iter()
                .filter(|identifier| *identifier != declaration.identifier),
        );
    }
    referenced
}

// =====================
// Validators
// =====================

/// One validator per concern.
pub struct GrammarValidators;

impl GrammarValidators {
    /// Every identifier is declared once.
    pub fn check_duplicate_definitions(grammar: &GrammarAst, result: &mut ValidationResult) {
        let mut seen = HashSet::new();

        for declaration in &grammar.declarations {
            if seen.insert(declaration.identifier.as_str()) {
                continue;
            }

            result.report_error(StlrError::new(
                ErrorKind::DuplicateDefinition {
                    identifier: declaration.identifier.clone(),
                },
                declaration.identifier_span,
            ));
        }
    }

    /// Every referenced identifier has a declaration.
    pub fn check_identifiers(grammar: &GrammarAst, result: &mut ValidationResult) {
        let declared: HashSet<&str> = grammar
            .declarations
            .iter()
            .map(|declaration| declaration.identifier.as_str())
            .collect();

        for declaration in &grammar.declarations {
            visit_elements(&declaration.expression, &mut |element| {
                let Primary::Identifier(identifier) = &element.primary else {
                    return;
                };
                if declared.contains(identifier.as_str()) {
                    return;
                }

                let mut error = StlrError::new(
                    ErrorKind::UndefinedIdentifier {
                        identifier: identifier.clone(),
                    },
                    element.span,
                );
                if let Some(close) = closest_name(identifier, &declared) {
                    error = error.with_help(format!("did you mean '{}'?", close));
                }
                result.report_error(error);
            });
        }
    }

    /// Regexes compile, ranges span single ordered scalars and character
    /// sets exist.
    pub fn check_literals(grammar: &GrammarAst, result: &mut ValidationResult) {
        for declaration in &grammar.declarations {
            visit_elements(&declaration.expression, &mut |element| match &element.primary {
                Primary::Regex(pattern) => {
                    if let Err(error) = Regex::new(pattern) {
                        result.report_error(StlrError::new(
                            ErrorKind::InvalidRegex {
                                pattern: pattern.clone(),
                                reason: error.to_string(),
                            },
                            element.span,
                        ));
                    }
                }
                Primary::Range(low, high) => {
                    if range_bounds(low, high).is_none() {
                        result.report_error(
                            StlrError::new(
                                ErrorKind::InvalidRange {
                                    low: low.clone(),
                                    high: high.clone(),
                                },
                                element.span,
                            )
                            .with_help("both ends must be single characters, lowest first"),
                        );
                    }
                }
                Primary::CharacterSet(name) => {
                    if CharacterSet::from_name(name).is_none() {
                        result.report_error(StlrError::new(
                            ErrorKind::InvalidCharacterSet { name: name.clone() },
                            element.span,
                        ));
                    }
                }
                _ => {}
            });
        }
    }

    /// No declaration can reach itself before consuming input.
    pub fn check_left_recursion(grammar: &GrammarAst, result: &mut ValidationResult) {
        let expressions: HashMap<&str, &Expression> = grammar
            .declarations
            .iter()
            .map(|declaration| (declaration.identifier.as_str(), &declaration.expression))
            .collect();
        let nullable = nullable_declarations(&expressions);

        let leading: HashMap<&str, Vec<&str>> = expressions
            .iter()
            .map(|(&identifier, expression)| {
                let mut found = Vec::new();
                leading_identifiers(expression, &nullable, &mut found);
                (identifier, found)
            })
            .collect();

        let mut reported = HashSet::new();
        for declaration in &grammar.declarations {
            let identifier = declaration.identifier.as_str();
            if !reported.insert(identifier) || !reaches(identifier, identifier, &leading) {
                continue;
            }

            result.report_error(
                StlrError::new(
                    ErrorKind::LeftRecursion {
                        identifier: identifier.to_string(),
                    },
                    declaration.identifier_span,
                )
                .with_help("consume some input before the recursive reference"),
            );
        }
    }

    /// With several root declarations, all but the last are probably
    /// mistakes.
    pub fn check_unused_declarations(grammar: &GrammarAst, result: &mut ValidationResult) {
        let roots = root_declarations(grammar);
        let Some((last, unused)) = roots.split_last() else {
            return;
        };

        let mut warned = HashSet::from([last.identifier.as_str()]);
        for declaration in unused {
            if !warned.insert(declaration.identifier.as_str()) {
                continue;
            }
            result.report_warning(
                StlrError::new(
                    ErrorKind::UnusedDeclaration {
                        identifier: declaration.identifier.clone(),
                    },
                    declaration.identifier_span,
                )
                .with_help("it is tried as an additional root rule"),
            );
        }
        if warned.len() > 1 {
            result.report_suggestion(format!(
                "reference the unused rules from '{}'",
                last.identifier
            ));
        }
    }
}

// =====================
// Helpers
// =====================

/// The scalars of a `"a"..."z"` range, if well formed.
pub fn range_bounds(low: &str, high: &str) -> Option<(char, char)> {
    let mut low_chars = low.chars();
    let mut high_chars = high.chars();
    match (low_chars.next(), low_chars.next(), high_chars.next(), high_chars.next()) {
        (Some(low), None, Some(high), None) if low <= high => Some((low, high)),
        _ => None,
    }
}

fn visit_elements<'a>(expression: &'a Expression, visit: &mut dyn FnMut(&'a Element)) {
    for sequence in &expression.alternatives {
        for element in &sequence.elements {
            visit(element);
            if let Primary::Group(inner) = &element.primary {
                visit_elements(inner, visit);
            }
        }
    }
}

fn visit_identifiers<'a>(expression: &'a Expression, visit: &mut dyn FnMut(&'a str, &'a Element)) {
    visit_elements(expression, &mut |element| {
        if let Primary::Identifier(identifier) = &element.primary {
            visit(identifier, element);
        }
    });
}

/// Declarations that can match without consuming input (least fixpoint).
fn nullable_declarations<'a>(expressions: &HashMap<&'a str, &'a Expression>) -> HashSet<&'a str> {
    let mut nullable = HashSet::new();
    loop {
        let mut changed = false;
        for (&identifier, expression) in expressions {
            if !nullable.contains(identifier) && expression_nullable(expression, &nullable) {
                nullable.insert(identifier);
                changed = true;
            }
        }
        if !changed {
            return nullable;
        }
    }
}

fn expression_nullable(expression: &Expression, nullable: &HashSet<&str>) -> bool {
    expression.alternatives.iter().any(|sequence| {
        sequence
            .elements
            .iter()
            .all(|element| element_nullable(element, nullable))
    })
}

fn element_nullable(element: &Element, nullable: &HashSet<&str>) -> bool {
    if element.has_modifier(Modifier::Lookahead) {
        return true;
    }
    if element.has_modifier(Modifier::Not) {
        // Consumes a scalar whenever it matches.
        return element
            .quantifier
            .is_some_and(|q| q.cardinality().minimum == 0);
    }
    if element
        .quantifier
        .is_some_and(|q| q.cardinality().minimum == 0)
    {
        return true;
    }

    match &element.primary {
        Primary::Identifier(identifier) => nullable.contains(identifier.as_str()),
        Primary::Terminal(text) => text.is_empty(),
        Primary::Range(..) | Primary::CharacterSet(_) => false,
        Primary::Regex(pattern) => Regex::new(&format!("^(?:{})", pattern))
            .map(|regex| regex.is_match(""))
            .unwrap_or(false),
        Primary::Group(inner) => expression_nullable(inner, nullable),
    }
}

/// Identifiers an expression may evaluate at its own start position.
fn leading_identifiers<'a>(expression: &'a Expression, nullable: &HashSet<&str>, found: &mut Vec<&'a str>) {
    for sequence in &expression.alternatives {
        for element in &sequence.elements {
            match &element.primary {
                Primary::Identifier(identifier) => found.push(identifier),
                Primary::Group(inner) => leading_identifiers(inner, nullable, found),
                _ => {}
            }
            if !element_nullable(element, nullable) {
                break;
            }
        }
    }
}

fn reaches(from: &str, target: &str, leading: &HashMap<&str, Vec<&str>>) -> bool {
    let mut stack = vec![from];
    let mut visited = HashSet::new();
    while let Some(current) = stack.pop() {
        for &next in leading.get(current).into_iter().flatten() {
            if next == target {
                return true;
            }
            if visited.insert(next) {
                stack.push(next);
            }
        }
    }
    false
}

/// A declared name within edit distance two of `name`.
fn closest_name<'a>(name: &str, declared: &HashSet<&'a str>) -> Option<&'a str> {
    declared
        .iter()
        .map(|candidate| (edit_distance(name, candidate), *candidate))
        .filter(|(distance, _)| *distance <= 2)
        .min()
        .map(|(_, candidate)| candidate)
}

fn edit_distance(a: &str, b: &str) -> usize {
    let b: Vec<char> = b.chars().collect();
    let mut previous: Vec<usize> = (0..=b.len()).collect();
    for (i, ca) in a.chars().enumerate() {
        let mut current = vec![i + 1];
        for (j, cb) in b.iter().enumerate() {
            let substitution = previous[j] + usize::from(ca != *cb);
            current.push(substitution.min(previous[j + 1] + 1).min(current[j] + 1));
        }
        previous = current;
    }
    previous[b.len()]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::SourceContext;
    use crate::stlr::parser::parse;

    fn validate_str(text: &str) -> ValidationResult {
        let grammar = parse(&SourceContext::from_file("test.stlr", text)).unwrap();
        validate(&grammar)
    }

    fn kinds(errors: &[StlrError]) -> Vec<&'static str> {
        errors.iter().map(|e| e.kind.code_suffix()).collect()
    }

    #[test]
    fn valid_grammar() {
        let result = validate_str("list = \"(\" item* \")\"\nitem = list | .letters+");
        assert!(result.is_valid(), "{:?}", result.errors);
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn direct_left_recursion() {
        let result = validate_str("expr = expr \"+\" .digits | .digits");
        assert_eq!(kinds(&result.errors), vec!["left_recursion"]);
        assert_eq!(
            result.errors[0].kind.to_string(),
            "'expr' references itself without advancing"
        );
    }

    #[test]
    fn left_recursion_through_nullable_prefix() {
        let result = validate_str("a = b? c\nb = \"x\"\nc = \"y\"? a");
        assert_eq!(kinds(&result.errors), vec!["left_recursion", "left_recursion"]);
    }

    #[test]
    fn consuming_first_is_not_left_recursive() {
        let result = validate_str("nested = \"(\" nested? \")\"");
        assert!(result.is_valid());
    }

    #[test]
    fn undefined_identifier_suggests() {
        let result = validate_str("a = \"x\" itme\nitem = \"y\"");
        assert_eq!(kinds(&result.errors), vec!["undefined_identifier"]);
        assert_eq!(result.errors[0].help.as_deref(), Some("did you mean 'item'?"));
    }

    #[test]
    fn literal_checks() {
        let result = validate_str(r#"a = /(/ "z"..."a" .nonsense "ab"..."c""#);
        assert_eq!(
            kinds(&result.errors),
            vec![
                "invalid_regex",
                "invalid_range",
                "invalid_character_set",
                "invalid_range"
            ]
        );
    }

    #[test]
    fn duplicates_and_unused() {
        let result = validate_str("a = \"x\"\na = \"y\"\nb = \"z\"");
        assert_eq!(kinds(&result.errors), vec!["duplicate_definition"]);
        assert_eq!(kinds(&result.warnings), vec!["unused_declaration"]);
        assert!(result.warnings[0].is_warning);
    }

    #[test]
    fn roots_are_unreferenced_declarations() {
        let grammar = parse(&SourceContext::from_file(
            "t",
            "word = letter+\nletter = .letters",
        ))
        .unwrap();
        let roots: Vec<_> = root_declarations(&grammar)
            .iter()
            .map(|d| d.identifier.as_str())
            .collect();
        assert_eq!(roots, vec!["word"]);
    }
}
