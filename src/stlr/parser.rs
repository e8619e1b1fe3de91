//! STLR parser: pest pairs to [`GrammarAst`].
//!
//! Purely syntactic. Identifiers are not resolved and literals are not
//! checked here; that is the validator's job.

use pest::{error::Error, iterators::Pair, Parser};
use pest_derive::Parser;

use super::ast::*;
use crate::errors::{ErrorKind, SourceContext, Span, StlrError};
use crate::source::Source;

#[derive(Parser)]
#[grammar = "stlr/stlr.pest"]
struct StlrParser;

// ============================================================================
// PUBLIC API
// ============================================================================

/// Parses STLR source into its syntax tree.
pub fn parse(source: &SourceContext) -> Result<GrammarAst, StlrError> {
    let text = source.content.as_str();
    let mut pairs = StlrParser::parse(Rule::file, text)
        .map_err(|error| convert_parse_error(error, &source.content))?;

    let builder = Builder {
        source: &source.content,
    };
    let file = pairs
        .next()
        .ok_or_else(|| builder.malformed("empty grammar file", Span::default()))?;

    let mut grammar = GrammarAst {
        name: None,
        declarations: Vec::new(),
    };
    for pair in file.into_inner() {
        match pair.as_rule() {
            Rule::header => {
                let name = pair
                    .into_inner()
                    .find(|p| p.as_rule() == Rule::identifier)
                    .map(|p| p.as_str().to_string());
                grammar.name = name;
            }
            Rule::declaration => grammar.declarations.push(builder.declaration(pair)?),
            _ => {}
        }
    }

    Ok(grammar)
}

// ============================================================================
// AST BUILDERS
// ============================================================================

struct Builder<'s> {
    source: &'s Source,
}

impl Builder<'_> {
    fn span(&self, pair: &Pair<Rule>) -> Span {
        let span = pair.as_span();
        Span::new(
            self.source.scalar_index(span.start()),
            self.source.scalar_index(span.end()),
        )
    }

    fn malformed(&self, message: &str, span: Span) -> StlrError {
        StlrError::new(
            ErrorKind::Syntax {
                message: message.to_string(),
            },
            span,
        )
    }

    fn declaration(&self, pair: Pair<Rule>) -> Result<Declaration, StlrError> {
        let span = self.span(&pair);
        let mut annotations = Vec::new();
        let mut identifier = None;
        let mut expression = None;

        for inner in pair.into_inner() {
            match inner.as_rule() {
                Rule::annotation => annotations.push(self.annotation(inner)?),
                Rule::identifier => {
                    identifier = Some((inner.as_str().to_string(), self.span(&inner)))
                }
                Rule::expression => expression = Some(self.expression(inner)?),
                _ => {}
            }
        }

        let (identifier, identifier_span) =
            identifier.ok_or_else(|| self.malformed("declaration without a name", span))?;
        let expression =
            expression.ok_or_else(|| self.malformed("declaration without an expression", span))?;

        Ok(Declaration {
            annotations,
            identifier,
            identifier_span,
            expression,
            span,
        })
    }

    fn annotation(&self, pair: Pair<Rule>) -> Result<Annotation, StlrError> {
        let span = self.span(&pair);
        let mut label = String::new();
        let mut value = None;

        for inner in pair.into_inner() {
            match inner.as_rule() {
                Rule::label => label = inner.as_str().to_string(),
                Rule::annotation_args => {
                    if let Some(literal) = inner.into_inner().next() {
                        value = Some(self.annotation_value(literal)?);
                    }
                }
                _ => {}
            }
        }

        Ok(Annotation { label, value, span })
    }

    fn annotation_value(&self, pair: Pair<Rule>) -> Result<AnnotationLiteral, StlrError> {
        let span = self.span(&pair);
        let literal = pair
            .into_inner()
            .next()
            .ok_or_else(|| self.malformed("empty annotation value", span))?;

        match literal.as_rule() {
            Rule::terminal => Ok(AnnotationLiteral::String(self.terminal_text(literal)?)),
            Rule::boolean => Ok(AnnotationLiteral::Bool(literal.as_str() == "true")),
            Rule::integer => literal
                .as_str()
                .parse()
                .map(AnnotationLiteral::Int)
                .map_err(|_| self.malformed("integer annotation value out of range", span)),
            _ => Err(self.malformed("unsupported annotation value", span)),
        }
    }

    fn expression(&self, pair: Pair<Rule>) -> Result<Expression, StlrError> {
        let span = self.span(&pair);
        let alternatives = pair
            .into_inner()
            .filter(|p| p.as_rule() == Rule::sequence)
            .map(|p| self.sequence(p))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Expression { alternatives, span })
    }

    fn sequence(&self, pair: Pair<Rule>) -> Result<Sequence, StlrError> {
        let span = self.span(&pair);
        let elements = pair
            .into_inner()
            .map(|p| self.element(p))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Sequence { elements, span })
    }

    fn element(&self, pair: Pair<Rule>) -> Result<Element, StlrError> {
        let span = self.span(&pair);
        let mut annotations = Vec::new();
        let mut modifiers = Vec::new();
        let mut primary = None;
        let mut quantifier = None;

        for inner in pair.into_inner() {
            match inner.as_rule() {
                Rule::annotation => annotations.push(self.annotation(inner)?),
                Rule::modifier => modifiers.push(match inner.as_str() {
                    "-" => Modifier::Skip,
                    "~" => Modifier::Transient,
                    "!" => Modifier::Not,
                    _ => Modifier::Lookahead,
                }),
                Rule::quantifier => quantifier = Some(self.quantifier(inner)?),
                _ => primary = Some(self.primary(inner)?),
            }
        }

        let primary = primary.ok_or_else(|| self.malformed("element without a primary", span))?;
        Ok(Element {
            annotations,
            modifiers,
            primary,
            quantifier,
            span,
        })
    }

    fn primary(&self, pair: Pair<Rule>) -> Result<Primary, StlrError> {
        let span = self.span(&pair);
        match pair.as_rule() {
            Rule::group => {
                let expression = pair
                    .into_inner()
                    .next()
                    .ok_or_else(|| self.malformed("empty group", span))?;
                Ok(Primary::Group(self.expression(expression)?))
            }
            Rule::character_range => {
                let mut ends = pair.into_inner();
                let (low, high) = match (ends.next(), ends.next()) {
                    (Some(low), Some(high)) => (low, high),
                    _ => return Err(self.malformed("incomplete character range", span)),
                };
                Ok(Primary::Range(
                    self.terminal_text(low)?,
                    self.terminal_text(high)?,
                ))
            }
            Rule::terminal => Ok(Primary::Terminal(self.terminal_text(pair)?)),
            Rule::character_set => Ok(Primary::CharacterSet(
                pair.as_str().trim_start_matches('.').to_string(),
            )),
            Rule::regex => {
                let body = pair.as_str();
                let body = &body[1..body.len() - 1];
                Ok(Primary::Regex(body.replace("\\/", "/")))
            }
            Rule::reference => {
                let identifier = pair
                    .into_inner()
                    .next()
                    .ok_or_else(|| self.malformed("empty reference", span))?;
                Ok(Primary::Identifier(identifier.as_str().to_string()))
            }
            rule => Err(self.malformed(&format!("unsupported element: {:?}", rule), span)),
        }
    }

    fn quantifier(&self, pair: Pair<Rule>) -> Result<Quantifier, StlrError> {
        let span = self.span(&pair);
        match pair.as_str() {
            "?" => return Ok(Quantifier::Optional),
            "*" => return Ok(Quantifier::NoneOrMore),
            "+" => return Ok(Quantifier::OneOrMore),
            _ => {}
        }

        let bounds = pair
            .into_inner()
            .next()
            .ok_or_else(|| self.malformed("invalid quantifier", span))?;
        let mut numbers = Vec::new();
        let mut open = false;
        for inner in bounds.into_inner() {
            match inner.as_rule() {
                Rule::number => numbers.push(
                    inner
                        .as_str()
                        .parse::<usize>()
                        .map_err(|_| self.malformed("repetition bound out of range", span))?,
                ),
                Rule::bounds_open => open = true,
                _ => {}
            }
        }

        match (numbers.as_slice(), open) {
            (&[exact], false) => Ok(Quantifier::Bounded {
                minimum: exact,
                maximum: Some(exact),
            }),
            (&[minimum], true) => Ok(Quantifier::Bounded {
                minimum,
                maximum: None,
            }),
            (&[minimum, maximum], true) if minimum <= maximum => Ok(Quantifier::Bounded {
                minimum,
                maximum: Some(maximum),
            }),
            _ => Err(self.malformed("repetition bounds must satisfy minimum <= maximum", span)),
        }
    }

    fn terminal_text(&self, pair: Pair<Rule>) -> Result<String, StlrError> {
        let span = self.span(&pair);
        let literal = pair
            .into_inner()
            .next()
            .map(|p| p.as_str())
            .unwrap_or("");
        unescape(literal).ok_or_else(|| self.malformed("invalid escape sequence", span))
    }
}

// ============================================================================
// UTILITIES
// ============================================================================

fn unescape(text: &str) -> Option<String> {
    let mut result = String::with_capacity(text.len());
    let mut chars = text.chars();

    while let Some(ch) = chars.next() {
        if ch != '\\' {
            result.push(ch);
            continue;
        }
        match chars.next()? {
            'n' => result.push('\n'),
            't' => result.push('\t'),
            'r' => result.push('\r'),
            '\\' => result.push('\\'),
            '"' => result.push('"'),
            _ => return None,
        }
    }

    Some(result)
}

fn convert_parse_error(error: Error<Rule>, source: &Source) -> StlrError {
    let span = match error.location {
        pest::error::InputLocation::Pos(pos) => Span::at(source.scalar_index(pos)),
        pest::error::InputLocation::Span((start, end)) => {
            Span::new(source.scalar_index(start), source.scalar_index(end))
        }
    };

    let message = match &error.variant {
        pest::error::ErrorVariant::ParsingError { positives, .. } if !positives.is_empty() => {
            let expected: Vec<String> = positives.iter().map(describe_rule).collect();
            format!("expected {}", expected.join(" or "))
        }
        variant => variant.message().into_owned(),
    };

    StlrError::new(ErrorKind::Syntax { message }, span)
}

fn describe_rule(rule: &Rule) -> String {
    match rule {
        Rule::EOI => "end of file".into(),
        Rule::identifier | Rule::reference => "an identifier".into(),
        Rule::expression | Rule::sequence | Rule::element => "an expression".into(),
        Rule::terminal => "a string literal".into(),
        Rule::annotation => "an annotation".into(),
        Rule::quantifier => "a quantifier".into(),
        Rule::modifier => "a modifier".into(),
        Rule::declaration => "a declaration".into(),
        other => format!("{:?}", other).replace('_', " "),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_str(text: &str) -> Result<GrammarAst, StlrError> {
        parse(&SourceContext::from_file("test.stlr", text))
    }

    #[test]
    fn empty_grammar() {
        let grammar = parse_str("// nothing here\n").unwrap();
        assert!(grammar.declarations.is_empty());
        assert_eq!(grammar.name, None);
    }

    #[test]
    fn header_and_declarations() {
        let grammar = parse_str("grammar Greeting\n\ngreeting = \"Hello\" name\nname = .letter+").unwrap();

        assert_eq!(grammar.name.as_deref(), Some("Greeting"));
        assert_eq!(grammar.declarations.len(), 2);
        let elements = &grammar.declarations[0].expression.alternatives[0].elements;
        assert_eq!(elements.len(), 2);
        assert_eq!(elements[1].primary, Primary::Identifier("name".into()));
    }

    #[test]
    fn elements_with_everything() {
        let grammar =
            parse_str(r#"x = @error("bad") -!"\"" {2,} ~y? >>"a"..."z" /[0-9]+\/x/ @pin "s""#)
                .unwrap();
        let elements = &grammar.declarations[0].expression.alternatives[0].elements;

        assert_eq!(elements[0].annotations[0].label, "error");
        assert_eq!(
            elements[0].annotations[0].value,
            Some(AnnotationLiteral::String("bad".into()))
        );
        assert_eq!(elements[0].modifiers, vec![Modifier::Skip, Modifier::Not]);
        assert_eq!(elements[0].primary, Primary::Terminal("\"".into()));
        assert_eq!(
            elements[0].quantifier,
            Some(Quantifier::Bounded {
                minimum: 2,
                maximum: None
            })
        );
        assert_eq!(elements[1].modifiers, vec![Modifier::Transient]);
        assert_eq!(elements[1].quantifier, Some(Quantifier::Optional));
        assert_eq!(elements[2].primary, Primary::Range("a".into(), "z".into()));
        assert_eq!(elements[3].primary, Primary::Regex("[0-9]+/x".into()));
        assert_eq!(elements[4].annotations[0].label, "pin");
        assert_eq!(elements[4].annotations[0].value, None);
        assert_eq!(elements[4].primary, Primary::Terminal("s".into()));
    }

    #[test]
    fn alternatives_and_groups() {
        let grammar = parse_str(r#"x = "a" | ("b" "c")* | .digits"#).unwrap();
        let alternatives = &grammar.declarations[0].expression.alternatives;

        assert_eq!(alternatives.len(), 3);
        assert!(matches!(alternatives[1].elements[0].primary, Primary::Group(_)));
        assert_eq!(
            alternatives[2].elements[0].primary,
            Primary::CharacterSet("digits".into())
        );
    }

    #[test]
    fn syntax_errors_have_positions() {
        let error = parse_str("x = \"unterminated").unwrap_err();
        assert_eq!(error.category(), crate::errors::ErrorCategory::Grammar);
        assert!(matches!(error.kind, ErrorKind::Syntax { .. }));
        assert!(error.span.start >= 4);
    }
}
