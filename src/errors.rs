//! STLR error handling.
//!
//! Every failure the crate reports, from a terminal that did not match to an
//! undefined identifier in a grammar, is a [`StlrError`]. Errors are cheap to
//! build on the hot backtracking path: they carry a scalar [`Span`] and no
//! source text. Attaching the source for rendering happens once, at the edge,
//! through [`StlrError::with_source`].

use std::fmt;
use std::sync::Arc;

use miette::{Diagnostic, LabeledSpan, NamedSource, Severity, SourceSpan};
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::source::Source;

// ============================================================================
// SPANS AND SOURCES
// ============================================================================

/// A range of Unicode scalar indices in the source an error refers to.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn at(position: usize) -> Self {
        Self::new(position, position)
    }
}

impl From<std::ops::Range<usize>> for Span {
    fn from(range: std::ops::Range<usize>) -> Self {
        Self::new(range.start, range.end)
    }
}

/// A named source used to render diagnostics.
#[derive(Debug, Clone)]
pub struct SourceContext {
    pub name: String,
    pub content: Source,
}

impl SourceContext {
    pub fn from_file(name: impl Into<String>, content: impl Into<Source>) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
        }
    }

    /// Convert to NamedSource for use with miette error reporting
    pub fn to_named_source(&self) -> Arc<NamedSource<String>> {
        Arc::new(NamedSource::new(
            self.name.clone(),
            self.content.as_str().to_string(),
        ))
    }

    /// Converts a scalar span into the byte span miette expects.
    pub fn source_span(&self, span: Span) -> SourceSpan {
        let bytes = self.content.byte_range(span.start..span.end);
        SourceSpan::from(bytes)
    }
}

// ============================================================================
// ERROR KINDS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Failures while matching input against a grammar.
    Parse,
    /// Problems in the grammar itself, found at compile time.
    Grammar,
    /// Host-level failures: I/O, closures, engine limits.
    Internal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Parse => write!(f, "Parse"),
            Self::Grammar => write!(f, "Grammar"),
            Self::Internal => write!(f, "Internal"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ErrorKind {
    // Parse errors
    #[error("expected {token}")]
    MatchFailed { token: String },
    #[error("{message}")]
    Scanning { message: String },
    #[error("{message}")]
    Parsing { message: String },
    #[error("{message}")]
    Fatal { message: String },
    #[error("unexpected end of input")]
    UnexpectedEndOfInput,
    #[error("input not matched by any root rule")]
    TrailingInput,

    // Grammar errors
    #[error("{message}")]
    Syntax { message: String },
    #[error("undefined identifier '{identifier}'")]
    UndefinedIdentifier { identifier: String },
    #[error("'{identifier}' is defined more than once")]
    DuplicateDefinition { identifier: String },
    #[error("'{identifier}' references itself without advancing")]
    LeftRecursion { identifier: String },
    #[error("invalid regular expression /{pattern}/: {reason}")]
    InvalidRegex { pattern: String, reason: String },
    #[error("unknown character set '.{name}'")]
    InvalidCharacterSet { name: String },
    #[error("invalid scalar range \"{low}\"...\"{high}\"")]
    InvalidRange { low: String, high: String },
    #[error("'{identifier}' is never referenced")]
    UnusedDeclaration { identifier: String },

    // Internal errors
    #[error("rule nesting exceeded the limit of {limit}")]
    RecursionLimit { limit: usize },
    #[error("{message}")]
    Undefined { message: String },
    #[error("{message}")]
    Io { message: String },
}

impl ErrorKind {
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::MatchFailed { .. }
            | Self::Scanning { .. }
            | Self::Parsing { .. }
            | Self::Fatal { .. }
            | Self::UnexpectedEndOfInput
            | Self::TrailingInput => ErrorCategory::Parse,

            Self::Syntax { .. }
            | Self::UndefinedIdentifier { .. }
            | Self::DuplicateDefinition { .. }
            | Self::LeftRecursion { .. }
            | Self::InvalidRegex { .. }
            | Self::InvalidCharacterSet { .. }
            | Self::InvalidRange { .. }
            | Self::UnusedDeclaration { .. } => ErrorCategory::Grammar,

            Self::RecursionLimit { .. } | Self::Undefined { .. } | Self::Io { .. } => {
                ErrorCategory::Internal
            }
        }
    }

    /// Get error code suffix for diagnostic codes
    pub const fn code_suffix(&self) -> &'static str {
        match self {
            Self::MatchFailed { .. } => "match_failed",
            Self::Scanning { .. } => "scanning",
            Self::Parsing { .. } => "parsing",
            Self::Fatal { .. } => "fatal",
            Self::UnexpectedEndOfInput => "unexpected_end_of_input",
            Self::TrailingInput => "trailing_input",
            Self::Syntax { .. } => "syntax",
            Self::UndefinedIdentifier { .. } => "undefined_identifier",
            Self::DuplicateDefinition { .. } => "duplicate_definition",
            Self::LeftRecursion { .. } => "left_recursion",
            Self::InvalidRegex { .. } => "invalid_regex",
            Self::InvalidCharacterSet { .. } => "invalid_character_set",
            Self::InvalidRange { .. } => "invalid_range",
            Self::UnusedDeclaration { .. } => "unused_declaration",
            Self::RecursionLimit { .. } => "recursion_limit",
            Self::Undefined { .. } => "undefined",
            Self::Io { .. } => "io",
        }
    }

    /// Whether the error carries a grammar author's own message.
    pub fn is_specific(&self) -> bool {
        matches!(
            self,
            Self::Scanning { .. } | Self::Parsing { .. } | Self::Fatal { .. }
        )
    }

    fn primary_label(&self) -> &'static str {
        match self {
            Self::MatchFailed { .. } => "no match here",
            Self::Scanning { .. } | Self::Parsing { .. } => "here",
            Self::Fatal { .. } => "parsing stopped here",
            Self::UnexpectedEndOfInput => "input ends here",
            Self::TrailingInput => "unmatched input starts here",
            Self::Syntax { .. } => "invalid syntax",
            Self::UndefinedIdentifier { .. } => "undefined",
            Self::DuplicateDefinition { .. } => "redefined here",
            Self::LeftRecursion { .. } => "left recursive",
            Self::InvalidRegex { .. } => "invalid regex",
            Self::InvalidCharacterSet { .. } => "unknown set",
            Self::InvalidRange { .. } => "invalid range",
            Self::UnusedDeclaration { .. } => "unused",
            Self::RecursionLimit { .. } => "nested too deeply",
            Self::Undefined { .. } | Self::Io { .. } => "here",
        }
    }
}

// ============================================================================
// THE ERROR TYPE
// ============================================================================

/// The crate's single error type.
#[derive(Debug, Clone, PartialEq)]
pub struct StlrError {
    pub kind: ErrorKind,
    pub span: Span,
    /// Errors from rejected alternatives that led to this one.
    pub causes: Vec<StlrError>,
    pub help: Option<String>,
    pub is_warning: bool,
}

impl StlrError {
    pub fn new(kind: ErrorKind, span: impl Into<Span>) -> Self {
        Self {
            kind,
            span: span.into(),
            causes: Vec::new(),
            help: None,
            is_warning: false,
        }
    }

    pub fn match_failed(token: impl fmt::Display, position: usize) -> Self {
        Self::new(
            ErrorKind::MatchFailed {
                token: token.to_string(),
            },
            Span::at(position),
        )
    }

    pub fn undefined(message: impl Into<String>) -> Self {
        Self::new(
            ErrorKind::Undefined {
                message: message.into(),
            },
            Span::default(),
        )
    }

    pub fn io(error: std::io::Error, path: &str) -> Self {
        Self::new(
            ErrorKind::Io {
                message: format!("{}: {}", path, error),
            },
            Span::default(),
        )
    }

    pub fn with_causes(mut self, causes: Vec<StlrError>) -> Self {
        self.causes = causes;
        self
    }

    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.help = Some(help.into());
        self
    }

    pub fn as_warning(mut self) -> Self {
        self.is_warning = true;
        self
    }

    pub fn category(&self) -> ErrorCategory {
        self.kind.category()
    }

    pub fn is_fatal(&self) -> bool {
        matches!(
            self.kind,
            ErrorKind::Fatal { .. } | ErrorKind::RecursionLimit { .. }
        )
    }

    pub fn code(&self) -> String {
        format!(
            "stlr::{}::{}",
            self.category().to_string().to_lowercase(),
            self.kind.code_suffix()
        )
    }

    /// Every error in the causal chain below this one, depth first.
    pub fn all_causes(&self) -> Vec<&StlrError> {
        let mut found = Vec::new();
        let mut stack: Vec<&StlrError> = self.causes.iter().rev().collect();
        while let Some(error) = stack.pop() {
            found.push(error);
            stack.extend(error.causes.iter().rev());
        }
        found
    }

    /// Causes (at any depth) accepted by `predicate`.
    pub fn filter_causes<F>(&self, predicate: F) -> Vec<&StlrError>
    where
        F: Fn(&StlrError) -> bool,
    {
        self.all_causes()
            .into_iter()
            .filter(|error| predicate(error))
            .collect()
    }

    /// Causes (at any depth) whose message matches `pattern`.
    pub fn causes_matching(&self, pattern: &Regex) -> Vec<&StlrError> {
        self.filter_causes(|error| pattern.is_match(&error.kind.to_string()))
    }

    /// The deepest errors of the chain: those with no causes of their own.
    pub fn root_causes(&self) -> Vec<&StlrError> {
        if self.causes.is_empty() {
            return vec![self];
        }
        self.filter_causes(|error| error.causes.is_empty())
    }

    /// Attaches source text so the error can be rendered by miette.
    pub fn with_source(self, source: &SourceContext) -> SourcedError {
        SourcedError::new(self, source, &source.to_named_source())
    }
}

impl fmt::Display for StlrError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_warning {
            write!(f, "{} warning: {}", self.category(), self.kind)
        } else {
            write!(f, "{} error: {}", self.category(), self.kind)
        }
    }
}

impl std::error::Error for StlrError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.causes
            .first()
            .map(|cause| cause as &(dyn std::error::Error + 'static))
    }
}

// ============================================================================
// DIAGNOSTIC RENDERING
// ============================================================================

/// A [`StlrError`] bound to the source it refers to.
#[derive(Debug)]
pub struct SourcedError {
    error: StlrError,
    source: Arc<NamedSource<String>>,
    span: SourceSpan,
    related: Vec<SourcedError>,
}

impl SourcedError {
    fn new(error: StlrError, context: &SourceContext, named: &Arc<NamedSource<String>>) -> Self {
        let span = context.source_span(error.span);
        let related = error
            .causes
            .iter()
            .cloned()
            .map(|cause| SourcedError::new(cause, context, named))
            .collect();

        Self {
            error,
            source: Arc::clone(named),
            span,
            related,
        }
    }

    pub fn error(&self) -> &StlrError {
        &self.error
    }

    pub fn into_error(self) -> StlrError {
        self.error
    }
}

impl fmt::Display for SourcedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)
    }
}

impl std::error::Error for SourcedError {}

impl Diagnostic for SourcedError {
    fn code<'a>(&'a self) -> Option<Box<dyn fmt::Display + 'a>> {
        Some(Box::new(self.error.code()))
    }

    fn severity(&self) -> Option<Severity> {
        if self.error.is_warning {
            Some(Severity::Warning)
        } else {
            Some(Severity::Error)
        }
    }

    fn help<'a>(&'a self) -> Option<Box<dyn fmt::Display + 'a>> {
        self.error
            .help
            .as_ref()
            .map(|h| Box::new(h) as Box<dyn fmt::Display + 'a>)
    }

    fn labels(&self) -> Option<Box<dyn Iterator<Item = LabeledSpan> + '_>> {
        let labels = vec![LabeledSpan::new_with_span(
            Some(self.error.kind.primary_label().to_string()),
            self.span,
        )];
        Some(Box::new(labels.into_iter()))
    }

    fn source_code(&self) -> Option<&dyn miette::SourceCode> {
        Some(&*self.source)
    }

    fn related<'a>(&'a self) -> Option<Box<dyn Iterator<Item = &'a dyn Diagnostic> + 'a>> {
        if self.related.is_empty() {
            return None;
        }
        Some(Box::new(
            self.related.iter().map(|cause| cause as &dyn Diagnostic),
        ))
    }
}

/// Prints an error with full miette diagnostics to stderr.
pub fn print_error(error: StlrError, source: &SourceContext) {
    use miette::Report;
    let report = Report::new(error.with_source(source));
    eprintln!("{report:?}");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain() -> StlrError {
        StlrError::new(
            ErrorKind::Parsing {
                message: "expected a value".into(),
            },
            Span::new(0, 4),
        )
        .with_causes(vec![
            StlrError::match_failed("number", 0).with_causes(vec![StlrError::match_failed(
                ".decimalDigit",
                0,
            )]),
            StlrError::match_failed("\"true\"", 0),
        ])
    }

    #[test]
    fn causes_are_flattened_depth_first() {
        let error = chain();
        let names: Vec<String> = error.all_causes().iter().map(|e| e.kind.to_string()).collect();
        assert_eq!(
            names,
            vec!["expected number", "expected .decimalDigit", "expected \"true\""]
        );
        assert_eq!(error.root_causes().len(), 2);
    }

    #[test]
    fn causes_can_be_filtered_by_message() {
        let error = chain();
        let digits = error.causes_matching(&Regex::new("decimal").unwrap());
        assert_eq!(digits.len(), 1);
        assert_eq!(digits[0].span, Span::at(0));
    }

    #[test]
    fn display_and_codes() {
        let error = chain();
        assert_eq!(error.to_string(), "Parse error: expected a value");
        assert_eq!(error.code(), "stlr::parse::parsing");
        assert_eq!(error.category(), ErrorCategory::Parse);
        assert!(!error.is_fatal());
    }

    #[test]
    fn sourced_errors_convert_scalar_spans() {
        let context = SourceContext::from_file("input", "héllo");
        let sourced = StlrError::match_failed("x", 2).with_source(&context);
        assert_eq!(sourced.span, SourceSpan::from(3..3));
    }
}
