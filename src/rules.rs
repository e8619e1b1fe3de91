//! The rule graph.
//!
//! Rules live in a [`RuleSet`] arena and refer to each other by [`RuleId`].
//! A rule is never modified once built: every modifier (`repeated`,
//! `optional`, `not`, …) adds a new rule that either copies a terminal
//! payload or wraps the original in a [`RuleKind::Reference`].
//!
//! Cycles are the one exception to "build bottom-up". A grammar production
//! that refers to itself gets a [`RuleKind::Recursive`] placeholder first;
//! its target is assigned exactly once, after the real definition exists,
//! and from then on the placeholder is a transparent proxy.

use std::fmt;
use std::sync::Arc;

use once_cell::sync::OnceCell;
use regex::Regex;
use serde::Serialize;

use crate::annotations::RuleAnnotations;
use crate::behaviour::{Behaviour, Cardinality, Kind};
use crate::charset::CharacterSet;
use crate::cursor::LexicalCursor;
use crate::errors::StlrError;
use crate::token::{Token, TokenTable};

/// Index of a rule in its [`RuleSet`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct RuleId(u32);

impl RuleId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Error type a custom matcher may fail with.
pub type CustomError = Box<dyn std::error::Error + Send + Sync>;

/// Host supplied terminal logic. Returns whether it matched; on a match the
/// closure is expected to have advanced the cursor.
pub type CustomMatcher =
    Arc<dyn Fn(&mut LexicalCursor) -> Result<bool, CustomError> + Send + Sync>;

#[derive(Clone)]
pub enum RuleKind {
    Terminal(String),
    TerminalFromSet(CharacterSet),
    /// Everything up to (not including) the terminator.
    TerminalUntil(String),
    TerminalUntilSet(CharacterSet),
    /// An anchored regular expression.
    Regex(Regex),
    Sequence(Vec<RuleId>),
    Choice(Vec<RuleId>),
    /// Evaluates the target rule as a whole, once per attempt.
    Reference(RuleId),
    /// Matches what the target's payload matches, under this rule's own
    /// behaviour and annotations.
    Inherit(RuleId),
    Custom {
        description: String,
        matcher: CustomMatcher,
    },
    Recursive(OnceCell<RuleId>),
}

impl RuleKind {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Terminal(_)
                | Self::TerminalFromSet(_)
                | Self::TerminalUntil(_)
                | Self::TerminalUntilSet(_)
                | Self::Regex(_)
                | Self::Custom { .. }
        )
    }
}

impl fmt::Debug for RuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Terminal(text) => f.debug_tuple("Terminal").field(text).finish(),
            Self::TerminalFromSet(set) => f.debug_tuple("TerminalFromSet").field(set).finish(),
            Self::TerminalUntil(text) => f.debug_tuple("TerminalUntil").field(text).finish(),
            Self::TerminalUntilSet(set) => f.debug_tuple("TerminalUntilSet").field(set).finish(),
            Self::Regex(regex) => f.debug_tuple("Regex").field(&regex.as_str()).finish(),
            Self::Sequence(ids) => f.debug_tuple("Sequence").field(ids).finish(),
            Self::Choice(ids) => f.debug_tuple("Choice").field(ids).finish(),
            Self::Reference(id) => f.debug_tuple("Reference").field(id).finish(),
            Self::Inherit(id) => f.debug_tuple("Inherit").field(id).finish(),
            Self::Custom { description, .. } => {
                f.debug_struct("Custom").field("description", description).finish()
            }
            Self::Recursive(target) => f.debug_tuple("Recursive").field(&target.get()).finish(),
        }
    }
}

/// One grammar rule.
#[derive(Debug, Clone)]
pub struct Rule {
    pub kind: RuleKind,
    pub behaviour: Behaviour,
    pub annotations: RuleAnnotations,
    /// The token this rule stands for in diagnostics, and the node token when
    /// the behaviour is structural.
    pub produces: Token,
}

impl Rule {
    /// Scanning, exactly once, no annotations.
    fn is_plain(&self) -> bool {
        self.behaviour == Behaviour::scanning() && self.annotations.is_empty()
    }
}

/// The arena holding every rule of one grammar, plus its token table.
#[derive(Debug, Default, Clone)]
pub struct RuleSet {
    rules: Vec<Rule>,
    tokens: TokenTable,
}

impl RuleSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn get(&self, id: RuleId) -> &Rule {
        &self.rules[id.index()]
    }

    pub fn tokens(&self) -> &TokenTable {
        &self.tokens
    }

    /// Interns a token name in this rule set's table.
    pub fn token(&mut self, name: &str) -> Token {
        self.tokens.intern(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (RuleId, &Rule)> {
        self.rules
            .iter()
            .enumerate()
            .map(|(index, rule)| (RuleId(index as u32), rule))
    }

    /// Follows resolved recursive placeholders to the rule they stand for.
    pub fn resolve(&self, id: RuleId) -> Result<(RuleId, &Rule), StlrError> {
        let mut current = id;
        loop {
            let rule = self.get(current);
            match &rule.kind {
                RuleKind::Recursive(target) => {
                    current = *target.get().ok_or_else(|| {
                        StlrError::undefined(format!(
                            "recursive rule '{}' was used before it was resolved",
                            rule.produces
                        ))
                    })?;
                }
                _ => return Ok((current, rule)),
            }
        }
    }

    pub fn add(&mut self, rule: Rule) -> RuleId {
        let id = RuleId(self.rules.len() as u32);
        self.rules.push(rule);
        id
    }

    fn add_scanning(&mut self, kind: RuleKind, token_name: &str) -> RuleId {
        let produces = self.token(token_name);
        self.add(Rule {
            kind,
            behaviour: Behaviour::scanning(),
            annotations: RuleAnnotations::new(),
            produces,
        })
    }

    // ========================================================================
    // TERMINALS
    // ========================================================================

    pub fn terminal(&mut self, text: &str) -> RuleId {
        let name = format!("{:?}", text);
        self.add_scanning(RuleKind::Terminal(text.to_string()), &name)
    }

    pub fn one_of(&mut self, set: CharacterSet) -> RuleId {
        let name = set.to_string();
        self.add_scanning(RuleKind::TerminalFromSet(set), &name)
    }

    pub fn until(&mut self, terminator: &str) -> RuleId {
        let name = format!("up to {:?}", terminator);
        self.add_scanning(RuleKind::TerminalUntil(terminator.to_string()), &name)
    }

    pub fn until_set(&mut self, set: CharacterSet) -> RuleId {
        let name = format!("up to {}", set);
        self.add_scanning(RuleKind::TerminalUntilSet(set), &name)
    }

    /// A terminal matching `pattern` at the cursor.
    pub fn regex(&mut self, pattern: &str) -> Result<RuleId, regex::Error> {
        let regex = Regex::new(&format!("^(?:{})", pattern))?;
        let name = format!("/{}/", pattern);
        Ok(self.add_scanning(RuleKind::Regex(regex), &name))
    }

    pub fn custom<F>(&mut self, description: &str, matcher: F) -> RuleId
    where
        F: Fn(&mut LexicalCursor) -> Result<bool, CustomError> + Send + Sync + 'static,
    {
        self.add_scanning(
            RuleKind::Custom {
                description: description.to_string(),
                matcher: Arc::new(matcher),
            },
            description,
        )
    }

    // ========================================================================
    // COMPOSITES
    // ========================================================================

    pub fn sequence(&mut self, rules: Vec<RuleId>) -> RuleId {
        let name = self.describe_all(&rules, " ");
        self.add_scanning(RuleKind::Sequence(rules), &name)
    }

    pub fn choice(&mut self, rules: Vec<RuleId>) -> RuleId {
        let name = self.describe_all(&rules, " | ");
        self.add_scanning(RuleKind::Choice(rules), &name)
    }

    fn describe_all(&self, rules: &[RuleId], separator: &str) -> String {
        let parts: Vec<String> = rules
            .iter()
            .map(|&id| self.get(id).produces.to_string())
            .collect();
        format!("({})", parts.join(separator))
    }

    /// A placeholder for a rule whose definition is not built yet.
    pub fn recursive(&mut self, produces: Token) -> RuleId {
        self.add(Rule {
            kind: RuleKind::Recursive(OnceCell::new()),
            behaviour: Behaviour::scanning(),
            annotations: RuleAnnotations::new(),
            produces,
        })
    }

    /// Assigns the target of a recursive placeholder. May only happen once.
    pub fn resolve_recursive(&mut self, placeholder: RuleId, target: RuleId) -> Result<(), StlrError> {
        let rule = self.get(placeholder);
        match &rule.kind {
            RuleKind::Recursive(cell) => cell.set(target).map_err(|_| {
                StlrError::undefined(format!(
                    "recursive rule '{}' was resolved twice",
                    rule.produces
                ))
            }),
            _ => Err(StlrError::undefined(format!(
                "rule '{}' is not a recursive placeholder",
                rule.produces
            ))),
        }
    }

    // ========================================================================
    // MODIFIERS
    // ========================================================================

    /// A new rule matching what `id` matches, under a different behaviour.
    ///
    /// Plain terminals are copied with the new behaviour so that, e.g., `"x"+`
    /// stays a single terminal; everything else is wrapped in a reference.
    pub fn derive(&mut self, id: RuleId, behaviour: Behaviour, annotations: RuleAnnotations) -> RuleId {
        let rule = self.get(id);
        let kind = if rule.kind.is_terminal() && rule.is_plain() {
            rule.kind.clone()
        } else {
            RuleKind::Reference(id)
        };
        let produces = match &behaviour.kind {
            Kind::Structural(token) => token.clone(),
            _ => rule.produces.clone(),
        };

        self.add(Rule {
            kind,
            behaviour,
            annotations,
            produces,
        })
    }

    /// A new rule with `id`'s payload and its own behaviour and annotations.
    /// The target may still be an unresolved placeholder.
    pub fn inherit(&mut self, id: RuleId, behaviour: Behaviour, annotations: RuleAnnotations) -> RuleId {
        let produces = match &behaviour.kind {
            Kind::Structural(token) => token.clone(),
            _ => self.get(id).produces.clone(),
        };
        self.add(Rule {
            kind: RuleKind::Inherit(id),
            behaviour,
            annotations,
            produces,
        })
    }

    /// Terminals that only carry prefix modifiers take further modifiers in
    /// place: `(!"x")+` is one negated, repeated terminal.
    fn modified(&mut self, id: RuleId, modify: impl FnOnce(&Behaviour) -> Behaviour) -> RuleId {
        let rule = self.get(id);
        let foldable = rule.kind.is_terminal()
            && rule.annotations.is_empty()
            && rule.behaviour.cardinality.is_one()
            && !rule.behaviour.lookahead
            && !rule.behaviour.is_structural();

        if foldable {
            let folded = Rule {
                behaviour: modify(&rule.behaviour),
                ..rule.clone()
            };
            self.add(folded)
        } else {
            let behaviour = modify(&Behaviour::scanning());
            self.derive(id, behaviour, RuleAnnotations::new())
        }
    }

    pub fn repeated(&mut self, id: RuleId, cardinality: Cardinality) -> RuleId {
        self.modified(id, |b| b.with_cardinality(cardinality))
    }

    pub fn optional(&mut self, id: RuleId) -> RuleId {
        self.repeated(id, Cardinality::OPTIONAL)
    }

    pub fn one_or_more(&mut self, id: RuleId) -> RuleId {
        self.repeated(id, Cardinality::ONE_OR_MORE)
    }

    pub fn none_or_more(&mut self, id: RuleId) -> RuleId {
        self.repeated(id, Cardinality::NONE_OR_MORE)
    }

    /// Matches and consumes, but leaves the text out of the enclosing match.
    pub fn consume(&mut self, id: RuleId) -> RuleId {
        self.modified(id, |b| b.with_kind(Kind::Skipping))
    }

    pub fn not(&mut self, id: RuleId) -> RuleId {
        self.modified(id, Behaviour::negate)
    }

    pub fn lookahead(&mut self, id: RuleId) -> RuleId {
        self.modified(id, Behaviour::lookahead)
    }

    /// Makes `id` produce a node for `token`.
    pub fn structural(&mut self, id: RuleId, token: Token) -> RuleId {
        self.derive(id, Behaviour::structural(token), RuleAnnotations::new())
    }

    /// Makes `id` produce a node for `token`, with annotations.
    pub fn structural_annotated(
        &mut self,
        id: RuleId,
        token: Token,
        annotations: RuleAnnotations,
    ) -> RuleId {
        self.derive(id, Behaviour::structural(token), annotations)
    }

    /// Same match and behaviour as `id`, different annotations.
    pub fn annotated(&mut self, id: RuleId, annotations: RuleAnnotations) -> RuleId {
        let rule = self.get(id);
        let behaviour = rule.behaviour.clone();
        let merged = rule.annotations.merged(&annotations);
        let produces = rule.produces.clone();
        let kind = rule.kind.clone();
        self.add(Rule {
            kind,
            behaviour,
            annotations: merged,
            produces,
        })
    }

    /// Renders a rule in STLR notation.
    pub fn display(&self, id: RuleId) -> RuleDisplay<'_> {
        RuleDisplay { rules: self, id }
    }
}

/// STLR rendering of a rule; named (structural) sub-rules print as their
/// token so recursive grammars terminate.
pub struct RuleDisplay<'a> {
    rules: &'a RuleSet,
    id: RuleId,
}

impl RuleDisplay<'_> {
    fn write(&self, f: &mut fmt::Formatter<'_>, id: RuleId, top: bool) -> fmt::Result {
        let rule = self.rules.get(id);

        if !top {
            if let Kind::Structural(token) = &rule.behaviour.kind {
                write!(f, "{}", rule.annotations)?;
                rule.behaviour.fmt_prefix(f)?;
                return write!(f, "{}{}", token, rule.behaviour.cardinality);
            }
        }

        write!(f, "{}", rule.annotations)?;
        rule.behaviour.fmt_prefix(f)?;
        match &rule.kind {
            RuleKind::Terminal(text) => write!(f, "{:?}", text)?,
            RuleKind::TerminalFromSet(set) => write!(f, "{}", set)?,
            RuleKind::TerminalUntil(text) => write!(f, "(!{:?})*", text)?,
            RuleKind::TerminalUntilSet(set) => write!(f, "(!{})*", set)?,
            RuleKind::Regex(regex) => {
                let pattern = regex.as_str();
                let inner = pattern
                    .strip_prefix("^(?:")
                    .and_then(|p| p.strip_suffix(')'))
                    .unwrap_or(pattern);
                write!(f, "/{}/", inner)?
            }
            RuleKind::Custom { description, .. } => write!(f, "<{}>", description)?,
            RuleKind::Sequence(ids) | RuleKind::Choice(ids) => {
                let separator = if matches!(rule.kind, RuleKind::Sequence(_)) {
                    " "
                } else {
                    " | "
                };
                write!(f, "(")?;
                for (index, &child) in ids.iter().enumerate() {
                    if index > 0 {
                        write!(f, "{}", separator)?;
                    }
                    self.write(f, child, false)?;
                }
                write!(f, ")")?;
            }
            RuleKind::Reference(target) => self.write(f, *target, false)?,
            RuleKind::Inherit(target) => write!(f, "{}", self.rules.get(*target).produces)?,
            RuleKind::Recursive(_) => write!(f, "{}", rule.produces)?,
        }
        write!(f, "{}", rule.behaviour.cardinality)
    }
}

impl fmt::Display for RuleDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write(f, self.id, true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn modifiers_copy_plain_terminals() {
        let mut rules = RuleSet::new();
        let x = rules.terminal("x");
        let many = rules.one_or_more(x);

        assert!(matches!(rules.get(many).kind, RuleKind::Terminal(_)));
        assert_eq!(rules.get(many).behaviour.cardinality, Cardinality::ONE_OR_MORE);
        assert_eq!(rules.get(x).behaviour.cardinality, Cardinality::ONE);
    }

    #[test]
    fn modifiers_wrap_everything_else() {
        let mut rules = RuleSet::new();
        let x = rules.terminal("x");
        let token = rules.token("item");
        let item = rules.structural(x, token);
        let items = rules.none_or_more(item);

        assert!(matches!(rules.get(items).kind, RuleKind::Reference(id) if id == item));
        assert_eq!(rules.get(items).behaviour.kind, Kind::Scanning);
    }

    #[test]
    fn placeholders_resolve_once() {
        let mut rules = RuleSet::new();
        let token = rules.token("expr");
        let placeholder = rules.recursive(token);
        assert!(rules.resolve(placeholder).is_err());

        let x = rules.terminal("x");
        rules.resolve_recursive(placeholder, x).unwrap();
        assert_eq!(rules.resolve(placeholder).unwrap().0, x);
        assert!(rules.resolve_recursive(placeholder, x).is_err());
    }

    #[test]
    fn display_uses_stlr_notation() {
        let mut rules = RuleSet::new();
        let quote = rules.terminal("\"");
        let skip = rules.consume(quote);
        let not_quote = rules.not(quote);
        let body = rules.one_or_more(not_quote);
        let sequence = rules.sequence(vec![skip, body, skip]);

        assert_eq!(
            rules.display(sequence).to_string(),
            r#"(-"\"" !"\""+ -"\"")"#
        );
    }
}
