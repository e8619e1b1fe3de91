//! Engine behaviour over hand-built rule sets.

use proptest::prelude::*;
use stlr::{
    AstBuilder, Cardinality, Engine, EngineConfig, ErrorKind, LexicalCursor, MatchResult, Node,
    RuleId, RuleSet, Source,
};

fn evaluate(
    rules: &RuleSet,
    id: RuleId,
    input: &str,
) -> (MatchResult, usize, AstBuilder<Node>) {
    let source = Source::new(input);
    let mut cursor = LexicalCursor::new(source.clone());
    let mut ir = AstBuilder::new(source, true);
    let result = Engine::new(rules, EngineConfig::default())
        .evaluate(id, &mut cursor, &mut ir)
        .unwrap();
    (result, cursor.position(), ir)
}

/// `list = (pair | "a" "c")+` with `pair = "a" "b"`; alternatives share a
/// prefix so the memo and backtracking both get exercised.
fn list_grammar() -> (RuleSet, RuleId) {
    let mut rules = RuleSet::new();
    let a = rules.terminal("a");
    let b = rules.terminal("b");
    let c = rules.terminal("c");

    let ab = rules.sequence(vec![a, b]);
    let pair_token = rules.token("pair");
    let pair = rules.structural(ab, pair_token);
    let ac = rules.sequence(vec![a, c]);
    let item = rules.choice(vec![pair, ac]);
    let items = rules.one_or_more(item);
    let list_token = rules.token("list");
    let list = rules.structural(items, list_token);
    (rules, list)
}

#[test]
fn first_alternative_wins() {
    let mut rules = RuleSet::new();
    let a = rules.terminal("a");
    let ab = rules.terminal("ab");
    let choice = rules.choice(vec![a, ab]);

    let (result, position, _) = evaluate(&rules, choice, "ab");
    assert_eq!(result, MatchResult::Consumed(0..1));
    assert_eq!(position, 1);
}

#[test]
fn repetition_does_not_give_back() {
    let mut rules = RuleSet::new();
    let a = rules.terminal("a");
    let many = rules.none_or_more(a);
    let last = rules.terminal("a");
    let sequence = rules.sequence(vec![many, last]);

    let (result, position, _) = evaluate(&rules, sequence, "aaa");
    assert_eq!(result, MatchResult::Failure(0));
    assert_eq!(position, 0);
}

#[test]
fn optional_matches_once_or_is_ignorable() {
    let mut rules = RuleSet::new();
    let x = rules.terminal("x");
    let token = rules.token("x");
    let node = rules.structural(x, token);
    let maybe = rules.optional(node);

    let (result, position, ir) = evaluate(&rules, maybe, "y");
    assert_eq!(result, MatchResult::IgnorableFailure(0));
    assert_eq!(position, 0);
    assert!(ir.nodes().is_empty());

    let (result, position, ir) = evaluate(&rules, maybe, "x");
    assert!(result.is_success());
    assert_eq!(position, 1);
    assert_eq!(ir.nodes().len(), 1);
}

#[test]
fn structural_children_nest() {
    let (rules, list) = list_grammar();
    let (result, position, ir) = evaluate(&rules, list, "abacab");

    assert_eq!(result, MatchResult::Success(0..6));
    assert_eq!(position, 6);
    let root = &ir.nodes()[0];
    assert_eq!(root.token.name(), Some("list"));
    let children: Vec<_> = root.children.iter().map(|n| n.range.clone()).collect();
    assert_eq!(children, vec![0..2, 4..6]);
}

#[test]
fn regex_and_until_terminals() {
    let mut rules = RuleSet::new();
    let number = rules.regex("[0-9]+").unwrap();
    let (result, _, _) = evaluate(&rules, number, "123x");
    assert_eq!(result, MatchResult::Consumed(0..3));

    let open = rules.terminal("/*");
    let body = rules.until("*/");
    let close = rules.terminal("*/");
    let comment = rules.sequence(vec![open, body, close]);
    let (result, _, _) = evaluate(&rules, comment, "/* note */rest");
    assert_eq!(result, MatchResult::Consumed(0..10));

    let (result, position, _) = evaluate(&rules, comment, "/* open");
    assert_eq!(result, MatchResult::Failure(0));
    assert_eq!(position, 0);
}

#[test]
fn custom_matchers_scan_through_the_cursor() {
    let mut rules = RuleSet::new();
    let even = rules.custom("even digit", |cursor: &mut LexicalCursor| {
        let digit = cursor.current().and_then(|c| c.to_digit(10));
        match digit {
            Some(d) if d % 2 == 0 => Ok(cursor.scan_next().is_ok()),
            Some(_) => Ok(false),
            None => Err("not a digit".into()),
        }
    });
    let evens = rules.one_or_more(even);

    let (result, _, _) = evaluate(&rules, evens, "2461");
    assert_eq!(result, MatchResult::Consumed(0..3));

    let (result, _, ir) = evaluate(&rules, evens, "x");
    assert_eq!(result, MatchResult::Failure(0));
    let causes: Vec<_> = ir.errors()[0].all_causes();
    assert!(causes
        .iter()
        .any(|cause| matches!(cause.kind, ErrorKind::Undefined { .. })));
}

#[test]
fn bounded_cardinality_in_sequence() {
    let mut rules = RuleSet::new();
    let digit = rules.one_of(stlr::CharacterSet::from_name("decimalDigits").unwrap());
    let two = rules.repeated(digit, Cardinality::new(2, Some(2)));
    let dash = rules.terminal("-");
    let date = rules.sequence(vec![two, dash, two]);

    let (result, _, _) = evaluate(&rules, date, "12-34");
    assert_eq!(result, MatchResult::Consumed(0..5));
    let (result, _, _) = evaluate(&rules, date, "123-4");
    assert_eq!(result, MatchResult::Failure(0));
}

#[test]
fn unresolved_placeholders_are_errors() {
    let mut rules = RuleSet::new();
    let token = rules.token("later");
    let placeholder = rules.recursive(token);

    let source = Source::new("x");
    let mut cursor = LexicalCursor::new(source.clone());
    let mut ir: AstBuilder<Node> = AstBuilder::new(source, true);
    let error = Engine::new(&rules, EngineConfig::default())
        .evaluate(placeholder, &mut cursor, &mut ir)
        .unwrap_err();
    assert!(matches!(error.kind, ErrorKind::Undefined { .. }));
    assert_eq!(cursor.depth(), 0);
}

proptest! {
    #[test]
    fn failed_rules_restore_position(input in "[abc]{0,12}") {
        let (rules, _) = list_grammar();
        let source = Source::new(input.as_str());
        let engine = Engine::new(&rules, EngineConfig::default());

        for (id, _) in rules.iter() {
            for start in 0..=source.len() {
                let mut cursor = LexicalCursor::new(source.clone());
                let mut ir: AstBuilder<Node> = AstBuilder::new(source.clone(), true);
                cursor.seek(start);

                let result = engine.evaluate(id, &mut cursor, &mut ir).unwrap();
                prop_assert_eq!(cursor.depth(), 0);
                if result.is_success() {
                    prop_assert_eq!(cursor.position(), result.end());
                } else {
                    prop_assert_eq!(cursor.position(), start);
                    prop_assert!(ir.nodes().is_empty());
                }
            }
        }
    }

    #[test]
    fn memoized_evaluation_is_idempotent(input in "[abc]{0,12}") {
        let (rules, list) = list_grammar();
        let source = Source::new(input.as_str());
        let engine = Engine::new(&rules, EngineConfig::default());
        let mut cursor = LexicalCursor::new(source.clone());
        let mut memoized: AstBuilder<Node> = AstBuilder::new(source.clone(), true);
        let mut plain: AstBuilder<Node> = AstBuilder::new(source.clone(), false);

        for start in 0..=source.len() {
            cursor.seek(start);
            let first = engine.evaluate(list, &mut cursor, &mut memoized).unwrap();
            let first_end = cursor.position();
            let first_nodes = memoized.drain_nodes();

            cursor.seek(start);
            let second = engine.evaluate(list, &mut cursor, &mut memoized).unwrap();
            prop_assert_eq!(&first, &second);
            prop_assert_eq!(cursor.position(), first_end);
            prop_assert_eq!(&memoized.drain_nodes(), &first_nodes);

            cursor.seek(start);
            let uncached = engine.evaluate(list, &mut cursor, &mut plain).unwrap();
            prop_assert_eq!(&uncached, &first);
            prop_assert_eq!(&plain.drain_nodes(), &first_nodes);
        }
        prop_assert!(memoized.memo_stats().hits > source.len());
    }
}
