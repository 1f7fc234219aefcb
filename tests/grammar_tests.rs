// tests/grammar_tests.rs

use std::collections::BTreeSet;

use lodestar::errors::ErrorKind;
use lodestar::syntax::grammar::{nt, t, Grammar, Rule, Terminal};
use lodestar::syntax::table::ParseTable;

fn kinds(names: &[&str]) -> BTreeSet<Terminal> {
    names.iter().map(|n| Terminal::kind(*n)).collect()
}

/// `sum -> sum + term | term`, `term -> n | ( sum )`.
fn sums() -> Vec<Rule> {
    vec![
        Rule::new("start", [nt("sum")]),
        Rule::new("sum", [nt("sum"), t("+"), nt("term")]),
        Rule::new("sum", [nt("term")]),
        Rule::new("term", [t("n")]),
        Rule::new("term", [t("("), nt("sum"), t(")")]),
    ]
}

#[test]
fn first_sets_of_left_recursive_grammar() {
    let grammar = Grammar::new("start", sums(), [Terminal::Eof]).unwrap();
    let first = grammar.first_sets();
    assert_eq!(first["sum"], kinds(&["n", "("]));
    assert_eq!(first["term"], kinds(&["n", "("]));
    assert_eq!(first["start"], kinds(&["n", "("]));
}

#[test]
fn follow_sets_include_end_symbols() {
    let grammar = Grammar::new("start", sums(), [Terminal::Eof]).unwrap();
    let follow = grammar.follow_sets();
    let mut expected = kinds(&["+", ")"]);
    expected.insert(Terminal::Eof);
    assert_eq!(follow["sum"], expected);
    assert_eq!(follow["term"], expected);
}

#[test]
fn nullable_nonterminals_carry_the_empty_marker() {
    let rules = vec![
        Rule::new("start", [nt("list")]),
        Rule::new("list", [nt("list"), t("x")]),
        Rule::empty("list"),
    ];
    let grammar = Grammar::new("start", rules, [Terminal::Eof]).unwrap();
    let first = grammar.first_sets();
    assert!(first["list"].contains(&Terminal::Empty));
    assert!(first["list"].contains(&Terminal::kind("x")));
}

#[test]
fn first_sets_are_stable_across_calls() {
    let grammar = Grammar::new("start", sums(), [Terminal::Eof]).unwrap();
    assert_eq!(grammar.first_sets(), grammar.first_sets());
    assert_eq!(grammar.follow_sets(), grammar.follow_sets());
}

#[test]
fn structural_problems_are_reported_together() {
    let rules = vec![
        Rule::new("start", [nt("missing")]),
        Rule::new("start", [nt("also_missing")]),
    ];
    let err = Grammar::new("start", rules, [Terminal::Eof]).unwrap_err();
    match err.kind {
        ErrorKind::Grammar { problems } => {
            assert_eq!(problems.len(), 3, "{problems:?}");
            assert!(problems[0].contains("2 starting rules"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn missing_start_rule_is_an_error() {
    let err = Grammar::new("start", vec![Rule::new("other", [t("x")])], [Terminal::Eof]).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::Grammar { .. }));
}

#[test]
fn ambiguous_grammar_reports_conflict() {
    let rules = vec![
        Rule::new("start", [nt("e")]),
        Rule::new("e", [nt("e"), t("+"), nt("e")]),
        Rule::new("e", [t("n")]),
    ];
    let grammar = Grammar::new("start", rules, [Terminal::Eof]).unwrap();
    let err = ParseTable::build(grammar).unwrap_err();
    match err.kind {
        ErrorKind::Grammar { problems } => {
            assert!(problems.iter().any(|p| p.contains("shift/reduce")), "{problems:?}");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn precedence_resolves_the_same_grammar() {
    let rules = vec![
        Rule::new("start", [nt("e")]),
        Rule::new("e", [nt("e"), t("+"), nt("e")]).prec(1),
        Rule::new("e", [t("n")]).prec(2),
    ];
    let grammar = Grammar::new("start", rules, [Terminal::Eof]).unwrap();
    assert!(ParseTable::build(grammar).is_ok());
}
