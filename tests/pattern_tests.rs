// tests/pattern_tests.rs

use lodestar::ast::{make_sequence, Node, Tag, Value};
use lodestar::errors::{CompileError, ErrorKind, Result};
use lodestar::patterns::predicate;
use lodestar::patterns::{
    any, capture, eq, node, require, sequence, when, Bindings, Direction, Pattern, Rule, RuleSet,
    SeqItem,
};
use lodestar::syntax::Span;

fn number(value: i64) -> Node {
    Node::builder(Tag::Number, Span::point(1, 0))
        .attr("value", value)
        .build()
}

fn binop(op: &str, lhs: Node, rhs: Node) -> Node {
    Node::builder(Tag::Binop, Span::new(3, 4, 3, 9))
        .attr("op", op)
        .attr("lhs", lhs)
        .attr("rhs", rhs)
        .build()
}

fn matches(pattern: impl Into<Pattern>, node: &Node) -> Option<Bindings> {
    let predicate = predicate::compile(&pattern.into());
    let mut bindings = Bindings::default();
    predicate(&Value::Node(node.clone()), &mut bindings)
        .unwrap()
        .then_some(bindings)
}

#[test]
fn exhaustive_patterns_reject_extra_attributes() {
    let plain = number(1);
    let typed = plain.with_attr("type", lodestar::types::TypeInfo::U8);
    let pattern = node(Tag::Number).attr("value", any()).exhaustive();
    assert!(matches(pattern.clone(), &plain).is_some());
    assert!(matches(pattern, &typed).is_none());
    assert!(matches(node(Tag::Number).attr("value", any()), &typed).is_some());
}

#[test]
fn missing_attributes_do_not_match() {
    let pattern = node(Tag::Number).attr("type", any());
    assert!(matches(pattern, &number(1)).is_none());
}

#[test]
fn captures_nested_values() {
    let tree = binop("+", number(1), number(2));
    let pattern = node(Tag::Binop)
        .attr("op", capture("op", eq("+")))
        .attr("lhs", node(Tag::Number).attr("value", capture("l", any())))
        .attr("rhs", capture("r", node(Tag::Number)))
        .span("at");
    let b = matches(pattern, &tree).unwrap();
    assert_eq!(b.str("op").unwrap(), "+");
    assert_eq!(b.int("l").unwrap(), 1);
    assert_eq!(b.node("r").unwrap().int("value"), Some(2));
    assert_eq!(b.span("at").unwrap(), Span::new(3, 4, 3, 9));
    assert!(b.int("op").is_err());
}

#[test]
fn when_runs_a_custom_test() {
    fn even(value: &Value) -> bool {
        value.as_int().map_or(false, |n| n % 2 == 0)
    }
    let pattern = node(Tag::Number).attr("value", when(even));
    assert!(matches(pattern.clone(), &number(4)).is_some());
    assert!(matches(pattern, &number(5)).is_none());
}

#[test]
fn many_may_match_nothing() {
    let seq = make_sequence(Tag::Stmts, vec![number(1)], None).unwrap();
    let pattern = sequence(
        vec![
            SeqItem::Many("before".into(), node(Tag::Ident).into()),
            SeqItem::One(capture("only", node(Tag::Number))),
        ],
        None,
    );
    let b = matches(pattern, &seq).unwrap();
    assert!(b.nodes("before").unwrap().is_empty());
    assert_eq!(b.node("only").unwrap().int("value"), Some(1));
}

// ---
// Rule sets
// ---

fn fold(b: &Bindings, matched: &Node) -> Result<Option<Node>> {
    let value = b.int("l")? + b.int("r")?;
    Ok(Some(
        Node::builder(Tag::Number, matched.span())
            .attr("value", value)
            .build(),
    ))
}

fn folding(direction: Direction) -> RuleSet {
    RuleSet::compile(
        "fold",
        direction,
        vec![Rule::new(
            node(Tag::Binop)
                .attr("op", eq("+"))
                .attr("lhs", node(Tag::Number).attr("value", capture("l", any())))
                .attr("rhs", node(Tag::Number).attr("value", capture("r", any()))),
            fold,
        )],
    )
}

#[test]
fn ascending_rules_see_rewritten_children() {
    let tree = binop("+", binop("+", number(1), number(2)), number(3));
    let out = folding(Direction::Ascending).run(&tree).unwrap();
    assert!(out.is(Tag::Number));
    assert_eq!(out.int("value"), Some(6));
}

#[test]
fn descending_rules_see_the_original_node() {
    let tree = binop("+", binop("+", number(1), number(2)), number(3));
    let out = folding(Direction::Descending).run(&tree).unwrap();
    assert!(out.is(Tag::Binop));
    assert_eq!(out.node("lhs").and_then(|n| n.int("value")), Some(3));
}

#[test]
fn first_matching_rule_wins() {
    fn zero(_: &Bindings, m: &Node) -> Result<Option<Node>> {
        Ok(Some(m.with_attr("value", 0i64)))
    }
    fn one(_: &Bindings, m: &Node) -> Result<Option<Node>> {
        Ok(Some(m.with_attr("value", 1i64)))
    }
    let rules = RuleSet::compile(
        "order",
        Direction::Ascending,
        vec![
            Rule::new(node(Tag::Number), zero),
            Rule::new(node(Tag::Number), one),
        ],
    );
    assert_eq!(rules.apply(number(9)).unwrap().unwrap().int("value"), Some(0));
}

#[test]
fn unmatched_trees_are_returned_unchanged() {
    let tree = binop("-", number(1), number(2));
    let out = folding(Direction::Ascending).run(&tree).unwrap();
    assert!(Node::ptr_eq(&tree, &out));
}

#[test]
fn required_mismatch_is_located_at_the_node() {
    fn not_plus(_: &Value) -> CompileError {
        CompileError::new(ErrorKind::Assembly {
            message: "only + is supported".into(),
        })
    }
    let rules = RuleSet::compile(
        "strict",
        Direction::Ascending,
        vec![Rule::new(node(Tag::Binop).attr("op", require(eq("+"), not_plus)), fold)],
    );
    let err = rules.run(&binop("*", number(1), number(2))).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::Assembly { .. }));
    assert_eq!(err.span, Some(Span::new(3, 4, 3, 9)));
}
