// tests/ast_tests.rs

mod common;

use common::parse;
use lodestar::ast::{make_sequence, Dispatch, Hooks, Node, Tag, Transformer};
use lodestar::errors::Result;
use lodestar::syntax::Span;

fn number(value: i64) -> Node {
    Node::builder(Tag::Number, Span::default())
        .attr("value", value)
        .build()
}

#[test]
fn updates_leave_the_original_untouched() {
    let original = number(1);
    let updated = original.with_attr("value", 2i64).with_attr("extra", true);
    assert_eq!(original.int("value"), Some(1));
    assert!(!original.has("extra"));
    assert_eq!(updated.int("value"), Some(2));
    assert_eq!(updated.bool("extra"), Some(true));

    let removed = updated.without_attr("extra");
    assert!(!removed.has("extra"));
    assert!(Node::ptr_eq(&original, &original.without_attr("missing")));
}

#[test]
fn make_sequence_with_no_elements_returns_the_rest() {
    assert!(make_sequence(Tag::Stmts, vec![], None).is_none());
    let rest = make_sequence(Tag::Stmts, vec![number(3)], None);
    let joined = make_sequence(Tag::Stmts, vec![number(1), number(2)], rest).unwrap();
    let values: Vec<i64> = joined.elements().iter().filter_map(|n| n.int("value")).collect();
    assert_eq!(values, vec![1, 2, 3]);
}

#[test]
fn non_sequences_have_no_elements() {
    assert!(number(1).elements().is_empty());
}

struct Counter {
    entered: Vec<i64>,
}

impl Counter {
    fn enter_number(&mut self, node: Node) -> Result<Option<Node>> {
        self.entered.push(node.int("value").unwrap_or_default());
        Ok(Some(node))
    }

    fn double(&mut self, node: Node) -> Result<Option<Node>> {
        let value = node.int("value").unwrap_or_default();
        Ok(Some(node.with_attr("value", value * 2)))
    }
}

#[test]
fn hooks_dispatch_on_tag() {
    let hooks = Hooks::new()
        .on_enter(Tag::Number, Counter::enter_number)
        .on_exit(Tag::Number, Counter::double);
    let seq = make_sequence(Tag::Args, vec![number(1), number(2)], None).unwrap();

    let mut counter = Counter { entered: Vec::new() };
    let out = seq
        .transform(&mut Dispatch::new(&mut counter, &hooks))
        .unwrap()
        .unwrap();

    assert_eq!(counter.entered, vec![1, 2]);
    let values: Vec<i64> = out.elements().iter().filter_map(|n| n.int("value")).collect();
    assert_eq!(values, vec![2, 4]);
    let before: Vec<i64> = seq.elements().iter().filter_map(|n| n.int("value")).collect();
    assert_eq!(before, vec![1, 2]);
}

#[test]
fn untouched_subtrees_are_shared() {
    struct RenameMain;
    impl Transformer for RenameMain {
        fn exit(&mut self, node: Node) -> Result<Option<Node>> {
            if node.is(Tag::Fun) && node.str("name") == Some("main") {
                return Ok(Some(node.with_attr("name", "start")));
            }
            Ok(Some(node))
        }
    }

    let tree = parse("fun helper() endfun\nfun main() endfun\n");
    let out = tree.transform(&mut RenameMain).unwrap().unwrap();

    let before = tree.select(&["body", "item"]);
    let after = out.select(&["body", "item"]);
    assert!(Node::ptr_eq(&before[0], &after[0]));
    assert!(!Node::ptr_eq(&before[1], &after[1]));
    assert_eq!(after[1].str("name"), Some("start"));
    assert_eq!(before[1].str("name"), Some("main"));
}

#[test]
fn display_is_an_indented_s_expression() {
    let call = Node::builder(Tag::Call, Span::default())
        .attr("target", Node::builder(Tag::Ident, Span::default()).attr("name", "f").build())
        .build();
    assert_eq!(call.to_string(), "(call\n  :target (ident :name \"f\"))");
}

#[test]
fn strip_spans_makes_positions_irrelevant() {
    let a = parse("fun main() endfun\n");
    let b = parse("\n\n   fun   main()\n endfun\n");
    assert_eq!(a, b);
}
