// tests/parser_tests.rs

mod common;

use common::parse;
use lodestar::ast::{Node, Tag};
use lodestar::engine::parse_source;
use lodestar::errors::ErrorKind;
use lodestar::syntax::Span;

fn items(tree: &Node) -> Vec<Node> {
    tree.select(&["body", "item"])
}

/// The value expression of the first item, a `constant`.
fn constant_value(text: &str) -> Node {
    let tree = parse(&format!("constant c: u8 = {}\n", text));
    let item = items(&tree).remove(0);
    assert!(item.is(Tag::Constant), "{item}");
    item.node("value").cloned().unwrap()
}

fn number(node: &Node) -> i64 {
    assert!(node.is(Tag::Number), "{node}");
    node.int("value").unwrap()
}

// ---
// Shapes
// ---

#[test]
fn empty_function() {
    let tree = parse("fun main() endfun\n");
    let items = items(&tree);
    assert_eq!(items.len(), 1);
    assert!(items[0].is(Tag::Fun));
    assert_eq!(items[0].str("name"), Some("main"));
    assert!(!items[0].has("params"));
    assert!(!items[0].has("body"));
    assert!(!items[0].has("ret"));
}

#[test]
fn empty_source_is_an_empty_unit() {
    let tree = parse("  // nothing here\n");
    assert!(tree.is(Tag::Unit));
    assert!(!tree.has("body"));
}

#[test]
fn product_binds_tighter_than_sum() {
    let value = constant_value("1 + 2 * 3");
    assert_eq!(value.str("op"), Some("+"));
    assert_eq!(number(value.node("lhs").unwrap()), 1);
    let rhs = value.node("rhs").unwrap();
    assert_eq!(rhs.str("op"), Some("*"));
    assert_eq!(number(rhs.node("lhs").unwrap()), 2);
    assert_eq!(number(rhs.node("rhs").unwrap()), 3);
}

#[test]
fn subtraction_is_left_associative() {
    let value = constant_value("1 - 2 - 3");
    assert_eq!(value.str("op"), Some("-"));
    assert_eq!(number(value.node("rhs").unwrap()), 3);
    let lhs = value.node("lhs").unwrap();
    assert_eq!(lhs.str("op"), Some("-"));
    assert_eq!(number(lhs.node("lhs").unwrap()), 1);
    assert_eq!(number(lhs.node("rhs").unwrap()), 2);
}

#[test]
fn parentheses_are_kept_in_the_raw_tree() {
    let value = constant_value("(1 + 2) * 3");
    assert_eq!(value.str("op"), Some("*"));
    let lhs = value.node("lhs").unwrap();
    assert!(lhs.is(Tag::Paren));
    assert_eq!(lhs.node("expr").and_then(|e| e.str("op")), Some("+"));
}

#[test]
fn number_literal_bases() {
    assert_eq!(number(&constant_value("$ff")), 255);
    assert_eq!(number(&constant_value("0x10")), 16);
    assert_eq!(number(&constant_value("0b101")), 5);
    assert_eq!(number(&constant_value("42")), 42);
}

#[test]
fn function_with_parameters_and_statements() {
    let text = "\
fun add(a: u8, b: u8) -> u8
  let mut total: u8 = a
  total = total + b
  return total
endfun
";
    let tree = parse(text);
    let fun = items(&tree).remove(0);
    let params = fun.select(&["params", "param"]);
    let names: Vec<_> = params.iter().map(|p| p.str("name").unwrap()).collect();
    assert_eq!(names, vec!["a", "b"]);
    assert_eq!(fun.node("ret").and_then(|r| r.str("name")), Some("u8"));

    let stmts = fun.select(&["body", "stmt"]);
    let tags: Vec<Tag> = stmts.iter().map(Node::tag).collect();
    assert_eq!(tags, vec![Tag::Let, Tag::Set, Tag::Return]);
    assert_eq!(stmts[0].str("storage"), Some("mut"));
}

#[test]
fn member_calls_and_dereferences() {
    let text = "\
use mem
fun main()
  @mem.addr8($d020) = 1
endfun
";
    let tree = parse(text);
    let items = items(&tree);
    assert!(items[0].is(Tag::Use));
    assert_eq!(items[0].str("name"), Some("mem"));

    let set = items[1].select(&["body", "stmt"]).remove(0);
    let lvalue = set.node("lvalue").unwrap();
    assert!(lvalue.is(Tag::Deref));
    let call = lvalue.node("target").unwrap();
    assert!(call.is(Tag::Call));
    let member = call.node("target").unwrap();
    assert!(member.is(Tag::Member));
    assert_eq!(member.str("name"), Some("addr8"));
    assert_eq!(call.select(&["args", "arg"]).len(), 1);
}

#[test]
fn literal_addresses_as_assignment_targets() {
    let tree = parse("fun main()\n  @$d020 = 1\n  @($fb) = 2\nendfun\n");
    let stmts = items(&tree)[0].select(&["body", "stmt"]);
    assert_eq!(stmts.len(), 2);

    let direct = stmts[0].node("lvalue").unwrap();
    assert!(direct.is(Tag::Deref), "{direct}");
    assert_eq!(number(direct.node("target").unwrap()), 0xd020);

    let wrapped = stmts[1].node("lvalue").unwrap().node("target").unwrap();
    assert!(wrapped.is(Tag::Paren), "{wrapped}");
    assert_eq!(number(wrapped.node("expr").unwrap()), 0xfb);
}

#[test]
fn reference_types() {
    let tree = parse("let p: &u8 = 0\n");
    let ty = items(&tree)[0].node("ty").cloned().unwrap();
    assert!(ty.is(Tag::TypeRef));
    assert_eq!(ty.node("target").and_then(|t| t.str("name")), Some("u8"));
}

#[test]
fn string_literals_and_escapes() {
    let tree = parse("constant s: u8 = \"a\\tb\\x41\"\n");
    let value = items(&tree)[0].node("value").cloned().unwrap();
    assert!(value.is(Tag::Str));
    assert_eq!(value.str("value"), Some("a\tbA"));
}

#[test]
fn tokens_after_a_string_use_the_default_mode() {
    let tree = parse("constant s: u8 = \"ab\"\nlet x: u8 = 1\n");
    let items = items(&tree);
    assert_eq!(items.len(), 2);
    assert_eq!(items[0].node("value").and_then(|v| v.str("value")), Some("ab"));
    assert!(items[1].is(Tag::Let));
    assert_eq!(items[1].str("name"), Some("x"));

    let same_line = parse("constant s: u8 = \"\" let x: u8 = 1\n");
    assert_eq!(same_line.select(&["body", "item"]).len(), 2);
}

#[test]
fn strings_in_argument_lists() {
    let tree = parse("fun main()\n  f(\"a b\", \"\\n\")\n  g()\nendfun\n");
    let stmts = items(&tree)[0].select(&["body", "stmt"]);
    assert_eq!(stmts.len(), 2);
    let args = stmts[0].select(&["args", "arg"]);
    let texts: Vec<_> = args.iter().map(|a| a.str("value")).collect();
    assert_eq!(texts, vec![Some("a b"), Some("\n")]);
}

// ---
// Comments
// ---

#[test]
fn nested_block_comments_are_skipped() {
    let plain = parse("fun main() endfun\n");
    let commented = parse("/* outer /* inner */ still comment */\nfun main() /* x */ endfun // trailing\n");
    assert_eq!(plain, commented);
}

#[test]
fn unclosed_block_comment_is_reported() {
    let err = parse_source("/* never /* closed */\nfun main() endfun\n").unwrap_err();
    match err.kind {
        ErrorKind::Unclosed { open, .. } => assert_eq!(open, "/*"),
        other => panic!("unexpected error: {other:?}"),
    }
}

// ---
// Errors
// ---

#[test]
fn unclosed_parenthesis_points_at_the_opener() {
    let err = parse_source("fun main()\n  f(1\n").unwrap_err();
    match err.kind {
        ErrorKind::Unclosed { open, opened_at } => {
            assert_eq!(open, "(");
            assert_eq!(opened_at, Span::new(2, 3, 2, 4));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(err.help.unwrap().contains(')'));
}

#[test]
fn unclosed_function_names_endfun() {
    let err = parse_source("fun main()\n  return\n").unwrap_err();
    match err.kind {
        ErrorKind::Unclosed { open, opened_at } => {
            assert_eq!(open, "fun");
            assert_eq!(opened_at.start(), (1, 0));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn unexpected_token_lists_alternatives() {
    let err = parse_source("fun main( endfun\n").unwrap_err();
    match err.kind {
        ErrorKind::UnexpectedToken { found, expected } => {
            assert_eq!(found, "`endfun`");
            assert!(expected.contains(&"`)`".to_string()), "{expected:?}");
            assert!(expected.contains(&"`IDENT`".to_string()), "{expected:?}");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn invalid_characters_are_lex_errors() {
    let err = parse_source("fun main() ? endfun\n").unwrap_err();
    assert!(matches!(err.kind, ErrorKind::Lex { .. }), "{:?}", err.kind);
    assert_eq!(err.span.map(|s| s.start()), Some((1, 11)));
}

// ---
// Determinism
// ---

#[test]
fn parsing_is_deterministic() {
    let text = "constant k: u8 = 3\nfun main()\n  let x: u8 = k * 2\nendfun\n";
    let first = parse_source(text).unwrap();
    let second = parse_source(text).unwrap();
    assert_eq!(first, second);
    assert_eq!(first.to_string(), second.to_string());
}
