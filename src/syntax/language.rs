//! The lode language: lexer rules, grammar and raw tree construction.
//!
//! Both parsers (the main one and the secondary parser for `/* */`
//! comments) are generated once per process and shared.

use std::sync::Arc;

use once_cell::sync::Lazy;

use crate::ast::{make_sequence, Node, Tag};
use crate::errors::{CompileError, ErrorKind, Result};
use crate::syntax::grammar::{nt, t, Grammar, Rule, Slot, Terminal};
use crate::syntax::lexer::{LexRule, LexerTable};
use crate::syntax::parser::{Child, Parser, Reduction};
use crate::syntax::stream::{Channel, TextStream, Token};
use crate::syntax::table::ParseTable;

pub const DEFAULT_MODE: &str = "default";
pub const STRING_MODE: &str = "string";
pub const COMMENT_MODE: &str = "comment";
pub const COMMENT_CHANNEL: &str = "comment";
pub const WHITESPACE_CHANNEL: &str = "whitespace";

const KEYWORDS: &[&str] = &[
    "use", "constant", "let", "mut", "stash", "fun", "endfun", "return",
];

pub const TYPE_NAMES: &[&str] = &[
    "u8", "u16", "u24", "u32", "i8", "i16", "i24", "i32", "void",
];

const PUNCTUATION: &[(&str, &str)] = &[
    (r"->", "->"),
    (r":", ":"),
    (r"=", "="),
    (r"\(", "("),
    (r"\)", ")"),
    (r",", ","),
    (r"\.", "."),
    (r"\+", "+"),
    (r"-", "-"),
    (r"\*", "*"),
    (r"@", "@"),
    (r"&", "&"),
    (r#"""#, "\""),
];

// ============================================================================
// LEXER
// ============================================================================

pub fn lexer_rules() -> Vec<LexRule> {
    let whitespace = Channel::hidden(WHITESPACE_CHANNEL);
    let comment = Channel::hidden(COMMENT_CHANNEL);

    let mut rules = vec![
        LexRule::new(DEFAULT_MODE, r"\s+", "WS").channel(whitespace.clone()),
        LexRule::new(DEFAULT_MODE, r"//[^\n]*", "LINE_COMMENT").channel(whitespace),
        LexRule::new(DEFAULT_MODE, r"/\*", "/*").channel(comment.clone()),
    ];
    for word in KEYWORDS.iter().chain(TYPE_NAMES) {
        rules.push(LexRule::new(DEFAULT_MODE, &format!(r"{}\b", word), word));
    }
    rules.push(LexRule::new(DEFAULT_MODE, r"[A-Za-z_][A-Za-z0-9_]*", "IDENT"));
    rules.push(LexRule::new(
        DEFAULT_MODE,
        r"0x[0-9A-Fa-f]+|0b[01]+|\$[0-9A-Fa-f]+|[0-9]+",
        "NUMBER",
    ));
    for (pattern, kind) in PUNCTUATION {
        rules.push(LexRule::new(DEFAULT_MODE, pattern, kind));
    }
    rules.push(LexRule::new(DEFAULT_MODE, r".", "invalid"));

    rules.extend([
        LexRule::new(STRING_MODE, r#"\\(?:[nt\\"]|x[0-9A-Fa-f]{2})"#, "ESCAPE"),
        LexRule::new(STRING_MODE, r#"[^"\\\n]+"#, "STRING_TEXT"),
        LexRule::new(STRING_MODE, r#"""#, "\""),
        LexRule::new(STRING_MODE, r"(?s).", "invalid"),
        LexRule::new(COMMENT_MODE, r"/\*", "/*").channel(comment.clone()),
        LexRule::new(COMMENT_MODE, r"\*/", "*/").channel(comment.clone()),
        LexRule::new(COMMENT_MODE, r"[^*/]+", "COMMENT_TEXT").channel(comment.clone()),
        LexRule::new(COMMENT_MODE, r"[*/]", "COMMENT_TEXT").channel(comment),
    ]);
    rules
}

// ============================================================================
// GRAMMAR
// ============================================================================

/// Tighter-binding levels; `return` without a value binds loosest so an
/// expression after it is always taken as the returned value.
const PREC_RETURN: u32 = 1;
const PREC_SUM: u32 = 10;
const PREC_PRODUCT: u32 = 20;
const PREC_UNARY: u32 = 30;
const PREC_POSTFIX: u32 = 40;
const PREC_ATOM: u32 = 50;

pub fn grammar_rules() -> Vec<Rule> {
    vec![
        // Items
        Rule::new("program", [nt("item_list")]).label("unit"),
        Rule::new("item_list", [nt("item_list"), nt("item")]).label("append"),
        Rule::empty("item_list").label("empty_list"),
        Rule::new("item", [t("use"), t("IDENT")]).label("use"),
        Rule::new(
            "item",
            [t("constant"), t("IDENT"), t(":"), nt("type"), t("="), nt("expr")],
        )
        .label("constant"),
        Rule::new("item", [nt("let_decl")]),
        Rule::new(
            "item",
            [
                t("fun"),
                t("IDENT"),
                t("("),
                nt("param_list"),
                t(")"),
                nt("ret"),
                nt("stmt_list"),
                t("endfun"),
            ],
        )
        .label("fun"),
        Rule::new("param_list", [nt("params")]),
        Rule::empty("param_list").label("empty_list"),
        Rule::new("params", [nt("param")]).label("singleton"),
        Rule::new("params", [nt("params"), t(","), nt("param")]).label("append_sep"),
        Rule::new("param", [t("IDENT"), t(":"), nt("type")]).label("param"),
        Rule::empty("ret").label("nothing"),
        Rule::new("ret", [t("->"), nt("type")]).label("second"),
        Rule::new(
            "let_decl",
            [
                t("let"),
                nt("storage"),
                t("IDENT"),
                t(":"),
                nt("type"),
                t("="),
                nt("expr"),
            ],
        )
        .label("let"),
        Rule::empty("storage").label("nothing"),
        Rule::new("storage", [Slot::any([t("mut"), t("stash")])]).label("text"),
        // Statements
        Rule::new("stmt_list", [nt("stmt_list"), nt("stmt")]).label("append"),
        Rule::empty("stmt_list").label("empty_list"),
        Rule::new("stmt", [nt("let_decl")]),
        Rule::new("stmt", [nt("lvalue"), t("="), nt("expr")]).label("set"),
        Rule::new("stmt", [nt("call")]),
        Rule::new("stmt", [t("return")]).label("return").prec(PREC_RETURN),
        Rule::new("stmt", [t("return"), nt("expr")]).label("return"),
        Rule::new("lvalue", [t("IDENT")]).label("ident"),
        Rule::new("lvalue", [t("@"), nt("address")]).label("deref"),
        Rule::new("address", [nt("postfix")]),
        Rule::new("address", [t("NUMBER")]).label("number"),
        Rule::new("address", [t("("), nt("expr"), t(")")]).label("paren"),
        // Types
        Rule::new("type", [Slot::any(TYPE_NAMES.iter().map(|name| t(name)))]).label("type_name"),
        Rule::new("type", [t("&"), nt("type")]).label("type_ref"),
        // Expressions
        Rule::new(
            "expr",
            [nt("expr").into(), Slot::any([t("+"), t("-")]), nt("expr").into()],
        )
        .label("binop")
        .prec(PREC_SUM),
        Rule::new("expr", [nt("expr"), t("*"), nt("expr")])
            .label("binop")
            .prec(PREC_PRODUCT),
        Rule::new("expr", [t("-"), nt("expr")]).label("neg").prec(PREC_UNARY),
        Rule::new("expr", [t("@"), nt("expr")]).label("deref").prec(PREC_UNARY),
        Rule::new("expr", [nt("postfix")]),
        Rule::new("expr", [t("NUMBER")]).label("number").prec(PREC_ATOM),
        Rule::new("expr", [nt("string_lit")]),
        Rule::new("expr", [t("("), nt("expr"), t(")")])
            .label("paren")
            .prec(PREC_ATOM),
        Rule::new("postfix", [t("IDENT")]).label("ident").prec(PREC_ATOM),
        Rule::new("postfix", [nt("postfix"), t("."), t("IDENT")])
            .label("member")
            .prec(PREC_POSTFIX),
        Rule::new("postfix", [nt("call")]),
        Rule::new("call", [nt("postfix"), t("("), nt("arg_list"), t(")")])
            .label("call")
            .prec(PREC_POSTFIX),
        Rule::empty("arg_list").label("empty_list"),
        Rule::new("arg_list", [nt("args")]),
        Rule::new("args", [nt("expr")]).label("singleton"),
        Rule::new("args", [nt("args"), t(","), nt("expr")]).label("append_sep"),
        // Strings
        Rule::new("string_lit", [t("\""), nt("string_body"), t("\"")])
            .label("string")
            .mode(DEFAULT_MODE)
            .prec(PREC_ATOM),
        Rule::empty("string_body").label("string_empty").mode(STRING_MODE),
        Rule::new(
            "string_body",
            [nt("string_body").into(), Slot::any([t("STRING_TEXT"), t("ESCAPE")])],
        )
        .label("string_piece")
        .mode(STRING_MODE),
    ]
}

/// The secondary grammar for nestable block comments.
pub fn comment_rules() -> Vec<Rule> {
    vec![
        Rule::new("comment", [nt("block")]),
        Rule::new("block", [t("/*"), nt("comment_body"), t("*/")]).mode(COMMENT_MODE),
        Rule::empty("comment_body").mode(COMMENT_MODE),
        Rule::new(
            "comment_body",
            [nt("comment_body").into(), Slot::any([t("COMMENT_TEXT"), nt("block")])],
        )
        .mode(COMMENT_MODE),
    ]
}

fn build_parser() -> Result<Parser> {
    let lexer = Arc::new(LexerTable::new(lexer_rules())?);

    let comment_grammar = Grammar::new("comment", comment_rules(), [Terminal::Empty])?;
    let comments = Parser::new(
        ParseTable::build(comment_grammar)?,
        lexer.clone(),
        Channel::hidden(COMMENT_CHANNEL),
    )
    .with_delimiters([("/*", "*/")]);

    let grammar = Grammar::new("program", grammar_rules(), [Terminal::Eof])?;
    let parser = Parser::new(ParseTable::build(grammar)?, lexer, Channel::Default)
        .with_subparser(COMMENT_CHANNEL, comments)
        .with_delimiters([("(", ")"), ("fun", "endfun"), ("\"", "\"")]);
    Ok(parser)
}

static PARSER: Lazy<Result<Parser>> = Lazy::new(build_parser);

/// The generated parser for the language.
pub fn parser() -> Result<&'static Parser> {
    PARSER.as_ref().map_err(Clone::clone)
}

/// Parses a whole source unit into its raw tree.
pub fn parse_unit(text: &str) -> Result<Node> {
    let mut stream = TextStream::from_text(text);
    match parser()?.parse(&mut stream, DEFAULT_MODE, build)? {
        Built::Node(node) => Ok(node),
        _ => Err(CompileError::internal("program did not reduce to a node")),
    }
}

// ============================================================================
// TREE CONSTRUCTION
// ============================================================================

/// Values on the parser's output stack.
#[derive(Debug, Clone)]
enum Built {
    Node(Node),
    Text(String),
    List(Vec<Node>),
    Nothing,
}

struct Children(Vec<Child<Built>>);

impl Children {
    fn token(&self, index: usize) -> Result<&Token> {
        match self.0.get(index) {
            Some(Child::Token(token)) => Ok(token),
            _ => Err(shape_error(index, "token")),
        }
    }

    fn built(&self, index: usize) -> Result<&Built> {
        match self.0.get(index) {
            Some(Child::Value(value)) => Ok(value),
            _ => Err(shape_error(index, "value")),
        }
    }

    fn node(&self, index: usize) -> Result<Node> {
        match self.built(index)? {
            Built::Node(node) => Ok(node.clone()),
            _ => Err(shape_error(index, "node")),
        }
    }

    fn optional_node(&self, index: usize) -> Result<Option<Node>> {
        match self.built(index)? {
            Built::Node(node) => Ok(Some(node.clone())),
            Built::Nothing => Ok(None),
            _ => Err(shape_error(index, "optional node")),
        }
    }

    fn list(&self, index: usize) -> Result<Vec<Node>> {
        match self.built(index)? {
            Built::List(nodes) => Ok(nodes.clone()),
            _ => Err(shape_error(index, "list")),
        }
    }

    fn optional_text(&self, index: usize) -> Result<Option<String>> {
        match self.built(index)? {
            Built::Text(text) => Ok(Some(text.clone())),
            Built::Nothing => Ok(None),
            _ => Err(shape_error(index, "text")),
        }
    }
}

fn shape_error(index: usize, expected: &str) -> CompileError {
    CompileError::internal(format!("reduction child {} is not a {}", index, expected))
}

fn build(reduction: Reduction<Built>) -> Result<Built> {
    let span = reduction.span;
    let label = reduction.label.as_deref();
    let c = Children(reduction.children);

    let node = |tag: Tag| Node::builder(tag, span);
    let built = match label {
        None => match c.0.as_slice() {
            [Child::Value(value)] => value.clone(),
            _ => return Err(CompileError::internal(format!(
                "unlabelled rule for '{}' must have one value child",
                reduction.lhs
            ))),
        },
        Some("unit") => Built::Node(
            node(Tag::Unit)
                .attr_opt("body", make_sequence(Tag::Items, c.list(0)?, None))
                .build(),
        ),
        Some("empty_list") => Built::List(Vec::new()),
        Some("singleton") => Built::List(vec![c.node(0)?]),
        Some("append") => {
            let mut list = c.list(0)?;
            list.push(c.node(1)?);
            Built::List(list)
        }
        Some("append_sep") => {
            let mut list = c.list(0)?;
            list.push(c.node(2)?);
            Built::List(list)
        }
        Some("nothing") => Built::Nothing,
        Some("second") => Built::Node(c.node(1)?),
        Some("text") => Built::Text(c.token(0)?.text.clone()),
        Some("use") => Built::Node(node(Tag::Use).attr("name", c.token(1)?.text.as_str()).build()),
        Some("constant") => Built::Node(
            node(Tag::Constant)
                .attr("name", c.token(1)?.text.as_str())
                .attr("ty", c.node(3)?)
                .attr("value", c.node(5)?)
                .build(),
        ),
        Some("let") => Built::Node(
            node(Tag::Let)
                .attr("name", c.token(2)?.text.as_str())
                .attr_opt("storage", c.optional_text(1)?)
                .attr("ty", c.node(4)?)
                .attr("value", c.node(6)?)
                .build(),
        ),
        Some("fun") => Built::Node(
            node(Tag::Fun)
                .attr("name", c.token(1)?.text.as_str())
                .attr_opt("params", make_sequence(Tag::Params, c.list(3)?, None))
                .attr_opt("ret", c.optional_node(5)?)
                .attr_opt("body", make_sequence(Tag::Stmts, c.list(6)?, None))
                .build(),
        ),
        Some("param") => Built::Node(
            node(Tag::Param)
                .attr("name", c.token(0)?.text.as_str())
                .attr("ty", c.node(2)?)
                .build(),
        ),
        Some("set") => Built::Node(
            node(Tag::Set)
                .attr("lvalue", c.node(0)?)
                .attr("rvalue", c.node(2)?)
                .build(),
        ),
        Some("return") => {
            let value = if c.0.len() > 1 { Some(c.node(1)?) } else { None };
            Built::Node(node(Tag::Return).attr_opt("value", value).build())
        }
        Some("ident") => Built::Node(node(Tag::Ident).attr("name", c.token(0)?.text.as_str()).build()),
        Some("deref") => Built::Node(node(Tag::Deref).attr("target", c.node(1)?).build()),
        Some("type_name") => {
            Built::Node(node(Tag::TypeName).attr("name", c.token(0)?.text.as_str()).build())
        }
        Some("type_ref") => Built::Node(node(Tag::TypeRef).attr("target", c.node(1)?).build()),
        Some("binop") => Built::Node(
            node(Tag::Binop)
                .attr("op", c.token(1)?.text.as_str())
                .attr("lhs", c.node(0)?)
                .attr("rhs", c.node(2)?)
                .build(),
        ),
        Some("neg") => Built::Node(node(Tag::Neg).attr("operand", c.node(1)?).build()),
        Some("paren") => Built::Node(node(Tag::Paren).attr("expr", c.node(1)?).build()),
        Some("number") => {
            let token = c.token(0)?;
            let value = parse_number(&token.text).ok_or_else(|| {
                CompileError::new(ErrorKind::Lex {
                    message: format!("number literal `{}` is out of range", token.text),
                })
                .at(token.span)
            })?;
            Built::Node(node(Tag::Number).attr("value", value).build())
        }
        Some("member") => Built::Node(
            node(Tag::Member)
                .attr("target", c.node(0)?)
                .attr("name", c.token(2)?.text.as_str())
                .build(),
        ),
        Some("call") => Built::Node(
            node(Tag::Call)
                .attr("target", c.node(0)?)
                .attr_opt("args", make_sequence(Tag::Args, c.list(2)?, None))
                .build(),
        ),
        Some("string") => {
            let value = c.optional_text(1)?.unwrap_or_default();
            Built::Node(node(Tag::Str).attr("value", value).build())
        }
        Some("string_empty") => Built::Text(String::new()),
        Some("string_piece") => {
            let mut text = c.optional_text(0)?.unwrap_or_default();
            let token = c.token(1)?;
            if token.kind == Terminal::kind("ESCAPE") {
                text.push(unescape(token)?);
            } else {
                text.push_str(&token.text);
            }
            Built::Text(text)
        }
        Some(other) => {
            return Err(CompileError::internal(format!("unknown rule label '{}'", other)))
        }
    };
    Ok(built)
}

/// Decimal, `0x`/`$` hexadecimal and `0b` binary literals.
pub fn parse_number(text: &str) -> Option<i64> {
    if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix('$')) {
        i64::from_str_radix(hex, 16).ok()
    } else if let Some(bin) = text.strip_prefix("0b") {
        i64::from_str_radix(bin, 2).ok()
    } else {
        text.parse().ok()
    }
}

fn unescape(token: &Token) -> Result<char> {
    let escaped = &token.text[1..];
    let c = match escaped {
        "n" => '\n',
        "t" => '\t',
        "\\" => '\\',
        "\"" => '"',
        _ => escaped
            .strip_prefix('x')
            .and_then(|hex| u8::from_str_radix(hex, 16).ok())
            .map(char::from)
            .ok_or_else(|| {
                CompileError::new(ErrorKind::Lex {
                    message: format!("invalid escape `{}`", token.text),
                })
                .at(token.span)
            })?,
    };
    Ok(c)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn number_prefixes() {
        assert_eq!(parse_number("42"), Some(42));
        assert_eq!(parse_number("0x2a"), Some(42));
        assert_eq!(parse_number("$D020"), Some(0xd020));
        assert_eq!(parse_number("0b101"), Some(5));
        assert_eq!(parse_number("99999999999999999999"), None);
    }

    #[test]
    fn the_language_builds() {
        let parser = parser().unwrap();
        assert!(parser.table().state_count() > 0);
    }

    #[test]
    fn string_escapes_are_decoded() {
        let unit = parse_unit("constant s: u8 = \"a\\tb\\x41\"\n").unwrap();
        let values = unit.select(&["body", "item", "value"]);
        assert_eq!(values[0].str("value"), Some("a\tbA"));
    }
}
