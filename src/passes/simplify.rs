//! Normalizations applied to every raw tree before the scheduled passes.

use once_cell::sync::Lazy;

use crate::ast::{Node, Tag};
use crate::errors::Result;
use crate::patterns::{any, capture, eq, node, Bindings, Direction, Rule, RuleSet};

static SIMPLIFY: Lazy<RuleSet> = Lazy::new(|| {
    RuleSet::compile(
        "simplify",
        Direction::Descending,
        vec![
            Rule::new(node(Tag::Paren).attr("expr", capture("expr", node(Tag::Paren))), unwrap_nested),
            Rule::new(node(Tag::Paren).attr("expr", capture("expr", any())), unwrap),
            Rule::new(
                node(Tag::Binop)
                    .attr("op", eq("-"))
                    .attr("lhs", capture("lhs", any()))
                    .attr("rhs", node(Tag::Number).attr("value", eq(0i64))),
                unwrap_lhs,
            ),
            Rule::new(
                node(Tag::Neg).attr(
                    "operand",
                    node(Tag::Number).absent("type").attr("value", capture("value", any())),
                ),
                negate,
            ),
        ],
    )
});

fn unwrap(b: &Bindings, _: &Node) -> Result<Option<Node>> {
    Ok(Some(b.node("expr")?))
}

fn unwrap_nested(b: &Bindings, _: &Node) -> Result<Option<Node>> {
    let mut inner = b.node("expr")?;
    while inner.is(Tag::Paren) {
        match inner.node("expr") {
            Some(expr) => inner = expr.clone(),
            None => break,
        }
    }
    Ok(Some(inner))
}

fn unwrap_lhs(b: &Bindings, _: &Node) -> Result<Option<Node>> {
    Ok(Some(b.node("lhs")?))
}

fn negate(b: &Bindings, matched: &Node) -> Result<Option<Node>> {
    let value = b.int("value")?;
    Ok(Some(
        Node::builder(Tag::Number, matched.span())
            .attr("value", value.wrapping_neg())
            .build(),
    ))
}

pub fn simplify(tree: &Node) -> Result<Node> {
    SIMPLIFY.run(tree)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syntax::Span;

    fn number(value: i64) -> Node {
        Node::builder(Tag::Number, Span::default())
            .attr("value", value)
            .build()
    }

    fn paren(expr: Node) -> Node {
        Node::builder(Tag::Paren, Span::default()).attr("expr", expr).build()
    }

    #[test]
    fn nested_parens_disappear() {
        assert_eq!(simplify(&paren(paren(paren(number(4))))).unwrap(), number(4));
    }

    #[test]
    fn negated_literals_fold() {
        let neg = Node::builder(Tag::Neg, Span::default())
            .attr("operand", number(3))
            .build();
        assert_eq!(simplify(&neg).unwrap(), number(-3));
    }

    #[test]
    fn subtracting_zero_is_identity() {
        let x = Node::builder(Tag::Ident, Span::default()).attr("name", "x").build();
        let binop = Node::builder(Tag::Binop, Span::default())
            .attr("op", "-")
            .attr("lhs", x.clone())
            .attr("rhs", number(0))
            .build();
        assert_eq!(simplify(&binop).unwrap(), x);
    }
}
