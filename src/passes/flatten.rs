//! `flatten_symbol`: joins the code of a function into one `fun_symbol`.

use once_cell::sync::Lazy;

use crate::ast::{make_sequence, Node, Tag};
use crate::errors::Result;
use crate::passes::{expr_type, text, Pass, PassContext, PassInfo};
use crate::patterns::{capture, node, sequence, Bindings, Direction, Rule, RuleSet, SeqItem};
use crate::syntax::Span;

pub struct FlattenSymbol;

static FLATTEN: Lazy<RuleSet> = Lazy::new(|| {
    RuleSet::compile(
        "flatten_symbol",
        Direction::Ascending,
        vec![
            Rule::new(
                sequence(
                    vec![
                        SeqItem::One(capture("first", node(Tag::Code))),
                        SeqItem::One(capture("second", node(Tag::Code))),
                    ],
                    Some("rest"),
                ),
                merge_code,
            ),
            Rule::new(
                node(Tag::Fun).attr(
                    "body",
                    sequence(vec![SeqItem::One(capture("code", node(Tag::Code)))], None),
                ),
                fun_symbol,
            ),
        ],
    )
});

/// Two adjacent code blocks become one; the second block's relocations
/// move past the first block's bytes.
fn merge_code(b: &Bindings, matched: &Node) -> Result<Option<Node>> {
    let first = b.node("first")?;
    let second = b.node("second")?;
    let head = first.bytes("bytes").unwrap_or_default();
    let tail = second.bytes("bytes").unwrap_or_default();

    let mut bytes = head.to_vec();
    bytes.extend_from_slice(tail);
    let mut relocs = first.relocations("relocs").unwrap_or_default().to_vec();
    relocs.extend(
        second
            .relocations("relocs")
            .unwrap_or_default()
            .iter()
            .map(|r| r.shifted(head.len())),
    );

    let span = Span::cover([first.span(), second.span()]).unwrap_or_default();
    let merged = Node::builder(Tag::Code, span)
        .attr("bytes", bytes)
        .attr("relocs", relocs)
        .build();
    let rest = b.node_opt("rest");
    Ok(make_sequence(matched.tag(), vec![merged], rest))
}

fn fun_symbol(b: &Bindings, matched: &Node) -> Result<Option<Node>> {
    let code = b.node("code")?;
    Ok(Some(
        Node::builder(Tag::FunSymbol, matched.span())
            .attr("name", text(matched, "symbol")?)
            .attr("bytes", code.bytes("bytes").unwrap_or_default().to_vec())
            .attr("relocs", code.relocations("relocs").unwrap_or_default().to_vec())
            .attr("type", expr_type(matched)?)
            .attr_opt("locals", matched.table("locals").cloned())
            .build(),
    ))
}

impl Pass for FlattenSymbol {
    fn info(&self) -> PassInfo {
        PassInfo {
            name: "flatten_symbol",
            introduces: &["fun_symbol"],
            uses: &["code", "locals"],
            deletes: &["code", "fun"],
        }
    }

    fn run(&self, tree: &Node, _cx: &PassContext) -> Result<Node> {
        FLATTEN.run(tree)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::{Relocation, RelocationKind};

    fn code(bytes: Vec<u8>, relocs: Vec<Relocation>) -> Node {
        Node::builder(Tag::Code, Span::default())
            .attr("bytes", bytes)
            .attr("relocs", relocs)
            .build()
    }

    #[test]
    fn adjacent_code_is_merged_with_shifted_relocations() {
        let jsr = code(vec![0x20, 0, 0], vec![Relocation::new(1, "u.f", RelocationKind::Absolute16)]);
        let sta = code(vec![0x8D, 0, 0], vec![Relocation::new(1, "u.x", RelocationKind::Absolute16)]);
        let rts = code(vec![0x60], vec![]);
        let body = make_sequence(Tag::Stmts, vec![jsr, sta, rts], None).unwrap();

        let out = FLATTEN.run(&body).unwrap();
        let elements = out.elements();
        assert_eq!(elements.len(), 1);
        assert_eq!(
            elements[0].bytes("bytes"),
            Some(&[0x20, 0, 0, 0x8D, 0, 0, 0x60][..])
        );
        let offsets: Vec<usize> = elements[0]
            .relocations("relocs")
            .unwrap()
            .iter()
            .map(|r| r.offset)
            .collect();
        assert_eq!(offsets, vec![1, 4]);
    }
}
