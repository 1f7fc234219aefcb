//! `explicit_scopes`: every `let` statement opens a scope over the
//! statements that follow it.

use once_cell::sync::Lazy;

use crate::ast::{Hooks, Node, Tag};
use crate::errors::Result;
use crate::passes::{walk, Pass, PassContext, PassInfo};

pub struct ExplicitScopes;

struct Scoper;

static HOOKS: Lazy<Hooks<Scoper>> = Lazy::new(|| Hooks::new().on_exit(Tag::Stmts, Scoper::exit_stmts));

impl Scoper {
    /// `stmts{stmt: let, next: rest}` becomes
    /// `stmts{stmt: scope{decl: let, body: rest}}`. Runs bottom-up, so
    /// `rest` is already scoped.
    fn exit_stmts(&mut self, node: Node) -> Result<Option<Node>> {
        let Some(decl) = node.node("stmt").filter(|s| s.is(Tag::Let)) else {
            return Ok(Some(node));
        };
        let scope = Node::builder(Tag::Scope, node.span())
            .attr("decl", decl.clone())
            .attr_opt("body", node.node("next").cloned())
            .build();
        Ok(Some(node.without_attr("next").with_attr("stmt", scope)))
    }
}

impl Pass for ExplicitScopes {
    fn info(&self) -> PassInfo {
        PassInfo {
            name: "explicit_scopes",
            introduces: &["scope"],
            uses: &["let"],
            deletes: &[],
        }
    }

    fn run(&self, tree: &Node, _cx: &PassContext) -> Result<Node> {
        walk(tree, &mut Scoper, &HOOKS, self.name())
    }
}
