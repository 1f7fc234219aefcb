//! `resolve_storage`: inside functions, replaces variable references and
//! small literals by the storage they denote.
//!
//! * an identifier bound to a variable becomes
//!   `absolute_storage{symbol, zero_page}`;
//! * a literal in `-128..=255` becomes `immediate_storage{value}` holding
//!   its low byte;
//! * `@address` with a constant address becomes
//!   `absolute_storage{address, zero_page}`.
//!
//! Wider literals are left as `number`; the assembler rejects them.

use once_cell::sync::Lazy;

use crate::archive::Section;
use crate::ast::{Hooks, Node, Tag};
use crate::errors::{CompileError, Result};
use crate::passes::names::{GLOBAL, LOCAL, PARAM};
use crate::passes::scope::{walk_scoped, Scoped, Scopes};
use crate::passes::{child, expr_type, text, Pass, PassContext, PassInfo};

pub struct ResolveStorage;

#[derive(Default)]
struct StorageResolver {
    scopes: Scopes,
    fun_depth: usize,
}

impl Scoped for StorageResolver {
    fn scopes(&mut self) -> &mut Scopes {
        &mut self.scopes
    }
}

static HOOKS: Lazy<Hooks<StorageResolver>> = Lazy::new(|| {
    Hooks::new()
        .on_enter(Tag::Fun, StorageResolver::enter_fun)
        .on_exit(Tag::Fun, StorageResolver::exit_fun)
        .on_exit(Tag::Ident, StorageResolver::exit_ident)
        .on_exit(Tag::Number, StorageResolver::exit_number)
        .on_exit(Tag::Deref, StorageResolver::exit_deref)
});

/// `absolute_storage` for a named symbol.
pub fn symbol_storage(symbol: &str, zero_page: bool, node: &Node) -> Result<Node> {
    Ok(Node::builder(Tag::AbsoluteStorage, node.span())
        .attr("symbol", symbol)
        .attr("zero_page", zero_page)
        .attr("type", expr_type(node)?)
        .build())
}

fn address_storage(address: i64, node: &Node) -> Result<Node> {
    Ok(Node::builder(Tag::AbsoluteStorage, node.span())
        .attr("address", address)
        .attr("zero_page", address <= 0xff)
        .attr("type", expr_type(node)?)
        .build())
}

impl StorageResolver {
    fn enter_fun(&mut self, node: Node) -> Result<Option<Node>> {
        self.fun_depth += 1;
        Ok(Some(node))
    }

    fn exit_fun(&mut self, node: Node) -> Result<Option<Node>> {
        self.fun_depth = self.fun_depth.saturating_sub(1);
        Ok(Some(node))
    }

    fn exit_ident(&mut self, node: Node) -> Result<Option<Node>> {
        let Some(binding) = node.node("binding") else {
            return Ok(Some(node));
        };
        if self.fun_depth == 0 || !matches!(binding.str("kind"), Some(GLOBAL | LOCAL | PARAM)) {
            return Ok(Some(node));
        }
        let zero_page = binding.str("section") == Some(Section::Zp.as_str());
        symbol_storage(text(binding, "symbol")?, zero_page, &node).map(Some)
    }

    fn exit_number(&mut self, node: Node) -> Result<Option<Node>> {
        let value = node.int("value").unwrap_or_default();
        if self.fun_depth == 0 || !(-128..=255).contains(&value) {
            return Ok(Some(node));
        }
        Ok(Some(
            Node::builder(Tag::ImmediateStorage, node.span())
                .attr("value", value & 0xff)
                .attr("type", expr_type(&node)?)
                .build(),
        ))
    }

    fn exit_deref(&mut self, node: Node) -> Result<Option<Node>> {
        let target = child(&node, "target")?;
        let address = match target.tag() {
            Tag::ImmediateStorage | Tag::Number => target.int("value"),
            _ => None,
        };
        match address {
            Some(address) if (0..=0xffff).contains(&address) => address_storage(address, &node).map(Some),
            _ => Err(CompileError::type_error(
                "only constant addresses can be dereferenced",
                target.span(),
            )),
        }
    }
}

impl Pass for ResolveStorage {
    fn info(&self) -> PassInfo {
        PassInfo {
            name: "resolve_storage",
            introduces: &["absolute_storage", "immediate_storage"],
            uses: &["type", "scope"],
            deletes: &["deref"],
        }
    }

    fn run(&self, tree: &Node, _cx: &PassContext) -> Result<Node> {
        walk_scoped(tree, &mut StorageResolver::default(), &HOOKS, self.name())
    }
}
