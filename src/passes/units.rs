//! `resolve_units`: binds `use` items to intrinsic units and turns
//! `unit.member` accesses into `intrinsic` nodes.

use once_cell::sync::Lazy;

use crate::ast::{Hooks, Node, Tag, Value};
use crate::errors::{CompileError, ErrorKind, Result};
use crate::intrinsics::lookup_unit;
use crate::passes::scope::{walk_scoped, Scoped, Scopes};
use crate::passes::{child, text, Pass, PassContext, PassInfo};

pub struct ResolveUnits;

#[derive(Default)]
struct UnitResolver {
    scopes: Scopes,
}

impl Scoped for UnitResolver {
    fn scopes(&mut self) -> &mut Scopes {
        &mut self.scopes
    }
}

static HOOKS: Lazy<Hooks<UnitResolver>> = Lazy::new(|| {
    Hooks::new()
        .on_exit(Tag::Use, UnitResolver::exit_use)
        .on_exit(Tag::Member, UnitResolver::exit_member)
});

impl UnitResolver {
    fn exit_use(&mut self, node: Node) -> Result<Option<Node>> {
        let name = text(&node, "name")?;
        let unit = lookup_unit(name).ok_or_else(|| {
            CompileError::new(ErrorKind::UnknownName {
                name: name.to_string(),
            })
            .at(node.span())
            .with_help("the only built-in unit is `mem`")
        })?;
        if !self.scopes.bind(name, Value::Unit(unit)) {
            return Err(CompileError::new(ErrorKind::DuplicateDefinition {
                name: name.to_string(),
            })
            .at(node.span()));
        }
        tracing::trace!(unit = name, "bound unit");
        Ok(None)
    }

    fn exit_member(&mut self, node: Node) -> Result<Option<Node>> {
        let target = child(&node, "target")?;
        let unit = match (target.tag(), target.str("name")) {
            (Tag::Ident, Some(name)) => self.scopes.lookup(name).and_then(Value::as_unit),
            _ => None,
        };
        let Some(unit) = unit else {
            return Ok(Some(node));
        };
        let member = text(&node, "name")?;
        if unit.member(member).is_none() {
            return Err(CompileError::new(ErrorKind::UnknownName {
                name: format!("{}.{}", unit.name, member),
            })
            .at(node.span()));
        }
        Ok(Some(
            Node::builder(Tag::Intrinsic, node.span())
                .attr("unit", Value::Unit(unit))
                .attr("member", member)
                .build(),
        ))
    }
}

impl Pass for ResolveUnits {
    fn info(&self) -> PassInfo {
        PassInfo {
            name: "resolve_units",
            introduces: &["intrinsic", "unit_binding"],
            uses: &["use", "member"],
            deletes: &["use"],
        }
    }

    fn run(&self, tree: &Node, _cx: &PassContext) -> Result<Node> {
        walk_scoped(tree, &mut UnitResolver::default(), &HOOKS, self.name())
    }
}
