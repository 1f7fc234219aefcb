//! `allocate_locals`: gives every variable its storage symbol.
//!
//! Unit-level `let`s become `data_symbol` items with their initial bytes.
//! Inside a function, parameters and locals become entries of the
//! function's `locals` table and each local `let` turns into a `set` of
//! its initial value. Scopes are no longer needed afterwards and are
//! spliced back into the statement list.

use im::OrdMap;
use once_cell::sync::Lazy;

use crate::archive::Section;
use crate::ast::{make_sequence, Hooks, Node, Tag, Value};
use crate::errors::{CompileError, Result};
use crate::passes::storage::symbol_storage;
use crate::passes::{child, declared_type, text, walk, Pass, PassContext, PassInfo};
use crate::types::TypeInfo;

pub struct AllocateLocals;

#[derive(Default)]
struct Allocator {
    /// Locals of each enclosing function, by symbol.
    frames: Vec<OrdMap<String, Value>>,
}

static HOOKS: Lazy<Hooks<Allocator>> = Lazy::new(|| {
    Hooks::new()
        .on_enter(Tag::Fun, Allocator::enter_fun)
        .on_exit(Tag::Fun, Allocator::exit_fun)
        .on_exit(Tag::Let, Allocator::exit_let)
        .on_exit(Tag::Stmts, Allocator::exit_stmts)
});

/// Little-endian bytes of `value` truncated to the width of `ty`.
pub fn initial_bytes(value: i64, ty: &TypeInfo) -> Vec<u8> {
    value.to_le_bytes()[..ty.width().min(8)].to_vec()
}

pub fn data_symbol(symbol: &str, section: Section, bytes: Vec<u8>, ty: TypeInfo, at: &Node) -> Node {
    Node::builder(Tag::DataSymbol, at.span())
        .attr("name", symbol)
        .attr("section", section.as_str())
        .attr("bytes", bytes)
        .attr("type", ty)
        .build()
}

fn section_of(node: &Node) -> Result<Section> {
    node.str("section")
        .and_then(Section::from_name)
        .ok_or_else(|| CompileError::internal("declaration has no section").at(node.span()))
}

impl Allocator {
    fn enter_fun(&mut self, node: Node) -> Result<Option<Node>> {
        let mut locals = OrdMap::new();
        for param in node.node("params").map(Node::elements).unwrap_or_default() {
            let symbol = text(&param, "symbol")?;
            let ty = declared_type(&param)?;
            let bytes = vec![0; ty.width()];
            locals.insert(
                symbol.to_string(),
                Value::Node(data_symbol(symbol, Section::Bss, bytes, ty, &param)),
            );
        }
        self.frames.push(locals);
        Ok(Some(node))
    }

    fn exit_fun(&mut self, node: Node) -> Result<Option<Node>> {
        let locals = self.frames.pop().unwrap_or_default();
        Ok(Some(
            node.to_builder()
                .remove("params")
                .attr("locals", locals)
                .build(),
        ))
    }

    fn exit_let(&mut self, node: Node) -> Result<Option<Node>> {
        let symbol = text(&node, "symbol")?.to_string();
        let section = section_of(&node)?;
        let ty = declared_type(&node)?;
        let value = child(&node, "value")?;

        let Some(locals) = self.frames.last_mut() else {
            let initial = value
                .int("value")
                .filter(|_| value.is(Tag::Number))
                .ok_or_else(|| {
                    CompileError::constant("global initializers must be constant", value.span())
                })?;
            return Ok(Some(data_symbol(&symbol, section, initial_bytes(initial, &ty), ty, &node)));
        };

        let bytes = vec![0; ty.width()];
        locals.insert(
            symbol.clone(),
            Value::Node(data_symbol(&symbol, section, bytes, ty.clone(), &node)),
        );
        let storage = symbol_storage(&symbol, section == Section::Zp, &node)?;
        Ok(Some(
            Node::builder(Tag::Set, node.span())
                .attr("lvalue", storage)
                .attr("rvalue", value)
                .attr("type", ty)
                .build(),
        ))
    }

    /// `stmts{stmt: scope{decl, body}}` becomes `stmts{stmt: decl, next: body}`.
    fn exit_stmts(&mut self, node: Node) -> Result<Option<Node>> {
        let Some(scope) = node.node("stmt").filter(|s| s.is(Tag::Scope)) else {
            return Ok(Some(node));
        };
        let decl: Vec<Node> = scope.node("decl").cloned().into_iter().collect();
        let body = scope.node("body").cloned();
        let rest = match node.node("next") {
            Some(next) => Some(append(body, next.clone())),
            None => body,
        };
        Ok(make_sequence(Tag::Stmts, decl, rest))
    }
}

/// Concatenates two statement sequences.
fn append(first: Option<Node>, second: Node) -> Node {
    let mut elements = first.map(|f| f.elements()).unwrap_or_default();
    elements.extend(second.elements());
    make_sequence(Tag::Stmts, elements, None).unwrap_or(second)
}

impl Pass for AllocateLocals {
    fn info(&self) -> PassInfo {
        PassInfo {
            name: "allocate_locals",
            introduces: &["data_symbol", "set", "locals"],
            uses: &["absolute_storage", "scope", "let"],
            deletes: &["scope", "let"],
        }
    }

    fn run(&self, tree: &Node, _cx: &PassContext) -> Result<Node> {
        walk(tree, &mut Allocator::default(), &HOOKS, self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initial_bytes_are_little_endian() {
        assert_eq!(initial_bytes(0x1234, &TypeInfo::U16), vec![0x34, 0x12]);
        assert_eq!(initial_bytes(-1, &TypeInfo::int(2, true)), vec![0xff, 0xff]);
        assert_eq!(initial_bytes(7, &TypeInfo::U8), vec![7]);
    }
}
