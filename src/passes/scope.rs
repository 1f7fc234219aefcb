//! Lexical scopes for passes that resolve names.
//!
//! `unit`, `fun` and `scope` nodes open a frame. A frame starts from the
//! node's own `names` and `constants` tables (left there by earlier
//! passes) and is written back onto the node when it is exited, so what
//! one pass binds is visible to every later one.

use im::OrdMap;

use crate::ast::{Hooks, Node, Tag, Transformer, Value};
use crate::errors::Result;
use crate::passes::removed_root;

#[derive(Debug, Clone, Default)]
pub struct Frame {
    pub names: OrdMap<String, Value>,
    pub constants: OrdMap<String, Value>,
}

impl Frame {
    fn seeded(node: &Node) -> Self {
        Self {
            names: node.table("names").cloned().unwrap_or_default(),
            constants: node.table("constants").cloned().unwrap_or_default(),
        }
    }

    fn write_back(self, node: Node) -> Node {
        let mut node = node;
        for (attr, table) in [("names", self.names), ("constants", self.constants)] {
            if !table.is_empty() && node.table(attr) != Some(&table) {
                node = node.with_attr(attr, table);
            }
        }
        node
    }
}

#[derive(Debug, Default)]
pub struct Scopes {
    frames: Vec<Frame>,
}

impl Scopes {
    pub fn opens_scope(tag: Tag) -> bool {
        matches!(tag, Tag::Unit | Tag::Fun | Tag::Scope)
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn push(&mut self, node: &Node) {
        self.frames.push(Frame::seeded(node));
    }

    pub fn pop(&mut self) -> Option<Frame> {
        self.frames.pop()
    }

    /// Innermost-first lookup.
    pub fn lookup(&self, name: &str) -> Option<&Value> {
        self.frames.iter().rev().find_map(|f| f.names.get(name))
    }

    pub fn binding(&self, name: &str) -> Option<&Node> {
        self.lookup(name).and_then(Value::as_node)
    }

    pub fn constant(&self, name: &str) -> Option<&Node> {
        self.frames
            .iter()
            .rev()
            .find_map(|f| f.constants.get(name))
            .and_then(Value::as_node)
    }

    /// Binds `name` in the innermost frame. Returns false if that frame
    /// already has it.
    pub fn bind(&mut self, name: &str, value: impl Into<Value>) -> bool {
        match self.frames.last_mut() {
            Some(frame) if !frame.names.contains_key(name) => {
                frame.names.insert(name.to_string(), value.into());
                true
            }
            _ => false,
        }
    }

    pub fn define_constant(&mut self, name: &str, value: Node) {
        if let Some(frame) = self.frames.last_mut() {
            frame.constants.insert(name.to_string(), Value::Node(value));
        }
    }
}

/// Implemented by pass states that carry a scope stack.
pub trait Scoped {
    fn scopes(&mut self) -> &mut Scopes;
}

/// Like [`crate::ast::Dispatch`], with frames pushed and popped around the
/// hooks of scope-opening nodes.
///
/// Frames are matched to nodes by tag, so hooks must not change the tag of
/// a `unit`, `fun` or `scope` node. Sequence nodes that collapse skip
/// their exit hook, which is why a stack of entered nodes would not work.
pub struct ScopedDispatch<'a, P> {
    pass: &'a mut P,
    hooks: &'a Hooks<P>,
}

impl<'a, P: Scoped> ScopedDispatch<'a, P> {
    pub fn new(pass: &'a mut P, hooks: &'a Hooks<P>) -> Self {
        Self { pass, hooks }
    }
}

impl<P: Scoped> Transformer for ScopedDispatch<'_, P> {
    fn enter(&mut self, node: Node) -> Result<Option<Node>> {
        let opens = Scopes::opens_scope(node.tag());
        if opens {
            self.pass.scopes().push(&node);
        }
        let entered = self.hooks.enter(self.pass, node)?;
        let still_open = entered.as_ref().map_or(false, |n| Scopes::opens_scope(n.tag()));
        match (&entered, opens, still_open) {
            (_, true, false) => {
                self.pass.scopes().pop();
            }
            (Some(entered), false, true) => self.pass.scopes().push(entered),
            _ => {}
        }
        Ok(entered)
    }

    fn exit(&mut self, node: Node) -> Result<Option<Node>> {
        if !Scopes::opens_scope(node.tag()) {
            return self.hooks.exit(self.pass, node);
        }
        let exited = self.hooks.exit(self.pass, node)?;
        let frame = self.pass.scopes().pop().unwrap_or_default();
        Ok(exited.map(|node| frame.write_back(node)))
    }
}

/// Runs a hook table over the whole tree with scope tracking.
pub(crate) fn walk_scoped<P: Scoped>(
    tree: &Node,
    state: &mut P,
    hooks: &Hooks<P>,
    pass: &str,
) -> Result<Node> {
    tree.transform(&mut ScopedDispatch::new(state, hooks))?
        .ok_or_else(|| removed_root(pass))
}
