//! Persistent syntax tree.
//!
//! A [`Node`] is an immutable, reference-counted value: a [`Tag`], an ordered
//! persistent map of attributes and a [`Span`]. Children live in attributes;
//! lists are right-nested *sequences* whose element sits under the
//! attribute named by the tag (`stmts.stmt`, `items.item`, ...) and whose
//! remainder sits under `next`.
//!
//! Rewriting never mutates: [`Node::transform`] rebuilds only the nodes
//! whose attributes actually changed, detected by pointer identity, and
//! hands back the original `Arc` otherwise.

// ============================================================================
// MODULES
// ============================================================================

pub mod hooks;
pub mod tag;
pub mod value;

pub use hooks::{Dispatch, Hook, Hooks};
pub use tag::Tag;
pub use value::Value;

use std::fmt;
use std::sync::Arc;

use im::OrdMap;

use crate::archive::Relocation;
use crate::errors::Result;
use crate::syntax::Span;
use crate::types::TypeInfo;

// ============================================================================
// NODES
// ============================================================================

#[derive(Clone)]
pub struct Node(Arc<NodeData>);

#[derive(Debug, PartialEq, Eq)]
struct NodeData {
    tag: Tag,
    attrs: OrdMap<String, Value>,
    span: Span,
}

impl Node {
    /// A node without attributes.
    pub fn new(tag: Tag, span: Span) -> Self {
        Self::from_parts(tag, OrdMap::new(), span)
    }

    fn from_parts(tag: Tag, attrs: OrdMap<String, Value>, span: Span) -> Self {
        Node(Arc::new(NodeData { tag, attrs, span }))
    }

    /// Starts a batch of attribute insertions.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use lodestar::ast::{Node, Tag};
    /// use lodestar::syntax::Span;
    /// let number = Node::builder(Tag::Number, Span::point(1, 0)).attr("value", 7i64).build();
    /// assert_eq!(number.int("value"), Some(7));
    /// ```
    pub fn builder(tag: Tag, span: Span) -> NodeBuilder {
        NodeBuilder {
            tag,
            attrs: OrdMap::new(),
            span,
        }
    }

    /// A builder seeded with this node's tag, attributes and span.
    pub fn to_builder(&self) -> NodeBuilder {
        NodeBuilder {
            tag: self.0.tag,
            attrs: self.0.attrs.clone(),
            span: self.0.span,
        }
    }

    pub fn tag(&self) -> Tag {
        self.0.tag
    }

    pub fn span(&self) -> Span {
        self.0.span
    }

    pub fn attrs(&self) -> &OrdMap<String, Value> {
        &self.0.attrs
    }

    pub fn is(&self, tag: Tag) -> bool {
        self.0.tag == tag
    }

    /// True when both handles point at the same allocation.
    pub fn ptr_eq(a: &Node, b: &Node) -> bool {
        Arc::ptr_eq(&a.0, &b.0)
    }

    // ------------------------------------------------------------------------
    // Attribute access
    // ------------------------------------------------------------------------

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.attrs.get(name)
    }

    pub fn has(&self, name: &str) -> bool {
        self.0.attrs.contains_key(name)
    }

    pub fn node(&self, name: &str) -> Option<&Node> {
        self.get(name).and_then(Value::as_node)
    }

    pub fn int(&self, name: &str) -> Option<i64> {
        self.get(name).and_then(Value::as_int)
    }

    pub fn str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(Value::as_str)
    }

    pub fn bool(&self, name: &str) -> Option<bool> {
        self.get(name).and_then(Value::as_bool)
    }

    pub fn ty(&self, name: &str) -> Option<&TypeInfo> {
        self.get(name).and_then(Value::as_type)
    }

    pub fn bytes(&self, name: &str) -> Option<&[u8]> {
        self.get(name).and_then(Value::as_bytes)
    }

    pub fn relocations(&self, name: &str) -> Option<&[Relocation]> {
        self.get(name).and_then(Value::as_relocations)
    }

    pub fn table(&self, name: &str) -> Option<&OrdMap<String, Value>> {
        self.get(name).and_then(Value::as_table)
    }

    // ------------------------------------------------------------------------
    // Persistent updates
    // ------------------------------------------------------------------------

    pub fn with_attr(&self, name: &str, value: impl Into<Value>) -> Node {
        self.to_builder().attr(name, value).build()
    }

    pub fn without_attr(&self, name: &str) -> Node {
        if !self.has(name) {
            return self.clone();
        }
        self.to_builder().remove(name).build()
    }

    pub fn with_tag(&self, tag: Tag) -> Node {
        self.to_builder().tag(tag).build()
    }

    pub fn with_span(&self, span: Span) -> Node {
        self.to_builder().span(span).build()
    }

    // ------------------------------------------------------------------------
    // Sequences
    // ------------------------------------------------------------------------

    /// The elements of a sequence, following `next` links. Empty for nodes
    /// that are not sequences.
    pub fn elements(&self) -> Vec<Node> {
        let Some(element) = self.tag().sequence_element() else {
            return Vec::new();
        };
        let mut out = Vec::new();
        let mut cursor = Some(self);
        while let Some(node) = cursor {
            if let Some(item) = node.node(element) {
                out.push(item.clone());
            }
            cursor = node.node("next").filter(|next| next.tag() == node.tag());
        }
        out
    }

    /// Walks a chain of attribute names. A name that is the element
    /// attribute of a sequence selects every element of it.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use lodestar::ast::{make_sequence, Node, Tag};
    /// use lodestar::syntax::Span;
    /// let span = Span::default();
    /// let items = make_sequence(Tag::Items, vec![Node::new(Tag::Use, span), Node::new(Tag::Fun, span)], None);
    /// let unit = Node::builder(Tag::Unit, span).attr_opt("body", items).build();
    /// let tags: Vec<Tag> = unit.select(&["body", "item"]).iter().map(|n| n.tag()).collect();
    /// assert_eq!(tags, vec![Tag::Use, Tag::Fun]);
    /// ```
    pub fn select(&self, path: &[&str]) -> Vec<Node> {
        let mut current = vec![self.clone()];
        for name in path {
            let mut next = Vec::new();
            for node in &current {
                if node.tag().sequence_element() == Some(*name) {
                    next.extend(node.elements());
                } else if let Some(child) = node.node(name) {
                    next.push(child.clone());
                }
            }
            current = next;
        }
        current
    }

    // ------------------------------------------------------------------------
    // Transformation
    // ------------------------------------------------------------------------

    /// Applies `transformer` to this subtree.
    ///
    /// The enter hook runs first; its result's node attributes are then
    /// transformed recursively, in key order except that `body` and `next`
    /// come last. A rebuilt node is made only when some attribute changed
    /// identity. A sequence node whose element was removed collapses into
    /// its (already transformed) `next`. Finally the exit hook runs.
    /// `Ok(None)` means the node was removed.
    pub fn transform<T: Transformer + ?Sized>(&self, transformer: &mut T) -> Result<Option<Node>> {
        let Some(entered) = transformer.enter(self.clone())? else {
            return Ok(None);
        };

        let mut attrs = entered.attrs().clone();
        let mut changed = false;
        for name in visit_order(entered.attrs()) {
            let Some(Value::Node(child)) = entered.attrs().get(name) else {
                continue;
            };
            match child.transform(transformer)? {
                Some(rewritten) if Node::ptr_eq(&rewritten, child) => {}
                Some(rewritten) => {
                    attrs.insert(name.clone(), Value::Node(rewritten));
                    changed = true;
                }
                None => {
                    attrs.remove(name);
                    changed = true;
                }
            }
        }

        let rebuilt = if changed {
            if let Some(element) = entered.tag().sequence_element() {
                if !attrs.contains_key(element) {
                    return Ok(attrs.get("next").and_then(Value::as_node).cloned());
                }
            }
            Node::from_parts(entered.tag(), attrs, entered.span())
        } else {
            entered
        };
        transformer.exit(rebuilt)
    }

    /// A copy of the tree with every span reset, for comparisons that
    /// ignore source positions.
    pub fn strip_spans(&self) -> Node {
        struct Strip;
        impl Transformer for Strip {
            fn exit(&mut self, node: Node) -> Result<Option<Node>> {
                Ok(Some(if node.span() == Span::default() {
                    node
                } else {
                    node.with_span(Span::default())
                }))
            }
        }
        match self.transform(&mut Strip) {
            Ok(Some(node)) => node,
            _ => self.clone(),
        }
    }

    fn write_pretty(&self, f: &mut fmt::Formatter<'_>, indent: usize) -> fmt::Result {
        write!(f, "({}", self.tag())?;
        let attrs = self.attrs();
        for (name, value) in attrs.iter() {
            if !matches!(value, Value::Node(_)) {
                write!(f, " :{} {}", name, value)?;
            }
        }
        for name in visit_order(attrs) {
            if let Some(Value::Node(child)) = attrs.get(name) {
                write!(f, "\n{:width$}:{} ", "", name, width = indent + 2)?;
                child.write_pretty(f, indent + 2)?;
            }
        }
        write!(f, ")")
    }
}

/// Attribute names in traversal order: `body` and `next` last.
fn visit_order(attrs: &OrdMap<String, Value>) -> Vec<&String> {
    let mut names: Vec<&String> = attrs
        .keys()
        .filter(|k| k.as_str() != "body" && k.as_str() != "next")
        .collect();
    for last in ["body", "next"] {
        if let Some(name) = attrs.keys().find(|k| k.as_str() == last) {
            names.push(name);
        }
    }
    names
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        Node::ptr_eq(self, other) || *self.0 == *other.0
    }
}

impl Eq for Node {}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write_pretty(f, 0)
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write_pretty(f, 0)
    }
}

// ============================================================================
// BUILDER
// ============================================================================

/// Mutable staging area for a node's attributes.
#[derive(Debug, Clone)]
pub struct NodeBuilder {
    tag: Tag,
    attrs: OrdMap<String, Value>,
    span: Span,
}

impl NodeBuilder {
    pub fn attr(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.attrs.insert(name.to_string(), value.into());
        self
    }

    /// Sets the attribute only when a value is present.
    pub fn attr_opt<V: Into<Value>>(self, name: &str, value: Option<V>) -> Self {
        match value {
            Some(value) => self.attr(name, value),
            None => self,
        }
    }

    pub fn remove(mut self, name: &str) -> Self {
        self.attrs.remove(name);
        self
    }

    pub fn tag(mut self, tag: Tag) -> Self {
        self.tag = tag;
        self
    }

    pub fn span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn build(self) -> Node {
        Node::from_parts(self.tag, self.attrs, self.span)
    }
}

// ============================================================================
// TRANSFORMERS
// ============================================================================

/// Enter/exit visitor. Both hooks default to identity; returning `None`
/// removes the node.
pub trait Transformer {
    fn enter(&mut self, node: Node) -> Result<Option<Node>> {
        Ok(Some(node))
    }

    fn exit(&mut self, node: Node) -> Result<Option<Node>> {
        Ok(Some(node))
    }
}

/// Builds a right-nested sequence of `tag` nodes over `elements`, ending in
/// `rest`. Returns `rest` when there are no elements.
pub fn make_sequence(tag: Tag, elements: Vec<Node>, rest: Option<Node>) -> Option<Node> {
    let element = tag.sequence_element()?;
    elements.into_iter().rev().fold(rest, |next, item| {
        let span = Span::cover(std::iter::once(item.span()).chain(next.as_ref().map(Node::span)))
            .unwrap_or_default();
        Some(
            Node::builder(tag, span)
                .attr(element, item)
                .attr_opt("next", next)
                .build(),
        )
    })
}
