//! Per-tag hook tables.
//!
//! A pass registers enter/exit handlers for the tags it cares about once
//! (typically in a `Lazy` static); [`Dispatch`] routes each visited node to
//! its handler and leaves every other tag untouched.

use std::collections::HashMap;

use crate::ast::{Node, Tag, Transformer};
use crate::errors::Result;

pub type Hook<P> = fn(&mut P, Node) -> Result<Option<Node>>;

pub struct Hooks<P> {
    enter: HashMap<Tag, Hook<P>>,
    exit: HashMap<Tag, Hook<P>>,
}

impl<P> Default for Hooks<P> {
    fn default() -> Self {
        Self {
            enter: HashMap::new(),
            exit: HashMap::new(),
        }
    }
}

impl<P> Hooks<P> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_enter(mut self, tag: Tag, hook: Hook<P>) -> Self {
        self.enter.insert(tag, hook);
        self
    }

    pub fn on_exit(mut self, tag: Tag, hook: Hook<P>) -> Self {
        self.exit.insert(tag, hook);
        self
    }

    pub fn enter(&self, pass: &mut P, node: Node) -> Result<Option<Node>> {
        match self.enter.get(&node.tag()) {
            Some(hook) => hook(pass, node),
            None => Ok(Some(node)),
        }
    }

    pub fn exit(&self, pass: &mut P, node: Node) -> Result<Option<Node>> {
        match self.exit.get(&node.tag()) {
            Some(hook) => hook(pass, node),
            None => Ok(Some(node)),
        }
    }
}

/// Adapts a pass state and its hook table into a [`Transformer`].
pub struct Dispatch<'a, P> {
    pass: &'a mut P,
    hooks: &'a Hooks<P>,
}

impl<'a, P> Dispatch<'a, P> {
    pub fn new(pass: &'a mut P, hooks: &'a Hooks<P>) -> Self {
        Self { pass, hooks }
    }
}

impl<P> Transformer for Dispatch<'_, P> {
    fn enter(&mut self, node: Node) -> Result<Option<Node>> {
        self.hooks.enter(self.pass, node)
    }

    fn exit(&mut self, node: Node) -> Result<Option<Node>> {
        self.hooks.exit(self.pass, node)
    }
}
