//! Compilation of [`Pattern`] descriptions into predicate closures.
//!
//! A predicate tests one attribute value and records captures into the
//! [`Bindings`] it is handed. On a failed match the bindings may hold
//! partial captures; callers that backtrack restore a saved copy.

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::ast::{Node, Value};
use crate::errors::Result;
use crate::patterns::{Bindings, Captured, NodePattern, Pattern, SeqItem};

pub type Predicate = Arc<dyn Fn(&Value, &mut Bindings) -> Result<bool> + Send + Sync>;

pub fn compile(pattern: &Pattern) -> Predicate {
    match pattern {
        Pattern::Any => Arc::new(|_, _| Ok(true)),
        Pattern::Eq(expected) => {
            let expected = expected.clone();
            Arc::new(move |value, _| Ok(*value == expected))
        }
        Pattern::Lt(bound) => {
            let bound = *bound;
            Arc::new(move |value, _| Ok(value.as_int().map_or(false, |n| n < bound)))
        }
        Pattern::When(test) => {
            let test = *test;
            Arc::new(move |value, _| Ok(test(value)))
        }
        Pattern::Node(node) => compile_node(node),
        Pattern::Capture(name, inner) => {
            let name = name.clone();
            let inner = compile(inner);
            Arc::new(move |value, bindings| {
                if !inner(value, bindings)? {
                    return Ok(false);
                }
                bindings.insert(&name, Captured::Value(value.clone()));
                Ok(true)
            })
        }
        Pattern::Require(inner, error) => {
            let inner = compile(inner);
            let error = *error;
            Arc::new(move |value, bindings| {
                if inner(value, bindings)? {
                    Ok(true)
                } else {
                    Err(error(value))
                }
            })
        }
        Pattern::Sequence(items, rest) => compile_sequence(items, rest.clone()),
    }
}

fn compile_node(pattern: &NodePattern) -> Predicate {
    let tag = pattern.tag;
    let attrs: Vec<(String, Predicate)> = pattern
        .attrs
        .iter()
        .map(|(name, p)| (name.clone(), compile(p)))
        .collect();
    let absent = pattern.absent.clone();
    let exhaustive = pattern.exhaustive.then(|| {
        pattern
            .attrs
            .iter()
            .map(|(name, _)| name.clone())
            .collect::<BTreeSet<String>>()
    });
    let span = pattern.span.clone();

    Arc::new(move |value, bindings| {
        let Some(node) = value.as_node() else {
            return Ok(false);
        };
        if node.tag() != tag {
            return Ok(false);
        }
        if absent.iter().any(|name| node.has(name)) {
            return Ok(false);
        }
        if let Some(expected) = &exhaustive {
            let attrs = node.attrs();
            if attrs.len() != expected.len() || attrs.keys().any(|k| !expected.contains(k)) {
                return Ok(false);
            }
        }
        for (name, predicate) in &attrs {
            let Some(attr) = node.get(name) else {
                return Ok(false);
            };
            if !predicate(attr, bindings)? {
                return Ok(false);
            }
        }
        if let Some(name) = &span {
            bindings.insert(name, Captured::Span(node.span()));
        }
        Ok(true)
    })
}

enum CompiledItem {
    One(Predicate),
    Many(String, Predicate),
}

fn compile_sequence(items: &[SeqItem], rest: Option<String>) -> Predicate {
    let items: Arc<Vec<CompiledItem>> = Arc::new(
        items
            .iter()
            .map(|item| match item {
                SeqItem::One(p) => CompiledItem::One(compile(p)),
                SeqItem::Many(name, p) => CompiledItem::Many(name.clone(), compile(p)),
            })
            .collect(),
    );

    Arc::new(move |value, bindings| {
        match value.as_node() {
            Some(node) if node.tag().is_sequence() => {
                match_items(&items, Some(node), rest.as_deref(), bindings)
            }
            _ => Ok(false),
        }
    })
}

/// The element and remainder of the sequence node `cursor`.
fn split(cursor: &Node) -> (Option<Value>, Option<&Node>) {
    let element = cursor
        .tag()
        .sequence_element()
        .and_then(|name| cursor.get(name))
        .cloned();
    let next = cursor.node("next").filter(|next| next.tag() == cursor.tag());
    (element, next)
}

fn match_items(
    items: &[CompiledItem],
    cursor: Option<&Node>,
    rest: Option<&str>,
    bindings: &mut Bindings,
) -> Result<bool> {
    let Some((first, tail)) = items.split_first() else {
        return Ok(match rest {
            Some(name) => {
                bindings.insert(name, Captured::Rest(cursor.cloned()));
                true
            }
            None => cursor.is_none(),
        });
    };

    match first {
        CompiledItem::One(predicate) => {
            let Some(node) = cursor else {
                return Ok(false);
            };
            let (Some(element), next) = split(node) else {
                return Ok(false);
            };
            let saved = bindings.clone();
            if predicate(&element, bindings)? && match_items(tail, next, rest, bindings)? {
                return Ok(true);
            }
            *bindings = saved;
            Ok(false)
        }
        CompiledItem::Many(name, predicate) => {
            // Longest run first, then give elements back one at a time.
            let mut run: Vec<Node> = Vec::new();
            let mut positions = vec![cursor];
            let mut at = cursor;
            while let Some(node) = at {
                let (Some(Value::Node(element)), next) = split(node) else {
                    break;
                };
                let mut scratch = bindings.clone();
                if !predicate(&Value::Node(element.clone()), &mut scratch)? {
                    break;
                }
                run.push(element);
                positions.push(next);
                at = next;
            }

            for taken in (0..positions.len()).rev() {
                let mut attempt = bindings.clone();
                attempt.insert(name, Captured::Nodes(run[..taken].to_vec()));
                if match_items(tail, positions[taken], rest, &mut attempt)? {
                    *bindings = attempt;
                    return Ok(true);
                }
            }
            Ok(false)
        }
    }
}
