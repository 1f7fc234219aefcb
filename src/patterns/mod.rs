//! Declarative tree rewriting.
//!
//! A rewrite rule pairs a [`Pattern`] with a template function. Patterns
//! are plain data until [`RuleSet::compile`] turns each one into a
//! [`Predicate`] closure; a rule set is then applied in a single
//! depth-first walk, on the way down ([`Direction::Descending`]) or on the
//! way up ([`Direction::Ascending`]). For each visited node the rules are
//! tried in order and the first match commits.
//!
//! # Examples
//!
//! ```rust
//! use lodestar::ast::{Node, Tag};
//! use lodestar::patterns::{capture, node, Bindings, Direction, Rule, RuleSet};
//! use lodestar::syntax::Span;
//!
//! // paren{expr: e} => e
//! fn unwrap(b: &Bindings, _: &Node) -> lodestar::errors::Result<Option<Node>> {
//!     Ok(Some(b.node("e")?))
//! }
//!
//! let rules = RuleSet::compile(
//!     "unwrap",
//!     Direction::Ascending,
//!     vec![Rule::new(node(Tag::Paren).attr("expr", capture("e", node(Tag::Number))), unwrap)],
//! );
//! let number = Node::builder(Tag::Number, Span::default()).attr("value", 1i64).build();
//! let paren = Node::builder(Tag::Paren, Span::default()).attr("expr", number.clone()).build();
//! assert_eq!(rules.run(&paren).unwrap(), number);
//! ```

pub mod predicate;

use im::OrdMap;

use crate::ast::{Node, Tag, Transformer, Value};
use crate::errors::{CompileError, Result};
use crate::syntax::Span;
use crate::types::TypeInfo;

pub use predicate::Predicate;

// ============================================================================
// PATTERNS
// ============================================================================

#[derive(Clone)]
pub enum Pattern {
    Any,
    Eq(Value),
    Lt(i64),
    When(fn(&Value) -> bool),
    Node(NodePattern),
    Capture(String, Box<Pattern>),
    /// A pattern that must match; a mismatch is an error, not a fallthrough.
    Require(Box<Pattern>, fn(&Value) -> CompileError),
    /// Elements of a sequence node, optionally capturing the unmatched tail.
    Sequence(Vec<SeqItem>, Option<String>),
}

#[derive(Clone)]
pub struct NodePattern {
    pub tag: Tag,
    pub attrs: Vec<(String, Pattern)>,
    pub absent: Vec<String>,
    pub exhaustive: bool,
    pub span: Option<String>,
}

#[derive(Clone)]
pub enum SeqItem {
    One(Pattern),
    /// Zero or more elements, greedy, captured as a node list.
    Many(String, Pattern),
}

pub fn any() -> Pattern {
    Pattern::Any
}

pub fn eq(value: impl Into<Value>) -> Pattern {
    Pattern::Eq(value.into())
}

pub fn lt(bound: i64) -> Pattern {
    Pattern::Lt(bound)
}

pub fn when(test: fn(&Value) -> bool) -> Pattern {
    Pattern::When(test)
}

pub fn node(tag: Tag) -> NodePattern {
    NodePattern {
        tag,
        attrs: Vec::new(),
        absent: Vec::new(),
        exhaustive: false,
        span: None,
    }
}

pub fn capture(name: &str, pattern: impl Into<Pattern>) -> Pattern {
    Pattern::Capture(name.to_string(), Box::new(pattern.into()))
}

pub fn require(pattern: impl Into<Pattern>, error: fn(&Value) -> CompileError) -> Pattern {
    Pattern::Require(Box::new(pattern.into()), error)
}

pub fn sequence(items: Vec<SeqItem>, rest: Option<&str>) -> Pattern {
    Pattern::Sequence(items, rest.map(str::to_string))
}

impl NodePattern {
    pub fn attr(mut self, name: &str, pattern: impl Into<Pattern>) -> Self {
        self.attrs.push((name.to_string(), pattern.into()));
        self
    }

    pub fn absent(mut self, name: &str) -> Self {
        self.absent.push(name.to_string());
        self
    }

    /// The node must have exactly the attributes named by `attr`.
    pub fn exhaustive(mut self) -> Self {
        self.exhaustive = true;
        self
    }

    pub fn span(mut self, name: &str) -> Self {
        self.span = Some(name.to_string());
        self
    }
}

impl From<NodePattern> for Pattern {
    fn from(pattern: NodePattern) -> Self {
        Pattern::Node(pattern)
    }
}

// ============================================================================
// BINDINGS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Captured {
    Value(Value),
    Nodes(Vec<Node>),
    /// The remainder of a sequence; `None` when it was fully consumed.
    Rest(Option<Node>),
    Span(Span),
}

/// Captures collected while matching one rule.
#[derive(Debug, Clone, Default)]
pub struct Bindings(OrdMap<String, Captured>);

impl Bindings {
    pub fn insert(&mut self, name: &str, captured: Captured) {
        self.0.insert(name.to_string(), captured);
    }

    pub fn get(&self, name: &str) -> Option<&Captured> {
        self.0.get(name)
    }

    fn missing(name: &str, wanted: &str) -> CompileError {
        CompileError::internal(format!("pattern capture '{}' is not a {}", name, wanted))
    }

    pub fn value(&self, name: &str) -> Result<&Value> {
        match self.get(name) {
            Some(Captured::Value(value)) => Ok(value),
            _ => Err(Self::missing(name, "value")),
        }
    }

    pub fn node(&self, name: &str) -> Result<Node> {
        self.value(name)?
            .as_node()
            .cloned()
            .ok_or_else(|| Self::missing(name, "node"))
    }

    /// A captured node or sequence remainder, `None` when absent.
    pub fn node_opt(&self, name: &str) -> Option<Node> {
        match self.get(name) {
            Some(Captured::Value(Value::Node(node))) => Some(node.clone()),
            Some(Captured::Rest(rest)) => rest.clone(),
            _ => None,
        }
    }

    pub fn int(&self, name: &str) -> Result<i64> {
        self.value(name)?
            .as_int()
            .ok_or_else(|| Self::missing(name, "integer"))
    }

    pub fn str(&self, name: &str) -> Result<&str> {
        self.value(name)?
            .as_str()
            .ok_or_else(|| Self::missing(name, "string"))
    }

    pub fn ty(&self, name: &str) -> Result<TypeInfo> {
        self.value(name)?
            .as_type()
            .cloned()
            .ok_or_else(|| Self::missing(name, "type"))
    }

    pub fn span(&self, name: &str) -> Result<Span> {
        match self.get(name) {
            Some(Captured::Span(span)) => Ok(*span),
            _ => Err(Self::missing(name, "span")),
        }
    }

    pub fn nodes(&self, name: &str) -> Result<Vec<Node>> {
        match self.get(name) {
            Some(Captured::Nodes(nodes)) => Ok(nodes.clone()),
            _ => Err(Self::missing(name, "node list")),
        }
    }
}

// ============================================================================
// RULE SETS
// ============================================================================

/// Builds the replacement for a matched node; `None` removes it.
pub type Template = fn(&Bindings, &Node) -> Result<Option<Node>>;

#[derive(Clone)]
pub struct Rule {
    pub pattern: Pattern,
    pub template: Template,
}

impl Rule {
    pub fn new(pattern: impl Into<Pattern>, template: Template) -> Self {
        Self {
            pattern: pattern.into(),
            template,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Rules see a node before its children (enter hook).
    Descending,
    /// Rules see a node after its children were rewritten (exit hook).
    Ascending,
}

struct CompiledRule {
    predicate: Predicate,
    template: Template,
}

pub struct RuleSet {
    name: String,
    direction: Direction,
    rules: Vec<CompiledRule>,
}

impl RuleSet {
    pub fn compile(name: &str, direction: Direction, rules: Vec<Rule>) -> Self {
        let rules = rules
            .into_iter()
            .map(|rule| CompiledRule {
                predicate: predicate::compile(&rule.pattern),
                template: rule.template,
            })
            .collect();
        Self {
            name: name.to_string(),
            direction,
            rules,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Tries the rules against one node. Unmatched nodes are returned as is.
    pub fn apply(&self, node: Node) -> Result<Option<Node>> {
        let value = Value::Node(node.clone());
        for (index, rule) in self.rules.iter().enumerate() {
            let mut bindings = Bindings::default();
            let matched = (rule.predicate)(&value, &mut bindings).map_err(|e| locate(e, &node))?;
            if matched {
                tracing::trace!(rule_set = %self.name, rule = index, tag = %node.tag(), "rewrite");
                return (rule.template)(&bindings, &node).map_err(|e| locate(e, &node));
            }
        }
        Ok(Some(node))
    }

    /// Rewrites a whole tree in one walk.
    pub fn run(&self, tree: &Node) -> Result<Node> {
        let mut this = self;
        tree.transform(&mut this)?.ok_or_else(|| {
            CompileError::internal(format!("rule set '{}' removed the root node", self.name))
        })
    }
}

fn locate(error: CompileError, node: &Node) -> CompileError {
    if error.span.is_none() {
        error.at(node.span())
    } else {
        error
    }
}

impl Transformer for &RuleSet {
    fn enter(&mut self, node: Node) -> Result<Option<Node>> {
        match self.direction {
            Direction::Descending => self.apply(node),
            Direction::Ascending => Ok(Some(node)),
        }
    }

    fn exit(&mut self, node: Node) -> Result<Option<Node>> {
        match self.direction {
            Direction::Ascending => self.apply(node),
            Direction::Descending => Ok(Some(node)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::make_sequence;

    fn number(value: i64) -> Node {
        Node::builder(Tag::Number, Span::default())
            .attr("value", value)
            .build()
    }

    fn stmts(values: &[i64]) -> Node {
        make_sequence(Tag::Stmts, values.iter().map(|v| number(*v)).collect(), None).unwrap()
    }

    fn matches(pattern: impl Into<Pattern>, node: &Node) -> Option<Bindings> {
        let predicate = predicate::compile(&pattern.into());
        let mut bindings = Bindings::default();
        predicate(&Value::Node(node.clone()), &mut bindings)
            .unwrap()
            .then_some(bindings)
    }

    #[test]
    fn many_gives_back_elements_for_the_tail() {
        let seq = stmts(&[1, 2, 3]);
        let pattern = sequence(
            vec![
                SeqItem::Many("init".into(), node(Tag::Number).into()),
                SeqItem::One(capture("last", node(Tag::Number))),
            ],
            None,
        );
        let b = matches(pattern, &seq).unwrap();
        assert_eq!(b.nodes("init").unwrap().len(), 2);
        assert_eq!(b.node("last").unwrap().int("value"), Some(3));
    }

    #[test]
    fn rest_captures_the_remaining_sequence() {
        let seq = stmts(&[1, 2, 3]);
        let pattern = sequence(vec![SeqItem::One(any())], Some("rest"));
        let b = matches(pattern, &seq).unwrap();
        let rest = b.node_opt("rest").unwrap();
        assert_eq!(rest.elements().len(), 2);
    }

    #[test]
    fn sequences_without_rest_must_be_consumed() {
        let seq = stmts(&[1, 2]);
        assert!(matches(sequence(vec![SeqItem::One(any())], None), &seq).is_none());
    }

    #[test]
    fn lt_and_absent() {
        let n = number(5);
        assert!(matches(node(Tag::Number).attr("value", lt(6)), &n).is_some());
        assert!(matches(node(Tag::Number).attr("value", lt(5)), &n).is_none());
        assert!(matches(node(Tag::Number).absent("type"), &n).is_some());
        assert!(matches(node(Tag::Number).absent("value"), &n).is_none());
    }

    #[test]
    fn require_turns_a_mismatch_into_an_error() {
        fn too_big(_: &Value) -> CompileError {
            CompileError::constant("too big", Span::default())
        }
        let predicate = predicate::compile(
            &node(Tag::Number)
                .attr("value", require(lt(3), too_big))
                .into(),
        );
        let mut bindings = Bindings::default();
        assert!(predicate(&Value::Node(number(7)), &mut bindings).is_err());
    }
}
