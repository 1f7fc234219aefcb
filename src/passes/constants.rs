//! Compile-time evaluation.
//!
//! * `evaluate_constants` folds every `constant` item, checks it against
//!   its declared type, records it in the unit's `constants` table and
//!   removes the item. Calls of intrinsic members are evaluated here too.
//! * `resolve_constants` replaces references to constants by their value.
//! * `fold_arithmetic` folds operators whose operands are all literals.

use once_cell::sync::Lazy;

use crate::ast::{Hooks, Node, Tag};
use crate::errors::{CompileError, Result};
use crate::passes::names::CONSTANT;
use crate::passes::scope::{walk_scoped, Scoped, Scopes};
use crate::passes::{child, declared_type, text, Pass, PassContext, PassInfo};
use crate::patterns::{any, capture, node, Bindings, Direction, Rule, RuleSet};
use crate::syntax::Span;

/// Applies a binary operator, reporting overflow.
pub fn apply_binop(op: &str, lhs: i64, rhs: i64, span: Span) -> Result<i64> {
    let result = match op {
        "+" => lhs.checked_add(rhs),
        "-" => lhs.checked_sub(rhs),
        "*" => lhs.checked_mul(rhs),
        _ => return Err(CompileError::constant(format!("unknown operator `{}`", op), span)),
    };
    result.ok_or_else(|| CompileError::constant("arithmetic overflow", span))
}

fn number(value: i64, like: &Node, span: Span) -> Node {
    Node::builder(Tag::Number, span)
        .attr("value", value)
        .attr_opt("type", like.ty("type").cloned())
        .build()
}

// ============================================================================
// EVALUATE CONSTANTS
// ============================================================================

pub struct EvaluateConstants;

#[derive(Default)]
struct Evaluator {
    scopes: Scopes,
}

impl Scoped for Evaluator {
    fn scopes(&mut self) -> &mut Scopes {
        &mut self.scopes
    }
}

static EVALUATE: Lazy<Hooks<Evaluator>> = Lazy::new(|| {
    Hooks::new()
        .on_exit(Tag::Constant, Evaluator::exit_constant)
        .on_exit(Tag::Call, Evaluator::exit_call)
});

impl Evaluator {
    fn fold(&self, node: &Node) -> Result<i64> {
        match node.tag() {
            Tag::Number => node
                .int("value")
                .ok_or_else(|| CompileError::internal("number without a value")),
            Tag::Binop => {
                let lhs = self.fold(&child(node, "lhs")?)?;
                let rhs = self.fold(&child(node, "rhs")?)?;
                apply_binop(text(node, "op")?, lhs, rhs, node.span())
            }
            Tag::Neg => {
                let operand = self.fold(&child(node, "operand")?)?;
                operand
                    .checked_neg()
                    .ok_or_else(|| CompileError::constant("arithmetic overflow", node.span()))
            }
            Tag::Paren => self.fold(&child(node, "expr")?),
            Tag::Ident => {
                let name = text(node, "name")?;
                let is_constant = node
                    .node("binding")
                    .map_or(false, |b| b.str("kind") == Some(CONSTANT));
                if !is_constant {
                    return Err(CompileError::constant(
                        format!("`{}` is not a constant", name),
                        node.span(),
                    ));
                }
                self.scopes
                    .constant(name)
                    .and_then(|c| c.int("value"))
                    .ok_or_else(|| {
                        CompileError::constant(
                            format!("constant `{}` is used before its definition", name),
                            node.span(),
                        )
                    })
            }
            _ => Err(CompileError::constant("not a constant expression", node.span())),
        }
    }

    fn exit_constant(&mut self, node: Node) -> Result<Option<Node>> {
        let name = text(&node, "name")?.to_string();
        let expr = child(&node, "value")?;
        let value = self.fold(&expr)?;
        let declared = declared_type(&node)?;
        if !declared.fits(value) {
            return Err(CompileError::constant(
                format!("{} does not fit in `{}`", value, declared),
                expr.span(),
            ));
        }
        let folded = Node::builder(Tag::Number, expr.span())
            .attr("value", value)
            .attr("type", declared)
            .build();
        tracing::trace!(constant = %name, value, "evaluated constant");
        self.scopes.define_constant(&name, folded);
        Ok(None)
    }

    fn exit_call(&mut self, node: Node) -> Result<Option<Node>> {
        let target = child(&node, "target")?;
        if !target.is(Tag::Intrinsic) {
            return Ok(Some(node));
        }
        let unit = target
            .get("unit")
            .and_then(|u| u.as_unit())
            .ok_or_else(|| CompileError::internal("intrinsic without a unit"))?;
        let name = text(&target, "member")?;
        let member = unit.member(name).ok_or_else(|| {
            CompileError::internal(format!("unit `{}` has no member `{}`", unit.name, name))
        })?;

        let mut args = Vec::new();
        for arg in node.node("args").map(Node::elements).unwrap_or_default() {
            let value = self.fold(&arg)?;
            args.push(number(value, &arg, arg.span()));
        }
        (member.eval)(&args, node.span()).map(Some)
    }
}

impl Pass for EvaluateConstants {
    fn info(&self) -> PassInfo {
        PassInfo {
            name: "evaluate_constants",
            introduces: &["constant_value"],
            uses: &["binding", "intrinsic", "scope"],
            deletes: &["constant", "intrinsic"],
        }
    }

    fn run(&self, tree: &Node, _cx: &PassContext) -> Result<Node> {
        walk_scoped(tree, &mut Evaluator::default(), &EVALUATE, self.name())
    }
}

// ============================================================================
// RESOLVE CONSTANTS
// ============================================================================

pub struct ResolveConstants;

#[derive(Default)]
struct Resolver {
    scopes: Scopes,
}

impl Scoped for Resolver {
    fn scopes(&mut self) -> &mut Scopes {
        &mut self.scopes
    }
}

static RESOLVE: Lazy<Hooks<Resolver>> =
    Lazy::new(|| Hooks::new().on_exit(Tag::Ident, Resolver::exit_ident));

impl Resolver {
    fn exit_ident(&mut self, node: Node) -> Result<Option<Node>> {
        let refers_to_constant = node
            .node("binding")
            .map_or(false, |b| b.str("kind") == Some(CONSTANT));
        if !refers_to_constant {
            return Ok(Some(node));
        }
        let name = text(&node, "name")?;
        let value = self.scopes.constant(name).ok_or_else(|| {
            CompileError::internal(format!("constant `{}` was never evaluated", name)).at(node.span())
        })?;
        Ok(Some(value.with_span(node.span())))
    }
}

impl Pass for ResolveConstants {
    fn info(&self) -> PassInfo {
        PassInfo {
            name: "resolve_constants",
            introduces: &["number"],
            uses: &["constant_value", "scope"],
            deletes: &[],
        }
    }

    fn run(&self, tree: &Node, _cx: &PassContext) -> Result<Node> {
        walk_scoped(tree, &mut Resolver::default(), &RESOLVE, self.name())
    }
}

// ============================================================================
// FOLD ARITHMETIC
// ============================================================================

pub struct FoldArithmetic;

static FOLD: Lazy<RuleSet> = Lazy::new(|| {
    RuleSet::compile(
        "fold_arithmetic",
        Direction::Ascending,
        vec![
            Rule::new(
                node(Tag::Binop)
                    .attr("op", capture("op", any()))
                    .attr("lhs", capture("lhs", node(Tag::Number)))
                    .attr("rhs", capture("rhs", node(Tag::Number))),
                fold_binop,
            ),
            Rule::new(
                node(Tag::Neg).attr("operand", capture("operand", node(Tag::Number))),
                fold_neg,
            ),
        ],
    )
});

fn fold_binop(b: &Bindings, matched: &Node) -> Result<Option<Node>> {
    let lhs = b.node("lhs")?;
    let rhs = b.node("rhs")?;
    let (l, r) = (lhs.int("value").unwrap_or(0), rhs.int("value").unwrap_or(0));
    let value = apply_binop(b.str("op")?, l, r, matched.span())?;
    Ok(Some(number(value, &lhs, matched.span())))
}

fn fold_neg(b: &Bindings, matched: &Node) -> Result<Option<Node>> {
    let operand = b.node("operand")?;
    let value = operand
        .int("value")
        .unwrap_or(0)
        .checked_neg()
        .ok_or_else(|| CompileError::constant("arithmetic overflow", matched.span()))?;
    Ok(Some(number(value, &operand, matched.span())))
}

impl Pass for FoldArithmetic {
    fn info(&self) -> PassInfo {
        PassInfo {
            name: "fold_arithmetic",
            introduces: &["number"],
            uses: &["number", "binop"],
            deletes: &[],
        }
    }

    fn run(&self, tree: &Node, _cx: &PassContext) -> Result<Node> {
        FOLD.run(tree)
    }
}
