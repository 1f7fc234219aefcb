//! Type construction and propagation.
//!
//! `construct_types` turns written types (`type_name`, `type_ref`) into
//! `type_info{info}` nodes. `propagate_types` gives every expression a
//! `type` attribute and checks assignments, calls, dereferences and
//! returns.

use once_cell::sync::Lazy;

use crate::ast::{Hooks, Node, Tag};
use crate::errors::{CompileError, ErrorKind, Result};
use crate::passes::scope::{walk_scoped, Scoped, Scopes};
use crate::passes::{child, declared_type, expr_type, Pass, PassContext, PassInfo};
use crate::patterns::{any, capture, node, Bindings, Direction, Rule, RuleSet};
use crate::types::TypeInfo;

// ============================================================================
// CONSTRUCT TYPES
// ============================================================================

pub struct ConstructTypes;

static CONSTRUCT: Lazy<RuleSet> = Lazy::new(|| {
    RuleSet::compile(
        "construct_types",
        Direction::Ascending,
        vec![
            Rule::new(
                node(Tag::TypeName).attr("name", capture("name", any())),
                named_type,
            ),
            Rule::new(
                node(Tag::TypeRef).attr(
                    "target",
                    node(Tag::TypeInfo).attr("info", capture("target", any())),
                ),
                reference_type,
            ),
        ],
    )
});

fn type_info(info: TypeInfo, matched: &Node) -> Node {
    Node::builder(Tag::TypeInfo, matched.span())
        .attr("info", info)
        .build()
}

fn named_type(b: &Bindings, matched: &Node) -> Result<Option<Node>> {
    let name = b.str("name")?;
    let info = TypeInfo::from_name(name).ok_or_else(|| {
        CompileError::new(ErrorKind::UnknownName {
            name: name.to_string(),
        })
    })?;
    Ok(Some(type_info(info, matched)))
}

fn reference_type(b: &Bindings, matched: &Node) -> Result<Option<Node>> {
    Ok(Some(type_info(TypeInfo::reference(b.ty("target")?), matched)))
}

impl Pass for ConstructTypes {
    fn info(&self) -> PassInfo {
        PassInfo {
            name: "construct_types",
            introduces: &["type_info"],
            uses: &["type_name", "type_ref"],
            deletes: &["type_name", "type_ref"],
        }
    }

    fn run(&self, tree: &Node, _cx: &PassContext) -> Result<Node> {
        CONSTRUCT.run(tree)
    }
}

// ============================================================================
// PROPAGATE TYPES
// ============================================================================

pub struct PropagateTypes;

#[derive(Default)]
struct Typer {
    scopes: Scopes,
    /// Return types of the enclosing functions.
    returns: Vec<TypeInfo>,
}

impl Scoped for Typer {
    fn scopes(&mut self) -> &mut Scopes {
        &mut self.scopes
    }
}

static HOOKS: Lazy<Hooks<Typer>> = Lazy::new(|| {
    Hooks::new()
        .on_enter(Tag::Fun, Typer::enter_fun)
        .on_exit(Tag::Fun, Typer::exit_fun)
        .on_exit(Tag::Number, Typer::exit_number)
        .on_exit(Tag::Str, Typer::exit_string)
        .on_exit(Tag::Ident, Typer::exit_ident)
        .on_exit(Tag::Deref, Typer::exit_deref)
        .on_exit(Tag::Binop, Typer::exit_binop)
        .on_exit(Tag::Neg, Typer::exit_neg)
        .on_exit(Tag::Call, Typer::exit_call)
        .on_exit(Tag::Set, Typer::exit_set)
        .on_exit(Tag::Let, Typer::exit_let)
        .on_exit(Tag::Return, Typer::exit_return)
        .on_exit(Tag::Intrinsic, Typer::exit_intrinsic)
        .on_exit(Tag::Member, Typer::exit_member)
});

/// Whether a value of `node`'s type may be stored into `target`. Literals
/// are judged by value rather than by their inferred type.
fn assignable(target: &TypeInfo, node: &Node) -> Result<bool> {
    if node.is(Tag::Number) {
        if let Some(value) = node.int("value") {
            if target.fits(value) {
                return Ok(true);
            }
        }
    }
    Ok(target.can_assign_from(&expr_type(node)?))
}

fn mismatch(target: &TypeInfo, node: &Node) -> Result<CompileError> {
    Ok(CompileError::type_error(
        format!("expected `{}`, found `{}`", target, expr_type(node)?),
        node.span(),
    ))
}

fn function_type(node: &Node) -> Result<TypeInfo> {
    let ret = match node.node("ret") {
        Some(ret) => ret
            .ty("info")
            .cloned()
            .ok_or_else(|| CompileError::internal("return type was not constructed"))?,
        None => TypeInfo::Void,
    };
    let mut args = Vec::new();
    if let Some(params) = node.node("params") {
        for param in params.elements() {
            args.push(declared_type(&param)?);
        }
    }
    Ok(TypeInfo::function(ret, args))
}

impl Typer {
    fn enter_fun(&mut self, node: Node) -> Result<Option<Node>> {
        if let TypeInfo::Function { ret, .. } = function_type(&node)? {
            self.returns.push(*ret);
        }
        Ok(Some(node))
    }

    fn exit_fun(&mut self, node: Node) -> Result<Option<Node>> {
        self.returns.pop();
        let ty = function_type(&node)?;
        Ok(Some(node.with_attr("type", ty)))
    }

    fn exit_number(&mut self, node: Node) -> Result<Option<Node>> {
        if node.has("type") {
            return Ok(Some(node));
        }
        let value = node.int("value").unwrap_or_default();
        Ok(Some(node.with_attr("type", TypeInfo::for_literal(value))))
    }

    fn exit_string(&mut self, node: Node) -> Result<Option<Node>> {
        Ok(Some(node.with_attr("type", TypeInfo::Phantom("str".into()))))
    }

    fn exit_ident(&mut self, node: Node) -> Result<Option<Node>> {
        let name = node.str("name").unwrap_or_default();
        let binding = node.node("binding").ok_or_else(|| {
            CompileError::new(ErrorKind::UnknownName {
                name: name.to_string(),
            })
            .at(node.span())
        })?;
        let ty = expr_type(binding)?;
        Ok(Some(node.with_attr("type", ty)))
    }

    fn exit_deref(&mut self, node: Node) -> Result<Option<Node>> {
        let target = child(&node, "target")?;
        let ty = match expr_type(&target)? {
            TypeInfo::Ref(inner) => *inner,
            TypeInfo::Int { .. } if target.is(Tag::Number) => {
                let address = target.int("value").unwrap_or(-1);
                if !(0..=0xffff).contains(&address) {
                    return Err(CompileError::type_error(
                        format!("{} is not an address", address),
                        target.span(),
                    ));
                }
                TypeInfo::U8
            }
            other => {
                return Err(CompileError::type_error(
                    format!("cannot dereference a value of type `{}`", other),
                    target.span(),
                ))
            }
        };
        Ok(Some(node.with_attr("type", ty)))
    }

    fn exit_binop(&mut self, node: Node) -> Result<Option<Node>> {
        let lhs = child(&node, "lhs")?;
        let rhs = child(&node, "rhs")?;
        let (left, right) = (expr_type(&lhs)?, expr_type(&rhs)?);
        for (side, ty) in [(&lhs, &left), (&rhs, &right)] {
            if !matches!(ty, TypeInfo::Int { .. }) {
                return Err(CompileError::type_error(
                    format!("arithmetic on a value of type `{}`", ty),
                    side.span(),
                ));
            }
        }
        let ty = if assignable(&left, &rhs)? {
            left
        } else if assignable(&right, &lhs)? {
            right
        } else {
            return Err(CompileError::type_error(
                format!("operands have incompatible types `{}` and `{}`", left, right),
                node.span(),
            ));
        };
        Ok(Some(node.with_attr("type", ty)))
    }

    fn exit_neg(&mut self, node: Node) -> Result<Option<Node>> {
        let operand = child(&node, "operand")?;
        let ty = expr_type(&operand)?;
        if !matches!(ty, TypeInfo::Int { .. }) {
            return Err(CompileError::type_error(
                format!("cannot negate a value of type `{}`", ty),
                operand.span(),
            ));
        }
        Ok(Some(node.with_attr("type", ty)))
    }

    fn exit_call(&mut self, node: Node) -> Result<Option<Node>> {
        let target = child(&node, "target")?;
        let callee = target
            .node("binding")
            .filter(|b| b.str("kind") == Some("fun"))
            .cloned()
            .ok_or_else(|| {
                CompileError::type_error("only functions can be called", target.span())
            })?;
        let TypeInfo::Function { ret, args: params } = expr_type(&callee)? else {
            return Err(CompileError::internal("function binding without a function type"));
        };

        let args = node.node("args").map(Node::elements).unwrap_or_default();
        if args.len() != params.len() {
            return Err(CompileError::type_error(
                format!(
                    "`{}` takes {} argument(s), found {}",
                    target.str("name").unwrap_or_default(),
                    params.len(),
                    args.len()
                ),
                node.span(),
            ));
        }
        for (arg, param) in args.iter().zip(&params) {
            if !assignable(param, arg)? {
                return Err(mismatch(param, arg)?);
            }
        }
        Ok(Some(
            node.to_builder()
                .attr("type", *ret)
                .attr("callee", callee)
                .build(),
        ))
    }

    fn exit_set(&mut self, node: Node) -> Result<Option<Node>> {
        let lvalue = child(&node, "lvalue")?;
        let rvalue = child(&node, "rvalue")?;
        if let Some(binding) = lvalue.node("binding") {
            if binding.bool("mutable") != Some(true) {
                return Err(CompileError::type_error(
                    format!(
                        "cannot assign to immutable `{}`",
                        lvalue.str("name").unwrap_or_default()
                    ),
                    lvalue.span(),
                )
                .with_help("declare it with `let mut` or `let stash`"));
            }
        }
        let target = expr_type(&lvalue)?;
        if !assignable(&target, &rvalue)? {
            return Err(mismatch(&target, &rvalue)?);
        }
        Ok(Some(node.with_attr("type", target)))
    }

    fn exit_let(&mut self, node: Node) -> Result<Option<Node>> {
        let declared = declared_type(&node)?;
        let value = child(&node, "value")?;
        if !assignable(&declared, &value)? {
            return Err(mismatch(&declared, &value)?);
        }
        Ok(Some(node.with_attr("type", declared)))
    }

    fn exit_return(&mut self, node: Node) -> Result<Option<Node>> {
        let expected = self.returns.last().cloned().unwrap_or(TypeInfo::Void);
        match (node.node("value"), &expected) {
            (None, TypeInfo::Void) => {}
            (None, _) => {
                return Err(CompileError::type_error(
                    format!("missing return value of type `{}`", expected),
                    node.span(),
                ))
            }
            (Some(value), TypeInfo::Void) => {
                return Err(CompileError::type_error(
                    "this function does not return a value",
                    value.span(),
                ))
            }
            (Some(value), _) => {
                if !assignable(&expected, value)? {
                    return Err(mismatch(&expected, value)?);
                }
            }
        }
        Ok(Some(node.with_attr("type", expected)))
    }

    fn exit_intrinsic(&mut self, node: Node) -> Result<Option<Node>> {
        Err(CompileError::type_error(
            format!(
                "`{}` must be called with constant arguments",
                node.str("member").unwrap_or_default()
            ),
            node.span(),
        ))
    }

    fn exit_member(&mut self, node: Node) -> Result<Option<Node>> {
        Err(CompileError::type_error("only units have members", node.span()))
    }
}

impl Pass for PropagateTypes {
    fn info(&self) -> PassInfo {
        PassInfo {
            name: "propagate_types",
            introduces: &["type"],
            uses: &["binding", "number", "scope", "deref"],
            deletes: &[],
        }
    }

    fn run(&self, tree: &Node, _cx: &PassContext) -> Result<Node> {
        walk_scoped(tree, &mut Typer::default(), &HOOKS, self.name())
    }
}
