//! Lowering of statements to machine-level operations on the accumulator.
//!
//! A function's return value travels in the accumulator and is denoted by
//! a `returned` node; arguments are stored into the callee's parameter
//! symbols before the `jump`.

use once_cell::sync::Lazy;

use crate::ast::{make_sequence, Hooks, Node, Tag};
use crate::errors::{CompileError, Result};
use crate::passes::names::param_symbols;
use crate::passes::{child, expr_type, text, walk, Pass, PassContext, PassInfo};
use crate::types::TypeInfo;

fn returned(ty: TypeInfo, at: &Node) -> Node {
    Node::builder(Tag::Returned, at.span()).attr("type", ty).build()
}

fn set(lvalue: Node, rvalue: Node, ty: TypeInfo, at: &Node) -> Node {
    Node::builder(Tag::Set, at.span())
        .attr("lvalue", lvalue)
        .attr("rvalue", rvalue)
        .attr("type", ty)
        .build()
}

fn rts(at: &Node) -> Node {
    Node::new(Tag::Rts, at.span())
}

/// Replaces the statement of a sequence node by several statements.
fn splice(node: &Node, stmts: Vec<Node>) -> Option<Node> {
    make_sequence(Tag::Stmts, stmts, node.node("next").cloned())
}

// ============================================================================
// LOWER CALLS
// ============================================================================

pub struct LowerCalls;

struct CallLowerer;

static CALLS: Lazy<Hooks<CallLowerer>> = Lazy::new(|| {
    Hooks::new()
        .on_enter(Tag::Stmts, CallLowerer::enter_stmts)
        .on_exit(Tag::Call, CallLowerer::exit_call)
});

impl CallLowerer {
    fn enter_stmts(&mut self, node: Node) -> Result<Option<Node>> {
        let Some(stmt) = node.node("stmt") else {
            return Ok(Some(node));
        };
        let expanded = expand(stmt)?;
        if expanded.len() == 1 && Node::ptr_eq(&expanded[0], stmt) {
            return Ok(Some(node));
        }
        Ok(splice(&node, expanded))
    }

    fn exit_call(&mut self, node: Node) -> Result<Option<Node>> {
        Err(CompileError::assembly(
            "calls are only supported as statements, assignments and return values",
            node.span(),
        ))
    }
}

/// Statement list replacing `stmt`, with every call at statement level
/// turned into parameter stores and a `jump`.
fn expand(stmt: &Node) -> Result<Vec<Node>> {
    match stmt.tag() {
        Tag::Call => lower_call(stmt),
        Tag::Set => match stmt.node("rvalue").filter(|r| r.is(Tag::Call)) {
            Some(call) => {
                let mut out = lower_call(call)?;
                let lvalue = child(stmt, "lvalue")?;
                let ty = expr_type(stmt)?;
                out.push(set(lvalue, returned(expr_type(call)?, call), ty, stmt));
                Ok(out)
            }
            None => Ok(vec![stmt.clone()]),
        },
        Tag::Return => match stmt.node("value").filter(|v| v.is(Tag::Call)) {
            Some(call) => {
                let mut out = lower_call(call)?;
                out.push(stmt.with_attr("value", returned(expr_type(call)?, call)));
                Ok(out)
            }
            None => Ok(vec![stmt.clone()]),
        },
        _ => Ok(vec![stmt.clone()]),
    }
}

fn lower_call(call: &Node) -> Result<Vec<Node>> {
    let callee = child(call, "callee")?;
    let TypeInfo::Function { args: param_types, .. } = expr_type(&callee)? else {
        return Err(CompileError::internal("callee without a function type").at(call.span()));
    };
    let symbols = param_symbols(&callee);
    let args = call.node("args").map(Node::elements).unwrap_or_default();

    let mut out = Vec::new();
    for ((arg, symbol), ty) in args.iter().zip(&symbols).zip(param_types) {
        let storage = Node::builder(Tag::AbsoluteStorage, arg.span())
            .attr("symbol", symbol.as_str())
            .attr("zero_page", false)
            .attr("type", ty.clone())
            .build();
        out.extend(expand(&set(storage, arg.clone(), ty, arg))?);
    }
    out.push(
        Node::builder(Tag::Jump, call.span())
            .attr("symbol", text(&callee, "symbol")?)
            .attr("link", true)
            .build(),
    );
    Ok(out)
}

impl Pass for LowerCalls {
    fn info(&self) -> PassInfo {
        PassInfo {
            name: "lower_calls",
            introduces: &["jump", "set"],
            uses: &["type", "data_symbol", "return"],
            deletes: &["call"],
        }
    }

    fn run(&self, tree: &Node, _cx: &PassContext) -> Result<Node> {
        walk(tree, &mut CallLowerer, &CALLS, self.name())
    }
}

// ============================================================================
// LOWER ASSIGNMENT
// ============================================================================

pub struct LowerAssignment;

struct AssignmentLowerer;

static ASSIGNMENT: Lazy<Hooks<AssignmentLowerer>> =
    Lazy::new(|| Hooks::new().on_exit(Tag::Stmts, AssignmentLowerer::exit_stmts));

fn is_operand(node: &Node) -> bool {
    matches!(
        node.tag(),
        Tag::ImmediateStorage | Tag::AbsoluteStorage | Tag::Number
    )
}

/// Whether a literal of `width` bytes, signed or unsigned, holds `value`.
fn literal_fits(value: i64, width: usize) -> bool {
    match width {
        0 => false,
        1..=7 => {
            let bits = width as u32 * 8;
            (-(1i64 << (bits - 1))..(1i64 << bits)).contains(&value)
        }
        _ => true,
    }
}

/// Rejects an operand whose size differs from the operation it feeds.
fn check_width(expr: &Node, width: usize) -> Result<()> {
    if matches!(expr.tag(), Tag::ImmediateStorage | Tag::Number) {
        return match expr.int("value") {
            Some(value) if !literal_fits(value, width) => Err(CompileError::assembly(
                format!("literal {} does not fit in {} byte(s)", value, width),
                expr.span(),
            )),
            _ => Ok(()),
        };
    }
    match expr.ty("type") {
        Some(ty) if ty.width() != width => Err(CompileError::assembly(
            format!("`{}` is {} byte(s) wide, expected {}", ty, ty.width(), width),
            expr.span(),
        )),
        _ => Ok(()),
    }
}

/// Instructions leaving the value of `expr` in the accumulator.
pub(crate) fn load_expr(expr: &Node, width: usize) -> Result<Vec<Node>> {
    check_width(expr, width)?;
    if is_operand(expr) {
        return Ok(vec![Node::builder(Tag::Load, expr.span())
            .attr("operand", expr.clone())
            .attr("width", width as i64)
            .build()]);
    }
    match expr.tag() {
        Tag::Returned => Ok(Vec::new()),
        Tag::Binop => {
            let op = text(expr, "op")?;
            if op != "+" && op != "-" {
                return Err(CompileError::assembly(
                    format!("operator `{}` has no machine equivalent", op),
                    expr.span(),
                ));
            }
            let rhs = child(expr, "rhs")?;
            if !is_operand(&rhs) {
                return Err(CompileError::assembly(
                    "the right operand must be a variable or a literal",
                    rhs.span(),
                ));
            }
            check_width(&rhs, width)?;
            let mut out = load_expr(&child(expr, "lhs")?, width)?;
            out.push(
                Node::builder(Tag::Arith, expr.span())
                    .attr("op", op)
                    .attr("operand", rhs)
                    .attr("width", width as i64)
                    .build(),
            );
            Ok(out)
        }
        _ => Err(CompileError::assembly(
            format!("cannot evaluate `{}` at run time", expr.tag()),
            expr.span(),
        )),
    }
}

impl AssignmentLowerer {
    fn exit_stmts(&mut self, node: Node) -> Result<Option<Node>> {
        let Some(stmt) = node.node("stmt").filter(|s| s.is(Tag::Set)) else {
            return Ok(Some(node));
        };
        let lvalue = child(stmt, "lvalue")?;
        if !lvalue.is(Tag::AbsoluteStorage) {
            return Err(CompileError::assembly(
                "only variables and constant addresses can be assigned",
                lvalue.span(),
            ));
        }
        let width = expr_type(stmt)?.width();
        let target = expr_type(&lvalue)?;
        if target.width() != width {
            return Err(CompileError::internal(format!(
                "assignment of {} byte(s) into `{}`",
                width, target
            ))
            .at(lvalue.span()));
        }
        let mut out = load_expr(&child(stmt, "rvalue")?, width)?;
        out.push(
            Node::builder(Tag::Store, stmt.span())
                .attr("operand", lvalue)
                .attr("width", width as i64)
                .build(),
        );
        Ok(splice(&node, out))
    }
}

impl Pass for LowerAssignment {
    fn info(&self) -> PassInfo {
        PassInfo {
            name: "lower_assignment",
            introduces: &["load", "store"],
            uses: &["set", "immediate_storage"],
            deletes: &["set"],
        }
    }

    fn run(&self, tree: &Node, _cx: &PassContext) -> Result<Node> {
        walk(tree, &mut AssignmentLowerer, &ASSIGNMENT, self.name())
    }
}

// ============================================================================
// LOWER FUNCTIONS
// ============================================================================

pub struct LowerFunctions;

struct FunctionLowerer;

static FUNCTIONS: Lazy<Hooks<FunctionLowerer>> = Lazy::new(|| {
    Hooks::new()
        .on_exit(Tag::Stmts, FunctionLowerer::exit_stmts)
        .on_exit(Tag::Fun, FunctionLowerer::exit_fun)
});

impl FunctionLowerer {
    fn exit_stmts(&mut self, node: Node) -> Result<Option<Node>> {
        let Some(stmt) = node.node("stmt").filter(|s| s.is(Tag::Return)) else {
            return Ok(Some(node));
        };
        let mut out = match stmt.node("value") {
            Some(value) => load_expr(value, expr_type(stmt)?.width())?,
            None => Vec::new(),
        };
        out.push(rts(stmt));
        Ok(splice(&node, out))
    }

    /// Falling off the end of a function returns.
    fn exit_fun(&mut self, node: Node) -> Result<Option<Node>> {
        let mut body = node.node("body").map(Node::elements).unwrap_or_default();
        if body.last().map_or(false, |last| last.is(Tag::Rts)) {
            return Ok(Some(node));
        }
        body.push(rts(&node));
        Ok(Some(
            node.to_builder()
                .attr_opt("body", make_sequence(Tag::Stmts, body, None))
                .build(),
        ))
    }
}

impl Pass for LowerFunctions {
    fn info(&self) -> PassInfo {
        PassInfo {
            name: "lower_functions",
            introduces: &["rts", "load"],
            uses: &["locals", "store"],
            deletes: &["return"],
        }
    }

    fn run(&self, tree: &Node, _cx: &PassContext) -> Result<Node> {
        walk(tree, &mut FunctionLowerer, &FUNCTIONS, self.name())
    }
}
