//! Named compiler passes.
//!
//! Each pass declares which node tags it introduces, uses and deletes
//! ([`PassInfo`]); the [`scheduler`] orders the passes from those sets
//! alone, so the list returned by [`standard_passes`] is unordered.
//!
//! Passes never mutate a tree: `run` returns a new root that shares every
//! untouched subtree with its input.

pub mod assemble;
pub mod constants;
pub mod flatten;
pub mod locals;
pub mod lowering;
pub mod names;
pub mod scheduler;
pub mod scope;
pub mod simplify;
pub mod storage;
pub mod structure;
pub mod typing;
pub mod units;

use crate::ast::{Dispatch, Hooks, Node};
use crate::errors::{CompileError, Result};
use crate::types::TypeInfo;

pub use scheduler::{schedule, ScheduleOptions};

/// Tag sets a pass declares to the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PassInfo {
    pub name: &'static str,
    pub introduces: &'static [&'static str],
    pub uses: &'static [&'static str],
    pub deletes: &'static [&'static str],
}

/// Read-only facts about the unit being compiled.
#[derive(Debug, Clone)]
pub struct PassContext {
    pub unit: String,
}

impl PassContext {
    pub fn new(unit: impl Into<String>) -> Self {
        Self { unit: unit.into() }
    }

    /// Symbol name of a unit-level declaration.
    pub fn symbol(&self, name: &str) -> String {
        format!("{}.{}", self.unit, name)
    }
}

pub trait Pass {
    fn info(&self) -> PassInfo;

    fn run(&self, tree: &Node, cx: &PassContext) -> Result<Node>;

    fn name(&self) -> &'static str {
        self.info().name
    }
}

/// Every pass of the compiler, in no particular order.
pub fn standard_passes() -> Vec<Box<dyn Pass>> {
    vec![
        Box::new(structure::ExplicitScopes),
        Box::new(units::ResolveUnits),
        Box::new(typing::ConstructTypes),
        Box::new(names::BindNames),
        Box::new(constants::EvaluateConstants),
        Box::new(constants::ResolveConstants),
        Box::new(constants::FoldArithmetic),
        Box::new(typing::PropagateTypes),
        Box::new(storage::ResolveStorage),
        Box::new(locals::AllocateLocals),
        Box::new(lowering::LowerCalls),
        Box::new(lowering::LowerAssignment),
        Box::new(lowering::LowerFunctions),
        Box::new(assemble::Assemble),
        Box::new(flatten::FlattenSymbol),
    ]
}

// ============================================================================
// HELPERS SHARED BY PASSES
// ============================================================================

/// Runs a hook table over the whole tree.
pub(crate) fn walk<P>(tree: &Node, state: &mut P, hooks: &Hooks<P>, pass: &str) -> Result<Node> {
    tree.transform(&mut Dispatch::new(state, hooks))?
        .ok_or_else(|| removed_root(pass))
}

pub(crate) fn removed_root(pass: &str) -> CompileError {
    CompileError::internal(format!("pass '{}' removed the unit", pass))
}

/// The type written in a declaration's `ty` attribute.
pub(crate) fn declared_type(node: &Node) -> Result<TypeInfo> {
    node.node("ty")
        .and_then(|ty| ty.ty("info"))
        .cloned()
        .ok_or_else(|| {
            CompileError::internal(format!("`{}` has no constructed type", node.tag())).at(node.span())
        })
}

/// The type `propagate_types` computed for an expression.
pub(crate) fn expr_type(node: &Node) -> Result<TypeInfo> {
    node.ty("type").cloned().ok_or_else(|| {
        CompileError::internal(format!("`{}` has not been typed", node.tag())).at(node.span())
    })
}

/// A required node attribute.
pub(crate) fn child(node: &Node, name: &str) -> Result<Node> {
    node.node(name).cloned().ok_or_else(|| {
        CompileError::internal(format!("`{}` is missing its `{}`", node.tag(), name)).at(node.span())
    })
}

/// A required string attribute.
pub(crate) fn text<'n>(node: &'n Node, name: &str) -> Result<&'n str> {
    node.str(name).ok_or_else(|| {
        CompileError::internal(format!("`{}` is missing its `{}`", node.tag(), name)).at(node.span())
    })
}
