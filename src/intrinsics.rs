//! Built-in units that `use` can bind.
//!
//! Intrinsic members run at compile time: they receive their already
//! evaluated argument subtrees and return the replacement subtree.

use std::fmt;

use once_cell::sync::Lazy;

use crate::ast::{Node, Tag};
use crate::errors::{CompileError, Result};
use crate::syntax::Span;
use crate::types::TypeInfo;

pub type IntrinsicFn = fn(&[Node], Span) -> Result<Node>;

pub struct Member {
    pub name: &'static str,
    pub ty: TypeInfo,
    pub eval: IntrinsicFn,
}

pub struct IntrinsicUnit {
    pub name: &'static str,
    pub members: Vec<Member>,
}

impl IntrinsicUnit {
    pub fn member(&self, name: &str) -> Option<&Member> {
        self.members.iter().find(|m| m.name == name)
    }
}

impl PartialEq for IntrinsicUnit {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for IntrinsicUnit {}

impl fmt::Debug for IntrinsicUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.members.iter().map(|m| m.name).collect();
        f.debug_struct("IntrinsicUnit")
            .field("name", &self.name)
            .field("members", &names)
            .finish()
    }
}

/// Memory access helpers.
pub static MEM: Lazy<IntrinsicUnit> = Lazy::new(|| IntrinsicUnit {
    name: "mem",
    members: vec![
        Member {
            name: "addr8",
            ty: TypeInfo::function(TypeInfo::reference(TypeInfo::U8), vec![TypeInfo::U16]),
            eval: addr8,
        },
        Member {
            name: "addr16",
            ty: TypeInfo::function(TypeInfo::reference(TypeInfo::U16), vec![TypeInfo::U16]),
            eval: addr16,
        },
        Member {
            name: "lo",
            ty: TypeInfo::function(TypeInfo::U8, vec![TypeInfo::U16]),
            eval: lo,
        },
        Member {
            name: "hi",
            ty: TypeInfo::function(TypeInfo::U8, vec![TypeInfo::U16]),
            eval: hi,
        },
    ],
});

pub fn lookup_unit(name: &str) -> Option<&'static IntrinsicUnit> {
    match name {
        "mem" => Some(&*MEM),
        _ => None,
    }
}

fn typed_number(value: i64, ty: TypeInfo, span: Span) -> Node {
    Node::builder(Tag::Number, span)
        .attr("value", value)
        .attr("type", ty)
        .build()
}

/// The single 16-bit argument of a `mem` member.
fn word_argument(args: &[Node], span: Span) -> Result<i64> {
    let [arg] = args else {
        return Err(CompileError::constant(
            format!("expected 1 argument, found {}", args.len()),
            span,
        ));
    };
    let value = arg
        .int("value")
        .filter(|_| arg.is(Tag::Number))
        .ok_or_else(|| CompileError::constant("argument is not a constant number", arg.span()))?;
    if !TypeInfo::U16.fits(value) {
        return Err(CompileError::constant(
            format!("{} does not fit in 16 bits", value),
            arg.span(),
        ));
    }
    Ok(value)
}

fn addr8(args: &[Node], span: Span) -> Result<Node> {
    let address = word_argument(args, span)?;
    Ok(typed_number(address, TypeInfo::reference(TypeInfo::U8), span))
}

fn addr16(args: &[Node], span: Span) -> Result<Node> {
    let address = word_argument(args, span)?;
    Ok(typed_number(address, TypeInfo::reference(TypeInfo::U16), span))
}

fn lo(args: &[Node], span: Span) -> Result<Node> {
    let value = word_argument(args, span)?;
    Ok(typed_number(value & 0xff, TypeInfo::U8, span))
}

fn hi(args: &[Node], span: Span) -> Result<Node> {
    let value = word_argument(args, span)?;
    Ok(typed_number((value >> 8) & 0xff, TypeInfo::U8, span))
}
