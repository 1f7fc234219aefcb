//! `assemble`: encodes machine-level operations as 6502 instructions.
//!
//! Every `load`, `store`, `arith`, `jump` and `rts` becomes a
//! `code{bytes, relocs}` node. Operands naming a symbol are emitted as
//! zero bytes plus a relocation the linker patches.

use once_cell::sync::Lazy;

use crate::archive::{Relocation, RelocationKind};
use crate::ast::{Node, Tag, Value};
use crate::errors::{CompileError, ErrorKind, Result};
use crate::passes::{text, Pass, PassContext, PassInfo};
use crate::patterns::{any, capture, eq, node, require, Bindings, Direction, Rule, RuleSet};

pub struct Assemble;

/// Opcodes of one instruction by addressing mode.
struct Opcodes {
    immediate: Option<u8>,
    zero_page: u8,
    absolute: u8,
}

const LDA: Opcodes = Opcodes {
    immediate: Some(0xA9),
    zero_page: 0xA5,
    absolute: 0xAD,
};

const STA: Opcodes = Opcodes {
    immediate: None,
    zero_page: 0x85,
    absolute: 0x8D,
};

const ADC: Opcodes = Opcodes {
    immediate: Some(0x69),
    zero_page: 0x65,
    absolute: 0x6D,
};

const SBC: Opcodes = Opcodes {
    immediate: Some(0xE9),
    zero_page: 0xE5,
    absolute: 0xED,
};

const CLC: u8 = 0x18;
const SEC: u8 = 0x38;
const JSR: u8 = 0x20;
const JMP: u8 = 0x4C;
const RTS: u8 = 0x60;

static ASSEMBLE: Lazy<RuleSet> = Lazy::new(|| {
    let byte_wide = || require(eq(1i64), wide_operation);
    RuleSet::compile(
        "assemble",
        Direction::Ascending,
        vec![
            Rule::new(
                node(Tag::Load)
                    .attr("width", byte_wide())
                    .attr("operand", capture("operand", any())),
                assemble_load,
            ),
            Rule::new(
                node(Tag::Store)
                    .attr("width", byte_wide())
                    .attr("operand", capture("operand", any())),
                assemble_store,
            ),
            Rule::new(
                node(Tag::Arith)
                    .attr("width", byte_wide())
                    .attr("op", capture("op", any()))
                    .attr("operand", capture("operand", any())),
                assemble_arith,
            ),
            Rule::new(
                node(Tag::Jump)
                    .attr("symbol", capture("symbol", any()))
                    .attr("link", capture("link", any())),
                assemble_jump,
            ),
            Rule::new(node(Tag::Rts), assemble_rts),
        ],
    )
});

fn wide_operation(width: &Value) -> CompileError {
    CompileError::new(ErrorKind::Assembly {
        message: format!("{}-byte operations are not supported", width),
    })
    .with_help("only 8-bit values can be loaded and stored")
}

fn code(bytes: Vec<u8>, relocs: Vec<Relocation>, matched: &Node) -> Node {
    Node::builder(Tag::Code, matched.span())
        .attr("bytes", bytes)
        .attr("relocs", relocs)
        .build()
}

/// Appends one instruction with `operand` to `bytes`.
fn encode(
    opcodes: &Opcodes,
    operand: &Node,
    bytes: &mut Vec<u8>,
    relocs: &mut Vec<Relocation>,
) -> Result<()> {
    match operand.tag() {
        Tag::ImmediateStorage => {
            let opcode = opcodes.immediate.ok_or_else(|| {
                CompileError::assembly("cannot store into a literal", operand.span())
            })?;
            let value = operand.int("value").unwrap_or_default();
            bytes.extend([opcode, value as u8]);
        }
        Tag::AbsoluteStorage => {
            let zero_page = operand.bool("zero_page").unwrap_or(false);
            if let Some(symbol) = operand.str("symbol") {
                let offset = bytes.len() + 1;
                if zero_page {
                    bytes.extend([opcodes.zero_page, 0]);
                    relocs.push(Relocation::new(offset, symbol, RelocationKind::ZeroPage8));
                } else {
                    bytes.extend([opcodes.absolute, 0, 0]);
                    relocs.push(Relocation::new(offset, symbol, RelocationKind::Absolute16));
                }
            } else {
                let address = operand.int("address").ok_or_else(|| {
                    CompileError::internal("storage without an address or symbol").at(operand.span())
                })?;
                let [lo, hi, ..] = address.to_le_bytes();
                if zero_page {
                    bytes.extend([opcodes.zero_page, lo]);
                } else {
                    bytes.extend([opcodes.absolute, lo, hi]);
                }
            }
        }
        Tag::Number => {
            return Err(CompileError::assembly(
                format!(
                    "{} does not fit in an 8-bit operand",
                    operand.int("value").unwrap_or_default()
                ),
                operand.span(),
            ))
        }
        other => {
            return Err(CompileError::assembly(
                format!("unresolved operand `{}`", other),
                operand.span(),
            ))
        }
    }
    Ok(())
}

fn single(opcodes: &Opcodes, b: &Bindings, matched: &Node) -> Result<Option<Node>> {
    let (mut bytes, mut relocs) = (Vec::new(), Vec::new());
    encode(opcodes, &b.node("operand")?, &mut bytes, &mut relocs)?;
    Ok(Some(code(bytes, relocs, matched)))
}

fn assemble_load(b: &Bindings, matched: &Node) -> Result<Option<Node>> {
    single(&LDA, b, matched)
}

fn assemble_store(b: &Bindings, matched: &Node) -> Result<Option<Node>> {
    single(&STA, b, matched)
}

fn assemble_arith(b: &Bindings, matched: &Node) -> Result<Option<Node>> {
    let (prefix, opcodes) = match b.str("op")? {
        "+" => (CLC, &ADC),
        "-" => (SEC, &SBC),
        op => {
            return Err(CompileError::assembly(
                format!("operator `{}` has no machine equivalent", op),
                matched.span(),
            ))
        }
    };
    let (mut bytes, mut relocs) = (vec![prefix], Vec::new());
    encode(opcodes, &b.node("operand")?, &mut bytes, &mut relocs)?;
    Ok(Some(code(bytes, relocs, matched)))
}

fn assemble_jump(b: &Bindings, matched: &Node) -> Result<Option<Node>> {
    let symbol = text(matched, "symbol")?;
    let opcode = if matches!(b.value("link")?.as_bool(), Some(true)) { JSR } else { JMP };
    let relocs = vec![Relocation::new(1, symbol, RelocationKind::Absolute16)];
    Ok(Some(code(vec![opcode, 0, 0], relocs, matched)))
}

fn assemble_rts(_b: &Bindings, matched: &Node) -> Result<Option<Node>> {
    Ok(Some(code(vec![RTS], Vec::new(), matched)))
}

impl Pass for Assemble {
    fn info(&self) -> PassInfo {
        PassInfo {
            name: "assemble",
            introduces: &["code"],
            uses: &["load", "store", "jump", "rts"],
            deletes: &["load", "store", "jump", "rts"],
        }
    }

    fn run(&self, tree: &Node, _cx: &PassContext) -> Result<Node> {
        ASSEMBLE.run(tree)
    }
}
