//! `bind_names`: creates a `binding` for every declaration and attaches
//! it to each identifier that refers to it.
//!
//! Unit-level declarations are bound when the unit is entered, so
//! functions and constants may be referenced before their definition.
//! Parameters are bound on entering their function and locals as their
//! `let` is exited, which keeps a local out of its own initializer.

use std::collections::HashSet;

use im::OrdMap;
use once_cell::sync::Lazy;

use crate::ast::{make_sequence, Hooks, Node, Tag, Value};
use crate::archive::Section;
use crate::errors::{CompileError, ErrorKind, Result};
use crate::passes::scope::{walk_scoped, Scoped, Scopes};
use crate::passes::{declared_type, text, Pass, PassContext, PassInfo};
use crate::types::TypeInfo;

pub struct BindNames;

/// Binding kinds.
pub const FUN: &str = "fun";
pub const CONSTANT: &str = "constant";
pub const GLOBAL: &str = "global";
pub const PARAM: &str = "param";
pub const LOCAL: &str = "local";

struct Binder {
    unit: String,
    scopes: Scopes,
    /// Symbol of each enclosing function.
    funs: Vec<String>,
    /// Symbols already handed out, for disambiguating shadowed locals.
    symbols: HashSet<String>,
}

impl Scoped for Binder {
    fn scopes(&mut self) -> &mut Scopes {
        &mut self.scopes
    }
}

static HOOKS: Lazy<Hooks<Binder>> = Lazy::new(|| {
    Hooks::new()
        .on_enter(Tag::Unit, Binder::enter_unit)
        .on_enter(Tag::Fun, Binder::enter_fun)
        .on_exit(Tag::Fun, Binder::exit_fun)
        .on_exit(Tag::Let, Binder::exit_let)
        .on_exit(Tag::Ident, Binder::exit_ident)
});

/// Parameter symbols of a function binding, in declaration order.
pub fn param_symbols(binding: &Node) -> Vec<String> {
    let mut entries: Vec<(usize, String)> = binding
        .table("params")
        .map(|table| {
            table
                .iter()
                .filter_map(|(index, symbol)| {
                    Some((index.parse().ok()?, symbol.as_str()?.to_string()))
                })
                .collect()
        })
        .unwrap_or_default();
    entries.sort();
    entries.into_iter().map(|(_, symbol)| symbol).collect()
}

fn storage_section(node: &Node, default: Section) -> Section {
    match node.str("storage") {
        Some("stash") => Section::Zp,
        _ => default,
    }
}

fn duplicate(name: &str, node: &Node) -> CompileError {
    CompileError::new(ErrorKind::DuplicateDefinition {
        name: name.to_string(),
    })
    .at(node.span())
}

struct BindingBuilder {
    name: String,
    symbol: String,
    kind: &'static str,
    ty: TypeInfo,
    mutable: bool,
    section: Option<Section>,
}

impl BindingBuilder {
    fn build(self, at: &Node) -> Node {
        Node::builder(Tag::Binding, at.span())
            .attr("name", self.name)
            .attr("symbol", self.symbol)
            .attr("kind", self.kind)
            .attr("type", self.ty)
            .attr("mutable", self.mutable)
            .attr_opt("section", self.section.map(|s| s.as_str()))
            .build()
    }
}

impl Binder {
    fn unique_symbol(&mut self, base: String) -> String {
        let mut symbol = base.clone();
        let mut n = 1;
        while self.symbols.contains(&symbol) {
            symbol = format!("{}_{}", base, n);
            n += 1;
        }
        self.symbols.insert(symbol.clone());
        symbol
    }

    fn declare(&mut self, name: &str, binding: Node, at: &Node) -> Result<()> {
        if self.scopes.bind(name, binding) {
            Ok(())
        } else {
            Err(duplicate(name, at))
        }
    }

    fn enter_unit(&mut self, node: Node) -> Result<Option<Node>> {
        let Some(body) = node.node("body") else {
            return Ok(Some(node));
        };
        let mut items = Vec::new();
        for item in body.elements() {
            let item = match item.tag() {
                Tag::Fun => self.bind_fun(item)?,
                Tag::Constant => self.bind_constant(item)?,
                Tag::Let => self.bind_global(item)?,
                _ => item,
            };
            items.push(item);
        }
        Ok(Some(node.to_builder().attr_opt("body", make_sequence(Tag::Items, items, None)).build()))
    }

    fn bind_fun(&mut self, node: Node) -> Result<Node> {
        let name = text(&node, "name")?.to_string();
        let symbol = self.unique_symbol(format!("{}.{}", self.unit, name));

        let mut params = OrdMap::new();
        let mut args = Vec::new();
        let mut annotated = Vec::new();
        for (index, param) in node.node("params").map(Node::elements).unwrap_or_default().into_iter().enumerate() {
            let param_symbol = format!("{}.{}", symbol, text(&param, "name")?);
            args.push(declared_type(&param)?);
            params.insert(index.to_string(), Value::from(param_symbol.as_str()));
            annotated.push(param.with_attr("symbol", param_symbol));
        }
        let ret = match node.node("ret") {
            Some(ret) => ret.ty("info").cloned().unwrap_or(TypeInfo::Void),
            None => TypeInfo::Void,
        };

        let binding = BindingBuilder {
            name: name.clone(),
            symbol: symbol.clone(),
            kind: FUN,
            ty: TypeInfo::function(ret, args),
            mutable: false,
            section: Some(Section::Text),
        }
        .build(&node)
        .with_attr("params", params);
        self.declare(&name, binding, &node)?;

        Ok(node
            .to_builder()
            .attr("symbol", symbol)
            .attr_opt("params", make_sequence(Tag::Params, annotated, None))
            .build())
    }

    fn bind_constant(&mut self, node: Node) -> Result<Node> {
        let name = text(&node, "name")?.to_string();
        let symbol = self.unique_symbol(format!("{}.{}", self.unit, name));
        let binding = BindingBuilder {
            name: name.clone(),
            symbol: symbol.clone(),
            kind: CONSTANT,
            ty: declared_type(&node)?,
            mutable: false,
            section: None,
        }
        .build(&node);
        self.declare(&name, binding, &node)?;
        Ok(node.with_attr("symbol", symbol))
    }

    fn bind_global(&mut self, node: Node) -> Result<Node> {
        let name = text(&node, "name")?.to_string();
        let symbol = self.unique_symbol(format!("{}.{}", self.unit, name));
        let section = storage_section(&node, Section::Data);
        let binding = BindingBuilder {
            name: name.clone(),
            symbol: symbol.clone(),
            kind: GLOBAL,
            ty: declared_type(&node)?,
            mutable: node.has("storage"),
            section: Some(section),
        }
        .build(&node);
        self.declare(&name, binding, &node)?;
        Ok(node
            .to_builder()
            .attr("symbol", symbol)
            .attr("section", section.as_str())
            .build())
    }

    fn enter_fun(&mut self, node: Node) -> Result<Option<Node>> {
        let symbol = match node.str("symbol") {
            Some(symbol) => symbol.to_string(),
            None => return Err(CompileError::internal("function was not bound with its unit")),
        };
        if let Some(params) = node.node("params") {
            for param in params.elements() {
                let name = text(&param, "name")?;
                let binding = BindingBuilder {
                    name: name.to_string(),
                    symbol: text(&param, "symbol")?.to_string(),
                    kind: PARAM,
                    ty: declared_type(&param)?,
                    mutable: true,
                    section: Some(Section::Bss),
                }
                .build(&param);
                self.declare(name, binding, &param)?;
                self.symbols.insert(text(&param, "symbol")?.to_string());
            }
        }
        self.funs.push(symbol);
        Ok(Some(node))
    }

    fn exit_fun(&mut self, node: Node) -> Result<Option<Node>> {
        self.funs.pop();
        Ok(Some(node))
    }

    fn exit_let(&mut self, node: Node) -> Result<Option<Node>> {
        // Unit-level lets were bound on entering the unit.
        let Some(fun) = self.funs.last().cloned() else {
            return Ok(Some(node));
        };
        let name = text(&node, "name")?.to_string();
        let symbol = self.unique_symbol(format!("{}.{}", fun, name));
        let section = storage_section(&node, Section::Bss);
        let binding = BindingBuilder {
            name: name.clone(),
            symbol: symbol.clone(),
            kind: LOCAL,
            ty: declared_type(&node)?,
            mutable: node.has("storage"),
            section: Some(section),
        }
        .build(&node);
        self.declare(&name, binding, &node)?;
        Ok(Some(
            node.to_builder()
                .attr("symbol", symbol)
                .attr("section", section.as_str())
                .build(),
        ))
    }

    fn exit_ident(&mut self, node: Node) -> Result<Option<Node>> {
        let name = text(&node, "name")?;
        match self.scopes.binding(name) {
            Some(binding) if binding.is(Tag::Binding) => {
                let binding = binding.clone();
                Ok(Some(node.with_attr("binding", binding)))
            }
            _ => Ok(Some(node)),
        }
    }
}

impl Pass for BindNames {
    fn info(&self) -> PassInfo {
        PassInfo {
            name: "bind_names",
            introduces: &["binding"],
            uses: &["type_info", "scope"],
            deletes: &[],
        }
    }

    fn run(&self, tree: &Node, cx: &PassContext) -> Result<Node> {
        let mut binder = Binder {
            unit: cx.unit.clone(),
            scopes: Scopes::default(),
            funs: Vec::new(),
            symbols: HashSet::new(),
        };
        walk_scoped(tree, &mut binder, &HOOKS, self.name())
    }
}
