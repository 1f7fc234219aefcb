//! The compilation pipeline: source text to archive.
//!
//! ```text
//! text ─ parse ─> raw tree ─ simplify ─> scheduled passes ─> symbols ─> Archive
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::archive::{Archive, Constant, Section, Symbol};
use crate::ast::{Node, Tag, Value};
use crate::config::CompileOptions;
use crate::errors::{CompileError, Result, SourceContext};
use crate::passes::simplify::simplify;
use crate::passes::{schedule, standard_passes, Pass, PassContext};
use crate::syntax::language;

/// Source file extension.
pub const SOURCE_EXTENSION: &str = "lode";

/// The tree after one step of the pipeline.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub step: &'static str,
    pub tree: Node,
}

pub fn parse_source(text: &str) -> Result<Node> {
    language::parse_unit(text)
}

/// The passes in the order they will run.
pub fn scheduled_passes(options: &CompileOptions) -> Result<Vec<Box<dyn Pass>>> {
    schedule(standard_passes(), &options.schedule)
}

/// Runs the pipeline up to the last pass, calling `observe` after every
/// step.
fn run_pipeline(
    text: &str,
    unit: &str,
    options: &CompileOptions,
    mut observe: impl FnMut(&'static str, &Node),
) -> Result<Node> {
    let raw = parse_source(text)?;
    observe("parse", &raw);
    let mut tree = simplify(&raw)?;
    observe("simplify", &tree);

    let cx = PassContext::new(unit);
    for pass in scheduled_passes(options)? {
        tracing::debug!(unit, pass = pass.name(), "running pass");
        tree = pass.run(&tree, &cx)?;
        observe(pass.name(), &tree);
    }
    Ok(tree)
}

/// The fully lowered tree of a unit.
pub fn lower_source(text: &str, unit: &str, options: &CompileOptions) -> Result<Node> {
    run_pipeline(text, unit, options, |_, _| {})
}

/// The tree after parsing, simplification and each pass.
pub fn trace_source(text: &str, unit: &str, options: &CompileOptions) -> Result<Vec<Snapshot>> {
    let mut snapshots = Vec::new();
    run_pipeline(text, unit, options, |step, tree| {
        snapshots.push(Snapshot {
            step,
            tree: tree.clone(),
        })
    })?;
    Ok(snapshots)
}

pub fn compile_source(text: &str, unit: &str, options: &CompileOptions) -> Result<Archive> {
    let tree = lower_source(text, unit, options)?;
    let archive = collect(&tree, unit, text)?;
    tracing::info!(
        unit,
        symbols = archive.symbols.len(),
        constants = archive.constants.len(),
        "compiled unit"
    );
    Ok(archive)
}

/// The unit name of a source file: its file stem.
pub fn unit_name(path: &Path) -> Result<String> {
    path.file_stem()
        .and_then(|stem| stem.to_str())
        .map(str::to_string)
        .ok_or_else(|| CompileError::io(format!("{}: not a source file name", path.display())))
}

/// Compiles one file; errors carry the file's text for rendering.
pub fn compile_file(path: &Path, options: &CompileOptions) -> Result<Archive> {
    let text = fs::read_to_string(path)
        .map_err(|e| CompileError::io(format!("{}: {}", path.display(), e)))?;
    let unit = unit_name(path)?;
    let source = SourceContext::from_file(path.display().to_string(), text.as_str());
    compile_source(&text, &unit, options).map_err(|e| e.with_source(&source))
}

/// Every source file under `root`, sorted. A file path is returned as is.
pub fn discover_sources(root: &Path) -> Result<Vec<PathBuf>> {
    if root.is_file() {
        return Ok(vec![root.to_path_buf()]);
    }
    let mut files = Vec::new();
    for entry in WalkDir::new(root) {
        let entry =
            entry.map_err(|e| CompileError::io(format!("walking {}: {}", root.display(), e)))?;
        let path = entry.path();
        if entry.file_type().is_file()
            && path.extension().map_or(false, |ext| ext == SOURCE_EXTENSION)
        {
            files.push(path.to_path_buf());
        }
    }
    files.sort();
    Ok(files)
}

// ============================================================================
// SYMBOL COLLECTION
// ============================================================================

fn symbol_of(node: &Node, section: Section, with_relocs: bool) -> Result<(String, Symbol)> {
    let name = node
        .str("name")
        .ok_or_else(|| CompileError::internal("symbol without a name").at(node.span()))?;
    let type_info = node
        .ty("type")
        .cloned()
        .ok_or_else(|| CompileError::internal(format!("`{}` has no type", name)))?;
    let relocations = match with_relocs {
        true => node.relocations("relocs").unwrap_or_default().to_vec(),
        false => Vec::new(),
    };
    Ok((
        name.to_string(),
        Symbol {
            section,
            data: node.bytes("bytes").unwrap_or_default().to_vec(),
            type_info,
            relocations,
        },
    ))
}

fn data_symbol(node: &Node) -> Result<(String, Symbol)> {
    let section = node
        .str("section")
        .and_then(Section::from_name)
        .ok_or_else(|| CompileError::internal("data symbol without a section").at(node.span()))?;
    symbol_of(node, section, false)
}

/// Builds the archive from the items of a lowered unit.
pub fn collect(tree: &Node, unit: &str, text: &str) -> Result<Archive> {
    let mut archive = Archive::new(unit, text);

    for item in tree.select(&["body", "item"]) {
        match item.tag() {
            Tag::DataSymbol => {
                let (name, symbol) = data_symbol(&item)?;
                archive.add_symbol(name, symbol)?;
            }
            Tag::FunSymbol => {
                let (name, symbol) = symbol_of(&item, Section::Text, true)?;
                archive.add_symbol(name, symbol)?;
                for local in item.table("locals").into_iter().flat_map(|t| t.values()) {
                    if let Some(local) = local.as_node() {
                        let (name, symbol) = data_symbol(local)?;
                        archive.add_symbol(name, symbol)?;
                    }
                }
            }
            other => {
                return Err(CompileError::internal(format!(
                    "`{}` was not lowered to a symbol",
                    other
                ))
                .at(item.span()))
            }
        }
    }

    for (name, value) in tree.table("constants").into_iter().flat_map(|t| t.iter()) {
        let Value::Node(number) = value else { continue };
        let (Some(value), Some(type_info)) = (number.int("value"), number.ty("type")) else {
            continue;
        };
        archive.constants.insert(
            format!("{}.{}", unit, name),
            Constant {
                type_info: type_info.clone(),
                value,
            },
        );
    }
    Ok(archive)
}
