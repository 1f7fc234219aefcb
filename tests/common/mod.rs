//! Shared helpers for lodestar integration tests.

#![allow(dead_code)]

use lodestar::archive::Archive;
use lodestar::ast::Node;
use lodestar::config::CompileOptions;
use lodestar::engine;
use lodestar::errors::{CompileError, ErrorKind};

/// Unit name used by every test compilation.
pub const UNIT: &str = "demo";

pub fn compile(text: &str) -> Archive {
    match engine::compile_source(text, UNIT, &CompileOptions::default()) {
        Ok(archive) => archive,
        Err(e) => panic!("compilation failed: {e}\n--- source ---\n{text}"),
    }
}

pub fn compile_err(text: &str) -> CompileError {
    match engine::compile_source(text, UNIT, &CompileOptions::default()) {
        Ok(archive) => panic!("expected an error, got archive {archive:?}"),
        Err(e) => e,
    }
}

pub fn error_kind(text: &str) -> ErrorKind {
    compile_err(text).kind
}

pub fn parse(text: &str) -> Node {
    match engine::parse_source(text) {
        Ok(tree) => tree.strip_spans(),
        Err(e) => panic!("parse failed: {e}\n--- source ---\n{text}"),
    }
}

/// The bytes of a symbol, panicking with the archive's symbol list when
/// it is missing.
pub fn symbol_data(archive: &Archive, name: &str) -> Vec<u8> {
    match archive.symbols.get(name) {
        Some(symbol) => symbol.data.clone(),
        None => panic!(
            "no symbol `{name}`; archive has {:?}",
            archive.symbols.keys().collect::<Vec<_>>()
        ),
    }
}
