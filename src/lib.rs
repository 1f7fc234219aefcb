//! # lodestar
//!
//! A compiler toolchain for the lode language, targeting 6502-class CPUs.
//!
//! Source text is parsed by a table-driven LR parser generated at start-up
//! ([`syntax`]), producing a persistent tree ([`ast`]). The tree is then
//! rewritten by named passes ([`passes`]), ordered automatically from the
//! node tags each one introduces, uses and deletes, many of them written as
//! declarative rule sets ([`patterns`]). The result is a relocatable
//! [`archive::Archive`]; the [`linker`] lays archives out into a memory
//! image.
//!
//! ```rust
//! use lodestar::config::CompileOptions;
//! use lodestar::engine::compile_source;
//!
//! let archive = compile_source("fun main() endfun\n", "demo", &CompileOptions::default()).unwrap();
//! assert_eq!(archive.symbols["demo.main"].data, vec![0x60]);
//! ```

pub mod archive;
pub mod ast;
pub mod cli;
pub mod config;
pub mod engine;
pub mod errors;
pub mod intrinsics;
pub mod linker;
pub mod passes;
pub mod patterns;
pub mod syntax;
pub mod types;

pub use errors::{CompileError, ErrorKind, Result};
