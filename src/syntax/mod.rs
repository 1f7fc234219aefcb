//! Front end: token streams, the lexer, the LR parser generator and the
//! grammar of the language itself.

pub mod automaton;
pub mod grammar;
pub mod language;
pub mod lexer;
pub mod parser;
pub mod span;
pub mod stream;
pub mod table;

pub use span::Span;
