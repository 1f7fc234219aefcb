//! lodestar error handling.
//!
//! Every stage of the toolchain reports failures through [`CompileError`]: a
//! classified [`ErrorKind`], an optional span, an optional help line and,
//! once the caller attaches it, the named source the span points into.
//! Nothing inside the compiler retries or recovers; errors travel unchanged
//! to the CLI, which renders them with `miette`.

use std::fmt;
use std::sync::Arc;

use miette::{Diagnostic, LabeledSpan, NamedSource, SourceSpan};
use thiserror::Error;

use crate::syntax::Span;

pub type Result<T> = std::result::Result<T, CompileError>;

// ============================================================================
// SOURCE CONTEXT
// ============================================================================

/// A named piece of source text that spans can be resolved against.
#[derive(Debug, Clone)]
pub struct SourceContext {
    pub name: String,
    pub content: String,
}

impl SourceContext {
    pub fn from_file(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
        }
    }

    /// Converts a 1-based line and 0-based byte column into a byte offset,
    /// clamping to the end of the text.
    pub fn offset(&self, line: usize, col: usize) -> usize {
        let mut offset = 0;
        for (index, text) in self.content.split_inclusive('\n').enumerate() {
            if index + 1 == line {
                return (offset + col.min(text.len())).min(self.content.len());
            }
            offset += text.len();
        }
        self.content.len()
    }

    pub fn source_span(&self, span: Span) -> SourceSpan {
        let start = self.offset(span.start_line, span.start_col);
        let end = self.offset(span.end_line, span.end_col).max(start);
        SourceSpan::from(start..end)
    }

    pub fn to_named_source(&self) -> Arc<NamedSource<String>> {
        Arc::new(NamedSource::new(self.name.clone(), self.content.clone()))
    }
}

// ============================================================================
// ERROR KINDS
// ============================================================================

/// All failure modes of the toolchain.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ErrorKind {
    #[error("grammar error: {}", .problems.join("; "))]
    Grammar { problems: Vec<String> },

    #[error("lex error: {message}")]
    Lex { message: String },

    #[error("parse error: unexpected {found}, expected one of: {}", .expected.join(", "))]
    UnexpectedToken { found: String, expected: Vec<String> },

    #[error("parse error: unclosed `{open}` at end of input")]
    Unclosed { open: String, opened_at: Span },

    #[error("type error: {message}")]
    Type { message: String },

    #[error("name error: duplicate definition of '{name}'")]
    DuplicateDefinition { name: String },

    #[error("name error: unknown name '{name}'")]
    UnknownName { name: String },

    #[error("constant error: {message}")]
    Constant { message: String },

    #[error("assembly error: {message}")]
    Assembly { message: String },

    #[error("pass scheduling error: dependency cycle through {}", .cycle.join(" -> "))]
    Topology { cycle: Vec<String> },

    #[error("link error: {message}")]
    Link { message: String },

    #[error("io error: {message}")]
    Io { message: String },

    #[error("config error: {message}")]
    Config { message: String },

    #[error("internal error: {message}")]
    Internal { message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Grammar,
    Syntax,
    Semantic,
    Codegen,
    Environment,
    Internal,
}

impl ErrorKind {
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Grammar { .. } | Self::Topology { .. } => ErrorCategory::Grammar,
            Self::Lex { .. } | Self::UnexpectedToken { .. } | Self::Unclosed { .. } => {
                ErrorCategory::Syntax
            }
            Self::Type { .. }
            | Self::DuplicateDefinition { .. }
            | Self::UnknownName { .. }
            | Self::Constant { .. } => ErrorCategory::Semantic,
            Self::Assembly { .. } | Self::Link { .. } => ErrorCategory::Codegen,
            Self::Io { .. } | Self::Config { .. } => ErrorCategory::Environment,
            Self::Internal { .. } => ErrorCategory::Internal,
        }
    }

    pub const fn code_suffix(&self) -> &'static str {
        match self {
            Self::Grammar { .. } => "grammar",
            Self::Lex { .. } => "lex",
            Self::UnexpectedToken { .. } => "unexpected_token",
            Self::Unclosed { .. } => "unclosed_delimiter",
            Self::Type { .. } => "type",
            Self::DuplicateDefinition { .. } => "duplicate_definition",
            Self::UnknownName { .. } => "unknown_name",
            Self::Constant { .. } => "constant",
            Self::Assembly { .. } => "assembly",
            Self::Topology { .. } => "topology",
            Self::Link { .. } => "link",
            Self::Io { .. } => "io",
            Self::Config { .. } => "config",
            Self::Internal { .. } => "internal",
        }
    }

    fn primary_label(&self) -> &'static str {
        match self {
            Self::Lex { .. } => "not a token",
            Self::UnexpectedToken { .. } => "unexpected here",
            Self::Unclosed { .. } => "opened here",
            Self::Type { .. } => "type mismatch",
            Self::DuplicateDefinition { .. } => "redefined here",
            Self::UnknownName { .. } => "not in scope",
            Self::Constant { .. } => "not a constant",
            Self::Assembly { .. } => "cannot encode",
            _ => "here",
        }
    }
}

// ============================================================================
// COMPILE ERROR
// ============================================================================

/// The single error type of the toolchain.
#[derive(Debug, Clone)]
pub struct CompileError {
    pub kind: ErrorKind,
    pub span: Option<Span>,
    pub help: Option<String>,
    source_code: Option<Arc<NamedSource<String>>>,
    source_span: Option<SourceSpan>,
}

impl CompileError {
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            span: None,
            help: None,
            source_code: None,
            source_span: None,
        }
    }

    pub fn at(mut self, span: Span) -> Self {
        self.span = Some(span);
        self
    }

    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.help = Some(help.into());
        self
    }

    /// Attaches the source text so the diagnostic can render a snippet.
    pub fn with_source(mut self, source: &SourceContext) -> Self {
        if self.source_code.is_none() {
            self.source_span = self.span.map(|span| source.source_span(span));
            self.source_code = Some(source.to_named_source());
        }
        self
    }

    pub fn category(&self) -> ErrorCategory {
        self.kind.category()
    }

    // ------------------------------------------------------------------------
    // Shorthands
    // ------------------------------------------------------------------------

    pub fn type_error(message: impl Into<String>, span: Span) -> Self {
        Self::new(ErrorKind::Type {
            message: message.into(),
        })
        .at(span)
    }

    pub fn constant(message: impl Into<String>, span: Span) -> Self {
        Self::new(ErrorKind::Constant {
            message: message.into(),
        })
        .at(span)
    }

    pub fn assembly(message: impl Into<String>, span: Span) -> Self {
        Self::new(ErrorKind::Assembly {
            message: message.into(),
        })
        .at(span)
    }

    pub fn link(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Link {
            message: message.into(),
        })
    }

    pub fn io(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Io {
            message: message.into(),
        })
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Config {
            message: message.into(),
        })
    }

    /// Errors that indicate a bug in the toolchain rather than in the input.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal {
            message: message.into(),
        })
        .with_help("This is an internal compiler error. Please report it as a bug.")
    }
}

impl From<ErrorKind> for CompileError {
    fn from(kind: ErrorKind) -> Self {
        Self::new(kind)
    }
}

impl From<std::io::Error> for CompileError {
    fn from(err: std::io::Error) -> Self {
        Self::io(err.to_string())
    }
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        if let Some(span) = self.span {
            write!(f, " at {}", span)?;
        }
        Ok(())
    }
}

impl std::error::Error for CompileError {}

impl Diagnostic for CompileError {
    fn code<'a>(&'a self) -> Option<Box<dyn fmt::Display + 'a>> {
        Some(Box::new(format!("lodestar::{}", self.kind.code_suffix())))
    }

    fn help<'a>(&'a self) -> Option<Box<dyn fmt::Display + 'a>> {
        self.help
            .as_ref()
            .map(|h| Box::new(h) as Box<dyn fmt::Display>)
    }

    fn labels(&self) -> Option<Box<dyn Iterator<Item = LabeledSpan> + '_>> {
        let span = self.source_span?;
        let label = LabeledSpan::new_with_span(Some(self.kind.primary_label().to_string()), span);
        Some(Box::new(std::iter::once(label)))
    }

    fn source_code(&self) -> Option<&dyn miette::SourceCode> {
        self.source_code
            .as_ref()
            .map(|s| &**s as &dyn miette::SourceCode)
    }
}

/// Prints an error with full miette diagnostics to stderr.
pub fn print_error(error: CompileError) {
    let report = miette::Report::new(error);
    eprintln!("{report:?}");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offsets_follow_line_and_column() {
        let source = SourceContext::from_file("t.lode", "ab\ncde\nf");
        assert_eq!(source.offset(1, 0), 0);
        assert_eq!(source.offset(2, 1), 4);
        assert_eq!(source.offset(3, 0), 7);
        assert_eq!(source.offset(9, 0), 8);
    }

    #[test]
    fn code_names_the_kind() {
        let err = CompileError::assembly("bad operand", Span::point(1, 0));
        let code = err.code().map(|c| c.to_string());
        assert_eq!(code.as_deref(), Some("lodestar::assembly"));
        assert_eq!(err.category(), ErrorCategory::Codegen);
    }
}
