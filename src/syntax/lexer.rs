//! Mode-aware lexer table.
//!
//! Rules are grouped by lexer mode and tried in declaration order; the first
//! rule that matches a non-empty prefix wins. String and comment bodies get
//! their own modes instead of one large regex.

use std::collections::BTreeMap;

use regex::Regex;

use crate::errors::{CompileError, ErrorKind, Result};
use crate::syntax::grammar::Terminal;
use crate::syntax::stream::{Channel, TextStream, Token};

/// One `(mode, regex, kind, channel)` lexer rule.
#[derive(Debug, Clone)]
pub struct LexRule {
    pub mode: String,
    pub pattern: String,
    pub kind: String,
    pub channel: Channel,
}

impl LexRule {
    pub fn new(mode: &str, pattern: &str, kind: &str) -> Self {
        Self {
            mode: mode.to_string(),
            pattern: pattern.to_string(),
            kind: kind.to_string(),
            channel: Channel::Default,
        }
    }

    pub fn channel(mut self, channel: Channel) -> Self {
        self.channel = channel;
        self
    }
}

#[derive(Debug, Clone)]
struct CompiledRule {
    regex: Regex,
    kind: Terminal,
    channel: Channel,
}

#[derive(Debug, Clone)]
pub struct LexerTable {
    modes: BTreeMap<String, Vec<CompiledRule>>,
}

impl LexerTable {
    /// Compiles every rule once. Invalid patterns are reported together.
    pub fn new(rules: Vec<LexRule>) -> Result<Self> {
        let mut modes: BTreeMap<String, Vec<CompiledRule>> = BTreeMap::new();
        let mut problems = Vec::new();
        for rule in rules {
            match Regex::new(&format!("^(?:{})", rule.pattern)) {
                Ok(regex) => modes.entry(rule.mode).or_default().push(CompiledRule {
                    regex,
                    kind: Terminal::Kind(rule.kind),
                    channel: rule.channel,
                }),
                Err(err) => problems.push(format!(
                    "invalid pattern for token '{}' in mode '{}': {}",
                    rule.kind, rule.mode, err
                )),
            }
        }
        if !problems.is_empty() {
            return Err(CompileError::new(ErrorKind::Grammar { problems }));
        }
        Ok(Self { modes })
    }

    pub fn modes(&self) -> impl Iterator<Item = &str> {
        self.modes.keys().map(String::as_str)
    }

    /// Lexes the next token in `mode`, or EOF once the stream is exhausted.
    pub fn next(&self, stream: &mut TextStream, mode: &str) -> Result<Token> {
        if stream.at_end() {
            return Ok(stream.produce_eof());
        }
        let rules = self
            .modes
            .get(mode)
            .ok_or_else(|| CompileError::internal(format!("unknown lexer mode '{}'", mode)))?;
        for rule in rules {
            if let Some(len) = stream.matches(&rule.regex).filter(|&len| len > 0) {
                return Ok(stream.produce(rule.kind.clone(), len, rule.channel.clone()));
            }
        }
        Err(CompileError::internal(format!(
            "malformed lexer table: no rule of mode '{}' matches",
            mode
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> LexerTable {
        LexerTable::new(vec![
            LexRule::new("main", r"\s+", "ws").channel(Channel::hidden("ws")),
            LexRule::new("main", r"let\b", "let"),
            LexRule::new("main", r"[a-z]+", "ident"),
        ])
        .unwrap()
    }

    #[test]
    fn first_rule_in_order_wins() {
        let table = table();
        let mut stream = TextStream::from_text("let letter");
        let kinds: Vec<String> = std::iter::from_fn(|| {
            let token = table.next(&mut stream, "main").unwrap();
            (!token.is_eof()).then(|| token.kind.to_string())
        })
        .collect();
        assert_eq!(kinds, ["let", "ws", "ident"]);
    }

    #[test]
    fn unmatched_input_is_internal() {
        let table = table();
        let mut stream = TextStream::from_text("42");
        let err = table.next(&mut stream, "main").unwrap_err();
        assert!(matches!(err.kind, ErrorKind::Internal { .. }));
    }

    #[test]
    fn bad_patterns_are_batched() {
        let err = LexerTable::new(vec![
            LexRule::new("main", "(", "a"),
            LexRule::new("main", "[", "b"),
        ])
        .unwrap_err();
        match err.kind {
            ErrorKind::Grammar { problems } => assert_eq!(problems.len(), 2),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
