//! Table-driven parser runtime.
//!
//! The parser keeps a stack of automaton states and a parallel stack of
//! `(child, span)` outputs. Hidden-channel tokens never reach the main loop:
//! those with a registered sub-parser are handed back to the stream and
//! parsed (and discarded) by that sub-parser, the rest are dropped.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::errors::{CompileError, ErrorKind, Result};
use crate::syntax::automaton::StateId;
use crate::syntax::grammar::{RuleId, Terminal};
use crate::syntax::lexer::LexerTable;
use crate::syntax::stream::{Channel, TextStream, Token};
use crate::syntax::table::{Action, ParseTable};
use crate::syntax::Span;

/// A reduction child: a shifted token or a value built by an earlier
/// reduction.
#[derive(Debug, Clone)]
pub enum Child<V> {
    Token(Token),
    Value(V),
}

/// Everything the node builder learns about one reduction.
#[derive(Debug)]
pub struct Reduction<V> {
    pub rule: RuleId,
    pub lhs: String,
    pub label: Option<String>,
    pub span: Span,
    pub children: Vec<Child<V>>,
    /// Lexer mode in effect once the reduced value is pushed.
    pub mode: String,
}

#[derive(Debug, Clone)]
pub struct Parser {
    table: ParseTable,
    lexer: Arc<LexerTable>,
    channel: Channel,
    subparsers: BTreeMap<String, Parser>,
    delimiters: Vec<(String, String)>,
}

impl Parser {
    /// A parser over `table` that consumes tokens of `channel`.
    pub fn new(table: ParseTable, lexer: Arc<LexerTable>, channel: Channel) -> Self {
        Self {
            table,
            lexer,
            channel,
            subparsers: BTreeMap::new(),
            delimiters: Vec::new(),
        }
    }

    /// Registers the parser for tokens of the hidden channel `name`.
    pub fn with_subparser(mut self, name: &str, parser: Parser) -> Self {
        self.subparsers.insert(name.to_string(), parser);
        self
    }

    /// Open/close token pairs named in "unclosed" diagnostics.
    pub fn with_delimiters<I>(mut self, pairs: I) -> Self
    where
        I: IntoIterator<Item = (&'static str, &'static str)>,
    {
        self.delimiters
            .extend(pairs.into_iter().map(|(o, c)| (o.to_string(), c.to_string())));
        self
    }

    pub fn table(&self) -> &ParseTable {
        &self.table
    }

    pub fn parse<V, F>(&self, stream: &mut TextStream, base_mode: &str, mut build: F) -> Result<V>
    where
        F: FnMut(Reduction<V>) -> Result<V>,
    {
        let mut states: Vec<StateId> = vec![0];
        let mut output: Vec<(Child<V>, Span)> = Vec::new();
        let mut lookahead: Option<Token> = None;
        let mut previous = Span::point(1, 0);
        let mut reductions = 0usize;

        loop {
            let state = *states
                .last()
                .ok_or_else(|| CompileError::internal("parse stack underflow"))?;

            let action = match (lookahead.is_none(), self.table.lookahead_free(state)) {
                (true, Some(action)) => action,
                _ => {
                    let token = match lookahead.take() {
                        Some(token) => token,
                        None => {
                            let mode = self.current_mode(&states, base_mode);
                            self.next_token(stream, &mode)?
                        }
                    };
                    let found = self
                        .table
                        .action(state, &token.kind)
                        .or_else(|| self.table.action(state, &Terminal::Empty));
                    match found {
                        Some(action) => {
                            lookahead = Some(token);
                            action
                        }
                        None => return Err(self.unexpected(&token, state, &output)),
                    }
                }
            };

            match action {
                Action::Shift(target) => {
                    let token = lookahead
                        .take()
                        .ok_or_else(|| CompileError::internal("shift without a lookahead"))?;
                    let span = token.span;
                    previous = span;
                    states.push(target);
                    output.push((Child::Token(token), span));
                }
                Action::Reduce(rule) => {
                    reductions += 1;
                    let lhs = self.table.grammar().rule(rule).lhs.clone();
                    let (children, span) =
                        self.pop_children(rule, &mut states, &mut output, previous, &lookahead)?;
                    let from = *states
                        .last()
                        .ok_or_else(|| CompileError::internal("parse stack underflow"))?;
                    let target = self.table.goto(from, &lhs).ok_or_else(|| {
                        CompileError::internal(format!("no goto on {} from state {}", lhs, from))
                    })?;
                    states.push(target);
                    let mode = self.current_mode(&states, base_mode);
                    let value = build(self.reduction(rule, span, children, mode))?;
                    output.push((Child::Value(value), span));
                }
                Action::Accept(rule) => {
                    let (children, span) =
                        self.pop_children(rule, &mut states, &mut output, previous, &lookahead)?;
                    if !output.is_empty() {
                        return Err(CompileError::internal(
                            "parser accepted with values left on the stack",
                        ));
                    }
                    let mode = self.current_mode(&states, base_mode);
                    let value = build(self.reduction(rule, span, children, mode))?;
                    if let Some(token) = lookahead.take() {
                        stream.rewind(&token);
                    }
                    tracing::trace!(reductions, "accepted {}", self.table.grammar().start());
                    return Ok(value);
                }
            }
        }
    }

    fn reduction<V>(
        &self,
        rule: RuleId,
        span: Span,
        children: Vec<Child<V>>,
        mode: String,
    ) -> Reduction<V> {
        let definition = self.table.grammar().rule(rule);
        Reduction {
            rule,
            lhs: definition.lhs.clone(),
            label: definition.label.clone(),
            span,
            children,
            mode,
        }
    }

    /// Pops the right-hand side of `rule`. An empty right-hand side gets
    /// the span of the gap between the last shifted token and the
    /// lookahead.
    fn pop_children<V>(
        &self,
        rule: RuleId,
        states: &mut Vec<StateId>,
        output: &mut Vec<(Child<V>, Span)>,
        previous: Span,
        lookahead: &Option<Token>,
    ) -> Result<(Vec<Child<V>>, Span)> {
        let len = self.table.grammar().rule(rule).len();
        if output.len() < len || states.len() <= len {
            return Err(CompileError::internal("parse stack underflow"));
        }
        states.truncate(states.len() - len);
        let popped: Vec<(Child<V>, Span)> = output.split_off(output.len() - len);
        let span = Span::cover(popped.iter().map(|(_, span)| *span)).unwrap_or_else(|| {
            match lookahead {
                Some(token) => Span::between(previous, token.span),
                None => Span::point(previous.end_line, previous.end_col),
            }
        });
        Ok((popped.into_iter().map(|(child, _)| child).collect(), span))
    }

    /// Mode of the nearest state on the stack that does not inherit.
    fn current_mode(&self, states: &[StateId], base_mode: &str) -> String {
        states
            .iter()
            .rev()
            .find_map(|&state| self.table.mode(state))
            .unwrap_or(base_mode)
            .to_string()
    }

    fn next_token(&self, stream: &mut TextStream, mode: &str) -> Result<Token> {
        loop {
            let token = self.lexer.next(stream, mode)?;
            if token.channel == Channel::All || token.channel == self.channel {
                return Ok(token);
            }
            if let Channel::Hidden(name) = &token.channel {
                if let Some(subparser) = self.subparsers.get(name) {
                    stream.rewind(&token);
                    subparser.parse(stream, mode, |_: Reduction<()>| Ok(()))?;
                }
            }
        }
    }

    fn unexpected<V>(&self, token: &Token, state: StateId, output: &[(Child<V>, Span)]) -> CompileError {
        if token.kind == Terminal::kind("invalid") {
            return CompileError::new(ErrorKind::Lex {
                message: format!("unrecognized input `{}`", token.text.escape_debug()),
            })
            .at(token.span);
        }
        if token.is_eof() {
            if let Some((open, opened_at)) = self.innermost_unclosed(output) {
                let close = self
                    .delimiters
                    .iter()
                    .find(|(o, _)| *o == open)
                    .map(|(_, c)| c.clone())
                    .unwrap_or_default();
                return CompileError::new(ErrorKind::Unclosed {
                    open,
                    opened_at,
                })
                .at(opened_at)
                .with_help(format!("add the missing `{}`", close));
            }
        }
        let found = if token.is_eof() {
            token.kind.describe()
        } else {
            format!("`{}`", token.text.escape_debug())
        };
        let expected = self
            .table
            .expected(state)
            .iter()
            .map(Terminal::describe)
            .collect();
        CompileError::new(ErrorKind::UnexpectedToken { found, expected }).at(token.span)
    }

    /// The last opening delimiter on the stack whose closing one was not
    /// shifted after it.
    fn innermost_unclosed<V>(&self, output: &[(Child<V>, Span)]) -> Option<(String, Span)> {
        let mut closed: Vec<&str> = Vec::new();
        for (child, _) in output.iter().rev() {
            let Child::Token(token) = child else {
                continue;
            };
            if let Some((open, close)) = self
                .delimiters
                .iter()
                .find(|(open, _)| Terminal::kind(open.as_str()) == token.kind)
            {
                if closed.last() == Some(&close.as_str()) {
                    closed.pop();
                    continue;
                }
                return Some((open.clone(), token.span));
            }
            if let Some((_, close)) = self
                .delimiters
                .iter()
                .find(|(_, close)| Terminal::kind(close.as_str()) == token.kind)
            {
                closed.push(close.as_str());
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syntax::grammar::{nt, t, Grammar, Rule};
    use crate::syntax::lexer::LexRule;

    /// Sums a parenthesised list of digits: `(1 2 3)`.
    fn sum_parser() -> Parser {
        let lexer = LexerTable::new(vec![
            LexRule::new("main", r"\s+", "ws").channel(Channel::hidden("ws")),
            LexRule::new("main", r"[0-9]", "digit"),
            LexRule::new("main", r"\(", "("),
            LexRule::new("main", r"\)", ")"),
        ])
        .unwrap();
        let grammar = Grammar::new(
            "sum",
            vec![
                Rule::new("sum", [t("("), nt("digits"), t(")")]).label("sum"),
                Rule::new("digits", [nt("digits"), t("digit")]).label("more"),
                Rule::empty("digits").label("none"),
            ],
            [Terminal::Eof],
        )
        .unwrap();
        let table = ParseTable::build(grammar).unwrap();
        Parser::new(table, Arc::new(lexer), Channel::Default).with_delimiters([("(", ")")])
    }

    fn eval(reduction: Reduction<u32>) -> Result<u32> {
        let values = reduction.children.into_iter().filter_map(|c| match c {
            Child::Value(v) => Some(v),
            Child::Token(token) => token.text.parse().ok(),
        });
        Ok(values.sum())
    }

    #[test]
    fn reduces_left_recursive_lists() {
        let parser = sum_parser();
        let mut stream = TextStream::from_text("(1 2\n 3)");
        assert_eq!(parser.parse(&mut stream, "main", eval).unwrap(), 6);
    }

    #[test]
    fn reports_unclosed_delimiter() {
        let parser = sum_parser();
        let mut stream = TextStream::from_text("(1 2");
        let err = parser.parse(&mut stream, "main", eval).unwrap_err();
        match err.kind {
            ErrorKind::Unclosed { open, opened_at } => {
                assert_eq!(open, "(");
                assert_eq!(opened_at, Span::new(1, 0, 1, 1));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn lists_expected_tokens() {
        let parser = sum_parser();
        let mut stream = TextStream::from_text("1");
        let err = parser.parse(&mut stream, "main", eval).unwrap_err();
        match err.kind {
            ErrorKind::UnexpectedToken { found, expected } => {
                assert_eq!(found, "`1`");
                assert_eq!(expected, vec!["`(`".to_string()]);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
