//! Position-tracked text stream with one-token rewind.

use regex::Regex;

use crate::syntax::grammar::Terminal;
use crate::syntax::Span;

/// Token stream partition. Hidden channels carry whitespace and comments;
/// `All` is observed by every parser layer and is used only for EOF.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Channel {
    Default,
    Hidden(String),
    All,
}

impl Channel {
    pub fn hidden(name: &str) -> Self {
        Channel::Hidden(name.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: Terminal,
    pub text: String,
    pub channel: Channel,
    pub span: Span,
}

impl Token {
    pub fn is_eof(&self) -> bool {
        self.kind == Terminal::Eof
    }
}

/// A cursor over source lines. Every line keeps its terminating `\n`, so a
/// match may consume a line break and move on to the next line.
#[derive(Debug, Clone)]
pub struct TextStream {
    lines: Vec<String>,
    line: usize,
    col: usize,
    last: Option<Span>,
}

impl TextStream {
    pub fn new<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let lines: Vec<String> = lines
            .into_iter()
            .map(Into::into)
            .filter(|line| !line.is_empty())
            .collect();
        Self {
            lines,
            line: 0,
            col: 0,
            last: None,
        }
    }

    pub fn from_text(text: &str) -> Self {
        Self::new(text.split_inclusive('\n'))
    }

    pub fn at_end(&self) -> bool {
        self.line >= self.lines.len()
    }

    /// Length of the match of `regex` at the cursor. The regex must be
    /// anchored with `^`; the cursor does not move.
    pub fn matches(&self, regex: &Regex) -> Option<usize> {
        let rest = self.lines.get(self.line)?.get(self.col..)?;
        regex.find(rest).map(|m| m.end())
    }

    /// Consumes `len` bytes and returns them as a token.
    pub fn produce(&mut self, kind: Terminal, len: usize, channel: Channel) -> Token {
        let line = &self.lines[self.line];
        let text = line[self.col..self.col + len].to_string();
        let span = Span::new(self.line + 1, self.col, self.line + 1, self.col + len);
        self.col += len;
        if self.col >= line.len() {
            self.line += 1;
            self.col = 0;
        }
        self.last = Some(span);
        Token {
            kind,
            text,
            channel,
            span,
        }
    }

    /// A zero-width end-of-input token on [`Channel::All`].
    pub fn produce_eof(&mut self) -> Token {
        let span = self.end_position();
        self.last = Some(span);
        Token {
            kind: Terminal::Eof,
            text: String::new(),
            channel: Channel::All,
            span,
        }
    }

    /// Undoes the most recently produced token.
    ///
    /// # Panics
    ///
    /// Panics when `token` is not the last token this stream produced.
    pub fn rewind(&mut self, token: &Token) {
        assert_eq!(
            self.last.take(),
            Some(token.span),
            "only the most recently produced token can be rewound"
        );
        if token.is_eof() {
            return;
        }
        self.line = token.span.start_line - 1;
        self.col = token.span.start_col;
    }

    fn end_position(&self) -> Span {
        match self.lines.last() {
            None => Span::point(1, 0),
            Some(last) if last.ends_with('\n') => Span::point(self.lines.len() + 1, 0),
            Some(last) => Span::point(self.lines.len(), last.len()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn word() -> Regex {
        Regex::new(r"^(?:[a-z]+)").unwrap()
    }

    #[test]
    fn produce_tracks_lines() {
        let mut stream = TextStream::from_text("ab\ncd");
        let len = stream.matches(&word()).unwrap();
        let first = stream.produce(Terminal::kind("w"), len, Channel::Default);
        assert_eq!(first.text, "ab");
        assert_eq!(first.span, Span::new(1, 0, 1, 2));
        let newline = stream.produce(Terminal::kind("nl"), 1, Channel::hidden("ws"));
        assert_eq!(newline.span, Span::new(1, 2, 1, 3));
        let second = stream.produce(Terminal::kind("w"), 2, Channel::Default);
        assert_eq!(second.span, Span::new(2, 0, 2, 2));
        assert!(stream.at_end());
        assert_eq!(stream.produce_eof().span, Span::point(2, 2));
    }

    #[test]
    fn rewind_restores_the_cursor() {
        let mut stream = TextStream::from_text("abc def");
        let token = stream.produce(Terminal::kind("w"), 3, Channel::Default);
        stream.rewind(&token);
        assert_eq!(stream.matches(&word()), Some(3));
    }

    #[test]
    #[should_panic(expected = "most recently produced")]
    fn rewinding_twice_panics() {
        let mut stream = TextStream::from_text("abc");
        let token = stream.produce(Terminal::kind("w"), 3, Channel::Default);
        stream.rewind(&token);
        stream.rewind(&token);
    }
}
