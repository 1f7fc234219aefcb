use std::fmt;

use serde::{Deserialize, Serialize};

/// A region of source text: 1-based lines, 0-based byte columns.
///
/// Spans are immutable values; `end` never precedes `start`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Span {
    pub start_line: usize,
    pub start_col: usize,
    pub end_line: usize,
    pub end_col: usize,
}

impl Span {
    pub fn new(start_line: usize, start_col: usize, end_line: usize, end_col: usize) -> Self {
        let span = Self {
            start_line,
            start_col,
            end_line,
            end_col,
        };
        debug_assert!(span.start() <= span.end(), "span ends before it starts");
        span
    }

    /// A zero-width span at one position.
    pub fn point(line: usize, col: usize) -> Self {
        Self::new(line, col, line, col)
    }

    pub fn start(&self) -> (usize, usize) {
        (self.start_line, self.start_col)
    }

    pub fn end(&self) -> (usize, usize) {
        (self.end_line, self.end_col)
    }

    pub fn is_empty(&self) -> bool {
        self.start() == self.end()
    }

    /// The minimal span containing all given spans, `None` for no spans.
    pub fn cover<I: IntoIterator<Item = Span>>(spans: I) -> Option<Span> {
        spans.into_iter().fold(None, |acc, span| {
            Some(match acc {
                None => span,
                Some(acc) => {
                    let (start_line, start_col) = acc.start().min(span.start());
                    let (end_line, end_col) = acc.end().max(span.end());
                    Span::new(start_line, start_col, end_line, end_col)
                }
            })
        })
    }

    /// The span of the gap between the end of `before` and the start of
    /// `after`, collapsing to a point when they touch or overlap.
    pub fn between(before: Span, after: Span) -> Span {
        if before.end() < after.start() {
            Span::new(before.end_line, before.end_col, after.start_line, after.start_col)
        } else {
            Span::point(before.end_line, before.end_col)
        }
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.start_line, self.start_col + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cover_spans_lines() {
        let a = Span::new(1, 4, 1, 6);
        let b = Span::new(3, 0, 3, 2);
        assert_eq!(Span::cover([b, a]), Some(Span::new(1, 4, 3, 2)));
        assert_eq!(Span::cover(Vec::new()), None);
    }

    #[test]
    fn between_collapses_when_adjacent() {
        let a = Span::new(1, 0, 1, 3);
        let b = Span::new(1, 3, 1, 4);
        assert_eq!(Span::between(a, b), Span::point(1, 3));
        let c = Span::new(2, 1, 2, 2);
        assert_eq!(Span::between(a, c), Span::new(1, 3, 2, 1));
    }
}
