//! Source positions and source text.
//!
//! Every AST node and every diagnostic label carries a [`Position`] or a
//! [`Span`]. Positions are line/column based (both 1-indexed, columns count
//! characters) so that they stay meaningful when a diagnostic points into a
//! different file than the one being compiled.

use std::{fmt, sync::Arc};

use thiserror::Error;

/// A line/column marker.
///
/// [`Position::INVALID`] stands for an unknown or absent position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Position {
    line: usize,
    col: usize,
}

impl Position {
    /// The sentinel for "no position".
    pub const INVALID: Position = Position { line: 0, col: 0 };

    /// Create a new position.
    pub const fn new(line: usize, col: usize) -> Self {
        Self { line, col }
    }

    /// The 1-indexed line.
    pub fn line(&self) -> usize {
        self.line
    }

    /// The 1-indexed column, counted in characters.
    pub fn col(&self) -> usize {
        self.col
    }

    /// Returns `false` for [`Position::INVALID`].
    pub fn is_valid(&self) -> bool {
        self.line > 0 && self.col > 0
    }

    /// Returns the position `n` characters further on the same line.
    pub fn advance(&self, n: usize) -> Self {
        if !self.is_valid() {
            return *self;
        }
        Self::new(self.line, self.col + n)
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.col)
    }
}

/// A range between two positions, end exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Span {
    start: Position,
    end: Position,
}

impl Span {
    /// Create a span from its bounds.
    pub const fn new(start: Position, end: Position) -> Self {
        Self { start, end }
    }

    /// A span of `len` characters starting at `start`.
    pub fn at(start: Position, len: usize) -> Self {
        Self::new(start, start.advance(len))
    }

    /// A zero-width span at a single position.
    pub fn point(pos: Position) -> Self {
        Self::new(pos, pos)
    }

    /// Start position.
    pub fn start(&self) -> Position {
        self.start
    }

    /// End position.
    pub fn end(&self) -> Position {
        self.end
    }

    /// Create a union of two spans.
    pub fn union(&self, other: Span) -> Span {
        Self::new(self.start.min(other.start), self.end.max(other.end))
    }
}

impl From<Position> for Span {
    fn from(pos: Position) -> Self {
        Self::point(pos)
    }
}

/// Errors creating a [`Source`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SourceError {
    #[error("`{name}` is not valid UTF-8")]
    InvalidUtf8 { name: String },
}

/// A named source text.
///
/// Sources are shared through `Arc` by the parsed [`File`](crate::ast::File)
/// and by every diagnostic label pointing into it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Source {
    name: String,
    text: String,
}

impl Source {
    /// Create a new source.
    pub fn new(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            text: text.into(),
        }
    }

    /// Create a shared source from raw bytes.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::InvalidUtf8`] if `bytes` is not UTF-8.
    pub fn from_bytes(name: impl Into<String>, bytes: Vec<u8>) -> Result<Arc<Self>, SourceError> {
        let name = name.into();
        match String::from_utf8(bytes) {
            Ok(text) => Ok(Arc::new(Self { name, text })),
            Err(_) => Err(SourceError::InvalidUtf8 { name }),
        }
    }

    /// The name used in diagnostics, usually a path.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The full text.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Returns the text of the 1-indexed `line`, without its line ending.
    pub fn line(&self, line: usize) -> Option<&str> {
        let line = line.checked_sub(1)?;
        self.text
            .split('\n')
            .nth(line)
            .map(|l| l.strip_suffix('\r').unwrap_or(l))
    }

    /// Maps a position to a byte offset into [`Source::text`].
    ///
    /// Columns past the end of the line clamp to the line end, so spans that
    /// cover the line terminator still map.
    pub fn offset(&self, pos: Position) -> Option<usize> {
        if !pos.is_valid() {
            return None;
        }

        let mut line_start = 0;
        for _ in 1..pos.line() {
            line_start += self.text[line_start..].find('\n')? + 1;
        }

        let line = &self.text[line_start..];
        let line_len = line.find('\n').unwrap_or(line.len());
        let col_offset = line[..line_len]
            .char_indices()
            .nth(pos.col() - 1)
            .map_or(line_len, |(offset, _)| offset);

        Some(line_start + col_offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_position() {
        assert!(!Position::INVALID.is_valid());
        assert!(Position::new(1, 1).is_valid());
        assert_eq!(Position::INVALID.advance(3), Position::INVALID);
    }

    #[test]
    fn test_position_ordering() {
        assert!(Position::new(1, 9) < Position::new(2, 1));
        assert!(Position::new(2, 1) < Position::new(2, 4));
    }

    #[test]
    fn test_span_union() {
        let a = Span::at(Position::new(1, 3), 2);
        let b = Span::at(Position::new(1, 8), 4);
        let union = a.union(b);

        assert_eq!(union.start(), Position::new(1, 3));
        assert_eq!(union.end(), Position::new(1, 12));
    }

    #[test]
    fn test_source_offset() {
        let source = Source::new("t.corgi", "p\n  ä b\nlast");

        assert_eq!(source.offset(Position::new(1, 1)), Some(0));
        assert_eq!(source.offset(Position::new(2, 3)), Some(4));
        // `ä` is two bytes wide
        assert_eq!(source.offset(Position::new(2, 5)), Some(7));
        assert_eq!(source.offset(Position::new(3, 1)), Some(9));
        assert_eq!(source.offset(Position::new(2, 40)), Some(8));
        assert_eq!(source.offset(Position::new(7, 1)), None);
        assert_eq!(source.offset(Position::INVALID), None);
    }

    #[test]
    fn test_source_line() {
        let source = Source::new("t.corgi", "a\r\nb\n");
        assert_eq!(source.line(1), Some("a"));
        assert_eq!(source.line(2), Some("b"));
        assert_eq!(source.line(0), None);
    }

    #[test]
    fn test_from_bytes_rejects_invalid_utf8() {
        let err = Source::from_bytes("bad.corgi", vec![0xff, 0xfe]).unwrap_err();
        assert_eq!(err.to_string(), "`bad.corgi` is not valid UTF-8");
    }
}

#[cfg(test)]
mod proptest_tests {
    use proptest::prelude::*;

    use super::*;

    // ===================
    // Strategies
    // ===================

    /// Strategy for generating a few lines of printable ASCII text.
    fn lines_strategy() -> impl Strategy<Value = Vec<String>> {
        prop::collection::vec("[ -~]{0,30}", 1..8)
    }

    // ===================
    // Property Test Functions
    // ===================

    /// Every in-line position maps to the byte offset of that character.
    fn check_offset_matches_line_starts(lines: &[String]) -> Result<(), TestCaseError> {
        let source = Source::new("p.corgi", lines.join("\n"));

        let mut line_start = 0;
        for (idx, line) in lines.iter().enumerate() {
            for col in 1..=line.len() {
                let pos = Position::new(idx + 1, col);
                prop_assert_eq!(source.offset(pos), Some(line_start + col - 1));
            }
            line_start += line.len() + 1;
        }
        Ok(())
    }

    // ===================
    // Proptest Wrappers
    // ===================

    proptest! {
        #[test]
        fn offset_matches_line_starts(lines in lines_strategy()) {
            check_offset_matches_line_starts(&lines)?;
        }
    }
}
