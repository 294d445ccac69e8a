//! Source locations of declarations.

use std::fmt;

/// A line and column position of a declaration.
///
/// Both are 1-indexed as reported by the parser; `0:0` means "unknown".
#[derive(Copy, Clone, Eq, PartialEq, Hash, Default, Ord, PartialOrd)]
pub struct Location {
    pub line: u32,
    pub col: u32,
}

impl Location {
    /// The unknown location.
    pub const EMPTY: Location = Location { line: 0, col: 0 };

    #[inline]
    pub const fn new(line: u32, col: u32) -> Self {
        Self { line, col }
    }

    /// True if the parser did not report a position.
    #[inline]
    pub const fn is_empty(self) -> bool {
        self.line == 0 && self.col == 0
    }
}

impl fmt::Debug for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.col)
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.col)
    }
}
