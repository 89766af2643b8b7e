//! Source regions
//!
//! A region is an immutable lexical span attached to every token and AST
//! node. Regions feed diagnostics and stack traces; they never influence
//! control flow.

use serde::{Deserialize, Serialize};

/// Identifier for one source unit (file) within a compilation session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[repr(transparent)]
pub struct SourceId(pub u32);

/// An immutable source span (1-indexed lines and columns)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    /// Source unit this region belongs to
    pub source: SourceId,
    /// Starting line
    pub start_line: u32,
    /// Starting column
    pub start_column: u32,
    /// Ending line (inclusive)
    pub end_line: u32,
    /// Ending column (exclusive)
    pub end_column: u32,
}

impl Region {
    /// Create a new region
    pub fn new(
        source: SourceId,
        start_line: u32,
        start_column: u32,
        end_line: u32,
        end_column: u32,
    ) -> Self {
        Self {
            source,
            start_line,
            start_column,
            end_line,
            end_column,
        }
    }

    /// A single-point region, useful for synthesized nodes
    pub fn point(source: SourceId, line: u32, column: u32) -> Self {
        Self::new(source, line, column, line, column)
    }

    /// The smallest region covering both `self` and `other`
    pub fn merge(self, other: Region) -> Region {
        let (start_line, start_column) =
            if (self.start_line, self.start_column) <= (other.start_line, other.start_column) {
                (self.start_line, self.start_column)
            } else {
                (other.start_line, other.start_column)
            };
        let (end_line, end_column) =
            if (self.end_line, self.end_column) >= (other.end_line, other.end_column) {
                (self.end_line, self.end_column)
            } else {
                (other.end_line, other.end_column)
            };
        Region {
            source: self.source,
            start_line,
            start_column,
            end_line,
            end_column,
        }
    }
}

impl std::fmt::Display for Region {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.start_line, self.start_column)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_covers_both() {
        let a = Region::new(SourceId(0), 1, 5, 1, 9);
        let b = Region::new(SourceId(0), 2, 1, 2, 4);
        let merged = a.merge(b);
        assert_eq!((merged.start_line, merged.start_column), (1, 5));
        assert_eq!((merged.end_line, merged.end_column), (2, 4));
    }

    #[test]
    fn test_display_is_start_position() {
        let r = Region::new(SourceId(0), 3, 7, 3, 12);
        assert_eq!(r.to_string(), "3:7");
    }
}
