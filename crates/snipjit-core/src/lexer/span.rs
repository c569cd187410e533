//! Source location tracking for the snippet lexer

#![allow(clippy::cast_possible_truncation)] // Spans are u32; buffers > 4GB are unsupported

use std::ops::Range;

/// Identifies one buffer in a translation unit: the main snippet or an included header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct FileId(pub u16);

impl FileId {
    /// The snippet handed to the driver
    pub const MAIN: FileId = FileId(0);
}

/// A span representing a byte range in one source buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Span {
    /// Buffer the span points into
    pub file: FileId,
    /// Byte offset of the start of the span
    pub start: u32,
    /// Byte offset of the end of the span (exclusive)
    pub end: u32,
}

impl Span {
    /// Create a new span in the main buffer
    #[must_use]
    pub const fn new(start: u32, end: u32) -> Self {
        Self {
            file: FileId::MAIN,
            start,
            end,
        }
    }

    /// Create a span in a specific buffer
    #[must_use]
    pub const fn in_file(file: FileId, start: u32, end: u32) -> Self {
        Self { file, start, end }
    }

    /// Create a span from a `Range<usize>`
    #[must_use]
    pub fn from_range(file: FileId, range: Range<usize>) -> Self {
        Self {
            file,
            start: range.start as u32,
            end: range.end as u32,
        }
    }

    /// Length of the span in bytes
    #[must_use]
    pub const fn len(&self) -> u32 {
        self.end - self.start
    }

    /// Returns true if the span is empty
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Span covering both `self` and `other`.
    ///
    /// Spans from different buffers do not merge; `self` is returned unchanged.
    #[must_use]
    pub fn to(self, other: Self) -> Self {
        if self.file != other.file {
            return self;
        }
        Self {
            file: self.file,
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }

    /// Convert to a `Range<usize>` for slicing
    #[must_use]
    pub const fn as_range(&self) -> Range<usize> {
        self.start as usize..self.end as usize
    }
}

impl std::fmt::Display for Span {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

/// Line and column information (both 1-indexed)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Location {
    pub line: u32,
    pub column: u32,
}

impl Location {
    #[must_use]
    pub const fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }
}

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// Maps byte offsets to line/column locations
#[derive(Debug, Clone)]
pub struct LineIndex {
    /// Byte offsets where each line starts
    line_starts: Vec<u32>,
    len: u32,
}

impl LineIndex {
    /// Build a line index from source text
    #[must_use]
    pub fn new(source: &str) -> Self {
        let mut line_starts = vec![0];
        line_starts.extend(
            source
                .bytes()
                .enumerate()
                .filter(|&(_, b)| b == b'\n')
                .map(|(i, _)| (i + 1) as u32),
        );
        Self {
            line_starts,
            len: source.len() as u32,
        }
    }

    /// Convert a byte offset to a line/column location.
    ///
    /// Returns `None` when the offset lies past the end of the buffer.
    #[must_use]
    pub fn location(&self, offset: u32) -> Option<Location> {
        if offset > self.len {
            return None;
        }
        let line = self
            .line_starts
            .partition_point(|&start| start <= offset)
            .saturating_sub(1);
        Some(Location {
            line: (line + 1) as u32,
            column: offset - self.line_starts[line] + 1,
        })
    }

    /// Number of lines in the buffer
    #[must_use]
    pub fn line_count(&self) -> usize {
        self.line_starts.len()
    }
}
