// src/core/location.rs

use std::fmt;

/// Identifies one input file held by the input-file manager. All locations
/// refer to their file through this index so that diagnostics can be
/// rendered long after the evaluation that produced them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FileId(pub u32);

impl FileId {
    /// Sentinel for locations that don't point into any real file (for
    /// example internally-generated values).
    pub const NONE: FileId = FileId(u32::MAX);

    pub fn is_none(self) -> bool {
        self == Self::NONE
    }
}

/// A point in an input file. Lines and columns are 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Location {
    pub file: FileId,
    pub line: u32,
    pub column: u32,
}

impl Location {
    pub fn new(file: FileId, line: u32, column: u32) -> Self {
        Self { file, line, column }
    }

    /// A location pointing nowhere, used for internally-generated items.
    pub fn none() -> Self {
        Self {
            file: FileId::NONE,
            line: 1,
            column: 1,
        }
    }

    pub fn is_none(&self) -> bool {
        self.file.is_none()
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// Two locations in the same file. The end column is exclusive, which makes
/// single-token ranges cover exactly the token text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocationRange {
    pub begin: Location,
    pub end: Location,
}

impl LocationRange {
    pub fn new(begin: Location, end: Location) -> Self {
        Self { begin, end }
    }

    pub fn none() -> Self {
        Self {
            begin: Location::none(),
            end: Location::none(),
        }
    }

    pub fn is_none(&self) -> bool {
        self.begin.is_none()
    }

    /// The smallest range covering both inputs. Assumes both are in the
    /// same file; a none range yields the other operand unchanged.
    pub fn union(&self, other: LocationRange) -> LocationRange {
        if self.is_none() {
            return other;
        }
        if other.is_none() {
            return *self;
        }

        let begin =
            if (self.begin.line, self.begin.column) <= (other.begin.line, other.begin.column) {
                self.begin
            } else {
                other.begin
            };
        let end = if (self.end.line, self.end.column) >= (other.end.line, other.end.column) {
            self.end
        } else {
            other.end
        };
        LocationRange { begin, end }
    }
}

impl Default for LocationRange {
    fn default() -> Self {
        Self::none()
    }
}
