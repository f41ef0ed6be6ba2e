//! Source-level error reporting.
//!
//! Reader, parser and evaluator errors all carry the source location of the
//! offending form and render as `line L, col C: message`. Programmer errors
//! in the embedding API are assertions instead.

use std::error::Error;
use std::fmt;

/// A position in source text. Both fields are zero-based; display is
/// one-based.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SourceLoc {
    pub line: u32,
    pub col: u32,
}

/// An error in source text: reading, parsing or evaluating.
#[derive(Debug)]
pub struct SourceError {
    pub loc: SourceLoc,
    pub message: String,
}

impl SourceError {
    pub fn new(loc: SourceLoc, message: impl Into<String>) -> SourceError {
        SourceError { loc, message: message.into() }
    }
}

impl fmt::Display for SourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}, col {}: {}", self.loc.line + 1, self.loc.col + 1, self.message)
    }
}

impl Error for SourceError {}

pub type SourceResult<T> = Result<T, SourceError>;
