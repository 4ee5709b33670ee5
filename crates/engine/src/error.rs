//! Error taxonomy for the document pipeline.
//!
//! Parse problems are absorbed locally with a deterministic fallback (see
//! `table::ParseReport`). Store and query failures are captured as data and
//! flow through the pipeline next to successful results, so the front-end
//! always has something coherent to show. Nothing here is ever allowed to
//! take the document down.

/// Error while parsing imported delimited text.
///
/// Under the default `OverflowPolicy::Truncate` the parser never produces
/// `TooManyFields`; short and long rows are both recovered silently.
#[derive(Debug, Clone, PartialEq)]
pub enum ParseError {
    /// A row had more fields than the header and the policy is `Reject`.
    TooManyFields { line: usize, expected: usize, found: usize },
    /// The underlying reader could not make sense of the input.
    Malformed { line: usize, message: String },
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParseError::TooManyFields { line, expected, found } => {
                write!(f, "Line {}: expected {} fields, found {}", line, expected, found)
            }
            ParseError::Malformed { line, message } => {
                write!(f, "Line {}: {}", line, message)
            }
        }
    }
}

/// Error while (re)creating or populating the dataset table.
///
/// Any of these aborts the import as a whole; the transaction rollback
/// guarantees the prior dataset is still in place afterwards.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreError {
    /// The dataset table could not be dropped or recreated.
    Schema(String),
    /// A row failed to insert. The whole batch is rolled back.
    Insert { row: usize, message: String },
    /// The underlying connection failed (open, transaction control).
    Connection(String),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::Schema(msg) => write!(f, "Schema error: {}", msg),
            StoreError::Insert { row, message } => {
                write!(f, "Insert failed at row {}: {}", row, message)
            }
            StoreError::Connection(msg) => write!(f, "Store connection error: {}", msg),
        }
    }
}

/// Error from executing the user's SQL query.
///
/// Captured, not thrown: the runner keeps the previous successful result
/// for the table view while the render path shows this message.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryError {
    pub message: String,
    /// Byte offset of the error in the SQL text, when SQLite reports one.
    /// rusqlite 0.31 does not surface `sqlite3_error_offset`, so this is
    /// `None` in practice; kept so callers don't need to change when it
    /// becomes available.
    pub position: Option<usize>,
}

impl QueryError {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into(), position: None }
    }
}

impl std::fmt::Display for QueryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.position {
            Some(pos) => write!(f, "{} (at offset {})", self.message, pos),
            None => write!(f, "{}", self.message),
        }
    }
}

/// Error from render composition.
///
/// Composition is a pure function of its inputs, so this occurring at all
/// is an internal invariant violation; it is logged and the dispatch is
/// skipped rather than propagated.
#[derive(Debug, Clone, PartialEq)]
pub enum ComposeError {
    Serialization(String),
}

impl std::fmt::Display for ComposeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ComposeError::Serialization(msg) => write!(f, "Data serialization failed: {}", msg),
        }
    }
}

/// Error from a full data import (parse + store).
#[derive(Debug, Clone, PartialEq)]
pub enum ImportError {
    Parse(ParseError),
    Store(StoreError),
}

impl From<ParseError> for ImportError {
    fn from(e: ParseError) -> Self {
        ImportError::Parse(e)
    }
}

impl From<StoreError> for ImportError {
    fn from(e: StoreError) -> Self {
        ImportError::Store(e)
    }
}

impl std::fmt::Display for ImportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ImportError::Parse(e) => write!(f, "Import parse error: {}", e),
            ImportError::Store(e) => write!(f, "Import store error: {}", e),
        }
    }
}
