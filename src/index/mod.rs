//! Indexing, index caching, and wildcarded search (C10-C12): scans a file
//! into a persistable [`IndexBuffer`], caches one per file handle, and
//! searches a buffer's records the same way [`crate::parser::FieldQuery`]
//! matches a live message.

mod cache;
mod format;
mod scan;
mod search;

pub use cache::{FileHandle, IndexCache};
pub use format::{IndexBuffer, IndexRecord};
pub use scan::scan_file;
pub use search::search;

use std::error::Error;
use std::fmt::{self, Display, Formatter};

/// Errors raised while scanning, caching, or (de)serializing an index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexError {
    /// A [`FileHandle`] was constructed from a value outside `1..=9999`.
    OutOfRange(u16),
    /// `IndexCache::get` was asked for a handle with no cached entry and no
    /// way to materialize one (no source reader and no sibling index given).
    MissingSource(u16),
    Io(String),
    Corrupt(&'static str),
}

impl Error for IndexError {}

impl Display for IndexError {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            Self::OutOfRange(h) => write!(f, "file handle {h} is out of range 1..=9999"),
            Self::MissingSource(h) => write!(f, "no cached index and no source to build one for handle {h}"),
            Self::Io(s) => write!(f, "index I/O error: {s}"),
            Self::Corrupt(s) => write!(f, "corrupt index file: {s}"),
        }
    }
}

impl From<std::io::Error> for IndexError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}

/// Errors raised while searching an index buffer for a matching field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchError {
    NotFound,
}

impl Error for SearchError {}

impl Display for SearchError {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "no index record matches the query"),
        }
    }
}
