//! Error type shared by the store, the index layer and the journal.

use std::io;
use thiserror::Error;

/// Crate-wide result alias
pub type Result<T> = std::result::Result<T, Error>;

/// Every failure mode surfaced by colindex.
///
/// Store failures during index maintenance are propagated unchanged. When one
/// of those happens after the base write has landed, the base table may be
/// ahead of its indexes; nothing is rolled back.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error from the journal or the underlying files.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A definition, document or journal record could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Rejected index definition or administrative request.
    #[error("validation error: {0}")]
    Validation(String),

    #[error("table not found: {0}")]
    TableNotFound(String),

    #[error("table already exists: {0}")]
    TableExists(String),

    #[error("column family '{family}' not found in table '{table}'")]
    FamilyNotFound { table: String, family: String },

    /// A unique index already maps the key to another base row.
    #[error("unique index '{index}' already holds the key for row {row:?}")]
    UniqueViolation { index: String, row: Vec<u8> },

    /// Operation on a handle that was already closed.
    #[error("table handle closed: {0}")]
    Closed(String),
}

impl Error {
    pub(crate) fn validation(msg: impl Into<String>) -> Self {
        Error::Validation(msg.into())
    }

    pub(crate) fn serialization(err: impl std::fmt::Display) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::serialization(err)
    }
}

impl From<bincode::Error> for Error {
    fn from(err: bincode::Error) -> Self {
        Error::serialization(err)
    }
}
