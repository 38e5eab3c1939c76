//! Error taxonomy for the thread index family

use crate::address::Address;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IndexError {
    /// Any failure to read or write SQLite. Fatal to the calling operation.
    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("failed to get connection from pool: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A stored snippet URI could not be parsed. Readers recover from this
    /// locally and never surface it from a cursor.
    #[error("malformed snippet uri: {0:?}")]
    MalformedSnippetUri(String),

    /// A second thread row was about to be created for an address. Only
    /// reachable when a writer bypasses the write transaction.
    #[error("a thread already exists for address {0}")]
    DuplicateAddress(Address),

    #[error("unknown distribution type {0}")]
    UnknownDistributionType(i64),

    #[error("thread {0} not found")]
    ThreadNotFound(i64),
}

pub type Result<T> = std::result::Result<T, IndexError>;

impl IndexError {
    /// True when the underlying SQLite error is a UNIQUE/PRIMARY KEY violation.
    pub(crate) fn is_unique_violation(err: &rusqlite::Error) -> bool {
        matches!(
            err,
            rusqlite::Error::SqliteFailure(e, _)
                if e.code == rusqlite::ErrorCode::ConstraintViolation
                    && (e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                        || e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY)
        )
    }
}
