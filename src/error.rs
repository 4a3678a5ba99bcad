//! Error types for the contact write path.

use thiserror::Error;

use crate::contact::ContactId;

/// Low-level storage failures, analogous to `ankurah_storage_sqlite::error::SqliteError`.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("connection pool error: {0}")]
    Pool(String),

    #[error("task join error: {0}")]
    TaskJoin(String),

    #[error("ddl error: {0}")]
    Ddl(String),
}

/// Public error taxonomy exposed at the write-path boundary (spec.md §7).
#[derive(Debug, Error)]
pub enum WriteError {
    #[error("contact does not exist")]
    DoesNotExist,

    #[error("bad argument: {0}")]
    BadArgument(String),

    #[error("invalid detail: {0}")]
    InvalidDetail(String),

    #[error("invalid relationship")]
    InvalidRelationship,

    #[error("contact is locked")]
    Locked,

    #[error("unspecified storage failure: {0}")]
    Unspecified(#[from] StoreError),
}

impl From<rusqlite::Error> for WriteError {
    fn from(err: rusqlite::Error) -> Self { WriteError::Unspecified(StoreError::Sqlite(err)) }
}

/// Per-item error map keyed by input index, used by batch operations
/// (`save`, `remove`) per spec.md §7's "populate the optional error map" rule.
pub type ErrorMap = std::collections::BTreeMap<usize, WriteError>;

/// Failure returned from reading an aggregate during delta computation (C7);
/// propagates the reader's error, or `Unspecified` if it claimed success but
/// returned no rows (spec.md §7).
#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("contact {0:?} not found")]
    NotFound(ContactId),

    #[error("storage error: {0}")]
    Storage(#[from] StoreError),
}

impl From<RetrievalError> for WriteError {
    fn from(err: RetrievalError) -> Self {
        match err {
            RetrievalError::NotFound(_) => WriteError::DoesNotExist,
            RetrievalError::Storage(e) => WriteError::Unspecified(e),
        }
    }
}
