//! Error types for patch execution and traversal.
//!
//! Wraps storage failures from `dbpatcher-db` and adds the failures that only
//! happen against a live database.

use dbpatcher_core::{ErrorKind, PatchId, PatchIdError};
use dbpatcher_db::StoreError;
use thiserror::Error;

/// Errors that can occur while upgrading or downgrading a database.
#[derive(Debug, Error)]
pub enum PatcherError {
    /// Repository, state record, or configuration failure.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Malformed identifier or out-of-range target version.
    #[error(transparent)]
    InvalidId(#[from] PatchIdError),

    /// An explicit target version has no patch.
    #[error("target {0} is not in the patch list")]
    TargetNotFound(PatchId),

    /// A statement failed; the patch transaction was rolled back.
    #[error("error on statement `{statement}` of {patch}, rolled back: {source}")]
    Execution {
        patch: PatchId,
        statement: String,
        #[source]
        source: rusqlite::Error,
    },

    /// Opening or committing a transaction failed.
    #[error("database error: {0}")]
    DatabaseError(#[from] rusqlite::Error),
}

impl PatcherError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Store(err) => err.kind(),
            Self::InvalidId(err) => err.kind(),
            Self::TargetNotFound(_) => ErrorKind::NotFound,
            Self::Execution { .. } | Self::DatabaseError(_) => ErrorKind::Execution,
        }
    }
}

/// Convenience alias for results with [`PatcherError`].
pub type Result<T> = std::result::Result<T, PatcherError>;
