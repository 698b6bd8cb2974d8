//! Error classification shared by all dbpatcher crates.

use std::fmt;

use crate::PatchIdError;

/// The broad category of a failure, as reported to operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed identifier, patch file, or configuration value.
    Validation,
    /// A referenced patch or target version is absent from storage.
    NotFound,
    /// A version does not fit in four digits.
    Range,
    /// Reading or writing the filesystem failed.
    Storage,
    /// A patch transaction failed and was rolled back.
    Execution,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Validation => "ValidationError",
            Self::NotFound => "NotFoundError",
            Self::Range => "RangeError",
            Self::Storage => "StorageError",
            Self::Execution => "ExecutionError",
        };
        f.write_str(name)
    }
}

impl PatchIdError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidName(_) => ErrorKind::Validation,
            Self::VersionOutOfRange(_) => ErrorKind::Range,
        }
    }
}
