//! Error types for patch storage operations.
//!
//! Covers identifier validation, missing patches, filesystem access, patch
//! file parsing, registry conflicts, and configuration loading.

use std::path::{Path, PathBuf};

use dbpatcher_core::{ErrorKind, PatchFileError, PatchId, PatchIdError};
use thiserror::Error;

/// Errors that can occur while discovering, loading, or recording patches.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Malformed patch identifier or out-of-range version.
    #[error(transparent)]
    InvalidId(#[from] PatchIdError),

    /// No registered patch and no patch file for this identifier.
    #[error("patch not found: {0}")]
    PatchNotFound(PatchId),

    /// Filesystem access failure.
    #[error("I/O error on '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A patch file exists but cannot be parsed.
    #[error("invalid patch file '{}': {source}", path.display())]
    InvalidPatchFile {
        path: PathBuf,
        #[source]
        source: PatchFileError,
    },

    /// A compiled-in patch was registered twice under the same identifier.
    #[error("patch {0} is already registered")]
    DuplicatePatch(PatchId),

    /// YAML parsing or serialization failure.
    #[error("YAML error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    /// Configuration is structurally valid but unusable.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl StoreError {
    /// Wraps an I/O error with the path it happened on.
    pub(crate) fn io(path: &Path) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.to_path_buf();
        move |source| Self::Io { path, source }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidId(err) => err.kind(),
            Self::PatchNotFound(_) => ErrorKind::NotFound,
            Self::Io { .. } => ErrorKind::Storage,
            Self::InvalidPatchFile { .. }
            | Self::DuplicatePatch(_)
            | Self::YamlError(_)
            | Self::InvalidConfig(_) => ErrorKind::Validation,
        }
    }
}

/// Convenience alias for results with [`StoreError`].
pub type Result<T> = std::result::Result<T, StoreError>;
