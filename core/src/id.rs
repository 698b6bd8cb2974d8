//! Patch identifiers and the version naming convention.
//!
//! Every patch is named `patch` followed by exactly four decimal digits
//! (`patch0007`). The digits encode the patch version, so the mapping between
//! an identifier and its version is bijective over `0..=9999`.
//!
//! # Examples
//!
//! ```
//! use dbpatcher_core::{PatchId, name_from_version, version_from_name};
//!
//! let id = name_from_version(7).unwrap();
//! assert_eq!(id.to_string(), "patch0007");
//! assert_eq!(version_from_name("patch0007").unwrap(), 7);
//!
//! // Five digits do not fit the naming convention.
//! assert!(name_from_version(10_000).is_err());
//! assert!("patch12345".parse::<PatchId>().is_err());
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// Fixed prefix shared by every patch identifier.
pub const PATCH_PREFIX: &str = "patch";

/// Number of digits in the version suffix.
pub const VERSION_DIGITS: usize = 4;

/// Highest version representable with [`VERSION_DIGITS`] digits.
pub const MAX_VERSION: u32 = 9999;

/// Errors raised while building or parsing a [`PatchId`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PatchIdError {
    /// The string is not `patch` followed by exactly four digits.
    #[error("invalid patch name '{0}': expected 'patch' followed by 4 digits")]
    InvalidName(String),
    /// The version needs more than four digits.
    #[error("version {0} exceeds the 4-digit limit (max 9999)")]
    VersionOutOfRange(u32),
}

/// Canonical identifier of a patch.
///
/// Ordering follows the version number, which is also the lexicographic
/// order of the zero-padded names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PatchId {
    version: u32,
}

impl PatchId {
    /// Builds the identifier for `version`.
    ///
    /// # Errors
    ///
    /// Returns [`PatchIdError::VersionOutOfRange`] when `version > 9999`.
    pub fn from_version(version: u32) -> Result<Self, PatchIdError> {
        if version > MAX_VERSION {
            return Err(PatchIdError::VersionOutOfRange(version));
        }
        Ok(Self { version })
    }

    /// Parses and validates a patch name.
    ///
    /// # Errors
    ///
    /// Returns [`PatchIdError::InvalidName`] unless `name` is exactly
    /// `patch` followed by four ASCII digits.
    pub fn parse(name: &str) -> Result<Self, PatchIdError> {
        let invalid = || PatchIdError::InvalidName(name.to_string());

        let digits = name.strip_prefix(PATCH_PREFIX).ok_or_else(invalid)?;
        if digits.len() != VERSION_DIGITS || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }

        let version = digits.parse::<u32>().map_err(|_| invalid())?;
        Ok(Self { version })
    }

    /// The version encoded in this identifier.
    pub fn version(&self) -> u32 {
        self.version
    }

    /// The canonical `patchNNNN` form.
    pub fn name(&self) -> String {
        self.to_string()
    }

    /// File name of the SQL patch with the given extension (`patch0001.sql`).
    pub fn file_name(&self, extension: &str) -> String {
        format!("{self}.{extension}")
    }
}

impl fmt::Display for PatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{PATCH_PREFIX}{:0width$}", self.version, width = VERSION_DIGITS)
    }
}

impl FromStr for PatchId {
    type Err = PatchIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for PatchId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for PatchId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// Returns the identifier naming `version`.
///
/// # Errors
///
/// Returns [`PatchIdError::VersionOutOfRange`] for versions above 9999.
pub fn name_from_version(version: u32) -> Result<PatchId, PatchIdError> {
    PatchId::from_version(version)
}

/// Returns the version encoded in `name`.
///
/// # Errors
///
/// Returns [`PatchIdError::InvalidName`] if `name` is malformed.
pub fn version_from_name(name: &str) -> Result<u32, PatchIdError> {
    PatchId::parse(name).map(|id| id.version())
}
