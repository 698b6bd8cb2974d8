//! Core types for versioned database patches.
//!
//! This crate defines the pieces every other `dbpatcher` crate builds on:
//!
//! - [`PatchId`]: the `patchNNNN` identifier and its version mapping
//!   ([`name_from_version`], [`version_from_name`]).
//! - [`Patch`]: the two-operation contract (upgrade/downgrade) a patch
//!   implements by queueing SQL on a [`Statements`] queue.
//! - [`SqlPatch`]: a patch read from a `.sql` file with `-- +upgrade` and
//!   `-- +downgrade` sections.
//!
//! Nothing here touches a database. Executing statements is left to a
//! backend such as `dbpatcher-sqlite`.
//!
//! # Example
//!
//! ```
//! use dbpatcher_core::*;
//!
//! struct AddEmail;
//!
//! impl Patch for AddEmail {
//!     fn upgrade(&self, s: &mut Statements) {
//!         s.prepare("ALTER TABLE users ADD COLUMN email TEXT");
//!     }
//!     fn downgrade(&self, s: &mut Statements) {
//!         s.prepare("ALTER TABLE users DROP COLUMN email");
//!     }
//! }
//!
//! let id: PatchId = "patch0002".parse().unwrap();
//! let queued = Statements::declare(id, &AddEmail, Direction::Downgrade);
//! assert_eq!(queued.iter().next(), Some("ALTER TABLE users DROP COLUMN email"));
//! ```

mod error;
mod id;
mod patch;
mod sql_file;

pub use error::ErrorKind;
pub use id::{
    MAX_VERSION, PATCH_PREFIX, PatchId, PatchIdError, VERSION_DIGITS, name_from_version,
    version_from_name,
};
pub use patch::{Direction, Patch, Statements};
pub use sql_file::{PatchFileError, SqlPatch};
