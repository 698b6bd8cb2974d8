//! Patch storage for dbpatcher.
//!
//! This crate owns everything that lives on the filesystem:
//!
//! - [`PatchRepository`]: discovers `patchNNNN.sql` files, holds the
//!   registry of compiled-in patches, and resolves identifiers to
//!   [`Patch`](dbpatcher_core::Patch) instances.
//! - [`StateStore`]: the applied-state record, one identifier per line.
//! - [`PatcherConfig`]: YAML configuration with the traversal policies
//!   ([`PersistMode`], [`MissingTargetPolicy`]).
//!
//! # Quick start
//!
//! ```no_run
//! use dbpatcher_db::{PatchRepository, PatcherConfig, StateStore};
//!
//! let config = PatcherConfig::load("dbpatcher.yml").unwrap();
//! config.validate().unwrap();
//!
//! let repo = PatchRepository::new(&config.patch_dir);
//! let state = StateStore::load(config.state_path(), &repo).unwrap();
//!
//! for id in repo.list().unwrap() {
//!     let mark = if state.is_applied(id) { "x" } else { " " };
//!     println!("[{mark}] {id}");
//! }
//! ```

mod config;
mod error;
mod repository;
mod state;

pub use config::{MissingTargetPolicy, PatcherConfig, PersistMode};
pub use error::{Result, StoreError};
pub use repository::{PATCH_EXTENSION, PatchFactory, PatchRepository};
pub use state::{DEFAULT_STATE_FILE, StateStore};
