//! SQLite backend for dbpatcher.
//!
//! This crate executes patches against a [`rusqlite::Connection`] and drives
//! the upgrade/downgrade traversals over the patch list.
//!
//! # Architecture
//!
//! - **`unit`**: [`PatchUnit`]: one patch bound to the connection, its
//!   statement queue, and transactional [`execute`](PatchUnit::execute)
//! - **`patcher`**: [`Patcher`]: status computation and the two traversals,
//!   recording progress in the applied-state store
//!
//! # Quick start
//!
//! ```no_run
//! use dbpatcher_db::{PatchRepository, PatcherConfig};
//! use dbpatcher_sqlite::Patcher;
//! use rusqlite::Connection;
//!
//! let config = PatcherConfig::load("dbpatcher.yml").unwrap();
//! let conn = Connection::open(&config.database).unwrap();
//! let repo = PatchRepository::new(&config.patch_dir);
//!
//! let mut patcher = Patcher::from_config(conn, repo, &config).unwrap();
//! let report = patcher.upgrade(None).unwrap();
//! println!("applied {} patch(es), now at version {}", report.patches.len(), report.version);
//! ```
//!
//! # Atomicity
//!
//! Each patch runs in its own transaction. A failing statement rolls back
//! that patch only; patches committed earlier in the same traversal stay
//! committed.

mod error;
mod patcher;
mod unit;

pub use error::{PatcherError, Result};
pub use patcher::{Patcher, PatcherOptions, Status, TraversalReport};
pub use unit::PatchUnit;
