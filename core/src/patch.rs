//! The patch contract.
//!
//! A [`Patch`] only *declares* statements. It pushes them onto a
//! [`Statements`] queue through [`Statements::prepare`]; running the queue
//! inside a transaction is the job of the executing backend.
//!
//! # Examples
//!
//! ```
//! use dbpatcher_core::{Direction, Patch, PatchId, Statements};
//!
//! struct CreateUsers;
//!
//! impl Patch for CreateUsers {
//!     fn upgrade(&self, statements: &mut Statements) {
//!         statements.prepare("CREATE TABLE users (id INTEGER PRIMARY KEY)");
//!     }
//!
//!     fn downgrade(&self, statements: &mut Statements) {
//!         statements.prepare("DROP TABLE users");
//!     }
//! }
//!
//! let id = PatchId::from_version(1).unwrap();
//! let statements = Statements::declare(id, &CreateUsers, Direction::Upgrade);
//! assert_eq!(statements.len(), 1);
//! ```

use std::fmt;

use tracing::info;

use crate::PatchId;

/// One reversible unit of schema change.
///
/// Implementations must not execute anything themselves; they only queue
/// statements.
pub trait Patch {
    /// Declares the statements moving the schema one step forward.
    fn upgrade(&self, statements: &mut Statements);

    /// Declares the statements undoing [`upgrade`](Self::upgrade).
    fn downgrade(&self, statements: &mut Statements);
}

/// Which half of a patch to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Upgrade,
    Downgrade,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Upgrade => f.write_str("upgrade"),
            Self::Downgrade => f.write_str("downgrade"),
        }
    }
}

/// Ordered queue of not-yet-executed statements for one patch.
#[derive(Debug, Clone)]
pub struct Statements {
    patch: PatchId,
    queue: Vec<String>,
}

impl Statements {
    /// Creates an empty queue for `patch`.
    pub fn new(patch: PatchId) -> Self {
        Self {
            patch,
            queue: Vec::new(),
        }
    }

    /// Runs one half of `patch` and collects what it declares.
    pub fn declare(id: PatchId, patch: &dyn Patch, direction: Direction) -> Self {
        let mut statements = Self::new(id);
        match direction {
            Direction::Upgrade => patch.upgrade(&mut statements),
            Direction::Downgrade => patch.downgrade(&mut statements),
        }
        statements
    }

    /// Enqueues `sql` for later execution.
    pub fn prepare(&mut self, sql: impl Into<String>) {
        let sql = sql.into();
        info!(patch = %self.patch, statement = %sql, "prepare statement");
        self.queue.push(sql);
    }

    /// The patch these statements belong to.
    pub fn patch(&self) -> PatchId {
        self.patch
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Iterates statements in enqueue order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.queue.iter().map(String::as_str)
    }
}

impl<'a> IntoIterator for &'a Statements {
    type Item = &'a String;
    type IntoIter = std::slice::Iter<'a, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.queue.iter()
    }
}
