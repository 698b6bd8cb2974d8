//! Transactional execution of a single patch.
//!
//! A [`PatchUnit`] binds a loaded [`Patch`] to the connection it will run
//! on. One half of the patch is declared into the unit's statement queue,
//! then [`execute`](PatchUnit::execute) runs the queue in one transaction:
//! either every statement commits or none does.
//!
//! # Example
//!
//! ```
//! use dbpatcher_core::{PatchId, SqlPatch};
//! use dbpatcher_sqlite::PatchUnit;
//! use rusqlite::Connection;
//!
//! let mut conn = Connection::open_in_memory().unwrap();
//! let patch = SqlPatch::parse("-- +upgrade\nCREATE TABLE t (id INTEGER);\n").unwrap();
//!
//! let mut unit = PatchUnit::new(PatchId::from_version(1).unwrap(), Box::new(patch), &mut conn);
//! unit.upgrade();
//! unit.execute().unwrap();
//! ```

use dbpatcher_core::{Direction, Patch, PatchId, Statements};
use dbpatcher_db::PatchRepository;
use rusqlite::Connection;
use tracing::{info, warn};

use crate::error::{PatcherError, Result};

/// A patch bound to a connection, with its queue of prepared statements.
pub struct PatchUnit<'conn> {
    id: PatchId,
    patch: Box<dyn Patch>,
    statements: Statements,
    conn: &'conn mut Connection,
}

impl<'conn> PatchUnit<'conn> {
    /// Binds `patch` to `conn` with an empty statement queue.
    pub fn new(id: PatchId, patch: Box<dyn Patch>, conn: &'conn mut Connection) -> Self {
        Self {
            id,
            patch,
            statements: Statements::new(id),
            conn,
        }
    }

    /// Loads `id` from `repository` and binds it to `conn`.
    ///
    /// # Errors
    ///
    /// Propagates repository failures (unknown patch, unreadable or invalid
    /// patch file).
    pub fn load(
        repository: &PatchRepository,
        id: PatchId,
        conn: &'conn mut Connection,
    ) -> Result<Self> {
        let patch = repository.load(id)?;
        Ok(Self::new(id, patch, conn))
    }

    /// Queues the forward statements.
    pub fn upgrade(&mut self) {
        self.patch.upgrade(&mut self.statements);
    }

    /// Queues the backward statements.
    pub fn downgrade(&mut self) {
        self.patch.downgrade(&mut self.statements);
    }

    /// Queues one half of the patch according to `direction`.
    pub fn declare(&mut self, direction: Direction) {
        match direction {
            Direction::Upgrade => self.upgrade(),
            Direction::Downgrade => self.downgrade(),
        }
    }

    /// Queues an extra statement.
    pub fn prepare(&mut self, sql: impl Into<String>) {
        self.statements.prepare(sql);
    }

    pub fn id(&self) -> PatchId {
        self.id
    }

    /// Statements queued so far.
    pub fn statements(&self) -> &Statements {
        &self.statements
    }

    /// Runs every queued statement inside one transaction.
    ///
    /// # Errors
    ///
    /// Returns [`PatcherError::Execution`] with the failing statement after
    /// rolling the transaction back, or [`PatcherError::DatabaseError`] if
    /// the transaction cannot be opened or committed.
    pub fn execute(self) -> Result<()> {
        let Self {
            id,
            statements,
            conn,
            ..
        } = self;

        let tx = conn.transaction()?;
        for sql in &statements {
            info!(patch = %id, statement = %sql, "execute statement");
            if let Err(source) = tx.execute_batch(sql) {
                warn!(patch = %id, statement = %sql, error = %source, "statement failed, rolling back");
                if let Err(rollback) = tx.rollback() {
                    warn!(patch = %id, error = %rollback, "rollback failed");
                }
                return Err(PatcherError::Execution {
                    patch: id,
                    statement: sql.clone(),
                    source,
                });
            }
        }
        tx.commit()?;
        Ok(())
    }
}
