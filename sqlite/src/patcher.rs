//! Upgrade and downgrade traversals over the patch list.
//!
//! [`Patcher`] owns the connection, the [`PatchRepository`] and the
//! [`StateStore`]. Upgrading walks the patch list in ascending order and
//! stops after the target (inclusive); downgrading walks it in descending
//! order and stops *at* the target, which stays applied.
//!
//! # Example
//!
//! ```no_run
//! use dbpatcher_db::PatchRepository;
//! use dbpatcher_sqlite::Patcher;
//! use rusqlite::Connection;
//!
//! let conn = Connection::open("app.db").unwrap();
//! let repo = PatchRepository::new("patches/");
//! let mut patcher = Patcher::new(conn, repo, "patches/patcher_state.txt").unwrap();
//!
//! // Apply everything up to and including patch0002.
//! patcher.upgrade(Some(2)).unwrap();
//!
//! let status = patcher.status().unwrap();
//! println!("version {}, {} pending", status.version, status.to_install.len());
//!
//! // Revert everything after patch0001.
//! patcher.downgrade(Some(1)).unwrap();
//! ```

use std::path::PathBuf;

use dbpatcher_core::{Direction, PatchId};
use dbpatcher_db::{MissingTargetPolicy, PatchRepository, PatcherConfig, PersistMode, StateStore};
use rusqlite::Connection;
use serde::Serialize;
use tracing::{debug, info};

use crate::error::{PatcherError, Result};
use crate::unit::PatchUnit;

/// Traversal policies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PatcherOptions {
    pub persist: PersistMode,
    pub missing_target: MissingTargetPolicy,
}

impl From<&PatcherConfig> for PatcherOptions {
    fn from(config: &PatcherConfig) -> Self {
        Self {
            persist: config.persist,
            missing_target: config.missing_target,
        }
    }
}

/// Snapshot of the migration status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Status {
    /// Version of the most recently applied patch, or 0.
    pub version: u32,
    /// Unapplied patches in list order.
    pub to_install: Vec<PatchId>,
}

impl Status {
    pub fn is_up_to_date(&self) -> bool {
        self.to_install.is_empty()
    }
}

/// Outcome of one traversal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraversalReport {
    pub direction: Direction,
    /// Patches applied or reverted, in execution order.
    pub patches: Vec<PatchId>,
    /// Version after the traversal.
    pub version: u32,
}

/// Drives upgrade and downgrade traversals against one connection.
#[derive(Debug)]
pub struct Patcher {
    conn: Connection,
    repository: PatchRepository,
    state: StateStore,
    options: PatcherOptions,
}

impl Patcher {
    /// Creates a patcher and loads the state record at `state_path`.
    ///
    /// # Errors
    ///
    /// Returns [`PatcherError::Store`] if the state record is malformed or
    /// cannot be read or created.
    pub fn new(
        conn: Connection,
        repository: PatchRepository,
        state_path: impl Into<PathBuf>,
    ) -> Result<Self> {
        let state = StateStore::load(state_path, &repository)?;
        debug!(applied = state.len(), "state loaded");
        Ok(Self {
            conn,
            repository,
            state,
            options: PatcherOptions::default(),
        })
    }

    /// Creates a patcher from a validated configuration.
    ///
    /// # Errors
    ///
    /// Fails if the patch directory does not exist or the state record
    /// cannot be loaded.
    pub fn from_config(
        conn: Connection,
        repository: PatchRepository,
        config: &PatcherConfig,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self::new(conn, repository, config.state_path())?.with_options(config.into()))
    }

    /// Replaces the traversal policies.
    pub fn with_options(mut self, options: PatcherOptions) -> Self {
        self.options = options;
        self
    }

    /// All known patches, ascending. Re-scans storage on every call.
    pub fn list(&self) -> Result<Vec<PatchId>> {
        Ok(self.repository.list()?)
    }

    /// Current version and pending patches. Never mutates state.
    pub fn status(&self) -> Result<Status> {
        let to_install = self
            .list()?
            .into_iter()
            .filter(|id| !self.state.is_applied(*id))
            .collect();

        Ok(Status {
            version: self.current_version(),
            to_install,
        })
    }

    /// Applies pending patches in ascending order up to `target` (inclusive).
    ///
    /// Without a target every pending patch is applied. Already-applied
    /// patches are skipped; reaching the target ends the walk whether or not
    /// it had to be applied.
    ///
    /// # Errors
    ///
    /// Returns [`PatcherError::InvalidId`] for a target above 9999,
    /// [`PatcherError::TargetNotFound`] for an unknown target under
    /// [`MissingTargetPolicy::Fail`], and the first execution or storage
    /// failure otherwise. The walk stops at the first failure.
    pub fn upgrade(&mut self, target: Option<u32>) -> Result<TraversalReport> {
        let list = self.list()?;
        let target = match target {
            Some(version) => Some(self.resolve_target(version, &list)?),
            None => list.last().copied(),
        };
        info!(target_patch = ?target.map(|t| t.name()), "upgrade");

        let mut applied = Vec::new();
        for id in list {
            if self.state.is_applied(id) {
                debug!(patch = %id, "already applied, skipping");
            } else {
                self.run(id, Direction::Upgrade)?;
                applied.push(id);
            }
            if Some(id) == target {
                break;
            }
        }

        self.finish(Direction::Upgrade, applied)
    }

    /// Reverts applied patches in descending order down to `target`
    /// (exclusive). The default target 0 reverts everything.
    ///
    /// # Errors
    ///
    /// Same as [`upgrade`](Self::upgrade). Target 0 is always accepted.
    pub fn downgrade(&mut self, target: Option<u32>) -> Result<TraversalReport> {
        let list = self.list()?;
        let target = match target.unwrap_or(0) {
            0 => PatchId::from_version(0)?,
            version => self.resolve_target(version, &list)?,
        };
        info!(target_patch = %target, "downgrade");

        let mut reverted = Vec::new();
        for id in list.into_iter().rev() {
            if id == target {
                break;
            }
            if !self.state.is_applied(id) {
                debug!(patch = %id, "not applied, skipping");
                continue;
            }
            self.run(id, Direction::Downgrade)?;
            reverted.push(id);
        }

        self.finish(Direction::Downgrade, reverted)
    }

    /// The applied-state store.
    pub fn state(&self) -> &StateStore {
        &self.state
    }

    pub fn repository(&self) -> &PatchRepository {
        &self.repository
    }

    pub fn options(&self) -> PatcherOptions {
        self.options
    }

    /// Returns a reference to the underlying connection.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Consumes the patcher and returns the underlying connection.
    pub fn into_connection(self) -> Connection {
        self.conn
    }

    fn current_version(&self) -> u32 {
        self.state.last().map_or(0, |id| id.version())
    }

    fn resolve_target(&self, version: u32, list: &[PatchId]) -> Result<PatchId> {
        let id = PatchId::from_version(version)?;
        if list.contains(&id) {
            return Ok(id);
        }
        match self.options.missing_target {
            MissingTargetPolicy::Fail => Err(PatcherError::TargetNotFound(id)),
            MissingTargetPolicy::ApplyAll => {
                debug!(target_patch = %id, "target not in patch list, walking the whole list");
                Ok(id)
            }
        }
    }

    /// Loads, declares, and executes one patch, then records it.
    fn run(&mut self, id: PatchId, direction: Direction) -> Result<()> {
        let mut unit = PatchUnit::load(&self.repository, id, &mut self.conn)?;
        unit.declare(direction);
        unit.execute()?;

        match direction {
            Direction::Upgrade => self.state.mark_applied(id),
            Direction::Downgrade => {
                self.state.mark_reverted(id);
            }
        }
        info!(patch = %id, %direction, "patch complete");

        if self.options.persist == PersistMode::PerPatch {
            self.state.persist()?;
        }
        Ok(())
    }

    fn finish(&mut self, direction: Direction, patches: Vec<PatchId>) -> Result<TraversalReport> {
        self.state.persist()?;
        let version = self.current_version();
        info!(%direction, count = patches.len(), version, "traversal complete");
        Ok(TraversalReport {
            direction,
            patches,
            version,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dbpatcher_db::DEFAULT_STATE_FILE;
    use std::fs;
    use std::path::Path;

    fn id(version: u32) -> PatchId {
        PatchId::from_version(version).unwrap()
    }

    fn write_table_patch(dir: &Path, version: u32) {
        let body = format!(
            "-- +upgrade\nCREATE TABLE t{version} (id INTEGER);\n-- +downgrade\nDROP TABLE t{version};\n"
        );
        fs::write(dir.join(id(version).file_name("sql")), body).unwrap();
    }

    fn patcher(dir: &Path, versions: &[u32]) -> Patcher {
        for v in versions {
            write_table_patch(dir, *v);
        }
        let conn = Connection::open_in_memory().unwrap();
        Patcher::new(conn, PatchRepository::new(dir), dir.join(DEFAULT_STATE_FILE)).unwrap()
    }

    #[test]
    fn test_status_on_fresh_directory() {
        let dir = tempfile::tempdir().unwrap();
        let patcher = patcher(dir.path(), &[1, 2]);
        let status = patcher.status().unwrap();
        assert_eq!(status.version, 0);
        assert_eq!(status.to_install, vec![id(1), id(2)]);
        assert!(!status.is_up_to_date());
    }

    #[test]
    fn test_upgrade_on_empty_list() {
        let dir = tempfile::tempdir().unwrap();
        let mut patcher = patcher(dir.path(), &[]);
        let report = patcher.upgrade(None).unwrap();
        assert!(report.patches.is_empty());
        assert_eq!(report.version, 0);
    }

    #[test]
    fn test_upgrade_stops_at_already_applied_target() {
        let dir = tempfile::tempdir().unwrap();
        let mut patcher = patcher(dir.path(), &[1, 2, 3]);
        patcher.upgrade(Some(2)).unwrap();

        let report = patcher.upgrade(Some(2)).unwrap();
        assert!(report.patches.is_empty());
        assert_eq!(patcher.status().unwrap().to_install, vec![id(3)]);
    }

    #[test]
    fn test_version_follows_application_order() {
        let dir = tempfile::tempdir().unwrap();
        let mut patcher = patcher(dir.path(), &[1, 3]);
        patcher.upgrade(None).unwrap();

        // A patch added later with a lower version is applied last.
        write_table_patch(dir.path(), 2);
        let report = patcher.upgrade(None).unwrap();
        assert_eq!(report.patches, vec![id(2)]);
        assert_eq!(patcher.status().unwrap().version, 2);
        assert_eq!(patcher.state().entries(), &[id(1), id(3), id(2)]);
    }

    #[test]
    fn test_downgrade_target_zero_is_always_accepted() {
        let dir = tempfile::tempdir().unwrap();
        let mut patcher = patcher(dir.path(), &[1]);
        patcher.upgrade(None).unwrap();
        let report = patcher.downgrade(Some(0)).unwrap();
        assert_eq!(report.patches, vec![id(1)]);
        assert!(patcher.state().is_empty());
    }

    #[test]
    fn test_out_of_range_target() {
        let dir = tempfile::tempdir().unwrap();
        let mut patcher = patcher(dir.path(), &[1]);
        let err = patcher.upgrade(Some(10_000)).unwrap_err();
        assert_eq!(err.kind(), dbpatcher_core::ErrorKind::Range);
        let err = patcher.downgrade(Some(10_000)).unwrap_err();
        assert_eq!(err.kind(), dbpatcher_core::ErrorKind::Range);
    }

    #[test]
    fn test_options_from_config() {
        let mut config = PatcherConfig::new("app.db", "patches");
        config.persist = PersistMode::EndOfTraversal;
        config.missing_target = MissingTargetPolicy::ApplyAll;
        let options = PatcherOptions::from(&config);
        assert_eq!(options.persist, PersistMode::EndOfTraversal);
        assert_eq!(options.missing_target, MissingTargetPolicy::ApplyAll);
    }

    #[test]
    fn test_status_serializes_names() {
        let status = Status {
            version: 1,
            to_install: vec![id(2)],
        };
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["version"], 1);
        assert_eq!(json["to_install"][0], "patch0002");
    }
}
