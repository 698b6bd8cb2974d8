//! Durable record of applied patches.
//!
//! The record is a plain text file with one patch identifier per line, in
//! the order the patches were applied. A missing file means nothing has been
//! applied yet.
//!
//! # Example
//!
//! ```no_run
//! use dbpatcher_core::PatchId;
//! use dbpatcher_db::{PatchRepository, StateStore};
//!
//! let repo = PatchRepository::new("patches/");
//! let mut state = StateStore::load("patches/patcher_state.txt", &repo).unwrap();
//!
//! let id = PatchId::from_version(1).unwrap();
//! if !state.is_applied(id) {
//!     state.mark_applied(id);
//!     state.persist().unwrap();
//! }
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use dbpatcher_core::PatchId;
use tracing::debug;

use crate::error::{Result, StoreError};
use crate::repository::PatchRepository;

/// Default file name of the state record inside the patch directory.
pub const DEFAULT_STATE_FILE: &str = "patcher_state.txt";

/// Ordered, in-memory view of the state record plus the path it persists to.
#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
    entries: Vec<PatchId>,
}

impl StateStore {
    /// Loads the record at `path`.
    ///
    /// Lines are trimmed and blank lines skipped. Entries naming a patch the
    /// repository no longer knows are dropped silently, as are repeated
    /// entries. When the file does not exist an empty one is created.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidId`] on a malformed line, or
    /// [`StoreError::Io`] if the file cannot be read or created.
    pub fn load(path: impl Into<PathBuf>, repository: &PatchRepository) -> Result<Self> {
        let path = path.into();

        if !path.exists() {
            debug!(file = %path.display(), "creating empty state record");
            fs::write(&path, "").map_err(StoreError::io(&path))?;
            return Ok(Self {
                path,
                entries: Vec::new(),
            });
        }

        let raw = fs::read_to_string(&path).map_err(StoreError::io(&path))?;
        let mut entries = Vec::new();

        for line in raw.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let id = PatchId::parse(line)?;
            if !repository.exists(id) {
                debug!(patch = %id, "dropping state entry for missing patch");
                continue;
            }
            if entries.contains(&id) {
                debug!(patch = %id, "dropping repeated state entry");
                continue;
            }
            entries.push(id);
        }

        Ok(Self { path, entries })
    }

    /// Returns `true` if `id` has been applied.
    pub fn is_applied(&self, id: PatchId) -> bool {
        self.entries.contains(&id)
    }

    /// Validates `name` and checks whether it has been applied.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidId`] if `name` is malformed.
    pub fn is_applied_name(&self, name: &str) -> Result<bool> {
        let id = PatchId::parse(name)?;
        Ok(self.is_applied(id))
    }

    /// Appends `id` to the record. Already-applied ids are left in place.
    pub fn mark_applied(&mut self, id: PatchId) {
        if !self.is_applied(id) {
            self.entries.push(id);
        }
    }

    /// Removes the most recent occurrence of `id`. Returns whether it was present.
    pub fn mark_reverted(&mut self, id: PatchId) -> bool {
        match self.entries.iter().rposition(|entry| *entry == id) {
            Some(index) => {
                self.entries.remove(index);
                true
            }
            None => false,
        }
    }

    /// Rewrites the record with the current entries.
    ///
    /// The content is written to a sibling temporary file first and then
    /// renamed over the record.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] if writing or renaming fails.
    pub fn persist(&self) -> Result<()> {
        let data = self
            .entries
            .iter()
            .map(PatchId::name)
            .collect::<Vec<_>>()
            .join("\n");

        let temp_path = self.path.with_extension("tmp");
        fs::write(&temp_path, data).map_err(StoreError::io(&temp_path))?;
        fs::rename(&temp_path, &self.path).map_err(StoreError::io(&self.path))?;

        debug!(file = %self.path.display(), entries = self.entries.len(), "state persisted");
        Ok(())
    }

    /// Applied identifiers in application order.
    pub fn entries(&self) -> &[PatchId] {
        &self.entries
    }

    /// The most recently applied identifier.
    pub fn last(&self) -> Option<PatchId> {
        self.entries.last().copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Location of the record on disk.
    pub fn path(&self) -> &Path {
        &self.path
    }
}
