//! Patch discovery and loading.
//!
//! A [`PatchRepository`] knows two kinds of patches:
//!
//! - **patch files**: `patchNNNN.sql` files in the patch directory, parsed
//!   with [`SqlPatch`];
//! - **registered patches**: Rust implementations of [`Patch`] registered
//!   at startup under an explicit identifier.
//!
//! Both are merged into one list ordered by version. A registered patch
//! shadows a file with the same identifier.
//!
//! # Example
//!
//! ```no_run
//! use dbpatcher_core::{Patch, PatchId, Statements};
//! use dbpatcher_db::PatchRepository;
//!
//! struct Seed;
//! impl Patch for Seed {
//!     fn upgrade(&self, s: &mut Statements) { s.prepare("INSERT INTO t VALUES (1)"); }
//!     fn downgrade(&self, s: &mut Statements) { s.prepare("DELETE FROM t"); }
//! }
//!
//! let mut repo = PatchRepository::new("patches/");
//! repo.register(PatchId::from_version(5).unwrap(), || Box::new(Seed)).unwrap();
//!
//! for id in repo.list().unwrap() {
//!     println!("{id}");
//! }
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use dbpatcher_core::{PATCH_PREFIX, Patch, PatchId, PatchIdError, SqlPatch, VERSION_DIGITS};
use regex::Regex;
use tracing::debug;

use crate::error::{Result, StoreError};

/// Extension of patch files in the patch directory.
pub const PATCH_EXTENSION: &str = "sql";

static PATCH_FILE_RE: LazyLock<Regex> = LazyLock::new(|| {
    let pattern = format!(
        r"^({}[0-9]{{{VERSION_DIGITS}}})\.{}$",
        regex::escape(PATCH_PREFIX),
        regex::escape(PATCH_EXTENSION)
    );
    Regex::new(&pattern).expect("static regex must compile")
});

/// Constructor for a compiled-in patch.
pub type PatchFactory = Box<dyn Fn() -> Box<dyn Patch>>;

/// Discovers patches and resolves identifiers to patch logic.
pub struct PatchRepository {
    dir: PathBuf,
    registry: BTreeMap<PatchId, PatchFactory>,
}

impl PatchRepository {
    /// Creates a repository over the patch directory `dir`.
    ///
    /// The directory is not touched until [`list`](Self::list) or
    /// [`load`](Self::load) is called.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            registry: BTreeMap::new(),
        }
    }

    /// Registers a compiled-in patch under `id`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::DuplicatePatch`] if `id` is already registered.
    pub fn register<F>(&mut self, id: PatchId, factory: F) -> Result<()>
    where
        F: Fn() -> Box<dyn Patch> + 'static,
    {
        if self.registry.contains_key(&id) {
            return Err(StoreError::DuplicatePatch(id));
        }
        self.registry.insert(id, Box::new(factory));
        Ok(())
    }

    /// Returns every known patch identifier, ascending by version.
    ///
    /// The directory is scanned on every call. Entries that are not regular
    /// files named `patchNNNN.sql` are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] if the directory cannot be read.
    pub fn list(&self) -> Result<Vec<PatchId>> {
        let mut ids: BTreeSet<PatchId> = self.registry.keys().copied().collect();

        for entry in fs::read_dir(&self.dir).map_err(StoreError::io(&self.dir))? {
            let entry = entry.map_err(StoreError::io(&self.dir))?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let Some(captures) = PATCH_FILE_RE.captures(file_name) else {
                debug!(file = %path.display(), "skipping non-patch entry");
                continue;
            };
            ids.insert(PatchId::parse(&captures[1])?);
        }

        Ok(ids.into_iter().collect())
    }

    /// Returns `true` if `id` is registered or has a patch file.
    pub fn exists(&self, id: PatchId) -> bool {
        self.registry.contains_key(&id) || self.path_of(id).is_file()
    }

    /// Validates `name` and checks whether it exists.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidId`] if `name` is malformed.
    pub fn exists_name(&self, name: &str) -> Result<bool> {
        let id = PatchId::parse(name)?;
        Ok(self.exists(id))
    }

    /// Instantiates the patch behind `id`.
    ///
    /// Registered patches take precedence over patch files. Every call
    /// produces a fresh instance; the registry is never modified.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::PatchNotFound`] if `id` does not exist,
    /// [`StoreError::Io`] if the patch file cannot be read, or
    /// [`StoreError::InvalidPatchFile`] if it cannot be parsed.
    pub fn load(&self, id: PatchId) -> Result<Box<dyn Patch>> {
        if let Some(factory) = self.registry.get(&id) {
            debug!(patch = %id, "loading registered patch");
            return Ok(factory());
        }

        let path = self.path_of(id);
        if !path.is_file() {
            return Err(StoreError::PatchNotFound(id));
        }

        debug!(patch = %id, file = %path.display(), "loading patch file");
        let source = fs::read_to_string(&path).map_err(StoreError::io(&path))?;
        let patch = SqlPatch::parse(&source)
            .map_err(|source| StoreError::InvalidPatchFile { path, source })?;
        Ok(Box::new(patch))
    }

    /// Validates `name` and loads it.
    pub fn load_name(&self, name: &str) -> Result<Box<dyn Patch>> {
        let id = PatchId::parse(name)?;
        self.load(id)
    }

    /// Identifier of the patch with the given version.
    pub fn name_from_version(version: u32) -> std::result::Result<PatchId, PatchIdError> {
        dbpatcher_core::name_from_version(version)
    }

    /// Version encoded in a patch name.
    pub fn version_from_name(name: &str) -> std::result::Result<u32, PatchIdError> {
        dbpatcher_core::version_from_name(name)
    }

    /// Identifier following the highest known patch (`patch0001` when empty).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidId`] once `patch9999` is taken, or
    /// [`StoreError::Io`] if the directory cannot be read.
    pub fn next_id(&self) -> Result<PatchId> {
        let next = self
            .list()?
            .last()
            .map_or(1, |last| last.version() + 1);
        Ok(PatchId::from_version(next)?)
    }

    /// Writes an empty patch file for `id` and returns its path.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] if the file already exists or cannot be
    /// written.
    pub fn create_patch_file(&self, id: PatchId) -> Result<PathBuf> {
        let path = self.path_of(id);
        let mut file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(StoreError::io(&path))?;
        file.write_all(SqlPatch::template().as_bytes())
            .map_err(StoreError::io(&path))?;
        Ok(path)
    }

    /// Path a patch file for `id` has in the patch directory.
    pub fn path_of(&self, id: PatchId) -> PathBuf {
        self.dir.join(id.file_name(PATCH_EXTENSION))
    }

    /// The patch directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl fmt::Debug for PatchRepository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PatchRepository")
            .field("dir", &self.dir)
            .field("registered", &self.registry.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dbpatcher_core::{Direction, Statements};

    fn id(version: u32) -> PatchId {
        PatchId::from_version(version).unwrap()
    }

    fn write_patch(dir: &Path, name: &str, body: &str) {
        fs::write(dir.join(name), body).unwrap();
    }

    struct Noop;

    impl Patch for Noop {
        fn upgrade(&self, statements: &mut Statements) {
            statements.prepare("SELECT 'registered'");
        }
        fn downgrade(&self, _statements: &mut Statements) {}
    }

    #[test]
    fn test_file_pattern_follows_naming_constants() {
        assert!(PATCH_FILE_RE.is_match(&id(7).file_name(PATCH_EXTENSION)));
        assert!(PATCH_FILE_RE.is_match("patch9999.sql"));
        for name in [
            "patch0001.sqlx",
            "patch0001xsql",
            "patch0001.SQL",
            "patch001.sql",
            "patch00001.sql",
            "xpatch0001.sql",
        ] {
            assert!(!PATCH_FILE_RE.is_match(name), "{name} should not match");
        }
    }

    #[test]
    fn test_list_sorts_and_filters() {
        let dir = tempfile::tempdir().unwrap();
        write_patch(dir.path(), "patch0010.sql", "-- +upgrade\n");
        write_patch(dir.path(), "patch0002.sql", "-- +upgrade\n");
        write_patch(dir.path(), "patch0001.sql", "-- +upgrade\n");
        write_patch(dir.path(), "patch0003.txt", "-- +upgrade\n");
        write_patch(dir.path(), "patch12345.sql", "-- +upgrade\n");
        write_patch(dir.path(), "notes.md", "hello");
        write_patch(dir.path(), "patcher_state.txt", "");
        fs::create_dir(dir.path().join("patch0004.sql")).unwrap();

        let repo = PatchRepository::new(dir.path());
        let names: Vec<String> = repo.list().unwrap().iter().map(PatchId::name).collect();
        assert_eq!(names, vec!["patch0001", "patch0002", "patch0010"]);
    }

    #[test]
    fn test_list_rescans_every_call() {
        let dir = tempfile::tempdir().unwrap();
        let repo = PatchRepository::new(dir.path());
        assert!(repo.list().unwrap().is_empty());

        write_patch(dir.path(), "patch0001.sql", "-- +upgrade\n");
        assert_eq!(repo.list().unwrap(), vec![id(1)]);
    }

    #[test]
    fn test_list_missing_directory_is_storage_error() {
        let dir = tempfile::tempdir().unwrap();
        let repo = PatchRepository::new(dir.path().join("missing"));
        let err = repo.list().unwrap_err();
        assert!(matches!(err, StoreError::Io { .. }));
        assert_eq!(err.kind(), dbpatcher_core::ErrorKind::Storage);
    }

    #[test]
    fn test_registered_patches_are_listed_and_deduplicated() {
        let dir = tempfile::tempdir().unwrap();
        write_patch(dir.path(), "patch0001.sql", "-- +upgrade\n");
        write_patch(dir.path(), "patch0003.sql", "-- +upgrade\n");

        let mut repo = PatchRepository::new(dir.path());
        repo.register(id(2), || Box::new(Noop)).unwrap();
        repo.register(id(3), || Box::new(Noop)).unwrap();

        assert_eq!(repo.list().unwrap(), vec![id(1), id(2), id(3)]);
        assert!(repo.exists(id(2)));
    }

    #[test]
    fn test_duplicate_registration_is_rejected() {
        let mut repo = PatchRepository::new("unused");
        repo.register(id(1), || Box::new(Noop)).unwrap();
        let err = repo.register(id(1), || Box::new(Noop)).unwrap_err();
        assert!(matches!(err, StoreError::DuplicatePatch(p) if p == id(1)));
    }

    #[test]
    fn test_exists_and_exists_name() {
        let dir = tempfile::tempdir().unwrap();
        write_patch(dir.path(), "patch0001.sql", "-- +upgrade\n");
        let repo = PatchRepository::new(dir.path());

        assert!(repo.exists(id(1)));
        assert!(!repo.exists(id(2)));
        assert!(repo.exists_name("patch0001").unwrap());
        assert!(matches!(
            repo.exists_name("patch1"),
            Err(StoreError::InvalidId(PatchIdError::InvalidName(_)))
        ));
    }

    #[test]
    fn test_load_patch_file() {
        let dir = tempfile::tempdir().unwrap();
        write_patch(
            dir.path(),
            "patch0001.sql",
            "-- +upgrade\nCREATE TABLE t (id INTEGER);\n-- +downgrade\nDROP TABLE t;\n",
        );
        let repo = PatchRepository::new(dir.path());

        let patch = repo.load(id(1)).unwrap();
        let up = Statements::declare(id(1), patch.as_ref(), Direction::Upgrade);
        assert_eq!(up.iter().collect::<Vec<_>>(), vec!["CREATE TABLE t (id INTEGER)"]);

        // A second load is independent and identical.
        let again = repo.load(id(1)).unwrap();
        let down = Statements::declare(id(1), again.as_ref(), Direction::Downgrade);
        assert_eq!(down.iter().collect::<Vec<_>>(), vec!["DROP TABLE t"]);
    }

    #[test]
    fn test_registered_patch_shadows_file() {
        let dir = tempfile::tempdir().unwrap();
        write_patch(dir.path(), "patch0001.sql", "-- +upgrade\nSELECT 'file';\n");
        let mut repo = PatchRepository::new(dir.path());
        repo.register(id(1), || Box::new(Noop)).unwrap();

        let patch = repo.load(id(1)).unwrap();
        let up = Statements::declare(id(1), patch.as_ref(), Direction::Upgrade);
        assert_eq!(up.iter().collect::<Vec<_>>(), vec!["SELECT 'registered'"]);
    }

    #[test]
    fn test_load_missing_and_invalid() {
        let dir = tempfile::tempdir().unwrap();
        write_patch(dir.path(), "patch0002.sql", "DROP TABLE t;\n");
        let repo = PatchRepository::new(dir.path());

        let err = repo.load(id(1)).err().unwrap();
        assert!(matches!(err, StoreError::PatchNotFound(p) if p == id(1)));
        assert_eq!(err.kind(), dbpatcher_core::ErrorKind::NotFound);

        let err = repo.load(id(2)).err().unwrap();
        assert!(matches!(err, StoreError::InvalidPatchFile { .. }));

        assert!(matches!(
            repo.load_name("patch2").err().unwrap(),
            StoreError::InvalidId(_)
        ));
    }

    #[test]
    fn test_version_conversions() {
        assert_eq!(PatchRepository::name_from_version(12).unwrap().name(), "patch0012");
        assert_eq!(PatchRepository::version_from_name("patch0012").unwrap(), 12);
        assert!(PatchRepository::name_from_version(10_000).is_err());
        assert!(PatchRepository::version_from_name("patch12").is_err());
    }

    #[test]
    fn test_next_id_and_create_patch_file() {
        let dir = tempfile::tempdir().unwrap();
        let repo = PatchRepository::new(dir.path());
        assert_eq!(repo.next_id().unwrap(), id(1));

        let path = repo.create_patch_file(id(1)).unwrap();
        assert_eq!(path, dir.path().join("patch0001.sql"));
        assert_eq!(repo.next_id().unwrap(), id(2));

        // The scaffold parses as an empty patch.
        assert!(repo.load(id(1)).is_ok());

        // Existing files are never overwritten.
        assert!(matches!(
            repo.create_patch_file(id(1)),
            Err(StoreError::Io { .. })
        ));
    }

    #[test]
    fn test_next_id_at_capacity() {
        let dir = tempfile::tempdir().unwrap();
        write_patch(dir.path(), "patch9999.sql", "-- +upgrade\n");
        let repo = PatchRepository::new(dir.path());
        assert!(matches!(
            repo.next_id(),
            Err(StoreError::InvalidId(PatchIdError::VersionOutOfRange(10_000)))
        ));
    }
}
