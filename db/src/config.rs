//! Patcher configuration.
//!
//! Defines the YAML-serializable configuration naming the database, the
//! patch directory, and the traversal policies.
//!
//! # Example YAML
//!
//! ```yaml
//! version: "1.0"
//! database: app.db
//! patch_dir: patches
//! state_file: null
//! persist: per_patch
//! missing_target: fail
//! ```

use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, StoreError};
use crate::state::DEFAULT_STATE_FILE;

/// When the applied-state record is written during a traversal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PersistMode {
    /// After every patch that commits. A failed traversal leaves the record
    /// matching the database.
    #[default]
    PerPatch,
    /// Once, after the walk completes. A failed traversal writes nothing.
    EndOfTraversal,
}

/// What to do when an explicit target version has no patch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MissingTargetPolicy {
    /// Refuse the traversal before touching the database.
    #[default]
    Fail,
    /// Walk the whole list as if no target had been given.
    ApplyAll,
}

/// Top-level patcher configuration.
///
/// # Examples
///
/// ```
/// use dbpatcher_db::{MissingTargetPolicy, PatcherConfig, PersistMode};
///
/// let yaml = "version: \"1.0\"\ndatabase: app.db\npatch_dir: patches\n";
/// let config: PatcherConfig = serde_yaml::from_str(yaml).unwrap();
/// assert_eq!(config.persist, PersistMode::PerPatch);
/// assert_eq!(config.missing_target, MissingTargetPolicy::Fail);
/// assert!(config.state_path().ends_with("patcher_state.txt"));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatcherConfig {
    /// Configuration format version (e.g., `"1.0"`).
    pub version: String,
    /// SQLite database file.
    pub database: PathBuf,
    /// Directory holding `patchNNNN.sql` files.
    pub patch_dir: PathBuf,
    /// State record location; defaults to `patcher_state.txt` in `patch_dir`.
    #[serde(default)]
    pub state_file: Option<PathBuf>,
    #[serde(default)]
    pub persist: PersistMode,
    #[serde(default)]
    pub missing_target: MissingTargetPolicy,
}

impl PatcherConfig {
    /// Creates a configuration with default policies.
    pub fn new(database: impl Into<PathBuf>, patch_dir: impl Into<PathBuf>) -> Self {
        Self {
            version: "1.0".to_string(),
            database: database.into(),
            patch_dir: patch_dir.into(),
            state_file: None,
            persist: PersistMode::default(),
            missing_target: MissingTargetPolicy::default(),
        }
    }

    /// Loads configuration from a YAML file.
    ///
    /// Relative paths inside the file are resolved against the directory
    /// containing it.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] if the file cannot be read, or
    /// [`StoreError::YamlError`] if parsing fails.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = std::fs::File::open(path).map_err(StoreError::io(path))?;
        let reader = BufReader::new(file);
        let mut config: Self = serde_yaml::from_reader(reader)?;

        if let Some(base) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            config.database = resolve(base, &config.database);
            config.patch_dir = resolve(base, &config.patch_dir);
            config.state_file = config.state_file.map(|p| resolve(base, &p));
        }
        Ok(config)
    }

    /// Saves the configuration as YAML.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] if the file cannot be written, or
    /// [`StoreError::YamlError`] if serialization fails.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let file = std::fs::File::create(path).map_err(StoreError::io(path))?;
        let writer = BufWriter::new(file);
        serde_yaml::to_writer(writer, self)?;
        Ok(())
    }

    /// Checks that the patch directory exists.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidConfig`] otherwise.
    pub fn validate(&self) -> Result<()> {
        if !self.patch_dir.is_dir() {
            return Err(StoreError::InvalidConfig(format!(
                "patch directory '{}' does not exist",
                self.patch_dir.display()
            )));
        }
        Ok(())
    }

    /// Effective location of the state record.
    pub fn state_path(&self) -> PathBuf {
        self.state_file
            .clone()
            .unwrap_or_else(|| self.patch_dir.join(DEFAULT_STATE_FILE))
    }
}

fn resolve(base: &Path, path: &Path) -> PathBuf {
    if path.is_relative() {
        base.join(path)
    } else {
        path.to_path_buf()
    }
}
