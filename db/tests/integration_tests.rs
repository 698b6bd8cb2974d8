use std::fs;
use std::path::Path;

use dbpatcher_core::{ErrorKind, Patch, PatchId, Statements};
use dbpatcher_db::{DEFAULT_STATE_FILE, PatchRepository, PatcherConfig, StateStore, StoreError};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn id(version: u32) -> PatchId {
    PatchId::from_version(version).unwrap()
}

fn write_patch(dir: &Path, version: u32) {
    let body = format!("-- +upgrade\nCREATE TABLE t{version} (id INTEGER);\n");
    fs::write(dir.join(format!("patch{version:04}.sql")), body).unwrap();
}

struct Noop;

impl Patch for Noop {
    fn upgrade(&self, _statements: &mut Statements) {}
    fn downgrade(&self, _statements: &mut Statements) {}
}

// ---------------------------------------------------------------------------
// Repository + state store
// ---------------------------------------------------------------------------

#[test]
fn state_round_trips_through_the_record_file() {
    let dir = tempfile::tempdir().unwrap();
    for v in 1..=3 {
        write_patch(dir.path(), v);
    }
    let repo = PatchRepository::new(dir.path());
    let path = dir.path().join(DEFAULT_STATE_FILE);

    let mut state = StateStore::load(&path, &repo).unwrap();
    assert!(state.is_empty());
    assert!(path.exists());

    state.mark_applied(id(1));
    state.mark_applied(id(3));
    state.persist().unwrap();

    let reloaded = StateStore::load(&path, &repo).unwrap();
    assert_eq!(reloaded.entries(), &[id(1), id(3)]);
    assert!(reloaded.is_applied_name("patch0003").unwrap());
    assert!(!reloaded.is_applied(id(2)));
}

#[test]
fn record_tolerates_blank_lines_and_whitespace() {
    let dir = tempfile::tempdir().unwrap();
    write_patch(dir.path(), 1);
    write_patch(dir.path(), 2);
    let path = dir.path().join(DEFAULT_STATE_FILE);
    fs::write(&path, "\n  patch0002  \n\npatch0001\r\n").unwrap();

    let state = StateStore::load(&path, &PatchRepository::new(dir.path())).unwrap();
    assert_eq!(state.entries(), &[id(2), id(1)]);
    assert_eq!(state.last(), Some(id(1)));
}

#[test]
fn record_drops_entries_for_deleted_patches() {
    let dir = tempfile::tempdir().unwrap();
    write_patch(dir.path(), 1);
    write_patch(dir.path(), 2);
    let repo = PatchRepository::new(dir.path());
    let path = dir.path().join(DEFAULT_STATE_FILE);

    let mut state = StateStore::load(&path, &repo).unwrap();
    state.mark_applied(id(1));
    state.mark_applied(id(2));
    state.persist().unwrap();

    fs::remove_file(dir.path().join("patch0002.sql")).unwrap();
    let state = StateStore::load(&path, &repo).unwrap();
    assert_eq!(state.entries(), &[id(1)]);

    // The file itself is only rewritten on the next persist.
    state.persist().unwrap();
    assert_eq!(fs::read_to_string(&path).unwrap(), "patch0001");
}

#[test]
fn record_keeps_entries_for_registered_patches() {
    let dir = tempfile::tempdir().unwrap();
    let mut repo = PatchRepository::new(dir.path());
    repo.register(id(5), || Box::new(Noop)).unwrap();
    let path = dir.path().join(DEFAULT_STATE_FILE);
    fs::write(&path, "patch0005\n").unwrap();

    let state = StateStore::load(&path, &repo).unwrap();
    assert_eq!(state.entries(), &[id(5)]);
}

#[test]
fn malformed_record_line_is_a_validation_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join(DEFAULT_STATE_FILE);
    fs::write(&path, "patch12\n").unwrap();

    let err = StateStore::load(&path, &PatchRepository::new(dir.path())).unwrap_err();
    assert!(matches!(err, StoreError::InvalidId(_)));
    assert_eq!(err.kind(), ErrorKind::Validation);
}

#[test]
fn new_patch_files_are_discovered_and_loadable() {
    let dir = tempfile::tempdir().unwrap();
    let repo = PatchRepository::new(dir.path());
    assert!(repo.list().unwrap().is_empty());

    let first = repo.next_id().unwrap();
    repo.create_patch_file(first).unwrap();
    let second = repo.next_id().unwrap();
    repo.create_patch_file(second).unwrap();

    assert_eq!(repo.list().unwrap(), vec![id(1), id(2)]);
    let patch = repo.load(id(2)).unwrap();
    let mut statements = Statements::new(id(2));
    patch.upgrade(&mut statements);
    assert!(statements.is_empty());

    let err = repo.create_patch_file(id(2)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Storage);
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

#[test]
fn config_points_repository_and_state_at_the_same_directory() {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir(dir.path().join("patches")).unwrap();
    write_patch(&dir.path().join("patches"), 1);
    let config_path = dir.path().join("dbpatcher.yml");
    fs::write(
        &config_path,
        "version: \"1.0\"\ndatabase: app.db\npatch_dir: patches\n",
    )
    .unwrap();

    let config = PatcherConfig::load(&config_path).unwrap();
    config.validate().unwrap();

    let repo = PatchRepository::new(&config.patch_dir);
    assert_eq!(repo.list().unwrap(), vec![id(1)]);

    let state = StateStore::load(config.state_path(), &repo).unwrap();
    assert_eq!(
        state.path(),
        dir.path().join("patches").join(DEFAULT_STATE_FILE)
    );
}

#[test]
fn malformed_config_is_a_validation_error() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = dir.path().join("dbpatcher.yml");
    fs::write(&config_path, "database: [not, a, path\n").unwrap();

    let err = PatcherConfig::load(&config_path).unwrap_err();
    assert!(matches!(err, StoreError::YamlError(_)));
    assert_eq!(err.kind(), ErrorKind::Validation);
}
