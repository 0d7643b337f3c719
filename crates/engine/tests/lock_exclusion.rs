//! Scenario (f) from spec.md §8: the lock file enforces single-instance
//! exclusion across handles sharing `(name, dir)`.

use engine::{KvStore, Options, StoreError};

fn opts(dir: &std::path::Path) -> Options {
    Options {
        dir: dir.to_path_buf(),
        ..Options::default()
    }
}

#[test]
fn second_open_fails_while_first_is_open() {
    let dir = tempfile::tempdir().unwrap();
    let _first = KvStore::open("db", opts(dir.path())).unwrap();

    let second = KvStore::open("db", opts(dir.path()));
    assert!(matches!(second.unwrap_err(), StoreError::DatabaseInUse));
}

#[test]
fn reopen_succeeds_after_close() {
    let dir = tempfile::tempdir().unwrap();
    let mut first = KvStore::open("db", opts(dir.path())).unwrap();
    first.put(1, 42).unwrap();
    first.close().unwrap();

    assert!(!dir.path().join("db").join("db.LOCK").exists());

    let second = KvStore::open("db", opts(dir.path()));
    assert!(second.is_ok());
}

#[test]
fn dropping_the_store_also_releases_the_lock() {
    let dir = tempfile::tempdir().unwrap();
    {
        let _store = KvStore::open("db", opts(dir.path())).unwrap();
        assert!(dir.path().join("db").join("db.LOCK").exists());
    }
    assert!(!dir.path().join("db").join("db.LOCK").exists());
    assert!(KvStore::open("db", opts(dir.path())).is_ok());
}
