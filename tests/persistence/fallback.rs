//! Script cache misses, non-scripted stores and lock expiry

use std::sync::Arc;

use crate::fixtures::*;
use tessera::{Command, Error, LockConfig, MemoryStore, Store, TesseraConfig};
use tempfile::TempDir;

fn stamp(offset_ms: i64) -> String {
    (chrono::Utc::now().timestamp_millis() + offset_ms).to_string()
}

#[test]
fn test_flushed_script_cache_is_reloaded() {
    let store = Arc::new(MemoryStore::new());
    let db = open_with(Arc::clone(&store), &TesseraConfig::default());
    let mut a = User::new("a@x.com", "NYC");
    db.save(&mut a).unwrap();

    store.script_flush();
    let mut b = User::new("b@x.com", "NYC");
    assert_eq!(db.save(&mut b).unwrap(), 2);
    db.delete(&a).unwrap();
    assert_eq!(db.get::<User>(2).unwrap(), Some(b));
}

#[test]
fn test_auto_mode_falls_back_without_scripting() {
    let store = Arc::new(MemoryStore::without_scripting());
    let db = open_with(Arc::clone(&store), &TesseraConfig::default());
    assert!(!db.persistence().is_scripted());

    let mut user = User::new("a@x.com", "NYC");
    db.save(&mut user).unwrap();
    let mut clash = User::new("a@x.com", "LA");
    assert!(matches!(
        db.save(&mut clash),
        Err(Error::UniqueConstraintViolation { .. })
    ));
    db.delete(&user).unwrap();
    assert!(store.keys("User:1*").is_empty());
}

#[test]
fn test_script_mode_requires_scripting() {
    let store = Arc::new(MemoryStore::without_scripting());
    let config = TesseraConfig {
        mode: "script".into(),
        ..TesseraConfig::default()
    };
    let db = open_with(store, &config);
    let err = db.save(&mut User::new("a@x.com", "NYC")).unwrap_err();
    assert_eq!(err, Error::ScriptingUnsupported);
}

#[test]
fn test_scripts_from_directory() {
    let dir = TempDir::new().unwrap();
    for name in ["save", "delete"] {
        std::fs::write(
            dir.path().join(format!("{}.proc", name)),
            format!("-- {} listing\n\nHGETALL KEYS[1]\n", name),
        )
        .unwrap();
    }
    let config = TesseraConfig {
        scripts_dir: Some(dir.path().to_path_buf()),
        ..TesseraConfig::default()
    };
    let store = Arc::new(MemoryStore::new());
    let db = open_with(Arc::clone(&store), &config);

    let mut user = User::new("a@x.com", "NYC");
    db.save(&mut user).unwrap();
    let sha = db.persistence().runner().script("save").unwrap().sha().to_string();
    assert!(store.script_exists(&sha));
}

#[test]
fn test_held_lock_times_out() {
    let store = Arc::new(MemoryStore::new());
    let config = TesseraConfig {
        lock: LockConfig {
            acquire_timeout_ms: 50,
            ..LockConfig::default()
        },
        ..lock_config()
    };
    let db = open_with(Arc::clone(&store), &config);
    let mut user = User::new("a@x.com", "NYC");
    db.save(&mut user).unwrap();

    store
        .execute(Command::Set {
            key: "User:1:_lock".into(),
            value: stamp(60_000),
        })
        .unwrap();
    user.city = Some("LA".into());
    assert!(matches!(
        db.save(&mut user),
        Err(Error::LockTimeout { .. })
    ));
    assert_eq!(
        db.get::<User>(1).unwrap().unwrap().city.as_deref(),
        Some("NYC")
    );
}

#[test]
fn test_expired_lock_is_taken_over() {
    let store = Arc::new(MemoryStore::new());
    let db = open_with(Arc::clone(&store), &lock_config());
    let mut user = User::new("a@x.com", "NYC");
    db.save(&mut user).unwrap();

    store
        .execute(Command::Set {
            key: "User:1:_lock".into(),
            value: stamp(-1_000),
        })
        .unwrap();
    user.city = Some("LA".into());
    db.save(&mut user).unwrap();
    assert_eq!(
        db.get::<User>(1).unwrap().unwrap().city.as_deref(),
        Some("LA")
    );
    assert!(store.keys("User:1:_lock").is_empty());
}
