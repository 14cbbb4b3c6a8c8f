//! Integration tests for the persistence protocols
//!
//! Every scenario runs against both paths, the atomic scripts and the
//! locked fallback, and expects identical store contents:
//! - Create, update and delete bookkeeping
//! - Unique races between concurrent writers
//! - Index consistency under concurrent updates of one entity

use std::collections::BTreeMap;
use std::sync::Arc;
use std::thread;

use tessera_core::Error;
use tessera_engine::{Persistence, TesseraConfig};
use tessera_storage::{Command, Keyspace, MemoryStore, Store};

// ============================================================================
// Helper Functions
// ============================================================================

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn declare(store: &dyn Store) {
    store
        .multi(vec![
            Command::SAdd {
                key: "User:uniques".into(),
                members: vec!["email".into()],
            },
            Command::SAdd {
                key: "User:indices".into(),
                members: vec!["city".into(), "role".into()],
            },
            Command::SAdd {
                key: "User:collections".into(),
                members: vec!["friends".into()],
            },
        ])
        .unwrap();
}

/// Both paths over fresh stores
fn both() -> Vec<(&'static str, Arc<MemoryStore>, Persistence)> {
    init_tracing();
    let scripted = Arc::new(MemoryStore::new());
    let plain = Arc::new(MemoryStore::new());
    let lock_mode = TesseraConfig {
        mode: "lock".into(),
        ..TesseraConfig::default()
    };
    declare(scripted.as_ref());
    declare(plain.as_ref());
    vec![
        (
            "script",
            Arc::clone(&scripted),
            Persistence::new(scripted, &TesseraConfig::default()).unwrap(),
        ),
        (
            "lock",
            Arc::clone(&plain),
            Persistence::new(plain, &lock_mode).unwrap(),
        ),
    ]
}

fn attrs(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// Every key with its full contents, for whole-store comparison
fn dump(ks: &Keyspace) -> BTreeMap<String, String> {
    ks.keys("*")
        .into_iter()
        .map(|key| {
            let entry = format!("{:?}", sorted_entry(ks, &key));
            (key, entry)
        })
        .collect()
}

fn sorted_entry(ks: &Keyspace, key: &str) -> Vec<String> {
    if let Ok(pairs) = ks.hgetall(key) {
        return pairs.into_iter().flat_map(|(f, v)| [f, v]).collect();
    }
    if let Ok(members) = ks.smembers(key) {
        return members;
    }
    if let Ok(items) = ks.lrange(key, 0, -1) {
        return items;
    }
    ks.get(key).unwrap().into_iter().collect()
}

// ============================================================================
// Lifecycle
// ============================================================================

mod lifecycle {
    use super::*;

    #[test]
    fn test_paths_produce_identical_state() {
        let mut dumps = Vec::new();
        for (_, store, persistence) in both() {
            let id = persistence
                .save("User", None, &attrs(&[("email", "a@x.com"), ("city", "NYC")]))
                .unwrap();
            persistence
                .save("User", None, &attrs(&[("email", "b@x.com"), ("role", "admin")]))
                .unwrap();
            persistence
                .save(
                    "User",
                    Some(id),
                    &attrs(&[("email", "c@x.com"), ("city", "LA"), ("role", "")]),
                )
                .unwrap();
            dumps.push(dump(&store.snapshot()));
        }
        assert_eq!(dumps[0], dumps[1]);
    }

    #[test]
    fn test_end_to_end_user_scenario() {
        for (path, store, persistence) in both() {
            let id = persistence
                .save("User", None, &attrs(&[("email", "a@x.com"), ("city", "NYC")]))
                .unwrap();
            assert_eq!(id, 1, "{}", path);

            let err = persistence
                .save("User", None, &attrs(&[("email", "a@x.com"), ("city", "LA")]))
                .unwrap_err();
            assert_eq!(
                err,
                Error::UniqueConstraintViolation {
                    type_name: "User".into(),
                    attribute: "email".into(),
                },
                "{}",
                path
            );

            persistence
                .save("User", Some(1), &attrs(&[("email", "a@x.com"), ("city", "LA")]))
                .unwrap();
            let ks = store.snapshot();
            assert!(!ks.exists("User:indices:city:NYC"), "{}", path);
            assert_eq!(ks.smembers("User:indices:city:LA").unwrap(), vec!["1"]);

            persistence.delete("User", 1).unwrap();
            let ks = store.snapshot();
            assert!(!ks.exists("User:all"), "{}", path);
            assert!(!ks.exists("User:indices:city:LA"), "{}", path);
            assert!(!ks.exists("User:uniques:email"), "{}", path);
            assert!(!ks.exists("User:1"), "{}", path);
            assert!(!ks.exists("User:1:_indices"), "{}", path);
        }
    }

    #[test]
    fn test_delete_twice_is_noop() {
        for (path, store, persistence) in both() {
            persistence
                .save("User", None, &attrs(&[("city", "NYC")]))
                .unwrap();
            persistence.delete("User", 1).unwrap();
            let after_first = dump(&store.snapshot());
            persistence.delete("User", 1).unwrap();
            assert_eq!(dump(&store.snapshot()), after_first, "{}", path);
        }
    }

    #[test]
    fn test_ids_are_never_reused() {
        for (path, _, persistence) in both() {
            let first = persistence.save("User", None, &[]).unwrap();
            persistence.delete("User", first).unwrap();
            let second = persistence.save("User", None, &[]).unwrap();
            assert!(second > first, "{}", path);
        }
    }

    #[test]
    fn test_store_outage_surfaces_unchanged() {
        for (path, store, persistence) in both() {
            store.disconnect();
            let err = persistence
                .save("User", None, &attrs(&[("city", "NYC")]))
                .unwrap_err();
            assert!(matches!(err, Error::StoreUnavailable { .. }), "{}", path);
            store.reconnect();
        }
    }

    #[test]
    fn test_out_of_range_id_leaves_store_untouched() {
        for (path, store, persistence) in both() {
            let before = dump(&store.snapshot());
            let err = persistence
                .save("User", Some(u64::MAX), &attrs(&[("city", "NYC")]))
                .unwrap_err();
            assert!(matches!(err, Error::InvalidInput { .. }), "{}", path);
            assert!(persistence.delete("User", u64::MAX).is_err(), "{}", path);
            assert_eq!(dump(&store.snapshot()), before, "{}", path);
        }
    }
}

// ============================================================================
// Concurrency
// ============================================================================

mod concurrency {
    use super::*;

    #[test]
    fn test_racing_new_entities_claim_a_unique_once() {
        for (path, store, persistence) in both() {
            let persistence = Arc::new(persistence);
            let handles: Vec<_> = (0..8)
                .map(|i| {
                    let persistence = Arc::clone(&persistence);
                    thread::spawn(move || {
                        let city = format!("city-{}", i);
                        persistence.save(
                            "User",
                            None,
                            &attrs(&[("email", "same@x.com"), ("city", &city)]),
                        )
                    })
                })
                .collect();
            let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

            let winners: Vec<u64> = results.iter().filter_map(|r| r.clone().ok()).collect();
            assert_eq!(winners.len(), 1, "{}", path);
            for result in &results {
                if let Err(e) = result {
                    assert!(matches!(e, Error::UniqueConstraintViolation { .. }), "{}", path);
                }
            }

            let ks = store.snapshot();
            let owner = ks.hget("User:uniques:email", "same@x.com").unwrap();
            assert_eq!(owner, Some(winners[0].to_string()), "{}", path);
            assert_eq!(ks.smembers("User:all").unwrap(), vec![winners[0].to_string()]);
            assert!(ks.keys("User:*:_lock").is_empty(), "{}", path);
        }
    }

    #[test]
    fn test_concurrent_updates_keep_indices_inverse() {
        for (path, store, persistence) in both() {
            let id = persistence
                .save("User", None, &attrs(&[("city", "start")]))
                .unwrap();
            let persistence = Arc::new(persistence);
            let handles: Vec<_> = (0..4)
                .map(|t| {
                    let persistence = Arc::clone(&persistence);
                    thread::spawn(move || {
                        for i in 0..25 {
                            let city = format!("c{}-{}", t, i);
                            persistence
                                .save("User", Some(id), &attrs(&[("city", &city)]))
                                .unwrap();
                        }
                    })
                })
                .collect();
            for handle in handles {
                handle.join().unwrap();
            }

            let ks = store.snapshot();
            let city = ks.hget(&format!("User:{}", id), "city").unwrap().unwrap();
            let index_keys = ks.keys("User:indices:city:*");
            assert_eq!(
                index_keys,
                vec![format!("User:indices:city:{}", city)],
                "{}",
                path
            );
            assert_eq!(
                ks.smembers(&format!("User:{}:_indices", id)).unwrap(),
                index_keys,
                "{}",
                path
            );
        }
    }
}
