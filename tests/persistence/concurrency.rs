//! Racing writers across threads

use std::collections::BTreeSet;
use std::sync::{Arc, Barrier};
use std::thread;

use crate::fixtures::*;
use tessera::{Collection, Criteria, Error};

#[test]
fn test_one_winner_per_unique_value() {
    for (path, store, db) in dbs() {
        let barrier = Arc::new(Barrier::new(8));
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let db = db.clone();
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    let mut user = User::new("same@x.com", &format!("city-{}", i));
                    barrier.wait();
                    db.save(&mut user)
                })
            })
            .collect();
        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        let winners: Vec<u64> = results.iter().filter_map(|r| r.as_ref().ok().copied()).collect();
        assert_eq!(winners.len(), 1, "{}", path);
        assert!(results.iter().all(|r| matches!(
            r,
            Ok(_) | Err(Error::UniqueConstraintViolation { .. })
        )));

        assert_eq!(db.all::<User>().unwrap().ids().unwrap(), winners, "{}", path);
        assert_eq!(store.keys("User:indices:city:*").len(), 1, "{}", path);
        assert!(store.keys("User:*:_lock").is_empty(), "{}", path);
    }
}

#[test]
fn test_distinct_entities_save_in_parallel() {
    for (path, _, db) in dbs() {
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let db = db.clone();
                thread::spawn(move || {
                    (0..20)
                        .map(|i| {
                            let mut user = User::new(&format!("{}-{}@x.com", t, i), "NYC");
                            db.save(&mut user).unwrap()
                        })
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        let ids: BTreeSet<u64> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();

        assert_eq!(ids.len(), 80, "{}", path);
        assert_eq!(ids.iter().copied().collect::<Vec<_>>(), (1..=80).collect::<Vec<_>>());
        let nyc = db.find::<User>(Criteria::new().eq("city", "NYC")).unwrap();
        assert_eq!(nyc.size().unwrap(), 80, "{}", path);
    }
}

#[test]
fn test_stale_writers_keep_indices_consistent() {
    for (path, store, db) in dbs() {
        let mut user = User::new("a@x.com", "start");
        db.save(&mut user).unwrap();

        let handles: Vec<_> = (0..4)
            .map(|t| {
                let db = db.clone();
                let mut copy = user.clone();
                thread::spawn(move || {
                    for i in 0..25 {
                        copy.city = Some(format!("c{}-{}", t, i));
                        db.save(&mut copy).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let stored = db.get::<User>(1).unwrap().unwrap();
        let city = stored.city.unwrap();
        assert_eq!(
            store.keys("User:indices:city:*"),
            vec![format!("User:indices:city:{}", city)],
            "{}",
            path
        );
        let found = db.find::<User>(Criteria::new().eq("city", city)).unwrap();
        assert_eq!(found.ids().unwrap(), vec![1], "{}", path);
    }
}

#[test]
fn test_concurrent_queries_use_private_scratch_keys() {
    for (path, store, db) in dbs() {
        for (i, city) in ["NYC", "SF", "NYC", "LA"].iter().enumerate() {
            let mut user = User {
                active: i % 2 == 0,
                ..User::new(&format!("{}@x.com", i), city)
            };
            db.save(&mut user).unwrap();
        }

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let db = db.clone();
                thread::spawn(move || {
                    let query = db
                        .find::<User>(Criteria::new().eq("city", "NYC").eq("active", true))
                        .unwrap();
                    (0..20)
                        .map(|_| query.ids().unwrap())
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        for handle in handles {
            for ids in handle.join().unwrap() {
                assert_eq!(sorted(ids), vec![1, 3], "{}", path);
            }
        }
        assert!(store.keys("User:tmp:*").is_empty(), "{}", path);
    }
}
