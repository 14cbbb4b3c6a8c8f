//! Save: creation, updates, value encoding and unique conflicts

use std::sync::Arc;

use crate::fixtures::*;
use tessera::{BoolPolicy, Error, MemoryStore, TesseraConfig};

#[test]
fn test_new_entities_get_increasing_ids() {
    for (path, _, db) in dbs() {
        let mut a = User::new("a@x.com", "NYC");
        let mut b = User::new("b@x.com", "NYC");
        assert_eq!(db.save(&mut a).unwrap(), 1, "{}", path);
        assert_eq!(db.save(&mut b).unwrap(), 2, "{}", path);
        assert_eq!(a.id, Some(1));
        assert_eq!(db.get::<User>(2).unwrap(), Some(b));
    }
}

#[test]
fn test_resave_keeps_identity_and_state() {
    for (path, store, db) in dbs() {
        let mut user = User::new("a@x.com", "NYC");
        db.save(&mut user).unwrap();
        let before = dump(&store);
        db.save(&mut user).unwrap();
        assert_eq!(user.id, Some(1), "{}", path);
        assert_eq!(dump(&store), before, "{}", path);
    }
}

#[test]
fn test_update_moves_index_membership() {
    for (path, store, db) in dbs() {
        let mut user = User::new("a@x.com", "NYC");
        db.save(&mut user).unwrap();
        user.city = Some("LA".into());
        user.email = Some("new@x.com".into());
        db.save(&mut user).unwrap();

        let ks = store.snapshot();
        assert!(!ks.exists("User:indices:city:NYC"), "{}", path);
        assert_eq!(ks.smembers("User:indices:city:LA").unwrap(), vec!["1"]);
        assert_eq!(ks.hget("User:uniques:email", "a@x.com").unwrap(), None);
        assert_eq!(
            ks.hget("User:uniques:email", "new@x.com").unwrap(),
            Some("1".to_string())
        );
    }
}

#[test]
fn test_cleared_attribute_leaves_the_hash_and_index() {
    for (path, store, db) in dbs() {
        let mut user = User::new("a@x.com", "NYC");
        db.save(&mut user).unwrap();
        user.city = None;
        db.save(&mut user).unwrap();

        let ks = store.snapshot();
        assert_eq!(ks.hget("User:1", "city").unwrap(), None, "{}", path);
        assert!(ks.keys("User:indices:city:*").is_empty(), "{}", path);
        assert_eq!(db.get::<User>(1).unwrap().unwrap().city, None);
    }
}

#[test]
fn test_empty_string_is_kept_and_null_is_dropped() {
    for (path, _, db) in dbs() {
        let mut user = User {
            name: Some(String::new()),
            ..User::new("a@x.com", "NYC")
        };
        db.save(&mut user).unwrap();
        let loaded = db.get::<User>(1).unwrap().unwrap();
        assert_eq!(loaded.name, Some(String::new()), "{}", path);
        assert_eq!(loaded.score, None, "{}", path);
    }
}

#[test]
fn test_floats_keep_their_fraction() {
    for (path, store, db) in dbs() {
        let mut user = User {
            score: Some(3.0),
            ..User::new("a@x.com", "NYC")
        };
        db.save(&mut user).unwrap();
        let stored = store.snapshot().hget("User:1", "score").unwrap();
        assert_eq!(stored, Some("3.0".to_string()), "{}", path);
        assert_eq!(db.get::<User>(1).unwrap().unwrap().score, Some(3.0));
    }
}

#[test]
fn test_false_boolean_policy() {
    let store = Arc::new(MemoryStore::new());
    let db = open_with(Arc::clone(&store), &TesseraConfig::default());
    assert_eq!(db.bool_policy(), BoolPolicy::String);
    let mut user = User::new("a@x.com", "NYC");
    db.save(&mut user).unwrap();
    assert_eq!(
        store.snapshot().hget("User:1", "active").unwrap(),
        Some("false".to_string())
    );

    let store = Arc::new(MemoryStore::new());
    let config = TesseraConfig {
        false_booleans: "omit".into(),
        ..TesseraConfig::default()
    };
    let db = open_with(Arc::clone(&store), &config);
    let mut user = User::new("a@x.com", "NYC");
    db.save(&mut user).unwrap();
    assert_eq!(store.snapshot().hget("User:1", "active").unwrap(), None);
    assert!(!db.get::<User>(1).unwrap().unwrap().active);
}

#[test]
fn test_unique_conflict_changes_nothing() {
    for (path, store, db) in dbs() {
        let mut first = User::new("a@x.com", "NYC");
        db.save(&mut first).unwrap();
        let before = dump(&store);

        let mut second = User::new("a@x.com", "LA");
        let err = db.save(&mut second).unwrap_err();
        assert_eq!(
            err,
            Error::UniqueConstraintViolation {
                type_name: "User".into(),
                attribute: "email".into(),
            },
            "{}",
            path
        );
        assert_eq!(second.id, None, "{}", path);
        assert_eq!(second.city.as_deref(), Some("LA"));

        assert_eq!(dump(&store), before, "{}", path);
    }
}

#[test]
fn test_update_into_taken_unique_fails() {
    for (path, store, db) in dbs() {
        let mut a = User::new("a@x.com", "NYC");
        let mut b = User::new("b@x.com", "LA");
        db.save(&mut a).unwrap();
        db.save(&mut b).unwrap();
        let before = dump(&store);

        b.email = Some("a@x.com".into());
        assert!(matches!(
            db.save(&mut b),
            Err(Error::UniqueConstraintViolation { .. })
        ));
        assert_eq!(dump(&store), before, "{}", path);
        assert_eq!(
            db.with::<User>("email", "a@x.com").unwrap().unwrap().id,
            Some(1)
        );
    }
}

#[test]
fn test_with_requires_a_unique_attribute() {
    for (_, _, db) in dbs() {
        assert!(matches!(
            db.with::<User>("city", "NYC"),
            Err(Error::IndexNotFound { .. })
        ));
        assert_eq!(db.with::<User>("email", "nobody@x.com").unwrap(), None);
    }
}

#[test]
fn test_unregistered_type_is_rejected() {
    #[derive(Debug)]
    struct Ghost;
    impl tessera::Model for Ghost {
        const NAME: &'static str = "Ghost";
        fn schema() -> tessera::Schema {
            tessera::Schema::new(Self::NAME)
        }
        fn id(&self) -> Option<u64> {
            None
        }
        fn set_id(&mut self, _: u64) {}
        fn to_attributes(&self) -> Vec<(String, tessera::Value)> {
            Vec::new()
        }
        fn from_attributes(_: u64, _: tessera::Attributes) -> tessera::Result<Self> {
            Ok(Ghost)
        }
    }

    for (_, _, db) in dbs() {
        assert!(matches!(
            db.save(&mut Ghost),
            Err(Error::UnknownType { .. })
        ));
    }
}
