//! Delete: completeness and idempotence

use crate::fixtures::*;
use tessera::{Collection, Error};

#[test]
fn test_delete_removes_every_trace() {
    for (path, store, db) in dbs() {
        let mut keep = User::new("keep@x.com", "NYC");
        let mut gone = User {
            name: Some("Gone".into()),
            ..User::new("gone@x.com", "NYC")
        };
        db.save(&mut keep).unwrap();
        db.save(&mut gone).unwrap();
        db.set::<User, User>(&gone, "friends").unwrap().add(&keep).unwrap();
        db.incr(&gone, "visits", 5).unwrap();

        db.delete(&gone).unwrap();

        let ks = store.snapshot();
        assert!(ks.keys("User:2*").is_empty(), "{}", path);
        assert_eq!(ks.smembers("User:all").unwrap(), vec!["1"], "{}", path);
        assert_eq!(ks.smembers("User:indices:city:NYC").unwrap(), vec!["1"]);
        assert_eq!(ks.hget("User:uniques:email", "gone@x.com").unwrap(), None);
        assert!(!db.exists::<User>(2).unwrap());
        assert_eq!(db.get::<User>(2).unwrap(), None);
    }
}

#[test]
fn test_delete_twice_is_a_noop() {
    for (path, store, db) in dbs() {
        let mut user = User::new("a@x.com", "NYC");
        db.save(&mut user).unwrap();
        db.delete(&user).unwrap();
        let after = dump(&store);
        db.delete(&user).unwrap();
        assert_eq!(dump(&store), after, "{}", path);
    }
}

#[test]
fn test_delete_unsaved_needs_identity() {
    for (_, _, db) in dbs() {
        let err = db.delete(&User::new("a@x.com", "NYC")).unwrap_err();
        assert_eq!(
            err,
            Error::MissingIdentity {
                type_name: "User".into()
            }
        );
    }
}

#[test]
fn test_deleted_ids_are_not_reused() {
    for (path, _, db) in dbs() {
        let mut user = User::new("a@x.com", "NYC");
        db.save(&mut user).unwrap();
        db.delete(&user).unwrap();
        let mut again = User::new("a@x.com", "NYC");
        assert_eq!(db.save(&mut again).unwrap(), 2, "{}", path);
        assert_eq!(db.all::<User>().unwrap().ids().unwrap(), vec![2]);
    }
}
