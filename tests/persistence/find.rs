//! Queries over index sets

use crate::fixtures::*;
use tessera::{Collection, Criteria, Error, SortOptions};

fn seed(db: &tessera::Db) {
    let rows = [
        ("ann@x.com", "NYC", true),
        ("bob@x.com", "NYC", false),
        ("cid@x.com", "SF", true),
        ("dee@x.com", "LA", true),
    ];
    for (email, city, active) in rows {
        let mut user = User {
            active,
            ..User::new(email, city)
        };
        db.save(&mut user).unwrap();
    }
}

#[test]
fn test_find_by_one_attribute() {
    for (path, _, db) in dbs() {
        seed(&db);
        let nyc = db.find::<User>(Criteria::new().eq("city", "NYC")).unwrap();
        assert_eq!(sorted(nyc.ids().unwrap()), vec![1, 2], "{}", path);
        let emails: Vec<_> = nyc
            .sort(&SortOptions::new())
            .unwrap()
            .into_iter()
            .map(|u| u.email.unwrap())
            .collect();
        assert_eq!(emails, ["ann@x.com", "bob@x.com"]);
    }
}

#[test]
fn test_find_by_boolean() {
    for (path, _, db) in dbs() {
        seed(&db);
        let active = db.find::<User>(Criteria::new().eq("active", true)).unwrap();
        assert_eq!(sorted(active.ids().unwrap()), vec![1, 3, 4], "{}", path);
        let inactive = db.find::<User>(Criteria::new().eq("active", false)).unwrap();
        assert_eq!(inactive.ids().unwrap(), vec![2], "{}", path);
    }
}

#[test]
fn test_chained_find_except_union() {
    for (path, store, db) in dbs() {
        seed(&db);
        let query = db
            .find::<User>(Criteria::new().any_of("city", ["NYC", "SF"]))
            .unwrap()
            .find(Criteria::new().eq("active", true))
            .unwrap()
            .except(Criteria::new().eq("city", "SF"))
            .unwrap()
            .union(Criteria::new().eq("city", "LA"))
            .unwrap();
        assert_eq!(sorted(query.ids().unwrap()), vec![1, 4], "{}", path);
        assert!(query.contains(4).unwrap());
        assert!(!query.contains(3).unwrap());
        assert!(store.keys("User:tmp:*").is_empty(), "{}", path);
    }
}

#[test]
fn test_scratch_keys_are_removed_when_the_read_fails() {
    for (path, store, db) in dbs() {
        seed(&db);
        let query = db
            .find::<User>(Criteria::new().eq("city", "NYC").eq("active", true))
            .unwrap();
        store.disconnect();
        assert!(matches!(
            query.ids(),
            Err(Error::StoreUnavailable { .. })
        ));
        store.reconnect();
        assert!(store.keys("User:tmp:*").is_empty(), "{}", path);
    }
}

#[test]
fn test_find_on_undeclared_index() {
    for (_, store, db) in dbs() {
        let before = store.round_trips();
        let err = db
            .find::<User>(Criteria::new().eq("name", "Ann"))
            .err()
            .unwrap();
        assert_eq!(
            err,
            Error::IndexNotFound {
                type_name: "User".into(),
                attribute: "name".into(),
            }
        );
        assert_eq!(store.round_trips(), before);
    }
}

#[test]
fn test_fetch_is_one_round_trip() {
    for (path, store, db) in dbs() {
        seed(&db);
        let all = db.all::<User>().unwrap();
        let before = store.round_trips();
        let users = all.all().unwrap();
        assert_eq!(users.len(), 4, "{}", path);
        assert_eq!(store.round_trips(), before + 2, "{}", path);
    }
}

#[test]
fn test_sort_by_attribute_with_limit() {
    for (path, _, db) in dbs() {
        seed(&db);
        let page = db
            .all::<User>()
            .unwrap()
            .sort_by("email", &SortOptions::new().alpha().desc().limit(0, 2))
            .unwrap();
        let emails: Vec<_> = page.into_iter().filter_map(|u| u.email).collect();
        assert_eq!(emails, ["dee@x.com", "cid@x.com"], "{}", path);
    }
}
