//! The reference walkthrough: unique email, indexed city

use crate::fixtures::*;
use tessera::{Collection, Criteria, Error};

#[test]
fn test_user_walkthrough() {
    for (path, store, db) in dbs() {
        let mut first = User::new("a@x.com", "NYC");
        assert_eq!(db.save(&mut first).unwrap(), 1, "{}", path);

        let mut second = User::new("a@x.com", "LA");
        match db.save(&mut second) {
            Err(Error::UniqueConstraintViolation { attribute, .. }) => {
                assert_eq!(attribute, "email", "{}", path)
            }
            other => panic!("{}: expected a unique violation, got {:?}", path, other),
        }

        first.city = Some("LA".into());
        db.save(&mut first).unwrap();
        let nyc = db.find::<User>(Criteria::new().eq("city", "NYC")).unwrap();
        let la = db.find::<User>(Criteria::new().eq("city", "LA")).unwrap();
        assert!(nyc.is_empty().unwrap(), "{}", path);
        assert_eq!(la.ids().unwrap(), vec![1], "{}", path);

        db.delete(&first).unwrap();
        assert!(db.all::<User>().unwrap().is_empty().unwrap(), "{}", path);
        assert!(la.is_empty().unwrap(), "{}", path);
        assert_eq!(db.with::<User>("email", "a@x.com").unwrap(), None);
        assert!(store.keys("User:indices:*").is_empty(), "{}", path);
        assert!(store.keys("User:uniques:*").is_empty(), "{}", path);
        assert!(store.keys("User:1*").is_empty(), "{}", path);
    }
}
