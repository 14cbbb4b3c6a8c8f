//! Owned collections, counters and references

use crate::fixtures::*;
use tessera::{Collection, Criteria, Error};

#[test]
fn test_friends_set() {
    for (path, _, db) in dbs() {
        let mut ann = User::new("ann@x.com", "NYC");
        let mut bob = User::new("bob@x.com", "SF");
        let mut cid = User::new("cid@x.com", "SF");
        for user in [&mut ann, &mut bob, &mut cid] {
            db.save(user).unwrap();
        }

        let friends = db.set::<User, User>(&ann, "friends").unwrap();
        friends.add(&bob).unwrap();
        friends.add(&cid).unwrap();
        assert_eq!(friends.size().unwrap(), 2, "{}", path);

        let in_sf = friends.find(Criteria::new().eq("city", "SF")).unwrap();
        assert_eq!(sorted(in_sf.ids().unwrap()), vec![2, 3], "{}", path);

        friends.remove(&bob).unwrap();
        assert_eq!(friends.all().unwrap(), vec![cid.clone()], "{}", path);
    }
}

#[test]
fn test_posts_list_and_author_reference() {
    for (path, _, db) in dbs() {
        let mut ann = User::new("ann@x.com", "NYC");
        db.save(&mut ann).unwrap();
        let posts = db.list::<User, Post>(&ann, "posts").unwrap();

        let mut titles = Vec::new();
        for title in ["one", "two", "three"] {
            let mut post = Post {
                title: title.into(),
                author_id: ann.id,
                ..Post::default()
            };
            db.save(&mut post).unwrap();
            posts.push(&post).unwrap();
            titles.push(post);
        }

        assert_eq!(posts.all().unwrap(), titles, "{}", path);
        assert_eq!(posts.last().unwrap(), titles.last().cloned());
        let author: Option<User> = db.referenced(&titles[0], "author").unwrap();
        assert_eq!(author, Some(ann.clone()), "{}", path);

        let by_ann = db
            .find::<Post>(Criteria::new().eq("author_id", ann.id.unwrap()))
            .unwrap();
        assert_eq!(by_ann.size().unwrap(), 3, "{}", path);
    }
}

#[test]
fn test_counters_are_deleted_with_the_entity() {
    for (path, store, db) in dbs() {
        let mut ann = User::new("ann@x.com", "NYC");
        db.save(&mut ann).unwrap();
        assert_eq!(db.incr(&ann, "visits", 2).unwrap(), 2);
        assert_eq!(db.counter(&ann, "visits").unwrap(), 2);

        db.delete(&ann).unwrap();
        assert!(store.keys("User:1:_counters").is_empty(), "{}", path);
    }
}

#[test]
fn test_collections_need_a_saved_owner() {
    for (_, _, db) in dbs() {
        let unsaved = User::new("ann@x.com", "NYC");
        assert!(matches!(
            db.set::<User, User>(&unsaved, "friends"),
            Err(Error::MissingIdentity { .. })
        ));
        assert!(matches!(
            db.incr(&unsaved, "visits", 1),
            Err(Error::MissingIdentity { .. })
        ));
    }
}
