//! Shared models and database setup

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::Arc;

use tessera::{
    Attributes, Db, MemoryStore, Model, Registry, Result, Schema, TesseraConfig, Value,
};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

// ============================================================================
// Models
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq)]
pub struct User {
    pub id: Option<u64>,
    pub name: Option<String>,
    pub email: Option<String>,
    pub city: Option<String>,
    pub score: Option<f64>,
    pub active: bool,
}

impl User {
    pub fn new(email: &str, city: &str) -> Self {
        User {
            email: Some(email.into()),
            city: Some(city.into()),
            ..User::default()
        }
    }
}

fn opt<T: Into<Value>>(value: Option<T>) -> Value {
    value.map(Into::into).unwrap_or(Value::Null)
}

impl Model for User {
    const NAME: &'static str = "User";

    fn schema() -> Schema {
        Schema::new(Self::NAME)
            .attribute("name")
            .unique("email")
            .index("city")
            .index("active")
            .attribute("score")
            .set("friends", "User")
            .list("posts", "Post")
            .counter("visits")
    }
    fn id(&self) -> Option<u64> {
        self.id
    }
    fn set_id(&mut self, id: u64) {
        self.id = Some(id);
    }
    fn to_attributes(&self) -> Vec<(String, Value)> {
        vec![
            ("name".into(), opt(self.name.clone())),
            ("email".into(), opt(self.email.clone())),
            ("city".into(), opt(self.city.clone())),
            ("score".into(), opt(self.score)),
            ("active".into(), self.active.into()),
        ]
    }
    fn from_attributes(id: u64, a: Attributes) -> Result<Self> {
        Ok(User {
            id: Some(id),
            name: a.string("name"),
            email: a.string("email"),
            city: a.string("city"),
            score: a.parse("score")?,
            active: a.flag("active")?,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Post {
    pub id: Option<u64>,
    pub title: String,
    pub author_id: Option<u64>,
}

impl Model for Post {
    const NAME: &'static str = "Post";

    fn schema() -> Schema {
        Schema::new(Self::NAME)
            .index("title")
            .reference("author", "User")
    }
    fn id(&self) -> Option<u64> {
        self.id
    }
    fn set_id(&mut self, id: u64) {
        self.id = Some(id);
    }
    fn to_attributes(&self) -> Vec<(String, Value)> {
        vec![
            ("title".into(), self.title.clone().into()),
            ("author_id".into(), opt(self.author_id)),
        ]
    }
    fn from_attributes(id: u64, a: Attributes) -> Result<Self> {
        Ok(Post {
            id: Some(id),
            title: a.required("title")?,
            author_id: a.parse("author_id")?,
        })
    }
}

// ============================================================================
// Databases
// ============================================================================

pub fn registry() -> Registry {
    Registry::builder()
        .register::<Post>()
        .register::<User>()
        .build()
        .unwrap()
}

pub fn lock_config() -> TesseraConfig {
    TesseraConfig {
        mode: "lock".into(),
        ..TesseraConfig::default()
    }
}

pub fn open_with(store: Arc<MemoryStore>, config: &TesseraConfig) -> Db {
    init_tracing();
    Db::open(store, registry(), config).unwrap()
}

/// A scripted and a locked database over fresh stores
pub fn dbs() -> Vec<(&'static str, Arc<MemoryStore>, Db)> {
    let scripted = Arc::new(MemoryStore::new());
    let locked = Arc::new(MemoryStore::new());
    vec![
        (
            "script",
            Arc::clone(&scripted),
            open_with(scripted, &TesseraConfig::default()),
        ),
        ("lock", Arc::clone(&locked), open_with(locked, &lock_config())),
    ]
}

/// Every key and its contents, for before/after comparison
pub fn dump(store: &MemoryStore) -> BTreeMap<String, String> {
    let ks = store.snapshot();
    ks.keys("*")
        .into_iter()
        .map(|key| {
            let contents = if let Ok(hash) = ks.hgetall(&key) {
                let sorted: BTreeMap<_, _> = hash.into_iter().collect();
                format!("{:?}", sorted)
            } else if let Ok(mut members) = ks.smembers(&key) {
                members.sort();
                format!("{:?}", members)
            } else if let Ok(items) = ks.lrange(&key, 0, -1) {
                format!("{:?}", items)
            } else {
                format!("{:?}", ks.get(&key))
            };
            (key, contents)
        })
        .collect()
}

pub fn sorted(mut ids: Vec<u64>) -> Vec<u64> {
    ids.sort_unstable();
    ids
}
