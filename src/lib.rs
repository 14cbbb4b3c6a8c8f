//! Tessera - object-to-hash mapping with atomic persistence and secondary indices
//!
//! Tessera stores plain Rust structs as hashes in a command-based key-value
//! store, and keeps their membership set, unique maps and index sets
//! consistent under concurrent writers.
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use tessera::{Criteria, Db, MemoryStore, Registry, TesseraConfig};
//!
//! let registry = Registry::builder().register::<User>().build()?;
//! let db = Db::open(Arc::new(MemoryStore::new()), registry, &TesseraConfig::default())?;
//!
//! let mut user = User::new("ann@example.com", "NYC");
//! db.save(&mut user)?;
//! let nyc = db.find::<User>(Criteria::new().eq("city", "NYC"))?;
//! ```
//!
//! # Architecture
//!
//! - `tessera-core`: errors, key layout, attribute values
//! - `tessera-storage`: the store command surface and an in-memory store
//! - `tessera-engine`: the save/delete protocols, script runner and
//!   per-entity lock fallback
//! - `tessera-model`: schemas, the registry, `Db` and collections

pub use tessera_core::{BoolPolicy, Error, Key, Result, TypeKeys, Value};
pub use tessera_engine::{
    EntityLock, LockConfig, Persistence, PersistenceMode, ScriptRunner, ScriptSource,
    TesseraConfig, CONFIG_FILE_NAME,
};
pub use tessera_model::*;
pub use tessera_storage::{Command, MemoryStore, Reply, SortSpec, Store, StoreConfig};
