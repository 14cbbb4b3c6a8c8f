//! Model layer for Tessera
//!
//! Maps plain Rust structs onto the key layout the persistence protocol
//! maintains:
//! - Schema: declared attributes, indices, uniques, references, collections
//! - Registry: two-phase registration with reference resolution
//! - Model: the trait entity types implement
//! - Db: save, delete, lookup, counters and owned collections
//! - Collections: sets, lists and composed queries over index sets

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod collection;
pub mod db;
pub mod model;
pub mod registry;
pub mod schema;

pub use collection::{
    Collection, Criteria, Kind, List, MultiSet, MutableSet, Order, Plan, Set, SortOptions,
};
pub use db::Db;
pub use model::{Attributes, Model};
pub use registry::{Registry, RegistryBuilder};
pub use schema::{CollectionDef, CollectionKind, Reference, Schema};
