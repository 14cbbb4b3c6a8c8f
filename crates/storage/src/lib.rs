//! Storage layer for Tessera
//!
//! This crate implements the key-value store the persistence layer talks to:
//! - Command/Reply: the command surface and its result shapes
//! - Keyspace: strings, hashes, sets and lists behind one map
//! - Sort: external sort with `BY`/`GET` patterns
//! - Script: content-addressed server-side procedures
//! - MemoryStore: embedded `Store` with pipelines, `multi` blocks and
//!   EVALSHA semantics
//!
//! # Concurrency
//!
//! `MemoryStore` serializes every mutating command, `multi` block and
//! script run behind one `parking_lot::RwLock`; read-only commands share
//! the lock. A script therefore runs with no interleaving.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod command;
pub mod keyspace;
pub mod reply;
pub mod script;
mod sort;
pub mod store;

pub use command::{Command, SortSpec};
pub use keyspace::{glob_match, Entry, Keyspace};
pub use reply::Reply;
pub use script::{content_hash, Procedure, Script};
pub use store::{MemoryStore, Store, StoreConfig};
