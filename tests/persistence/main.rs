//! End-to-end persistence tests
//!
//! Every suite runs through the public `tessera` facade against both
//! persistence paths (atomic scripts and the per-entity lock fallback):
//! - save: creation, updates, value encoding, unique conflicts
//! - delete: completeness and idempotence
//! - find: queries over index sets, scratch-key cleanup
//! - collections: owned sets, lists, counters, references
//! - concurrency: racing writers across threads
//! - fallback: script cache misses, non-scripted stores, lock expiry
//! - scenario: the reference User walkthrough

mod fixtures;

mod collections;
mod concurrency;
mod delete;
mod fallback;
mod find;
mod save;
mod scenario;
