//! Core types for Tessera
//!
//! This crate defines the foundational types used throughout the system:
//! - Error: Error type hierarchy shared by every layer
//! - Key: Hierarchical string key built from a type name and sub-identifiers
//! - TypeKeys: The persisted key layout of one entity type
//! - Value: Attribute value and its canonical string encoding

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod key;
pub mod value;

pub use error::{Error, Result};
pub use key::{Key, TypeKeys, RESERVED_SEGMENTS, SEPARATOR};
pub use value::{BoolPolicy, Value};
