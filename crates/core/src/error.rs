//! Error types for Tessera
//!
//! This module defines all error types used throughout the system.
//! We use `thiserror` for automatic `Display` and `Error` trait implementations.
//!
//! # Categories
//!
//! | Category | Variants | Description |
//! |----------|----------|-------------|
//! | Constraint | `UniqueConstraintViolation` | Data rejected by a declared constraint |
//! | Programming | `IndexNotFound`, `MissingIdentity`, `UnknownType`, `UnresolvedReference` | Misuse of a schema |
//! | Script | `NoScript`, `ScriptingUnsupported`, `Script` | Server-side script facility |
//! | Store | `StoreUnavailable`, `Store`, `WrongType`, `UnexpectedReply` | Store-level failures |
//! | Locking | `LockTimeout` | Fallback lock could not be acquired |
//! | System | `Decode`, `InvalidInput`, `Config`, `Io` | Everything else |

use serde::{Deserialize, Serialize};
use std::io;
use thiserror::Error;

/// Result type alias for Tessera operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for Tessera
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
pub enum Error {
    // ==================== Constraint ====================
    /// A unique attribute's value already maps to another identity.
    /// The save made no changes.
    #[error("{type_name}.{attribute} is not unique")]
    UniqueConstraintViolation {
        /// Entity type being saved
        type_name: String,
        /// First unique attribute found in conflict
        attribute: String,
    },

    // ==================== Programming ====================
    /// Query referenced an attribute that was never declared indexed/unique
    #[error("index not found: {type_name}.{attribute}")]
    IndexNotFound {
        /// Entity type queried
        type_name: String,
        /// Attribute without an index
        attribute: String,
    },

    /// Operation needs a persisted identity but the entity was never saved
    #[error("{type_name} has no identity; save it first")]
    MissingIdentity {
        /// Entity type of the unsaved instance
        type_name: String,
    },

    /// Entity type is not present in the registry
    #[error("unknown entity type: {type_name}")]
    UnknownType {
        /// Requested type name
        type_name: String,
    },

    /// A reference or collection names a type that was never registered
    #[error("{type_name}.{attribute} references unregistered type {target}")]
    UnresolvedReference {
        /// Declaring type
        type_name: String,
        /// Declaring attribute or collection
        attribute: String,
        /// Missing target type
        target: String,
    },

    // ==================== Script ====================
    /// Store does not have a script with this hash loaded
    #[error("no script loaded for {sha}")]
    NoScript {
        /// Content hash that was requested
        sha: String,
    },

    /// Store has no server-side scripting facility
    #[error("store does not support scripting")]
    ScriptingUnsupported,

    /// Script ran but failed
    #[error("script error: {reason}")]
    Script {
        /// Failure description
        reason: String,
    },

    // ==================== Store ====================
    /// Store could not be reached
    #[error("store unavailable: {reason}")]
    StoreUnavailable {
        /// Failure description
        reason: String,
    },

    /// Generic store-level failure
    #[error("store error: {reason}")]
    Store {
        /// Failure description
        reason: String,
    },

    /// Command issued against a key holding another kind of value
    #[error("wrong type for key {key}: expected {expected}")]
    WrongType {
        /// Offending key
        key: String,
        /// Kind the command operates on
        expected: String,
    },

    /// Store replied with a shape the caller did not expect
    #[error("unexpected reply: expected {expected}, got {actual}")]
    UnexpectedReply {
        /// Expected shape
        expected: String,
        /// Actual reply, debug formatted
        actual: String,
    },

    // ==================== Locking ====================
    /// Entity lock was still held when the acquire timeout elapsed
    #[error("timed out after {waited_ms}ms waiting for lock {key}")]
    LockTimeout {
        /// Lock key
        key: String,
        /// Time spent waiting
        waited_ms: u64,
    },

    // ==================== System ====================
    /// Stored data could not be decoded into a model
    #[error("decode error: {reason}")]
    Decode {
        /// Failure description
        reason: String,
    },

    /// Invalid argument or schema declaration
    #[error("invalid input: {reason}")]
    InvalidInput {
        /// Failure description
        reason: String,
    },

    /// Configuration could not be read or parsed
    #[error("config error: {reason}")]
    Config {
        /// Failure description
        reason: String,
    },

    /// I/O error (script files, config files)
    #[error("I/O error: {reason}")]
    Io {
        /// Failure description
        reason: String,
    },
}

impl Error {
    /// Shorthand for [`Error::InvalidInput`]
    pub fn invalid_input(reason: impl Into<String>) -> Self {
        Error::InvalidInput {
            reason: reason.into(),
        }
    }

    /// Shorthand for [`Error::Script`]
    pub fn script(reason: impl Into<String>) -> Self {
        Error::Script {
            reason: reason.into(),
        }
    }

    /// Shorthand for [`Error::Decode`]
    pub fn decode(reason: impl Into<String>) -> Self {
        Error::Decode {
            reason: reason.into(),
        }
    }

    /// Build an [`Error::UnexpectedReply`] from the reply actually received
    pub fn unexpected_reply(expected: &str, actual: impl std::fmt::Debug) -> Self {
        Error::UnexpectedReply {
            expected: expected.to_string(),
            actual: format!("{:?}", actual),
        }
    }

    /// True for the "script not loaded" signal that the script runner
    /// recovers from by resubmitting the body.
    pub fn is_script_miss(&self) -> bool {
        matches!(self, Error::NoScript { .. })
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Io {
            reason: e.to_string(),
        }
    }
}
