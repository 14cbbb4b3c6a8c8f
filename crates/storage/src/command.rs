//! Command enum defining the store's instruction set.
//!
//! Commands are:
//! - **Self-contained**: All parameters needed for execution are in the variant
//! - **Serializable**: Can be converted to/from any serde format
//! - **Pure data**: No closures or executable code
//!
//! Server-side logic that needs more than one command atomically goes
//! through the script facility instead (see [`crate::script`]).

use serde::{Deserialize, Serialize};

/// A command is a self-contained, serializable store operation.
///
/// # Command Categories
///
/// | Category | Description |
/// |----------|-------------|
/// | Strings | Plain values, counters, check-and-set |
/// | Hashes | Field/value maps (entity attributes, unique maps) |
/// | Sets | Unordered id sets (indices, `all`, scratch results) |
/// | Lists | Ordered id lists |
/// | Sort | External sort by pattern |
/// | Server | Whole-keyspace operations |
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub enum Command {
    // ==================== Strings ====================
    /// Read a string value.
    /// Returns: `Reply::Bulk` or `Reply::Nil`
    Get {
        /// Key to read
        key: String,
    },

    /// Write a string value, replacing whatever the key held.
    /// Returns: `Reply::Status("OK")`
    Set {
        /// Key to write
        key: String,
        /// New value
        value: String,
    },

    /// Write only if the key does not exist.
    /// Returns: `Reply::Int` (1 if written)
    SetNx {
        /// Key to create
        key: String,
        /// Value to store
        value: String,
    },

    /// Write and return the previous string value.
    /// Returns: `Reply::Bulk` or `Reply::Nil`
    GetSet {
        /// Key to swap
        key: String,
        /// Replacement value
        value: String,
    },

    /// Delete keys of any type.
    /// Returns: `Reply::Int` (number removed)
    Del {
        /// Keys to remove; missing ones are skipped
        keys: Vec<String>,
    },

    /// Returns: `Reply::Int` (1 if the key exists)
    Exists {
        /// Key to test
        key: String,
    },

    /// Atomic increment by 1.
    /// Returns: `Reply::Int` (new value)
    Incr {
        /// Counter key; absent counts as 0
        key: String,
    },

    /// Atomic increment by `delta`.
    /// Returns: `Reply::Int` (new value)
    IncrBy {
        /// Counter key; absent counts as 0
        key: String,
        /// Amount to add, may be negative
        delta: i64,
    },

    /// List keys matching a glob (`*`, `?`).
    /// Returns: `Reply::Array` of `Reply::Bulk`
    Keys {
        /// Glob over the whole keyspace
        pattern: String,
    },

    // ==================== Hashes ====================
    /// Returns: `Reply::Bulk` or `Reply::Nil`
    HGet {
        /// Hash key
        key: String,
        /// Field to read
        field: String,
    },

    /// Returns: `Reply::Int` (1 if the field is new)
    HSet {
        /// Hash key
        key: String,
        /// Field to write
        field: String,
        /// New value
        value: String,
    },

    /// Set a field only if it does not exist.
    /// Returns: `Reply::Int` (1 if written)
    HSetNx {
        /// Hash key
        key: String,
        /// Field to create
        field: String,
        /// Value to store
        value: String,
    },

    /// Multi-field write.
    /// Returns: `Reply::Status("OK")`
    HMSet {
        /// Hash key
        key: String,
        /// `(field, value)` pairs, written in order
        pairs: Vec<(String, String)>,
    },

    /// Returns: `Reply::Int` (number of fields removed)
    HDel {
        /// Hash key
        key: String,
        /// Fields to remove
        fields: Vec<String>,
    },

    /// Returns: `Reply::Array` of alternating field/value bulks
    HGetAll {
        /// Hash key
        key: String,
    },

    /// Returns: `Reply::Array` of field names
    HKeys {
        /// Hash key
        key: String,
    },

    /// Returns: `Reply::Int` (new value)
    HIncrBy {
        /// Hash key
        key: String,
        /// Counter field; absent counts as 0
        field: String,
        /// Amount to add, may be negative
        delta: i64,
    },

    // ==================== Sets ====================
    /// Returns: `Reply::Int` (number of members added)
    SAdd {
        /// Set key
        key: String,
        /// Members to add
        members: Vec<String>,
    },

    /// Returns: `Reply::Int` (number of members removed)
    SRem {
        /// Set key
        key: String,
        /// Members to remove
        members: Vec<String>,
    },

    /// Returns: `Reply::Array` of members in ascending order
    SMembers {
        /// Set key
        key: String,
    },

    /// Returns: `Reply::Int` (cardinality)
    SCard {
        /// Set key
        key: String,
    },

    /// Returns: `Reply::Int` (1 if member)
    SIsMember {
        /// Set key
        key: String,
        /// Member to test
        member: String,
    },

    /// Store the intersection of `keys` in `dest`.
    /// Returns: `Reply::Int` (cardinality of the result)
    SInterStore {
        /// Key that receives the result
        dest: String,
        /// Source sets
        keys: Vec<String>,
    },

    /// Store the union of `keys` in `dest`.
    /// Returns: `Reply::Int` (cardinality of the result)
    SUnionStore {
        /// Key that receives the result
        dest: String,
        /// Source sets
        keys: Vec<String>,
    },

    /// Store the first key minus all others in `dest`.
    /// Returns: `Reply::Int` (cardinality of the result)
    SDiffStore {
        /// Key that receives the result
        dest: String,
        /// Base set followed by the sets to subtract
        keys: Vec<String>,
    },

    // ==================== Lists ====================
    /// Prepend values (each becomes the new head in turn).
    /// Returns: `Reply::Int` (new length)
    LPush {
        /// List key
        key: String,
        /// Values to prepend
        values: Vec<String>,
    },

    /// Append values.
    /// Returns: `Reply::Int` (new length)
    RPush {
        /// List key
        key: String,
        /// Values to append
        values: Vec<String>,
    },

    /// Returns: `Reply::Bulk` or `Reply::Nil`
    LPop {
        /// List key
        key: String,
    },

    /// Returns: `Reply::Bulk` or `Reply::Nil`
    RPop {
        /// List key
        key: String,
    },

    /// Inclusive range; negative indices count from the tail.
    /// Returns: `Reply::Array`
    LRange {
        /// List key
        key: String,
        /// First index
        start: i64,
        /// Last index, inclusive
        stop: i64,
    },

    /// Returns: `Reply::Int` (length)
    LLen {
        /// List key
        key: String,
    },

    /// Remove occurrences of `value`: `count > 0` from the head,
    /// `count < 0` from the tail, `0` all of them.
    /// Returns: `Reply::Int` (number removed)
    LRem {
        /// List key
        key: String,
        /// How many to remove and from which end
        count: i64,
        /// Value to match
        value: String,
    },

    // ==================== Sort ====================
    /// Sort a set or list, optionally by an external key pattern.
    /// Returns: `Reply::Array` of `Reply::Bulk`/`Reply::Nil`
    Sort {
        /// Set or list to sort
        key: String,
        /// Weights, limit, projection and order
        spec: SortSpec,
    },

    // ==================== Server ====================
    /// Remove every key.
    /// Returns: `Reply::Status("OK")`
    FlushDb,

    /// Returns: `Reply::Int` (number of keys)
    DbSize,
}

/// Parameters of [`Command::Sort`]
///
/// Patterns substitute the element for the first `*`; a `->field` suffix
/// reads that field of a hash instead of a string key. `#` in `get` is
/// the element itself; `by = "nosort"` keeps the stored order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortSpec {
    /// External weight pattern
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub by: Option<String>,
    /// `(offset, count)`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<(usize, usize)>,
    /// Patterns to return instead of the elements
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub get: Vec<String>,
    /// Sort descending
    #[serde(default)]
    pub descending: bool,
    /// Compare as strings instead of numbers
    #[serde(default)]
    pub alpha: bool,
}

impl Command {
    /// Command name as the store would report it
    pub fn name(&self) -> &'static str {
        match self {
            Command::Get { .. } => "GET",
            Command::Set { .. } => "SET",
            Command::SetNx { .. } => "SETNX",
            Command::GetSet { .. } => "GETSET",
            Command::Del { .. } => "DEL",
            Command::Exists { .. } => "EXISTS",
            Command::Incr { .. } => "INCR",
            Command::IncrBy { .. } => "INCRBY",
            Command::Keys { .. } => "KEYS",
            Command::HGet { .. } => "HGET",
            Command::HSet { .. } => "HSET",
            Command::HSetNx { .. } => "HSETNX",
            Command::HMSet { .. } => "HMSET",
            Command::HDel { .. } => "HDEL",
            Command::HGetAll { .. } => "HGETALL",
            Command::HKeys { .. } => "HKEYS",
            Command::HIncrBy { .. } => "HINCRBY",
            Command::SAdd { .. } => "SADD",
            Command::SRem { .. } => "SREM",
            Command::SMembers { .. } => "SMEMBERS",
            Command::SCard { .. } => "SCARD",
            Command::SIsMember { .. } => "SISMEMBER",
            Command::SInterStore { .. } => "SINTERSTORE",
            Command::SUnionStore { .. } => "SUNIONSTORE",
            Command::SDiffStore { .. } => "SDIFFSTORE",
            Command::LPush { .. } => "LPUSH",
            Command::RPush { .. } => "RPUSH",
            Command::LPop { .. } => "LPOP",
            Command::RPop { .. } => "RPOP",
            Command::LRange { .. } => "LRANGE",
            Command::LLen { .. } => "LLEN",
            Command::LRem { .. } => "LREM",
            Command::Sort { .. } => "SORT",
            Command::FlushDb => "FLUSHDB",
            Command::DbSize => "DBSIZE",
        }
    }

    /// True if the command never mutates the keyspace
    pub fn is_read_only(&self) -> bool {
        matches!(
            self,
            Command::Get { .. }
                | Command::Exists { .. }
                | Command::Keys { .. }
                | Command::HGet { .. }
                | Command::HGetAll { .. }
                | Command::HKeys { .. }
                | Command::SMembers { .. }
                | Command::SCard { .. }
                | Command::SIsMember { .. }
                | Command::LRange { .. }
                | Command::LLen { .. }
                | Command::Sort { .. }
                | Command::DbSize
        )
    }

    /// Shorthand for deleting a single key
    pub fn del(key: impl Into<String>) -> Self {
        Command::Del {
            keys: vec![key.into()],
        }
    }
}
