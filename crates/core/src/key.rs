//! Key namespace for Tessera
//!
//! Keys are colon-separated paths rooted at an entity type name, e.g.
//! `User:1:posts`. [`Key`] composes them; [`TypeKeys`] names every key an
//! entity type owns.
//!
//! ## Contract
//!
//! The layout below is shared with existing deployments and is FROZEN:
//!
//! ```text
//! {Type}:id                        -> integer counter
//! {Type}:all                       -> set of ids
//! {Type}:uniques                   -> set of unique attribute names
//! {Type}:uniques:{attr}            -> hash: value -> id
//! {Type}:indices                   -> set of indexed attribute names
//! {Type}:indices:{attr}:{value}    -> set of ids
//! {Type}:collections               -> set of collection attribute names
//! {Type}:{id}                      -> hash of attributes
//! {Type}:{id}:_indices             -> set of index keys this id belongs to
//! {Type}:{id}:{collectionName}     -> set or list of ids
//! ```

use std::fmt;

/// Separator between key segments
pub const SEPARATOR: char = ':';

/// Per-entity key suffixes the persistence layer owns; no collection may use them
pub const RESERVED_SEGMENTS: [&str; 3] = ["_indices", "_counters", "_lock"];

/// A hierarchical store key
///
/// Deterministic string composition, nothing more:
///
/// ```
/// use tessera_core::Key;
///
/// let key = Key::new("User").sub(1).sub("posts");
/// assert_eq!(key.as_str(), "User:1:posts");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Key(String);

impl Key {
    /// Create a key from its root segment
    pub fn new(root: impl Into<String>) -> Self {
        Self(root.into())
    }

    /// Append one segment
    pub fn sub(&self, segment: impl fmt::Display) -> Key {
        Key(format!("{}{}{}", self.0, SEPARATOR, segment))
    }

    /// Borrow as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume into the underlying string
    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Key {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<Key> for String {
    fn from(key: Key) -> Self {
        key.0
    }
}

/// The persisted key layout of one entity type
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TypeKeys {
    root: Key,
}

impl TypeKeys {
    /// Layout for the named type
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            root: Key::new(type_name),
        }
    }

    /// The type name itself
    pub fn type_name(&self) -> &str {
        self.root.as_str()
    }

    /// `{Type}:id`
    pub fn id_counter(&self) -> Key {
        self.root.sub("id")
    }

    /// `{Type}:all`
    pub fn all(&self) -> Key {
        self.root.sub("all")
    }

    /// `{Type}:uniques`
    pub fn uniques(&self) -> Key {
        self.root.sub("uniques")
    }

    /// `{Type}:uniques:{attr}`
    pub fn unique(&self, attribute: &str) -> Key {
        self.uniques().sub(attribute)
    }

    /// `{Type}:indices`
    pub fn indices(&self) -> Key {
        self.root.sub("indices")
    }

    /// `{Type}:indices:{attr}:{value}`
    pub fn index(&self, attribute: &str, value: &str) -> Key {
        self.indices().sub(attribute).sub(value)
    }

    /// `{Type}:collections`
    pub fn collections(&self) -> Key {
        self.root.sub("collections")
    }

    /// `{Type}:{id}`
    pub fn entity(&self, id: u64) -> Key {
        self.root.sub(id)
    }

    /// `{Type}:{id}:_indices`
    pub fn entity_indices(&self, id: u64) -> Key {
        self.entity(id).sub(RESERVED_SEGMENTS[0])
    }

    /// `{Type}:{id}:{collectionName}`
    pub fn collection(&self, id: u64, name: &str) -> Key {
        self.entity(id).sub(name)
    }

    /// `{Type}:{id}:_counters`
    pub fn counters(&self, id: u64) -> Key {
        self.entity(id).sub(RESERVED_SEGMENTS[1])
    }

    /// `{Type}:{id}:_lock`, the advisory lock of the locking fallback
    pub fn lock(&self, id: u64) -> Key {
        self.entity(id).sub(RESERVED_SEGMENTS[2])
    }

    /// `{Type}:tmp:{suffix}`, a scratch key for set algebra
    pub fn scratch(&self, suffix: &str) -> Key {
        self.root.sub("tmp").sub(suffix)
    }

    /// Pattern matching every scratch key of this type
    pub fn scratch_pattern(&self) -> String {
        format!("{}{}tmp{}*", self.root, SEPARATOR, SEPARATOR)
    }

    /// Parse the identity out of an entity key (`{Type}:{id}`)
    ///
    /// Returns `None` if the key is not an entity key of this type, or if
    /// the segment is not the canonical form of its id (`+5`, `007`).
    pub fn parse_entity_id(&self, key: &str) -> Option<u64> {
        let segment = key
            .strip_prefix(self.root.as_str())?
            .strip_prefix(SEPARATOR)?;
        let id: u64 = segment.parse().ok()?;
        (id.to_string() == segment).then_some(id)
    }

    /// SORT `BY`/`GET` pattern reading one attribute of every member
    pub fn attribute_pattern(&self, attribute: &str) -> String {
        format!("{}{}*->{}", self.root, SEPARATOR, attribute)
    }
}
