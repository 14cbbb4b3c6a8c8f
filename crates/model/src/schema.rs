//! Declared shape of one entity type
//!
//! A schema names the attributes a type stores and flags the ones that
//! are indexed or unique, plus the references, collections and counters
//! instances own. References and collections name their target type as a
//! string; the [`Registry`](crate::Registry) binds them once every type
//! is registered.
//!
//! ```
//! use tessera_model::Schema;
//!
//! let schema = Schema::new("Post")
//!     .attribute("title")
//!     .index("status")
//!     .reference("author", "User")
//!     .set("tags", "Tag")
//!     .counter("views");
//! assert!(schema.is_indexed("author_id"));
//! ```

use std::collections::BTreeSet;

/// Storage shape of a collection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CollectionKind {
    /// Unordered, no duplicates
    Set,
    /// Ordered, duplicates allowed
    List,
}

/// A named set or list of another type's identities
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionDef {
    /// Collection name (last key segment)
    pub name: String,
    /// Set or list
    pub kind: CollectionKind,
    /// Type of the members
    pub target: String,
}

/// A reference to one entity of another type, stored as `<name>_id`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    /// Reference name
    pub name: String,
    /// Stored (and indexed) attribute
    pub attribute: String,
    /// Referenced type
    pub target: String,
}

/// Declared attributes, indices, uniques, references, collections, counters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    name: String,
    attributes: Vec<String>,
    indices: BTreeSet<String>,
    uniques: BTreeSet<String>,
    references: Vec<Reference>,
    collections: Vec<CollectionDef>,
    counters: Vec<String>,
}

impl Schema {
    /// Empty schema for `name`
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
            indices: BTreeSet::new(),
            uniques: BTreeSet::new(),
            references: Vec::new(),
            collections: Vec::new(),
            counters: Vec::new(),
        }
    }

    /// Declare a stored attribute
    pub fn attribute(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        if !self.attributes.contains(&name) {
            self.attributes.push(name);
        }
        self
    }

    /// Declare an indexed attribute
    pub fn index(self, name: impl Into<String>) -> Self {
        let name = name.into();
        let mut schema = self.attribute(name.clone());
        schema.indices.insert(name);
        schema
    }

    /// Declare a unique attribute
    pub fn unique(self, name: impl Into<String>) -> Self {
        let name = name.into();
        let mut schema = self.attribute(name.clone());
        schema.uniques.insert(name);
        schema
    }

    /// Declare a reference; stores and indexes `<name>_id`
    pub fn reference(self, name: impl Into<String>, target: impl Into<String>) -> Self {
        let name = name.into();
        let attribute = format!("{}_id", name);
        let mut schema = self.index(attribute.clone());
        schema.references.push(Reference {
            name,
            attribute,
            target: target.into(),
        });
        schema
    }

    /// Declare a set collection
    pub fn set(self, name: impl Into<String>, target: impl Into<String>) -> Self {
        self.collection(name.into(), CollectionKind::Set, target.into())
    }

    /// Declare a list collection
    pub fn list(self, name: impl Into<String>, target: impl Into<String>) -> Self {
        self.collection(name.into(), CollectionKind::List, target.into())
    }

    fn collection(mut self, name: String, kind: CollectionKind, target: String) -> Self {
        self.collections.retain(|c| c.name != name);
        self.collections.push(CollectionDef { name, kind, target });
        self
    }

    /// Declare a counter
    pub fn counter(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        if !self.counters.contains(&name) {
            self.counters.push(name);
        }
        self
    }

    /// Type name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared attributes in declaration order
    pub fn attributes(&self) -> &[String] {
        &self.attributes
    }

    /// Indexed attributes
    pub fn indices(&self) -> impl Iterator<Item = &str> {
        self.indices.iter().map(String::as_str)
    }

    /// Unique attributes
    pub fn uniques(&self) -> impl Iterator<Item = &str> {
        self.uniques.iter().map(String::as_str)
    }

    /// References
    pub fn references(&self) -> &[Reference] {
        &self.references
    }

    /// Collections
    pub fn collections(&self) -> &[CollectionDef] {
        &self.collections
    }

    /// Counters
    pub fn counters(&self) -> &[String] {
        &self.counters
    }

    /// True if `name` is a stored attribute
    pub fn is_declared(&self, name: &str) -> bool {
        self.attributes.iter().any(|a| a == name)
    }

    /// True if `name` is indexed
    pub fn is_indexed(&self, name: &str) -> bool {
        self.indices.contains(name)
    }

    /// True if `name` is unique
    pub fn is_unique(&self, name: &str) -> bool {
        self.uniques.contains(name)
    }

    /// True if `name` is a counter
    pub fn has_counter(&self, name: &str) -> bool {
        self.counters.iter().any(|c| c == name)
    }

    /// Collection by name
    pub fn collection_def(&self, name: &str) -> Option<&CollectionDef> {
        self.collections.iter().find(|c| c.name == name)
    }

    /// Reference by name
    pub fn reference_def(&self, name: &str) -> Option<&Reference> {
        self.references.iter().find(|r| r.name == name)
    }
}
